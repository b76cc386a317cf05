use axum::{
	extract::{Path, State},
	Json,
};
use chrono::{NaiveDate, Utc};
use hyper::StatusCode;
use rand::{distributions::Alphanumeric, Rng};
use serde_json::{json, Value};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
	error::{created, ok, ApiError, ApiResult},
	payload::{opt_date, opt_str, req_date, req_f64, req_str},
	AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatus {
	Pending,
	Confirmed,
	Completed,
	Cancelled,
}

impl BookingStatus {
	pub fn parse(raw: &str) -> Option<BookingStatus> {
		match raw {
			"pending" => Some(BookingStatus::Pending),
			"confirmed" => Some(BookingStatus::Confirmed),
			"completed" => Some(BookingStatus::Completed),
			"cancelled" => Some(BookingStatus::Cancelled),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			BookingStatus::Pending => "pending",
			BookingStatus::Confirmed => "confirmed",
			BookingStatus::Completed => "completed",
			BookingStatus::Cancelled => "cancelled",
		}
	}

	/// pending -> confirmed -> completed, with cancellation possible until a
	/// booking completes. Terminal states only accept themselves, so an admin
	/// retrying the same write does not get an error.
	pub fn can_transition_to(self, next: BookingStatus) -> bool {
		use BookingStatus::*;
		matches!(
			(self, next),
			(Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed) | (Confirmed, Cancelled)
		) || self == next
	}
}

/// Human-readable code handed to the customer, distinct from the row id.
pub fn generate_booking_code() -> String {
	let suffix: String = rand::thread_rng()
		.sample_iter(&Alphanumeric)
		.take(4)
		.map(|c| (c as char).to_ascii_uppercase())
		.collect();
	format!("BK{}{}", Utc::now().timestamp_millis(), suffix)
}

/// Both dates present means pickup must come first; a single date skips the
/// check. Creation intentionally never runs this (the dashboard relies on it).
pub fn check_date_order(pickup: Option<NaiveDate>, ret: Option<NaiveDate>) -> ApiResult<()> {
	if let (Some(p), Some(r)) = (pickup, ret) {
		if p >= r {
			return Err(ApiError::validation("Pickup date must be before return date"));
		}
	}
	Ok(())
}

fn booking_json(row: &Row) -> Value {
	json!({
		"id": row.get::<_, Uuid>("booking_id"),
		"bookingId": row.get::<_, String>("booking_code"),
		"carId": row.get::<_, Uuid>("car_id"),
		"registrationNumber": row.get::<_, String>("registration_number"),
		"model": row.get::<_, String>("model"),
		"pickupDate": row.get::<_, NaiveDate>("pickup_date"),
		"returnDate": row.get::<_, NaiveDate>("return_date"),
		"totalAmount": row.get::<_, f64>("total_amount"),
		"status": row.get::<_, String>("status"),
		"customerInfo": {
			"fullName": row.get::<_, String>("customer_name"),
			"email": row.get::<_, String>("customer_email"),
			"phone": row.get::<_, String>("customer_phone"),
			"idNumber": row.get::<_, String>("customer_id_number"),
		},
		"specialRequests": row.get::<_, Option<String>>("special_requests"),
	})
}

pub async fn create_booking(state: State<AppState>, body: Json<Value>) -> ApiResult<(StatusCode, Json<Value>)> {
	let db = &state.db;
	let body = body.0;

	let car_id = req_str(&body, "carId")?;
	let car_id = Uuid::parse_str(&car_id).map_err(|_| ApiError::validation("Invalid car ID format"))?;
	let registration_number = req_str(&body, "registrationNumber")?;
	let model = req_str(&body, "model")?;
	let pickup_date = req_date(&body, "pickupDate")?;
	let return_date = req_date(&body, "returnDate")?;
	let total_amount = req_f64(&body, "totalAmount")?;
	if total_amount < 0.0 {
		return Err(ApiError::validation("Total amount cannot be negative"));
	}

	let customer = body
		.get("customerInfo")
		.cloned()
		.ok_or_else(|| ApiError::validation("Missing required booking or customer information"))?;
	let full_name = req_str(&customer, "fullName")?;
	let email = req_str(&customer, "email")?.to_lowercase();
	let phone = req_str(&customer, "phone")?;
	let id_number = req_str(&customer, "idNumber")?;

	let special_requests = opt_str(&body, "specialRequests");
	if special_requests.as_deref().is_some_and(|s| s.len() > 500) {
		return Err(ApiError::validation("Special requests cannot exceed 500 characters"));
	}

	let booking_id = Uuid::new_v4();
	let booking_code = generate_booking_code();
	db.execute(
		"INSERT INTO bookings (booking_id, booking_code, car_id, registration_number, model, pickup_date,
		 return_date, total_amount, status, customer_name, customer_email, customer_phone, customer_id_number, special_requests)
		 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9, $10, $11, $12, $13)",
		&[
			&booking_id,
			&booking_code,
			&car_id,
			&registration_number,
			&model,
			&pickup_date,
			&return_date,
			&total_amount,
			&full_name,
			&email,
			&phone,
			&id_number,
			&special_requests,
		],
	)
	.await?;

	log::info!("created booking {} ({})", booking_code, booking_id);
	let row = db
		.query_opt("SELECT * FROM bookings WHERE booking_id = $1", &[&booking_id])
		.await?
		.ok_or(ApiError::Internal)?;
	Ok(created(booking_json(&row)))
}

pub async fn get_bookings(state: State<AppState>) -> ApiResult<(StatusCode, Json<Value>)> {
	let rows = state.db.query("SELECT * FROM bookings ORDER BY created_at DESC", &[]).await?;
	Ok(ok(Value::Array(rows.iter().map(booking_json).collect())))
}

pub async fn get_booking(state: State<AppState>, Path(id): Path<String>) -> ApiResult<(StatusCode, Json<Value>)> {
	let row = fetch_booking(&state, &id).await?;
	Ok(ok(booking_json(&row)))
}

pub async fn update_booking(state: State<AppState>, Path(id): Path<String>, body: Json<Value>) -> ApiResult<(StatusCode, Json<Value>)> {
	let db = &state.db;
	let body = body.0;
	let row = fetch_booking(&state, &id).await?;
	let booking_id: Uuid = row.get("booking_id");

	const ALLOWED: [&str; 4] = ["status", "specialRequests", "pickupDate", "returnDate"];
	let touched = body
		.as_object()
		.map(|o| o.keys().filter(|k| ALLOWED.contains(&k.as_str())).count())
		.unwrap_or(0);
	if touched == 0 {
		return Err(ApiError::validation("No valid fields to update"));
	}

	let current = BookingStatus::parse(row.get("status")).ok_or(ApiError::Internal)?;
	let mut status = current;
	if let Some(raw) = body.get("status") {
		let raw = raw.as_str().ok_or_else(|| ApiError::validation("Invalid status value"))?;
		let next = BookingStatus::parse(raw).ok_or_else(|| ApiError::validation("Invalid status value"))?;
		if !current.can_transition_to(next) {
			return Err(ApiError::validation(format!(
				"Cannot change booking status from {} to {}",
				current.as_str(),
				next.as_str()
			)));
		}
		status = next;
	}

	let patch_pickup = opt_date(&body, "pickupDate")?;
	let patch_return = opt_date(&body, "returnDate")?;
	check_date_order(patch_pickup, patch_return)?;
	let pickup = patch_pickup.unwrap_or_else(|| row.get("pickup_date"));
	let ret = patch_return.unwrap_or_else(|| row.get("return_date"));

	let special = match body.get("specialRequests") {
		Some(v) => {
			let s = v.as_str().map(|s| s.trim().to_string());
			if s.as_deref().is_some_and(|s| s.len() > 500) {
				return Err(ApiError::validation("Special requests cannot exceed 500 characters"));
			}
			s
		}
		None => row.get("special_requests"),
	};

	db.execute(
		"UPDATE bookings SET status = $2, pickup_date = $3, return_date = $4, special_requests = $5 WHERE booking_id = $1",
		&[&booking_id, &status.as_str(), &pickup, &ret, &special],
	)
	.await?;

	let row = db
		.query_opt("SELECT * FROM bookings WHERE booking_id = $1", &[&booking_id])
		.await?
		.ok_or(ApiError::NotFound("Booking"))?;
	Ok(ok(booking_json(&row)))
}

pub async fn delete_booking(state: State<AppState>, Path(id): Path<String>) -> ApiResult<(StatusCode, Json<Value>)> {
	let row = fetch_booking(&state, &id).await?;
	let booking_id: Uuid = row.get("booking_id");
	state.db.execute("DELETE FROM bookings WHERE booking_id = $1", &[&booking_id]).await?;
	Ok(ok(json!({"id": booking_id})))
}

async fn fetch_booking(state: &State<AppState>, raw_id: &str) -> ApiResult<Row> {
	let id = Uuid::parse_str(raw_id).map_err(|_| ApiError::validation("Invalid booking ID format"))?;
	state
		.db
		.query_opt("SELECT * FROM bookings WHERE booking_id = $1", &[&id])
		.await?
		.ok_or(ApiError::NotFound("Booking"))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn d(s: &str) -> NaiveDate {
		s.parse().unwrap()
	}

	#[test]
	fn happy_path_transitions_are_legal() {
		use BookingStatus::*;
		assert!(Pending.can_transition_to(Confirmed));
		assert!(Confirmed.can_transition_to(Completed));
		assert!(Pending.can_transition_to(Cancelled));
		assert!(Confirmed.can_transition_to(Cancelled));
	}

	#[test]
	fn terminal_states_only_accept_themselves() {
		use BookingStatus::*;
		assert!(!Completed.can_transition_to(Pending));
		assert!(!Completed.can_transition_to(Confirmed));
		assert!(!Completed.can_transition_to(Cancelled));
		assert!(!Cancelled.can_transition_to(Pending));
		assert!(!Cancelled.can_transition_to(Completed));
		assert!(Completed.can_transition_to(Completed));
		assert!(Cancelled.can_transition_to(Cancelled));
	}

	#[test]
	fn backwards_edges_are_illegal() {
		use BookingStatus::*;
		assert!(!Confirmed.can_transition_to(Pending));
		assert!(!Pending.can_transition_to(Completed));
	}

	#[test]
	fn status_labels_round_trip_and_unknowns_fail() {
		for s in ["pending", "confirmed", "completed", "cancelled"] {
			assert_eq!(BookingStatus::parse(s).unwrap().as_str(), s);
		}
		assert!(BookingStatus::parse("archived").is_none());
		assert!(BookingStatus::parse("Pending").is_none());
	}

	#[test]
	fn date_order_checked_only_when_both_present() {
		assert!(check_date_order(Some(d("2025-01-10")), Some(d("2025-01-05"))).is_err());
		assert!(check_date_order(Some(d("2025-01-10")), Some(d("2025-01-10"))).is_err());
		assert!(check_date_order(Some(d("2025-01-05")), Some(d("2025-01-10"))).is_ok());
		assert!(check_date_order(Some(d("2025-01-10")), None).is_ok());
		assert!(check_date_order(None, Some(d("2025-01-05"))).is_ok());
		assert!(check_date_order(None, None).is_ok());
	}

	#[test]
	fn booking_codes_have_the_documented_shape() {
		let code = generate_booking_code();
		assert!(code.starts_with("BK"));
		let rest = &code[2..];
		let (millis, suffix) = rest.split_at(rest.len() - 4);
		assert!(millis.chars().all(|c| c.is_ascii_digit()));
		assert!(!millis.is_empty());
		assert_eq!(suffix.len(), 4);
		assert!(suffix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
	}

	#[test]
	fn booking_codes_differ_between_calls() {
		let a = generate_booking_code();
		let b = generate_booking_code();
		assert_ne!(a, b);
	}
}
