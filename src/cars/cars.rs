use axum::{
	extract::{Multipart, Path, State},
	Json,
};
use chrono::NaiveDate;
use hyper::StatusCode;
use postgres_from_row::FromRow;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
	error::{created, ok, ApiError, ApiResult},
	AppState,
};

const CAR_COLS: &str =
	"car_id, model, car_type, registration_number, location, price_per_day, year, transmission, fuel, seats, features, image, schedule";

#[derive(serde::Serialize, serde::Deserialize, FromRow)]
pub struct Car {
	#[serde(rename = "id")]
	pub car_id: Uuid,
	pub model: String,
	#[serde(rename = "type")]
	pub car_type: String,
	// wire spelling kept from the dashboard API
	#[serde(rename = "regestrationNumber")]
	pub registration_number: String,
	pub location: String,
	#[serde(rename = "pricePerDay")]
	pub price_per_day: f64,
	pub year: i32,
	pub transmission: String,
	pub fuel: String,
	pub seats: i32,
	pub features: Vec<String>,
	pub image: String,
	pub schedule: Vec<NaiveDate>,
}

/// Raw multipart fields as submitted, before validation.
#[derive(Default)]
pub struct CarForm {
	pub model: String,
	pub car_type: String,
	pub registration_number: String,
	pub location: String,
	pub price_per_day: Option<f64>,
	pub year: Option<i32>,
	pub transmission: String,
	pub fuel: String,
	pub seats: Option<i32>,
	pub features: Vec<String>,
	pub schedule: Vec<NaiveDate>,
	pub image: Option<Vec<u8>>,
}

#[derive(Debug)]
pub struct CarInput {
	pub model: String,
	pub car_type: String,
	pub registration_number: String,
	pub location: String,
	pub price_per_day: f64,
	pub year: i32,
	pub transmission: String,
	pub fuel: String,
	pub seats: i32,
	pub features: Vec<String>,
	pub schedule: Vec<NaiveDate>,
	pub image: Option<Vec<u8>>,
}

impl CarForm {
	pub fn validate(self) -> ApiResult<CarInput> {
		for (field, value) in [
			("model", &self.model),
			("type", &self.car_type),
			("regestrationNumber", &self.registration_number),
			("location", &self.location),
			("transmission", &self.transmission),
			("fuel", &self.fuel),
		] {
			if value.trim().is_empty() {
				return Err(ApiError::validation(format!("Missing required field: {}", field)));
			}
		}
		let price_per_day = self.price_per_day.ok_or_else(|| ApiError::validation("Missing required field: pricePerDay"))?;
		if price_per_day <= 0.0 {
			return Err(ApiError::validation("Price per day must be a positive number"));
		}
		let year = self.year.ok_or_else(|| ApiError::validation("Missing required field: year"))?;
		if year < 1900 {
			return Err(ApiError::validation("Year must be a valid number (1900 or later)"));
		}
		let seats = self.seats.ok_or_else(|| ApiError::validation("Missing required field: seats"))?;
		if seats < 1 {
			return Err(ApiError::validation("Seats must be at least 1"));
		}

		Ok(CarInput {
			model: self.model.trim().to_string(),
			car_type: self.car_type.trim().to_string(),
			registration_number: self.registration_number.trim().to_string(),
			location: self.location.trim().to_string(),
			price_per_day,
			year,
			transmission: self.transmission.trim().to_string(),
			fuel: self.fuel.trim().to_string(),
			seats,
			features: self.features,
			schedule: self.schedule,
			image: self.image,
		})
	}
}

pub async fn read_car_form(multipart: &mut Multipart) -> ApiResult<CarForm> {
	let mut form = CarForm::default();
	while let Some(field) = multipart
		.next_field()
		.await
		.map_err(|e| ApiError::validation(format!("Invalid multipart payload: {}", e)))?
	{
		let name = field.name().unwrap_or_default().to_string();
		match name.as_str() {
			"model" => form.model = field_text(field).await?,
			"type" => form.car_type = field_text(field).await?,
			"regestrationNumber" => form.registration_number = field_text(field).await?,
			"location" => form.location = field_text(field).await?,
			"transmission" => form.transmission = field_text(field).await?,
			"fuel" => form.fuel = field_text(field).await?,
			"pricePerDay" => form.price_per_day = field_text(field).await?.parse().ok(),
			"year" => form.year = field_text(field).await?.parse().ok(),
			"seats" => form.seats = field_text(field).await?.parse().ok(),
			"features" => {
				let feature = field_text(field).await?;
				if !feature.is_empty() && !form.features.contains(&feature) {
					form.features.push(feature);
				}
			}
			"schedule" => {
				let raw = field_text(field).await?;
				if let Ok(date) = raw.parse::<NaiveDate>() {
					form.schedule.push(date);
				}
			}
			"image" => {
				let bytes = field
					.bytes()
					.await
					.map_err(|e| ApiError::validation(format!("Invalid multipart payload: {}", e)))?;
				if !bytes.is_empty() {
					form.image = Some(bytes.to_vec());
				}
			}
			_ => {}
		}
	}
	Ok(form)
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
	field
		.text()
		.await
		.map(|s| s.trim().to_string())
		.map_err(|e| ApiError::validation(format!("Invalid multipart payload: {}", e)))
}

async fn ensure_registration_unique(state: &AppState, registration: &str, exclude: Option<Uuid>) -> ApiResult<()> {
	// stored case-sensitively, compared case-sensitively
	let rows = state
		.db
		.query("SELECT car_id FROM cars WHERE registration_number = $1", &[&registration])
		.await?;
	if rows.iter().any(|r| Some(r.get::<_, Uuid>("car_id")) != exclude) {
		return Err(ApiError::conflict("regestrationNumber", registration));
	}
	Ok(())
}

pub async fn create_car(state: State<AppState>, mut multipart: Multipart) -> ApiResult<(StatusCode, Json<Value>)> {
	let input = read_car_form(&mut multipart).await?.validate()?;
	ensure_registration_unique(&state, &input.registration_number, None).await?;

	let image_bytes = input.image.as_deref().ok_or_else(|| ApiError::validation("Image is required"))?;
	// upload first so a failed relay never leaves a record behind
	let image_url = state.images.put_with_retry("cars", image_bytes).await?;

	let car_id = Uuid::new_v4();
	state
		.db
		.execute(
			"INSERT INTO cars (car_id, model, car_type, registration_number, location, price_per_day, year,
			 transmission, fuel, seats, features, image, schedule)
			 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
			&[
				&car_id,
				&input.model,
				&input.car_type,
				&input.registration_number,
				&input.location,
				&input.price_per_day,
				&input.year,
				&input.transmission,
				&input.fuel,
				&input.seats,
				&input.features,
				&image_url,
				&input.schedule,
			],
		)
		.await
		.map_err(|e| registration_conflict(e, &input.registration_number))?;

	log::info!("created car {} ({})", input.registration_number, car_id);
	Ok(created(fetch_car_json(&state, car_id).await?))
}

pub async fn get_cars(state: State<AppState>) -> ApiResult<(StatusCode, Json<Value>)> {
	let q = format!("SELECT {} FROM cars ORDER BY created_at DESC", CAR_COLS);
	let rows = state.db.query(q.as_str(), &[]).await?;
	let cars: Vec<Car> = rows.iter().map(Car::from_row).collect();
	Ok(ok(serde_json::to_value(cars).map_err(|_| ApiError::Internal)?))
}

pub async fn get_car(state: State<AppState>, Path(id): Path<String>) -> ApiResult<(StatusCode, Json<Value>)> {
	let car_id = parse_car_id(&id)?;
	Ok(ok(fetch_car_json(&state, car_id).await?))
}

pub async fn update_car(state: State<AppState>, Path(id): Path<String>, mut multipart: Multipart) -> ApiResult<(StatusCode, Json<Value>)> {
	let car_id = parse_car_id(&id)?;
	let input = read_car_form(&mut multipart).await?.validate()?;

	let existing = state
		.db
		.query_opt("SELECT image FROM cars WHERE car_id = $1", &[&car_id])
		.await?
		.ok_or(ApiError::NotFound("Car"))?;
	ensure_registration_unique(&state, &input.registration_number, Some(car_id)).await?;

	// a new image replaces the reference; absent one keeps the old URL
	let image_url = match input.image.as_deref() {
		Some(bytes) => state.images.put_with_retry("cars", bytes).await?,
		None => existing.get("image"),
	};

	state
		.db
		.execute(
			"UPDATE cars SET model = $2, car_type = $3, registration_number = $4, location = $5, price_per_day = $6,
			 year = $7, transmission = $8, fuel = $9, seats = $10, features = $11, image = $12, schedule = $13
			 WHERE car_id = $1",
			&[
				&car_id,
				&input.model,
				&input.car_type,
				&input.registration_number,
				&input.location,
				&input.price_per_day,
				&input.year,
				&input.transmission,
				&input.fuel,
				&input.seats,
				&input.features,
				&image_url,
				&input.schedule,
			],
		)
		.await
		.map_err(|e| registration_conflict(e, &input.registration_number))?;

	Ok(ok(fetch_car_json(&state, car_id).await?))
}

pub async fn delete_car(state: State<AppState>, Path(id): Path<String>) -> ApiResult<(StatusCode, Json<Value>)> {
	let car_id = parse_car_id(&id)?;
	let removed = state.db.execute("DELETE FROM cars WHERE car_id = $1", &[&car_id]).await?;
	if removed == 0 {
		return Err(ApiError::NotFound("Car"));
	}
	// a deleted car must not linger in any owner's list
	state.db.execute("DELETE FROM owner_cars WHERE car_id = $1", &[&car_id]).await?;
	Ok(ok(json!({"id": car_id})))
}

async fn fetch_car_json(state: &AppState, car_id: Uuid) -> ApiResult<Value> {
	let q = format!("SELECT {} FROM cars WHERE car_id = $1", CAR_COLS);
	let row = state
		.db
		.query_opt(q.as_str(), &[&car_id])
		.await?
		.ok_or(ApiError::NotFound("Car"))?;
	serde_json::to_value(Car::from_row(&row)).map_err(|_| ApiError::Internal)
}

fn parse_car_id(raw: &str) -> ApiResult<Uuid> {
	Uuid::parse_str(raw).map_err(|_| ApiError::validation("Invalid car ID format"))
}

fn registration_conflict(e: tokio_postgres::Error, registration: &str) -> ApiError {
	if e.code() == Some(&tokio_postgres::error::SqlState::UNIQUE_VIOLATION) {
		return ApiError::conflict("regestrationNumber", registration);
	}
	e.into()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn filled_form() -> CarForm {
		CarForm {
			model: "Corolla".into(),
			car_type: "Sedan".into(),
			registration_number: "KAA 001A".into(),
			location: "Nairobi".into(),
			price_per_day: Some(5000.0),
			year: Some(2022),
			transmission: "Automatic".into(),
			fuel: "Petrol".into(),
			seats: Some(5),
			features: vec!["AC".into(), "GPS".into()],
			schedule: vec![],
			image: Some(vec![1, 2, 3]),
		}
	}

	#[test]
	fn a_complete_form_validates() {
		let input = filled_form().validate().unwrap();
		assert_eq!(input.registration_number, "KAA 001A");
		assert_eq!(input.seats, 5);
	}

	#[test]
	fn missing_required_text_fields_fail() {
		let mut form = filled_form();
		form.model = "  ".into();
		assert!(form.validate().is_err());

		let mut form = filled_form();
		form.registration_number = String::new();
		assert!(form.validate().is_err());
	}

	#[test]
	fn numeric_ranges_are_enforced() {
		let mut form = filled_form();
		form.price_per_day = Some(0.0);
		assert!(form.validate().is_err());

		let mut form = filled_form();
		form.year = Some(1899);
		assert!(form.validate().is_err());

		let mut form = filled_form();
		form.seats = Some(0);
		assert!(form.validate().is_err());

		let mut form = filled_form();
		form.year = Some(1900);
		form.seats = Some(1);
		assert!(form.validate().is_ok());
	}

	#[test]
	fn unparsable_numbers_read_as_missing() {
		let mut form = filled_form();
		form.price_per_day = None;
		let err = form.validate().unwrap_err();
		assert!(matches!(err, ApiError::Validation(_)));
	}

	#[test]
	fn features_survive_serialization_order_insensitively() {
		let car = Car {
			car_id: Uuid::from_u128(1),
			model: "Corolla".into(),
			car_type: "Sedan".into(),
			registration_number: "KAA 001A".into(),
			location: "Nairobi".into(),
			price_per_day: 5000.0,
			year: 2022,
			transmission: "Automatic".into(),
			fuel: "Petrol".into(),
			seats: 5,
			features: vec!["AC".into(), "GPS".into()],
			image: "/images/cars/x.png".into(),
			schedule: vec![],
		};
		let v = serde_json::to_value(&car).unwrap();
		assert_eq!(v["regestrationNumber"], "KAA 001A");
		assert_eq!(v["type"], "Sedan");

		let back: Car = serde_json::from_value(v).unwrap();
		let mut sent = car.features.clone();
		let mut got = back.features.clone();
		sent.sort();
		got.sort();
		assert_eq!(sent, got);
	}
}
