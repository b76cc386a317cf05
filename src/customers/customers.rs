use axum::{
	extract::{Path, State},
	Json,
};
use chrono::{DateTime, Utc};
use hyper::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
	error::{ok, ApiError, ApiResult},
	AppState,
};

/// Read-only dashboard views. Customers are not stored as records of their
/// own; the list is derived from the customer info on bookings.

pub async fn get_customers(state: State<AppState>) -> ApiResult<(StatusCode, Json<Value>)> {
	let rows = state
		.db
		.query(
			"SELECT customer_name, customer_email, customer_phone, customer_id_number,
			 count(*) AS bookings, max(created_at) AS last_booking
			 FROM bookings
			 GROUP BY customer_name, customer_email, customer_phone, customer_id_number
			 ORDER BY max(created_at) DESC",
			&[],
		)
		.await?;

	let data: Vec<Value> = rows
		.iter()
		.map(|row| {
			json!({
				"fullName": row.get::<_, String>("customer_name"),
				"email": row.get::<_, String>("customer_email"),
				"phone": row.get::<_, String>("customer_phone"),
				"idNumber": row.get::<_, String>("customer_id_number"),
				"bookings": row.get::<_, i64>("bookings"),
				"lastBooking": row.get::<_, DateTime<Utc>>("last_booking"),
			})
		})
		.collect();
	Ok(ok(Value::Array(data)))
}

fn message_json(row: &tokio_postgres::Row) -> Value {
	json!({
		"id": row.get::<_, Uuid>("message_id"),
		"senderName": row.get::<_, String>("sender_name"),
		"senderEmail": row.get::<_, String>("sender_email"),
		"subject": row.get::<_, String>("subject"),
		"body": row.get::<_, String>("body"),
		"createdAt": row.get::<_, DateTime<Utc>>("created_at"),
	})
}

pub async fn get_messages(state: State<AppState>) -> ApiResult<(StatusCode, Json<Value>)> {
	let rows = state.db.query("SELECT * FROM messages ORDER BY created_at DESC", &[]).await?;
	Ok(ok(Value::Array(rows.iter().map(message_json).collect())))
}

pub async fn get_message(state: State<AppState>, Path(id): Path<String>) -> ApiResult<(StatusCode, Json<Value>)> {
	let id = Uuid::parse_str(&id).map_err(|_| ApiError::validation("Invalid message ID format"))?;
	let row = state
		.db
		.query_opt("SELECT * FROM messages WHERE message_id = $1", &[&id])
		.await?
		.ok_or(ApiError::NotFound("Message"))?;
	Ok(ok(message_json(&row)))
}
