use std::collections::HashMap;

use axum::{
	extract::{Path, State},
	Json,
};
use hyper::StatusCode;
use serde_json::{json, Value};
use tokio_postgres::{error::SqlState, Row};
use uuid::Uuid;

use crate::{
	db_client::DbClient,
	error::{created, ok, ApiError, ApiResult},
	payload::{opt_str, req_str},
	AppState,
};

pub const OWNER_STATUSES: [&str; 3] = ["active", "inactive", "suspended"];

const CAR_SUMMARY_COLS: &str = "car_id, model, registration_number, car_type, year, image, location, price_per_day";

/// The ownership rule: no car may be held by two owners at once. `assigned`
/// is the scan of persisted (car, owner) pairs, `updating` is the owner being
/// edited (so it does not collide with its own previous list), `proposed` is
/// the list the caller wants to persist. Read-only; callers re-run it on a
/// fresh scan right before writing, and the primary key on `owner_cars.car_id`
/// backstops the window between check and write.
pub fn check_assignment(assigned: &[(Uuid, Uuid)], updating: Option<Uuid>, proposed: &[Uuid]) -> ApiResult<()> {
	if proposed.is_empty() {
		return Err(ApiError::validation("At least one car must be assigned to the owner"));
	}
	for car in proposed {
		if assigned.iter().any(|(c, o)| c == car && Some(*o) != updating) {
			return Err(ApiError::conflict("car", car));
		}
	}
	Ok(())
}

#[derive(Debug)]
struct OwnerInput {
	name: String,
	email: String,
	phone: String,
	location: String,
	joined_date: String,
	status: String,
	cars: Vec<Uuid>,
}

fn parse_owner_body(body: &Value) -> ApiResult<OwnerInput> {
	let name = req_str(body, "name")?;
	let email = req_str(body, "email")?.to_lowercase();
	let phone = req_str(body, "phone")?;
	let location = req_str(body, "location")?;
	let joined_date = req_str(body, "joinedDate")?;
	let status = opt_str(body, "status").unwrap_or_else(|| "active".to_string());
	if !OWNER_STATUSES.contains(&status.as_str()) {
		return Err(ApiError::validation("Invalid status value"));
	}

	let raw_cars = body
		.get("cars")
		.and_then(Value::as_array)
		.ok_or_else(|| ApiError::validation("At least one car must be assigned to the owner"))?;

	let mut cars = Vec::with_capacity(raw_cars.len());
	for raw in raw_cars {
		let id = raw
			.as_str()
			.and_then(|s| Uuid::parse_str(s).ok())
			.ok_or_else(|| ApiError::validation("Invalid car ID format"))?;
		if !cars.contains(&id) {
			cars.push(id);
		}
	}

	Ok(OwnerInput { name, email, phone, location, joined_date, status, cars })
}

async fn scan_assignments(db: &DbClient) -> ApiResult<Vec<(Uuid, Uuid)>> {
	let rows = db.query("SELECT car_id, owner_id FROM owner_cars", &[]).await?;
	Ok(rows.iter().map(|r| (r.get("car_id"), r.get("owner_id"))).collect())
}

async fn ensure_cars_exist(db: &DbClient, cars: &[Uuid]) -> ApiResult<()> {
	let ids: Vec<Uuid> = cars.to_vec();
	let rows = db.query("SELECT car_id FROM cars WHERE car_id = ANY($1)", &[&ids]).await?;
	if rows.len() != cars.len() {
		return Err(ApiError::validation("One or more cars do not exist"));
	}
	Ok(())
}

/// email/phone uniqueness with the same self-exclusion the car scan uses
async fn ensure_contact_unique(db: &DbClient, input: &OwnerInput, exclude: Option<Uuid>) -> ApiResult<()> {
	for (field, value) in [("email", &input.email), ("phone", &input.phone)] {
		let q = format!("SELECT owner_id FROM car_owners WHERE {} = $1", field);
		let rows = db.query(q.as_str(), &[value]).await?;
		if rows.iter().any(|r| Some(r.get::<_, Uuid>("owner_id")) != exclude) {
			return Err(ApiError::conflict(field, value));
		}
	}
	Ok(())
}

fn db_conflict(e: tokio_postgres::Error, input: &OwnerInput) -> ApiError {
	if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
		let constraint = e.as_db_error().and_then(|d| d.constraint()).unwrap_or("");
		if constraint.contains("email") {
			return ApiError::conflict("email", &input.email);
		}
		if constraint.contains("phone") {
			return ApiError::conflict("phone", &input.phone);
		}
		// the owner_cars primary key fired: a concurrent request took a car
		let value = e
			.as_db_error()
			.and_then(|d| d.detail())
			.and_then(|d| d.split("=(").nth(1))
			.and_then(|d| d.split(')').next())
			.unwrap_or("unknown")
			.to_string();
		return ApiError::conflict("car", value);
	}
	e.into()
}

fn car_summary(row: &Row) -> Value {
	json!({
		"id": row.get::<_, Uuid>("car_id"),
		"model": row.get::<_, String>("model"),
		"regestrationNumber": row.get::<_, String>("registration_number"),
		"type": row.get::<_, String>("car_type"),
		"year": row.get::<_, i32>("year"),
		"image": row.get::<_, String>("image"),
		"location": row.get::<_, String>("location"),
		"pricePerDay": row.get::<_, f64>("price_per_day"),
	})
}

fn owner_json(row: &Row, cars: Vec<Value>) -> Value {
	json!({
		"id": row.get::<_, Uuid>("owner_id"),
		"name": row.get::<_, String>("name"),
		"email": row.get::<_, String>("email"),
		"phone": row.get::<_, String>("phone"),
		"location": row.get::<_, String>("location"),
		"joinedDate": row.get::<_, String>("joined_date"),
		"status": row.get::<_, String>("status"),
		"cars": cars,
	})
}

async fn populated_owner(db: &DbClient, owner_id: Uuid) -> ApiResult<Value> {
	let row = db
		.query_opt("SELECT * FROM car_owners WHERE owner_id = $1", &[&owner_id])
		.await?
		.ok_or(ApiError::NotFound("Car owner"))?;
	let q = format!(
		"SELECT {} FROM cars WHERE car_id IN (SELECT car_id FROM owner_cars WHERE owner_id = $1)",
		CAR_SUMMARY_COLS
	);
	let cars = db.query(q.as_str(), &[&owner_id]).await?;
	Ok(owner_json(&row, cars.iter().map(car_summary).collect()))
}

pub async fn get_owners(state: State<AppState>) -> ApiResult<(StatusCode, Json<Value>)> {
	let db = &state.db;
	let owners = db.query("SELECT * FROM car_owners ORDER BY created_at DESC", &[]).await?;
	let q = format!(
		"SELECT oc.owner_id AS assignee, {} FROM owner_cars oc JOIN cars c ON c.car_id = oc.car_id",
		CAR_SUMMARY_COLS
	);
	let assigned = db.query(q.as_str(), &[]).await?;

	let mut by_owner: HashMap<Uuid, Vec<Value>> = HashMap::new();
	for row in &assigned {
		by_owner.entry(row.get("assignee")).or_default().push(car_summary(row));
	}

	let data: Vec<Value> = owners
		.iter()
		.map(|row| owner_json(row, by_owner.remove(&row.get::<_, Uuid>("owner_id")).unwrap_or_default()))
		.collect();
	let count = data.len();
	Ok((StatusCode::OK, Json(json!({"success": true, "data": data, "count": count}))))
}

pub async fn get_owner(state: State<AppState>, Path(id): Path<String>) -> ApiResult<(StatusCode, Json<Value>)> {
	let id = parse_owner_id(&id)?;
	Ok(ok(populated_owner(&state.db, id).await?))
}

pub async fn create_owner(state: State<AppState>, body: Json<Value>) -> ApiResult<(StatusCode, Json<Value>)> {
	let db = &state.db;
	let body = body.0;
	let input = parse_owner_body(&body)?;

	ensure_contact_unique(db, &input, None).await?;
	check_assignment(&scan_assignments(db).await?, None, &input.cars)?;
	ensure_cars_exist(db, &input.cars).await?;

	let owner_id = Uuid::new_v4();
	db.execute(
		"INSERT INTO car_owners (owner_id, name, email, phone, location, joined_date, status)
		 VALUES ($1, $2, $3, $4, $5, $6, $7)",
		&[&owner_id, &input.name, &input.email, &input.phone, &input.location, &input.joined_date, &input.status],
	)
	.await
	.map_err(|e| db_conflict(e, &input))?;

	let assign = db
		.execute(
			"INSERT INTO owner_cars (car_id, owner_id) SELECT unnest($1::uuid[]), $2",
			&[&input.cars, &owner_id],
		)
		.await;
	if let Err(e) = assign {
		// roll the fresh owner record back before reporting the collision
		let _ = db.execute("DELETE FROM car_owners WHERE owner_id = $1", &[&owner_id]).await;
		return Err(db_conflict(e, &input));
	}

	log::info!("created car owner {} with {} car(s)", owner_id, input.cars.len());
	Ok(created(populated_owner(db, owner_id).await?))
}

pub async fn update_owner(state: State<AppState>, Path(id): Path<String>, body: Json<Value>) -> ApiResult<(StatusCode, Json<Value>)> {
	let db = &state.db;
	let owner_id = parse_owner_id(&id)?;

	db.query_opt("SELECT owner_id FROM car_owners WHERE owner_id = $1", &[&owner_id])
		.await?
		.ok_or(ApiError::NotFound("Car owner"))?;

	let body = body.0;
	let input = parse_owner_body(&body)?;
	ensure_contact_unique(db, &input, Some(owner_id)).await?;
	check_assignment(&scan_assignments(db).await?, Some(owner_id), &input.cars)?;
	ensure_cars_exist(db, &input.cars).await?;

	db.execute(
		"UPDATE car_owners SET name = $2, email = $3, phone = $4, location = $5, joined_date = $6, status = $7
		 WHERE owner_id = $1",
		&[&owner_id, &input.name, &input.email, &input.phone, &input.location, &input.joined_date, &input.status],
	)
	.await
	.map_err(|e| db_conflict(e, &input))?;

	// Replace the car list: drop entries no longer kept, then claim the new
	// ones. DO NOTHING leaves a car with whoever holds it, so a post-write
	// count check detects a claim lost to a concurrent writer.
	db.execute(
		"DELETE FROM owner_cars WHERE owner_id = $1 AND NOT (car_id = ANY($2))",
		&[&owner_id, &input.cars],
	)
	.await?;
	db.execute(
		"INSERT INTO owner_cars (car_id, owner_id) SELECT unnest($2::uuid[]), $1 ON CONFLICT (car_id) DO NOTHING",
		&[&owner_id, &input.cars],
	)
	.await?;

	let held: i64 = db
		.query_opt("SELECT count(*) AS n FROM owner_cars WHERE owner_id = $1 AND car_id = ANY($2)", &[&owner_id, &input.cars])
		.await?
		.map(|r| r.get("n"))
		.unwrap_or(0);
	if held != input.cars.len() as i64 {
		let stolen = db
			.query_opt("SELECT car_id FROM owner_cars WHERE car_id = ANY($2) AND owner_id <> $1 LIMIT 1", &[&owner_id, &input.cars])
			.await?;
		let value = stolen.map(|r| r.get::<_, Uuid>("car_id").to_string()).unwrap_or_else(|| "unknown".to_string());
		log::warn!("owner {} lost a car claim to a concurrent writer: {}", owner_id, value);
		return Err(ApiError::conflict("car", value));
	}

	Ok(ok(populated_owner(db, owner_id).await?))
}

pub async fn delete_owner(state: State<AppState>, Path(id): Path<String>) -> ApiResult<(StatusCode, Json<Value>)> {
	let db = &state.db;
	let owner_id = parse_owner_id(&id)?;

	let removed = db.execute("DELETE FROM car_owners WHERE owner_id = $1", &[&owner_id]).await?;
	if removed == 0 {
		return Err(ApiError::NotFound("Car owner"));
	}
	// frees the cars for reassignment; car records themselves stay
	db.execute("DELETE FROM owner_cars WHERE owner_id = $1", &[&owner_id]).await?;

	log::info!("deleted car owner {}", owner_id);
	Ok(ok(json!({"id": owner_id})))
}

fn parse_owner_id(raw: &str) -> ApiResult<Uuid> {
	Uuid::parse_str(raw).map_err(|_| ApiError::validation("Invalid owner ID format"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn id(n: u128) -> Uuid {
		Uuid::from_u128(n)
	}

	#[test]
	fn empty_car_list_fails_validation() {
		let err = check_assignment(&[], None, &[]).unwrap_err();
		assert!(matches!(err, ApiError::Validation(_)));
	}

	#[test]
	fn unassigned_cars_pass_for_create() {
		let assigned = vec![(id(1), id(100))];
		assert!(check_assignment(&assigned, None, &[id(2), id(3)]).is_ok());
	}

	#[test]
	fn collision_with_another_owner_names_the_first_colliding_car() {
		// owner 100 holds C1 and C2; a new owner asks for [C3, C2]
		let assigned = vec![(id(1), id(100)), (id(2), id(100))];
		let err = check_assignment(&assigned, None, &[id(3), id(2)]).unwrap_err();
		match err {
			ApiError::Conflict { field, value } => {
				assert_eq!(field, "car");
				assert_eq!(value, id(2).to_string());
			}
			other => panic!("expected conflict, got {:?}", other),
		}
	}

	#[test]
	fn self_exclusion_lets_an_owner_keep_its_cars() {
		let assigned = vec![(id(1), id(100)), (id(2), id(100))];
		// unchanged list
		assert!(check_assignment(&assigned, Some(id(100)), &[id(1), id(2)]).is_ok());
		// grow the list while keeping existing cars
		assert!(check_assignment(&assigned, Some(id(100)), &[id(1), id(2), id(3)]).is_ok());
	}

	#[test]
	fn self_exclusion_still_blocks_other_owners_cars() {
		let assigned = vec![(id(1), id(100)), (id(2), id(200))];
		let err = check_assignment(&assigned, Some(id(100)), &[id(1), id(2)]).unwrap_err();
		assert!(matches!(err, ApiError::Conflict { .. }));
	}

	#[test]
	fn owner_sets_stay_disjoint_across_a_create_update_sequence() {
		// replay of the two-owner scenario: A takes [C1, C2]; B cannot take
		// [C2, C3]; A grows to [C1, C2, C3]; B cannot take [C3]
		let mut assigned: Vec<(Uuid, Uuid)> = Vec::new();
		let (a, b) = (id(100), id(200));

		check_assignment(&assigned, None, &[id(1), id(2)]).unwrap();
		assigned.extend([(id(1), a), (id(2), a)]);

		assert!(check_assignment(&assigned, None, &[id(2), id(3)]).is_err());

		check_assignment(&assigned, Some(a), &[id(1), id(2), id(3)]).unwrap();
		assigned.push((id(3), a));

		let err = check_assignment(&assigned, None, &[id(3)]).unwrap_err();
		match err {
			ApiError::Conflict { value, .. } => assert_eq!(value, id(3).to_string()),
			other => panic!("expected conflict, got {:?}", other),
		}
		assert_eq!(assigned.iter().filter(|(_, o)| *o == b).count(), 0);
	}

	#[test]
	fn owner_body_requires_contact_fields() {
		let body = json!({"name": "Jane", "email": "j@x.io", "cars": []});
		assert!(parse_owner_body(&body).is_err());
	}

	#[test]
	fn owner_body_rejects_malformed_car_ids() {
		let body = json!({
			"name": "Jane", "email": "J@X.IO", "phone": "0700", "location": "Nairobi",
			"joinedDate": "2024-05-01", "cars": ["not-a-uuid"]
		});
		let err = parse_owner_body(&body).unwrap_err();
		assert!(matches!(err, ApiError::Validation(_)));
	}

	#[test]
	fn owner_body_lowercases_email_and_dedups_cars() {
		let c = id(7).to_string();
		let body = json!({
			"name": "Jane", "email": "J@X.IO", "phone": "0700", "location": "Nairobi",
			"joinedDate": "2024-05-01", "status": "suspended", "cars": [c, c]
		});
		let input = parse_owner_body(&body).unwrap();
		assert_eq!(input.email, "j@x.io");
		assert_eq!(input.cars, vec![id(7)]);
		assert_eq!(input.status, "suspended");
	}

	#[test]
	fn owner_body_rejects_unknown_status() {
		let body = json!({
			"name": "Jane", "email": "j@x.io", "phone": "0700", "location": "Nairobi",
			"joinedDate": "2024-05-01", "status": "retired", "cars": [id(7).to_string()]
		});
		assert!(parse_owner_body(&body).is_err());
	}
}
