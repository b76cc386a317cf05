use axum::{
	extract::{Multipart, Path, State},
	Json,
};
use hyper::StatusCode;
use postgres_from_row::FromRow;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
	error::{created, ok, ApiError, ApiResult},
	AppState,
};

const CATEGORY_COLS: &str = "category_id, title, description, price_from, features, popular, image";

#[derive(serde::Serialize, serde::Deserialize, FromRow)]
pub struct CarCategory {
	#[serde(rename = "id")]
	pub category_id: Uuid,
	pub title: String,
	pub description: String,
	#[serde(rename = "priceFrom")]
	pub price_from: String,
	pub features: Vec<String>,
	pub popular: bool,
	pub image: String,
}

#[derive(Default)]
pub struct CategoryForm {
	pub title: String,
	pub description: String,
	pub price_from: String,
	pub features: Vec<String>,
	pub popular: bool,
	pub image: Option<Vec<u8>>,
}

impl CategoryForm {
	pub fn validate(self) -> ApiResult<CategoryForm> {
		for (field, value) in [("title", &self.title), ("description", &self.description), ("priceFrom", &self.price_from)] {
			if value.trim().is_empty() {
				return Err(ApiError::validation(format!("Missing required field: {}", field)));
			}
		}
		if self.features.is_empty() {
			return Err(ApiError::validation("At least one feature is required"));
		}
		Ok(self)
	}
}

async fn read_category_form(multipart: &mut Multipart) -> ApiResult<CategoryForm> {
	let mut form = CategoryForm::default();
	while let Some(field) = multipart
		.next_field()
		.await
		.map_err(|e| ApiError::validation(format!("Invalid multipart payload: {}", e)))?
	{
		let name = field.name().unwrap_or_default().to_string();
		match name.as_str() {
			"title" => form.title = field_text(field).await?,
			"description" => form.description = field_text(field).await?,
			"priceFrom" => form.price_from = field_text(field).await?,
			"popular" => form.popular = field_text(field).await?.parse().unwrap_or(false),
			"features" => {
				let feature = field_text(field).await?;
				if !feature.is_empty() && !form.features.contains(&feature) {
					form.features.push(feature);
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

pub async fn create_category(state: State<AppState>, mut multipart: Multipart) -> ApiResult<(StatusCode, Json<Value>)> {
	let form = read_category_form(&mut multipart).await?.validate()?;
	let image_bytes = form.image.as_deref().ok_or_else(|| ApiError::validation("Image is required"))?;
	let image_url = state.images.put_with_retry("categories", image_bytes).await?;

	let category_id = Uuid::new_v4();
	state
		.db
		.execute(
			"INSERT INTO car_categories (category_id, title, description, price_from, features, popular, image)
			 VALUES ($1, $2, $3, $4, $5, $6, $7)",
			&[&category_id, &form.title, &form.description, &form.price_from, &form.features, &form.popular, &image_url],
		)
		.await?;

	log::info!("created category '{}' ({})", form.title, category_id);
	Ok(created(fetch_category_json(&state, category_id).await?))
}

pub async fn get_categories(state: State<AppState>) -> ApiResult<(StatusCode, Json<Value>)> {
	let q = format!("SELECT {} FROM car_categories ORDER BY created_at DESC", CATEGORY_COLS);
	let rows = state.db.query(q.as_str(), &[]).await?;
	let categories: Vec<CarCategory> = rows.iter().map(CarCategory::from_row).collect();
	Ok(ok(serde_json::to_value(categories).map_err(|_| ApiError::Internal)?))
}

pub async fn get_category(state: State<AppState>, Path(id): Path<String>) -> ApiResult<(StatusCode, Json<Value>)> {
	let category_id = parse_category_id(&id)?;
	Ok(ok(fetch_category_json(&state, category_id).await?))
}

pub async fn update_category(state: State<AppState>, Path(id): Path<String>, mut multipart: Multipart) -> ApiResult<(StatusCode, Json<Value>)> {
	let category_id = parse_category_id(&id)?;
	let form = read_category_form(&mut multipart).await?.validate()?;

	let existing = state
		.db
		.query_opt("SELECT image FROM car_categories WHERE category_id = $1", &[&category_id])
		.await?
		.ok_or(ApiError::NotFound("Category"))?;

	let image_url = match form.image.as_deref() {
		Some(bytes) => state.images.put_with_retry("categories", bytes).await?,
		None => existing.get("image"),
	};

	state
		.db
		.execute(
			"UPDATE car_categories SET title = $2, description = $3, price_from = $4, features = $5, popular = $6, image = $7
			 WHERE category_id = $1",
			&[&category_id, &form.title, &form.description, &form.price_from, &form.features, &form.popular, &image_url],
		)
		.await?;

	Ok(ok(fetch_category_json(&state, category_id).await?))
}

pub async fn delete_category(state: State<AppState>, Path(id): Path<String>) -> ApiResult<(StatusCode, Json<Value>)> {
	let category_id = parse_category_id(&id)?;
	let removed = state
		.db
		.execute("DELETE FROM car_categories WHERE category_id = $1", &[&category_id])
		.await?;
	if removed == 0 {
		return Err(ApiError::NotFound("Category"));
	}
	Ok(ok(json!({"id": category_id})))
}

async fn fetch_category_json(state: &AppState, category_id: Uuid) -> ApiResult<Value> {
	let q = format!("SELECT {} FROM car_categories WHERE category_id = $1", CATEGORY_COLS);
	let row = state
		.db
		.query_opt(q.as_str(), &[&category_id])
		.await?
		.ok_or(ApiError::NotFound("Category"))?;
	serde_json::to_value(CarCategory::from_row(&row)).map_err(|_| ApiError::Internal)
}

fn parse_category_id(raw: &str) -> ApiResult<Uuid> {
	Uuid::parse_str(raw).map_err(|_| ApiError::validation("Invalid category ID format"))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn filled() -> CategoryForm {
		CategoryForm {
			title: "SUV".into(),
			description: "Sport utility".into(),
			price_from: "From KES 8,000/day".into(),
			features: vec!["4WD".into()],
			popular: true,
			image: Some(vec![0]),
		}
	}

	#[test]
	fn a_complete_category_form_validates() {
		assert!(filled().validate().is_ok());
	}

	#[test]
	fn features_must_be_non_empty() {
		let mut form = filled();
		form.features.clear();
		assert!(form.validate().is_err());
	}

	#[test]
	fn title_is_required() {
		let mut form = filled();
		form.title = " ".into();
		assert!(form.validate().is_err());
	}
}
