use axum::{
	response::{IntoResponse, Response},
	Json,
};
use hyper::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;

/// Error taxonomy shared by every handler. Each variant carries the message
/// that ends up in the `error` field of the response envelope.
#[derive(Error, Debug)]
pub enum ApiError {
	#[error("{0}")]
	Validation(String),

	#[error("{field} '{value}' is already taken")]
	Conflict { field: String, value: String },

	#[error("{0} not found")]
	NotFound(&'static str),

	#[error("upstream error: {0}")]
	Upstream(String),

	#[error("Internal server error")]
	Internal,
}

impl ApiError {
	pub fn validation(msg: impl Into<String>) -> Self {
		ApiError::Validation(msg.into())
	}

	pub fn conflict(field: impl Into<String>, value: impl ToString) -> Self {
		ApiError::Conflict { field: field.into(), value: value.to_string() }
	}

	fn status(&self) -> StatusCode {
		match self {
			ApiError::Validation(_) => StatusCode::BAD_REQUEST,
			ApiError::Conflict { .. } => StatusCode::CONFLICT,
			ApiError::NotFound(_) => StatusCode::NOT_FOUND,
			ApiError::Upstream(_) | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		(self.status(), Json(json!({"success": false, "error": self.to_string()}))).into_response()
	}
}

impl From<tokio_postgres::Error> for ApiError {
	fn from(e: tokio_postgres::Error) -> Self {
		log::error!("database error: {}", e);
		ApiError::Internal
	}
}

pub type ApiResult<T> = Result<T, ApiError>;

pub fn ok(data: Value) -> (StatusCode, Json<Value>) {
	(StatusCode::OK, Json(json!({"success": true, "data": data})))
}

pub fn created(data: Value) -> (StatusCode, Json<Value>) {
	(StatusCode::CREATED, Json(json!({"success": true, "data": data})))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_codes_follow_the_taxonomy() {
		assert_eq!(ApiError::validation("bad").status(), StatusCode::BAD_REQUEST);
		assert_eq!(ApiError::conflict("email", "a@b.c").status(), StatusCode::CONFLICT);
		assert_eq!(ApiError::NotFound("Car").status(), StatusCode::NOT_FOUND);
		assert_eq!(ApiError::Upstream("store down".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(ApiError::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
	}

	#[test]
	fn conflict_message_names_field_and_value() {
		let e = ApiError::conflict("regestrationNumber", "KAA 001A");
		assert_eq!(e.to_string(), "regestrationNumber 'KAA 001A' is already taken");
	}

	#[test]
	fn internal_error_does_not_leak_details() {
		assert_eq!(ApiError::Internal.to_string(), "Internal server error");
	}
}
