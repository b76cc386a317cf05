use chrono::NaiveDate;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};

/// Field pickers for `Json<Value>` bodies, so a missing or malformed field
/// comes back through the regular error envelope.

pub fn req_str(body: &Value, key: &str) -> ApiResult<String> {
	match body.get(key).and_then(Value::as_str).map(str::trim) {
		Some(s) if !s.is_empty() => Ok(s.to_string()),
		_ => Err(ApiError::validation(format!("Missing required field: {}", key))),
	}
}

pub fn opt_str(body: &Value, key: &str) -> Option<String> {
	body.get(key).and_then(Value::as_str).map(|s| s.trim().to_string())
}

pub fn req_f64(body: &Value, key: &str) -> ApiResult<f64> {
	body.get(key)
		.and_then(Value::as_f64)
		.ok_or_else(|| ApiError::validation(format!("Missing required field: {}", key)))
}

pub fn req_date(body: &Value, key: &str) -> ApiResult<NaiveDate> {
	let raw = req_str(body, key)?;
	parse_date(&raw).ok_or_else(|| ApiError::validation(format!("Invalid date in field: {}", key)))
}

pub fn opt_date(body: &Value, key: &str) -> ApiResult<Option<NaiveDate>> {
	match body.get(key).and_then(Value::as_str) {
		None => Ok(None),
		Some(raw) => parse_date(raw)
			.map(Some)
			.ok_or_else(|| ApiError::validation(format!("Invalid date in field: {}", key))),
	}
}

// accepts plain dates and the datetime strings the dashboard sends
fn parse_date(raw: &str) -> Option<NaiveDate> {
	let raw = raw.trim();
	if let Ok(d) = raw.parse::<NaiveDate>() {
		return Some(d);
	}
	raw.get(..10).and_then(|d| d.parse::<NaiveDate>().ok())
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn required_string_rejects_blank_and_missing() {
		let body = json!({"name": "  ", "ok": "x"});
		assert!(req_str(&body, "name").is_err());
		assert!(req_str(&body, "missing").is_err());
		assert_eq!(req_str(&body, "ok").unwrap(), "x");
	}

	#[test]
	fn dates_parse_with_and_without_time() {
		let body = json!({"a": "2025-01-10", "b": "2025-01-10T09:30:00.000Z", "c": "junk"});
		assert_eq!(req_date(&body, "a").unwrap().to_string(), "2025-01-10");
		assert_eq!(req_date(&body, "b").unwrap().to_string(), "2025-01-10");
		assert!(req_date(&body, "c").is_err());
		assert!(opt_date(&body, "missing").unwrap().is_none());
	}
}
