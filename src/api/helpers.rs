use axum::extract::rejection::JsonRejection;
use axum::Json;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::api::error::ApiError;

/// Unwraps a JSON body, turning axum's rejection into our 400 body shape.
pub fn json_body(body: Result<Json<serde_json::Value>, JsonRejection>) -> Result<serde_json::Value, ApiError> {
    match body {
        Ok(Json(v)) if v.is_object() => Ok(v),
        Ok(_) => Err(ApiError::validation("request body must be a JSON object")),
        Err(rejection) => Err(ApiError::validation(rejection.body_text())),
    }
}

/// Non-empty string field. Anything else counts as missing.
pub fn get_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Identifier fields clients send either as strings or as bare numbers.
pub fn get_str_or_number(params: &serde_json::Value, key: &str) -> Option<String> {
    match params.get(key)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn millis_to_rfc3339(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn str_or_number_normalizes() {
        let p = json!({ "a": " 12 ", "b": 12, "c": "", "d": null, "e": true });
        assert_eq!(get_str_or_number(&p, "a").as_deref(), Some("12"));
        assert_eq!(get_str_or_number(&p, "b").as_deref(), Some("12"));
        assert_eq!(get_str_or_number(&p, "c"), None);
        assert_eq!(get_str_or_number(&p, "d"), None);
        assert_eq!(get_str_or_number(&p, "e"), None);
        assert_eq!(get_str_or_number(&p, "missing"), None);
    }

    #[test]
    fn empty_strings_are_missing() {
        let p = json!({ "name": "", "email": "t@x.com", "n": 3 });
        assert_eq!(get_str(&p, "name"), None);
        assert_eq!(get_str(&p, "email").as_deref(), Some("t@x.com"));
        assert_eq!(get_str(&p, "n"), None);
    }

    #[test]
    fn millis_render_as_utc() {
        assert_eq!(millis_to_rfc3339(0), "1970-01-01T00:00:00.000Z");
    }
}
