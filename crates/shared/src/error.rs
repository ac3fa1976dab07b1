use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const MALFORMED_EVENT_CODE: &str = "MALFORMED_EVENT";
pub const BRIDGE_ERROR_TYPE: &str = "BRIDGE_ERROR";
pub const ALTERNATE_PROVIDER_ERROR_TYPE: &str = "ALTERNATE_PROVIDER_ERROR";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorFamily {
    ApiError,
    AuthError,
    AssetReportError,
    Internal,
    InstitutionError,
    ItemError,
    InvalidInput,
    InvalidRequest,
    RateLimitExceeded,
    Unknown(String),
}

impl ErrorFamily {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ApiError => "API_ERROR",
            Self::AuthError => "AUTH_ERROR",
            Self::AssetReportError => "ASSET_REPORT_ERROR",
            Self::Internal => "INTERNAL",
            Self::InstitutionError => "INSTITUTION_ERROR",
            Self::ItemError => "ITEM_ERROR",
            Self::InvalidInput => "INVALID_INPUT",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::Unknown(raw) => raw,
        }
    }

    pub fn from_type_str(raw: &str) -> Self {
        match raw {
            "API_ERROR" => Self::ApiError,
            "AUTH_ERROR" => Self::AuthError,
            "ASSET_REPORT_ERROR" => Self::AssetReportError,
            "INTERNAL" => Self::Internal,
            "INSTITUTION_ERROR" => Self::InstitutionError,
            "ITEM_ERROR" => Self::ItemError,
            "INVALID_INPUT" => Self::InvalidInput,
            "INVALID_REQUEST" => Self::InvalidRequest,
            "RATE_LIMIT_EXCEEDED" => Self::RateLimitExceeded,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized error handed to the host inside an exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{error_type}/{error_code}")]
pub struct ConnectError {
    pub error_code: String,
    pub error_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_message: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ConnectError {
    pub fn new(family: ErrorFamily, error_code: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            error_type: family.as_str().to_string(),
            error_message: None,
            display_message: None,
            metadata: Map::new(),
        }
    }

    pub fn malformed_event(message: impl Into<String>) -> Self {
        Self {
            error_code: MALFORMED_EVENT_CODE.to_string(),
            error_type: BRIDGE_ERROR_TYPE.to_string(),
            error_message: Some(message.into()),
            display_message: None,
            metadata: Map::new(),
        }
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.error_message = message;
        self
    }

    pub fn with_display_message(mut self, message: Option<String>) -> Self {
        self.display_message = message;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn family(&self) -> ErrorFamily {
        ErrorFamily::from_type_str(&self.error_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_names_round_trip_through_wire_strings() {
        for family in [
            ErrorFamily::ApiError,
            ErrorFamily::AssetReportError,
            ErrorFamily::RateLimitExceeded,
            ErrorFamily::Internal,
        ] {
            assert_eq!(ErrorFamily::from_type_str(family.as_str()), family);
        }
        assert_eq!(
            ErrorFamily::from_type_str("SOMETHING_NEW"),
            ErrorFamily::Unknown("SOMETHING_NEW".into())
        );
    }

    #[test]
    fn connect_error_serializes_snake_case_and_skips_empty_messages() {
        let err = ConnectError::new(ErrorFamily::ItemError, "ITEM_LOCKED")
            .with_message(Some("locked".into()));
        let json = serde_json::to_value(&err).expect("json");

        assert_eq!(json["error_code"], "ITEM_LOCKED");
        assert_eq!(json["error_type"], "ITEM_ERROR");
        assert_eq!(json["error_message"], "locked");
        assert!(json.get("display_message").is_none());
        assert_eq!(err.family(), ErrorFamily::ItemError);
    }
}
