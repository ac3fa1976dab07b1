use shared::{domain::Conclusion, error::ConnectError};
use uuid::Uuid;

use crate::token::DecodedTokenInfo;

/// Codes for which the flow retries through a fallback aggregator.
pub const RETRYABLE_ERROR_CODES: &[&str] = &[
    "INSTITUTION_DOWN",
    "INSTITUTION_NO_LONGER_SUPPORTED",
    "INSTITUTION_NOT_AVAILABLE",
    "INSTITUTION_NOT_ENABLED_IN_ENVIRONMENT",
    "INSTITUTION_NOT_FOUND",
    "INSTITUTION_NOT_RESPONDING",
    "INSTITUTION_REGISTRATION_REQUIRED",
    "UNAUTHORIZED_INSTITUTION",
    "INTERNAL_SERVER_ERROR",
    "INVALID_SEND_METHOD",
    "ITEM_LOCKED",
    "ITEM_NOT_SUPPORTED",
    "MFA_NOT_SUPPORTED",
    "NO_ACCOUNTS",
    "USER_INPUT_TIMEOUT",
    "USER_SETUP_REQUIRED",
];

pub fn is_retryable(error_code: &str) -> bool {
    RETRYABLE_ERROR_CODES.contains(&error_code)
}

#[derive(Debug, Clone)]
pub struct SessionState {
    attempt_id: Uuid,
    pub last_error: Option<ConnectError>,
    pub last_token_info: Option<DecodedTokenInfo>,
    pub last_link_token: Option<String>,
    concluded: Option<Conclusion>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            last_error: None,
            last_token_info: None,
            last_link_token: None,
            concluded: None,
        }
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn concluded(&self) -> Option<Conclusion> {
        self.concluded
    }

    pub fn is_concluded(&self) -> bool {
        self.concluded.is_some()
    }

    /// Marks the attempt finished; returns `false` if it already was.
    pub fn conclude(&mut self, conclusion: Conclusion) -> bool {
        if self.concluded.is_some() {
            return false;
        }
        self.concluded = Some(conclusion);
        true
    }

    pub fn remember_link_token(&mut self, link_token: &str) {
        self.last_token_info = DecodedTokenInfo::decode(link_token);
        self.last_link_token = Some(link_token.to_string());
    }

    pub fn fallback_retry_token(&self) -> Option<&str> {
        if self.is_concluded() {
            return None;
        }
        let error = self.last_error.as_ref()?;
        if !is_retryable(&error.error_code) {
            return None;
        }
        if !self
            .last_token_info
            .as_ref()
            .is_some_and(DecodedTokenInfo::has_fallback)
        {
            return None;
        }
        self.last_link_token.as_deref()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
