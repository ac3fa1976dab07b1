use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    domain::{AuthorizationId, InstitutionId, ProviderKind},
    error::ConnectError,
};

pub const PARAM_EVENT_NAME: &str = "event_name";
pub const PARAM_PUBLIC_TOKEN: &str = "public_token";
pub const PARAM_INSTITUTION_ID: &str = "institution_id";
pub const PARAM_PLAID_LINK_TOKEN: &str = "plaid_link_token";
pub const PARAM_REDIRECT_URI: &str = "redirect_uri";
pub const PARAM_CLOSE_ON_EXIT: &str = "close_on_exit";
pub const PARAM_ERROR: &str = "error";
pub const PARAM_ERROR_TYPE: &str = "error_type";
pub const PARAM_ERROR_MESSAGE: &str = "error_message";

pub const PARAM_CLIENT_SECRET: &str = "client_secret";
pub const PARAM_WEBVIEW: &str = "webview";
pub const PARAM_LINK_TOKEN: &str = "link_token";
pub const PARAM_IS_FALL_BACK: &str = "is_fall_back";

pub const PATH_INTRO: &str = "/intro";
pub const PATH_BANK_LINK: &str = "/bank-link";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventName {
    OnSuccess,
    OnInstitutionSelected,
    OpenPlaid,
    OpenSnaptrade,
    OnExit,
    Unrecognized(String),
}

impl EventName {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "ON_SUCCESS" => Self::OnSuccess,
            "ON_INSTITUTION_SELECTED" => Self::OnInstitutionSelected,
            "OPEN_PLAID" => Self::OpenPlaid,
            "OPEN_SNAPTRADE" => Self::OpenSnaptrade,
            "ON_EXIT" => Self::OnExit,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::OnSuccess => "ON_SUCCESS",
            Self::OnInstitutionSelected => "ON_INSTITUTION_SELECTED",
            Self::OpenPlaid => "OPEN_PLAID",
            Self::OpenSnaptrade => "OPEN_SNAPTRADE",
            Self::OnExit => "ON_EXIT",
            Self::Unrecognized(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSuccess {
    pub public_token: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Exit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ConnectError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Exit {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn with_error(error: ConnectError) -> Self {
        Self {
            error: Some(error),
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderData {
    Plaid {
        public_token: String,
    },
    Snaptrade {
        brokerage_authorization_id: AuthorizationId,
    },
}

impl ProviderData {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Plaid { .. } => ProviderKind::Plaid,
            Self::Snaptrade { .. } => ProviderKind::Snaptrade,
        }
    }
}

/// JSON body that is base64-encoded into the public token handed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicTokenEnvelope {
    pub session_client_secret: String,
    pub data: ProviderData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum HostEvent {
    Event {
        name: String,
        params: BTreeMap<String, String>,
    },
    Success(LinkSuccess),
    SelectInstitution {
        institution_id: InstitutionId,
    },
    Exit(Exit),
}
