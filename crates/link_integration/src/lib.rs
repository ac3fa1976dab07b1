use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::error::ErrorFamily;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresentationContext {
    surface_id: String,
}

impl PresentationContext {
    pub fn new(surface_id: impl Into<String>) -> Self {
        Self {
            surface_id: surface_id.into(),
        }
    }

    pub fn surface_id(&self) -> &str {
        &self.surface_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkErrorCode {
    ApiError(String),
    AuthError(String),
    AssetReportError(String),
    /// The SDK's internal failures carry a message, not a code.
    Internal(String),
    InstitutionError(String),
    ItemError(String),
    InvalidInput(String),
    InvalidRequest(String),
    RateLimitExceeded(String),
    Unknown {
        error_type: String,
        error_code: String,
    },
}

impl LinkErrorCode {
    pub fn family(&self) -> ErrorFamily {
        match self {
            Self::ApiError(_) => ErrorFamily::ApiError,
            Self::AuthError(_) => ErrorFamily::AuthError,
            Self::AssetReportError(_) => ErrorFamily::AssetReportError,
            Self::Internal(_) => ErrorFamily::Internal,
            Self::InstitutionError(_) => ErrorFamily::InstitutionError,
            Self::ItemError(_) => ErrorFamily::ItemError,
            Self::InvalidInput(_) => ErrorFamily::InvalidInput,
            Self::InvalidRequest(_) => ErrorFamily::InvalidRequest,
            Self::RateLimitExceeded(_) => ErrorFamily::RateLimitExceeded,
            Self::Unknown { error_type, .. } => ErrorFamily::Unknown(error_type.clone()),
        }
    }

    /// Wire code; empty for `Internal`.
    pub fn code(&self) -> &str {
        match self {
            Self::ApiError(code)
            | Self::AuthError(code)
            | Self::AssetReportError(code)
            | Self::InstitutionError(code)
            | Self::ItemError(code)
            | Self::InvalidInput(code)
            | Self::InvalidRequest(code)
            | Self::RateLimitExceeded(code) => code,
            Self::Internal(_) => "",
            Self::Unknown { error_code, .. } => error_code,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkError {
    pub error_code: LinkErrorCode,
    pub error_message: Option<String>,
    pub display_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkOutcome {
    Success {
        public_token: String,
        metadata: Value,
    },
    Exit {
        error: Option<LinkError>,
        metadata: Value,
    },
}

pub type OutcomeCallback = Box<dyn Fn(LinkOutcome) + Send + Sync>;
pub type MessageCallback = Box<dyn Fn(String) + Send + Sync>;

pub struct LinkTokenConfiguration {
    pub token: String,
    pub on_outcome: OutcomeCallback,
}

#[derive(Debug, Error)]
pub enum LinkSdkError {
    #[error("link sdk rejected configuration: {0}")]
    Configuration(String),
    #[error("link sdk failed to open: {0}")]
    Open(String),
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("surface could not be presented: {0}")]
    Presentation(String),
}

pub trait LinkHandle: Send {
    fn open(&mut self, presentation: &PresentationContext) -> Result<(), LinkSdkError>;
}

pub trait LinkSdk: Send {
    fn create(
        &self,
        configuration: LinkTokenConfiguration,
    ) -> Result<Box<dyn LinkHandle>, LinkSdkError>;
}

pub trait AlternateSurface: Send {
    fn present(
        &mut self,
        redirect_uri: &Url,
        presentation: &PresentationContext,
        on_message: MessageCallback,
    ) -> Result<(), SurfaceError>;
    fn dismiss(&mut self);
}

pub trait WebSurface: Send {
    fn load(&mut self, url: &Url);
}
