use link_integration::{LinkSdkError, SurfaceError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("reserved scheme must not be empty")]
    EmptyScheme,
    #[error("missing required parameter `{param}` for {event}")]
    MissingParameter { event: String, param: &'static str },
    #[error("invalid redirect uri '{uri}' for {event}")]
    InvalidRedirectUri { event: String, uri: String },
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("unable to create link handler: {0}")]
    Sdk(#[from] LinkSdkError),
    #[error("unable to present alternate provider: {0}")]
    Surface(#[from] SurfaceError),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("connect controller is no longer running")]
    Closed,
    #[error("connect controller dropped the navigation reply")]
    ReplyDropped,
}
