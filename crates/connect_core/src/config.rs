use url::Url;

use crate::error::BridgeError;

pub const DEFAULT_BASE_URL: &str = "https://connect.letsfuse.com";
pub const DEFAULT_RESERVED_SCHEME: &str = "fuse";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectConfig {
    base_url: Url,
    reserved_scheme: String,
}

impl ConnectConfig {
    pub fn new(base_url: &str, reserved_scheme: &str) -> Result<Self, BridgeError> {
        let base_url = parse_base_url(base_url)?;
        let reserved_scheme = reserved_scheme.trim().trim_end_matches("://");
        if reserved_scheme.is_empty() {
            return Err(BridgeError::EmptyScheme);
        }

        Ok(Self {
            base_url,
            reserved_scheme: reserved_scheme.to_ascii_lowercase(),
        })
    }

    pub fn hosted() -> Result<Self, BridgeError> {
        Self::new(DEFAULT_BASE_URL, DEFAULT_RESERVED_SCHEME)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, BridgeError> {
        Self::new(base_url, DEFAULT_RESERVED_SCHEME)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn reserved_scheme(&self) -> &str {
        &self.reserved_scheme
    }
}

fn parse_base_url(raw: &str) -> Result<Url, BridgeError> {
    let raw = raw.trim();
    let url = Url::parse(raw).map_err(|err| BridgeError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(BridgeError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    Ok(url)
}
