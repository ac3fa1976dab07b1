use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD},
    Engine as _,
};
use serde::{Deserialize, Serialize};
use shared::{
    domain::AuthorizationId,
    protocol::{ProviderData, PublicTokenEnvelope},
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedTokenInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_aggregators: Option<Vec<String>>,
}

impl DecodedTokenInfo {
    pub fn decode(link_token: &str) -> Option<Self> {
        let bytes = match decode_base64(link_token) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(error = %err, "link token is not base64; no fallback info");
                return None;
            }
        };

        match serde_json::from_slice::<Self>(&bytes) {
            Ok(info) => Some(info),
            Err(err) => {
                debug!(error = %err, "link token payload is not json; no fallback info");
                None
            }
        }
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback_aggregators
            .as_ref()
            .is_some_and(|aggregators| !aggregators.is_empty())
    }
}

#[derive(Debug, Error)]
pub enum TokenCodecError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid envelope json: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn encode_public_token(envelope: &PublicTokenEnvelope) -> Result<String, TokenCodecError> {
    let json = serde_json::to_vec(envelope)?;
    Ok(STANDARD.encode(json))
}

pub fn decode_public_token(token: &str) -> Result<PublicTokenEnvelope, TokenCodecError> {
    let bytes = decode_base64(token)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn plaid_public_token(
    session_client_secret: &str,
    public_token: &str,
) -> Result<String, TokenCodecError> {
    encode_public_token(&PublicTokenEnvelope {
        session_client_secret: session_client_secret.to_string(),
        data: ProviderData::Plaid {
            public_token: public_token.to_string(),
        },
    })
}

pub fn snaptrade_public_token(
    session_client_secret: &str,
    authorization_id: &AuthorizationId,
) -> Result<String, TokenCodecError> {
    encode_public_token(&PublicTokenEnvelope {
        session_client_secret: session_client_secret.to_string(),
        data: ProviderData::Snaptrade {
            brokerage_authorization_id: authorization_id.clone(),
        },
    })
}

fn decode_base64(raw: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let raw = raw.trim();
    STANDARD
        .decode(raw)
        .or_else(|_| STANDARD_NO_PAD.decode(raw.trim_end_matches('=')))
}
