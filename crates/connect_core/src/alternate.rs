use shared::domain::AuthorizationId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlternateMessage {
    Success { authorization_id: AuthorizationId },
    Abandoned,
    Error { id: Option<String> },
}

impl AlternateMessage {
    pub fn parse(message: &str) -> Option<Self> {
        if message.contains("SUCCESS") {
            Some(Self::Success {
                authorization_id: AuthorizationId(suffix(message).unwrap_or_default().to_string()),
            })
        } else if message.contains("ABANDONED") {
            Some(Self::Abandoned)
        } else if message.contains("ERROR") {
            Some(Self::Error {
                id: suffix(message)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string),
            })
        } else {
            None
        }
    }
}

fn suffix(message: &str) -> Option<&str> {
    message.split_once(':').map(|(_, rest)| rest.trim())
}
