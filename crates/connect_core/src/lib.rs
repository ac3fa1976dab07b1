use link_integration::LinkOutcome;
use serde::Serialize;
use serde_json::Map;
use shared::{
    domain::Conclusion,
    error::{ConnectError, ErrorFamily, ALTERNATE_PROVIDER_ERROR_TYPE, BRIDGE_ERROR_TYPE},
    protocol::{
        EventName, Exit, HostEvent, LinkSuccess, PARAM_CLOSE_ON_EXIT, PARAM_ERROR,
        PARAM_ERROR_MESSAGE, PARAM_ERROR_TYPE, PARAM_EVENT_NAME, PARAM_INSTITUTION_ID,
        PARAM_PLAID_LINK_TOKEN, PARAM_PUBLIC_TOKEN, PARAM_REDIRECT_URI,
    },
};
use tracing::{debug, error, info, warn};
use url::Url;

pub mod alternate;
pub mod config;
pub mod error;
pub mod launcher;
pub mod query;
pub mod redirect;
pub mod runtime;
pub mod session;
pub mod token;

pub use alternate::AlternateMessage;
pub use config::ConnectConfig;
pub use error::{BridgeError, ControllerError, LaunchError};
pub use query::{parse_query, QueryParams};
pub use redirect::RedirectBuilder;
pub use runtime::{BridgeCommand, BridgeHandle, Collaborators, ConnectController, ConnectHost};
pub use session::SessionState;
pub use token::DecodedTokenInfo;

use crate::token::TokenCodecError;

const PUBLIC_TOKEN_ENCODING_CODE: &str = "PUBLIC_TOKEN_ENCODING";
const UNKNOWN_CODE: &str = "UNKNOWN";
const PLAID_METADATA_KEY: &str = "plaid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationPolicy {
    Allow,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ExternalLaunch {
    Link {
        link_token: String,
        close_on_exit: bool,
    },
    Alternate {
        redirect_uri: Url,
        close_on_exit: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum BridgeAction {
    Host(HostEvent),
    Load(Url),
    Launch(ExternalLaunch),
    DismissAlternate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationDecision {
    pub policy: NavigationPolicy,
    pub actions: Vec<BridgeAction>,
}

impl NavigationDecision {
    fn allow() -> Self {
        Self {
            policy: NavigationPolicy::Allow,
            actions: Vec::new(),
        }
    }

    fn cancel(actions: Vec<BridgeAction>) -> Self {
        Self {
            policy: NavigationPolicy::Cancel,
            actions,
        }
    }
}

/// Every input returns the actions it produced for the owner to apply.
#[derive(Debug, Clone)]
pub struct ConnectBridge {
    config: ConnectConfig,
    redirects: RedirectBuilder,
    client_secret: String,
    session: SessionState,
}

impl ConnectBridge {
    pub fn new(config: ConnectConfig, client_secret: impl Into<String>) -> Self {
        let redirects = RedirectBuilder::new(config.base_url().clone());
        Self {
            config,
            redirects,
            client_secret: client_secret.into(),
            session: SessionState::new(),
        }
    }

    pub fn config(&self) -> &ConnectConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn start(&mut self) -> Vec<BridgeAction> {
        self.session = SessionState::new();
        info!(attempt_id = %self.session.attempt_id(), "starting connect attempt");
        vec![BridgeAction::Load(self.redirects.intro(&self.client_secret))]
    }

    pub fn handle_navigation(&mut self, url: &str) -> NavigationDecision {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(err) if self.has_reserved_scheme(url) => {
                warn!(
                    attempt_id = %self.session.attempt_id(),
                    error = %err,
                    "unparseable reserved-scheme request"
                );
                return NavigationDecision::cancel(Vec::new());
            }
            Err(_) => return NavigationDecision::allow(),
        };
        if !parsed
            .scheme()
            .eq_ignore_ascii_case(self.config.reserved_scheme())
        {
            return NavigationDecision::allow();
        }

        let params = query::query_of(&parsed);
        let Some(raw_name) = params.get(PARAM_EVENT_NAME) else {
            debug!(attempt_id = %self.session.attempt_id(), "reserved-scheme request without event_name");
            return NavigationDecision::cancel(Vec::new());
        };

        let event = EventName::parse(raw_name);
        info!(
            attempt_id = %self.session.attempt_id(),
            event = event.as_str(),
            "bridge event"
        );

        let mut actions = vec![BridgeAction::Host(HostEvent::Event {
            name: event.as_str().to_string(),
            params: params.to_sorted_map(),
        })];

        match self.dispatch(&event, &params) {
            Ok(dispatched) => actions.extend(dispatched),
            Err(err) => {
                error!(
                    attempt_id = %self.session.attempt_id(),
                    event = event.as_str(),
                    error = %err,
                    "malformed bridge event"
                );
                actions.extend(
                    self.surface_exit(Exit::with_error(ConnectError::malformed_event(
                        err.to_string(),
                    ))),
                );
            }
        }

        NavigationDecision::cancel(actions)
    }

    fn has_reserved_scheme(&self, raw: &str) -> bool {
        raw.trim_start()
            .split_once(':')
            .is_some_and(|(scheme, _)| scheme.eq_ignore_ascii_case(self.config.reserved_scheme()))
    }

    fn dispatch(
        &mut self,
        event: &EventName,
        params: &QueryParams,
    ) -> Result<Vec<BridgeAction>, BridgeError> {
        match event {
            EventName::OnSuccess => {
                let public_token = required(event, params, PARAM_PUBLIC_TOKEN)?;
                Ok(self.surface_success(public_token.to_string()))
            }
            EventName::OnInstitutionSelected => {
                let institution_id = required(event, params, PARAM_INSTITUTION_ID)?;
                Ok(vec![BridgeAction::Host(HostEvent::SelectInstitution {
                    institution_id: institution_id.into(),
                })])
            }
            EventName::OpenPlaid => {
                let link_token = required(event, params, PARAM_PLAID_LINK_TOKEN)?;
                Ok(vec![BridgeAction::Launch(ExternalLaunch::Link {
                    link_token: link_token.to_string(),
                    close_on_exit: params.flag(PARAM_CLOSE_ON_EXIT),
                })])
            }
            EventName::OpenSnaptrade => {
                let raw_uri = required(event, params, PARAM_REDIRECT_URI)?;
                let redirect_uri =
                    Url::parse(raw_uri).map_err(|_| BridgeError::InvalidRedirectUri {
                        event: event.as_str().to_string(),
                        uri: raw_uri.to_string(),
                    })?;
                Ok(vec![BridgeAction::Launch(ExternalLaunch::Alternate {
                    redirect_uri,
                    close_on_exit: params.flag(PARAM_CLOSE_ON_EXIT),
                })])
            }
            EventName::OnExit => Ok(self.resolve_exit(params)),
            EventName::Unrecognized(name) => {
                debug!(event = %name, "ignoring unrecognized bridge event");
                Ok(Vec::new())
            }
        }
    }

    fn resolve_exit(&mut self, params: &QueryParams) -> Vec<BridgeAction> {
        let exit = if let Some(stored) = self.session.last_error.clone() {
            Exit::with_error(stored)
        } else if let Some(code) = params.get(PARAM_ERROR) {
            let family = params
                .get(PARAM_ERROR_TYPE)
                .map(ErrorFamily::from_type_str)
                .unwrap_or_else(|| ErrorFamily::Unknown(UNKNOWN_CODE.to_string()));
            let error = ConnectError::new(family, code)
                .with_message(params.get(PARAM_ERROR_MESSAGE).map(str::to_string));
            Exit {
                error: Some(error),
                metadata: Some(Map::new()),
            }
        } else {
            Exit::clean()
        };

        self.surface_exit(exit)
    }

    pub fn continue_with_link_token(&mut self, link_token: &str) -> Vec<BridgeAction> {
        if self.session.is_concluded() {
            warn!(attempt_id = %self.session.attempt_id(), "link token received after attempt concluded");
            return Vec::new();
        }

        self.session.remember_link_token(link_token);
        debug!(
            attempt_id = %self.session.attempt_id(),
            has_fallback = self
                .session
                .last_token_info
                .as_ref()
                .is_some_and(DecodedTokenInfo::has_fallback),
            "stored link token"
        );
        vec![BridgeAction::Load(self.redirects.bank_link(link_token, false))]
    }

    pub fn handle_link_outcome(
        &mut self,
        outcome: LinkOutcome,
        close_on_exit: bool,
    ) -> Vec<BridgeAction> {
        match outcome {
            LinkOutcome::Success { public_token, .. } => {
                info!(attempt_id = %self.session.attempt_id(), "link sdk succeeded");
                match token::plaid_public_token(&self.client_secret, &public_token) {
                    Ok(surrogate) => self.surface_success(surrogate),
                    Err(err) => self.surface_encoding_failure(err),
                }
            }
            LinkOutcome::Exit {
                error: Some(link_error),
                metadata,
            } => {
                let normalized = launcher::normalize_link_error(link_error)
                    .with_metadata(PLAID_METADATA_KEY, metadata);
                warn!(
                    attempt_id = %self.session.attempt_id(),
                    error_code = %normalized.error_code,
                    error_type = %normalized.error_type,
                    "link sdk exited with error"
                );
                self.session.last_error = Some(normalized);

                if let Some(link_token) = self.session.fallback_retry_token() {
                    info!(attempt_id = %self.session.attempt_id(), "retrying with fallback aggregator");
                    return vec![BridgeAction::Load(self.redirects.bank_link(link_token, true))];
                }

                self.exit_if_closing(close_on_exit)
            }
            LinkOutcome::Exit { error: None, .. } => {
                debug!(attempt_id = %self.session.attempt_id(), close_on_exit, "link sdk exited");
                self.exit_if_closing(close_on_exit)
            }
        }
    }

    pub fn handle_alternate_message(
        &mut self,
        message: &str,
        close_on_exit: bool,
    ) -> Vec<BridgeAction> {
        let Some(parsed) = AlternateMessage::parse(message) else {
            debug!("ignoring alternate provider message");
            return Vec::new();
        };

        match parsed {
            AlternateMessage::Success { authorization_id } => {
                info!(attempt_id = %self.session.attempt_id(), "alternate provider authorized");
                let mut actions = vec![BridgeAction::DismissAlternate];
                match token::snaptrade_public_token(&self.client_secret, &authorization_id) {
                    Ok(surrogate) => actions.extend(self.surface_success(surrogate)),
                    Err(err) => actions.extend(self.surface_encoding_failure(err)),
                }
                actions
            }
            AlternateMessage::Abandoned => {
                info!(attempt_id = %self.session.attempt_id(), close_on_exit, "alternate provider abandoned");
                let mut actions = vec![BridgeAction::DismissAlternate];
                actions.extend(self.exit_if_closing(close_on_exit));
                actions
            }
            AlternateMessage::Error { id } => {
                warn!(
                    attempt_id = %self.session.attempt_id(),
                    id = id.as_deref().unwrap_or_default(),
                    "alternate provider reported an error"
                );
                let error = ConnectError::new(
                    ErrorFamily::Unknown(ALTERNATE_PROVIDER_ERROR_TYPE.to_string()),
                    id.unwrap_or_else(|| UNKNOWN_CODE.to_string()),
                )
                .with_message(Some(message.to_string()));
                self.session.last_error = Some(error);
                Vec::new()
            }
        }
    }

    fn exit_if_closing(&mut self, close_on_exit: bool) -> Vec<BridgeAction> {
        if !close_on_exit {
            return Vec::new();
        }
        let exit = Exit {
            error: self.session.last_error.clone(),
            metadata: None,
        };
        self.surface_exit(exit)
    }

    fn surface_success(&mut self, public_token: String) -> Vec<BridgeAction> {
        if !self.session.conclude(Conclusion::Succeeded) {
            warn!(attempt_id = %self.session.attempt_id(), "dropping success for concluded attempt");
            return Vec::new();
        }
        vec![BridgeAction::Host(HostEvent::Success(LinkSuccess {
            public_token,
        }))]
    }

    fn surface_exit(&mut self, exit: Exit) -> Vec<BridgeAction> {
        if !self.session.conclude(Conclusion::Exited) {
            warn!(attempt_id = %self.session.attempt_id(), "dropping exit for concluded attempt");
            return Vec::new();
        }
        info!(
            attempt_id = %self.session.attempt_id(),
            error_code = exit.error.as_ref().map(|e| e.error_code.as_str()).unwrap_or_default(),
            "surfacing exit"
        );
        vec![BridgeAction::Host(HostEvent::Exit(exit))]
    }

    fn surface_encoding_failure(&mut self, err: TokenCodecError) -> Vec<BridgeAction> {
        error!(error = %err, "failed to encode public token");
        let error = ConnectError::new(
            ErrorFamily::Unknown(BRIDGE_ERROR_TYPE.to_string()),
            PUBLIC_TOKEN_ENCODING_CODE,
        )
        .with_message(Some(err.to_string()));
        self.surface_exit(Exit::with_error(error))
    }
}

fn required<'a>(
    event: &EventName,
    params: &'a QueryParams,
    param: &'static str,
) -> Result<&'a str, BridgeError> {
    params
        .get(param)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| BridgeError::MissingParameter {
            event: event.as_str().to_string(),
            param,
        })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
