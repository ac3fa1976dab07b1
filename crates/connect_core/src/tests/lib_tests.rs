use super::*;
use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use link_integration::{
    AlternateSurface, LinkError, LinkErrorCode, LinkHandle, LinkSdk, LinkSdkError,
    LinkTokenConfiguration, MessageCallback, PresentationContext, SurfaceError,
};
use serde_json::json;
use shared::protocol::{ProviderData, PublicTokenEnvelope};

use crate::launcher::{normalize_link_error, AlternateLauncher, LinkLauncher};

fn bridge() -> ConnectBridge {
    let config = ConnectConfig::with_base_url("https://connect.example").expect("config");
    let mut bridge = ConnectBridge::new(config, "abc");
    bridge.start();
    bridge
}

fn fallback_token() -> String {
    STANDARD.encode(r#"{"fallback_aggregators":["mx"]}"#)
}

fn plain_token() -> String {
    STANDARD.encode(r#"{"fallback_aggregators":[]}"#)
}

fn sdk_exit(code: LinkErrorCode) -> LinkOutcome {
    LinkOutcome::Exit {
        error: Some(LinkError {
            error_code: code,
            error_message: Some("sdk says no".into()),
            display_message: None,
        }),
        metadata: json!({"link_session_id": "sess_1"}),
    }
}

fn host_events(actions: &[BridgeAction]) -> Vec<&HostEvent> {
    actions
        .iter()
        .filter_map(|action| match action {
            BridgeAction::Host(event) => Some(event),
            _ => None,
        })
        .collect()
}

fn exits(actions: &[BridgeAction]) -> Vec<&Exit> {
    host_events(actions)
        .into_iter()
        .filter_map(|event| match event {
            HostEvent::Exit(exit) => Some(exit),
            _ => None,
        })
        .collect()
}

fn loads(actions: &[BridgeAction]) -> Vec<&Url> {
    actions
        .iter()
        .filter_map(|action| match action {
            BridgeAction::Load(url) => Some(url),
            _ => None,
        })
        .collect()
}

#[test]
fn start_loads_intro_with_secret() {
    let config = ConnectConfig::with_base_url("https://connect.example").expect("config");
    let mut bridge = ConnectBridge::new(config, "abc");
    let actions = bridge.start();
    assert_eq!(
        actions,
        vec![BridgeAction::Load(
            Url::parse("https://connect.example/intro?client_secret=abc&webview=true")
                .expect("url")
        )]
    );
}

#[test]
fn recognized_events_cancel_navigation() {
    for url in [
        "fuse://cb?event_name=ON_SUCCESS&public_token=pt",
        "fuse://cb?event_name=ON_INSTITUTION_SELECTED&institution_id=ins_1",
        "fuse://cb?event_name=OPEN_PLAID&plaid_link_token=lt",
        "fuse://cb?event_name=OPEN_SNAPTRADE&redirect_uri=https%3A%2F%2Fsnap.example",
        "fuse://cb?event_name=ON_EXIT",
    ] {
        let mut bridge = bridge();
        let decision = bridge.handle_navigation(url);
        assert_eq!(decision.policy, NavigationPolicy::Cancel, "{url}");
    }
}

#[test]
fn unrecognized_reserved_events_are_cancelled_no_ops() {
    let mut bridge = bridge();
    let decision = bridge.handle_navigation("fuse://cb?event_name=ON_WHATEVER&x=1");
    assert_eq!(decision.policy, NavigationPolicy::Cancel);
    assert_eq!(decision.actions.len(), 1);
    assert!(matches!(
        &decision.actions[0],
        BridgeAction::Host(HostEvent::Event { name, .. }) if name == "ON_WHATEVER"
    ));

    let decision = bridge.handle_navigation("FUSE://cb");
    assert_eq!(decision.policy, NavigationPolicy::Cancel);
    assert!(decision.actions.is_empty());
}

#[test]
fn unparseable_reserved_scheme_requests_are_cancelled() {
    let mut bridge = bridge();
    for url in [
        "fuse://cb:99999?event_name=ON_EXIT",
        "fuse://c b?event_name=ON_EXIT",
        "Fuse://[::1?event_name=ON_EXIT",
    ] {
        let decision = bridge.handle_navigation(url);
        assert_eq!(decision.policy, NavigationPolicy::Cancel, "{url}");
        assert!(decision.actions.is_empty(), "{url}");
    }
    assert!(!bridge.session().is_concluded());

    let decision = bridge.handle_navigation("https://[::1/next");
    assert_eq!(decision.policy, NavigationPolicy::Allow);
}

#[test]
fn other_schemes_are_allowed() {
    let mut bridge = bridge();
    let decision = bridge.handle_navigation("https://connect.example/next?event_name=ON_EXIT");
    assert_eq!(decision.policy, NavigationPolicy::Allow);
    assert!(decision.actions.is_empty());
    assert!(!bridge.session().is_concluded());
}

#[test]
fn events_are_reported_to_host_before_actions() {
    let mut bridge = bridge();
    let decision = bridge.handle_navigation("fuse://cb?event_name=ON_SUCCESS&public_token=pt");
    let events = host_events(&decision.actions);
    assert_eq!(events.len(), 2);
    match events[0] {
        HostEvent::Event { name, params } => {
            assert_eq!(name, "ON_SUCCESS");
            assert_eq!(params.get("public_token").map(String::as_str), Some("pt"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        events[1],
        &HostEvent::Success(LinkSuccess {
            public_token: "pt".into()
        })
    );
}

#[test]
fn clean_exit_when_nothing_stored() {
    let mut bridge = bridge();
    let decision = bridge.handle_navigation("fuse://cb?event_name=ON_EXIT");
    let exits = exits(&decision.actions);
    assert_eq!(exits.len(), 1);
    assert_eq!(exits[0].error, None);
}

#[test]
fn exit_built_from_url_error_params() {
    let mut bridge = bridge();
    let decision = bridge.handle_navigation(
        "fuse://cb?event_name=ON_EXIT&error=INVALID_CREDENTIALS&error_type=ITEM_ERROR&error_message=bad%20password",
    );
    let exits = exits(&decision.actions);
    let error = exits[0].error.as_ref().expect("error");
    assert_eq!(error.error_code, "INVALID_CREDENTIALS");
    assert_eq!(error.error_type, "ITEM_ERROR");
    assert_eq!(error.error_message.as_deref(), Some("bad password"));
    assert_eq!(exits[0].metadata, Some(Map::new()));
}

#[test]
fn stored_error_wins_over_url_params() {
    let mut bridge = bridge();
    bridge.handle_link_outcome(sdk_exit(LinkErrorCode::ItemError("ITEM_LOCKED".into())), false);

    let decision =
        bridge.handle_navigation("fuse://cb?event_name=ON_EXIT&error=OTHER&error_type=API_ERROR");
    let exits = exits(&decision.actions);
    assert_eq!(
        exits[0].error.as_ref().map(|e| e.error_code.as_str()),
        Some("ITEM_LOCKED")
    );
}

#[test]
fn missing_required_parameters_soft_fail_with_one_exit() {
    for url in [
        "fuse://cb?event_name=ON_SUCCESS",
        "fuse://cb?event_name=ON_INSTITUTION_SELECTED",
        "fuse://cb?event_name=OPEN_PLAID&close_on_exit=true",
        "fuse://cb?event_name=OPEN_SNAPTRADE",
        "fuse://cb?event_name=OPEN_SNAPTRADE&redirect_uri=not%20a%20uri",
        "fuse://cb?event_name=ON_SUCCESS&public_token=",
    ] {
        let mut bridge = bridge();
        let decision = bridge.handle_navigation(url);
        assert_eq!(decision.policy, NavigationPolicy::Cancel);
        let exits = exits(&decision.actions);
        assert_eq!(exits.len(), 1, "{url}");
        let error = exits[0].error.as_ref().expect("error");
        assert_eq!(error.error_code, "MALFORMED_EVENT");
        assert_eq!(error.error_type, "BRIDGE_ERROR");
    }
}

#[test]
fn institution_selection_continues_to_bank_link() {
    let mut bridge = bridge();
    let decision =
        bridge.handle_navigation("fuse://cb?event_name=ON_INSTITUTION_SELECTED&institution_id=ins_9");
    assert!(host_events(&decision.actions).contains(&&HostEvent::SelectInstitution {
        institution_id: "ins_9".into()
    }));

    let token = fallback_token();
    let actions = bridge.continue_with_link_token(&token);
    assert_eq!(
        loads(&actions)[0],
        &bridge.redirects.bank_link(&token, false)
    );
    assert_eq!(bridge.session().last_link_token.as_deref(), Some(token.as_str()));
    assert!(bridge
        .session()
        .last_token_info
        .as_ref()
        .is_some_and(DecodedTokenInfo::has_fallback));
}

#[test]
fn undecodable_link_token_still_continues() {
    let mut bridge = bridge();
    let actions = bridge.continue_with_link_token("link-sandbox-opaque");
    assert_eq!(loads(&actions).len(), 1);
    assert_eq!(bridge.session().last_token_info, None);
}

#[test]
fn open_plaid_requests_launch_with_close_flag() {
    let mut bridge = bridge();
    let decision =
        bridge.handle_navigation("fuse://cb?event_name=OPEN_PLAID&plaid_link_token=lt&close_on_exit=True");
    assert!(decision.actions.contains(&BridgeAction::Launch(ExternalLaunch::Link {
        link_token: "lt".into(),
        close_on_exit: true,
    })));

    let decision = bridge.handle_navigation("fuse://cb?event_name=OPEN_PLAID&plaid_link_token=lt");
    assert!(decision.actions.contains(&BridgeAction::Launch(ExternalLaunch::Link {
        link_token: "lt".into(),
        close_on_exit: false,
    })));
}

#[test]
fn link_success_wraps_public_token_surrogate() {
    let mut bridge = bridge();
    let actions = bridge.handle_link_outcome(
        LinkOutcome::Success {
            public_token: "tok_1".into(),
            metadata: json!({}),
        },
        false,
    );
    let events = host_events(&actions);
    let HostEvent::Success(success) = events[0] else {
        panic!("expected success");
    };
    assert_eq!(
        token::decode_public_token(&success.public_token).expect("decode"),
        PublicTokenEnvelope {
            session_client_secret: "abc".into(),
            data: ProviderData::Plaid {
                public_token: "tok_1".into()
            },
        }
    );
}

#[test]
fn retryable_error_with_fallback_reloads_instead_of_exiting() {
    let mut bridge = bridge();
    let token = fallback_token();
    bridge.continue_with_link_token(&token);

    let actions = bridge.handle_link_outcome(
        sdk_exit(LinkErrorCode::InstitutionError("INSTITUTION_DOWN".into())),
        true,
    );

    assert!(exits(&actions).is_empty());
    let url = loads(&actions)[0];
    assert_eq!(url.path(), "/bank-link");
    let params = query::query_of(url);
    assert_eq!(params.get("link_token"), Some(token.as_str()));
    assert_eq!(params.get("is_fall_back"), Some("true"));
    assert!(!bridge.session().is_concluded());
}

#[test]
fn retryable_error_without_fallback_exits_once_when_closing() {
    let mut bridge = bridge();
    bridge.continue_with_link_token(&plain_token());

    let actions = bridge.handle_link_outcome(
        sdk_exit(LinkErrorCode::InstitutionError("INSTITUTION_DOWN".into())),
        true,
    );
    let exits = exits(&actions);
    assert_eq!(exits.len(), 1);
    let error = exits[0].error.as_ref().expect("error");
    assert_eq!(error.error_code, "INSTITUTION_DOWN");
    assert_eq!(error.error_type, "INSTITUTION_ERROR");
    assert_eq!(error.metadata["plaid"]["link_session_id"], "sess_1");
    assert!(loads(&actions).is_empty());
}

#[test]
fn error_without_close_on_exit_keeps_flow_open() {
    let mut bridge = bridge();
    let actions = bridge.handle_link_outcome(
        sdk_exit(LinkErrorCode::AuthError("INVALID_CREDENTIALS".into())),
        false,
    );
    assert!(actions.is_empty());
    assert_eq!(
        bridge.session().last_error.as_ref().map(|e| e.error_type.as_str()),
        Some("AUTH_ERROR")
    );
}

#[test]
fn non_retryable_error_with_fallback_does_not_retry() {
    let mut bridge = bridge();
    bridge.continue_with_link_token(&fallback_token());
    let actions = bridge.handle_link_outcome(
        sdk_exit(LinkErrorCode::RateLimitExceeded("RATE_LIMIT".into())),
        true,
    );
    assert!(loads(&actions).is_empty());
    assert_eq!(exits(&actions).len(), 1);
}

#[test]
fn plain_sdk_exit_closes_only_when_asked() {
    let mut bridge = bridge();
    let outcome = LinkOutcome::Exit {
        error: None,
        metadata: json!({}),
    };
    assert!(bridge.handle_link_outcome(outcome.clone(), false).is_empty());

    let actions = bridge.handle_link_outcome(outcome, true);
    let exits = exits(&actions);
    assert_eq!(exits.len(), 1);
    assert_eq!(exits[0].error, None);
}

#[test]
fn exit_is_surfaced_at_most_once() {
    let mut bridge = bridge();
    bridge.continue_with_link_token(&fallback_token());

    let first = bridge.handle_navigation("fuse://cb?event_name=ON_EXIT");
    assert_eq!(exits(&first.actions).len(), 1);

    let second = bridge.handle_navigation("fuse://cb?event_name=ON_EXIT");
    assert!(exits(&second.actions).is_empty());

    let retry = bridge.handle_link_outcome(
        sdk_exit(LinkErrorCode::InstitutionError("INSTITUTION_DOWN".into())),
        true,
    );
    assert!(retry.is_empty());

    let malformed = bridge.handle_navigation("fuse://cb?event_name=ON_SUCCESS");
    assert!(exits(&malformed.actions).is_empty());
}

#[test]
fn success_concludes_the_attempt() {
    let mut bridge = bridge();
    bridge.handle_navigation("fuse://cb?event_name=ON_SUCCESS&public_token=pt");
    let decision = bridge.handle_navigation("fuse://cb?event_name=ON_EXIT");
    assert!(exits(&decision.actions).is_empty());
    assert!(bridge.continue_with_link_token(&fallback_token()).is_empty());
}

#[test]
fn restarting_clears_stored_error() {
    let mut bridge = bridge();
    bridge.handle_link_outcome(sdk_exit(LinkErrorCode::ItemError("ITEM_LOCKED".into())), true);
    let previous = bridge.session().attempt_id();

    bridge.start();
    assert_ne!(bridge.session().attempt_id(), previous);
    assert!(bridge.session().last_error.is_none());
    let decision = bridge.handle_navigation("fuse://cb?event_name=ON_EXIT");
    assert_eq!(exits(&decision.actions)[0].error, None);
}

#[test]
fn alternate_success_dismisses_and_reports_surrogate() {
    let mut bridge = bridge();
    let actions = bridge.handle_alternate_message("SUCCESS:auth_789", false);
    assert_eq!(actions[0], BridgeAction::DismissAlternate);
    let events = host_events(&actions);
    let HostEvent::Success(success) = events[0] else {
        panic!("expected success");
    };
    let envelope = token::decode_public_token(&success.public_token).expect("decode");
    assert_eq!(
        envelope.data,
        ProviderData::Snaptrade {
            brokerage_authorization_id: "auth_789".into()
        }
    );
}

#[test]
fn alternate_abandon_exits_cleanly_when_closing() {
    let mut bridge = bridge();
    let actions = bridge.handle_alternate_message("ABANDONED", true);
    assert_eq!(actions[0], BridgeAction::DismissAlternate);
    let exits = exits(&actions);
    assert_eq!(exits.len(), 1);
    assert_eq!(exits[0].error, None);

    let mut bridge = self::bridge();
    let actions = bridge.handle_alternate_message("ABANDONED", false);
    assert_eq!(actions, vec![BridgeAction::DismissAlternate]);
}

#[test]
fn alternate_error_is_stored_for_the_next_exit() {
    let mut bridge = bridge();
    assert!(bridge.handle_alternate_message("ERROR:conn_5", true).is_empty());
    assert!(bridge.handle_alternate_message("heartbeat", true).is_empty());

    let decision = bridge.handle_navigation("fuse://cb?event_name=ON_EXIT");
    let error = exits(&decision.actions)[0].error.clone().expect("error");
    assert_eq!(error.error_code, "conn_5");
    assert_eq!(error.error_type, "ALTERNATE_PROVIDER_ERROR");
}

#[test]
fn alternate_abandon_carries_stored_error() {
    let mut bridge = bridge();
    assert!(bridge.handle_alternate_message("ERROR:conn_5", true).is_empty());

    let actions = bridge.handle_alternate_message("ABANDONED", true);
    assert_eq!(actions[0], BridgeAction::DismissAlternate);
    let exits = exits(&actions);
    assert_eq!(exits.len(), 1);
    let error = exits[0].error.as_ref().expect("stored error");
    assert_eq!(error.error_code, "conn_5");
    assert_eq!(error.error_type, "ALTERNATE_PROVIDER_ERROR");

    let decision = bridge.handle_navigation("fuse://cb?event_name=ON_EXIT");
    assert!(self::exits(&decision.actions).is_empty());
}

#[test]
fn normalizes_every_sdk_family() {
    let cases = [
        (LinkErrorCode::ApiError("PLANNED_MAINTENANCE".into()), "API_ERROR", "PLANNED_MAINTENANCE"),
        (LinkErrorCode::AuthError("PRODUCT_NOT_READY".into()), "AUTH_ERROR", "PRODUCT_NOT_READY"),
        (
            LinkErrorCode::AssetReportError("ASSET_REPORT_GENERATION_FAILED".into()),
            "ASSET_REPORT_ERROR",
            "ASSET_REPORT_GENERATION_FAILED",
        ),
        (
            LinkErrorCode::InstitutionError("INSTITUTION_NOT_RESPONDING".into()),
            "INSTITUTION_ERROR",
            "INSTITUTION_NOT_RESPONDING",
        ),
        (LinkErrorCode::ItemError("NO_ACCOUNTS".into()), "ITEM_ERROR", "NO_ACCOUNTS"),
        (LinkErrorCode::InvalidInput("INVALID_API_KEYS".into()), "INVALID_INPUT", "INVALID_API_KEYS"),
        (
            LinkErrorCode::InvalidRequest("MISSING_FIELDS".into()),
            "INVALID_REQUEST",
            "MISSING_FIELDS",
        ),
        (
            LinkErrorCode::RateLimitExceeded("RATE_LIMIT".into()),
            "RATE_LIMIT_EXCEEDED",
            "RATE_LIMIT",
        ),
        (
            LinkErrorCode::Unknown {
                error_type: "NEW_TYPE".into(),
                error_code: "NEW_CODE".into(),
            },
            "NEW_TYPE",
            "NEW_CODE",
        ),
    ];

    for (code, error_type, error_code) in cases {
        let normalized = normalize_link_error(LinkError {
            error_code: code,
            error_message: Some("msg".into()),
            display_message: Some("shown".into()),
        });
        assert_eq!(normalized.error_type, error_type);
        assert_eq!(normalized.error_code, error_code);
        assert_eq!(normalized.error_message.as_deref(), Some("msg"));
        assert_eq!(normalized.display_message.as_deref(), Some("shown"));
    }

    let internal = normalize_link_error(LinkError {
        error_code: LinkErrorCode::Internal("handler crashed".into()),
        error_message: Some("ignored".into()),
        display_message: None,
    });
    assert_eq!(internal.error_code, "");
    assert_eq!(internal.error_type, "INTERNAL");
    assert_eq!(internal.error_message.as_deref(), Some("handler crashed"));
}

struct RejectingSdk;

impl LinkSdk for RejectingSdk {
    fn create(
        &self,
        _configuration: LinkTokenConfiguration,
    ) -> Result<Box<dyn LinkHandle>, LinkSdkError> {
        Err(LinkSdkError::Configuration("bad token".into()))
    }
}

struct RecordingHandle {
    opened: Arc<Mutex<Vec<String>>>,
}

impl LinkHandle for RecordingHandle {
    fn open(&mut self, presentation: &PresentationContext) -> Result<(), LinkSdkError> {
        self.opened
            .lock()
            .expect("opened lock")
            .push(presentation.surface_id().to_string());
        Ok(())
    }
}

struct CallbackSdk {
    opened: Arc<Mutex<Vec<String>>>,
    configurations: Arc<Mutex<Vec<LinkTokenConfiguration>>>,
}

impl LinkSdk for CallbackSdk {
    fn create(
        &self,
        configuration: LinkTokenConfiguration,
    ) -> Result<Box<dyn LinkHandle>, LinkSdkError> {
        self.configurations
            .lock()
            .expect("configurations lock")
            .push(configuration);
        Ok(Box::new(RecordingHandle {
            opened: self.opened.clone(),
        }))
    }
}

#[test]
fn launcher_failure_is_reported_without_opening() {
    let mut launcher = LinkLauncher::new(Box::new(RejectingSdk));
    let result = launcher.open("lt", true, &PresentationContext::new("root"), |_, _| {});
    assert!(matches!(result, Err(LaunchError::Sdk(LinkSdkError::Configuration(_)))));
    assert!(!launcher.is_open());
}

#[test]
fn launcher_relays_outcome_with_captured_close_flag() {
    let opened = Arc::new(Mutex::new(Vec::new()));
    let configurations = Arc::new(Mutex::new(Vec::new()));
    let mut launcher = LinkLauncher::new(Box::new(CallbackSdk {
        opened: opened.clone(),
        configurations: configurations.clone(),
    }));

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    launcher
        .open("lt", true, &PresentationContext::new("sheet"), move |outcome, close| {
            sink.lock().expect("sink lock").push((outcome, close));
        })
        .expect("open");

    assert!(launcher.is_open());
    assert_eq!(*opened.lock().expect("opened lock"), vec!["sheet".to_string()]);

    let configurations = configurations.lock().expect("configurations lock");
    assert_eq!(configurations[0].token, "lt");
    (configurations[0].on_outcome)(LinkOutcome::Exit {
        error: None,
        metadata: json!({}),
    });

    let received = received.lock().expect("received lock");
    assert_eq!(received.len(), 1);
    assert!(received[0].1);
}

struct SwitchableSdk {
    accept: Arc<Mutex<bool>>,
}

impl LinkSdk for SwitchableSdk {
    fn create(
        &self,
        _configuration: LinkTokenConfiguration,
    ) -> Result<Box<dyn LinkHandle>, LinkSdkError> {
        if !*self.accept.lock().expect("accept lock") {
            return Err(LinkSdkError::Configuration("expired".into()));
        }
        Ok(Box::new(RecordingHandle {
            opened: Arc::new(Mutex::new(Vec::new())),
        }))
    }
}

#[test]
fn failed_relaunch_drops_previous_handle() {
    let accept = Arc::new(Mutex::new(true));
    let mut launcher = LinkLauncher::new(Box::new(SwitchableSdk {
        accept: accept.clone(),
    }));
    let presentation = PresentationContext::new("sheet");

    launcher
        .open("lt_1", false, &presentation, |_, _| {})
        .expect("first open");
    assert!(launcher.is_open());

    *accept.lock().expect("accept lock") = false;
    assert!(launcher.open("lt_2", false, &presentation, |_, _| {}).is_err());
    assert!(!launcher.is_open());
}

#[derive(Default)]
struct RecordingSurface {
    log: Arc<Mutex<Vec<String>>>,
}

impl AlternateSurface for RecordingSurface {
    fn present(
        &mut self,
        redirect_uri: &Url,
        _presentation: &PresentationContext,
        _on_message: MessageCallback,
    ) -> Result<(), SurfaceError> {
        self.log
            .lock()
            .expect("log lock")
            .push(format!("present {redirect_uri}"));
        Ok(())
    }

    fn dismiss(&mut self) {
        self.log.lock().expect("log lock").push("dismiss".into());
    }
}

#[test]
fn presenting_again_dismisses_the_current_surface() {
    let surface = RecordingSurface::default();
    let log = surface.log.clone();
    let mut launcher = AlternateLauncher::new(Box::new(surface));
    let presentation = PresentationContext::new("sheet");
    let first = Url::parse("https://alt.example/one").expect("url");
    let second = Url::parse("https://alt.example/two").expect("url");

    launcher
        .present(&first, true, &presentation, |_, _| {})
        .expect("first present");
    launcher
        .present(&second, true, &presentation, |_, _| {})
        .expect("second present");

    assert!(launcher.is_presented());
    assert_eq!(
        *log.lock().expect("log lock"),
        vec![
            "present https://alt.example/one".to_string(),
            "dismiss".to_string(),
            "present https://alt.example/two".to_string(),
        ]
    );
}
