//! Single-actor runtime that owns the bridge and its collaborators.

use link_integration::{
    AlternateSurface, LinkOutcome, LinkSdk, PresentationContext, WebSurface,
};
use shared::protocol::HostEvent;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    error::ControllerError,
    launcher::{AlternateLauncher, LinkLauncher},
    BridgeAction, ConnectBridge, ExternalLaunch, NavigationPolicy,
};

pub const LOG_HANDLER: &str = "logHandler";

pub enum BridgeCommand {
    Start,
    Navigate {
        url: String,
        reply: oneshot::Sender<NavigationPolicy>,
    },
    InstitutionLinkToken {
        link_token: String,
    },
    LinkOutcome {
        outcome: LinkOutcome,
        close_on_exit: bool,
    },
    AlternateMessage {
        message: String,
        close_on_exit: bool,
    },
    ScriptMessage {
        name: String,
        body: String,
    },
    Shutdown,
}

impl BridgeCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Navigate { .. } => "navigate",
            Self::InstitutionLinkToken { .. } => "institution_link_token",
            Self::LinkOutcome { .. } => "link_outcome",
            Self::AlternateMessage { .. } => "alternate_message",
            Self::ScriptMessage { .. } => "script_message",
            Self::Shutdown => "shutdown",
        }
    }
}

pub trait ConnectHost: Send {
    fn handle(&mut self, event: HostEvent);
}

pub struct Collaborators {
    pub web: Box<dyn WebSurface>,
    pub link_sdk: Box<dyn LinkSdk>,
    pub alternate: Box<dyn AlternateSurface>,
    pub host: Box<dyn ConnectHost>,
    pub presentation: PresentationContext,
}

#[derive(Clone)]
pub struct BridgeHandle {
    tx: mpsc::UnboundedSender<BridgeCommand>,
}

impl BridgeHandle {
    fn send(&self, command: BridgeCommand) -> Result<(), ControllerError> {
        self.tx.send(command).map_err(|_| ControllerError::Closed)
    }

    pub fn start(&self) -> Result<(), ControllerError> {
        self.send(BridgeCommand::Start)
    }

    pub async fn navigate(&self, url: impl Into<String>) -> Result<NavigationPolicy, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.send(BridgeCommand::Navigate {
            url: url.into(),
            reply,
        })?;
        rx.await.map_err(|_| ControllerError::ReplyDropped)
    }

    pub fn institution_link_token(&self, link_token: impl Into<String>) -> Result<(), ControllerError> {
        self.send(BridgeCommand::InstitutionLinkToken {
            link_token: link_token.into(),
        })
    }

    pub fn script_message(
        &self,
        name: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<(), ControllerError> {
        self.send(BridgeCommand::ScriptMessage {
            name: name.into(),
            body: body.into(),
        })
    }

    pub fn shutdown(&self) -> Result<(), ControllerError> {
        self.send(BridgeCommand::Shutdown)
    }
}

pub struct ConnectController {
    bridge: ConnectBridge,
    web: Box<dyn WebSurface>,
    link: LinkLauncher,
    alternate: AlternateLauncher,
    host: Box<dyn ConnectHost>,
    presentation: PresentationContext,
    commands: mpsc::WeakUnboundedSender<BridgeCommand>,
}

impl ConnectController {
    pub fn new(
        bridge: ConnectBridge,
        collaborators: Collaborators,
    ) -> (Self, BridgeHandle, mpsc::UnboundedReceiver<BridgeCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Self {
            bridge,
            web: collaborators.web,
            link: LinkLauncher::new(collaborators.link_sdk),
            alternate: AlternateLauncher::new(collaborators.alternate),
            host: collaborators.host,
            presentation: collaborators.presentation,
            commands: tx.downgrade(),
        };
        (controller, BridgeHandle { tx }, rx)
    }

    pub fn spawn(bridge: ConnectBridge, collaborators: Collaborators) -> (BridgeHandle, JoinHandle<()>) {
        let (controller, handle, rx) = Self::new(bridge, collaborators);
        let task = tokio::spawn(controller.run(rx));
        (handle, task)
    }

    pub fn bridge(&self) -> &ConnectBridge {
        &self.bridge
    }

    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<BridgeCommand>) {
        while let Some(command) = rx.recv().await {
            if !self.process(command) {
                break;
            }
        }
        let alternate_presented = self.alternate.is_presented();
        self.alternate.dismiss();
        info!(
            attempt_id = %self.bridge.session().attempt_id(),
            link_open = self.link.is_open(),
            alternate_presented,
            "connect controller stopped"
        );
    }

    /// Applies one command; returns `false` once the controller should stop.
    pub fn process(&mut self, command: BridgeCommand) -> bool {
        debug!(command = command.name(), "processing bridge command");
        match command {
            BridgeCommand::Start => {
                let actions = self.bridge.start();
                self.apply(actions);
            }
            BridgeCommand::Navigate { url, reply } => {
                let decision = self.bridge.handle_navigation(&url);
                self.apply(decision.actions);
                if reply.send(decision.policy).is_err() {
                    debug!("navigation reply receiver dropped");
                }
            }
            BridgeCommand::InstitutionLinkToken { link_token } => {
                let actions = self.bridge.continue_with_link_token(&link_token);
                self.apply(actions);
            }
            BridgeCommand::LinkOutcome {
                outcome,
                close_on_exit,
            } => {
                let actions = self.bridge.handle_link_outcome(outcome, close_on_exit);
                self.apply(actions);
            }
            BridgeCommand::AlternateMessage {
                message,
                close_on_exit,
            } => {
                let actions = self.bridge.handle_alternate_message(&message, close_on_exit);
                self.apply(actions);
            }
            BridgeCommand::ScriptMessage { name, body } => {
                if name == LOG_HANDLER {
                    debug!(target: "connect_web", "{body}");
                } else {
                    debug!(name = %name, "ignoring script message");
                }
            }
            BridgeCommand::Shutdown => return false,
        }
        true
    }

    fn apply(&mut self, actions: Vec<BridgeAction>) {
        for action in actions {
            match action {
                BridgeAction::Host(event) => self.host.handle(event),
                BridgeAction::Load(url) => {
                    debug!(url = %url, "loading web surface");
                    self.web.load(&url);
                }
                BridgeAction::Launch(ExternalLaunch::Link {
                    link_token,
                    close_on_exit,
                }) => {
                    let tx = self.commands.clone();
                    let opened = self.link.open(
                        &link_token,
                        close_on_exit,
                        &self.presentation,
                        move |outcome, close_on_exit| {
                            let delivered = tx.upgrade().is_some_and(|tx| {
                                tx.send(BridgeCommand::LinkOutcome {
                                    outcome,
                                    close_on_exit,
                                })
                                .is_ok()
                            });
                            if !delivered {
                                warn!("link outcome arrived after controller stopped");
                            }
                        },
                    );
                    if let Err(err) = opened {
                        warn!(error = %err, "link launch aborted; web flow left open for retry");
                    }
                }
                BridgeAction::Launch(ExternalLaunch::Alternate {
                    redirect_uri,
                    close_on_exit,
                }) => {
                    let tx = self.commands.clone();
                    let presented = self.alternate.present(
                        &redirect_uri,
                        close_on_exit,
                        &self.presentation,
                        move |message, close_on_exit| {
                            let delivered = tx.upgrade().is_some_and(|tx| {
                                tx.send(BridgeCommand::AlternateMessage {
                                    message,
                                    close_on_exit,
                                })
                                .is_ok()
                            });
                            if !delivered {
                                warn!("alternate message arrived after controller stopped");
                            }
                        },
                    );
                    if let Err(err) = presented {
                        warn!(error = %err, "alternate launch aborted; web flow left open for retry");
                    }
                }
                BridgeAction::DismissAlternate => self.alternate.dismiss(),
            }
        }
    }
}
