use link_integration::{
    AlternateSurface, LinkError, LinkErrorCode, LinkHandle, LinkOutcome, LinkSdk,
    LinkTokenConfiguration, PresentationContext,
};
use shared::error::ConnectError;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::LaunchError;

pub struct LinkLauncher {
    sdk: Box<dyn LinkSdk>,
    handle: Option<Box<dyn LinkHandle>>,
}

impl LinkLauncher {
    pub fn new(sdk: Box<dyn LinkSdk>) -> Self {
        Self { sdk, handle: None }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn open<F>(
        &mut self,
        link_token: &str,
        close_on_exit: bool,
        presentation: &PresentationContext,
        sink: F,
    ) -> Result<(), LaunchError>
    where
        F: Fn(LinkOutcome, bool) + Send + Sync + 'static,
    {
        if self.handle.take().is_some() {
            debug!("replacing previously opened link handler");
        }

        let configuration = LinkTokenConfiguration {
            token: link_token.to_string(),
            on_outcome: Box::new(move |outcome| sink(outcome, close_on_exit)),
        };

        let mut handle = self.sdk.create(configuration).map_err(|err| {
            error!(error = %err, "unable to create link handler");
            LaunchError::from(err)
        })?;

        handle.open(presentation).map_err(|err| {
            error!(error = %err, surface = presentation.surface_id(), "link handler failed to open");
            LaunchError::from(err)
        })?;

        info!(surface = presentation.surface_id(), close_on_exit, "opened link sdk");
        self.handle = Some(handle);
        Ok(())
    }
}

pub struct AlternateLauncher {
    surface: Box<dyn AlternateSurface>,
    presented: bool,
}

impl AlternateLauncher {
    pub fn new(surface: Box<dyn AlternateSurface>) -> Self {
        Self {
            surface,
            presented: false,
        }
    }

    pub fn is_presented(&self) -> bool {
        self.presented
    }

    pub fn present<F>(
        &mut self,
        redirect_uri: &Url,
        close_on_exit: bool,
        presentation: &PresentationContext,
        sink: F,
    ) -> Result<(), LaunchError>
    where
        F: Fn(String, bool) + Send + Sync + 'static,
    {
        if self.presented {
            warn!(redirect_uri = %redirect_uri, "alternate provider already presented; dismissing it first");
            self.dismiss();
        }

        self.surface
            .present(
                redirect_uri,
                presentation,
                Box::new(move |message| sink(message, close_on_exit)),
            )
            .map_err(|err| {
                error!(error = %err, "unable to present alternate provider");
                LaunchError::from(err)
            })?;

        info!(redirect_uri = %redirect_uri, close_on_exit, "presented alternate provider");
        self.presented = true;
        Ok(())
    }

    pub fn dismiss(&mut self) {
        if self.presented {
            self.surface.dismiss();
            self.presented = false;
        }
    }
}

pub fn normalize_link_error(error: LinkError) -> ConnectError {
    let family = error.error_code.family();
    let code = error.error_code.code().to_string();
    let message = match error.error_code {
        LinkErrorCode::Internal(message) => Some(message),
        _ => error.error_message,
    };

    ConnectError::new(family, code)
        .with_message(message)
        .with_display_message(error.display_message)
}
