pub mod cluster;
pub mod versions;

use crate::Context;
use crate::config::Config;
use crate::ui;
use anyhow::Result;
use ocmkit::OcmClient;
use reconcile::{BuildStamp, LifecycleController, SystemClock};

static SYSTEM_CLOCK: SystemClock = SystemClock;

/// Stamp recorded on every cluster this build creates or updates
pub fn build_stamp() -> BuildStamp {
    BuildStamp::new(
        env!("CARGO_PKG_VERSION"),
        option_env!("ROSAFORM_COMMIT").unwrap_or("dev"),
    )
}

/// An authenticated connection to the control plane
pub struct Session {
    pub config: Config,
    pub client: OcmClient,
}

impl Session {
    /// Load the config file, apply overrides and build a client
    pub fn connect(ctx: &Context) -> Result<Self> {
        let config = Config::load()?.with_overrides(ctx.url.clone(), ctx.token.clone());
        let token = config.access_token()?;
        log::debug!("Using control plane at {}", config.api_url);

        let client = OcmClient::with_timeout(&config.api_url, token, config.request_timeout());
        Ok(Self { config, client })
    }

    /// Lifecycle controller backed by this session's client
    pub fn controller(&self) -> LifecycleController<'_, OcmClient, OcmClient, SystemClock> {
        LifecycleController::new(&self.client, &self.client, &SYSTEM_CLOCK, build_stamp())
            .with_poll_interval(self.config.poll_interval())
    }
}

/// Print an error with advice when it came from the reconciliation core
pub fn report(err: &anyhow::Error) {
    let Some(rec) = err.downcast_ref::<reconcile::Error>() else {
        ui::error(&format!("{err:#}"));
        return;
    };

    let category = rec.category();
    match rec {
        reconcile::Error::Validation(violations) => {
            ui::error(category.description());
            for violation in violations.iter() {
                eprintln!("  - {violation}");
            }
        }
        _ => ui::error(&format!("{err:#}")),
    }
    ui::dim(category.advice());
}
