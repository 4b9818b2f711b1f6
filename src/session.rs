use std::sync::Arc;

use tracing::info;

use crate::backend::LocationApi;
use crate::reporter::{GeolocationReporter, ReporterHandle};
use crate::source::PositionSource;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub identity: String,
    pub token: String,
}

/// An authenticated session. The device position is reported for as long
/// as the session lives, whichever group is being viewed.
pub struct Session {
    identity: String,
    reporter: ReporterHandle,
}

impl Session {
    pub fn start<S>(
        credentials: &Credentials,
        api: Arc<dyn LocationApi>,
        source: S,
    ) -> crate::Result<Session>
    where
        S: PositionSource + 'static,
    {
        if credentials.token.is_empty() {
            return Err(crate::Error::MissingToken);
        }
        info!(identity = %credentials.identity, "session started");
        let reporter = GeolocationReporter::start(&credentials.identity, source, api);
        Ok(Session {
            identity: credentials.identity.clone(),
            reporter,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Stops position reporting; returns once the sensor is released.
    pub async fn end(self) {
        self.reporter.shutdown().await;
        info!(identity = %self.identity, "session ended");
    }
}
