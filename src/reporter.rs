use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::LocationApi;
use crate::source::PositionSource;
use crate::wire::PositionReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterState {
    Starting,
    /// Subscribed to the position source, reporting every fix.
    Watching,
    /// No usable position source; nothing is reported.
    Idle,
    Stopped,
}

/// Sends every fix from the device's position source to the backend.
///
/// Reports are fire-and-forget: a failed report is logged and the next fix
/// is sent on its own.
pub struct GeolocationReporter;

impl GeolocationReporter {
    pub fn start<S>(identity: &str, source: S, api: Arc<dyn LocationApi>) -> ReporterHandle
    where
        S: PositionSource + 'static,
    {
        let cancel = CancellationToken::new();
        let (state_tx, state) = watch::channel(ReporterState::Starting);
        let task = tokio::spawn(watch_and_report(
            identity.to_string(),
            source,
            api,
            cancel.clone(),
            state_tx,
        ));

        ReporterHandle {
            cancel,
            state,
            task: Some(task),
        }
    }
}

/// Owns the running watch. Dropping it cancels the watch; `shutdown` also
/// waits until the source subscription has been released.
pub struct ReporterHandle {
    cancel: CancellationToken,
    state: watch::Receiver<ReporterState>,
    task: Option<JoinHandle<()>>,
}

impl ReporterHandle {
    pub fn state(&self) -> ReporterState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReporterState> {
        self.state.clone()
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ReporterHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn watch_and_report<S: PositionSource>(
    identity: String,
    mut source: S,
    api: Arc<dyn LocationApi>,
    cancel: CancellationToken,
    state: watch::Sender<ReporterState>,
) {
    let watched = tokio::select! {
        _ = cancel.cancelled() => {
            state.send_replace(ReporterState::Stopped);
            return;
        }
        watched = source.watch() => watched,
    };

    let mut fixes = match watched {
        Ok(fixes) => fixes,
        Err(err) => {
            warn!(%identity, error = %err, "position source unavailable, not reporting");
            state.send_replace(ReporterState::Idle);
            cancel.cancelled().await;
            state.send_replace(ReporterState::Stopped);
            return;
        }
    };
    state.send_replace(ReporterState::Watching);
    info!(%identity, "watching device position");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            fix = fixes.next() => match fix {
                Some(Ok(fix)) => {
                    let report = PositionReport {
                        user_id: identity.clone(),
                        lat: fix.latitude,
                        lng: fix.longitude,
                    };
                    tokio::spawn(send_report(api.clone(), report));
                }
                Some(Err(err)) => warn!(%identity, error = %err, "position source error"),
                None => {
                    info!(%identity, "position source ended");
                    state.send_replace(ReporterState::Idle);
                    cancel.cancelled().await;
                    break;
                }
            }
        }
    }

    drop(fixes);
    state.send_replace(ReporterState::Stopped);
    debug!(%identity, "position watch released");
}

async fn send_report(api: Arc<dyn LocationApi>, report: PositionReport) {
    match api.report_position(&report).await {
        Ok(()) => debug!(
            identity = %report.user_id,
            lat = report.lat,
            lng = report.lng,
            "reported position"
        ),
        Err(err) => warn!(
            identity = %report.user_id,
            error = %err,
            "failed to report position"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use chrono::Utc;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::*;
    use crate::source::Fix;
    use crate::testing::{RecordingApi, ScriptedSource, UnavailableSource};

    fn fix(latitude: f64, longitude: f64) -> crate::Result<Fix> {
        Ok(Fix {
            latitude,
            longitude,
            observed_at: Utc::now(),
        })
    }

    async fn next_report(rx: &mut mpsc::UnboundedReceiver<PositionReport>) -> PositionReport {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("report timeout")
            .expect("report queue closed")
    }

    async fn wait_for(handle: &ReporterHandle, wanted: ReporterState) {
        let mut state = handle.subscribe();
        timeout(Duration::from_secs(1), state.wait_for(|s| *s == wanted))
            .await
            .expect("reporter state timeout")
            .unwrap();
    }

    #[tokio::test]
    async fn test_reports_every_fix() {
        let (api, mut reports) = RecordingApi::new();
        let (source, fixes) = ScriptedSource::new();
        let handle = GeolocationReporter::start("a@x.com", source, Arc::new(api));
        wait_for(&handle, ReporterState::Watching).await;

        fixes.send(fix(1.0, 2.0)).unwrap();
        fixes.send(fix(3.0, 4.0)).unwrap();

        assert_eq!(
            next_report(&mut reports).await,
            PositionReport {
                user_id: "a@x.com".to_string(),
                lat: 1.0,
                lng: 2.0
            }
        );
        let second = next_report(&mut reports).await;
        assert_eq!((second.lat, second.lng), (3.0, 4.0));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_unavailable_source_stays_idle() {
        let (api, mut reports) = RecordingApi::new();
        let handle = GeolocationReporter::start("a@x.com", UnavailableSource, Arc::new(api));
        wait_for(&handle, ReporterState::Idle).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(reports.try_recv().is_err());
        assert_eq!(handle.state(), ReporterState::Idle);

        let mut state = handle.subscribe();
        handle.shutdown().await;
        assert_eq!(*state.borrow_and_update(), ReporterState::Stopped);
    }

    #[tokio::test]
    async fn test_failed_report_does_not_stop_watch() {
        let (api, mut reports) = RecordingApi::new();
        api.fail_reports(true);
        let (source, fixes) = ScriptedSource::new();
        let handle = GeolocationReporter::start("a@x.com", source, Arc::new(api));
        wait_for(&handle, ReporterState::Watching).await;

        fixes.send(fix(1.0, 2.0)).unwrap();
        next_report(&mut reports).await;
        fixes.send(fix(3.0, 4.0)).unwrap();
        next_report(&mut reports).await;

        assert_eq!(handle.state(), ReporterState::Watching);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_source_errors_are_skipped() {
        let (api, mut reports) = RecordingApi::new();
        let (source, fixes) = ScriptedSource::new();
        let handle = GeolocationReporter::start("a@x.com", source, Arc::new(api));
        wait_for(&handle, ReporterState::Watching).await;

        fixes
            .send(Err(crate::Error::SourceUnavailable("signal lost".to_string())))
            .unwrap();
        fixes.send(fix(5.0, 6.0)).unwrap();

        let report = next_report(&mut reports).await;
        assert_eq!((report.lat, report.lng), (5.0, 6.0));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_subscription() {
        let (api, _reports) = RecordingApi::new();
        let (source, _fixes) = ScriptedSource::new();
        let released = source.released.clone();
        let handle = GeolocationReporter::start("a@x.com", source, Arc::new(api));
        wait_for(&handle, ReporterState::Watching).await;
        assert!(!released.load(Ordering::SeqCst));

        handle.shutdown().await;
        assert!(released.load(Ordering::SeqCst));
    }
}
