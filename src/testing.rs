//! Fakes for the async seams, shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;

use crate::backend::LocationApi;
use crate::channel::{PayloadStream, StreamConnector};
use crate::map::{FitCommand, MapSurface, Marker};
use crate::model::{Group, Member};
use crate::source::{Fix, FixStream, PositionSource};
use crate::wire::PositionReport;

/// Hands out one in-memory stream per `connect`, fed by the test.
pub struct FakeConnector {
    refuse: bool,
    feeds: Mutex<HashMap<String, mpsc::UnboundedSender<crate::Result<Bytes>>>>,
    connects: Mutex<Vec<String>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            refuse: false,
            feeds: Mutex::new(HashMap::new()),
            connects: Mutex::new(Vec::new()),
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::new()
        }
    }

    /// Pushes one raw message into the group's stream. Returns `false` once
    /// the reader side is gone.
    pub fn feed(&self, group_id: &str, payload: &str) -> bool {
        let feeds = self.feeds.lock().unwrap();
        match feeds.get(group_id) {
            Some(tx) => tx.send(Ok(Bytes::from(payload.to_string()))).is_ok(),
            None => false,
        }
    }

    /// Ends the group's stream as if the server closed it.
    pub fn hang_up(&self, group_id: &str) {
        self.feeds.lock().unwrap().remove(group_id);
    }

    pub fn connects(&self) -> Vec<String> {
        self.connects.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamConnector for FakeConnector {
    async fn connect(&self, group_id: &str) -> crate::Result<PayloadStream> {
        self.connects.lock().unwrap().push(group_id.to_string());
        if self.refuse {
            return Err(crate::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().unwrap().insert(group_id.to_string(), tx);
        let payloads =
            stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });
        Ok(payloads.boxed())
    }
}

/// Serves canned snapshots and records outbound reports.
pub struct RecordingApi {
    snapshots: Mutex<HashMap<String, Vec<Member>>>,
    fail_reports: AtomicBool,
    reports: mpsc::UnboundedSender<PositionReport>,
}

impl RecordingApi {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PositionReport>) {
        let (reports, rx) = mpsc::unbounded_channel();
        let api = Self {
            snapshots: Mutex::new(HashMap::new()),
            fail_reports: AtomicBool::new(false),
            reports,
        };
        (api, rx)
    }

    pub fn set_snapshot(&self, group_id: &str, members: Vec<Member>) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(group_id.to_string(), members);
    }

    pub fn fail_reports(&self, fail: bool) {
        self.fail_reports.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LocationApi for RecordingApi {
    async fn fetch_snapshot(&self, _identity: &str, group_id: &str) -> crate::Result<Vec<Member>> {
        self.snapshots
            .lock()
            .unwrap()
            .get(group_id)
            .cloned()
            .ok_or_else(|| {
                crate::Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no snapshot",
                ))
            })
    }

    async fn report_position(&self, report: &PositionReport) -> crate::Result<()> {
        // Failed reports are still recorded so tests can see they were tried.
        let _ = self.reports.send(report.clone());
        if self.fail_reports.load(Ordering::SeqCst) {
            return Err(crate::Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "backend down",
            )));
        }
        Ok(())
    }

    async fn list_groups(&self, _identity: &str) -> crate::Result<Vec<Group>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct Drawn {
    pub markers: Vec<Vec<Marker>>,
    pub fits: Vec<FitCommand>,
}

/// Map surface that keeps everything it was asked to draw.
#[derive(Clone, Default)]
pub struct RecordingSurface {
    pub drawn: Arc<Mutex<Drawn>>,
}

impl RecordingSurface {
    pub fn fits(&self) -> Vec<FitCommand> {
        self.drawn.lock().unwrap().fits.clone()
    }

    pub fn last_markers(&self) -> Vec<Marker> {
        self.drawn
            .lock()
            .unwrap()
            .markers
            .last()
            .cloned()
            .unwrap_or_default()
    }
}

impl MapSurface for RecordingSurface {
    fn render_markers(&mut self, markers: &[Marker]) {
        self.drawn.lock().unwrap().markers.push(markers.to_vec());
    }

    fn fly_to_bounds(&mut self, command: &FitCommand) {
        self.drawn.lock().unwrap().fits.push(command.clone());
    }
}

/// Position source driven by the test through a channel. Flags when the
/// stream it handed out has been dropped.
pub struct ScriptedSource {
    fixes: Option<mpsc::UnboundedReceiver<crate::Result<Fix>>>,
    pub released: Arc<AtomicBool>,
}

impl ScriptedSource {
    pub fn new() -> (Self, mpsc::UnboundedSender<crate::Result<Fix>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Self {
            fixes: Some(rx),
            released: Arc::new(AtomicBool::new(false)),
        };
        (source, tx)
    }
}

struct ReleaseOnDrop(Arc<AtomicBool>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PositionSource for ScriptedSource {
    async fn watch(&mut self) -> crate::Result<FixStream> {
        let rx = self
            .fixes
            .take()
            .ok_or_else(|| crate::Error::SourceUnavailable("already watching".to_string()))?;
        let guard = ReleaseOnDrop(self.released.clone());
        Ok(stream::unfold((rx, guard), |(mut rx, guard)| async move {
            rx.recv().await.map(|item| (item, (rx, guard)))
        })
        .boxed())
    }
}

/// Position source whose sensor is missing.
pub struct UnavailableSource;

#[async_trait]
impl PositionSource for UnavailableSource {
    async fn watch(&mut self) -> crate::Result<FixStream> {
        Err(crate::Error::SourceUnavailable("no gps".to_string()))
    }
}
