//! Live update channel for one group.
//!
//! `Closed -> Connecting -> Open -> Closed`, never reconnecting on its own.
//! Every event the channel forwards carries the generation it was opened
//! with, so a consumer that has moved on to another group can recognise and
//! drop anything still in flight from this one.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::model::LocationUpdate;
use crate::wire;

pub type PayloadStream = BoxStream<'static, crate::Result<Bytes>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Connecting,
    Open,
}

#[derive(Debug)]
pub enum ChannelEvent {
    Update {
        generation: u64,
        update: LocationUpdate,
    },
    Closed {
        generation: u64,
    },
}

/// Opens the raw message stream for a group.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, group_id: &str) -> crate::Result<PayloadStream>;
}

/// Connects to `{base}/location?groupId={id}` over WebSocket.
pub struct WsConnector {
    base: Url,
}

impl WsConnector {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    pub fn url(&self, group_id: &str) -> crate::Result<Url> {
        let mut url = crate::backend::endpoint(&self.base, &["location"])?;
        url.query_pairs_mut().append_pair("groupId", group_id);
        Ok(url)
    }
}

#[async_trait]
impl StreamConnector for WsConnector {
    async fn connect(&self, group_id: &str) -> crate::Result<PayloadStream> {
        let url = self.url(group_id)?;
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;

        let payloads = ws.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(Bytes::from(text))),
                Ok(Message::Binary(data)) => Some(Ok(Bytes::from(data))),
                Ok(_) => None,
                Err(err) => Some(Err(crate::Error::from(err))),
            }
        });
        Ok(payloads.boxed())
    }
}

pub struct LiveUpdateChannel {
    cancel: CancellationToken,
    state: Arc<watch::Sender<ChannelState>>,
    task: Option<JoinHandle<()>>,
}

impl LiveUpdateChannel {
    /// Starts connecting in the background and returns immediately in
    /// `Connecting`.
    pub fn open<E>(
        connector: Arc<dyn StreamConnector>,
        group_id: &str,
        generation: u64,
        events: mpsc::UnboundedSender<E>,
    ) -> Self
    where
        E: From<ChannelEvent> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let (state, _) = watch::channel(ChannelState::Connecting);
        let state = Arc::new(state);

        let task = tokio::spawn(run(
            connector,
            group_id.to_string(),
            generation,
            cancel.clone(),
            state.clone(),
            events,
        ));

        Self {
            cancel,
            state,
            task: Some(task),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    /// Closes the connection. Nothing received after this call is forwarded.
    pub async fn close(mut self) {
        self.cancel.cancel();
        self.state.send_replace(ChannelState::Closed);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for LiveUpdateChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.state.send_replace(ChannelState::Closed);
    }
}

async fn run<E>(
    connector: Arc<dyn StreamConnector>,
    group_id: String,
    generation: u64,
    cancel: CancellationToken,
    state: Arc<watch::Sender<ChannelState>>,
    events: mpsc::UnboundedSender<E>,
) where
    E: From<ChannelEvent> + Send + 'static,
{
    let connected = tokio::select! {
        _ = cancel.cancelled() => return,
        connected = connector.connect(&group_id) => connected,
    };

    let mut stream = match connected {
        Ok(stream) => stream,
        Err(err) => {
            warn!(%group_id, error = %err, "failed to open update stream");
            state.send_replace(ChannelState::Closed);
            let _ = events.send(ChannelEvent::Closed { generation }.into());
            return;
        }
    };

    if cancel.is_cancelled() {
        return;
    }
    state.send_replace(ChannelState::Open);
    info!(%group_id, generation, "update stream open");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!(%group_id, generation, "update stream closed locally");
                return;
            }
            message = stream.next() => match message {
                Some(Ok(payload)) => match wire::decode_update(&payload) {
                    Ok(update) => {
                        let event = ChannelEvent::Update { generation, update };
                        if events.send(event.into()).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(%group_id, error = %err, "dropping malformed location event"),
                },
                Some(Err(err)) => {
                    warn!(%group_id, error = %err, "update stream failed");
                    break;
                }
                None => {
                    info!(%group_id, "update stream closed by remote");
                    break;
                }
            }
        }
    }

    state.send_replace(ChannelState::Closed);
    let _ = events.send(ChannelEvent::Closed { generation }.into());
}
