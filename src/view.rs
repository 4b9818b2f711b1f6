//! The group currently on screen.
//!
//! `GroupView` is a single-task actor: everything that touches the roster
//! arrives as a [`ViewEvent`] on one queue and is handled in arrival order.
//! Opening a group bumps the generation; snapshot results and channel
//! events carrying any other generation belong to a group that is no longer
//! open and are dropped.
//!
//! A snapshot for the current generation that arrives after live updates
//! still replaces the roster wholesale, discarding those updates.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::LocationApi;
use crate::channel::{ChannelEvent, ChannelState, LiveUpdateChannel, StreamConnector};
use crate::map::{MapSurface, Marker};
use crate::model::{Group, LocationUpdate, Member};
use crate::roster::RosterStore;
use crate::viewport::ViewportFitter;

#[derive(Debug)]
pub enum ViewEvent {
    Open(Group),
    Close,
    /// Fetch the snapshot again, e.g. after the group's membership changed.
    Refresh,
    Snapshot {
        generation: u64,
        result: crate::Result<Vec<Member>>,
    },
    Update {
        generation: u64,
        update: LocationUpdate,
    },
    ChannelClosed {
        generation: u64,
    },
    Shutdown,
}

impl From<ChannelEvent> for ViewEvent {
    fn from(event: ChannelEvent) -> Self {
        match event {
            ChannelEvent::Update { generation, update } => ViewEvent::Update { generation, update },
            ChannelEvent::Closed { generation } => ViewEvent::ChannelClosed { generation },
        }
    }
}

/// Cloneable sender for driving a running [`GroupView`].
#[derive(Clone)]
pub struct ViewHandle {
    events: mpsc::UnboundedSender<ViewEvent>,
}

impl ViewHandle {
    pub fn open(&self, group: Group) {
        self.send(ViewEvent::Open(group));
    }

    pub fn close(&self) {
        self.send(ViewEvent::Close);
    }

    pub fn refresh(&self) {
        self.send(ViewEvent::Refresh);
    }

    pub fn shutdown(&self) {
        self.send(ViewEvent::Shutdown);
    }

    fn send(&self, event: ViewEvent) {
        if self.events.send(event).is_err() {
            debug!("group view already stopped");
        }
    }
}

struct OpenGroup {
    group: Group,
    generation: u64,
    roster: RosterStore,
    channel: LiveUpdateChannel,
}

pub struct GroupView<M> {
    identity: String,
    api: Arc<dyn LocationApi>,
    connector: Arc<dyn StreamConnector>,
    map: M,
    fitter: ViewportFitter,
    open: Option<OpenGroup>,
    generation: u64,
    events: mpsc::UnboundedSender<ViewEvent>,
}

impl<M: MapSurface> GroupView<M> {
    pub fn new(
        identity: &str,
        api: Arc<dyn LocationApi>,
        connector: Arc<dyn StreamConnector>,
        map: M,
        fitter: ViewportFitter,
    ) -> (Self, ViewHandle, mpsc::UnboundedReceiver<ViewEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let view = Self {
            identity: identity.to_string(),
            api,
            connector,
            map,
            fitter,
            open: None,
            generation: 0,
            events: events.clone(),
        };
        (view, ViewHandle { events }, rx)
    }

    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ViewEvent>) {
        while let Some(event) = rx.recv().await {
            if self.handle(event).is_break() {
                break;
            }
        }
        self.close_current();
    }

    pub fn handle(&mut self, event: ViewEvent) -> ControlFlow<()> {
        match event {
            ViewEvent::Open(group) => self.open_group(group),
            ViewEvent::Close => self.close_current(),
            ViewEvent::Refresh => match &self.open {
                Some(open) => self.fetch_snapshot(&open.group.id, open.generation),
                None => debug!("refresh with no group open"),
            },
            ViewEvent::Snapshot { generation, result } => self.on_snapshot(generation, result),
            ViewEvent::Update { generation, update } => self.on_update(generation, update),
            ViewEvent::ChannelClosed { generation } => {
                if let Some(open) = self.current(generation) {
                    // No reconnect: the stream comes back only when the group is opened again.
                    info!(group_id = %open.group.id, "live updates stopped");
                }
            }
            ViewEvent::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    pub fn group(&self) -> Option<&Group> {
        self.open.as_ref().map(|open| &open.group)
    }

    pub fn roster(&self) -> Option<&RosterStore> {
        self.open.as_ref().map(|open| &open.roster)
    }

    /// Generation of the open group, if any.
    pub fn generation(&self) -> Option<u64> {
        self.open.as_ref().map(|open| open.generation)
    }

    pub fn channel_state(&self) -> ChannelState {
        self.open
            .as_ref()
            .map(|open| open.channel.state())
            .unwrap_or(ChannelState::Closed)
    }

    fn open_group(&mut self, group: Group) {
        self.close_current();

        self.generation += 1;
        let generation = self.generation;
        info!(group_id = %group.id, name = %group.name, generation, "opening group");

        let channel = LiveUpdateChannel::open(
            self.connector.clone(),
            &group.id,
            generation,
            self.events.clone(),
        );
        self.fetch_snapshot(&group.id, generation);
        self.fitter.reset();
        self.open = Some(OpenGroup {
            group,
            generation,
            roster: RosterStore::new(),
            channel,
        });
    }

    fn close_current(&mut self) {
        if let Some(open) = self.open.take() {
            info!(group_id = %open.group.id, generation = open.generation, "closing group");
            // Dropping the channel cancels its reader; anything it already
            // queued is discarded by the generation check.
            drop(open.channel);
        }
    }

    fn fetch_snapshot(&self, group_id: &str, generation: u64) {
        let api = self.api.clone();
        let events = self.events.clone();
        let identity = self.identity.clone();
        let group_id = group_id.to_string();
        tokio::spawn(async move {
            let result = api.fetch_snapshot(&identity, &group_id).await;
            let _ = events.send(ViewEvent::Snapshot { generation, result });
        });
    }

    fn current(&mut self, generation: u64) -> Option<&mut OpenGroup> {
        self.open
            .as_mut()
            .filter(|open| open.generation == generation)
    }

    fn on_snapshot(&mut self, generation: u64, result: crate::Result<Vec<Member>>) {
        let Some(open) = self.current(generation) else {
            debug!(generation, "dropping snapshot for a closed group");
            return;
        };
        match result {
            Ok(members) => {
                info!(group_id = %open.group.id, members = members.len(), "snapshot loaded");
                open.roster.initialize(members);
            }
            Err(err) => {
                warn!(group_id = %open.group.id, error = %err, "failed to fetch snapshot");
            }
        }
        self.redraw();
    }

    fn on_update(&mut self, generation: u64, update: LocationUpdate) {
        let Some(open) = self.current(generation) else {
            debug!(
                generation,
                identity = %update.identity,
                "dropping update from a closed channel"
            );
            return;
        };
        debug!(group_id = %open.group.id, identity = %update.identity, "applying live update");
        open.roster.apply(update);
        self.redraw();
    }

    fn redraw(&mut self) {
        let Some(open) = &self.open else {
            return;
        };
        let markers: Vec<Marker> = open
            .roster
            .sorted()
            .into_iter()
            .filter(|member| member.has_valid_position())
            .map(Marker::from)
            .collect();
        self.map.render_markers(&markers);

        if let Some(command) = self.fitter.evaluate(&open.roster) {
            self.map.fly_to_bounds(&command);
        }
    }
}
