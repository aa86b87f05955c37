//! Device and server connectivity tracking.
//!
//! [`ConnectivityMonitor`] is a plain state machine: callers feed it device
//! events and probe results, and it decides the next poll interval and
//! publishes a two-boolean [`ConnectivityStatus`] over a `watch` channel.
//! [`run_connectivity_monitor`] drives it from a device event stream and a
//! [`ServerProbe`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info};

use gantt_runtime_config::ConnectivitySettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    DeviceOffline,
    DeviceOnlineServerUnknown,
    DeviceOnlineServerUp,
    DeviceOnlineServerDown,
}

impl ConnectivityState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DeviceOffline => "device_offline",
            Self::DeviceOnlineServerUnknown => "device_online_server_unknown",
            Self::DeviceOnlineServerUp => "device_online_server_up",
            Self::DeviceOnlineServerDown => "device_online_server_down",
        }
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the UI may know about connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityStatus {
    pub device_online: bool,
    pub server_reachable: bool,
}

impl From<ConnectivityState> for ConnectivityStatus {
    fn from(state: ConnectivityState) -> Self {
        Self {
            device_online: state != ConnectivityState::DeviceOffline,
            server_reachable: state == ConnectivityState::DeviceOnlineServerUp,
        }
    }
}

/// Device network transitions reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    Online,
    Offline,
}

/// Identifies one probe. Results for tickets issued before the latest device
/// event are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTicket {
    epoch: u64,
}

/// Floor for both poll intervals; a zero interval would re-probe in a loop.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    /// While the server is up.
    pub up: Duration,
    /// While the server is down or not yet probed.
    pub down: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            up: Duration::from_secs(30),
            down: Duration::from_secs(5),
        }
    }
}

impl PollIntervals {
    /// Both intervals raised to at least [`MIN_POLL_INTERVAL`].
    pub fn clamped(self) -> Self {
        Self {
            up: self.up.max(MIN_POLL_INTERVAL),
            down: self.down.max(MIN_POLL_INTERVAL),
        }
    }
}

impl From<&ConnectivitySettings> for PollIntervals {
    fn from(settings: &ConnectivitySettings) -> Self {
        Self {
            up: settings.up_interval(),
            down: settings.down_interval(),
        }
        .clamped()
    }
}

pub struct ConnectivityMonitor {
    state: ConnectivityState,
    intervals: PollIntervals,
    epoch: u64,
    status_tx: watch::Sender<ConnectivityStatus>,
}

impl ConnectivityMonitor {
    /// Starts as online with the server not yet probed.
    pub fn new(intervals: PollIntervals) -> Self {
        let state = ConnectivityState::DeviceOnlineServerUnknown;
        let (status_tx, _) = watch::channel(ConnectivityStatus::from(state));
        Self {
            state,
            intervals: intervals.clamped(),
            epoch: 0,
            status_tx,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn status(&self) -> ConnectivityStatus {
        ConnectivityStatus::from(self.state)
    }

    /// Receives the status whenever one of its two booleans changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityStatus> {
        self.status_tx.subscribe()
    }

    pub fn device_offline(&mut self) {
        self.epoch += 1;
        self.transition(ConnectivityState::DeviceOffline);
    }

    /// Returns the ticket for the immediate probe the caller must start.
    ///
    /// Only a device that was offline forgets what it knew about the server;
    /// a repeated online event keeps the current state until the probe lands.
    pub fn device_online(&mut self) -> ProbeTicket {
        self.epoch += 1;
        if self.state == ConnectivityState::DeviceOffline {
            self.transition(ConnectivityState::DeviceOnlineServerUnknown);
        }
        ProbeTicket { epoch: self.epoch }
    }

    /// Ticket for a scheduled poll, or `None` while offline.
    pub fn poll_ticket(&self) -> Option<ProbeTicket> {
        (self.state != ConnectivityState::DeviceOffline).then_some(ProbeTicket {
            epoch: self.epoch,
        })
    }

    /// Apply a probe result. Returns false when the result was discarded.
    pub fn probe_finished(&mut self, ticket: ProbeTicket, reachable: bool) -> bool {
        if ticket.epoch != self.epoch || self.state == ConnectivityState::DeviceOffline {
            debug!("Discarding stale probe result");
            return false;
        }
        self.transition(if reachable {
            ConnectivityState::DeviceOnlineServerUp
        } else {
            ConnectivityState::DeviceOnlineServerDown
        });
        true
    }

    pub fn next_poll_interval(&self) -> Option<Duration> {
        match self.state {
            ConnectivityState::DeviceOffline => None,
            ConnectivityState::DeviceOnlineServerUp => Some(self.intervals.up),
            ConnectivityState::DeviceOnlineServerUnknown
            | ConnectivityState::DeviceOnlineServerDown => Some(self.intervals.down),
        }
    }

    fn transition(&mut self, next: ConnectivityState) {
        if self.state != next {
            info!("Connectivity: {} -> {}", self.state, next);
            self.state = next;
        }
        let status = ConnectivityStatus::from(next);
        self.status_tx.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }
}

/// Checks whether the server answers.
pub trait ServerProbe: Send + Sync {
    /// True when the server answered successfully in time.
    fn probe(&self) -> impl Future<Output = bool> + Send;
}

/// Drive `monitor` until `shutdown` flips to true or its sender is dropped,
/// then return it.
///
/// Probes run on their own tasks so device events are handled while one is in
/// flight; the monitor discards results that arrive after a newer event.
pub async fn run_connectivity_monitor<P: ServerProbe + 'static>(
    probe: Arc<P>,
    mut monitor: ConnectivityMonitor,
    mut events: mpsc::Receiver<DeviceEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> ConnectivityMonitor {
    let mut probes: JoinSet<(ProbeTicket, bool)> = JoinSet::new();
    let mut events_open = true;
    let mut next_poll = None;

    if let Some(ticket) = monitor.poll_ticket() {
        spawn_probe(&mut probes, &probe, ticket);
    }

    loop {
        tokio::select! {
            event = events.recv(), if events_open => match event {
                Some(DeviceEvent::Offline) => {
                    monitor.device_offline();
                    next_poll = None;
                }
                Some(DeviceEvent::Online) => {
                    let ticket = monitor.device_online();
                    spawn_probe(&mut probes, &probe, ticket);
                    next_poll = None;
                }
                None => {
                    debug!("Device event stream closed");
                    events_open = false;
                }
            },
            Some(joined) = probes.join_next(), if !probes.is_empty() => {
                if let Ok((ticket, reachable)) = joined {
                    if monitor.probe_finished(ticket, reachable) {
                        next_poll = monitor.next_poll_interval().map(|d| Instant::now() + d);
                    }
                }
            }
            _ = wait_until(next_poll) => {
                next_poll = None;
                if let Some(ticket) = monitor.poll_ticket() {
                    spawn_probe(&mut probes, &probe, ticket);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("Connectivity monitor shutting down");
                    break;
                }
            }
        }
    }

    probes.abort_all();
    monitor
}

fn spawn_probe<P: ServerProbe + 'static>(
    probes: &mut JoinSet<(ProbeTicket, bool)>,
    probe: &Arc<P>,
    ticket: ProbeTicket,
) {
    let probe = Arc::clone(probe);
    probes.spawn(async move { (ticket, probe.probe().await) });
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
