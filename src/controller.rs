//! High-level control of the remote player.
//!
//! The [`Controller`] owns the event channel and the state store, and is
//! the only component that touches either. It is a small state machine:
//! `Disconnected` -> `Probing` -> `Connected`, back to `Disconnected` on
//! explicit disconnect, shutdown, or a transport failure noticed while
//! emitting. A failed connect is degraded operation, not a crash: the
//! caller keeps running and a later dispatch retries.

use std::time::Duration;

use crate::channel::EventChannel;
use crate::command::{Command, Direction};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::probe::{self, PingProber, Prober};
use crate::protocol::{Emit, PushKind, VolumeTarget};
use crate::state::{PlaybackState, StateStore};

/// Window granted to the channel task to deliver pending pushes.
const QUIESCENT_WAIT: Duration = Duration::from_secs(1);

/// Lifecycle of the connection to the player.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ConnectionStatus {
    /// No channel open.
    #[default]
    Disconnected,
    /// Waiting for the host to answer availability probes.
    Probing,
    /// Channel open and handlers installed.
    Connected,
}

/// Issues player operations and mirrors pushed state.
pub struct Controller<P = PingProber> {
    host: String,
    endpoint: String,
    channel: Option<EventChannel>,
    store: StateStore,
    status: ConnectionStatus,
    prober: P,
}

impl Controller {
    /// Creates a disconnected controller for the configured player.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::with_prober(config, PingProber)
    }
}

impl<P: Prober> Controller<P> {
    /// Creates a disconnected controller that probes through `prober`.
    #[must_use]
    pub fn with_prober(config: &Config, prober: P) -> Self {
        Self {
            host: config.host.clone(),
            endpoint: config.endpoint(),
            channel: None,
            store: StateStore::new(),
            status: ConnectionStatus::Disconnected,
            prober,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Whether a channel is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Read-only copy of the last known playback state.
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.store.snapshot()
    }

    /// Probes the host and opens the event channel.
    ///
    /// Probing retries on the bounded schedule in [`probe`]; if the host
    /// never answers, the controller settles back to `Disconnected` and
    /// returns `Unavailable`. On success the push handlers are installed
    /// and an initial state query is issued.
    pub async fn connect(&mut self) -> Result<()> {
        self.status = ConnectionStatus::Probing;

        let host = self.host.clone();
        if !probe::await_host(&host, || self.prober.probe(&host)).await {
            self.status = ConnectionStatus::Disconnected;
            return Err(Error::unavailable(format!(
                "host {host} was not found alive"
            )));
        }

        self.open_channel().await
    }

    /// Opens the channel and installs the push handlers.
    async fn open_channel(&mut self) -> Result<()> {
        let channel = match EventChannel::connect(&self.endpoint).await {
            Ok(channel) => channel,
            Err(e) => {
                self.status = ConnectionStatus::Disconnected;
                return Err(e);
            }
        };

        let store = self.store.clone();
        channel.on(PushKind::State, move |payload| store.apply_push(&payload));
        channel.on(PushKind::BrowseLibrary, |_| {
            info!("received browsing results");
        });

        self.channel = Some(channel);
        self.status = ConnectionStatus::Connected;
        info!("connected to {}", self.host);

        self.refresh_state().await
    }

    /// Routes a parsed command to the matching operation.
    ///
    /// When disconnected, one full reconnect attempt (probe schedule
    /// included) is made first; if the player is still unreachable the
    /// command is dropped with `FailedPrecondition`.
    pub async fn dispatch(&mut self, command: Command) -> Result<()> {
        if !self.is_connected() {
            info!("not connected, trying to reach {} again", self.host);
            if let Err(e) = self.connect().await {
                return Err(Error::failed_precondition(format!(
                    "player not reachable, dropping command: {e}"
                )));
            }
        }

        match command {
            Command::Toggle => self.toggle().await,
            Command::Next => self.next().await,
            Command::Previous => self.previous().await,
            Command::VolumeRelative(Direction::Up) => self.set_volume(VolumeTarget::Up).await,
            Command::VolumeRelative(Direction::Down) => self.set_volume(VolumeTarget::Down).await,
            Command::VolumeAbsolute(level) => self.set_volume(VolumeTarget::Absolute(level)).await,
            Command::PlayUri { uri, .. } => self.play_uri(&uri).await,
        }
    }

    /// Toggles between play and pause.
    pub async fn toggle(&mut self) -> Result<()> {
        self.emit(Emit::Toggle)
    }

    /// Skips to the next track.
    pub async fn next(&mut self) -> Result<()> {
        self.emit(Emit::Next)
    }

    /// Skips to the previous track.
    pub async fn previous(&mut self) -> Result<()> {
        self.emit(Emit::Previous)
    }

    /// Changes the volume, relative or absolute.
    pub async fn set_volume(&mut self, target: VolumeTarget) -> Result<()> {
        self.emit(Emit::Volume(target))
    }

    /// Starts playback of a uri and confirms it best-effort.
    ///
    /// The emit is fire-and-forget; after a quiescent wait the mirrored
    /// state is refreshed and compared against the request. A mismatch is
    /// only a warning: the remote may simply not have processed the
    /// command yet.
    pub async fn play_uri(&mut self, uri: &str) -> Result<()> {
        self.emit(Emit::AddPlay {
            uri: uri.to_owned(),
        })?;
        self.wait_quiescent().await;
        self.refresh_state().await?;

        let current = self.store.snapshot().uri;
        if current.as_deref() == Some(uri) {
            debug!("successfully started playing {uri}");
        } else {
            warn!("could not confirm playback of {uri}, player reports {current:?}");
        }
        Ok(())
    }

    /// Emits the shutdown event and tears down locally.
    ///
    /// Does not wait for an acknowledgement; the remote terminates its
    /// own session.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.emit(Emit::Shutdown)?;
        self.disconnect().await;
        Ok(())
    }

    /// Closes the channel and settles at `Disconnected`.
    pub async fn disconnect(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.disconnect().await;
        }
        self.status = ConnectionStatus::Disconnected;
    }

    /// Queries the remote state and lets the push land in the store.
    async fn refresh_state(&mut self) -> Result<()> {
        self.emit(Emit::GetState)?;
        self.wait_quiescent().await;
        Ok(())
    }

    async fn wait_quiescent(&self) {
        if let Some(channel) = &self.channel {
            channel.wait_quiescent(QUIESCENT_WAIT).await;
        }
    }

    /// Queues one event on the channel.
    ///
    /// A send failure means the channel task died underneath us; the
    /// controller drops the dead handle and reports `Aborted` so the
    /// caller can retry on the next command.
    fn emit(&mut self, event: Emit) -> Result<()> {
        let Some(channel) = &self.channel else {
            return Err(Error::failed_precondition("not connected to the player"));
        };

        if let Err(e) = channel.emit(event) {
            self.channel = None;
            self.status = ConnectionStatus::Disconnected;
            return Err(Error::aborted(e));
        }
        Ok(())
    }
}
