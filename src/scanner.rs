//! The scan-parse-dispatch loop.
//!
//! Reads raw lines from an external code reader, strips the fixed-length
//! type prefix the reader prepends, parses the payload into a
//! [`Command`], and hands it to the player. One token is fully dispatched
//! before the next is read. Parse and dispatch failures are logged and
//! the loop continues; only cancellation or the source ending stop it,
//! and every exit path runs the same teardown.
//!
//! The external process and the controller are both behind small traits
//! ([`TokenSource`], [`Dispatch`]) so the loop's cancellation and
//! teardown behavior is testable without a camera or a network.

use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout};
use tokio_util::sync::CancellationToken;

use crate::command::Command;
use crate::controller::Controller;
use crate::error::{Error, Result};
use crate::probe::Prober;

/// Length of the type/format header each scanned line carries, e.g.
/// `QR-Code:`. Fixed by the reader's output format, not configurable.
pub const TYPE_PREFIX_LEN: usize = 8;

/// One scanned line, consumed immediately and never persisted.
#[derive(Clone, Debug)]
pub struct RawToken {
    /// The line as produced by the reader, type prefix included.
    pub text: String,
    /// Arrival time of the line.
    pub scanned_at: Instant,
}

impl RawToken {
    /// Wraps a freshly read line.
    #[must_use]
    pub fn new(text: String) -> Self {
        Self {
            text,
            scanned_at: Instant::now(),
        }
    }

    /// The payload behind the type prefix, trailing whitespace stripped.
    ///
    /// `None` when the line is shorter than the prefix.
    #[must_use]
    pub fn payload(&self) -> Option<&str> {
        self.text.get(TYPE_PREFIX_LEN..).map(str::trim_end)
    }
}

/// A lazy, closeable producer of scanned lines.
#[allow(async_fn_in_trait)]
pub trait TokenSource {
    /// Reads the next line; `None` when the source has ended.
    async fn next_token(&mut self) -> Result<Option<RawToken>>;

    /// Releases the source.
    async fn close(&mut self) -> Result<()>;
}

/// The player-facing seam the loop dispatches into.
#[allow(async_fn_in_trait)]
pub trait Dispatch {
    /// Executes one command against the player.
    async fn dispatch(&mut self, command: Command) -> Result<()>;

    /// Tears the player connection down.
    async fn disconnect(&mut self);

    /// Whether the player connection is up.
    fn is_connected(&self) -> bool;
}

impl<P: Prober> Dispatch for Controller<P> {
    async fn dispatch(&mut self, command: Command) -> Result<()> {
        Controller::dispatch(self, command).await
    }

    async fn disconnect(&mut self) {
        Controller::disconnect(self).await;
    }

    fn is_connected(&self) -> bool {
        Controller::is_connected(self)
    }
}

/// [`TokenSource`] backed by a spawned `zbarcam` process.
pub struct ZbarSource {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

impl ZbarSource {
    /// Spawns the reader process with its stdout piped.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty command line, otherwise whatever
    /// the spawn itself reports.
    pub fn spawn(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::invalid_argument("scanner command is empty"))?;

        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        debug!("spawned scanner process {program}");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::internal("scanner process has no stdout"))?;

        Ok(Self {
            child,
            lines: BufReader::new(stdout).lines(),
        })
    }
}

impl TokenSource for ZbarSource {
    async fn next_token(&mut self) -> Result<Option<RawToken>> {
        Ok(self.lines.next_line().await?.map(RawToken::new))
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(e) = self.child.kill().await {
            debug!("scanner process already gone: {e}");
        }
        Ok(())
    }
}

/// Drives tokens from a source into the player until cancelled.
pub struct Scanner<S, D> {
    source: S,
    player: D,
}

impl<S, D> Scanner<S, D>
where
    S: TokenSource,
    D: Dispatch,
{
    /// Pairs a token source with a player.
    pub fn new(source: S, player: D) -> Self {
        Self { source, player }
    }

    /// Runs the loop until cancellation or the source ends.
    ///
    /// Teardown runs on every exit path, read errors included: the
    /// player is disconnected and the source closed before the original
    /// result is returned. A close failure is only logged so teardown
    /// never replaces the scan result.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        let result = self.scan(&cancel).await;

        self.player.disconnect().await;
        if !self.player.is_connected() {
            info!("disconnected from server");
        }
        if let Err(e) = self.source.close().await {
            warn!("could not close scanner source: {e}");
        }

        result
    }

    async fn scan(&mut self, cancel: &CancellationToken) -> Result<()> {
        loop {
            let token = tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    info!("stopping scanner");
                    return Ok(());
                }

                token = self.source.next_token() => token?,
            };

            let Some(token) = token else {
                info!("scanner source ended");
                return Ok(());
            };

            // Dispatch completes before the next read; cancellation never
            // aborts a command in flight.
            self.handle_token(&token).await;
        }
    }

    /// Parses and dispatches a single token.
    async fn handle_token(&mut self, token: &RawToken) {
        let Some(payload) = token.payload() else {
            return;
        };
        if payload.is_empty() {
            return;
        }

        info!("scanned {payload}");
        match payload.parse::<Command>() {
            Ok(command) => {
                if let Err(e) = self.player.dispatch(command).await {
                    warn!("dropping command: {e}");
                }
            }
            Err(e) => warn!("ignoring token: {e}"),
        }
    }
}
