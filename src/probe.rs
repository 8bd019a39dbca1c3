//! Host availability probing.
//!
//! Uses the system `ping` as an ICMP echo primitive, the same way the
//! player host is probed from a stock Raspberry Pi image. Unreachable is
//! a normal `false`, never an error.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Echo requests per probe.
const PROBE_COUNT: u8 = 5;

/// Per-request reply timeout, in seconds.
const PROBE_TIMEOUT_SECS: u8 = 3;

/// Pause between availability retries.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Retries after the initial probe before giving up.
pub const MAX_RETRIES: u32 = 6;

/// Checks whether `host` answers ICMP echo requests.
///
/// Sends [`PROBE_COUNT`] requests waiting [`PROBE_TIMEOUT_SECS`] for each
/// reply; true iff at least one reply arrives. A `ping` binary that
/// cannot be spawned also counts as unavailable.
pub async fn is_available(host: &str) -> bool {
    let status = Command::new("ping")
        .arg("-c")
        .arg(PROBE_COUNT.to_string())
        .arg("-W")
        .arg(PROBE_TIMEOUT_SECS.to_string())
        .arg(host)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) => status.success(),
        Err(e) => {
            debug!("could not probe {host}: {e}");
            false
        }
    }
}

/// Waits for `host` to become available, with a bounded retry schedule.
///
/// Probes once immediately, then up to [`MAX_RETRIES`] more times spaced
/// [`RETRY_INTERVAL`] apart. Returns whether the host answered within
/// the schedule.
///
/// The probe function is injected so the schedule can be tested without
/// a network.
pub async fn await_host<F, Fut>(host: &str, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    if probe().await {
        return true;
    }

    for attempt in 1..=MAX_RETRIES {
        info!("waiting for host {host} to be available (attempt {attempt}/{MAX_RETRIES})");
        tokio::time::sleep(RETRY_INTERVAL).await;
        if probe().await {
            return true;
        }
    }

    false
}

/// Decides whether the player host is reachable.
///
/// The controller probes through this trait, so connect and reconnect
/// behavior can be driven without touching the network.
#[allow(async_fn_in_trait)]
pub trait Prober {
    /// Whether `host` currently answers reachability probes.
    async fn probe(&self, host: &str) -> bool;
}

/// [`Prober`] backed by the system `ping`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PingProber;

impl Prober for PingProber {
    async fn probe(&self, host: &str) -> bool {
        is_available(host).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_bounded_retries() {
        let probes = AtomicU32::new(0);
        let start = Instant::now();

        let available = await_host("stereo.local", || {
            probes.fetch_add(1, Ordering::SeqCst);
            async { false }
        })
        .await;

        assert!(!available);
        // One initial probe plus the full retry schedule.
        assert_eq!(probes.load(Ordering::SeqCst), 1 + MAX_RETRIES);
        assert_eq!(start.elapsed(), RETRY_INTERVAL * MAX_RETRIES);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_as_soon_as_the_host_answers() {
        let probes = AtomicU32::new(0);
        let start = Instant::now();

        let available = await_host("stereo.local", || {
            let attempt = probes.fetch_add(1, Ordering::SeqCst);
            async move { attempt == 3 }
        })
        .await;

        assert!(available);
        assert_eq!(probes.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), RETRY_INTERVAL * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_availability_skips_the_schedule() {
        let start = Instant::now();
        assert!(await_host("stereo.local", || async { true }).await);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
