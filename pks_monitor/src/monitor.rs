//! The fixed-interval poll loop

use std::error;
use std::fmt;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::probe::ApiProber;

/// Drives the prober on a fixed interval until shutdown is requested
///
/// A failed probe is never fatal: it has already been reflected in the
/// metric, so the loop logs it and waits for the next tick. The only way
/// out of the loop is the shared cancellation token, which is triggered by
/// an OS signal, the pre-stop endpoint, or the HTTP server going away.
pub struct Monitor {
    prober: ApiProber,
    interval: Duration,
    shutdown: CancellationToken,
}

impl Monitor {
    /// Constructs a monitor probing every `interval`
    pub fn new(prober: ApiProber, interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            prober,
            interval,
            shutdown,
        }
    }

    /// Runs the loop until the cancellation token fires
    ///
    /// Cancellation is observed between probes only; a probe in flight runs
    /// to completion (bounded by the client's request timeout) before the
    /// loop notices.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        // Probes are strictly sequential. If one overruns its interval, skip
        // the missed ticks rather than bursting to catch up.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; consume it so the first
        // probe lands one full interval after startup.
        ticker.tick().await;

        tracing::info!(interval_secs = self.interval.as_secs(), "monitor started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("shutdown requested, stopping monitor");
                    break;
                }
                _ = ticker.tick() => {
                    match self.prober.probe().await {
                        Ok(true) => tracing::debug!("api is up"),
                        Ok(false) => tracing::warn!("api is reachable but unhealthy"),
                        Err(error) => tracing::warn!(
                            error = (&error as &dyn error::Error),
                            "could not check api"
                        ),
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
