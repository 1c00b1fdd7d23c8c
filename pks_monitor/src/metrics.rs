//! The monitor's metric sink

use std::fmt;
use std::time::Duration;

use metrics::Gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// The sink for everything the monitor measures
///
/// Owns a private Prometheus recorder rather than installing one globally,
/// so each sink is self-contained: components report through whichever
/// instance they were handed, and tests can assert on a sink of their own
/// without fighting over process-wide state. Handles are cheap to clone and
/// all point at the same registry.
#[derive(Clone)]
pub struct ApiMetrics {
    api_up: Gauge,
    api_latency: Gauge,
    handle: PrometheusHandle,
}

impl ApiMetrics {
    /// Constructs a sink with its own private recorder
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        let (api_up, api_latency) = metrics::with_local_recorder(&recorder, || {
            metrics::describe_gauge!("pks_api_up", "Whether the PKS API is up, 1 or 0");
            metrics::describe_gauge!(
                "pks_api_latency",
                "Round-trip time of the last PKS API probe, in milliseconds"
            );
            (
                metrics::gauge!("pks_api_up"),
                metrics::gauge!("pks_api_latency"),
            )
        });

        Self {
            api_up,
            api_latency,
            handle,
        }
    }

    /// Records whether the last probe found the API reachable and healthy
    pub fn set_api_up(&self, up: bool) {
        self.api_up.set(if up { 1.0 } else { 0.0 });
    }

    /// Records the round-trip time of the last probe
    pub fn record_latency(&self, elapsed: Duration) {
        self.api_latency.set(elapsed.as_millis() as f64);
    }

    /// Renders the registry in the Prometheus text exposition format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ApiMetrics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ApiMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauges_are_rendered_even_before_the_first_probe() {
        let metrics = ApiMetrics::new();
        let rendered = metrics.render();

        assert!(rendered.contains("pks_api_up"));
        assert!(rendered.contains("pks_api_latency"));
    }

    #[test]
    fn up_gauge_tracks_the_last_value_set() {
        let metrics = ApiMetrics::new();

        metrics.set_api_up(true);
        assert!(metrics.render().contains("pks_api_up 1"));

        metrics.set_api_up(false);
        assert!(metrics.render().contains("pks_api_up 0"));
    }

    #[test]
    fn sinks_do_not_share_state() {
        let one = ApiMetrics::new();
        let other = ApiMetrics::new();

        one.set_api_up(true);

        assert!(one.render().contains("pks_api_up 1"));
        assert!(other.render().contains("pks_api_up 0"));
    }

    #[test]
    fn latency_is_recorded_in_milliseconds() {
        let metrics = ApiMetrics::new();

        metrics.record_latency(Duration::from_millis(250));

        assert!(metrics.render().contains("pks_api_latency 250"));
    }
}
