//! Reachability monitoring for a PKS cluster API
//!
//! The monitor probes the API's list-clusters endpoint on a fixed interval
//! and publishes the outcome as a Prometheus gauge. Authorization uses an
//! OAuth2 client-credentials grant against the deployment's token authority;
//! when the API rejects a request because the token has gone stale, the
//! prober refreshes the credential and retries the request once within the
//! same cycle, so a routine token expiry never shows up as an outage.
//!
//! Probe failures are absorbed here: they are reflected in the gauge and
//! logged, and the loop carries on. The process only exits on an OS signal,
//! a request to the pre-stop endpoint, or a configuration error at startup.

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

pub mod client;
pub mod config;
mod metrics;
mod monitor;
pub mod probe;
pub mod server;

pub use config::MonitorConfig;
pub use metrics::ApiMetrics;
pub use monitor::Monitor;
pub use probe::{ApiProber, ProbeError};
