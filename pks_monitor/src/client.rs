//! Construction of the TLS-aware HTTP client

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::MonitorConfig;

/// Bound on any single request, probe or grant alike
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Builds the `reqwest` client shared by the prober and the authority
///
/// The client carries a 60-second timeout so a wedged API cannot stall a
/// probe indefinitely; a request past the timeout surfaces as a network
/// failure. TLS honors the configured CA bundle, or skips verification
/// when the deployment asks for it.
pub fn build_http_client(config: &MonitorConfig) -> Result<reqwest::Client, HttpClientError> {
    let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);

    if config.skip_ssl_verification {
        tracing::warn!("TLS certificate verification is disabled");
        builder = builder.danger_accept_invalid_certs(true);
    } else if let Some(path) = &config.ca_cert {
        let pem = std::fs::read(path).map_err(|source| HttpClientError::ReadCaCert {
            path: path.clone(),
            source,
        })?;
        let certificate =
            reqwest::Certificate::from_pem(&pem).map_err(|source| HttpClientError::ParseCaCert {
                path: path.clone(),
                source,
            })?;
        builder = builder.add_root_certificate(certificate);
    }

    builder.build().map_err(HttpClientError::Build)
}

/// An error constructing the HTTP client
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// The CA bundle could not be read from disk
    #[error("could not read CA certificate bundle at {}", path.display())]
    ReadCaCert {
        /// The configured bundle path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
    /// The CA bundle was not valid PEM
    #[error("could not parse CA certificate bundle at {}", path.display())]
    ParseCaCert {
        /// The configured bundle path
        path: PathBuf,
        /// The underlying parse error
        #[source]
        source: reqwest::Error,
    },
    /// The client itself failed to build
    #[error("could not construct HTTP client")]
    Build(#[source] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn config(extra: &[&str]) -> MonitorConfig {
        let mut argv = vec![
            "pks-monitor",
            "--api-url",
            "https://api.pks.example.com:9021",
            "--client-id",
            "id",
            "--client-secret",
            "secret",
        ];
        argv.extend_from_slice(extra);
        MonitorConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn builds_without_tls_customization() {
        build_http_client(&config(&[])).unwrap();
    }

    #[test]
    fn builds_with_verification_disabled() {
        build_http_client(&config(&["--skip-ssl-verification"])).unwrap();
    }

    #[test]
    fn a_missing_ca_bundle_is_reported_with_its_path() {
        let error =
            build_http_client(&config(&["--ca-cert", "/nonexistent/ca.pem"])).unwrap_err();

        assert!(matches!(error, HttpClientError::ReadCaCert { .. }));
        assert!(error.to_string().contains("/nonexistent/ca.pem"));
    }
}
