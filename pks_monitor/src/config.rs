//! Environment-derived configuration

use std::convert::Infallible;
use std::net::SocketAddr;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use pks_monitor_tokens::{ClientId, ClientSecret};
use reqwest::Url;
use thiserror::Error;

/// The port the token authority listens on when no authority URL is given
const UAA_PORT: u16 = 8443;

/// Configuration for the monitor, resolved from flags and the environment
#[derive(Debug, Parser)]
#[command(name = "pks-monitor", about = "Reports PKS API reachability as a Prometheus gauge")]
pub struct MonitorConfig {
    /// Base URL of the PKS API to monitor
    #[arg(long, env = "PKS_API")]
    pub api_url: Url,

    /// Base URL of the token authority; defaults to the API host on the UAA port
    #[arg(long, env = "UAA_API")]
    pub auth_url: Option<Url>,

    /// OAuth2 client ID used for the client-credentials grant
    #[arg(long, env = "UAA_CLI_ID", value_parser = client_id)]
    pub client_id: ClientId,

    /// OAuth2 client secret identifying this monitor to the authority
    #[arg(long, env = "UAA_CLI_SECRET", hide_env_values = true, value_parser = client_secret)]
    pub client_secret: ClientSecret,

    /// Seconds between probes of the API
    #[arg(long, env = "API_CHECK_INTERVAL_SECS", default_value = "30", value_parser = seconds)]
    pub interval: Duration,

    /// Path to a PEM bundle of additional root certificates to trust
    #[arg(long, env = "PKS_CA_CERT")]
    pub ca_cert: Option<PathBuf>,

    /// Skip TLS certificate verification entirely
    #[arg(long, env = "PKS_SKIP_SSL_VERIFICATION")]
    pub skip_ssl_verification: bool,

    /// Send a HEAD preflight to the authority's info endpoint before each grant
    #[arg(long, env = "UAA_PREFLIGHT")]
    pub auth_preflight: bool,

    /// Address the metrics and probe endpoints listen on
    #[arg(long, env = "MONITOR_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: SocketAddr,
}

impl MonitorConfig {
    /// The authority base URL
    ///
    /// When no authority URL was configured, the API host is assumed to
    /// front its own authority on the UAA port.
    pub fn auth_base(&self) -> Result<Url, ConfigError> {
        match &self.auth_url {
            Some(url) => Ok(url.clone()),
            None => {
                let mut url = self.api_url.clone();
                url.set_port(Some(UAA_PORT))
                    .map_err(|()| ConfigError::AuthorityFromApi(self.api_url.clone()))?;
                Ok(url)
            }
        }
    }

    /// The authority's token grant endpoint
    pub fn token_url(&self) -> Result<Url, ConfigError> {
        Ok(self.auth_base()?.join("/oauth/token")?)
    }

    /// The authority's informational endpoint, used for the grant preflight
    pub fn preflight_url(&self) -> Result<Url, ConfigError> {
        Ok(self.auth_base()?.join("/info")?)
    }

    /// The API's list-clusters endpoint, probed for reachability
    pub fn clusters_url(&self) -> Result<Url, ConfigError> {
        Ok(self.api_url.join("/v1/clusters")?)
    }
}

/// An error resolving derived configuration values
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The API URL cannot be rewritten to point at the authority
    #[error("cannot derive an authority address from the API URL {0}; set --auth-url explicitly")]
    AuthorityFromApi(Url),
    /// A derived endpoint URL failed to parse
    #[error("could not build a derived endpoint URL")]
    Endpoint(#[from] url::ParseError),
}

fn client_id(raw: &str) -> Result<ClientId, Infallible> {
    Ok(ClientId::from(raw))
}

fn client_secret(raw: &str) -> Result<ClientSecret, Infallible> {
    Ok(ClientSecret::from(raw))
}

fn seconds(raw: &str) -> Result<Duration, ParseIntError> {
    raw.parse::<u64>().map(Duration::from_secs)
}
