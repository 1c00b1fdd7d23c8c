//! The API prober and its re-authentication control flow

use std::fmt;
use std::time::Instant;

use http::StatusCode;
use pks_monitor_reqwest::token_expired;
use pks_monitor_tokens::{TokenAuthority, TokenRequestError, TokenStore};
use reqwest::{header, Url};
use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;

use crate::metrics::ApiMetrics;

/// Probes the cluster API and owns the re-authentication policy
///
/// The prober is the only component that decides when to talk to the token
/// authority. The transport underneath it does nothing but attach whatever
/// token the store currently holds, so a single probe is the unit of retry:
/// an authorization failure triggers one grant and one retry of the original
/// request, and the retry's result is final for this cycle.
pub struct ApiProber {
    client: ClientWithMiddleware,
    clusters_url: Url,
    authority: TokenAuthority,
    token_store: TokenStore,
    metrics: ApiMetrics,
}

impl ApiProber {
    /// Constructs a prober for the list-clusters endpoint at `clusters_url`
    pub fn new(
        client: ClientWithMiddleware,
        clusters_url: Url,
        authority: TokenAuthority,
        token_store: TokenStore,
        metrics: ApiMetrics,
    ) -> Self {
        Self {
            client,
            clusters_url,
            authority,
            token_store,
            metrics,
        }
    }

    /// Runs one probe cycle and reports the result to the metric sink
    ///
    /// `Ok(true)` means the API answered 200. `Ok(false)` means the API
    /// answered, but with a failure status: the host is reachable yet
    /// unhealthy, which is not an error condition for the monitor. `Err`
    /// covers everything that prevented getting an answer at all, including
    /// a failed re-authentication.
    pub async fn probe(&self) -> Result<bool, ProbeError> {
        let start = Instant::now();
        let result = self.check_api().await;

        match &result {
            Ok(up) => {
                self.metrics.set_api_up(*up);
                self.metrics.record_latency(start.elapsed());
            }
            Err(_) => self.metrics.set_api_up(false),
        }

        result
    }

    async fn check_api(&self) -> Result<bool, ProbeError> {
        let resp = self.list_clusters().await?;
        let status = resp.status();

        if !requires_reauthentication(status) {
            return Ok(interpret(status));
        }

        let body = resp.bytes().await.unwrap_or_default();
        tracing::info!(
            response.status = status.as_u16(),
            token.expired = token_expired(status, &body),
            "api rejected authorization, reauthenticating"
        );

        let credential = self.authority.request_token().await?;
        self.token_store.set(credential);

        let retry = self.list_clusters().await?;
        let retry_status = retry.status();
        if requires_reauthentication(retry_status) {
            return Err(ProbeError::StillUnauthorized {
                status: retry_status,
            });
        }

        Ok(interpret(retry_status))
    }

    async fn list_clusters(&self) -> Result<reqwest::Response, ProbeError> {
        self.client
            .get(self.clusters_url.clone())
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(ProbeError::Unreachable)
    }
}

impl fmt::Debug for ApiProber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ApiProber")
            .field("clusters_url", &self.clusters_url)
            .finish_non_exhaustive()
    }
}

fn requires_reauthentication(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

// 200 is up; any other answer means the host is reachable but unhealthy.
fn interpret(status: StatusCode) -> bool {
    status == StatusCode::OK
}

/// An error that prevented a probe from getting an answer
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The API could not be reached at the network level
    #[error("error sending request to the cluster API")]
    Unreachable(#[source] reqwest_middleware::Error),
    /// The API rejected authorization again after a fresh grant
    #[error("cluster API still rejects authorization after refreshing the token: {status}")]
    StillUnauthorized {
        /// The status of the retried request
        status: StatusCode,
    },
    /// A fresh token could not be obtained
    #[error("could not refresh the API token")]
    Auth(#[from] TokenRequestError),
}
