use std::sync::Arc;

use thiserror::Error;

use crate::{dto, Credential};

/// A client for the OAuth2 authority that issues API tokens
///
/// Performs the client-credentials exchange against the authority's
/// `/oauth/token` endpoint. The authority is deliberately stateless: it does
/// not remember the tokens it has produced, leaving installation into a
/// [`TokenStore`][crate::TokenStore] to the caller.
#[derive(Clone, Debug)]
pub struct TokenAuthority {
    client: reqwest::Client,
    token_url: reqwest::Url,
    preflight_url: Option<reqwest::Url>,
    credentials: Arc<dto::ClientCredentials>,
}

impl TokenAuthority {
    /// Constructs a new authority client
    pub fn new(
        client: reqwest::Client,
        token_url: reqwest::Url,
        credentials: dto::ClientCredentials,
    ) -> Self {
        Self {
            client,
            token_url,
            preflight_url: None,
            credentials: Arc::new(credentials),
        }
    }

    /// Enables a preflight `HEAD` request to `preflight_url` before each grant
    ///
    /// Some deployments front the authority with an intermediary that wants
    /// to establish session state before accepting a grant request. A 401
    /// from the preflight means the credentials themselves were rejected, and
    /// the grant is not attempted.
    pub fn with_preflight(mut self, preflight_url: reqwest::Url) -> Self {
        self.preflight_url = Some(preflight_url);
        self
    }

    /// Requests a fresh credential using the client-credentials grant
    #[tracing::instrument(
        err,
        skip(self),
        fields(
            token_url = %self.token_url,
            credentials.grant_type = "client_credentials",
            credentials.client_id = %self.credentials.client_id,
        ),
    )]
    pub async fn request_token(&self) -> Result<Credential, TokenRequestError> {
        if let Some(preflight_url) = &self.preflight_url {
            self.preflight(preflight_url.clone()).await?;
        }

        tracing::trace!("requesting token from authority");

        let resp = self
            .client
            .post(self.token_url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&*self.credentials)
            .send()
            .await
            .map_err(TokenRequestError::Unreachable)?;

        tracing::debug!(
            response.status = resp.status().as_u16(),
            "received token response from issuing authority"
        );

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(TokenRequestError::BodyRead)?;
            return Err(TokenRequestError::Rejected { status, body });
        }

        let body = resp.bytes().await.map_err(TokenRequestError::BodyRead)?;
        let resp: dto::TokenResponse = serde_json::from_slice(&body)?;

        tracing::info!(
            has_refresh_token = resp.refresh_token.is_some(),
            lifetime = resp.expires_in.map(|lifetime| lifetime.0),
            jti = resp.jti.as_deref(),
            "received new token"
        );

        Ok(Credential::new(
            resp.access_token,
            resp.refresh_token,
            resp.expires_in,
        ))
    }

    async fn preflight(&self, preflight_url: reqwest::Url) -> Result<(), TokenRequestError> {
        let resp = self
            .client
            .head(preflight_url)
            .send()
            .await
            .map_err(TokenRequestError::Unreachable)?;

        tracing::debug!(
            response.status = resp.status().as_u16(),
            "received preflight response from authority"
        );

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(TokenRequestError::CredentialsRejected);
        }

        Ok(())
    }
}

/// An error while attempting to request a new token from the authority
#[derive(Debug, Error)]
pub enum TokenRequestError {
    /// The authority answered the grant request with a failure status
    #[error("authority rejected the token request with status {status}: {body}")]
    Rejected {
        /// The response status
        status: reqwest::StatusCode,
        /// The response body, kept for diagnostics
        body: String,
    },
    /// The preflight confirmed the client credentials are not accepted
    #[error("client credentials were rejected by the authority")]
    CredentialsRejected,
    /// The authority could not be reached at all
    #[error("error sending request to authority")]
    Unreachable(#[source] reqwest::Error),
    /// The authority's response body could not be read
    #[error("error reading response body from authority")]
    BodyRead(#[source] reqwest::Error),
    /// The authority's response body could not be decoded as a token
    #[error("error deserializing token body from authority")]
    Decode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use crate::{AccessToken, ClientId, ClientSecret};

    use super::*;

    fn credentials() -> dto::ClientCredentials {
        dto::ClientCredentials {
            client_id: ClientId::from("fakeId"),
            client_secret: ClientSecret::from("fakeSecret"),
        }
    }

    fn authority_for(server: &mockito::Server) -> TokenAuthority {
        let token_url = format!("{}/oauth/token", server.url()).parse().unwrap();
        TokenAuthority::new(reqwest::Client::new(), token_url, credentials())
    }

    #[tokio::test]
    async fn successful_grant_yields_the_issued_token() {
        let mut server = mockito::Server::new_async().await;
        let grant = server
            .mock("POST", "/oauth/token")
            .match_header("accept", "application/json")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
                mockito::Matcher::UrlEncoded("client_id".into(), "fakeId".into()),
                mockito::Matcher::UrlEncoded("client_secret".into(), "fakeSecret".into()),
                mockito::Matcher::UrlEncoded("token_format".into(), "opaque".into()),
            ]))
            .with_status(200)
            .with_body(r#"{ "access_token": "fakeToken", "expires_in": 600 }"#)
            .create_async()
            .await;

        let credential = authority_for(&server).request_token().await.unwrap();

        grant.assert_async().await;
        assert_eq!(credential.access_token(), &AccessToken::from("fakeToken"));
        assert!(credential.expiry().is_some());
    }

    #[tokio::test]
    async fn rejected_grant_preserves_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth/token")
            .with_status(401)
            .with_body(r#"{ "error": "Bad Credentials" }"#)
            .create_async()
            .await;

        let error = authority_for(&server).request_token().await.unwrap_err();

        match error {
            TokenRequestError::Rejected { status, body } => {
                assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED);
                assert!(body.contains("Bad Credentials"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn undecodable_grant_body_is_a_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let error = authority_for(&server).request_token().await.unwrap_err();

        assert!(matches!(error, TokenRequestError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_authority_is_not_a_rejection() {
        let token_url = "http://127.0.0.1:9/oauth/token".parse().unwrap();
        let authority = TokenAuthority::new(reqwest::Client::new(), token_url, credentials());

        let error = authority.request_token().await.unwrap_err();

        assert!(matches!(error, TokenRequestError::Unreachable(_)));
    }

    #[tokio::test]
    async fn preflight_401_short_circuits_the_grant() {
        let mut server = mockito::Server::new_async().await;
        let preflight = server
            .mock("HEAD", "/info")
            .with_status(401)
            .create_async()
            .await;
        let grant = server
            .mock("POST", "/oauth/token")
            .expect(0)
            .create_async()
            .await;

        let preflight_url = format!("{}/info", server.url()).parse().unwrap();
        let authority = authority_for(&server).with_preflight(preflight_url);
        let error = authority.request_token().await.unwrap_err();

        preflight.assert_async().await;
        grant.assert_async().await;
        assert!(matches!(error, TokenRequestError::CredentialsRejected));
    }

    #[tokio::test]
    async fn preflight_success_proceeds_to_the_grant() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", "/info")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(r#"{ "access_token": "fakeToken" }"#)
            .create_async()
            .await;

        let preflight_url = format!("{}/info", server.url()).parse().unwrap();
        let authority = authority_for(&server).with_preflight(preflight_url);
        let credential = authority.request_token().await.unwrap();

        assert_eq!(credential.access_token(), &AccessToken::from("fakeToken"));
    }
}
