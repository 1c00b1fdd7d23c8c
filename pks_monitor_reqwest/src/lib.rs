//! Middleware to automatically attach authorization to outgoing requests
//!
//! When using [`ClientWithMiddleware`](reqwest_middleware::ClientWithMiddleware),
//! include the [`BearerAuthMiddleware`] in the middleware stack to attach the
//! access token currently held by a [`TokenStore`] to each outbound request.
//!
//! The token is read from the store at request time, not at construction
//! time, so a credential refreshed mid-flight is picked up by the very next
//! request without rebuilding the client. If a request already carries an
//! `Authorization` header by the time the middleware executes, the existing
//! value is left in place. If the store is empty, the request is sent without
//! authorization and the server's rejection drives re-authentication.
//!
//! This layer never retries and never refreshes credentials itself: the
//! prober owns that control flow, which keeps the two layers from retrying
//! around each other.
//!
//! ```no_run
//! use pks_monitor_reqwest::BearerAuthMiddleware;
//! use pks_monitor_tokens::TokenStore;
//! use reqwest::Client;
//! use reqwest_middleware::ClientBuilder;
//!
//! let store = TokenStore::empty();
//!
//! let client = ClientBuilder::new(Client::default())
//!     .with(BearerAuthMiddleware::new(store))
//!     .build();
//! ```
//!
//! The companion [`token_expired`] function classifies a response that has
//! already been buffered, answering the one question the prober needs:
//! did this fail because the token is stale, or because something else is
//! wrong?

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

use bytes::{BufMut, BytesMut};
use http::StatusCode;
use pks_monitor_tokens::{AccessTokenRef, TokenStore};
use reqwest::{header, Request, Response};
use reqwest_middleware::{Middleware, Next, Result};
use serde::Deserialize;

/// A middleware that injects the stored access token into outgoing requests
#[derive(Clone, Debug)]
pub struct BearerAuthMiddleware {
    token_store: TokenStore,
}

impl BearerAuthMiddleware {
    /// Constructs a new middleware reading tokens from `token_store`
    pub fn new(token_store: TokenStore) -> Self {
        Self { token_store }
    }

    fn bearer_header(token: &AccessTokenRef) -> header::HeaderValue {
        let mut header_value = BytesMut::with_capacity(token.as_str().len() + 7);
        header_value.put_slice(b"Bearer ");
        header_value.put_slice(token.as_str().as_bytes());
        let mut value = header::HeaderValue::from_maybe_shared(header_value.freeze())
            .expect("only valid header bytes");
        value.set_sensitive(true);
        value
    }
}

#[async_trait::async_trait]
impl Middleware for BearerAuthMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if !req.headers().contains_key(header::AUTHORIZATION) {
            match self.token_store.access_token() {
                Some(token) => {
                    req.headers_mut()
                        .insert(header::AUTHORIZATION, Self::bearer_header(&token));
                }
                None => {
                    tracing::debug!("token store is empty, sending request unauthenticated");
                }
            }
        }

        next.run(req, extensions).await
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Whether a buffered response indicates the access token has expired
///
/// Returns `true` only when the status is a client or server error and the
/// body decodes as JSON carrying `"error": "invalid_token"`. A status below
/// 400 is never an expiry, whatever the body says, and a body that does not
/// decode cannot prove the token is stale, so both report `false`.
pub fn token_expired(status: StatusCode, body: &[u8]) -> bool {
    if status.as_u16() < 400 {
        return false;
    }

    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(body) => body.error == "invalid_token",
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use pks_monitor_tokens::{AccessToken, Credential};
    use reqwest::Client;
    use reqwest_middleware::ClientBuilder;

    use super::*;

    fn store_with_token(token: &str) -> TokenStore {
        TokenStore::with_credential(Credential::new(AccessToken::from(token), None, None))
    }

    struct AuthChecker {
        expected_authorization: Option<String>,
        checked: AtomicBool,
    }

    impl AuthChecker {
        fn expecting(expected: impl Into<String>) -> Self {
            Self {
                expected_authorization: Some(expected.into()),
                checked: AtomicBool::new(false),
            }
        }

        fn expecting_none() -> Self {
            Self {
                expected_authorization: None,
                checked: AtomicBool::new(false),
            }
        }
    }

    #[async_trait::async_trait]
    impl Middleware for AuthChecker {
        async fn handle(
            &self,
            req: Request,
            _: &mut http::Extensions,
            _: Next<'_>,
        ) -> Result<Response> {
            let authorization = req
                .headers()
                .get(header::AUTHORIZATION)
                .map(|value| value.to_str().expect("header was not valid UTF-8").to_owned());

            assert_eq!(authorization, self.expected_authorization);
            self.checked.store(true, Ordering::Release);

            Ok(http::Response::<&[u8]>::default().into())
        }
    }

    mod when_the_store_holds_a_token {
        use super::*;

        #[tokio::test]
        async fn the_token_is_attached_as_a_bearer_header() {
            let checker = Arc::new(AuthChecker::expecting("Bearer fakeToken"));
            let client = ClientBuilder::new(Client::default())
                .with(BearerAuthMiddleware::new(store_with_token("fakeToken")))
                .with_arc(checker.clone())
                .build();

            client.get("https://api.example.com/v1/clusters").send().await.unwrap();

            assert!(checker.checked.load(Ordering::Acquire));
        }

        #[tokio::test]
        async fn a_store_update_is_visible_to_the_next_request() {
            let store = store_with_token("before");
            let checker = Arc::new(AuthChecker::expecting("Bearer after"));
            let client = ClientBuilder::new(Client::default())
                .with(BearerAuthMiddleware::new(store.clone()))
                .with_arc(checker.clone())
                .build();

            store.set(Credential::new(AccessToken::from("after"), None, None));
            client.get("https://api.example.com/v1/clusters").send().await.unwrap();

            assert!(checker.checked.load(Ordering::Acquire));
        }

        #[tokio::test]
        async fn an_existing_authorization_header_is_left_alone() {
            // Reqwest renders its own bearer prefix with a capital B.
            let checker = Arc::new(AuthChecker::expecting("Bearer overridden"));
            let client = ClientBuilder::new(Client::default())
                .with(BearerAuthMiddleware::new(store_with_token("fakeToken")))
                .with_arc(checker.clone())
                .build();

            client
                .get("https://api.example.com/v1/clusters")
                .bearer_auth("overridden")
                .send()
                .await
                .unwrap();

            assert!(checker.checked.load(Ordering::Acquire));
        }
    }

    mod when_the_store_is_empty {
        use super::*;

        #[tokio::test]
        async fn the_request_is_sent_without_authorization() {
            let checker = Arc::new(AuthChecker::expecting_none());
            let client = ClientBuilder::new(Client::default())
                .with(BearerAuthMiddleware::new(TokenStore::empty()))
                .with_arc(checker.clone())
                .build();

            client.get("https://api.example.com/v1/clusters").send().await.unwrap();

            assert!(checker.checked.load(Ordering::Acquire));
        }
    }

    mod token_expired_classification {
        use super::*;

        #[test]
        fn invalid_token_error_body_is_an_expiry() {
            assert!(token_expired(
                StatusCode::UNAUTHORIZED,
                br#"{"error": "invalid_token"}"#,
            ));
        }

        #[test]
        fn statuses_below_400_are_never_an_expiry() {
            assert!(!token_expired(
                StatusCode::OK,
                br#"{"error": "invalid_token"}"#,
            ));
        }

        #[test]
        fn other_error_bodies_are_not_an_expiry() {
            assert!(!token_expired(
                StatusCode::UNAUTHORIZED,
                br#"{"error": "insufficient_scope"}"#,
            ));
        }

        #[test]
        fn an_undecodable_body_is_not_an_expiry() {
            assert!(!token_expired(StatusCode::BAD_GATEWAY, b"Bad Gateway"));
        }

        #[test]
        fn a_body_without_an_error_field_is_not_an_expiry() {
            assert!(!token_expired(StatusCode::INTERNAL_SERVER_ERROR, b"{}"));
        }
    }
}
