use std::sync::{Arc, PoisonError, RwLock};

use aliri_clock::{Clock, DurationSecs, System, UnixTime};

use crate::{AccessToken, RefreshToken};

/// A credential issued by the token authority
///
/// Carries the opaque access token, the refresh token if the authority
/// returned one, and expiry bookkeeping when the authority reported a
/// lifetime for the grant.
#[derive(Clone, Debug)]
pub struct Credential {
    access_token: AccessToken,
    refresh_token: Option<RefreshToken>,
    issued: UnixTime,
    lifetime: Option<DurationSecs>,
}

impl Credential {
    /// Constructs a credential issued now, according to the system clock
    pub fn new(
        access_token: AccessToken,
        refresh_token: Option<RefreshToken>,
        lifetime: Option<DurationSecs>,
    ) -> Self {
        Self::with_clock(access_token, refresh_token, lifetime, &System)
    }

    /// Constructs a credential stamped with the time reported by `clock`
    pub fn with_clock<C: Clock>(
        access_token: AccessToken,
        refresh_token: Option<RefreshToken>,
        lifetime: Option<DurationSecs>,
        clock: &C,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            issued: clock.now(),
            lifetime,
        }
    }

    /// The access token
    #[inline]
    pub fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    /// The refresh token, if the authority returned one
    #[inline]
    pub fn refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }

    /// The time the credential was issued
    #[inline]
    pub fn issued(&self) -> UnixTime {
        self.issued
    }

    /// The time the credential expires, if the authority reported a lifetime
    #[inline]
    pub fn expiry(&self) -> Option<UnixTime> {
        self.lifetime.map(|lifetime| self.issued + lifetime)
    }

    /// Whether the credential is past its reported expiry at `time`
    ///
    /// A credential with no reported lifetime never reports itself expired;
    /// the authority is the only judge of its validity.
    pub fn is_expired_at(&self, time: UnixTime) -> bool {
        self.expiry().is_some_and(|expiry| time >= expiry)
    }
}

/// The shared home of the monitor's current credential
///
/// The store starts out empty and holds at most one credential. The prober
/// is the only writer; the HTTP middleware reads the access token on every
/// outgoing request so that a refreshed token is picked up without rebuilding
/// the client. A read/write lock is sufficient because probes are strictly
/// sequential, so writes never race each other.
#[derive(Clone, Debug, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<Option<Credential>>>,
}

impl TokenStore {
    /// Constructs a store with no credential
    pub fn empty() -> Self {
        Self::default()
    }

    /// Constructs a store holding `credential`
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(credential))),
        }
    }

    /// Clones out the current access token, if any
    pub fn access_token(&self) -> Option<AccessToken> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|credential| credential.access_token().clone())
    }

    /// Clones out the current credential, if any
    pub fn credential(&self) -> Option<Credential> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the current credential
    pub fn set(&self, credential: Credential) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(credential);
    }

    /// Whether the store holds no credential
    pub fn is_empty(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}
