//! Credential management for the PKS API monitor
//!
//! This crate holds the pieces of the monitor that deal with credentials:
//! strongly-typed token and client-credential values, the shared store that
//! makes the current access token available to the HTTP layer, and the client
//! that exchanges client credentials for a fresh token at the authority's
//! `/oauth/token` endpoint.
//!
//! The store is deliberately dumb: it holds whatever credential it was last
//! given and hands out clones of the access token. Deciding _when_ to request
//! a new token is the caller's business, which keeps re-authentication policy
//! in exactly one place.

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

mod authority;
mod braids;
pub mod dto;
mod store;

pub use authority::{TokenAuthority, TokenRequestError};
pub use braids::*;
pub use store::{Credential, TokenStore};
