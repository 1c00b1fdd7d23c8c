//! DTOs for the token authority's wire protocol

use aliri_clock::DurationSecs;
use serde::{Deserialize, Serialize, Serializer};

use crate::{AccessToken, ClientId, ClientSecret, RefreshToken};

/// Client credentials presented to the authority
///
/// Serializes as the full client-credentials grant request, including the
/// fixed `grant_type` and `token_format` fields, so it can be attached to a
/// token request as a form body without further assembly.
#[derive(Debug)]
pub struct ClientCredentials {
    /// The client ID
    pub client_id: ClientId,

    /// The client secret
    pub client_secret: ClientSecret,
}

impl Serialize for ClientCredentials {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("ClientCredentials", 4)?;
        ser.serialize_field("grant_type", "client_credentials")?;
        ser.serialize_field("client_id", &self.client_id)?;
        ser.serialize_field("client_secret", &self.client_secret)?;
        ser.serialize_field("token_format", "opaque")?;
        ser.end()
    }
}

/// The token grant response body
///
/// Only `access_token` is required; authorities differ on which of the
/// remaining fields they include.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// The issued access token
    pub access_token: AccessToken,

    /// A refresh token, if the authority rotates them
    #[serde(default)]
    pub refresh_token: Option<RefreshToken>,

    /// The token type, typically `bearer`
    #[serde(default)]
    pub token_type: Option<String>,

    /// Seconds until the issued token expires
    #[serde(default)]
    pub expires_in: Option<DurationSecs>,

    /// Space-separated scopes granted to the token
    #[serde(default)]
    pub scope: Option<String>,

    /// The JWT ID of the issued token
    #[serde(default)]
    pub jti: Option<String>,
}
