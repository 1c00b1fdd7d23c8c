use aliri_braid::braid;
use std::fmt;

macro_rules! redacted {
    ($ty:ty: $label:literal, $reveal:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    f.write_str("\"")?;
                    write_prefix(&self.0, f, $reveal)?;
                    f.write_str("\"")
                } else {
                    f.write_str(concat!("***", $label, "***"))
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(concat!("***", $label, "***"))
            }
        }
    };
}

// Writes at most `keep` characters of the protected value followed by an
// ellipsis, so logs can correlate values without disclosing them.
fn write_prefix(unprotected: &str, f: &mut fmt::Formatter, keep: usize) -> fmt::Result {
    if unprotected.len() <= keep {
        f.write_str(unprotected)
    } else {
        let end = unprotected
            .char_indices()
            .nth(keep)
            .map(|(idx, _)| idx)
            .unwrap_or(unprotected.len());
        f.write_str(&unprotected[..end])?;
        f.write_str("…")
    }
}

/// An OAuth2 client ID
#[braid(serde)]
pub struct ClientId;

/// An OAuth2 client secret
#[braid(serde, debug = "owned", display = "owned")]
pub struct ClientSecret;

redacted!(ClientSecretRef: "CLIENT SECRET", 3);

/// An opaque access token as issued by the token authority
#[braid(serde, debug = "owned", display = "owned")]
pub struct AccessToken;

redacted!(AccessTokenRef: "ACCESS TOKEN", 8);

/// A refresh token
#[braid(serde, debug = "owned", display = "owned")]
pub struct RefreshToken;

redacted!(RefreshTokenRef: "REFRESH TOKEN", 3);
