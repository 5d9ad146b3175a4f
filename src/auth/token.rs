//! Bearer token generation, parsing and digests.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::auth::error::{AuthError, AuthResult};

/// Raw entropy per token (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// A bearer token as handed to the client.
///
/// `Debug` is redacted so tokens do not end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Mint a fresh token from the OS random source.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Parse a token presented by a client.
    pub fn parse(raw: &str) -> AuthResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AuthError::TokenMissing);
        }
        let decoded = URL_SAFE_NO_PAD
            .decode(raw)
            .map_err(|_| AuthError::TokenMalformed)?;
        if decoded.len() != TOKEN_BYTES {
            return Err(AuthError::TokenMalformed);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// The key the session store files this token under.
    pub fn digest(&self) -> TokenDigest {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        TokenDigest(hasher.finalize().into())
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(..)")
    }
}

/// SHA-256 of a bearer token. Raw tokens are never stored.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenDigest([u8; 32]);

impl TokenDigest {
    /// Short hex prefix, enough to correlate log lines.
    pub fn short(&self) -> String {
        self.0[..4].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for TokenDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenDigest({})", self.short())
    }
}

/// Pull the token out of an `Authorization` header value.
pub fn parse_authorization(header: &str) -> AuthResult<BearerToken> {
    let header = header.trim();
    if header.is_empty() {
        return Err(AuthError::TokenMissing);
    }
    let (scheme, token) = header.split_once(' ').ok_or(AuthError::TokenMalformed)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::TokenMalformed);
    }
    BearerToken::parse(token).map_err(|e| match e {
        AuthError::TokenMissing => AuthError::TokenMalformed,
        other => other,
    })
}
