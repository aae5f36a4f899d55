//! Token issuance, verification, and rotation.
//!
//! Access tokens are stateless: validity is signature + expiry, so the
//! per-request hot path never touches storage. Refresh tokens are
//! stateful: a refresh token is only good while it equals the single
//! value stored on its identity, and every successful use rotates that
//! value. Forced logout therefore lands on the slow refresh path, while
//! already-issued access tokens ride out their own expiry — a documented
//! limitation of the stateless design.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

use crate::config::AuthConfig;
use crate::db::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Signed assertion embedded in every token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Identity id (subject)
    pub sub: String,
    /// Which half of the pair this token is
    pub kind: TokenKind,
    /// Expiration timestamp (Unix)
    pub exp: u64,
    /// Issued at timestamp (Unix)
    pub iat: u64,
    /// Unique token id. `iat`/`exp` have one-second granularity, so
    /// without this two tokens signed in the same second would be
    /// byte-identical and rotation would hand back the token it was
    /// supposed to retire.
    pub jti: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
    #[error("token expired")]
    Expired,
    #[error("refresh token revoked")]
    Revoked,
    #[error("identity not found")]
    IdentityNotFound,
    #[error("credential store failure: {0}")]
    Persistence(String),
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Pure signing/verification half of the service. Holds no storage
/// handle, so it can be exercised in isolation.
#[derive(Clone)]
pub struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl TokenCodec {
    #[must_use]
    pub fn new(auth: &AuthConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(auth.access_token_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(auth.access_token_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(auth.refresh_token_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(auth.refresh_token_secret.as_bytes()),
            access_ttl_secs: auth.access_ttl_minutes * 60,
            refresh_ttl_secs: auth.refresh_ttl_days * 24 * 60 * 60,
        }
    }

    fn now() -> Result<u64, TokenError> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .map_err(|_| TokenError::Invalid)
    }

    pub fn sign(&self, user_id: i32, kind: TokenKind) -> Result<String, TokenError> {
        let now = Self::now()?;
        let (key, ttl) = match kind {
            TokenKind::Access => (&self.access_encoding, self.access_ttl_secs),
            TokenKind::Refresh => (&self.refresh_encoding, self.refresh_ttl_secs),
        };

        let claims = Claims {
            sub: user_id.to_string(),
            kind,
            exp: now + ttl,
            iat: now,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, key).map_err(|_| TokenError::Invalid)
    }

    /// Check signature and expiry, then the embedded kind. A refresh
    /// token presented where an access token is expected (or vice versa)
    /// is invalid, not merely misrouted.
    pub fn decode(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let key = match kind {
            TokenKind::Access => &self.access_decoding,
            TokenKind::Refresh => &self.refresh_decoding,
        };

        let claims = decode::<Claims>(token, key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;

        if claims.kind != kind {
            return Err(TokenError::Invalid);
        }

        Ok(claims)
    }

    fn subject_id(claims: &Claims) -> Result<i32, TokenError> {
        claims.sub.parse().map_err(|_| TokenError::Invalid)
    }
}

/// Token service: the codec plus the credential store that anchors
/// refresh-token state.
#[derive(Clone)]
pub struct TokenService {
    codec: TokenCodec,
    store: Store,
}

impl TokenService {
    #[must_use]
    pub fn new(store: Store, auth: &AuthConfig) -> Self {
        Self {
            codec: TokenCodec::new(auth),
            store,
        }
    }

    /// Issue a fresh pair and persist the refresh half onto the identity,
    /// overwriting any prior value. This is the rotation point: a login
    /// on a second device invalidates the first device's refresh token.
    pub async fn issue_pair(&self, user_id: i32) -> Result<TokenPair, TokenError> {
        let pair = self.sign_pair(user_id)?;

        self.store
            .set_refresh_token(user_id, Some(&pair.refresh_token))
            .await
            .map_err(|e| TokenError::Persistence(e.to_string()))?;

        Ok(pair)
    }

    /// Signature + expiry check only; no storage round-trip.
    pub fn verify_access(&self, token: &str) -> Result<i32, TokenError> {
        let claims = self.codec.decode(token, TokenKind::Access)?;
        TokenCodec::subject_id(&claims)
    }

    /// Rotation-on-use. The presented token must equal the stored value,
    /// and the overwrite is a compare-and-swap keyed on that value — a
    /// concurrent login, refresh, or revoke makes this fail with
    /// `Revoked` rather than silently resurrecting a superseded session.
    pub async fn rotate_from_refresh(&self, presented: &str) -> Result<TokenPair, TokenError> {
        let claims = self.codec.decode(presented, TokenKind::Refresh)?;
        let user_id = TokenCodec::subject_id(&claims)?;

        let stored = self
            .store
            .get_refresh_token(user_id)
            .await
            .map_err(|e| TokenError::Persistence(e.to_string()))?
            .ok_or(TokenError::IdentityNotFound)?;

        let Some(stored) = stored else {
            return Err(TokenError::Revoked);
        };

        let matches: bool = stored.as_bytes().ct_eq(presented.as_bytes()).into();
        if !matches {
            return Err(TokenError::Revoked);
        }

        let pair = self.sign_pair(user_id)?;

        let swapped = self
            .store
            .swap_refresh_token(user_id, presented, &pair.refresh_token)
            .await
            .map_err(|e| TokenError::Persistence(e.to_string()))?;

        if !swapped {
            return Err(TokenError::Revoked);
        }

        Ok(pair)
    }

    /// Clear the stored refresh value. Future refresh attempts fail with
    /// `Revoked`; outstanding access tokens expire on their own.
    pub async fn revoke(&self, user_id: i32) -> Result<(), TokenError> {
        self.store
            .set_refresh_token(user_id, None)
            .await
            .map_err(|e| TokenError::Persistence(e.to_string()))
    }

    fn sign_pair(&self, user_id: i32) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.codec.sign(user_id, TokenKind::Access)?,
            refresh_token: self.codec.sign(user_id, TokenKind::Refresh)?,
        })
    }
}
