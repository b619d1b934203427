//! Token Issuance
//!
//! Access token: HS256 JWT, short-lived.
//! Refresh token: opaque random string, stored verbatim on the user and
//! only ever valid through a store lookup.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use platform::crypto::random_token;
use platform::token::{TokenSigner, TokenSubject};

use crate::application::config::AuthConfig;
use crate::domain::entity::{refresh_token::RefreshTokenEntry, user::PublicUser, user::User};
use crate::error::{AuthError, AuthResult};

/// Freshly issued credentials. Never persisted as such.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair").finish_non_exhaustive()
    }
}

/// Result of register, login and refresh
#[derive(Debug, Clone)]
pub struct SessionOutput {
    pub user: PublicUser,
    pub tokens: TokenPair,
}

#[derive(Clone)]
pub struct TokenIssuer {
    signer: Arc<TokenSigner>,
    config: Arc<AuthConfig>,
}

impl TokenIssuer {
    pub fn new(signer: Arc<TokenSigner>, config: Arc<AuthConfig>) -> Self {
        Self { signer, config }
    }

    /// Sign an access token for `user` and mint a refresh entry.
    ///
    /// The caller persists the entry.
    pub fn issue(&self, user: &User) -> AuthResult<(TokenPair, RefreshTokenEntry)> {
        let subject = TokenSubject {
            id: user.id.to_string(),
            email: user.email.to_string(),
            role: user.role.code().to_string(),
        };
        let access_token = self
            .signer
            .sign(&subject, self.config.access_token.ttl)
            .map_err(|e| AuthError::Internal(format!("failed to sign access token: {e}")))?;

        let refresh_ttl = chrono::Duration::from_std(self.config.refresh_token_ttl)
            .map_err(|_| AuthError::Internal("refresh token TTL out of range".into()))?;
        let refresh_token = random_token(self.config.refresh_token_bytes);
        let entry = RefreshTokenEntry::new(refresh_token.clone(), Utc::now() + refresh_ttl);

        Ok((
            TokenPair {
                access_token,
                refresh_token,
            },
            entry,
        ))
    }
}
