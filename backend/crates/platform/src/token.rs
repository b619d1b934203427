//! Signed Access Tokens
//!
//! HS256 JWTs carrying subject id, email and role. Each token family
//! (access, refresh) gets its own [`TokenSigner`] built from its own secret,
//! so one family's key can never mint the other's tokens.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Claims embedded in every signed token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer
    pub iss: String,
    /// Subject (user id)
    pub sub: String,
    /// Unique token id; two tokens issued in the same second still differ
    pub jti: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiry (Unix seconds)
    pub exp: i64,
    pub email: String,
    pub role: String,
}

/// Who a token is issued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub id: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Failed to encode token: {0}")]
    Encoding(#[source] jsonwebtoken::errors::Error),

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Malformed token")]
    Malformed,
}

pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl TokenSigner {
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign a token for `subject` that expires `ttl` from now.
    pub fn sign(&self, subject: &TokenSubject, ttl: Duration) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);

        let claims = TokenClaims {
            iss: self.issuer.clone(),
            sub: subject.id.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now.saturating_add(ttl_secs),
            email: subject.email.clone(),
            role: subject.role.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(TokenError::Encoding)
    }

    /// Verify signature, issuer and expiry. A token whose `exp` is at or
    /// before the current second is expired.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(map_jwt_error)?;

        if data.claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(data.claims)
    }

    /// Read claims without checking signature or expiry.
    ///
    /// Only for bookkeeping on tokens that were already verified upstream
    /// (e.g. blacklist TTL).
    pub fn decode_unverified(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError::Malformed)
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> TokenError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        _ => TokenError::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> TokenSubject {
        TokenSubject {
            id: Uuid::new_v4().to_string(),
            email: "a@x.com".to_string(),
            role: "user".to_string(),
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = TokenSigner::new(b"access-secret", "auth-api");
        let subject = subject();
        let token = signer.sign(&subject, Duration::from_secs(900)).unwrap();

        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.sub, subject.id);
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.role, "user");
        assert_eq!(claims.iss, "auth-api");
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn test_tokens_are_unique() {
        let signer = TokenSigner::new(b"access-secret", "auth-api");
        let subject = subject();
        let a = signer.sign(&subject, Duration::from_secs(900)).unwrap();
        let b = signer.sign(&subject, Duration::from_secs(900)).unwrap();
        assert_ne!(a, b);
        assert_eq!(signer.verify(&a).unwrap().sub, signer.verify(&b).unwrap().sub);
    }

    #[test]
    fn test_zero_ttl_is_expired() {
        let signer = TokenSigner::new(b"access-secret", "auth-api");
        let token = signer.sign(&subject(), Duration::ZERO).unwrap();
        assert!(matches!(signer.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_other_family_secret_rejected() {
        let access = TokenSigner::new(b"access-secret", "auth-api");
        let refresh = TokenSigner::new(b"refresh-secret", "auth-api");
        let token = refresh.sign(&subject(), Duration::from_secs(900)).unwrap();
        assert!(matches!(
            access.verify(&token),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let signer = TokenSigner::new(b"access-secret", "auth-api");
        let token = signer.sign(&subject(), Duration::from_secs(900)).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged_payload = signer
            .sign(
                &TokenSubject {
                    role: "admin".to_string(),
                    ..subject()
                },
                Duration::from_secs(900),
            )
            .unwrap();
        let forged_parts: Vec<&str> = forged_payload.split('.').collect();
        parts[1] = forged_parts[1];
        let tampered = parts.join(".");
        assert!(matches!(
            signer.verify(&tampered),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let ours = TokenSigner::new(b"shared", "auth-api");
        let theirs = TokenSigner::new(b"shared", "someone-else");
        let token = theirs.sign(&subject(), Duration::from_secs(900)).unwrap();
        assert!(matches!(ours.verify(&token), Err(TokenError::Malformed)));
    }

    #[test]
    fn test_garbage_rejected() {
        let signer = TokenSigner::new(b"access-secret", "auth-api");
        assert!(matches!(
            signer.verify("not.a.token"),
            Err(TokenError::Malformed)
        ));
        assert!(matches!(
            signer.decode_unverified("garbage"),
            Err(TokenError::Malformed)
        ));
    }

    #[test]
    fn test_decode_unverified_reads_expired_token() {
        let signer = TokenSigner::new(b"access-secret", "auth-api");
        let other = TokenSigner::new(b"other-secret", "auth-api");
        let token = other.sign(&subject(), Duration::ZERO).unwrap();

        let claims = signer.decode_unverified(&token).unwrap();
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.exp, claims.iat);
    }
}
