//! Platform Crate - Technical Infrastructure
//!
//! Shared technical foundations for the auth backend:
//! - Cryptographic utilities (random tokens, SHA-256 digests)
//! - Password hashing (Argon2id with configurable cost)
//! - Signed access tokens (HS256 JWT)
//! - Rate limiting infrastructure
//! - Client identification helpers (bearer token, client IP)

pub mod client;
pub mod crypto;
pub mod password;
pub mod rate_limit;
pub mod token;
