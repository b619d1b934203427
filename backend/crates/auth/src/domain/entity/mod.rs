//! Entity Module

pub mod blacklisted_token;
pub mod refresh_token;
pub mod user;
