//! Infrastructure Layer
//!
//! Store implementations (in-memory and PostgreSQL) and reset-token delivery.

pub mod memory;
pub mod postgres;

pub use memory::{MemoryOutbox, MemoryTokenBlacklistStore, MemoryUserStore};
pub use postgres::{PgTokenBlacklistStore, PgUserStore};
