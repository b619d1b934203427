//! In-Memory Store Implementations
//!
//! Reference stores for tests and database-less runs. Each mutating call
//! takes the write lock once, so conditional updates cannot interleave.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use platform::password::HashedPassword;
use tokio::sync::{Mutex, RwLock};

use crate::domain::entity::{
    blacklisted_token::BlacklistedToken,
    refresh_token::RefreshTokenEntry,
    user::{User, UserPatch},
};
use crate::domain::repository::{ResetTokenMailer, TokenBlacklistStore, UserStore};
use crate::domain::value_object::{Email, UserId};
use crate::error::{AuthError, AuthResult};

// ============================================================================
// User Store
// ============================================================================

#[derive(Default)]
struct UserTable {
    users: HashMap<UserId, User>,
    by_email: HashMap<Email, UserId>,
}

impl UserTable {
    fn get_mut(&mut self, id: &UserId) -> AuthResult<&mut User> {
        self.users.get_mut(id).ok_or(AuthError::UserNotFound)
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    table: RwLock<UserTable>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        let table = self.table.read().await;
        Ok(table
            .by_email
            .get(email)
            .and_then(|id| table.users.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: &UserId) -> AuthResult<Option<User>> {
        Ok(self.table.read().await.users.get(id).cloned())
    }

    async fn find_by_refresh_token(&self, token: &str) -> AuthResult<Option<User>> {
        let table = self.table.read().await;
        Ok(table
            .users
            .values()
            .find(|u| u.refresh_entry(token).is_some())
            .cloned())
    }

    async fn create(&self, user: &User) -> AuthResult<()> {
        let mut table = self.table.write().await;
        if table.by_email.contains_key(&user.email) {
            return Err(AuthError::EmailTaken);
        }
        table.by_email.insert(user.email.clone(), user.id);
        table.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_fields(&self, id: &UserId, patch: UserPatch) -> AuthResult<Option<User>> {
        let mut table = self.table.write().await;
        let Some(user) = table.users.get_mut(id) else {
            return Ok(None);
        };
        patch.apply_to(user);
        Ok(Some(user.clone()))
    }

    async fn append_refresh_token(&self, id: &UserId, entry: RefreshTokenEntry) -> AuthResult<()> {
        let mut table = self.table.write().await;
        let user = table.get_mut(id)?;
        user.refresh_tokens.push(entry);
        Ok(())
    }

    async fn replace_refresh_token(
        &self,
        id: &UserId,
        old_token: &str,
        new_entry: RefreshTokenEntry,
    ) -> AuthResult<bool> {
        let mut table = self.table.write().await;
        let Some(user) = table.users.get_mut(id) else {
            return Ok(false);
        };
        match user.refresh_tokens.iter_mut().find(|e| e.token == old_token) {
            Some(slot) => {
                *slot = new_entry;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_refresh_token(&self, id: &UserId, token: &str) -> AuthResult<()> {
        let mut table = self.table.write().await;
        if let Some(user) = table.users.get_mut(id) {
            user.refresh_tokens.retain(|e| e.token != token);
        }
        Ok(())
    }

    async fn clear_refresh_tokens(&self, id: &UserId) -> AuthResult<()> {
        let mut table = self.table.write().await;
        if let Some(user) = table.users.get_mut(id) {
            user.refresh_tokens.clear();
        }
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: &UserId,
        token_hash: &str,
        expires: DateTime<Utc>,
    ) -> AuthResult<()> {
        let mut table = self.table.write().await;
        let user = table.get_mut(id)?;
        user.password_reset_token = Some(token_hash.to_string());
        user.password_reset_expires = Some(expires);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn find_by_reset_token_hash(&self, token_hash: &str) -> AuthResult<Option<User>> {
        let now = Utc::now();
        let table = self.table.read().await;
        Ok(table
            .users
            .values()
            .find(|u| u.reset_token_matches(token_hash, now))
            .cloned())
    }

    async fn complete_password_reset(
        &self,
        id: &UserId,
        token_hash: &str,
        new_hash: &HashedPassword,
    ) -> AuthResult<bool> {
        let mut table = self.table.write().await;
        let Some(user) = table.users.get_mut(id) else {
            return Ok(false);
        };
        if !user.reset_token_matches(token_hash, Utc::now()) {
            return Ok(false);
        }
        user.password_hash = new_hash.clone();
        user.password_reset_token = None;
        user.password_reset_expires = None;
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete(&self, id: &UserId) -> AuthResult<Option<User>> {
        let mut table = self.table.write().await;
        let removed = table.users.remove(id);
        if let Some(user) = &removed {
            table.by_email.remove(&user.email);
        }
        Ok(removed)
    }

    async fn list(&self, offset: u64, limit: u64) -> AuthResult<(Vec<User>, u64)> {
        let table = self.table.read().await;
        let mut users: Vec<&User> = table.users.values().collect();
        users.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
        });
        let total = users.len() as u64;
        let page = users
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok((page, total))
    }
}

// ============================================================================
// Token Blacklist Store
// ============================================================================

/// Expired entries are ignored on read and dropped by [`purge_expired`].
///
/// [`purge_expired`]: MemoryTokenBlacklistStore::purge_expired
#[derive(Default)]
pub struct MemoryTokenBlacklistStore {
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl MemoryTokenBlacklistStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop lapsed entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl TokenBlacklistStore for MemoryTokenBlacklistStore {
    async fn insert(&self, entry: &BlacklistedToken) -> AuthResult<()> {
        self.entries
            .write()
            .await
            .insert(entry.token.clone(), entry.expires_at);
        Ok(())
    }

    async fn exists(&self, token: &str) -> AuthResult<bool> {
        let now = Utc::now();
        Ok(self
            .entries
            .read()
            .await
            .get(token)
            .is_some_and(|expires_at| *expires_at > now))
    }
}

// ============================================================================
// Reset Token Outbox
// ============================================================================

const OUTBOX_CAPACITY: usize = 1024;

/// A delivered reset token
#[derive(Clone)]
pub struct OutboxMessage {
    pub email: Email,
    pub token: String,
    pub sent_at: DateTime<Utc>,
}

impl std::fmt::Debug for OutboxMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxMessage")
            .field("email", &self.email)
            .field("token", &"[REDACTED]")
            .field("sent_at", &self.sent_at)
            .finish()
    }
}

/// Records reset tokens instead of sending them. Oldest messages are
/// dropped past a fixed capacity.
#[derive(Default)]
pub struct MemoryOutbox {
    messages: Mutex<VecDeque<OutboxMessage>>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent token delivered to `email`
    pub async fn last_token_for(&self, email: &Email) -> Option<String> {
        self.messages
            .lock()
            .await
            .iter()
            .rev()
            .find(|m| &m.email == email)
            .map(|m| m.token.clone())
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl ResetTokenMailer for MemoryOutbox {
    async fn send_reset_token(&self, email: &Email, token: &str) -> AuthResult<()> {
        let mut messages = self.messages.lock().await;
        if messages.len() >= OUTBOX_CAPACITY {
            messages.pop_front();
        }
        messages.push_back(OutboxMessage {
            email: email.clone(),
            token: token.to_string(),
            sent_at: Utc::now(),
        });
        tracing::debug!(email = %email, "Reset token queued in outbox");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use platform::password::{ClearTextPassword, PasswordHashConfig, PasswordHasher};

    use crate::domain::entity::user::NewUser;

    fn user(email: &str) -> User {
        let hasher = PasswordHasher::new(PasswordHashConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();
        User::new(NewUser {
            email: Email::new(email).unwrap(),
            password_hash: hasher
                .hash(&ClearTextPassword::for_verification("Secret123!".into()))
                .unwrap(),
            first_name: "A".into(),
            last_name: "B".into(),
        })
    }

    fn entry(token: &str) -> RefreshTokenEntry {
        RefreshTokenEntry::new(token.into(), Utc::now() + Duration::days(1))
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_email() {
        let store = MemoryUserStore::new();
        store.create(&user("a@x.com")).await.unwrap();
        let result = store.create(&user("A@X.com")).await;
        assert!(matches!(result, Err(AuthError::EmailTaken)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_replace_keeps_slot_and_is_single_use() {
        let store = MemoryUserStore::new();
        let u = user("a@x.com");
        store.create(&u).await.unwrap();
        store.append_refresh_token(&u.id, entry("t1")).await.unwrap();
        store.append_refresh_token(&u.id, entry("t2")).await.unwrap();

        assert!(store.replace_refresh_token(&u.id, "t1", entry("t3")).await.unwrap());
        assert!(!store.replace_refresh_token(&u.id, "t1", entry("t4")).await.unwrap());

        let stored = store.find_by_id(&u.id).await.unwrap().unwrap();
        let tokens: Vec<&str> = stored.refresh_tokens.iter().map(|e| e.token.as_str()).collect();
        assert_eq!(tokens, ["t3", "t2"]);
        assert!(store.find_by_refresh_token("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_lookup_ignores_expired() {
        let store = MemoryUserStore::new();
        let u = user("a@x.com");
        store.create(&u).await.unwrap();
        store
            .set_reset_token(&u.id, "h", Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
        assert!(store.find_by_reset_token_hash("h").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete_reset_is_conditional() {
        let store = MemoryUserStore::new();
        let u = user("a@x.com");
        store.create(&u).await.unwrap();
        store
            .set_reset_token(&u.id, "h", Utc::now() + Duration::hours(1))
            .await
            .unwrap();

        let new_hash = u.password_hash.clone();
        assert!(!store.complete_password_reset(&u.id, "other", &new_hash).await.unwrap());
        assert!(store.complete_password_reset(&u.id, "h", &new_hash).await.unwrap());
        assert!(!store.complete_password_reset(&u.id, "h", &new_hash).await.unwrap());

        let stored = store.find_by_id(&u.id).await.unwrap().unwrap();
        assert!(stored.password_reset_token.is_none());
        assert!(stored.password_reset_expires.is_none());
    }

    #[tokio::test]
    async fn test_delete_frees_email() {
        let store = MemoryUserStore::new();
        let u = user("a@x.com");
        store.create(&u).await.unwrap();
        assert!(store.delete(&u.id).await.unwrap().is_some());
        assert!(store.delete(&u.id).await.unwrap().is_none());
        store.create(&user("a@x.com")).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_pages() {
        let store = MemoryUserStore::new();
        for i in 0..5 {
            store.create(&user(&format!("u{i}@x.com"))).await.unwrap();
        }
        let (page, total) = store.list(2, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        let (last, _) = store.list(4, 2).await.unwrap();
        assert_eq!(last.len(), 1);
    }

    #[tokio::test]
    async fn test_blacklist_expiry() {
        let store = MemoryTokenBlacklistStore::new();
        store
            .insert(&BlacklistedToken {
                token: "live".into(),
                expires_at: Utc::now() + Duration::minutes(5),
            })
            .await
            .unwrap();
        store
            .insert(&BlacklistedToken {
                token: "dead".into(),
                expires_at: Utc::now() - Duration::seconds(1),
            })
            .await
            .unwrap();

        assert!(store.exists("live").await.unwrap());
        assert!(!store.exists("dead").await.unwrap());
        assert!(!store.exists("never").await.unwrap());
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_outbox_returns_latest_token() {
        let outbox = MemoryOutbox::new();
        let email = Email::new("a@x.com").unwrap();
        outbox.send_reset_token(&email, "first").await.unwrap();
        outbox.send_reset_token(&email, "second").await.unwrap();
        assert_eq!(outbox.last_token_for(&email).await.as_deref(), Some("second"));
        assert!(
            outbox
                .last_token_for(&Email::new("b@x.com").unwrap())
                .await
                .is_none()
        );
    }
}
