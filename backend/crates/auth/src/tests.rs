//! Scenario tests for the auth crate
//! Sessions, guard, password reset and the HTTP surface over in-memory stores

#[cfg(test)]
mod support {
    use std::sync::Arc;

    use platform::password::PasswordHasher;
    use platform::token::TokenSigner;

    use crate::application::{AuthConfig, RegisterInput, SessionOutput, SessionService};
    use crate::domain::repository::{ResetTokenMailer, TokenBlacklistStore, UserStore};
    use crate::infra::memory::{MemoryOutbox, MemoryTokenBlacklistStore, MemoryUserStore};

    pub const PASSWORD: &str = "Secret123!";

    pub struct Harness<U: UserStore> {
        pub service: SessionService<U, MemoryTokenBlacklistStore, MemoryOutbox>,
        pub users: Arc<U>,
        pub blacklist: Arc<MemoryTokenBlacklistStore>,
        pub outbox: Arc<MemoryOutbox>,
        pub signer: Arc<TokenSigner>,
    }

    pub fn harness() -> Harness<MemoryUserStore> {
        harness_with(MemoryUserStore::new(), AuthConfig::development())
    }

    pub fn harness_with<U: UserStore>(users: U, config: AuthConfig) -> Harness<U> {
        let signer = Arc::new(config.access_token_signer());
        let hasher = Arc::new(PasswordHasher::new(config.password_hash).unwrap());
        let users = Arc::new(users);
        let blacklist = Arc::new(MemoryTokenBlacklistStore::new());
        let outbox = Arc::new(MemoryOutbox::new());
        let service = SessionService::new(
            users.clone(),
            blacklist.clone(),
            outbox.clone(),
            hasher,
            signer.clone(),
            Arc::new(config),
        );
        Harness {
            service,
            users,
            blacklist,
            outbox,
            signer,
        }
    }

    pub fn register_input(email: &str) -> RegisterInput {
        RegisterInput {
            email: email.to_string(),
            password: PASSWORD.to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
        }
    }

    pub async fn register<U, B, M>(
        service: &SessionService<U, B, M>,
        email: &str,
    ) -> SessionOutput
    where
        U: UserStore,
        B: TokenBlacklistStore,
        M: ResetTokenMailer,
    {
        service.register(register_input(email)).await.unwrap()
    }
}

#[cfg(test)]
mod session_tests {
    use super::support::*;
    use crate::application::{LoginInput, RegisterInput};
    use crate::domain::entity::refresh_token::RefreshTokenEntry;
    use crate::domain::repository::{TokenBlacklistStore, UserStore};
    use crate::domain::value_object::Email;
    use crate::error::{AuthError, UnauthorizedReason};
    use chrono::{Duration, Utc};
    use platform::password::{ClearTextPassword, PasswordHashConfig, PasswordHasher};

    fn login(email: &str, password: &str) -> LoginInput {
        LoginInput {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_creates_active_user_with_one_session() {
        let h = harness();
        let output = register(&h.service, "a@x.com").await;

        assert_eq!(output.user.email.as_str(), "a@x.com");
        assert_eq!(output.user.role.code(), "user");
        assert!(output.user.is_active);

        let stored = h.users.find_by_id(&output.user.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_tokens.len(), 1);
        assert_eq!(stored.refresh_tokens[0].token, output.tokens.refresh_token);
        assert_ne!(stored.password_hash.as_phc_string(), PASSWORD);
    }

    #[tokio::test]
    async fn test_login_tokens_differ_but_carry_same_subject() {
        let h = harness();
        let registered = register(&h.service, "a@x.com").await;
        let logged_in = h.service.login(login("a@x.com", PASSWORD)).await.unwrap();

        assert_ne!(
            registered.tokens.access_token,
            logged_in.tokens.access_token
        );
        assert_ne!(
            registered.tokens.refresh_token,
            logged_in.tokens.refresh_token
        );

        let a = h.signer.verify(&registered.tokens.access_token).unwrap();
        let b = h.signer.verify(&logged_in.tokens.access_token).unwrap();
        assert_eq!(a.sub, b.sub);
        assert_eq!(a.email, b.email);
        assert_eq!(a.role, b.role);
        assert_eq!(a.sub, registered.user.id.to_string());
    }

    #[tokio::test]
    async fn test_duplicate_register_keeps_existing_hash() {
        let h = harness();
        let first = register(&h.service, "a@x.com").await;
        let before = h.users.find_by_id(&first.user.id).await.unwrap().unwrap();

        let result = h
            .service
            .register(RegisterInput {
                password: "Different456!".into(),
                ..register_input("  A@X.COM ")
            })
            .await;
        assert!(matches!(result, Err(AuthError::EmailTaken)));

        let after = h.users.find_by_id(&first.user.id).await.unwrap().unwrap();
        assert_eq!(
            before.password_hash.as_phc_string(),
            after.password_hash.as_phc_string()
        );
        assert!(h.service.login(login("a@x.com", PASSWORD)).await.is_ok());
    }

    #[tokio::test]
    async fn test_register_validation() {
        let h = harness();
        let bad_email = h.service.register(register_input("not-an-email")).await;
        assert!(matches!(bad_email, Err(AuthError::Validation(_))));

        let weak = h
            .service
            .register(RegisterInput {
                password: "password".into(),
                ..register_input("a@x.com")
            })
            .await;
        assert!(matches!(weak, Err(AuthError::Validation(_))));

        let no_name = h
            .service
            .register(RegisterInput {
                first_name: "   ".into(),
                ..register_input("a@x.com")
            })
            .await;
        assert!(matches!(no_name, Err(AuthError::Validation(_))));
        assert!(h.users.is_empty().await);
    }

    #[test]
    fn test_hash_round_trip() {
        let hasher = PasswordHasher::new(PasswordHashConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();
        for plain in ["Secret123!", "NewSecret456!", "ÜnïcødeP4ss"] {
            let hash = hasher
                .hash(&ClearTextPassword::for_verification(plain.into()))
                .unwrap();
            assert!(hasher.verify(&ClearTextPassword::for_verification(plain.into()), &hash));
            assert!(!hasher.verify(
                &ClearTextPassword::for_verification(format!("{plain}x")),
                &hash
            ));
        }
    }

    #[tokio::test]
    async fn test_login_failures_are_uniform() {
        let h = harness();
        register(&h.service, "a@x.com").await;

        let unknown = h
            .service
            .login(login("nobody@x.com", PASSWORD))
            .await
            .unwrap_err();
        let wrong = h
            .service
            .login(login("a@x.com", "Wrong123!"))
            .await
            .unwrap_err();
        let malformed = h.service.login(login("nope", PASSWORD)).await.unwrap_err();

        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(malformed, AuthError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
        assert_eq!(
            unknown.to_app_error().message(),
            wrong.to_app_error().message()
        );
    }

    #[tokio::test]
    async fn test_login_is_case_insensitive_on_email() {
        let h = harness();
        register(&h.service, "Ada@X.com").await;
        let output = h.service.login(login("ada@x.COM", PASSWORD)).await.unwrap();
        assert_eq!(output.user.email.as_str(), "ada@x.com");
    }

    #[tokio::test]
    async fn test_refresh_rotation_is_single_use() {
        let h = harness();
        register(&h.service, "a@x.com").await;
        let t1 = h.service.login(login("a@x.com", PASSWORD)).await.unwrap();

        let t2 = h.service.refresh(&t1.tokens.refresh_token).await.unwrap();
        assert_ne!(t2.tokens.refresh_token, t1.tokens.refresh_token);

        let reused = h.service.refresh(&t1.tokens.refresh_token).await;
        assert!(matches!(reused, Err(AuthError::InvalidRefreshToken)));

        let t3 = h.service.refresh(&t2.tokens.refresh_token).await.unwrap();
        assert_ne!(t3.tokens.refresh_token, t2.tokens.refresh_token);
    }

    #[tokio::test]
    async fn test_refresh_replaces_entry_in_place() {
        let h = harness();
        let registered = register(&h.service, "a@x.com").await;
        let second = h.service.login(login("a@x.com", PASSWORD)).await.unwrap();

        let rotated = h
            .service
            .refresh(&registered.tokens.refresh_token)
            .await
            .unwrap();

        let stored = h
            .users
            .find_by_id(&registered.user.id)
            .await
            .unwrap()
            .unwrap();
        let tokens: Vec<&str> = stored
            .refresh_tokens
            .iter()
            .map(|e| e.token.as_str())
            .collect();
        assert_eq!(
            tokens,
            [
                rotated.tokens.refresh_token.as_str(),
                second.tokens.refresh_token.as_str()
            ]
        );
    }

    #[tokio::test]
    async fn test_refresh_unknown_and_expired() {
        let h = harness();
        let registered = register(&h.service, "a@x.com").await;

        let unknown = h.service.refresh("no-such-token").await;
        assert!(matches!(unknown, Err(AuthError::InvalidRefreshToken)));
        let empty = h.service.refresh("").await;
        assert!(matches!(empty, Err(AuthError::InvalidRefreshToken)));

        h.users
            .append_refresh_token(
                &registered.user.id,
                RefreshTokenEntry::new("stale".into(), Utc::now() - Duration::seconds(1)),
            )
            .await
            .unwrap();
        let expired = h.service.refresh("stale").await;
        assert!(matches!(expired, Err(AuthError::RefreshTokenExpired)));
    }

    #[tokio::test]
    async fn test_inactive_user_cannot_login_or_refresh() {
        let h = harness();
        let registered = register(&h.service, "a@x.com").await;
        h.service
            .admin()
            .update(
                &registered.user.id,
                crate::application::UserUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let login_result = h.service.login(login("a@x.com", PASSWORD)).await;
        assert!(matches!(
            login_result,
            Err(AuthError::Unauthorized(UnauthorizedReason::UserInactive))
        ));
        let refresh_result = h.service.refresh(&registered.tokens.refresh_token).await;
        assert!(matches!(
            refresh_result,
            Err(AuthError::Unauthorized(UnauthorizedReason::UserInactive))
        ));
    }

    #[tokio::test]
    async fn test_logout_revokes_access_token_and_refresh_entry() {
        let h = harness();
        let session = register(&h.service, "a@x.com").await;
        let access = &session.tokens.access_token;

        h.service
            .logout(&session.user.id, access, &session.tokens.refresh_token)
            .await
            .unwrap();

        // Still individually valid, but revoked
        assert!(h.signer.verify(access).is_ok());
        assert!(h.blacklist.exists(access).await.unwrap());
        let guarded = h.service.guard().authenticate(access).await;
        assert!(matches!(
            guarded,
            Err(AuthError::Unauthorized(UnauthorizedReason::TokenRevoked))
        ));

        let refreshed = h.service.refresh(&session.tokens.refresh_token).await;
        assert!(matches!(refreshed, Err(AuthError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn test_logout_twice_is_not_fatal() {
        let h = harness();
        let session = register(&h.service, "a@x.com").await;

        for _ in 0..2 {
            let result = h
                .service
                .logout(
                    &session.user.id,
                    &session.tokens.access_token,
                    &session.tokens.refresh_token,
                )
                .await;
            if let Err(e) = result {
                assert!(!e.kind().is_server_error(), "unexpected {e}");
            }
        }
    }

    #[tokio::test]
    async fn test_logout_rejects_malformed_access_token_but_still_drops_refresh() {
        let h = harness();
        let session = register(&h.service, "a@x.com").await;

        let result = h
            .service
            .logout(&session.user.id, "garbage", &session.tokens.refresh_token)
            .await;
        assert!(matches!(
            result,
            Err(AuthError::Unauthorized(UnauthorizedReason::InvalidOrExpired))
        ));

        let stored = h.users.find_by_id(&session.user.id).await.unwrap().unwrap();
        assert!(stored.refresh_tokens.is_empty());
    }

    #[tokio::test]
    async fn test_logout_all_clears_every_refresh_entry() {
        let h = harness();
        let first = register(&h.service, "a@x.com").await;
        let second = h.service.login(login("a@x.com", PASSWORD)).await.unwrap();

        h.service.logout_all(&first.user.id).await.unwrap();

        for token in [&first.tokens.refresh_token, &second.tokens.refresh_token] {
            let result = h.service.refresh(token).await;
            assert!(matches!(result, Err(AuthError::InvalidRefreshToken)));
        }
        // Outstanding access tokens are not revoked
        assert!(
            h.service
                .guard()
                .authenticate(&second.tokens.access_token)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_password_reset_request_for_unknown_email_is_silent() {
        let h = harness();
        let existing = register(&h.service, "a@x.com").await;

        assert!(
            h.service
                .request_password_reset("nonexistent@x.com")
                .await
                .is_ok()
        );
        assert!(h.service.request_password_reset("not an email").await.is_ok());
        assert!(h.outbox.is_empty().await);

        let stored = h
            .users
            .find_by_id(&existing.user.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.password_reset_token.is_none());
    }

    #[tokio::test]
    async fn test_password_reset_scenario() {
        let h = harness();
        let registered = register(&h.service, "a@x.com").await;
        let email = Email::new("a@x.com").unwrap();

        h.service.request_password_reset("a@x.com").await.unwrap();
        let token = h.outbox.last_token_for(&email).await.unwrap();

        // Only the digest is stored
        let stored = h
            .users
            .find_by_id(&registered.user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            stored.password_reset_token.as_deref(),
            Some(platform::crypto::sha256_hex(token.as_bytes()).as_str())
        );
        let expires = stored.password_reset_expires.unwrap();
        assert!(expires > Utc::now() + Duration::minutes(59));
        assert!(expires <= Utc::now() + Duration::hours(1));

        h.service
            .reset_password(&token, "NewSecret456!".into())
            .await
            .unwrap();

        let old = h.service.login(login("a@x.com", PASSWORD)).await;
        assert!(matches!(old, Err(AuthError::InvalidCredentials)));
        assert!(
            h.service
                .login(login("a@x.com", "NewSecret456!"))
                .await
                .is_ok()
        );

        let cleared = h
            .users
            .find_by_id(&registered.user.id)
            .await
            .unwrap()
            .unwrap();
        assert!(cleared.password_reset_token.is_none());
        assert!(cleared.password_reset_expires.is_none());

        let reused = h
            .service
            .reset_password(&token, "Another789!".into())
            .await;
        assert!(matches!(reused, Err(AuthError::InvalidOrExpiredResetToken)));
    }

    #[tokio::test]
    async fn test_new_reset_request_replaces_pending_one() {
        let h = harness();
        register(&h.service, "a@x.com").await;
        let email = Email::new("a@x.com").unwrap();

        h.service.request_password_reset("a@x.com").await.unwrap();
        let first = h.outbox.last_token_for(&email).await.unwrap();
        h.service.request_password_reset("a@x.com").await.unwrap();
        let second = h.outbox.last_token_for(&email).await.unwrap();
        assert_ne!(first, second);

        let stale = h
            .service
            .reset_password(&first, "NewSecret456!".into())
            .await;
        assert!(matches!(stale, Err(AuthError::InvalidOrExpiredResetToken)));
        assert!(
            h.service
                .reset_password(&second, "NewSecret456!".into())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_reset_rejects_expired_token_and_weak_password() {
        let h = harness();
        let registered = register(&h.service, "a@x.com").await;

        let token = "plain-reset-token";
        h.users
            .set_reset_token(
                &registered.user.id,
                &platform::crypto::sha256_hex(token.as_bytes()),
                Utc::now() - Duration::seconds(1),
            )
            .await
            .unwrap();
        let expired = h
            .service
            .reset_password(token, "NewSecret456!".into())
            .await;
        assert!(matches!(expired, Err(AuthError::InvalidOrExpiredResetToken)));

        let weak = h.service.reset_password(token, "short".into()).await;
        assert!(matches!(weak, Err(AuthError::Validation(_))));
    }
}

#[cfg(test)]
mod reset_delivery_tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use platform::password::PasswordHasher;
    use serde_json::json;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use super::support::*;
    use crate::application::{AuthConfig, SessionService};
    use crate::domain::repository::ResetTokenMailer;
    use crate::domain::value_object::Email;
    use crate::error::AuthResult;
    use crate::infra::memory::{MemoryTokenBlacklistStore, MemoryUserStore};
    use crate::presentation::router::auth_router;

    const DELIVERY_DELAY: Duration = Duration::from_millis(300);

    /// Mailer that takes a while to hand each message off
    #[derive(Default)]
    struct SlowMailer {
        delivered: Mutex<Vec<Email>>,
    }

    impl ResetTokenMailer for SlowMailer {
        async fn send_reset_token(&self, email: &Email, _token: &str) -> AuthResult<()> {
            tokio::time::sleep(DELIVERY_DELAY).await;
            self.delivered.lock().await.push(email.clone());
            Ok(())
        }
    }

    type SlowService = SessionService<MemoryUserStore, MemoryTokenBlacklistStore, SlowMailer>;

    fn slow_service(mailer: Arc<SlowMailer>) -> SlowService {
        let config = AuthConfig::development();
        let hasher = Arc::new(PasswordHasher::new(config.password_hash).unwrap());
        let signer = Arc::new(config.access_token_signer());
        SessionService::new(
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryTokenBlacklistStore::new()),
            mailer,
            hasher,
            signer,
            Arc::new(config),
        )
    }

    #[tokio::test]
    async fn test_reset_request_does_not_wait_for_delivery() {
        let mailer = Arc::new(SlowMailer::default());
        let service = slow_service(mailer.clone());
        register(&service, "a@x.com").await;

        let started = Instant::now();
        let known = service.request_password_reset("a@x.com");
        let known_elapsed = started.elapsed();

        let started = Instant::now();
        let unknown = service.request_password_reset("nobody@x.com");
        let unknown_elapsed = started.elapsed();

        assert!(known_elapsed < DELIVERY_DELAY / 3, "known took {known_elapsed:?}");
        assert!(unknown_elapsed < DELIVERY_DELAY / 3, "unknown took {unknown_elapsed:?}");
        assert!(mailer.delivered.lock().await.is_empty());

        known.await.unwrap();
        unknown.await.unwrap();
        assert_eq!(
            *mailer.delivered.lock().await,
            vec![Email::new("a@x.com").unwrap()]
        );
    }

    #[tokio::test]
    async fn test_reset_request_endpoint_answers_alike_for_known_and_unknown() {
        let mailer = Arc::new(SlowMailer::default());
        let service = slow_service(mailer.clone());
        register(&service, "a@x.com").await;
        let app = auth_router(service);

        let mut timings = Vec::new();
        for email in ["a@x.com", "nobody@x.com"] {
            let request = Request::post("/auth/password-reset-request")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "email": email }).to_string()))
                .unwrap();

            let started = Instant::now();
            let response = app.clone().oneshot(request).await.unwrap();
            timings.push(started.elapsed());
            assert_eq!(response.status(), StatusCode::OK);
        }

        for elapsed in timings {
            assert!(elapsed < DELIVERY_DELAY / 3, "request took {elapsed:?}");
        }
    }
}

#[cfg(test)]
mod concurrency_tests {
    use chrono::{DateTime, Utc};
    use platform::password::HashedPassword;
    use tokio::sync::Barrier;

    use super::support::*;
    use crate::application::AuthConfig;
    use crate::domain::entity::{
        refresh_token::RefreshTokenEntry,
        user::{User, UserPatch},
    };
    use crate::domain::repository::UserStore;
    use crate::domain::value_object::{Email, UserId};
    use crate::error::{AuthError, AuthResult};
    use crate::infra::memory::MemoryUserStore;

    /// Holds every refresh lookup until two have happened, so both callers
    /// see the token before either rotates it.
    struct LockstepStore {
        inner: MemoryUserStore,
        lookups: Barrier,
    }

    impl UserStore for LockstepStore {
        async fn find_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
            self.inner.find_by_email(email).await
        }

        async fn find_by_id(&self, id: &UserId) -> AuthResult<Option<User>> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_refresh_token(&self, token: &str) -> AuthResult<Option<User>> {
            let found = self.inner.find_by_refresh_token(token).await;
            self.lookups.wait().await;
            found
        }

        async fn create(&self, user: &User) -> AuthResult<()> {
            self.inner.create(user).await
        }

        async fn update_fields(&self, id: &UserId, patch: UserPatch) -> AuthResult<Option<User>> {
            self.inner.update_fields(id, patch).await
        }

        async fn append_refresh_token(
            &self,
            id: &UserId,
            entry: RefreshTokenEntry,
        ) -> AuthResult<()> {
            self.inner.append_refresh_token(id, entry).await
        }

        async fn replace_refresh_token(
            &self,
            id: &UserId,
            old_token: &str,
            new_entry: RefreshTokenEntry,
        ) -> AuthResult<bool> {
            self.inner
                .replace_refresh_token(id, old_token, new_entry)
                .await
        }

        async fn remove_refresh_token(&self, id: &UserId, token: &str) -> AuthResult<()> {
            self.inner.remove_refresh_token(id, token).await
        }

        async fn clear_refresh_tokens(&self, id: &UserId) -> AuthResult<()> {
            self.inner.clear_refresh_tokens(id).await
        }

        async fn set_reset_token(
            &self,
            id: &UserId,
            token_hash: &str,
            expires: DateTime<Utc>,
        ) -> AuthResult<()> {
            self.inner.set_reset_token(id, token_hash, expires).await
        }

        async fn find_by_reset_token_hash(&self, token_hash: &str) -> AuthResult<Option<User>> {
            self.inner.find_by_reset_token_hash(token_hash).await
        }

        async fn complete_password_reset(
            &self,
            id: &UserId,
            token_hash: &str,
            new_hash: &HashedPassword,
        ) -> AuthResult<bool> {
            self.inner
                .complete_password_reset(id, token_hash, new_hash)
                .await
        }

        async fn delete(&self, id: &UserId) -> AuthResult<Option<User>> {
            self.inner.delete(id).await
        }

        async fn list(&self, offset: u64, limit: u64) -> AuthResult<(Vec<User>, u64)> {
            self.inner.list(offset, limit).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_refresh_exactly_one_wins() {
        let store = LockstepStore {
            inner: MemoryUserStore::new(),
            lookups: Barrier::new(2),
        };
        let h = harness_with(store, AuthConfig::development());
        let session = register(&h.service, "a@x.com").await;
        let token = session.tokens.refresh_token.as_str();

        let (a, b) = tokio::join!(h.service.refresh(token), h.service.refresh(token));

        let results = [a, b];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(AuthError::InvalidRefreshToken)))
        );

        let stored = h
            .users
            .inner
            .find_by_id(&session.user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.refresh_tokens.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_refresh_storm() {
        let h = harness();
        let session = register(&h.service, "a@x.com").await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = h.service.clone();
                let token = session.tokens.refresh_token.clone();
                tokio::spawn(async move { service.refresh(&token).await })
            })
            .collect();

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(e) => assert!(matches!(e, AuthError::InvalidRefreshToken)),
            }
        }
        assert_eq!(wins, 1);
    }
}

#[cfg(test)]
mod guard_tests {
    use std::time::Duration;

    use platform::token::{TokenSigner, TokenSubject};

    use super::support::*;
    use crate::application::{RouteAccess, UserUpdate};
    use crate::domain::repository::UserStore;
    use crate::domain::value_object::UserRole;
    use crate::error::{AuthError, UnauthorizedReason};

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    #[tokio::test]
    async fn test_public_route_needs_no_token() {
        let h = harness();
        let result = h.service.guard().authorize(&RouteAccess::Public, None).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_missing_or_non_bearer_header() {
        let h = harness();
        for header in [None, Some("Basic abc"), Some("Bearer "), Some("")] {
            let result = h
                .service
                .guard()
                .authorize(&RouteAccess::Authenticated, header)
                .await;
            assert!(matches!(
                result,
                Err(AuthError::Unauthorized(UnauthorizedReason::MissingToken))
            ));
        }
    }

    #[tokio::test]
    async fn test_admits_valid_token_and_attaches_identity() {
        let h = harness();
        let session = register(&h.service, "a@x.com").await;

        let identity = h
            .service
            .guard()
            .authorize(
                &RouteAccess::Authenticated,
                Some(&bearer(&session.tokens.access_token)),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.id, session.user.id);
        assert_eq!(identity.email.as_str(), "a@x.com");
        assert_eq!(identity.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_rejects_invalid_tokens() {
        let h = harness();
        let session = register(&h.service, "a@x.com").await;
        let subject = TokenSubject {
            id: session.user.id.to_string(),
            email: "a@x.com".into(),
            role: "user".into(),
        };

        let foreign = TokenSigner::new(b"another-secret-another-secret-xx", h.signer.issuer())
            .sign(&subject, Duration::from_secs(60))
            .unwrap();
        let expired = h.signer.sign(&subject, Duration::ZERO).unwrap();

        for token in ["garbage", foreign.as_str(), expired.as_str()] {
            let result = h.service.guard().authenticate(token).await;
            assert!(matches!(
                result,
                Err(AuthError::Unauthorized(UnauthorizedReason::InvalidOrExpired))
            ));
        }
    }

    #[tokio::test]
    async fn test_rejects_deleted_and_inactive_users() {
        let h = harness();
        let gone = register(&h.service, "gone@x.com").await;
        let idle = register(&h.service, "idle@x.com").await;

        h.users.delete(&gone.user.id).await.unwrap();
        let result = h.service.guard().authenticate(&gone.tokens.access_token).await;
        assert!(matches!(
            result,
            Err(AuthError::Unauthorized(UnauthorizedReason::UserNotFound))
        ));

        h.service
            .admin()
            .update(
                &idle.user.id,
                UserUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let result = h.service.guard().authenticate(&idle.tokens.access_token).await;
        assert!(matches!(
            result,
            Err(AuthError::Unauthorized(UnauthorizedReason::UserInactive))
        ));
    }

    #[tokio::test]
    async fn test_role_restricted_route() {
        let h = harness();
        let session = register(&h.service, "a@x.com").await;
        let header = bearer(&session.tokens.access_token);

        let denied = h
            .service
            .guard()
            .authorize(&RouteAccess::admin_only(), Some(&header))
            .await;
        assert!(matches!(denied, Err(AuthError::Forbidden)));

        // Role is read from the store, so promotion applies to the same token
        h.service
            .admin()
            .update(
                &session.user.id,
                UserUpdate {
                    role: Some(UserRole::Admin),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let admitted = h
            .service
            .guard()
            .authorize(&RouteAccess::admin_only(), Some(&header))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(admitted.role, UserRole::Admin);
    }
}

#[cfg(test)]
mod admin_tests {
    use super::support::*;
    use crate::application::{LoginInput, UserUpdate};
    use crate::domain::value_object::UserId;
    use crate::error::AuthError;

    #[tokio::test]
    async fn test_list_defaults_and_limits() {
        let h = harness();
        for i in 0..3 {
            register(&h.service, &format!("u{i}@x.com")).await;
        }

        let page = h.service.admin().list(None, None).await.unwrap();
        assert_eq!((page.page, page.limit, page.total), (1, 10, 3));
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.items.len(), 3);

        let clamped = h.service.admin().list(Some(0), Some(1000)).await.unwrap();
        assert_eq!((clamped.page, clamped.limit), (1, 100));

        let second = h.service.admin().list(Some(2), Some(2)).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.total_pages, 2);
    }

    #[tokio::test]
    async fn test_get_update_remove() {
        let h = harness();
        let session = register(&h.service, "a@x.com").await;
        let id = session.user.id;

        assert!(matches!(
            h.service.admin().get(&UserId::new()).await,
            Err(AuthError::UserNotFound)
        ));

        let updated = h
            .service
            .admin()
            .update(
                &id,
                UserUpdate {
                    first_name: Some(" Grace ".into()),
                    password: Some("Another789!".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.first_name, "Grace");
        assert_eq!(updated.last_name, "Lovelace");
        assert!(
            h.service
                .login(LoginInput {
                    email: "a@x.com".into(),
                    password: "Another789!".into(),
                })
                .await
                .is_ok()
        );

        let weak = h
            .service
            .admin()
            .update(
                &id,
                UserUpdate {
                    password: Some("weak".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(weak, Err(AuthError::Validation(_))));

        let removed = h.service.admin().remove(&id).await.unwrap();
        assert_eq!(removed.id, id);
        assert!(matches!(
            h.service.admin().remove(&id).await,
            Err(AuthError::UserNotFound)
        ));
        assert!(matches!(
            h.service.admin().me(&id).await,
            Err(AuthError::UserNotFound)
        ));
    }
}

#[cfg(test)]
mod router_tests {
    use std::net::SocketAddr;

    use axum::Router;
    use axum::extract::ConnectInfo;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use platform::rate_limit::RateLimitConfig;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::support::*;
    use crate::application::AuthConfig;
    use crate::infra::memory::MemoryUserStore;
    use crate::presentation::router::auth_router;

    fn app() -> Router {
        auth_router(harness().service)
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::get(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn register_body(email: &str) -> Value {
        json!({
            "email": email,
            "password": PASSWORD,
            "firstName": "Ada",
            "lastName": "Lovelace",
        })
    }

    #[tokio::test]
    async fn test_register_returns_public_user_and_tokens() {
        let app = app();
        let (status, body) = call(&app, post("/auth/register", register_body("a@x.com"), None)).await;

        assert_eq!(status, StatusCode::CREATED);
        assert!(body["accessToken"].is_string());
        assert!(body["refreshToken"].is_string());
        assert_eq!(body["user"]["email"], "a@x.com");
        assert_eq!(body["user"]["role"], "user");
        assert!(body["user"].get("passwordHash").is_none());
        assert!(body["user"].get("refreshTokens").is_none());

        let (status, body) = call(&app, post("/auth/register", register_body("a@x.com"), None)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status"], 409);
    }

    #[tokio::test]
    async fn test_me_requires_bearer_and_logout_revokes() {
        let app = app();
        let (_, session) = call(&app, post("/auth/register", register_body("a@x.com"), None)).await;
        let access = session["accessToken"].as_str().unwrap();
        let refresh = session["refreshToken"].as_str().unwrap();

        let (status, body) = call(&app, get("/users/me", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Missing bearer token");

        let (status, body) = call(&app, get("/users/me", Some(access))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "a@x.com");

        let (status, _) = call(
            &app,
            post("/auth/logout", json!({ "refreshToken": refresh }), Some(access)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, get("/users/me", Some(access))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Token has been revoked");

        let (status, _) = call(&app, post("/auth/refresh", json!({ "refreshToken": refresh }), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_reset_request_response_is_uniform() {
        let app = app();
        call(&app, post("/auth/register", register_body("a@x.com"), None)).await;

        let known = call(
            &app,
            post("/auth/password-reset-request", json!({ "email": "a@x.com" }), None),
        )
        .await;
        let unknown = call(
            &app,
            post(
                "/auth/password-reset-request",
                json!({ "email": "nobody@x.com" }),
                None,
            ),
        )
        .await;

        assert_eq!(known.0, StatusCode::OK);
        assert_eq!(known, unknown);
    }

    #[tokio::test]
    async fn test_admin_routes_are_role_restricted() {
        let app = app();
        let (_, session) = call(&app, post("/auth/register", register_body("a@x.com"), None)).await;
        let access = session["accessToken"].as_str().unwrap();
        let id = session["user"]["id"].as_str().unwrap();

        let (status, _) = call(&app, get(&format!("/users/{id}"), Some(access))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(&app, get("/users?page=1&limit=5", Some(access))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["limit"], 5);
    }

    #[tokio::test]
    async fn test_login_is_throttled_per_ip_and_email() {
        let config = AuthConfig {
            login_rate_limit: RateLimitConfig::new(2, 60),
            ..AuthConfig::development()
        };
        let app = auth_router(harness_with(MemoryUserStore::new(), config).service);
        call(&app, post("/auth/register", register_body("a@x.com"), None)).await;

        let attempt = || {
            post(
                "/auth/login",
                json!({ "email": "a@x.com", "password": "Wrong123!" }),
                None,
            )
        };
        let (first, _) = call(&app, attempt()).await;
        let (second, _) = call(&app, attempt()).await;
        let (third, body) = call(&app, attempt()).await;

        assert_eq!(first, StatusCode::UNAUTHORIZED);
        assert_eq!(second, StatusCode::UNAUTHORIZED);
        assert_eq!(third, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["status"], 429);

        // Separate counter for a different email
        let (status, _) = call(
            &app,
            post(
                "/auth/login",
                json!({ "email": "other@x.com", "password": PASSWORD }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    fn login_from(peer: &str, forwarded_for: &str, email: &str) -> Request<Body> {
        let mut request = post(
            "/auth/login",
            json!({ "email": email, "password": "Wrong123!" }),
            None,
        );
        request
            .headers_mut()
            .insert("x-forwarded-for", forwarded_for.parse().unwrap());
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::new(peer.parse().unwrap(), 40000)));
        request
    }

    #[tokio::test]
    async fn test_forwarded_for_from_direct_client_does_not_reset_throttle() {
        let config = AuthConfig {
            login_rate_limit: RateLimitConfig::new(2, 60),
            ..AuthConfig::development()
        };
        let app = auth_router(harness_with(MemoryUserStore::new(), config).service);
        call(&app, post("/auth/register", register_body("a@x.com"), None)).await;

        let mut statuses = Vec::new();
        for i in 0..6 {
            let forged = format!("10.0.0.{i}");
            let (status, _) = call(&app, login_from("203.0.113.9", &forged, "a@x.com")).await;
            statuses.push(status);
        }

        assert_eq!(&statuses[..2], &[StatusCode::UNAUTHORIZED; 2]);
        assert!(
            statuses[2..]
                .iter()
                .all(|s| *s == StatusCode::TOO_MANY_REQUESTS),
            "statuses: {statuses:?}"
        );
    }

    #[tokio::test]
    async fn test_trusted_proxy_forwards_client_address() {
        let config = AuthConfig {
            login_rate_limit: RateLimitConfig::new(1, 60),
            trusted_proxies: vec!["10.1.1.1".parse().unwrap()],
            ..AuthConfig::development()
        };
        let app = auth_router(harness_with(MemoryUserStore::new(), config).service);
        call(&app, post("/auth/register", register_body("a@x.com"), None)).await;

        let (first, _) = call(&app, login_from("10.1.1.1", "198.51.100.4", "a@x.com")).await;
        let (again, _) = call(&app, login_from("10.1.1.1", "198.51.100.4", "a@x.com")).await;
        let (other, _) = call(&app, login_from("10.1.1.1", "198.51.100.5", "a@x.com")).await;

        assert_eq!(first, StatusCode::UNAUTHORIZED);
        assert_eq!(again, StatusCode::TOO_MANY_REQUESTS);
        // A different client behind the same proxy has its own counter.
        assert_eq!(other, StatusCode::UNAUTHORIZED);
    }
}
