//! Session Service
//!
//! Wires the use cases over one set of stores, hasher and signer. Cheap to
//! clone; every handler holds one.

use std::sync::Arc;

use platform::password::PasswordHasher;
use platform::token::TokenSigner;
use tokio::task::JoinHandle;

use crate::application::blacklist::TokenBlacklist;
use crate::application::config::AuthConfig;
use crate::application::guard::AuthGuard;
use crate::application::login::{LoginInput, LoginUseCase};
use crate::application::logout::LogoutUseCase;
use crate::application::password_reset::PasswordResetUseCase;
use crate::application::refresh::RefreshUseCase;
use crate::application::register::{RegisterInput, RegisterUseCase};
use crate::application::tokens::{SessionOutput, TokenIssuer};
use crate::application::user_admin::UserAdminService;
use crate::domain::repository::{ResetTokenMailer, TokenBlacklistStore, UserStore};
use crate::domain::value_object::UserId;
use crate::error::AuthResult;

pub struct SessionService<U, B, M>
where
    U: UserStore,
    B: TokenBlacklistStore,
    M: ResetTokenMailer,
{
    register: Arc<RegisterUseCase<U>>,
    login: Arc<LoginUseCase<U>>,
    refresh: Arc<RefreshUseCase<U>>,
    logout: Arc<LogoutUseCase<U, B>>,
    password_reset: Arc<PasswordResetUseCase<U, M>>,
    guard: Arc<AuthGuard<U, B>>,
    admin: Arc<UserAdminService<U>>,
    config: Arc<AuthConfig>,
}

impl<U, B, M> Clone for SessionService<U, B, M>
where
    U: UserStore,
    B: TokenBlacklistStore,
    M: ResetTokenMailer,
{
    fn clone(&self) -> Self {
        Self {
            register: self.register.clone(),
            login: self.login.clone(),
            refresh: self.refresh.clone(),
            logout: self.logout.clone(),
            password_reset: self.password_reset.clone(),
            guard: self.guard.clone(),
            admin: self.admin.clone(),
            config: self.config.clone(),
        }
    }
}

impl<U, B, M> SessionService<U, B, M>
where
    U: UserStore,
    B: TokenBlacklistStore,
    M: ResetTokenMailer,
{
    pub fn new(
        users: Arc<U>,
        blacklist_store: Arc<B>,
        mailer: Arc<M>,
        hasher: Arc<PasswordHasher>,
        signer: Arc<TokenSigner>,
        config: Arc<AuthConfig>,
    ) -> Self {
        let issuer = TokenIssuer::new(signer.clone(), config.clone());
        let blacklist = Arc::new(TokenBlacklist::new(
            blacklist_store,
            signer.clone(),
            config.store_timeout,
        ));

        Self {
            register: Arc::new(RegisterUseCase::new(
                users.clone(),
                hasher.clone(),
                issuer.clone(),
                config.clone(),
            )),
            login: Arc::new(LoginUseCase::new(
                users.clone(),
                hasher.clone(),
                issuer.clone(),
                config.clone(),
            )),
            refresh: Arc::new(RefreshUseCase::new(users.clone(), issuer, config.clone())),
            logout: Arc::new(LogoutUseCase::new(
                users.clone(),
                blacklist.clone(),
                config.clone(),
            )),
            password_reset: Arc::new(PasswordResetUseCase::new(
                users.clone(),
                mailer,
                hasher.clone(),
                config.clone(),
            )),
            guard: Arc::new(AuthGuard::new(
                users.clone(),
                blacklist,
                signer,
                config.store_timeout,
            )),
            admin: Arc::new(UserAdminService::new(users, hasher, config.clone())),
            config,
        }
    }

    /// Build the hasher and signer from `config`.
    pub fn from_config(
        users: Arc<U>,
        blacklist_store: Arc<B>,
        mailer: Arc<M>,
        config: AuthConfig,
    ) -> AuthResult<Self> {
        let hasher = Arc::new(PasswordHasher::new(config.password_hash)?);
        let signer = Arc::new(config.access_token_signer());
        Ok(Self::new(
            users,
            blacklist_store,
            mailer,
            hasher,
            signer,
            Arc::new(config),
        ))
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub async fn register(&self, input: RegisterInput) -> AuthResult<SessionOutput> {
        self.register.execute(input).await
    }

    pub async fn login(&self, input: LoginInput) -> AuthResult<SessionOutput> {
        self.login.execute(input).await
    }

    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<SessionOutput> {
        self.refresh.execute(refresh_token).await
    }

    pub async fn logout(
        &self,
        user_id: &UserId,
        access_token: &str,
        refresh_token: &str,
    ) -> AuthResult<()> {
        self.logout
            .execute(user_id, access_token, refresh_token)
            .await
    }

    pub async fn logout_all(&self, user_id: &UserId) -> AuthResult<()> {
        self.logout.execute_all(user_id).await
    }

    pub async fn reset_password(&self, token: &str, new_password: String) -> AuthResult<()> {
        self.password_reset.confirm(token, new_password).await
    }

    pub fn guard(&self) -> &AuthGuard<U, B> {
        &self.guard
    }

    pub fn admin(&self) -> &UserAdminService<U> {
        &self.admin
    }
}

impl<U, B, M> SessionService<U, B, M>
where
    U: UserStore + Send + Sync + 'static,
    B: TokenBlacklistStore,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    /// Returns before any lookup or delivery happens. Awaiting the handle
    /// waits for the background work; dropping it detaches.
    pub fn request_password_reset(&self, email: &str) -> JoinHandle<()> {
        self.password_reset.request(email)
    }
}
