//! HTTP Handlers

use axum::Json;
use axum::extract::{ConnectInfo, Extension, Path, Query, State};
use axum::http::{Extensions, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use std::net::SocketAddr;
use std::sync::Arc;

use platform::client::{extract_bearer_token, extract_client_ip};
use platform::rate_limit::MemoryRateLimitStore;

use crate::application::{
    AuthenticatedUser, LoginInput, LoginThrottle, RegisterInput, RouteTable, SessionService,
    UserUpdate,
};
use crate::domain::repository::{ResetTokenMailer, TokenBlacklistStore, UserStore};
use crate::domain::value_object::UserId;
use crate::error::{AuthError, AuthResult, UnauthorizedReason};
use crate::presentation::dto::{
    LoginRequest, LogoutRequest, MessageResponse, PageQuery, PasswordResetBody,
    PasswordResetRequestBody, RefreshRequest, RegisterRequest, SessionResponse,
    UpdateUserRequest,
};

/// Shared state for auth handlers
pub struct AuthAppState<U, B, M>
where
    U: UserStore + Send + Sync + 'static,
    B: TokenBlacklistStore + Send + Sync + 'static,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    pub service: SessionService<U, B, M>,
    pub routes: Arc<RouteTable>,
    pub throttle: Arc<LoginThrottle<MemoryRateLimitStore>>,
}

impl<U, B, M> Clone for AuthAppState<U, B, M>
where
    U: UserStore + Send + Sync + 'static,
    B: TokenBlacklistStore + Send + Sync + 'static,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            routes: self.routes.clone(),
            throttle: self.throttle.clone(),
        }
    }
}

impl<U, B, M> AuthAppState<U, B, M>
where
    U: UserStore + Send + Sync + 'static,
    B: TokenBlacklistStore + Send + Sync + 'static,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    /// State with the throttle limits taken from the service config
    pub fn new(service: SessionService<U, B, M>, routes: RouteTable) -> Self {
        let throttle = LoginThrottle::new(
            Arc::new(MemoryRateLimitStore::new()),
            service.config().login_rate_limit.clone(),
        );
        Self {
            service,
            routes: Arc::new(routes),
            throttle: Arc::new(throttle),
        }
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// POST /auth/register
pub async fn register<U, B, M>(
    State(state): State<AuthAppState<U, B, M>>,
    Json(req): Json<RegisterRequest>,
) -> AuthResult<impl IntoResponse>
where
    U: UserStore + Send + Sync + 'static,
    B: TokenBlacklistStore + Send + Sync + 'static,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    let output = state
        .service
        .register(RegisterInput {
            email: req.email,
            password: req.password,
            first_name: req.first_name,
            last_name: req.last_name,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(SessionResponse::from(output))))
}

/// POST /auth/login
pub async fn login<U, B, M>(
    State(state): State<AuthAppState<U, B, M>>,
    headers: HeaderMap,
    extensions: Extensions,
    Json(req): Json<LoginRequest>,
) -> AuthResult<Json<SessionResponse>>
where
    U: UserStore + Send + Sync + 'static,
    B: TokenBlacklistStore + Send + Sync + 'static,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    let direct_ip = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());
    let client_ip = extract_client_ip(
        &headers,
        direct_ip,
        &state.service.config().trusted_proxies,
    );

    state.throttle.check(client_ip, &req.email).await?;

    let output = state
        .service
        .login(LoginInput {
            email: req.email,
            password: req.password,
        })
        .await?;

    Ok(Json(output.into()))
}

/// POST /auth/refresh
pub async fn refresh<U, B, M>(
    State(state): State<AuthAppState<U, B, M>>,
    Json(req): Json<RefreshRequest>,
) -> AuthResult<Json<SessionResponse>>
where
    U: UserStore + Send + Sync + 'static,
    B: TokenBlacklistStore + Send + Sync + 'static,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    let output = state.service.refresh(&req.refresh_token).await?;
    Ok(Json(output.into()))
}

/// POST /auth/logout
pub async fn logout<U, B, M>(
    State(state): State<AuthAppState<U, B, M>>,
    Extension(identity): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    Json(req): Json<LogoutRequest>,
) -> AuthResult<Json<MessageResponse>>
where
    U: UserStore + Send + Sync + 'static,
    B: TokenBlacklistStore + Send + Sync + 'static,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    let access_token = extract_bearer_token(&headers)
        .ok_or(AuthError::Unauthorized(UnauthorizedReason::MissingToken))?;

    state
        .service
        .logout(&identity.id, access_token, &req.refresh_token)
        .await?;

    Ok(Json(MessageResponse {
        message: "Logged out",
    }))
}

/// POST /auth/logout-all
pub async fn logout_all<U, B, M>(
    State(state): State<AuthAppState<U, B, M>>,
    Extension(identity): Extension<AuthenticatedUser>,
) -> AuthResult<Json<MessageResponse>>
where
    U: UserStore + Send + Sync + 'static,
    B: TokenBlacklistStore + Send + Sync + 'static,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    state.service.logout_all(&identity.id).await?;

    Ok(Json(MessageResponse {
        message: "Logged out of all sessions",
    }))
}

// ============================================================================
// Password Reset
// ============================================================================

/// POST /auth/password-reset-request
pub async fn password_reset_request<U, B, M>(
    State(state): State<AuthAppState<U, B, M>>,
    Json(req): Json<PasswordResetRequestBody>,
) -> AuthResult<Json<MessageResponse>>
where
    U: UserStore + Send + Sync + 'static,
    B: TokenBlacklistStore + Send + Sync + 'static,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    // Detached: the response must not wait on lookup or delivery.
    drop(state.service.request_password_reset(&req.email));

    Ok(Json(MessageResponse {
        message: "If that email is registered, a reset link has been sent",
    }))
}

/// POST /auth/password-reset
pub async fn password_reset<U, B, M>(
    State(state): State<AuthAppState<U, B, M>>,
    Json(req): Json<PasswordResetBody>,
) -> AuthResult<Json<MessageResponse>>
where
    U: UserStore + Send + Sync + 'static,
    B: TokenBlacklistStore + Send + Sync + 'static,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    state
        .service
        .reset_password(&req.token, req.new_password)
        .await?;

    Ok(Json(MessageResponse {
        message: "Password has been reset",
    }))
}

// ============================================================================
// Users
// ============================================================================

fn parse_user_id(raw: &str) -> AuthResult<UserId> {
    raw.parse()
        .map_err(|_| AuthError::Validation("Invalid user id".into()))
}

/// GET /users/me
pub async fn me<U, B, M>(
    State(state): State<AuthAppState<U, B, M>>,
    Extension(identity): Extension<AuthenticatedUser>,
) -> AuthResult<impl IntoResponse>
where
    U: UserStore + Send + Sync + 'static,
    B: TokenBlacklistStore + Send + Sync + 'static,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    Ok(Json(state.service.admin().me(&identity.id).await?))
}

/// GET /users
pub async fn list_users<U, B, M>(
    State(state): State<AuthAppState<U, B, M>>,
    Query(query): Query<PageQuery>,
) -> AuthResult<impl IntoResponse>
where
    U: UserStore + Send + Sync + 'static,
    B: TokenBlacklistStore + Send + Sync + 'static,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    Ok(Json(
        state.service.admin().list(query.page, query.limit).await?,
    ))
}

/// GET /users/{id}
pub async fn get_user<U, B, M>(
    State(state): State<AuthAppState<U, B, M>>,
    Path(id): Path<String>,
) -> AuthResult<impl IntoResponse>
where
    U: UserStore + Send + Sync + 'static,
    B: TokenBlacklistStore + Send + Sync + 'static,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    let id = parse_user_id(&id)?;
    Ok(Json(state.service.admin().get(&id).await?))
}

/// PATCH /users/{id}
pub async fn update_user<U, B, M>(
    State(state): State<AuthAppState<U, B, M>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> AuthResult<impl IntoResponse>
where
    U: UserStore + Send + Sync + 'static,
    B: TokenBlacklistStore + Send + Sync + 'static,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    let id = parse_user_id(&id)?;
    let update = UserUpdate {
        first_name: req.first_name,
        last_name: req.last_name,
        role: req.role,
        is_active: req.is_active,
        password: req.password,
    };
    Ok(Json(state.service.admin().update(&id, update).await?))
}

/// DELETE /users/{id}
pub async fn delete_user<U, B, M>(
    State(state): State<AuthAppState<U, B, M>>,
    Path(id): Path<String>,
) -> AuthResult<impl IntoResponse>
where
    U: UserStore + Send + Sync + 'static,
    B: TokenBlacklistStore + Send + Sync + 'static,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    let id = parse_user_id(&id)?;
    Ok(Json(state.service.admin().remove(&id).await?))
}
