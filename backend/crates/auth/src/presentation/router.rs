//! Auth Router

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::application::{RouteAccess, RouteTable, SessionService};
use crate::domain::repository::{ResetTokenMailer, TokenBlacklistStore, UserStore};
use crate::presentation::handlers::{self, AuthAppState};
use crate::presentation::middleware::require_access;

/// Access requirements of every route in [`auth_router`]
pub fn auth_route_table() -> RouteTable {
    RouteTable::new()
        .public("POST", "/auth/register")
        .public("POST", "/auth/login")
        .public("POST", "/auth/refresh")
        .public("POST", "/auth/password-reset-request")
        .public("POST", "/auth/password-reset")
        .route("POST", "/auth/logout", RouteAccess::Authenticated)
        .route("POST", "/auth/logout-all", RouteAccess::Authenticated)
        .route("GET", "/users/me", RouteAccess::Authenticated)
        .route("GET", "/users", RouteAccess::Authenticated)
        .route("GET", "/users/{id}", RouteAccess::admin_only())
        .route("PATCH", "/users/{id}", RouteAccess::admin_only())
        .route("DELETE", "/users/{id}", RouteAccess::admin_only())
}

/// Create the Auth router for any store implementation
pub fn auth_router<U, B, M>(service: SessionService<U, B, M>) -> Router
where
    U: UserStore + Send + Sync + 'static,
    B: TokenBlacklistStore + Send + Sync + 'static,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    auth_router_with_state(AuthAppState::new(service, auth_route_table()))
}

pub fn auth_router_with_state<U, B, M>(state: AuthAppState<U, B, M>) -> Router
where
    U: UserStore + Send + Sync + 'static,
    B: TokenBlacklistStore + Send + Sync + 'static,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    Router::new()
        .route("/auth/register", post(handlers::register::<U, B, M>))
        .route("/auth/login", post(handlers::login::<U, B, M>))
        .route("/auth/refresh", post(handlers::refresh::<U, B, M>))
        .route("/auth/logout", post(handlers::logout::<U, B, M>))
        .route("/auth/logout-all", post(handlers::logout_all::<U, B, M>))
        .route(
            "/auth/password-reset-request",
            post(handlers::password_reset_request::<U, B, M>),
        )
        .route(
            "/auth/password-reset",
            post(handlers::password_reset::<U, B, M>),
        )
        .route("/users/me", get(handlers::me::<U, B, M>))
        .route("/users", get(handlers::list_users::<U, B, M>))
        .route(
            "/users/{id}",
            get(handlers::get_user::<U, B, M>)
                .patch(handlers::update_user::<U, B, M>)
                .delete(handlers::delete_user::<U, B, M>),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_access::<U, B, M>,
        ))
        .with_state(state)
}
