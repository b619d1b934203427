//! Auth Middleware
//!
//! Applies the route table to every matched route and attaches the
//! [`AuthenticatedUser`] for downstream handlers.

use axum::extract::{MatchedPath, Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::application::AuthenticatedUser;
use crate::domain::repository::{ResetTokenMailer, TokenBlacklistStore, UserStore};
use crate::presentation::handlers::AuthAppState;

/// Admit or reject the request according to its route's access entry
pub async fn require_access<U, B, M>(
    State(state): State<AuthAppState<U, B, M>>,
    mut req: Request,
    next: Next,
) -> Response
where
    U: UserStore + Send + Sync + 'static,
    B: TokenBlacklistStore + Send + Sync + 'static,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());
    let access = state.routes.access(req.method().as_str(), &path).clone();

    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let identity = match state
        .service
        .guard()
        .authorize(&access, authorization.as_deref())
        .await
    {
        Ok(identity) => identity,
        Err(e) => return e.into_response(),
    };

    if let Some(identity) = identity {
        req.extensions_mut().insert::<AuthenticatedUser>(identity);
    }

    next.run(req).await
}
