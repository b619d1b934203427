//! Bounded store calls

use std::future::Future;
use std::time::Duration;

use kernel::id::UserId;

use crate::error::{AuthError, AuthResult, OperationContext};

/// Await a store future for at most `limit`, logging server-side failures
/// with the operation name and user id.
pub(crate) async fn store_call<T, F>(
    limit: Duration,
    operation: &'static str,
    user_id: Option<&UserId>,
    fut: F,
) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    let result = match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AuthError::Internal(format!(
            "store call timed out after {}ms",
            limit.as_millis()
        ))),
    };
    result.op_context(operation, user_id)
}
