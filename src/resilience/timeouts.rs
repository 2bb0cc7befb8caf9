//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound the time a request may spend in middleware and handlers
//! - Cancel the pipeline cleanly on expiry
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - Timed-out requests return 504 Gateway Timeout

use std::future::Future;
use std::time::Duration;

use crate::error::{RouteError, RouteResult};

/// Default response deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Run `fut`, failing with [`RouteError::Timeout`] if it outlives `deadline`.
///
/// On expiry the future is dropped, releasing everything it borrowed.
pub async fn with_deadline<F, T>(deadline: Duration, fut: F) -> RouteResult<T>
where
    F: Future<Output = RouteResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(deadline_ms = deadline.as_millis() as u64, "Request deadline expired");
            Err(RouteError::Timeout(deadline))
        }
    }
}
