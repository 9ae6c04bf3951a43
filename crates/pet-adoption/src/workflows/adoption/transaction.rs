use std::future::Future;

use tracing::debug;

use super::service::AdoptionError;

/// Run an optimistic read-modify-write until it commits without contention.
///
/// `attempt` must re-read everything it depends on; a `Contention` error from the store means a
/// document changed between read and commit and the whole closure runs again.
pub(crate) async fn run_transaction<T, F, Fut>(
    operation: &'static str,
    max_attempts: u32,
    mut attempt: F,
) -> Result<T, AdoptionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AdoptionError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut tries = 0;
    loop {
        tries += 1;
        match attempt().await {
            Err(AdoptionError::Repository(error)) if error.is_contention() => {
                if tries >= max_attempts {
                    return Err(AdoptionError::RetryExhausted {
                        operation,
                        attempts: tries,
                    });
                }
                debug!(operation, attempt = tries, %error, "transaction contended; retrying");
                tokio::task::yield_now().await;
            }
            other => return other,
        }
    }
}
