use std::{future::Future, time::Duration};

use tokio::time::timeout;
use tracing::warn;

use crate::error::{AppError, Collaborator};

/// Runs one collaborator call under `limit`. An elapsed deadline becomes
/// [`AppError::Timeout`], any other failure goes through the `From` conversion.
pub async fn bounded<T, E, F>(
    collaborator: Collaborator,
    limit: Duration,
    call: F,
) -> Result<T, AppError>
where
    F: Future<Output = Result<T, E>>,
    AppError: From<E>,
{
    match timeout(limit, call).await {
        Ok(result) => result.map_err(AppError::from),
        Err(_) => {
            warn!("{collaborator} call exceeded {}ms", limit.as_millis());

            Err(AppError::Timeout(collaborator))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_result_through() {
        let result = bounded(Collaborator::Database, Duration::from_secs(1), async {
            Ok::<_, AppError>(7)
        })
        .await;

        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_deadline_is_timeout() {
        let result = bounded(Collaborator::Storage, Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AppError>(())
        })
        .await;

        assert!(matches!(
            result,
            Err(AppError::Timeout(Collaborator::Storage))
        ));
    }
}
