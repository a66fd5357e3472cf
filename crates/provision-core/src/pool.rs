use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::{ProvisionError, Result};

/// Run `jobs` on spawned tasks with at most `threads` in flight. Every job is
/// awaited; results come back in submission order.
pub(crate) async fn run_bounded<T, Fut>(threads: usize, jobs: Vec<Fut>) -> Vec<Result<T>>
where
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(threads.max(1)));
    let handles: Vec<_> = jobs
        .into_iter()
        .map(|job| {
            let semaphore = Arc::clone(&semaphore);
            tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| ProvisionError::Worker(e.to_string()))?;
                job.await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(
            handle
                .await
                .unwrap_or_else(|e| Err(ProvisionError::Worker(e.to_string()))),
        );
    }
    results
}

/// The first error in submission order, or every value.
pub(crate) fn first_error<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let jobs: Vec<_> = (0..8)
            .map(|i| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, ProvisionError>(i)
                }
            })
            .collect();

        let results = run_bounded(3, jobs).await;

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(first_error(results).unwrap(), (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_all_jobs_finish_before_first_error_returns() {
        let finished = Arc::new(AtomicUsize::new(0));
        let jobs: Vec<_> = (0..4)
            .map(|i| {
                let finished = Arc::clone(&finished);
                async move {
                    finished.fetch_add(1, Ordering::SeqCst);
                    if i == 1 {
                        Err(ProvisionError::Worker(format!("job {i}")))
                    } else {
                        Ok(i)
                    }
                }
            })
            .collect();

        let result = first_error(run_bounded(2, jobs).await);

        assert_eq!(finished.load(Ordering::SeqCst), 4);
        assert!(matches!(result, Err(ProvisionError::Worker(ref m)) if m == "job 1"));
    }
}
