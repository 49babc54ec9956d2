//! Strictly ordered execution of deferred operations.

use std::future::Future;
use std::time::Duration;

use sqlsync_core::error::{Result, SyncError};

/// Run each task to completion before starting the next.
///
/// Tasks are only invoked once their predecessor has finished, so a lazy
/// iterator never builds a future ahead of time. The first error is returned
/// immediately and the remaining tasks are never started.
pub async fn run_sequentially<I, F, Fut, T, E>(tasks: I) -> std::result::Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let tasks = tasks.into_iter();
    let mut results = Vec::with_capacity(tasks.size_hint().0);

    for task in tasks {
        results.push(task().await?);
    }

    Ok(results)
}

/// Race `future` against `limit`.
///
/// Best effort only: on expiry the future is dropped, but I/O it already
/// handed to the database is not cancelled or rolled back.
pub async fn with_timeout<T, Fut>(limit: Option<Duration>, future: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| SyncError::Timeout(limit))?,
        None => future.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_results_in_order() {
        // The slowest task goes first; results must still follow task order.
        let tasks = [30u64, 10, 0].into_iter().enumerate().map(|(i, delay)| {
            move || async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok::<_, SyncError>(i + 1)
            }
        });

        let results = run_sequentially(tasks).await.unwrap();
        assert_eq!(results, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_tasks_do_not_overlap() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let tasks = (0..3).map(|i| {
            let log = Arc::clone(&log);
            move || async move {
                log.lock().unwrap().push(format!("start {}", i));
                tokio::time::sleep(Duration::from_millis(5)).await;
                log.lock().unwrap().push(format!("end {}", i));
                Ok::<_, SyncError>(i)
            }
        });

        run_sequentially(tasks).await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["start 0", "end 0", "start 1", "end 1", "start 2", "end 2"]
        );
    }

    #[tokio::test]
    async fn test_failure_stops_remaining_tasks() {
        let started = Arc::new(Mutex::new(Vec::new()));

        let tasks = ["f1", "f2", "f3"].into_iter().map(|name| {
            let started = Arc::clone(&started);
            move || async move {
                started.lock().unwrap().push(name);
                if name == "f2" {
                    Err(SyncError::Database("f2 failed".into()))
                } else {
                    Ok(name)
                }
            }
        });

        let err = run_sequentially(tasks).await.unwrap_err();
        assert_eq!(err.to_string(), "Database error: f2 failed");
        assert_eq!(*started.lock().unwrap(), vec!["f1", "f2"]);
    }

    #[tokio::test]
    async fn test_empty_task_list() {
        let tasks: Vec<fn() -> std::future::Ready<Result<()>>> = Vec::new();
        let results = run_sequentially(tasks).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_with_timeout() {
        let ok = with_timeout(Some(Duration::from_secs(1)), async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let slow = with_timeout(Some(Duration::from_millis(10)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(slow, Err(SyncError::Timeout(_))));

        let unbounded = with_timeout(None, async { Ok("done") }).await;
        assert_eq!(unbounded.unwrap(), "done");
    }
}
