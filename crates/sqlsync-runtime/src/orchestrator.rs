//! Runs one operation against many connections.
//!
//! Connections are processed one at a time in the order given. A failing
//! connection is recorded as a failed [`OperationResult`] and the next
//! connection is still attempted; nothing propagates past a single
//! connection's handling.

use std::convert::Infallible;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, warn};

use sqlsync_core::config::ConnectionConfig;
use sqlsync_core::error::Result;
use sqlsync_core::migration::ConnectionId;

use crate::migrations::BoxFuture;
use crate::sequential::run_sequentially;

/// Outcome of an operation on a single connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult<T> {
    pub connection_id: ConnectionId,
    pub result: std::result::Result<T, String>,
}

impl<T> OperationResult<T> {
    pub fn success(connection_id: ConnectionId, data: T) -> Self {
        Self {
            connection_id,
            result: Ok(data),
        }
    }

    pub fn failure(connection_id: ConnectionId, error: impl Into<String>) -> Self {
        Self {
            connection_id,
            result: Err(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn data(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&str> {
        self.result.as_ref().err().map(String::as_str)
    }
}

/// Whether every connection succeeded.
pub fn all_succeeded<T>(results: &[OperationResult<T>]) -> bool {
    results.iter().all(OperationResult::is_success)
}

/// Number of failed connections.
pub fn failed_count<T>(results: &[OperationResult<T>]) -> usize {
    results.iter().filter(|r| !r.is_success()).count()
}

/// Observer notified after each connection has been processed.
///
/// Exactly one hook is awaited per connection, before the next connection
/// starts, so observers see results in processing order.
pub trait ResultHandler<T>: Send + Sync {
    fn on_success<'a>(&'a self, result: &'a OperationResult<T>) -> BoxFuture<'a, ()>;

    fn on_failure<'a>(&'a self, result: &'a OperationResult<T>) -> BoxFuture<'a, ()>;
}

/// Handler that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl<T: Sync> ResultHandler<T> for NoopHandler {
    fn on_success<'a>(&'a self, _result: &'a OperationResult<T>) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    fn on_failure<'a>(&'a self, _result: &'a OperationResult<T>) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }
}

/// Anything that names a connection.
pub trait ConnectionTarget {
    fn connection_id(&self) -> &ConnectionId;
}

impl ConnectionTarget for ConnectionId {
    fn connection_id(&self) -> &ConnectionId {
        self
    }
}

impl ConnectionTarget for ConnectionConfig {
    fn connection_id(&self) -> &ConnectionId {
        &self.id
    }
}

/// Run `operation` against every connection, in order, one at a time.
///
/// Returns one result per connection in the order the connections were given.
/// Errors and panics raised by `operation` become failed results.
pub async fn run_for_connections<'c, C, T, F, Fut>(
    connections: &'c [C],
    handler: &dyn ResultHandler<T>,
    operation: F,
) -> Vec<OperationResult<T>>
where
    C: ConnectionTarget,
    F: Fn(&'c C) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let operation = &operation;
    let tasks = connections.iter().map(|connection| {
        move || async move {
            let id = connection.connection_id().clone();
            debug!(connection = %id, "Running operation");

            let outcome = AssertUnwindSafe(operation(connection)).catch_unwind().await;
            let result = match outcome {
                Ok(Ok(data)) => OperationResult::success(id, data),
                Ok(Err(e)) => OperationResult::failure(id, e.to_string()),
                Err(panic) => OperationResult::failure(id, panic_message(panic.as_ref())),
            };

            match result.error() {
                None => handler.on_success(&result).await,
                Some(error) => {
                    warn!(connection = %result.connection_id, "Operation failed: {}", error);
                    handler.on_failure(&result).await
                }
            }

            Ok::<_, Infallible>(result)
        }
    });

    match run_sequentially(tasks).await {
        Ok(results) => results,
        Err(never) => match never {},
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());

    format!("Operation panicked: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlsync_core::error::SyncError;
    use std::sync::Mutex;

    /// Records every notification as `ok:<id>` or `err:<id>`.
    #[derive(Default)]
    struct RecordingHandler {
        events: Mutex<Vec<String>>,
    }

    impl<T: Sync> ResultHandler<T> for RecordingHandler {
        fn on_success<'a>(&'a self, result: &'a OperationResult<T>) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                self.events
                    .lock()
                    .unwrap()
                    .push(format!("ok:{}", result.connection_id));
            })
        }

        fn on_failure<'a>(&'a self, result: &'a OperationResult<T>) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                self.events
                    .lock()
                    .unwrap()
                    .push(format!("err:{}", result.connection_id));
            })
        }
    }

    fn ids(names: &[&str]) -> Vec<ConnectionId> {
        names.iter().map(|n| ConnectionId::from(*n)).collect()
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_other_connections() {
        let connections = ids(&["A", "B", "C"]);
        let handler = RecordingHandler::default();

        let results = run_for_connections(&connections, &handler, |id| async move {
            if id.as_str() == "B" {
                Err(SyncError::Database("connection refused".into()))
            } else {
                Ok(id.to_string().to_lowercase())
            }
        })
        .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0], OperationResult::success("A".into(), "a".to_string()));
        assert!(!results[1].is_success());
        assert_eq!(results[1].connection_id.as_str(), "B");
        assert_eq!(results[1].error(), Some("Database error: connection refused"));
        assert_eq!(results[2].data().map(String::as_str), Some("c"));

        assert_eq!(
            *handler.events.lock().unwrap(),
            vec!["ok:A", "err:B", "ok:C"]
        );
        assert!(!all_succeeded(&results));
        assert_eq!(failed_count(&results), 1);
    }

    #[tokio::test]
    async fn test_connections_run_one_at_a_time() {
        let connections = ids(&["first", "second", "third"]);
        let log = Mutex::new(Vec::new());

        let results = run_for_connections(&connections, &NoopHandler, |id| {
            let log = &log;
            async move {
                log.lock().unwrap().push(format!("start {}", id));
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                log.lock().unwrap().push(format!("end {}", id));
                Ok(())
            }
        })
        .await;

        assert!(all_succeeded(&results));
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "start first",
                "end first",
                "start second",
                "end second",
                "start third",
                "end third"
            ]
        );
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let connections = ids(&["A", "B"]);

        let results = run_for_connections(&connections, &NoopHandler, |id| async move {
            if id.as_str() == "A" {
                panic!("executor exploded");
            }
            Ok(1)
        })
        .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].error(), Some("Operation panicked: executor exploded"));
        assert!(results[1].is_success());
    }

    #[tokio::test]
    async fn test_no_connections() {
        let connections: Vec<ConnectionId> = Vec::new();
        let results = run_for_connections(&connections, &NoopHandler, |_| async { Ok(()) }).await;
        assert!(results.is_empty());
        assert!(all_succeeded(&results));
    }

    #[tokio::test]
    async fn test_connection_configs_are_targets() {
        let connections = vec![
            ConnectionConfig::new("primary", "postgres://one"),
            ConnectionConfig::new("replica", "postgres://two"),
        ];

        let results = run_for_connections(&connections, &NoopHandler, |c| async move {
            Ok(c.url.clone())
        })
        .await;

        assert_eq!(results[1].connection_id.as_str(), "replica");
        assert_eq!(results[1].data().map(String::as_str), Some("postgres://two"));
    }
}
