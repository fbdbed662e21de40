use std::future::Future;

use tokio::task::JoinHandle;
use tracing::error;

/// How a supervised task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<T> {
    Finished(T),
    Panicked(String),
    Aborted,
}

impl<T> TaskOutcome<T> {
    pub fn finished(self) -> Option<T> {
        match self {
            TaskOutcome::Finished(value) => Some(value),
            _ => None,
        }
    }
}

/// Spawn `fut` and convert a panic inside it into `TaskOutcome::Panicked`
/// instead of tearing down the caller.
pub fn spawn_supervised<F, T>(name: &'static str, fut: F) -> JoinHandle<TaskOutcome<T>>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let inner = tokio::spawn(fut);
    tokio::spawn(async move {
        match inner.await {
            Ok(value) => TaskOutcome::Finished(value),
            Err(e) if e.is_panic() => {
                let panic = e.into_panic();
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("💥 task {} panicked: {}", name, message);
                TaskOutcome::Panicked(message)
            }
            Err(_) => TaskOutcome::Aborted,
        }
    })
}
