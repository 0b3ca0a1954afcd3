use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What a task wants to happen after one unit of work.
#[derive(Debug, Clone)]
pub enum Continuation {
    Continue,
    ContinueAfter(Duration),
    Exit,
}

/// How to react to a failed unit of work.
#[derive(Debug, Clone)]
pub enum SupervisionStrategy {
    Resume,
    Backoff(Duration),
    Stop,
}

/// A long-lived daemon task processing one unit of work per call: one feed
/// message, one client request, one lifecycle tick. Errors and panics are
/// contained at this boundary and the task carries on with the next unit;
/// nothing past startup is fatal.
#[async_trait]
pub trait Task: Send + 'static {
    type Error: std::fmt::Debug + Send;

    fn name(&self) -> &'static str;

    /// Perform one unit of work.
    async fn run(&mut self) -> Result<Continuation, Self::Error>;

    fn on_error(&self, _error: &Self::Error) -> SupervisionStrategy {
        SupervisionStrategy::Resume
    }
}

/// Drive a task until it exits or the token is cancelled.
pub fn spawn<T: Task>(mut task: T, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            match AssertUnwindSafe(task.run()).catch_unwind().await {
                Ok(Ok(Continuation::Continue)) => {}
                Ok(Ok(Continuation::ContinueAfter(delay))) => {
                    if wait(&shutdown, delay).await {
                        break;
                    }
                }
                Ok(Ok(Continuation::Exit)) => break,
                Ok(Err(why)) => {
                    log::error!("task {} failed: {:?}", task.name(), why);
                    match task.on_error(&why) {
                        SupervisionStrategy::Resume => {}
                        SupervisionStrategy::Backoff(delay) => {
                            if wait(&shutdown, delay).await {
                                break;
                            }
                        }
                        SupervisionStrategy::Stop => break,
                    }
                }
                Err(why) => {
                    log::error!("task {} panicked: {:?}", task.name(), why);
                }
            }
        }
        log::info!("task {} stopped", task.name());
    })
}

/// Sleep unless shutdown comes first; true means stop the task.
async fn wait(shutdown: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
