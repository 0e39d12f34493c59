//! Bounded fire-and-forget spawner for persistence and webhook calls

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{debug, error, warn};

use courier_core::{DomainError, DomainResult, SessionId};

struct Job {
    task: &'static str,
    fut: BoxFuture<'static, DomainResult<()>>,
}

/// Runs side effects off the event path
///
/// At most `concurrency` side effects run at once; the rest queue on the
/// semaphore. Errors and panics are logged and never reach the caller.
///
/// [`Self::spawn`] runs work independently. [`Self::enqueue`] and
/// [`Self::run_ordered`] go through a per-session lane that executes jobs
/// one at a time in submission order, so datastore writes for one session
/// land in the order their events happened.
#[derive(Clone)]
pub struct SideEffects {
    permits: Arc<Semaphore>,
    lanes: Arc<DashMap<SessionId, mpsc::UnboundedSender<Job>>>,
}

impl SideEffects {
    pub fn new(concurrency: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            lanes: Arc::new(DashMap::new()),
        }
    }

    /// Permits not currently held by a running side effect
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn spawn<F>(&self, task: &'static str, session_id: &SessionId, fut: F)
    where
        F: Future<Output = DomainResult<()>> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let session_id = session_id.clone();

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            contain(task, &session_id, fut).await;
        });
    }

    /// Queue `fut` behind every earlier ordered side effect of `session_id`
    pub fn enqueue<F>(&self, task: &'static str, session_id: &SessionId, fut: F)
    where
        F: Future<Output = DomainResult<()>> + Send + 'static,
    {
        let job = Job {
            task,
            fut: fut.boxed(),
        };

        let mut lane = self
            .lanes
            .entry(session_id.clone())
            .or_insert_with(|| self.open_lane(session_id));
        if let Err(mpsc::error::SendError(job)) = lane.send(job) {
            // The worker only stops once its runtime is gone.
            *lane = self.open_lane(session_id);
            if lane.send(job).is_err() {
                warn!(session_id = %session_id, task, "Side effect lane unavailable; dropping job");
            }
        }
    }

    /// Run `fut` in the session lane and wait for its result
    pub async fn run_ordered<F>(
        &self,
        task: &'static str,
        session_id: &SessionId,
        fut: F,
    ) -> DomainResult<()>
    where
        F: Future<Output = DomainResult<()>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.enqueue(task, session_id, async move {
            // The caller may have stopped waiting.
            let _ = tx.send(fut.await);
            Ok(())
        });

        rx.await.unwrap_or_else(|_| {
            Err(DomainError::InternalError(format!(
                "side effect {task} did not complete"
            )))
        })
    }

    /// Close the lane of `session_id` once its queued jobs have run
    pub fn close_lane(&self, session_id: &SessionId) {
        if self.lanes.remove(session_id).is_some() {
            debug!(session_id = %session_id, "Side effect lane closed");
        }
    }

    /// Number of open session lanes
    pub fn lanes(&self) -> usize {
        self.lanes.len()
    }

    fn open_lane(&self, session_id: &SessionId) -> mpsc::UnboundedSender<Job> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let permits = Arc::clone(&self.permits);
        let session_id = session_id.clone();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let Ok(_permit) = permits.acquire().await else {
                    return;
                };
                contain(job.task, &session_id, job.fut).await;
            }
        });
        tx
    }
}

/// Await `fut`, logging its error or panic
async fn contain<F>(task: &'static str, session_id: &SessionId, fut: F)
where
    F: Future<Output = DomainResult<()>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(session_id = %session_id, task, error = %e, "Side effect failed");
        }
        Err(panic) => {
            error!(
                session_id = %session_id,
                task,
                panic = panic_message(panic.as_ref()),
                "Side effect panicked"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
