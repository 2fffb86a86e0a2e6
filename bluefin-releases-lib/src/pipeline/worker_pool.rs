//! A bounded pool of tasks draining a shared work queue.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

const LOG_TARGET: &str = "      pool";

/// Run `work` over every item using at most `workers` concurrent tasks.
///
/// Workers pull items from a shared queue and push their outputs onto a results
/// channel; the function returns once every worker has drained the queue and joined.
/// Outputs arrive in completion order. Dropping the returned future aborts every
/// worker, so items not yet started are never dispatched.
pub async fn run_pool<I, O, F, Fut>(items: Vec<I>, workers: usize, work: F) -> Vec<O>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
{
    if items.is_empty() {
        return Vec::new();
    }

    let total = items.len();
    let workers = workers.clamp(1, total);
    let queue = Arc::new(Mutex::new(VecDeque::from(items)));
    let work = Arc::new(work);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut tasks = JoinSet::new();
    for _ in 0..workers {
        let queue = Arc::clone(&queue);
        let work = Arc::clone(&work);
        let tx = tx.clone();

        let _ = tasks.spawn(async move {
            loop {
                let Some(item) = queue.lock().await.pop_front() else {
                    break;
                };

                if tx.send(work(item).await).is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    let mut outputs = Vec::with_capacity(total);
    while let Some(output) = rx.recv().await {
        outputs.push(output);
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            log::warn!(target: LOG_TARGET, "A worker task failed: {e}");
        }
    }

    outputs
}
