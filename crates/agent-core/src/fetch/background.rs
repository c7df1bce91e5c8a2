//! Work that outlives the response it belongs to.
//!
//! Cache writes never hold up the caller. Each strategy hands its writes to
//! [`BackgroundWork`]; the host may await [`BackgroundWork::settle`] to keep
//! the agent alive until they finish, tests await it to observe the writes.

use crate::cache::DynCacheStore;
use crate::http::{Request, Response};
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Background tasks spawned while handling one event.
#[derive(Debug, Default)]
pub struct BackgroundWork {
    tasks: Vec<JoinHandle<()>>,
}

impl BackgroundWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` onto the runtime and track it.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push(tokio::spawn(task));
    }

    /// Spawn a best-effort cache write.
    pub fn store(
        &mut self,
        store: DynCacheStore,
        generation: String,
        request: Request,
        response: Response,
    ) {
        self.spawn(put_best_effort(store, generation, request, response));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every tracked task to finish.
    pub async fn settle(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }
    }
}

/// Open `generation` and store the pair, logging instead of failing.
pub(crate) async fn put_best_effort(
    store: DynCacheStore,
    generation: String,
    request: Request,
    response: Response,
) {
    let result = async {
        let handle = store.open(&generation).await?;
        handle.put(&request, response).await
    }
    .await;

    match result {
        Ok(()) => debug!("Cached {} in {}", request.url, generation),
        Err(e) => warn!("Cache write for {} in {} failed: {}", request.url, generation, e),
    }
}
