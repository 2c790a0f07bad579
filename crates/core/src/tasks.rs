use std::future::Future;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};

/// Bounded set of tenant operations running as tokio tasks.
///
/// Every task is tracked by the index it was spawned with, so callers can restore
/// declaration order and attribute panics after completion.
#[derive(Debug)]
pub(crate) struct OpSet<T> {
	op: &'static str,
	limit: Arc<Semaphore>,
	inner: JoinSet<T>,
	indices: FxHashMap<Id, usize>,
}

impl<T> OpSet<T>
where
	T: Send + 'static,
{
	/// Creates an empty set sharing `limit` with other sets of the same island.
	pub fn new(op: &'static str, limit: Arc<Semaphore>) -> Self {
		Self {
			op,
			limit,
			inner: JoinSet::new(),
			indices: FxHashMap::default(),
		}
	}

	/// Spawns `fut` once a permit is available.
	pub fn spawn<F>(&mut self, index: usize, fut: F)
	where
		F: Future<Output = T> + Send + 'static,
	{
		tracing::trace!(op = self.op, index, pending = self.inner.len(), "island.op.spawn");
		let limit = Arc::clone(&self.limit);
		let handle = self.inner.spawn(async move {
			// The semaphore is never closed.
			let _permit = limit.acquire_owned().await.ok();
			fut.await
		});
		self.indices.insert(handle.id(), index);
	}

	/// Waits for the next completed task and returns its spawn index.
	pub async fn join_next(&mut self) -> Option<(usize, Result<T, JoinError>)> {
		loop {
			let (id, result) = match self.inner.join_next_with_id().await? {
				Ok((id, value)) => (id, Ok(value)),
				Err(err) => (err.id(), Err(err)),
			};
			if let Some(index) = self.indices.remove(&id) {
				return Some((index, result));
			}
		}
	}
}
