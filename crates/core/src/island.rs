use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::IslandConfig;
use crate::dispatch::{ErasedPool, PoolState};
use crate::error::{LifecycleError, LifecyclePhase, PoolError};
use crate::materializer::Materializer;
use crate::patcher::DependencyPatcher;
use crate::services::{PatchError, ServiceRegistry};
use crate::spec::{ComponentKind, DataAccessKey};
use crate::tasks::OpSet;

/// Validated, immutable bundle of pools, factories, templates and patchers.
///
/// Cheap to clone and safe to share between tests.
#[derive(Clone)]
pub struct Island {
	inner: Arc<IslandInner>,
}

struct IslandInner {
	materializer: Materializer,
	patchers: IndexMap<DataAccessKey, Arc<dyn DependencyPatcher>>,
	config: IslandConfig,
	lifecycle: Mutex<Lifecycle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
	Idle,
	Initialized,
	Disposed,
}

impl Island {
	pub(crate) fn new(materializer: Materializer, patchers: IndexMap<DataAccessKey, Arc<dyn DependencyPatcher>>, config: IslandConfig) -> Self {
		Self {
			inner: Arc::new(IslandInner {
				materializer,
				patchers,
				config,
				lifecycle: Mutex::new(Lifecycle::Idle),
			}),
		}
	}

	pub fn materializer(&self) -> &Materializer {
		&self.inner.materializer
	}

	pub fn config(&self) -> &IslandConfig {
		&self.inner.config
	}

	/// Applies every registered patcher to `services`, once per data-access key, in
	/// registration order.
	pub fn patch_services(&self, services: &mut ServiceRegistry) -> Result<(), PatchError> {
		for (key, patcher) in &self.inner.patchers {
			patcher.register(*key, services)?;
			tracing::trace!(%key, "island.services.patched");
		}
		Ok(())
	}

	/// Initializes every pool in parallel.
	///
	/// Only the first call does any work. Pools already initialized through another
	/// island built by the same builder are skipped. A failed initialization still counts; call
	/// [`Island::dispose`] to release the pools that did start.
	pub async fn initialize(&self, cancel: &CancellationToken) -> Result<(), LifecycleError> {
		let mut state = self.inner.lifecycle.lock().await;
		if *state != Lifecycle::Idle {
			tracing::trace!(state = ?*state, "island.initialize.skipped");
			return Ok(());
		}
		*state = Lifecycle::Initialized;
		let cancel = cancel.clone();
		self.fan_out(LifecyclePhase::Initialize, move |pool| {
			let cancel = cancel.clone();
			async move { pool.initialize(&cancel).await }
		})
		.await
	}

	/// Disposes every pool in parallel.
	///
	/// No-op before [`Island::initialize`] and on every call after the first. Pools
	/// already disposed through another island built by the same builder are skipped.
	pub async fn dispose(&self) -> Result<(), LifecycleError> {
		let mut state = self.inner.lifecycle.lock().await;
		if *state != Lifecycle::Initialized {
			tracing::trace!(state = ?*state, "island.dispose.skipped");
			return Ok(());
		}
		*state = Lifecycle::Disposed;
		self.fan_out(LifecyclePhase::Dispose, |pool| async move { pool.dispose().await }).await
	}

	async fn fan_out<F, Fut>(&self, phase: LifecyclePhase, call: F) -> Result<(), LifecycleError>
	where
		F: Fn(Arc<dyn ErasedPool>) -> Fut,
		Fut: Future<Output = Result<(), PoolError>> + Send + 'static,
	{
		let (from, to) = match phase {
			LifecyclePhase::Initialize => (PoolState::Idle, PoolState::Initialized),
			LifecyclePhase::Dispose => (PoolState::Initialized, PoolState::Disposed),
		};
		let mut kinds: Vec<_> = self
			.inner
			.materializer
			.kinds
			.values()
			.filter(|registration| {
				let claimed = registration.advance(from, to);
				if !claimed {
					tracing::trace!(%phase, kind = %registration.kind, "island.lifecycle.pool_skipped");
				}
				claimed
			})
			.collect();
		kinds.sort_by_key(|registration| registration.kind);

		let timeout = self.inner.config.lifecycle_timeout();
		let mut set = OpSet::new(phase.as_str(), Arc::new(Semaphore::new(kinds.len().max(1))));
		for (index, registration) in kinds.iter().enumerate() {
			let fut = call(Arc::clone(&registration.pool));
			set.spawn(index, async move {
				match timeout {
					Some(limit) => tokio::time::timeout(limit, fut)
						.await
						.unwrap_or_else(|_| Err(PoolError(format!("timed out after {}s", limit.as_secs())))),
					None => fut.await,
				}
			});
		}

		let mut failures: Vec<(ComponentKind, PoolError)> = Vec::new();
		while let Some((index, joined)) = set.join_next().await {
			let Some(registration) = kinds.get(index) else {
				continue;
			};
			match joined {
				Ok(Ok(())) => {}
				Ok(Err(err)) => failures.push((registration.kind, err)),
				Err(err) => failures.push((registration.kind, PoolError(err.to_string()))),
			}
		}

		tracing::info!(%phase, pools = kinds.len(), failed = failures.len(), "island.lifecycle.done");
		if failures.is_empty() {
			Ok(())
		} else {
			for (kind, err) in &failures {
				tracing::warn!(%phase, %kind, error = %err, "island.lifecycle.pool_failed");
			}
			failures.sort_by_key(|(kind, _)| *kind);
			Err(LifecycleError { phase, failures })
		}
	}
}

impl std::fmt::Debug for Island {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Island")
			.field("templates", &self.inner.materializer.template_names())
			.field("patchers", &self.inner.patchers.keys().collect::<Vec<_>>())
			.field("config", &self.inner.config)
			.finish_non_exhaustive()
	}
}
