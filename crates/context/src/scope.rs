use isle_core::{CancellationToken, DematerializeError, DematerializeReport, Island, MaterializeError, Tenant};

use crate::context::{ContextError, TenantLookup, TestContext, TestId};

/// Template applied when a test does not name one.
pub const DEFAULT_TEMPLATE: &str = "DefaultTemplate";

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
	#[error("failed to materialize template for test '{test}': {source}")]
	Materialize {
		test: TestId,
		#[source]
		source: MaterializeError,
		/// Removal failures of the partially created tenants, if any.
		cleanup: Option<DematerializeError>,
	},
	#[error(transparent)]
	Context(#[from] ContextError),
	#[error("failed to remove tenants of test '{test}': {source}")]
	Dematerialize {
		test: TestId,
		#[source]
		source: DematerializeError,
	},
}

/// Tenants of one template applied to one running test.
///
/// Created by [`TemplateScope::apply`] before the test body runs and closed by
/// [`TemplateScope::finish`] after it. A scope dropped without `finish` inside a tokio
/// runtime leaves the context and removes its tenants on a spawned task. Dropped outside
/// a runtime, it stays active in the context so the host can still
/// [`deactivate`](TestContext::deactivate) the test and dematerialize its tenants.
#[must_use = "call `finish` to remove the tenants"]
pub struct TemplateScope {
	island: Island,
	context: TestContext,
	test: TestId,
	finished: bool,
}

impl TemplateScope {
	/// Materializes `template` and stores its tenants in `context` under `test`.
	///
	/// Whatever was created before a failure is removed again before returning.
	pub async fn apply(island: &Island, context: &TestContext, test: TestId, template: &str) -> Result<Self, ScopeError> {
		Self::apply_with(island, context, test, template, &CancellationToken::new()).await
	}

	pub async fn apply_with(island: &Island, context: &TestContext, test: TestId, template: &str, cancel: &CancellationToken) -> Result<Self, ScopeError> {
		if context.is_active(&test) {
			return Err(ContextError::AlreadyActive { test }.into());
		}

		let tenants = match island.materializer().materialize_tenants_with(template, cancel).await {
			Ok(tenants) => tenants,
			Err(source) => {
				let created = source.created().to_vec();
				tracing::warn!(%test, template, created = created.len(), error = %source, "context.scope.materialize_failed");
				let cleanup = remove(island, created).await.err();
				return Err(ScopeError::Materialize { test, source, cleanup });
			}
		};

		if let Err((err, tenants)) = context.activate(test.clone(), tenants) {
			if let Err(cleanup) = remove(island, tenants).await {
				tracing::warn!(%test, error = %cleanup, "context.scope.cleanup_failed");
			}
			return Err(err.into());
		}

		tracing::debug!(%test, template, "context.scope.applied");
		Ok(Self {
			island: island.clone(),
			context: context.clone(),
			test,
			finished: false,
		})
	}

	pub fn test(&self) -> &TestId {
		&self.test
	}

	/// Tenant lookup for this test, to attach to the consumer's service provider.
	pub fn lookup(&self) -> TenantLookup {
		self.context.lookup(self.test.clone())
	}

	/// Removes the tenants from the context and dematerializes them.
	pub async fn finish(mut self) -> Result<DematerializeReport, ScopeError> {
		self.finished = true;
		let tenants = self.context.deactivate(&self.test)?;
		match self.island.materializer().dematerialize_tenants(tenants).await {
			Ok(report) => {
				tracing::debug!(test = %self.test, removed = report.removed, already_gone = report.already_gone, "context.scope.finished");
				Ok(report)
			}
			Err(source) => Err(ScopeError::Dematerialize {
				test: self.test.clone(),
				source,
			}),
		}
	}
}

async fn remove(island: &Island, tenants: Vec<Tenant>) -> Result<DematerializeReport, DematerializeError> {
	if tenants.is_empty() {
		return Ok(DematerializeReport::default());
	}
	island.materializer().dematerialize_tenants(tenants).await
}

impl Drop for TemplateScope {
	fn drop(&mut self) {
		if self.finished {
			return;
		}
		let Ok(runtime) = tokio::runtime::Handle::try_current() else {
			tracing::warn!(test = %self.test, "context.scope.leaked");
			return;
		};
		let Ok(tenants) = self.context.deactivate(&self.test) else {
			return;
		};
		tracing::warn!(test = %self.test, tenants = tenants.len(), "context.scope.dropped");
		let island = self.island.clone();
		let test = self.test.clone();
		runtime.spawn(async move {
			match island.materializer().dematerialize_tenants(tenants).await {
				Ok(report) => tracing::debug!(%test, removed = report.removed, already_gone = report.already_gone, "context.scope.reclaimed"),
				Err(err) => tracing::warn!(%test, error = %err, "context.scope.reclaim_failed"),
			}
		});
	}
}

impl std::fmt::Debug for TemplateScope {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TemplateScope").field("test", &self.test).field("finished", &self.finished).finish_non_exhaustive()
	}
}
