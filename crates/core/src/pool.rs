//! Component pools and tenant factories.
//!
//! Both traits are typed over one resource kind. The [`IslandBuilder`](crate::IslandBuilder)
//! erases them at registration time; drivers never see erased values.

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;

use crate::error::{AcquireError, PoolError, TenantError};
use crate::spec::{ComponentSpec, TenantSpec};

/// One named request in a batch sent to a pool.
#[derive(Debug)]
pub struct ComponentRequest<S> {
	/// Component name from the template.
	pub name: String,
	/// The spec exactly as the template registered it.
	pub spec: Arc<S>,
}

impl<S> Clone for ComponentRequest<S> {
	fn clone(&self) -> Self {
		Self {
			name: self.name.clone(),
			spec: Arc::clone(&self.spec),
		}
	}
}

/// Components assigned by a pool, keyed by requested name.
pub type AcquiredComponents<C> = FxHashMap<String, Arc<C>>;

/// Source of components of one kind.
///
/// A pool is shared by every test in the process and must be safe under concurrent
/// calls.
#[async_trait]
pub trait ComponentPool: Send + Sync + 'static {
	/// Spec type this pool matches against.
	type Spec: ComponentSpec;

	/// Prepares backing infrastructure. Called once before any acquisition.
	async fn initialize(&self, _cancel: &CancellationToken) -> Result<(), PoolError> {
		Ok(())
	}

	/// Assigns one distinct component to every request.
	///
	/// All-or-nothing: if any request cannot be matched, fails with
	/// [`AcquireError::Unsatisfiable`] listing the unmet names. The same component must
	/// never be returned for two names in one call.
	async fn acquire_components(
		&self,
		requests: &[ComponentRequest<Self::Spec>],
		cancel: &CancellationToken,
	) -> Result<AcquiredComponents<<Self::Spec as ComponentSpec>::Component>, AcquireError>;

	/// Releases backing infrastructure. Called once after all tests.
	async fn dispose(&self) -> Result<(), PoolError> {
		Ok(())
	}
}

/// Creates and removes tenants on components of one kind.
#[async_trait]
pub trait TenantFactory: Send + Sync + 'static {
	/// Component type tenants are created on.
	type Component: Send + Sync + 'static;
	/// Spec type describing the tenants.
	type Spec: TenantSpec;

	/// Creates a tenant that does not collide with any other tenant on `component`.
	///
	/// Data sources and options declared by `spec` are applied before returning.
	async fn add_tenant(&self, component: &Self::Component, spec: &Self::Spec) -> Result<<Self::Spec as TenantSpec>::Tenant, TenantError>;

	/// Removes a tenant. Returns `Ok(false)` when the tenant no longer exists.
	async fn remove_tenant(&self, component: &Self::Component, tenant: &<Self::Spec as TenantSpec>::Tenant) -> Result<bool, TenantError>;
}
