//! Type-erased dispatch to typed pools and factories.
//!
//! # Role
//!
//! The materializer handles every resource kind through one code path. Each kind is
//! registered once as a [`KindRegistration`], which captures the concrete component,
//! spec and tenant types in adapter objects. At dispatch time the materializer only
//! looks the registration up by [`ComponentKind`] and calls through the erased traits.
//!
//! # Invariants
//!
//! - Types are resolved when the pool and factory are registered, never per call.
//! - A failed downcast is reported as a `Dispatch` error. Build-time validation makes
//!   it unreachable for templates accepted by the builder.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;

use crate::error::{AcquireError, PoolError, TenantError};
use crate::pool::{ComponentPool, ComponentRequest, TenantFactory};
use crate::spec::{ComponentKind, ComponentSpec, Erased, ErasedSpec, TenantSpec, TypeTag};

/// Object-safe view of a [`ComponentPool`].
#[async_trait]
pub(crate) trait ErasedPool: Send + Sync {
	async fn initialize(&self, cancel: &CancellationToken) -> Result<(), PoolError>;

	async fn acquire(&self, requests: &[(String, ErasedSpec)], cancel: &CancellationToken) -> Result<FxHashMap<String, Erased>, AcquireError>;

	async fn dispose(&self) -> Result<(), PoolError>;
}

/// Object-safe view of a [`TenantFactory`].
#[async_trait]
pub(crate) trait ErasedFactory: Send + Sync {
	async fn add_tenant(&self, component: &Erased, spec: &ErasedSpec) -> Result<Erased, TenantError>;

	async fn remove_tenant(&self, component: &Erased, tenant: &Erased) -> Result<bool, TenantError>;
}

struct PoolAdapter<P>(P);

#[async_trait]
impl<P: ComponentPool> ErasedPool for PoolAdapter<P> {
	async fn initialize(&self, cancel: &CancellationToken) -> Result<(), PoolError> {
		self.0.initialize(cancel).await
	}

	async fn acquire(&self, requests: &[(String, ErasedSpec)], cancel: &CancellationToken) -> Result<FxHashMap<String, Erased>, AcquireError> {
		let typed = requests
			.iter()
			.map(|(name, spec)| {
				spec.downcast::<P::Spec>()
					.map(|spec| ComponentRequest { name: name.clone(), spec })
					.ok_or_else(|| AcquireError::Dispatch(mismatch("component spec", name, TypeTag::of::<P::Spec>(), spec.tag())))
			})
			.collect::<Result<Vec<_>, _>>()?;

		let acquired = self.0.acquire_components(&typed, cancel).await?;
		Ok(acquired.into_iter().map(|(name, component)| (name, component as Erased)).collect())
	}

	async fn dispose(&self) -> Result<(), PoolError> {
		self.0.dispose().await
	}
}

struct FactoryAdapter<F>(F);

#[async_trait]
impl<F: TenantFactory> ErasedFactory for FactoryAdapter<F> {
	async fn add_tenant(&self, component: &Erased, spec: &ErasedSpec) -> Result<Erased, TenantError> {
		let component = component
			.downcast_ref::<F::Component>()
			.ok_or_else(|| TenantError::Dispatch(format!("component is not a {}", TypeTag::of::<F::Component>())))?;
		let spec = spec
			.downcast::<F::Spec>()
			.ok_or_else(|| TenantError::Dispatch(mismatch("tenant spec", "", TypeTag::of::<F::Spec>(), spec.tag())))?;

		let tenant = self.0.add_tenant(component, &spec).await?;
		Ok(Arc::new(tenant) as Erased)
	}

	async fn remove_tenant(&self, component: &Erased, tenant: &Erased) -> Result<bool, TenantError> {
		let component = component
			.downcast_ref::<F::Component>()
			.ok_or_else(|| TenantError::Dispatch(format!("component is not a {}", TypeTag::of::<F::Component>())))?;
		let tenant = tenant
			.downcast_ref::<<F::Spec as TenantSpec>::Tenant>()
			.ok_or_else(|| TenantError::Dispatch(format!("tenant is not a {}", TypeTag::of::<<F::Spec as TenantSpec>::Tenant>())))?;

		self.0.remove_tenant(component, tenant).await
	}
}

fn mismatch(what: &str, name: &str, expected: TypeTag, actual: TypeTag) -> String {
	if name.is_empty() {
		format!("{what} is {actual}, expected {expected}")
	} else {
		format!("{what} '{name}' is {actual}, expected {expected}")
	}
}

/// Lifecycle of one registered pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PoolState {
	Idle,
	Initialized,
	Disposed,
}

/// Pool and factory for one resource kind, with the types they accept.
///
/// Clones share the pool, the factory and the pool's lifecycle state, so every island
/// built from one builder initializes and disposes each pool at most once.
#[derive(Clone)]
pub(crate) struct KindRegistration {
	pub(crate) kind: ComponentKind,
	pub(crate) component_spec: TypeTag,
	pub(crate) tenant_spec: TypeTag,
	pub(crate) pool: Arc<dyn ErasedPool>,
	pub(crate) factory: Arc<dyn ErasedFactory>,
	state: Arc<Mutex<PoolState>>,
}

impl KindRegistration {
	pub(crate) fn new<P, F>(pool: P, factory: F) -> Self
	where
		P: ComponentPool,
		F: TenantFactory<Component = <P::Spec as ComponentSpec>::Component>,
	{
		Self {
			kind: ComponentKind::of::<<P::Spec as ComponentSpec>::Component>(),
			component_spec: TypeTag::of::<P::Spec>(),
			tenant_spec: TypeTag::of::<F::Spec>(),
			pool: Arc::new(PoolAdapter(pool)),
			factory: Arc::new(FactoryAdapter(factory)),
			state: Arc::new(Mutex::new(PoolState::Idle)),
		}
	}

	/// Moves the pool from `from` to `to`. False when it is not in `from`.
	pub(crate) fn advance(&self, from: PoolState, to: PoolState) -> bool {
		let mut state = self.state.lock();
		if *state != from {
			return false;
		}
		*state = to;
		true
	}
}
