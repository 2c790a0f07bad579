use std::marker::PhantomData;
use std::sync::Arc;

use isle_core::{DataAccessKey, DependencyPatcher, Erased, Lifetime, PatchError, ResolveError, ServiceProvider, ServiceRegistry};

use crate::context::TenantLookup;

type Build<D, T> = dyn Fn(&ServiceProvider, &T) -> Result<D, ResolveError> + Send + Sync;

/// Patcher that builds data-access type `D` from the running test's tenant of type `T`.
///
/// Every registration of `D` is replaced. Scoped and transient registrations keep their
/// lifetime; singletons become scoped, since a cached instance would hand the first
/// test's tenant to every later test. The replacement reads the
/// [`TenantLookup`] scope value of the resolving provider, so `D` must be resolved from a
/// scope that carries one.
pub struct LambdaPatcher<D, T> {
	build: Arc<Build<D, T>>,
	_marker: PhantomData<fn() -> (D, T)>,
}

impl<D, T> LambdaPatcher<D, T>
where
	D: Send + Sync + 'static,
	T: Send + Sync + 'static,
{
	pub fn new<F>(build: F) -> Self
	where
		F: Fn(&ServiceProvider, &T) -> Result<D, ResolveError> + Send + Sync + 'static,
	{
		Self {
			build: Arc::new(build),
			_marker: PhantomData,
		}
	}
}

impl<D, T> DependencyPatcher for LambdaPatcher<D, T>
where
	D: Send + Sync + 'static,
	T: Send + Sync + 'static,
{
	fn register(&self, key: DataAccessKey, services: &mut ServiceRegistry) -> Result<(), PatchError> {
		if key != DataAccessKey::of::<D>() {
			return Err(PatchError::Rejected {
				key,
				reason: format!("patcher builds {}", DataAccessKey::of::<D>()),
			});
		}
		let build = Arc::clone(&self.build);
		let replaced = services.replace_factory(
			key,
			Arc::new(move |provider: &ServiceProvider| {
				let lookup = provider.scope_value::<TenantLookup>()?;
				let tenant = lookup.tenant(key).map_err(|err| ResolveError::Construction { key, reason: err.to_string() })?;
				let instance = tenant.instance::<T>().ok_or_else(|| ResolveError::Construction {
					key,
					reason: format!("tenant '{}' is not a {}", tenant.tenant_name(), std::any::type_name::<T>()),
				})?;
				build(provider, &instance).map(|service| Arc::new(service) as Erased)
			}),
		);
		if replaced == 0 {
			return Err(PatchError::NotRegistered { key });
		}
		let rescoped = services.change_lifetime(key, Lifetime::Singleton, Lifetime::Scoped);
		tracing::debug!(%key, registrations = replaced, rescoped, "context.patcher.replaced");
		Ok(())
	}
}
