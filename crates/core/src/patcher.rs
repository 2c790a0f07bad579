use crate::services::{PatchError, ServiceRegistry};
use crate::spec::DataAccessKey;

/// Rewrites a consumer's registrations of one data-access type so that resolution goes
/// through the running test's tenant.
///
/// Registered with [`IslandBuilder::add_patcher`](crate::IslandBuilder::add_patcher) and
/// applied by [`Island::patch_services`](crate::Island::patch_services), once per key.
pub trait DependencyPatcher: Send + Sync + 'static {
	fn register(&self, key: DataAccessKey, services: &mut ServiceRegistry) -> Result<(), PatchError>;
}

impl<F> DependencyPatcher for F
where
	F: Fn(DataAccessKey, &mut ServiceRegistry) -> Result<(), PatchError> + Send + Sync + 'static,
{
	fn register(&self, key: DataAccessKey, services: &mut ServiceRegistry) -> Result<(), PatchError> {
		self(key, services)
	}
}
