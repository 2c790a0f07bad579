use std::fmt;
use std::sync::Arc;

use crate::spec::{ComponentKind, DataAccessKey, Erased};

/// A live tenant produced by the [`Materializer`](crate::Materializer).
///
/// Cloning is cheap and shares the underlying tenant and component. The materializer
/// owns the lifecycle; holders such as a test context keep a clone only while the test
/// runs.
#[derive(Clone)]
pub struct Tenant {
	pub(crate) instance: Erased,
	pub(crate) name: Arc<str>,
	pub(crate) template: Arc<str>,
	pub(crate) component_name: Arc<str>,
	pub(crate) component: Erased,
	pub(crate) kind: ComponentKind,
	pub(crate) data_access: Arc<[DataAccessKey]>,
}

impl Tenant {
	/// Tenant name from the template.
	pub fn tenant_name(&self) -> &str {
		&self.name
	}

	/// Template the tenant was materialized from.
	pub fn template_name(&self) -> &str {
		&self.template
	}

	/// Name of the component the tenant lives on.
	pub fn component_name(&self) -> &str {
		&self.component_name
	}

	/// Resource kind of the owning component.
	pub fn kind(&self) -> ComponentKind {
		self.kind
	}

	/// Data-access keys bound to this tenant, sorted by type name.
	pub fn data_access(&self) -> &[DataAccessKey] {
		&self.data_access
	}

	/// True when `key` resolves to this tenant.
	pub fn serves(&self, key: DataAccessKey) -> bool {
		self.data_access.contains(&key)
	}

	/// Typed tenant value, or `None` if `T` is not the tenant type.
	pub fn instance<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
		Arc::clone(&self.instance).downcast::<T>().ok()
	}

	/// Typed component value, or `None` if `C` is not the component type.
	pub fn component<C: Send + Sync + 'static>(&self) -> Option<Arc<C>> {
		Arc::clone(&self.component).downcast::<C>().ok()
	}

	/// Erased tenant value.
	pub fn erased_instance(&self) -> &Erased {
		&self.instance
	}

	/// Erased component value.
	pub fn erased_component(&self) -> &Erased {
		&self.component
	}

	/// True when both handles refer to the same tenant value.
	pub fn same_instance(&self, other: &Tenant) -> bool {
		Arc::ptr_eq(&self.instance, &other.instance)
	}
}

impl fmt::Debug for Tenant {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Tenant")
			.field("name", &self.name)
			.field("template", &self.template)
			.field("component", &self.component_name)
			.field("kind", &self.kind)
			.field("data_access", &self.data_access)
			.finish_non_exhaustive()
	}
}
