//! Declarative description of the resources one test needs.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::spec::{ComponentKind, ComponentSpec, DataAccessKey, ErasedSpec, TenantSpec};

/// Named components, tenants bound to components, and data-access keys bound to tenants.
///
/// Templates are configured inside [`IslandBuilder::add_template`](crate::IslandBuilder::add_template)
/// and checked when the island is built. Maps keep declaration order.
#[derive(Clone, Default)]
pub struct Template {
	pub(crate) components: IndexMap<String, ComponentEntry>,
	pub(crate) tenants: IndexMap<String, TenantEntry>,
	pub(crate) data_access: IndexMap<DataAccessKey, String>,
	pub(crate) duplicates: Vec<Duplicate>,
}

#[derive(Clone, Debug)]
pub(crate) struct ComponentEntry {
	pub(crate) kind: ComponentKind,
	pub(crate) spec: ErasedSpec,
}

#[derive(Clone, Debug)]
pub(crate) struct TenantEntry {
	pub(crate) component: String,
	pub(crate) spec: ErasedSpec,
}

/// A name declared twice in one template. The first declaration is kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Duplicate {
	Component(String),
	Tenant(String),
	DataAccess(DataAccessKey),
}

impl Template {
	/// Creates an empty template.
	pub fn new() -> Self {
		Self::default()
	}

	/// Declares a component the template needs, described by `spec`.
	pub fn add_component<S: ComponentSpec>(&mut self, name: impl Into<String>, spec: S) -> &mut Self {
		self.add_shared_component(name, Arc::new(spec))
	}

	/// Declares a component with a spec the caller keeps a handle to.
	///
	/// The pool receives this exact allocation.
	pub fn add_shared_component<S: ComponentSpec>(&mut self, name: impl Into<String>, spec: Arc<S>) -> &mut Self {
		match self.components.entry(name.into()) {
			Entry::Occupied(entry) => self.duplicates.push(Duplicate::Component(entry.key().clone())),
			Entry::Vacant(entry) => {
				entry.insert(ComponentEntry {
					kind: ComponentKind::of::<S::Component>(),
					spec: ErasedSpec::new(spec),
				});
			}
		}
		self
	}

	/// Declares a tenant created on component `component` from `spec`.
	pub fn add_tenant<S: TenantSpec>(&mut self, name: impl Into<String>, component: impl Into<String>, spec: S) -> &mut Self {
		self.add_shared_tenant(name, component, Arc::new(spec))
	}

	/// Declares a tenant with a spec the caller keeps a handle to.
	///
	/// The factory receives this exact allocation.
	pub fn add_shared_tenant<S: TenantSpec>(&mut self, name: impl Into<String>, component: impl Into<String>, spec: Arc<S>) -> &mut Self {
		match self.tenants.entry(name.into()) {
			Entry::Occupied(entry) => self.duplicates.push(Duplicate::Tenant(entry.key().clone())),
			Entry::Vacant(entry) => {
				entry.insert(TenantEntry {
					component: component.into(),
					spec: ErasedSpec::new(spec),
				});
			}
		}
		self
	}

	/// Binds data-access type `D` to tenant `tenant`.
	pub fn add_data_access<D: ?Sized + 'static>(&mut self, tenant: impl Into<String>) -> &mut Self {
		self.add_data_access_key(DataAccessKey::of::<D>(), tenant)
	}

	/// Binds `key` to tenant `tenant`.
	pub fn add_data_access_key(&mut self, key: DataAccessKey, tenant: impl Into<String>) -> &mut Self {
		match self.data_access.entry(key) {
			Entry::Occupied(_) => self.duplicates.push(Duplicate::DataAccess(key)),
			Entry::Vacant(entry) => {
				entry.insert(tenant.into());
			}
		}
		self
	}

	/// Component names in declaration order.
	pub fn component_names(&self) -> impl Iterator<Item = &str> {
		self.components.keys().map(String::as_str)
	}

	/// Resource kind of component `name`.
	pub fn component_kind(&self, name: &str) -> Option<ComponentKind> {
		self.components.get(name).map(|entry| entry.kind)
	}

	/// Tenant names in declaration order.
	pub fn tenant_names(&self) -> impl Iterator<Item = &str> {
		self.tenants.keys().map(String::as_str)
	}

	/// Component tenant `name` is bound to.
	pub fn tenant_component(&self, name: &str) -> Option<&str> {
		self.tenants.get(name).map(|entry| entry.component.as_str())
	}

	/// Data-access bindings in declaration order.
	pub fn data_access(&self) -> impl Iterator<Item = (DataAccessKey, &str)> {
		self.data_access.iter().map(|(key, tenant)| (*key, tenant.as_str()))
	}
}

impl fmt::Debug for Template {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Template")
			.field("components", &self.components)
			.field("tenants", &self.tenants)
			.field("data_access", &self.data_access)
			.finish()
	}
}
