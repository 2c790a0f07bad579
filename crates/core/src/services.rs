//! Minimal consumer service registry.
//!
//! Services are keyed by their type's [`DataAccessKey`]. A [`ServiceRegistry`] collects
//! descriptors and is consumed by [`ServiceRegistry::build_provider`]; a
//! [`ServiceProvider`] resolves them and carries per-scope values such as the running
//! test's tenant lookup.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::spec::{DataAccessKey, Erased, TypeTag};

/// How long a resolved service lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
	/// One instance per root provider, shared by every scope.
	Singleton,
	/// One instance per scope.
	Scoped,
	/// A new instance per resolution.
	Transient,
}

/// Erased service constructor.
pub type ServiceFactory = Arc<dyn Fn(&ServiceProvider) -> Result<Erased, ResolveError> + Send + Sync>;

/// Failure to resolve a service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
	#[error("no service registered for {key}")]
	NotRegistered { key: DataAccessKey },
	#[error("service registered for {key} produced a different type")]
	TypeMismatch { key: DataAccessKey },
	#[error("scope value {value} is not available in this scope")]
	MissingScopeValue { value: TypeTag },
	#[error("failed to construct {key}: {reason}")]
	Construction { key: DataAccessKey, reason: String },
}

/// Failure of a [`DependencyPatcher`](crate::DependencyPatcher).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
	#[error("data access {key} is not registered in the service collection; register it before patching")]
	NotRegistered { key: DataAccessKey },
	#[error("patching {key} failed: {reason}")]
	Rejected { key: DataAccessKey, reason: String },
}

/// One registration.
#[derive(Clone)]
pub struct ServiceDescriptor {
	key: DataAccessKey,
	lifetime: Lifetime,
	factory: ServiceFactory,
}

impl ServiceDescriptor {
	pub fn key(&self) -> DataAccessKey {
		self.key
	}

	pub fn lifetime(&self) -> Lifetime {
		self.lifetime
	}
}

impl fmt::Debug for ServiceDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServiceDescriptor")
			.field("key", &self.key)
			.field("lifetime", &self.lifetime)
			.finish_non_exhaustive()
	}
}

/// Ordered service registrations. Later registrations of a key win at resolution.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
	descriptors: Vec<ServiceDescriptor>,
}

impl ServiceRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `T` built by `factory`.
	pub fn add<T, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
	where
		T: Send + Sync + 'static,
		F: Fn(&ServiceProvider) -> Result<T, ResolveError> + Send + Sync + 'static,
	{
		let factory: ServiceFactory = Arc::new(move |provider: &ServiceProvider| factory(provider).map(|service| Arc::new(service) as Erased));
		self.add_erased(DataAccessKey::of::<T>(), lifetime, factory)
	}

	pub fn add_singleton<T, F>(&mut self, factory: F) -> &mut Self
	where
		T: Send + Sync + 'static,
		F: Fn(&ServiceProvider) -> Result<T, ResolveError> + Send + Sync + 'static,
	{
		self.add(Lifetime::Singleton, factory)
	}

	pub fn add_scoped<T, F>(&mut self, factory: F) -> &mut Self
	where
		T: Send + Sync + 'static,
		F: Fn(&ServiceProvider) -> Result<T, ResolveError> + Send + Sync + 'static,
	{
		self.add(Lifetime::Scoped, factory)
	}

	pub fn add_transient<T, F>(&mut self, factory: F) -> &mut Self
	where
		T: Send + Sync + 'static,
		F: Fn(&ServiceProvider) -> Result<T, ResolveError> + Send + Sync + 'static,
	{
		self.add(Lifetime::Transient, factory)
	}

	/// Registers an erased factory. The factory must produce a value of the key's type.
	pub fn add_erased(&mut self, key: DataAccessKey, lifetime: Lifetime, factory: ServiceFactory) -> &mut Self {
		self.descriptors.push(ServiceDescriptor { key, lifetime, factory });
		self
	}

	pub fn contains(&self, key: DataAccessKey) -> bool {
		self.descriptors.iter().any(|d| d.key == key)
	}

	/// Registrations of `key` in registration order.
	pub fn descriptors(&self, key: DataAccessKey) -> impl Iterator<Item = &ServiceDescriptor> {
		self.descriptors.iter().filter(move |d| d.key == key)
	}

	/// Swaps the factory of every registration of `key`, keeping each lifetime.
	///
	/// Returns the number of registrations replaced.
	pub fn replace_factory(&mut self, key: DataAccessKey, factory: ServiceFactory) -> usize {
		let mut replaced = 0;
		for descriptor in self.descriptors.iter_mut().filter(|d| d.key == key) {
			descriptor.factory = Arc::clone(&factory);
			replaced += 1;
		}
		replaced
	}

	/// Changes every registration of `key` with lifetime `from` to `to`.
	///
	/// Returns the number of registrations changed.
	pub fn change_lifetime(&mut self, key: DataAccessKey, from: Lifetime, to: Lifetime) -> usize {
		let mut changed = 0;
		for descriptor in self.descriptors.iter_mut().filter(|d| d.key == key && d.lifetime == from) {
			descriptor.lifetime = to;
			changed += 1;
		}
		changed
	}

	pub fn len(&self) -> usize {
		self.descriptors.len()
	}

	pub fn is_empty(&self) -> bool {
		self.descriptors.is_empty()
	}

	/// Freezes the registrations into a root provider.
	pub fn build_provider(self) -> ServiceProvider {
		let mut table = FxHashMap::default();
		for descriptor in self.descriptors {
			table.insert(descriptor.key, descriptor);
		}
		ServiceProvider {
			table: Arc::new(table),
			singletons: Arc::new(Mutex::new(FxHashMap::default())),
			scoped: Mutex::new(FxHashMap::default()),
			values: FxHashMap::default(),
		}
	}
}

/// Resolves services. Each provider is one scope.
pub struct ServiceProvider {
	table: Arc<FxHashMap<DataAccessKey, ServiceDescriptor>>,
	singletons: Arc<Mutex<FxHashMap<DataAccessKey, Erased>>>,
	scoped: Mutex<FxHashMap<DataAccessKey, Erased>>,
	values: FxHashMap<TypeTag, Erased>,
}

impl ServiceProvider {
	/// Opens a child scope sharing singletons, with no scoped instances or values.
	pub fn create_scope(&self) -> Self {
		Self {
			table: Arc::clone(&self.table),
			singletons: Arc::clone(&self.singletons),
			scoped: Mutex::new(FxHashMap::default()),
			values: FxHashMap::default(),
		}
	}

	/// Attaches a value factories of this scope can read.
	pub fn with_scope_value<V: Send + Sync + 'static>(mut self, value: V) -> Self {
		self.values.insert(TypeTag::of::<V>(), Arc::new(value));
		self
	}

	/// Value attached to this scope.
	pub fn scope_value<V: Send + Sync + 'static>(&self) -> Result<Arc<V>, ResolveError> {
		self.values
			.get(&TypeTag::of::<V>())
			.and_then(|value| Arc::clone(value).downcast::<V>().ok())
			.ok_or(ResolveError::MissingScopeValue { value: TypeTag::of::<V>() })
	}

	/// Resolves `T`.
	pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveError> {
		let key = DataAccessKey::of::<T>();
		self.get_erased(key)?.downcast::<T>().map_err(|_| ResolveError::TypeMismatch { key })
	}

	pub fn get_erased(&self, key: DataAccessKey) -> Result<Erased, ResolveError> {
		let descriptor = self.table.get(&key).ok_or(ResolveError::NotRegistered { key })?;
		let cache = match descriptor.lifetime {
			Lifetime::Transient => return (descriptor.factory)(self),
			Lifetime::Singleton => &*self.singletons,
			Lifetime::Scoped => &self.scoped,
		};

		if let Some(service) = cache.lock().get(&key) {
			return Ok(Arc::clone(service));
		}
		// Factories may resolve other services; the cache lock is not held while they run.
		let service = (descriptor.factory)(self)?;
		Ok(Arc::clone(cache.lock().entry(key).or_insert(service)))
	}
}

impl fmt::Debug for ServiceProvider {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServiceProvider")
			.field("services", &self.table.len())
			.field("values", &self.values.keys().collect::<Vec<_>>())
			.finish_non_exhaustive()
	}
}
