use std::sync::Arc;

use indexmap::IndexMap;
use indexmap::map::Entry;
use rustc_hash::FxHashMap;
use tokio::sync::Semaphore;

use crate::config::IslandConfig;
use crate::dispatch::KindRegistration;
use crate::error::ConfigError;
use crate::island::Island;
use crate::materializer::{AfterMaterialize, Materializer};
use crate::patcher::DependencyPatcher;
use crate::pool::{ComponentPool, TenantFactory};
use crate::spec::{ComponentKind, ComponentSpec, DataAccessKey};
use crate::template::Template;
use crate::validate::{Registered, validate};

/// Collects pools, factories, templates and patchers into an [`Island`].
///
/// Registrations fail fast on duplicates. Template contents are only checked by
/// [`IslandBuilder::build`], which reports every problem of the first failing stage.
#[derive(Default)]
pub struct IslandBuilder {
	kinds: FxHashMap<ComponentKind, KindRegistration>,
	templates: IndexMap<String, Template>,
	patchers: IndexMap<DataAccessKey, Arc<dyn DependencyPatcher>>,
	hooks: Vec<Arc<dyn AfterMaterialize>>,
	config: IslandConfig,
}

impl IslandBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers the pool and tenant factory for the component kind of `P::Spec`.
	pub fn add_component_pool<P, F>(&mut self, pool: P, factory: F) -> Result<&mut Self, ConfigError>
	where
		P: ComponentPool,
		F: TenantFactory<Component = <P::Spec as ComponentSpec>::Component>,
	{
		let registration = KindRegistration::new(pool, factory);
		let kind = registration.kind;
		if self.kinds.contains_key(&kind) {
			return Err(ConfigError::DuplicatePool { kind });
		}
		tracing::debug!(%kind, spec = %registration.component_spec, tenant_spec = %registration.tenant_spec, "island.pool.registered");
		self.kinds.insert(kind, registration);
		Ok(self)
	}

	/// Registers template `name`, declared by `configure`.
	pub fn add_template(&mut self, name: impl Into<String>, configure: impl FnOnce(&mut Template)) -> Result<&mut Self, ConfigError> {
		match self.templates.entry(name.into()) {
			Entry::Occupied(entry) => Err(ConfigError::DuplicateTemplate { name: entry.key().clone() }),
			Entry::Vacant(entry) => {
				let mut template = Template::new();
				configure(&mut template);
				entry.insert(template);
				Ok(self)
			}
		}
	}

	/// Registers the patcher for data-access type `D`.
	pub fn add_patcher<D: ?Sized + 'static>(&mut self, patcher: impl DependencyPatcher) -> Result<&mut Self, ConfigError> {
		self.add_shared_patcher(DataAccessKey::of::<D>(), Arc::new(patcher))
	}

	pub fn add_shared_patcher(&mut self, key: DataAccessKey, patcher: Arc<dyn DependencyPatcher>) -> Result<&mut Self, ConfigError> {
		match self.patchers.entry(key) {
			Entry::Occupied(_) => Err(ConfigError::DuplicatePatcher { key }),
			Entry::Vacant(entry) => {
				entry.insert(patcher);
				Ok(self)
			}
		}
	}

	/// Adds a hook run after every successful tenant creation of a template.
	pub fn add_after_materialize_hook(&mut self, hook: impl AfterMaterialize) -> &mut Self {
		self.hooks.push(Arc::new(hook));
		self
	}

	pub fn with_config(&mut self, config: IslandConfig) -> &mut Self {
		self.config = config;
		self
	}

	/// Validates every template and freezes a copy of the configuration.
	///
	/// The builder stays usable; each call produces an independent island sharing the
	/// registered pools and factories. Shared pools are initialized and disposed at most
	/// once, whichever island asks first.
	pub fn build(&self) -> Result<Island, ConfigError> {
		let patched = |key: DataAccessKey| self.patchers.contains_key(&key);
		validate(
			self.templates.iter().map(|(name, template)| (name.as_str(), template)),
			&Registered {
				kinds: &self.kinds,
				patched: &patched,
			},
		)?;

		let templates = self.templates.iter().map(|(name, template)| (name.clone(), Arc::new(template.clone()))).collect();
		let materializer = Materializer {
			templates: Arc::new(templates),
			kinds: Arc::new(self.kinds.clone()),
			hooks: self.hooks.iter().cloned().collect(),
			limit: Arc::new(Semaphore::new(self.config.parallel_ops().min(Semaphore::MAX_PERMITS))),
			acquire_timeout: self.config.acquire_timeout(),
		};
		tracing::info!(
			templates = self.templates.len(),
			kinds = self.kinds.len(),
			patchers = self.patchers.len(),
			"island.built"
		);
		Ok(Island::new(materializer, self.patchers.clone(), self.config.clone()))
	}
}
