//! Resolution of templates into live tenants, and back.
//!
//! # Flow
//!
//! A materialization moves through `requested -> components acquired -> tenants created
//! -> active`. Components are grouped by [`ComponentKind`] and each kind's pool is asked
//! once for the whole group. Tenants are then created concurrently, bounded by the
//! island's [`IslandConfig::max_parallel_tenant_ops`](crate::IslandConfig::max_parallel_tenant_ops).
//!
//! # Invariants
//!
//! - A failed materialization never removes what it created. Errors raised after tenant
//!   creation started carry the created tenants; pass them to
//!   [`Materializer::dematerialize_tenants`].
//! - Dematerialization attempts every tenant, whatever fails.
//! - Returned tenants follow template declaration order.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::dispatch::KindRegistration;
use crate::error::{AcquireError, DematerializeError, DematerializeReport, HookError, MaterializeError, RemovalFailure, TenantError, TenantFailure};
use crate::spec::{ComponentKind, DataAccessKey, Erased, ErasedSpec, erased_addr};
use crate::tasks::OpSet;
use crate::template::Template;
use crate::tenant::Tenant;

/// Extension point run once all tenants of a template exist.
///
/// Hooks run in registration order. A failing hook fails the materialization; the
/// created tenants are returned in [`MaterializeError::Hook`].
#[async_trait]
pub trait AfterMaterialize: Send + Sync + 'static {
	async fn after_materialize(&self, template: &str, tenants: &[Tenant]) -> Result<(), HookError>;
}

/// Materializes and dematerializes tenants for an [`Island`](crate::Island).
///
/// Cheap to clone; clones share the island's templates, registrations and concurrency
/// limit.
#[derive(Clone)]
pub struct Materializer {
	pub(crate) templates: Arc<FxHashMap<String, Arc<Template>>>,
	pub(crate) kinds: Arc<FxHashMap<ComponentKind, KindRegistration>>,
	pub(crate) hooks: Arc<[Arc<dyn AfterMaterialize>]>,
	pub(crate) limit: Arc<Semaphore>,
	pub(crate) acquire_timeout: Option<Duration>,
}

/// Outcome of one creation task. `None` when cancellation was observed before it started.
type Creation = Option<Result<Erased, TenantError>>;

impl Materializer {
	/// Creates the tenants of template `template`.
	pub async fn materialize_tenants(&self, template: &str) -> Result<Vec<Tenant>, MaterializeError> {
		self.materialize_tenants_with(template, &CancellationToken::new()).await
	}

	/// Creates the tenants of template `template`, stopping early once `cancel` fires.
	///
	/// Creations already running when `cancel` fires are awaited, and every tenant they
	/// produced is returned in [`MaterializeError::Cancelled`].
	pub async fn materialize_tenants_with(&self, template: &str, cancel: &CancellationToken) -> Result<Vec<Tenant>, MaterializeError> {
		let Some((name, spec)) = self.templates.get_key_value(template) else {
			return Err(MaterializeError::TemplateNotFound(template.to_string()));
		};
		let template_name: Arc<str> = Arc::from(name.as_str());
		tracing::debug!(template = %template_name, components = spec.components.len(), tenants = spec.tenants.len(), "island.materialize.start");

		if cancel.is_cancelled() {
			return Err(cancelled(&template_name, Vec::new()));
		}

		let components = self.acquire(&template_name, spec, cancel).await?;
		let tenants = self.create(&template_name, spec, &components, cancel).await?;

		for hook in self.hooks.iter() {
			if let Err(source) = hook.after_materialize(&template_name, &tenants).await {
				tracing::warn!(template = %template_name, error = %source, "island.materialize.hook_failed");
				return Err(MaterializeError::Hook {
					template: template_name.to_string(),
					source,
					created: tenants,
				});
			}
		}

		tracing::info!(template = %template_name, tenants = tenants.len(), "island.materialize.done");
		Ok(tenants)
	}

	/// Acquires every component of `template`, one pool call per kind.
	async fn acquire(&self, template_name: &Arc<str>, template: &Template, cancel: &CancellationToken) -> Result<FxHashMap<String, Erased>, MaterializeError> {
		let mut batches: IndexMap<ComponentKind, Vec<(String, ErasedSpec)>> = IndexMap::new();
		for (name, entry) in &template.components {
			batches.entry(entry.kind).or_default().push((name.clone(), entry.spec.clone()));
		}

		let mut acquired = FxHashMap::default();
		for (kind, requests) in batches {
			let registration = self.registration(kind).map_err(|source| MaterializeError::Acquisition {
				template: template_name.to_string(),
				kind,
				source,
			})?;
			tracing::trace!(template = %template_name, %kind, requests = requests.len(), "island.acquire.start");

			let answer = tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(cancelled(template_name, Vec::new())),
				answer = bounded(self.acquire_timeout, registration.pool.acquire(&requests, cancel)) => answer,
			};
			let components = match answer {
				Some(Ok(components)) => components,
				Some(Err(AcquireError::Cancelled)) if cancel.is_cancelled() => return Err(cancelled(template_name, Vec::new())),
				Some(Err(source)) => {
					tracing::warn!(template = %template_name, %kind, error = %source, "island.acquire.failed");
					return Err(MaterializeError::Acquisition {
						template: template_name.to_string(),
						kind,
						source,
					});
				}
				None => {
					let timeout_secs = self.acquire_timeout.map_or(0, |t| t.as_secs());
					tracing::warn!(template = %template_name, %kind, timeout_secs, "island.acquire.timed_out");
					return Err(MaterializeError::AcquisitionTimedOut {
						template: template_name.to_string(),
						kind,
						timeout_secs,
					});
				}
			};

			check_contract(&requests, components, &mut acquired).map_err(|detail| MaterializeError::PoolContract {
				template: template_name.to_string(),
				kind,
				detail,
			})?;
		}
		Ok(acquired)
	}

	/// Creates every tenant of `template` on its acquired component.
	async fn create(
		&self,
		template_name: &Arc<str>,
		template: &Template,
		components: &FxHashMap<String, Erased>,
		cancel: &CancellationToken,
	) -> Result<Vec<Tenant>, MaterializeError> {
		let mut keys: FxHashMap<&str, Vec<DataAccessKey>> = FxHashMap::default();
		for (key, tenant) in &template.data_access {
			keys.entry(tenant.as_str()).or_default().push(*key);
		}

		let mut plans = Vec::with_capacity(template.tenants.len());
		let mut set: OpSet<Creation> = OpSet::new("create", Arc::clone(&self.limit));
		let mut failures = Vec::new();
		for (index, (tenant_name, entry)) in template.tenants.iter().enumerate() {
			let Some(component_entry) = template.components.get(&entry.component) else {
				continue;
			};
			let kind = component_entry.kind;
			let mut data_access = keys.remove(tenant_name.as_str()).unwrap_or_default();
			data_access.sort_by_key(|key| key.name());
			plans.push((index, tenant_name, entry.component.as_str(), kind, Arc::<[DataAccessKey]>::from(data_access)));

			let (factory, component) = match (self.registration(kind), components.get(&entry.component)) {
				(Ok(registration), Some(component)) => (Arc::clone(&registration.factory), Arc::clone(component)),
				(Err(err), _) => {
					failures.push(failure(tenant_name, &entry.component, kind, TenantError::Dispatch(err.to_string())));
					continue;
				}
				(_, None) => {
					failures.push(failure(tenant_name, &entry.component, kind, TenantError::Dispatch("component was not acquired".into())));
					continue;
				}
			};
			if cancel.is_cancelled() {
				break;
			}

			let spec = entry.spec.clone();
			let cancel = cancel.clone();
			set.spawn(index, async move {
				if cancel.is_cancelled() {
					return None;
				}
				Some(factory.add_tenant(&component, &spec).await)
			});
		}

		let mut outcomes: FxHashMap<usize, Result<Erased, TenantError>> = FxHashMap::default();
		while let Some((index, joined)) = set.join_next().await {
			match joined {
				Ok(Some(outcome)) => {
					outcomes.insert(index, outcome);
				}
				Ok(None) => {}
				Err(err) => {
					outcomes.insert(index, Err(TenantError::Aborted(err.to_string())));
				}
			}
		}

		let mut created = Vec::with_capacity(plans.len());
		for (index, tenant_name, component_name, kind, data_access) in plans {
			match outcomes.remove(&index) {
				Some(Ok(instance)) => {
					tracing::trace!(template = %template_name, tenant = %tenant_name, component = component_name, %kind, "island.tenant.created");
					let Some(component) = components.get(component_name) else {
						continue;
					};
					created.push(Tenant {
						instance,
						name: Arc::from(tenant_name.as_str()),
						template: Arc::clone(template_name),
						component_name: Arc::from(component_name),
						component: Arc::clone(component),
						kind,
						data_access,
					});
				}
				Some(Err(error)) => failures.push(failure(tenant_name, component_name, kind, error)),
				None => {}
			}
		}

		if !failures.is_empty() {
			for failure in &failures {
				tracing::warn!(template = %template_name, tenant = %failure.tenant, component = %failure.component, error = %failure.error, "island.tenant.create_failed");
			}
			return Err(MaterializeError::TenantCreation {
				template: template_name.to_string(),
				failures,
				created,
			});
		}
		if cancel.is_cancelled() {
			return Err(cancelled(template_name, created));
		}
		Ok(created)
	}

	/// Removes `tenants`, attempting every one of them.
	pub async fn dematerialize_tenants(&self, tenants: Vec<Tenant>) -> Result<DematerializeReport, DematerializeError> {
		let mut report = DematerializeReport::default();
		let mut failures = Vec::new();
		let mut set = OpSet::new("remove", Arc::clone(&self.limit));

		for (index, tenant) in tenants.iter().enumerate() {
			match self.registration(tenant.kind) {
				Ok(registration) => {
					let factory = Arc::clone(&registration.factory);
					let component = Arc::clone(&tenant.component);
					let instance = Arc::clone(&tenant.instance);
					set.spawn(index, async move { factory.remove_tenant(&component, &instance).await });
				}
				Err(err) => failures.push(removal_failure(tenant, TenantError::Dispatch(err.to_string()))),
			}
		}

		while let Some((index, joined)) = set.join_next().await {
			let Some(tenant) = tenants.get(index) else {
				continue;
			};
			match joined.map_err(|err| TenantError::Aborted(err.to_string())).and_then(|removed| removed) {
				Ok(true) => report.removed += 1,
				Ok(false) => {
					tracing::debug!(template = %tenant.template, tenant = %tenant.name, "island.tenant.already_gone");
					report.already_gone += 1;
				}
				Err(error) => {
					tracing::warn!(template = %tenant.template, tenant = %tenant.name, error = %error, "island.tenant.remove_failed");
					failures.push(removal_failure(tenant, error));
				}
			}
		}

		tracing::debug!(removed = report.removed, already_gone = report.already_gone, failed = failures.len(), "island.dematerialize.done");
		if failures.is_empty() {
			Ok(report)
		} else {
			failures.sort_by(|a, b| (&a.template, &a.tenant).cmp(&(&b.template, &b.tenant)));
			Err(DematerializeError { failures, report })
		}
	}

	/// Names of registered templates, sorted.
	pub fn template_names(&self) -> Vec<&str> {
		let mut names: Vec<_> = self.templates.keys().map(String::as_str).collect();
		names.sort_unstable();
		names
	}

	fn registration(&self, kind: ComponentKind) -> Result<&KindRegistration, AcquireError> {
		self.kinds
			.get(&kind)
			.ok_or_else(|| AcquireError::Dispatch(format!("no pool registered for {kind}")))
	}
}

/// Moves a pool's answer into `acquired`, verifying one distinct component per request.
fn check_contract(requests: &[(String, ErasedSpec)], mut answer: FxHashMap<String, Erased>, acquired: &mut FxHashMap<String, Erased>) -> Result<(), String> {
	let mut seen = FxHashSet::default();
	for (name, _) in requests {
		let component = answer.remove(name).ok_or_else(|| format!("no component returned for '{name}'"))?;
		if !seen.insert(erased_addr(&component)) {
			return Err(format!("component returned for '{name}' was already assigned to another name"));
		}
		acquired.insert(name.clone(), component);
	}
	if let Some(extra) = answer.keys().min() {
		return Err(format!("component returned for unrequested name '{extra}'"));
	}
	Ok(())
}

async fn bounded<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
	match limit {
		Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
		None => Some(fut.await),
	}
}

fn cancelled(template: &str, created: Vec<Tenant>) -> MaterializeError {
	tracing::debug!(template, created = created.len(), "island.materialize.cancelled");
	MaterializeError::Cancelled {
		template: template.to_string(),
		created,
	}
}

fn failure(tenant: &str, component: &str, kind: ComponentKind, error: TenantError) -> TenantFailure {
	TenantFailure {
		tenant: tenant.to_string(),
		component: component.to_string(),
		kind,
		error,
	}
}

fn removal_failure(tenant: &Tenant, error: TenantError) -> RemovalFailure {
	RemovalFailure {
		template: tenant.template.to_string(),
		tenant: tenant.name.to_string(),
		component: tenant.component_name.to_string(),
		kind: tenant.kind,
		error,
	}
}
