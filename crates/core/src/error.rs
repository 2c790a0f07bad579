use std::fmt;

use crate::spec::{ComponentKind, DataAccessKey};
use crate::tenant::Tenant;
use crate::validate::ValidationReport;

/// Build-time configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("component pool for {kind} is already registered")]
	DuplicatePool { kind: ComponentKind },
	#[error("data access {key} already has a patcher; each data access type can have only one")]
	DuplicatePatcher { key: DataAccessKey },
	#[error("template '{name}' is already registered")]
	DuplicateTemplate { name: String },
	#[error(transparent)]
	Validation(#[from] ValidationReport),
	#[error("invalid island configuration: {0}")]
	Parse(#[from] toml::de::Error),
}

/// Failure reported by a [`ComponentPool`](crate::ComponentPool).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
	/// No valid assignment exists for the listed requests.
	#[error("unable to find components for {}: {reason}", quoted(.unmet))]
	Unsatisfiable { unmet: Vec<String>, reason: String },
	/// Backing infrastructure is not usable, e.g. the pool was never initialized.
	#[error("infrastructure unavailable: {0}")]
	Unavailable(String),
	#[error("component acquisition cancelled")]
	Cancelled,
	#[error("dispatch error: {0}")]
	Dispatch(String),
}

impl AcquireError {
	/// Unsatisfiable error for a single request.
	pub fn unsatisfiable(name: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::Unsatisfiable {
			unmet: vec![name.into()],
			reason: reason.into(),
		}
	}
}

/// Failure reported by a [`TenantFactory`](crate::TenantFactory).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TenantError {
	#[error("resource exhausted: {0}")]
	ResourceExhausted(String),
	#[error("configuration mismatch: {0}")]
	ConfigurationMismatch(String),
	#[error("connection failure: {0}")]
	Connection(String),
	/// The creation or removal task panicked or was aborted.
	#[error("tenant task aborted: {0}")]
	Aborted(String),
	#[error("dispatch error: {0}")]
	Dispatch(String),
}

/// Failure reported by a pool's lifecycle hooks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PoolError(pub String);

/// A tenant that could not be created.
#[derive(Debug, Clone)]
pub struct TenantFailure {
	pub tenant: String,
	pub component: String,
	pub kind: ComponentKind,
	pub error: TenantError,
}

impl fmt::Display for TenantFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "tenant '{}' on component '{}' ({}): {}", self.tenant, self.component, self.kind, self.error)
	}
}

/// Failure of a single [`Materializer::materialize_tenants`](crate::Materializer::materialize_tenants) call.
///
/// Variants raised after tenant creation started carry the tenants that were created.
/// Nothing is rolled back automatically: pass them to
/// [`Materializer::dematerialize_tenants`](crate::Materializer::dematerialize_tenants).
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
	#[error("template '{0}' is not found")]
	TemplateNotFound(String),
	#[error("template '{template}': pool for {kind} failed to acquire components: {source}")]
	Acquisition {
		template: String,
		kind: ComponentKind,
		#[source]
		source: AcquireError,
	},
	#[error("template '{template}': pool for {kind} did not answer within {timeout_secs}s")]
	AcquisitionTimedOut { template: String, kind: ComponentKind, timeout_secs: u64 },
	#[error("template '{template}': pool for {kind} broke its contract: {detail}")]
	PoolContract { template: String, kind: ComponentKind, detail: String },
	#[error("template '{template}': {} tenant(s) failed: {}", .failures.len(), join(.failures))]
	TenantCreation {
		template: String,
		failures: Vec<TenantFailure>,
		created: Vec<Tenant>,
	},
	#[error("template '{template}': after-materialization hook failed: {source}")]
	Hook {
		template: String,
		#[source]
		source: HookError,
		created: Vec<Tenant>,
	},
	#[error("template '{template}': materialization cancelled")]
	Cancelled { template: String, created: Vec<Tenant> },
}

impl MaterializeError {
	/// Tenants created before the failure.
	pub fn created(&self) -> &[Tenant] {
		match self {
			Self::TenantCreation { created, .. } | Self::Hook { created, .. } | Self::Cancelled { created, .. } => created,
			_ => &[],
		}
	}

	/// Takes the tenants created before the failure.
	pub fn into_created(self) -> Vec<Tenant> {
		match self {
			Self::TenantCreation { created, .. } | Self::Hook { created, .. } | Self::Cancelled { created, .. } => created,
			_ => Vec::new(),
		}
	}

	/// True when the failure means backing infrastructure was not usable, as opposed
	/// to a specification no component or tenant could satisfy.
	pub fn is_unavailable(&self) -> bool {
		match self {
			Self::Acquisition { source, .. } => matches!(source, AcquireError::Unavailable(_)),
			Self::AcquisitionTimedOut { .. } => true,
			Self::TenantCreation { failures, .. } => failures.iter().any(|f| matches!(f.error, TenantError::Connection(_))),
			_ => false,
		}
	}
}

/// Failure of an after-materialization hook.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HookError(pub String);

/// A tenant whose removal failed.
#[derive(Debug, Clone)]
pub struct RemovalFailure {
	pub template: String,
	pub tenant: String,
	pub component: String,
	pub kind: ComponentKind,
	pub error: TenantError,
}

impl fmt::Display for RemovalFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"tenant '{}' of template '{}' on component '{}' ({}): {}",
			self.tenant, self.template, self.component, self.kind, self.error
		)
	}
}

/// Outcome of a dematerialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DematerializeReport {
	/// Tenants the factory found and removed.
	pub removed: usize,
	/// Tenants the factory no longer found on their component.
	pub already_gone: usize,
}

/// Dematerialization finished with failures. Every tenant was still attempted.
#[derive(Debug, thiserror::Error)]
#[error("{} tenant(s) could not be removed: {}", .failures.len(), join(.failures))]
pub struct DematerializeError {
	pub failures: Vec<RemovalFailure>,
	pub report: DematerializeReport,
}

/// Island lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
	Initialize,
	Dispose,
}

impl LifecyclePhase {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Initialize => "initialize",
			Self::Dispose => "dispose",
		}
	}
}

impl fmt::Display for LifecyclePhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One or more pools failed to initialize or dispose.
#[derive(Debug, thiserror::Error)]
#[error("{phase} failed for {}", join_pairs(.failures))]
pub struct LifecycleError {
	pub phase: LifecyclePhase,
	pub failures: Vec<(ComponentKind, PoolError)>,
}

fn quoted(names: &[String]) -> String {
	names.iter().map(|n| format!("'{n}'")).collect::<Vec<_>>().join(", ")
}

fn join<T: fmt::Display>(items: &[T]) -> String {
	items.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

fn join_pairs(items: &[(ComponentKind, PoolError)]) -> String {
	items.iter().map(|(kind, err)| format!("{kind}: {err}")).collect::<Vec<_>>().join("; ")
}
