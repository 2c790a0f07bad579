//! Build-time template checks.
//!
//! Validation runs in fixed stages. A stage reports every issue it finds, templates in
//! name order and entities in declaration order, and later stages are skipped once a
//! stage fails. Templates accepted here are never re-checked at materialization.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::dispatch::KindRegistration;
use crate::spec::{ComponentKind, DataAccessKey, TypeTag};
use crate::template::{Duplicate, Template};

/// Validation stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationStage {
	Declarations,
	DataAccess,
	Tenants,
	Components,
	Registrations,
	Patchers,
}

impl ValidationStage {
	const ALL: [Self; 6] = [
		Self::Declarations,
		Self::DataAccess,
		Self::Tenants,
		Self::Components,
		Self::Registrations,
		Self::Patchers,
	];
}

impl fmt::Display for ValidationStage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Declarations => "declarations",
			Self::DataAccess => "data access",
			Self::Tenants => "tenants",
			Self::Components => "components",
			Self::Registrations => "registrations",
			Self::Patchers => "patchers",
		})
	}
}

/// A single problem in one template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationIssue {
	#[error("template '{template}' declares component '{component}' more than once. Keep a single declaration.")]
	DuplicateComponent { template: String, component: String },
	#[error("template '{template}' declares tenant '{tenant}' more than once. Keep a single declaration.")]
	DuplicateTenant { template: String, tenant: String },
	#[error("template '{template}' binds data access {key} more than once. Each data access can resolve to one tenant only.")]
	DuplicateDataAccess { template: String, key: DataAccessKey },
	#[error("template '{template}' doesn't specify any data access. Bind at least one data access to a tenant.")]
	NoDataAccess { template: String },
	#[error("template '{template}' binds data access {key} to tenant '{tenant}', but that tenant isn't declared. Add the tenant or fix the name.")]
	UndeclaredTenant { template: String, key: DataAccessKey, tenant: String },
	#[error("template '{template}' declares tenant '{tenant}', but no data access uses it. Bind a data access to it or remove it.")]
	UnusedTenant { template: String, tenant: String },
	#[error("template '{template}' creates tenant '{tenant}' on component '{component}', but that component isn't declared. Add the component or fix the name.")]
	UndeclaredComponent { template: String, tenant: String, component: String },
	#[error("template '{template}' declares component '{component}', but no tenant uses it. Remove it.")]
	UnusedComponent { template: String, component: String },
	#[error(
		"template '{template}' needs a pool for component '{component}' ({kind}), but none is registered. Registered kinds: [{}].",
		names(.available)
	)]
	MissingPool {
		template: String,
		component: String,
		kind: ComponentKind,
		available: Vec<ComponentKind>,
	},
	#[error("template '{template}' describes component '{component}' with {actual}, but its pool accepts {expected}.")]
	ComponentSpecMismatch {
		template: String,
		component: String,
		expected: TypeTag,
		actual: TypeTag,
	},
	#[error("template '{template}' describes tenant '{tenant}' with {actual}, but the factory for its component accepts {expected}.")]
	TenantSpecMismatch {
		template: String,
		tenant: String,
		expected: TypeTag,
		actual: TypeTag,
	},
	#[error("template '{template}' uses data access {key}, but no patcher is registered for it. Register one with the island builder.")]
	MissingPatcher { template: String, key: DataAccessKey },
}

impl ValidationIssue {
	/// Template the issue was found in.
	pub fn template(&self) -> &str {
		match self {
			Self::DuplicateComponent { template, .. }
			| Self::DuplicateTenant { template, .. }
			| Self::DuplicateDataAccess { template, .. }
			| Self::NoDataAccess { template }
			| Self::UndeclaredTenant { template, .. }
			| Self::UnusedTenant { template, .. }
			| Self::UndeclaredComponent { template, .. }
			| Self::UnusedComponent { template, .. }
			| Self::MissingPool { template, .. }
			| Self::ComponentSpecMismatch { template, .. }
			| Self::TenantSpecMismatch { template, .. }
			| Self::MissingPatcher { template, .. } => template,
		}
	}
}

/// Every issue found by the first failing stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("template validation failed at {stage} stage: {}", lines(.issues))]
pub struct ValidationReport {
	pub stage: ValidationStage,
	pub issues: Vec<ValidationIssue>,
}

fn names(kinds: &[ComponentKind]) -> String {
	kinds.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn lines(issues: &[ValidationIssue]) -> String {
	issues.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
}

/// Registered kinds and patchers templates are checked against.
pub(crate) struct Registered<'a> {
	pub(crate) kinds: &'a FxHashMap<ComponentKind, KindRegistration>,
	pub(crate) patched: &'a dyn Fn(DataAccessKey) -> bool,
}

pub(crate) fn validate<'t>(templates: impl IntoIterator<Item = (&'t str, &'t Template)>, registered: &Registered<'_>) -> Result<(), ValidationReport> {
	let mut templates: Vec<_> = templates.into_iter().collect();
	templates.sort_by(|a, b| a.0.cmp(b.0));

	for stage in ValidationStage::ALL {
		let mut issues = Vec::new();
		for (name, template) in &templates {
			check(stage, name, template, registered, &mut issues);
		}
		if !issues.is_empty() {
			tracing::warn!(%stage, count = issues.len(), "island.validate.failed");
			return Err(ValidationReport { stage, issues });
		}
	}
	Ok(())
}

fn check(stage: ValidationStage, name: &str, template: &Template, registered: &Registered<'_>, issues: &mut Vec<ValidationIssue>) {
	let template_name = || name.to_string();
	match stage {
		ValidationStage::Declarations => {
			issues.extend(template.duplicates.iter().map(|duplicate| match duplicate {
				Duplicate::Component(component) => ValidationIssue::DuplicateComponent {
					template: template_name(),
					component: component.clone(),
				},
				Duplicate::Tenant(tenant) => ValidationIssue::DuplicateTenant {
					template: template_name(),
					tenant: tenant.clone(),
				},
				Duplicate::DataAccess(key) => ValidationIssue::DuplicateDataAccess {
					template: template_name(),
					key: *key,
				},
			}));
		}
		ValidationStage::DataAccess => {
			if template.data_access.is_empty() {
				issues.push(ValidationIssue::NoDataAccess { template: template_name() });
			}
			for (key, tenant) in &template.data_access {
				if !template.tenants.contains_key(tenant) {
					issues.push(ValidationIssue::UndeclaredTenant {
						template: template_name(),
						key: *key,
						tenant: tenant.clone(),
					});
				}
			}
		}
		ValidationStage::Tenants => {
			for (tenant, entry) in &template.tenants {
				if !template.data_access.values().any(|bound| bound == tenant) {
					issues.push(ValidationIssue::UnusedTenant {
						template: template_name(),
						tenant: tenant.clone(),
					});
				}
				if !template.components.contains_key(&entry.component) {
					issues.push(ValidationIssue::UndeclaredComponent {
						template: template_name(),
						tenant: tenant.clone(),
						component: entry.component.clone(),
					});
				}
			}
		}
		ValidationStage::Components => {
			for component in template.components.keys() {
				if !template.tenants.values().any(|entry| &entry.component == component) {
					issues.push(ValidationIssue::UnusedComponent {
						template: template_name(),
						component: component.clone(),
					});
				}
			}
		}
		ValidationStage::Registrations => {
			for (component, entry) in &template.components {
				let Some(registration) = registered.kinds.get(&entry.kind) else {
					let mut available: Vec<_> = registered.kinds.keys().copied().collect();
					available.sort();
					issues.push(ValidationIssue::MissingPool {
						template: template_name(),
						component: component.clone(),
						kind: entry.kind,
						available,
					});
					continue;
				};
				if registration.component_spec != entry.spec.tag() {
					issues.push(ValidationIssue::ComponentSpecMismatch {
						template: template_name(),
						component: component.clone(),
						expected: registration.component_spec,
						actual: entry.spec.tag(),
					});
				}
			}
			for (tenant, entry) in &template.tenants {
				let registration = template.components.get(&entry.component).and_then(|component| registered.kinds.get(&component.kind));
				if let Some(registration) = registration
					&& registration.tenant_spec != entry.spec.tag()
				{
					issues.push(ValidationIssue::TenantSpecMismatch {
						template: template_name(),
						tenant: tenant.clone(),
						expected: registration.tenant_spec,
						actual: entry.spec.tag(),
					});
				}
			}
		}
		ValidationStage::Patchers => {
			for key in template.data_access.keys() {
				if !(registered.patched)(*key) {
					issues.push(ValidationIssue::MissingPatcher {
						template: template_name(),
						key: *key,
					});
				}
			}
		}
	}
}
