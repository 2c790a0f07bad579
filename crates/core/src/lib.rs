//! Isolated per-test tenants carved from shared infrastructure.
//!
//! An [`Island`] bundles component pools, tenant factories, templates and data-access
//! patchers. Per test, its [`Materializer`] turns a template into live [`Tenant`]s and
//! removes them afterwards.
//!
//! # Modules
//!
//! - [`spec`] - spec traits and the type keys used for routing
//! - [`pool`] - component pools and tenant factories
//! - [`template`] - declarative template model
//! - [`validate`] - build-time template checks
//! - [`materializer`] - template resolution and teardown
//! - [`services`] - consumer service registry acted on by patchers
//!
//! # Building an island
//!
//! 1. Register one pool and one factory per component kind with
//!    [`IslandBuilder::add_component_pool`].
//! 2. Declare templates with [`IslandBuilder::add_template`].
//! 3. Register a [`DependencyPatcher`] for every data-access type the templates use.
//! 4. Call [`IslandBuilder::build`].

mod builder;
mod config;
mod dispatch;
mod error;
mod island;
pub mod materializer;
mod patcher;
pub mod pool;
pub mod services;
pub mod spec;
mod tasks;
pub mod template;
mod tenant;
pub mod validate;

#[cfg(test)]
mod fixtures;

pub use builder::IslandBuilder;
pub use config::IslandConfig;
pub use error::{
	AcquireError, ConfigError, DematerializeError, DematerializeReport, HookError, LifecycleError, LifecyclePhase, MaterializeError, PoolError,
	RemovalFailure, TenantError, TenantFailure,
};
pub use island::Island;
pub use materializer::{AfterMaterialize, Materializer};
pub use patcher::DependencyPatcher;
pub use pool::{AcquiredComponents, ComponentPool, ComponentRequest, TenantFactory};
pub use services::{Lifetime, PatchError, ResolveError, ServiceDescriptor, ServiceFactory, ServiceProvider, ServiceRegistry};
pub use spec::{ComponentKind, ComponentSpec, DataAccessKey, Erased, TenantSpec, TypeTag};
pub use template::Template;
pub use tenant::Tenant;
pub use validate::{ValidationIssue, ValidationReport, ValidationStage};
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
