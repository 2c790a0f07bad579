//! Binding materialized tenants to running tests.
//!
//! A [`TemplateScope`] materializes a template for one [`TestId`] and stores the tenants
//! in a shared [`TestContext`]. Consumer services patched with a [`LambdaPatcher`] find
//! their tenant through the [`TenantLookup`] of the scope resolving them.

mod context;
mod patcher;
mod scope;

#[cfg(test)]
mod fixtures;

pub use context::{ContextError, TenantLookup, TestContext, TestId};
pub use patcher::LambdaPatcher;
pub use scope::{DEFAULT_TEMPLATE, ScopeError, TemplateScope};
