use std::fmt;
use std::sync::Arc;

use isle_core::{DataAccessKey, Tenant, TypeTag};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Identity of a running test.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestId(Arc<str>);

impl TestId {
	pub fn new(id: impl Into<Arc<str>>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for TestId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "TestId({})", self.0)
	}
}

impl fmt::Display for TestId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for TestId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

impl From<String> for TestId {
	fn from(id: String) -> Self {
		Self::new(id)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
	#[error("test '{test}' already has materialized tenants; a test can apply only one template at a time")]
	AlreadyActive { test: TestId },
	#[error("test '{test}' has no materialized tenants; apply a template before resolving data access")]
	NotActive { test: TestId },
	#[error("template applied to test '{test}' has no tenant for data access {key}")]
	NoTenant { test: TestId, key: DataAccessKey },
	#[error("tenant for data access {key} in test '{test}' is not a {expected}")]
	TenantType { test: TestId, key: DataAccessKey, expected: TypeTag },
}

struct Active {
	tenants: Arc<[Tenant]>,
	by_key: FxHashMap<DataAccessKey, usize>,
}

/// Tenants of every running test, keyed by [`TestId`].
///
/// Shared by all tests of a process. Clones share the same store.
#[derive(Clone, Default)]
pub struct TestContext {
	active: Arc<RwLock<FxHashMap<TestId, Active>>>,
}

impl TestContext {
	pub fn new() -> Self {
		Self::default()
	}

	/// Stores `tenants` for `test`.
	///
	/// On failure the tenants are handed back so the caller can still remove them.
	pub fn activate(&self, test: TestId, tenants: Vec<Tenant>) -> Result<(), (ContextError, Vec<Tenant>)> {
		let mut active = self.active.write();
		if active.contains_key(&test) {
			return Err((ContextError::AlreadyActive { test }, tenants));
		}
		let by_key = tenants
			.iter()
			.enumerate()
			.flat_map(|(index, tenant)| tenant.data_access().iter().map(move |key| (*key, index)))
			.collect();
		tracing::debug!(%test, tenants = tenants.len(), "context.activate");
		active.insert(
			test,
			Active {
				tenants: tenants.into(),
				by_key,
			},
		);
		Ok(())
	}

	/// Removes and returns the tenants of `test`.
	pub fn deactivate(&self, test: &TestId) -> Result<Vec<Tenant>, ContextError> {
		let removed = self.active.write().remove(test);
		match removed {
			Some(active) => {
				tracing::debug!(%test, tenants = active.tenants.len(), "context.deactivate");
				Ok(active.tenants.to_vec())
			}
			None => Err(ContextError::NotActive { test: test.clone() }),
		}
	}

	pub fn is_active(&self, test: &TestId) -> bool {
		self.active.read().contains_key(test)
	}

	/// Number of tests with stored tenants.
	pub fn active_tests(&self) -> usize {
		self.active.read().len()
	}

	/// All tenants of `test`, in template declaration order.
	pub fn tenants(&self, test: &TestId) -> Result<Arc<[Tenant]>, ContextError> {
		self.active
			.read()
			.get(test)
			.map(|active| Arc::clone(&active.tenants))
			.ok_or_else(|| ContextError::NotActive { test: test.clone() })
	}

	/// Tenant data access `key` resolves to in `test`.
	pub fn tenant(&self, test: &TestId, key: DataAccessKey) -> Result<Tenant, ContextError> {
		let active = self.active.read();
		let entry = active.get(test).ok_or_else(|| ContextError::NotActive { test: test.clone() })?;
		entry
			.by_key
			.get(&key)
			.and_then(|index| entry.tenants.get(*index))
			.cloned()
			.ok_or_else(|| ContextError::NoTenant { test: test.clone(), key })
	}

	/// View of this context bound to `test`.
	pub fn lookup(&self, test: TestId) -> TenantLookup {
		TenantLookup {
			context: self.clone(),
			test,
		}
	}
}

impl fmt::Debug for TestContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let active = self.active.read();
		let mut tests: Vec<_> = active.keys().collect();
		tests.sort();
		f.debug_struct("TestContext").field("active", &tests).finish()
	}
}

/// Resolves tenants of a single test.
///
/// Threaded into a consumer's [`ServiceProvider`](isle_core::ServiceProvider) as a
/// scope value so patched services find the tenant of the test that owns the scope.
#[derive(Debug, Clone)]
pub struct TenantLookup {
	context: TestContext,
	test: TestId,
}

impl TenantLookup {
	pub fn test(&self) -> &TestId {
		&self.test
	}

	pub fn tenant(&self, key: DataAccessKey) -> Result<Tenant, ContextError> {
		self.context.tenant(&self.test, key)
	}

	/// Tenant instance data-access type `D` resolves to.
	pub fn instance<D: ?Sized + 'static, T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ContextError> {
		let key = DataAccessKey::of::<D>();
		self.tenant(key)?.instance::<T>().ok_or_else(|| ContextError::TenantType {
			test: self.test.clone(),
			key,
			expected: TypeTag::of::<T>(),
		})
	}
}
