use std::sync::Arc;
use std::time::Duration;

use isle_core::{TenantError, TenantFactory, TenantSpec, async_trait};
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::server::{DatabaseState, MemoryServer};

/// Tenant created by [`MemoryDatabaseFactory`]: one database on one server.
///
/// Clones share the same rows.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
	name: String,
	server: String,
	state: Arc<DatabaseState>,
}

impl MemoryDatabase {
	/// Unique database name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Name of the server holding the database.
	pub fn server_name(&self) -> &str {
		&self.server
	}

	pub fn max_parallelism(&self) -> Option<u32> {
		self.state.max_parallelism
	}

	pub fn get(&self, key: &str) -> Option<String> {
		self.state.rows.read().get(key).cloned()
	}

	/// Stores `value` under `key`, returning the previous value.
	pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
		self.state.rows.write().insert(key.into(), value.into())
	}

	/// Stores `value` unless `key` is taken. Returns whether it was stored.
	pub fn insert_new(&self, key: &str, value: impl Into<String>) -> bool {
		let mut rows = self.state.rows.write();
		if rows.contains_key(key) {
			return false;
		}
		rows.insert(key.to_owned(), value.into());
		true
	}

	pub fn remove(&self, key: &str) -> Option<String> {
		self.state.rows.write().remove(key)
	}

	pub fn keys(&self) -> Vec<String> {
		self.state.rows.read().keys().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.state.rows.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// How a [`MemoryDatabase`] is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryDatabaseSpec {
	data_source: Option<String>,
	max_parallelism: Option<u32>,
}

impl MemoryDatabaseSpec {
	pub fn new() -> Self {
		Self::default()
	}

	/// Restores the database from the server backup called `backup`.
	pub fn with_data_source(self, backup: impl Into<String>) -> Self {
		Self {
			data_source: Some(backup.into()),
			..self
		}
	}

	/// Degree of parallelism the database is configured with. `0` lets the server decide.
	pub fn with_max_parallelism(self, degree: u32) -> Self {
		Self {
			max_parallelism: Some(degree),
			..self
		}
	}

	pub fn data_source(&self) -> Option<&str> {
		self.data_source.as_deref()
	}

	pub fn max_parallelism(&self) -> Option<u32> {
		self.max_parallelism
	}
}

impl TenantSpec for MemoryDatabaseSpec {
	type Tenant = MemoryDatabase;
}

/// Creates uniquely named databases on [`MemoryServer`]s.
#[derive(Debug, Default)]
pub struct MemoryDatabaseFactory {
	latency: Option<Duration>,
}

impl MemoryDatabaseFactory {
	pub fn new() -> Self {
		Self::default()
	}

	/// Delays every creation and removal.
	pub fn with_latency(latency: Duration) -> Self {
		Self { latency: Some(latency) }
	}

	async fn wait(&self) {
		if let Some(latency) = self.latency {
			tokio::time::sleep(latency).await;
		}
	}
}

#[async_trait]
impl TenantFactory for MemoryDatabaseFactory {
	type Component = MemoryServer;
	type Spec = MemoryDatabaseSpec;

	async fn add_tenant(&self, server: &MemoryServer, spec: &MemoryDatabaseSpec) -> Result<MemoryDatabase, TenantError> {
		self.wait().await;
		server.ensure_online()?;

		let rows = match spec.data_source() {
			Some(backup) => server.backup(backup)?.as_ref().clone(),
			None => Default::default(),
		};
		let restored = rows.len();
		let state = Arc::new(DatabaseState {
			rows: RwLock::new(rows),
			max_parallelism: spec.max_parallelism(),
		});
		let name = format!("isle_{}", Uuid::new_v4().simple());
		server.attach(&name, Arc::clone(&state))?;

		debug!(server = server.name(), database = %name, restored, "memory.database.created");
		Ok(MemoryDatabase {
			name,
			server: server.name().to_owned(),
			state,
		})
	}

	async fn remove_tenant(&self, server: &MemoryServer, database: &MemoryDatabase) -> Result<bool, TenantError> {
		self.wait().await;
		if !server.has_database(&database.name) {
			return Ok(false);
		}
		server.ensure_online()?;
		let removed = server.detach(&database.name);
		debug!(server = server.name(), database = %database.name, removed, "memory.database.removed");
		Ok(removed)
	}
}

#[cfg(test)]
mod tests;
