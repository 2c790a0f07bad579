use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use isle_core::{ComponentSpec, TenantError};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

/// Collation a server reports when none was configured.
pub const DEFAULT_COLLATION: &str = "SQL_Latin1_General_CP1_CI_AS";

pub(crate) type Rows = BTreeMap<String, String>;

/// Storage behind one database. Shared by every handle to it.
#[derive(Debug, Default)]
pub(crate) struct DatabaseState {
	pub(crate) rows: RwLock<Rows>,
	pub(crate) max_parallelism: Option<u32>,
}

/// A database server living in process memory.
///
/// Settings are fixed at construction. Databases come and go through
/// [`MemoryDatabaseFactory`](crate::MemoryDatabaseFactory).
pub struct MemoryServer {
	name: String,
	collation: String,
	clr_enabled: bool,
	capacity: Option<usize>,
	backups: FxHashMap<String, Arc<Rows>>,
	online: AtomicBool,
	databases: Mutex<FxHashMap<String, Arc<DatabaseState>>>,
}

impl MemoryServer {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			collation: DEFAULT_COLLATION.to_owned(),
			clr_enabled: false,
			capacity: None,
			backups: FxHashMap::default(),
			online: AtomicBool::new(true),
			databases: Mutex::new(FxHashMap::default()),
		}
	}

	pub fn with_collation(mut self, collation: impl Into<String>) -> Self {
		self.collation = collation.into();
		self
	}

	pub fn with_clr_enabled(mut self, enabled: bool) -> Self {
		self.clr_enabled = enabled;
		self
	}

	/// Maximum number of databases the server holds at once.
	pub fn with_capacity(mut self, databases: usize) -> Self {
		self.capacity = Some(databases);
		self
	}

	/// Registers a backup that database specs can restore from.
	pub fn with_backup<K, V>(mut self, name: impl Into<String>, rows: impl IntoIterator<Item = (K, V)>) -> Self
	where
		K: Into<String>,
		V: Into<String>,
	{
		let rows = rows.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
		self.backups.insert(name.into(), Arc::new(rows));
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn collation(&self) -> &str {
		&self.collation
	}

	pub fn clr_enabled(&self) -> bool {
		self.clr_enabled
	}

	pub fn is_online(&self) -> bool {
		self.online.load(Ordering::Acquire)
	}

	/// Takes the server up or down. Offline servers refuse database operations.
	pub fn set_online(&self, online: bool) {
		self.online.store(online, Ordering::Release);
	}

	/// Names of the databases currently on the server, sorted.
	pub fn databases(&self) -> Vec<String> {
		let mut names: Vec<_> = self.databases.lock().keys().cloned().collect();
		names.sort_unstable();
		names
	}

	pub fn database_count(&self) -> usize {
		self.databases.lock().len()
	}

	pub fn has_database(&self, name: &str) -> bool {
		self.databases.lock().contains_key(name)
	}

	pub(crate) fn ensure_online(&self) -> Result<(), TenantError> {
		if self.is_online() {
			Ok(())
		} else {
			Err(TenantError::Connection(format!("server '{}' is offline", self.name)))
		}
	}

	pub(crate) fn backup(&self, name: &str) -> Result<Arc<Rows>, TenantError> {
		self.backups
			.get(name)
			.cloned()
			.ok_or_else(|| TenantError::ConfigurationMismatch(format!("server '{}' has no backup named '{name}'", self.name)))
	}

	pub(crate) fn attach(&self, name: &str, state: Arc<DatabaseState>) -> Result<(), TenantError> {
		let mut databases = self.databases.lock();
		if let Some(capacity) = self.capacity
			&& databases.len() >= capacity
		{
			return Err(TenantError::ResourceExhausted(format!(
				"server '{}' already holds its maximum of {capacity} database(s)",
				self.name
			)));
		}
		if databases.contains_key(name) {
			return Err(TenantError::ConfigurationMismatch(format!("database '{name}' already exists on server '{}'", self.name)));
		}
		databases.insert(name.to_owned(), state);
		Ok(())
	}

	pub(crate) fn detach(&self, name: &str) -> bool {
		self.databases.lock().remove(name).is_some()
	}

	pub(crate) fn drop_all(&self) -> usize {
		let mut databases = self.databases.lock();
		let dropped = databases.len();
		databases.clear();
		dropped
	}
}

impl fmt::Debug for MemoryServer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemoryServer")
			.field("name", &self.name)
			.field("collation", &self.collation)
			.field("clr_enabled", &self.clr_enabled)
			.field("online", &self.is_online())
			.field("databases", &self.database_count())
			.finish_non_exhaustive()
	}
}

/// Conditions on a [`MemoryServer`]. Unset conditions match any server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryServerSpec {
	collation: Option<String>,
	clr_enabled: Option<bool>,
}

impl MemoryServerSpec {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_collation(self, collation: impl Into<String>) -> Self {
		Self {
			collation: Some(collation.into()),
			..self
		}
	}

	pub fn with_clr_enabled(self, enabled: bool) -> Self {
		Self {
			clr_enabled: Some(enabled),
			..self
		}
	}

	pub fn collation(&self) -> Option<&str> {
		self.collation.as_deref()
	}

	pub fn clr_enabled(&self) -> Option<bool> {
		self.clr_enabled
	}

	/// Checks `server` against every set condition. The error says which one failed.
	pub fn check(&self, server: &MemoryServer) -> Result<(), String> {
		if let Some(collation) = &self.collation
			&& !collation.eq_ignore_ascii_case(server.collation())
		{
			return Err(format!("Unable to find a server with collation {collation}."));
		}
		if let Some(enabled) = self.clr_enabled
			&& enabled != server.clr_enabled()
		{
			let state = if enabled { "enabled" } else { "disabled" };
			return Err(format!("Unable to find a server with CLR {state}."));
		}
		Ok(())
	}
}

impl ComponentSpec for MemoryServerSpec {
	type Component = MemoryServer;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unset_conditions_match_any_server() {
		let server = MemoryServer::new("a").with_collation("Czech_CI_AS").with_clr_enabled(true);
		assert_eq!(MemoryServerSpec::new().check(&server), Ok(()));
		assert_eq!(MemoryServerSpec::new().with_collation("czech_ci_as").check(&server), Ok(()));
	}

	#[test]
	fn failed_condition_is_named() {
		let server = MemoryServer::new("a");
		let err = MemoryServerSpec::new().with_collation("Czech_CI_AS").check(&server).unwrap_err();
		assert_eq!(err, "Unable to find a server with collation Czech_CI_AS.");
		let err = MemoryServerSpec::new().with_clr_enabled(true).check(&server).unwrap_err();
		assert_eq!(err, "Unable to find a server with CLR enabled.");
	}

	#[test]
	fn capacity_limits_attached_databases() {
		let server = MemoryServer::new("small").with_capacity(1);
		server.attach("one", Arc::default()).expect("first");
		assert!(matches!(server.attach("two", Arc::default()), Err(TenantError::ResourceExhausted(_))));
		assert!(server.detach("one"));
		assert!(!server.detach("one"));
	}
}
