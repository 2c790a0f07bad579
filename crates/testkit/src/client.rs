use crate::database::MemoryDatabase;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
	#[error("no row '{key}' in database '{database}'")]
	NotFound { database: String, key: String },
	#[error("row '{key}' already exists in database '{database}'")]
	Conflict { database: String, key: String },
}

/// Data-access handle over one [`MemoryDatabase`].
///
/// Register it with a service registry and patch it with a
/// `LambdaPatcher<DatabaseClient, MemoryDatabase>` so every test talks to its own database.
#[derive(Debug, Clone)]
pub struct DatabaseClient {
	database: MemoryDatabase,
}

impl DatabaseClient {
	pub fn new(database: MemoryDatabase) -> Self {
		Self { database }
	}

	pub fn database_name(&self) -> &str {
		self.database.name()
	}

	/// Inserts a new row. Fails if `key` is taken.
	pub fn create(&self, key: &str, value: impl Into<String>) -> Result<(), ClientError> {
		if self.database.insert_new(key, value) {
			return Ok(());
		}
		Err(ClientError::Conflict {
			database: self.database.name().to_owned(),
			key: key.to_owned(),
		})
	}

	/// Inserts or overwrites a row.
	pub fn upsert(&self, key: &str, value: impl Into<String>) {
		self.database.insert(key, value);
	}

	pub fn fetch(&self, key: &str) -> Result<String, ClientError> {
		self.database.get(key).ok_or_else(|| self.not_found(key))
	}

	pub fn delete(&self, key: &str) -> Result<String, ClientError> {
		self.database.remove(key).ok_or_else(|| self.not_found(key))
	}

	pub fn count(&self) -> usize {
		self.database.len()
	}

	fn not_found(&self, key: &str) -> ClientError {
		ClientError::NotFound {
			database: self.database.name().to_owned(),
			key: key.to_owned(),
		}
	}
}
