use pretty_assertions::assert_eq;

use super::*;

#[tokio::test]
async fn databases_are_isolated_and_uniquely_named() {
	let server = MemoryServer::new("a");
	let factory = MemoryDatabaseFactory::new();
	let first = factory.add_tenant(&server, &MemoryDatabaseSpec::new()).await.expect("first");
	let second = factory.add_tenant(&server, &MemoryDatabaseSpec::new()).await.expect("second");

	assert_ne!(first.name(), second.name());
	first.insert("order:1", "open");
	assert_eq!(first.get("order:1").as_deref(), Some("open"));
	assert!(second.is_empty());
	assert_eq!(server.database_count(), 2);
	assert_eq!(first.server_name(), "a");
}

#[tokio::test]
async fn restores_from_backup_and_applies_options() {
	let server = MemoryServer::new("a").with_backup("seed", [("customer:1", "Ada"), ("customer:2", "Grace")]);
	let spec = MemoryDatabaseSpec::new().with_data_source("seed").with_max_parallelism(2);
	let database = MemoryDatabaseFactory::new().add_tenant(&server, &spec).await.expect("restore");

	assert_eq!(database.keys(), ["customer:1", "customer:2"]);
	assert_eq!(database.max_parallelism(), Some(2));

	database.insert("customer:3", "Edsger");
	let again = MemoryDatabaseFactory::new().add_tenant(&server, &spec).await.expect("restore again");
	assert_eq!(again.len(), 2);
}

#[tokio::test]
async fn missing_backup_is_a_configuration_mismatch() {
	let server = MemoryServer::new("a");
	let spec = MemoryDatabaseSpec::new().with_data_source("nope");
	let err = MemoryDatabaseFactory::new().add_tenant(&server, &spec).await.unwrap_err();
	assert_eq!(err, TenantError::ConfigurationMismatch("server 'a' has no backup named 'nope'".into()));
	assert_eq!(server.database_count(), 0);
}

#[tokio::test]
async fn full_server_is_exhausted() {
	let server = MemoryServer::new("small").with_capacity(1);
	let factory = MemoryDatabaseFactory::new();
	factory.add_tenant(&server, &MemoryDatabaseSpec::new()).await.expect("first");
	let err = factory.add_tenant(&server, &MemoryDatabaseSpec::new()).await.unwrap_err();
	assert!(matches!(err, TenantError::ResourceExhausted(_)));
}

#[tokio::test]
async fn removal_is_idempotent() {
	let server = MemoryServer::new("a");
	let factory = MemoryDatabaseFactory::new();
	let database = factory.add_tenant(&server, &MemoryDatabaseSpec::new()).await.expect("add");

	assert_eq!(factory.remove_tenant(&server, &database).await, Ok(true));
	assert_eq!(factory.remove_tenant(&server, &database).await, Ok(false));
	assert!(!server.has_database(database.name()));
}

#[tokio::test]
async fn offline_server_refuses_connections() {
	let server = MemoryServer::new("a");
	server.set_online(false);
	let err = MemoryDatabaseFactory::new().add_tenant(&server, &MemoryDatabaseSpec::new()).await.unwrap_err();
	assert!(matches!(err, TenantError::Connection(_)));
}

#[tokio::test]
async fn removal_after_the_server_was_wiped_reports_gone() {
	let server = MemoryServer::new("a");
	let factory = MemoryDatabaseFactory::new();
	let database = factory.add_tenant(&server, &MemoryDatabaseSpec::new()).await.expect("add");

	server.set_online(false);
	server.drop_all();
	assert_eq!(factory.remove_tenant(&server, &database).await, Ok(false));
}

#[tokio::test]
async fn removal_on_an_offline_server_is_a_connection_failure() {
	let server = MemoryServer::new("a");
	let factory = MemoryDatabaseFactory::new();
	let database = factory.add_tenant(&server, &MemoryDatabaseSpec::new()).await.expect("add");

	server.set_online(false);
	assert!(matches!(factory.remove_tenant(&server, &database).await, Err(TenantError::Connection(_))));
}
