#![allow(dead_code)]

use std::sync::Arc;

use isle_context::{DEFAULT_TEMPLATE, LambdaPatcher};
use isle_core::{CancellationToken, DataAccessKey, Island, IslandBuilder, ResolveError, ServiceRegistry};
use isle_testkit::{DEFAULT_COLLATION, DatabaseClient, MemoryDatabase, MemoryDatabaseFactory, MemoryDatabaseSpec, MemoryServer, MemoryServerPool, MemoryServerSpec};

pub const CZECH: &str = "Czech_CI_AS";

/// Orders repository used by the code under test.
pub struct Orders(pub DatabaseClient);

/// Audit log used by the code under test.
pub struct Audit(pub DatabaseClient);

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A default-collation server carrying the `catalog` backup and a Czech CLR server.
pub fn servers() -> Vec<Arc<MemoryServer>> {
	vec![
		Arc::new(MemoryServer::new("primary").with_backup("catalog", [("sku:1", "chair"), ("sku:2", "desk")])),
		Arc::new(MemoryServer::new("czech").with_collation(CZECH).with_clr_enabled(true)),
	]
}

/// Builder with the memory driver, patchers for [`Orders`] and [`Audit`], and a default
/// template putting both tenants on one default-collation server.
pub fn builder(pool: MemoryServerPool) -> IslandBuilder {
	init_tracing();
	let mut builder = IslandBuilder::new();
	builder
		.add_component_pool(pool, MemoryDatabaseFactory::new())
		.expect("pool")
		.add_patcher::<Orders>(LambdaPatcher::<Orders, MemoryDatabase>::new(|_, database| Ok(Orders(DatabaseClient::new(database.clone())))))
		.expect("orders patcher")
		.add_patcher::<Audit>(LambdaPatcher::<Audit, MemoryDatabase>::new(|_, database| Ok(Audit(DatabaseClient::new(database.clone())))))
		.expect("audit patcher")
		.add_template(DEFAULT_TEMPLATE, |t| {
			t.add_component("main", MemoryServerSpec::new().with_collation(DEFAULT_COLLATION))
				.add_tenant("orders", "main", MemoryDatabaseSpec::new().with_data_source("catalog"))
				.add_tenant("audit", "main", MemoryDatabaseSpec::new().with_max_parallelism(1))
				.add_data_access::<Orders>("orders")
				.add_data_access::<Audit>("audit");
		})
		.expect("default template");
	builder
}

pub async fn started_island() -> (Island, Vec<Arc<MemoryServer>>) {
	let servers = servers();
	let island = builder(MemoryServerPool::new(servers.clone())).build().expect("island");
	island.initialize(&CancellationToken::new()).await.expect("initialize");
	(island, servers)
}

/// Service registrations the application would make against production databases.
pub fn production_services() -> ServiceRegistry {
	let mut services = ServiceRegistry::new();
	services.add_scoped(|_| {
		Err::<Orders, _>(ResolveError::Construction {
			key: DataAccessKey::of::<Orders>(),
			reason: "production orders database".into(),
		})
	});
	services.add_transient(|_| {
		Err::<Audit, _>(ResolveError::Construction {
			key: DataAccessKey::of::<Audit>(),
			reason: "production audit database".into(),
		})
	});
	services
}
