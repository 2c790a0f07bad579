use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use isle_core::{
	AcquireError, AcquiredComponents, CancellationToken, ComponentPool, ComponentRequest, ComponentSpec, DataAccessKey, Island, IslandBuilder, PatchError,
	ServiceRegistry, TenantError, TenantFactory, TenantSpec, async_trait,
};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

#[derive(Debug)]
pub struct Shard;

#[derive(Debug, Default)]
pub struct ShardSpec;

impl ComponentSpec for ShardSpec {
	type Component = Shard;
}

#[derive(Debug)]
pub struct Keyspace(pub usize);

#[derive(Debug, Default)]
pub struct KeyspaceSpec {
	pub broken: bool,
}

impl TenantSpec for KeyspaceSpec {
	type Tenant = Keyspace;
}

pub struct ShardPool;

#[async_trait]
impl ComponentPool for ShardPool {
	type Spec = ShardSpec;

	async fn acquire_components(&self, requests: &[ComponentRequest<ShardSpec>], _cancel: &CancellationToken) -> Result<AcquiredComponents<Shard>, AcquireError> {
		Ok(requests.iter().map(|r| (r.name.clone(), Arc::new(Shard))).collect())
	}
}

#[derive(Default)]
pub struct KeyspaceFactory {
	next: AtomicUsize,
	pub live: Mutex<FxHashSet<usize>>,
}

/// Local wrapper so the foreign `TenantFactory` trait can be implemented for a shared factory.
pub struct SharedKeyspaceFactory(pub Arc<KeyspaceFactory>);

impl std::ops::Deref for SharedKeyspaceFactory {
	type Target = KeyspaceFactory;

	fn deref(&self) -> &KeyspaceFactory {
		&self.0
	}
}

#[async_trait]
impl TenantFactory for SharedKeyspaceFactory {
	type Component = Shard;
	type Spec = KeyspaceSpec;

	async fn add_tenant(&self, _component: &Shard, spec: &KeyspaceSpec) -> Result<Keyspace, TenantError> {
		if spec.broken {
			return Err(TenantError::ConfigurationMismatch("replication factor too high".into()));
		}
		let id = self.next.fetch_add(1, Ordering::SeqCst);
		self.live.lock().insert(id);
		Ok(Keyspace(id))
	}

	async fn remove_tenant(&self, _component: &Shard, tenant: &Keyspace) -> Result<bool, TenantError> {
		Ok(self.live.lock().remove(&tenant.0))
	}
}

/// Data-access types.
pub struct Users;
pub struct Sessions;

fn noop_patch(_key: DataAccessKey, _services: &mut ServiceRegistry) -> Result<(), PatchError> {
	Ok(())
}

/// Island with templates `pair` (two tenants) and `broken` (second tenant fails).
pub fn island(factory: &Arc<KeyspaceFactory>) -> Island {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
	let mut builder = IslandBuilder::new();
	builder
		.add_component_pool(ShardPool, SharedKeyspaceFactory(Arc::clone(factory)))
		.expect("pool")
		.add_patcher::<Sessions>(noop_patch)
		.expect("patcher")
		.add_template("pair", |t| {
			t.add_component("shard", ShardSpec)
				.add_tenant("users", "shard", KeyspaceSpec::default())
				.add_tenant("sessions", "shard", KeyspaceSpec::default())
				.add_data_access::<Users>("users")
				.add_data_access::<Sessions>("sessions");
		})
		.expect("pair")
		.add_template("broken", |t| {
			t.add_component("shard", ShardSpec)
				.add_tenant("users", "shard", KeyspaceSpec::default())
				.add_tenant("sessions", "shard", KeyspaceSpec { broken: true })
				.add_data_access::<Users>("users")
				.add_data_access::<Sessions>("sessions");
		})
		.expect("broken");
	builder.add_patcher::<Users>(noop_patch).expect("users patcher");
	builder.build().expect("island")
}
