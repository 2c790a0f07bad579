//! Recording pools and factories shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{AcquireError, PoolError, TenantError};
use crate::pool::{AcquiredComponents, ComponentPool, ComponentRequest, TenantFactory};
use crate::spec::{ComponentSpec, TenantSpec};

#[derive(Debug)]
pub struct Server {
	pub id: usize,
	pub collation: &'static str,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ServerSpec {
	pub collation: Option<&'static str>,
}

impl ServerSpec {
	pub fn with_collation(mut self, collation: &'static str) -> Self {
		self.collation = Some(collation);
		self
	}
}

impl ComponentSpec for ServerSpec {
	type Component = Server;
}

#[derive(Debug)]
pub struct Database {
	pub name: String,
	pub server: usize,
}

#[derive(Debug, Default)]
pub struct DatabaseSpec {
	pub fail: Option<TenantError>,
	pub delay_ms: u64,
}

impl DatabaseSpec {
	pub fn failing(error: TenantError) -> Self {
		Self {
			fail: Some(error),
			delay_ms: 0,
		}
	}
}

impl TenantSpec for DatabaseSpec {
	type Tenant = Database;
}

/// How a [`ServerPool`] misbehaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PoolMode {
	#[default]
	Honest,
	SharedInstance,
	DropFirst,
	Hang,
}

/// Greedy pool over a fixed set of servers.
#[derive(Default)]
pub struct ServerPool {
	pub servers: Vec<Arc<Server>>,
	pub mode: PoolMode,
	pub calls: AtomicUsize,
	pub initialized: AtomicUsize,
	pub disposed: AtomicUsize,
	pub batches: Mutex<Vec<Vec<String>>>,
	pub specs: Mutex<Vec<Arc<ServerSpec>>>,
	pub fail_lifecycle: bool,
}

impl ServerPool {
	pub fn with_collations(collations: &[&'static str]) -> Self {
		Self {
			servers: collations.iter().enumerate().map(|(id, collation)| Arc::new(Server { id, collation })).collect(),
			..Self::default()
		}
	}

	pub fn mode(mut self, mode: PoolMode) -> Self {
		self.mode = mode;
		self
	}
}

#[async_trait]
impl ComponentPool for Arc<ServerPool> {
	type Spec = ServerSpec;

	async fn initialize(&self, _cancel: &CancellationToken) -> Result<(), PoolError> {
		self.initialized.fetch_add(1, Ordering::SeqCst);
		if self.fail_lifecycle {
			return Err(PoolError("docker daemon not reachable".into()));
		}
		Ok(())
	}

	async fn acquire_components(&self, requests: &[ComponentRequest<ServerSpec>], cancel: &CancellationToken) -> Result<AcquiredComponents<Server>, AcquireError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.batches.lock().push(requests.iter().map(|r| r.name.clone()).collect());
		self.specs.lock().extend(requests.iter().map(|r| Arc::clone(&r.spec)));

		if self.mode == PoolMode::Hang {
			cancel.cancelled().await;
			return Err(AcquireError::Cancelled);
		}

		let mut taken = FxHashSet::default();
		let mut acquired = AcquiredComponents::default();
		let mut unmet = Vec::new();
		for request in requests {
			let candidate = self
				.servers
				.iter()
				.find(|server| !taken.contains(&server.id) && request.spec.collation.is_none_or(|c| c == server.collation));
			match candidate {
				Some(server) => {
					if self.mode != PoolMode::SharedInstance {
						taken.insert(server.id);
					}
					acquired.insert(request.name.clone(), Arc::clone(server));
				}
				None => unmet.push(request.name.clone()),
			}
		}
		if !unmet.is_empty() {
			return Err(AcquireError::Unsatisfiable {
				unmet,
				reason: "no server with the requested collation is free".into(),
			});
		}
		if self.mode == PoolMode::DropFirst
			&& let Some(first) = requests.first()
		{
			acquired.remove(&first.name);
		}
		Ok(acquired)
	}

	async fn dispose(&self) -> Result<(), PoolError> {
		self.disposed.fetch_add(1, Ordering::SeqCst);
		if self.fail_lifecycle {
			return Err(PoolError("container already removed".into()));
		}
		Ok(())
	}
}

/// Factory tracking live databases per server.
#[derive(Default)]
pub struct DatabaseFactory {
	pub next: AtomicUsize,
	pub live: Mutex<FxHashSet<String>>,
	pub spec_addrs: Mutex<Vec<usize>>,
	pub in_flight: AtomicUsize,
	pub peak: AtomicUsize,
	pub removal_gate: Option<Arc<Notify>>,
	pub fail_removal_of: Option<String>,
}

#[async_trait]
impl TenantFactory for Arc<DatabaseFactory> {
	type Component = Server;
	type Spec = DatabaseSpec;

	async fn add_tenant(&self, component: &Server, spec: &DatabaseSpec) -> Result<Database, TenantError> {
		self.spec_addrs.lock().push(spec as *const DatabaseSpec as usize);
		let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
		self.peak.fetch_max(now, Ordering::SeqCst);
		if spec.delay_ms > 0 {
			tokio::time::sleep(Duration::from_millis(spec.delay_ms)).await;
		}
		self.in_flight.fetch_sub(1, Ordering::SeqCst);

		if let Some(error) = &spec.fail {
			return Err(error.clone());
		}
		let name = format!("db_{}", self.next.fetch_add(1, Ordering::SeqCst));
		self.live.lock().insert(name.clone());
		Ok(Database { name, server: component.id })
	}

	async fn remove_tenant(&self, _component: &Server, tenant: &Database) -> Result<bool, TenantError> {
		if let Some(gate) = &self.removal_gate {
			gate.notified().await;
		}
		if self.fail_removal_of.as_deref() == Some(tenant.name.as_str()) {
			return Err(TenantError::Connection(format!("lost connection while dropping {}", tenant.name)));
		}
		Ok(self.live.lock().remove(&tenant.name))
	}
}

#[derive(Debug)]
pub struct Bucket(pub usize);

#[derive(Debug, Default)]
pub struct BucketSpec;

impl ComponentSpec for BucketSpec {
	type Component = Bucket;
}

#[derive(Debug)]
pub struct Prefix(pub String);

#[derive(Debug, Default)]
pub struct PrefixSpec;

impl TenantSpec for PrefixSpec {
	type Tenant = Prefix;
}

/// Pool producing a fresh bucket per request.
#[derive(Default)]
pub struct BucketPool {
	pub calls: AtomicUsize,
}

#[async_trait]
impl ComponentPool for Arc<BucketPool> {
	type Spec = BucketSpec;

	async fn acquire_components(&self, requests: &[ComponentRequest<BucketSpec>], _cancel: &CancellationToken) -> Result<AcquiredComponents<Bucket>, AcquireError> {
		let call = self.calls.fetch_add(1, Ordering::SeqCst);
		Ok(requests.iter().enumerate().map(|(i, r)| (r.name.clone(), Arc::new(Bucket(call * 100 + i)))).collect())
	}
}

pub struct PrefixFactory;

#[async_trait]
impl TenantFactory for PrefixFactory {
	type Component = Bucket;
	type Spec = PrefixSpec;

	async fn add_tenant(&self, component: &Bucket, _spec: &PrefixSpec) -> Result<Prefix, TenantError> {
		Ok(Prefix(format!("bucket-{}/", component.0)))
	}

	async fn remove_tenant(&self, _component: &Bucket, _tenant: &Prefix) -> Result<bool, TenantError> {
		Ok(true)
	}
}

/// Data-access markers.
pub struct Orders;
pub struct Invoices;
pub struct Files;
