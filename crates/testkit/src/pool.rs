use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use isle_core::{AcquireError, AcquiredComponents, CancellationToken, ComponentPool, ComponentRequest, PoolError, async_trait};
use tracing::{debug, info};

use crate::server::{MemoryServer, MemoryServerSpec};

/// Pool of [`MemoryServer`]s.
///
/// A pool created with [`new`](Self::new) owns its servers: it refuses to hand them out
/// before [`initialize`](ComponentPool::initialize), and takes them offline with every
/// database dropped on [`dispose`](ComponentPool::dispose). An [`external`](Self::external)
/// pool wraps one server someone else runs and is usable immediately.
pub struct MemoryServerPool {
	servers: Vec<Arc<MemoryServer>>,
	managed: bool,
	started: AtomicBool,
	latency: Option<Duration>,
}

impl MemoryServerPool {
	pub fn new(servers: impl IntoIterator<Item = Arc<MemoryServer>>) -> Self {
		Self {
			servers: servers.into_iter().collect(),
			managed: true,
			started: AtomicBool::new(false),
			latency: None,
		}
	}

	/// Single, already running server whose lifetime the pool does not manage.
	pub fn external(server: Arc<MemoryServer>) -> Self {
		Self {
			servers: vec![server],
			managed: false,
			started: AtomicBool::new(true),
			latency: None,
		}
	}

	/// Delays every acquisition, observing cancellation while waiting.
	pub fn with_latency(mut self, latency: Duration) -> Self {
		self.latency = Some(latency);
		self
	}

	pub fn servers(&self) -> &[Arc<MemoryServer>] {
		&self.servers
	}

	fn unmet_reason(&self, spec: &MemoryServerSpec, candidates: &[usize]) -> String {
		if !candidates.is_empty() {
			return "every matching server is already assigned to another request of this batch".to_owned();
		}
		self.servers
			.iter()
			.find_map(|server| spec.check(server).err())
			.unwrap_or_else(|| "no running server is available".to_owned())
	}
}

#[async_trait]
impl ComponentPool for MemoryServerPool {
	type Spec = MemoryServerSpec;

	async fn initialize(&self, cancel: &CancellationToken) -> Result<(), PoolError> {
		if !self.managed {
			return Ok(());
		}
		if cancel.is_cancelled() {
			return Err(PoolError("server start cancelled".to_owned()));
		}
		for server in &self.servers {
			server.set_online(true);
		}
		self.started.store(true, Ordering::Release);
		info!(servers = self.servers.len(), "memory.pool.started");
		Ok(())
	}

	async fn acquire_components(&self, requests: &[ComponentRequest<MemoryServerSpec>], cancel: &CancellationToken) -> Result<AcquiredComponents<MemoryServer>, AcquireError> {
		if !self.started.load(Ordering::Acquire) {
			return Err(AcquireError::Unavailable(
				"memory servers are not running; call Island::initialize before materializing templates".to_owned(),
			));
		}
		if let Some(latency) = self.latency {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(AcquireError::Cancelled),
				_ = tokio::time::sleep(latency) => {}
			}
		}
		if cancel.is_cancelled() {
			return Err(AcquireError::Cancelled);
		}

		let candidates: Vec<Vec<usize>> = requests
			.iter()
			.map(|request| {
				let spec = &request.spec;
				self.servers
					.iter()
					.enumerate()
					.filter(|(_, server)| server.is_online() && spec.check(server).is_ok())
					.map(|(index, _)| index)
					.collect()
			})
			.collect();
		let assigned = assign(&candidates, self.servers.len());

		let mut unmet = Vec::new();
		let mut reasons: Vec<String> = Vec::new();
		for ((request, server), candidates) in requests.iter().zip(&assigned).zip(&candidates) {
			if server.is_none() {
				unmet.push(request.name.clone());
				let reason = self.unmet_reason(&request.spec, candidates);
				if !reasons.contains(&reason) {
					reasons.push(reason);
				}
			}
		}
		if !unmet.is_empty() {
			return Err(AcquireError::Unsatisfiable {
				unmet,
				reason: reasons.join(" "),
			});
		}

		let components: AcquiredComponents<MemoryServer> = requests
			.iter()
			.zip(assigned)
			.filter_map(|(request, server)| Some((request.name.clone(), Arc::clone(&self.servers[server?]))))
			.collect();
		debug!(requests = requests.len(), "memory.pool.acquired");
		Ok(components)
	}

	async fn dispose(&self) -> Result<(), PoolError> {
		if !self.managed {
			return Ok(());
		}
		self.started.store(false, Ordering::Release);
		let mut dropped = 0;
		for server in &self.servers {
			server.set_online(false);
			dropped += server.drop_all();
		}
		info!(servers = self.servers.len(), dropped, "memory.pool.stopped");
		Ok(())
	}
}

/// Maximum bipartite matching of requests to servers. `candidates[r]` lists the
/// servers request `r` accepts; the result holds the server chosen for each request.
fn assign(candidates: &[Vec<usize>], servers: usize) -> Vec<Option<usize>> {
	let mut owner: Vec<Option<usize>> = vec![None; servers];
	for request in 0..candidates.len() {
		let mut seen = vec![false; servers];
		augment(request, candidates, &mut owner, &mut seen);
	}
	let mut assigned = vec![None; candidates.len()];
	for (server, request) in owner.into_iter().enumerate() {
		if let Some(request) = request {
			assigned[request] = Some(server);
		}
	}
	assigned
}

fn augment(request: usize, candidates: &[Vec<usize>], owner: &mut [Option<usize>], seen: &mut [bool]) -> bool {
	for &server in &candidates[request] {
		if seen[server] {
			continue;
		}
		seen[server] = true;
		let current = owner[server];
		let free = match current {
			None => true,
			Some(other) => augment(other, candidates, owner, seen),
		};
		if free {
			owner[server] = Some(request);
			return true;
		}
	}
	false
}
