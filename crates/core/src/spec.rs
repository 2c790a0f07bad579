//! Specification traits and the type tags used to route erased values.
//!
//! A spec's associated type is its resource-kind identity. The dispatch layer reads it
//! once at registration time and never re-derives it per call.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Conditions a component must satisfy to be handed out by a pool.
///
/// Unspecified conditions are always satisfiable. Implementors are plain values with
/// consuming `with_*` builders.
pub trait ComponentSpec: fmt::Debug + Send + Sync + 'static {
	/// Component type described by this spec.
	type Component: Send + Sync + 'static;
}

/// Conditions a tenant must satisfy once created on a component.
pub trait TenantSpec: fmt::Debug + Send + Sync + 'static {
	/// Tenant type created from this spec.
	type Tenant: Send + Sync + 'static;
}

/// Identity of a Rust type, with its name kept for messages.
#[derive(Clone, Copy)]
pub struct TypeTag {
	id: TypeId,
	name: &'static str,
}

impl TypeTag {
	/// Tag of `T`.
	pub fn of<T: ?Sized + 'static>() -> Self {
		Self {
			id: TypeId::of::<T>(),
			name: type_name::<T>(),
		}
	}

	/// Fully qualified type name.
	pub const fn name(&self) -> &'static str {
		self.name
	}

	/// Last path segment of the type name.
	pub fn short_name(&self) -> &'static str {
		let base = self.name.split('<').next().unwrap_or(self.name);
		base.rsplit("::").next().unwrap_or(base)
	}
}

impl PartialEq for TypeTag {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.id.hash(state);
	}
}

impl PartialOrd for TypeTag {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for TypeTag {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.name.cmp(other.name).then_with(|| self.id.cmp(&other.id))
	}
}

impl fmt::Debug for TypeTag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name)
	}
}

impl fmt::Display for TypeTag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.short_name())
	}
}

macro_rules! type_key {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
		pub struct $name(TypeTag);

		impl $name {
			/// Key for type `T`.
			pub fn of<T: ?Sized + 'static>() -> Self {
				Self(TypeTag::of::<T>())
			}

			/// Underlying type tag.
			pub const fn tag(&self) -> TypeTag {
				self.0
			}

			/// Fully qualified type name.
			pub const fn name(&self) -> &'static str {
				self.0.name()
			}
		}

		impl fmt::Debug for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}({})", stringify!($name), self.0.name())
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				fmt::Display::fmt(&self.0, f)
			}
		}
	};
}

type_key! {
	/// Resource kind: the concrete component type a pool and factory are registered for.
	ComponentKind
}

type_key! {
	/// Consumer-facing data-access type that a patcher resolves to a tenant.
	DataAccessKey
}

/// Shared, type-erased value. Components, tenants and specs all travel in this form.
pub type Erased = Arc<dyn Any + Send + Sync>;

/// Type-erased spec keeping the allocation registered by the template.
#[derive(Clone)]
pub(crate) struct ErasedSpec {
	tag: TypeTag,
	value: Erased,
	debug: fn(&(dyn Any + Send + Sync), &mut fmt::Formatter<'_>) -> fmt::Result,
}

impl ErasedSpec {
	pub(crate) fn new<S: fmt::Debug + Send + Sync + 'static>(spec: Arc<S>) -> Self {
		Self {
			tag: TypeTag::of::<S>(),
			value: spec,
			debug: debug_as::<S>,
		}
	}

	pub(crate) fn tag(&self) -> TypeTag {
		self.tag
	}

	/// Recovers the typed spec. `None` when `S` is not the registered type.
	pub(crate) fn downcast<S: Send + Sync + 'static>(&self) -> Option<Arc<S>> {
		Arc::clone(&self.value).downcast::<S>().ok()
	}
}

impl fmt::Debug for ErasedSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		(self.debug)(self.value.as_ref(), f)
	}
}

fn debug_as<S: fmt::Debug + 'static>(value: &(dyn Any + Send + Sync), f: &mut fmt::Formatter<'_>) -> fmt::Result {
	match value.downcast_ref::<S>() {
		Some(spec) => spec.fmt(f),
		None => f.write_str("<spec>"),
	}
}

/// Address of the value behind an erased handle, ignoring vtable metadata.
pub(crate) fn erased_addr(value: &Erased) -> *const () {
	Arc::as_ptr(value) as *const ()
}
