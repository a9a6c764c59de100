//! Parameter types and identity management.
//!
//! A parameter is one bound runtime object inside an observed event: a role
//! (parameter type), an opaque identity supplied by the instrumentation, and
//! a liveness capability that reports whether the underlying host object is
//! still reachable. The engine only ever polls liveness; it never registers
//! finalizer callbacks and never extends the host object's lifetime.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

/// Dense identifier for a declared parameter type (role), assigned at
/// property load in declaration order.
///
/// Parameter types are interned to single-byte indices so sets of them fit
/// in one machine word; see [`crate::formalism::analysis::TypeSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamTypeId(u8);

impl ParamTypeId {
    /// Wraps a dense parameter-type index.
    #[must_use]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Returns the dense index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ParamTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Opaque identity of one runtime object, unique per (type, runtime
/// identity) for the duration of a monitoring session.
///
/// The instrumentation collaborator chooses the encoding (an address, a
/// handle table index, an interpreter object id); the engine only compares
/// for equality and ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamId(u64);

impl ParamId {
    /// Wraps a raw identity value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identity value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ParamId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Liveness capability for one bound runtime object.
///
/// Supplied by the instrumentation per bound value. Implementations must be
/// non-owning observers: holding the handle must never keep the host object
/// alive.
pub trait Liveness: Send + Sync {
    /// Returns true while the underlying host object is still reachable.
    fn is_alive(&self) -> bool;
}

/// A liveness handle for objects that never die within the session.
///
/// Useful for value-like parameters (interned strings, class objects) and
/// for tests that exercise slicing without garbage collection.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysLive;

impl Liveness for AlwaysLive {
    fn is_alive(&self) -> bool {
        true
    }
}

/// Liveness backed by a [`Weak`] reference to a host-managed allocation.
pub struct WeakLive<T: ?Sized + Send + Sync>(Weak<T>);

impl<T: ?Sized + Send + Sync> WeakLive<T> {
    /// Observes `target` without extending its lifetime.
    #[must_use]
    pub fn of(target: &Arc<T>) -> Self {
        Self(Arc::downgrade(target))
    }
}

impl<T: ?Sized + Send + Sync> Liveness for WeakLive<T> {
    fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

/// Explicit liveness flag for hosts that signal object death through a
/// destruction hook rather than a weak reference.
///
/// The instrumentation keeps the `Arc<LivenessFlag>` next to the object and
/// calls [`LivenessFlag::release`] from its destruction hook.
#[derive(Debug)]
pub struct LivenessFlag {
    alive: AtomicBool,
}

impl LivenessFlag {
    /// Creates a flag in the alive state.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            alive: AtomicBool::new(true),
        })
    }

    /// Marks the object dead. Idempotent.
    pub fn release(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

impl Liveness for LivenessFlag {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

/// One bound parameter: a typed runtime object identity plus its liveness
/// handle.
///
/// Equality, ordering, and hashing consider only `(ptype, id)` — the handle
/// is an observation channel, not part of the identity. The canonical order
/// used throughout the engine is by type first, then id.
#[derive(Clone)]
pub struct Param {
    ptype: ParamTypeId,
    id: ParamId,
    liveness: Arc<dyn Liveness>,
}

impl Param {
    /// Creates a parameter binding.
    #[must_use]
    pub fn new(ptype: ParamTypeId, id: ParamId, liveness: Arc<dyn Liveness>) -> Self {
        Self {
            ptype,
            id,
            liveness,
        }
    }

    /// Creates a parameter that is alive for the whole session.
    #[must_use]
    pub fn always_live(ptype: ParamTypeId, id: ParamId) -> Self {
        Self::new(ptype, id, Arc::new(AlwaysLive))
    }

    /// The parameter's type (role).
    #[must_use]
    pub const fn ptype(&self) -> ParamTypeId {
        self.ptype
    }

    /// The parameter's identity.
    #[must_use]
    pub const fn id(&self) -> ParamId {
        self.id
    }

    /// The liveness handle bound at registration.
    #[must_use]
    pub fn liveness(&self) -> &Arc<dyn Liveness> {
        &self.liveness
    }

    /// Polls the liveness handle.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.liveness.is_alive()
    }

    /// Returns a copy of this parameter carrying `handle` instead of its
    /// current liveness handle. Used by the index to canonicalize repeated
    /// sightings of one identity onto the first registered handle.
    #[must_use]
    pub fn with_liveness(&self, handle: Arc<dyn Liveness>) -> Self {
        Self {
            ptype: self.ptype,
            id: self.id,
            liveness: handle,
        }
    }
}

impl PartialEq for Param {
    fn eq(&self, other: &Self) -> bool {
        self.ptype == other.ptype && self.id == other.id
    }
}

impl Eq for Param {}

impl PartialOrd for Param {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Param {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.ptype, self.id).cmp(&(other.ptype, other.id))
    }
}

impl std::hash::Hash for Param {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ptype.hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("ptype", &self.ptype)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ptype, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_type_id_display() {
        assert_eq!(format!("{}", ParamTypeId::new(3)), "t3");
        assert_eq!(ParamTypeId::new(3).index(), 3);
    }

    #[test]
    fn param_id_roundtrip() {
        let id = ParamId::new(0xdead_beef);
        assert_eq!(id.raw(), 0xdead_beef);
        assert_eq!(ParamId::from(7).raw(), 7);
    }

    #[test]
    fn param_equality_ignores_liveness() {
        let a = Param::always_live(ParamTypeId::new(0), ParamId::new(1));
        let flag = LivenessFlag::new();
        let b = Param::new(ParamTypeId::new(0), ParamId::new(1), flag.clone());
        assert_eq!(a, b);
        flag.release();
        assert_eq!(a, b);
        assert!(!b.is_alive());
        assert!(a.is_alive());
    }

    #[test]
    fn param_canonical_order_by_type_then_id() {
        let t0_5 = Param::always_live(ParamTypeId::new(0), ParamId::new(5));
        let t0_9 = Param::always_live(ParamTypeId::new(0), ParamId::new(9));
        let t1_1 = Param::always_live(ParamTypeId::new(1), ParamId::new(1));
        let mut params = vec![t1_1.clone(), t0_9.clone(), t0_5.clone()];
        params.sort();
        assert_eq!(params, vec![t0_5, t0_9, t1_1]);
    }

    #[test]
    fn weak_live_tracks_host_drop() {
        let host = Arc::new(42u32);
        let handle = WeakLive::of(&host);
        assert!(handle.is_alive());
        drop(host);
        assert!(!handle.is_alive());
    }

    #[test]
    fn liveness_flag_release_is_idempotent() {
        let flag = LivenessFlag::new();
        assert!(flag.is_alive());
        flag.release();
        flag.release();
        assert!(!flag.is_alive());
    }

    #[test]
    fn param_display() {
        let p = Param::always_live(ParamTypeId::new(2), ParamId::new(17));
        assert_eq!(format!("{p}"), "t2:17");
    }
}
