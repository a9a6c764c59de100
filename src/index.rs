//! The monitor index: all per-combination state of one property session.
//!
//! One index owns every live monitor, the informativeness map (which
//! monitored supersets each sub-combination feeds), the liveness registry
//! with first-registration-wins handle interning, and the logical
//! create/disable timestamps Algorithm D's lineage check reads. All maps
//! are BTree-ordered so iteration, and therefore monitor processing order,
//! is reproducible run to run.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::combination::Combination;
use crate::error::InvariantError;
use crate::formalism::Monitor;
use crate::param::{Liveness, Param, ParamId, ParamTypeId};

/// Per-combination monitor storage and bookkeeping.
pub struct MonitorIndex {
    monitors: BTreeMap<Combination, Monitor>,
    /// Informativeness map: sub-combination to the monitored supersets it
    /// feeds. Entries survive the removal of the sub itself; supersets are
    /// stripped when their monitor is collected.
    edges: BTreeMap<Combination, BTreeSet<Combination>>,
    /// Canonical liveness handle per object identity, first sighting wins.
    liveness: HashMap<(ParamTypeId, ParamId), Arc<dyn Liveness>>,
    create_time: BTreeMap<Combination, u64>,
    disable_time: BTreeMap<Combination, u64>,
    clock: u64,
    slices: BTreeMap<Combination, Vec<String>>,
    record_slices: bool,
}

impl MonitorIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new(record_slices: bool) -> Self {
        Self {
            monitors: BTreeMap::new(),
            edges: BTreeMap::new(),
            liveness: HashMap::new(),
            create_time: BTreeMap::new(),
            disable_time: BTreeMap::new(),
            clock: 0,
            slices: BTreeMap::new(),
            record_slices,
        }
    }

    /// Number of live monitors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    /// Whether `combination` currently has a monitor.
    #[must_use]
    pub fn is_monitored(&self, combination: &Combination) -> bool {
        self.monitors.contains_key(combination)
    }

    /// The monitor for `combination`, if live.
    #[must_use]
    pub fn monitor(&self, combination: &Combination) -> Option<&Monitor> {
        self.monitors.get(combination)
    }

    /// Mutable access to the monitor for `combination`.
    pub fn monitor_mut(&mut self, combination: &Combination) -> Option<&mut Monitor> {
        self.monitors.get_mut(combination)
    }

    /// Registers a monitor for a combination and stamps its creation time.
    ///
    /// Registration is write-once per live combination: registering over an
    /// existing monitor is an invariant violation. Re-registering after
    /// collection is legal and stamps a fresh creation time.
    pub fn register(
        &mut self,
        combination: Combination,
        monitor: Monitor,
    ) -> Result<(), InvariantError> {
        if self.monitors.contains_key(&combination) {
            return Err(InvariantError::DuplicateMonitor {
                combination: combination.to_string(),
            });
        }
        let stamp = self.tick();
        self.create_time.insert(combination.clone(), stamp);
        self.monitors.insert(combination, monitor);
        Ok(())
    }

    /// Records that `sub`'s slice feeds the monitored combination `of`.
    pub fn add_edge(&mut self, sub: Combination, of: Combination) {
        debug_assert!(sub.is_strict_sub_of(&of), "edge must point to a strict superset");
        self.edges.entry(sub).or_default().insert(of);
    }

    /// The monitored supersets recorded for `sub`, in canonical order.
    pub fn supersets_of(&self, sub: &Combination) -> impl Iterator<Item = &Combination> {
        self.edges.get(sub).into_iter().flatten()
    }

    /// All monitored combinations, in canonical order.
    pub fn combinations(&self) -> impl Iterator<Item = &Combination> {
        self.monitors.keys()
    }

    /// Removes the monitor for `combination`, strips the combination from
    /// every strict sub-combination's edge set, and stamps its disable
    /// time. Edges from the combination itself survive: still-live
    /// supersets keep being fed.
    pub fn remove(&mut self, combination: &Combination) -> Result<Monitor, InvariantError> {
        let Some(monitor) = self.monitors.remove(combination) else {
            return Err(InvariantError::CollectUnmonitored {
                combination: combination.to_string(),
            });
        };
        for sub in combination.sub_combinations() {
            if let Some(supers) = self.edges.get_mut(&sub) {
                supers.remove(combination);
                if supers.is_empty() {
                    self.edges.remove(&sub);
                }
            }
        }
        let stamp = self.tick();
        self.disable_time.insert(combination.clone(), stamp);
        Ok(monitor)
    }

    /// Interns `param`'s liveness handle and returns the parameter carrying
    /// the canonical handle. The first handle registered for an identity
    /// wins; later sightings of the same object reuse it.
    #[must_use]
    pub fn intern(&mut self, param: &Param) -> Param {
        let canonical = self
            .liveness
            .entry((param.ptype(), param.id()))
            .or_insert_with(|| Arc::clone(param.liveness()));
        param.with_liveness(Arc::clone(canonical))
    }

    /// Polls liveness through the canonical handle for `param`'s identity,
    /// falling back to the handle `param` itself carries.
    #[must_use]
    pub fn is_live(&self, param: &Param) -> bool {
        match self.liveness.get(&(param.ptype(), param.id())) {
            Some(handle) => handle.is_alive(),
            None => param.is_alive(),
        }
    }

    /// Logical creation stamp of `combination`'s current or last monitor.
    #[must_use]
    pub fn create_time(&self, combination: &Combination) -> Option<u64> {
        self.create_time.get(combination).copied()
    }

    /// Logical stamp of `combination`'s last collection, if any.
    #[must_use]
    pub fn disable_time(&self, combination: &Combination) -> Option<u64> {
        self.disable_time.get(combination).copied()
    }

    /// Appends `event` to `combination`'s recorded slice when recording is
    /// enabled and the combination is monitored.
    pub fn record_event(&mut self, combination: &Combination, event: &str) {
        if !self.record_slices || !self.monitors.contains_key(combination) {
            return;
        }
        self.slices
            .entry(combination.clone())
            .or_default()
            .push(event.to_string());
    }

    /// Copies the recorded slice of a parent combination as the starting
    /// slice of a clone target. No-op unless recording is enabled.
    pub fn inherit_slice(&mut self, from: &Combination, to: &Combination) {
        if !self.record_slices {
            return;
        }
        if let Some(history) = self.slice(from).map(<[String]>::to_vec) {
            self.slices.insert(to.clone(), history);
        }
    }

    /// The recorded event-name slice for `combination`.
    #[must_use]
    pub fn slice(&self, combination: &Combination) -> Option<&[String]> {
        self.slices.get(combination).map(Vec::as_slice)
    }

    /// Every recorded slice in canonical combination order. Collected
    /// monitors keep their slice for post-mortem inspection.
    pub fn slices(&self) -> impl Iterator<Item = (&Combination, &[String])> {
        self.slices.iter().map(|(c, s)| (c, s.as_slice()))
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

impl std::fmt::Debug for MonitorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorIndex")
            .field("monitors", &self.monitors.len())
            .field("edges", &self.edges.len())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
