//! The engine: property lifecycle and per-property monitoring sessions.
//!
//! A [`WardenEngine`] owns one [`PropertySession`] per loaded property.
//! Loading validates and compiles the definition once; the enable and
//! coenable analyses are derived at that point and never recomputed.
//! Observation is synchronous: [`WardenEngine::observe`] fans an event out
//! on the caller's thread to every non-aborted session whose alphabet
//! declares it, and each session's `advance` runs as one critical section
//! over its monitor index.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::algo::{slicer_for, SliceCtx, Slicer};
use crate::combination::Combination;
use crate::dispatch::{verdict_channel, CategoryHandler, CategoryMatch, Dispatcher, VerdictStream};
use crate::error::{InvariantError, ValidationError, WardenError, WardenResult};
use crate::event::EventRecord;
use crate::formalism::{EventId, EventSet, Formalism, TypeSet};
use crate::gc::GarbageCollector;
use crate::index::MonitorIndex;
use crate::param::{Param, ParamTypeId};
use crate::property::{AlgorithmKind, NameTable, PropertyDef, PropertyId, SessionConfig};
use crate::stats::{SpecStats, StatsSnapshot};

/// The monitoring engine. One instance per monitored process is typical.
#[derive(Debug, Default)]
pub struct WardenEngine {
    properties: RwLock<HashMap<PropertyId, Arc<PropertySession>>>,
}

impl WardenEngine {
    /// Creates an engine with no properties loaded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates, compiles, and activates a property definition.
    ///
    /// Fatal only for this property: a failed load leaves every other
    /// loaded property running.
    pub fn load(&self, def: PropertyDef) -> WardenResult<PropertyId> {
        let id = PropertyId::new();
        let session = Arc::new(PropertySession::compile(id, def)?);
        self.properties
            .write()
            .map_err(|_| WardenError::internal("property table lock poisoned"))?
            .insert(id, session);
        Ok(id)
    }

    /// The session for a loaded property.
    pub fn session(&self, id: PropertyId) -> WardenResult<Arc<PropertySession>> {
        self.properties
            .read()
            .map_err(|_| WardenError::internal("property table lock poisoned"))?
            .get(&id)
            .cloned()
            .ok_or_else(|| WardenError::PropertyNotFound { id: id.to_string() })
    }

    /// Unloads a property, dropping its monitors.
    ///
    /// Sessions still held by callers keep answering until released, but
    /// no longer receive fanned-out events.
    pub fn unload(&self, id: PropertyId) -> WardenResult<()> {
        self.properties
            .write()
            .map_err(|_| WardenError::internal("property table lock poisoned"))?
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| WardenError::PropertyNotFound { id: id.to_string() })
    }

    /// Fans one observed event out to every non-aborted session whose
    /// alphabet declares it. Fire-and-forget: rejected events are logged
    /// at debug level, invariant violations abort only their own session.
    pub fn observe(&self, record: &EventRecord) {
        let sessions: Vec<Arc<PropertySession>> = {
            let Ok(table) = self.properties.read() else {
                tracing::error!("property table lock poisoned; dropping event");
                return;
            };
            table
                .values()
                .filter(|s| s.declares(record.name()) && !s.is_aborted())
                .cloned()
                .collect()
        };
        for session in sessions {
            match session.advance(record) {
                Ok(()) => {}
                Err(err) if err.is_validation() => {
                    tracing::debug!(
                        property = %session.name(),
                        error = %err,
                        "event rejected"
                    );
                }
                // Invariant violations were already logged loudly by the
                // session; aborts raced with the filter above.
                Err(_) => {}
            }
        }
    }

    /// Stats snapshots for every loaded property, sorted by name.
    pub fn snapshots(&self) -> WardenResult<Vec<StatsSnapshot>> {
        let table = self
            .properties
            .read()
            .map_err(|_| WardenError::internal("property table lock poisoned"))?;
        let mut out: Vec<StatsSnapshot> = table.values().map(|s| s.snapshot()).collect();
        out.sort_by(|a, b| a.property.cmp(&b.property));
        Ok(out)
    }
}

/// Interior state guarded by the session lock.
struct SessionState {
    index: MonitorIndex,
    dispatcher: Dispatcher,
    aborted: Option<String>,
}

/// One property's monitoring session.
///
/// All slicing state lives behind one mutex; `advance` holds it for the
/// whole lookup, creation, transition, dispatch, and collection sequence,
/// so concurrent observers interleave at event granularity.
pub struct PropertySession {
    id: PropertyId,
    name: String,
    algorithm: AlgorithmKind,
    config: SessionConfig,
    events: NameTable,
    param_types: NameTable,
    signatures: Vec<TypeSet>,
    formalism: Formalism,
    slicer: Box<dyn Slicer>,
    collector: Option<GarbageCollector>,
    stats: Arc<SpecStats>,
    state: Mutex<SessionState>,
}

impl PropertySession {
    fn compile(id: PropertyId, def: PropertyDef) -> WardenResult<Self> {
        def.validate()?;
        let events = NameTable::from_names(def.events.iter().map(|e| e.name.as_str()));
        let param_types = NameTable::from_names(def.param_types.iter().map(String::as_str));
        let signatures: Vec<TypeSet> = def
            .events
            .iter()
            .map(|event| {
                event.params.iter().fold(TypeSet::EMPTY, |acc, p| {
                    // Validation resolved every reference and capped the
                    // table at 64 entries.
                    match param_types.get(p) {
                        Some(raw) => acc.with(ParamTypeId::new(raw as u8)),
                        None => acc,
                    }
                })
            })
            .collect();
        let creation = def
            .creation_events
            .iter()
            .filter_map(|name| events.get(name))
            .fold(EventSet::EMPTY, |acc, raw| acc.with(EventId::new(raw)));

        let formalism = Formalism::compile(&def, &events, &signatures)?;
        let collector = if def.algorithm.collects() {
            Some(GarbageCollector::new(def.algorithm)?)
        } else {
            None
        };
        Ok(Self {
            id,
            name: def.name,
            algorithm: def.algorithm,
            config: def.config,
            events,
            param_types,
            signatures,
            formalism,
            slicer: slicer_for(def.algorithm, creation),
            collector,
            stats: Arc::new(SpecStats::default()),
            state: Mutex::new(SessionState {
                index: MonitorIndex::new(def.config.record_slices),
                dispatcher: Dispatcher::default(),
                aborted: None,
            }),
        })
    }

    /// The engine-assigned property id.
    #[must_use]
    pub const fn id(&self) -> PropertyId {
        self.id
    }

    /// The property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The algorithm this session runs.
    #[must_use]
    pub const fn algorithm(&self) -> AlgorithmKind {
        self.algorithm
    }

    /// Whether the alphabet declares `event`.
    #[must_use]
    pub fn declares(&self, event: &str) -> bool {
        self.events.get(event).is_some()
    }

    /// Whether an invariant violation has shut this session down.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.state
            .lock()
            .map_or(true, |state| state.aborted.is_some())
    }

    /// Live counters for this session.
    #[must_use]
    pub fn stats(&self) -> &SpecStats {
        &self.stats
    }

    /// A serializable snapshot of this session's counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot(&self.name)
    }

    /// Registers a handler for one category name. `fail` subscribes to the
    /// implicit failure verdict.
    pub fn on_category(
        &self,
        category: impl Into<String>,
        handler: Box<dyn CategoryHandler>,
    ) -> WardenResult<()> {
        let mut state = self.lock_state()?;
        state.dispatcher.register(category, handler);
        Ok(())
    }

    /// Registers a handler receiving every matched category.
    pub fn on_any(&self, handler: Box<dyn CategoryHandler>) -> WardenResult<()> {
        let mut state = self.lock_state()?;
        state.dispatcher.register_all(handler);
        Ok(())
    }

    /// Subscribes a bounded stream to every matched category.
    pub fn subscribe(&self, capacity: usize) -> WardenResult<VerdictStream> {
        let (handler, stream) = verdict_channel(capacity, Arc::clone(&self.stats));
        self.on_any(handler)?;
        Ok(stream)
    }

    /// Subscribes a bounded stream to one category.
    pub fn subscribe_category(
        &self,
        category: impl Into<String>,
        capacity: usize,
    ) -> WardenResult<VerdictStream> {
        let (handler, stream) = verdict_channel(capacity, Arc::clone(&self.stats));
        self.on_category(category, handler)?;
        Ok(stream)
    }

    /// Number of live monitors.
    #[must_use]
    pub fn live_monitors(&self) -> usize {
        self.lock_state().map_or(0, |state| state.index.len())
    }

    /// Every currently monitored combination, in canonical order.
    #[must_use]
    pub fn monitored_combinations(&self) -> Vec<Combination> {
        self.lock_state()
            .map_or_else(|_| Vec::new(), |state| state.index.combinations().cloned().collect())
    }

    /// Monitored combinations strictly more informative than `sub`, in
    /// canonical order.
    #[must_use]
    pub fn informative_supersets(&self, sub: &Combination) -> Vec<Combination> {
        self.lock_state().map_or_else(
            |_| Vec::new(),
            |state| state.index.supersets_of(sub).cloned().collect(),
        )
    }

    /// Recorded event-name slices, in canonical combination order. Empty
    /// unless [`SessionConfig::record_slices`] was set.
    #[must_use]
    pub fn recorded_slices(&self) -> Vec<(Combination, Vec<String>)> {
        self.lock_state().map_or_else(
            |_| Vec::new(),
            |state| {
                state
                    .index
                    .slices()
                    .map(|(c, s)| (c.clone(), s.to_vec()))
                    .collect()
            },
        )
    }

    /// Delivers one observed event to this property.
    ///
    /// Runs the full slicing sequence as one critical section: name
    /// resolution, canonicalization, monitor creation and cloning,
    /// transitions, dispatch, and collection under Algorithm D. Validation
    /// errors reject the event and leave the session healthy; invariant
    /// violations abort the session permanently.
    pub fn advance(&self, record: &EventRecord) -> WardenResult<()> {
        let mut state = self.lock_state()?;
        if let Some(reason) = &state.aborted {
            return Err(WardenError::SessionAborted {
                property: self.name.clone(),
                reason: reason.clone(),
            });
        }

        let event = self.resolve_event(record)?;
        let combination = self.resolve_combination(record, event, &mut state.index)?;
        self.stats.record_event();

        let fed = {
            let mut ctx = SliceCtx {
                index: &mut state.index,
                formalism: &self.formalism,
                stats: &self.stats,
            };
            match self.slicer.advance(event, &combination, &mut ctx) {
                Ok(fed) => fed,
                Err(violation) => return Err(self.abort(&mut state, violation)),
            }
        };

        for target in &fed {
            if self.config.record_slices {
                state.index.record_event(target, record.name());
            }
            // Fed combinations stay monitored: a sweep removes only its
            // own target, which never reappears later in the list.
            let Some(monitor) = state.index.monitor_mut(target) else {
                continue;
            };
            let raised = self.formalism.transition(monitor, event);
            for &category in raised {
                self.stats.record_category_matched();
                if !state.dispatcher.is_empty() {
                    let matched = CategoryMatch {
                        property: self.name.clone(),
                        category: self.formalism.category_name(category).to_string(),
                        combination: target.clone(),
                        observed_at: record.timestamp(),
                        location: record.location().cloned(),
                    };
                    state.dispatcher.dispatch(&matched, &self.stats);
                }
            }
            if let Some(collector) = &self.collector {
                match collector.sweep(target, event, &self.formalism, &mut state.index) {
                    Ok(true) => self.stats.record_monitor_collected(),
                    Ok(false) => {}
                    Err(violation) => return Err(self.abort(&mut state, violation)),
                }
            }
        }
        Ok(())
    }

    fn lock_state(&self) -> WardenResult<std::sync::MutexGuard<'_, SessionState>> {
        self.state
            .lock()
            .map_err(|_| WardenError::internal("session state lock poisoned"))
    }

    fn abort(&self, state: &mut SessionState, violation: InvariantError) -> WardenError {
        tracing::error!(
            property = %self.name,
            error = %violation,
            "invariant violated; aborting session"
        );
        state.aborted = Some(violation.to_string());
        WardenError::Invariant(violation)
    }

    fn resolve_event(&self, record: &EventRecord) -> WardenResult<EventId> {
        self.events
            .get(record.name())
            .map(EventId::new)
            .ok_or_else(|| {
                ValidationError::UndeclaredEvent {
                    event: record.name().to_string(),
                    property: self.name.clone(),
                }
                .into()
            })
    }

    fn resolve_combination(
        &self,
        record: &EventRecord,
        event: EventId,
        index: &mut MonitorIndex,
    ) -> WardenResult<Combination> {
        let signature = self.signatures[event.index()];
        let mut observed = TypeSet::EMPTY;
        let mut params = Vec::with_capacity(record.bindings().len());
        for binding in record.bindings() {
            let Some(raw) = self.param_types.get(binding.ptype()) else {
                return Err(ValidationError::UndeclaredParamType {
                    event: record.name().to_string(),
                    param_type: binding.ptype().to_string(),
                }
                .into());
            };
            let ptype = ParamTypeId::new(raw as u8);
            if !signature.contains(ptype) {
                return Err(ValidationError::SignatureMismatch {
                    event: record.name().to_string(),
                    param_type: binding.ptype().to_string(),
                }
                .into());
            }
            observed = observed.with(ptype);
            let param = Param::new(ptype, binding.id(), Arc::clone(binding.liveness()));
            params.push(index.intern(&param));
        }
        if observed != signature {
            let missing = signature
                .iter()
                .find(|t| !observed.contains(*t))
                .map_or_else(String::new, |t| {
                    self.param_types.name(t.index() as u32).to_string()
                });
            return Err(ValidationError::SignatureMismatch {
                event: record.name().to_string(),
                param_type: missing,
            }
            .into());
        }
        Combination::canonicalize(params).map_err(|ptype| {
            ValidationError::ConflictingBinding {
                event: record.name().to_string(),
                param_type: self.param_types.name(ptype.index() as u32).to_string(),
            }
            .into()
        })
    }
}

impl std::fmt::Debug for PropertySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertySession")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ParamBinding;
    use crate::property::AutomatonDef;

    fn hasnext_def(algorithm: AlgorithmKind) -> PropertyDef {
        PropertyDef::builder("HasNext")
            .param_type("i")
            .event("hasnext", ["i"])
            .event("next", ["i"])
            .creation("hasnext")
            .automaton(
                AutomatonDef::new("unsafe")
                    .state("safe")
                    .transition("unsafe", "hasnext", "safe")
                    .transition("safe", "hasnext", "safe")
                    .transition("safe", "next", "unsafe")
                    .category("unsafe_next", ["unsafe"]),
            )
            .algorithm(algorithm)
            .build()
            .unwrap()
    }

    fn ev(name: &str, iter: u64) -> EventRecord {
        EventRecord::new(
            name,
            vec![ParamBinding::always_live("i", crate::param::ParamId::new(iter))],
        )
    }

    #[test]
    fn load_observe_and_match() {
        let engine = WardenEngine::new();
        let id = engine.load(hasnext_def(AlgorithmKind::C)).unwrap();
        let session = engine.session(id).unwrap();
        let stream = session.subscribe_category("unsafe_next", 16).unwrap();

        engine.observe(&ev("hasnext", 1));
        // Consuming next re-enters the unsafe state, which reports.
        engine.observe(&ev("next", 1));
        engine.observe(&ev("hasnext", 2));

        let matched = stream.try_recv().unwrap();
        assert_eq!(matched.property, "HasNext");
        assert_eq!(matched.category, "unsafe_next");
        assert_eq!(session.stats().events_processed(), 3);
        assert!(session.stats().categories_matched() >= 1);
    }

    #[test]
    fn invalid_definition_is_rejected_at_load() {
        let engine = WardenEngine::new();
        let mut def = hasnext_def(AlgorithmKind::C);
        def.creation_events = vec!["nope".to_string()];
        let err = engine.load(def).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn unknown_property_id_is_reported() {
        let engine = WardenEngine::new();
        let err = engine.session(PropertyId::new()).unwrap_err();
        assert!(matches!(err, WardenError::PropertyNotFound { .. }));
        let err = engine.unload(PropertyId::new()).unwrap_err();
        assert!(matches!(err, WardenError::PropertyNotFound { .. }));
    }

    #[test]
    fn unload_stops_fanout() {
        let engine = WardenEngine::new();
        let id = engine.load(hasnext_def(AlgorithmKind::C)).unwrap();
        let session = engine.session(id).unwrap();
        engine.observe(&ev("hasnext", 1));
        engine.unload(id).unwrap();
        engine.observe(&ev("hasnext", 1));
        assert_eq!(session.stats().events_processed(), 1);
    }

    #[test]
    fn undeclared_event_is_validation_not_fatal() {
        let engine = WardenEngine::new();
        let id = engine.load(hasnext_def(AlgorithmKind::C)).unwrap();
        let session = engine.session(id).unwrap();
        let err = session.advance(&ev("bogus", 1)).unwrap_err();
        assert!(err.is_validation());
        // The session keeps accepting declared events.
        session.advance(&ev("hasnext", 1)).unwrap();
        assert_eq!(session.stats().events_processed(), 1);
    }

    #[test]
    fn signature_mismatch_both_directions() {
        let engine = WardenEngine::new();
        let id = engine.load(hasnext_def(AlgorithmKind::C)).unwrap();
        let session = engine.session(id).unwrap();

        // Missing required binding.
        let err = session
            .advance(&EventRecord::new("hasnext", Vec::new()))
            .unwrap_err();
        assert!(matches!(
            err,
            WardenError::Validation(ValidationError::SignatureMismatch { .. })
        ));

        // Unknown parameter type name.
        let bad = EventRecord::new(
            "hasnext",
            vec![ParamBinding::always_live("lock", crate::param::ParamId::new(1))],
        );
        let err = session.advance(&bad).unwrap_err();
        assert!(matches!(
            err,
            WardenError::Validation(ValidationError::UndeclaredParamType { .. })
        ));
    }

    #[test]
    fn conflicting_binding_is_rejected() {
        let engine = WardenEngine::new();
        let id = engine.load(hasnext_def(AlgorithmKind::C)).unwrap();
        let session = engine.session(id).unwrap();
        let record = EventRecord::new(
            "hasnext",
            vec![
                ParamBinding::always_live("i", crate::param::ParamId::new(1)),
                ParamBinding::always_live("i", crate::param::ParamId::new(2)),
            ],
        );
        let err = session.advance(&record).unwrap_err();
        assert!(matches!(
            err,
            WardenError::Validation(ValidationError::ConflictingBinding { .. })
        ));
    }

    #[test]
    fn aborted_session_rejects_further_events() {
        let engine = WardenEngine::new();
        let id = engine.load(hasnext_def(AlgorithmKind::D)).unwrap();
        let session = engine.session(id).unwrap();
        session.lock_state().unwrap().aborted = Some("duplicate monitor".to_string());
        assert!(session.is_aborted());
        let err = session.advance(&ev("hasnext", 1)).unwrap_err();
        assert!(matches!(err, WardenError::SessionAborted { .. }));
        assert_eq!(session.stats().events_processed(), 0);
    }

    #[test]
    fn snapshots_are_sorted_by_property_name() {
        let engine = WardenEngine::new();
        let mut zeta = hasnext_def(AlgorithmKind::C);
        zeta.name = "zeta".to_string();
        let mut alpha = hasnext_def(AlgorithmKind::C);
        alpha.name = "alpha".to_string();
        engine.load(zeta).unwrap();
        engine.load(alpha).unwrap();
        let snaps = engine.snapshots().unwrap();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].property, "alpha");
        assert_eq!(snaps[1].property, "zeta");
    }
}
