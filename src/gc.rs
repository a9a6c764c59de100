//! Coenable-set garbage collection for Algorithm D.
//!
//! After a monitor consumes an event, the coenable analysis recorded for
//! that event says which parameter types any continuation toward a declared
//! category still requires. A combination whose bindings make every such
//! requirement unsatisfiable can never report again and its monitor is
//! removed. Failed monitors are exempt: failure is a terminal, cheaply
//! retained state.

use crate::combination::Combination;
use crate::error::InvariantError;
use crate::formalism::{EventId, Formalism};
use crate::index::MonitorIndex;
use crate::property::AlgorithmKind;

/// The per-session collector. Only Algorithm D collects; constructing one
/// for any other policy is an invariant violation.
#[derive(Debug)]
pub struct GarbageCollector {
    _priv: (),
}

impl GarbageCollector {
    /// Builds the collector for a session running `algorithm`.
    pub fn new(algorithm: AlgorithmKind) -> Result<Self, InvariantError> {
        if !algorithm.collects() {
            return Err(InvariantError::CollectorAlgorithm { algorithm });
        }
        Ok(Self { _priv: () })
    }

    /// Decides retention for one advanced combination, right after its
    /// monitor consumed `event`. Returns whether the monitor was removed.
    ///
    /// The monitor is kept when it has failed, or when some declared
    /// category has some coenable type-set under `event` in which every
    /// type is either unbound by the combination (satisfiable by a future
    /// parameter) or bound to a still-live one.
    pub fn sweep(
        &self,
        combination: &Combination,
        event: EventId,
        formalism: &Formalism,
        index: &mut MonitorIndex,
    ) -> Result<bool, InvariantError> {
        let Some(monitor) = index.monitor(combination) else {
            return Err(InvariantError::CollectUnmonitored {
                combination: combination.to_string(),
            });
        };
        if monitor.is_failed() {
            return Ok(false);
        }
        let coenable = formalism.coenable();
        for category in coenable.categories() {
            let entry = coenable.entry(category, event);
            for &required in &entry.type_sets {
                let satisfiable = required.iter().all(|ptype| {
                    combination
                        .param_for(ptype)
                        .map_or(true, |param| index.is_live(param))
                });
                if satisfiable {
                    return Ok(false);
                }
            }
        }
        index.remove(combination)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formalism::{CompiledAutomaton, TypeSet};
    use crate::param::{LivenessFlag, Param, ParamId, ParamTypeId};
    use crate::property::{AutomatonDef, NameTable};

    // s0 -e(0)-> s1 -f(1)-> s2, "done" on s2.
    fn formalism() -> Formalism {
        let events = NameTable::from_names(["e", "f"].into_iter());
        let def = AutomatonDef::new("s0")
            .state("s1")
            .state("s2")
            .transition("s0", "e", "s1")
            .transition("s1", "f", "s2")
            .category("done", ["s2"]);
        let signatures = vec![
            TypeSet::EMPTY.with(ParamTypeId::new(0)),
            TypeSet::EMPTY.with(ParamTypeId::new(1)),
        ];
        Formalism::Automaton(CompiledAutomaton::compile(&def, &events, &signatures).unwrap())
    }

    const E: EventId = EventId::new(0);
    const F: EventId = EventId::new(1);

    #[test]
    fn collector_rejects_non_collecting_algorithms() {
        for kind in [AlgorithmKind::B, AlgorithmKind::C, AlgorithmKind::CPlus] {
            let err = GarbageCollector::new(kind).unwrap_err();
            assert!(matches!(
                err,
                InvariantError::CollectorAlgorithm { algorithm } if algorithm == kind
            ));
        }
        assert!(GarbageCollector::new(AlgorithmKind::D).is_ok());
    }

    #[test]
    fn unbound_required_type_keeps_the_monitor() {
        let f = formalism();
        let gc = GarbageCollector::new(AlgorithmKind::D).unwrap();
        let mut index = MonitorIndex::new(false);
        let a = Combination::new(vec![Param::always_live(
            ParamTypeId::new(0),
            ParamId::new(1),
        )]);
        let mut monitor = f.fresh_monitor();
        f.transition(&mut monitor, E);
        index.register(a.clone(), monitor).unwrap();
        // The continuation needs type 1, which {a} does not bind yet.
        assert!(!gc.sweep(&a, E, &f, &mut index).unwrap());
        assert!(index.is_monitored(&a));
    }

    #[test]
    fn dead_required_binding_collects_the_monitor() {
        let f = formalism();
        let gc = GarbageCollector::new(AlgorithmKind::D).unwrap();
        let mut index = MonitorIndex::new(false);
        let flag = LivenessFlag::new();
        let ab = Combination::new(vec![
            Param::always_live(ParamTypeId::new(0), ParamId::new(1)),
            Param::new(ParamTypeId::new(1), ParamId::new(1), flag.clone()),
        ]);
        let mut monitor = f.fresh_monitor();
        f.transition(&mut monitor, E);
        index.register(ab.clone(), monitor).unwrap();

        // While b lives the continuation toward f stays satisfiable.
        assert!(!gc.sweep(&ab, E, &f, &mut index).unwrap());
        flag.release();
        assert!(gc.sweep(&ab, E, &f, &mut index).unwrap());
        assert!(!index.is_monitored(&ab));
        assert!(index.disable_time(&ab).is_some());
    }

    #[test]
    fn goal_reaching_monitor_is_collected_after_reporting() {
        let f = formalism();
        let gc = GarbageCollector::new(AlgorithmKind::D).unwrap();
        let mut index = MonitorIndex::new(false);
        let ab = Combination::new(vec![
            Param::always_live(ParamTypeId::new(0), ParamId::new(1)),
            Param::always_live(ParamTypeId::new(1), ParamId::new(1)),
        ]);
        let mut monitor = f.fresh_monitor();
        f.transition(&mut monitor, E);
        let raised = f.transition(&mut monitor, F);
        assert_eq!(raised.len(), 1);
        index.register(ab.clone(), monitor).unwrap();
        // Nothing can follow f toward the category again.
        assert!(gc.sweep(&ab, F, &f, &mut index).unwrap());
    }

    #[test]
    fn failed_monitor_is_never_collected() {
        let f = formalism();
        let gc = GarbageCollector::new(AlgorithmKind::D).unwrap();
        let mut index = MonitorIndex::new(false);
        let flag = LivenessFlag::new();
        let ab = Combination::new(vec![
            Param::always_live(ParamTypeId::new(0), ParamId::new(1)),
            Param::new(ParamTypeId::new(1), ParamId::new(1), flag.clone()),
        ]);
        let mut monitor = f.fresh_monitor();
        // f from the initial state has no transition: sticky failure.
        f.transition(&mut monitor, F);
        assert!(monitor.is_failed());
        index.register(ab.clone(), monitor).unwrap();
        flag.release();
        assert!(!gc.sweep(&ab, F, &f, &mut index).unwrap());
        assert!(index.is_monitored(&ab));
    }

    #[test]
    fn sweeping_an_unmonitored_combination_is_an_invariant_error() {
        let f = formalism();
        let gc = GarbageCollector::new(AlgorithmKind::D).unwrap();
        let mut index = MonitorIndex::new(false);
        let a = Combination::new(vec![Param::always_live(
            ParamTypeId::new(0),
            ParamId::new(1),
        )]);
        let err = gc.sweep(&a, E, &f, &mut index).unwrap_err();
        assert!(matches!(err, InvariantError::CollectUnmonitored { .. }));
    }
}
