//! Monitor-management algorithms.
//!
//! A [`Slicer`] decides, for one observed event carrying one canonical
//! combination, which monitors must exist and which must be fed. All
//! monitor bookkeeping lives in the [`MonitorIndex`]; slicers are stateless
//! policy values, so one advance call is a pure function of the index
//! contents plus the compiled property.
//!
//! The variants form a ladder. `B` keeps one fresh monitor per exact
//! combination ever seen. `C` clones the most informative monitored
//! ancestor and maintains the informativeness map. `C+` gates ex-nihilo
//! creation on declared creation events. `D` adds enable-set guided eager
//! creation, timestamp lineage validation on every clone, and works with
//! the garbage collector.

mod b;
mod c;
mod d;

pub(crate) use b::AlgorithmB;
pub(crate) use c::AlgorithmC;
pub(crate) use d::AlgorithmD;

use crate::combination::Combination;
use crate::error::InvariantError;
use crate::formalism::{EventId, EventSet, Formalism, TypeSet};
use crate::index::MonitorIndex;
use crate::property::AlgorithmKind;
use crate::stats::SpecStats;

/// Everything an algorithm may touch during one advance call.
pub(crate) struct SliceCtx<'a> {
    /// Monitor storage for the session, mutated in place.
    pub index: &'a mut MonitorIndex,
    /// The compiled property the monitors run against.
    pub formalism: &'a Formalism,
    /// Session counters, bumped fire-and-forget.
    pub stats: &'a SpecStats,
}

/// One monitor-management policy.
///
/// `advance` brings the index up to date for `combination` under `event`
/// and returns every combination whose monitor must now consume the event:
/// the combination itself first when it carries a monitor, then its
/// registered more-informative combinations, ordered by size and canonical
/// order, deduplicated.
pub(crate) trait Slicer: Send + Sync {
    /// The policy this slicer implements.
    fn kind(&self) -> AlgorithmKind;

    /// Updates monitor existence for one observed combination and returns
    /// the feed list.
    fn advance(
        &self,
        event: EventId,
        combination: &Combination,
        ctx: &mut SliceCtx<'_>,
    ) -> Result<Vec<Combination>, InvariantError>;
}

/// Builds the slicer for an algorithm choice.
pub(crate) fn slicer_for(kind: AlgorithmKind, creation: EventSet) -> Box<dyn Slicer> {
    match kind {
        AlgorithmKind::B => Box::new(AlgorithmB),
        AlgorithmKind::C => Box::new(AlgorithmC::unrestricted()),
        AlgorithmKind::CPlus => Box::new(AlgorithmC::creation_gated(creation)),
        AlgorithmKind::D => Box::new(AlgorithmD::new(creation)),
    }
}

/// The set of parameter types a combination binds.
pub(crate) fn bound_types(combination: &Combination) -> TypeSet {
    combination
        .params()
        .iter()
        .fold(TypeSet::EMPTY, |acc, p| acc.with(p.ptype()))
}

/// The most informative monitored ancestor of `combination`, scanning
/// proper sub-combinations in decreasing size order with canonical
/// tie-break. The first hit wins; this order is relied upon by the clone
/// policies and pinned by tests.
pub(crate) fn monitored_ancestor(
    combination: &Combination,
    index: &MonitorIndex,
) -> Option<Combination> {
    combination
        .sub_combinations()
        .into_iter()
        .find(|sub| index.is_monitored(sub))
}

/// Registers a fresh monitor for `combination` and its informativeness
/// edges.
pub(crate) fn define_new(
    combination: &Combination,
    ctx: &mut SliceCtx<'_>,
) -> Result<(), InvariantError> {
    ctx.index
        .register(combination.clone(), ctx.formalism.fresh_monitor())?;
    register_edges(combination, ctx.index);
    ctx.stats.record_monitor_created();
    Ok(())
}

/// Clones `source`'s monitor into `target`, registering the target's
/// informativeness edges and inheriting its recorded slice.
///
/// With `validate_lineage` set the clone is refused (no-op, `Ok(false)`)
/// when timestamps show the target's lineage was invalidated by an
/// intervening collection or by an older sibling monitor outside the
/// source's ancestry.
pub(crate) fn define_to(
    target: &Combination,
    source: &Combination,
    ctx: &mut SliceCtx<'_>,
    validate_lineage: bool,
) -> Result<bool, InvariantError> {
    if validate_lineage && !lineage_ok(target, source, ctx.index) {
        return Ok(false);
    }
    // Sources come from monitored scans inside the same critical section.
    let Some(monitor) = ctx.index.monitor(source).cloned() else {
        return Ok(false);
    };
    ctx.index.inherit_slice(source, target);
    ctx.index.register(target.clone(), monitor)?;
    register_edges(target, ctx.index);
    ctx.stats.record_monitor_created();
    Ok(true)
}

/// Records the new monitored combination in the edge set of every proper
/// sub-combination.
pub(crate) fn register_edges(combination: &Combination, index: &mut MonitorIndex) {
    for sub in combination.sub_combinations() {
        index.add_edge(sub, combination.clone());
    }
}

/// Timestamp lineage validation for clones.
///
/// A clone of `source` into `target` is legal unless some proper
/// sub-combination of `target` outside `source`'s own ancestry either was
/// collected after `source`'s monitor came to be, or currently carries a
/// monitor older than `source`'s. Either condition means events belonging
/// to `target`'s slice were consumed by a monitor whose knowledge `source`
/// does not carry.
pub(crate) fn lineage_ok(
    target: &Combination,
    source: &Combination,
    index: &MonitorIndex,
) -> bool {
    let Some(source_created) = index.create_time(source) else {
        return false;
    };
    for sub in target.sub_combinations() {
        if sub.is_sub_of(source) {
            continue;
        }
        if index.disable_time(&sub).is_some_and(|d| d > source_created) {
            return false;
        }
        if index.is_monitored(&sub)
            && index.create_time(&sub).is_some_and(|c| c < source_created)
        {
            return false;
        }
    }
    true
}

/// The compatible-combination cascade run after a combination is first
/// sighted.
///
/// For every proper sub-combination of `origin`, every combination in its
/// informativeness set compatible with `origin` contributes a join; joins
/// with no monitor yet are cloned from the compatible combination, which
/// registers their own edges in turn.
pub(crate) fn cascade(
    origin: &Combination,
    ctx: &mut SliceCtx<'_>,
    validate_lineage: bool,
) -> Result<(), InvariantError> {
    for sub in origin.sub_combinations() {
        let candidates: Vec<Combination> = ctx.index.supersets_of(&sub).cloned().collect();
        for candidate in candidates {
            if !candidate.is_compatible(origin) {
                continue;
            }
            let Some(join) = candidate.join(origin) else {
                continue;
            };
            if ctx.index.is_monitored(&join) {
                continue;
            }
            define_to(&join, &candidate, ctx, validate_lineage)?;
        }
    }
    Ok(())
}

/// The feed list for an advanced combination: itself when monitored, then
/// its informativeness set, by size then canonical order.
pub(crate) fn feed_list(combination: &Combination, index: &MonitorIndex) -> Vec<Combination> {
    let mut out = Vec::new();
    if index.is_monitored(combination) {
        out.push(combination.clone());
    }
    out.extend(index.supersets_of(combination).cloned());
    out.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::{Param, ParamId, ParamTypeId};
    use crate::property::{AutomatonDef, NameTable};
    use crate::formalism::CompiledAutomaton;

    fn formalism() -> Formalism {
        let events = NameTable::from_names(["e"].into_iter());
        let def = AutomatonDef::new("s0").transition("s0", "e", "s0");
        Formalism::Automaton(
            CompiledAutomaton::compile(&def, &events, &[TypeSet::EMPTY]).unwrap(),
        )
    }

    fn combo(parts: &[(u8, u64)]) -> Combination {
        Combination::new(
            parts
                .iter()
                .map(|&(t, id)| Param::always_live(ParamTypeId::new(t), ParamId::new(id)))
                .collect(),
        )
    }

    #[test]
    fn lineage_refuses_sub_collected_after_source_creation() {
        let f = formalism();
        let mut index = MonitorIndex::new(false);
        let a = combo(&[(0, 1)]);
        let b = combo(&[(1, 1)]);
        let ab = combo(&[(0, 1), (1, 1)]);
        index.register(a.clone(), f.fresh_monitor()).unwrap();
        index.register(b.clone(), f.fresh_monitor()).unwrap();
        index.remove(&b).unwrap();
        // b was collected after a's monitor existed.
        assert!(!lineage_ok(&ab, &a, &index));
    }

    #[test]
    fn lineage_allows_collection_predating_source() {
        let f = formalism();
        let mut index = MonitorIndex::new(false);
        let a = combo(&[(0, 1)]);
        let b = combo(&[(1, 1)]);
        let ab = combo(&[(0, 1), (1, 1)]);
        index.register(b.clone(), f.fresh_monitor()).unwrap();
        index.remove(&b).unwrap();
        index.register(a.clone(), f.fresh_monitor()).unwrap();
        // The collection happened before a's monitor came to be.
        assert!(lineage_ok(&ab, &a, &index));
    }

    #[test]
    fn lineage_refuses_older_sibling_monitor() {
        let f = formalism();
        let mut index = MonitorIndex::new(false);
        let a = combo(&[(0, 1)]);
        let b = combo(&[(1, 1)]);
        let ab = combo(&[(0, 1), (1, 1)]);
        index.register(b.clone(), f.fresh_monitor()).unwrap();
        index.register(a.clone(), f.fresh_monitor()).unwrap();
        // b's monitor predates a's, so a cannot seed {a, b}; cloning from
        // b instead is legal.
        assert!(!lineage_ok(&ab, &a, &index));
        assert!(lineage_ok(&ab, &b, &index));
    }

    #[test]
    fn feed_list_orders_by_size_then_canonical() {
        let f = formalism();
        let mut index = MonitorIndex::new(false);
        let a = combo(&[(0, 1)]);
        let ab = combo(&[(0, 1), (1, 1)]);
        let ac = combo(&[(0, 1), (1, 2)]);
        let abc = combo(&[(0, 1), (1, 1), (2, 1)]);
        for c in [&a, &abc, &ac, &ab] {
            index.register((*c).clone(), f.fresh_monitor()).unwrap();
            register_edges(c, &mut index);
        }
        let fed = feed_list(&a, &index);
        assert_eq!(fed, vec![a, ab, ac, abc]);
    }

    #[test]
    fn ancestor_scan_prefers_larger_then_canonical() {
        let f = formalism();
        let mut index = MonitorIndex::new(false);
        let abc = combo(&[(0, 1), (1, 1), (2, 1)]);
        let ab = combo(&[(0, 1), (1, 1)]);
        let bc = combo(&[(1, 1), (2, 1)]);
        let b = combo(&[(1, 1)]);
        index.register(b.clone(), f.fresh_monitor()).unwrap();
        assert_eq!(monitored_ancestor(&abc, &index), Some(b));
        index.register(bc.clone(), f.fresh_monitor()).unwrap();
        assert_eq!(monitored_ancestor(&abc, &index), Some(bc));
        index.register(ab.clone(), f.fresh_monitor()).unwrap();
        // Same size, canonical order puts {a, b} before {b, c}.
        assert_eq!(monitored_ancestor(&abc, &index), Some(ab));
    }

    #[test]
    fn bound_types_projects_each_parameter() {
        let c = combo(&[(0, 1), (3, 9)]);
        let types = bound_types(&c);
        assert!(types.contains(ParamTypeId::new(0)));
        assert!(types.contains(ParamTypeId::new(3)));
        assert!(!types.contains(ParamTypeId::new(1)));
        assert_eq!(types.len(), 2);
    }
}
