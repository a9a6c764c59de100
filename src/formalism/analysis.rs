//! Static property analyses: enable and coenable sets.
//!
//! Both analyses run once at property load over the compiled transition
//! structure and are never recomputed. Enable sets answer "which events can
//! have occurred before this one on some path" and drive Algorithm D's
//! eager monitor creation; coenable sets answer "which events can still
//! occur after this one on some path to a goal state" and drive the
//! garbage collector. Event sets and parameter-type sets are single-word
//! bitsets over the dense ids assigned at load, so set algebra on the hot
//! path is one or two integer instructions.

use std::collections::{BTreeSet, HashSet, VecDeque};

use crate::param::ParamTypeId;

use super::{CategoryId, EventId, StateId};

/// A set of declared events, as a bitset over dense event ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EventSet(u64);

impl EventSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Copy of `self` with `event` added.
    #[must_use]
    pub fn with(self, event: EventId) -> Self {
        debug_assert!(event.index() < 64, "event id outside bitset range");
        Self(self.0 | (1u64 << event.index()))
    }

    /// Membership test.
    #[must_use]
    pub fn contains(self, event: EventId) -> bool {
        event.index() < 64 && self.0 & (1u64 << event.index()) != 0
    }

    /// Set union.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether every member of `self` is in `other`.
    #[must_use]
    pub fn is_subset_of(self, other: Self) -> bool {
        self.0 & !other.0 == 0
    }

    /// True for the empty set.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of members.
    #[must_use]
    pub fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Members in ascending id order.
    pub fn iter(self) -> impl Iterator<Item = EventId> {
        (0..64u32).filter(move |i| self.0 & (1u64 << i) != 0).map(EventId::new)
    }
}

/// A set of declared parameter types, as a bitset over dense type ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TypeSet(u64);

impl TypeSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Copy of `self` with `ptype` added.
    #[must_use]
    pub fn with(self, ptype: ParamTypeId) -> Self {
        debug_assert!(ptype.index() < 64, "parameter type id outside bitset range");
        Self(self.0 | (1u64 << ptype.index()))
    }

    /// Membership test.
    #[must_use]
    pub fn contains(self, ptype: ParamTypeId) -> bool {
        ptype.index() < 64 && self.0 & (1u64 << ptype.index()) != 0
    }

    /// Set union.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Set intersection.
    #[must_use]
    pub fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// True for the empty set.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of members.
    #[must_use]
    pub fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Members in ascending id order.
    pub fn iter(self) -> impl Iterator<Item = ParamTypeId> {
        (0..64u8)
            .filter(move |i| self.0 & (1u64 << i) != 0)
            .map(ParamTypeId::new)
    }
}

/// One analysis entry: the qualifying event sets plus their parameter-type
/// projections through the event signatures. Both lists are sorted and
/// deduplicated, so recomputing the analysis yields bit-identical maps.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnalysisEntry {
    /// The qualifying event sets, ascending.
    pub(crate) event_sets: Vec<EventSet>,
    /// Their parameter-type projections, ascending and deduplicated.
    pub(crate) type_sets: Vec<TypeSet>,
}

impl AnalysisEntry {
    fn from_family(family: &BTreeSet<EventSet>, signatures: &[TypeSet]) -> Self {
        let event_sets: Vec<EventSet> = family.iter().copied().collect();
        let mut type_sets: Vec<TypeSet> = event_sets
            .iter()
            .map(|es| {
                es.iter()
                    .fold(TypeSet::EMPTY, |acc, e| acc.union(signatures[e.index()]))
            })
            .collect();
        type_sets.sort_unstable();
        type_sets.dedup();
        Self {
            event_sets,
            type_sets,
        }
    }
}

/// Enable sets, indexed by event: for each event, the sets of events that
/// can precede it on some path from the initial configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnableMap {
    per_event: Vec<AnalysisEntry>,
}

impl EnableMap {
    pub(crate) fn from_families(families: &[BTreeSet<EventSet>], signatures: &[TypeSet]) -> Self {
        Self {
            per_event: families
                .iter()
                .map(|f| AnalysisEntry::from_family(f, signatures))
                .collect(),
        }
    }

    /// The entry for `event`.
    #[must_use]
    pub fn entry(&self, event: EventId) -> &AnalysisEntry {
        &self.per_event[event.index()]
    }
}

/// Coenable sets, indexed by (declared category, event): for each pair, the
/// sets of events that can still occur after the event on some path to one
/// of the category's goal states. The implicit `fail` category has no goal
/// states and no entries here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoenableMap {
    n_events: usize,
    n_categories: usize,
    entries: Vec<AnalysisEntry>,
}

impl CoenableMap {
    pub(crate) fn from_families(
        n_events: usize,
        families: &[Vec<BTreeSet<EventSet>>],
        signatures: &[TypeSet],
    ) -> Self {
        let mut entries = Vec::with_capacity(families.len() * n_events);
        for per_event in families {
            debug_assert_eq!(per_event.len(), n_events);
            for family in per_event {
                entries.push(AnalysisEntry::from_family(family, signatures));
            }
        }
        Self {
            n_events,
            n_categories: families.len(),
            entries,
        }
    }

    /// The entry for one (category, event) pair.
    #[must_use]
    pub fn entry(&self, category: CategoryId, event: EventId) -> &AnalysisEntry {
        &self.entries[category.index() * self.n_events + event.index()]
    }

    /// Declared categories, in id order.
    pub fn categories(&self) -> impl Iterator<Item = CategoryId> {
        (0..self.n_categories as u32).map(CategoryId::new)
    }
}

/// Computes coenable sets for an automaton.
///
/// Backward fixed point per declared category: `SEEABLE(s)` is the family
/// of event sets usable along some path from `s` to a goal state, seeded
/// with the empty set at goal states and closed under prepending edge
/// labels. `COENABLE(g, e)` is the union of `SEEABLE(target)` over
/// `e`-labeled edges, with the empty set filtered out (a monitor that has
/// already reached its goal needs nothing further).
pub(crate) fn automaton_coenable(
    table: &[Option<StateId>],
    n_states: usize,
    n_events: usize,
    goal_states: &[Vec<StateId>],
    signatures: &[TypeSet],
) -> CoenableMap {
    let mut families: Vec<Vec<BTreeSet<EventSet>>> = Vec::with_capacity(goal_states.len());
    for goals in goal_states {
        let mut seeable: Vec<BTreeSet<EventSet>> = vec![BTreeSet::new(); n_states];
        for goal in goals {
            seeable[goal.index()].insert(EventSet::EMPTY);
        }
        let mut changed = true;
        while changed {
            changed = false;
            for from in 0..n_states {
                for e in 0..n_events {
                    let Some(to) = table[from * n_events + e] else {
                        continue;
                    };
                    let additions: Vec<EventSet> = seeable[to.index()]
                        .iter()
                        .map(|t| t.with(EventId::new(e as u32)))
                        .collect();
                    for set in additions {
                        changed |= seeable[from].insert(set);
                    }
                }
            }
        }
        let mut per_event: Vec<BTreeSet<EventSet>> = vec![BTreeSet::new(); n_events];
        for from in 0..n_states {
            for (e, family) in per_event.iter_mut().enumerate() {
                if let Some(to) = table[from * n_events + e] {
                    family.extend(seeable[to.index()].iter().filter(|s| !s.is_empty()));
                }
            }
        }
        families.push(per_event);
    }
    CoenableMap::from_families(n_events, &families, signatures)
}

/// Computes enable sets for an automaton.
///
/// Forward fixed point over (state, events-seen) configurations reachable
/// from the initial state; `ENABLE(e)` collects the events-seen set of
/// every configuration with an outgoing `e` edge.
pub(crate) fn automaton_enable(
    table: &[Option<StateId>],
    n_states: usize,
    n_events: usize,
    initial: StateId,
    signatures: &[TypeSet],
) -> EnableMap {
    debug_assert!(initial.index() < n_states);
    let mut families: Vec<BTreeSet<EventSet>> = vec![BTreeSet::new(); n_events];
    let mut visited: HashSet<(StateId, EventSet)> = HashSet::new();
    let mut queue: VecDeque<(StateId, EventSet)> = VecDeque::new();
    visited.insert((initial, EventSet::EMPTY));
    queue.push_back((initial, EventSet::EMPTY));
    while let Some((state, seen)) = queue.pop_front() {
        for e in 0..n_events {
            let Some(next) = table[state.index() * n_events + e] else {
                continue;
            };
            let event = EventId::new(e as u32);
            families[e].insert(seen);
            let config = (next, seen.with(event));
            if visited.insert(config) {
                queue.push_back(config);
            }
        }
    }
    EnableMap::from_families(&families, signatures)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eid(i: u32) -> EventId {
        EventId::new(i)
    }

    fn tid(i: u8) -> ParamTypeId {
        ParamTypeId::new(i)
    }

    fn eset(events: &[u32]) -> EventSet {
        events.iter().fold(EventSet::EMPTY, |s, &e| s.with(eid(e)))
    }

    #[test]
    fn event_set_basics() {
        assert!(EventSet::EMPTY.is_empty());
        let s = EventSet::EMPTY.with(eid(3)).with(eid(0));
        assert!(!s.is_empty());
        assert!(s.contains(eid(3)));
        assert!(!s.contains(eid(1)));
        assert_eq!(s.len(), 2);
        let ids: Vec<u32> = s.iter().map(|e| e.index() as u32).collect();
        assert_eq!(ids, vec![0, 3]);
    }

    #[test]
    fn event_set_subset_and_union() {
        let small = eset(&[1]);
        let big = eset(&[1, 2]);
        assert!(small.is_subset_of(big));
        assert!(!big.is_subset_of(small));
        assert_eq!(small.union(big), big);
        assert!(EventSet::EMPTY.is_subset_of(small));
    }

    #[test]
    fn type_set_intersection() {
        let ab = TypeSet::EMPTY.with(tid(0)).with(tid(1));
        let bc = TypeSet::EMPTY.with(tid(1)).with(tid(2));
        let inter = ab.intersection(bc);
        assert_eq!(inter, TypeSet::EMPTY.with(tid(1)));
        assert!(!inter.is_empty());
        assert!(ab.intersection(TypeSet::EMPTY.with(tid(2))).is_empty());
    }

    /// Transition structure of `e1 (e2 e3)+`:
    /// s0 -e1-> s1 -e2-> s2 -e3-> s3(goal), s3 -e2-> s2.
    fn plus_loop_table() -> (Vec<Option<StateId>>, usize, usize) {
        let n_states = 4;
        let n_events = 3;
        let mut table = vec![None; n_states * n_events];
        let mut set = |s: usize, e: usize, t: u32| table[s * n_events + e] = Some(StateId::new(t));
        set(0, 0, 1);
        set(1, 1, 2);
        set(2, 2, 3);
        set(3, 1, 2);
        (table, n_states, n_events)
    }

    fn uniform_signatures() -> Vec<TypeSet> {
        // e1 binds {a}; e2 and e3 bind {a, b}.
        vec![
            TypeSet::EMPTY.with(tid(0)),
            TypeSet::EMPTY.with(tid(0)).with(tid(1)),
            TypeSet::EMPTY.with(tid(0)).with(tid(1)),
        ]
    }

    #[test]
    fn coenable_of_plus_loop() {
        let (table, n_states, n_events) = plus_loop_table();
        let goals = vec![vec![StateId::new(3)]];
        let map = automaton_coenable(&table, n_states, n_events, &goals, &uniform_signatures());
        let g = CategoryId::new(0);

        assert_eq!(map.entry(g, eid(0)).event_sets, vec![eset(&[1, 2])]);
        assert_eq!(
            map.entry(g, eid(1)).event_sets,
            vec![eset(&[2]), eset(&[1, 2])]
        );
        // After e3 the goal is reached; continuing requires the loop pair.
        assert_eq!(map.entry(g, eid(2)).event_sets, vec![eset(&[1, 2])]);
    }

    #[test]
    fn coenable_type_projection() {
        let (table, n_states, n_events) = plus_loop_table();
        let goals = vec![vec![StateId::new(3)]];
        let map = automaton_coenable(&table, n_states, n_events, &goals, &uniform_signatures());
        let ab = TypeSet::EMPTY.with(tid(0)).with(tid(1));
        // Both qualifying event sets for e2 project onto {a, b}.
        assert_eq!(map.entry(CategoryId::new(0), eid(1)).type_sets, vec![ab]);
    }

    #[test]
    fn enable_of_plus_loop() {
        let (table, n_states, n_events) = plus_loop_table();
        let map = automaton_enable(
            &table,
            n_states,
            n_events,
            StateId::new(0),
            &uniform_signatures(),
        );
        assert_eq!(map.entry(eid(0)).event_sets, vec![EventSet::EMPTY]);
        assert_eq!(
            map.entry(eid(1)).event_sets,
            vec![eset(&[0]), eset(&[0, 1, 2])]
        );
        assert_eq!(
            map.entry(eid(2)).event_sets,
            vec![eset(&[0, 1]), eset(&[0, 1, 2])]
        );
    }

    #[test]
    fn enable_type_projection_dedups() {
        let (table, n_states, n_events) = plus_loop_table();
        let map = automaton_enable(
            &table,
            n_states,
            n_events,
            StateId::new(0),
            &uniform_signatures(),
        );
        let a = TypeSet::EMPTY.with(tid(0));
        let ab = a.with(tid(1));
        // {e1} and {e1,e2,e3} both qualify before e2; their projections
        // {a} and {a,b} stay distinct, sorted ascending.
        assert_eq!(map.entry(eid(1)).type_sets, vec![a, ab]);
    }

    #[test]
    fn analyses_recompute_bit_identical() {
        let (table, n_states, n_events) = plus_loop_table();
        let goals = vec![vec![StateId::new(3)]];
        let sig = uniform_signatures();
        let co1 = automaton_coenable(&table, n_states, n_events, &goals, &sig);
        let co2 = automaton_coenable(&table, n_states, n_events, &goals, &sig);
        assert_eq!(co1, co2);
        let en1 = automaton_enable(&table, n_states, n_events, StateId::new(0), &sig);
        let en2 = automaton_enable(&table, n_states, n_events, StateId::new(0), &sig);
        assert_eq!(en1, en2);
    }

    #[test]
    fn unreachable_goal_yields_empty_entries() {
        // s0 -e0-> s1, goal s2 unreachable.
        let n_states = 3;
        let n_events = 1;
        let mut table = vec![None; n_states * n_events];
        table[0] = Some(StateId::new(1));
        let map = automaton_coenable(
            &table,
            n_states,
            n_events,
            &[vec![StateId::new(2)]],
            &[TypeSet::EMPTY],
        );
        assert!(map.entry(CategoryId::new(0), eid(0)).event_sets.is_empty());
    }
}
