//! Compiled context-free-grammar formalism.
//!
//! The monitor tracks the derivation prefix of its slice with an Earley
//! chart: one column per consumed event, closed under prediction and
//! completion, with nullable nonterminals handled by advancing past them at
//! prediction time. The match category fires whenever the consumed prefix
//! is a complete word of the language; a prefix no production can extend
//! sets the sticky failed flag and drops the chart.
//!
//! The enable/coenable analyses are structural rather than path-based: for
//! each event they keep the minimal event subsets that can precede it in a
//! word (enable) or follow it with a non-empty remainder (coenable),
//! decided by productivity fixed points over the productions. Minimal
//! subsets under-approximate a continuation's requirements, which for the
//! collector only delays collection.

use std::collections::{BTreeSet, HashSet};

use crate::error::ConfigError;
use crate::property::{GrammarDef, NameTable, FAIL_CATEGORY};

use super::analysis::{CoenableMap, EnableMap, EventSet, TypeSet};
use super::{CategoryId, EventId, FAIL_VERDICT};

/// Largest can-precede/can-follow terminal set enumerated exactly; beyond
/// it the coenable entry degrades to keep-alive and the enable entry to
/// empty. Bounds load-time work at 2^12 fixed points per event.
const MAX_SUBSET_ENUMERATION: u32 = 12;

/// One grammar symbol after compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Sym {
    /// Event terminal.
    T(EventId),
    /// Nonterminal, by dense index.
    N(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Production {
    lhs: usize,
    rhs: Vec<Sym>,
}

/// One Earley item: a production, a dot position, and the column the
/// production was predicted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Item {
    prod: usize,
    dot: usize,
    origin: usize,
}

/// A compiled context-free grammar with its precomputed analyses.
#[derive(Debug, Clone)]
pub struct CompiledGrammar {
    start: usize,
    productions: Vec<Production>,
    /// Production indices per nonterminal.
    prods_of: Vec<Vec<usize>>,
    nullable: Vec<bool>,
    nonterminals: NameTable,
    match_name: String,
    match_verdict: [CategoryId; 1],
    enable: EnableMap,
    coenable: CoenableMap,
}

impl CompiledGrammar {
    pub(crate) fn compile(
        def: &GrammarDef,
        events: &NameTable,
        signatures: &[TypeSet],
    ) -> Result<Self, ConfigError> {
        debug_assert_eq!(events.len(), signatures.len());
        if def.match_category == FAIL_CATEGORY {
            return Err(ConfigError::ReservedCategory);
        }
        let mut nonterminals = NameTable::default();
        let lhs_ids: Vec<u32> = def
            .productions
            .iter()
            .map(|p| nonterminals.insert(&p.lhs))
            .collect();
        let start = nonterminals
            .get(&def.start)
            .ok_or_else(|| ConfigError::EmptyGrammar {
                symbol: def.start.clone(),
            })? as usize;

        let n_nts = nonterminals.len();
        let mut productions = Vec::with_capacity(def.productions.len());
        let mut prods_of: Vec<Vec<usize>> = vec![Vec::new(); n_nts];
        for (production, &lhs) in def.productions.iter().zip(&lhs_ids) {
            let lhs = lhs as usize;
            let mut rhs = Vec::with_capacity(production.rhs.len());
            for symbol in &production.rhs {
                let sym = if let Some(nt) = nonterminals.get(symbol) {
                    Sym::N(nt as usize)
                } else if let Some(e) = events.get(symbol) {
                    Sym::T(EventId::new(e))
                } else {
                    return Err(ConfigError::UnknownGrammarSymbol {
                        symbol: symbol.clone(),
                        nonterminal: production.lhs.clone(),
                    });
                };
                rhs.push(sym);
            }
            prods_of[lhs].push(productions.len());
            productions.push(Production { lhs, rhs });
        }

        let nullable = compute_nullable(&productions, n_nts);
        let productive = compute_productive(&productions, n_nts);
        let terms = compute_terms(&productions, n_nts);

        let analyzer = Analyzer {
            productions: &productions,
            start,
            productive: &productive,
            terms: &terms,
        };
        let n_events = events.len();
        let (enable, coenable) = analyzer.analyses(n_events, signatures);

        Ok(Self {
            start,
            productions,
            prods_of,
            nullable,
            nonterminals,
            match_name: def.match_category.clone(),
            match_verdict: [CategoryId::new(0)],
            enable,
            coenable,
        })
    }

    pub(crate) fn fresh(&self) -> GrammarMonitor {
        let mut first: Vec<Item> = self.prods_of[self.start]
            .iter()
            .map(|&prod| Item {
                prod,
                dot: 0,
                origin: 0,
            })
            .collect();
        self.close_column(&[], &mut first, 0);
        GrammarMonitor {
            columns: vec![first],
            failed: false,
        }
    }

    pub(crate) fn transition(&self, monitor: &mut GrammarMonitor, event: EventId) -> &[CategoryId] {
        if monitor.failed {
            return FAIL_VERDICT;
        }
        let col = monitor.columns.len();
        let mut next: Vec<Item> = Vec::new();
        for &item in &monitor.columns[col - 1] {
            if self.symbol_after_dot(item) == Some(Sym::T(event)) {
                next.push(Item {
                    dot: item.dot + 1,
                    ..item
                });
            }
        }
        if next.is_empty() {
            monitor.failed = true;
            monitor.columns = Vec::new();
            return FAIL_VERDICT;
        }
        self.close_column(&monitor.columns, &mut next, col);
        let matched = next.iter().any(|&item| self.is_full_parse(item));
        monitor.columns.push(next);
        if matched {
            &self.match_verdict
        } else {
            &[]
        }
    }

    /// Prediction/completion closure of one chart column.
    ///
    /// Nullable nonterminals advance their predictor at prediction time, so
    /// same-column completions (zero-width derivations) need no second
    /// pass.
    fn close_column(&self, chart: &[Vec<Item>], column: &mut Vec<Item>, col: usize) {
        let mut seen: HashSet<Item> = column.iter().copied().collect();
        let mut i = 0;
        while i < column.len() {
            let item = column[i];
            match self.symbol_after_dot(item) {
                Some(Sym::N(nt)) => {
                    for &prod in &self.prods_of[nt] {
                        let predicted = Item {
                            prod,
                            dot: 0,
                            origin: col,
                        };
                        if seen.insert(predicted) {
                            column.push(predicted);
                        }
                    }
                    if self.nullable[nt] {
                        let advanced = Item {
                            dot: item.dot + 1,
                            ..item
                        };
                        if seen.insert(advanced) {
                            column.push(advanced);
                        }
                    }
                }
                Some(Sym::T(_)) => {}
                None => {
                    if item.origin < col {
                        let lhs = self.productions[item.prod].lhs;
                        for &parent in &chart[item.origin] {
                            if self.symbol_after_dot(parent) == Some(Sym::N(lhs)) {
                                let advanced = Item {
                                    dot: parent.dot + 1,
                                    ..parent
                                };
                                if seen.insert(advanced) {
                                    column.push(advanced);
                                }
                            }
                        }
                    }
                }
            }
            i += 1;
        }
    }

    fn symbol_after_dot(&self, item: Item) -> Option<Sym> {
        self.productions[item.prod].rhs.get(item.dot).copied()
    }

    fn is_full_parse(&self, item: Item) -> bool {
        let production = &self.productions[item.prod];
        item.origin == 0 && item.dot == production.rhs.len() && production.lhs == self.start
    }

    /// Declared name of the (single) category.
    #[must_use]
    pub fn category_name(&self, _category: CategoryId) -> &str {
        &self.match_name
    }

    /// Declared name of a nonterminal.
    #[must_use]
    pub fn nonterminal_name(&self, index: usize) -> &str {
        self.nonterminals.name(index as u32)
    }

    /// The enable map.
    #[must_use]
    pub fn enable(&self) -> &EnableMap {
        &self.enable
    }

    /// The coenable map.
    #[must_use]
    pub fn coenable(&self) -> &CoenableMap {
        &self.coenable
    }
}

/// Grammar monitor: the Earley chart of its slice plus a sticky failed
/// flag. The chart is dropped on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarMonitor {
    columns: Vec<Vec<Item>>,
    failed: bool,
}

impl GrammarMonitor {
    /// Whether the monitor has failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.failed
    }
}

fn compute_nullable(productions: &[Production], n_nts: usize) -> Vec<bool> {
    let mut nullable = vec![false; n_nts];
    let mut changed = true;
    while changed {
        changed = false;
        for production in productions {
            if nullable[production.lhs] {
                continue;
            }
            let all_nullable = production.rhs.iter().all(|sym| match sym {
                Sym::T(_) => false,
                Sym::N(nt) => nullable[*nt],
            });
            if all_nullable {
                nullable[production.lhs] = true;
                changed = true;
            }
        }
    }
    nullable
}

fn compute_productive(productions: &[Production], n_nts: usize) -> Vec<bool> {
    let mut productive = vec![false; n_nts];
    let mut changed = true;
    while changed {
        changed = false;
        for production in productions {
            if productive[production.lhs] {
                continue;
            }
            let derivable = production.rhs.iter().all(|sym| match sym {
                Sym::T(_) => true,
                Sym::N(nt) => productive[*nt],
            });
            if derivable {
                productive[production.lhs] = true;
                changed = true;
            }
        }
    }
    productive
}

/// Terminals that can appear anywhere in a derivation of each nonterminal.
fn compute_terms(productions: &[Production], n_nts: usize) -> Vec<EventSet> {
    let mut terms = vec![EventSet::EMPTY; n_nts];
    let mut changed = true;
    while changed {
        changed = false;
        for production in productions {
            let mut contribution = terms[production.lhs];
            for sym in &production.rhs {
                contribution = match sym {
                    Sym::T(t) => contribution.with(*t),
                    Sym::N(nt) => contribution.union(terms[*nt]),
                };
            }
            if contribution != terms[production.lhs] {
                terms[production.lhs] = contribution;
                changed = true;
            }
        }
    }
    terms
}

/// Load-time analyzer over the compiled productions.
struct Analyzer<'a> {
    productions: &'a [Production],
    start: usize,
    productive: &'a [bool],
    terms: &'a [EventSet],
}

impl Analyzer<'_> {
    fn analyses(&self, n_events: usize, signatures: &[TypeSet]) -> (EnableMap, CoenableMap) {
        let mut enable_families: Vec<BTreeSet<EventSet>> = Vec::with_capacity(n_events);
        let mut coenable_families: Vec<BTreeSet<EventSet>> = Vec::with_capacity(n_events);
        for e in 0..n_events {
            let event = EventId::new(e as u32);
            let follow = self.reachable_terminals(event, Side::After);
            let coenable = if follow.len() > MAX_SUBSET_ENUMERATION {
                // Too wide to enumerate: keep monitors alive under this event.
                BTreeSet::from([EventSet::EMPTY])
            } else {
                self.minimal_qualifying(follow, false, |s| self.qualifies_coenable(event, s))
            };
            coenable_families.push(coenable);

            let before = self.reachable_terminals(event, Side::Before);
            let enable = if before.len() > MAX_SUBSET_ENUMERATION {
                BTreeSet::new()
            } else {
                self.minimal_qualifying(before, true, |s| self.qualifies_enable(event, s))
            };
            enable_families.push(enable);
        }
        (
            EnableMap::from_families(&enable_families, signatures),
            CoenableMap::from_families(n_events, &[coenable_families], signatures),
        )
    }

    /// Terminals that can occur before/after some occurrence of `event` in
    /// a word derived from the start symbol. Over-approximate (ignores
    /// productivity), used only to bound subset enumeration.
    fn reachable_terminals(&self, event: EventId, side: Side) -> EventSet {
        let n_nts = self.terms.len();
        let contains: Vec<bool> = self.terms.iter().map(|t| t.contains(event)).collect();
        let mut reach = vec![EventSet::EMPTY; n_nts];
        let mut changed = true;
        while changed {
            changed = false;
            for production in self.productions {
                for (j, sym) in production.rhs.iter().enumerate() {
                    let inner = match sym {
                        Sym::T(t) if *t == event => Some(EventSet::EMPTY),
                        Sym::N(nt) if contains[*nt] => Some(reach[*nt]),
                        _ => None,
                    };
                    let Some(inner) = inner else { continue };
                    let beside = match side {
                        Side::After => &production.rhs[j + 1..],
                        Side::Before => &production.rhs[..j],
                    };
                    let grown = beside
                        .iter()
                        .fold(inner, |acc, sym| match sym {
                            Sym::T(t) => acc.with(*t),
                            Sym::N(nt) => acc.union(self.terms[*nt]),
                        })
                        .union(reach[production.lhs]);
                    if grown != reach[production.lhs] {
                        reach[production.lhs] = grown;
                        changed = true;
                    }
                }
            }
        }
        reach[self.start]
    }

    /// Minimal antichain of subsets of `bound` accepted by `test`,
    /// enumerated ascending by size then by raw value.
    fn minimal_qualifying(
        &self,
        bound: EventSet,
        include_empty: bool,
        test: impl Fn(EventSet) -> bool,
    ) -> BTreeSet<EventSet> {
        let bits: Vec<EventId> = bound.iter().collect();
        let mut subsets: Vec<EventSet> = (0..(1u32 << bits.len()))
            .map(|mask| {
                bits.iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .fold(EventSet::EMPTY, |acc, (_, &e)| acc.with(e))
            })
            .collect();
        subsets.sort_unstable_by_key(|s| (s.len(), *s));
        let mut kept: Vec<EventSet> = Vec::new();
        for subset in subsets {
            if subset.is_empty() && !include_empty {
                continue;
            }
            if kept.iter().any(|m| m.is_subset_of(subset)) {
                continue;
            }
            if test(subset) {
                kept.push(subset);
            }
        }
        kept.into_iter().collect()
    }

    /// Word-over-S derivability per nonterminal: possibly-empty and
    /// non-empty variants.
    fn covers(&self, s: EventSet) -> (Vec<bool>, Vec<bool>) {
        let n_nts = self.terms.len();
        let mut c = vec![false; n_nts];
        let mut changed = true;
        while changed {
            changed = false;
            for production in self.productions {
                if c[production.lhs] {
                    continue;
                }
                let ok = production.rhs.iter().all(|sym| match sym {
                    Sym::T(t) => s.contains(*t),
                    Sym::N(nt) => c[*nt],
                });
                if ok {
                    c[production.lhs] = true;
                    changed = true;
                }
            }
        }
        let mut cn = vec![false; n_nts];
        changed = true;
        while changed {
            changed = false;
            for production in self.productions {
                if cn[production.lhs] {
                    continue;
                }
                let all_over_s = production.rhs.iter().all(|sym| match sym {
                    Sym::T(t) => s.contains(*t),
                    Sym::N(nt) => c[*nt],
                });
                let some_nonempty = production.rhs.iter().any(|sym| match sym {
                    Sym::T(_) => true,
                    Sym::N(nt) => cn[*nt],
                });
                if all_over_s && some_nonempty {
                    cn[production.lhs] = true;
                    changed = true;
                }
            }
        }
        (c, cn)
    }

    /// Does some word of the language contain `event` followed by a
    /// non-empty remainder whose events all lie in `s`?
    fn qualifies_coenable(&self, event: EventId, s: EventSet) -> bool {
        let n_nts = self.terms.len();
        let (c, cn) = self.covers(s);

        // ecf: derives ... event tail with tail (possibly empty) over s.
        let mut ecf = vec![false; n_nts];
        let mut changed = true;
        while changed {
            changed = false;
            for production in self.productions {
                if ecf[production.lhs] {
                    continue;
                }
                if self.split_exists(production, |sym| self.holds_event(sym, event, &ecf), |tail| {
                    tail.iter().all(|sym| match sym {
                        Sym::T(t) => s.contains(*t),
                        Sym::N(nt) => c[*nt],
                    })
                }) {
                    ecf[production.lhs] = true;
                    changed = true;
                }
            }
        }

        // ep: like ecf, with a non-empty tail overall.
        let mut ep = vec![false; n_nts];
        changed = true;
        while changed {
            changed = false;
            for production in self.productions {
                if ep[production.lhs] {
                    continue;
                }
                let hit = self.split_exists(
                    production,
                    |sym| matches!(sym, Sym::N(nt) if ep[*nt]),
                    |tail| {
                        tail.iter().all(|sym| match sym {
                            Sym::T(t) => s.contains(*t),
                            Sym::N(nt) => c[*nt],
                        })
                    },
                ) || self.split_exists(
                    production,
                    |sym| self.holds_event(sym, event, &ecf),
                    |tail| {
                        let over_s = tail.iter().all(|sym| match sym {
                            Sym::T(t) => s.contains(*t),
                            Sym::N(nt) => c[*nt],
                        });
                        let nonempty = tail.iter().any(|sym| match sym {
                            Sym::T(_) => true,
                            Sym::N(nt) => cn[*nt],
                        });
                        over_s && nonempty
                    },
                );
                if hit {
                    ep[production.lhs] = true;
                    changed = true;
                }
            }
        }
        ep[self.start]
    }

    /// Does some word of the language contain `event` with every preceding
    /// event in `s`?
    fn qualifies_enable(&self, event: EventId, s: EventSet) -> bool {
        let n_nts = self.terms.len();
        let (c, _) = self.covers(s);
        let mut pref = vec![false; n_nts];
        let mut changed = true;
        while changed {
            changed = false;
            for production in self.productions {
                if pref[production.lhs] {
                    continue;
                }
                for (j, sym) in production.rhs.iter().enumerate() {
                    let pivot = match sym {
                        Sym::T(t) => *t == event,
                        Sym::N(nt) => pref[*nt],
                    };
                    if !pivot {
                        continue;
                    }
                    let head_over_s = production.rhs[..j].iter().all(|sym| match sym {
                        Sym::T(t) => s.contains(*t),
                        Sym::N(nt) => c[*nt],
                    });
                    let tail_derivable = production.rhs[j + 1..].iter().all(|sym| match sym {
                        Sym::T(_) => true,
                        Sym::N(nt) => self.productive[*nt],
                    });
                    if head_over_s && tail_derivable {
                        pref[production.lhs] = true;
                        changed = true;
                        break;
                    }
                }
            }
        }
        pref[self.start]
    }

    /// Is there a pivot position whose symbol satisfies `pivot`, with a
    /// derivable head and a tail satisfying `tail_ok`?
    fn split_exists(
        &self,
        production: &Production,
        pivot: impl Fn(&Sym) -> bool,
        tail_ok: impl Fn(&[Sym]) -> bool,
    ) -> bool {
        production.rhs.iter().enumerate().any(|(j, sym)| {
            pivot(sym)
                && production.rhs[..j].iter().all(|sym| match sym {
                    Sym::T(_) => true,
                    Sym::N(nt) => self.productive[*nt],
                })
                && tail_ok(&production.rhs[j + 1..])
        })
    }

    /// Pivot predicate for "contains `event` with an over-S tail inside".
    fn holds_event(&self, sym: &Sym, event: EventId, ecf: &[bool]) -> bool {
        match sym {
            Sym::T(t) => *t == event,
            Sym::N(nt) => ecf[*nt],
        }
    }
}

#[derive(Clone, Copy)]
enum Side {
    Before,
    After,
}
