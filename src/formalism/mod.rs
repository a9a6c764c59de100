//! Formalism transition engines.
//!
//! A compiled property is a [`Formalism`]: a closed set of transition
//! structures sharing one contract. Monitors are plain values owned by the
//! index; `transition` mutates one monitor by one event and reports every
//! category the move raises. The set is closed by design: formalism
//! variants share no partial structure (a grammar has no states to reuse),
//! so they are enum variants rather than a trait hierarchy, and adding one
//! means touching every match below.

pub mod analysis;
pub mod automaton;
pub mod grammar;

use crate::error::ConfigError;
use crate::property::{FormalismDef, NameTable, PropertyDef, FAIL_CATEGORY};

pub use analysis::{AnalysisEntry, CoenableMap, EnableMap, EventSet, TypeSet};
pub use automaton::{CompiledAutomaton, FsmMonitor};
pub use grammar::{CompiledGrammar, GrammarMonitor};

/// Dense id of an automaton state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(u32);

impl StateId {
    /// Wraps a dense state index.
    #[must_use]
    pub(crate) const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The dense index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Dense id of a declared event, assigned in declaration order at load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u32);

impl EventId {
    /// Wraps a dense event index.
    #[must_use]
    pub(crate) const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The dense index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Dense id of a declared match category.
///
/// The implicit failure verdict is [`CategoryId::FAIL`]; it is never
/// interned and never appears in enable/coenable tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CategoryId(u32);

impl CategoryId {
    /// The implicit category raised when a slice falls out of the language.
    pub const FAIL: Self = Self(u32::MAX);

    /// Wraps a dense category index.
    #[must_use]
    pub(crate) const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The dense index. Meaningless for [`CategoryId::FAIL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether this is the implicit failure verdict.
    #[must_use]
    pub const fn is_fail(self) -> bool {
        self.0 == u32::MAX
    }
}

/// The verdict slice returned for failed monitors.
pub(crate) const FAIL_VERDICT: &[CategoryId] = &[CategoryId::FAIL];

/// A compiled property formalism with its precomputed analyses.
#[derive(Debug, Clone)]
pub enum Formalism {
    /// Finite automaton over the event alphabet.
    Automaton(CompiledAutomaton),
    /// Context-free grammar over the event alphabet.
    Grammar(CompiledGrammar),
}

impl Formalism {
    /// Compiles the formalism payload of a validated definition.
    pub(crate) fn compile(
        def: &PropertyDef,
        events: &NameTable,
        signatures: &[TypeSet],
    ) -> Result<Self, ConfigError> {
        match &def.formalism {
            FormalismDef::Automaton(a) => Ok(Self::Automaton(CompiledAutomaton::compile(
                a, events, signatures,
            )?)),
            FormalismDef::Grammar(g) => Ok(Self::Grammar(CompiledGrammar::compile(
                g, events, signatures,
            )?)),
        }
    }

    /// A monitor in the initial configuration, having consumed nothing.
    #[must_use]
    pub fn fresh_monitor(&self) -> Monitor {
        match self {
            Self::Automaton(a) => Monitor::Fsm(a.fresh()),
            Self::Grammar(g) => Monitor::Grammar(g.fresh()),
        }
    }

    /// Advances `monitor` by one event and returns the categories raised.
    ///
    /// A failed monitor returns the implicit `fail` verdict without
    /// consulting any table. A missing transition sets the sticky failed
    /// flag and returns `fail`. Otherwise the monitor moves and every
    /// declared category matched by the new configuration is returned,
    /// possibly none, possibly several. Deterministic: equal monitors fed
    /// the same event end equal and raise the same categories.
    pub fn transition<'a>(&'a self, monitor: &mut Monitor, event: EventId) -> &'a [CategoryId] {
        match (self, monitor) {
            (Self::Automaton(a), Monitor::Fsm(m)) => a.transition(m, event),
            (Self::Grammar(g), Monitor::Grammar(m)) => g.transition(m, event),
            _ => unreachable!("monitor paired with a different formalism"),
        }
    }

    /// The enable map (can-precede analysis).
    #[must_use]
    pub fn enable(&self) -> &EnableMap {
        match self {
            Self::Automaton(a) => a.enable(),
            Self::Grammar(g) => g.enable(),
        }
    }

    /// The coenable map (can-follow-to-goal analysis).
    #[must_use]
    pub fn coenable(&self) -> &CoenableMap {
        match self {
            Self::Automaton(a) => a.coenable(),
            Self::Grammar(g) => g.coenable(),
        }
    }

    /// Resolves a category id to its declared name; [`CategoryId::FAIL`]
    /// resolves to `fail`.
    #[must_use]
    pub fn category_name(&self, category: CategoryId) -> &str {
        if category.is_fail() {
            return FAIL_CATEGORY;
        }
        match self {
            Self::Automaton(a) => a.category_name(category),
            Self::Grammar(g) => g.category_name(category),
        }
    }
}

/// One monitor: the verification state of a single combination's slice.
///
/// Monitors are plain values; cloning one yields an independent monitor
/// that continues from the same configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Monitor {
    /// Automaton monitor: current state plus the sticky failed flag.
    Fsm(FsmMonitor),
    /// Grammar monitor: derivation-prefix chart plus the sticky failed flag.
    Grammar(GrammarMonitor),
}

impl Monitor {
    /// Whether the monitor has fallen out of the property language.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        match self {
            Self::Fsm(m) => m.is_failed(),
            Self::Grammar(m) => m.is_failed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{AutomatonDef, GrammarDef, PropertyDef};

    fn compile(def: &PropertyDef) -> Formalism {
        let events = NameTable::from_names(def.events.iter().map(|e| e.name.as_str()));
        let signatures = vec![TypeSet::EMPTY; events.len()];
        Formalism::compile(def, &events, &signatures).unwrap()
    }

    #[test]
    fn automaton_formalism_roundtrip() {
        let def = PropertyDef::builder("p")
            .event("go", Vec::<&str>::new())
            .automaton(
                AutomatonDef::new("s0")
                    .state("s1")
                    .transition("s0", "go", "s1")
                    .category("done", ["s1"]),
            )
            .build()
            .unwrap();
        let f = compile(&def);
        let mut m = f.fresh_monitor();
        assert!(!m.is_failed());
        let raised = f.transition(&mut m, EventId::new(0));
        assert_eq!(raised.len(), 1);
        assert_eq!(f.category_name(raised[0]), "done");
    }

    #[test]
    fn grammar_formalism_roundtrip() {
        let def = PropertyDef::builder("p")
            .event("tick", Vec::<&str>::new())
            .grammar(GrammarDef::new("S").production("S", ["tick"]))
            .build()
            .unwrap();
        let f = compile(&def);
        assert_eq!(f.coenable().categories().count(), 1);
        let mut m = f.fresh_monitor();
        let raised = f.transition(&mut m, EventId::new(0));
        assert_eq!(raised.len(), 1);
        assert_eq!(f.category_name(raised[0]), "match");
    }

    #[test]
    fn fail_category_is_reserved_id() {
        assert!(CategoryId::FAIL.is_fail());
        assert!(!CategoryId::new(0).is_fail());
        let def = PropertyDef::builder("p")
            .event("go", Vec::<&str>::new())
            .automaton(AutomatonDef::new("s0"))
            .build()
            .unwrap();
        let f = compile(&def);
        assert_eq!(f.category_name(CategoryId::FAIL), "fail");
    }
}
