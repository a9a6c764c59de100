//! Property definitions: the loadable description of what to verify.
//!
//! A [`PropertyDef`] is the contract with the formula-compilation
//! collaborator: parameter types, event signatures, creation events, a
//! compiled formalism payload (finite automaton or context-free grammar),
//! the slicing algorithm to run, and session tuning. Definitions are plain
//! serde data; [`PropertyDef::validate`] checks every cross-reference before
//! the engine compiles them into dense runtime tables.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;

/// Maximum number of declared events per property (dense-id bitset width).
pub const MAX_EVENTS: usize = 64;
/// Maximum number of declared parameter types per property.
pub const MAX_PARAM_TYPES: usize = 64;
/// Maximum number of declared match categories per property.
pub const MAX_CATEGORIES: usize = 64;

/// The reserved implicit category raised when a slice falls out of the
/// property language. Cannot be declared explicitly.
pub const FAIL_CATEGORY: &str = "fail";

/// Unique identifier assigned to a loaded property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyId(Uuid);

impl PropertyId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PropertyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The monitor-management algorithm a session runs.
///
/// The variants form a refinement chain: `B` keeps an independent monitor
/// per exact combination, `C` adds ancestor cloning through the
/// informativeness map, `CPlus` gates fresh monitors on declared creation
/// events, and `D` adds enable-set-driven eager creation plus garbage
/// collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgorithmKind {
    /// One fresh monitor per distinct combination, no inheritance.
    #[serde(rename = "b")]
    B,
    /// Clone-from-most-informative-ancestor with the informativeness map.
    #[serde(rename = "c")]
    C,
    /// `C` with fresh monitors restricted to declared creation events.
    #[serde(rename = "c+")]
    CPlus,
    /// `C+` with enable-set eager creation and coenable garbage collection.
    #[serde(rename = "d")]
    D,
}

impl AlgorithmKind {
    /// Whether new combinations inherit verdict-relevant history from
    /// monitored ancestors.
    #[must_use]
    pub const fn inherits_history(self) -> bool {
        !matches!(self, Self::B)
    }

    /// Whether fresh monitors are created only on declared creation events.
    #[must_use]
    pub const fn creation_gated(self) -> bool {
        matches!(self, Self::CPlus | Self::D)
    }

    /// Whether the session runs the coenable-set garbage collector.
    #[must_use]
    pub const fn collects(self) -> bool {
        matches!(self, Self::D)
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::B => "B",
            Self::C => "C",
            Self::CPlus => "C+",
            Self::D => "D",
        };
        write!(f, "{name}")
    }
}

/// One event in the property alphabet, with its parameter signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDef {
    /// Event name, unique within the property.
    pub name: String,
    /// Parameter types this event binds (a subset of the declared types).
    pub params: Vec<String>,
}

impl EventDef {
    /// Creates an event definition.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }
}

/// One explicit automaton transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionDef {
    /// Source state.
    pub from: String,
    /// Event label.
    pub event: String,
    /// Target state.
    pub to: String,
}

/// One named match category mapped to its goal states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDef {
    /// Category name (`fail` is reserved).
    pub name: String,
    /// States whose entry raises this category.
    pub states: Vec<String>,
}

/// Compiled finite-automaton payload.
///
/// Events without an explicit transition from the current state fall back
/// to that state's default target when one is declared; with no default the
/// monitor fails (sticky).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomatonDef {
    /// Declared states.
    pub states: Vec<String>,
    /// Initial state.
    pub initial: String,
    /// Explicit transitions; at most one per (state, event) pair.
    pub transitions: Vec<TransitionDef>,
    /// Per-state fallback target for events without an explicit transition.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
    /// Declared match categories.
    #[serde(default)]
    pub categories: Vec<CategoryDef>,
}

impl AutomatonDef {
    /// Starts an automaton with only its initial state declared.
    #[must_use]
    pub fn new(initial: impl Into<String>) -> Self {
        let initial = initial.into();
        Self {
            states: vec![initial.clone()],
            initial,
            transitions: Vec::new(),
            defaults: BTreeMap::new(),
            categories: Vec::new(),
        }
    }

    /// Declares a state.
    #[must_use]
    pub fn state(mut self, name: impl Into<String>) -> Self {
        self.states.push(name.into());
        self
    }

    /// Adds an explicit transition.
    #[must_use]
    pub fn transition(
        mut self,
        from: impl Into<String>,
        event: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.transitions.push(TransitionDef {
            from: from.into(),
            event: event.into(),
            to: to.into(),
        });
        self
    }

    /// Declares a fallback target for unlisted events in `state`.
    #[must_use]
    pub fn default_target(mut self, state: impl Into<String>, to: impl Into<String>) -> Self {
        self.defaults.insert(state.into(), to.into());
        self
    }

    /// Declares a match category over goal states.
    #[must_use]
    pub fn category<I, S>(mut self, name: impl Into<String>, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories.push(CategoryDef {
            name: name.into(),
            states: states.into_iter().map(Into::into).collect(),
        });
        self
    }
}

/// One grammar production; an empty right-hand side is epsilon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionDef {
    /// Nonterminal being defined.
    pub lhs: String,
    /// Sequence of event terminals and nonterminals.
    pub rhs: Vec<String>,
}

/// Compiled context-free-grammar payload.
///
/// Terminals are event names; a symbol is a nonterminal when it appears on
/// some production's left-hand side. The match category fires whenever the
/// consumed slice prefix is a complete word of the language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarDef {
    /// Start nonterminal.
    pub start: String,
    /// Productions.
    pub productions: Vec<ProductionDef>,
    /// Category raised on complete-word prefixes (defaults to `match`).
    #[serde(default = "GrammarDef::default_match_category")]
    pub match_category: String,
}

impl GrammarDef {
    fn default_match_category() -> String {
        "match".to_string()
    }

    /// Starts a grammar with no productions.
    #[must_use]
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            productions: Vec::new(),
            match_category: Self::default_match_category(),
        }
    }

    /// Adds a production.
    #[must_use]
    pub fn production<I, S>(mut self, lhs: impl Into<String>, rhs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.productions.push(ProductionDef {
            lhs: lhs.into(),
            rhs: rhs.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Overrides the match category name.
    #[must_use]
    pub fn match_as(mut self, category: impl Into<String>) -> Self {
        self.match_category = category.into();
        self
    }
}

/// The formalism payload of a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "formalism", rename_all = "snake_case")]
pub enum FormalismDef {
    /// Finite automaton over the event alphabet.
    Automaton(AutomatonDef),
    /// Context-free grammar over the event alphabet.
    Grammar(GrammarDef),
}

/// Per-session tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Record each monitor's event-name slice for inspection. Costs one
    /// string push per advanced monitor per event; off by default.
    #[serde(default)]
    pub record_slices: bool,
}

/// A complete loadable property definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    /// Property name, used in reports and error messages.
    pub name: String,
    /// Declared parameter types, in declaration order.
    pub param_types: Vec<String>,
    /// The event alphabet with signatures.
    pub events: Vec<EventDef>,
    /// Events allowed to start fresh monitors under C+ and D.
    #[serde(default)]
    pub creation_events: Vec<String>,
    /// The compiled formalism.
    pub formalism: FormalismDef,
    /// The slicing algorithm to run.
    pub algorithm: AlgorithmKind,
    /// Session tuning.
    #[serde(default)]
    pub config: SessionConfig,
}

impl PropertyDef {
    /// Starts a builder.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> PropertyBuilder {
        PropertyBuilder::new(name)
    }

    /// Checks every cross-reference in the definition.
    ///
    /// Called by the engine before compiling; exposed so the formula
    /// compiler can validate eagerly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::MissingSection { what: "a name" });
        }
        if self.events.is_empty() {
            return Err(ConfigError::MissingSection { what: "events" });
        }
        check_capacity("parameter types", self.param_types.len(), MAX_PARAM_TYPES)?;
        check_capacity("events", self.events.len(), MAX_EVENTS)?;
        check_unique("parameter type", self.param_types.iter().map(String::as_str))?;
        check_unique("event", self.events.iter().map(|e| e.name.as_str()))?;

        let types: HashSet<&str> = self.param_types.iter().map(String::as_str).collect();
        let events: HashSet<&str> = self.events.iter().map(|e| e.name.as_str()).collect();

        for event in &self.events {
            for ptype in &event.params {
                if !types.contains(ptype.as_str()) {
                    return Err(ConfigError::UnknownParamType {
                        event: event.name.clone(),
                        param_type: ptype.clone(),
                    });
                }
            }
        }
        for creation in &self.creation_events {
            if !events.contains(creation.as_str()) {
                return Err(ConfigError::UnknownCreationEvent {
                    event: creation.clone(),
                });
            }
        }
        match &self.formalism {
            FormalismDef::Automaton(def) => validate_automaton(def, &events),
            FormalismDef::Grammar(def) => validate_grammar(def, &events),
        }
    }
}

fn check_capacity(kind: &'static str, count: usize, max: usize) -> Result<(), ConfigError> {
    if count > max {
        return Err(ConfigError::CapacityExceeded { kind, count, max });
    }
    Ok(())
}

fn check_unique<'a>(
    kind: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

fn validate_automaton(def: &AutomatonDef, events: &HashSet<&str>) -> Result<(), ConfigError> {
    if def.states.is_empty() {
        return Err(ConfigError::MissingSection { what: "states" });
    }
    check_unique("state", def.states.iter().map(String::as_str))?;
    check_capacity("categories", def.categories.len(), MAX_CATEGORIES)?;

    let states: HashSet<&str> = def.states.iter().map(String::as_str).collect();
    if !states.contains(def.initial.as_str()) {
        return Err(ConfigError::UnknownState {
            state: def.initial.clone(),
            context: "the initial state".to_string(),
        });
    }

    let mut labeled: HashSet<(&str, &str)> = HashSet::new();
    for t in &def.transitions {
        if !events.contains(t.event.as_str()) {
            return Err(ConfigError::UnknownEvent {
                event: t.event.clone(),
                context: format!("transition from '{}'", t.from),
            });
        }
        if !states.contains(t.from.as_str()) {
            return Err(ConfigError::UnknownState {
                state: t.from.clone(),
                context: format!("transition on '{}'", t.event),
            });
        }
        if !states.contains(t.to.as_str()) {
            return Err(ConfigError::UnknownState {
                state: t.to.clone(),
                context: format!("transition on '{}' from '{}'", t.event, t.from),
            });
        }
        if !labeled.insert((t.from.as_str(), t.event.as_str())) {
            return Err(ConfigError::DuplicateName {
                kind: "transition",
                name: format!("{}/{}", t.from, t.event),
            });
        }
    }
    for (from, to) in &def.defaults {
        if !states.contains(from.as_str()) {
            return Err(ConfigError::UnknownState {
                state: from.clone(),
                context: "a default transition".to_string(),
            });
        }
        if !states.contains(to.as_str()) {
            return Err(ConfigError::UnknownState {
                state: to.clone(),
                context: format!("default transition from '{from}'"),
            });
        }
    }
    check_unique("category", def.categories.iter().map(|c| c.name.as_str()))?;
    for category in &def.categories {
        if category.name == FAIL_CATEGORY {
            return Err(ConfigError::ReservedCategory);
        }
        for state in &category.states {
            if !states.contains(state.as_str()) {
                return Err(ConfigError::UnknownState {
                    state: state.clone(),
                    context: format!("category '{}'", category.name),
                });
            }
        }
    }
    Ok(())
}

fn validate_grammar(def: &GrammarDef, events: &HashSet<&str>) -> Result<(), ConfigError> {
    if def.match_category == FAIL_CATEGORY {
        return Err(ConfigError::ReservedCategory);
    }
    let nonterminals: HashSet<&str> = def.productions.iter().map(|p| p.lhs.as_str()).collect();
    if def.productions.is_empty() || !nonterminals.contains(def.start.as_str()) {
        return Err(ConfigError::EmptyGrammar {
            symbol: def.start.clone(),
        });
    }
    for nt in &nonterminals {
        if events.contains(nt) {
            return Err(ConfigError::DuplicateName {
                kind: "grammar symbol",
                name: (*nt).to_string(),
            });
        }
    }
    for production in &def.productions {
        for symbol in &production.rhs {
            let s = symbol.as_str();
            if !events.contains(s) && !nonterminals.contains(s) {
                return Err(ConfigError::UnknownGrammarSymbol {
                    symbol: symbol.clone(),
                    nonterminal: production.lhs.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Fluent assembly of a [`PropertyDef`].
///
/// `build` validates the assembled definition; the algorithm defaults to
/// [`AlgorithmKind::D`], the full engine.
#[derive(Debug, Clone)]
pub struct PropertyBuilder {
    name: String,
    param_types: Vec<String>,
    events: Vec<EventDef>,
    creation_events: Vec<String>,
    formalism: Option<FormalismDef>,
    algorithm: AlgorithmKind,
    config: SessionConfig,
}

impl PropertyBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_types: Vec::new(),
            events: Vec::new(),
            creation_events: Vec::new(),
            formalism: None,
            algorithm: AlgorithmKind::D,
            config: SessionConfig::default(),
        }
    }

    /// Declares a parameter type.
    #[must_use]
    pub fn param_type(mut self, name: impl Into<String>) -> Self {
        self.param_types.push(name.into());
        self
    }

    /// Declares an event with its signature.
    #[must_use]
    pub fn event<I, S>(mut self, name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events.push(EventDef::new(name, params));
        self
    }

    /// Marks an already declared event as a creation event.
    #[must_use]
    pub fn creation(mut self, event: impl Into<String>) -> Self {
        self.creation_events.push(event.into());
        self
    }

    /// Sets an automaton formalism.
    #[must_use]
    pub fn automaton(mut self, def: AutomatonDef) -> Self {
        self.formalism = Some(FormalismDef::Automaton(def));
        self
    }

    /// Sets a grammar formalism.
    #[must_use]
    pub fn grammar(mut self, def: GrammarDef) -> Self {
        self.formalism = Some(FormalismDef::Grammar(def));
        self
    }

    /// Selects the slicing algorithm.
    #[must_use]
    pub fn algorithm(mut self, kind: AlgorithmKind) -> Self {
        self.algorithm = kind;
        self
    }

    /// Enables per-monitor slice recording.
    #[must_use]
    pub fn record_slices(mut self, on: bool) -> Self {
        self.config.record_slices = on;
        self
    }

    /// Validates and produces the definition.
    pub fn build(self) -> Result<PropertyDef, ConfigError> {
        let formalism = self
            .formalism
            .ok_or(ConfigError::MissingSection { what: "a formalism" })?;
        let def = PropertyDef {
            name: self.name,
            param_types: self.param_types,
            events: self.events,
            creation_events: self.creation_events,
            formalism,
            algorithm: self.algorithm,
            config: self.config,
        };
        def.validate()?;
        Ok(def)
    }
}

/// Resolves declared names to dense ids in declaration order.
///
/// Shared by the automaton and grammar compilers; lookups borrow, so the
/// per-event hot path never allocates for name resolution.
#[derive(Debug, Clone, Default)]
pub(crate) struct NameTable {
    by_name: HashMap<String, u32>,
    names: Vec<String>,
}

impl NameTable {
    pub(crate) fn from_names<'a>(names: impl Iterator<Item = &'a str>) -> Self {
        let mut table = Self::default();
        for name in names {
            table.insert(name);
        }
        table
    }

    pub(crate) fn insert(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = u32::try_from(self.names.len()).unwrap_or(u32::MAX);
        self.by_name.insert(name.to_string(), id);
        self.names.push(name.to_string());
        id
    }

    pub(crate) fn get(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn name(&self, id: u32) -> &str {
        &self.names[id as usize]
    }

    pub(crate) fn len(&self) -> usize {
        self.names.len()
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
