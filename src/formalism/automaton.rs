//! Compiled finite-automaton formalism.
//!
//! Compilation interns states, flattens explicit transitions and per-state
//! defaults into one dense table, precomputes the category list raised by
//! entering each state, and runs the enable/coenable analyses. The
//! per-event transition is then two array lookups and allocates nothing.

use crate::error::ConfigError;
use crate::property::{AutomatonDef, NameTable, FAIL_CATEGORY};

use super::analysis::{automaton_coenable, automaton_enable, CoenableMap, EnableMap, TypeSet};
use super::{CategoryId, EventId, StateId, FAIL_VERDICT};

/// A compiled deterministic automaton with its precomputed analyses.
#[derive(Debug, Clone)]
pub struct CompiledAutomaton {
    n_events: usize,
    initial: StateId,
    /// Row-major (state, event) table; `None` means the monitor fails.
    table: Vec<Option<StateId>>,
    /// Categories raised by entering each state, sorted by id.
    state_categories: Vec<Vec<CategoryId>>,
    state_names: NameTable,
    categories: NameTable,
    enable: EnableMap,
    coenable: CoenableMap,
}

impl CompiledAutomaton {
    pub(crate) fn compile(
        def: &AutomatonDef,
        events: &NameTable,
        signatures: &[TypeSet],
    ) -> Result<Self, ConfigError> {
        debug_assert_eq!(events.len(), signatures.len());
        let mut state_names = NameTable::default();
        for state in &def.states {
            state_names.insert(state);
        }
        let n_states = state_names.len();
        let n_events = events.len();

        let initial = state_names
            .get(&def.initial)
            .map(StateId::new)
            .ok_or_else(|| ConfigError::UnknownState {
                state: def.initial.clone(),
                context: "the initial state".to_string(),
            })?;

        let mut table: Vec<Option<StateId>> = vec![None; n_states * n_events];
        for t in &def.transitions {
            let from = state_names
                .get(&t.from)
                .ok_or_else(|| ConfigError::UnknownState {
                    state: t.from.clone(),
                    context: format!("transition on '{}'", t.event),
                })?;
            let event = events.get(&t.event).ok_or_else(|| ConfigError::UnknownEvent {
                event: t.event.clone(),
                context: format!("transition from '{}'", t.from),
            })?;
            let to = state_names
                .get(&t.to)
                .ok_or_else(|| ConfigError::UnknownState {
                    state: t.to.clone(),
                    context: format!("transition on '{}' from '{}'", t.event, t.from),
                })?;
            let slot = &mut table[from as usize * n_events + event as usize];
            if slot.is_some() {
                return Err(ConfigError::DuplicateName {
                    kind: "transition",
                    name: format!("{}/{}", t.from, t.event),
                });
            }
            *slot = Some(StateId::new(to));
        }
        // Defaults fill the remaining holes of their state's row.
        for (from, to) in &def.defaults {
            let from = state_names
                .get(from)
                .ok_or_else(|| ConfigError::UnknownState {
                    state: from.clone(),
                    context: "a default transition".to_string(),
                })?;
            let to = state_names.get(to).ok_or_else(|| ConfigError::UnknownState {
                state: to.clone(),
                context: format!("default transition from '{}'", state_names.name(from)),
            })?;
            for slot in &mut table[from as usize * n_events..(from as usize + 1) * n_events] {
                if slot.is_none() {
                    *slot = Some(StateId::new(to));
                }
            }
        }

        let mut categories = NameTable::default();
        let mut goal_states: Vec<Vec<StateId>> = Vec::with_capacity(def.categories.len());
        for category in &def.categories {
            if category.name == FAIL_CATEGORY {
                return Err(ConfigError::ReservedCategory);
            }
            categories.insert(&category.name);
            let mut goals = Vec::with_capacity(category.states.len());
            for state in &category.states {
                let id = state_names
                    .get(state)
                    .ok_or_else(|| ConfigError::UnknownState {
                        state: state.clone(),
                        context: format!("category '{}'", category.name),
                    })?;
                goals.push(StateId::new(id));
            }
            goals.sort_unstable();
            goals.dedup();
            goal_states.push(goals);
        }

        let mut state_categories: Vec<Vec<CategoryId>> = vec![Vec::new(); n_states];
        for (c, goals) in goal_states.iter().enumerate() {
            for goal in goals {
                state_categories[goal.index()].push(CategoryId::new(c as u32));
            }
        }

        let enable = automaton_enable(&table, n_states, n_events, initial, signatures);
        let coenable = automaton_coenable(&table, n_states, n_events, &goal_states, signatures);

        Ok(Self {
            n_events,
            initial,
            table,
            state_categories,
            state_names,
            categories,
            enable,
            coenable,
        })
    }

    pub(crate) fn fresh(&self) -> FsmMonitor {
        FsmMonitor {
            state: self.initial,
            failed: false,
        }
    }

    pub(crate) fn transition(&self, monitor: &mut FsmMonitor, event: EventId) -> &[CategoryId] {
        if monitor.failed {
            return FAIL_VERDICT;
        }
        match self.table[monitor.state.index() * self.n_events + event.index()] {
            Some(next) => {
                monitor.state = next;
                &self.state_categories[next.index()]
            }
            None => {
                monitor.failed = true;
                FAIL_VERDICT
            }
        }
    }

    /// Declared name of a category.
    #[must_use]
    pub fn category_name(&self, category: CategoryId) -> &str {
        self.categories.name(category.0)
    }

    /// Declared name of a state.
    #[must_use]
    pub fn state_name(&self, state: StateId) -> &str {
        self.state_names.name(state.0)
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

/// Automaton monitor: one current state plus a sticky failed flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsmMonitor {
    state: StateId,
    failed: bool,
}

impl FsmMonitor {
    /// The current state.
    #[must_use]
    pub const fn state(&self) -> StateId {
        self.state
    }

    /// Whether the monitor has failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.failed
    }
}
