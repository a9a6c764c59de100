//! # TraceWarden - Parametric Runtime Verification
//!
//! TraceWarden checks event streams against parametric properties by trace
//! slicing: every observed combination of parameter bindings gets its own
//! monitor, and each monitor sees exactly the sub-trace relevant to it.
//!
//! ## Core Concepts
//!
//! - **Property**: a specification over a parameterized event alphabet,
//!   given as a finite automaton or a context-free grammar
//! - **Combination**: a canonical set of parameter bindings naming one
//!   trace slice
//! - **Monitor**: one formalism instance tracking one slice, raising
//!   categories as it moves
//! - **Algorithm**: B, C, C+, or D; how monitors are created, cloned, and
//!   fed as combinations grow
//! - **Coenable collection**: under Algorithm D, monitors whose remaining
//!   categories are unreachable are reclaimed as bound objects die
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tracewarden::{
//!     AlgorithmKind, AutomatonDef, EventRecord, ParamBinding, ParamId,
//!     PropertyDef, WardenEngine,
//! };
//!
//! // HasNext: calling next() without a preceding hasNext() is an error.
//! let def = PropertyDef::builder("HasNext")
//!     .param_type("i")
//!     .event("hasnext", ["i"])
//!     .event("next", ["i"])
//!     .creation("hasnext")
//!     .automaton(
//!         AutomatonDef::new("start")
//!             .state("safe")
//!             .transition("start", "hasnext", "safe")
//!             .transition("safe", "hasnext", "safe")
//!             .transition("safe", "next", "start")
//!             .category("unsafe_next", ["start"]),
//!     )
//!     .algorithm(AlgorithmKind::D)
//!     .build()?;
//!
//! let engine = WardenEngine::new();
//! let id = engine.load(def)?;
//! let verdicts = engine.session(id)?.subscribe_category("unsafe_next", 64)?;
//!
//! engine.observe(&EventRecord::new(
//!     "hasnext",
//!     vec![ParamBinding::always_live("i", ParamId::new(7))],
//! ));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod combination;
pub mod error;
pub mod event;
pub mod param;
pub mod property;

// Formalisms and slicing machinery
mod algo;
mod formalism;
mod gc;
mod index;

// Engine surface
pub mod dispatch;
pub mod engine;
pub mod stats;

// Re-export primary types at crate root for convenience
pub use combination::Combination;
pub use error::{ConfigError, InvariantError, ValidationError, WardenError, WardenResult};
pub use event::{EventRecord, ParamBinding, SourceLocation};
pub use param::{AlwaysLive, Liveness, LivenessFlag, Param, ParamId, ParamTypeId, WeakLive};
pub use property::{
    AlgorithmKind, AutomatonDef, CategoryDef, EventDef, FormalismDef, GrammarDef, ProductionDef,
    PropertyBuilder, PropertyDef, PropertyId, SessionConfig, TransitionDef,
};

pub use dispatch::{CategoryHandler, CategoryMatch, VerdictStream};
pub use engine::{PropertySession, WardenEngine};
pub use stats::{SpecStats, StatsSnapshot};
