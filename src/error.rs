//! Error types for TraceWarden.
//!
//! All errors are strongly typed using thiserror and grouped by the phase
//! that produces them: property load (`ConfigError`), per-event input
//! validation (`ValidationError`), and internal algorithm invariants
//! (`InvariantError`). Handler faults are intentionally not represented
//! here: a panicking handler is isolated and counted, never propagated.

use thiserror::Error;

use crate::property::AlgorithmKind;

/// Errors raised while loading and compiling a property definition.
///
/// A `ConfigError` is fatal for the property being loaded and for that
/// property only; previously loaded properties keep running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The definition referenced a state that was never declared.
    #[error("unknown state '{state}' referenced by {context}")]
    UnknownState {
        /// The undeclared state name.
        state: String,
        /// Where the reference appeared (initial, transition, category, ...).
        context: String,
    },

    /// The definition referenced an event outside the declared alphabet.
    #[error("unknown event '{event}' referenced by {context}")]
    UnknownEvent {
        /// The undeclared event name.
        event: String,
        /// Where the reference appeared.
        context: String,
    },

    /// An event signature referenced an undeclared parameter type.
    #[error("event '{event}' binds unknown parameter type '{param_type}'")]
    UnknownParamType {
        /// The event whose signature is malformed.
        event: String,
        /// The undeclared parameter type name.
        param_type: String,
    },

    /// A declared creation event is absent from the property's alphabet.
    #[error("creation event '{event}' is not part of the property alphabet")]
    UnknownCreationEvent {
        /// The offending creation event name.
        event: String,
    },

    /// A grammar production referenced a symbol that is neither a declared
    /// event nor a defined nonterminal.
    #[error("grammar symbol '{symbol}' in production for '{nonterminal}' is neither an event nor a nonterminal")]
    UnknownGrammarSymbol {
        /// The undefined symbol.
        symbol: String,
        /// The nonterminal whose production used it.
        nonterminal: String,
    },

    /// The grammar start symbol has no productions.
    #[error("grammar start symbol '{symbol}' has no productions")]
    EmptyGrammar {
        /// The start symbol.
        symbol: String,
    },

    /// A name was declared twice in the same namespace.
    #[error("duplicate {kind} '{name}' in property definition")]
    DuplicateName {
        /// What was duplicated (state, event, parameter type, category).
        kind: &'static str,
        /// The duplicated name.
        name: String,
    },

    /// The category name `fail` is implicit and cannot be declared.
    #[error("category name 'fail' is reserved for the implicit failure verdict")]
    ReservedCategory,

    /// An interning table exceeded its dense-id capacity.
    #[error("too many {kind}: {count} declared, at most {max} supported")]
    CapacityExceeded {
        /// Which table overflowed (events, parameter types, categories).
        kind: &'static str,
        /// How many were declared.
        count: usize,
        /// The supported maximum.
        max: usize,
    },

    /// A required section of the definition was empty.
    #[error("property definition is missing {what}")]
    MissingSection {
        /// The missing section (states, events, initial state, ...).
        what: &'static str,
    },
}

/// Errors raised when an observed event cannot be interpreted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The event name is not part of this property's alphabet.
    #[error("event '{event}' is not declared by property '{property}'")]
    UndeclaredEvent {
        /// The observed event name.
        event: String,
        /// The property it was delivered to.
        property: String,
    },

    /// The event bound a parameter type the property never declared.
    #[error("event '{event}' bound undeclared parameter type '{param_type}'")]
    UndeclaredParamType {
        /// The observed event name.
        event: String,
        /// The unknown parameter type name.
        param_type: String,
    },

    /// One parameter type was bound to two different identities within a
    /// single event. Slicing has no meaning for such an event.
    #[error("event '{event}' bound parameter type '{param_type}' to two identities")]
    ConflictingBinding {
        /// The observed event name.
        event: String,
        /// The doubly-bound parameter type name.
        param_type: String,
    },

    /// The event bound types outside the event's declared signature.
    #[error("event '{event}' bound parameter type '{param_type}' outside its signature")]
    SignatureMismatch {
        /// The observed event name.
        event: String,
        /// The out-of-signature parameter type name.
        param_type: String,
    },
}

/// Violations of internal algorithm invariants.
///
/// These indicate a bug in the slicing algorithms, not a data problem. They
/// are surfaced loudly: the session logs the violation and aborts monitoring
/// for its property; they are never silently ignored or retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantError {
    /// A monitor was registered twice for the same combination.
    #[error("duplicate monitor registration for combination {combination}")]
    DuplicateMonitor {
        /// Display form of the offending combination.
        combination: String,
    },

    /// The garbage collector was constructed for an algorithm that does not
    /// drive collection.
    #[error("garbage collector constructed for algorithm {algorithm}, which never collects")]
    CollectorAlgorithm {
        /// The non-collecting algorithm.
        algorithm: AlgorithmKind,
    },

    /// Collection was requested for a combination with no registered monitor.
    #[error("collection requested for unmonitored combination {combination}")]
    CollectUnmonitored {
        /// Display form of the offending combination.
        combination: String,
    },
}

/// Top-level error type for TraceWarden operations.
#[derive(Debug, Error)]
pub enum WardenError {
    /// Property load/compilation failure.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Observed-event validation failure.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Internal invariant violation.
    #[error("invariant violation: {0}")]
    Invariant(#[from] InvariantError),

    /// The session previously hit an invariant violation and refuses events.
    #[error("property '{property}' aborted monitoring: {reason}")]
    SessionAborted {
        /// The aborted property's name.
        property: String,
        /// The original violation, rendered.
        reason: String,
    },

    /// No property is loaded under the given id.
    #[error("no property loaded under id {id}")]
    PropertyNotFound {
        /// The missing property id, rendered.
        id: String,
    },

    /// Unexpected internal failure, such as a poisoned lock.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable description.
        message: String,
    },
}

impl WardenError {
    /// Builds a [`WardenError::Internal`] from a message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a load-time configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is a per-event validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an internal invariant violation.
    #[must_use]
    pub const fn is_invariant(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}

/// Result type alias for TraceWarden operations.
pub type WardenResult<T> = Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_unknown_state() {
        let err = ConfigError::UnknownState {
            state: "s9".to_string(),
            context: "transition from 's0'".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("s9"));
        assert!(msg.contains("transition"));
    }

    #[test]
    fn config_error_capacity() {
        let err = ConfigError::CapacityExceeded {
            kind: "events",
            count: 70,
            max: 64,
        };
        let msg = format!("{err}");
        assert!(msg.contains("70"));
        assert!(msg.contains("64"));
    }

    #[test]
    fn validation_error_conflicting_binding() {
        let err = ValidationError::ConflictingBinding {
            event: "acquire".to_string(),
            param_type: "lock".to_string(),
        };
        assert!(format!("{err}").contains("two identities"));
    }

    #[test]
    fn invariant_error_duplicate_monitor() {
        let err = InvariantError::DuplicateMonitor {
            combination: "{r-1, c-2}".to_string(),
        };
        assert!(format!("{err}").contains("{r-1, c-2}"));
    }

    #[test]
    fn warden_error_from_config() {
        let err: WardenError = ConfigError::ReservedCategory.into();
        assert!(err.is_config());
        assert!(!err.is_validation());
        assert!(!err.is_invariant());
    }

    #[test]
    fn warden_error_from_invariant() {
        let err: WardenError = InvariantError::CollectUnmonitored {
            combination: "{}".to_string(),
        }
        .into();
        assert!(err.is_invariant());
        assert!(format!("{err}").contains("invariant violation"));
    }

    #[test]
    fn warden_error_session_aborted_display() {
        let err = WardenError::SessionAborted {
            property: "HasNext".to_string(),
            reason: "duplicate monitor".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("HasNext"));
        assert!(msg.contains("duplicate monitor"));
    }
}
