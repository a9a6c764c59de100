//! Observed events as delivered by the instrumentation collaborator.
//!
//! An [`EventRecord`] is the raw observation: an event name, the parameters
//! bound at the observation site (by declared type name), a wall-clock
//! timestamp, and an optional source location for reports. Records are
//! resolved against a loaded property (names to dense ids, bindings to
//! canonical parameters) inside the session, so the same record can fan out
//! to several properties.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::param::{AlwaysLive, Liveness, ParamId};

/// One bound parameter inside an observed event, by declared type name.
#[derive(Clone)]
pub struct ParamBinding {
    ptype: String,
    id: ParamId,
    liveness: Arc<dyn Liveness>,
}

impl ParamBinding {
    /// Binds the object `id` to the parameter type named `ptype`.
    #[must_use]
    pub fn new(ptype: impl Into<String>, id: ParamId, liveness: Arc<dyn Liveness>) -> Self {
        Self {
            ptype: ptype.into(),
            id,
            liveness,
        }
    }

    /// Binding for an object that outlives the session.
    #[must_use]
    pub fn always_live(ptype: impl Into<String>, id: ParamId) -> Self {
        Self::new(ptype, id, Arc::new(AlwaysLive))
    }

    /// Declared parameter-type name.
    #[must_use]
    pub fn ptype(&self) -> &str {
        &self.ptype
    }

    /// Bound object identity.
    #[must_use]
    pub const fn id(&self) -> ParamId {
        self.id
    }

    /// Liveness handle supplied by the instrumentation.
    #[must_use]
    pub fn liveness(&self) -> &Arc<dyn Liveness> {
        &self.liveness
    }
}

impl fmt::Debug for ParamBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.ptype, self.id)
    }
}

/// Source position an event was observed at, carried through to reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Source file as the instrumentation names it.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
}

impl SourceLocation {
    /// Creates a location.
    #[must_use]
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// One observed program event.
///
/// Not serializable: bindings carry live [`Liveness`] handles, which exist
/// only inside the observed process.
#[derive(Clone)]
pub struct EventRecord {
    name: String,
    bindings: Vec<ParamBinding>,
    observed_at: DateTime<Utc>,
    location: Option<SourceLocation>,
}

impl EventRecord {
    /// Creates a record observed now.
    #[must_use]
    pub fn new(name: impl Into<String>, bindings: Vec<ParamBinding>) -> Self {
        Self {
            name: name.into(),
            bindings,
            observed_at: Utc::now(),
            location: None,
        }
    }

    /// Attaches a source location.
    #[must_use]
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Overrides the observation timestamp (replayed traces).
    #[must_use]
    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }

    /// Event name as declared in property alphabets.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameters bound at the observation site, in instrumentation order.
    #[must_use]
    pub fn bindings(&self) -> &[ParamBinding] {
        &self.bindings
    }

    /// Observation timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Source location, when the instrumentation provided one.
    #[must_use]
    pub const fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

impl fmt::Debug for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, b) in self.bindings.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{b:?}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_construction() {
        let rec = EventRecord::new(
            "next",
            vec![
                ParamBinding::always_live("iterator", ParamId::new(7)),
                ParamBinding::always_live("collection", ParamId::new(1)),
            ],
        );
        assert_eq!(rec.name(), "next");
        assert_eq!(rec.bindings().len(), 2);
        assert_eq!(rec.bindings()[0].ptype(), "iterator");
        assert!(rec.location().is_none());
    }

    #[test]
    fn record_with_location() {
        let rec = EventRecord::new("update", vec![])
            .with_location(SourceLocation::new("map.rs", 42));
        assert_eq!(format!("{}", rec.location().unwrap()), "map.rs:42");
    }

    #[test]
    fn record_debug_is_call_shaped() {
        let rec = EventRecord::new(
            "create",
            vec![ParamBinding::always_live("c", ParamId::new(3))],
        );
        assert_eq!(format!("{rec:?}"), "create(c=3)");
    }

    #[test]
    fn location_serde_roundtrip() {
        let loc = SourceLocation::new("tests/data.rs", 9);
        let json = serde_json::to_string(&loc).unwrap();
        let back: SourceLocation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, loc);
    }
}
