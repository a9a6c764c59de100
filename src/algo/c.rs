//! Algorithms C and C+: ancestor cloning over the informativeness map.

use crate::combination::Combination;
use crate::error::InvariantError;
use crate::formalism::{EventId, EventSet};
use crate::property::AlgorithmKind;

use super::{cascade, define_new, define_to, feed_list, monitored_ancestor, SliceCtx, Slicer};

/// Ancestor-cloning policy.
///
/// On first sight of an unmonitored combination the proper
/// sub-combinations are scanned in decreasing size order and the first
/// monitored one seeds the new monitor by value clone. Without such an
/// ancestor a fresh monitor is created, unconditionally for C, only on
/// declared creation events for C+. Either way the compatible-combination
/// cascade then materializes every join the new sighting makes monitorable.
pub(crate) struct AlgorithmC {
    creation: Option<EventSet>,
}

impl AlgorithmC {
    /// Plain C: fresh monitors on any event.
    pub(crate) fn unrestricted() -> Self {
        Self { creation: None }
    }

    /// C+: fresh monitors only on declared creation events.
    pub(crate) fn creation_gated(creation: EventSet) -> Self {
        Self {
            creation: Some(creation),
        }
    }

    fn may_create(&self, event: EventId) -> bool {
        match self.creation {
            None => true,
            Some(set) => set.contains(event),
        }
    }
}

impl Slicer for AlgorithmC {
    fn kind(&self) -> AlgorithmKind {
        if self.creation.is_some() {
            AlgorithmKind::CPlus
        } else {
            AlgorithmKind::C
        }
    }

    fn advance(
        &self,
        event: EventId,
        combination: &Combination,
        ctx: &mut SliceCtx<'_>,
    ) -> Result<Vec<Combination>, InvariantError> {
        if !ctx.index.is_monitored(combination) {
            if let Some(ancestor) = monitored_ancestor(combination, ctx.index) {
                define_to(combination, &ancestor, ctx, false)?;
            } else if self.may_create(event) {
                define_new(combination, ctx)?;
            }
            cascade(combination, ctx, false)?;
        }
        Ok(feed_list(combination, ctx.index))
    }
}
