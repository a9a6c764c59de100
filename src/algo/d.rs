//! Algorithm D: creation gating, eager enable-guided joins, lineage
//! validated clones.

use crate::combination::Combination;
use crate::error::InvariantError;
use crate::formalism::{EventId, EventSet};
use crate::property::AlgorithmKind;

use super::{
    bound_types, cascade, define_new, define_to, feed_list, monitored_ancestor, SliceCtx, Slicer,
};

/// The collecting policy.
///
/// Creation follows C+ with one addition: when an unmonitored combination
/// has no monitored ancestor, the enable analysis of the event is consulted
/// and, per required type-set, the most informative registered combination
/// whose bound types properly straddle that set seeds an eager join. Every
/// clone validates lineage through the index timestamps; a refused clone is
/// a silent no-op for this event. The session pairs this policy with the
/// garbage collector after each transition.
pub(crate) struct AlgorithmD {
    creation: EventSet,
}

impl AlgorithmD {
    pub(crate) fn new(creation: EventSet) -> Self {
        Self { creation }
    }

    /// Eager creation from the enable analysis.
    ///
    /// A candidate qualifies for a type-set when its bound types overlap it
    /// properly: sharing at least one type, covering neither the type-set
    /// nor the candidate's own binding. Such a candidate holds history the
    /// plain ancestor search cannot reach because neither side is a subset
    /// of the other; the join is where both slices meet.
    fn eager_joins(
        &self,
        event: EventId,
        combination: &Combination,
        ctx: &mut SliceCtx<'_>,
    ) -> Result<(), InvariantError> {
        let entry = ctx.formalism.enable().entry(event);
        for &required in &entry.type_sets {
            let mut best: Option<Combination> = None;
            for candidate in ctx.index.combinations() {
                if !candidate.is_compatible(combination) {
                    continue;
                }
                let bound = bound_types(candidate);
                let shared = bound.intersection(required);
                if shared.is_empty() || shared == required || shared == bound {
                    continue;
                }
                match &best {
                    Some(current) if current.len() >= candidate.len() => {}
                    _ => best = Some(candidate.clone()),
                }
            }
            if let Some(source) = best {
                let Some(join) = source.join(combination) else {
                    continue;
                };
                if !ctx.index.is_monitored(&join) {
                    define_to(&join, &source, ctx, true)?;
                }
            }
        }
        Ok(())
    }
}

impl Slicer for AlgorithmD {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::D
    }

    fn advance(
        &self,
        event: EventId,
        combination: &Combination,
        ctx: &mut SliceCtx<'_>,
    ) -> Result<Vec<Combination>, InvariantError> {
        if !ctx.index.is_monitored(combination) {
            match monitored_ancestor(combination, ctx.index) {
                Some(ancestor) => {
                    define_to(combination, &ancestor, ctx, true)?;
                }
                None => {
                    self.eager_joins(event, combination, ctx)?;
                    if !ctx.index.is_monitored(combination) && self.creation.contains(event) {
                        define_new(combination, ctx)?;
                    }
                }
            }
            cascade(combination, ctx, true)?;
        }
        Ok(feed_list(combination, ctx.index))
    }
}
