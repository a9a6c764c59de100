//! Algorithm B: one fresh monitor per exact combination.

use crate::combination::Combination;
use crate::error::InvariantError;
use crate::formalism::EventId;
use crate::property::AlgorithmKind;

use super::{SliceCtx, Slicer};

/// The naive policy. Every distinct combination ever sighted gets its own
/// monitor, always started from the initial configuration, never cloned.
/// There is no informativeness map; more informative combinations are
/// found by scanning the whole index. No garbage collection.
pub(crate) struct AlgorithmB;

impl Slicer for AlgorithmB {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::B
    }

    fn advance(
        &self,
        _event: EventId,
        combination: &Combination,
        ctx: &mut SliceCtx<'_>,
    ) -> Result<Vec<Combination>, InvariantError> {
        if !ctx.index.is_monitored(combination) {
            ctx.index
                .register(combination.clone(), ctx.formalism.fresh_monitor())?;
            ctx.stats.record_monitor_created();
        }
        let mut out = vec![combination.clone()];
        out.extend(
            ctx.index
                .combinations()
                .filter(|c| combination.is_strict_sub_of(c))
                .cloned(),
        );
        out.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        out.dedup();
        Ok(out)
    }
}
