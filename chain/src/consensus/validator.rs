//! Block validity predicates used by the chain engine.

use crate::protocol::ExecutionContext;
use crate::types::Block;

use super::error::ValidationError;

/// Pluggable validity predicate for blocks.
///
/// Implementations should be deterministic and side-effect free. The
/// context carries the candidate's [`crate::protocol::BlockCtx`] and the
/// features active at its height, so height-dependent rules can be applied
/// without reaching back into the chain.
pub trait BlockValidator: Send + Sync {
    fn validate(&self, ctx: &ExecutionContext, block: &Block) -> Result<(), ValidationError>;
}

/// A trivial validator that accepts every block.
///
/// Useful for tests and for isolating chain logic while the real validity
/// predicates are being developed.
pub struct AcceptAllValidator;

impl BlockValidator for AcceptAllValidator {
    fn validate(&self, _ctx: &ExecutionContext, _block: &Block) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// A validator that composes two other validators.
///
/// `CombinedValidator { first, second }` runs `first.validate` and then
/// `second.validate`, failing fast on the first error.
pub struct CombinedValidator<A, B> {
    pub first: A,
    pub second: B,
}

impl<A, B> CombinedValidator<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A, B> BlockValidator for CombinedValidator<A, B>
where
    A: BlockValidator,
    B: BlockValidator,
{
    fn validate(&self, ctx: &ExecutionContext, block: &Block) -> Result<(), ValidationError> {
        self.first.validate(ctx, block)?;
        self.second.validate(ctx, block)?;
        Ok(())
    }
}
