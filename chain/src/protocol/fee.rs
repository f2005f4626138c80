//! Fee market rules.
//!
//! - [`calc_base_fee`] derives the EIP-1559 base fee of the block after a tip,
//! - [`verify_eip1559_header`] checks a candidate header against it,
//! - [`calc_excess_blob_gas`] carries the EIP-4844 excess blob gas forward.

use thiserror::Error;

use super::TipInfo;
use crate::genesis::Genesis;
use crate::types::Header;

/// Base fee verification failures.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum FeeError {
    #[error("header is missing base fee")]
    MissingBaseFee,

    #[error("invalid base fee: have {actual}, want {expected}")]
    BaseFeeMismatch { expected: u128, actual: u128 },
}

/// Base fee of the block following `parent`.
///
/// The first block after dynamic fees activate (or any block whose parent
/// carried no base fee) uses the configured initial base fee. Afterwards
/// the fee moves towards the gas target by at most `1 / denominator` per
/// block and never drops below the configured floor.
pub fn calc_base_fee(genesis: &Genesis, parent: &TipInfo) -> u128 {
    let fee = &genesis.blockchain.fee;
    let parent_fee = match parent.base_fee {
        Some(f) if genesis.is_dynamic_fee_active(parent.height) => f,
        _ => return fee.initial_base_fee,
    };

    let target = u128::from(
        genesis.block_gas_limit_by_height(parent.height) / fee.elasticity_multiplier.max(1),
    );
    let used = u128::from(parent.gas_used);
    if target == 0 || used == target {
        return parent_fee;
    }

    let denominator = fee.base_fee_change_denominator.max(1);
    if used > target {
        let delta = (mul_div(parent_fee, used - target, target) / denominator).max(1);
        parent_fee.saturating_add(delta)
    } else {
        let delta = mul_div(parent_fee, target - used, target) / denominator;
        parent_fee.saturating_sub(delta).max(fee.min_base_fee)
    }
}

/// `a * b / c` rounded down, saturating at `u128::MAX`.
///
/// `b` and `c` are gas amounts, so `(a % c) * b` always fits.
fn mul_div(a: u128, b: u128, c: u128) -> u128 {
    let (q, r) = (a / c, a % c);
    q.saturating_mul(b).saturating_add(r * b / c)
}

/// Verifies that `header` carries the base fee implied by `parent`.
pub fn verify_eip1559_header(
    genesis: &Genesis,
    parent: &TipInfo,
    header: &Header,
) -> Result<(), FeeError> {
    let actual = header.base_fee.ok_or(FeeError::MissingBaseFee)?;
    let expected = calc_base_fee(genesis, parent);
    if actual != expected {
        return Err(FeeError::BaseFeeMismatch { expected, actual });
    }
    Ok(())
}

/// Excess blob gas of the block following a parent with the given values.
pub fn calc_excess_blob_gas(parent_excess: u64, parent_used: u64, target: u64) -> u64 {
    parent_excess
        .saturating_add(parent_used)
        .saturating_sub(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Hash256;

    fn tip(height: u64, gas_used: u64, base_fee: Option<u128>) -> TipInfo {
        TipInfo {
            height,
            hash: Hash256::ZERO,
            timestamp: 0,
            gas_used,
            base_fee,
            excess_blob_gas: 0,
            blob_gas_used: 0,
        }
    }

    fn genesis() -> Genesis {
        let mut g = Genesis::default();
        g.blockchain.block_gas_limit = 20_000_000;
        g
    }

    #[test]
    fn first_dynamic_block_uses_initial_fee() {
        let g = genesis();
        assert_eq!(
            calc_base_fee(&g, &tip(0, 0, None)),
            g.blockchain.fee.initial_base_fee
        );

        let mut late = genesis();
        late.blockchain.hardforks.dynamic_fee = 50;
        assert_eq!(
            calc_base_fee(&late, &tip(10, 0, Some(5))),
            late.blockchain.fee.initial_base_fee
        );
    }

    #[test]
    fn base_fee_tracks_gas_target() {
        let g = genesis();
        let parent_fee = 8_000_000_000u128;

        // target = 10M
        assert_eq!(calc_base_fee(&g, &tip(5, 10_000_000, Some(parent_fee))), parent_fee);
        // full block: +1/8
        assert_eq!(
            calc_base_fee(&g, &tip(5, 20_000_000, Some(parent_fee))),
            parent_fee + parent_fee / 8
        );
        // empty block: -1/8
        assert_eq!(
            calc_base_fee(&g, &tip(5, 0, Some(parent_fee))),
            parent_fee - parent_fee / 8
        );
    }

    #[test]
    fn base_fee_respects_floor_and_minimum_step() {
        let g = genesis();
        let floor = g.blockchain.fee.min_base_fee;
        assert_eq!(calc_base_fee(&g, &tip(5, 0, Some(floor))), floor);

        // tiny fee, barely above target: increase by at least one
        let mut tiny = genesis();
        tiny.blockchain.fee.min_base_fee = 0;
        assert_eq!(calc_base_fee(&tiny, &tip(5, 10_000_001, Some(3))), 4);
    }

    #[test]
    fn extreme_parent_fee_does_not_overflow() {
        let g = genesis();
        assert_eq!(
            calc_base_fee(&g, &tip(5, 20_000_000, Some(u128::MAX))),
            u128::MAX
        );
        assert_eq!(
            calc_base_fee(&g, &tip(5, u64::MAX, Some(u128::MAX / 2))),
            u128::MAX / 2 + u128::MAX / 8
        );
        assert_eq!(
            calc_base_fee(&g, &tip(5, 0, Some(u128::MAX))),
            u128::MAX - u128::MAX / 8
        );
    }

    #[test]
    fn mul_div_is_exact_below_saturation() {
        assert_eq!(mul_div(8_000_000_000, 10_000_000, 10_000_000), 8_000_000_000);
        assert_eq!(mul_div(7, 3, 2), 10);
        assert_eq!(mul_div(u128::MAX, 1, 1), u128::MAX);
        assert_eq!(mul_div(u128::MAX, 2, 1), u128::MAX);
        assert_eq!(mul_div(u128::MAX, 1, 2), u128::MAX / 2);
    }

    #[test]
    fn verify_header_checks_fee() {
        let g = genesis();
        let parent = tip(5, 10_000_000, Some(2_000_000_000));
        let key = crate::types::PrivateKey::from_bytes(&[1u8; 32]).unwrap();
        let mut header = crate::types::BlockBuilder::new(6, Hash256::ZERO, 1)
            .base_fee(Some(2_000_000_000))
            .sign_and_build(&key)
            .header;
        assert!(verify_eip1559_header(&g, &parent, &header).is_ok());

        header.base_fee = Some(1);
        assert_eq!(
            verify_eip1559_header(&g, &parent, &header),
            Err(FeeError::BaseFeeMismatch {
                expected: 2_000_000_000,
                actual: 1
            })
        );

        header.base_fee = None;
        assert_eq!(
            verify_eip1559_header(&g, &parent, &header),
            Err(FeeError::MissingBaseFee)
        );
    }

    #[test]
    fn excess_blob_gas_saturates() {
        assert_eq!(calc_excess_blob_gas(0, 100, 393_216), 0);
        assert_eq!(calc_excess_blob_gas(393_216, 393_216, 393_216), 393_216);
        assert_eq!(
            calc_excess_blob_gas(u64::MAX - 10, 100, 393_216),
            u64::MAX - 393_216
        );
        assert_eq!(calc_excess_blob_gas(u64::MAX, u64::MAX, 0), u64::MAX);
    }
}
