use anyhow::ensure;
use cosmwasm_std::Uint256;

use crate::ContractError;

const MAX_BPS: u128 = 10_000;

/// Returns the lowest acceptable amount, `expected * (10000 - max_slippage) / 10000`, rounded
/// down.
pub fn floor(expected: Uint256, max_slippage: u16) -> anyhow::Result<Uint256> {
    let bps = u128::from(max_slippage);
    ensure!(bps <= MAX_BPS, ContractError::InvalidSlippage);

    Ok(expected.multiply_ratio(MAX_BPS - bps, MAX_BPS))
}

/// Returns true if `amount` lies between the slippage floor of `max_amount` and `max_amount`.
pub fn within(amount: Uint256, max_amount: Uint256, max_slippage: u16) -> anyhow::Result<bool> {
    if amount > max_amount {
        return Ok(false);
    }

    floor(max_amount, max_slippage).map(|min| amount >= min)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn floor_truncates() {
        // 999 * 9950 / 10000 = 994.005
        assert_eq!(
            Uint256::from(994u128),
            floor(Uint256::from(999u128), 50).unwrap()
        );
        assert_eq!(Uint256::zero(), floor(Uint256::from(999u128), 10_000).unwrap());
        assert_eq!(Uint256::from(999u128), floor(Uint256::from(999u128), 0).unwrap());
    }

    #[test]
    fn slippage_above_full_range_is_rejected() {
        let err = floor(Uint256::from(1u128), 10_001).unwrap_err();
        assert_eq!(
            Some(&ContractError::InvalidSlippage),
            err.downcast_ref::<ContractError>()
        );
    }

    #[test]
    fn within_bounds() {
        let max = Uint256::from(1_000u128);
        assert!(within(Uint256::from(990u128), max, 100).unwrap());
        assert!(within(max, max, 100).unwrap());
        assert!(!within(Uint256::from(989u128), max, 100).unwrap());
        assert!(!within(Uint256::from(1_001u128), max, 100).unwrap());
    }
}
