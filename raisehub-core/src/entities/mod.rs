pub mod founder_profile;
pub mod investment;
pub mod platform_stats;
pub mod round;
pub mod sell_order;
pub mod trade;
pub mod user;

use alloy::primitives::{Address, B256, U256};
use rust_decimal::Decimal;
use serde::Serialize;

/// Role a user registered with on the identity registry.
///
/// The discriminants match the `uint8` emitted by the `UserRoleRegistered` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "user_role")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    None = 0,
    Investor = 1,
    Founder = 2,
}

impl TryFrom<u8> for Role {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Role::None),
            1 => Ok(Role::Investor),
            2 => Ok(Role::Founder),
            other => Err(other),
        }
    }
}

/// Lifecycle state of a fundraising round.
///
/// Only `Fundraising` is produced on deployment; the other states are
/// reached through `RoundStateChanged` events emitted by the round itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "round_state")]
#[serde(rename_all = "lowercase")]
pub enum RoundState {
    #[default]
    Fundraising = 0,
    Funded = 1,
    Closed = 2,
    Defaulted = 3,
}

impl TryFrom<u8> for RoundState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RoundState::Fundraising),
            1 => Ok(RoundState::Funded),
            2 => Ok(RoundState::Closed),
            3 => Ok(RoundState::Defaulted),
            other => Err(other),
        }
    }
}

/// Canonical key form of an account or contract address: `0x` + lowercase hex.
pub fn address_key(address: &Address) -> String {
    format!("0x{}", alloy::hex::encode(address.as_slice()))
}

/// Lowercase a user-supplied address string so it matches [`address_key`].
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Canonical form of a transaction hash or other 32-byte word.
pub fn word_key(word: &B256) -> String {
    format!("0x{}", alloy::hex::encode(word.as_slice()))
}

/// Convert an on-chain `uint256` into a `NUMERIC`-compatible decimal.
///
/// Returns `None` when the value exceeds the 96-bit mantissa of [`Decimal`].
pub fn u256_to_decimal(value: U256) -> Option<Decimal> {
    let value: u128 = value.try_into().ok()?;
    let value: i128 = value.try_into().ok()?;
    Decimal::try_from_i128_with_scale(value, 0).ok()
}
