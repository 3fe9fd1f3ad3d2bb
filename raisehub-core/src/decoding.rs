//! ABI decoding of the platform's contract events.
//!
//! Decoding happens once, at the edge: every field is converted into the
//! representation the entities store (lowercased address keys, decimals,
//! enums). Anything that does not convert is a [`DecodeError`] and halts
//! processing of that log.

use crate::entities::{Role, RoundState, address_key, u256_to_decimal, word_key};
use crate::ledger::RawLog;
use crate::store::LedgerPosition;
use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolEvent;
use rust_decimal::Decimal;
use thiserror::Error;

pub mod abi {
    use alloy::sol;

    sol! {
        #[derive(Debug, PartialEq, Eq)]
        event UserRoleRegistered(address indexed user, uint8 role);

        #[derive(Debug, PartialEq, Eq)]
        event ZKPassportVerified(address indexed user, bytes32 nullifierHash);

        #[derive(Debug, PartialEq, Eq)]
        event FounderProfileUpdated(address indexed founder, string metadataURI);

        #[derive(Debug, PartialEq, Eq)]
        event RoundDeployed(
            address indexed roundAddress,
            address indexed founder,
            uint256 targetRaise,
            string metadataURI
        );

        #[derive(Debug, PartialEq, Eq)]
        event OrderCreated(
            uint256 indexed orderId,
            address indexed seller,
            address indexed tokenContract,
            uint256 amount,
            uint256 pricePerToken,
            uint256 expiryTime
        );

        #[derive(Debug, PartialEq, Eq)]
        event OrderExecuted(
            uint256 indexed orderId,
            address indexed buyer,
            address indexed seller,
            uint256 amount,
            uint256 pricePerToken,
            uint256 totalPrice,
            uint256 platformFee
        );

        #[derive(Debug, PartialEq, Eq)]
        event OrderCancelled(uint256 indexed orderId);

        #[derive(Debug, PartialEq, Eq)]
        event Invested(address indexed investor, uint256 amount, uint256 tokensIssued);

        #[derive(Debug, PartialEq, Eq)]
        event FundsWithdrawn(address indexed founder, uint256 amount);

        #[derive(Debug, PartialEq, Eq)]
        event RoundStateChanged(uint8 newState);
    }
}

/// Which monitored contract a log came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractKind {
    /// Identity registry: roles, ZK passport verification, founder profiles.
    Registry,
    /// Round factory: deploys round instances.
    RoundFactory,
    /// Secondary market for round tokens.
    Market,
    /// A round instance discovered through the factory.
    Round,
}

impl std::fmt::Display for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractKind::Registry => write!(f, "registry"),
            ContractKind::RoundFactory => write!(f, "round_factory"),
            ContractKind::Market => write!(f, "market"),
            ContractKind::Round => write!(f, "round"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{event} at {position}: ABI decode failed: {message}")]
    Abi {
        event: &'static str,
        position: LedgerPosition,
        message: String,
    },

    #[error("{event} at {position}: {field} does not fit the store")]
    OutOfRange {
        event: &'static str,
        position: LedgerPosition,
        field: &'static str,
    },

    #[error("{event} at {position}: unknown {field} value {value}")]
    UnknownVariant {
        event: &'static str,
        position: LedgerPosition,
        field: &'static str,
        value: u8,
    },
}

/// A fully decoded platform event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    UserRoleRegistered {
        user: String,
        role: Role,
    },
    ZkPassportVerified {
        user: String,
        nullifier_hash: String,
    },
    FounderProfileUpdated {
        founder: String,
        metadata_uri: String,
    },
    RoundDeployed {
        round: String,
        founder: String,
        target_raise: Decimal,
        metadata_uri: String,
    },
    OrderCreated {
        order_id: String,
        seller: String,
        token_contract: String,
        amount: Decimal,
        price_per_token: Decimal,
        expiry_time: i64,
    },
    OrderExecuted {
        order_id: String,
        buyer: String,
        seller: String,
        amount: Decimal,
        price_per_token: Decimal,
        total_price: Decimal,
        platform_fee: Decimal,
    },
    OrderCancelled {
        order_id: String,
    },
    Invested {
        investor: String,
        amount: Decimal,
        tokens_issued: Decimal,
    },
    FundsWithdrawn {
        founder: String,
        amount: Decimal,
    },
    RoundStateChanged {
        state: RoundState,
    },
}

impl DecodedEvent {
    /// Solidity event name.
    pub fn name(&self) -> &'static str {
        match self {
            DecodedEvent::UserRoleRegistered { .. } => "UserRoleRegistered",
            DecodedEvent::ZkPassportVerified { .. } => "ZKPassportVerified",
            DecodedEvent::FounderProfileUpdated { .. } => "FounderProfileUpdated",
            DecodedEvent::RoundDeployed { .. } => "RoundDeployed",
            DecodedEvent::OrderCreated { .. } => "OrderCreated",
            DecodedEvent::OrderExecuted { .. } => "OrderExecuted",
            DecodedEvent::OrderCancelled { .. } => "OrderCancelled",
            DecodedEvent::Invested { .. } => "Invested",
            DecodedEvent::FundsWithdrawn { .. } => "FundsWithdrawn",
            DecodedEvent::RoundStateChanged { .. } => "RoundStateChanged",
        }
    }
}

/// `topic0` of the factory's deployment event.
pub fn round_deployed_signature() -> B256 {
    abi::RoundDeployed::SIGNATURE_HASH
}

/// Event signatures expected from each contract kind.
pub fn signatures_for(kind: ContractKind) -> Vec<B256> {
    match kind {
        ContractKind::Registry => vec![
            abi::UserRoleRegistered::SIGNATURE_HASH,
            abi::ZKPassportVerified::SIGNATURE_HASH,
            abi::FounderProfileUpdated::SIGNATURE_HASH,
        ],
        ContractKind::RoundFactory => vec![abi::RoundDeployed::SIGNATURE_HASH],
        ContractKind::Market => vec![
            abi::OrderCreated::SIGNATURE_HASH,
            abi::OrderExecuted::SIGNATURE_HASH,
            abi::OrderCancelled::SIGNATURE_HASH,
        ],
        ContractKind::Round => vec![
            abi::Invested::SIGNATURE_HASH,
            abi::FundsWithdrawn::SIGNATURE_HASH,
            abi::RoundStateChanged::SIGNATURE_HASH,
        ],
    }
}

/// Address of the round a `RoundDeployed` log announces.
pub fn instance_address(log: &RawLog) -> Result<Address, DecodeError> {
    let e: abi::RoundDeployed = Decoder::new(log, "RoundDeployed").abi()?;
    Ok(e.roundAddress)
}

struct Decoder<'a> {
    log: &'a RawLog,
    event: &'static str,
}

impl<'a> Decoder<'a> {
    fn new(log: &'a RawLog, event: &'static str) -> Self {
        Self { log, event }
    }

    fn abi<E: SolEvent>(&self) -> Result<E, DecodeError> {
        E::decode_raw_log(self.log.topics.iter().copied(), &self.log.data).map_err(|e| {
            DecodeError::Abi {
                event: self.event,
                position: self.log.position(),
                message: e.to_string(),
            }
        })
    }

    fn decimal(&self, field: &'static str, value: U256) -> Result<Decimal, DecodeError> {
        u256_to_decimal(value).ok_or(DecodeError::OutOfRange {
            event: self.event,
            position: self.log.position(),
            field,
        })
    }

    fn timestamp(&self, field: &'static str, value: U256) -> Result<i64, DecodeError> {
        u64::try_from(value)
            .ok()
            .and_then(|v| i64::try_from(v).ok())
            .ok_or(DecodeError::OutOfRange {
                event: self.event,
                position: self.log.position(),
                field,
            })
    }

    fn variant<T: TryFrom<u8, Error = u8>>(
        &self,
        field: &'static str,
        value: u8,
    ) -> Result<T, DecodeError> {
        T::try_from(value).map_err(|value| DecodeError::UnknownVariant {
            event: self.event,
            position: self.log.position(),
            field,
            value,
        })
    }
}

/// Decode a log emitted by a contract of the given kind.
///
/// Returns `Ok(None)` for events the indexer does not track.
pub fn decode_log(kind: ContractKind, log: &RawLog) -> Result<Option<DecodedEvent>, DecodeError> {
    let Some(topic0) = log.topic0().copied() else {
        return Ok(None);
    };

    let decoded = match kind {
        ContractKind::Registry => {
            if topic0 == abi::UserRoleRegistered::SIGNATURE_HASH {
                let d = Decoder::new(log, "UserRoleRegistered");
                let e: abi::UserRoleRegistered = d.abi()?;
                DecodedEvent::UserRoleRegistered {
                    user: address_key(&e.user),
                    role: d.variant("role", e.role)?,
                }
            } else if topic0 == abi::ZKPassportVerified::SIGNATURE_HASH {
                let d = Decoder::new(log, "ZKPassportVerified");
                let e: abi::ZKPassportVerified = d.abi()?;
                DecodedEvent::ZkPassportVerified {
                    user: address_key(&e.user),
                    nullifier_hash: word_key(&e.nullifierHash),
                }
            } else if topic0 == abi::FounderProfileUpdated::SIGNATURE_HASH {
                let d = Decoder::new(log, "FounderProfileUpdated");
                let e: abi::FounderProfileUpdated = d.abi()?;
                DecodedEvent::FounderProfileUpdated {
                    founder: address_key(&e.founder),
                    metadata_uri: e.metadataURI,
                }
            } else {
                return Ok(None);
            }
        }
        ContractKind::RoundFactory => {
            if topic0 == abi::RoundDeployed::SIGNATURE_HASH {
                let d = Decoder::new(log, "RoundDeployed");
                let e: abi::RoundDeployed = d.abi()?;
                DecodedEvent::RoundDeployed {
                    round: address_key(&e.roundAddress),
                    founder: address_key(&e.founder),
                    target_raise: d.decimal("targetRaise", e.targetRaise)?,
                    metadata_uri: e.metadataURI,
                }
            } else {
                return Ok(None);
            }
        }
        ContractKind::Market => {
            if topic0 == abi::OrderCreated::SIGNATURE_HASH {
                let d = Decoder::new(log, "OrderCreated");
                let e: abi::OrderCreated = d.abi()?;
                DecodedEvent::OrderCreated {
                    order_id: e.orderId.to_string(),
                    seller: address_key(&e.seller),
                    token_contract: address_key(&e.tokenContract),
                    amount: d.decimal("amount", e.amount)?,
                    price_per_token: d.decimal("pricePerToken", e.pricePerToken)?,
                    expiry_time: d.timestamp("expiryTime", e.expiryTime)?,
                }
            } else if topic0 == abi::OrderExecuted::SIGNATURE_HASH {
                let d = Decoder::new(log, "OrderExecuted");
                let e: abi::OrderExecuted = d.abi()?;
                DecodedEvent::OrderExecuted {
                    order_id: e.orderId.to_string(),
                    buyer: address_key(&e.buyer),
                    seller: address_key(&e.seller),
                    amount: d.decimal("amount", e.amount)?,
                    price_per_token: d.decimal("pricePerToken", e.pricePerToken)?,
                    total_price: d.decimal("totalPrice", e.totalPrice)?,
                    platform_fee: d.decimal("platformFee", e.platformFee)?,
                }
            } else if topic0 == abi::OrderCancelled::SIGNATURE_HASH {
                let d = Decoder::new(log, "OrderCancelled");
                let e: abi::OrderCancelled = d.abi()?;
                DecodedEvent::OrderCancelled {
                    order_id: e.orderId.to_string(),
                }
            } else {
                return Ok(None);
            }
        }
        ContractKind::Round => {
            if topic0 == abi::Invested::SIGNATURE_HASH {
                let d = Decoder::new(log, "Invested");
                let e: abi::Invested = d.abi()?;
                DecodedEvent::Invested {
                    investor: address_key(&e.investor),
                    amount: d.decimal("amount", e.amount)?,
                    tokens_issued: d.decimal("tokensIssued", e.tokensIssued)?,
                }
            } else if topic0 == abi::FundsWithdrawn::SIGNATURE_HASH {
                let d = Decoder::new(log, "FundsWithdrawn");
                let e: abi::FundsWithdrawn = d.abi()?;
                DecodedEvent::FundsWithdrawn {
                    founder: address_key(&e.founder),
                    amount: d.decimal("amount", e.amount)?,
                }
            } else if topic0 == abi::RoundStateChanged::SIGNATURE_HASH {
                let d = Decoder::new(log, "RoundStateChanged");
                let e: abi::RoundStateChanged = d.abi()?;
                DecodedEvent::RoundStateChanged {
                    state: d.variant("newState", e.newState)?,
                }
            } else {
                return Ok(None);
            }
        }
    };

    Ok(Some(decoded))
}


#[cfg(test)]
mod tests {
    use super::test_logs::*;
    use super::*;
    use alloy::primitives::Address;

    #[test]
    fn test_decode_order_created() {
        let seller = Address::repeat_byte(0xAB);
        let log = raw(&order_created(1, seller, 100, 5), Address::repeat_byte(3), 10, 0);

        let decoded = decode_log(ContractKind::Market, &log).unwrap().unwrap();
        assert_eq!(
            decoded,
            DecodedEvent::OrderCreated {
                order_id: "1".to_string(),
                seller: address_key(&seller),
                token_contract: address_key(&Address::repeat_byte(0x70)),
                amount: Decimal::from(100),
                price_per_token: Decimal::from(5),
                expiry_time: 1_800_000_000,
            }
        );
        assert_eq!(decoded.name(), "OrderCreated");
    }

    #[test]
    fn test_decode_lowercases_addresses() {
        let user = Address::repeat_byte(0xCD);
        let event = abi::UserRoleRegistered { user, role: 2 };
        let log = raw(&event, Address::repeat_byte(1), 1, 0);

        match decode_log(ContractKind::Registry, &log).unwrap() {
            Some(DecodedEvent::UserRoleRegistered { user, role }) => {
                assert_eq!(user, format!("0x{}", "cd".repeat(20)));
                assert_eq!(role, Role::Founder);
            }
            other => panic!("unexpected decode result: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let event = abi::UserRoleRegistered {
            user: Address::repeat_byte(1),
            role: 7,
        };
        let log = raw(&event, Address::repeat_byte(1), 1, 0);
        assert!(matches!(
            decode_log(ContractKind::Registry, &log),
            Err(DecodeError::UnknownVariant { value: 7, .. })
        ));
    }

    #[test]
    fn test_truncated_data_is_rejected() {
        let mut log = raw(
            &order_created(1, Address::repeat_byte(1), 100, 5),
            Address::repeat_byte(3),
            10,
            0,
        );
        log.data = log.data.slice(..40);
        assert!(matches!(
            decode_log(ContractKind::Market, &log),
            Err(DecodeError::Abi {
                event: "OrderCreated",
                ..
            })
        ));
    }

    #[test]
    fn test_oversized_amount_is_rejected() {
        let mut event = order_created(1, Address::repeat_byte(1), 0, 5);
        event.amount = U256::MAX;
        let log = raw(&event, Address::repeat_byte(3), 10, 0);
        assert!(matches!(
            decode_log(ContractKind::Market, &log),
            Err(DecodeError::OutOfRange {
                field: "amount",
                ..
            })
        ));
    }

    #[test]
    fn test_event_from_wrong_contract_kind_is_ignored() {
        let log = raw(
            &order_created(1, Address::repeat_byte(1), 100, 5),
            Address::repeat_byte(3),
            10,
            0,
        );
        assert_eq!(decode_log(ContractKind::Registry, &log).unwrap(), None);
    }

    #[test]
    fn test_signatures_for_factory_is_deployment_event() {
        assert_eq!(
            signatures_for(ContractKind::RoundFactory),
            vec![round_deployed_signature()]
        );
    }
}
