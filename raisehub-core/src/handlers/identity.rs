//! Registry events: role registration, ZK passport verification and
//! founder profiles.

use super::{EventContext, EventHandler, EventTrigger, HandlerError};
use crate::aggregate::StatsDelta;
use crate::decoding::{ContractKind, DecodedEvent};
use crate::entities::Role;
use crate::entities::founder_profile::FounderProfile;
use crate::entities::user::User;
use crate::store::StoreTransaction;
use async_trait::async_trait;
use tracing::debug;

pub struct IdentityHandler;

impl IdentityHandler {
    async fn register_role(
        ctx: &EventContext,
        address: &str,
        role: Role,
        tx: &mut dyn StoreTransaction,
    ) -> Result<StatsDelta, HandlerError> {
        let user = match tx.find_user(address).await? {
            Some(existing) => User {
                role,
                updated_at: ctx.block_timestamp,
                ..existing
            },
            None => User {
                address: address.to_string(),
                role,
                zk_verified: false,
                nullifier_hash: None,
                registered_at: ctx.block_timestamp,
                updated_at: ctx.block_timestamp,
            },
        };

        let outcome = tx.upsert_user(&user).await?;
        debug!(user = %address, ?role, created = outcome.is_inserted(), "Role registered");

        // Re-registration keeps the role counters as they were.
        Ok(if outcome.is_inserted() {
            StatsDelta::user_created(role)
        } else {
            StatsDelta::default()
        })
    }

    async fn verify_passport(
        ctx: &EventContext,
        address: &str,
        nullifier_hash: &str,
        tx: &mut dyn StoreTransaction,
    ) -> Result<StatsDelta, HandlerError> {
        let user = match tx.find_user(address).await? {
            Some(existing) => User {
                zk_verified: true,
                nullifier_hash: Some(nullifier_hash.to_string()),
                updated_at: ctx.block_timestamp,
                ..existing
            },
            None => User {
                address: address.to_string(),
                role: Role::None,
                zk_verified: true,
                nullifier_hash: Some(nullifier_hash.to_string()),
                registered_at: ctx.block_timestamp,
                updated_at: ctx.block_timestamp,
            },
        };

        let outcome = tx.upsert_user(&user).await?;
        Ok(if outcome.is_inserted() {
            StatsDelta::user_created(Role::None)
        } else {
            StatsDelta::default()
        })
    }

    async fn update_profile(
        ctx: &EventContext,
        founder: &str,
        metadata_uri: &str,
        tx: &mut dyn StoreTransaction,
    ) -> Result<StatsDelta, HandlerError> {
        let created_at = tx
            .find_founder_profile(founder)
            .await?
            .map_or(ctx.block_timestamp, |existing| existing.created_at);

        tx.upsert_founder_profile(&FounderProfile {
            address: founder.to_string(),
            metadata_uri: metadata_uri.to_string(),
            created_at,
            updated_at: ctx.block_timestamp,
            last_tx_hash: ctx.tx_hash.clone(),
        })
        .await?;
        Ok(StatsDelta::default())
    }
}

#[async_trait]
impl EventHandler for IdentityHandler {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn triggers(&self) -> Vec<EventTrigger> {
        vec![
            EventTrigger::new(ContractKind::Registry, "UserRoleRegistered"),
            EventTrigger::new(ContractKind::Registry, "ZKPassportVerified"),
            EventTrigger::new(ContractKind::Registry, "FounderProfileUpdated"),
        ]
    }

    async fn handle(
        &self,
        ctx: &EventContext,
        event: &DecodedEvent,
        tx: &mut dyn StoreTransaction,
    ) -> Result<StatsDelta, HandlerError> {
        match event {
            DecodedEvent::UserRoleRegistered { user, role } => {
                Self::register_role(ctx, user, *role, tx).await
            }
            DecodedEvent::ZkPassportVerified {
                user,
                nullifier_hash,
            } => Self::verify_passport(ctx, user, nullifier_hash, tx).await,
            DecodedEvent::FounderProfileUpdated {
                founder,
                metadata_uri,
            } => Self::update_profile(ctx, founder, metadata_uri, tx).await,
            other => Err(HandlerError::Unsupported {
                handler: self.name(),
                event: other.name(),
            }),
        }
    }
}
