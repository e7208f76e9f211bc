//! Shard directory and allocator.
//!
//! The directory records which shard holds each `(identifier, entity_type)`.
//! An identifier without an assignment is placed by [`ShardDirectory::allocate`]:
//! the enabled shards of its entity type are ordered by name and the
//! identifier's [`big_int_hash`](crate::big_int_hash) picks one modulo their
//! count.
//!
//! Placement is not rebalance-safe. Enabling or disabling a shard changes
//! where *new* identifiers land; existing assignments never move.

use std::collections::HashMap;

use shardline_cache::{CacheAside, CacheBackend};
use shardline_core::{
    current_timestamp_secs, AllocationFilter, AllocationState, EntityType, ShardName,
};
use shardline_store::{
    AttributeValue, CompareOp, Condition, GetItemRequest, ItemStore, PutItemRequest,
};
use tracing::{debug, info, warn};

use crate::error::{RoutingError, RoutingResult};
use crate::hashing::allocation_index;
use crate::lookup::AssignmentLookup;
use crate::model::{attr, Assignment};
use crate::registry::ShardRegistry;

/// Directory of identifier-to-shard assignments.
pub struct ShardDirectory<S: ItemStore, C: CacheBackend> {
    /// Registry consulted for shard state; also owns the executor and cache.
    registry: ShardRegistry<S, C>,
}

impl<S: ItemStore, C: CacheBackend> Clone for ShardDirectory<S, C> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<S, C> ShardDirectory<S, C>
where
    S: ItemStore + 'static,
    C: CacheBackend + 'static,
{
    /// Creates a directory over a registry.
    #[must_use]
    pub const fn new(registry: ShardRegistry<S, C>) -> Self {
        Self { registry }
    }

    /// Returns the registry.
    #[must_use]
    pub const fn registry(&self) -> &ShardRegistry<S, C> {
        &self.registry
    }

    /// Looks up assignments, through the cache.
    ///
    /// Every distinct identifier appears in the result; unassigned ones map
    /// to `None`.
    ///
    /// # Errors
    ///
    /// Returns a store error, or `Incomplete` if part of the read was never
    /// serviced.
    pub async fn get_assignment(
        &self,
        identifiers: &[String],
        entity_type: &EntityType,
    ) -> RoutingResult<HashMap<String, Option<Assignment>>> {
        let mut unique = identifiers.to_vec();
        unique.sort();
        unique.dedup();

        let mut found = self.lookup(entity_type, unique.clone()).fetch().await?;
        Ok(unique
            .into_iter()
            .map(|identifier| {
                let assignment = found.remove(&identifier);
                (identifier, assignment)
            })
            .collect())
    }

    /// Assigns an identifier to a shard.
    ///
    /// Without `force_assignment` the shard must be `Enabled` and an
    /// identifier already assigned elsewhere cannot be re-pointed.
    /// Re-assigning to the same shard is accepted and keeps the original
    /// creation time. The shard check goes through
    /// [`ShardRegistry::get_shard_by_name`], which answers existence like
    /// [`ShardRegistry::has_shard`] and also yields the allocation state.
    ///
    /// Without `force_assignment` the write is conditional on the assignment
    /// read beforehand, so two racing callers cannot both succeed on
    /// different shards.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAssignment` when a rule is broken, or a store/cache
    /// error.
    pub async fn assign_shard(
        &self,
        identifier: &str,
        entity_type: &EntityType,
        shard_name: &ShardName,
        force_assignment: bool,
    ) -> RoutingResult<Assignment> {
        if identifier.trim().is_empty() {
            return Err(RoutingError::invalid_assignment(
                identifier,
                "identifier must not be empty",
            ));
        }

        let shard = match self.registry.get_shard_by_name(shard_name).await {
            Ok(shard) => shard,
            Err(RoutingError::ShardNotFound { .. }) => {
                return Err(RoutingError::invalid_assignment(
                    identifier,
                    format!("shard {shard_name} does not exist"),
                ));
            }
            Err(err) => return Err(err),
        };
        if shard.entity_type != *entity_type {
            return Err(RoutingError::invalid_assignment(
                identifier,
                format!("shard {shard_name} stores {}", shard.entity_type),
            ));
        }
        if !force_assignment && shard.allocation_state != AllocationState::Enabled {
            return Err(RoutingError::invalid_assignment(
                identifier,
                format!("shard {shard_name} is not enabled for allocation"),
            ));
        }

        let existing = self.read_assignment(identifier, entity_type).await?;
        if let Some(existing) = &existing {
            if !force_assignment && existing.shard_name != *shard_name {
                return Err(RoutingError::invalid_assignment(
                    identifier,
                    format!("already assigned to {}", existing.shard_name),
                ));
            }
        }

        let was_assigned = existing.is_some();
        let now = current_timestamp_secs();
        let assignment = Assignment {
            identifier: identifier.to_string(),
            entity_type: entity_type.clone(),
            shard_name: shard_name.clone(),
            created_at_secs: existing.map_or(now, |e| e.created_at_secs),
            updated_at_secs: now,
        };
        let table = &self.registry.tables().shard_assignments;
        let mut request = PutItemRequest::new(table, assignment.to_item());
        if !force_assignment {
            // The assignment read above must still hold when the write lands.
            request = request.with_condition(if was_assigned {
                Condition::compare(
                    attr::SHARD_NAME,
                    CompareOp::Eq,
                    AttributeValue::from(shard_name.as_str()),
                )
            } else {
                Condition::not_exists(attr::SHARD_NAME)
            });
        }
        match self.registry.executor().put_item(&request).await {
            Ok(()) => {}
            Err(err) if err.is_conditional_check_failed() => {
                return self
                    .settle_lost_race(identifier, entity_type, shard_name)
                    .await;
            }
            Err(err) => return Err(err.into()),
        }
        info!(
            identifier,
            entity_type = %entity_type,
            shard = %shard_name,
            forced = force_assignment,
            "Identifier assigned"
        );

        self.lookup(entity_type, vec![identifier.to_string()])
            .clear()
            .await?;
        Ok(assignment)
    }

    /// Places an unassigned identifier on one of the enabled shards.
    ///
    /// # Errors
    ///
    /// Returns `NoAvailableShard` if no shard of the entity type is enabled,
    /// or any error of [`ShardDirectory::assign_shard`].
    pub async fn allocate(
        &self,
        identifier: &str,
        entity_type: &EntityType,
    ) -> RoutingResult<Assignment> {
        let shards = self
            .registry
            .list_shards_by_entity_allocation(
                entity_type,
                AllocationFilter::Only(AllocationState::Enabled),
            )
            .await?;
        if shards.is_empty() {
            return Err(RoutingError::NoAvailableShard {
                entity_type: entity_type.to_string(),
            });
        }

        let index = allocation_index(identifier, shards.len());
        let target = &shards[index].name;
        debug!(
            identifier,
            entity_type = %entity_type,
            candidates = shards.len(),
            index,
            shard = %target,
            "Allocating identifier"
        );
        self.assign_shard(identifier, entity_type, target, false).await
    }

    /// Returns the identifier's shard, allocating one on first use.
    ///
    /// # Errors
    ///
    /// Returns any error of [`ShardDirectory::get_assignment`] or
    /// [`ShardDirectory::allocate`].
    pub async fn resolve(
        &self,
        identifier: &str,
        entity_type: &EntityType,
    ) -> RoutingResult<ShardName> {
        let existing = self
            .get_assignment(&[identifier.to_string()], entity_type)
            .await?
            .remove(identifier)
            .flatten();
        match existing {
            Some(assignment) => Ok(assignment.shard_name),
            None => Ok(self.allocate(identifier, entity_type).await?.shard_name),
        }
    }

    /// Resolves a conditional assignment write that lost to a concurrent one.
    ///
    /// A winner that chose the same shard leaves nothing to do; any other
    /// outcome is refused.
    async fn settle_lost_race(
        &self,
        identifier: &str,
        entity_type: &EntityType,
        shard_name: &ShardName,
    ) -> RoutingResult<Assignment> {
        match self.read_assignment(identifier, entity_type).await? {
            Some(current) if current.shard_name == *shard_name => {
                debug!(identifier, shard = %shard_name, "Concurrent assignment agreed");
                self.lookup(entity_type, vec![identifier.to_string()])
                    .clear()
                    .await?;
                Ok(current)
            }
            current => {
                warn!(
                    identifier,
                    requested = %shard_name,
                    current = ?current.map(|a| a.shard_name),
                    "Assignment changed concurrently"
                );
                Err(RoutingError::invalid_assignment(
                    identifier,
                    "assignment changed concurrently",
                ))
            }
        }
    }

    /// Reads an assignment straight from the store, bypassing the cache.
    async fn read_assignment(
        &self,
        identifier: &str,
        entity_type: &EntityType,
    ) -> RoutingResult<Option<Assignment>> {
        let request = GetItemRequest::new(
            &self.registry.tables().shard_assignments,
            Assignment::key(identifier, entity_type),
        )
        .consistent();
        match self.registry.executor().get_item(&request).await? {
            Some(row) => Ok(Some(Assignment::from_item(&row)?)),
            None => Ok(None),
        }
    }

    fn lookup<'a>(
        &'a self,
        entity_type: &'a EntityType,
        identifiers: Vec<String>,
    ) -> AssignmentLookup<'a, S, C> {
        AssignmentLookup {
            registry: &self.registry,
            entity_type,
            identifiers,
        }
    }
}
