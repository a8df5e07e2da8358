//! Sequential activation and deactivation of a batch of assignments.
//!
//! A batch runs one item at a time and stops at the first failure. Items that
//! already went through stay activated (or deactivated); Azure has no
//! transaction to roll them back into.

use std::fmt;

use async_trait::async_trait;
use chrono::Duration;
use tracing::{error, info};

use crate::error::{ApiError, BatchError};

/// Marker Azure puts in the error body when a role is deactivated too early.
const ACTIVE_DURATION_TOO_SHORT: &str = "ActiveDurationTooShort";

/// One assignment to activate or deactivate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchItem {
    /// Entra ID directory role.
    Role {
        role_definition_id: String,
        display_name: String,
    },
    /// PIM group membership.
    Group {
        group_id: String,
        /// "member" or "owner".
        role_definition_id: String,
        display_name: String,
    },
    /// ARM role on a subscription (or below).
    SubscriptionRole {
        scope: String,
        role_definition_id: String,
        role_eligibility_id: String,
        role_name: String,
        subscription_name: String,
    },
}

impl BatchItem {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Role { .. } => "role",
            Self::Group { .. } => "group",
            Self::SubscriptionRole { .. } => "subscription role",
        }
    }

    /// Human-readable name for logs and history.
    pub fn label(&self) -> String {
        match self {
            Self::Role { display_name, .. } | Self::Group { display_name, .. } => {
                display_name.clone()
            }
            Self::SubscriptionRole {
                role_name,
                subscription_name,
                ..
            } => format!("{} on {}", role_name, subscription_name),
        }
    }
}

impl fmt::Display for BatchItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind(), self.label())
    }
}

/// Issues single activation and deactivation requests.
#[async_trait]
pub trait AssignmentMutator: Send + Sync {
    async fn activate_item(
        &self,
        item: &BatchItem,
        justification: &str,
        duration: Duration,
    ) -> Result<(), ApiError>;

    async fn deactivate_item(&self, item: &BatchItem) -> Result<(), ApiError>;
}

/// Activate `items` in order, stopping at the first failure.
pub async fn activate(
    mutator: &dyn AssignmentMutator,
    items: &[BatchItem],
    justification: &str,
    duration: Duration,
) -> Result<(), BatchError> {
    for (index, item) in items.iter().enumerate() {
        info!("Activating {} ({}/{})", item, index + 1, items.len());
        if let Err(e) = mutator.activate_item(item, justification, duration).await {
            error!("Activation of {} failed: {}", item, e);
            return Err(BatchError {
                completed: index,
                total: items.len(),
                item: item.to_string(),
                error: e,
            });
        }
    }
    info!("Activated {} item(s)", items.len());
    Ok(())
}

/// Deactivate `items` in order, stopping at the first failure.
pub async fn deactivate(
    mutator: &dyn AssignmentMutator,
    items: &[BatchItem],
) -> Result<(), BatchError> {
    for (index, item) in items.iter().enumerate() {
        info!("Deactivating {} ({}/{})", item, index + 1, items.len());
        if let Err(e) = mutator.deactivate_item(item).await {
            error!("Deactivation of {} failed: {}", item, e);
            return Err(BatchError {
                completed: index,
                total: items.len(),
                item: item.to_string(),
                error: e,
            });
        }
    }
    info!("Deactivated {} item(s)", items.len());
    Ok(())
}

/// ISO 8601 duration in whole minutes, for the PIM Governance API.
pub fn pim_duration(duration: Duration) -> String {
    format!("PT{}M", duration.num_minutes().max(1))
}

/// ISO 8601 duration in whole hours (truncated, at least one), for ARM.
pub fn arm_duration(duration: Duration) -> String {
    format!("PT{}H", duration.num_hours().max(1))
}

/// Log line for a failed deactivation batch.
pub fn describe_deactivation_failure(err: &BatchError) -> String {
    let raw = err.error.to_string();
    if raw.contains(ACTIVE_DURATION_TOO_SHORT) {
        format!(
            "Cannot deactivate {}: must be active for at least 5 minutes",
            err.item
        )
    } else {
        err.to_string()
    }
}
