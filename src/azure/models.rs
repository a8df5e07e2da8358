//! Entities shown in the dashboard and the expiry-status rule.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Assignments with less than this much time left are "expiring soon".
pub const EXPIRY_WARNING_MINUTES: i64 = 30;

/// Maximum activation duration the PIM APIs accept for our requests.
pub const DEFAULT_MAX_DURATION_HOURS: i64 = 8;

/// Activation state of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ActivationStatus {
    #[default]
    Inactive,
    Active,
    ExpiringSoon,
    /// Awaiting approval. Reserved; never derived from an expiry.
    Pending,
}

impl ActivationStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active | Self::ExpiringSoon)
    }

    /// Higher is more urgent. Used to summarize a subscription's roles.
    fn urgency(self) -> u8 {
        match self {
            Self::Inactive => 0,
            Self::Pending => 1,
            Self::Active => 2,
            Self::ExpiringSoon => 3,
        }
    }

    /// Most urgent status in `statuses`, `Inactive` when empty.
    pub fn most_urgent(statuses: impl IntoIterator<Item = Self>) -> Self {
        statuses
            .into_iter()
            .max_by_key(|s| s.urgency())
            .unwrap_or_default()
    }
}

impl fmt::Display for ActivationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inactive => "Inactive",
            Self::Active => "Active",
            Self::ExpiringSoon => "Expiring Soon",
            Self::Pending => "Pending",
        })
    }
}

/// Status of an active assignment ending at `expires_at`.
///
/// `None` means active without a known end (permanent assignment).
pub fn status_from_expiry(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> ActivationStatus {
    match expires_at {
        None => ActivationStatus::Active,
        Some(end) if end - now <= Duration::minutes(EXPIRY_WARNING_MINUTES) => {
            ActivationStatus::ExpiringSoon
        }
        Some(_) => ActivationStatus::Active,
    }
}

/// Parse an RFC 3339 `endDateTime`; empty or malformed values are `None`.
pub fn parse_end_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .filter(|v| !v.is_empty())
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// The signed-in user's home tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub id: String,
    pub display_name: String,
}

/// Display name and UPN of the signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub display_name: String,
    pub user_principal_name: String,
}

/// An Entra ID directory role the user is eligible for.
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub role_definition_id: String,
    pub directory_scope_id: String,
    pub status: ActivationStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_duration: Duration,
    pub permissions: Vec<String>,
}

/// An Entra ID role tied to a PIM group.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedRole {
    pub display_name: String,
    pub role_definition_id: String,
    pub status: ActivationStatus,
}

/// An Azure RBAC role tied to a PIM group.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedAzureRole {
    pub display_name: String,
    pub role_definition_id: String,
    pub scope: String,
}

/// A PIM-governed group membership.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub id: String,
    pub display_name: String,
    /// "Member" or "Owner" as shown by PIM.
    pub description: String,
    /// "member" or "owner"; sent back in activation requests.
    pub role_definition_id: String,
    pub status: ActivationStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_duration: Duration,
    pub linked_roles: Vec<LinkedRole>,
    pub linked_azure_roles: Vec<LinkedAzureRole>,
}

/// An ARM role the user can activate on a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct EligibleAzureRole {
    pub role_definition_id: String,
    pub role_definition_name: String,
    /// Eligibility schedule the activation request links to.
    pub role_eligibility_id: String,
    pub scope: String,
    pub status: ActivationStatus,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A subscription (own tenant or delegated through Lighthouse) with eligible roles.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: String,
    pub display_name: String,
    pub tenant_id: String,
    pub tenant_name: String,
    pub status: ActivationStatus,
    pub eligible_roles: Vec<EligibleAzureRole>,
}

impl Subscription {
    /// Recompute `status` from the roles.
    pub fn refresh_status(&mut self) {
        self.status = ActivationStatus::most_urgent(self.eligible_roles.iter().map(|r| r.status));
    }
}

/// Format a remaining duration, e.g. "45m", "2h 5m", "expired".
pub fn format_remaining(remaining: Duration) -> String {
    let total_minutes = remaining.num_minutes();
    if remaining <= Duration::zero() {
        "expired".to_string()
    } else if total_minutes < 1 {
        "< 1m".to_string()
    } else if total_minutes < 60 {
        format!("{}m", total_minutes)
    } else {
        let hours = total_minutes / 60;
        let mins = total_minutes % 60;
        if mins == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, mins)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_expiry_boundaries() {
        let now = Utc::now();
        assert_eq!(status_from_expiry(None, now), ActivationStatus::Active);
        assert_eq!(
            status_from_expiry(Some(now + Duration::hours(2)), now),
            ActivationStatus::Active
        );
        assert_eq!(
            status_from_expiry(Some(now + Duration::minutes(30) + Duration::seconds(1)), now),
            ActivationStatus::Active
        );
        assert_eq!(
            status_from_expiry(Some(now + Duration::minutes(30)), now),
            ActivationStatus::ExpiringSoon
        );
        assert_eq!(
            status_from_expiry(Some(now + Duration::minutes(29)), now),
            ActivationStatus::ExpiringSoon
        );
        assert_eq!(
            status_from_expiry(Some(now - Duration::minutes(5)), now),
            ActivationStatus::ExpiringSoon
        );
    }

    #[test]
    fn test_is_active() {
        assert!(ActivationStatus::Active.is_active());
        assert!(ActivationStatus::ExpiringSoon.is_active());
        assert!(!ActivationStatus::Inactive.is_active());
        assert!(!ActivationStatus::Pending.is_active());
    }

    #[test]
    fn test_most_urgent() {
        use ActivationStatus::*;
        assert_eq!(ActivationStatus::most_urgent([]), Inactive);
        assert_eq!(ActivationStatus::most_urgent([Inactive, Active]), Active);
        assert_eq!(
            ActivationStatus::most_urgent([Active, ExpiringSoon, Inactive]),
            ExpiringSoon
        );
    }

    #[test]
    fn test_parse_end_time() {
        assert!(parse_end_time(None).is_none());
        assert!(parse_end_time(Some("")).is_none());
        assert!(parse_end_time(Some("not a date")).is_none());
        let parsed = parse_end_time(Some("2030-01-01T10:00:00Z")).unwrap();
        assert_eq!(parsed.timestamp(), 1_893_492_000);
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::seconds(-5)), "expired");
        assert_eq!(format_remaining(Duration::seconds(30)), "< 1m");
        assert_eq!(format_remaining(Duration::minutes(45)), "45m");
        assert_eq!(format_remaining(Duration::minutes(120)), "2h");
        assert_eq!(format_remaining(Duration::minutes(125)), "2h 5m");
    }
}
