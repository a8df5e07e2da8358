//! Entra ID directory roles from the PIM Governance API.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use super::gateway::RestGateway;
use super::models::{
    parse_end_time, status_from_expiry, ActivationStatus, Role, DEFAULT_MAX_DURATION_HOURS,
};
use super::PimClient;
use crate::auth::Audience;
use crate::error::ApiError;

/// Related entities expanded on every assignment query.
const ASSIGNMENT_EXPAND: &str =
    "linkedEligibleRoleAssignment,subject,scopedResource,roleDefinition($expand=resource)";

/// `assignmentState` values of the PIM Governance API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum AssignmentState {
    Eligible,
    Active,
}

impl AssignmentState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Eligible => "Eligible",
            Self::Active => "Active",
        }
    }
}

/// One `roleAssignments` entry, shared by `aadroles` and `aadGroups`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PimAssignment {
    pub id: String,
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub role_definition: Option<PimRoleDefinition>,
    #[serde(default)]
    pub end_date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PimRoleDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl PimAssignment {
    pub fn role_definition_id(&self) -> &str {
        self.role_definition
            .as_ref()
            .map(|d| d.id.as_str())
            .unwrap_or_default()
    }

    pub fn role_name(&self) -> Option<&str> {
        self.role_definition
            .as_ref()
            .and_then(|d| d.display_name.as_deref())
    }
}

/// `{pim}/{resource_type}/roleAssignments` filtered to one user and state.
pub(super) fn assignments_url(
    pim_base: &str,
    resource_type: &str,
    user_id: &str,
    state: AssignmentState,
) -> String {
    let filter = format!(
        "(subject/id eq '{}') and (assignmentState eq '{}')",
        user_id,
        state.as_str()
    );
    format!(
        "{}/{}/roleAssignments?$expand={}&$filter={}",
        pim_base,
        resource_type,
        urlencoding::encode(ASSIGNMENT_EXPAND),
        urlencoding::encode(&filter)
    )
}

/// Fetch every assignment of `resource_type` in `state` for `user_id`.
pub(super) async fn fetch_assignments(
    gateway: &RestGateway,
    resource_type: &str,
    user_id: &str,
    state: AssignmentState,
) -> Result<Vec<PimAssignment>, ApiError> {
    let url = assignments_url(&gateway.endpoints().pim, resource_type, user_id, state);
    let values = gateway.get_all_pages(Audience::Pim, &url).await?;
    let assignments = values
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<PimAssignment>, _>>()?;
    debug!(
        "{} {:?} assignment(s) for {}",
        assignments.len(),
        state,
        resource_type
    );
    Ok(assignments)
}

/// Index active assignments by `key`. A missing or unparseable end time means
/// the assignment is permanent.
pub(super) fn active_index<K, F>(active: &[PimAssignment], key: F) -> HashMap<K, Option<DateTime<Utc>>>
where
    K: Eq + Hash,
    F: Fn(&PimAssignment) -> K,
{
    active
        .iter()
        .map(|a| (key(a), parse_end_time(a.end_date_time.as_deref())))
        .collect()
}

impl PimClient {
    /// Eligible directory roles with their activation status.
    pub async fn fetch_roles(&self) -> Result<Vec<Role>, ApiError> {
        let gateway = self.gateway();
        let user_id = gateway.current_user_id().await?;

        let (eligible, active) = tokio::try_join!(
            fetch_assignments(gateway, "aadroles", &user_id, AssignmentState::Eligible),
            fetch_assignments(gateway, "aadroles", &user_id, AssignmentState::Active),
        )?;

        let roles = merge_roles(eligible, &active, Utc::now());
        info!(
            "Loaded {} role(s), {} active",
            roles.len(),
            roles.iter().filter(|r| r.status.is_active()).count()
        );
        Ok(roles)
    }
}

/// Merge eligible and active role assignments, matched by role definition id.
pub(super) fn merge_roles(
    eligible: Vec<PimAssignment>,
    active: &[PimAssignment],
    now: DateTime<Utc>,
) -> Vec<Role> {
    let active = active_index(active, |a| a.role_definition_id().to_string());
    let mut seen = HashSet::new();

    let mut roles: Vec<Role> = eligible
        .into_iter()
        .filter(|a| seen.insert(a.role_definition_id().to_string()))
        .map(|a| {
            let role_definition_id = a.role_definition_id().to_string();
            let (status, expires_at) = match active.get(&role_definition_id) {
                Some(expiry) => (status_from_expiry(*expiry, now), *expiry),
                None => (ActivationStatus::Inactive, None),
            };
            Role {
                display_name: a
                    .role_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| role_definition_id.clone()),
                id: a.id,
                description: String::new(),
                role_definition_id,
                // Entra roles are tenant-wide.
                directory_scope_id: "/".to_string(),
                status,
                expires_at,
                max_duration: Duration::hours(DEFAULT_MAX_DURATION_HOURS),
                permissions: Vec::new(),
            }
        })
        .collect();

    roles.sort_by(|a, b| a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase()));
    roles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::test_client as client;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn assignment(id: &str, role_def: &str, name: &str, end: Option<&str>) -> PimAssignment {
        PimAssignment {
            id: id.to_string(),
            resource_id: "tenant-1".to_string(),
            role_definition: Some(PimRoleDefinition {
                id: role_def.to_string(),
                display_name: Some(name.to_string()),
            }),
            end_date_time: end.map(str::to_string),
        }
    }

    #[test]
    fn test_assignments_url_encodes_filter() {
        let url = assignments_url("https://pim", "aadroles", "u1", AssignmentState::Eligible);
        assert!(url.starts_with("https://pim/aadroles/roleAssignments?$expand="));
        assert!(url.contains("%28subject%2Fid%20eq%20%27u1%27%29"));
        assert!(url.contains("Eligible"));
    }

    #[test]
    fn test_merge_keeps_every_eligible_role_once() {
        let now = Utc::now();
        let soon = (now + Duration::minutes(10)).to_rfc3339();
        let later = (now + Duration::hours(3)).to_rfc3339();

        let eligible = vec![
            assignment("e1", "def-reader", "Global Reader", None),
            assignment("e2", "def-admin", "User Administrator", None),
            assignment("e3", "def-sec", "Security Reader", None),
            assignment("e4", "def-sec", "Security Reader", None),
            assignment("e5", "def-perm", "Billing Administrator", None),
        ];
        let active = vec![
            assignment("a1", "def-admin", "User Administrator", Some(&soon)),
            assignment("a2", "def-sec", "Security Reader", Some(&later)),
            assignment("a3", "def-perm", "Billing Administrator", None),
            assignment("a4", "def-other", "Not Eligible", Some(&later)),
        ];

        let roles = merge_roles(eligible, &active, now);
        assert_eq!(roles.len(), 4);

        let by_def: HashMap<_, _> = roles
            .iter()
            .map(|r| (r.role_definition_id.as_str(), r))
            .collect();
        assert_eq!(by_def["def-reader"].status, ActivationStatus::Inactive);
        assert!(by_def["def-reader"].expires_at.is_none());
        assert_eq!(by_def["def-admin"].status, ActivationStatus::ExpiringSoon);
        assert_eq!(by_def["def-sec"].status, ActivationStatus::Active);
        assert!(by_def["def-sec"].expires_at.is_some());
        assert_eq!(by_def["def-perm"].status, ActivationStatus::Active);
        assert!(by_def["def-perm"].expires_at.is_none());
        assert!(!by_def.contains_key("def-other"));

        let names: Vec<_> = roles.iter().map(|r| r.display_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Billing Administrator", "Global Reader", "Security Reader", "User Administrator"]
        );
    }

    #[tokio::test]
    async fn test_fetch_roles_queries_eligible_and_active() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "user-1"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/aadroles/roleAssignments"))
            .and(query_param(
                "$filter",
                "(subject/id eq 'user-1') and (assignmentState eq 'Eligible')",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [
                    {"id": "e1", "resourceId": "t", "roleDefinition": {"id": "d1", "displayName": "Reader"}},
                    {"id": "e2", "resourceId": "t", "roleDefinition": {"id": "d2", "displayName": "Writer"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/aadroles/roleAssignments"))
            .and(query_param(
                "$filter",
                "(subject/id eq 'user-1') and (assignmentState eq 'Active')",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [
                    {"id": "a1", "resourceId": "t", "roleDefinition": {"id": "d2"}, "endDateTime": "2099-01-01T00:00:00Z"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let roles = client(&server).fetch_roles().await.unwrap();
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0].display_name, "Reader");
        assert_eq!(roles[0].status, ActivationStatus::Inactive);
        assert_eq!(roles[1].status, ActivationStatus::Active);
    }

    #[tokio::test]
    async fn test_fetch_roles_fails_when_active_query_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "user-1"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/aadroles/roleAssignments"))
            .and(query_param(
                "$filter",
                "(subject/id eq 'user-1') and (assignmentState eq 'Active')",
            ))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/aadroles/roleAssignments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": []})))
            .mount(&server)
            .await;

        let err = client(&server).fetch_roles().await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 403, .. }));
    }
}
