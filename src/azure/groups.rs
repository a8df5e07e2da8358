//! PIM-governed group memberships.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, info};

use super::models::{status_from_expiry, ActivationStatus, Group, DEFAULT_MAX_DURATION_HOURS};
use super::roles::{active_index, fetch_assignments, AssignmentState, PimAssignment};
use super::PimClient;
use crate::auth::Audience;
use crate::error::ApiError;

/// Membership role used when PIM doesn't say which one applies.
const DEFAULT_GROUP_ROLE: &str = "member";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupResource {
    #[serde(default)]
    display_name: Option<String>,
}

/// "member" or "owner" from the role definition's display name.
fn group_role(assignment: &PimAssignment) -> String {
    match assignment.role_name().map(str::to_lowercase).as_deref() {
        Some("owner") => "owner".to_string(),
        _ => DEFAULT_GROUP_ROLE.to_string(),
    }
}

impl PimClient {
    /// Eligible group memberships with their activation status.
    pub async fn fetch_groups(&self) -> Result<Vec<Group>, ApiError> {
        let gateway = self.gateway();
        let user_id = gateway.current_user_id().await?;

        let (eligible, active) = tokio::try_join!(
            fetch_assignments(gateway, "aadGroups", &user_id, AssignmentState::Eligible),
            fetch_assignments(gateway, "aadGroups", &user_id, AssignmentState::Active),
        )?;

        let ids: BTreeSet<String> = eligible.iter().map(|a| a.resource_id.clone()).collect();
        let names = self.resolve_group_names(ids).await;

        let groups = merge_groups(eligible, &active, &names, Utc::now());
        info!(
            "Loaded {} group(s), {} active",
            groups.len(),
            groups.iter().filter(|g| g.status.is_active()).count()
        );
        Ok(groups)
    }

    /// Look up display names for `ids`, one request per uncached id, in parallel.
    ///
    /// Failed lookups are left out; callers fall back to the id.
    async fn resolve_group_names(&self, ids: BTreeSet<String>) -> HashMap<String, String> {
        let lookups = ids.into_iter().map(|id| async move {
            if let Some(name) = self.group_names.get(&id).await {
                return Some((id, name));
            }

            let url = format!("{}/aadGroups/resources/{}", self.gateway().endpoints().pim, id);
            match self.gateway().get_json::<GroupResource>(Audience::Pim, &url).await {
                Ok(GroupResource {
                    display_name: Some(name),
                }) if !name.is_empty() => {
                    self.group_names.insert(&id, name.clone()).await;
                    Some((id, name))
                }
                Ok(_) => None,
                Err(e) => {
                    debug!("Group name lookup failed for {}: {}", id, e);
                    None
                }
            }
        });

        join_all(lookups).await.into_iter().flatten().collect()
    }
}

/// Merge eligible and active group assignments, matched by group id and
/// membership role.
fn merge_groups(
    eligible: Vec<PimAssignment>,
    active: &[PimAssignment],
    names: &HashMap<String, String>,
    now: DateTime<Utc>,
) -> Vec<Group> {
    let active = active_index(active, |a| (a.resource_id.clone(), group_role(a)));
    let mut seen = HashSet::new();

    let mut groups: Vec<Group> = eligible
        .into_iter()
        .filter(|a| seen.insert((a.resource_id.clone(), group_role(a))))
        .map(|a| {
            let (status, expires_at) = match active.get(&(a.resource_id.clone(), group_role(&a))) {
                Some(expiry) => (status_from_expiry(*expiry, now), *expiry),
                None => (ActivationStatus::Inactive, None),
            };
            Group {
                display_name: names
                    .get(&a.resource_id)
                    .cloned()
                    .unwrap_or_else(|| a.resource_id.clone()),
                description: a.role_name().unwrap_or("Member").to_string(),
                role_definition_id: group_role(&a),
                id: a.resource_id,
                status,
                expires_at,
                max_duration: Duration::hours(DEFAULT_MAX_DURATION_HOURS),
                linked_roles: Vec::new(),
                linked_azure_roles: Vec::new(),
            }
        })
        .collect();

    groups.sort_by(|a, b| a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase()));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::test_client;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_user(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "user-1"})))
            .mount(server)
            .await;
    }

    fn group_assignment(group: &str, role: &str, end: Option<&str>) -> serde_json::Value {
        serde_json::json!({
            "id": format!("{}-{}", group, role),
            "resourceId": group,
            "roleDefinition": {"id": format!("def-{}", role), "displayName": role},
            "endDateTime": end,
        })
    }

    #[tokio::test]
    async fn test_fetch_groups_resolves_names_once_per_group() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        Mock::given(method("GET"))
            .and(path("/aadGroups/roleAssignments"))
            .and(query_param(
                "$filter",
                "(subject/id eq 'user-1') and (assignmentState eq 'Eligible')",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [
                    group_assignment("g-1", "Member", None),
                    group_assignment("g-1", "Owner", None),
                    group_assignment("g-2", "Member", None),
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/aadGroups/roleAssignments"))
            .and(query_param(
                "$filter",
                "(subject/id eq 'user-1') and (assignmentState eq 'Active')",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [
                    group_assignment("g-1", "Member", Some("2099-01-01T00:00:00Z")),
                    group_assignment("g-2", "Member", Some("2099-01-01T00:00:00Z")),
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/aadGroups/resources/g-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "g-1", "displayName": "Platform Admins"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/aadGroups/resources/g-2"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let groups = client.fetch_groups().await.unwrap();

        assert_eq!(groups.len(), 3);
        let admins: Vec<_> = groups.iter().filter(|g| g.id == "g-1").collect();
        assert_eq!(admins.len(), 2);
        assert!(admins.iter().all(|g| g.display_name == "Platform Admins"));
        let owner = admins.iter().find(|g| g.role_definition_id == "owner").unwrap();
        let member = admins.iter().find(|g| g.role_definition_id == "member").unwrap();
        // An active Member membership doesn't make the Owner row active.
        assert_eq!(owner.status, ActivationStatus::Inactive);
        assert_eq!(owner.expires_at, None);
        assert_eq!(member.status, ActivationStatus::Active);

        let fallback = groups.iter().find(|g| g.id == "g-2").unwrap();
        assert_eq!(fallback.display_name, "g-2");
        assert_eq!(fallback.status, ActivationStatus::Active);
        assert_eq!(fallback.role_definition_id, "member");

        // The resolved name is served from cache on the next refresh.
        assert_eq!(client.group_names.get("g-1").await.as_deref(), Some("Platform Admins"));
    }

    #[tokio::test]
    async fn test_cached_names_skip_lookup() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        Mock::given(method("GET"))
            .and(path("/aadGroups/roleAssignments"))
            .and(query_param(
                "$filter",
                "(subject/id eq 'user-1') and (assignmentState eq 'Eligible')",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [group_assignment("g-1", "Member", None)]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/aadGroups/roleAssignments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/aadGroups/resources/g-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"displayName": "Ops"})))
            .expect(0)
            .mount(&server)
            .await;

        let client = test_client(&server);
        client.group_names.insert("g-1", "Ops (cached)".to_string()).await;

        let groups = client.fetch_groups().await.unwrap();
        assert_eq!(groups[0].display_name, "Ops (cached)");
        assert_eq!(groups[0].status, ActivationStatus::Inactive);
    }
}
