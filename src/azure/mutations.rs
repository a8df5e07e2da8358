//! Activation and deactivation requests for each kind of assignment.

use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use uuid::Uuid;

use super::orchestrator::{arm_duration, pim_duration, AssignmentMutator, BatchItem};
use super::subscriptions::API_VERSION_PIM;
use super::PimClient;
use crate::auth::Audience;
use crate::error::ApiError;

/// Reason recorded with self-service deactivations.
const DEACTIVATION_REASON: &str = "Deactivated via pim-tui";

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Body of a PIM Governance `roleAssignmentRequests` POST.
fn pim_request_body(
    resource_id: &str,
    role_definition_id: &str,
    subject_id: &str,
    activation: Option<(&str, Duration)>,
) -> Value {
    match activation {
        Some((justification, duration)) => json!({
            "roleDefinitionId": role_definition_id,
            "resourceId": resource_id,
            "subjectId": subject_id,
            "assignmentState": "Active",
            "type": "UserAdd",
            "reason": justification,
            "schedule": {
                "type": "Once",
                "startDateTime": now_rfc3339(),
                "duration": pim_duration(duration),
            },
        }),
        None => json!({
            "roleDefinitionId": role_definition_id,
            "resourceId": resource_id,
            "subjectId": subject_id,
            "assignmentState": "Active",
            "type": "UserRemove",
            "reason": DEACTIVATION_REASON,
            "schedule": {
                "type": "Once",
                "startDateTime": null,
                "endDateTime": null,
            },
        }),
    }
}

/// Body of an ARM `roleAssignmentScheduleRequests` PUT.
fn arm_request_body(
    principal_id: &str,
    role_definition_id: &str,
    role_eligibility_id: &str,
    activation: Option<(&str, Duration)>,
) -> Value {
    match activation {
        Some((justification, duration)) => json!({
            "properties": {
                "principalId": principal_id,
                "roleDefinitionId": role_definition_id,
                "requestType": "SelfActivate",
                "linkedRoleEligibilityScheduleId": role_eligibility_id,
                "justification": justification,
                "scheduleInfo": {
                    "startDateTime": now_rfc3339(),
                    "expiration": {
                        "type": "AfterDuration",
                        "duration": arm_duration(duration),
                    },
                },
            },
        }),
        None => json!({
            "properties": {
                "principalId": principal_id,
                "roleDefinitionId": role_definition_id,
                "requestType": "SelfDeactivate",
                "linkedRoleEligibilityScheduleId": role_eligibility_id,
                "justification": DEACTIVATION_REASON,
            },
        }),
    }
}

impl PimClient {
    async fn submit(
        &self,
        item: &BatchItem,
        activation: Option<(&str, Duration)>,
    ) -> Result<(), ApiError> {
        let gateway = self.gateway();
        let user_id = gateway.current_user_id().await?;

        match item {
            BatchItem::Role {
                role_definition_id, ..
            } => {
                let tenant = gateway.tenant().await?;
                let body = pim_request_body(&tenant.id, role_definition_id, &user_id, activation);
                let url = format!("{}/aadroles/roleAssignmentRequests", gateway.endpoints().pim);
                gateway.call(Audience::Pim, Method::POST, &url, Some(&body)).await?;
            }
            BatchItem::Group {
                group_id,
                role_definition_id,
                ..
            } => {
                let body = pim_request_body(group_id, role_definition_id, &user_id, activation);
                let url = format!("{}/aadGroups/roleAssignmentRequests", gateway.endpoints().pim);
                gateway.call(Audience::Pim, Method::POST, &url, Some(&body)).await?;
            }
            BatchItem::SubscriptionRole {
                scope,
                role_definition_id,
                role_eligibility_id,
                ..
            } => {
                let body = arm_request_body(&user_id, role_definition_id, role_eligibility_id, activation);
                let url = format!(
                    "{}{}/providers/Microsoft.Authorization/roleAssignmentScheduleRequests/{}?api-version={}",
                    gateway.endpoints().arm,
                    scope,
                    Uuid::new_v4(),
                    API_VERSION_PIM
                );
                gateway
                    .call(Audience::ResourceManager, Method::PUT, &url, Some(&body))
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AssignmentMutator for PimClient {
    async fn activate_item(
        &self,
        item: &BatchItem,
        justification: &str,
        duration: Duration,
    ) -> Result<(), ApiError> {
        self.submit(item, Some((justification, duration))).await
    }

    async fn deactivate_item(&self, item: &BatchItem) -> Result<(), ApiError> {
        self.submit(item, None).await
    }
}
