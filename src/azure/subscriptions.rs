//! ARM role eligibilities grouped by subscription, including Lighthouse
//! delegations into customer tenants.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::models::{
    parse_end_time, status_from_expiry, ActivationStatus, EligibleAzureRole, Subscription,
};
use super::PimClient;
use crate::auth::Audience;
use crate::error::ApiError;

/// API version of the ARM PIM endpoints.
pub(super) const API_VERSION_PIM: &str = "2020-10-01";

/// API version for subscription details.
const API_VERSION_SUBS: &str = "2022-12-01";

#[derive(Debug, Deserialize)]
struct ScheduleInstance {
    #[serde(default)]
    id: String,
    properties: ScheduleProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleProperties {
    #[serde(default)]
    scope: String,
    #[serde(default)]
    role_definition_id: String,
    #[serde(default)]
    role_eligibility_schedule_id: Option<String>,
    #[serde(default)]
    assignment_type: Option<String>,
    #[serde(default)]
    end_date_time: Option<String>,
    #[serde(default)]
    expanded_properties: Option<ExpandedProperties>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpandedProperties {
    #[serde(default)]
    role_definition: Option<Named>,
    #[serde(default)]
    scope: Option<Named>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Named {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionDetails {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    tenant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TenantInformation {
    #[serde(default)]
    display_name: Option<String>,
}

/// Subscription id from an ARM scope such as
/// `/subscriptions/{id}/resourceGroups/rg`.
pub fn subscription_id_from_scope(scope: &str) -> Option<&str> {
    let mut segments = scope.trim_start_matches('/').split('/');
    match (segments.next(), segments.next()) {
        (Some(kind), Some(id)) if kind.eq_ignore_ascii_case("subscriptions") && !id.is_empty() => {
            Some(id)
        }
        _ => None,
    }
}

/// Key joining eligibilities to active assignments. ARM ids vary in case.
fn assignment_key(scope: &str, role_definition_id: &str) -> String {
    format!("{}|{}", scope, role_definition_id).to_lowercase()
}

impl ScheduleInstance {
    fn role_name(&self) -> String {
        self.properties
            .expanded_properties
            .as_ref()
            .and_then(|p| p.role_definition.as_ref())
            .and_then(|r| r.display_name.clone())
            .unwrap_or_else(|| {
                self.properties
                    .role_definition_id
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string()
            })
    }

    fn scope_name(&self) -> Option<String> {
        self.properties
            .expanded_properties
            .as_ref()
            .and_then(|p| p.scope.as_ref())
            .and_then(|s| s.display_name.clone())
    }
}

impl PimClient {
    /// Subscriptions with ARM role eligibilities, sorted by tenant then name.
    pub async fn fetch_subscriptions(&self) -> Result<Vec<Subscription>, ApiError> {
        let arm = &self.gateway().endpoints().arm;
        let eligible_url = format!(
            "{}/providers/Microsoft.Authorization/roleEligibilityScheduleInstances?api-version={}&$filter=asTarget()",
            arm, API_VERSION_PIM
        );
        let active_url = format!(
            "{}/providers/Microsoft.Authorization/roleAssignmentScheduleInstances?api-version={}&$filter=asTarget()",
            arm, API_VERSION_PIM
        );

        // Active assignments are best-effort: without them every role shows
        // as inactive.
        let active = async {
            match self
                .gateway()
                .get_all_pages(Audience::ResourceManager, &active_url)
                .await
                .and_then(parse_instances)
            {
                Ok(active) => active_expiries(&active),
                Err(e) => {
                    warn!("Active subscription assignments unavailable: {}", e);
                    HashMap::new()
                }
            }
        };
        let (eligible, active) = tokio::join!(
            self.gateway()
                .get_all_pages(Audience::ResourceManager, &eligible_url),
            active
        );
        let eligible: Vec<ScheduleInstance> = parse_instances(eligible?)?;

        let mut by_subscription: BTreeMap<String, Vec<ScheduleInstance>> = BTreeMap::new();
        for instance in eligible {
            match subscription_id_from_scope(&instance.properties.scope) {
                Some(id) => by_subscription
                    .entry(id.to_string())
                    .or_default()
                    .push(instance),
                None => debug!("Skipping eligibility outside a subscription: {}", instance.properties.scope),
            }
        }

        if by_subscription.is_empty() {
            info!("No subscription role eligibilities");
            return Ok(Vec::new());
        }

        let details = join_all(by_subscription.keys().map(|id| self.subscription_details(id))).await;

        let tenant_ids: BTreeSet<String> = details
            .iter()
            .filter_map(|d| d.as_ref().and_then(|d| d.tenant_id.clone()))
            .filter(|t| !t.is_empty())
            .collect();
        let tenant_names = self.resolve_tenant_names(tenant_ids).await;

        let now = Utc::now();
        let mut subscriptions: Vec<Subscription> = by_subscription
            .into_iter()
            .zip(details)
            .map(|((id, instances), details)| {
                build_subscription(id, instances, details, &tenant_names, &active, now)
            })
            .collect();

        sort_subscriptions(&mut subscriptions);
        info!(
            "Loaded {} subscription(s) across {} tenant(s)",
            subscriptions.len(),
            tenant_names.len()
        );
        Ok(subscriptions)
    }

    /// Home tenant and display name of one subscription; `None` on failure.
    async fn subscription_details(&self, id: &str) -> Option<SubscriptionDetails> {
        let url = format!(
            "{}/subscriptions/{}?api-version={}",
            self.gateway().endpoints().arm,
            id,
            API_VERSION_SUBS
        );
        match self
            .gateway()
            .get_json::<SubscriptionDetails>(Audience::ResourceManager, &url)
            .await
        {
            Ok(details) => Some(details),
            Err(e) => {
                debug!("Subscription lookup failed for {}: {}", id, e);
                None
            }
        }
    }

    /// Display names for distinct tenant ids, one request per uncached tenant.
    ///
    /// Failed lookups fall back to the tenant id and aren't cached.
    async fn resolve_tenant_names(&self, ids: BTreeSet<String>) -> HashMap<String, String> {
        let lookups = ids.into_iter().map(|id| async move {
            if let Some(name) = self.tenant_names.get(&id).await {
                return (id, name);
            }

            let url = format!(
                "{}/tenantRelationships/findTenantInformationByTenantId(tenantId='{}')",
                self.gateway().endpoints().graph,
                id
            );
            match self
                .gateway()
                .get_json::<TenantInformation>(Audience::Graph, &url)
                .await
            {
                Ok(TenantInformation {
                    display_name: Some(name),
                }) if !name.is_empty() => {
                    self.tenant_names.insert(&id, name.clone()).await;
                    (id, name)
                }
                Ok(_) => (id.clone(), id),
                Err(e) => {
                    debug!("Tenant name lookup failed for {}: {}", id, e);
                    (id.clone(), id)
                }
            }
        });

        join_all(lookups).await.into_iter().collect()
    }
}

fn parse_instances(values: Vec<serde_json::Value>) -> Result<Vec<ScheduleInstance>, ApiError> {
    values
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(ApiError::from))
        .collect()
}

/// Expiry per `scope|roleDefinitionId` for activated (not permanent) assignments.
fn active_expiries(active: &[ScheduleInstance]) -> HashMap<String, Option<DateTime<Utc>>> {
    active
        .iter()
        .filter(|a| a.properties.assignment_type.as_deref() == Some("Activated"))
        .map(|a| {
            (
                assignment_key(&a.properties.scope, &a.properties.role_definition_id),
                parse_end_time(a.properties.end_date_time.as_deref()),
            )
        })
        .collect()
}

fn build_subscription(
    id: String,
    instances: Vec<ScheduleInstance>,
    details: Option<SubscriptionDetails>,
    tenant_names: &HashMap<String, String>,
    active: &HashMap<String, Option<DateTime<Utc>>>,
    now: DateTime<Utc>,
) -> Subscription {
    let (display_name, tenant_id) = match details {
        Some(d) => (d.display_name, d.tenant_id.unwrap_or_default()),
        None => (None, String::new()),
    };
    // Without subscription details, use the name ARM expanded on a
    // subscription-scoped eligibility.
    let subscription_scope = format!("/subscriptions/{}", id);
    let display_name = display_name
        .or_else(|| {
            instances
                .iter()
                .filter(|i| i.properties.scope.eq_ignore_ascii_case(&subscription_scope))
                .find_map(ScheduleInstance::scope_name)
        })
        .unwrap_or_else(|| id.clone());
    let tenant_name = tenant_names
        .get(&tenant_id)
        .cloned()
        .unwrap_or_else(|| tenant_id.clone());

    let eligible_roles = instances
        .iter()
        .map(|instance| {
            let key = assignment_key(&instance.properties.scope, &instance.properties.role_definition_id);
            let (status, expires_at) = match active.get(&key) {
                Some(expiry) => (status_from_expiry(*expiry, now), *expiry),
                None => (ActivationStatus::Inactive, None),
            };
            EligibleAzureRole {
                role_definition_id: instance.properties.role_definition_id.clone(),
                role_definition_name: instance.role_name(),
                role_eligibility_id: instance
                    .properties
                    .role_eligibility_schedule_id
                    .clone()
                    .unwrap_or_else(|| instance.id.clone()),
                scope: instance.properties.scope.clone(),
                status,
                expires_at,
            }
        })
        .collect();

    let mut subscription = Subscription {
        id,
        display_name,
        tenant_id,
        tenant_name,
        status: ActivationStatus::Inactive,
        eligible_roles,
    };
    subscription.refresh_status();
    subscription
}

/// Sort by tenant name, then subscription name. Stable.
fn sort_subscriptions(subscriptions: &mut [Subscription]) {
    subscriptions.sort_by(|a, b| {
        a.tenant_name
            .to_lowercase()
            .cmp(&b.tenant_name.to_lowercase())
            .then_with(|| a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase()))
    });
}
