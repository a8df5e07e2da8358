//! Who is signed in: user id, home tenant and display info.

use serde::Deserialize;
use tracing::info;

use super::gateway::RestGateway;
use super::models::{Tenant, UserInfo};
use crate::auth::Audience;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
struct MeId {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeInfo {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    user_principal_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganizationList {
    value: Vec<Organization>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Organization {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
}

impl RestGateway {
    /// Object id of the signed-in user. Fetched once per process.
    pub async fn current_user_id(&self) -> Result<String, ApiError> {
        self.user_id
            .get_or_try_init(|| async {
                let url = format!("{}/me?$select=id", self.endpoints().graph);
                let me: MeId = self.get_json(Audience::Graph, &url).await?;
                info!("Signed-in user id resolved");
                Ok::<_, ApiError>(me.id)
            })
            .await
            .cloned()
    }

    /// The user's home tenant. Fetched once per process.
    pub async fn tenant(&self) -> Result<Tenant, ApiError> {
        self.tenant
            .get_or_try_init(|| async {
                let url = format!(
                    "{}/organization?$select=id,displayName",
                    self.endpoints().graph
                );
                let orgs: OrganizationList = self.get_json(Audience::Graph, &url).await?;
                let org = orgs
                    .value
                    .into_iter()
                    .next()
                    .ok_or_else(|| ApiError::Parse("no organization found".into()))?;
                info!("Tenant resolved: {}", org.id);
                Ok::<_, ApiError>(Tenant {
                    display_name: org.display_name.unwrap_or_else(|| org.id.clone()),
                    id: org.id,
                })
            })
            .await
            .cloned()
    }

    /// Display name and UPN for the header. Not cached.
    pub async fn user_info(&self) -> Result<UserInfo, ApiError> {
        let url = format!(
            "{}/me?$select=displayName,userPrincipalName",
            self.endpoints().graph
        );
        let me: MeInfo = self.get_json(Audience::Graph, &url).await?;
        Ok(UserInfo {
            display_name: me.display_name.unwrap_or_default(),
            user_principal_name: me.user_principal_name.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::auth::StaticCredential;
    use crate::azure::gateway::{Endpoints, RetryPolicy};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer) -> RestGateway {
        let endpoints = Endpoints {
            graph: server.uri(),
            pim: server.uri(),
            arm: server.uri(),
        };
        let retry = RetryPolicy {
            max_retries: 0,
            base_delay: Duration::from_millis(1),
        };
        RestGateway::with_endpoints(Arc::new(StaticCredential), endpoints, retry).unwrap()
    }

    #[tokio::test]
    async fn test_user_id_and_tenant_are_fetched_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(query_param("$select", "id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "user-1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/organization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{"id": "tenant-1", "displayName": "Contoso"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gw = gateway(&server);
        assert_eq!(gw.current_user_id().await.unwrap(), "user-1");
        assert_eq!(gw.current_user_id().await.unwrap(), "user-1");

        let tenant = gw.tenant().await.unwrap();
        assert_eq!(tenant.display_name, "Contoso");
        assert_eq!(gw.tenant().await.unwrap(), tenant);
    }

    #[tokio::test]
    async fn test_failed_lookup_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "user-2"})))
            .mount(&server)
            .await;

        let gw = gateway(&server);
        assert!(gw.current_user_id().await.is_err());
        assert_eq!(gw.current_user_id().await.unwrap(), "user-2");
    }

    #[tokio::test]
    async fn test_empty_organization_list_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/organization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": []})))
            .mount(&server)
            .await;

        let gw = gateway(&server);
        assert!(matches!(gw.tenant().await, Err(ApiError::Parse(_))));
    }

    #[tokio::test]
    async fn test_user_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "displayName": "Ada Lovelace",
                "userPrincipalName": "ada@contoso.com"
            })))
            .mount(&server)
            .await;

        let gw = gateway(&server);
        let info = gw.user_info().await.unwrap();
        assert_eq!(info.display_name, "Ada Lovelace");
        assert_eq!(info.user_principal_name, "ada@contoso.com");
    }
}
