//! Azure PIM services: REST gateway, assignment catalogs and the activation
//! orchestrator.

pub mod cache;
pub mod gateway;
pub mod groups;
pub mod identity;
pub mod models;
pub mod mutations;
pub mod orchestrator;
pub mod roles;
pub mod subscriptions;

pub use gateway::{Endpoints, RestGateway, RetryPolicy};
pub use models::{
    ActivationStatus, EligibleAzureRole, Group, Role, Subscription, Tenant, UserInfo,
};
pub use orchestrator::{AssignmentMutator, BatchItem};

use cache::NameCache;

/// Entry point for everything the dashboard loads from or sends to Azure.
pub struct PimClient {
    gateway: RestGateway,
    group_names: NameCache,
    tenant_names: NameCache,
}

impl PimClient {
    pub fn new(gateway: RestGateway) -> Self {
        Self {
            gateway,
            group_names: NameCache::new(),
            tenant_names: NameCache::new(),
        }
    }

    pub fn gateway(&self) -> &RestGateway {
        &self.gateway
    }
}

/// Client whose three APIs all point at a mock server, without retry delays.
#[cfg(test)]
pub(crate) fn test_client(server: &wiremock::MockServer) -> PimClient {
    PimClient::new(test_gateway(server))
}

#[cfg(test)]
pub(crate) fn test_gateway(server: &wiremock::MockServer) -> RestGateway {
    use std::sync::Arc;
    use std::time::Duration;

    let endpoints = Endpoints {
        graph: server.uri(),
        pim: server.uri(),
        arm: server.uri(),
    };
    let retry = RetryPolicy {
        max_retries: 0,
        base_delay: Duration::from_millis(1),
    };
    RestGateway::with_endpoints(Arc::new(crate::auth::StaticCredential), endpoints, retry)
        .expect("gateway")
}
