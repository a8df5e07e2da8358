//! Executes [`Command`]s from the state machine as background tasks.
//!
//! Every task reports back with exactly one [`Msg`] on the channel the event
//! loop reads from. Fetches are bounded by a per-call timeout and abort on
//! shutdown. Mutation batches run to completion once issued; each of their
//! requests is bounded by the gateway's per-request timeout.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::app::history;
use crate::app::{Command, Msg};
use crate::azure::{orchestrator, PimClient};
use crate::error::{ApiError, AuthError, FetchError, FetchSource};

const AUTH_CHECK_TIMEOUT: Duration = Duration::from_secs(30);
const TENANT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_INFO_TIMEOUT: Duration = Duration::from_secs(10);
const ROLES_TIMEOUT: Duration = Duration::from_secs(30);
const GROUPS_TIMEOUT: Duration = Duration::from_secs(30);
const SUBSCRIPTIONS_TIMEOUT: Duration = Duration::from_secs(60);
const LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

/// Spawns the work behind each command.
pub struct Runtime {
    client: Arc<PimClient>,
    tx: UnboundedSender<Msg>,
    cancel: CancellationToken,
    export_dir: PathBuf,
}

impl Runtime {
    pub fn new(
        client: Arc<PimClient>,
        tx: UnboundedSender<Msg>,
        cancel: CancellationToken,
        export_dir: PathBuf,
    ) -> Self {
        Self {
            client,
            tx,
            cancel,
            export_dir,
        }
    }

    /// Start `command`. Returns false for [`Command::Quit`].
    pub fn execute(&self, command: Command) -> bool {
        debug!("Executing {}", command_name(&command));
        match command {
            Command::CheckAuth => {
                let client = Arc::clone(&self.client);
                self.spawn_fetch(
                    FetchSource::Auth,
                    AUTH_CHECK_TIMEOUT,
                    async move { client.gateway().current_user_id().await.map(|_| ()) },
                    Msg::AuthChecked,
                );
            }
            Command::LoadTenant => {
                let client = Arc::clone(&self.client);
                self.spawn_fetch(
                    FetchSource::Tenant,
                    TENANT_TIMEOUT,
                    async move { client.gateway().tenant().await },
                    Msg::TenantLoaded,
                );
            }
            Command::LoadUserInfo => {
                let client = Arc::clone(&self.client);
                self.spawn_fetch(
                    FetchSource::UserInfo,
                    USER_INFO_TIMEOUT,
                    async move { client.gateway().user_info().await },
                    Msg::UserInfoLoaded,
                );
            }
            Command::LoadRoles => {
                let client = Arc::clone(&self.client);
                self.spawn_fetch(
                    FetchSource::Roles,
                    ROLES_TIMEOUT,
                    async move { client.fetch_roles().await },
                    Msg::RolesLoaded,
                );
            }
            Command::LoadGroups => {
                let client = Arc::clone(&self.client);
                self.spawn_fetch(
                    FetchSource::Groups,
                    GROUPS_TIMEOUT,
                    async move { client.fetch_groups().await },
                    Msg::GroupsLoaded,
                );
            }
            Command::LoadSubscriptions => {
                let client = Arc::clone(&self.client);
                self.spawn_fetch(
                    FetchSource::Subscriptions,
                    SUBSCRIPTIONS_TIMEOUT,
                    async move { client.fetch_subscriptions().await },
                    Msg::SubscriptionsLoaded,
                );
            }
            Command::Login => {
                let client = Arc::clone(&self.client);
                let tx = self.tx.clone();
                let cancel = self.cancel.clone();
                tokio::spawn(async move {
                    let credential = client.gateway().credential();
                    let result = tokio::select! {
                        _ = cancel.cancelled() => return,
                        outcome = tokio::time::timeout(LOGIN_TIMEOUT, credential.login()) => {
                            outcome.unwrap_or_else(|_| {
                                Err(AuthError::LoginTimeout(LOGIN_TIMEOUT.as_secs()))
                            })
                        }
                    };
                    let _ = tx.send(Msg::LoginFinished(result));
                });
            }
            Command::Activate {
                items,
                justification,
                duration,
            } => {
                let client = Arc::clone(&self.client);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result =
                        orchestrator::activate(&*client, &items, &justification, duration)
                            .await;
                    let _ = tx.send(Msg::ActivationFinished(result));
                });
            }
            Command::Deactivate { items } => {
                let client = Arc::clone(&self.client);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = orchestrator::deactivate(&*client, &items).await;
                    let _ = tx.send(Msg::DeactivationFinished(result));
                });
            }
            Command::ScheduleRefresh(delay) => {
                let tx = self.tx.clone();
                let cancel = self.cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {
                            let _ = tx.send(Msg::RefreshDue);
                        }
                    }
                });
            }
            Command::ExportHistory(entries) => {
                let tx = self.tx.clone();
                let dir = self.export_dir.clone();
                tokio::task::spawn_blocking(move || {
                    let result =
                        history::export_history(&entries, &dir).map_err(|e| format!("{:#}", e));
                    let _ = tx.send(Msg::HistoryExported(result));
                });
            }
            Command::Quit => {
                self.cancel.cancel();
                return false;
            }
        }
        true
    }

    /// Run `fetch` with a timeout and report its result through `wrap`.
    fn spawn_fetch<T, F>(
        &self,
        origin: FetchSource,
        timeout: Duration,
        fetch: F,
        wrap: fn(Result<T, FetchError>) -> Msg,
    ) where
        T: Send + 'static,
        F: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => Err(ApiError::Cancelled),
                outcome = tokio::time::timeout(timeout, fetch) => match outcome {
                    Ok(result) => result,
                    Err(_) => Err(ApiError::Timeout(timeout.as_secs())),
                },
            };
            if let Err(e) = &result {
                if matches!(e, ApiError::Cancelled) {
                    return;
                }
                warn!("Loading {} failed: {}", origin, e);
            }
            let _ = tx.send(wrap(result.map_err(|e| FetchError::new(origin, e))));
        });
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::CheckAuth => "check-auth",
        Command::LoadTenant => "load-tenant",
        Command::LoadUserInfo => "load-user-info",
        Command::LoadRoles => "load-roles",
        Command::LoadGroups => "load-groups",
        Command::LoadSubscriptions => "load-subscriptions",
        Command::Login => "login",
        Command::Activate { .. } => "activate",
        Command::Deactivate { .. } => "deactivate",
        Command::ScheduleRefresh(_) => "schedule-refresh",
        Command::ExportHistory(_) => "export-history",
        Command::Quit => "quit",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::{test_client, test_gateway, BatchItem};
    use serde_json::json;
    use tokio::sync::mpsc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn runtime(server: &MockServer) -> (Runtime, mpsc::UnboundedReceiver<Msg>, CancellationToken) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let runtime = Runtime::new(
            Arc::new(test_client(server)),
            tx,
            cancel.clone(),
            std::env::temp_dir(),
        );
        (runtime, rx, cancel)
    }

    #[tokio::test]
    async fn test_load_tenant_reports_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/organization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"id": "tenant-1", "displayName": "Contoso"}]
            })))
            .mount(&server)
            .await;

        let (runtime, mut rx, _cancel) = runtime(&server);
        assert!(runtime.execute(Command::LoadTenant));

        match rx.recv().await {
            Some(Msg::TenantLoaded(Ok(tenant))) => assert_eq!(tenant.display_name, "Contoso"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_is_tagged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let (runtime, mut rx, _cancel) = runtime(&server);
        runtime.execute(Command::LoadRoles);

        match rx.recv().await {
            Some(Msg::RolesLoaded(Err(e))) => {
                assert_eq!(e.origin, FetchSource::Roles);
                assert!(matches!(e.error, ApiError::Status { status: 500, .. }));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stalled_activation_still_reports_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "user-1"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/organization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"id": "tenant-1", "displayName": "Contoso"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/aadroles/roleAssignmentRequests"))
            .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let gateway = test_gateway(&server).with_request_timeout(Duration::from_millis(100));
        let runtime = Runtime::new(
            Arc::new(PimClient::new(gateway)),
            tx,
            CancellationToken::new(),
            std::env::temp_dir(),
        );

        runtime.execute(Command::Activate {
            items: vec![BatchItem::Role {
                role_definition_id: "def-reader".into(),
                display_name: "Global Reader".into(),
            }],
            justification: "deploy".into(),
            duration: chrono::Duration::hours(1),
        });

        let msg = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("activation never reported back");
        match msg {
            Some(Msg::ActivationFinished(Err(e))) => {
                assert_eq!(e.completed, 0);
                assert!(matches!(e.error, ApiError::Timeout(_)));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_quit_cancels_scheduled_refresh() {
        let server = MockServer::start().await;
        let (runtime, mut rx, cancel) = runtime(&server);

        runtime.execute(Command::ScheduleRefresh(Duration::from_secs(60)));
        assert!(!runtime.execute(Command::Quit));
        assert!(cancel.is_cancelled());

        drop(runtime);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_scheduled_refresh_fires() {
        let server = MockServer::start().await;
        let (runtime, mut rx, _cancel) = runtime(&server);

        runtime.execute(Command::ScheduleRefresh(Duration::from_millis(10)));
        assert!(matches!(rx.recv().await, Some(Msg::RefreshDue)));
    }
}
