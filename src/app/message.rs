//! Messages into the state machine and commands out of it.

use std::path::PathBuf;

use super::history::ActivationHistoryEntry;
use super::input::Key;
use crate::azure::{BatchItem, Group, Role, Subscription, Tenant, UserInfo};
use crate::error::{AuthError, BatchError, FetchError};

/// Everything the state machine reacts to.
#[derive(Debug)]
pub enum Msg {
    Key(Key),
    /// Periodic timer, every 100ms.
    Tick,
    Resize { width: u16, height: u16 },
    AuthChecked(Result<(), FetchError>),
    TenantLoaded(Result<Tenant, FetchError>),
    UserInfoLoaded(Result<UserInfo, FetchError>),
    RolesLoaded(Result<Vec<Role>, FetchError>),
    GroupsLoaded(Result<Vec<Group>, FetchError>),
    SubscriptionsLoaded(Result<Vec<Subscription>, FetchError>),
    LoginFinished(Result<(), AuthError>),
    ActivationFinished(Result<(), BatchError>),
    DeactivationFinished(Result<(), BatchError>),
    /// A delayed refresh scheduled with [`Command::ScheduleRefresh`] is due.
    RefreshDue,
    HistoryExported(Result<PathBuf, String>),
}

/// Side effects requested by the state machine. Executed by the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CheckAuth,
    LoadTenant,
    LoadUserInfo,
    LoadRoles,
    LoadGroups,
    LoadSubscriptions,
    Login,
    Activate {
        items: Vec<BatchItem>,
        justification: String,
        duration: chrono::Duration,
    },
    Deactivate {
        items: Vec<BatchItem>,
    },
    ScheduleRefresh(std::time::Duration),
    ExportHistory(Vec<ActivationHistoryEntry>),
    Quit,
}
