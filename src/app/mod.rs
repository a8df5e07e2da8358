//! Interaction state machine.
//!
//! [`App`] owns every piece of UI state. Key presses, timer ticks and the
//! results of background work all arrive as [`Msg`]s through [`App::update`],
//! one at a time, and side effects leave as [`Command`]s for the runtime to
//! execute. The renderer only ever reads an `&App`.

pub mod history;
pub mod input;
pub mod justification;
pub mod log;
pub mod message;
pub mod search;
pub mod selection;

use std::ops::Range;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::azure::orchestrator::describe_deactivation_failure;
use crate::azure::{ActivationStatus, BatchItem, Group, Role, Subscription, Tenant, UserInfo};
use crate::config::Config;
use crate::error::{AppError, AuthError, BatchError, FetchError, ValidationError};

pub use history::ActivationHistoryEntry;
pub use input::{Key, TextInput};
pub use log::{ActivityLog, LogLevel};
pub use message::{Command, Msg};
pub use selection::{RowKey, Selection};

/// Terminal rows not available to the list (header, tabs, log panel, status bar).
const LIST_CHROME_ROWS: u16 = 17;

/// Where the user is in the interaction flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unauthenticated,
    Authenticating,
    Loading,
    Normal,
    Confirm,
    ConfirmDeactivate,
    Justification,
    Search,
    Help,
    Activating,
    Deactivating,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Roles,
    Groups,
    Subscriptions,
}

impl Tab {
    pub const ALL: [Tab; 3] = [Tab::Roles, Tab::Groups, Tab::Subscriptions];

    pub fn index(self) -> usize {
        match self {
            Self::Roles => 0,
            Self::Groups => 1,
            Self::Subscriptions => 2,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Roles => "Entra Roles",
            Self::Groups => "PIM Groups",
            Self::Subscriptions => "Azure Subscriptions",
        }
    }

    fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// The dashboard's state and render model.
#[derive(Debug)]
pub struct App {
    pub state: State,
    pub tab: Tab,
    pub tenant: Option<Tenant>,
    pub user: Option<UserInfo>,
    pub roles: Vec<Role>,
    pub groups: Vec<Group>,
    pub subscriptions: Vec<Subscription>,
    pub roles_loaded: bool,
    pub groups_loaded: bool,
    pub subscriptions_loaded: bool,
    /// Cursor per tab, as a position among the visible rows.
    cursors: [usize; 3],
    scrolls: [usize; 3],
    list_height: usize,
    pub selection: Selection,
    pub search: TextInput,
    pub justification: TextInput,
    pub justification_error: Option<ValidationError>,
    /// Items waiting in `Confirm`, `ConfirmDeactivate` or `Justification`.
    pub pending: Vec<BatchItem>,
    pub duration_presets: Vec<u32>,
    pub duration_index: usize,
    pub log: ActivityLog,
    pub history: Vec<ActivationHistoryEntry>,
    /// History entries written for the batch in flight.
    batch_history: Range<usize>,
    pub auto_refresh: bool,
    refresh_interval: Duration,
    settle_delay: Duration,
    pub last_refresh: Option<Instant>,
    pub error_message: Option<String>,
    pub credential_name: &'static str,
}

impl App {
    pub fn new(config: &Config, credential_name: &'static str) -> Self {
        Self {
            state: State::Loading,
            tab: Tab::default(),
            tenant: None,
            user: None,
            roles: Vec::new(),
            groups: Vec::new(),
            subscriptions: Vec::new(),
            roles_loaded: false,
            groups_loaded: false,
            subscriptions_loaded: false,
            cursors: [0; 3],
            scrolls: [0; 3],
            list_height: 10,
            selection: Selection::default(),
            search: TextInput::new(search::MAX_QUERY_LEN),
            justification: TextInput::new(justification::INPUT_CAPACITY),
            justification_error: None,
            pending: Vec::new(),
            duration_presets: config.activation.duration_presets_hours.clone(),
            duration_index: config.default_preset_index(),
            log: ActivityLog::new(LogLevel::from_config(&config.logging.level)),
            history: Vec::new(),
            batch_history: 0..0,
            auto_refresh: config.refresh.auto_refresh_enabled,
            refresh_interval: Duration::from_secs(config.refresh.auto_refresh_interval_seconds),
            settle_delay: Duration::from_secs(config.activation.settle_delay_seconds),
            last_refresh: None,
            error_message: None,
            credential_name,
        }
    }

    /// Commands that start the session check and the initial load.
    pub fn init(&mut self) -> Vec<Command> {
        self.start_loading()
    }

    /// Apply one message and return the commands it triggers.
    pub fn update(&mut self, msg: Msg) -> Vec<Command> {
        match msg {
            Msg::Key(key) => self.on_key(key),
            Msg::Tick => self.on_tick(Instant::now()),
            Msg::Resize { height, .. } => {
                self.list_height = height.saturating_sub(LIST_CHROME_ROWS).max(1) as usize;
                self.sync_scroll();
                Vec::new()
            }
            Msg::AuthChecked(result) => self.on_auth_checked(result),
            Msg::TenantLoaded(result) => self.on_tenant_loaded(result),
            Msg::UserInfoLoaded(result) => {
                match result {
                    Ok(user) => {
                        self.log.debug(format!("Signed in as {}", user.user_principal_name));
                        self.user = Some(user);
                    }
                    Err(e) => self.log.debug(format!("[{}] {}", e.origin, e.error)),
                }
                Vec::new()
            }
            Msg::RolesLoaded(result) => self.on_roles_loaded(result),
            Msg::GroupsLoaded(result) => self.on_groups_loaded(result),
            Msg::SubscriptionsLoaded(result) => self.on_subscriptions_loaded(result),
            Msg::LoginFinished(result) => self.on_login_finished(result),
            Msg::ActivationFinished(result) => self.on_activation_finished(result),
            Msg::DeactivationFinished(result) => self.on_deactivation_finished(result),
            Msg::RefreshDue => {
                if matches!(
                    self.state,
                    State::Loading | State::Error | State::Unauthenticated | State::Authenticating
                ) {
                    return Vec::new();
                }
                self.log.debug("Refreshing after settle delay");
                self.refresh_all()
            }
            Msg::HistoryExported(result) => {
                match result {
                    Ok(path) => self.log.info(format!("Exported history to {}", path.display())),
                    Err(e) => self.log.error(format!("History export failed: {}", e)),
                }
                Vec::new()
            }
        }
    }

    // Loading

    fn start_loading(&mut self) -> Vec<Command> {
        self.state = State::Loading;
        self.error_message = None;
        self.tenant = None;
        self.roles_loaded = false;
        self.groups_loaded = false;
        self.subscriptions_loaded = false;
        self.log
            .info(format!("Checking Azure session ({})...", self.credential_name));
        vec![Command::CheckAuth]
    }

    fn on_auth_checked(&mut self, result: Result<(), FetchError>) -> Vec<Command> {
        match result {
            Ok(()) => {
                self.log.debug("Session is valid");
                vec![Command::LoadTenant]
            }
            Err(e) => self.on_fetch_failed(e),
        }
    }

    fn on_tenant_loaded(&mut self, result: Result<Tenant, FetchError>) -> Vec<Command> {
        match result {
            Ok(tenant) => {
                self.log.info(format!("Tenant: {}", tenant.display_name));
                self.tenant = Some(tenant);
                self.check_loading_complete();
                vec![
                    Command::LoadUserInfo,
                    Command::LoadRoles,
                    Command::LoadGroups,
                    Command::LoadSubscriptions,
                ]
            }
            Err(e) => self.on_fetch_failed(e),
        }
    }

    /// Log a failed fetch. Fatal sources also end the load: a missing session
    /// asks for sign-in, anything else shows the error screen.
    fn on_fetch_failed(&mut self, err: FetchError) -> Vec<Command> {
        self.log.error(format!("[{}] {}", err.origin, err.error));
        if !err.origin.is_fatal() {
            return Vec::new();
        }

        let app_err = AppError::Api(err.error.clone());
        if app_err.requires_sign_in() {
            self.state = State::Unauthenticated;
            self.log.info("Sign-in required. Press l to log in.");
        } else {
            self.state = State::Error;
            self.error_message = Some(format!("{}\n\n{}", app_err.user_message(), err));
        }
        Vec::new()
    }

    fn on_roles_loaded(&mut self, result: Result<Vec<Role>, FetchError>) -> Vec<Command> {
        self.roles_loaded = true;
        match result {
            Ok(roles) => {
                if roles.len() < self.roles.len() {
                    self.selection.clear_tab(Tab::Roles);
                }
                self.log.debug(format!("Loaded {} role(s)", roles.len()));
                self.roles = roles;
            }
            Err(e) => {
                self.on_fetch_failed(e);
            }
        }
        self.clamp_cursor(Tab::Roles);
        self.check_loading_complete();
        Vec::new()
    }

    fn on_groups_loaded(&mut self, result: Result<Vec<Group>, FetchError>) -> Vec<Command> {
        self.groups_loaded = true;
        match result {
            Ok(groups) => {
                if groups.len() < self.groups.len() {
                    self.selection.clear_tab(Tab::Groups);
                }
                self.log.debug(format!("Loaded {} group(s)", groups.len()));
                self.groups = groups;
            }
            Err(e) => {
                self.on_fetch_failed(e);
            }
        }
        self.clamp_cursor(Tab::Groups);
        self.check_loading_complete();
        Vec::new()
    }

    fn on_subscriptions_loaded(
        &mut self,
        result: Result<Vec<Subscription>, FetchError>,
    ) -> Vec<Command> {
        self.subscriptions_loaded = true;
        match result {
            Ok(subscriptions) => {
                let rows = |subs: &[Subscription]| -> usize {
                    subs.iter().map(|s| s.eligible_roles.len()).sum()
                };
                if subscriptions.len() < self.subscriptions.len()
                    || rows(&subscriptions) < rows(&self.subscriptions)
                {
                    self.selection.clear_tab(Tab::Subscriptions);
                }
                self.log
                    .debug(format!("Loaded {} subscription(s)", subscriptions.len()));
                self.subscriptions = subscriptions;
                self.selection.retain_subscriptions(&self.subscriptions);
            }
            Err(e) => {
                self.on_fetch_failed(e);
            }
        }
        self.clamp_cursor(Tab::Subscriptions);
        self.check_loading_complete();
        Vec::new()
    }

    fn check_loading_complete(&mut self) {
        if self.state != State::Loading
            || self.tenant.is_none()
            || !(self.roles_loaded && self.groups_loaded && self.subscriptions_loaded)
        {
            return;
        }
        self.state = State::Normal;
        self.last_refresh = Some(Instant::now());
        self.log.info(format!(
            "Loaded {} role(s), {} group(s), {} subscription(s)",
            self.roles.len(),
            self.groups.len(),
            self.subscriptions.len()
        ));
    }

    /// Refetch the three lists without leaving the current state.
    fn refresh_all(&mut self) -> Vec<Command> {
        self.last_refresh = Some(Instant::now());
        vec![
            Command::LoadRoles,
            Command::LoadGroups,
            Command::LoadSubscriptions,
        ]
    }

    fn on_tick(&mut self, now: Instant) -> Vec<Command> {
        if !self.auto_refresh || self.state != State::Normal {
            return Vec::new();
        }
        let due = self
            .last_refresh
            .is_some_and(|last| now.saturating_duration_since(last) >= self.refresh_interval);
        if !due {
            return Vec::new();
        }
        self.log.debug("Auto-refresh");
        self.refresh_all()
    }

    fn on_login_finished(&mut self, result: Result<(), AuthError>) -> Vec<Command> {
        match result {
            Ok(()) => {
                self.log.info("Signed in");
                self.start_loading()
            }
            Err(e) => {
                self.state = State::Unauthenticated;
                self.log.error(format!("Sign-in failed: {}", e));
                self.log.info(AppError::Auth(e).user_message());
                Vec::new()
            }
        }
    }

    // Batches

    fn on_activation_finished(&mut self, result: Result<(), BatchError>) -> Vec<Command> {
        self.state = State::Normal;
        self.selection.clear();
        let batch = std::mem::replace(&mut self.batch_history, 0..0);

        match result {
            Ok(()) => {
                self.log.info(format!("Activated {} item(s)", batch.len()));
                self.refresh_after_write()
            }
            Err(e) => {
                if let Some(entries) = self.history.get_mut(batch) {
                    for entry in entries {
                        entry.success = false;
                    }
                }
                self.report_batch_failure(AppError::Batch(e), "Activation failed");
                Vec::new()
            }
        }
    }

    fn on_deactivation_finished(&mut self, result: Result<(), BatchError>) -> Vec<Command> {
        self.state = State::Normal;
        self.selection.clear();

        match result {
            Ok(()) => {
                self.log.info("Deactivation complete");
                self.refresh_after_write()
            }
            Err(e) => {
                self.log.error(describe_deactivation_failure(&e));
                if e.error.requires_sign_in() {
                    self.log.info(AppError::Batch(e).user_message());
                }
                Vec::new()
            }
        }
    }

    fn report_batch_failure(&mut self, err: AppError, what: &str) {
        self.log.error(format!("{}: {}", what, err));
        if err.requires_sign_in() {
            self.log.info(err.user_message());
        }
    }

    /// Immediate refetch plus a second one once PIM has caught up.
    fn refresh_after_write(&mut self) -> Vec<Command> {
        let mut commands = self.refresh_all();
        commands.push(Command::ScheduleRefresh(self.settle_delay));
        commands
    }

    fn begin_activation(&mut self) {
        let items = self.selected_items(self.tab, |_| true);
        if items.is_empty() {
            self.log.info("No items selected. Press space to select.");
            return;
        }
        self.log.debug(format!("{} item(s) pending activation", items.len()));
        self.pending = items;
        self.justification.clear();
        self.justification_error = None;
        self.state = State::Confirm;
    }

    fn begin_deactivation(&mut self) {
        let items = self.selected_items(self.tab, ActivationStatus::is_active);
        if items.is_empty() {
            self.log.info("No active items selected for deactivation");
            return;
        }
        self.pending = items;
        self.state = State::ConfirmDeactivate;
    }

    fn cancel_pending(&mut self, what: &str) {
        self.pending.clear();
        self.justification.clear();
        self.justification_error = None;
        self.state = State::Normal;
        self.log.info(format!("{} cancelled", what));
    }

    fn submit_justification(&mut self) -> Vec<Command> {
        let text = match justification::validate(self.justification.as_str()) {
            Ok(text) => text,
            Err(e) => {
                self.log.error(AppError::Validation(e.clone()).to_string());
                self.justification_error = Some(e);
                return Vec::new();
            }
        };

        let items = std::mem::take(&mut self.pending);
        let hours = self.duration_hours();
        let start = self.history.len();
        for item in &items {
            self.history.push(ActivationHistoryEntry {
                timestamp: Utc::now(),
                kind: item.kind().to_string(),
                name: item.label(),
                duration_hours: hours,
                justification: text.clone(),
                success: true,
            });
        }
        self.batch_history = start..self.history.len();

        self.justification.clear();
        self.justification_error = None;
        self.state = State::Activating;
        self.log.info(format!(
            "Activating {} item(s) for {} hour(s)...",
            items.len(),
            hours
        ));

        vec![Command::Activate {
            items,
            justification: text,
            duration: chrono::Duration::hours(i64::from(hours)),
        }]
    }

    /// Selected items of `tab` whose status passes `keep`, as batch items.
    fn selected_items(&self, tab: Tab, keep: fn(ActivationStatus) -> bool) -> Vec<BatchItem> {
        self.selection
            .keys(tab, &self.subscriptions)
            .into_iter()
            .filter(|key| self.row_status(*key).is_some_and(keep))
            .filter_map(|key| self.batch_item(key))
            .collect()
    }

    // Keys

    fn on_key(&mut self, key: Key) -> Vec<Command> {
        if key == Key::Interrupt {
            return vec![Command::Quit];
        }

        match self.state {
            State::Loading | State::Activating | State::Deactivating | State::Authenticating => {
                if key == Key::Char('q') {
                    vec![Command::Quit]
                } else {
                    Vec::new()
                }
            }
            State::Unauthenticated => match key {
                Key::Char('q') => vec![Command::Quit],
                Key::Char('l') => {
                    self.state = State::Authenticating;
                    self.log
                        .info(format!("Signing in with {}...", self.credential_name));
                    vec![Command::Login]
                }
                _ => Vec::new(),
            },
            State::Error => match key {
                Key::Char('q') => vec![Command::Quit],
                Key::Char('r') => self.start_loading(),
                _ => Vec::new(),
            },
            State::Help => {
                if matches!(key, Key::Char('?') | Key::Char('q') | Key::Esc) {
                    self.state = State::Normal;
                }
                Vec::new()
            }
            State::Confirm => {
                match key {
                    Key::Char('y') | Key::Enter => self.state = State::Justification,
                    Key::Char('n') | Key::Esc => self.cancel_pending("Activation"),
                    Key::Char(c @ '1'..='4') => self.set_duration_preset(digit_index(c)),
                    Key::Tab | Key::Char('d') => self.cycle_duration(),
                    _ => {}
                }
                Vec::new()
            }
            State::ConfirmDeactivate => match key {
                Key::Char('y') | Key::Enter => {
                    let items = std::mem::take(&mut self.pending);
                    self.state = State::Deactivating;
                    self.log
                        .info(format!("Deactivating {} item(s)...", items.len()));
                    vec![Command::Deactivate { items }]
                }
                Key::Char('n') | Key::Esc => {
                    self.cancel_pending("Deactivation");
                    Vec::new()
                }
                _ => Vec::new(),
            },
            State::Justification => self.on_justification_key(key),
            State::Search => {
                match key {
                    Key::Enter | Key::Esc => self.state = State::Normal,
                    Key::Backspace => {
                        if self.search.pop().is_some() {
                            self.on_filter_changed();
                        }
                    }
                    Key::Char(c) => {
                        if self.search.push(c) {
                            self.on_filter_changed();
                        }
                    }
                    _ => {}
                }
                Vec::new()
            }
            State::Normal => self.on_normal_key(key),
        }
    }

    fn on_justification_key(&mut self, key: Key) -> Vec<Command> {
        match key {
            Key::Enter => return self.submit_justification(),
            Key::Esc => self.cancel_pending("Activation"),
            Key::Tab => self.cycle_duration(),
            Key::Backspace => {
                self.justification.pop();
                self.justification_error = None;
            }
            Key::Char(c) => {
                self.justification.push(c);
                self.justification_error = None;
            }
            _ => {}
        }
        Vec::new()
    }

    fn on_normal_key(&mut self, key: Key) -> Vec<Command> {
        match key {
            Key::Char('q') => return vec![Command::Quit],
            Key::Char('?') => self.state = State::Help,
            Key::Up | Key::Char('k') => self.move_cursor(-1),
            Key::Down | Key::Char('j') => self.move_cursor(1),
            Key::Tab | Key::Right | Key::Char('l') => self.switch_tab(self.tab.next()),
            Key::BackTab | Key::Left | Key::Char('h') => self.switch_tab(self.tab.prev()),
            Key::Char(' ') => {
                if let Some(row) = self.current_row() {
                    self.selection.toggle(row, &self.subscriptions);
                }
            }
            Key::Enter => self.begin_activation(),
            Key::Char('x') | Key::Delete | Key::Backspace => self.begin_deactivation(),
            Key::Char('r') => {
                self.log.info("Refreshing...");
                return self.refresh_all();
            }
            Key::Char('a') => {
                self.auto_refresh = !self.auto_refresh;
                self.log.info(if self.auto_refresh {
                    "Auto-refresh enabled"
                } else {
                    "Auto-refresh disabled"
                });
            }
            Key::Char(c @ '1'..='4') => self.set_duration_preset(digit_index(c)),
            Key::Char('d') => self.cycle_duration(),
            Key::Char('v') => {
                let level = self.log.cycle_filter();
                self.log.info(format!("Log level: {}", level));
            }
            Key::Char('e') => {
                if self.history.is_empty() {
                    self.log.info("No activation history to export");
                } else {
                    return vec![Command::ExportHistory(self.history.clone())];
                }
            }
            Key::Char('/') => self.state = State::Search,
            Key::Esc => {
                if !self.search.is_empty() {
                    self.search.clear();
                    self.on_filter_changed();
                }
            }
            _ => {}
        }
        Vec::new()
    }

    // Duration

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn duration_hours(&self) -> u32 {
        self.duration_presets
            .get(self.duration_index)
            .copied()
            .unwrap_or(1)
    }

    fn set_duration_preset(&mut self, index: usize) {
        if index < self.duration_presets.len() {
            self.duration_index = index;
            self.log
                .info(format!("Duration set to {} hours", self.duration_hours()));
        }
    }

    fn cycle_duration(&mut self) {
        if self.duration_presets.is_empty() {
            return;
        }
        self.set_duration_preset((self.duration_index + 1) % self.duration_presets.len());
    }

    // Rows and cursor

    /// Rows of `tab` that pass the search filter.
    pub fn visible_rows(&self, tab: Tab) -> Vec<RowKey> {
        search::visible_rows(
            tab,
            self.search.as_str(),
            &self.roles,
            &self.groups,
            &self.subscriptions,
        )
    }

    pub fn cursor(&self, tab: Tab) -> usize {
        self.cursors[tab.index()]
    }

    pub fn scroll(&self, tab: Tab) -> usize {
        self.scrolls[tab.index()]
    }

    pub fn current_row(&self) -> Option<RowKey> {
        self.visible_rows(self.tab).get(self.cursor(self.tab)).copied()
    }

    pub fn is_selected(&self, key: RowKey) -> bool {
        self.selection.contains(key, &self.subscriptions)
    }

    pub fn row_status(&self, key: RowKey) -> Option<ActivationStatus> {
        match key {
            RowKey::Role(i) => self.roles.get(i).map(|r| r.status),
            RowKey::Group(i) => self.groups.get(i).map(|g| g.status),
            RowKey::SubscriptionRole(s, r) => self
                .subscriptions
                .get(s)
                .and_then(|sub| sub.eligible_roles.get(r))
                .map(|role| role.status),
        }
    }

    fn batch_item(&self, key: RowKey) -> Option<BatchItem> {
        match key {
            RowKey::Role(i) => self.roles.get(i).map(|r| BatchItem::Role {
                role_definition_id: r.role_definition_id.clone(),
                display_name: r.display_name.clone(),
            }),
            RowKey::Group(i) => self.groups.get(i).map(|g| BatchItem::Group {
                group_id: g.id.clone(),
                role_definition_id: g.role_definition_id.clone(),
                display_name: g.display_name.clone(),
            }),
            RowKey::SubscriptionRole(s, r) => {
                let sub = self.subscriptions.get(s)?;
                let role = sub.eligible_roles.get(r)?;
                Some(BatchItem::SubscriptionRole {
                    scope: role.scope.clone(),
                    role_definition_id: role.role_definition_id.clone(),
                    role_eligibility_id: role.role_eligibility_id.clone(),
                    role_name: role.role_definition_name.clone(),
                    subscription_name: sub.display_name.clone(),
                })
            }
        }
    }

    fn switch_tab(&mut self, tab: Tab) {
        self.tab = tab;
        self.clamp_cursor(tab);
    }

    fn move_cursor(&mut self, delta: isize) {
        let len = self.visible_rows(self.tab).len();
        if len == 0 {
            return;
        }
        let idx = self.tab.index();
        let current = self.cursors[idx] as isize;
        self.cursors[idx] = (current + delta).clamp(0, len as isize - 1) as usize;
        self.sync_scroll();
    }

    fn clamp_cursor(&mut self, tab: Tab) {
        let len = self.visible_rows(tab).len();
        let idx = tab.index();
        self.cursors[idx] = self.cursors[idx].min(len.saturating_sub(1));
        if tab == self.tab {
            self.sync_scroll();
        }
    }

    /// Jump every tab back to its first visible match.
    fn on_filter_changed(&mut self) {
        self.cursors = [0; 3];
        self.scrolls = [0; 3];
    }

    fn sync_scroll(&mut self) {
        let idx = self.tab.index();
        self.scrolls[idx] = adjust_scroll(self.cursors[idx], self.scrolls[idx], self.list_height);
    }
}

/// '1' → 0, '4' → 3.
fn digit_index(c: char) -> usize {
    c.to_digit(10).map_or(0, |d| d.saturating_sub(1) as usize)
}

/// Scroll offset that keeps `selected` inside a window of `height` rows.
fn adjust_scroll(selected: usize, scroll: usize, height: usize) -> usize {
    if height == 0 {
        return 0;
    }
    if selected < scroll {
        return selected;
    }
    let last_visible = scroll + height - 1;
    if selected > last_visible {
        return selected + 1 - height;
    }
    scroll
}
