//! Rendering of the dashboard. Reads the state machine, never mutates it.

use chrono::{DateTime, Utc};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Tabs, Wrap},
    Frame,
};

use super::theme::Theme;
use crate::app::justification::MAX_JUSTIFICATION_LEN;
use crate::app::{App, LogLevel, RowKey, State, Tab};
use crate::azure::models::format_remaining;
use crate::azure::ActivationStatus;

const HEADER_HEIGHT: u16 = 3;
const TABS_HEIGHT: u16 = 3;
const LOG_PANEL_HEIGHT: u16 = 8;
const STATUS_BAR_HEIGHT: u16 = 1;

const NAME_WIDTH: usize = 44;

pub fn draw(frame: &mut Frame, app: &App, theme: &Theme) {
    if app.state == State::Error {
        let area = frame.size();
        draw_error_screen(frame, area, app, theme);
        return;
    }

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(HEADER_HEIGHT),
            Constraint::Length(TABS_HEIGHT),
            Constraint::Min(0),
            Constraint::Length(LOG_PANEL_HEIGHT),
            Constraint::Length(STATUS_BAR_HEIGHT),
        ])
        .split(frame.size());

    draw_header(frame, layout[0], app, theme);
    draw_tabs(frame, layout[1], app, theme);

    match app.state {
        State::Loading => draw_loading(frame, layout[2], app, theme),
        State::Unauthenticated | State::Authenticating => {
            draw_sign_in(frame, layout[2], app, theme)
        }
        _ => draw_body(frame, layout[2], app, theme),
    }

    draw_log_panel(frame, layout[3], app, theme);
    draw_status_bar(frame, layout[4], app, theme);

    match app.state {
        State::Confirm => draw_confirm(frame, app, theme),
        State::ConfirmDeactivate => draw_confirm_deactivate(frame, app, theme),
        State::Justification => draw_justification(frame, app, theme),
        State::Help => draw_help(frame, theme),
        State::Activating => draw_busy(frame, "Activating...", theme),
        State::Deactivating => draw_busy(frame, "Deactivating...", theme),
        _ => {}
    }
}

fn bordered<'a>(title: impl Into<Line<'a>>, theme: &Theme) -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(theme.border_style())
        .title(title)
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let user = app
        .user
        .as_ref()
        .map(|u| format!("{} <{}>", u.display_name, u.user_principal_name))
        .unwrap_or_else(|| "-".to_string());
    let tenant = app
        .tenant
        .as_ref()
        .map(|t| t.display_name.clone())
        .unwrap_or_else(|| "-".to_string());
    let refresh = if app.auto_refresh {
        format!("on ({}s)", app.refresh_interval().as_secs())
    } else {
        "off".to_string()
    };
    let last = app
        .last_refresh
        .map(|t| format!("{}s ago", t.elapsed().as_secs()))
        .unwrap_or_else(|| "never".to_string());

    let line = Line::from(vec![
        Span::styled("User: ", theme.title_style()),
        Span::raw(user),
        Span::raw("  "),
        Span::styled("Tenant: ", theme.title_style()),
        Span::raw(tenant),
        Span::raw("  "),
        Span::styled("Duration: ", theme.title_style()),
        Span::raw(format!("{}h", app.duration_hours())),
        Span::raw("  "),
        Span::styled("Auto-refresh: ", theme.title_style()),
        Span::raw(refresh),
        Span::raw(format!("  Last refresh: {}", last)),
    ]);

    let header = Paragraph::new(line).block(bordered(
        format!(" pim-tui v{} ", env!("CARGO_PKG_VERSION")),
        theme,
    ));
    frame.render_widget(header, area);
}

fn draw_tabs(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let titles: Vec<Line> = Tab::ALL
        .iter()
        .map(|tab| {
            let rows = app.visible_rows(*tab).len();
            let selected = app.selection.count(*tab);
            if selected > 0 {
                Line::from(format!("{} ({}, {} selected)", tab.title(), rows, selected))
            } else {
                Line::from(format!("{} ({})", tab.title(), rows))
            }
        })
        .collect();

    let tabs = Tabs::new(titles)
        .select(app.tab.index())
        .highlight_style(theme.title_style().add_modifier(Modifier::UNDERLINED))
        .block(bordered("", theme));
    frame.render_widget(tabs, area);
}

fn draw_body(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
        .split(area);

    draw_list(frame, columns[0], app, theme);
    draw_detail(frame, columns[1], app, theme);
}

/// First row to draw so the cursor stays visible in `height` rows.
fn visible_scroll(cursor: usize, scroll: usize, height: usize) -> usize {
    if height == 0 || cursor < scroll {
        return cursor.min(scroll);
    }
    if cursor >= scroll + height {
        cursor + 1 - height
    } else {
        scroll
    }
}

fn draw_list(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let rows = app.visible_rows(app.tab);
    let cursor = app.cursor(app.tab);
    let height = area.height.saturating_sub(2) as usize;
    let scroll = visible_scroll(cursor, app.scroll(app.tab), height);
    let end = (scroll + height).min(rows.len());
    let now = Utc::now();

    let title = if app.search.is_empty() {
        format!(" {} ", app.tab.title())
    } else {
        format!(" {} (filter: {}) ", app.tab.title(), app.search.as_str())
    };

    if rows.is_empty() {
        let message = if app.search.is_empty() {
            "No eligible assignments"
        } else {
            "No matches"
        };
        let empty = Paragraph::new(message)
            .style(Style::default().fg(theme.inactive))
            .block(bordered(title, theme));
        frame.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = rows
        .get(scroll..end)
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(offset, key)| {
            let mut line = row_line(app, *key, theme, now);
            if scroll + offset == cursor {
                line = line.style(theme.selected_row_style());
            }
            ListItem::new(line)
        })
        .collect();

    frame.render_widget(List::new(items).block(bordered(title, theme)), area);
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return format!("{:<width$}", text, width = width);
    }
    let mut cut: String = text.chars().take(width.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

fn expiry_text(expires_at: Option<DateTime<Utc>>, status: ActivationStatus, now: DateTime<Utc>) -> String {
    match (status.is_active(), expires_at) {
        (true, Some(end)) => format_remaining(end - now),
        (true, None) => "permanent".to_string(),
        _ => String::new(),
    }
}

fn row_line(app: &App, key: RowKey, theme: &Theme, now: DateTime<Utc>) -> Line<'static> {
    let entry = match key {
        RowKey::Role(i) => app
            .roles
            .get(i)
            .map(|r| (r.display_name.clone(), r.status, r.expires_at)),
        RowKey::Group(i) => app.groups.get(i).map(|g| {
            (
                format!("{} ({})", g.display_name, g.description),
                g.status,
                g.expires_at,
            )
        }),
        RowKey::SubscriptionRole(s, r) => app.subscriptions.get(s).and_then(|sub| {
            sub.eligible_roles.get(r).map(|role| {
                (
                    format!("{} / {}", sub.display_name, role.role_definition_name),
                    role.status,
                    role.expires_at,
                )
            })
        }),
    };
    let Some((name, status, expires_at)) = entry else {
        return Line::default();
    };

    let mark = if app.is_selected(key) { "[x] " } else { "[ ] " };
    Line::from(vec![
        Span::raw(mark),
        Span::raw(truncate(&name, NAME_WIDTH)),
        Span::raw(" "),
        Span::styled(
            format!("{:<14}", status.to_string()),
            Style::default().fg(theme.status_color(status)),
        ),
        Span::raw(expiry_text(expires_at, status, now)),
    ])
}

fn detail_line(label: &str, value: impl Into<String>, theme: &Theme) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{}: ", label), theme.title_style()),
        Span::raw(value.into()),
    ])
}

fn draw_detail(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let now = Utc::now();
    let mut lines: Vec<Line> = Vec::new();

    let status_line = |status: ActivationStatus, expires_at: Option<DateTime<Utc>>| {
        let mut text = status.to_string();
        let remaining = expiry_text(expires_at, status, now);
        if !remaining.is_empty() {
            text = format!("{} ({})", text, remaining);
        }
        Line::from(vec![
            Span::styled("Status: ", theme.title_style()),
            Span::styled(text, Style::default().fg(theme.status_color(status))),
        ])
    };

    match app.current_row() {
        Some(RowKey::Role(i)) => {
            if let Some(role) = app.roles.get(i) {
                lines.push(detail_line("Role", role.display_name.clone(), theme));
                lines.push(status_line(role.status, role.expires_at));
                if !role.description.is_empty() {
                    lines.push(detail_line("Description", role.description.clone(), theme));
                }
                lines.push(detail_line("Scope", role.directory_scope_id.clone(), theme));
                lines.push(detail_line(
                    "Max duration",
                    format!("{}h", role.max_duration.num_hours()),
                    theme,
                ));
                lines.push(detail_line("Definition", role.role_definition_id.clone(), theme));
            }
        }
        Some(RowKey::Group(i)) => {
            if let Some(group) = app.groups.get(i) {
                lines.push(detail_line("Group", group.display_name.clone(), theme));
                lines.push(detail_line("Access", group.description.clone(), theme));
                lines.push(status_line(group.status, group.expires_at));
                lines.push(detail_line(
                    "Max duration",
                    format!("{}h", group.max_duration.num_hours()),
                    theme,
                ));
                lines.push(detail_line("Group id", group.id.clone(), theme));
            }
        }
        Some(RowKey::SubscriptionRole(s, r)) => {
            if let Some(sub) = app.subscriptions.get(s) {
                lines.push(detail_line("Subscription", sub.display_name.clone(), theme));
                lines.push(detail_line(
                    "Tenant",
                    format!("{} ({})", sub.tenant_name, sub.tenant_id),
                    theme,
                ));
                if let Some(role) = sub.eligible_roles.get(r) {
                    lines.push(detail_line("Role", role.role_definition_name.clone(), theme));
                    lines.push(status_line(role.status, role.expires_at));
                    lines.push(detail_line("Scope", role.scope.clone(), theme));
                }
                lines.push(detail_line(
                    "Eligible roles",
                    sub.eligible_roles.len().to_string(),
                    theme,
                ));
            }
        }
        None => lines.push(Line::from("Nothing selected")),
    }

    let detail = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(bordered(" Details ", theme));
    frame.render_widget(detail, area);
}

fn checklist_line(done: bool, label: &str) -> Line<'static> {
    Line::from(format!("  [{}] {}", if done { "x" } else { " " }, label))
}

fn draw_loading(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let lines = vec![
        Line::from(Span::styled("Loading PIM assignments...", theme.title_style())),
        Line::from(""),
        checklist_line(app.tenant.is_some(), "Tenant"),
        checklist_line(app.roles_loaded, "Entra roles"),
        checklist_line(app.groups_loaded, "PIM groups"),
        checklist_line(app.subscriptions_loaded, "Azure subscriptions"),
    ];
    let body = Paragraph::new(lines).block(bordered(" Loading ", theme));
    frame.render_widget(body, area);
}

fn draw_sign_in(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let lines = if app.state == State::Authenticating {
        vec![
            Line::from(Span::styled("Signing in...", theme.title_style())),
            Line::from(""),
            Line::from("Complete the sign-in in your browser or terminal."),
        ]
    } else {
        vec![
            Line::from(Span::styled("Not signed in", theme.title_style())),
            Line::from(""),
            Line::from(format!(
                "Press l to sign in with {}, or q to quit.",
                app.credential_name
            )),
        ]
    };
    let body = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(bordered(" Sign in ", theme));
    frame.render_widget(body, area);
}

fn draw_log_panel(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    if app.log.is_empty() {
        let empty = Paragraph::new(Span::styled(
            "No activity yet",
            Style::default().fg(theme.inactive),
        ));
        frame.render_widget(empty.block(bordered(" Activity ", theme)), area);
        return;
    }

    let height = area.height.saturating_sub(2) as usize;
    let mut entries: Vec<_> = app.log.visible().rev().take(height).collect();
    entries.reverse();

    let lines: Vec<Line> = entries
        .into_iter()
        .map(|entry| {
            let style = match entry.level {
                LogLevel::Error => Style::default().fg(theme.error),
                LogLevel::Info => Style::default(),
                LogLevel::Debug => Style::default().fg(theme.inactive),
            };
            Line::from(Span::styled(entry.line(), style))
        })
        .collect();

    let title = format!(" Activity [{}] {} entries ", app.log.filter(), app.log.len());
    frame.render_widget(Paragraph::new(lines).block(bordered(title, theme)), area);
}

fn status_hints(app: &App) -> String {
    match app.state {
        State::Normal => {
            "space: select  enter: activate  x: deactivate  tab: switch  /: search  r: refresh  ?: help  q: quit"
                .to_string()
        }
        State::Search => format!("/{}_  (enter/esc: done)", app.search.as_str()),
        State::Confirm => "y: continue  n: cancel  1-4/tab: duration".to_string(),
        State::ConfirmDeactivate => "y: deactivate  n: cancel".to_string(),
        State::Justification => "enter: submit  tab: duration  esc: cancel".to_string(),
        State::Help => "?/esc: close help".to_string(),
        State::Unauthenticated => "l: sign in  q: quit".to_string(),
        State::Loading
        | State::Authenticating
        | State::Activating
        | State::Deactivating => "q: quit".to_string(),
        State::Error => "r: retry  q: quit".to_string(),
    }
}

fn draw_status_bar(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let bar = Paragraph::new(status_hints(app)).style(Style::default().fg(theme.border));
    frame.render_widget(bar, area);
}

/// `percent_x` by `percent_y` rectangle centered in `area`.
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn draw_modal(frame: &mut Frame, title: &str, lines: Vec<Line>, theme: &Theme) {
    let area = centered_rect(64, 60, frame.size());
    frame.render_widget(Clear, area);
    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(bordered(Span::styled(format!(" {} ", title), theme.title_style()), theme));
    frame.render_widget(modal, area);
}

fn pending_lines(app: &App) -> Vec<Line<'static>> {
    app.pending
        .iter()
        .map(|item| Line::from(format!("  - {}", item)))
        .collect()
}

fn draw_confirm(frame: &mut Frame, app: &App, theme: &Theme) {
    let mut lines = vec![
        Line::from(format!(
            "Activate {} item(s) for {} hour(s)?",
            app.pending.len(),
            app.duration_hours()
        )),
        Line::from(""),
    ];
    lines.extend(pending_lines(app));
    lines.push(Line::from(""));
    lines.push(Line::from("y/enter: continue  n/esc: cancel  1-4/tab: duration"));
    draw_modal(frame, "Confirm activation", lines, theme);
}

fn draw_confirm_deactivate(frame: &mut Frame, app: &App, theme: &Theme) {
    let mut lines = vec![
        Line::from(format!("Deactivate {} item(s)?", app.pending.len())),
        Line::from(""),
    ];
    lines.extend(pending_lines(app));
    lines.push(Line::from(""));
    lines.push(Line::from("y/enter: deactivate  n/esc: cancel"));
    draw_modal(frame, "Confirm deactivation", lines, theme);
}

fn draw_justification(frame: &mut Frame, app: &App, theme: &Theme) {
    let typed = app.justification.as_str().chars().count();
    let mut lines = vec![
        Line::from(format!(
            "Justification for {} item(s), {} hour(s):",
            app.pending.len(),
            app.duration_hours()
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("> ", theme.title_style()),
            Span::raw(app.justification.as_str().to_string()),
            Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)),
        ]),
        Line::from(Span::styled(
            format!("{}/{}", typed, MAX_JUSTIFICATION_LEN),
            Style::default().fg(if typed > MAX_JUSTIFICATION_LEN {
                theme.error
            } else {
                theme.inactive
            }),
        )),
    ];
    if let Some(err) = &app.justification_error {
        lines.push(Line::from(Span::styled(
            err.to_string(),
            Style::default().fg(theme.error),
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from("enter: submit  tab: duration  esc: cancel"));
    draw_modal(frame, "Justification", lines, theme);
}

const HELP: &[(&str, &str)] = &[
    ("up/k, down/j", "Move cursor"),
    ("tab, left/h, right/l", "Switch tab"),
    ("space", "Select / deselect"),
    ("enter", "Activate selected"),
    ("x, delete", "Deactivate selected active items"),
    ("1-4, d", "Pick / cycle activation duration"),
    ("/", "Search, esc clears the filter"),
    ("r", "Refresh now"),
    ("a", "Toggle auto-refresh"),
    ("v", "Cycle activity log level"),
    ("e", "Export activation history"),
    ("?", "Toggle help"),
    ("q, ctrl+c", "Quit"),
];

fn draw_help(frame: &mut Frame, theme: &Theme) {
    let lines: Vec<Line> = HELP
        .iter()
        .map(|(keys, action)| {
            Line::from(vec![
                Span::styled(format!("{:<24}", keys), theme.title_style()),
                Span::raw(*action),
            ])
        })
        .collect();
    draw_modal(frame, "Keys", lines, theme);
}

fn draw_busy(frame: &mut Frame, message: &str, theme: &Theme) {
    let area = centered_rect(40, 20, frame.size());
    frame.render_widget(Clear, area);
    let popup = Paragraph::new(message)
        .alignment(Alignment::Center)
        .block(bordered("", theme));
    frame.render_widget(popup, area);
}

fn draw_error_screen(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let message = app.error_message.as_deref().unwrap_or("Unknown error");
    let lines = vec![
        Line::from(Span::styled(
            "Failed to load PIM data",
            Style::default().fg(theme.error).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(message.to_string()),
        Line::from(""),
        Line::from("r: retry  q: quit"),
    ];
    let screen = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .alignment(Alignment::Center)
        .block(bordered(" Error ", theme));
    frame.render_widget(screen, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_scroll_keeps_cursor_in_view() {
        assert_eq!(visible_scroll(0, 0, 10), 0);
        assert_eq!(visible_scroll(12, 0, 10), 3);
        assert_eq!(visible_scroll(2, 5, 10), 2);
        assert_eq!(visible_scroll(7, 5, 10), 5);
    }

    #[test]
    fn test_truncate_pads_and_cuts() {
        assert_eq!(truncate("abc", 5), "abc  ");
        assert_eq!(truncate("abcdefgh", 6), "abc...");
    }

    #[test]
    fn test_expiry_text() {
        let now = Utc::now();
        assert_eq!(
            expiry_text(Some(now + chrono::Duration::minutes(45)), ActivationStatus::Active, now),
            "45m"
        );
        assert_eq!(expiry_text(None, ActivationStatus::Active, now), "permanent");
        assert_eq!(expiry_text(None, ActivationStatus::Inactive, now), "");
    }
}
