//! Text filter over the in-memory lists.

use super::selection::RowKey;
use super::Tab;
use crate::azure::{Group, Role, Subscription};

/// Longest search query accepted.
pub const MAX_QUERY_LEN: usize = 100;

fn contains_ci(text: &str, query_lower: &str) -> bool {
    text.to_lowercase().contains(query_lower)
}

pub fn role_matches(role: &Role, query_lower: &str) -> bool {
    contains_ci(&role.display_name, query_lower)
}

pub fn group_matches(group: &Group, query_lower: &str) -> bool {
    contains_ci(&group.display_name, query_lower)
}

/// Subscriptions also match on their tenant and eligible role names.
pub fn subscription_matches(subscription: &Subscription, query_lower: &str) -> bool {
    contains_ci(&subscription.display_name, query_lower)
        || contains_ci(&subscription.tenant_name, query_lower)
        || subscription
            .eligible_roles
            .iter()
            .any(|r| contains_ci(&r.role_definition_name, query_lower))
}

/// Rows of `tab` that pass `query`, in display order.
///
/// An empty query shows everything. Subscription rows are flattened to one row
/// per eligible role.
pub fn visible_rows(
    tab: Tab,
    query: &str,
    roles: &[Role],
    groups: &[Group],
    subscriptions: &[Subscription],
) -> Vec<RowKey> {
    let query = query.trim().to_lowercase();
    let all = query.is_empty();

    match tab {
        Tab::Roles => roles
            .iter()
            .enumerate()
            .filter(|(_, r)| all || role_matches(r, &query))
            .map(|(i, _)| RowKey::Role(i))
            .collect(),
        Tab::Groups => groups
            .iter()
            .enumerate()
            .filter(|(_, g)| all || group_matches(g, &query))
            .map(|(i, _)| RowKey::Group(i))
            .collect(),
        Tab::Subscriptions => subscriptions
            .iter()
            .enumerate()
            .filter(|(_, s)| all || subscription_matches(s, &query))
            .flat_map(|(s, sub)| {
                (0..sub.eligible_roles.len()).map(move |r| RowKey::SubscriptionRole(s, r))
            })
            .collect(),
    }
}
