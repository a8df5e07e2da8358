//! Selected rows per tab.
//!
//! Roles and groups are keyed by position in their lists. Subscription roles
//! are keyed by subscription id and role position, so a refresh that reorders
//! subscriptions keeps each selection on the subscription it was made on.

use std::collections::{BTreeMap, BTreeSet};

use super::Tab;
use crate::azure::Subscription;

/// Position of a row in one of the three lists.
///
/// Subscription rows are (subscription index, eligible role index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowKey {
    Role(usize),
    Group(usize),
    SubscriptionRole(usize, usize),
}

/// One selection set per tab.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    roles: BTreeSet<usize>,
    groups: BTreeSet<usize>,
    /// Subscription id → selected eligible role indices.
    subscription_roles: BTreeMap<String, BTreeSet<usize>>,
}

fn flip(set: &mut BTreeSet<usize>, value: usize) -> bool {
    if set.remove(&value) {
        false
    } else {
        set.insert(value);
        true
    }
}

impl Selection {
    /// Flip the selection of `key`; returns whether it is now selected.
    ///
    /// `subscriptions` is the list subscription rows index into. A row that
    /// doesn't exist there is left unselected.
    pub fn toggle(&mut self, key: RowKey, subscriptions: &[Subscription]) -> bool {
        match key {
            RowKey::Role(i) => flip(&mut self.roles, i),
            RowKey::Group(i) => flip(&mut self.groups, i),
            RowKey::SubscriptionRole(s, r) => {
                let Some(sub) = subscriptions.get(s) else {
                    return false;
                };
                let roles = self.subscription_roles.entry(sub.id.clone()).or_default();
                let selected = flip(roles, r);
                if roles.is_empty() {
                    self.subscription_roles.remove(&sub.id);
                }
                selected
            }
        }
    }

    pub fn contains(&self, key: RowKey, subscriptions: &[Subscription]) -> bool {
        match key {
            RowKey::Role(i) => self.roles.contains(&i),
            RowKey::Group(i) => self.groups.contains(&i),
            RowKey::SubscriptionRole(s, r) => subscriptions
                .get(s)
                .and_then(|sub| self.subscription_roles.get(&sub.id))
                .is_some_and(|roles| roles.contains(&r)),
        }
    }

    /// Selected keys of `tab` in list order, resolved against `subscriptions`.
    pub fn keys(&self, tab: Tab, subscriptions: &[Subscription]) -> Vec<RowKey> {
        match tab {
            Tab::Roles => self.roles.iter().map(|i| RowKey::Role(*i)).collect(),
            Tab::Groups => self.groups.iter().map(|i| RowKey::Group(*i)).collect(),
            Tab::Subscriptions => subscriptions
                .iter()
                .enumerate()
                .filter_map(|(s, sub)| {
                    let roles = self.subscription_roles.get(&sub.id)?;
                    Some(
                        roles
                            .iter()
                            .filter(move |r| **r < sub.eligible_roles.len())
                            .map(move |r| RowKey::SubscriptionRole(s, *r)),
                    )
                })
                .flatten()
                .collect(),
        }
    }

    pub fn count(&self, tab: Tab) -> usize {
        match tab {
            Tab::Roles => self.roles.len(),
            Tab::Groups => self.groups.len(),
            Tab::Subscriptions => self.subscription_roles.values().map(BTreeSet::len).sum(),
        }
    }

    /// Drop subscription selections whose subscription or role is gone.
    pub fn retain_subscriptions(&mut self, subscriptions: &[Subscription]) {
        self.subscription_roles.retain(|id, roles| {
            match subscriptions.iter().find(|sub| &sub.id == id) {
                Some(sub) => {
                    roles.retain(|r| *r < sub.eligible_roles.len());
                    !roles.is_empty()
                }
                None => false,
            }
        });
    }

    pub fn clear_tab(&mut self, tab: Tab) {
        match tab {
            Tab::Roles => self.roles.clear(),
            Tab::Groups => self.groups.clear(),
            Tab::Subscriptions => self.subscription_roles.clear(),
        }
    }

    pub fn clear(&mut self) {
        self.roles.clear();
        self.groups.clear();
        self.subscription_roles.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.groups.is_empty() && self.subscription_roles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::{ActivationStatus, EligibleAzureRole};

    fn subscription(id: &str, roles: usize) -> Subscription {
        Subscription {
            id: id.to_string(),
            display_name: id.to_string(),
            tenant_id: "tenant-1".to_string(),
            tenant_name: "Contoso".to_string(),
            status: ActivationStatus::Inactive,
            eligible_roles: (0..roles)
                .map(|r| EligibleAzureRole {
                    role_definition_id: format!("def-{}", r),
                    role_definition_name: format!("Role {}", r),
                    role_eligibility_id: format!("elig-{}-{}", id, r),
                    scope: format!("/subscriptions/{}", id),
                    status: ActivationStatus::Inactive,
                    expires_at: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_toggle_and_keys() {
        let subs = vec![subscription("alpha", 1), subscription("bravo", 4)];
        let mut selection = Selection::default();
        assert!(selection.toggle(RowKey::Role(2), &subs));
        assert!(selection.toggle(RowKey::Role(0), &subs));
        assert!(selection.toggle(RowKey::SubscriptionRole(1, 3), &subs));
        assert!(!selection.toggle(RowKey::Role(2), &subs));
        assert!(!selection.toggle(RowKey::SubscriptionRole(5, 0), &subs));

        assert_eq!(selection.keys(Tab::Roles, &subs), vec![RowKey::Role(0)]);
        assert_eq!(selection.count(Tab::Subscriptions), 1);
        assert!(selection.contains(RowKey::SubscriptionRole(1, 3), &subs));
        assert_eq!(selection.count(Tab::Groups), 0);

        assert!(!selection.toggle(RowKey::SubscriptionRole(1, 3), &subs));
        assert_eq!(selection.count(Tab::Roles), 1);
        assert_eq!(selection.count(Tab::Subscriptions), 0);
    }

    #[test]
    fn test_subscription_selection_follows_reorder() {
        let before = vec![subscription("alpha", 2), subscription("bravo", 2)];
        let mut selection = Selection::default();
        selection.toggle(RowKey::SubscriptionRole(0, 1), &before);

        let after = vec![subscription("bravo", 2), subscription("alpha", 2)];
        selection.retain_subscriptions(&after);
        assert_eq!(
            selection.keys(Tab::Subscriptions, &after),
            vec![RowKey::SubscriptionRole(1, 1)]
        );
        assert!(!selection.contains(RowKey::SubscriptionRole(0, 1), &after));
    }

    #[test]
    fn test_retain_drops_vanished_subscriptions_and_roles() {
        let before = vec![subscription("alpha", 2), subscription("bravo", 2)];
        let mut selection = Selection::default();
        selection.toggle(RowKey::SubscriptionRole(0, 1), &before);
        selection.toggle(RowKey::SubscriptionRole(1, 0), &before);

        let after = vec![subscription("alpha", 1), subscription("charlie", 2)];
        selection.retain_subscriptions(&after);
        assert_eq!(selection.count(Tab::Subscriptions), 0);
        assert!(selection.keys(Tab::Subscriptions, &after).is_empty());
    }

    #[test]
    fn test_clear_tab_leaves_other_tabs() {
        let mut selection = Selection::default();
        selection.toggle(RowKey::Role(0), &[]);
        selection.toggle(RowKey::Group(1), &[]);

        selection.clear_tab(Tab::Roles);
        assert_eq!(selection.count(Tab::Roles), 0);
        assert!(selection.contains(RowKey::Group(1), &[]));

        selection.clear();
        assert!(selection.is_empty());
    }
}
