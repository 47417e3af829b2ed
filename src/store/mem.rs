use std::collections::HashMap;
use std::sync::Arc;

use ethers::types::U256;
use parking_lot::RwLock;

use super::GroupStore;

#[derive(Debug, Default, Clone)]
struct GroupEntry {
    confirmed_members: Vec<String>,
    optimistic_members: Vec<String>,
    confirmed_feedback: Vec<String>,
    optimistic_feedback: Vec<String>,
}

type MemStore = HashMap<U256, GroupEntry>;

/// An in-memory group store, shared by cloning.
#[derive(Clone, Default)]
pub struct InMemoryGroupStore {
    store: Arc<RwLock<MemStore>>,
}

impl std::fmt::Debug for InMemoryGroupStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryGroupStore").finish()
    }
}

impl GroupStore for InMemoryGroupStore {
    fn replace_confirmed(&self, group_id: U256, members: Vec<String>, feedback: Vec<String>) {
        let mut guard = self.store.write();
        let entry = guard.entry(group_id).or_default();
        // entries the refresh confirmed are no longer optimistic.
        entry
            .optimistic_members
            .retain(|m| !members.contains(m));
        entry
            .optimistic_feedback
            .retain(|f| !feedback.contains(f));
        entry.confirmed_members = members;
        entry.confirmed_feedback = feedback;
    }

    fn optimistic_add_member(&self, group_id: U256, commitment: String) {
        let mut guard = self.store.write();
        guard
            .entry(group_id)
            .or_default()
            .optimistic_members
            .push(commitment);
    }

    fn optimistic_add_feedback(&self, group_id: U256, text: String) {
        let mut guard = self.store.write();
        guard
            .entry(group_id)
            .or_default()
            .optimistic_feedback
            .push(text);
    }

    fn confirmed_members(&self, group_id: U256) -> Vec<String> {
        let guard = self.store.read();
        guard
            .get(&group_id)
            .map(|e| e.confirmed_members.clone())
            .unwrap_or_default()
    }

    fn members(&self, group_id: U256) -> Vec<String> {
        let guard = self.store.read();
        guard
            .get(&group_id)
            .map(|e| {
                let mut all = e.confirmed_members.clone();
                all.extend(e.optimistic_members.iter().cloned());
                all
            })
            .unwrap_or_default()
    }

    fn confirmed_feedback(&self, group_id: U256) -> Vec<String> {
        let guard = self.store.read();
        guard
            .get(&group_id)
            .map(|e| e.confirmed_feedback.clone())
            .unwrap_or_default()
    }

    fn feedback(&self, group_id: U256) -> Vec<String> {
        let guard = self.store.read();
        guard
            .get(&group_id)
            .map(|e| {
                let mut all = e.confirmed_feedback.clone();
                all.extend(e.optimistic_feedback.iter().cloned());
                all
            })
            .unwrap_or_default()
    }

    fn has_member(&self, group_id: U256, commitment: &str) -> bool {
        let guard = self.store.read();
        guard
            .get(&group_id)
            .map(|e| {
                e.confirmed_members.iter().any(|m| m == commitment)
                    || e.optimistic_members.iter().any(|m| m == commitment)
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> U256 {
        U256::from(1u64)
    }

    #[test]
    fn empty_group_reads_as_empty() {
        let store = InMemoryGroupStore::default();
        assert!(store.members(group()).is_empty());
        assert!(store.feedback(group()).is_empty());
        assert!(!store.has_member(group(), "1"));
    }

    #[test]
    fn optimistic_members_are_visible_but_tagged() {
        let store = InMemoryGroupStore::default();
        store.replace_confirmed(group(), vec!["1".into()], vec![]);
        store.optimistic_add_member(group(), "2".into());
        assert_eq!(store.members(group()), vec!["1", "2"]);
        assert_eq!(store.confirmed_members(group()), vec!["1"]);
        assert!(store.has_member(group(), "2"));
    }

    #[test]
    fn replace_is_atomic_and_total() {
        let store = InMemoryGroupStore::default();
        store.replace_confirmed(group(), vec!["1".into(), "2".into()], vec!["a".into()]);
        store.replace_confirmed(group(), vec!["1".into()], vec![]);
        assert_eq!(store.members(group()), vec!["1"]);
        assert!(store.feedback(group()).is_empty());
    }

    #[test]
    fn confirmed_entries_leave_the_optimistic_set() {
        let store = InMemoryGroupStore::default();
        store.optimistic_add_feedback(group(), "ship it".into());
        assert_eq!(store.feedback(group()), vec!["ship it"]);
        store.replace_confirmed(group(), vec![], vec!["ship it".into()]);
        assert_eq!(store.feedback(group()), vec!["ship it"]);
        assert_eq!(store.confirmed_feedback(group()), vec!["ship it"]);
    }

    #[test]
    fn groups_are_isolated() {
        let store = InMemoryGroupStore::default();
        store.optimistic_add_member(U256::from(1u64), "1".into());
        assert!(store.members(U256::from(2u64)).is_empty());
    }
}
