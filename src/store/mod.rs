// Copyright 2025 Feedback Client Contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
//! Group state: the authoritative-plus-optimistic view of membership and
//! message history.
//!
//! Chain-confirmed and optimistic-local entries are kept as two tagged
//! collections and only merged at the read boundary. Optimistic entries exist
//! for immediate feedback after a confirmed relay submission; anything that
//! needs authoritative membership (proof generation) must refresh first and
//! read the confirmed collection only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ethers::types::U256;
use parking_lot::Mutex;

use crate::chain::EventScanner;
use crate::error::Result;

pub mod mem;

#[doc(hidden)]
pub use mem::InMemoryGroupStore;

/// Read and mutation surface of the group state store.
///
/// Mutations are atomic replace-or-append; readers always observe a complete
/// snapshot, never a half-written one.
pub trait GroupStore: Clone + Send + Sync {
    /// Atomically replaces the chain-confirmed collections, reconciling away
    /// any optimistic entries the refresh confirmed.
    fn replace_confirmed(&self, group_id: U256, members: Vec<String>, feedback: Vec<String>);

    /// Appends a locally-confirmed member. O(1), no network.
    fn optimistic_add_member(&self, group_id: U256, commitment: String);

    /// Appends a locally-confirmed feedback message. O(1), no network.
    fn optimistic_add_feedback(&self, group_id: U256, text: String);

    /// Chain-confirmed members only, in emission order.
    fn confirmed_members(&self, group_id: U256) -> Vec<String>;

    /// Confirmed ++ optimistic members.
    fn members(&self, group_id: U256) -> Vec<String>;

    /// Chain-confirmed feedback only, in emission order.
    fn confirmed_feedback(&self, group_id: U256) -> Vec<String>;

    /// Confirmed ++ optimistic feedback.
    fn feedback(&self, group_id: U256) -> Vec<String>;

    /// Membership test over confirmed ∪ optimistic.
    fn has_member(&self, group_id: U256, commitment: &str) -> bool;
}

#[derive(Default)]
struct RefreshCell {
    lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
}

/// Couples an [`EventScanner`] with a [`GroupStore`] and serializes refreshes.
///
/// A refresh that arrives while another one is in flight for the same group
/// is coalesced: it waits for the in-flight scan and adopts its result
/// instead of re-scanning.
pub struct GroupSync<S, C> {
    scanner: S,
    store: C,
    cells: Mutex<HashMap<U256, Arc<RefreshCell>>>,
}

impl<S, C> GroupSync<S, C>
where
    S: EventScanner,
    C: GroupStore,
{
    /// Creates a sync coordinator over the given scanner and store.
    pub fn new(scanner: S, store: C) -> Self {
        Self {
            scanner,
            store,
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying store, for reads.
    pub fn store(&self) -> &C {
        &self.store
    }

    fn cell(&self, group_id: U256) -> Arc<RefreshCell> {
        self.cells.lock().entry(group_id).or_default().clone()
    }

    /// Scans the full event history for the group and atomically replaces the
    /// confirmed state. Two consecutive refreshes with no intervening chain
    /// events yield identical collections.
    pub async fn refresh(&self, group_id: U256) -> Result<()> {
        let cell = self.cell(group_id);
        let started_at = cell.generation.load(Ordering::Acquire);
        let _guard = cell.lock.lock().await;
        if cell.generation.load(Ordering::Acquire) != started_at {
            // another refresh completed while we waited for the lock; its
            // result is at least as fresh as ours would be.
            tracing::trace!("Coalesced refresh for group {}", group_id);
            return Ok(());
        }
        let members = self.scanner.fetch_members(group_id).await?;
        let feedback = self.scanner.fetch_messages(group_id).await?;
        tracing::event!(
            target: crate::probe::TARGET,
            tracing::Level::TRACE,
            kind = %crate::probe::Kind::Sync,
            %group_id,
            members = members.len(),
            feedback = feedback.len(),
        );
        self.store.replace_confirmed(group_id, members, feedback);
        cell.generation.fetch_add(1, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use parking_lot::RwLock;

    use super::*;

    #[derive(Clone)]
    struct CountingScanner {
        members: Arc<RwLock<Vec<String>>>,
        messages: Arc<RwLock<Vec<String>>>,
        scans: Arc<AtomicUsize>,
        gate: Arc<tokio::sync::Semaphore>,
    }

    impl Default for CountingScanner {
        fn default() -> Self {
            Self {
                members: Arc::default(),
                messages: Arc::default(),
                scans: Arc::default(),
                gate: Arc::new(tokio::sync::Semaphore::new(
                    tokio::sync::Semaphore::MAX_PERMITS,
                )),
            }
        }
    }

    impl CountingScanner {
        fn with_members(members: &[&str]) -> Self {
            let scanner = Self::default();
            *scanner.members.write() = members.iter().map(|m| m.to_string()).collect();
            scanner
        }
    }

    #[async_trait::async_trait]
    impl EventScanner for CountingScanner {
        async fn fetch_members(&self, _group_id: U256) -> Result<Vec<String>> {
            let _permit = self.gate.acquire().await.unwrap();
            self.scans.fetch_add(1, Ordering::SeqCst);
            Ok(self.members.read().clone())
        }

        async fn fetch_messages(&self, _group_id: U256) -> Result<Vec<String>> {
            Ok(self.messages.read().clone())
        }
    }

    fn group() -> U256 {
        U256::from(7u64)
    }

    #[tokio::test]
    async fn refresh_is_idempotent_when_the_chain_is_quiescent() {
        let scanner = CountingScanner::with_members(&["1", "2"]);
        let sync = GroupSync::new(scanner, InMemoryGroupStore::default());
        sync.refresh(group()).await.unwrap();
        let first_members = sync.store().members(group());
        let first_feedback = sync.store().feedback(group());
        sync.refresh(group()).await.unwrap();
        assert_eq!(sync.store().members(group()), first_members);
        assert_eq!(sync.store().feedback(group()), first_feedback);
    }

    #[tokio::test]
    async fn refresh_reconciles_optimistic_entries() {
        let scanner = CountingScanner::with_members(&["1"]);
        let sync = GroupSync::new(scanner.clone(), InMemoryGroupStore::default());
        sync.refresh(group()).await.unwrap();
        sync.store().optimistic_add_member(group(), "2".into());
        assert!(sync.store().has_member(group(), "2"));
        // the join lands on-chain.
        *scanner.members.write() = vec!["1".into(), "2".into()];
        sync.refresh(group()).await.unwrap();
        // still a member, now confirmed and not duplicated.
        assert!(sync.store().has_member(group(), "2"));
        assert_eq!(sync.store().members(group()), vec!["1", "2"]);
        assert_eq!(sync.store().confirmed_members(group()), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn concurrent_refreshes_coalesce_into_one_scan() {
        let scanner = CountingScanner::with_members(&["1"]);
        // block the first scan until both refreshes are queued.
        let gated = CountingScanner {
            gate: Arc::new(tokio::sync::Semaphore::new(0)),
            ..scanner
        };
        let sync = Arc::new(GroupSync::new(gated.clone(), InMemoryGroupStore::default()));
        let first = tokio::spawn({
            let sync = sync.clone();
            async move { sync.refresh(group()).await }
        });
        let second = tokio::spawn({
            let sync = sync.clone();
            async move { sync.refresh(group()).await }
        });
        tokio::task::yield_now().await;
        gated.gate.add_permits(tokio::sync::Semaphore::MAX_PERMITS);
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        // one of the two calls adopted the other's result.
        assert_eq!(gated.scans.load(Ordering::SeqCst), 1);
        assert_eq!(sync.store().members(group()), vec!["1"]);
    }
}
