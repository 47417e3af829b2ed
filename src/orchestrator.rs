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
//! The submission pipelines: refresh state, build the payload, prove when
//! needed, establish the relay session, submit, reconcile local state.
//!
//! Steps within one attempt are strictly sequential; each consumes the
//! previous step's output. Nothing is retried automatically here: failures
//! surface to the user, who may re-trigger the flow.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ethers::types::{Address, U256};

use crate::chain::{self, EventScanner};
use crate::codec;
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::proof::{GroupSnapshot, ProofGenerator};
use crate::relay::RelaySessionManager;
use crate::store::{GroupStore, GroupSync};

/// Sequences the join-group and send-feedback flows.
pub struct Orchestrator<S, C> {
    contract: Address,
    group_id: U256,
    /// Proof scope; one scope per logical group.
    scope: U256,
    sync: Arc<GroupSync<S, C>>,
    relay: Arc<RelaySessionManager>,
    prover: Arc<dyn ProofGenerator>,
    in_progress: AtomicBool,
}

/// Clears the in-progress flag on every exit path.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<S, C> Orchestrator<S, C>
where
    S: EventScanner,
    C: GroupStore,
{
    /// Wires an orchestrator for one group. The group id doubles as the
    /// proof scope.
    pub fn new(
        contract: Address,
        group_id: U256,
        sync: Arc<GroupSync<S, C>>,
        relay: Arc<RelaySessionManager>,
        prover: Arc<dyn ProofGenerator>,
    ) -> Self {
        Self {
            contract,
            group_id,
            scope: group_id,
            sync,
            relay,
            prover,
            in_progress: AtomicBool::new(false),
        }
    }

    /// True while a flow is running; for UI feedback only.
    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// The group sync this orchestrator mutates.
    pub fn sync(&self) -> &GroupSync<S, C> {
        &self.sync
    }

    fn begin(&self) -> BusyGuard<'_> {
        self.in_progress.store(true, Ordering::Release);
        BusyGuard(&self.in_progress)
    }

    fn surface<T>(result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            // the user sees this text as-is.
            tracing::error!("{}", e);
        }
        result
    }

    /// Joins the group with the identity's commitment, through the relay.
    ///
    /// A no-op without a loaded identity. Returns the transaction identifier
    /// on success.
    pub async fn join_group(&self, identity: Option<&Identity>) -> Result<Option<String>> {
        let Some(identity) = identity else {
            tracing::info!("No identity loaded; nothing to join");
            return Ok(None);
        };
        let _busy = self.begin();
        Self::surface(self.join_inner(identity).await).map(Some)
    }

    async fn join_inner(&self, identity: &Identity) -> Result<String> {
        let commitment = identity.commitment().to_string();
        // refuse to spend a sponsored transaction on a join the chain would
        // reject anyway.
        self.sync.refresh(self.group_id).await?;
        if self.sync.store().has_member(self.group_id, &commitment) {
            return Err(Error::AlreadyMember { commitment });
        }
        tracing::info!("Joining group {} via the relay ...", self.group_id);
        let session = self.relay.initialize().await?;
        let call = chain::encode_join_call(identity.commitment());
        // always the handle from our own initialize(), never the manager's
        // cache: the owner may have changed since any prior initialization.
        let tx_hash = self.relay.submit(self.contract, call, Some(&session)).await?;
        self.sync
            .store()
            .optimistic_add_member(self.group_id, commitment);
        tracing::info!("Joined the group 🎉 Transaction: {}", tx_hash);
        Ok(tx_hash)
    }

    /// Sends an anonymous feedback message, proving group membership.
    ///
    /// A no-op without a loaded identity or with an empty message. Returns
    /// the transaction identifier on success.
    pub async fn send_feedback(
        &self,
        identity: Option<&Identity>,
        text: &str,
    ) -> Result<Option<String>> {
        let Some(identity) = identity else {
            tracing::info!("No identity loaded; nothing to send");
            return Ok(None);
        };
        if text.is_empty() {
            tracing::info!("Empty feedback message; nothing to send");
            return Ok(None);
        }
        let _busy = self.begin();
        Self::surface(self.send_inner(identity, text).await).map(Some)
    }

    async fn send_inner(&self, identity: &Identity, text: &str) -> Result<String> {
        // the proof must be computed against authoritative, just-fetched
        // membership: a stale member list yields a merkle root the contract
        // no longer has, and the submission reverts.
        self.sync.refresh(self.group_id).await?;
        let members = self.sync.store().confirmed_members(self.group_id);
        let group = GroupSnapshot::new(members);
        let message = codec::encode_message(text)?;
        tracing::info!(
            "Generating membership proof for group {} ({} members) ...",
            self.group_id,
            group.len()
        );
        let artifact = self
            .prover
            .generate(identity, &group, message, self.scope)
            .await?;
        tracing::event!(
            target: crate::probe::TARGET,
            tracing::Level::DEBUG,
            kind = %crate::probe::Kind::Proof,
            group_id = %self.group_id,
            nullifier = %artifact.nullifier,
        );
        let session = self.relay.initialize().await?;
        let call = chain::encode_send_feedback_call(&artifact);
        let tx_hash = self.relay.submit(self.contract, call, Some(&session)).await?;
        self.sync
            .store()
            .optimistic_add_feedback(self.group_id, text.to_string());
        tracing::info!("Anonymous feedback posted 🎉 Transaction: {}", tx_hash);
        Ok(tx_hash)
    }
}
