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
//! Membership proof generation, consumed as an opaque async function.
//!
//! The circuit and its trusted setup live behind a proving service; the
//! client only fixes the input/output contract. Proofs are generated once per
//! submission attempt against the exact group snapshot used to build the
//! transaction payload, and proving failures are fatal for the attempt.

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::Identity;

/// An immutable view of the group a proof is generated against.
///
/// Built only from a just-refreshed, chain-confirmed member list; optimistic
/// entries would yield a merkle root the contract does not know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSnapshot {
    members: Vec<String>,
}

impl GroupSnapshot {
    /// Wraps a confirmed member list, in emission order.
    pub fn new(members: Vec<String>) -> Self {
        Self { members }
    }

    /// The ordered member commitments.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Number of members in the snapshot.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when the group has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// The proof artifact bound to one (identity, group, message, scope) tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofArtifact {
    /// The proof points.
    pub points: [U256; 8],
    /// Depth of the group merkle tree the proof was computed against.
    pub merkle_tree_depth: U256,
    /// Root of the group merkle tree the proof was computed against.
    pub merkle_tree_root: U256,
    /// The per-(identity, scope) nullifier.
    pub nullifier: U256,
    /// The encoded message word the proof is bound to.
    pub message: U256,
}

/// An opaque membership proof generator.
#[async_trait::async_trait]
pub trait ProofGenerator: Send + Sync {
    /// Produces a proof that `identity` is a member of `group`, bound to
    /// `message` and `scope`.
    async fn generate(
        &self,
        identity: &Identity,
        group: &GroupSnapshot,
        message: U256,
        scope: U256,
    ) -> Result<ProofArtifact>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProveRequest<'a> {
    identity: &'a str,
    members: &'a [String],
    message: U256,
    scope: U256,
}

/// A proving service reachable over HTTP.
#[derive(Debug, Clone)]
pub struct HttpProofGenerator {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl HttpProofGenerator {
    /// Creates a client for the proving service at `endpoint`.
    pub fn new(endpoint: url::Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait::async_trait]
impl ProofGenerator for HttpProofGenerator {
    async fn generate(
        &self,
        identity: &Identity,
        group: &GroupSnapshot,
        message: U256,
        scope: U256,
    ) -> Result<ProofArtifact> {
        let request = ProveRequest {
            identity: identity.export(),
            members: group.members(),
            message,
            scope,
        };
        let failed = |e: reqwest::Error| Error::ProofGeneration {
            reason: e.to_string(),
        };
        let artifact = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(failed)?
            .error_for_status()
            .map_err(failed)?
            .json::<ProofArtifact>()
            .await
            .map_err(failed)?;
        if artifact.message != message {
            return Err(Error::ProofGeneration {
                reason: "prover returned a proof for a different message".into(),
            });
        }
        Ok(artifact)
    }
}
