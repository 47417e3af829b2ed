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
//! Chain reader: reconstructs group membership and message history from the
//! feedback contract's append-only event log.
//!
//! Every read is a full scan from genesis to the current tip, filtered by the
//! indexed group id; no pagination state is kept between calls. Reads are
//! pure and retried with bounded backoff on transient RPC failures.

use std::sync::Arc;
use std::time::Duration;

use ethers::abi::AbiEncode;
use ethers::contract::{abigen, LogMeta};
use ethers::providers::{Http, Provider};
use ethers::types::{Address, BlockNumber, Bytes, H256, U256};

use crate::codec;
use crate::error::Result;
use crate::proof::ProofArtifact;

abigen!(
    FeedbackContract,
    r#"[
        event MemberAdded(uint256 indexed groupId, uint256 index, uint256 identityCommitment, uint256 merkleTreeRoot)
        event ProofVerified(uint256 indexed groupId, uint256 merkleTreeDepth, uint256 merkleTreeRoot, uint256 nullifier, uint256 message, uint256 scope, uint256[8] points)
        function joinGroup(uint256 identityCommitment) external
        function sendFeedback(uint256 merkleTreeDepth, uint256 merkleTreeRoot, uint256 nullifier, uint256 message, uint256[8] points) external
    ]"#
);

/// A source of authoritative group history.
///
/// Both reads return collections ordered by ledger emission order (block
/// height, then log index), never by network arrival order.
#[async_trait::async_trait]
pub trait EventScanner: Send + Sync {
    /// All identity commitments ever added to the group, as decimal strings.
    async fn fetch_members(&self, group_id: U256) -> Result<Vec<String>>;
    /// All decoded feedback messages verified for the group. Entries whose
    /// payload fails decoding are dropped, never aborting the scan.
    async fn fetch_messages(&self, group_id: U256) -> Result<Vec<String>>;
}

/// Reads the feedback contract's event log over a JSON-RPC provider.
#[derive(Debug, Clone)]
pub struct ChainReader {
    provider: Arc<Provider<Http>>,
    contract: Address,
}

impl ChainReader {
    /// Creates a reader for the given contract.
    pub fn new(provider: Arc<Provider<Http>>, contract: Address) -> Self {
        Self { provider, contract }
    }

    fn contract(&self) -> FeedbackContract<Provider<Http>> {
        FeedbackContract::new(self.contract, self.provider.clone())
    }

    fn read_backoff() -> backoff::ExponentialBackoff {
        backoff::ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        }
    }

    async fn scan_members(&self, group_id: U256) -> Result<Vec<String>> {
        let contract = self.contract();
        let mut query = contract
            .member_added_filter()
            .from_block(0u64)
            .to_block(BlockNumber::Latest);
        query.filter = query.filter.clone().topic1(group_topic(group_id));
        let logs = query.query_with_meta().await?;
        tracing::trace!("Found #{} membership events", logs.len());
        Ok(collect_members(logs))
    }

    async fn scan_messages(&self, group_id: U256) -> Result<Vec<String>> {
        let contract = self.contract();
        let mut query = contract
            .proof_verified_filter()
            .from_block(0u64)
            .to_block(BlockNumber::Latest);
        query.filter = query.filter.clone().topic1(group_topic(group_id));
        let logs = query.query_with_meta().await?;
        tracing::trace!("Found #{} proof events", logs.len());
        Ok(collect_messages(logs))
    }
}

#[async_trait::async_trait]
impl EventScanner for ChainReader {
    async fn fetch_members(&self, group_id: U256) -> Result<Vec<String>> {
        backoff::future::retry(Self::read_backoff(), || async {
            self.scan_members(group_id)
                .await
                .map_err(backoff::Error::transient)
        })
        .await
    }

    async fn fetch_messages(&self, group_id: U256) -> Result<Vec<String>> {
        backoff::future::retry(Self::read_backoff(), || async {
            self.scan_messages(group_id)
                .await
                .map_err(backoff::Error::transient)
        })
        .await
    }
}

/// The indexed group id, as an event topic.
pub fn group_topic(group_id: U256) -> H256 {
    let mut bytes = [0u8; 32];
    group_id.to_big_endian(&mut bytes);
    H256::from(bytes)
}

/// Orders membership events by emission order and extracts the commitments.
pub fn collect_members(mut logs: Vec<(MemberAddedFilter, LogMeta)>) -> Vec<String> {
    logs.sort_by_key(|(_, meta)| (meta.block_number, meta.log_index));
    logs.into_iter()
        .map(|(event, _)| event.identity_commitment.to_string())
        .collect()
}

/// Orders proof events by emission order and decodes their message words.
/// Undecodable entries are logged and dropped.
pub fn collect_messages(mut logs: Vec<(ProofVerifiedFilter, LogMeta)>) -> Vec<String> {
    logs.sort_by_key(|(_, meta)| (meta.block_number, meta.log_index));
    logs.into_iter()
        .filter_map(|(event, meta)| match codec::decode_message(event.message) {
            Some(text) => Some(text),
            None => {
                tracing::warn!(
                    "Skipping undecodable message at #{} log #{}",
                    meta.block_number,
                    meta.log_index
                );
                None
            }
        })
        .collect()
}

/// ABI-encodes a `joinGroup(commitment)` call.
pub fn encode_join_call(commitment: U256) -> Bytes {
    JoinGroupCall {
        identity_commitment: commitment,
    }
    .encode()
    .into()
}

/// ABI-encodes a `sendFeedback(...)` call from a proof artifact.
pub fn encode_send_feedback_call(artifact: &ProofArtifact) -> Bytes {
    SendFeedbackCall {
        merkle_tree_depth: artifact.merkle_tree_depth,
        merkle_tree_root: artifact.merkle_tree_root,
        nullifier: artifact.nullifier,
        message: artifact.message,
        points: artifact.points,
    }
    .encode()
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(block: u64, index: u64) -> LogMeta {
        LogMeta {
            address: Address::zero(),
            block_number: block.into(),
            block_hash: H256::zero(),
            transaction_hash: H256::zero(),
            transaction_index: 0u64.into(),
            log_index: index.into(),
        }
    }

    fn member(commitment: u64) -> MemberAddedFilter {
        MemberAddedFilter {
            group_id: U256::from(1u64),
            index: U256::zero(),
            identity_commitment: U256::from(commitment),
            merkle_tree_root: U256::zero(),
        }
    }

    fn proof(message: U256) -> ProofVerifiedFilter {
        ProofVerifiedFilter {
            group_id: U256::from(1u64),
            merkle_tree_depth: U256::from(1u64),
            merkle_tree_root: U256::zero(),
            nullifier: U256::zero(),
            message,
            scope: U256::from(1u64),
            points: [U256::zero(); 8],
        }
    }

    #[test]
    fn members_follow_emission_order_not_arrival_order() {
        // arrival order scrambled on purpose.
        let logs = vec![
            (member(30), meta(3, 0)),
            (member(10), meta(1, 0)),
            (member(21), meta(2, 5)),
            (member(20), meta(2, 1)),
        ];
        let members = collect_members(logs);
        assert_eq!(members, vec!["10", "20", "21", "30"]);
    }

    #[test]
    fn undecodable_messages_are_dropped_but_siblings_survive() {
        let good_one = codec::encode_message("first").unwrap();
        let good_two = codec::encode_message("second").unwrap();
        // 0xfffe.. is not valid UTF-8, and zero is an empty payload.
        let mut bad = [0u8; 32];
        bad[0] = 0xff;
        bad[1] = 0xfe;
        let logs = vec![
            (proof(good_one), meta(1, 0)),
            (proof(U256::from_big_endian(&bad)), meta(2, 0)),
            (proof(U256::zero()), meta(3, 0)),
            (proof(good_two), meta(4, 0)),
        ];
        let messages = collect_messages(logs);
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn group_topic_is_the_padded_group_id() {
        let topic = group_topic(U256::from(42u64));
        assert_eq!(topic.0[31], 42);
        assert!(topic.0[..31].iter().all(|b| *b == 0));
    }

    #[test]
    fn join_call_embeds_the_commitment() {
        let data = encode_join_call(U256::from(7u64));
        // 4 byte selector + one word.
        assert_eq!(data.len(), 4 + 32);
        assert_eq!(data[data.len() - 1], 7);
    }

    #[test]
    fn send_feedback_call_has_the_full_payload() {
        let artifact = ProofArtifact {
            points: [U256::from(9u64); 8],
            merkle_tree_depth: U256::from(16u64),
            merkle_tree_root: U256::from(3u64),
            nullifier: U256::from(4u64),
            message: codec::encode_message("hi").unwrap(),
        };
        let data = encode_send_feedback_call(&artifact);
        // 4 byte selector + 4 scalar words + 8 point words.
        assert_eq!(data.len(), 4 + 32 * 12);
    }
}
