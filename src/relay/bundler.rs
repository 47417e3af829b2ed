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
//! The bundler/paymaster pair, consumed as an opaque transaction-relay
//! service over JSON-RPC.

use std::sync::Arc;

use ethers::abi::{self, Token};
use ethers::contract::abigen;
use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

use super::{GasLimits, RelaySession, SessionSigner};
use crate::error::{Error, Result};

abigen!(
    EntryPoint,
    r#"[
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce)
    ]"#
);

/// A gasless transaction-relay service.
#[async_trait::async_trait]
pub trait BundlerClient: Send + Sync {
    /// Resolves the delegated smart-account address for an owner.
    async fn smart_account(&self, owner: Address) -> Result<Address>;

    /// Sponsors and submits a call on behalf of the session owner, returning
    /// the relay's transaction identifier, if it reported one.
    async fn sponsor_and_send(
        &self,
        session: &RelaySession,
        signer: &dyn SessionSigner,
        to: Address,
        call_data: Bytes,
        gas: GasLimits,
    ) -> Result<Option<String>>;
}

/// A user operation, as submitted to the bundler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// The smart account executing the call.
    pub sender: Address,
    /// Anti-replay nonce, read from the entry point.
    pub nonce: U256,
    /// Account deployment code; empty for an existing account.
    pub init_code: Bytes,
    /// The ABI-encoded inner call.
    pub call_data: Bytes,
    /// Gas ceiling for the execution dimension.
    pub call_gas_limit: U256,
    /// Gas ceiling for the verification dimension.
    pub verification_gas_limit: U256,
    /// Gas the bundler burns before verification.
    pub pre_verification_gas: U256,
    /// EIP-1559 fee cap.
    pub max_fee_per_gas: U256,
    /// EIP-1559 priority fee.
    pub max_priority_fee_per_gas: U256,
    /// The paymaster sponsorship blob.
    pub paymaster_and_data: Bytes,
    /// The owner's signature over [`UserOperation::digest`].
    pub signature: Bytes,
}

impl UserOperation {
    /// The canonical digest the owner signs, bound to the entry point and
    /// chain so a signature cannot be replayed elsewhere.
    pub fn digest(&self, entry_point: Address, chain_id: u64) -> H256 {
        let packed = abi::encode(&[
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::FixedBytes(keccak256(&self.init_code).to_vec()),
            Token::FixedBytes(keccak256(&self.call_data).to_vec()),
            Token::Uint(self.call_gas_limit),
            Token::Uint(self.verification_gas_limit),
            Token::Uint(self.pre_verification_gas),
            Token::Uint(self.max_fee_per_gas),
            Token::Uint(self.max_priority_fee_per_gas),
            Token::FixedBytes(keccak256(&self.paymaster_and_data).to_vec()),
        ]);
        let inner = keccak256(packed);
        let outer = abi::encode(&[
            Token::FixedBytes(inner.to_vec()),
            Token::Address(entry_point),
            Token::Uint(U256::from(chain_id)),
        ]);
        H256::from(keccak256(outer))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymasterSponsorship {
    paymaster_and_data: Bytes,
    #[serde(default)]
    pre_verification_gas: Option<U256>,
}

/// Floor for the gas the bundler burns before verification starts; the
/// paymaster's sponsorship response may override it.
const PRE_VERIFICATION_GAS: u64 = 50_000;

/// The bundler/paymaster pair reachable by URL.
#[derive(Debug, Clone)]
pub struct HttpBundlerClient {
    bundler: Provider<Http>,
    paymaster: Provider<Http>,
    chain: Arc<Provider<Http>>,
    entry_point: Address,
    chain_id: u64,
}

impl HttpBundlerClient {
    /// Creates a relay client over the given bundler and paymaster endpoints.
    pub fn new(
        bundler_endpoint: url::Url,
        paymaster_endpoint: url::Url,
        chain: Arc<Provider<Http>>,
        entry_point: Address,
        chain_id: u64,
    ) -> Result<Self> {
        Ok(Self {
            bundler: Provider::try_from(bundler_endpoint.as_str())?,
            paymaster: Provider::try_from(paymaster_endpoint.as_str())?,
            chain,
            entry_point,
            chain_id,
        })
    }

    fn map_relay_error(e: ProviderError) -> Error {
        if let Some(rpc) = e.as_error_response() {
            if rpc.message.to_lowercase().contains("revert") {
                return Error::RelayRevert {
                    reason: rpc.message.clone(),
                };
            }
        }
        Error::EthersProvider(e)
    }
}

#[async_trait::async_trait]
impl BundlerClient for HttpBundlerClient {
    async fn smart_account(&self, owner: Address) -> Result<Address> {
        let account: Address = self
            .bundler
            .request("eth_getSmartAccountAddress", [owner])
            .await?;
        Ok(account)
    }

    async fn sponsor_and_send(
        &self,
        session: &RelaySession,
        signer: &dyn SessionSigner,
        to: Address,
        call_data: Bytes,
        gas: GasLimits,
    ) -> Result<Option<String>> {
        let entry_point = EntryPoint::new(self.entry_point, self.chain.clone());
        let nonce = entry_point
            .get_nonce(session.account, U256::zero())
            .call()
            .await?;
        let (max_fee_per_gas, max_priority_fee_per_gas) =
            self.chain.estimate_eip1559_fees(None).await?;
        let mut op = UserOperation {
            sender: session.account,
            nonce,
            init_code: Bytes::new(),
            call_data: execute_call(to, &call_data),
            call_gas_limit: gas.call,
            verification_gas_limit: gas.verification,
            pre_verification_gas: U256::from(PRE_VERIFICATION_GAS),
            max_fee_per_gas,
            max_priority_fee_per_gas,
            paymaster_and_data: Bytes::new(),
            signature: Bytes::new(),
        };
        let sponsorship: PaymasterSponsorship = self
            .paymaster
            .request("pm_sponsorUserOperation", (op.clone(), self.entry_point))
            .await
            .map_err(Self::map_relay_error)?;
        op.paymaster_and_data = sponsorship.paymaster_and_data;
        if let Some(pre_verification_gas) = sponsorship.pre_verification_gas {
            op.pre_verification_gas = pre_verification_gas;
        }
        let digest = op.digest(self.entry_point, self.chain_id);
        op.signature = signer.sign_digest(digest).await?;
        tracing::trace!(?op, "Submitting user operation");
        let tx_hash: Option<String> = self
            .bundler
            .request("eth_sendUserOperation", (op, self.entry_point))
            .await
            .map_err(Self::map_relay_error)?;
        Ok(tx_hash)
    }
}

/// Wraps an inner call into the smart account's `execute(to, value, data)`
/// call-data envelope.
pub fn execute_call(to: Address, data: &Bytes) -> Bytes {
    // execute(address,uint256,bytes)
    let selector = &keccak256(b"execute(address,uint256,bytes)")[..4];
    let encoded = abi::encode(&[
        Token::Address(to),
        Token::Uint(U256::zero()),
        Token::Bytes(data.to_vec()),
    ]);
    let mut out = selector.to_vec();
    out.extend_from_slice(&encoded);
    out.into()
}
