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
//! Relay session management: establishing and caching a delegated-signing
//! smart account, and submitting sponsored transactions through it.
//!
//! The manager caches at most one session, the one of whichever owner last
//! completed `initialize()`. Because the owner can change between calls,
//! callers that initialize and then submit within one logical operation must
//! thread the handle returned by their own `initialize()` into `submit()`
//! instead of trusting the cache.

use std::sync::Arc;
use std::time::Instant;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, H256, U256};
use parking_lot::Mutex;

use crate::error::{Error, Result};

pub mod bundler;

#[doc(hidden)]
pub use bundler::{BundlerClient, HttpBundlerClient, UserOperation};

/// An embedded signing provider, owned by the external wallet collaborator.
#[async_trait::async_trait]
pub trait SessionSigner: Send + Sync {
    /// The owner address this signer controls.
    fn address(&self) -> Address;
    /// Signs a 32-byte digest, returning a 65-byte recoverable signature.
    async fn sign_digest(&self, digest: H256) -> Result<Bytes>;
}

#[async_trait::async_trait]
impl SessionSigner for LocalWallet {
    fn address(&self) -> Address {
        Signer::address(self)
    }

    async fn sign_digest(&self, digest: H256) -> Result<Bytes> {
        let signature = self.sign_hash(digest)?;
        Ok(signature.to_vec().into())
    }
}

/// A delegated-signing session bound to one owner.
///
/// Lives for the process session only; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySession {
    /// The embedded-wallet address that owns the smart account.
    pub owner: Address,
    /// The delegated smart-account address executing on the owner's behalf.
    pub account: Address,
    /// When this session was established.
    pub created_at: Instant,
}

/// A shared handle to an established session.
pub type SessionHandle = Arc<RelaySession>;

/// Gas ceilings applied to every relayed call.
#[derive(Debug, Clone, Copy)]
pub struct GasLimits {
    /// Ceiling for the call execution dimension.
    pub call: U256,
    /// Ceiling for the verification dimension. Membership-proof verification
    /// is far heavier than a typical transfer; undersized limits surface as
    /// silent on-chain reverts that look like network failures.
    pub verification: U256,
}

/// Lifecycle of the cached session.
#[derive(Debug, Default)]
enum SessionState {
    /// No session has been requested yet.
    #[default]
    Uninitialized,
    /// A session is being established.
    Initializing,
    /// A session is cached and usable.
    Ready(SessionHandle),
    /// The last attempt failed; recoverable, the next `initialize()` starts
    /// over from scratch.
    Failed,
}

/// Establishes, caches and uses delegated-signing sessions.
pub struct RelaySessionManager {
    client: Arc<dyn BundlerClient>,
    signer: Option<Arc<dyn SessionSigner>>,
    state: Mutex<SessionState>,
    gas: GasLimits,
}

impl RelaySessionManager {
    /// Creates a manager over the given relay client and optional embedded
    /// signer.
    pub fn new(
        client: Arc<dyn BundlerClient>,
        signer: Option<Arc<dyn SessionSigner>>,
        gas: GasLimits,
    ) -> Self {
        Self {
            client,
            signer,
            state: Mutex::new(SessionState::default()),
            gas,
        }
    }

    /// The cached session, if one is `Ready`.
    pub fn cached_session(&self) -> Option<SessionHandle> {
        match &*self.state.lock() {
            SessionState::Ready(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Establishes a delegated-signing session for the current owner and
    /// caches it, replacing any prior session.
    ///
    /// Fails with [`Error::SignerUnavailable`] when no embedded signer
    /// exists. Any downstream failure leaves the manager `Failed` with no
    /// partially-initialized session cached.
    pub async fn initialize(&self) -> Result<SessionHandle> {
        let signer = self.signer.clone().ok_or(Error::SignerUnavailable)?;
        let owner = signer.address();
        *self.state.lock() = SessionState::Initializing;
        tracing::debug!("Initializing relay session for owner {}", owner);
        let account = match self.client.smart_account(owner).await {
            Ok(account) => account,
            Err(e) => {
                *self.state.lock() = SessionState::Failed;
                return Err(Error::RelayInit {
                    reason: e.to_string(),
                });
            }
        };
        let handle: SessionHandle = Arc::new(RelaySession {
            owner,
            account,
            created_at: Instant::now(),
        });
        *self.state.lock() = SessionState::Ready(handle.clone());
        tracing::debug!("Relay session ready: owner {} account {}", owner, account);
        Ok(handle)
    }

    /// Submits `call_data` to `to` through the relay, sponsored.
    ///
    /// `session` should be the handle returned by the caller's own
    /// `initialize()`; when omitted, the cached session is used and the
    /// manager must be `Ready`. Returns the relay's transaction identifier;
    /// a missing identifier is [`Error::RelaySubmissionIncomplete`], never a
    /// void success.
    pub async fn submit(
        &self,
        to: Address,
        call_data: Bytes,
        session: Option<&SessionHandle>,
    ) -> Result<String> {
        let session = match session {
            Some(handle) => handle.clone(),
            None => self.cached_session().ok_or_else(|| Error::RelayInit {
                reason: "no relay session; call initialize() first".into(),
            })?,
        };
        let signer = self.signer.clone().ok_or(Error::SignerUnavailable)?;
        tracing::event!(
            target: crate::probe::TARGET,
            tracing::Level::DEBUG,
            kind = %crate::probe::Kind::RelayTx,
            owner = %session.owner,
            account = %session.account,
            %to,
        );
        let tx_hash = self
            .client
            .sponsor_and_send(&session, signer.as_ref(), to, call_data, self.gas)
            .await?;
        match tx_hash {
            Some(hash) if !hash.is_empty() => Ok(hash),
            _ => Err(Error::RelaySubmissionIncomplete),
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::RwLock;

    use super::*;

    struct SwitchableSigner {
        current: RwLock<Address>,
    }

    impl SwitchableSigner {
        fn new(address: Address) -> Arc<Self> {
            Arc::new(Self {
                current: RwLock::new(address),
            })
        }

        fn switch_to(&self, address: Address) {
            *self.current.write() = address;
        }
    }

    #[async_trait::async_trait]
    impl SessionSigner for SwitchableSigner {
        fn address(&self) -> Address {
            *self.current.read()
        }

        async fn sign_digest(&self, _digest: H256) -> Result<Bytes> {
            Ok(vec![0u8; 65].into())
        }
    }

    #[derive(Default)]
    struct RecordingRelay {
        fail_account: RwLock<bool>,
        tx_hash: RwLock<Option<String>>,
        submitted_for: RwLock<Vec<Address>>,
    }

    impl RecordingRelay {
        fn returning(tx_hash: Option<&str>) -> Arc<Self> {
            let relay = Self::default();
            *relay.tx_hash.write() = tx_hash.map(|s| s.to_string());
            Arc::new(relay)
        }
    }

    #[async_trait::async_trait]
    impl BundlerClient for RecordingRelay {
        async fn smart_account(&self, owner: Address) -> Result<Address> {
            if *self.fail_account.read() {
                return Err(Error::Generic("bundler unreachable"));
            }
            // a distinct, owner-derived account address.
            let mut account = owner;
            account.0[0] ^= 0xff;
            Ok(account)
        }

        async fn sponsor_and_send(
            &self,
            session: &RelaySession,
            _signer: &dyn SessionSigner,
            _to: Address,
            _call_data: Bytes,
            _gas: GasLimits,
        ) -> Result<Option<String>> {
            self.submitted_for.write().push(session.owner);
            Ok(self.tx_hash.read().clone())
        }
    }

    fn gas() -> GasLimits {
        GasLimits {
            call: U256::from(1_000_000u64),
            verification: U256::from(500_000u64),
        }
    }

    fn owner(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[tokio::test]
    async fn initialize_without_a_signer_is_signer_unavailable() {
        let manager =
            RelaySessionManager::new(RecordingRelay::returning(Some("0xdead")), None, gas());
        assert!(matches!(
            manager.initialize().await,
            Err(Error::SignerUnavailable)
        ));
    }

    #[tokio::test]
    async fn a_failed_initialize_caches_nothing_and_is_recoverable() {
        let relay = RecordingRelay::returning(Some("0xdead"));
        *relay.fail_account.write() = true;
        let signer = SwitchableSigner::new(owner(0xaa));
        let manager = RelaySessionManager::new(relay.clone(), Some(signer), gas());
        assert!(matches!(
            manager.initialize().await,
            Err(Error::RelayInit { .. })
        ));
        assert!(manager.cached_session().is_none());
        // the bundler recovers; so does the manager.
        *relay.fail_account.write() = false;
        assert!(manager.initialize().await.is_ok());
        assert!(manager.cached_session().is_some());
    }

    #[tokio::test]
    async fn submit_uses_the_explicit_handle_over_the_cache() {
        let relay = RecordingRelay::returning(Some("0xbeef"));
        let signer = SwitchableSigner::new(owner(0xaa));
        let manager = RelaySessionManager::new(relay.clone(), Some(signer.clone()), gas());
        let _stale = manager.initialize().await.unwrap();
        // the user switches identities between initializing and submitting.
        signer.switch_to(owner(0xbb));
        let fresh = manager.initialize().await.unwrap();
        assert_eq!(fresh.owner, owner(0xbb));
        let hash = manager
            .submit(owner(0x01), Bytes::new(), Some(&fresh))
            .await
            .unwrap();
        assert_eq!(hash, "0xbeef");
        assert_eq!(relay.submitted_for.read().as_slice(), &[owner(0xbb)]);
    }

    #[tokio::test]
    async fn reinitialize_replaces_the_cached_session() {
        let relay = RecordingRelay::returning(Some("0xbeef"));
        let signer = SwitchableSigner::new(owner(0xaa));
        let manager = RelaySessionManager::new(relay, Some(signer.clone()), gas());
        manager.initialize().await.unwrap();
        signer.switch_to(owner(0xbb));
        manager.initialize().await.unwrap();
        let cached = manager.cached_session().unwrap();
        assert_eq!(cached.owner, owner(0xbb));
    }

    #[tokio::test]
    async fn submit_without_any_session_fails() {
        let relay = RecordingRelay::returning(Some("0xbeef"));
        let signer = SwitchableSigner::new(owner(0xaa));
        let manager = RelaySessionManager::new(relay, Some(signer), gas());
        assert!(matches!(
            manager.submit(owner(0x01), Bytes::new(), None).await,
            Err(Error::RelayInit { .. })
        ));
    }

    #[tokio::test]
    async fn an_empty_tx_identifier_is_an_incomplete_submission() {
        for hash in [None, Some("")] {
            let relay = RecordingRelay::returning(hash);
            let signer = SwitchableSigner::new(owner(0xaa));
            let manager = RelaySessionManager::new(relay, Some(signer), gas());
            let session = manager.initialize().await.unwrap();
            assert!(matches!(
                manager
                    .submit(owner(0x01), Bytes::new(), Some(&session))
                    .await,
                Err(Error::RelaySubmissionIncomplete)
            ));
        }
    }
}
