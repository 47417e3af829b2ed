use std::sync::Arc;
use std::time::Duration;

use ethers::providers::Provider;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::U256;

use crate::chain::ChainReader;
use crate::config::FeedbackClientConfig;
use crate::error::Result;
use crate::identity::Identity;
use crate::orchestrator::Orchestrator;
use crate::proof::HttpProofGenerator;
use crate::relay::{GasLimits, HttpBundlerClient, RelaySessionManager, SessionSigner};
use crate::store::{GroupSync, InMemoryGroupStore};

/// FeedbackContext owns every collaborator of the client: the chain reader,
/// the group state store, the relay session manager and the orchestrator.
///
/// Explicitly constructed once per application session and passed around;
/// nothing lives in ambient module scope.
pub struct FeedbackContext {
    /// The validated configuration of the client.
    pub config: FeedbackClientConfig,
    sync: Arc<GroupSync<ChainReader, InMemoryGroupStore>>,
    orchestrator: Orchestrator<ChainReader, InMemoryGroupStore>,
}

impl FeedbackContext {
    /// Wires a context from a validated configuration.
    pub fn new(config: FeedbackClientConfig) -> Result<Self> {
        let provider = Provider::try_from(config.chain.http_endpoint.as_str())?
            .interval(Duration::from_millis(5u64));
        let provider = Arc::new(provider);
        let reader = ChainReader::new(provider.clone(), config.contract.address);
        let sync = Arc::new(GroupSync::new(reader, InMemoryGroupStore::default()));

        let signer: Option<Arc<dyn SessionSigner>> = match &config.chain.private_key {
            Some(key) => {
                let wallet: LocalWallet = key.expose().parse::<LocalWallet>()?;
                Some(Arc::new(wallet.with_chain_id(config.chain.chain_id)))
            }
            None => None,
        };
        let bundler = HttpBundlerClient::new(
            config.relay.bundler_endpoint(config.chain.chain_id)?,
            config.relay.paymaster_endpoint(config.chain.chain_id)?,
            provider,
            config.relay.entry_point,
            config.chain.chain_id,
        )?;
        let relay = Arc::new(RelaySessionManager::new(
            Arc::new(bundler),
            signer,
            GasLimits {
                call: U256::from(config.relay.call_gas_limit),
                verification: U256::from(config.relay.verification_gas_limit),
            },
        ));
        let prover = Arc::new(HttpProofGenerator::new(config.prover.endpoint.clone()));
        let orchestrator = Orchestrator::new(
            config.contract.address,
            U256::from(config.contract.group_id),
            sync.clone(),
            relay,
            prover,
        );
        Ok(Self {
            config,
            sync,
            orchestrator,
        })
    }

    /// The group this client operates on.
    pub fn group_id(&self) -> U256 {
        U256::from(self.config.contract.group_id)
    }

    /// The group sync coordinator, for reads and refreshes.
    pub fn sync(&self) -> &GroupSync<ChainReader, InMemoryGroupStore> {
        &self.sync
    }

    /// The submission orchestrator.
    pub fn orchestrator(&self) -> &Orchestrator<ChainReader, InMemoryGroupStore> {
        &self.orchestrator
    }

    /// Loads the identity export, if one is configured.
    pub fn load_identity(&self) -> Result<Option<Identity>> {
        match &self.config.identity_file {
            Some(path) => Identity::from_file(path).map(Some),
            None => Ok(None),
        }
    }
}
