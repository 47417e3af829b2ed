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
use ethers::contract::ContractError;
use ethers::providers::{Http, Provider, ProviderError};

/// An enum of all possible errors that could be encountered during the
/// execution of the feedback client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Error in Http Provider (ethers client).
    #[error(transparent)]
    EthersProvider(#[from] ProviderError),
    /// Smart contract error.
    #[error(transparent)]
    EthersContract(#[from] ContractError<Provider<Http>>),
    /// Wallet key parsing or signing error.
    #[error(transparent)]
    EthersWallet(#[from] ethers::signers::WalletError),
    /// No embedded signing provider is available for the relay session.
    #[error("No embedded signer available; connect a wallet first")]
    SignerUnavailable,
    /// The relay session could not be established.
    #[error("Relay session setup failed: {}", reason)]
    RelayInit {
        /// The underlying failure, verbatim.
        reason: String,
    },
    /// The relay accepted the call but reported no transaction identifier.
    #[error("Relay returned no transaction identifier")]
    RelaySubmissionIncomplete,
    /// The relayed call reverted on-chain.
    #[error("Relayed transaction reverted: {}", reason)]
    RelayRevert {
        /// The revert reason reported by the relay.
        reason: String,
    },
    /// Proof generation failed; fatal for this submission attempt.
    #[error("Proof generation failed: {}", reason)]
    ProofGeneration {
        /// The prover's error, verbatim.
        reason: String,
    },
    /// The identity is already a member of the group.
    #[error("Identity commitment {} is already a group member", commitment)]
    AlreadyMember {
        /// The duplicate commitment, as a decimal string.
        commitment: String,
    },
    /// The message does not fit the fixed-width payload slot.
    #[error("Message is {} bytes, the payload slot fits {}", len, crate::codec::MESSAGE_WIDTH)]
    MessageTooLong {
        /// Byte length of the rejected message.
        len: usize,
    },
    /// No identity file is configured or the file does not exist.
    #[error("No identity loaded; create or import one first")]
    MissingIdentity,
    /// The feedback message is empty.
    #[error("Feedback message is empty")]
    EmptyMessage,
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
}

/// A type alias for the result of the feedback client, that uses the `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;
