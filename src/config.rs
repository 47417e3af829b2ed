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
use std::path::{Path, PathBuf};

use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const fn call_gas_limit_default() -> u64 {
    // proof verification is much heavier than a plain transfer; an undersized
    // limit shows up as a silent on-chain revert.
    1_000_000
}

const fn verification_gas_limit_default() -> u64 {
    500_000
}

/// FeedbackClientConfig is the configuration for the feedback client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FeedbackClientConfig {
    /// The chain to read events from and relay transactions to.
    pub chain: ChainConfig,
    /// The feedback contract and group.
    pub contract: ContractConfig,
    /// The bundler/paymaster relay service.
    pub relay: RelayConfig,
    /// The proving service.
    pub prover: ProverConfig,
    /// Path to the identity file exported by the identity store.
    ///
    /// Optional; flows that need an identity are a no-op without one.
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
}

/// ChainConfig is the configuration for the EVM network.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainConfig {
    /// Http(s) Endpoint for quick Req/Res
    #[serde(skip_serializing)]
    pub http_endpoint: url::Url,
    /// chain specific id.
    #[serde(rename(serialize = "chainId"))]
    pub chain_id: u64,
    /// The embedded signing key for the relay session owner.
    ///
    /// The format is dynamic:
    /// 1. if it starts with '0x' then this is a raw (32 bytes) hex encoded
    ///    private key.
    /// 2. if it starts with '$' then it is an environment variable containing
    ///    a hex-encoded private key.
    ///
    /// Optional; without it the relay session manager reports
    /// `SignerUnavailable`.
    #[serde(skip_serializing, default)]
    pub private_key: Option<PrivateKey>,
}

/// ContractConfig is the configuration for the feedback contract.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContractConfig {
    /// The address of the feedback contract on this chain.
    pub address: Address,
    /// The group identifier this client operates on. Also used as the proof
    /// scope.
    pub group_id: u64,
}

/// RelayConfig is the configuration for the account-abstraction relay.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RelayConfig {
    /// Base URL of the bundler service.
    #[serde(skip_serializing)]
    pub bundler_url: url::Url,
    /// Per-environment bundler API key.
    #[serde(skip_serializing)]
    pub bundler_api_key: String,
    /// Base URL of the paymaster service.
    #[serde(skip_serializing)]
    pub paymaster_url: url::Url,
    /// Per-environment paymaster API key.
    #[serde(skip_serializing)]
    pub paymaster_api_key: String,
    /// The entry point contract the bundler executes against.
    pub entry_point: Address,
    /// Gas ceiling for the call execution dimension.
    #[serde(default = "call_gas_limit_default")]
    pub call_gas_limit: u64,
    /// Gas ceiling for the (proof) verification dimension.
    #[serde(default = "verification_gas_limit_default")]
    pub verification_gas_limit: u64,
}

impl RelayConfig {
    /// Bundler endpoint with the chain id and API key filled in.
    pub fn bundler_endpoint(&self, chain_id: u64) -> Result<url::Url> {
        endpoint_with_key(&self.bundler_url, chain_id, &self.bundler_api_key)
    }

    /// Paymaster endpoint with the chain id and API key filled in.
    pub fn paymaster_endpoint(&self, chain_id: u64) -> Result<url::Url> {
        endpoint_with_key(&self.paymaster_url, chain_id, &self.paymaster_api_key)
    }
}

fn endpoint_with_key(base: &url::Url, chain_id: u64, api_key: &str) -> Result<url::Url> {
    let base = base.as_str().trim_end_matches('/');
    url::Url::parse(&format!("{}/{}/{}", base, chain_id, api_key)).map_err(Into::into)
}

/// ProverConfig is the configuration for the proving service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProverConfig {
    /// Http(s) endpoint of the proving service.
    #[serde(skip_serializing)]
    pub endpoint: url::Url,
}

/// A secp256k1 private key, either inline hex or an `$ENV` indirection.
#[derive(Clone)]
pub struct PrivateKey(String);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey").finish()
    }
}

impl PrivateKey {
    /// The raw hex string, without the `0x` prefix.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PrivateKeyVisitor;
        impl serde::de::Visitor<'_> for PrivateKeyVisitor {
            type Value = String;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("hex string or an env var containing a hex string in it")
            }

            fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let raw = if let Some(var) = value.strip_prefix('$') {
                    tracing::trace!("Reading {} from env", var);
                    std::env::var(var).map_err(|e| {
                        serde::de::Error::custom(format!(
                            "error while loading this env {}: {}",
                            var, e,
                        ))
                    })?
                } else {
                    value.to_string()
                };
                let stripped = raw.strip_prefix("0x").unwrap_or(&raw);
                if stripped.len() != 64 || !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(serde::de::Error::custom(format!(
                        "got {} chars but expected a 64 chars hex string (optionally 0x prefixed)",
                        stripped.len()
                    )));
                }
                Ok(stripped.to_string())
            }
        }

        let key = deserializer.deserialize_str(PrivateKeyVisitor)?;
        Ok(Self(key))
    }
}

/// Loads the configuration from every `*.toml`/`*.json` file under `path`,
/// merged with `FEEDBACK_*` environment variables, and validates it.
pub fn load<P: AsRef<Path>>(path: P) -> Result<FeedbackClientConfig> {
    let mut builder = config::Config::builder();
    // A pattern that covers all toml or json files in the config directory and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", path.as_ref().display());
    let json_pattern = format!("{}/**/*.json", path.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let config_files = glob::glob(&toml_pattern)?
        .flatten()
        .chain(glob::glob(&json_pattern)?.flatten());
    for config_file in config_files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .map(|e| e.to_str().unwrap_or(""))
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder.add_source(config::File::from(config_file).format(format));
    }
    // also merge in the environment (with a prefix of FEEDBACK).
    builder =
        builder.add_source(config::Environment::with_prefix("FEEDBACK").separator("_"));
    let cfg = builder.build()?;
    // and finally deserialize the config and post-process it
    let config: std::result::Result<
        FeedbackClientConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

// The postloading_process exists to validate configuration values that
// deserialize fine but cannot possibly work at runtime. All problems are
// collected and reported at once.
fn postloading_process(config: FeedbackClientConfig) -> Result<FeedbackClientConfig> {
    tracing::trace!("Checking configuration sanity ...");
    let mut problems = Vec::new();
    if config.contract.address == Address::zero() {
        problems.push("contract.address is the zero address");
    }
    if config.relay.entry_point == Address::zero() {
        problems.push("relay.entry-point is the zero address");
    }
    if config.relay.bundler_api_key.is_empty() {
        problems.push("relay.bundler-api-key is empty");
    }
    if config.relay.paymaster_api_key.is_empty() {
        problems.push("relay.paymaster-api-key is empty");
    }
    if config.relay.call_gas_limit == 0 {
        problems.push("relay.call-gas-limit is zero");
    }
    if config.relay.verification_gas_limit == 0 {
        problems.push("relay.verification-gas-limit is zero");
    }
    if !problems.is_empty() {
        for problem in &problems {
            tracing::error!("Invalid configuration: {}", problem);
        }
        return Err(Error::Generic("invalid configuration, see the log"));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FeedbackClientConfig {
        FeedbackClientConfig {
            chain: ChainConfig {
                http_endpoint: "http://localhost:8545".parse().unwrap(),
                chain_id: 84532,
                private_key: None,
            },
            contract: ContractConfig {
                address: Address::repeat_byte(0x11),
                group_id: 42,
            },
            relay: RelayConfig {
                bundler_url: "https://bundler.example/api/v3".parse().unwrap(),
                bundler_api_key: "bundler-key".into(),
                paymaster_url: "https://paymaster.example/api/v2".parse().unwrap(),
                paymaster_api_key: "paymaster-key".into(),
                entry_point: Address::repeat_byte(0x22),
                call_gas_limit: call_gas_limit_default(),
                verification_gas_limit: verification_gas_limit_default(),
            },
            prover: ProverConfig {
                endpoint: "http://localhost:4000/prove".parse().unwrap(),
            },
            identity_file: None,
        }
    }

    #[test]
    fn accepts_a_sane_config() {
        assert!(postloading_process(sample()).is_ok());
    }

    #[test]
    fn rejects_zero_contract_address() {
        let mut config = sample();
        config.contract.address = Address::zero();
        assert!(postloading_process(config).is_err());
    }

    #[test]
    fn rejects_zero_gas_ceilings() {
        let mut config = sample();
        config.relay.call_gas_limit = 0;
        assert!(postloading_process(config).is_err());
    }

    #[test]
    fn builds_keyed_endpoints() {
        let config = sample();
        let bundler = config.relay.bundler_endpoint(84532).unwrap();
        assert_eq!(
            bundler.as_str(),
            "https://bundler.example/api/v3/84532/bundler-key"
        );
    }
}
