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
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Feedback Client Crate 🕸️
//!
//! A client for an anonymous group-feedback contract. Holders of a private
//! identity prove group membership and post a message exactly once per
//! identity, without revealing which member sent it, while every transaction
//! is relayed through a gasless account-abstraction pathway instead of a
//! directly signed one.
//!
//! ## Overview
//!
//! The client is composed of four main components:
//!
//! 1. The chain reader reconstructs group membership and message history
//!    from the contract's append-only event log, scanning from genesis on
//!    every refresh.
//! 2. The group store keeps the authoritative-plus-optimistic local view:
//!    chain-confirmed collections replaced atomically on refresh, optimistic
//!    entries appended only after a confirmed relay submission.
//! 3. The relay session manager establishes a delegated-signing smart
//!    account for the embedded wallet and submits sponsored transactions
//!    through a bundler/paymaster pair.
//! 4. The orchestrator sequences the flows: refresh, build the payload,
//!    generate the membership proof (send flow only), establish the session,
//!    submit, reconcile.
//!
//! Identity custody and the proof circuit itself live behind external
//! collaborators; the client consumes an exported identity and an opaque
//! proving service.

/// A module for reading the contract's append-only event log.
pub mod chain;
/// A module for the fixed-width message word codec.
pub mod codec;
/// A module for loading and validating the client configuration.
pub mod config;
/// A module for managing the context of the client.
pub mod context;
/// Errors and the crate-wide result alias.
pub mod error;
/// A module for the external identity-store boundary.
pub mod identity;
/// A module for the join and send-feedback submission pipelines.
pub mod orchestrator;
/// A module used for debugging the client lifecycle, sync state, or relay state.
pub mod probe;
/// A module for the opaque membership-proof generator boundary.
pub mod proof;
/// A module for relay sessions and sponsored submission.
pub mod relay;
/// A module for the group state store.
pub mod store;

pub use error::{Error, Result};
