use derive_more::Display;

/// The tracing target used for machine-readable probe events.
pub const TARGET: &str = "feedback_probe";

/// The Kind of the Probe.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// When the Lifecycle of the client changes, like starting or exiting.
    #[display(fmt = "lifecycle")]
    Lifecycle,
    /// Group state sync against the chain.
    #[display(fmt = "sync")]
    Sync,
    /// Membership proof generation state.
    #[display(fmt = "proof")]
    Proof,
    /// Relaying a sponsored transaction.
    #[display(fmt = "relay_tx")]
    RelayTx,
}
