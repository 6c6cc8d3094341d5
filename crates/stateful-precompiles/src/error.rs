//! Error types surfaced by stateful precompiles.

use alloy_primitives::{Address, FixedBytes, U256};
use thiserror::Error;

/// Errors a stateful precompile call or its upgrade lifecycle can produce.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrecompileError {
    /// Supplied gas does not cover the fixed cost of the operation.
    #[error("out of gas")]
    OutOfGas,
    /// A state-mutating function was called in a read-only context.
    #[error("write protection")]
    WriteProtection,
    /// The caller's role does not permit the operation.
    #[error("{reason}: {caller}")]
    Unauthorized {
        /// Address that attempted the call.
        caller: Address,
        /// What the caller was not allowed to do.
        reason: &'static str,
    },
    /// Input length or a decoded field is invalid.
    #[error("malformed input: {0}")]
    Malformed(String),
    /// No function is registered for the selector and there is no fallback.
    #[error("invalid function selector {selector}")]
    MethodNotFound {
        /// The unmatched selector.
        selector: FixedBytes<4>,
    },
    /// An upgrade schedule failed verification or was driven through an illegal transition.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// A dispatch table or registry was built with conflicting entries.
    #[error("invalid registration: {0}")]
    InvalidRegistration(String),
    /// The host did not provide a block number where one is required.
    #[error("block number is not available")]
    MissingBlockNumber,
    /// A precondition that verification guarantees did not hold.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    /// A role slot holds a value outside the known role encodings.
    #[error("invalid allow list role value {0}")]
    InvalidRole(U256),
    /// The host state backend failed.
    #[error("state access failed: {0}")]
    State(String),
}

impl PrecompileError {
    /// Returns `true` for errors that indicate a broken host precondition.
    ///
    /// Hosts must abort block processing on these instead of reverting the call.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingBlockNumber
                | Self::InvariantViolation(_)
                | Self::InvalidRole(_)
                | Self::State(_)
        )
    }

    /// Attaches the gas left after the failing call.
    pub const fn with_remaining_gas(self, remaining_gas: u64) -> CallFailure {
        CallFailure {
            error: self,
            remaining_gas,
        }
    }
}

/// A failed call together with the gas it leaves to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error}")]
pub struct CallFailure {
    /// Why the call failed.
    #[source]
    pub error: PrecompileError,
    /// Gas returned to the caller; zero for [`PrecompileError::OutOfGas`].
    pub remaining_gas: u64,
}

impl From<PrecompileError> for CallFailure {
    fn from(error: PrecompileError) -> Self {
        error.with_remaining_gas(0)
    }
}
