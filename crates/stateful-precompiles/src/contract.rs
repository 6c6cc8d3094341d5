//! Selector dispatch for stateful precompiles.
//!
//! A [`StatefulPrecompiledContract`] routes the first four bytes of call input to a registered
//! [`StatefulPrecompileFunction`]. Every handler is expected to run its body through
//! [`run_metered`], which charges the fixed gas cost before anything else and rejects mutating
//! functions in read-only contexts before the body can touch state.

use crate::{
    error::{CallFailure, PrecompileError},
    state::AccessibleState,
};
use alloy_primitives::{keccak256, Address, Bytes, FixedBytes};
use std::{collections::BTreeMap, fmt};

/// Length of a function selector in bytes.
pub const SELECTOR_LEN: usize = 4;

/// Four-byte function identifier.
pub type Selector = [u8; SELECTOR_LEN];

/// Computes the Solidity function selector (first 4 bytes of keccak256(signature)).
pub fn function_selector(signature: &str) -> Selector {
    let hash = keccak256(signature.as_bytes());
    let mut selector = [0u8; SELECTOR_LEN];
    selector.copy_from_slice(&hash[..SELECTOR_LEN]);
    selector
}

/// Per-call inputs handed to a handler.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    /// Immediate caller.
    pub caller: Address,
    /// Address the precompile was invoked at.
    pub address: Address,
    /// Call data with the selector stripped (full input for fallbacks).
    pub input: &'a [u8],
    /// Gas available to the call.
    pub supplied_gas: u64,
    /// Whether the call runs in a static context.
    pub read_only: bool,
}

impl<'a> CallContext<'a> {
    /// Returns a copy of this context with different call data.
    pub const fn with_input(self, input: &'a [u8]) -> Self {
        Self { input, ..self }
    }
}

/// Successful call result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutput {
    /// Return data.
    pub output: Bytes,
    /// Gas left after the fixed cost was charged.
    pub remaining_gas: u64,
}

/// Result of running a stateful precompile.
pub type PrecompileResult = Result<CallOutput, CallFailure>;

/// Signature shared by function handlers and fallbacks.
pub type RunStatefulPrecompileFn =
    dyn Fn(&mut dyn AccessibleState, &CallContext<'_>) -> PrecompileResult + Send + Sync;

/// Whether a function may write persistent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMutability {
    /// Reads only; allowed in static calls.
    View,
    /// Writes state; rejected in static calls.
    NonPayable,
}

/// Deducts `cost` from `supplied_gas`.
///
/// Fails with [`PrecompileError::OutOfGas`] and zero remaining gas if the supply is short.
pub fn deduct_gas(supplied_gas: u64, cost: u64) -> Result<u64, CallFailure> {
    supplied_gas
        .checked_sub(cost)
        .ok_or_else(|| PrecompileError::OutOfGas.into())
}

/// Charges `gas_cost`, enforces write protection for `mutability`, then runs `body`.
///
/// Errors from `body` keep the remaining gas after the charge.
pub fn run_metered<F>(
    call: &CallContext<'_>,
    gas_cost: u64,
    mutability: StateMutability,
    body: F,
) -> PrecompileResult
where
    F: FnOnce() -> Result<Bytes, PrecompileError>,
{
    let remaining_gas = deduct_gas(call.supplied_gas, gas_cost)?;

    if mutability == StateMutability::NonPayable && call.read_only {
        tracing::warn!(
            target: "precompile_dispatch",
            caller = ?call.caller,
            address = ?call.address,
            "mutating call rejected in read-only context"
        );
        return Err(PrecompileError::WriteProtection.with_remaining_gas(remaining_gas));
    }

    match body() {
        Ok(output) => Ok(CallOutput {
            output,
            remaining_gas,
        }),
        Err(err) => Err(err.with_remaining_gas(remaining_gas)),
    }
}

/// A handler bound to its selector.
pub struct StatefulPrecompileFunction {
    selector: Selector,
    execute: Box<RunStatefulPrecompileFn>,
}

impl StatefulPrecompileFunction {
    /// Binds `execute` to `selector`.
    pub fn new<F>(selector: Selector, execute: F) -> Self
    where
        F: Fn(&mut dyn AccessibleState, &CallContext<'_>) -> PrecompileResult
            + Send
            + Sync
            + 'static,
    {
        Self {
            selector,
            execute: Box::new(execute),
        }
    }

    /// The selector this function answers to.
    pub const fn selector(&self) -> Selector {
        self.selector
    }
}

impl fmt::Debug for StatefulPrecompileFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatefulPrecompileFunction")
            .field("selector", &FixedBytes::from(self.selector))
            .finish_non_exhaustive()
    }
}

/// Dispatch table of one stateful precompile.
///
/// Holds no state of its own; a single table can serve any number of interleaved calls.
pub struct StatefulPrecompiledContract {
    fallback: Option<Box<RunStatefulPrecompileFn>>,
    functions: BTreeMap<Selector, StatefulPrecompileFunction>,
}

impl StatefulPrecompiledContract {
    /// Builds a dispatch table.
    ///
    /// Fails with [`PrecompileError::InvalidRegistration`] if two functions share a selector.
    pub fn new(
        fallback: Option<Box<RunStatefulPrecompileFn>>,
        functions: Vec<StatefulPrecompileFunction>,
    ) -> Result<Self, PrecompileError> {
        let mut table = BTreeMap::new();
        for function in functions {
            let selector = function.selector;
            if table.insert(selector, function).is_some() {
                return Err(PrecompileError::InvalidRegistration(format!(
                    "duplicate function selector {}",
                    FixedBytes::from(selector)
                )));
            }
        }
        Ok(Self {
            fallback,
            functions: table,
        })
    }

    /// Returns `true` if a function is registered for `selector`.
    pub fn contains(&self, selector: &Selector) -> bool {
        self.functions.contains_key(selector)
    }

    /// Registered selectors in ascending order.
    pub fn selectors(&self) -> impl Iterator<Item = &Selector> + '_ {
        self.functions.keys()
    }

    /// Returns `true` if unmatched calls are routed to a fallback.
    pub const fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Routes `call` to the handler for `selector`, else to the fallback.
    ///
    /// `call.input` must already have the selector stripped. Without a match or a fallback the
    /// call fails with [`PrecompileError::MethodNotFound`] and is not charged.
    pub fn dispatch(
        &self,
        selector: Selector,
        state: &mut dyn AccessibleState,
        call: &CallContext<'_>,
    ) -> PrecompileResult {
        if let Some(function) = self.functions.get(&selector) {
            tracing::debug!(
                target: "precompile_dispatch",
                selector = %FixedBytes::from(selector),
                caller = ?call.caller,
                "dispatching precompile function"
            );
            return (function.execute)(state, call);
        }

        if let Some(fallback) = &self.fallback {
            return fallback(state, call);
        }

        tracing::warn!(
            target: "precompile_dispatch",
            selector = %FixedBytes::from(selector),
            caller = ?call.caller,
            "no function registered for selector"
        );
        Err(PrecompileError::MethodNotFound {
            selector: FixedBytes::from(selector),
        }
        .with_remaining_gas(call.supplied_gas))
    }

    /// Splits the selector off `input` and executes the matching function.
    ///
    /// Inputs that are too short to hold a selector, or whose selector is unknown, are passed
    /// whole to the fallback if there is one.
    pub fn run(
        &self,
        state: &mut dyn AccessibleState,
        caller: Address,
        address: Address,
        input: &[u8],
        supplied_gas: u64,
        read_only: bool,
    ) -> PrecompileResult {
        let call = CallContext {
            caller,
            address,
            input,
            supplied_gas,
            read_only,
        };

        match input.split_first_chunk::<SELECTOR_LEN>() {
            Some((selector, args)) if self.contains(selector) => {
                self.dispatch(*selector, state, &call.with_input(args))
            }
            Some((selector, _)) => {
                if let Some(fallback) = &self.fallback {
                    return fallback(state, &call);
                }
                self.dispatch(*selector, state, &call)
            }
            None => {
                if let Some(fallback) = &self.fallback {
                    return fallback(state, &call);
                }
                Err(PrecompileError::Malformed(format!(
                    "missing function selector to precompile - input length ({})",
                    input.len()
                ))
                .with_remaining_gas(supplied_gas))
            }
        }
    }
}

impl fmt::Debug for StatefulPrecompiledContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatefulPrecompiledContract")
            .field("functions", &self.functions.values().collect::<Vec<_>>())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}
