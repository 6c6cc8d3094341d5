//! Host-owned table of installed stateful precompiles.

use crate::{
    contract::{PrecompileResult, StatefulPrecompiledContract},
    error::PrecompileError,
    state::AccessibleState,
    upgrade::{ChainConfig, StatefulPrecompileConfig},
};
use alloy_primitives::Address;
use std::{collections::BTreeMap, sync::Arc};

/// Dispatch tables by contract address.
///
/// Built by the host at startup and passed to every call. Iteration follows address order.
#[derive(Debug, Default, Clone)]
pub struct PrecompileRegistry {
    contracts: BTreeMap<Address, Arc<StatefulPrecompiledContract>>,
}

impl PrecompileRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `contract` at `address`.
    ///
    /// Fails with [`PrecompileError::InvalidRegistration`] if the address is taken.
    pub fn register(
        &mut self,
        address: Address,
        contract: Arc<StatefulPrecompiledContract>,
    ) -> Result<(), PrecompileError> {
        if self.contracts.contains_key(&address) {
            return Err(PrecompileError::InvalidRegistration(format!(
                "precompile already registered at {address}"
            )));
        }
        self.contracts.insert(address, contract);
        tracing::debug!(target: "precompile_dispatch", ?address, "precompile registered");
        Ok(())
    }

    /// Installs the contract described by `config` at its address.
    pub fn register_config(
        &mut self,
        config: &dyn StatefulPrecompileConfig,
        chain: &dyn ChainConfig,
    ) -> Result<(), PrecompileError> {
        let contract = config.contract(chain)?;
        self.register(config.address(), contract)
    }

    /// Removes the contract at `address`, returning it if present.
    pub fn deregister(&mut self, address: &Address) -> Option<Arc<StatefulPrecompiledContract>> {
        self.contracts.remove(address)
    }

    /// Dispatch table at `address`.
    pub fn get(&self, address: &Address) -> Option<&Arc<StatefulPrecompiledContract>> {
        self.contracts.get(address)
    }

    /// Returns `true` if a contract is installed at `address`.
    pub fn contains(&self, address: &Address) -> bool {
        self.contracts.contains_key(address)
    }

    /// Installed addresses in ascending order.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> + '_ {
        self.contracts.keys()
    }

    /// Runs the contract at `address`; `None` if nothing is installed there.
    pub fn run(
        &self,
        address: Address,
        state: &mut dyn AccessibleState,
        caller: Address,
        input: &[u8],
        supplied_gas: u64,
        read_only: bool,
    ) -> Option<PrecompileResult> {
        let contract = self.contracts.get(&address)?;
        Some(contract.run(state, caller, address, input, supplied_gas, read_only))
    }
}
