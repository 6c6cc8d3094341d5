//! Host capabilities consumed by stateful precompiles.
//!
//! A precompile never caches persistent values across calls: every handler re-reads through
//! [`StateDB`], so results stay consistent with whatever ran before it in the block.

use crate::error::PrecompileError;
use alloy_primitives::{Address, B256, U256};
use std::collections::BTreeMap;

/// Word-addressed persistent storage keyed by `(contract, slot)`.
///
/// Reads take `&mut self` because EVM journals track warm/cold slot access on load.
pub trait StateDB {
    /// Returns the word at `key` in the storage of `address`; unset slots read as zero.
    fn get_state(&mut self, address: Address, key: B256) -> Result<B256, PrecompileError>;

    /// Writes `value` at `key` in the storage of `address`.
    fn set_state(
        &mut self,
        address: Address,
        key: B256,
        value: B256,
    ) -> Result<(), PrecompileError>;
}

/// Read access to the block being executed.
pub trait BlockContext {
    /// Current block number, if the host can provide one.
    fn number(&self) -> Option<U256>;
}

/// Everything a precompile handler may touch during one call.
pub trait AccessibleState {
    /// Persistent storage.
    fn state_db(&mut self) -> &mut dyn StateDB;

    /// Block environment.
    fn block_context(&self) -> &dyn BlockContext;
}

/// Deterministic in-memory host state.
///
/// Zero words are not stored, matching EVM storage semantics where writing zero clears a slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryState {
    storage: BTreeMap<(Address, B256), B256>,
    block_number: Option<U256>,
}

impl MemoryState {
    /// Creates empty state with no block number.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates empty state positioned at `block_number`.
    pub fn at_block(block_number: u64) -> Self {
        Self {
            storage: BTreeMap::new(),
            block_number: Some(U256::from(block_number)),
        }
    }

    /// Moves the block context to `block_number`, or clears it with `None`.
    pub fn set_block_number(&mut self, block_number: Option<u64>) {
        self.block_number = block_number.map(U256::from);
    }

    /// Number of non-zero slots across all contracts.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Returns `true` if no slot holds a non-zero word.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Iterates the non-zero slots of `address` in key order.
    pub fn slots(&self, address: Address) -> impl Iterator<Item = (&B256, &B256)> + '_ {
        self.storage
            .iter()
            .filter(move |((owner, _), _)| *owner == address)
            .map(|((_, key), value)| (key, value))
    }
}

impl StateDB for MemoryState {
    fn get_state(&mut self, address: Address, key: B256) -> Result<B256, PrecompileError> {
        Ok(self
            .storage
            .get(&(address, key))
            .copied()
            .unwrap_or(B256::ZERO))
    }

    fn set_state(
        &mut self,
        address: Address,
        key: B256,
        value: B256,
    ) -> Result<(), PrecompileError> {
        if value.is_zero() {
            self.storage.remove(&(address, key));
        } else {
            self.storage.insert((address, key), value);
        }
        Ok(())
    }
}

impl BlockContext for MemoryState {
    fn number(&self) -> Option<U256> {
        self.block_number
    }
}

impl AccessibleState for MemoryState {
    fn state_db(&mut self) -> &mut dyn StateDB {
        self
    }

    fn block_context(&self) -> &dyn BlockContext {
        self
    }
}
