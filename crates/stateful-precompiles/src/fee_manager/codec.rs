//! Fixed-width packing of [`FeeConfig`] records.
//!
//! ## Storage Layout
//!
//! | Slot | Description |
//! |------|-------------|
//! | `0x01 00..00` .. `0x08 00..00` | Fee config fields in storage order |
//! | `"lca" 00..00` | Block number of the last fee config change |
//!
//! Every key has a non-zero first byte, so none can collide with an allow list role slot.

use super::IFeeManager;
use crate::{error::PrecompileError, state::StateDB};
use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolCall;
use ev_common::{FeeConfig, FeeConfigField, FEE_CONFIG_FIELD_COUNT};

const WORD_LEN: usize = 32;

/// Length of a packed fee config.
pub const FEE_CONFIG_INPUT_LEN: usize = FEE_CONFIG_FIELD_COUNT * WORD_LEN;

/// Slot holding the block number of the last fee config change.
pub const LAST_CHANGED_AT_KEY: B256 = {
    let mut key = [0u8; WORD_LEN];
    key[0] = b'l';
    key[1] = b'c';
    key[2] = b'a';
    B256::new(key)
};

/// Slot holding `field`.
pub const fn fee_config_slot(field: FeeConfigField) -> B256 {
    let mut key = [0u8; WORD_LEN];
    key[0] = field.index();
    B256::new(key)
}

/// Packs `config` as one big-endian word per field.
pub fn pack_fee_config(config: &FeeConfig) -> Vec<u8> {
    let mut output = Vec::with_capacity(FEE_CONFIG_INPUT_LEN);
    for word in config.to_words() {
        output.extend_from_slice(&word.to_be_bytes::<WORD_LEN>());
    }
    output
}

/// Decodes the arguments of `setFeeConfig`.
///
/// The input must be exactly [`FEE_CONFIG_INPUT_LEN`] bytes and `targetBlockRate` must fit in
/// 64 bits; either failure is [`PrecompileError::Malformed`].
pub fn unpack_fee_config_input(input: &[u8]) -> Result<FeeConfig, PrecompileError> {
    if input.len() != FEE_CONFIG_INPUT_LEN {
        return Err(PrecompileError::Malformed(format!(
            "invalid input length for fee config input: {}",
            input.len()
        )));
    }
    let mut words = [U256::ZERO; FEE_CONFIG_FIELD_COUNT];
    for (word, chunk) in words.iter_mut().zip(input.chunks_exact(WORD_LEN)) {
        *word = U256::from_be_slice(chunk);
    }
    FeeConfig::from_words(words).map_err(|err| PrecompileError::Malformed(err.to_string()))
}

/// Call data for `setFeeConfig(config)`.
pub fn pack_set_fee_config_input(config: &FeeConfig) -> Vec<u8> {
    let mut input = Vec::with_capacity(4 + FEE_CONFIG_INPUT_LEN);
    input.extend_from_slice(&IFeeManager::setFeeConfigCall::SELECTOR);
    input.extend_from_slice(&pack_fee_config(config));
    input
}

/// Call data for `getFeeConfig()`.
pub fn pack_get_fee_config_input() -> Vec<u8> {
    IFeeManager::getFeeConfigCall::SELECTOR.to_vec()
}

/// Call data for `getFeeConfigLastChangedAt()`.
pub fn pack_get_last_changed_at_input() -> Vec<u8> {
    IFeeManager::getFeeConfigLastChangedAtCall::SELECTOR.to_vec()
}

/// Writes every field of `config` to its slot in the storage of `address`.
///
/// Does not touch the last-changed-at slot.
pub(crate) fn write_fee_config(
    state: &mut dyn StateDB,
    address: Address,
    config: &FeeConfig,
) -> Result<(), PrecompileError> {
    for field in FeeConfigField::ALL {
        let word = B256::from(config.get(field));
        state.set_state(address, fee_config_slot(field), word)?;
    }
    Ok(())
}

/// Reads every field from the storage of `address`.
///
/// A stored `targetBlockRate` beyond 64 bits can only come from a write that bypassed
/// validation and is reported as an invariant violation.
pub(crate) fn read_fee_config(
    state: &mut dyn StateDB,
    address: Address,
) -> Result<FeeConfig, PrecompileError> {
    let mut words = [U256::ZERO; FEE_CONFIG_FIELD_COUNT];
    for (word, field) in words.iter_mut().zip(FeeConfigField::ALL) {
        *word = state.get_state(address, fee_config_slot(field))?.into();
    }
    FeeConfig::from_words(words)
        .map_err(|err| PrecompileError::InvariantViolation(format!("stored fee config: {err}")))
}
