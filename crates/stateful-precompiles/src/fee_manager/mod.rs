//! Fee configuration manager precompile.
//!
//! Holds the chain's dynamic fee parameters in its own storage and lets allow-listed accounts
//! replace them at runtime. Every change records the block number it happened at.
//!
//! ## Interface
//!
//! ```solidity
//! interface IFeeManager is IAllowList {
//!     function setFeeConfig(
//!         uint256 gasLimit, uint256 targetBlockRate, uint256 minBaseFee, uint256 targetGas,
//!         uint256 baseFeeChangeDenominator, uint256 minBlockGasCost, uint256 maxBlockGasCost,
//!         uint256 blockGasCostStep
//!     ) external;
//!     function getFeeConfig() external view returns (...);
//!     function getFeeConfigLastChangedAt() external view returns (uint256 blockNumber);
//! }
//! ```
//!
//! `setFeeConfig` requires the caller to hold at least the enabled role. The allow list itself is
//! managed through the [`crate::allow_list`] functions registered on the same address.

mod codec;
mod config;

pub use codec::{
    fee_config_slot, pack_fee_config, pack_get_fee_config_input, pack_get_last_changed_at_input,
    pack_set_fee_config_input, unpack_fee_config_input, FEE_CONFIG_INPUT_LEN, LAST_CHANGED_AT_KEY,
};
pub use config::{parse_fee_manager_config, ConfigError, FeeManagerConfig};

use crate::{
    allow_list::{
        create_allow_list_functions, get_role, require_enabled, set_role, Role,
        READ_GAS_COST_PER_SLOT, WRITE_GAS_COST_PER_SLOT,
    },
    contract::{
        run_metered, CallContext, PrecompileResult, StateMutability, StatefulPrecompileFunction,
        StatefulPrecompiledContract,
    },
    error::PrecompileError,
    state::{AccessibleState, StateDB},
};
use alloy_primitives::{address, Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall};
use ev_common::{FeeConfig, FeeConfigPolicy, FEE_CONFIG_FIELD_COUNT};
use std::sync::Arc;

sol! {
    /// Fee manager entry points. Field order matches the storage layout.
    interface IFeeManager {
        function setFeeConfig(
            uint256 gasLimit,
            uint256 targetBlockRate,
            uint256 minBaseFee,
            uint256 targetGas,
            uint256 baseFeeChangeDenominator,
            uint256 minBlockGasCost,
            uint256 maxBlockGasCost,
            uint256 blockGasCostStep
        ) external;

        function getFeeConfig() external view returns (
            uint256 gasLimit,
            uint256 targetBlockRate,
            uint256 minBaseFee,
            uint256 targetGas,
            uint256 baseFeeChangeDenominator,
            uint256 minBlockGasCost,
            uint256 maxBlockGasCost,
            uint256 blockGasCostStep
        );

        function getFeeConfigLastChangedAt() external view returns (uint256 blockNumber);
    }
}

/// Address of the fee manager precompile.
pub const FEE_MANAGER_ADDRESS: Address = address!("0x0200000000000000000000000000000000000003");

/// Gas charged by `setFeeConfig`: every field plus the last-changed-at slot.
pub const SET_FEE_CONFIG_GAS_COST: u64 =
    WRITE_GAS_COST_PER_SLOT * (FEE_CONFIG_FIELD_COUNT as u64 + 1);

/// Gas charged by `getFeeConfig`.
pub const GET_FEE_CONFIG_GAS_COST: u64 = READ_GAS_COST_PER_SLOT * FEE_CONFIG_FIELD_COUNT as u64;

/// Gas charged by `getFeeConfigLastChangedAt`.
pub const GET_LAST_CHANGED_AT_GAS_COST: u64 = READ_GAS_COST_PER_SLOT;

const NON_ENABLED_REASON: &str = "non-enabled cannot change fee config";

/// Role of `address` in the fee manager allow list.
pub fn get_fee_manager_status(
    state: &mut dyn StateDB,
    address: Address,
) -> Result<Role, PrecompileError> {
    get_role(state, FEE_MANAGER_ADDRESS, address)
}

/// Sets the role of `address` in the fee manager allow list without a permission check.
pub fn set_fee_manager_status(
    state: &mut dyn StateDB,
    address: Address,
    role: Role,
) -> Result<(), PrecompileError> {
    set_role(state, FEE_MANAGER_ADDRESS, address, role)
}

/// Fee configuration currently stored by the fee manager.
pub fn get_stored_fee_config(state: &mut dyn StateDB) -> Result<FeeConfig, PrecompileError> {
    codec::read_fee_config(state, FEE_MANAGER_ADDRESS)
}

/// Block number of the last fee config change, zero if it was never set.
pub fn get_fee_config_last_changed_at(state: &mut dyn StateDB) -> Result<U256, PrecompileError> {
    let word = state.get_state(FEE_MANAGER_ADDRESS, LAST_CHANGED_AT_KEY)?;
    Ok(word.into())
}

/// Validates `config` against `policy` and stores it with the current block number.
///
/// All checks run before the first write: a rejected config or a missing block number leaves
/// storage untouched.
pub fn store_fee_config(
    state: &mut dyn AccessibleState,
    policy: &dyn FeeConfigPolicy,
    config: &FeeConfig,
) -> Result<(), PrecompileError> {
    policy
        .verify(config)
        .map_err(|err| PrecompileError::Malformed(format!("invalid fee config: {err}")))?;
    let block_number = state
        .block_context()
        .number()
        .ok_or(PrecompileError::MissingBlockNumber)?;

    let db = state.state_db();
    codec::write_fee_config(db, FEE_MANAGER_ADDRESS, config)?;
    db.set_state(
        FEE_MANAGER_ADDRESS,
        LAST_CHANGED_AT_KEY,
        B256::from(block_number),
    )?;

    tracing::info!(
        target: "fee_manager",
        %block_number,
        gas_limit = %config.gas_limit,
        min_base_fee = %config.min_base_fee,
        target_block_rate = config.target_block_rate,
        "fee config stored"
    );
    Ok(())
}

fn set_fee_config(
    policy: Arc<dyn FeeConfigPolicy>,
) -> impl Fn(&mut dyn AccessibleState, &CallContext<'_>) -> PrecompileResult + Send + Sync + 'static
{
    move |state: &mut dyn AccessibleState, call: &CallContext<'_>| {
        run_metered(
            call,
            SET_FEE_CONFIG_GAS_COST,
            StateMutability::NonPayable,
            || {
                require_enabled(
                    state.state_db(),
                    FEE_MANAGER_ADDRESS,
                    call.caller,
                    NON_ENABLED_REASON,
                )?;
                let config = unpack_fee_config_input(call.input)?;
                store_fee_config(state, policy.as_ref(), &config)?;
                tracing::info!(target: "fee_manager", caller = ?call.caller, "fee config changed");
                Ok(Bytes::new())
            },
        )
    }
}

fn get_fee_config(state: &mut dyn AccessibleState, call: &CallContext<'_>) -> PrecompileResult {
    run_metered(call, GET_FEE_CONFIG_GAS_COST, StateMutability::View, || {
        let config = get_stored_fee_config(state.state_db())?;
        Ok(pack_fee_config(&config).into())
    })
}

fn get_fee_config_last_changed_at_handler(
    state: &mut dyn AccessibleState,
    call: &CallContext<'_>,
) -> PrecompileResult {
    run_metered(
        call,
        GET_LAST_CHANGED_AT_GAS_COST,
        StateMutability::View,
        || {
            let block_number = get_fee_config_last_changed_at(state.state_db())?;
            Ok(Bytes::copy_from_slice(&block_number.to_be_bytes::<32>()))
        },
    )
}

/// Builds the fee manager dispatch table: the three fee functions plus the allow list functions.
///
/// `setFeeConfig` validates every record against `policy`.
pub fn create_fee_manager_contract(
    policy: Arc<dyn FeeConfigPolicy>,
) -> Result<StatefulPrecompiledContract, PrecompileError> {
    let mut functions = create_allow_list_functions(FEE_MANAGER_ADDRESS);
    functions.push(StatefulPrecompileFunction::new(
        IFeeManager::setFeeConfigCall::SELECTOR,
        set_fee_config(policy),
    ));
    functions.push(StatefulPrecompileFunction::new(
        IFeeManager::getFeeConfigCall::SELECTOR,
        get_fee_config,
    ));
    functions.push(StatefulPrecompileFunction::new(
        IFeeManager::getFeeConfigLastChangedAtCall::SELECTOR,
        get_fee_config_last_changed_at_handler,
    ));
    StatefulPrecompiledContract::new(None, functions)
}
