//! Dynamic fee configuration record.
//!
//! The record has exactly [`FEE_CONFIG_FIELD_COUNT`] fields in a fixed order. The order is part of
//! the on-chain storage layout of the fee manager precompile, so fields may only ever be
//! appended together with a new slot layout.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of fields in a [`FeeConfig`].
pub const FEE_CONFIG_FIELD_COUNT: usize = 8;

/// One field of a [`FeeConfig`], in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeeConfigField {
    /// Block gas limit.
    GasLimit,
    /// Target seconds between blocks.
    TargetBlockRate,
    /// Floor of the base fee.
    MinBaseFee,
    /// Gas targeted per rolling window.
    TargetGas,
    /// Divisor bounding how fast the base fee moves.
    BaseFeeChangeDenominator,
    /// Lower bound of the block gas cost.
    MinBlockGasCost,
    /// Upper bound of the block gas cost.
    MaxBlockGasCost,
    /// Block gas cost change per second of deviation from the target rate.
    BlockGasCostStep,
}

impl FeeConfigField {
    /// All fields in storage order.
    pub const ALL: [Self; FEE_CONFIG_FIELD_COUNT] = [
        Self::GasLimit,
        Self::TargetBlockRate,
        Self::MinBaseFee,
        Self::TargetGas,
        Self::BaseFeeChangeDenominator,
        Self::MinBlockGasCost,
        Self::MaxBlockGasCost,
        Self::BlockGasCostStep,
    ];

    /// One-based position of the field. Doubles as its storage slot tag.
    pub const fn index(self) -> u8 {
        match self {
            Self::GasLimit => 1,
            Self::TargetBlockRate => 2,
            Self::MinBaseFee => 3,
            Self::TargetGas => 4,
            Self::BaseFeeChangeDenominator => 5,
            Self::MinBlockGasCost => 6,
            Self::MaxBlockGasCost => 7,
            Self::BlockGasCostStep => 8,
        }
    }

    /// Field name as it appears in chain configuration JSON.
    pub const fn name(self) -> &'static str {
        match self {
            Self::GasLimit => "gasLimit",
            Self::TargetBlockRate => "targetBlockRate",
            Self::MinBaseFee => "minBaseFee",
            Self::TargetGas => "targetGas",
            Self::BaseFeeChangeDenominator => "baseFeeChangeDenominator",
            Self::MinBlockGasCost => "minBlockGasCost",
            Self::MaxBlockGasCost => "maxBlockGasCost",
            Self::BlockGasCostStep => "blockGasCostStep",
        }
    }
}

/// Errors produced when a fee record is assembled or validated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeeConfigError {
    /// A field that must be strictly positive is zero.
    #[error("{field} = {value} cannot be less than or equal to 0", field = .0.name(), value = .1)]
    NotPositive(FeeConfigField, U256),
    /// `minBlockGasCost` exceeds `maxBlockGasCost`.
    #[error("minBlockGasCost = {min} cannot be greater than maxBlockGasCost = {max}")]
    BlockGasCostRange {
        /// Configured minimum.
        min: U256,
        /// Configured maximum.
        max: U256,
    },
    /// A field exceeds the 64-bit range it is consumed as.
    #[error("{field} = {value} is not a valid uint64", field = .0.name(), value = .1)]
    NotUint64(FeeConfigField, U256),
    /// A field violates a chain-specific bound.
    #[error("{name} = {value} violates chain policy: {reason}", name = .field.name())]
    OutOfPolicy {
        /// Offending field.
        field: FeeConfigField,
        /// Offending value.
        value: U256,
        /// Human readable bound description.
        reason: String,
    },
}

/// Parameters of the dynamic fee algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeConfig {
    /// Block gas limit.
    pub gas_limit: U256,
    /// Target seconds between blocks.
    pub target_block_rate: u64,
    /// Floor of the base fee in wei.
    pub min_base_fee: U256,
    /// Gas targeted per rolling window.
    pub target_gas: U256,
    /// Divisor bounding how fast the base fee moves.
    pub base_fee_change_denominator: U256,
    /// Lower bound of the block gas cost.
    pub min_block_gas_cost: U256,
    /// Upper bound of the block gas cost.
    pub max_block_gas_cost: U256,
    /// Block gas cost change per second of deviation from the target rate.
    pub block_gas_cost_step: U256,
}

impl Default for FeeConfig {
    /// The fee configuration used by chains that do not specify their own.
    fn default() -> Self {
        Self {
            gas_limit: U256::from(8_000_000u64),
            target_block_rate: 2,
            min_base_fee: U256::from(25_000_000_000u64),
            target_gas: U256::from(15_000_000u64),
            base_fee_change_denominator: U256::from(36u64),
            min_block_gas_cost: U256::ZERO,
            max_block_gas_cost: U256::from(1_000_000u64),
            block_gas_cost_step: U256::from(200_000u64),
        }
    }
}

impl FeeConfig {
    /// Returns the value of `field` widened to a 256-bit word.
    pub fn get(&self, field: FeeConfigField) -> U256 {
        match field {
            FeeConfigField::GasLimit => self.gas_limit,
            FeeConfigField::TargetBlockRate => U256::from(self.target_block_rate),
            FeeConfigField::MinBaseFee => self.min_base_fee,
            FeeConfigField::TargetGas => self.target_gas,
            FeeConfigField::BaseFeeChangeDenominator => self.base_fee_change_denominator,
            FeeConfigField::MinBlockGasCost => self.min_block_gas_cost,
            FeeConfigField::MaxBlockGasCost => self.max_block_gas_cost,
            FeeConfigField::BlockGasCostStep => self.block_gas_cost_step,
        }
    }

    /// Sets `field` from a 256-bit word.
    ///
    /// Fails with [`FeeConfigError::NotUint64`] if `targetBlockRate` does not fit in 64 bits.
    pub fn set(&mut self, field: FeeConfigField, value: U256) -> Result<(), FeeConfigError> {
        match field {
            FeeConfigField::GasLimit => self.gas_limit = value,
            FeeConfigField::TargetBlockRate => {
                self.target_block_rate = u64::try_from(value)
                    .map_err(|_| FeeConfigError::NotUint64(field, value))?;
            }
            FeeConfigField::MinBaseFee => self.min_base_fee = value,
            FeeConfigField::TargetGas => self.target_gas = value,
            FeeConfigField::BaseFeeChangeDenominator => self.base_fee_change_denominator = value,
            FeeConfigField::MinBlockGasCost => self.min_block_gas_cost = value,
            FeeConfigField::MaxBlockGasCost => self.max_block_gas_cost = value,
            FeeConfigField::BlockGasCostStep => self.block_gas_cost_step = value,
        }
        Ok(())
    }

    /// Builds a record from one word per field in storage order.
    pub fn from_words(words: [U256; FEE_CONFIG_FIELD_COUNT]) -> Result<Self, FeeConfigError> {
        let mut config = Self::zeroed();
        for (field, word) in FeeConfigField::ALL.into_iter().zip(words) {
            config.set(field, word)?;
        }
        Ok(config)
    }

    /// Returns one word per field in storage order.
    pub fn to_words(&self) -> [U256; FEE_CONFIG_FIELD_COUNT] {
        FeeConfigField::ALL.map(|field| self.get(field))
    }

    /// A record with every field set to zero. Not a valid configuration.
    pub const fn zeroed() -> Self {
        Self {
            gas_limit: U256::ZERO,
            target_block_rate: 0,
            min_base_fee: U256::ZERO,
            target_gas: U256::ZERO,
            base_fee_change_denominator: U256::ZERO,
            min_block_gas_cost: U256::ZERO,
            max_block_gas_cost: U256::ZERO,
            block_gas_cost_step: U256::ZERO,
        }
    }
}

/// Validation rules a fee record must satisfy before it is stored.
///
/// Concrete numeric bounds are chain policy; the fee manager only guarantees that the same
/// policy is consulted when a schedule is verified, when it activates, and on every
/// `setFeeConfig` call.
pub trait FeeConfigPolicy: std::fmt::Debug + Send + Sync {
    /// Returns an error describing the first rule `config` violates.
    fn verify(&self, config: &FeeConfig) -> Result<(), FeeConfigError>;
}

/// Structural checks every chain applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultFeeConfigPolicy;

impl FeeConfigPolicy for DefaultFeeConfigPolicy {
    fn verify(&self, config: &FeeConfig) -> Result<(), FeeConfigError> {
        for field in [
            FeeConfigField::GasLimit,
            FeeConfigField::TargetGas,
            FeeConfigField::BaseFeeChangeDenominator,
        ] {
            let value = config.get(field);
            if value.is_zero() {
                return Err(FeeConfigError::NotPositive(field, value));
            }
        }

        if config.min_block_gas_cost > config.max_block_gas_cost {
            return Err(FeeConfigError::BlockGasCostRange {
                min: config.min_block_gas_cost,
                max: config.max_block_gas_cost,
            });
        }

        if u64::try_from(config.max_block_gas_cost).is_err() {
            return Err(FeeConfigError::NotUint64(
                FeeConfigField::MaxBlockGasCost,
                config.max_block_gas_cost,
            ));
        }

        Ok(())
    }
}
