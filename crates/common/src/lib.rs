//! Common types shared by the ev stateful precompiles.

pub mod fee_config;

pub use fee_config::{
    DefaultFeeConfigPolicy, FeeConfig, FeeConfigError, FeeConfigField, FeeConfigPolicy,
    FEE_CONFIG_FIELD_COUNT,
};
