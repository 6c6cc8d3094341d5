use super::{store_fee_config, FEE_MANAGER_ADDRESS};
use crate::{
    allow_list::AllowListConfig,
    contract::StatefulPrecompiledContract,
    error::PrecompileError,
    state::AccessibleState,
    upgrade::{ChainConfig, StatefulPrecompileConfig, UpgradeableConfig},
};
use alloy_primitives::Address;
use ev_common::FeeConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{any::Any, fmt, sync::Arc};
use thiserror::Error;

/// Errors returned by [`parse_fee_manager_config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The extras carry no `feeManagerConfig` entry.
    #[error("missing feeManagerConfig in chainspec extras")]
    Missing,
    /// The entry exists but does not deserialize.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Schedule entry for the fee manager precompile.
///
/// Serialized with camelCase keys:
/// ```json
/// {
///   "blockTimestamp": 100,
///   "adminAddresses": ["0x00000000000000000000000000000000000000a1"],
///   "enabledAddresses": ["0x00000000000000000000000000000000000000b1"],
///   "initialFeeConfig": { "gasLimit": "0x7a1200", "targetBlockRate": 2, "...": "..." }
/// }
/// ```
/// A disable entry is `{ "blockTimestamp": 200, "disable": true }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeManagerConfig {
    /// Activation point.
    #[serde(flatten)]
    pub upgrade: UpgradeableConfig,
    /// Roles seeded on activation.
    #[serde(flatten)]
    pub allow_list: AllowListConfig,
    /// Fee config written on activation. The chain default is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_fee_config: Option<FeeConfig>,
}

impl FeeManagerConfig {
    /// Enables the fee manager at `block_timestamp`.
    pub const fn new(
        block_timestamp: u64,
        admins: Vec<Address>,
        enableds: Vec<Address>,
        initial_fee_config: Option<FeeConfig>,
    ) -> Self {
        Self {
            upgrade: UpgradeableConfig::enable_at(block_timestamp),
            allow_list: AllowListConfig::new(admins, enableds),
            initial_fee_config,
        }
    }

    /// Disables the fee manager at `block_timestamp`.
    pub const fn new_disable(block_timestamp: u64) -> Self {
        Self {
            upgrade: UpgradeableConfig::disable_at(block_timestamp),
            allow_list: AllowListConfig::new(Vec::new(), Vec::new()),
            initial_fee_config: None,
        }
    }

    /// Fee config that activation will store.
    fn effective_fee_config(&self, chain: &dyn ChainConfig) -> FeeConfig {
        self.initial_fee_config.unwrap_or_else(|| chain.fee_config())
    }
}

impl fmt::Display for FeeManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl StatefulPrecompileConfig for FeeManagerConfig {
    fn address(&self) -> Address {
        FEE_MANAGER_ADDRESS
    }

    fn timestamp(&self) -> u64 {
        self.upgrade.block_timestamp
    }

    fn is_disabled(&self) -> bool {
        self.upgrade.disable
    }

    fn equal(&self, other: &dyn StatefulPrecompileConfig) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self == other)
    }

    fn verify(&self, chain: &dyn ChainConfig) -> Result<(), PrecompileError> {
        self.allow_list.verify()?;
        if self.is_disabled() {
            return Ok(());
        }
        chain
            .fee_config_policy()
            .verify(&self.effective_fee_config(chain))
            .map_err(|err| PrecompileError::InvalidConfig(format!("invalid fee config: {err}")))
    }

    fn configure(
        &self,
        chain: &dyn ChainConfig,
        state: &mut dyn AccessibleState,
    ) -> Result<(), PrecompileError> {
        if self.is_disabled() {
            tracing::debug!(target: "fee_manager", "disable entry has nothing to configure");
            return Ok(());
        }
        self.allow_list.verify()?;

        let fee_config = self.effective_fee_config(chain);
        let policy = chain.fee_config_policy();
        store_fee_config(state, policy.as_ref(), &fee_config).map_err(|err| {
            if err.is_fatal() {
                err
            } else {
                tracing::error!(
                    target: "fee_manager",
                    %err,
                    "verified fee config rejected during activation"
                );
                PrecompileError::InvariantViolation(format!(
                    "fee config rejected after verification: {err}"
                ))
            }
        })?;

        self.allow_list.configure(state.state_db(), FEE_MANAGER_ADDRESS)
    }

    fn contract(
        &self,
        chain: &dyn ChainConfig,
    ) -> Result<Arc<StatefulPrecompiledContract>, PrecompileError> {
        super::create_fee_manager_contract(chain.fee_config_policy()).map(Arc::new)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Reads `feeManagerConfig` from a chainspec/extras JSON blob.
///
/// Expected shape (example):
/// {
///   "feeManagerConfig": {
///     "blockTimestamp": 0,
///     "adminAddresses": ["0x00000000000000000000000000000000000000a1"]
///   }
/// }
pub fn parse_fee_manager_config(extras: &Value) -> Result<FeeManagerConfig, ConfigError> {
    let raw = extras.get("feeManagerConfig").ok_or(ConfigError::Missing)?;
    serde_json::from_value::<FeeManagerConfig>(raw.clone())
        .map_err(|e| ConfigError::Invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        allow_list::Role,
        fee_manager::{
            get_fee_config_last_changed_at, get_fee_manager_status, get_stored_fee_config,
        },
        state::MemoryState,
        upgrade::DefaultChainConfig,
    };
    use alloy_primitives::{address, U256};
    use ev_common::{FeeConfigError, FeeConfigField, FeeConfigPolicy};
    use serde_json::json;

    const ADMIN: Address = address!("0x00000000000000000000000000000000000000a1");
    const ENABLED: Address = address!("0x00000000000000000000000000000000000000b1");

    /// Caps the gas limit, standing in for a chain-specific policy.
    #[derive(Debug)]
    struct GasLimitCap(U256);

    impl FeeConfigPolicy for GasLimitCap {
        fn verify(&self, config: &FeeConfig) -> Result<(), FeeConfigError> {
            if config.gas_limit > self.0 {
                return Err(FeeConfigError::OutOfPolicy {
                    field: FeeConfigField::GasLimit,
                    value: config.gas_limit,
                    reason: format!("above cap {}", self.0),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn configure_stores_chain_default_and_seeds_roles() {
        let chain = DefaultChainConfig::default();
        let config = FeeManagerConfig::new(0, vec![ADMIN], vec![ENABLED], None);
        let mut state = MemoryState::at_block(0);

        config.verify(&chain).expect("config verifies");
        config.configure(&chain, &mut state).expect("config applies");

        assert_eq!(get_fee_manager_status(&mut state, ADMIN), Ok(Role::Admin));
        assert_eq!(get_fee_manager_status(&mut state, ENABLED), Ok(Role::Enabled));
        assert_eq!(get_stored_fee_config(&mut state), Ok(FeeConfig::default()));
        assert_eq!(get_fee_config_last_changed_at(&mut state), Ok(U256::ZERO));
    }

    #[test]
    fn configure_prefers_initial_fee_config() {
        let chain = DefaultChainConfig::default();
        let initial = FeeConfig {
            target_block_rate: 5,
            ..FeeConfig::default()
        };
        let config = FeeManagerConfig::new(0, vec![ADMIN], Vec::new(), Some(initial));
        let mut state = MemoryState::at_block(3);

        config.configure(&chain, &mut state).expect("config applies");
        assert_eq!(get_stored_fee_config(&mut state), Ok(initial));
        assert_eq!(get_fee_config_last_changed_at(&mut state), Ok(U256::from(3u64)));
    }

    #[test]
    fn overlapping_roles_fail_verify_and_configure_without_writes() {
        let chain = DefaultChainConfig::default();
        let config = FeeManagerConfig::new(0, vec![ADMIN], vec![ADMIN], None);
        let mut state = MemoryState::at_block(0);

        assert!(matches!(
            config.verify(&chain),
            Err(PrecompileError::InvalidConfig(_))
        ));
        assert!(config.configure(&chain, &mut state).is_err());
        assert!(state.is_empty());
    }

    #[test]
    fn verify_consults_chain_policy() {
        let chain = DefaultChainConfig::default()
            .with_policy(Arc::new(GasLimitCap(U256::from(10_000_000u64))));
        let within = FeeManagerConfig::new(0, vec![ADMIN], Vec::new(), None);
        let above = FeeManagerConfig::new(
            0,
            vec![ADMIN],
            Vec::new(),
            Some(FeeConfig {
                gas_limit: U256::from(30_000_000u64),
                ..FeeConfig::default()
            }),
        );

        within.verify(&chain).expect("default gas limit is under the cap");
        match above.verify(&chain) {
            Err(PrecompileError::InvalidConfig(message)) => assert!(message.contains("gasLimit")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn unverified_policy_violation_at_activation_is_fatal() {
        let chain = DefaultChainConfig::default()
            .with_policy(Arc::new(GasLimitCap(U256::from(1u64))));
        let config = FeeManagerConfig::new(0, vec![ADMIN], Vec::new(), None);
        let mut state = MemoryState::at_block(0);

        let err = config
            .configure(&chain, &mut state)
            .expect_err("chain default exceeds cap");
        assert!(matches!(err, PrecompileError::InvariantViolation(_)));
        assert!(err.is_fatal());
        assert!(state.is_empty());
    }

    #[test]
    fn disable_entry_configures_nothing() {
        let chain = DefaultChainConfig::default();
        let config = FeeManagerConfig::new_disable(50);
        let mut state = MemoryState::at_block(0);

        config.verify(&chain).expect("disable verifies");
        config.configure(&chain, &mut state).expect("disable is a no-op");
        assert!(state.is_empty());
        assert!(config.is_disabled());
    }

    #[test]
    fn equality_compares_membership_and_timestamp() {
        let first = FeeManagerConfig::new(1, vec![ADMIN, ENABLED], Vec::new(), None);
        let reordered = FeeManagerConfig::new(1, vec![ENABLED, ADMIN], Vec::new(), None);
        let later = FeeManagerConfig::new(2, vec![ADMIN, ENABLED], Vec::new(), None);
        let with_initial =
            FeeManagerConfig::new(1, vec![ADMIN, ENABLED], Vec::new(), Some(FeeConfig::default()));

        assert!(first.equal(&reordered));
        assert!(!first.equal(&later));
        assert!(!first.equal(&with_initial));
        assert!(!first.equal(&FeeManagerConfig::new_disable(1)));
    }

    #[test]
    fn parses_chainspec_extras() {
        let extras = json!({
            "feeManagerConfig": {
                "blockTimestamp": 100,
                "adminAddresses": ["0x00000000000000000000000000000000000000a1"],
                "enabledAddresses": ["0x00000000000000000000000000000000000000b1"]
            }
        });

        let config = parse_fee_manager_config(&extras).expect("valid extras");
        assert_eq!(
            config,
            FeeManagerConfig::new(100, vec![ADMIN], vec![ENABLED], None)
        );
    }

    #[test]
    fn missing_and_invalid_extras_are_distinguished() {
        assert!(matches!(
            parse_fee_manager_config(&json!({})),
            Err(ConfigError::Missing)
        ));
        assert!(matches!(
            parse_fee_manager_config(&json!({ "feeManagerConfig": { "adminAddresses": [] } })),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn display_is_json() {
        assert_eq!(
            FeeManagerConfig::new_disable(200).to_string(),
            r#"{"blockTimestamp":200,"disable":true}"#
        );

        let config = FeeManagerConfig::new(7, vec![ADMIN], Vec::new(), Some(FeeConfig::default()));
        let parsed: FeeManagerConfig =
            serde_json::from_str(&config.to_string()).expect("display output parses");
        assert_eq!(parsed, config);
    }
}
