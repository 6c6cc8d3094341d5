//! One-shot activation of precompile configuration.
//!
//! A schedule entry is verified when the chain configuration is loaded and applied to state
//! once, when the chain reaches its activation timestamp. [`PrecompileUpgrade`] tracks where
//! an entry is in that lifecycle and refuses out-of-order transitions.

use crate::{
    contract::StatefulPrecompiledContract,
    error::PrecompileError,
    state::AccessibleState,
};
use alloy_primitives::Address;
use ev_common::{DefaultFeeConfigPolicy, FeeConfig, FeeConfigPolicy};
use serde::{Deserialize, Serialize};
use std::{any::Any, fmt, sync::Arc};

/// Chain-level inputs consulted when a precompile is verified or activated.
pub trait ChainConfig {
    /// Fee configuration used when an upgrade does not carry its own.
    fn fee_config(&self) -> FeeConfig;

    /// Rules every stored fee configuration must satisfy.
    fn fee_config_policy(&self) -> Arc<dyn FeeConfigPolicy> {
        Arc::new(DefaultFeeConfigPolicy)
    }
}

/// [`ChainConfig`] backed by plain values.
#[derive(Debug, Clone)]
pub struct DefaultChainConfig {
    fee_config: FeeConfig,
    policy: Arc<dyn FeeConfigPolicy>,
}

impl DefaultChainConfig {
    /// Uses `fee_config` as the chain default under [`DefaultFeeConfigPolicy`].
    pub fn new(fee_config: FeeConfig) -> Self {
        Self {
            fee_config,
            policy: Arc::new(DefaultFeeConfigPolicy),
        }
    }

    /// Replaces the fee policy.
    pub fn with_policy(mut self, policy: Arc<dyn FeeConfigPolicy>) -> Self {
        self.policy = policy;
        self
    }
}

impl Default for DefaultChainConfig {
    fn default() -> Self {
        Self::new(FeeConfig::default())
    }
}

impl ChainConfig for DefaultChainConfig {
    fn fee_config(&self) -> FeeConfig {
        self.fee_config
    }

    fn fee_config_policy(&self) -> Arc<dyn FeeConfigPolicy> {
        Arc::clone(&self.policy)
    }
}

/// Activation point shared by every precompile schedule entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeableConfig {
    /// Timestamp at which the entry takes effect.
    pub block_timestamp: u64,
    /// Whether the entry turns the precompile off instead of on.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disable: bool,
}

impl UpgradeableConfig {
    /// An entry enabling a precompile at `block_timestamp`.
    pub const fn enable_at(block_timestamp: u64) -> Self {
        Self {
            block_timestamp,
            disable: false,
        }
    }

    /// An entry disabling a precompile at `block_timestamp`.
    pub const fn disable_at(block_timestamp: u64) -> Self {
        Self {
            block_timestamp,
            disable: true,
        }
    }
}

/// Hooks a host calls to schedule and activate a stateful precompile.
pub trait StatefulPrecompileConfig: fmt::Debug + Send + Sync {
    /// Address the precompile is installed at.
    fn address(&self) -> Address;

    /// Activation timestamp.
    fn timestamp(&self) -> u64;

    /// Whether this entry disables the precompile.
    fn is_disabled(&self) -> bool;

    /// Returns `true` if `other` describes the same upgrade.
    fn equal(&self, other: &dyn StatefulPrecompileConfig) -> bool;

    /// Rejects any config that [`StatefulPrecompileConfig::configure`] would reject.
    fn verify(&self, chain: &dyn ChainConfig) -> Result<(), PrecompileError>;

    /// Writes the initial state of the precompile.
    fn configure(
        &self,
        chain: &dyn ChainConfig,
        state: &mut dyn AccessibleState,
    ) -> Result<(), PrecompileError>;

    /// Dispatch table served at [`StatefulPrecompileConfig::address`].
    fn contract(
        &self,
        chain: &dyn ChainConfig,
    ) -> Result<Arc<StatefulPrecompiledContract>, PrecompileError>;

    /// Upcast used by [`StatefulPrecompileConfig::equal`] implementations.
    fn as_any(&self) -> &dyn Any;
}

/// Position of an upgrade in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    /// Loaded, not yet verified.
    Pending,
    /// Verified, waiting for its activation timestamp.
    Verified,
    /// Applied to state. Terminal.
    Activated,
}

/// A scheduled upgrade and its lifecycle state.
#[derive(Debug)]
pub struct PrecompileUpgrade<C> {
    config: C,
    state: UpgradeState,
}

impl<C: StatefulPrecompileConfig> PrecompileUpgrade<C> {
    /// Wraps `config` in the pending state.
    pub const fn new(config: C) -> Self {
        Self {
            config,
            state: UpgradeState::Pending,
        }
    }

    /// The scheduled config.
    pub const fn config(&self) -> &C {
        &self.config
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> UpgradeState {
        self.state
    }

    /// Returns `true` once the chain has reached the activation timestamp.
    pub fn is_due(&self, block_timestamp: u64) -> bool {
        block_timestamp >= self.config.timestamp()
    }

    /// Verifies the config. Only valid while pending.
    pub fn verify(&mut self, chain: &dyn ChainConfig) -> Result<(), PrecompileError> {
        if self.state != UpgradeState::Pending {
            return Err(PrecompileError::InvalidConfig(format!(
                "upgrade at {} already verified",
                self.config.address()
            )));
        }
        self.config.verify(chain)?;
        self.state = UpgradeState::Verified;
        tracing::debug!(
            target: "precompile_upgrade",
            address = ?self.config.address(),
            timestamp = self.config.timestamp(),
            disable = self.config.is_disabled(),
            "upgrade verified"
        );
        Ok(())
    }

    /// Applies the config to `state` at `block_timestamp`.
    ///
    /// Disable entries change no state. Any error leaves the upgrade verified.
    pub fn activate(
        &mut self,
        chain: &dyn ChainConfig,
        state: &mut dyn AccessibleState,
        block_timestamp: u64,
    ) -> Result<(), PrecompileError> {
        let address = self.config.address();
        match self.state {
            UpgradeState::Pending => {
                return Err(PrecompileError::InvalidConfig(format!(
                    "upgrade at {address} must be verified before activation"
                )))
            }
            UpgradeState::Activated => {
                return Err(PrecompileError::InvalidConfig(format!(
                    "upgrade at {address} already activated"
                )))
            }
            UpgradeState::Verified => {}
        }
        if !self.is_due(block_timestamp) {
            return Err(PrecompileError::InvalidConfig(format!(
                "upgrade at {address} scheduled for {} cannot activate at {block_timestamp}",
                self.config.timestamp()
            )));
        }

        if !self.config.is_disabled() {
            self.config.configure(chain, state)?;
        }
        self.state = UpgradeState::Activated;
        tracing::info!(
            target: "precompile_upgrade",
            ?address,
            block_timestamp,
            disable = self.config.is_disabled(),
            "upgrade activated"
        );
        Ok(())
    }
}
