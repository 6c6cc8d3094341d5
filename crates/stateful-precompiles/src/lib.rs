//! # Evolve Stateful Precompiles
//!
//! This crate provides a framework for precompiles that keep their own persistent storage,
//! together with the fee configuration manager built on it.
//!
//! ## Available Precompiles
//!
//! | Address | Name | Description |
//! |---------|------|-------------|
//! | `0x0200...0003` | [`fee_manager`] | Allow-listed updates of the dynamic fee configuration |
//!
//! ## Architecture
//!
//! Every stateful precompile follows the same pattern:
//!
//! 1. **Dispatch**: [`contract::StatefulPrecompiledContract`] routes the 4-byte selector to a
//!    handler, or to an optional fallback
//! 2. **Metering**: handlers charge a fixed gas cost first, then reject writes in read-only calls
//! 3. **Authorization**: mutating handlers consult the [`allow_list`] stored in the precompile's
//!    own account
//! 4. **State**: all reads and writes go through [`state::StateDB`]; nothing is cached across calls
//!
//! Activation is driven by the host through [`upgrade::PrecompileUpgrade`], and dispatch tables
//! live in a host-owned [`registry::PrecompileRegistry`] rather than in globals.
//!
//! ## Integration
//!
//! Inside an EVM the fee manager is installed into an `alloy-evm` [`PrecompilesMap`]:
//!
//! ```ignore
//! use ev_stateful_precompiles::{
//!     evm::{install_stateful_precompile, FeeManagerPrecompile},
//!     fee_manager::parse_fee_manager_config,
//! };
//!
//! let config = parse_fee_manager_config(&chainspec_extras)?;
//! let precompile = FeeManagerPrecompile::from_config(&config, &chain)?;
//! install_stateful_precompile(&mut precompiles, FeeManagerPrecompile::address(), precompile);
//! ```
//!
//! [`PrecompilesMap`]: alloy_evm::precompiles::PrecompilesMap

pub mod allow_list;
pub mod contract;
pub mod error;
pub mod evm;
pub mod fee_manager;
pub mod registry;
pub mod state;
pub mod upgrade;

pub use error::{CallFailure, PrecompileError};
