//! Role-based allow list shared by permissioned precompiles.
//!
//! ## Storage Layout
//!
//! Each role lives in the storage of the precompile that owns the list:
//!
//! | Slot | Description |
//! |------|-------------|
//! | holder address, left-padded to 32 bytes | Role word (0 = none, 1 = enabled, 2 = admin) |
//!
//! A left-padded address always has its first 12 bytes zero. Precompiles embedding an allow list
//! must keep their own slot keys outside that space.

use crate::{
    contract::{
        run_metered, CallContext, PrecompileResult, StateMutability, StatefulPrecompileFunction,
    },
    error::PrecompileError,
    state::{AccessibleState, StateDB},
};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

sol! {
    /// Allow list management interface exposed by every permissioned precompile.
    interface IAllowList {
        /// Grant `addr` the admin role.
        function setAdmin(address addr) external;

        /// Grant `addr` the enabled role.
        function setEnabled(address addr) external;

        /// Revoke every role held by `addr`.
        function setNone(address addr) external;

        /// Read the role of `addr`.
        function readAllowList(address addr) external view returns (uint256 role);
    }
}

/// Gas cost for one storage write.
pub const WRITE_GAS_COST_PER_SLOT: u64 = 20_000;

/// Gas cost for one storage read.
pub const READ_GAS_COST_PER_SLOT: u64 = 5_000;

/// Gas charged by `setAdmin`, `setEnabled` and `setNone`.
pub const MODIFY_ALLOW_LIST_GAS_COST: u64 = WRITE_GAS_COST_PER_SLOT;

/// Gas charged by `readAllowList`.
pub const READ_ALLOW_LIST_GAS_COST: u64 = READ_GAS_COST_PER_SLOT;

const NON_ADMIN_REASON: &str = "non-admin cannot modify allow list";

/// Permission level of an address in an allow list.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    /// No permissions.
    #[default]
    None,
    /// May call gated functions.
    Enabled,
    /// May call gated functions and manage the list.
    Admin,
}

impl Role {
    /// Returns `true` for [`Role::Enabled`] and [`Role::Admin`].
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled | Self::Admin)
    }

    /// Returns `true` for [`Role::Admin`].
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Storage encoding of the role.
    pub const fn to_word(self) -> B256 {
        let tag = match self {
            Self::None => 0,
            Self::Enabled => 1,
            Self::Admin => 2,
        };
        B256::with_last_byte(tag)
    }

    /// Decodes a stored role word, rejecting unknown encodings.
    pub fn from_word(word: B256) -> Result<Self, PrecompileError> {
        let value = U256::from_be_bytes(word.0);
        match u8::try_from(value) {
            Ok(0) => Ok(Self::None),
            Ok(1) => Ok(Self::Enabled),
            Ok(2) => Ok(Self::Admin),
            _ => Err(PrecompileError::InvalidRole(value)),
        }
    }
}

/// Storage key holding the role of `holder`.
pub fn role_slot(holder: Address) -> B256 {
    holder.into_word()
}

/// Reads the role of `holder` in the allow list of `precompile`. Absent entries are
/// [`Role::None`].
pub fn get_role(
    state: &mut dyn StateDB,
    precompile: Address,
    holder: Address,
) -> Result<Role, PrecompileError> {
    let word = state.get_state(precompile, role_slot(holder))?;
    let role = Role::from_word(word)?;
    tracing::debug!(target: "allow_list", ?precompile, ?holder, ?role, "role lookup");
    Ok(role)
}

/// Writes `role` for `holder` without any permission check.
///
/// Callers are responsible for authorizing the change.
pub fn set_role(
    state: &mut dyn StateDB,
    precompile: Address,
    holder: Address,
    role: Role,
) -> Result<(), PrecompileError> {
    state.set_state(precompile, role_slot(holder), role.to_word())
}

/// Fails with [`PrecompileError::Unauthorized`] unless `caller` holds at least
/// [`Role::Enabled`].
pub fn require_enabled(
    state: &mut dyn StateDB,
    precompile: Address,
    caller: Address,
    reason: &'static str,
) -> Result<(), PrecompileError> {
    if get_role(state, precompile, caller)?.is_enabled() {
        Ok(())
    } else {
        tracing::warn!(target: "allow_list", ?precompile, ?caller, reason, "authorization denied");
        Err(PrecompileError::Unauthorized { caller, reason })
    }
}

/// Initial members of an allow list, applied once when its precompile activates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowListConfig {
    /// Addresses seeded with [`Role::Admin`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub admin_addresses: Vec<Address>,
    /// Addresses seeded with [`Role::Enabled`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enabled_addresses: Vec<Address>,
}

impl AllowListConfig {
    /// Creates a config from its admin and enabled members.
    pub const fn new(admin_addresses: Vec<Address>, enabled_addresses: Vec<Address>) -> Self {
        Self {
            admin_addresses,
            enabled_addresses,
        }
    }

    /// Rejects configs that would give one address two roles.
    pub fn verify(&self) -> Result<(), PrecompileError> {
        let admins: BTreeSet<_> = self.admin_addresses.iter().collect();
        if let Some(addr) = self.enabled_addresses.iter().find(|addr| admins.contains(addr)) {
            return Err(PrecompileError::InvalidConfig(format!(
                "cannot set address {addr} as both admin and enabled"
            )));
        }
        Ok(())
    }

    /// Seeds the roles into the allow list of `precompile`.
    ///
    /// Verification runs first, so a rejected config writes nothing.
    pub fn configure(
        &self,
        state: &mut dyn StateDB,
        precompile: Address,
    ) -> Result<(), PrecompileError> {
        self.verify()?;
        for admin in &self.admin_addresses {
            set_role(state, precompile, *admin, Role::Admin)?;
        }
        for enabled in &self.enabled_addresses {
            set_role(state, precompile, *enabled, Role::Enabled)?;
        }
        tracing::info!(
            target: "allow_list",
            ?precompile,
            admins = self.admin_addresses.len(),
            enabled = self.enabled_addresses.len(),
            "allow list seeded"
        );
        Ok(())
    }

    fn members(&self) -> (BTreeSet<&Address>, BTreeSet<&Address>) {
        (
            self.admin_addresses.iter().collect(),
            self.enabled_addresses.iter().collect(),
        )
    }
}

/// Membership equality: order and repetition inside each list do not matter.
impl PartialEq for AllowListConfig {
    fn eq(&self, other: &Self) -> bool {
        self.members() == other.members()
    }
}

impl Eq for AllowListConfig {}

/// Decodes a single left-padded address word.
pub fn unpack_address(input: &[u8]) -> Result<Address, PrecompileError> {
    if input.len() != 32 {
        return Err(PrecompileError::Malformed(format!(
            "invalid input length for address input: {}",
            input.len()
        )));
    }
    let word = B256::from_slice(input);
    if word[..12].iter().any(|byte| *byte != 0) {
        return Err(PrecompileError::Malformed(format!(
            "address word has non-zero padding: {word}"
        )));
    }
    Ok(Address::from_word(word))
}

/// Call data for `setAdmin`, `setEnabled` or `setNone`, chosen by `role`.
pub fn pack_modify_allow_list_input(role: Role, address: Address) -> Vec<u8> {
    let selector = match role {
        Role::Admin => IAllowList::setAdminCall::SELECTOR,
        Role::Enabled => IAllowList::setEnabledCall::SELECTOR,
        Role::None => IAllowList::setNoneCall::SELECTOR,
    };
    let mut input = Vec::with_capacity(4 + 32);
    input.extend_from_slice(&selector);
    input.extend_from_slice(address.into_word().as_slice());
    input
}

/// Call data for `readAllowList`.
pub fn pack_read_allow_list_input(address: Address) -> Vec<u8> {
    let mut input = Vec::with_capacity(4 + 32);
    input.extend_from_slice(&IAllowList::readAllowListCall::SELECTOR);
    input.extend_from_slice(address.into_word().as_slice());
    input
}

fn modify_allow_list(
    precompile: Address,
    role: Role,
) -> impl Fn(&mut dyn AccessibleState, &CallContext<'_>) -> PrecompileResult
       + Send
       + Sync
       + 'static {
    move |state: &mut dyn AccessibleState, call: &CallContext<'_>| {
        run_metered(
            call,
            MODIFY_ALLOW_LIST_GAS_COST,
            StateMutability::NonPayable,
            || {
                let holder = unpack_address(call.input)?;
                let db = state.state_db();
                if !get_role(db, precompile, call.caller)?.is_admin() {
                    tracing::warn!(
                        target: "allow_list",
                        ?precompile,
                        caller = ?call.caller,
                        "non-admin attempted to modify allow list"
                    );
                    return Err(PrecompileError::Unauthorized {
                        caller: call.caller,
                        reason: NON_ADMIN_REASON,
                    });
                }
                set_role(db, precompile, holder, role)?;
                tracing::info!(
                    target: "allow_list",
                    ?precompile,
                    ?holder,
                    ?role,
                    admin = ?call.caller,
                    "role updated"
                );
                Ok(Bytes::new())
            },
        )
    }
}

fn read_allow_list(
    precompile: Address,
) -> impl Fn(&mut dyn AccessibleState, &CallContext<'_>) -> PrecompileResult
       + Send
       + Sync
       + 'static {
    move |state: &mut dyn AccessibleState, call: &CallContext<'_>| {
        run_metered(call, READ_ALLOW_LIST_GAS_COST, StateMutability::View, || {
            let holder = unpack_address(call.input)?;
            let role = get_role(state.state_db(), precompile, holder)?;
            Ok(Bytes::copy_from_slice(role.to_word().as_slice()))
        })
    }
}

/// Builds the allow list functions for the list stored at `precompile`.
pub fn create_allow_list_functions(precompile: Address) -> Vec<StatefulPrecompileFunction> {
    vec![
        StatefulPrecompileFunction::new(
            IAllowList::setAdminCall::SELECTOR,
            modify_allow_list(precompile, Role::Admin),
        ),
        StatefulPrecompileFunction::new(
            IAllowList::setEnabledCall::SELECTOR,
            modify_allow_list(precompile, Role::Enabled),
        ),
        StatefulPrecompileFunction::new(
            IAllowList::setNoneCall::SELECTOR,
            modify_allow_list(precompile, Role::None),
        ),
        StatefulPrecompileFunction::new(
            IAllowList::readAllowListCall::SELECTOR,
            read_allow_list(precompile),
        ),
    ]
}
