//! Bridge between the host-agnostic framework and `alloy-evm` precompiles.
//!
//! [`EvmStateAdapter`] backs [`StateDB`] and [`BlockContext`] with the journal exposed through
//! [`EvmInternals`], so the same dispatch tables run unchanged inside a revm execution.

use crate::{
    contract::StatefulPrecompiledContract,
    error::PrecompileError,
    fee_manager::{create_fee_manager_contract, FeeManagerConfig, FEE_MANAGER_ADDRESS},
    state::{AccessibleState, BlockContext, StateDB},
    upgrade::{ChainConfig, StatefulPrecompileConfig},
};
use alloy_evm::{
    precompiles::{DynPrecompile, Precompile, PrecompileInput, PrecompilesMap},
    revm::precompile::{
        PrecompileError as EvmPrecompileError, PrecompileId,
        PrecompileResult as EvmPrecompileResult,
    },
    EvmInternals,
};
use alloy_primitives::{Address, B256, U256};
use ev_common::FeeConfigPolicy;
use revm::precompile::PrecompileOutput;
use std::{
    fmt,
    sync::{Arc, OnceLock},
};

/// [`AccessibleState`] view over the EVM journal for the duration of one precompile call.
pub struct EvmStateAdapter<'a, 'b> {
    internals: &'a mut EvmInternals<'b>,
    block_number: U256,
}

impl<'a, 'b> EvmStateAdapter<'a, 'b> {
    /// Wraps `internals`, capturing the current block number.
    pub fn new(internals: &'a mut EvmInternals<'b>) -> Self {
        let block_number = internals.block_number();
        Self {
            internals,
            block_number,
        }
    }

    /// The journal must hold an account before its storage can be read or written.
    fn ensure_account_created(&mut self, address: Address) -> Result<(), PrecompileError> {
        let mut account = self
            .internals
            .load_account(address)
            .map_err(|err| PrecompileError::State(err.to_string()))?;

        if account.is_loaded_as_not_existing() {
            account.mark_created();
            self.internals.touch_account(address);
        }

        Ok(())
    }
}

impl fmt::Debug for EvmStateAdapter<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmStateAdapter")
            .field("block_number", &self.block_number)
            .finish_non_exhaustive()
    }
}

impl StateDB for EvmStateAdapter<'_, '_> {
    fn get_state(&mut self, address: Address, key: B256) -> Result<B256, PrecompileError> {
        self.internals
            .load_account(address)
            .map_err(|err| PrecompileError::State(err.to_string()))?;
        let value = self
            .internals
            .sload(address, key.into())
            .map_err(|err| PrecompileError::State(err.to_string()))?;
        Ok(value.data.into())
    }

    fn set_state(
        &mut self,
        address: Address,
        key: B256,
        value: B256,
    ) -> Result<(), PrecompileError> {
        self.ensure_account_created(address)?;
        self.internals
            .sstore(address, key.into(), value.into())
            .map_err(|err| PrecompileError::State(err.to_string()))?;
        Ok(())
    }
}

impl BlockContext for EvmStateAdapter<'_, '_> {
    fn number(&self) -> Option<U256> {
        Some(self.block_number)
    }
}

impl AccessibleState for EvmStateAdapter<'_, '_> {
    fn state_db(&mut self) -> &mut dyn StateDB {
        self
    }

    fn block_context(&self) -> &dyn BlockContext {
        self
    }
}

/// Runs `contract` for one EVM precompile call.
///
/// Calls inside a STATICCALL run read-only, so mutating handlers fail after charging gas.
/// Fatal errors surface as [`EvmPrecompileError::Fatal`], which aborts execution instead of
/// failing only the current call.
pub fn call_stateful_contract(
    contract: &StatefulPrecompiledContract,
    mut input: PrecompileInput<'_>,
) -> EvmPrecompileResult {
    let caller = input.caller;
    let address = input.target_address;
    let data = input.data;
    let gas = input.gas;
    let read_only = input.is_static_call();

    let mut state = EvmStateAdapter::new(input.internals_mut());
    match contract.run(&mut state, caller, address, data, gas, read_only) {
        Ok(output) => Ok(PrecompileOutput::new(
            gas.saturating_sub(output.remaining_gas),
            output.output,
        )),
        Err(failure) => {
            if failure.error.is_fatal() {
                tracing::error!(
                    target: "precompile_dispatch",
                    ?address,
                    ?caller,
                    error = %failure.error,
                    "stateful precompile hit a fatal error"
                );
                return Err(EvmPrecompileError::Fatal(failure.error.to_string()));
            }
            match failure.error {
                PrecompileError::OutOfGas => Err(EvmPrecompileError::OutOfGas),
                other => Err(EvmPrecompileError::Other(other.to_string().into())),
            }
        }
    }
}

/// The fee manager dispatch table as an EVM precompile.
#[derive(Clone)]
pub struct FeeManagerPrecompile {
    contract: Arc<StatefulPrecompiledContract>,
}

impl FeeManagerPrecompile {
    /// Identifier reported to the precompile map, built once on first use.
    pub fn id() -> &'static PrecompileId {
        static ID: OnceLock<PrecompileId> = OnceLock::new();
        ID.get_or_init(|| PrecompileId::custom("fee_config_manager"))
    }

    /// Builds the precompile with `policy` guarding `setFeeConfig`.
    pub fn new(policy: Arc<dyn FeeConfigPolicy>) -> Result<Self, PrecompileError> {
        Ok(Self {
            contract: Arc::new(create_fee_manager_contract(policy)?),
        })
    }

    /// Builds the precompile served once `config` activates on `chain`.
    pub fn from_config(
        config: &FeeManagerConfig,
        chain: &dyn ChainConfig,
    ) -> Result<Self, PrecompileError> {
        Ok(Self {
            contract: config.contract(chain)?,
        })
    }

    /// Address the precompile is served at.
    pub const fn address() -> Address {
        FEE_MANAGER_ADDRESS
    }
}

impl fmt::Debug for FeeManagerPrecompile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeeManagerPrecompile")
            .field("contract", &self.contract)
            .finish()
    }
}

impl Precompile for FeeManagerPrecompile {
    fn precompile_id(&self) -> &PrecompileId {
        Self::id()
    }

    fn call(&self, input: PrecompileInput<'_>) -> EvmPrecompileResult {
        call_stateful_contract(&self.contract, input)
    }

    fn is_pure(&self) -> bool {
        false
    }
}

/// Installs `precompile` at `address`, replacing whatever was there.
pub fn install_stateful_precompile<P>(
    precompiles: &mut PrecompilesMap,
    address: Address,
    precompile: P,
) where
    P: Precompile + Send + Sync + 'static,
{
    let precompile = Arc::new(precompile);
    let id = precompile.precompile_id().clone();

    precompiles.apply_precompile(&address, move |_| {
        let precompile_for_call = Arc::clone(&precompile);
        Some(DynPrecompile::new_stateful(id, move |input| {
            precompile_for_call.call(input)
        }))
    });
    tracing::info!(target: "precompile_dispatch", ?address, "stateful precompile installed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        allow_list::{get_role, Role},
        fee_manager::{
            get_fee_config_last_changed_at, get_stored_fee_config, pack_get_fee_config_input,
            pack_set_fee_config_input, set_fee_manager_status, SET_FEE_CONFIG_GAS_COST,
        },
        upgrade::DefaultChainConfig,
    };
    use alloy_evm::revm::precompile::{PrecompileSpecId, Precompiles};
    use alloy_primitives::address;
    use ev_common::{DefaultFeeConfigPolicy, FeeConfig};
    use revm::{
        context::{
            journal::{Journal, JournalInner},
            BlockEnv, CfgEnv, TxEnv,
        },
        database::{CacheDB, EmptyDB},
        primitives::hardfork::SpecId,
    };

    type TestJournal = Journal<CacheDB<EmptyDB>>;

    const GAS_LIMIT: u64 = 1_000_000;
    const ADMIN: Address = address!("0x00000000000000000000000000000000000000a1");
    const ENABLED: Address = address!("0x00000000000000000000000000000000000000b1");
    const STRANGER: Address = address!("0x00000000000000000000000000000000000000c1");

    struct TestEnv {
        block: BlockEnv,
        cfg: CfgEnv,
        tx: TxEnv,
    }

    impl TestEnv {
        fn internals<'a>(&'a self, journal: &'a mut TestJournal) -> EvmInternals<'a> {
            EvmInternals::new(journal, &self.block, &self.cfg, &self.tx)
        }
    }

    fn setup_context(block_number: u64) -> (TestJournal, TestEnv) {
        let mut journal = Journal::new_with_inner(CacheDB::default(), JournalInner::new());
        journal.inner.set_spec_id(SpecId::PRAGUE);
        let env = TestEnv {
            block: BlockEnv {
                number: U256::from(block_number),
                ..Default::default()
            },
            cfg: CfgEnv::default(),
            tx: TxEnv::default(),
        };
        (journal, env)
    }

    fn input<'a>(
        journal: &'a mut TestJournal,
        env: &'a TestEnv,
        caller: Address,
        data: &'a [u8],
        gas: u64,
        is_static: bool,
    ) -> PrecompileInput<'a> {
        PrecompileInput {
            data,
            gas,
            caller,
            value: U256::ZERO,
            target_address: FEE_MANAGER_ADDRESS,
            is_static,
            bytecode_address: FEE_MANAGER_ADDRESS,
            internals: env.internals(journal),
        }
    }

    fn seed_role(journal: &mut TestJournal, env: &TestEnv, holder: Address, role: Role) {
        let mut internals = env.internals(journal);
        let mut state = EvmStateAdapter::new(&mut internals);
        set_fee_manager_status(&mut state, holder, role).expect("seed role");
    }

    fn precompile() -> FeeManagerPrecompile {
        FeeManagerPrecompile::new(Arc::new(DefaultFeeConfigPolicy)).expect("valid contract")
    }

    fn custom_config() -> FeeConfig {
        FeeConfig {
            gas_limit: U256::from(12_000_000u64),
            ..FeeConfig::default()
        }
    }

    #[test]
    fn enabled_caller_updates_journal_storage() {
        let (mut journal, env) = setup_context(42);
        seed_role(&mut journal, &env, ENABLED, Role::Enabled);
        let calldata = pack_set_fee_config_input(&custom_config());

        let output = precompile()
            .call(input(&mut journal, &env, ENABLED, &calldata, GAS_LIMIT, false))
            .expect("enabled caller may set fee config");
        assert_eq!(output.gas_used, SET_FEE_CONFIG_GAS_COST);
        assert!(output.bytes.is_empty());

        let mut internals = env.internals(&mut journal);
        let mut state = EvmStateAdapter::new(&mut internals);
        assert_eq!(get_stored_fee_config(&mut state), Ok(custom_config()));
        assert_eq!(
            get_fee_config_last_changed_at(&mut state),
            Ok(U256::from(42u64))
        );
    }

    #[test]
    fn static_call_cannot_change_fee_config() {
        let (mut journal, env) = setup_context(42);
        seed_role(&mut journal, &env, ENABLED, Role::Enabled);
        let calldata = pack_set_fee_config_input(&custom_config());

        let result = precompile().call(input(
            &mut journal,
            &env,
            ENABLED,
            &calldata,
            GAS_LIMIT,
            true,
        ));

        match result {
            Err(EvmPrecompileError::Other(msg)) => {
                assert_eq!(msg, PrecompileError::WriteProtection.to_string());
            }
            other => panic!("expected write protection error, got {other:?}"),
        }

        let mut internals = env.internals(&mut journal);
        let mut state = EvmStateAdapter::new(&mut internals);
        assert_eq!(get_stored_fee_config(&mut state), Ok(FeeConfig::zeroed()));
        assert_eq!(get_fee_config_last_changed_at(&mut state), Ok(U256::ZERO));
    }

    #[test]
    fn static_call_cannot_change_roles() {
        let (mut journal, env) = setup_context(7);
        seed_role(&mut journal, &env, ADMIN, Role::Admin);
        let calldata = crate::allow_list::pack_modify_allow_list_input(Role::Enabled, STRANGER);

        let result = precompile().call(input(
            &mut journal,
            &env,
            ADMIN,
            &calldata,
            GAS_LIMIT,
            true,
        ));
        assert!(matches!(result, Err(EvmPrecompileError::Other(_))));

        let mut internals = env.internals(&mut journal);
        let mut state = EvmStateAdapter::new(&mut internals);
        assert_eq!(
            get_role(&mut state, FEE_MANAGER_ADDRESS, STRANGER),
            Ok(Role::None)
        );
    }

    #[test]
    fn static_call_may_read() {
        let (mut journal, env) = setup_context(3);
        let calldata = pack_get_fee_config_input();

        let output = precompile()
            .call(input(&mut journal, &env, STRANGER, &calldata, GAS_LIMIT, true))
            .expect("reads are allowed in static calls");
        assert_eq!(output.bytes.len(), ev_common::FEE_CONFIG_FIELD_COUNT * 32);
    }

    #[test]
    fn corrupt_role_aborts_as_fatal() {
        let (mut journal, env) = setup_context(42);
        {
            let mut internals = env.internals(&mut journal);
            let mut state = EvmStateAdapter::new(&mut internals);
            state
                .set_state(
                    FEE_MANAGER_ADDRESS,
                    ENABLED.into_word(),
                    B256::with_last_byte(3),
                )
                .expect("raw write succeeds");
        }
        let calldata = pack_set_fee_config_input(&custom_config());

        let result = precompile().call(input(
            &mut journal,
            &env,
            ENABLED,
            &calldata,
            GAS_LIMIT,
            false,
        ));

        match result {
            Err(EvmPrecompileError::Fatal(msg)) => {
                let expected = PrecompileError::InvalidRole(U256::from(3u64));
                assert_eq!(msg, expected.to_string());
            }
            other => panic!("expected fatal error, got {other:?}"),
        }
    }

    #[test]
    fn precompile_account_is_created_on_first_write() {
        let (mut journal, env) = setup_context(1);
        seed_role(&mut journal, &env, ADMIN, Role::Admin);

        let account = journal
            .inner
            .state
            .get(&FEE_MANAGER_ADDRESS)
            .expect("precompile account is loaded");
        assert!(account.is_touched(), "precompile account should be touched");
    }

    #[test]
    fn unauthorized_caller_maps_to_other_error() {
        let (mut journal, env) = setup_context(42);
        let calldata = pack_set_fee_config_input(&custom_config());

        let result = precompile().call(input(
            &mut journal,
            &env,
            STRANGER,
            &calldata,
            GAS_LIMIT,
            false,
        ));

        match result {
            Err(EvmPrecompileError::Other(msg)) => {
                assert!(msg.contains("non-enabled cannot change fee config"));
            }
            other => panic!("expected unauthorized error, got {other:?}"),
        }
    }

    #[test]
    fn short_gas_maps_to_out_of_gas() {
        let (mut journal, env) = setup_context(42);
        seed_role(&mut journal, &env, ENABLED, Role::Enabled);
        let calldata = pack_set_fee_config_input(&custom_config());

        let result = precompile().call(input(
            &mut journal,
            &env,
            ENABLED,
            &calldata,
            SET_FEE_CONFIG_GAS_COST - 1,
            false,
        ));

        assert!(matches!(result, Err(EvmPrecompileError::OutOfGas)));
    }

    #[test]
    fn installed_precompile_is_reachable_through_the_map() {
        let mut precompiles =
            PrecompilesMap::from_static(Precompiles::new(PrecompileSpecId::PRAGUE));
        let chain = DefaultChainConfig::default();
        let config = FeeManagerConfig::new(0, vec![ADMIN], Vec::new(), None);
        let fee_manager =
            FeeManagerPrecompile::from_config(&config, &chain).expect("valid contract");

        install_stateful_precompile(&mut precompiles, FeeManagerPrecompile::address(), fee_manager);

        let (mut journal, env) = setup_context(5);
        {
            let mut internals = env.internals(&mut journal);
            let mut state = EvmStateAdapter::new(&mut internals);
            config.configure(&chain, &mut state).expect("activation succeeds");
        }

        let installed = precompiles
            .get(&FEE_MANAGER_ADDRESS)
            .expect("fee manager is installed");
        let calldata = pack_get_fee_config_input();
        let output = installed
            .call(input(&mut journal, &env, STRANGER, &calldata, GAS_LIMIT, false))
            .expect("anyone can read the fee config");

        assert_eq!(output.bytes.len(), ev_common::FEE_CONFIG_FIELD_COUNT * 32);
        assert_eq!(
            crate::fee_manager::unpack_fee_config_input(&output.bytes),
            Ok(FeeConfig::default())
        );
    }
}
