//! Shared owner of wallets and networks.
//!
//! All mutation of the account collections goes through `AccountStore`.
//! Readers receive cloned snapshots. Change notifications are fired after
//! the internal lock is released, so listeners may read the store.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::account::{
    ChainAccount, ChainId, Index, Network, NetworkId, NetworkKind, SubWallet, SubWalletId, Wallet,
    WalletId,
};
use crate::error::ApiError;
use crate::events::{Event, EventEmitter};

/// A change to the account collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountChange {
    WalletCreated(WalletId),
    SubWalletAdded {
        wallet_id: WalletId,
        sub_wallet_id: SubWalletId,
    },
    NetworkAdded(NetworkId),
    AccountActivated {
        wallet_id: WalletId,
        sub_wallet_id: SubWalletId,
        network_id: NetworkId,
    },
}

#[derive(Debug, Default)]
struct AccountState {
    wallets: BTreeMap<WalletId, Wallet>,
    networks: BTreeMap<NetworkId, Network>,
    last_wallet_id: u64,
    last_sub_wallet_id: u64,
    last_network_id: u64,
    last_chain_account_id: u64,
}

impl AccountState {
    fn wallet_of(&self, sub_wallet_id: SubWalletId) -> Option<WalletId> {
        self.wallets
            .values()
            .find(|w| w.sub_wallet(sub_wallet_id).is_some())
            .map(|w| w.id)
    }

    /// Insert (or return) the chain account of `sub_wallet_id` on
    /// `network_id` without touching its address.
    fn derive(
        &mut self,
        sub_wallet_id: SubWalletId,
        network_id: NetworkId,
    ) -> Result<&mut ChainAccount, ApiError> {
        let network = self
            .networks
            .get(&network_id)
            .cloned()
            .ok_or(ApiError::UnknownNetwork(network_id))?;
        let wallet_id = self
            .wallet_of(sub_wallet_id)
            .ok_or(ApiError::UnknownSubWallet(sub_wallet_id))?;

        let counter = &mut self.last_chain_account_id;
        let sub_wallet = self
            .wallets
            .get_mut(&wallet_id)
            .and_then(|w| w.sub_wallet_mut(sub_wallet_id))
            .ok_or(ApiError::UnknownSubWallet(sub_wallet_id))?;
        Ok(sub_wallet.derive_chain_account(&network, || {
            *counter += 1;
            *counter
        }))
    }
}

/// Store of wallets, sub-wallets and networks.
pub struct AccountStore {
    state: RwLock<AccountState>,
    changes: EventEmitter<AccountChange>,
}

impl Default for AccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore {
    pub fn new() -> Self {
        Self::with_leak_threshold(crate::events::DEFAULT_LEAK_THRESHOLD)
    }

    pub fn with_leak_threshold(leak_threshold: usize) -> Self {
        Self {
            state: RwLock::new(AccountState::default()),
            changes: EventEmitter::with_leak_threshold("accounts", leak_threshold),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AccountState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, AccountState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fired after every successful mutation.
    pub fn on_did_change(&self) -> Event<AccountChange> {
        self.changes.event()
    }

    fn notify(&self, change: AccountChange) {
        let outcome = self.changes.fire(&change);
        if !outcome.is_clean() {
            tracing::warn!(
                failures = outcome.failures.len(),
                change = ?change,
                "account change listeners failed"
            );
        }
    }

    pub fn create_wallet(&self, name: &str) -> Result<Wallet, ApiError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::InvalidAccount("wallet name must not be empty".into()));
        }
        let wallet = {
            let mut state = self.write();
            state.last_wallet_id += 1;
            let wallet = Wallet::new(state.last_wallet_id, name);
            state.wallets.insert(wallet.id, wallet.clone());
            wallet
        };
        tracing::info!(wallet_id = wallet.id, "wallet created");
        self.notify(AccountChange::WalletCreated(wallet.id));
        Ok(wallet)
    }

    /// Add a sub-wallet to `wallet_id`.
    ///
    /// The new sub-wallet gets an address-less chain account entry for
    /// every known network.
    pub fn add_sub_wallet(
        &self,
        wallet_id: WalletId,
        index: Index,
        name: Option<String>,
    ) -> Result<SubWallet, ApiError> {
        let sub_wallet = {
            let mut state = self.write();
            let state = &mut *state;
            let wallet = state
                .wallets
                .get_mut(&wallet_id)
                .ok_or(ApiError::UnknownWallet(wallet_id))?;
            wallet.check_index(index)?;

            let mut sub_wallet =
                SubWallet::new(state.last_sub_wallet_id + 1, wallet_id, index, name)?;
            for network in state.networks.values() {
                sub_wallet.derive_chain_account(network, || {
                    state.last_chain_account_id += 1;
                    state.last_chain_account_id
                });
            }
            state.last_sub_wallet_id = sub_wallet.id;
            wallet.add_sub_wallet(sub_wallet)?.clone()
        };
        tracing::info!(
            wallet_id,
            sub_wallet_id = sub_wallet.id,
            index = %sub_wallet.index,
            "sub-wallet added"
        );
        self.notify(AccountChange::SubWalletAdded {
            wallet_id,
            sub_wallet_id: sub_wallet.id,
        });
        Ok(sub_wallet)
    }

    /// Register a network.
    ///
    /// Existing sub-wallets receive an address-less chain account entry;
    /// no address is derived here.
    pub fn add_network(&self, kind: NetworkKind, chain_id: ChainId) -> Result<Network, ApiError> {
        let network = {
            let mut state = self.write();
            if state
                .networks
                .values()
                .any(|n| n.kind == kind && n.chain_id == chain_id)
            {
                return Err(ApiError::DuplicateNetwork(format!("{kind}:{chain_id}")));
            }
            state.last_network_id += 1;
            let network = Network {
                id: state.last_network_id,
                kind,
                chain_id,
            };
            state.networks.insert(network.id, network.clone());

            let sub_wallet_ids: Vec<SubWalletId> = state
                .wallets
                .values()
                .flat_map(|w| w.sub_wallets.iter().map(|s| s.id))
                .collect();
            for sub_wallet_id in sub_wallet_ids {
                state.derive(sub_wallet_id, network.id)?;
            }
            network
        };
        tracing::info!(
            network_id = network.id,
            kind = %network.kind,
            chain_id = %network.chain_id,
            "network added"
        );
        self.notify(AccountChange::NetworkAdded(network.id));
        Ok(network)
    }

    /// The chain account of a sub-wallet on a network, creating the
    /// address-less entry if needed. Uses the sub-wallet's index verbatim.
    pub fn derive_chain_account(
        &self,
        sub_wallet_id: SubWalletId,
        network_id: NetworkId,
    ) -> Result<ChainAccount, ApiError> {
        let mut state = self.write();
        state.derive(sub_wallet_id, network_id).cloned()
    }

    /// Record the derived `address` for one sub-wallet on one network.
    pub fn activate_account(
        &self,
        sub_wallet_id: SubWalletId,
        network_id: NetworkId,
        address: &str,
    ) -> Result<ChainAccount, ApiError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ApiError::InvalidAccount("address must not be empty".into()));
        }
        let account = {
            let mut state = self.write();
            let account = state.derive(sub_wallet_id, network_id)?;
            if let Some(existing) = account.address.as_deref() {
                if existing != address {
                    return Err(ApiError::InvalidAccount(format!(
                        "sub-wallet {sub_wallet_id} already active on network {network_id}"
                    )));
                }
            }
            account.address = Some(address.to_string());
            account.clone()
        };
        tracing::info!(
            wallet_id = account.wallet_id,
            sub_wallet_id,
            network_id,
            "chain account activated"
        );
        self.notify(AccountChange::AccountActivated {
            wallet_id: account.wallet_id,
            sub_wallet_id,
            network_id,
        });
        Ok(account)
    }

    pub fn wallet(&self, id: WalletId) -> Option<Wallet> {
        self.read().wallets.get(&id).cloned()
    }

    pub fn wallets(&self) -> Vec<Wallet> {
        self.read().wallets.values().cloned().collect()
    }

    pub fn sub_wallet(&self, id: SubWalletId) -> Option<SubWallet> {
        self.read()
            .wallets
            .values()
            .find_map(|w| w.sub_wallet(id))
            .cloned()
    }

    pub fn network(&self, id: NetworkId) -> Option<Network> {
        self.read().networks.get(&id).cloned()
    }

    pub fn networks(&self) -> Vec<Network> {
        self.read().networks.values().cloned().collect()
    }

    pub fn chain_account(
        &self,
        sub_wallet_id: SubWalletId,
        network_id: NetworkId,
    ) -> Option<ChainAccount> {
        self.sub_wallet(sub_wallet_id)
            .and_then(|s| s.chain_accounts.get(&network_id).cloned())
    }
}

impl std::fmt::Debug for AccountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("AccountStore")
            .field("wallets", &state.wallets.len())
            .field("networks", &state.networks.len())
            .finish()
    }
}
