//! Wallet, sub-wallet and chain-account model.
//!
//! One [`Wallet`] owns an ordered list of [`SubWallet`]s. Each sub-wallet
//! owns one [`ChainAccount`] entry per known [`Network`], keyed by network
//! id. A chain account without an address means nothing has been
//! activated for that sub-wallet on that network yet.
//!
//! A wallet is either a single-account wallet (exactly one sub-wallet with
//! [`Index::Pseudo`]) or an HD wallet whose sub-wallets carry
//! pairwise-distinct derivation indices. The two forms never mix.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub type WalletId = u64;
pub type SubWalletId = u64;
pub type NetworkId = u64;
pub type ChainAccountId = u64;

/// Raw index value marking a single-account wallet.
pub const PSEUDO_INDEX: i64 = -1;

// ─── Index ──────────────────────────────────────────────────────────────

/// Derivation index of a sub-wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Index {
    /// No real derivation index; the wallet has one implicit account.
    Pseudo,
    Derived(u32),
}

impl Index {
    pub fn raw(self) -> i64 {
        match self {
            Index::Pseudo => PSEUDO_INDEX,
            Index::Derived(i) => i64::from(i),
        }
    }

    pub fn is_pseudo(self) -> bool {
        matches!(self, Index::Pseudo)
    }
}

impl TryFrom<i64> for Index {
    type Error = ApiError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        if raw == PSEUDO_INDEX {
            return Ok(Index::Pseudo);
        }
        u32::try_from(raw)
            .map(Index::Derived)
            .map_err(|_| ApiError::InvalidAccount(format!("index out of range: {raw}")))
    }
}

impl From<Index> for i64 {
    fn from(index: Index) -> Self {
        index.raw()
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Index::Pseudo => f.write_str("pseudo"),
            Index::Derived(i) => write!(f, "{i}"),
        }
    }
}

// ─── Network ────────────────────────────────────────────────────────────

/// Family of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NetworkKind {
    #[serde(rename = "evm")]
    Evm,
}

impl NetworkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkKind::Evm => "evm",
        }
    }
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chain identifier: numeric for EVM-style chains, a string otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChainId {
    Numeric(u64),
    Named(String),
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainId::Numeric(id) => write!(f, "{id}"),
            ChainId::Named(id) => f.write_str(id),
        }
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        ChainId::Numeric(id)
    }
}

impl From<&str> for ChainId {
    fn from(id: &str) -> Self {
        ChainId::Named(id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub id: NetworkId,
    pub kind: NetworkKind,
    pub chain_id: ChainId,
}

// ─── Accounts ───────────────────────────────────────────────────────────

/// Per-network binding of a sub-wallet index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainAccount {
    pub id: ChainAccountId,
    pub wallet_id: WalletId,
    pub index: Index,
    pub network_kind: NetworkKind,
    pub chain_id: ChainId,
    /// `None` until the account is activated on this network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl ChainAccount {
    pub fn is_active(&self) -> bool {
        self.address.as_deref().is_some_and(|a| !a.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubWallet {
    pub id: SubWalletId,
    pub wallet_id: WalletId,
    pub index: Index,
    /// Always `None` for a pseudo-index sub-wallet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub chain_accounts: BTreeMap<NetworkId, ChainAccount>,
}

impl SubWallet {
    pub fn new(
        id: SubWalletId,
        wallet_id: WalletId,
        index: Index,
        name: Option<String>,
    ) -> Result<Self, ApiError> {
        if index.is_pseudo() && name.is_some() {
            return Err(ApiError::InvalidAccount(
                "a pseudo-index sub-wallet cannot be named".into(),
            ));
        }
        Ok(Self {
            id,
            wallet_id,
            index,
            name,
            chain_accounts: BTreeMap::new(),
        })
    }

    pub fn chain_account(&self, network_id: NetworkId) -> Option<&ChainAccount> {
        self.chain_accounts.get(&network_id)
    }

    /// Activated address on `network_id`, if any.
    pub fn address_on(&self, network_id: NetworkId) -> Option<&str> {
        self.chain_accounts
            .get(&network_id)
            .and_then(|account| account.address.as_deref())
    }

    /// Chain account for `network`, inserting an address-less entry when
    /// none exists. The entry always carries this sub-wallet's index.
    pub(crate) fn derive_chain_account(
        &mut self,
        network: &Network,
        next_id: impl FnOnce() -> ChainAccountId,
    ) -> &mut ChainAccount {
        let (wallet_id, index) = (self.wallet_id, self.index);
        self.chain_accounts
            .entry(network.id)
            .or_insert_with(|| ChainAccount {
                id: next_id(),
                wallet_id,
                index,
                network_kind: network.kind,
                chain_id: network.chain_id.clone(),
                address: None,
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: WalletId,
    pub name: String,
    pub sub_wallets: Vec<SubWallet>,
}

impl Wallet {
    pub fn new(id: WalletId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            sub_wallets: Vec::new(),
        }
    }

    /// Whether this wallet holds its single implicit account.
    pub fn is_single_account(&self) -> bool {
        self.sub_wallets.iter().any(|s| s.index.is_pseudo())
    }

    pub fn sub_wallet(&self, id: SubWalletId) -> Option<&SubWallet> {
        self.sub_wallets.iter().find(|s| s.id == id)
    }

    pub(crate) fn sub_wallet_mut(&mut self, id: SubWalletId) -> Option<&mut SubWallet> {
        self.sub_wallets.iter_mut().find(|s| s.id == id)
    }

    /// Check that a sub-wallet with `index` could be added.
    pub fn check_index(&self, index: Index) -> Result<(), ApiError> {
        if self.is_single_account() {
            return Err(ApiError::InvalidAccount(format!(
                "wallet {} is a single-account wallet",
                self.id
            )));
        }
        if index.is_pseudo() && !self.sub_wallets.is_empty() {
            return Err(ApiError::InvalidAccount(format!(
                "wallet {} already has derived sub-wallets; pseudo index not allowed",
                self.id
            )));
        }
        if self.sub_wallets.iter().any(|s| s.index == index) {
            return Err(ApiError::InvalidAccount(format!(
                "wallet {} already has a sub-wallet with index {index}",
                self.id
            )));
        }
        Ok(())
    }

    /// Append `sub_wallet`, enforcing the index invariants.
    pub fn add_sub_wallet(&mut self, sub_wallet: SubWallet) -> Result<&SubWallet, ApiError> {
        if sub_wallet.wallet_id != self.id {
            return Err(ApiError::InvalidAccount(format!(
                "sub-wallet {} belongs to wallet {}, not {}",
                sub_wallet.id, sub_wallet.wallet_id, self.id
            )));
        }
        self.check_index(sub_wallet.index)?;
        self.sub_wallets.push(sub_wallet);
        Ok(&self.sub_wallets[self.sub_wallets.len() - 1])
    }

    /// Validate a whole wallet, e.g. one loaded from storage.
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut rebuilt = Wallet::new(self.id, self.name.clone());
        for sub_wallet in &self.sub_wallets {
            if sub_wallet.index.is_pseudo() && sub_wallet.name.is_some() {
                return Err(ApiError::InvalidAccount(format!(
                    "pseudo-index sub-wallet {} cannot be named",
                    sub_wallet.id
                )));
            }
            for (network_id, account) in &sub_wallet.chain_accounts {
                if account.wallet_id != self.id || account.index != sub_wallet.index {
                    return Err(ApiError::InvalidAccount(format!(
                        "chain account {} on network {network_id} does not match sub-wallet {}",
                        account.id, sub_wallet.id
                    )));
                }
            }
            rebuilt.add_sub_wallet(sub_wallet.clone())?;
        }
        Ok(())
    }
}
