//! Archmage plugin host API.
//!
//! The contract a host application exposes to extensions: a command
//! registry, a disposable resource lifecycle, typed events, a console
//! bridge and the wallet / sub-wallet / chain-account model. Extensions get
//! an [`ExtensionContext`] from [`Host::activate`]; everything they register
//! returns a [`Disposable`].

pub mod account;
pub mod account_store;
pub mod command;
pub mod config;
pub mod console;
pub mod disposable;
pub mod error;
pub mod events;
pub mod host;
pub mod logging;
pub mod registry;

pub use account::{
    ChainAccount, ChainId, Index, Network, NetworkKind, SubWallet, Wallet, PSEUDO_INDEX,
};
pub use account_store::{AccountChange, AccountStore};
pub use command::{Arg, Command};
pub use config::HostConfig;
pub use console::Console;
pub use disposable::{Dispose, Disposable};
pub use error::ApiError;
pub use events::{Event, EventEmitter, FireOutcome};
pub use host::{ExtensionContext, Host};
pub use logging::init_logging;
pub use registry::{CommandOrigin, CommandRegistry, Deferred, ExtensionCommands};

/// Version of this API crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
