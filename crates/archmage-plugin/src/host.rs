//! Plugin host: the surface handed to extensions.
//!
//! A [`Host`] owns the command registry and the account store and hands
//! every activated extension an [`ExtensionContext`]. The host version is
//! fixed when the host is built.

use std::sync::Arc;

use crate::account_store::AccountStore;
use crate::command::Arg;
use crate::config::HostConfig;
use crate::console::Console;
use crate::disposable::Disposable;
use crate::error::ApiError;
use crate::registry::{CommandRegistry, ExtensionCommands};

/// Internal command returning the host version string.
pub const VERSION_COMMAND: &str = "_archmage.version";

pub struct Host {
    version: semver::Version,
    config: HostConfig,
    commands: CommandRegistry,
    accounts: Arc<AccountStore>,
    builtins: Disposable,
}

impl Host {
    /// Build a host, validating `config` and registering built-in commands.
    pub fn new(config: HostConfig) -> Result<Self, ApiError> {
        config.validate()?;
        let version = semver::Version::parse(config.version.trim())?;
        let commands = CommandRegistry::new();

        let reported = version.to_string();
        let version_command = commands.register_command(VERSION_COMMAND, move |_| {
            let reported = reported.clone();
            async move { Ok(Arg::String(reported)) }
        })?;

        tracing::info!(version = %version, "plugin host started");
        Ok(Self {
            version,
            accounts: Arc::new(AccountStore::with_leak_threshold(
                config.listener_leak_threshold,
            )),
            config,
            commands,
            builtins: Disposable::from_all([version_command]),
        })
    }

    /// Build a host from environment configuration.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::new(HostConfig::from_env())
    }

    pub fn version(&self) -> &semver::Version {
        &self.version
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn accounts(&self) -> &Arc<AccountStore> {
        &self.accounts
    }

    /// Create the context for one extension.
    pub fn activate(&self, extension_id: &str) -> Result<ExtensionContext, ApiError> {
        let commands = self.commands.for_extension(extension_id)?;
        tracing::info!(extension = %extension_id, "extension activated");
        Ok(ExtensionContext {
            host_version: self.version.clone(),
            console: Console::with_max_message_len(
                extension_id,
                self.config.console_max_message_len,
            ),
            commands,
            accounts: self.accounts.clone(),
            subscriptions: Vec::new(),
        })
    }

    /// Remove the built-in commands.
    pub fn shutdown(&self) {
        self.builtins.dispose();
        tracing::info!("plugin host stopped");
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("version", &self.version.to_string())
            .field("commands", &self.commands)
            .field("accounts", &self.accounts)
            .finish_non_exhaustive()
    }
}

/// Everything one extension sees of the host.
///
/// Disposables pushed into [`ExtensionContext::subscriptions`] are released
/// together by [`ExtensionContext::deactivate`].
#[derive(Debug)]
pub struct ExtensionContext {
    host_version: semver::Version,
    console: Console,
    commands: ExtensionCommands,
    accounts: Arc<AccountStore>,
    pub subscriptions: Vec<Disposable>,
}

impl ExtensionContext {
    pub fn extension_id(&self) -> &str {
        self.commands.extension_id()
    }

    pub fn host_version(&self) -> &semver::Version {
        &self.host_version
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn commands(&self) -> &ExtensionCommands {
        &self.commands
    }

    pub fn accounts(&self) -> &Arc<AccountStore> {
        &self.accounts
    }

    /// Release every collected subscription. All of them are released even
    /// when some fail; the failures are returned together.
    pub fn deactivate(self) -> Result<(), ApiError> {
        let count = self.subscriptions.len();
        let result = Disposable::from_all(self.subscriptions).try_dispose();
        match &result {
            Ok(()) => tracing::info!(
                extension = %self.commands.extension_id(),
                subscriptions = count,
                "extension deactivated"
            ),
            Err(e) => tracing::warn!(
                extension = %self.commands.extension_id(),
                "extension deactivated with errors: {e}"
            ),
        }
        result
    }
}
