//! Command-line front end for the vault index.

mod vault_cmd;

pub use vault_cmd::VaultCli;
pub use vault_cmd::VaultCommand;
