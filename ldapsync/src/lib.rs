pub mod cli;
pub mod directory;
pub mod ldap;
pub mod load_config;
pub mod store;

pub use cli::{run, Cli, Commands};
