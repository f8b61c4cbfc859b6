pub mod broker;
pub mod cli;
pub mod http;
pub mod load_config;
pub mod postgres;
pub mod store;

pub use cli::{run, Cli, Commands};
