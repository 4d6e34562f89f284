pub mod classroom;
pub mod cli;
pub mod console;
pub mod drive;
pub mod http;
pub mod load_config;
pub mod oauth;
pub mod session;

pub use cli::{run, Cli, Commands};
