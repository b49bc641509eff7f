pub mod cli;
pub mod commands;
pub mod config;
pub mod filter;
pub mod rmc_client;
pub mod scan;
pub mod sink;
pub mod state;

mod error;
pub use error::Error;
