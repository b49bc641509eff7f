use thiserror::Error;

use crate::config::ConfigError;
use crate::rmc_client::RmcClientError;
use crate::sink::SinkError;
use crate::state::StateError;

/// Top-level error for one scanner invocation.
///
/// Remote-lookup failures never surface here; they are absorbed into probe
/// outcomes inside the scan engine. Only setup and local-I/O failures reach
/// the process boundary.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Client(#[from] RmcClientError),
}
