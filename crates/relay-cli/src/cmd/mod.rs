pub mod check;
pub mod config;
pub mod create;
pub mod serve;

/// Multi-threaded runtime for commands that talk to the network.
pub(crate) fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new()?)
}
