//! Shared tokio runtime for request workers.

use std::sync::OnceLock;

use tokio::runtime::{Builder, Handle, Runtime};

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Handle to the process-wide multi-thread runtime, created on first use.
pub fn get_or_init_runtime() -> std::io::Result<Handle> {
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime.handle().clone());
    }

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .thread_name("frostline-tokio")
        .build()?;
    tracing::debug!("Tokio runtime started");

    Ok(RUNTIME.get_or_init(|| runtime).handle().clone())
}
