//! Ctrl-C handling for long running commits

use std::thread;

use common::edit::CancelToken;

/// Cancel `token` when the process receives Ctrl-C
///
/// The signal is awaited on a single threaded runtime in a background
/// thread, so the synchronous commit only has to poll the token.
pub fn cancel_on_interrupt(token: CancelToken) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name("stagetree-interrupt".into())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        tracing::warn!("interrupted, cancelling after the current node");
                        token.cancel();
                    }
                    Err(e) => tracing::debug!(error = %e, "no interrupt handler installed"),
                }
            })
        })?;
    Ok(())
}
