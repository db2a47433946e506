//! Ctrl-C handling
//!
//! The first interrupt requests cancellation; the build stops at the next
//! stage boundary. A second interrupt exits immediately.

use spc_core::{CancelToken, ErrorKind};

pub fn install(token: CancelToken) {
    let spawned = std::thread::Builder::new()
        .name("spc-signal".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot watch for Ctrl-C");
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                token.cancel();
                tracing::warn!("interrupt received, stopping after the current stage");
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(ErrorKind::Interrupted.exit_code());
                }
            });
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "cannot watch for Ctrl-C");
    }
}
