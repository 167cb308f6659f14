// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Process-wide shutdown signal (§5): settable from SIGINT/SIGTERM; daemons
//! check it at tick boundaries and let in-flight work finish before exiting.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// A cheap-to-clone handle every pipeline holds to check for, and react to,
/// shutdown. `CancellationToken` gives SSE subscriptions (§5: "a per-
/// subscription cancellation token") a child token that trips along with
/// the parent.
#[derive(Clone)]
pub struct Shutdown {
    token: CancellationToken,
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn new() -> Self {
        Shutdown {
            token: CancellationToken::new(),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn trigger(&self) {
        self.token.cancel();
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Waits for shutdown or for `duration` to elapse, whichever comes
    /// first — the daemon tick-sleep primitive every pipeline loop uses so
    /// shutdown is observed promptly instead of only after a full sleep.
    pub async fn sleep_or_shutdown(&self, duration: std::time::Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.token.cancelled() => {}
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Install SIGINT/SIGTERM handlers that trigger `shutdown` once.
pub async fn install_signal_handlers(shutdown: Shutdown) {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(area = "shutdown", "received SIGINT");
        }
        _ = sigterm.recv() => {
            tracing::info!(area = "shutdown", "received SIGTERM");
        }
    }
    shutdown.trigger();
}
