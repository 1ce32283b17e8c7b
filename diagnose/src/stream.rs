//! Single-subscriber delivery of diagnostic snapshots.
//!
//! A [`SessionStreamer`] owns the sending half of a bounded channel. The first
//! terminal push takes the sender out of its slot and drops it, which closes
//! the channel; every later push finds the slot empty and does nothing. The
//! slot sits behind an async mutex so concurrent pushes are serialized in
//! arrival order.

use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::core::state::DiagnosticState;

/// Create a streamer and the receiver its subscriber reads from.
pub fn channel(capacity: usize) -> (SessionStreamer, mpsc::Receiver<DiagnosticState>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        SessionStreamer {
            sender: Mutex::new(Some(tx)),
        },
        rx,
    )
}

#[derive(Debug)]
pub struct SessionStreamer {
    sender: Mutex<Option<mpsc::Sender<DiagnosticState>>>,
}

impl SessionStreamer {
    /// Deliver `state`; when `terminal` is set, close the stream afterwards.
    ///
    /// Returns `false` if the stream was already closed by an earlier terminal
    /// push. A subscriber that went away is not an error: the push still counts
    /// and the session carries on.
    pub async fn push(&self, state: DiagnosticState, terminal: bool) -> bool {
        let mut slot = self.sender.lock().await;
        let Some(sender) = slot.as_ref() else {
            debug!(terminal, "push after close ignored");
            return false;
        };

        if sender.send(state).await.is_err() {
            debug!("subscriber disconnected, snapshot dropped");
        }
        if terminal {
            slot.take();
            debug!("session stream closed");
        }
        true
    }

    pub async fn is_closed(&self) -> bool {
        self.sender.lock().await.is_none()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn state(summary: &str) -> DiagnosticState {
        DiagnosticState {
            project_summary: summary.to_string(),
            ..DiagnosticState::default()
        }
    }

    #[tokio::test]
    async fn delivers_in_order_and_closes_on_terminal() {
        let (streamer, mut rx) = channel(8);
        assert!(streamer.push(state("one"), false).await);
        assert!(streamer.push(state("two"), false).await);
        assert!(streamer.push(state("done"), true).await);
        assert!(streamer.is_closed().await);

        let mut seen = Vec::new();
        while let Some(next) = rx.recv().await {
            seen.push(next.project_summary);
        }
        assert_eq!(seen, vec!["one", "two", "done"]);
    }

    #[tokio::test]
    async fn pushes_after_terminal_are_noops() {
        let (streamer, mut rx) = channel(8);
        assert!(streamer.push(state("final"), true).await);
        assert!(!streamer.push(state("late"), false).await);
        assert!(!streamer.push(state("late terminal"), true).await);

        assert_eq!(rx.recv().await.expect("final").project_summary, "final");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_subscriber_is_ignored() {
        let (streamer, rx) = channel(1);
        drop(rx);
        assert!(streamer.push(state("nobody listening"), false).await);
        assert!(streamer.push(state("still fine"), true).await);
        assert!(streamer.is_closed().await);
    }

    #[tokio::test]
    async fn concurrent_terminal_pushes_close_once() {
        let (streamer, mut rx) = channel(16);
        let streamer = Arc::new(streamer);

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let streamer = Arc::clone(&streamer);
                tokio::spawn(async move { streamer.push(state(&format!("t{n}")), true).await })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.expect("join") {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);

        let mut received = 0;
        while rx.recv().await.is_some() {
            received += 1;
        }
        assert_eq!(received, 1);
    }
}
