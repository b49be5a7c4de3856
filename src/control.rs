//! Operator control surface
//!
//! Watches the server's local input for the shutdown token.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Input token that triggers shutdown. Case-sensitive.
pub const SHUTDOWN_TOKEN: &str = "EXIT";

/// Watch the operator input for the shutdown token
///
/// Reads lines until `EXIT` (surrounding whitespace trimmed) arrives, then
/// fires the shutdown channel and returns. All other input is ignored.
/// Returns quietly at end of input.
pub async fn watch<R>(input: R, shutdown_tx: mpsc::Sender<()>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim() == SHUTDOWN_TOKEN {
            info!("Operator requested shutdown");
            let _ = shutdown_tx.send(()).await;
            return;
        }
        debug!("Ignoring operator input: {:?}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_exit_token_triggers_shutdown() {
        let (tx, mut rx) = mpsc::channel(1);
        watch(BufReader::new(&b"hello\nEXIT\n"[..]), tx).await;
        assert_eq!(rx.recv().await, Some(()));
    }

    #[tokio::test]
    async fn test_token_is_trimmed() {
        let (tx, mut rx) = mpsc::channel(1);
        watch(BufReader::new(&b"  EXIT  \n"[..]), tx).await;
        assert_eq!(rx.recv().await, Some(()));
    }

    #[tokio::test]
    async fn test_token_is_case_sensitive() {
        let (tx, mut rx) = mpsc::channel(1);
        watch(BufReader::new(&b"exit\nEXITING\nquit\n"[..]), tx).await;
        // Watcher hit end of input without firing
        assert_eq!(rx.recv().await, None);
    }
}
