//! Console front end: print delivered lines, queue typed lines for flooding.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Drain the display queue to stdout. The queue is capacity-1 on purpose:
/// if nothing consumes here, the dispatch loop stalls rather than buffering.
pub async fn run_display(mut display_rx: mpsc::Receiver<String>) {
    while let Some(line) = display_rx.recv().await {
        println!("{line}");
    }
}

/// Read stdin lines into the outgoing queue. Blank lines are skipped.
/// Returns when stdin closes or the dispatch side goes away.
pub async fn run_input(outgoing_tx: mpsc::Sender<String>) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let body = line.trim();
        if body.is_empty() {
            continue;
        }
        if outgoing_tx.send(body.to_string()).await.is_err() {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn display_drains_until_sender_drops() {
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(run_display(rx));
        tx.send("a: hi".to_string()).await.unwrap();
        drop(tx);
        task.await.unwrap();
    }
}
