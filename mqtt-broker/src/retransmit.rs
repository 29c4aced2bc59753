use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use crate::broker::Broker;

/// Runs forever at a fixed cadence, pruning drained in-flight entries and
/// re-sending the survivors. A fixed interval is simpler than an
/// exponential backoff with a retry cap and was kept on purpose — see
/// DESIGN.md.
pub async fn run<W>(broker: Arc<Broker<W>>, interval: Duration)
where
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        let sends = broker.prune_and_collect_retransmits().await;

        if sends.is_empty() {
            continue;
        }

        log::debug!("retransmit tick: resending {} in-flight deliveries", sends.len());

        for (client_id, bytes) in sends {
            let Some(writer) = broker.writer_for(&client_id).await else {
                continue;
            };

            if let Err(err) = writer.lock().await.write_all(&bytes).await {
                log::warn!("retransmit to client {client_id} failed: {err}");
            }
        }
    }
}
