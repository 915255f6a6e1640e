//! Display facade receiving status updates from the supervisor.

use futures::{stream::BoxStream, StreamExt};
use pingthing_types::events::DisplayUpdate;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::trace;

/// Receives every status update. The supervisor never reads display state back.
pub trait DisplaySink: Send + Sync + 'static {
    fn publish(&self, update: DisplayUpdate);
}

/// In-process display backed by a broadcast channel.
#[derive(Clone)]
pub struct LocalDisplay {
    tx: broadcast::Sender<DisplayUpdate>,
}

impl LocalDisplay {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> BoxStream<'static, DisplayUpdate> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|update| async move { update.ok() })
            .boxed()
    }
}

impl DisplaySink for LocalDisplay {
    fn publish(&self, update: DisplayUpdate) {
        trace!("display: {}", update.title());
        // no subscribers yet is fine; updates are fire-and-forget
        let _ = self.tx.send(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pingthing_types::events::DisplayKind;

    #[tokio::test]
    async fn subscribers_receive_published_updates() {
        let display = LocalDisplay::new(8);
        let mut updates = display.subscribe();
        display.publish(DisplayUpdate::waiting("8.8.8.8", "waiting for network"));
        display.publish(DisplayUpdate::error("8.8.8.8", None, "DNS error"));

        let first = updates.next().await.expect("first update");
        assert_eq!(first.kind, DisplayKind::Waiting);
        let second = updates.next().await.expect("second update");
        assert_eq!(second.kind, DisplayKind::Error);
    }
}
