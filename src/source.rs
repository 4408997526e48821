//! Adapter publishing file arrivals on the hub.

use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::hub::BroadcastHub;
use crate::models::FileArrival;
use crate::session::shutdown_signalled;

/// The sole producer for a hub.
pub struct SourceAdapter {
    hub: Arc<BroadcastHub>,
}

impl SourceAdapter {
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        Self { hub }
    }

    /// Publish every arrival until the source ends or shutdown is signalled.
    /// Returns the number of arrivals published.
    pub async fn run<S>(self, mut arrivals: S, mut shutdown: watch::Receiver<bool>) -> u64
    where
        S: Stream<Item = FileArrival> + Unpin,
    {
        let mut published = 0;
        loop {
            tokio::select! {
                next = arrivals.next() => {
                    let Some(arrival) = next else {
                        warn!("File arrival source ended");
                        break;
                    };
                    let report = self.hub.publish(&arrival);
                    debug!(
                        path = ?arrival.path,
                        discovered_at = %arrival.discovered_at,
                        delivered = report.delivered,
                        dropped = report.dropped,
                        evicted = report.evicted,
                        "Published file arrival"
                    );
                    published += 1;
                }
                _ = shutdown_signalled(&mut shutdown) => {
                    info!("Source adapter stopping...");
                    break;
                }
            }
        }
        published
    }
}
