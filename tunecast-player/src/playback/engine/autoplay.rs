//! Autoplay continuation
//!
//! When the queue runs dry after a single track, related tracks derived
//! from that track's mix are queued. Discovery failures are not errors:
//! the drive loop simply goes idle.

use super::core::{cancellable, PlaybackEngine};
use crate::announce::keys;
use crate::playback::queue::QueueItem;
use crate::playback::state::ContextHandle;
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tunecast_common::events::QueueChangeTrigger;

impl PlaybackEngine {
    /// Queue tracks related to `seed`; returns how many were added
    ///
    /// Only cancellation is an error.
    pub(super) async fn continue_autoplay(
        &self,
        handle: &ContextHandle,
        token: &CancellationToken,
        seed: &QueueItem,
    ) -> Result<usize> {
        let related = match cancellable(
            token,
            self.shared
                .media
                .related(&seed.source_reference, self.shared.related_limit),
        )
        .await?
        {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!(context = %handle.id, seed = %seed.source_reference, error = %e, "Related track discovery failed");
                Vec::new()
            }
        };

        let added = {
            let mut state = handle.state.lock().await;
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let mut added = 0;
            for track in related {
                if track.url == seed.source_reference {
                    continue;
                }
                // Related tracks are singles so the continuation keeps going.
                state.queue.enqueue(QueueItem::new(track.url, track.title, true));
                added += 1;
            }
            if added > 0 {
                self.emit_queue_changed(handle.id, state.queue.len(), QueueChangeTrigger::Autoplay);
            }
            added
        };

        info!(context = %handle.id, seed = %seed.title, added, "Autoplay continuation");
        if added > 0 {
            self.shared
                .announcer
                .announce(handle.id, keys::AUTOPLAY_ADDED, &[("count", added.to_string())])
                .await;
        }
        Ok(added)
    }
}
