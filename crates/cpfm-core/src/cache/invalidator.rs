//! Write-path cache invalidation
//!
//! Subscribes to the [`EventBus`] and drops the cache entries a stored row
//! makes stale: the insight sets of the plugin (and of the plugin the site
//! moved away from), the all-plugins set and the plugin catalogue. A lagged receiver may have missed events, so it
//! clears everything.

use super::{insight_key, plugin_names_key, CacheStore};
use crate::event::{DataEvent, EventBus};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct CacheInvalidator {
    cache: Arc<dyn CacheStore>,
    rx: broadcast::Receiver<DataEvent>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<dyn CacheStore>, bus: &EventBus) -> Self {
        Self {
            cache,
            rx: bus.subscribe(),
        }
    }

    /// Apply every event already queued; returns how many were handled
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    self.apply(&event);
                    handled += 1;
                }
                Err(TryRecvError::Lagged(missed)) => {
                    self.lagged(missed);
                    handled += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        handled
    }

    /// Follow the bus until `cancel` fires or every publisher is gone
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.rx.recv() => match received {
                    Ok(event) => self.apply(&event),
                    Err(RecvError::Lagged(missed)) => self.lagged(missed),
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!("Cache invalidator stopped");
    }

    fn apply(&self, event: &DataEvent) {
        let mut keys = match event.plugin_name() {
            Some(plugin) => vec![
                insight_key(Some(plugin)),
                insight_key(None),
                plugin_names_key(),
            ],
            None => {
                self.clear("bulk import");
                return;
            }
        };
        if let Some(previous) = event.previous_plugin_name() {
            keys.push(insight_key(Some(previous)));
        }

        for key in keys {
            if let Err(e) = self.cache.invalidate(&key) {
                warn!(key = %key, error = %e, "Cache invalidation failed");
            }
        }
        debug!(?event, "Cache entries invalidated");
    }

    fn lagged(&self, missed: u64) {
        warn!(missed, "Invalidator lagged behind write events");
        self.clear("lagged receiver");
    }

    fn clear(&self, reason: &str) {
        match self.cache.invalidate_all() {
            Ok(()) => debug!(reason, "Cache cleared"),
            Err(e) => warn!(reason, error = %e, "Cache clear failed"),
        }
    }
}
