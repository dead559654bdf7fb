use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use futures_util::future::join_all;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use relay_core::config::RelaySettings;
use relay_core::error::{RelayError, TransportError};
use relay_core::types::{
    Author, ChannelId, ChannelPair, InboundMessage, OutboundChunk, UserId,
};
use relay_store::RelayStore;

use crate::clock::Clock;
use crate::dedup::DedupCache;
use crate::filter::FilterEngine;
use crate::normalize::compose_message;
use crate::routing::RoutingTable;
use crate::transport::Transport;

/// Why an inbound message was not relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Relay is shutting down and no longer accepts events.
    ShuttingDown,
    /// Another bot (not a webhook, not us, not trusted): never relayed.
    AutomatedSender,
    /// Origin channel has no destinations.
    NotASource,
    /// Posted by the relay account itself.
    OwnMessage,
    /// Already processed within the dedup window.
    Duplicate,
    /// Text contains a blocked phrase.
    Filtered,
    /// Normalization left nothing to send.
    NothingToSend,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::ShuttingDown => "shutting_down",
            SkipReason::AutomatedSender => "automated_sender",
            SkipReason::NotASource => "not_a_source",
            SkipReason::OwnMessage => "own_message",
            SkipReason::Duplicate => "duplicate",
            SkipReason::Filtered => "filtered",
            SkipReason::NothingToSend => "nothing_to_send",
        };
        f.write_str(s)
    }
}

/// Result of delivering one message to one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub destination: ChannelId,
    /// Chunks accepted by the transport before any failure.
    pub chunks_sent: usize,
    pub error: Option<TransportError>,
}

impl Delivery {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub chunks: Vec<OutboundChunk>,
    /// One entry per destination, in routing-table order.
    pub deliveries: Vec<Delivery>,
}

impl DispatchReport {
    pub fn failed(&self) -> impl Iterator<Item = &Delivery> {
        self.deliveries.iter().filter(|d| !d.is_ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Dispatched(DispatchReport),
    Skipped(SkipReason),
}

impl RelayOutcome {
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            RelayOutcome::Skipped(reason) => Some(*reason),
            RelayOutcome::Dispatched(_) => None,
        }
    }
}

/// Tunables taken from `[relay]` config.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub chunk_limit: usize,
    pub send_timeout: Duration,
    pub dedup_window_secs: u64,
    pub trusted_bots: HashSet<UserId>,
}

impl From<&RelaySettings> for RelayOptions {
    fn from(settings: &RelaySettings) -> Self {
        Self {
            chunk_limit: settings.chunk_limit,
            send_timeout: Duration::from_secs(settings.send_timeout_secs),
            dedup_window_secs: settings.dedup_window_secs,
            trusted_bots: settings.trusted_bots.iter().copied().map(UserId).collect(),
        }
    }
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self::from(&RelaySettings::default())
    }
}

/// The relay orchestrator: decides whether an inbound message is relayed and
/// fans it out to every destination.
///
/// Owns all mutable relay state (dedup cache, routing table, filters) so
/// several events can be handled concurrently through a shared `Arc<Relay>`.
pub struct Relay {
    routing: RoutingTable,
    filters: FilterEngine,
    dedup: Mutex<DedupCache>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    options: RelayOptions,
    store_name: String,
    /// The relay's own account, known once the gateway reports ready.
    self_id: OnceLock<UserId>,
    accepting: AtomicBool,
    in_flight: TaskTracker,
}

impl Relay {
    pub fn new(
        store: Arc<dyn RelayStore>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        settings: &RelaySettings,
    ) -> Self {
        Self::with_options(
            store,
            transport,
            clock,
            settings.legacy_pair(),
            RelayOptions::from(settings),
        )
    }

    pub fn with_options(
        store: Arc<dyn RelayStore>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        legacy: Option<ChannelPair>,
        options: RelayOptions,
    ) -> Self {
        Self {
            routing: RoutingTable::new(Arc::clone(&store), legacy),
            filters: FilterEngine::new(Arc::clone(&store)),
            dedup: Mutex::new(DedupCache::with_window_secs(options.dedup_window_secs)),
            transport,
            clock,
            store_name: store.name().to_string(),
            options,
            self_id: OnceLock::new(),
            accepting: AtomicBool::new(true),
            in_flight: TaskTracker::new(),
        }
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn filters(&self) -> &FilterEngine {
        &self.filters
    }

    pub fn options(&self) -> &RelayOptions {
        &self.options
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Record the relay's own account id. Later calls are ignored.
    pub fn set_self_id(&self, id: UserId) {
        self.self_id.set(id).ok();
    }

    pub fn self_id(&self) -> Option<UserId> {
        self.self_id.get().copied()
    }

    /// Message ids currently remembered by the dedup cache.
    pub fn dedup_len(&self) -> usize {
        self.dedup.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Handle one inbound message, counting it as in flight for shutdown.
    pub async fn handle_tracked(&self, msg: &InboundMessage) -> RelayOutcome {
        self.in_flight.track_future(self.handle(msg)).await
    }

    /// Run one inbound message through every relay stage.
    pub async fn handle(&self, msg: &InboundMessage) -> RelayOutcome {
        let outcome = self.process(msg).await;
        if let RelayOutcome::Skipped(reason) = &outcome {
            debug!(
                message_id = %msg.id,
                channel = %msg.channel_id,
                author = %msg.author.display_name,
                %reason,
                "message not relayed"
            );
        }
        outcome
    }

    async fn process(&self, msg: &InboundMessage) -> RelayOutcome {
        if !self.is_accepting() {
            return RelayOutcome::Skipped(SkipReason::ShuttingDown);
        }

        let own = self.self_id().is_some_and(|id| id == msg.author.id);

        // Bot-loop guard, before any routing lookup.
        if msg.author.is_bot
            && !msg.author.is_webhook
            && !own
            && !self.options.trusted_bots.contains(&msg.author.id)
        {
            return RelayOutcome::Skipped(SkipReason::AutomatedSender);
        }

        let destinations = self.routing.destinations_for(msg.channel_id);
        if destinations.is_empty() {
            return RelayOutcome::Skipped(SkipReason::NotASource);
        }

        if own {
            return RelayOutcome::Skipped(SkipReason::OwnMessage);
        }

        if !self.mark_processed(msg) {
            return RelayOutcome::Skipped(SkipReason::Duplicate);
        }

        if msg.author.is_webhook {
            info!(message_id = %msg.id, author = %msg.author.display_name, "processing webhook message");
        } else {
            info!(message_id = %msg.id, author = %msg.author.display_name, "processing user message");
        }

        if !self.filters.allows(&msg.content) {
            info!(message_id = %msg.id, author = %msg.author.display_name, "message contains blocked phrase, filtered out");
            return RelayOutcome::Skipped(SkipReason::Filtered);
        }

        let chunks = compose_message(msg, self.options.chunk_limit);
        if chunks.is_empty() {
            return RelayOutcome::Skipped(SkipReason::NothingToSend);
        }

        let deliveries = join_all(
            destinations
                .iter()
                .map(|&destination| self.deliver(destination, &chunks)),
        )
        .await;

        for delivery in &deliveries {
            if delivery.is_ok() {
                info!(
                    message_id = %msg.id,
                    source = %msg.channel_id,
                    destination = %delivery.destination,
                    chunks = delivery.chunks_sent,
                    "forwarded message"
                );
            }
        }

        RelayOutcome::Dispatched(DispatchReport { chunks, deliveries })
    }

    /// Dedup check and insert in one critical section.
    fn mark_processed(&self, msg: &InboundMessage) -> bool {
        let now = self.clock.now();
        match self.dedup.lock() {
            Ok(mut cache) => {
                if let Some(seen_at) = cache.seen_at(msg.id) {
                    debug!(
                        message_id = %msg.id,
                        ago_ms = (now - seen_at).num_milliseconds(),
                        "duplicate delivery"
                    );
                }
                cache.should_process(msg.id, now)
            }
            // Poisoned by a panic elsewhere; relaying twice beats dropping.
            Err(_) => true,
        }
    }

    /// Send every chunk to one destination, in order. Stops at the first
    /// failure for this destination only.
    async fn deliver(&self, destination: ChannelId, chunks: &[OutboundChunk]) -> Delivery {
        let mut chunks_sent = 0;
        for chunk in chunks {
            let text = chunk.wire_text();
            let send = self.transport.send(destination, &text);
            let result = match tokio::time::timeout(self.options.send_timeout, send).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout {
                    ms: self.options.send_timeout.as_millis() as u64,
                }),
            };

            if let Err(e) = result {
                warn!(%destination, chunk = chunks_sent, error = %e, "error forwarding message to channel");
                return Delivery {
                    destination,
                    chunks_sent,
                    error: Some(e),
                };
            }
            chunks_sent += 1;
        }
        Delivery {
            destination,
            chunks_sent,
            error: None,
        }
    }

    /// Send a synthetic message from `author` to every configured destination,
    /// bypassing dedup and filters. Each destination is sent to once.
    pub async fn send_test(&self, author: Author, text: &str) -> Result<Vec<Delivery>, RelayError> {
        let mut destinations: Vec<ChannelId> = Vec::new();
        for pair in self.routing.list_all() {
            if !destinations.contains(&pair.destination) {
                destinations.push(pair.destination);
            }
        }
        if destinations.is_empty() {
            return Err(RelayError::ConfigurationMissing);
        }

        let msg = InboundMessage::text(0, ChannelId(0), author, text);
        let chunks = compose_message(&msg, self.options.chunk_limit);
        let deliveries = self
            .in_flight
            .track_future(join_all(
                destinations
                    .iter()
                    .map(|&destination| self.deliver(destination, &chunks)),
            ))
            .await;
        info!(
            destinations = deliveries.len(),
            failed = deliveries.iter().filter(|d| !d.is_ok()).count(),
            "test message dispatched"
        );
        Ok(deliveries)
    }

    /// Stop accepting events and wait for in-flight dispatches to finish.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.in_flight.close();
        info!(in_flight = self.in_flight.len(), "relay draining in-flight messages");
        self.in_flight.wait().await;
        info!("relay drained");
    }
}
