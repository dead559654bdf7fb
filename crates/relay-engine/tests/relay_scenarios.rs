// End-to-end relay behaviour against scripted transports.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use relay_core::config::RelaySettings;
use relay_core::error::TransportError;
use relay_core::types::{
    Attachment, Author, ChannelId, ChannelPair, Embed, InboundMessage, UserId, CONTINUATION_PREFIX,
};
use relay_engine::{ManualClock, Relay, RelayOptions, RelayOutcome, SkipReason, Transport};
use relay_store::{MemoryStore, RelayStore, SqliteStore};

const SOURCE: ChannelId = ChannelId(100);
const DEST_A: ChannelId = ChannelId(200);
const DEST_B: ChannelId = ChannelId(201);

/// Takes 200ms per send and counts the sends that finish.
#[derive(Default)]
struct SlowTransport {
    completed: AtomicUsize,
}

#[async_trait]
impl Transport for SlowTransport {
    async fn send(&self, _channel: ChannelId, _text: &str) -> Result<(), TransportError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every send; channels in `failing` reject all sends.
#[derive(Default)]
struct ScriptedTransport {
    sent: Mutex<Vec<(ChannelId, String)>>,
    failing: HashSet<ChannelId>,
}

impl ScriptedTransport {
    fn failing(channels: &[ChannelId]) -> Self {
        Self {
            failing: channels.iter().copied().collect(),
            ..Self::default()
        }
    }

    fn sent(&self) -> Vec<(ChannelId, String)> {
        self.sent.lock().unwrap().clone()
    }

    fn sent_to(&self, channel: ChannelId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, text)| text)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, channel: ChannelId, text: &str) -> Result<(), TransportError> {
        if self.failing.contains(&channel) {
            return Err(TransportError::SendFailed("Missing Permissions".to_string()));
        }
        self.sent.lock().unwrap().push((channel, text.to_string()));
        Ok(())
    }
}

/// Fails every call to prove the store is never consulted.
struct UntouchableStore;

impl RelayStore for UntouchableStore {
    fn name(&self) -> &str {
        "untouchable"
    }
    fn load_pairs(&self) -> relay_store::error::Result<Option<Vec<ChannelPair>>> {
        panic!("routing table consulted")
    }
    fn save_pairs(&self, _: &[ChannelPair]) -> relay_store::error::Result<()> {
        panic!("routing table written")
    }
    fn load_filters(&self) -> relay_store::error::Result<Vec<String>> {
        panic!("filters consulted")
    }
    fn save_filters(&self, _: &[String]) -> relay_store::error::Result<()> {
        panic!("filters written")
    }
}

struct Harness {
    relay: Relay,
    transport: Arc<ScriptedTransport>,
    clock: Arc<ManualClock>,
}

fn harness_with(store: Arc<dyn RelayStore>, transport: ScriptedTransport) -> Harness {
    let transport = Arc::new(transport);
    let clock = Arc::new(ManualClock::new(
        Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    ));
    let relay = Relay::with_options(
        store,
        transport.clone(),
        clock.clone(),
        None,
        RelayOptions::default(),
    );
    Harness {
        relay,
        transport,
        clock,
    }
}

fn fan_out_harness(transport: ScriptedTransport) -> Harness {
    let store = MemoryStore::with_pairs(vec![
        ChannelPair::new(SOURCE, DEST_A, "Pair 1"),
        ChannelPair::new(SOURCE, DEST_B, "Pair 2"),
    ]);
    harness_with(Arc::new(store), transport)
}

fn alice(id: u64, content: &str) -> InboundMessage {
    InboundMessage::text(id, SOURCE, Author::user(7, "Alice"), content)
}

fn dispatched(outcome: &RelayOutcome) -> &relay_engine::relay::DispatchReport {
    match outcome {
        RelayOutcome::Dispatched(report) => report,
        RelayOutcome::Skipped(reason) => panic!("expected dispatch, skipped: {reason}"),
    }
}

#[tokio::test]
async fn fans_out_to_every_destination() {
    let h = fan_out_harness(ScriptedTransport::default());
    let outcome = h.relay.handle(&alice(1, "hello world")).await;

    let report = dispatched(&outcome);
    assert_eq!(report.deliveries.len(), 2);
    assert_eq!(h.transport.sent_to(DEST_A), vec!["**Alice:** hello world"]);
    assert_eq!(h.transport.sent_to(DEST_B), vec!["**Alice:** hello world"]);
}

#[tokio::test]
async fn invite_links_are_stripped() {
    let h = fan_out_harness(ScriptedTransport::default());
    h.relay
        .handle(&alice(1, "Big news!\ndiscord.gg/abc123 | join now\nSee you"))
        .await;

    let sent = h.transport.sent_to(DEST_A);
    assert_eq!(sent.len(), 1);
    assert!(!sent[0].contains("discord.gg"));
    assert!(sent[0].starts_with("**Alice:** Big news!"));
    assert!(sent[0].ends_with("See you"));
}

#[tokio::test]
async fn other_bots_are_dropped_before_routing() {
    let h = harness_with(Arc::new(UntouchableStore), ScriptedTransport::default());
    let msg = InboundMessage::text(1, SOURCE, Author::bot(55, "OtherBot"), "beep");

    let outcome = h.relay.handle(&msg).await;
    assert_eq!(outcome.skip_reason(), Some(SkipReason::AutomatedSender));
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn webhook_posts_are_relayed() {
    let h = fan_out_harness(ScriptedTransport::default());
    let msg = InboundMessage::text(1, SOURCE, Author::webhook(88, "Announcer"), "patch notes");

    h.relay.handle(&msg).await;
    assert_eq!(h.transport.sent_to(DEST_A), vec!["**Announcer:** patch notes"]);
}

#[tokio::test]
async fn duplicate_delivery_is_skipped_until_window_passes() {
    let h = fan_out_harness(ScriptedTransport::default());
    let msg = alice(42, "once");

    assert!(h.relay.handle(&msg).await.skip_reason().is_none());
    assert_eq!(
        h.relay.handle(&msg).await.skip_reason(),
        Some(SkipReason::Duplicate)
    );
    assert_eq!(h.transport.sent_to(DEST_A).len(), 1);

    h.clock.advance(chrono::Duration::seconds(299));
    assert_eq!(
        h.relay.handle(&msg).await.skip_reason(),
        Some(SkipReason::Duplicate)
    );

    h.clock.advance(chrono::Duration::seconds(1));
    assert!(h.relay.handle(&msg).await.skip_reason().is_none());
    assert_eq!(h.transport.sent_to(DEST_A).len(), 2);

    // A clock stepped far ahead evicts the entry outright.
    h.clock.set(Utc.timestamp_opt(1_700_086_400, 0).unwrap());
    assert!(h.relay.handle(&msg).await.skip_reason().is_none());
    assert_eq!(h.transport.sent_to(DEST_A).len(), 3);
}

#[tokio::test]
async fn blocked_phrase_stops_the_message() {
    let h = fan_out_harness(ScriptedTransport::default());
    h.relay.filters().add_filter("buy now").unwrap();

    let outcome = h.relay.handle(&alice(1, "please BUY NOW!!")).await;
    assert_eq!(outcome.skip_reason(), Some(SkipReason::Filtered));
    assert!(h.transport.sent().is_empty());

    // A filtered id is still remembered.
    assert_eq!(
        h.relay.handle(&alice(1, "please BUY NOW!!")).await.skip_reason(),
        Some(SkipReason::Duplicate)
    );
}

#[tokio::test]
async fn failing_destination_does_not_block_the_rest() {
    let h = fan_out_harness(ScriptedTransport::failing(&[DEST_A]));
    let outcome = h.relay.handle(&alice(1, "still arrives")).await;

    let report = dispatched(&outcome);
    let failed: Vec<_> = report.failed().map(|d| d.destination).collect();
    assert_eq!(failed, vec![DEST_A]);
    assert_eq!(h.transport.sent_to(DEST_B), vec!["**Alice:** still arrives"]);
}

#[tokio::test]
async fn long_messages_arrive_in_order_with_continuations() {
    let h = fan_out_harness(ScriptedTransport::default());
    let body = "a".repeat(3_800);
    let outcome = h.relay.handle(&alice(1, &body)).await;

    let report = dispatched(&outcome);
    assert!(report.chunks.len() >= 2);
    assert!(report.chunks.iter().all(|c| c.text.chars().count() <= 1_900));

    let sent = h.transport.sent_to(DEST_A);
    assert_eq!(sent.len(), report.chunks.len());
    assert!(sent[0].starts_with("**Alice:** aaa"));
    assert!(!sent[0].starts_with(CONTINUATION_PREFIX));
    for later in &sent[1..] {
        assert!(later.starts_with(CONTINUATION_PREFIX));
    }

    let rejoined: String = report.chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(rejoined, format!("**Alice:** {body}"));
}

#[tokio::test]
async fn unrelated_channel_is_ignored() {
    let h = fan_out_harness(ScriptedTransport::default());
    let msg = InboundMessage::text(1, ChannelId(999), Author::user(7, "Alice"), "hi");
    assert_eq!(
        h.relay.handle(&msg).await.skip_reason(),
        Some(SkipReason::NotASource)
    );
}

#[tokio::test]
async fn attachments_and_embeds_are_rendered() {
    let h = fan_out_harness(ScriptedTransport::default());
    let mut msg = alice(1, "");
    msg.embeds.push(Embed {
        title: Some("Update".to_string()),
        description: Some("Servers restart at noon".to_string()),
        ..Embed::default()
    });
    msg.attachments.push(Attachment {
        filename: "map.png".to_string(),
        content_type: Some("image/png".to_string()),
    });

    h.relay.handle(&msg).await;
    let sent = h.transport.sent_to(DEST_A);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].starts_with("**Alice:**\n\n**Update**"));
    assert!(sent[0].contains("Servers restart at noon"));
    assert!(sent[0].ends_with("**Image:** map.png"));
}

#[tokio::test]
async fn legacy_pair_routes_until_table_is_edited() {
    let settings = RelaySettings {
        legacy_source: SOURCE.get(),
        legacy_destination: DEST_A.get(),
        ..RelaySettings::default()
    };
    let transport = Arc::new(ScriptedTransport::default());
    let relay = Relay::new(
        Arc::new(MemoryStore::new()),
        transport.clone(),
        Arc::new(ManualClock::new(Utc::now())),
        &settings,
    );

    relay.handle(&alice(1, "via legacy")).await;
    assert_eq!(transport.sent_to(DEST_A), vec!["**Alice:** via legacy"]);

    relay.routing().remove_pair(SOURCE, DEST_A).unwrap();
    assert_eq!(
        relay.handle(&alice(2, "gone")).await.skip_reason(),
        Some(SkipReason::NotASource)
    );
}

#[tokio::test]
async fn admin_edits_take_effect_on_next_message() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let h = harness_with(store, ScriptedTransport::default());

    assert_eq!(
        h.relay.handle(&alice(1, "too early")).await.skip_reason(),
        Some(SkipReason::NotASource)
    );

    h.relay.routing().add_pair(SOURCE, DEST_B, None).unwrap();
    h.relay.handle(&alice(2, "now routed")).await;
    assert_eq!(h.transport.sent_to(DEST_B), vec!["**Alice:** now routed"]);
}

#[tokio::test]
async fn trusted_bot_is_relayed() {
    let transport = Arc::new(ScriptedTransport::default());
    let options = RelayOptions {
        trusted_bots: [UserId(55)].into_iter().collect(),
        send_timeout: Duration::from_secs(1),
        ..RelayOptions::default()
    };
    let store = MemoryStore::with_pairs(vec![ChannelPair::new(SOURCE, DEST_A, "Pair 1")]);
    let relay = Relay::with_options(
        Arc::new(store),
        transport.clone(),
        Arc::new(ManualClock::new(Utc::now())),
        None,
        options,
    );

    let msg = InboundMessage::text(1, SOURCE, Author::bot(55, "Feed"), "rss item");
    relay.handle(&msg).await;
    assert_eq!(transport.sent_to(DEST_A), vec!["**Feed:** rss item"]);
}

#[tokio::test]
async fn shutdown_refuses_new_events() {
    let h = fan_out_harness(ScriptedTransport::default());
    h.relay.shutdown().await;
    assert!(!h.relay.is_accepting());
    assert_eq!(
        h.relay.handle_tracked(&alice(1, "late")).await.skip_reason(),
        Some(SkipReason::ShuttingDown)
    );
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn shutdown_lets_in_flight_relay_finish() {
    let transport = Arc::new(SlowTransport::default());
    let store = MemoryStore::with_pairs(vec![ChannelPair::new(SOURCE, DEST_A, "Pair 1")]);
    let relay = Arc::new(Relay::with_options(
        Arc::new(store),
        transport.clone(),
        Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap())),
        None,
        RelayOptions::default(),
    ));

    let worker = {
        let relay = Arc::clone(&relay);
        tokio::spawn(async move { relay.handle_tracked(&alice(1, "slow")).await })
    };
    // Let the relay reach the transport.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.completed.load(Ordering::SeqCst), 0);

    relay.shutdown().await;
    assert_eq!(transport.completed.load(Ordering::SeqCst), 1);
    assert!(worker.await.unwrap().skip_reason().is_none());
}
