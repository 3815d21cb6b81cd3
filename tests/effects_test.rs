///! Receipt and smart-reply decisions made from view changes.
///!
///! The coordinator's debounce runs on synthetic instants, so nothing here
///! sleeps.
///!
///! Run with: `cargo test --test effects_test`
use chrono::Utc;
use std::time::Duration;
use tokio::time::Instant;

use chat_client::chat::effects::{Effect, SideEffectCoordinator};
use chat_client::chat::store::MessageStore;
use chat_client::error::ChatError;
use chat_client::models::Message;

const ME: &str = "me";
const DEBOUNCE: Duration = Duration::from_millis(800);

fn msg(id: &str, sender: &str) -> Message {
    Message::text(id, sender, "hi", Utc::now())
}

fn setup() -> (MessageStore, SideEffectCoordinator) {
    let mut store = MessageStore::new();
    let coordinator = SideEffectCoordinator::new(ME.to_string(), DEBOUNCE, &mut store);
    (store, coordinator)
}

fn smart_reply_calls(effects: &[Effect]) -> Vec<String> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::FetchSmartReplies { trigger_id } => Some(trigger_id.clone()),
            Effect::MarkReceipts { .. } => None,
        })
        .collect()
}

/// Helper: process pending changes at `now`, then let the debounce run out.
fn settle(coordinator: &mut SideEffectCoordinator, now: Instant) -> Vec<Effect> {
    let mut effects = coordinator.process_changes(now);
    effects.extend(coordinator.poll_timers(now + DEBOUNCE));
    effects
}

#[test]
fn test_smart_reply_trigger_sequence() {
    let (mut store, mut coordinator) = setup();
    let t0 = Instant::now();

    // 1. A foreign last message triggers exactly one call.
    store.append_live(msg("m1", "bob"));
    let effects = settle(&mut coordinator, t0);
    assert_eq!(smart_reply_calls(&effects), vec!["m1"]);
    coordinator.apply_suggestions("m1", Ok(vec!["Sure".into(), "No".into()]));
    assert_eq!(coordinator.smart_replies().suggestions.len(), 2);

    // 2. Another change with the same last id issues nothing new.
    store.apply_seen("m1", ME);
    let effects = settle(&mut coordinator, t0 + Duration::from_secs(2));
    assert!(smart_reply_calls(&effects).is_empty());

    // 3. An own last message clears suggestions and issues nothing.
    store.append_live(msg("m_own", ME));
    let effects = settle(&mut coordinator, t0 + Duration::from_secs(4));
    assert!(smart_reply_calls(&effects).is_empty());
    assert!(coordinator.smart_replies().suggestions.is_empty());

    // 4. A new foreign last message triggers exactly one new call.
    store.append_live(msg("m2", "bob"));
    let effects = settle(&mut coordinator, t0 + Duration::from_secs(6));
    assert_eq!(smart_reply_calls(&effects), vec!["m2"]);
}

#[test]
fn test_debounce_waits_for_quiet_period() {
    let (mut store, mut coordinator) = setup();
    let t0 = Instant::now();

    store.append_live(msg("m1", "bob"));
    coordinator.process_changes(t0);
    assert_eq!(coordinator.next_deadline(), Some(t0 + DEBOUNCE));
    assert!(coordinator.poll_timers(t0 + Duration::from_millis(799)).is_empty());

    // A second message inside the window restarts it for the newer id.
    let t1 = t0 + Duration::from_millis(500);
    store.append_live(msg("m2", "carol"));
    coordinator.process_changes(t1);
    assert!(coordinator.poll_timers(t0 + DEBOUNCE).is_empty());

    let fired = coordinator.poll_timers(t1 + DEBOUNCE);
    assert_eq!(smart_reply_calls(&fired), vec!["m2"]);
    assert!(coordinator.smart_replies().loading);
    assert_eq!(coordinator.next_deadline(), None);
}

#[test]
fn test_foreign_tail_marks_receipts_own_tail_does_not() {
    let (mut store, mut coordinator) = setup();
    let now = Instant::now();

    store.append_live(msg("m1", "bob"));
    assert_eq!(
        coordinator.process_changes(now),
        vec![Effect::MarkReceipts {
            message_id: "m1".into()
        }]
    );

    store.append_live(msg("m2", ME));
    assert!(coordinator.process_changes(now).is_empty());
}

#[test]
fn test_receipts_only_look_at_the_last_message() {
    let (mut store, mut coordinator) = setup();
    let now = Instant::now();

    store.load_historical_page(vec![msg("m1", "bob"), msg("m2", "bob"), msg("m3", "carol")]);
    let effects = coordinator.process_changes(now);

    assert_eq!(
        effects,
        vec![Effect::MarkReceipts {
            message_id: "m3".into()
        }]
    );
}

#[test]
fn test_tail_without_sender_marks_no_receipts() {
    let (mut store, mut coordinator) = setup();
    let now = Instant::now();

    let anonymous: Message =
        serde_json::from_value(serde_json::json!({ "_id": "m1", "content": "hi" })).unwrap();
    assert_eq!(anonymous.sender_id, "");
    store.append_live(anonymous);

    let effects = coordinator.process_changes(now);
    assert!(
        !effects
            .iter()
            .any(|e| matches!(e, Effect::MarkReceipts { .. }))
    );
}

#[test]
fn test_superseded_suggestions_are_discarded() {
    let (mut store, mut coordinator) = setup();
    let t0 = Instant::now();

    store.append_live(msg("m1", "bob"));
    settle(&mut coordinator, t0);
    store.append_live(msg("m2", "bob"));
    settle(&mut coordinator, t0 + Duration::from_secs(2));

    // The answer for m1 arrives after m2 triggered its own request.
    assert!(!coordinator.apply_suggestions("m1", Ok(vec!["stale".into()])));
    assert!(coordinator.smart_replies().suggestions.is_empty());
    assert!(coordinator.smart_replies().loading);

    assert!(coordinator.apply_suggestions("m2", Ok(vec!["fresh".into()])));
    assert_eq!(coordinator.smart_replies().suggestions, vec!["fresh"]);
    assert!(!coordinator.smart_replies().loading);
}

#[test]
fn test_failed_generation_is_not_retried_for_same_trigger() {
    let (mut store, mut coordinator) = setup();
    let t0 = Instant::now();

    store.append_live(msg("m1", "bob"));
    settle(&mut coordinator, t0);
    coordinator.apply_suggestions("m1", Err(ChatError::Transport("offline".into())));

    store.apply_delivered("m1", "carol");
    let effects = settle(&mut coordinator, t0 + Duration::from_secs(2));

    assert!(smart_reply_calls(&effects).is_empty());
    assert!(coordinator.smart_replies().suggestions.is_empty());
}

#[test]
fn test_take_suggestion_clears_all() {
    let (mut store, mut coordinator) = setup();
    store.append_live(msg("m1", "bob"));
    settle(&mut coordinator, Instant::now());
    coordinator.apply_suggestions("m1", Ok(vec!["a".into(), "b".into(), "c".into()]));

    assert_eq!(coordinator.take_suggestion(1).as_deref(), Some("b"));
    assert!(coordinator.smart_replies().suggestions.is_empty());
    assert_eq!(coordinator.take_suggestion(0), None);
}

#[test]
fn test_reset_cancels_pending_debounce() {
    let (mut store, mut coordinator) = setup();
    let t0 = Instant::now();

    store.append_live(msg("m1", "bob"));
    coordinator.process_changes(t0);
    store.reset();
    coordinator.reset();

    assert_eq!(coordinator.next_deadline(), None);
    assert!(coordinator.poll_timers(t0 + DEBOUNCE).is_empty());
    assert!(coordinator.process_changes(t0).is_empty());
}
