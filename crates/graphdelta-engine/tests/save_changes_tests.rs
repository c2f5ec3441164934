#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use async_trait::async_trait;
use common::{board, card, card_text, set_text, Kanban, CARDS};
use graphdelta_core::logging_facility::init_test_capture;
use graphdelta_core::serialization::to_json;
use graphdelta_core::{
    ExErrorKind, FieldId, Graph, MergeOptions, NodeId, StoreError, StoreHandle, StoreState,
    TrackingState,
};
use graphdelta_core_types::{RequestContext, RequestId, TraceId};
use graphdelta_engine::{ChangeTracker, SaveOutcome, TrackerConfig};

fn ctx(request_id: &str) -> RequestContext {
    RequestContext::with_request_id(RequestId::from_string(request_id.to_string()))
}

#[tokio::test]
async fn test_save_round_trip_cleans_graph() {
    let (graph, board_id, cards, mut store) = board();
    let mut tracker = ChangeTracker::new(graph, TrackerConfig::default());

    set_text(tracker.graph_mut(), &cards[1], "ship it");
    let added = tracker
        .graph_mut()
        .collection_mut(&board_id, CARDS)
        .unwrap()
        .insert(card(None, "review"))
        .unwrap();
    tracker
        .graph_mut()
        .collection_mut(&board_id, CARDS)
        .unwrap()
        .remove(&cards[0])
        .unwrap();

    let outcome = tracker
        .save_changes(&mut store, &ctx("req-round-trip"))
        .await
        .unwrap();

    let SaveOutcome::Saved { apply, merge } = outcome else {
        panic!("expected a save, got {outcome:?}");
    };
    assert_eq!((apply.inserted, apply.updated, apply.deleted), (1, 1, 1));
    assert_eq!(merge.detached, 1);

    let graph = tracker.graph();
    assert!(!graph.has_changes());
    assert!(graph.nodes().all(|n| n.state() == TrackingState::Unchanged));
    assert!(!graph.contains(&cards[0]));
    assert_eq!(card_text(graph, &cards[1]), "ship it");

    // key and foreign key came back from the store
    match graph.data(&added).unwrap() {
        Kanban::Card { id, board_id, .. } => {
            assert!(id.is_some());
            assert_eq!(*board_id, Some(1));
        }
        Kanban::Board { .. } => panic!("not a card"),
    }
    assert_eq!(store.len(), 3);
    assert_eq!(store.commits(), 1);
}

#[tokio::test]
async fn test_no_changes_skips_store() {
    let (graph, _, _, mut store) = board();
    let mut tracker = ChangeTracker::new(graph, TrackerConfig::default());

    let outcome = tracker
        .save_changes(&mut store, &ctx("req-no-changes"))
        .await
        .unwrap();

    assert_eq!(outcome, SaveOutcome::NoChanges);
    assert_eq!(store.commits(), 0);
    assert!(store.flags().is_empty());
    assert!(tracker.get_changes().is_none());
}

#[tokio::test]
async fn test_conflict_leaves_graph_untouched() {
    let (graph, _, cards, mut store) = board();
    let mut tracker = ChangeTracker::new(graph, TrackerConfig::default());
    set_text(tracker.graph_mut(), &cards[0], "write more tests");
    let before = to_json(tracker.graph()).unwrap();

    // someone else saved card 10 in the meantime
    assert!(store.bump_version("Card", 10_i64));

    let request = ctx("req-conflict").with_trace_id(TraceId::from_string("trace-7".to_string()));
    let err = tracker.save_changes(&mut store, &request).await.unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::ConcurrencyConflict);
    assert_eq!(err.code(), "ERR_CONCURRENCY_CONFLICT");
    assert_eq!(err.op(), Some("save_changes"));
    assert_eq!(err.request_id().map(RequestId::as_str), Some("req-conflict"));
    assert_eq!(err.trace_id().map(TraceId::as_str), Some("trace-7"));

    // nothing merged; the edit is still pending and can be retried
    assert_eq!(to_json(tracker.graph()).unwrap(), before);
    assert_eq!(
        tracker.graph().node(&cards[0]).unwrap().state(),
        TrackingState::Modified
    );
}

#[tokio::test]
async fn test_cancelled_commit_can_be_retried() {
    let (graph, _, cards, mut store) = board();
    let mut tracker = ChangeTracker::new(graph, TrackerConfig::default());
    set_text(tracker.graph_mut(), &cards[1], "ship on friday");

    store.cancel_next_commit();
    let err = tracker
        .save_changes(&mut store, &ctx("req-cancel-1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Cancelled);
    assert!(tracker.graph().has_changes());

    let outcome = tracker
        .save_changes(&mut store, &ctx("req-cancel-2"))
        .await
        .unwrap();
    assert!(matches!(outcome, SaveOutcome::Saved { .. }));
    assert!(!tracker.graph().has_changes());
    match &store.row("Card", 11_i64).unwrap().data {
        Kanban::Card { text, .. } => assert_eq!(text, "ship on friday"),
        Kanban::Board { .. } => panic!("not a card"),
    }
}

#[tokio::test]
async fn test_save_emits_boundary_events() {
    let capture = init_test_capture();
    let (graph, _, cards, mut store) = board();
    let mut tracker = ChangeTracker::new(graph, TrackerConfig::default());
    set_text(tracker.graph_mut(), &cards[0], "logged");

    tracker
        .save_changes(&mut store, &ctx("req-log-ok"))
        .await
        .unwrap();

    let ours: Vec<_> = capture
        .events_for("save_changes")
        .into_iter()
        .filter(|e| e.field("request_id") == Some("req-log-ok"))
        .collect();
    assert_eq!(ours.len(), 2);
    assert_eq!(ours[0].event.as_deref(), Some("start"));
    assert_eq!(ours[0].field("nodes"), Some("3"));
    assert_eq!(ours[1].event.as_deref(), Some("end"));
    assert_eq!(ours[1].field("outcome"), Some("saved"));
    assert!(ours[1].field("duration_ms").is_some());
}

#[tokio::test]
async fn test_failed_save_emits_error_event() {
    let capture = init_test_capture();
    let (graph, _, cards, mut store) = board();
    let mut tracker = ChangeTracker::new(graph, TrackerConfig::default());
    set_text(tracker.graph_mut(), &cards[0], "doomed");
    store.bump_version("Card", 10_i64);

    tracker
        .save_changes(&mut store, &ctx("req-log-err"))
        .await
        .unwrap_err();

    let errors = capture.count_events(|e| {
        e.op.as_deref() == Some("save_changes")
            && e.event.as_deref() == Some("error")
            && e.field("request_id") == Some("req-log-err")
            && e.field("err.code") == Some("ERR_CONCURRENCY_CONFLICT")
    });
    assert_eq!(errors, 1);
}

/// Store that accepts every flag but answers with an empty graph
#[derive(Default)]
struct SilentStore {
    flagged: usize,
}

#[async_trait(?Send)]
impl StoreHandle<Kanban> for SilentStore {
    fn set_state(&mut self, _graph: &Graph<Kanban>, _id: &NodeId, _state: StoreState) {
        self.flagged += 1;
    }

    fn set_field_dirty(&mut self, _graph: &Graph<Kanban>, _id: &NodeId, _field: FieldId) {
        self.flagged += 1;
    }

    async fn commit(&mut self) -> Result<Graph<Kanban>, StoreError> {
        Ok(Graph::new())
    }
}

#[tokio::test]
async fn test_unanswered_edit_stays_pending_by_default() {
    let (graph, _, cards, _) = board();
    let mut tracker = ChangeTracker::new(graph, TrackerConfig::default());
    set_text(tracker.graph_mut(), &cards[0], "unanswered");
    let mut store = SilentStore::default();

    let outcome = tracker
        .save_changes(&mut store, &ctx("req-unanswered"))
        .await
        .unwrap();

    let SaveOutcome::Saved { merge, .. } = outcome else {
        panic!("expected a save, got {outcome:?}");
    };
    assert_eq!(merge.unmatched, 1);
    assert_eq!(store.flagged, 2);
    assert_eq!(
        tracker.graph().node(&cards[0]).unwrap().state(),
        TrackingState::Modified
    );
    assert!(tracker.get_changes().is_some());
}

#[tokio::test]
async fn test_strict_config_reaches_merge() {
    let config = TrackerConfig::from_toml_str("[merge]\nstrict_identifiers = true").unwrap();
    assert_eq!(
        config.merge,
        MergeOptions {
            strict_identifiers: true
        }
    );

    let (graph, _, cards, _) = board();
    let mut tracker = ChangeTracker::new(graph, config);
    set_text(tracker.graph_mut(), &cards[0], "strict");
    let before = to_json(tracker.graph()).unwrap();

    let err = tracker
        .save_changes(&mut SilentStore::default(), &ctx("req-strict"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::IdentifierMismatch);
    assert_eq!(tracker.config().merge, config.merge);
    assert_eq!(to_json(tracker.graph()).unwrap(), before);
    assert_eq!(tracker.into_graph().len(), 3);
}
