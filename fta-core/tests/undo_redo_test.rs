use std::sync::Arc;

use fta::fault_tree::{FaultTreeEdge, FaultTreeNode, GraphSnapshot, NodeFields, Position};
use fta::feed::{ChangeEvent, ChangeFeed, EntityChange};
use fta::reconcile::ApplyOutcome;
use fta::sync::{EntityKey, EntityKind, EntityPatch, MemoryRemote, RetryPolicy, SyncState};
use fta::{Command, EditSession, EditorConfig};

fn config() -> EditorConfig {
    EditorConfig {
        retry: RetryPolicy::no_retry(),
        ..EditorConfig::default()
    }
}

/// A session over a remote that already holds `snapshot`.
async fn seeded_session(snapshot: GraphSnapshot) -> (Arc<MemoryRemote>, EditSession<MemoryRemote>) {
    let remote = Arc::new(MemoryRemote::with_snapshot(snapshot));
    let session = EditSession::load(remote.clone(), &config())
        .await
        .expect("Failed to load session");
    (remote, session)
}

fn three_nodes() -> GraphSnapshot {
    GraphSnapshot {
        nodes: vec![
            FaultTreeNode::new("n1", "Loss of cooling", Position::new(0.0, 0.0)),
            FaultTreeNode::new("n2", "Pump failure", Position::new(10.0, 10.0)),
            FaultTreeNode::new("n3", "Valve closed", Position::new(20.0, 20.0)),
        ],
        edges: vec![FaultTreeEdge::new("e1", "n1", "n2")],
    }
}

#[tokio::test]
async fn test_add_node_undo_redo() {
    let (remote, mut session) = seeded_session(GraphSnapshot::default()).await;

    let report = session
        .add_node(FaultTreeNode::new("n1", "Top event", Position::new(0.0, 0.0)))
        .await
        .unwrap();
    assert!(report.is_synced());
    assert!(remote.node("n1").await.is_some());

    session.undo().await.unwrap();
    assert!(!session.store().contains_node("n1"));
    assert!(remote.node("n1").await.is_none());

    session.redo().await.unwrap();
    let node = session.store().node("n1").unwrap();
    assert_eq!(node.position, Position::new(0.0, 0.0));
    assert_eq!(remote.node("n1").await.unwrap().label, "Top event");
}

#[tokio::test]
async fn test_move_node_undo_redo() {
    let (remote, mut session) = seeded_session(three_nodes()).await;

    session.move_node("n1", Position::new(100.0, 50.0)).await.unwrap();
    assert_eq!(session.store().node("n1").unwrap().position, Position::new(100.0, 50.0));

    session.undo().await.unwrap();
    assert_eq!(session.store().node("n1").unwrap().position, Position::new(0.0, 0.0));
    assert_eq!(remote.node("n1").await.unwrap().position, Position::new(0.0, 0.0));

    session.redo().await.unwrap();
    assert_eq!(session.store().node("n1").unwrap().position, Position::new(100.0, 50.0));
    assert_eq!(remote.node("n1").await.unwrap().position, Position::new(100.0, 50.0));
}

#[tokio::test]
async fn test_delete_node_undo_restores_label_position_and_edges() {
    let (remote, mut session) = seeded_session(three_nodes()).await;

    session.delete_node("n2").await.unwrap();
    assert!(!session.store().contains_node("n2"));
    assert!(!session.store().contains_edge("e1"));
    assert!(remote.edge("e1").await.is_none());

    session.undo().await.unwrap();
    let node = session.store().node("n2").unwrap();
    assert_eq!(node.label, "Pump failure");
    assert_eq!(node.position, Position::new(10.0, 10.0));
    assert!(session.store().contains_edge("e1"));
    assert!(remote.node("n2").await.is_some());
    assert!(remote.edge("e1").await.is_some());
}

#[tokio::test]
async fn test_batch_move_undo_restores_every_node() {
    let (remote, mut session) = seeded_session(three_nodes()).await;

    session
        .batch_move(vec![
            ("n1".to_string(), Position::new(5.0, 5.0)),
            ("n2".to_string(), Position::new(15.0, 15.0)),
            ("n3".to_string(), Position::new(25.0, 25.0)),
        ])
        .await
        .unwrap();
    assert_eq!(session.log().len(), 1);

    let report = session.undo().await.unwrap();
    assert_eq!(report.synced.len(), 3);
    for (id, expected) in [
        ("n1", Position::new(0.0, 0.0)),
        ("n2", Position::new(10.0, 10.0)),
        ("n3", Position::new(20.0, 20.0)),
    ] {
        assert_eq!(session.store().node(id).unwrap().position, expected);
        assert_eq!(remote.node(id).await.unwrap().position, expected);
    }
}

#[tokio::test]
async fn test_add_for_existing_id_is_rejected_and_undo_keeps_the_original() {
    let (remote, mut session) = seeded_session(three_nodes()).await;
    session.move_node("n3", Position::new(5.0, 5.0)).await.unwrap();
    let calls = remote.call_count();

    let err = session
        .add_node(FaultTreeNode::new("n1", "Replacement", Position::default()))
        .await
        .unwrap_err();
    assert!(err.is_duplicate());
    let err = session
        .add_edge(FaultTreeEdge::new("e1", "n1", "n3"))
        .await
        .unwrap_err();
    assert!(err.is_duplicate());
    assert_eq!(session.log().len(), 1);
    assert_eq!(remote.call_count(), calls);

    // Undo reverts the move, not the rejected adds.
    session.undo().await.unwrap();
    assert_eq!(session.store().node("n1").unwrap().label, "Loss of cooling");
    assert_eq!(session.store().edge("e1").unwrap().target, "n2");
    assert_eq!(session.store().node("n3").unwrap().position, Position::new(20.0, 20.0));
    assert_eq!(remote.node("n1").await.unwrap().label, "Loss of cooling");
    assert!(remote.edge("e1").await.is_some());
}

#[tokio::test]
async fn test_update_undo_restores_only_touched_fields() {
    let (remote, mut session) = seeded_session(three_nodes()).await;

    session
        .update_node("n3", NodeFields::default().with_label("Valve stuck closed"))
        .await
        .unwrap();
    // Another client collapses the node in the meantime.
    let mut collapsed = remote.node("n3").await.unwrap();
    collapsed.collapsed = true;
    remote.put_node(collapsed).await;

    session.undo().await.unwrap();
    let node = remote.node("n3").await.unwrap();
    assert_eq!(node.label, "Valve closed");
    assert!(node.collapsed);
}

#[tokio::test]
async fn test_skipped_history_step_makes_no_remote_calls() {
    let remote = Arc::new(MemoryRemote::with_snapshot(three_nodes()));
    let feed = ChangeFeed::new(16);
    let mut session = EditSession::load(remote.clone(), &config())
        .await
        .unwrap()
        .with_client_id("me")
        .with_changes(feed.subscribe("a1").await);

    session.move_node("n3", Position::new(1.0, 1.0)).await.unwrap();
    feed.publish(ChangeEvent::new(
        "a1",
        "someone-else",
        EntityChange::Deleted {
            kind: EntityKind::Node,
            id: "n3".to_string(),
        },
    ))
    .await;
    assert_eq!(session.drain_changes(), 1);

    let calls = remote.call_count();
    let report = session.undo().await.unwrap();
    assert!(matches!(report.outcome, ApplyOutcome::Skipped { .. }));
    assert_eq!(remote.call_count(), calls);
    assert!(session.can_redo());
}

#[tokio::test]
async fn test_failed_remote_call_keeps_local_change_and_retry_clears_flag() {
    let (remote, mut session) = seeded_session(three_nodes()).await;

    remote.set_available(false);
    let report = session.move_node("n2", Position::new(40.0, 40.0)).await.unwrap();
    assert!(!report.is_synced());
    assert_eq!(report.failed[0].0, EntityKey::node("n2"));
    assert_eq!(session.store().node("n2").unwrap().position, Position::new(40.0, 40.0));
    assert_eq!(session.sync_state(EntityKind::Node, "n2"), SyncState::Failed);
    assert_eq!(session.unsynced(), vec![EntityKey::node("n2")]);

    remote.set_available(true);
    let completion = session.retry_failed().await;
    assert_eq!(completion.synced, vec![EntityKey::node("n2")]);
    assert_eq!(session.sync_state(EntityKind::Node, "n2"), SyncState::Synced);
    assert_eq!(remote.node("n2").await.unwrap().position, Position::new(40.0, 40.0));
}

#[tokio::test]
async fn test_retry_replays_parents_before_children() {
    let (remote, mut session) = seeded_session(GraphSnapshot::default()).await;

    remote.set_available(false);
    session
        .add_node(FaultTreeNode::new("top", "Top", Position::default()))
        .await
        .unwrap();
    session
        .add_node(FaultTreeNode::new("cause", "Cause", Position::new(0.0, 80.0)))
        .await
        .unwrap();
    session
        .add_edge(FaultTreeEdge::new("e1", "top", "cause"))
        .await
        .unwrap();
    assert_eq!(session.unsynced().len(), 3);

    remote.set_available(true);
    let completion = session.retry_failed().await;
    assert!(completion.failed.is_empty());
    assert!(session.unsynced().is_empty());
    assert!(remote.edge("e1").await.is_some());
}

#[tokio::test]
async fn test_out_of_order_acknowledgements_leave_the_remote_current() {
    let (remote, mut session) = seeded_session(three_nodes()).await;
    let reconciler = session.reconciler();

    let first = session
        .execute_local(Command::MoveNode {
            subject_id: "n1".to_string(),
            before: Position::new(0.0, 0.0),
            after: Position::new(10.0, 0.0),
        })
        .unwrap();
    let second = session
        .execute_local(Command::MoveNode {
            subject_id: "n1".to_string(),
            before: Position::new(10.0, 0.0),
            after: Position::new(20.0, 0.0),
        })
        .unwrap();

    // The later request is answered first.
    let second_results = reconciler.dispatch(second.tickets.clone()).await;
    let second_report = session.complete(second, second_results);
    assert_eq!(second_report.synced, vec![EntityKey::node("n1")]);

    // The older move lands last and overwrites the newer one remotely.
    let first_results = reconciler.dispatch(first.tickets.clone()).await;
    let first_report = session.complete(first, first_results);
    assert!(first_report.synced.is_empty());
    assert_eq!(first_report.failed[0].0, EntityKey::node("n1"));
    assert_eq!(remote.node("n1").await.unwrap().position, Position::new(10.0, 0.0));
    assert_eq!(session.sync_state(EntityKind::Node, "n1"), SyncState::Failed);

    let completion = session.retry_failed().await;
    assert_eq!(completion.synced, vec![EntityKey::node("n1")]);
    assert_eq!(session.sync_state(EntityKind::Node, "n1"), SyncState::Synced);
    assert_eq!(session.store().node("n1").unwrap().position, Position::new(20.0, 0.0));
    assert_eq!(remote.node("n1").await.unwrap().position, Position::new(20.0, 0.0));
}

#[tokio::test]
async fn test_older_acknowledgement_before_newer_is_discarded() {
    let (remote, mut session) = seeded_session(three_nodes()).await;
    let reconciler = session.reconciler();

    let first = session
        .execute_local(Command::MoveNode {
            subject_id: "n3".to_string(),
            before: Position::new(20.0, 20.0),
            after: Position::new(30.0, 30.0),
        })
        .unwrap();
    let second = session
        .execute_local(Command::MoveNode {
            subject_id: "n3".to_string(),
            before: Position::new(30.0, 30.0),
            after: Position::new(40.0, 40.0),
        })
        .unwrap();

    let first_results = reconciler.dispatch(first.tickets.clone()).await;
    let report = session.complete(first, first_results);
    assert_eq!(report.stale, vec![EntityKey::node("n3")]);
    assert_eq!(session.sync_state(EntityKind::Node, "n3"), SyncState::Pending);

    let second_results = reconciler.dispatch(second.tickets.clone()).await;
    session.complete(second, second_results);
    assert_eq!(session.sync_state(EntityKind::Node, "n3"), SyncState::Synced);
    assert_eq!(remote.node("n3").await.unwrap().position, Position::new(40.0, 40.0));
}

#[tokio::test]
async fn test_stale_failure_superseded_by_later_success_is_ignored() {
    let (remote, mut session) = seeded_session(three_nodes()).await;
    let reconciler = session.reconciler();

    let first = session
        .execute_local(Command::MoveNode {
            subject_id: "n2".to_string(),
            before: Position::new(10.0, 10.0),
            after: Position::new(11.0, 11.0),
        })
        .unwrap();
    let second = session
        .execute_local(Command::MoveNode {
            subject_id: "n2".to_string(),
            before: Position::new(11.0, 11.0),
            after: Position::new(12.0, 12.0),
        })
        .unwrap();

    let second_results = reconciler.dispatch(second.tickets.clone()).await;
    session.complete(second, second_results);

    remote.set_available(false);
    let first_results = reconciler.dispatch(first.tickets.clone()).await;
    let report = session.complete(first, first_results);
    assert!(report.failed.is_empty());
    assert_eq!(session.sync_state(EntityKind::Node, "n2"), SyncState::Synced);
}

#[tokio::test]
async fn test_change_events_from_other_clients_are_folded_in() {
    let remote = Arc::new(MemoryRemote::with_snapshot(three_nodes()));
    let feed = ChangeFeed::new(16);
    let mut session = EditSession::load(remote.clone(), &config())
        .await
        .unwrap()
        .with_client_id("me")
        .with_changes(feed.subscribe("a1").await);

    feed.publish(ChangeEvent::new(
        "a1",
        "other",
        EntityChange::Patched {
            id: "n1".to_string(),
            patch: EntityPatch::Node(NodeFields::default().with_label("Loss of coolant")),
        },
    ))
    .await;
    feed.publish(ChangeEvent::new(
        "a1",
        "other",
        EntityChange::Moved {
            id: "n3".to_string(),
            position: Position::new(99.0, 99.0),
        },
    ))
    .await;
    // Our own echo is ignored.
    feed.publish(ChangeEvent::new(
        "a1",
        "me",
        EntityChange::Deleted {
            kind: EntityKind::Node,
            id: "n2".to_string(),
        },
    ))
    .await;

    assert_eq!(session.drain_changes(), 2);
    let n1 = session.store().node("n1").unwrap();
    assert_eq!(n1.label, "Loss of coolant");
    assert_eq!(n1.position, Position::new(0.0, 0.0));
    assert_eq!(session.store().node("n3").unwrap().position, Position::new(99.0, 99.0));
    assert!(session.store().contains_node("n2"));
}

#[tokio::test]
async fn test_change_events_do_not_overwrite_unsynced_entities() {
    let remote = Arc::new(MemoryRemote::with_snapshot(three_nodes()));
    let feed = ChangeFeed::new(16);
    let mut session = EditSession::load(remote.clone(), &config())
        .await
        .unwrap()
        .with_client_id("me")
        .with_changes(feed.subscribe("a1").await);

    remote.set_available(false);
    session.move_node("n1", Position::new(7.0, 7.0)).await.unwrap();

    feed.publish(ChangeEvent::new(
        "a1",
        "other",
        EntityChange::Moved {
            id: "n1".to_string(),
            position: Position::new(-5.0, -5.0),
        },
    ))
    .await;
    assert_eq!(session.drain_changes(), 0);
    assert_eq!(session.store().node("n1").unwrap().position, Position::new(7.0, 7.0));
}

#[tokio::test]
async fn test_refresh_preserves_unsynced_entities() {
    let (remote, mut session) = seeded_session(three_nodes()).await;

    remote.set_available(false);
    session
        .add_node(FaultTreeNode::new("draft", "Draft event", Position::new(3.0, 3.0)))
        .await
        .unwrap();
    remote.set_available(true);
    remote
        .put_node(FaultTreeNode::new("theirs", "Added elsewhere", Position::default()))
        .await;

    assert!(session.refresh().await.unwrap());
    assert!(session.store().contains_node("draft"));
    assert!(session.store().contains_node("theirs"));
    assert_eq!(session.store().node_count(), 5);
}

#[tokio::test]
async fn test_refresh_is_deferred_while_calls_are_in_flight() {
    let (remote, mut session) = seeded_session(three_nodes()).await;
    let reconciler = session.reconciler();

    let pending = session
        .execute_local(Command::MoveNode {
            subject_id: "n1".to_string(),
            before: Position::new(0.0, 0.0),
            after: Position::new(1.0, 1.0),
        })
        .unwrap();
    remote
        .put_node(FaultTreeNode::new("theirs", "Added elsewhere", Position::default()))
        .await;

    assert!(!session.refresh().await.unwrap());
    assert!(session.refresh_is_pending());
    assert!(!session.store().contains_node("theirs"));

    let results = reconciler.dispatch(pending.tickets.clone()).await;
    session.complete(pending, results);
    assert!(session.refresh_deferred().await.unwrap());
    assert!(!session.refresh_is_pending());
    assert!(session.store().contains_node("theirs"));
    assert_eq!(session.store().node("n1").unwrap().position, Position::new(1.0, 1.0));
}

#[tokio::test]
async fn test_history_limit_evicts_oldest_command() {
    let remote = Arc::new(MemoryRemote::with_snapshot(three_nodes()));
    let config = EditorConfig {
        history_limit: 2,
        ..config()
    };
    let mut session = EditSession::load(remote, &config).await.unwrap();

    for x in 1..=3 {
        session
            .move_node("n1", Position::new(x as f64, 0.0))
            .await
            .unwrap();
    }
    assert_eq!(session.log().len(), 2);
    session.undo().await.unwrap();
    session.undo().await.unwrap();
    assert!(session.undo().await.is_none());
    assert_eq!(session.store().node("n1").unwrap().position, Position::new(1.0, 0.0));
}
