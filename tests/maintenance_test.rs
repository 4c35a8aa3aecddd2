//! Cluster-wide maintenance runs against simulated nodes

#[path = "simulation/mod.rs"]
mod simulation;

use clustermend::client::{NodeClient, NodeMaintenanceState};
use clustermend::maintenance::{
    finish_nodes, query_status, select_nodes, AggregatorExit, MaintenanceConfig,
    MaintenanceCoordinator, SessionOutcome,
};
use clustermend::prompt::AutoConfirm;
use simulation::{failed_status, status, SimulatedNode};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn config() -> MaintenanceConfig {
    MaintenanceConfig::default().with_poll_interval(Duration::from_secs(1))
}

fn succeeding_node(endpoint: &str) -> Arc<SimulatedNode> {
    Arc::new(SimulatedNode::new(endpoint).with_script(vec![
        status(NodeMaintenanceState::Idle, 0, 0),
        status(NodeMaintenanceState::Running, 2, 0),
        status(NodeMaintenanceState::Running, 2, 1),
        status(NodeMaintenanceState::Succeeded, 2, 2),
    ]))
}

#[tokio::test(start_paused = true)]
async fn test_run_to_completion_and_cleanup() {
    let a = succeeding_node("10.0.0.1:9000");
    let b = Arc::new(SimulatedNode::new("10.0.0.2:9000").with_script(vec![
        status(NodeMaintenanceState::Idle, 0, 0),
        status(NodeMaintenanceState::Running, 2, 0),
        failed_status("drive /data1 went away"),
    ]));
    let clients = vec![a.clone().into_client(), b.clone().into_client()];

    let coordinator = MaintenanceCoordinator::new(clients, config());
    let report = coordinator
        .run(Vec::new(), &AutoConfirm(true), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.exit, AggregatorExit::Completed);
    assert_eq!(
        report.outcomes,
        vec![
            ("10.0.0.1:9000".to_string(), SessionOutcome::Succeeded),
            (
                "10.0.0.2:9000".to_string(),
                SessionOutcome::Failed("drive /data1 went away".to_string())
            ),
        ]
    );
    println!("✓ Sessions finished: {:?}", report.outcomes);

    // each node was started exactly once
    assert_eq!(a.starts.load(Ordering::SeqCst), 1);
    assert_eq!(b.starts.load(Ordering::SeqCst), 1);

    let last_b = report.snapshots[1].as_ref().unwrap();
    assert_eq!(last_b.status, NodeMaintenanceState::Failed);
    assert_eq!(last_b.message, "drive /data1 went away");

    let cleanup = report.cleanup.unwrap();
    assert!(cleanup.is_clean());
    assert_eq!(cleanup.finished.len(), 2);
    assert_eq!(a.finishes.load(Ordering::SeqCst), 1);
    assert_eq!(b.finishes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_declined_cleanup_leaves_nodes_alone() {
    let a = succeeding_node("10.0.0.1:9000");
    let coordinator = MaintenanceCoordinator::new(vec![a.clone().into_client()], config());

    let report = coordinator
        .run(Vec::new(), &AutoConfirm(false), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.exit, AggregatorExit::Completed);
    assert!(report.cleanup.is_none());
    assert_eq!(a.finishes.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_sessions_without_cleanup() {
    let stuck = Arc::new(SimulatedNode::new("10.0.0.1:9000").with_script(vec![
        status(NodeMaintenanceState::Idle, 0, 0),
        status(NodeMaintenanceState::Running, 4, 1),
    ]));
    let coordinator = MaintenanceCoordinator::new(vec![stuck.clone().into_client()], config());
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            cancel.cancel();
        })
    };
    let report = coordinator
        .run(Vec::new(), &AutoConfirm(true), &cancel)
        .await
        .unwrap();
    canceller.await.unwrap();

    assert_eq!(report.exit, AggregatorExit::Cancelled);
    assert_eq!(report.outcomes[0].1, SessionOutcome::Cancelled);
    assert!(report.cleanup.is_none());
    assert_eq!(stuck.finishes.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_returns_despite_silent_node() {
    let silent = Arc::new(SimulatedNode::new("10.0.0.1:9000").unresponsive());
    let healthy = succeeding_node("10.0.0.2:9000");
    let coordinator = MaintenanceCoordinator::new(
        vec![silent.into_client(), healthy.into_client()],
        MaintenanceConfig::default().with_poll_interval(Duration::from_millis(50)),
    );
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        })
    };
    let report = tokio::time::timeout(
        Duration::from_secs(3),
        coordinator.run(Vec::new(), &AutoConfirm(true), &cancel),
    )
    .await
    .expect("run outlived cancellation")
    .unwrap();
    canceller.await.unwrap();

    assert_eq!(report.exit, AggregatorExit::Cancelled);
    assert_eq!(report.outcomes[0].1, SessionOutcome::Cancelled);
    assert!(report.cleanup.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_table_redraws_in_place() {
    let a = succeeding_node("10.0.0.1:9000");
    let coordinator = MaintenanceCoordinator::new(vec![a.into_client()], config());

    // the coordinator owns the writer, so render into a shared buffer
    let out = SharedBuf::default();
    coordinator
        .run(out.clone(), &AutoConfirm(false), &CancellationToken::new())
        .await
        .unwrap();

    let text = String::from_utf8(out.0.lock().clone()).unwrap();
    assert!(text.starts_with("ELAPSED"));
    assert!(text.contains("10.0.0.1:9000"));
    assert!(text.contains("succeeded"));
    assert!(text.contains("\x1b[J"));
}

#[tokio::test]
async fn test_standalone_finish_is_best_effort() {
    let ok = Arc::new(SimulatedNode::new("10.0.0.1:9000"));
    let broken = Arc::new(SimulatedNode::new("10.0.0.2:9000").with_finish_error("not running"));
    let clients = vec![broken.clone().into_client(), ok.clone().into_client()];

    let selected = select_nodes(clients, &[], true).unwrap();
    let report = finish_nodes(&selected).await;

    assert_eq!(report.finished, vec!["10.0.0.1:9000".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "10.0.0.2:9000");
    assert_eq!(ok.finishes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_query_status_snapshot() {
    let node = SimulatedNode::new("10.0.0.1:9000")
        .with_script(vec![status(NodeMaintenanceState::Running, 4, 3)]);

    let snapshot = query_status(&node).await.unwrap();
    assert_eq!(snapshot.endpoint, node.endpoint());
    assert_eq!(snapshot.status, NodeMaintenanceState::Running);
    assert_eq!(snapshot.completed_volumes, 3);
    assert_eq!(snapshot.total_volumes, 4);
    assert_eq!(snapshot.current_volume, "/data3");
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<parking_lot::Mutex<Vec<u8>>>);

impl std::io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
