//! Worker-slot supersession and shutdown behavior
//!
//! These tests verify that:
//! - Dispatching a second operation of the same kind cancels its
//!   predecessor, whose result is discarded without any event
//! - Operations of different kinds run in parallel without disturbing
//!   each other
//! - `quiesce` cancels every in-flight worker and completes nothing

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cloudbench_core::config::LayeredConfig;
use cloudbench_core::models::{ParamValue, PointBuffers};
use cloudbench_core::ports::{
    CancelFlag, ExecutionOutput, ExecutionPlan, PipelineBackend, PointWriter, StageReport,
};
use cloudbench_core::{CloudbenchError, Result};
use cloudbench_engine::LasFileWriter;
use cloudbench_session::{ProgressUpdate, Session, SessionDeps, SessionEvent};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

/// Passes the seed through unchanged after `delay`, polling the cancel
/// flag the whole time
struct SlowBackend {
    delay: Duration,
}

impl PipelineBackend for SlowBackend {
    fn execute(
        &self,
        plan: &ExecutionPlan,
        cancel: &CancelFlag,
        on_stage: &mut dyn FnMut(StageReport),
    ) -> Result<ExecutionOutput> {
        let started = Instant::now();
        while started.elapsed() < self.delay {
            if cancel.is_cancelled() {
                return Err(CloudbenchError::Interrupted);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        if cancel.is_cancelled() {
            return Err(CloudbenchError::Interrupted);
        }
        let points = match &plan.seed {
            Some(seed) => seed.as_ref().clone(),
            None => PointBuffers::from_xyz(vec![0.0], vec![0.0], vec![0.0]),
        };
        for (index, group) in plan.groups.iter().enumerate() {
            if let Some(tag) = &group.tag {
                on_stage(StageReport {
                    index,
                    tag: tag.clone(),
                    input_count: points.len() as u64,
                    output_count: points.len() as u64,
                });
            }
        }
        Ok(ExecutionOutput {
            count: points.len() as u64,
            points,
        })
    }
}

fn write_fixture(dir: &TempDir) -> PathBuf {
    let n = 20;
    let points = PointBuffers::from_xyz(
        (0..n).map(|i| i as f64).collect(),
        vec![0.0; n],
        vec![0.0; n],
    );
    let path = dir.path().join("cloud.las");
    LasFileWriter::new()
        .write_points(&path, &points, None)
        .unwrap();
    path
}

fn slow_session(delay: Duration) -> (Session, UnboundedReceiver<SessionEvent>) {
    let config = LayeredConfig::with_defaults();
    let mut deps = SessionDeps::native(&config);
    deps.backend = Arc::new(SlowBackend { delay });
    Session::new(deps, &config)
}

async fn drain_until(
    events: &mut UnboundedReceiver<SessionEvent>,
    terminal: impl Fn(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        let event = timeout(Duration::from_secs(30), events.recv())
            .await
            .expect("timed out waiting for session events")
            .expect("event channel closed");
        let done = terminal(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

fn completed(event: &SessionEvent) -> bool {
    matches!(event, SessionEvent::Progress(ProgressUpdate::Percent(100)))
}

fn decimation(step: i64) -> std::collections::BTreeMap<String, ParamValue> {
    let mut params = std::collections::BTreeMap::new();
    params.insert("step".to_string(), ParamValue::Int(step));
    params
}

#[tokio::test]
async fn test_rapid_refilter_discards_superseded_worker() {
    let dir = TempDir::new().unwrap();
    let source = write_fixture(&dir);
    let (session, mut events) = slow_session(Duration::from_millis(200));

    session.load_layer(source).await.unwrap();
    drain_until(&mut events, completed).await;

    session
        .apply_filter("cloud", "Decimation", &decimation(2))
        .await
        .unwrap();
    session
        .apply_filter("cloud", "Decimation", &decimation(4))
        .await
        .unwrap();
    let seen = drain_until(&mut events, completed).await;

    let added: Vec<String> = seen
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StageAdded { details, .. } => Some(details.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(added.len(), 1, "superseded filter must not land: {:?}", added);
    assert!(added[0].contains("step:4"));
    assert!(!seen
        .iter()
        .any(|e| matches!(e, SessionEvent::OperationFailed { .. })));

    let layer = session.layer("cloud").unwrap();
    assert_eq!(layer.stages.len(), 1);
    assert_eq!(layer.stages[0].params["step"], ParamValue::Int(4));

    // the cancelled predecessor must stay silent even after the winner
    tokio::time::sleep(Duration::from_millis(50)).await;
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(
                event,
                SessionEvent::StageAdded { .. } | SessionEvent::OperationFailed { .. }
            ),
            "unexpected trailing event: {:?}",
            event
        );
    }
}

#[tokio::test]
async fn test_different_kinds_run_in_parallel() {
    let dir = TempDir::new().unwrap();
    let source = write_fixture(&dir);
    let (session, mut events) = slow_session(Duration::from_millis(100));

    session.load_layer(source).await.unwrap();
    drain_until(&mut events, completed).await;

    session
        .apply_filter("cloud", "Decimation", &decimation(2))
        .await
        .unwrap();
    session.calculate_statistics("cloud").await.unwrap();

    let mut saw_stage = false;
    let mut saw_stats = false;
    while !(saw_stage && saw_stats) {
        let event = timeout(Duration::from_secs(30), events.recv())
            .await
            .expect("timed out waiting for both operations")
            .expect("event channel closed");
        match event {
            SessionEvent::StageAdded { .. } => saw_stage = true,
            SessionEvent::StatsReady { .. } => saw_stats = true,
            SessionEvent::OperationFailed { message, .. } => {
                panic!("no operation may fail: {}", message)
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_quiesce_discards_in_flight_work() {
    let dir = TempDir::new().unwrap();
    let source = write_fixture(&dir);
    let (session, mut events) = slow_session(Duration::from_millis(200));

    session.load_layer(source).await.unwrap();
    drain_until(&mut events, completed).await;

    session
        .apply_filter("cloud", "Decimation", &decimation(2))
        .await
        .unwrap();
    session.quiesce().await;

    let mut saw_added = false;
    let mut saw_complete = false;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::StageAdded { .. } => saw_added = true,
            SessionEvent::Progress(ProgressUpdate::Percent(100)) => saw_complete = true,
            _ => {}
        }
    }
    assert!(!saw_added, "quiesced filter must not land a stage");
    assert!(!saw_complete, "quiesced filter must not report completion");
    assert!(session.layer("cloud").unwrap().stages.is_empty());
}
