use std::{path::Path, sync::Arc};

use irrigation_monitor::{
    api::testing::FakeTransport, Credentials, FlowMonitor, MonitorError, MonitorSettings,
    RejectionPolicy,
};
use serde_json::{json, Value};
use tempfile::tempdir;

const ZONE_NAME: &str = "Zone # 3 Back Lawn";
const DAY_MS: i64 = 86_400_000;
const MAY_1_MS: i64 = 1_714_521_600_000;

/// Fake controller that answers one token request, then the given flow reports in order.
fn controller(flow_replies: Vec<Value>) -> Arc<FakeTransport> {
    let transport = Arc::new(FakeTransport::new());
    transport.push_reply(
        200,
        json!({
            "access_token": "access",
            "refresh_token": "refresh",
            "expires_in": 3600
        }),
    );
    for reply in flow_replies {
        transport.push_reply(200, reply);
    }
    transport
}

fn token_requests(transport: &FakeTransport) -> usize {
    transport
        .requests()
        .iter()
        .filter(|request| request.form.is_some())
        .count()
}

fn point(day: i64, gallons: f64, note: &str) -> Value {
    json!({ "x": MAY_1_MS + day * DAY_MS, "y": gallons, "note": note })
}

fn flow_response(points: Vec<Value>) -> Value {
    json!({
        "data": {
            "controller": {
                "id": 42,
                "reporting": {
                    "chartType": {
                        "title": "Flow",
                        "results": [{ "name": ZONE_NAME, "data": points }]
                    }
                },
                "zones": [{ "id": 103, "name": ZONE_NAME }]
            }
        }
    })
}

async fn open_monitor(
    dir: &Path,
    transport: Arc<FakeTransport>,
    policy: RejectionPolicy,
) -> FlowMonitor {
    let settings = MonitorSettings {
        history_path: dir.join("history.sqlite3"),
        rejection_policy: policy,
        ..MonitorSettings::default()
    };
    let credentials = Credentials::new("42", "grower@example.com", "hunter2").unwrap();
    FlowMonitor::open(settings, credentials, transport)
        .await
        .expect("open monitor")
}

#[tokio::test]
async fn overlapping_refreshes_store_each_reading_once() {
    let dir = tempdir().unwrap();
    let transport = controller(vec![
        flow_response(vec![
            point(0, 20.0, "Run time: 10 minutes"),
            point(1, 22.0, "Run time: 10 minutes"),
        ]),
        flow_response(vec![
            point(1, 99.0, "Run time: 10 minutes"),
            point(2, 21.0, "Run time: 10 minutes"),
        ]),
    ]);
    let monitor = open_monitor(dir.path(), transport.clone(), RejectionPolicy::DropRecord).await;
    let mut updates = monitor.subscribe();

    monitor.refresh().await.expect("first refresh");
    let table = monitor.refresh().await.expect("second refresh");

    assert_eq!(table.len(), 3);
    let day_one: Vec<_> = table
        .for_zone(3)
        .into_iter()
        .filter(|r| r.timestamp().timestamp_millis() == MAY_1_MS + DAY_MS)
        .collect();
    assert_eq!(day_one.len(), 1);
    assert_eq!(day_one[0].gallons_per_minute(), 2.2);
    assert_eq!(day_one[0].reading.zone_id, 103);

    assert!(updates.has_changed().unwrap());
    assert_eq!(*updates.borrow_and_update(), table);
    assert_eq!(token_requests(&transport), 1);

    let backups = monitor.store().backups().await.unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(monitor.store().load().await.unwrap(), table);
}

#[tokio::test]
async fn reopened_monitor_starts_from_stored_history() {
    let dir = tempdir().unwrap();
    let transport = controller(vec![flow_response(vec![
        point(0, 20.0, "Run time: 10 minutes"),
        point(1, 30.0, "Run time: 15 minutes"),
    ])]);
    let first = open_monitor(dir.path(), transport, RejectionPolicy::DropRecord).await;
    let stored = first.refresh().await.unwrap();
    drop(first);

    let reopened = open_monitor(
        dir.path(),
        Arc::new(FakeTransport::new()),
        RejectionPolicy::DropRecord,
    )
    .await;
    assert_eq!(reopened.history(), stored);
    assert_eq!(reopened.history().zone_choices(), vec![(3, "Back Lawn".to_string())]);
}

#[tokio::test]
async fn spike_is_flagged_by_both_detectors() {
    let dir = tempdir().unwrap();
    let gallons = [10.0, 11.0, 12.0, 10.0, 11.0, 12.0, 60.0];
    let points = gallons
        .iter()
        .enumerate()
        .map(|(day, y)| point(day as i64, *y, "Run time: 1 minute"))
        .collect();
    let transport = controller(vec![flow_response(points)]);
    let monitor = open_monitor(dir.path(), transport, RejectionPolicy::DropRecord).await;

    let table = monitor.refresh().await.unwrap();
    let flagged: Vec<f64> = table
        .outliers_mad()
        .iter()
        .map(|r| r.gallons_per_minute())
        .collect();
    assert_eq!(flagged, vec![60.0]);

    let spike = table
        .records()
        .iter()
        .find(|r| r.gallons_per_minute() == 60.0)
        .unwrap();
    assert!(spike.scores.is_outlier_std);
    assert_eq!(spike.scores.mad_z_score, 49.0);
}

#[tokio::test]
async fn unparsable_note_is_dropped_or_rejects_batch() {
    let readings = || {
        flow_response(vec![
            point(0, 20.0, "Run time: 10 minutes"),
            point(1, 20.0, "Cycle skipped"),
        ])
    };

    let dir = tempdir().unwrap();
    let lenient = open_monitor(
        &dir.path().join("lenient"),
        controller(vec![readings()]),
        RejectionPolicy::DropRecord,
    )
    .await;
    assert_eq!(lenient.refresh().await.unwrap().len(), 1);

    let strict = open_monitor(
        &dir.path().join("strict"),
        controller(vec![readings()]),
        RejectionPolicy::RejectBatch,
    )
    .await;
    let err = strict.refresh().await.unwrap_err();
    assert!(matches!(err, MonitorError::UnparsableNote { .. }));
    assert!(strict.history().is_empty());
    assert!(!strict.store().path().exists());
}

#[tokio::test]
async fn overflowing_reading_does_not_block_merge() {
    let dir = tempdir().unwrap();
    let transport = controller(vec![flow_response(vec![
        point(0, 20.0, "Run time: 10 minutes"),
        point(1, 1e308, "Run time: 1 second"),
    ])]);
    let monitor = open_monitor(dir.path(), transport, RejectionPolicy::DropRecord).await;

    let table = monitor.refresh().await.expect("refresh");
    assert_eq!(table.len(), 1);
    assert_eq!(table.records()[0].gallons_per_minute(), 2.0);
    assert_eq!(monitor.store().load().await.unwrap(), table);
}
