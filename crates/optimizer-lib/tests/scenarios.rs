//! End-to-end optimization passes against in-process collaborators

mod common;

use common::*;
use optimizer_lib::{StepStatus, StopReason};

#[tokio::test]
async fn test_after_hours_stop_is_audited_and_notified() {
    let now = local_time(21, 0);
    let f = fixture(
        config(false),
        FakeGateway::default().with_cpu("i-001", 2.0, now),
        FakeCompute::default(),
        RecordingNotifier::default(),
    );

    let summary = f.coordinator.run(vec![candidate("i-001")], now).await;

    assert_eq!(summary.evaluated, 1);
    assert_eq!(summary.stopped, 1);
    assert_eq!(summary.failed, 0);

    let outcome = summary.outcome("i-001").unwrap();
    assert_eq!(outcome.verdict.reason, Some(StopReason::AfterHours));
    assert_eq!(f.compute.stopped(), vec!["i-001"]);

    let records = f.audit.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].instance_id, "i-001");
    assert_eq!(records[0].timestamp, "2024-03-05 21:00:00");
    assert_eq!(records[0].reason, "After hours");
    assert!(!records[0].dry_run);

    assert_eq!(f.notifier.messages(), vec!["Stopped i-001 due to After hours"]);
}

#[tokio::test]
async fn test_low_cpu_stop_during_business_hours() {
    let now = local_time(14, 0);
    let f = fixture(
        config(false),
        FakeGateway::default().with_cpu("i-002", 2.0, now),
        FakeCompute::default(),
        RecordingNotifier::default(),
    );

    let summary = f.coordinator.run(vec![candidate("i-002")], now).await;

    let outcome = summary.outcome("i-002").unwrap();
    assert_eq!(outcome.verdict.reason, Some(StopReason::LowCpu(2.0)));
    assert_eq!(outcome.utilization_percent, Some(2.0));
    assert_eq!(f.compute.stopped(), vec!["i-002"]);
    assert_eq!(f.audit.records().await[0].reason, "Low CPU: 2%");
    assert_eq!(f.notifier.messages(), vec!["Stopped i-002 due to Low CPU: 2%"]);
}

#[tokio::test]
async fn test_missing_utilization_keeps_instance_running() {
    let now = local_time(14, 0);
    let f = fixture(
        config(false),
        FakeGateway::default(),
        FakeCompute::default(),
        RecordingNotifier::default(),
    );

    let summary = f.coordinator.run(vec![candidate("i-003")], now).await;

    let outcome = summary.outcome("i-003").unwrap();
    assert!(!outcome.verdict.should_stop());
    assert!(outcome.action.is_none());
    assert_eq!(summary.stopped, 0);
    assert!(f.compute.stopped().is_empty());
    assert!(f.audit.records().await.is_empty());
    assert!(f.notifier.messages().is_empty());
}

#[tokio::test]
async fn test_dry_run_audits_and_marks_notification() {
    let now = local_time(14, 0);
    let f = fixture(
        config(true),
        FakeGateway::default().with_cpu("i-002", 2.0, now),
        FakeCompute::default(),
        RecordingNotifier::default(),
    );

    let summary = f.coordinator.run(vec![candidate("i-002")], now).await;

    assert!(summary.dry_run);
    assert_eq!(summary.stopped, 1);
    let outcome = summary.outcome("i-002").unwrap();
    assert_eq!(outcome.action.as_ref().unwrap().stop, StepStatus::Simulated);

    assert!(f.compute.stopped().is_empty());

    let records = f.audit.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reason, "Low CPU: 2%");
    assert!(records[0].dry_run);

    assert_eq!(
        f.notifier.messages(),
        vec!["Stopped i-002 due to Low CPU: 2% (simulated)"]
    );
}

#[tokio::test]
async fn test_cpu_at_or_above_threshold_is_kept() {
    let now = local_time(10, 30);
    let f = fixture(
        config(false),
        FakeGateway::default()
            .with_cpu("i-010", 5.0, now)
            .with_cpu("i-011", 60.0, now),
        FakeCompute::default(),
        RecordingNotifier::default(),
    );

    let summary = f
        .coordinator
        .run(vec![candidate("i-010"), candidate("i-011")], now)
        .await;

    assert_eq!(summary.evaluated, 2);
    assert_eq!(summary.stopped, 0);
    assert!(f.audit.records().await.is_empty());
}

#[tokio::test]
async fn test_instance_failures_do_not_affect_others() {
    let now = local_time(14, 0);
    let f = fixture(
        config(false),
        FakeGateway::default()
            .with_cpu("i-ok", 1.0, now)
            .with_cpu("i-stop-fails", 1.0, now)
            .with_cpu("i-notify-fails", 1.0, now)
            .failing_for("i-no-metrics"),
        FakeCompute::default().failing_for("i-stop-fails"),
        RecordingNotifier::default().failing_for("i-notify-fails"),
    );

    let summary = f
        .coordinator
        .run(
            vec![
                candidate("i-ok"),
                candidate("i-stop-fails"),
                candidate("i-notify-fails"),
                candidate("i-no-metrics"),
            ],
            now,
        )
        .await;

    assert_eq!(summary.evaluated, 4);
    assert_eq!(summary.stopped, 2);
    assert_eq!(summary.failed, 2);

    // Failed real stop: no audit record, no notification
    let stop_failed = summary.outcome("i-stop-fails").unwrap();
    let action = stop_failed.action.as_ref().unwrap();
    assert!(action.stop.is_failed());
    assert_eq!(action.audit, StepStatus::Skipped);
    assert_eq!(action.notification, StepStatus::Skipped);

    // Notification failure still leaves the audit record
    let notify_failed = summary.outcome("i-notify-fails").unwrap();
    let action = notify_failed.action.as_ref().unwrap();
    assert_eq!(action.audit, StepStatus::Completed);
    assert!(action.notification.is_failed());

    // Metric failure degrades to no data and never stops
    let no_metrics = summary.outcome("i-no-metrics").unwrap();
    assert!(no_metrics.metric_error.is_some());
    assert!(!no_metrics.verdict.should_stop());

    let mut audited: Vec<_> = f
        .audit
        .records()
        .await
        .into_iter()
        .map(|r| r.instance_id)
        .collect();
    audited.sort();
    assert_eq!(audited, vec!["i-notify-fails", "i-ok"]);
    assert_eq!(f.compute.stopped(), vec!["i-notify-fails", "i-ok"]);
    assert_eq!(f.notifier.messages(), vec!["Stopped i-ok due to Low CPU: 1%"]);
}

#[tokio::test]
async fn test_metric_failure_after_hours_still_stops() {
    let now = local_time(23, 15);
    let f = fixture(
        config(false),
        FakeGateway::default().failing_for("i-020"),
        FakeCompute::default(),
        RecordingNotifier::default(),
    );

    let summary = f.coordinator.run(vec![candidate("i-020")], now).await;

    let outcome = summary.outcome("i-020").unwrap();
    assert!(outcome.metric_error.is_some());
    assert_eq!(outcome.verdict.reason, Some(StopReason::AfterHours));
    assert_eq!(f.compute.stopped(), vec!["i-020"]);
}

#[tokio::test]
async fn test_audit_and_notification_iff_stop_verdict() {
    let now = local_time(12, 0);
    let ids: Vec<String> = (0..12).map(|i| format!("i-{:03}", i)).collect();
    let mut gateway = FakeGateway::default();
    for (i, id) in ids.iter().enumerate() {
        // Alternate below and above the 5% threshold; every third has no data
        if i % 3 != 2 {
            gateway = gateway.with_cpu(id, if i % 2 == 0 { 1.5 } else { 42.0 }, now);
        }
    }

    let f = fixture(
        config(false),
        gateway,
        FakeCompute::default(),
        RecordingNotifier::default(),
    );
    let summary = f
        .coordinator
        .run(ids.iter().map(|id| candidate(id)).collect(), now)
        .await;

    let mut expected: Vec<String> = summary
        .outcomes
        .iter()
        .filter(|o| o.verdict.should_stop())
        .map(|o| o.instance_id.clone())
        .collect();
    expected.sort();

    let mut audited: Vec<String> = f
        .audit
        .records()
        .await
        .into_iter()
        .map(|r| r.instance_id)
        .collect();
    audited.sort();

    assert!(!expected.is_empty());
    assert_eq!(audited, expected);
    assert_eq!(f.notifier.messages().len(), expected.len());
    assert_eq!(summary.stopped, expected.len());
}

#[tokio::test]
async fn test_invocation_returns_completion_body() {
    let now = local_time(21, 0);
    let f = fixture(
        config(false),
        FakeGateway::default(),
        FakeCompute::default(),
        RecordingNotifier::default(),
    );
    let (optimizer, audit, _notifier) = f.into_optimizer(FakeInventory {
        candidates: Some(vec![candidate("i-001"), candidate("i-002")]),
    });

    let (response, summary) = optimizer.invoke_at(now).await;

    assert_eq!(response.status_code, 200);
    let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(body["message"], "Optimization complete");
    assert_eq!(body["evaluated"], 2);
    assert_eq!(body["stopped"], 2);
    assert_eq!(summary.unwrap().stopped, 2);
    assert_eq!(audit.records().await.len(), 2);
}

#[tokio::test]
async fn test_inventory_failure_evaluates_nothing() {
    let f = fixture(
        config(false),
        FakeGateway::default(),
        FakeCompute::default(),
        RecordingNotifier::default(),
    );
    let (optimizer, audit, notifier) = f.into_optimizer(FakeInventory { candidates: None });

    let (response, summary) = optimizer.invoke(&serde_json::json!({})).await;

    assert_eq!(response.status_code, 502);
    assert!(response.body.contains("throttled"));
    assert!(summary.is_none());
    assert!(audit.records().await.is_empty());
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn test_sequential_run_matches_concurrent_run() {
    let now = local_time(15, 0);
    let ids = ["i-a", "i-b", "i-c", "i-d"];

    let mut results = Vec::new();
    for concurrency in ["1", "4"] {
        let config = optimizer_lib::OptimizerConfig::from_vars([
            ("TIMEZONE", TIMEZONE),
            ("TABLE_NAME", "optimizer-audit"),
            ("NOTIFICATION_TARGET", "http://alerts.local/hook"),
            ("MAX_CONCURRENCY", concurrency),
        ])
        .unwrap();
        let gateway = FakeGateway::default()
            .with_cpu("i-a", 0.5, now)
            .with_cpu("i-b", 30.0, now)
            .with_cpu("i-d", 4.9, now);
        let f = fixture(config, gateway, FakeCompute::default(), RecordingNotifier::default());

        let summary = f
            .coordinator
            .run(ids.iter().map(|id| candidate(id)).collect(), now)
            .await;
        let verdicts: Vec<_> = summary
            .outcomes
            .iter()
            .map(|o| (o.instance_id.clone(), o.verdict))
            .collect();
        results.push(verdicts);
    }

    assert_eq!(results[0], results[1]);
    assert_eq!(results[0].len(), 4);
}
