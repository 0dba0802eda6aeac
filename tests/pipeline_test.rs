mod common;

use common::{fleet, fleet_with, names, sorted, test_config, Reply};
use fleetsh::ssh::AuthMethod;
use fleetsh::{InputError, NodeError, NodeRecord, PipelineExt, StageEvent};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

fn collect(events: &mut UnboundedReceiver<StageEvent>) -> Vec<StageEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn test_each_node_completes_then_batch_completes_once() {
    let dir = TempDir::new().unwrap();
    let (fleet, connector) = fleet(&dir);
    connector.respond(|host, _| {
        let delay = match host {
            "n1" => 60,
            "n2" => 5,
            "n3" => 30,
            _ => 0,
        };
        Reply::ok(&format!("hello from {host}\n")).after(Duration::from_millis(delay))
    });

    let stage = fleet.exec("hostname");
    let mut events = stage.subscribe();
    let out = fleet
        .nodes(vec!["n1", "n2", "n3", "n4"])
        .pipe(stage)
        .drain()
        .await;
    assert_eq!(sorted(out), names(&["n1", "n2", "n3", "n4"]));

    let seen = collect(&mut events);
    assert_eq!(seen.len(), 5);

    let mut completed = Vec::new();
    for event in &seen[..4] {
        match event {
            StageEvent::NodeComplete { node, result } => {
                let output = result.as_ref().unwrap();
                assert_eq!(output.stdout, format!("hello from {node}\n"));
                completed.push(node.clone());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(sorted(completed), names(&["n1", "n2", "n3", "n4"]));

    match &seen[4] {
        StageEvent::BatchComplete(summary) => {
            assert_eq!(summary.nodes, 4);
            assert_eq!(summary.failed, 0);
            assert_eq!(summary.succeeded(), 4);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_every_subscriber_sees_the_batch() {
    let dir = TempDir::new().unwrap();
    let (fleet, _) = fleet(&dir);

    let stage = fleet.exec("true");
    let mut first = stage.subscribe();
    let mut second = stage.subscribe();
    fleet.nodes(vec!["a", "b"]).pipe(stage).drain().await;

    for events in [&mut first, &mut second] {
        let seen = collect(events);
        assert_eq!(seen.len(), 3);
        assert!(matches!(seen.last(), Some(StageEvent::BatchComplete(_))));
    }
}

#[tokio::test]
async fn test_empty_batch_completes_once() {
    let dir = TempDir::new().unwrap();
    let (fleet, connector) = fleet(&dir);

    let stage = fleet.exec("uptime");
    let mut events = stage.subscribe();
    let out = fleet.nodes(Vec::<String>::new()).pipe(stage).drain().await;
    assert!(out.is_empty());

    let seen = collect(&mut events);
    assert_eq!(seen.len(), 1);
    assert!(matches!(
        &seen[0],
        StageEvent::BatchComplete(summary) if summary.nodes == 0 && summary.failed == 0
    ));
    assert_eq!(connector.stats.opens(), 0);
}

#[tokio::test]
async fn test_failures_are_counted() {
    let dir = TempDir::new().unwrap();
    let (fleet, connector) = fleet(&dir);
    connector.unresolvable("down");
    connector.respond(|host, _| Reply {
        exit_code: if host == "bad" { 1 } else { 0 },
        ..Default::default()
    });

    let stage = fleet.exec("systemctl is-active nginx");
    let mut events = stage.subscribe();
    let out = fleet
        .nodes(vec!["ok", "bad", "down"])
        .pipe(stage)
        .drain()
        .await;
    assert_eq!(out.len(), 3);

    let seen = collect(&mut events);
    let down = seen.iter().find_map(|event| match event {
        StageEvent::NodeComplete { node, result } if node == "down" => Some(result),
        _ => None,
    });
    assert!(matches!(down, Some(Err(NodeError::Resolve { .. }))));
    assert!(matches!(
        seen.last(),
        Some(StageEvent::BatchComplete(summary)) if summary.nodes == 3 && summary.failed == 2
    ));
}

#[tokio::test]
async fn test_invalid_packages_pass_nodes_through() {
    let dir = TempDir::new().unwrap();
    let (fleet, connector) = fleet(&dir);

    let stage = fleet.package(vec!["nginx", "rm -rf /"]);
    assert!(stage.command().is_none());
    let mut events = stage.subscribe();
    let out = fleet.nodes(vec!["a", "b"]).pipe(stage).drain().await;

    assert_eq!(sorted(out), names(&["a", "b"]));
    assert_eq!(connector.stats.opens(), 0);

    let seen = collect(&mut events);
    assert_eq!(seen.len(), 3);
    for event in &seen[..2] {
        assert!(matches!(
            event,
            StageEvent::NodeComplete {
                result: Err(NodeError::Input(InputError::PackageName(_))),
                ..
            }
        ));
    }
    assert!(matches!(
        &seen[2],
        StageEvent::BatchComplete(summary) if summary.nodes == 2 && summary.failed == 2
    ));
}

#[tokio::test]
async fn test_package_installs_with_apt() {
    let dir = TempDir::new().unwrap();
    let (fleet, connector) = fleet(&dir);
    let commands = Arc::new(Mutex::new(Vec::new()));
    let seen = commands.clone();
    connector.respond(move |_, command| {
        seen.lock().unwrap().push(command.to_string());
        Reply::default()
    });

    fleet
        .nodes("web-1")
        .pipe(fleet.package("nginx curl"))
        .drain()
        .await;

    assert_eq!(
        *commands.lock().unwrap(),
        vec!["sudo apt-get install -y nginx curl".to_string()]
    );
}

#[tokio::test]
async fn test_names_stream_through_stages() {
    let dir = TempDir::new().unwrap();
    let (fleet, connector) = fleet(&dir);
    connector.respond(|host, _| {
        let delay = if host == "slow" { 300 } else { 0 };
        Reply::ok("ok\n").after(Duration::from_millis(delay))
    });

    let exec = fleet.exec("true");
    let events = Arc::new(Mutex::new(exec.subscribe()));
    let slow_done_first = Arc::new(Mutex::new(None));

    let inspect = {
        let events = events.clone();
        let slow_done_first = slow_done_first.clone();
        fleet.simple("inspect", move |node| {
            let events = events.clone();
            let slow_done_first = slow_done_first.clone();
            async move {
                if node.name() == "fast" {
                    let seen = collect(&mut events.lock().unwrap());
                    let slow_done = seen.iter().any(|event| {
                        matches!(event, StageEvent::NodeComplete { node, .. } if node == "slow")
                    });
                    *slow_done_first.lock().unwrap() = Some(slow_done);
                }
            }
        })
    };

    let out = fleet
        .nodes(vec!["slow", "fast"])
        .pipe(exec)
        .pipe(inspect)
        .drain()
        .await;

    assert_eq!(out, names(&["fast", "slow"]));
    assert_eq!(*slow_done_first.lock().unwrap(), Some(false));
}

#[tokio::test]
async fn test_each_stage_reports_its_own_batch() {
    let dir = TempDir::new().unwrap();
    let (fleet, _) = fleet(&dir);

    let first = fleet.exec("echo one");
    let second = fleet.exec("echo two");
    let mut first_events = first.subscribe();
    let mut second_events = second.subscribe();

    fleet
        .nodes(vec!["a", "b", "c"])
        .pipe(fleet.connect())
        .pipe(first)
        .pipe(second)
        .pipe(fleet.disconnect())
        .drain()
        .await;

    for events in [&mut first_events, &mut second_events] {
        let seen = collect(events);
        let batches: Vec<_> = seen
            .iter()
            .filter_map(|event| match event {
                StageEvent::BatchComplete(summary) => Some(summary.nodes),
                _ => None,
            })
            .collect();
        assert_eq!(batches, vec![3]);
    }
}

#[tokio::test]
async fn test_invalid_entries_are_skipped() {
    let dir = TempDir::new().unwrap();
    let (fleet, _) = fleet(&dir);

    let out = fleet
        .nodes_from_value(&serde_json::json!(["good", "", {"target": "x"}, {"name": "also-good"}]))
        .drain()
        .await;
    assert_eq!(sorted(out), names(&["also-good", "good"]));

    let out = fleet
        .nodes_from_value(&serde_json::json!(17))
        .drain()
        .await;
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_load_failure_still_yields_node() {
    let dir = TempDir::new().unwrap();
    let state_dir = dir.path().join(".ops");
    std::fs::create_dir_all(&state_dir).unwrap();
    std::fs::write(state_dir.join("corrupt.json"), "[1, 2").unwrap();
    std::fs::write(state_dir.join("known.json"), r#"{"target": "known.lan"}"#).unwrap();
    let (fleet, _) = fleet(&dir);

    let out = fleet.nodes(vec!["corrupt", "known"]).drain().await;
    assert_eq!(sorted(out), names(&["corrupt", "known"]));
    assert_eq!(fleet.node("known").unwrap().record().target(), "known.lan");
}

#[tokio::test]
async fn test_save_stage_persists_records() {
    let dir = TempDir::new().unwrap();
    let (fleet, _) = fleet(&dir);

    fleet
        .nodes(vec!["s1", "s2"])
        .pipe(fleet.connect())
        .pipe(fleet.save())
        .pipe(fleet.end())
        .drain()
        .await;

    let saved = std::fs::read_to_string(dir.path().join(".ops").join("s1.json")).unwrap();
    assert!(saved.contains("\"tester\""));
    assert!(dir.path().join(".ops").join("s2.json").exists());
}

#[tokio::test]
async fn test_password_survives_save_and_reload() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let mut config = test_config(&dir);
    config.use_agent = false;
    let (fleet, connector) = fleet_with(config);

    let mut record = NodeRecord::new("db-1");
    record.ssh.password = Some("s3cret".to_string());
    fleet
        .nodes(vec![record])
        .pipe(fleet.connect())
        .pipe(fleet.save())
        .pipe(fleet.disconnect())
        .drain()
        .await;

    // A later pipeline reloads the saved document into the same node.
    let out = fleet.nodes("db-1").drain().await;
    assert_eq!(out, names(&["db-1"]));

    let node = fleet.node("db-1").unwrap();
    assert_eq!(node.record().ssh.password.as_deref(), Some("s3cret"));
    node.connect().await?;
    assert_eq!(
        connector.last_request().unwrap().auth,
        AuthMethod::with_password("s3cret")
    );
    assert_eq!(connector.stats.opens(), 2);
    Ok(())
}
