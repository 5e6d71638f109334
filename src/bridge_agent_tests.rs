use std::path::Path;
use std::time::{Duration, Instant};

use crate::bridge_agent::BridgeAgent;
use crate::bridge_command::{Command, CommandReply, Vector3};
use crate::bridge_mailbox::{BridgeState, MailboxChannel};
use crate::editor_host::SceneHost;
use crate::in_memory_editor::InMemoryEditor;
use crate::refresh_escalation::{EscalationChain, RefreshStrategy};
use crate::source_watcher::SourceWatcher;

fn agent_in(dir: &Path, start: Instant) -> BridgeAgent<InMemoryEditor> {
    BridgeAgent::new(
        InMemoryEditor::new(),
        MailboxChannel::new(dir.join("mailbox")),
        Duration::from_secs(1),
        EscalationChain::default(),
        start,
    )
}

/// Send `raw` the way the external actor does and run one tick
fn round_trip(agent: &mut BridgeAgent<InMemoryEditor>, raw: &str, now: Instant) -> String {
    let external = agent.mailbox().clone();
    external.send(raw).unwrap();
    let report = agent.tick(now);
    let result = external.try_receive_result().unwrap().expect("a result should be written");
    assert_eq!(report.command_result.as_deref(), Some(result.as_str()));
    result
}

#[test]
fn test_idle_tick_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let start = Instant::now();
    let mut agent = agent_in(dir.path(), start);

    let report = agent.tick(start);
    assert!(report.is_empty());
    assert_eq!(agent.mailbox().try_receive_result().unwrap(), None);
}

#[test]
fn test_create_gameobject_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let start = Instant::now();
    let mut agent = agent_in(dir.path(), start);

    let result = round_trip(&mut agent, "create_gameobject|Player", start);
    assert!(result.starts_with("Success:"));
    assert!(result.contains("Player"));
    assert!(agent.host().find_game_object("Player").is_some());
}

#[test]
fn test_set_property_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let start = Instant::now();
    let mut agent = agent_in(dir.path(), start);

    round_trip(&mut agent, "create_gameobject|Player", start);
    let result = round_trip(&mut agent, "set_property|Player|position|(1,2,3)", start);
    assert!(result.contains("position"));
    assert!(result.contains("(1, 2, 3)"));
    assert_eq!(
        agent.host().find_game_object("Player").unwrap().position,
        Vector3::new(1.0, 2.0, 3.0)
    );

    let ghost = round_trip(&mut agent, "set_property|Ghost|position|(1,2,3)", start);
    assert!(ghost.starts_with("Error:"));
    assert!(ghost.contains("not found"));
}

#[test]
fn test_structured_command_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let start = Instant::now();
    let mut agent = agent_in(dir.path(), start);

    let command = Command::new("create_gameobject", vec!["Left|Door".to_string()]);
    let result = round_trip(&mut agent, &command.encode(), start);
    assert_eq!(result, "Success: Created GameObject 'Left|Door'");
}

#[test]
fn test_tagged_command_gets_tagged_reply() {
    let dir = tempfile::tempdir().unwrap();
    let start = Instant::now();
    let mut agent = agent_in(dir.path(), start);
    let external = agent.mailbox().clone();

    external
        .send(&Command::new("create_gameobject", vec!["Player".to_string()]).with_id(9).encode())
        .unwrap();
    let report = agent.tick(start);
    assert_eq!(report.command_result.as_deref(), Some("Success: Created GameObject 'Player'"));

    let raw = external.try_receive_result().unwrap().unwrap();
    assert_eq!(
        CommandReply::parse(&raw),
        Some(CommandReply::new(9, "Success: Created GameObject 'Player'"))
    );
}

#[test]
fn test_one_command_per_tick() {
    let dir = tempfile::tempdir().unwrap();
    let start = Instant::now();
    let mut agent = agent_in(dir.path(), start);

    agent.mailbox().send("ping").unwrap();
    assert!(agent.tick(start).command_result.is_some());
    assert!(agent.tick(start).command_result.is_none());
}

#[test]
fn test_change_burst_fires_one_escalation() {
    let dir = tempfile::tempdir().unwrap();
    let start = Instant::now();
    let mut agent = agent_in(dir.path(), start);
    let mut fired_at = Vec::new();

    for tick in 0..=20u64 {
        let millis = tick * 100;
        if matches!(millis, 0 | 200 | 400) {
            agent.notify_source_changed(Path::new("Assets/Scripts/Player.cs"));
        }
        if let Some(report) = agent.tick(start + Duration::from_millis(millis)).refresh {
            assert_eq!(report.outcomes.len(), 5);
            fired_at.push(millis);
        }
    }

    assert_eq!(fired_at.len(), 1);
    assert!(fired_at[0] >= 1000);
    assert_eq!(agent.host().refresh_calls(), RefreshStrategy::ALL.to_vec());
}

#[test]
fn test_failing_strategy_does_not_break_tick() {
    let dir = tempfile::tempdir().unwrap();
    let start = Instant::now();
    let mut agent = agent_in(dir.path(), start);
    agent.host_mut().fail_strategy(RefreshStrategy::ForceReimport);

    agent.notify_source_changed(Path::new("Assets/A.cs"));
    agent.mailbox().send("ping").unwrap();
    let report = agent.tick(start + Duration::from_secs(2));

    assert_eq!(report.command_result.as_deref(), Some("pong"));
    let refresh = report.refresh.expect("refresh should fire");
    assert_eq!(refresh.failed(), 1);
    assert_eq!(refresh.succeeded(), 4);
}

#[test]
fn test_deferred_command_runs_on_later_tick() {
    let dir = tempfile::tempdir().unwrap();
    let start = Instant::now();
    let mut agent = agent_in(dir.path(), start);

    let ack = round_trip(&mut agent, "create_gameobject|Player|0.25", start);
    assert!(ack.starts_with("Success: Scheduled"));
    assert_eq!(agent.pending_deferred(), 1);

    assert!(agent.tick(start + Duration::from_millis(100)).deferred.is_empty());
    let report = agent.tick(start + Duration::from_millis(300));
    assert_eq!(report.deferred.len(), 1);
    assert_eq!(report.deferred[0].result, "Success: Created GameObject 'Player'");
    assert!(agent.host().find_game_object("Player").is_some());

    // The deferred outcome is not written over the acknowledgement slot
    assert_eq!(agent.mailbox().try_receive_result().unwrap(), None);
}

#[test]
fn test_deferred_failure_is_reported_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    let start = Instant::now();
    let mut agent = agent_in(dir.path(), start);

    round_trip(&mut agent, "delete_gameobject|Ghost|0.1", start);
    let report = agent.tick(start + Duration::from_secs(1));
    assert_eq!(report.deferred[0].result, "Error: GameObject 'Ghost' not found");
}

#[test]
fn test_status_follows_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let start = Instant::now();
    let external = MailboxChannel::new(dir.path().join("mailbox"));

    {
        let mut agent = agent_in(dir.path(), start);
        assert_eq!(external.read_status().unwrap(), None);

        agent.start();
        assert!(agent.is_active());
        assert_eq!(external.read_status().unwrap().unwrap().state, BridgeState::Active);
    }

    // Dropping the agent publishes idle
    assert_eq!(external.read_status().unwrap().unwrap().state, BridgeState::Idle);
}

#[test]
fn test_watcher_changes_reach_trigger() {
    let dir = tempfile::tempdir().unwrap();
    let assets = dir.path().join("Assets");
    std::fs::create_dir_all(&assets).unwrap();

    let start = Instant::now();
    let watcher = SourceWatcher::new(&assets, &["cs".to_string()]).unwrap();
    let mut agent = agent_in(dir.path(), start).with_watcher(watcher);

    std::fs::write(assets.join("Player.cs"), "public class Player {}").unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while agent.trigger().notification_count() == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
        agent.tick(start);
    }

    assert!(agent.trigger().notification_count() > 0);
    assert!(agent.trigger().is_pending());
    assert!(agent.tick(start + Duration::from_secs(2)).refresh.is_some());
}

#[tokio::test]
async fn test_run_until_serves_commands() {
    let dir = tempfile::tempdir().unwrap();
    let mut agent = agent_in(dir.path(), Instant::now());
    let external = agent.mailbox().clone();
    external.send("create_gameobject|Player").unwrap();

    agent
        .run_until(
            Duration::from_millis(5),
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await;

    assert_eq!(
        external.try_receive_result().unwrap().as_deref(),
        Some("Success: Created GameObject 'Player'")
    );
    assert!(!agent.is_active());
    assert_eq!(external.read_status().unwrap().unwrap().state, BridgeState::Idle);
}
