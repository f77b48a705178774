//! End-to-end tests against real worker processes

mod common;

use common::*;
use fleet_engine::{
    AgentConfig, AgentId, ControllerMessage, EngineError, ProcessSupervisor, Subscriber, WorkerEvent, WorkerMessage,
};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::broadcast;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_application_messages_round_trip_through_cat() {
    let supervisor = cat_supervisor();
    let mut events = supervisor.events();
    supervisor.spawn(AgentConfig::new(1, "echo"), Value::Null).unwrap();

    assert!(supervisor.send_message(1, ControllerMessage::application("ping", json!({"n": 1}))));

    // The echoed start message is not a worker message and gets skipped
    match next_message(&mut events, 1).await {
        WorkerMessage::Application { action, payload } => {
            assert_eq!(action, "ping");
            assert_eq!(payload, json!({"n": 1}));
        }
        other => panic!("unexpected message: {:?}", other),
    }

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_start_message_is_sent_first() {
    let supervisor = scripted_supervisor();
    let mut events = supervisor.events();
    supervisor
        .spawn(AgentConfig::new(2, "builder"), json!({"server": "localhost"}))
        .unwrap();

    assert!(matches!(next_message(&mut events, 2).await, WorkerMessage::Ready));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_player_list_round_trip() {
    let supervisor = scripted_supervisor();
    supervisor.spawn(AgentConfig::new(3, "miner"), Value::Null).unwrap();

    let players = supervisor.request_player_list(3, REQUEST_TIMEOUT).await.unwrap();
    assert_eq!(players, json!(["alice", "bob"]));
    assert!(supervisor.player_list_requests().is_empty());

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_command_success_and_rejection() {
    let supervisor = scripted_supervisor();
    supervisor.spawn(AgentConfig::new(4, "guard"), Value::Null).unwrap();

    let result = supervisor
        .execute_command(4, "dig", json!([]), Some("steve".to_string()), REQUEST_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(result, json!({"ran": "dig"}));

    match supervisor
        .execute_command(4, "fail", json!([]), None, REQUEST_TIMEOUT)
        .await
    {
        Err(EngineError::RequestRejected(message)) => assert_eq!(message, "unknown command"),
        other => panic!("unexpected outcome: {:?}", other),
    }

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_requests_are_correlated() {
    let supervisor = scripted_supervisor();
    supervisor.spawn(AgentConfig::new(5, "scout"), Value::Null).unwrap();

    let (players, entities, command) = tokio::join!(
        supervisor.request_player_list(5, REQUEST_TIMEOUT),
        supervisor.request_nearby_entities(5, 16.0, REQUEST_TIMEOUT),
        supervisor.execute_command(5, "look", json!({"dir": "north"}), None, REQUEST_TIMEOUT),
    );

    assert_eq!(players.unwrap(), json!(["alice", "bob"]));
    assert_eq!(entities.unwrap()[0]["name"], "zombie");
    assert_eq!(command.unwrap(), json!({"ran": "look"}));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_plugin_updates_reach_subscribers() {
    let supervisor = scripted_supervisor();
    supervisor.spawn(AgentConfig::new(6, "farmer"), Value::Null).unwrap();

    let (subscriber, mut rx) = Subscriber::channel();
    supervisor.subscribe_to_plugin_ui(6, "map", subscriber.clone());

    let update = tokio::time::timeout(REQUEST_TIMEOUT, rx.recv())
        .await
        .expect("no plugin update arrived")
        .expect("subscriber channel closed");
    assert_eq!(update.agent_id, 6);
    assert_eq!(update.plugin_name, "map");
    assert_eq!(update.payload, json!({"tick": 1}));

    supervisor.handle_subscriber_disconnect(&subscriber);
    assert!(supervisor.get_plugin_subscribers(6, "map").is_none());

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_stop_message_ends_worker_cleanly() {
    let supervisor = scripted_supervisor();
    let mut events = supervisor.events();
    let handle = supervisor.spawn(AgentConfig::new(7, "idle"), Value::Null).unwrap();

    assert!(supervisor.send_message(7, ControllerMessage::Stop));
    assert_eq!(wait_for_exit(&mut events, 7).await, Some(0));

    assert!(!supervisor.is_running(7));
    assert_eq!(handle.exit_code(), Some(0));
    // Exited workers stay registered until removed
    assert!(supervisor.get_process(7).is_some());
    assert!(!supervisor.send_message(7, ControllerMessage::Stop));
}

#[tokio::test]
async fn test_killed_worker_leaves_requests_pending_until_timeout() {
    let supervisor = cat_supervisor();
    let mut events = supervisor.events();
    supervisor.spawn(AgentConfig::new(8, "doomed"), Value::Null).unwrap();

    let reply = supervisor.command_requests().register("late", Duration::from_millis(300));
    assert!(supervisor.kill(8, "kill"));
    wait_for_exit(&mut events, 8).await;

    assert_eq!(supervisor.pending_count().command, 1);
    assert!(matches!(reply.await, Err(EngineError::RequestTimeout)));
    assert_eq!(supervisor.pending_count().command, 0);
}

/// Plugins the worker reported as stopped, up to the echo of a marker message
async fn stopped_plugins(
    supervisor: &ProcessSupervisor,
    events: &mut broadcast::Receiver<WorkerEvent>,
    agent: AgentId,
) -> Vec<String> {
    assert!(supervisor.send_message(agent, ControllerMessage::application("marker", json!(null))));

    let mut stopped = vec![];
    loop {
        match next_message(events, agent).await {
            WorkerMessage::Application { action, payload } if action == "stopped-updates" => {
                stopped.push(payload.as_str().unwrap_or_default().to_string());
            }
            WorkerMessage::Application { action, .. } if action == "echo" => return stopped,
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_last_unsubscribe_stops_updates() {
    let supervisor = scripted_supervisor();
    let mut events = supervisor.events();
    supervisor.spawn(AgentConfig::new(9, "watcher"), Value::Null).unwrap();

    let (first, _first_rx) = Subscriber::channel();
    let (second, _second_rx) = Subscriber::channel();
    supervisor.subscribe_to_plugin_ui(9, "map", first.clone());
    supervisor.subscribe_to_plugin_ui(9, "map", second.clone());

    supervisor.unsubscribe_from_plugin_ui(9, "map", &first);
    assert!(stopped_plugins(&supervisor, &mut events, 9).await.is_empty());

    supervisor.unsubscribe_from_plugin_ui(9, "map", &second);
    assert_eq!(stopped_plugins(&supervisor, &mut events, 9).await, vec!["map"]);

    // Leaving a topic that no longer exists sends nothing
    supervisor.unsubscribe_from_plugin_ui(9, "map", &second);
    assert!(stopped_plugins(&supervisor, &mut events, 9).await.is_empty());

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_stops_each_emptied_topic_once() {
    let supervisor = scripted_supervisor();
    let mut events = supervisor.events();
    supervisor.spawn(AgentConfig::new(10, "watcher"), Value::Null).unwrap();

    let (leaving, _leaving_rx) = Subscriber::channel();
    let (staying, _staying_rx) = Subscriber::channel();
    supervisor.subscribe_to_plugin_ui(10, "map", leaving.clone());
    supervisor.subscribe_to_plugin_ui(10, "inventory", leaving.clone());
    supervisor.subscribe_to_plugin_ui(10, "chat", leaving.clone());
    supervisor.subscribe_to_plugin_ui(10, "chat", staying.clone());

    supervisor.handle_subscriber_disconnect(&leaving);
    let mut stopped = stopped_plugins(&supervisor, &mut events, 10).await;
    stopped.sort();
    assert_eq!(stopped, vec!["inventory", "map"]);
    assert!(supervisor.get_plugin_subscribers(10, "chat").unwrap().contains(&staying));

    supervisor.handle_subscriber_disconnect(&staying);
    assert_eq!(stopped_plugins(&supervisor, &mut events, 10).await, vec!["chat"]);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_invalid_utf8_on_stdout_is_skipped() {
    let supervisor = shell_supervisor(r#"printf '\377\376\n'; printf '{"type":"ready"}\n'; cat >/dev/null"#);
    let mut events = supervisor.events();
    supervisor.spawn(AgentConfig::new(11, "garbled"), Value::Null).unwrap();

    assert!(matches!(next_message(&mut events, 11).await, WorkerMessage::Ready));
    assert!(supervisor.is_running(11));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_overlong_stdout_line_is_skipped() {
    let supervisor = shell_supervisor(
        r#"head -c 9000000 /dev/zero | tr '\000' 'a'; printf '\n{"type":"ready"}\n'; cat >/dev/null"#,
    );
    let mut events = supervisor.events();
    supervisor.spawn(AgentConfig::new(12, "verbose"), Value::Null).unwrap();

    assert!(matches!(next_message(&mut events, 12).await, WorkerMessage::Ready));
    assert!(supervisor.is_running(12));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_invalid_utf8_on_stderr_keeps_worker_alive() {
    let supervisor = shell_supervisor(
        r#"printf '\377\n' >&2
sleep 0.3
i=0
while [ $i -lt 200 ]; do echo diag >&2; i=$((i+1)); done
printf '{"type":"ready"}\n'
cat >/dev/null"#,
    );
    let mut events = supervisor.events();
    supervisor.spawn(AgentConfig::new(13, "noisy"), Value::Null).unwrap();

    assert!(matches!(next_message(&mut events, 13).await, WorkerMessage::Ready));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(supervisor.is_running(13));

    supervisor.shutdown().await;
}
