mod common;

use std::time::Duration;

use tokio::time::Instant;

use common::{deliver, logged, orchestrator, settings, MockClient, SentMessage, Step, PHONE};
use pairlink::commands::STATUS_REPLY;
use pairlink::session::{
    ConnectError, DisconnectError, ExternalState, SendError, SessionState,
};

const CONTACT: &str = "5521988887777@c.us";

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

#[tokio::test(start_paused = true)]
async fn pairing_code_returns_before_session_is_established() {
    let client = MockClient::with_scripts(vec![MockClient::pairing_flow(
        "ABCD-1234",
        secs(1),
        secs(5),
    )]);
    let orchestrator = orchestrator(client.clone(), settings(secs(45)));

    let start = Instant::now();
    let status = orchestrator.connect(PHONE).await.unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed >= secs(1) && elapsed < secs(2), "took {:?}", elapsed);
    assert_eq!(status.state, SessionState::AwaitingCode);
    assert_eq!(status.pairing_code.as_deref(), Some("ABCD-1234"));
    assert_eq!(status.phone_number.as_deref(), Some(PHONE));
    assert!(status.connected_at.is_none());

    tokio::time::sleep(secs(6)).await;

    let status = orchestrator.status();
    assert_eq!(status.state, SessionState::Connected);
    assert!(status.pairing_code.is_none());
    assert!(status.connected_at.is_some());
    assert!(status.last_error.is_none());
    assert!(logged(&orchestrator, "Bot connected successfully"));
    assert_eq!(client.establish_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn direct_establish_resolves_connected() {
    let client = MockClient::with_scripts(vec![vec![Step::Sleep(secs(2)), Step::Establish]]);
    let orchestrator = orchestrator(client, settings(secs(45)));

    let status = orchestrator.connect(PHONE).await.unwrap();
    assert_eq!(status.state, SessionState::Connected);
    assert!(status.pairing_code.is_none());
    assert!(status.connected_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn silent_client_times_out_at_deadline() {
    let client = MockClient::new();
    let orchestrator = orchestrator(client, settings(secs(2)));

    let start = Instant::now();
    let status = orchestrator.connect(PHONE).await.unwrap();

    assert!(start.elapsed() >= secs(2) && start.elapsed() < secs(3));
    assert_eq!(status.state, SessionState::TimedOut);
    assert!(status.pairing_code.is_none());
    assert!(status.last_error.is_some());
    assert!(logged(&orchestrator, "timed out after 2s"));
}

#[tokio::test(start_paused = true)]
async fn late_session_after_timeout_is_closed() {
    let client = MockClient::with_scripts(vec![vec![Step::Sleep(secs(3)), Step::Establish]]);
    let orchestrator = orchestrator(client.clone(), settings(secs(2)));

    let status = orchestrator.connect(PHONE).await.unwrap();
    assert_eq!(status.state, SessionState::TimedOut);

    tokio::time::sleep(secs(2)).await;

    assert_eq!(client.closes(), 1);
    assert_eq!(orchestrator.status().state, SessionState::TimedOut);
    assert!(matches!(
        orchestrator.send_message(CONTACT, "hi").await,
        Err(SendError::NotConnected)
    ));
}

#[tokio::test(start_paused = true)]
async fn second_connect_while_connecting_is_rejected() {
    let client = MockClient::new();
    let orchestrator = orchestrator(client.clone(), settings(secs(45)));

    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.connect(PHONE).await })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(orchestrator.status().state, SessionState::Connecting);

    let second = orchestrator.connect(PHONE).await;
    assert!(matches!(
        second,
        Err(ConnectError::AlreadyConnecting { .. })
    ));
    assert_eq!(client.establish_calls(), 1);

    // Disconnect cancels the pending attempt instead of waiting out the deadline.
    let status = orchestrator.disconnect().await.unwrap();
    assert_eq!(status.state, SessionState::Disconnected);
    assert_eq!(first.await.unwrap(), Err(ConnectError::Superseded));
}

#[tokio::test(start_paused = true)]
async fn invalid_phone_leaves_state_untouched() {
    let client = MockClient::new();
    let orchestrator = orchestrator(client.clone(), settings(secs(45)));

    assert!(matches!(
        orchestrator.connect("123").await,
        Err(ConnectError::InvalidPhoneNumber(_))
    ));
    assert!(matches!(
        orchestrator.connect("4421999998888").await,
        Err(ConnectError::InvalidPhoneNumber(_))
    ));
    assert_eq!(orchestrator.status().state, SessionState::Idle);
    assert_eq!(client.establish_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn establish_failure_is_reported_and_retryable() {
    let client = MockClient::with_scripts(vec![
        vec![Step::Sleep(secs(1)), Step::Fail("boom".to_string())],
        vec![Step::Code("ABCD-1234".to_string())],
    ]);
    let orchestrator = orchestrator(client.clone(), settings(secs(45)));

    let err = orchestrator.connect(PHONE).await.unwrap_err();
    assert_eq!(err, ConnectError::EstablishFailed("boom".to_string()));
    let status = orchestrator.status();
    assert_eq!(status.state, SessionState::Failed);
    assert_eq!(status.last_error.as_deref(), Some("boom"));

    let status = orchestrator.connect(PHONE).await.unwrap();
    assert_eq!(status.state, SessionState::AwaitingCode);
    assert!(status.last_error.is_none());
    assert_eq!(client.establish_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn failure_after_code_moves_to_failed() {
    let client = MockClient::with_scripts(vec![vec![
        Step::Code("ABCD-1234".to_string()),
        Step::Sleep(secs(3)),
        Step::Fail("pairing rejected".to_string()),
    ]]);
    let orchestrator = orchestrator(client, settings(secs(45)));

    let status = orchestrator.connect(PHONE).await.unwrap();
    assert_eq!(status.state, SessionState::AwaitingCode);

    tokio::time::sleep(secs(4)).await;
    let status = orchestrator.status();
    assert_eq!(status.state, SessionState::Failed);
    assert!(status.pairing_code.is_none());
    assert_eq!(status.last_error.as_deref(), Some("pairing rejected"));
}

#[tokio::test(start_paused = true)]
async fn failure_after_external_connected_moves_to_failed() {
    let client = MockClient::with_scripts(vec![
        vec![
            Step::Code("ABCD-1234".to_string()),
            Step::Sleep(secs(1)),
            Step::State(ExternalState::Connected),
            Step::Sleep(secs(1)),
            Step::Fail("browser crashed".to_string()),
        ],
        vec![Step::Establish],
    ]);
    let orchestrator = orchestrator(client.clone(), settings(secs(45)));

    let status = orchestrator.connect(PHONE).await.unwrap();
    assert_eq!(status.state, SessionState::AwaitingCode);

    tokio::time::sleep(secs(5)).await;
    let status = orchestrator.status();
    assert_eq!(status.state, SessionState::Failed);
    assert!(status.connected_at.is_none());
    assert!(status.pairing_code.is_none());
    assert_eq!(status.last_error.as_deref(), Some("browser crashed"));
    assert!(logged(&orchestrator, "Error connecting: browser crashed"));
    assert!(!logged(&orchestrator, "stale attempt"));

    let status = orchestrator.connect(PHONE).await.unwrap();
    assert_eq!(status.state, SessionState::Connected);
    assert_eq!(client.establish_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn failure_after_external_disconnect_is_recorded() {
    let client = MockClient::with_scripts(vec![vec![
        Step::Code("ABCD-1234".to_string()),
        Step::Sleep(secs(1)),
        Step::State(ExternalState::Connected),
        Step::State(ExternalState::Disconnected),
        Step::Sleep(secs(1)),
        Step::Fail("browser crashed".to_string()),
    ]]);
    let orchestrator = orchestrator(client, settings(secs(45)));
    orchestrator.connect(PHONE).await.unwrap();

    tokio::time::sleep(secs(5)).await;
    let status = orchestrator.status();
    assert_eq!(status.state, SessionState::Disconnected);
    assert_eq!(status.last_error.as_deref(), Some("browser crashed"));
    assert!(!logged(&orchestrator, "stale attempt"));
}

#[tokio::test(start_paused = true)]
async fn disconnect_without_session_changes_nothing() {
    let orchestrator = orchestrator(MockClient::new(), settings(secs(45)));

    assert_eq!(
        orchestrator.disconnect().await,
        Err(DisconnectError::NoActiveSession)
    );
    assert_eq!(orchestrator.status().state, SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn disconnect_closes_handle_and_clears_fields() {
    let client = MockClient::with_scripts(vec![vec![Step::Establish]]);
    let orchestrator = orchestrator(client.clone(), settings(secs(45)));
    orchestrator.connect(PHONE).await.unwrap();

    let status = orchestrator.disconnect().await.unwrap();
    assert_eq!(status.state, SessionState::Disconnected);
    assert!(status.phone_number.is_none());
    assert!(status.connected_at.is_none());
    assert_eq!(client.closes(), 1);

    assert_eq!(
        orchestrator.disconnect().await,
        Err(DisconnectError::NoActiveSession)
    );
}

#[tokio::test(start_paused = true)]
async fn teardown_errors_are_logged_not_fatal() {
    let client = MockClient::with_scripts(vec![vec![Step::Establish]]);
    client.fail_close(true);
    let orchestrator = orchestrator(client, settings(secs(45)));
    orchestrator.connect(PHONE).await.unwrap();

    let status = orchestrator.disconnect().await.unwrap();
    assert_eq!(status.state, SessionState::Disconnected);
    assert!(logged(&orchestrator, "Error closing session"));
}

#[tokio::test(start_paused = true)]
async fn commands_get_exactly_one_reply() {
    let client = MockClient::with_scripts(vec![vec![Step::Establish]]);
    let orchestrator = orchestrator(client.clone(), settings(secs(45)));
    orchestrator.connect(PHONE).await.unwrap();
    let sink = client.sink(0);

    deliver(&sink, CONTACT, "/status");
    deliver(&sink, CONTACT, "xyz");
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(
        client.sent(),
        vec![SentMessage {
            to: CONTACT.to_string(),
            body: STATUS_REPLY.to_string(),
        }]
    );
    assert!(logged(&orchestrator, "Message from 5521988887777@c.us: xyz"));
}

#[tokio::test(start_paused = true)]
async fn messages_before_handle_are_replayed_in_order() {
    let client = MockClient::with_scripts(vec![vec![
        Step::Code("ABCD-1234".to_string()),
        Step::WaitRelease,
        Step::Establish,
    ]]);
    let orchestrator = orchestrator(client.clone(), settings(secs(45)));
    orchestrator.connect(PHONE).await.unwrap();
    let sink = client.sink(0);

    deliver(&sink, CONTACT, "Hello");
    deliver(&sink, CONTACT, "/status");
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(client.sent().is_empty());

    client.release();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let bodies: Vec<String> = client.sent().into_iter().map(|m| m.body).collect();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[1], STATUS_REPLY);
}

#[tokio::test(start_paused = true)]
async fn send_message_requires_connected_session() {
    let client = MockClient::with_scripts(vec![vec![Step::Establish]]);
    let orchestrator = orchestrator(client.clone(), settings(secs(45)));

    assert_eq!(
        orchestrator.send_message(CONTACT, "hi").await,
        Err(SendError::NotConnected)
    );

    orchestrator.connect(PHONE).await.unwrap();
    let receipt = orchestrator.send_message(CONTACT, "hi").await.unwrap();
    assert_eq!(receipt.id, "mock-1");
    assert!(logged(&orchestrator, "Message sent to"));

    client.fail_sends(true);
    assert!(matches!(
        orchestrator.send_message(CONTACT, "hi").await,
        Err(SendError::Failed(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn stale_attempt_events_are_discarded() {
    let client = MockClient::with_scripts(vec![
        vec![Step::Establish],
        vec![Step::Code("BBBB-2222".to_string())],
    ]);
    let orchestrator = orchestrator(client.clone(), settings(secs(45)));

    orchestrator.connect(PHONE).await.unwrap();
    orchestrator.disconnect().await.unwrap();
    let status = orchestrator.connect(PHONE).await.unwrap();
    assert_eq!(status.pairing_code.as_deref(), Some("BBBB-2222"));

    let stale = client.sink(0);
    stale.on_code_ready("ZZZZ-9999".to_string());
    stale.on_state_change(ExternalState::Connected);
    deliver(&stale, CONTACT, "/status");
    tokio::time::sleep(Duration::from_millis(10)).await;

    let status = orchestrator.status();
    assert_eq!(status.state, SessionState::AwaitingCode);
    assert_eq!(status.pairing_code.as_deref(), Some("BBBB-2222"));
    assert!(client.sent().is_empty());
    assert!(logged(&orchestrator, "superseded"));
}

#[tokio::test(start_paused = true)]
async fn external_state_changes_follow_the_session() {
    let client = MockClient::with_scripts(vec![vec![Step::Establish]]);
    let orchestrator = orchestrator(client.clone(), settings(secs(45)));
    orchestrator.connect(PHONE).await.unwrap();
    let sink = client.sink(0);

    sink.on_state_change(ExternalState::Disconnected);
    assert_eq!(orchestrator.status().state, SessionState::Disconnected);
    assert_eq!(
        orchestrator.send_message(CONTACT, "hi").await,
        Err(SendError::NotConnected)
    );

    sink.on_state_change(ExternalState::Connected);
    assert_eq!(orchestrator.status().state, SessionState::Connected);
    assert!(logged(&orchestrator, "WhatsApp state: DISCONNECTED"));
}

#[tokio::test(start_paused = true)]
async fn client_timeout_while_awaiting_code() {
    let client = MockClient::with_scripts(vec![vec![Step::Code("ABCD-1234".to_string())]]);
    let orchestrator = orchestrator(client.clone(), settings(secs(45)));
    orchestrator.connect(PHONE).await.unwrap();

    client.sink(0).on_state_change(ExternalState::Timeout);

    let status = orchestrator.status();
    assert_eq!(status.state, SessionState::TimedOut);
    assert!(status.pairing_code.is_none());
}

#[tokio::test(start_paused = true)]
async fn reconnect_closes_the_dropped_session_first() {
    let client = MockClient::with_scripts(vec![
        vec![Step::Establish],
        vec![Step::Code("CCCC-3333".to_string())],
    ]);
    let orchestrator = orchestrator(client.clone(), settings(secs(45)));
    orchestrator.connect(PHONE).await.unwrap();
    client.sink(0).on_state_change(ExternalState::Disconnected);

    let status = orchestrator.connect(PHONE).await.unwrap();
    assert_eq!(status.state, SessionState::AwaitingCode);
    assert_eq!(client.closes(), 1);
    assert!(logged(&orchestrator, "Closing previous session"));
}

#[tokio::test(start_paused = true)]
async fn keepalive_runs_while_connected() {
    let client = MockClient::with_scripts(vec![vec![Step::Establish]]);
    let orchestrator = orchestrator(client, settings(secs(45)));
    orchestrator.connect(PHONE).await.unwrap();
    assert!(!logged(&orchestrator, "Bot active and monitoring"));

    tokio::time::sleep(secs(301)).await;
    assert!(logged(&orchestrator, "Bot active and monitoring"));
}

fn keepalive_lines(orchestrator: &pairlink::session::SessionOrchestrator) -> usize {
    orchestrator
        .log()
        .snapshot()
        .iter()
        .filter(|entry| entry.message.contains("Bot active and monitoring"))
        .count()
}

#[tokio::test(start_paused = true)]
async fn disconnect_stops_background_tasks() {
    let client = MockClient::with_scripts(vec![vec![Step::Establish]]);
    let orchestrator = orchestrator(client.clone(), settings(secs(45)));
    orchestrator.connect(PHONE).await.unwrap();
    assert_eq!(client.live_handles(), 1);

    tokio::time::sleep(secs(301)).await;
    assert_eq!(keepalive_lines(&orchestrator), 1);

    orchestrator.disconnect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(client.live_handles(), 0);

    tokio::time::sleep(secs(601)).await;
    assert_eq!(keepalive_lines(&orchestrator), 1);
}
