//! Engine dialling a WebSocket terminal.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use opilink_engine::{EngineConfig, OperationKind, OperationStatus, OpiEngine, Outcome};
use opilink_message::{decode, serialize, OpiMessage, OverallResult, ServiceResponse};
use opilink_transport::{ChannelConfig, ConnectionState, TerminalEndpoint};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type Terminal = WebSocketStream<TcpStream>;

async fn accept(listener: &TcpListener) -> Terminal {
    let (stream, _) = listener.accept().await.expect("terminal should accept");
    accept_async(stream)
        .await
        .expect("websocket handshake should succeed")
}

/// Answer the next service request with `Success`, echoing its id.
async fn answer_service_request(terminal: &mut Terminal) -> String {
    let request = loop {
        let message = terminal
            .next()
            .await
            .expect("POS should send a request")
            .expect("request should be readable");
        if let Message::Text(text) = message {
            break text.as_str().to_owned();
        }
    };
    let OpiMessage::ServiceRequest(request) = decode(&request).expect("request should decode")
    else {
        panic!("expected a service request, got {request}");
    };
    let response = OpiMessage::ServiceResponse(ServiceResponse {
        request_type: request.request_type,
        application_sender: Some(request.application_sender),
        workstation_id: Some(request.workstation_id),
        request_id: Some(request.request_id.clone()),
        overall_result: OverallResult::Success,
        terminal: None,
    });
    terminal
        .send(Message::text(
            serialize(&response).expect("response should serialize"),
        ))
        .await
        .expect("response should send");
    request.request_id
}

async fn until_final(statuses: &mut broadcast::Receiver<OperationStatus>) -> OperationStatus {
    loop {
        let status = tokio::time::timeout(Duration::from_secs(10), statuses.recv())
            .await
            .expect("status should arrive in time")
            .expect("status stream should stay open");
        if status.is_final() {
            return status;
        }
    }
}

#[tokio::test]
async fn reconciliation_survives_a_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let port = listener.local_addr().expect("listener has address").port();

    let (reconnected_tx, reconnected) = tokio::sync::oneshot::channel();
    let terminal = tokio::spawn(async move {
        let mut first = accept(&listener).await;
        answer_service_request(&mut first).await;
        let _ = first.close(None).await;
        drop(first);

        let mut second = accept(&listener).await;
        let _ = reconnected_tx.send(());
        answer_service_request(&mut second).await;
        while let Some(Ok(_)) = second.next().await {}
    });

    let channel_config = ChannelConfig {
        reconnect_delay: Duration::from_millis(50),
        ..ChannelConfig::default()
    };
    let engine = OpiEngine::client(
        TerminalEndpoint::new("127.0.0.1", port),
        channel_config,
        EngineConfig::default(),
    );
    let mut statuses = engine.subscribe();
    engine.open().await.expect("engine should connect");

    engine
        .initiate_reconciliation()
        .await
        .expect("reconciliation should be accepted");
    match until_final(&mut statuses).await {
        OperationStatus::Result(result) => {
            assert_eq!(result.kind, OperationKind::Reconciliation);
            assert_eq!(result.outcome, Outcome::Success);
        }
        other => panic!("unexpected status {other:?}"),
    }

    tokio::time::timeout(Duration::from_secs(5), reconnected)
        .await
        .expect("channel should reconnect")
        .expect("terminal should report the reconnect");
    let mut state = engine.connection_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .expect("channel should report the reconnect")
    .expect("state sender should be alive");

    engine.login().await.expect("login should be accepted");
    assert_eq!(until_final(&mut statuses).await, OperationStatus::LoggedIn);

    engine.close().await;
    assert!(!engine.is_connected());
    terminal.await.expect("terminal task should finish");
}
