//! Full roundtrip tests: a real server instance driven through the client's
//! connector and transfer pipeline over loopback sockets.

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use koinonia_client::{
    cancellation, ChatClient, ClientError, Progress, ReconnectPolicy, SessionContext,
    TransferClient, VoiceRecorder,
};
use koinonia_server::{routes, AppState, Config};
use koinonia_shared::{
    DeliveryStatus, FileKind, Message, MessageBody, MessageKind, ServerEvent,
};

async fn spawn_server() -> String {
    let config = Config {
        data_dir: temp_dir("server-data"),
        delivered_delay: Duration::from_millis(30),
        ..Config::default()
    };
    let state = AppState::new(config).await.unwrap();
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn temp_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("koinonia-roundtrip-{label}-{}", Uuid::new_v4()))
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Wait until an event matching the predicate arrives, discarding the rest
async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<ServerEvent>,
    mut pred: impl FnMut(&ServerEvent) -> bool,
) -> ServerEvent {
    loop {
        let event = next_event(rx).await;
        if pred(&event) {
            return event;
        }
    }
}

async fn wait_for_message(
    rx: &mut mpsc::UnboundedReceiver<ServerEvent>,
    mut pred: impl FnMut(&Message) -> bool,
) -> Message {
    let event = wait_for(rx, |e| match e {
        ServerEvent::ReceiveMessage { message } => pred(message),
        _ => false,
    })
    .await;
    match event {
        ServerEvent::ReceiveMessage { message } => message,
        _ => unreachable!(),
    }
}

/// Collect whatever arrives within the window
async fn settle(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    tokio::time::sleep(Duration::from_millis(300)).await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn text_message_roundtrip_stays_in_room() {
    let base = spawn_server().await;

    let (alice, mut alice_rx) =
        ChatClient::connect(&base, SessionContext::new("Alice", "choir-chat"))
            .await
            .unwrap();
    let (_bob, mut bob_rx) =
        ChatClient::connect(&base, SessionContext::new("Bob", "choir-chat"))
            .await
            .unwrap();
    let (_carol, mut carol_rx) =
        ChatClient::connect(&base, SessionContext::new("Carol", "anointed-chat"))
            .await
            .unwrap();

    // Everyone is settled in before Alice speaks
    wait_for(&mut alice_rx, |e| {
        matches!(e, ServerEvent::UserJoined { name, .. } if name == "Bob")
    })
    .await;

    alice.send_text("Hello").await.unwrap();

    let received = wait_for_message(&mut bob_rx, |m| m.sender == "Alice").await;
    assert_eq!(received.kind(), MessageKind::Text);
    assert_eq!(received.body, MessageBody::text("Hello"));

    // Exactly one copy of that id, and nothing from choir-chat for Carol
    let bob_rest = settle(&mut bob_rx).await;
    assert!(!bob_rest.iter().any(|e| matches!(
        e,
        ServerEvent::ReceiveMessage { message } if message.id == received.id
    )));
    let carol_events = settle(&mut carol_rx).await;
    assert!(!carol_events.iter().any(|e| matches!(
        e,
        ServerEvent::ReceiveMessage { message } if message.sender == "Alice"
    )));
}

#[tokio::test]
async fn voice_note_uploads_and_progresses_to_read() {
    let base = spawn_server().await;
    let transfer = TransferClient::new(&base);

    let (alice, mut alice_rx) =
        ChatClient::connect(&base, SessionContext::new("Alice", "choir-chat"))
            .await
            .unwrap();
    let (bob, mut bob_rx) = ChatClient::connect(&base, SessionContext::new("Bob", "choir-chat"))
        .await
        .unwrap();
    wait_for(&mut alice_rx, |e| {
        matches!(e, ServerEvent::UserJoined { name, .. } if name == "Bob")
    })
    .await;

    // 3.2 seconds of captured audio, uploaded then sent as a voice note
    let mut recorder = VoiceRecorder::new(16_000);
    recorder.push_chunk(&vec![0.4; 51_200]);
    let audio = transfer
        .upload_bytes("note.webm", "audio/webm", vec![1u8; 4096])
        .await
        .unwrap();
    assert_eq!(audio.file_kind, FileKind::Audio);

    alice.send_voice(recorder.finish(audio.file_ref)).await.unwrap();

    let received = wait_for_message(&mut bob_rx, |m| m.kind() == MessageKind::Voice).await;
    match &received.body {
        MessageBody::Voice {
            duration_seconds,
            waveform,
            ..
        } => {
            assert!((duration_seconds - 3.2).abs() < 1e-3);
            assert_eq!(waveform.len(), 32);
        }
        other => panic!("expected voice body, got {other:?}"),
    }

    // Status walks forward without skipping; Bob's read report finishes it
    let mut statuses = Vec::new();
    while statuses.last() != Some(&DeliveryStatus::Delivered) {
        let event = wait_for(&mut alice_rx, |e| {
            matches!(e, ServerEvent::MessageStatus { message_id, .. } if *message_id == received.id)
        })
        .await;
        if let ServerEvent::MessageStatus { status, .. } = event {
            statuses.push(status);
        }
    }
    assert_eq!(
        statuses,
        vec![DeliveryStatus::Sent, DeliveryStatus::Delivered]
    );

    bob.mark_read(received.id).await.unwrap();
    wait_for(&mut alice_rx, |e| {
        matches!(
            e,
            ServerEvent::MessageStatus { message_id, status, .. }
                if *message_id == received.id && *status == DeliveryStatus::Read
        )
    })
    .await;
}

#[tokio::test]
async fn uploaded_jpeg_classifies_as_image_and_broadcasts() {
    let base = spawn_server().await;
    let transfer = TransferClient::new(&base);

    let (alice, mut alice_rx) =
        ChatClient::connect(&base, SessionContext::new("Alice", "choir-chat"))
            .await
            .unwrap();
    let (_bob, mut bob_rx) = ChatClient::connect(&base, SessionContext::new("Bob", "choir-chat"))
        .await
        .unwrap();
    wait_for(&mut alice_rx, |e| {
        matches!(e, ServerEvent::UserJoined { name, .. } if name == "Bob")
    })
    .await;

    // 2MB JPEG
    let attachment = transfer
        .upload_bytes("retreat.jpg", "image/jpeg", vec![0xFF; 2 * 1024 * 1024])
        .await
        .unwrap();
    assert_eq!(attachment.file_kind, FileKind::Image);
    assert_eq!(attachment.file_size_bytes, 2 * 1024 * 1024);

    let file_ref = attachment.file_ref.clone();
    alice.send_file(attachment).await.unwrap();

    let received = wait_for_message(&mut bob_rx, |m| m.kind() == MessageKind::File).await;
    match &received.body {
        MessageBody::File { attachment } => assert_eq!(attachment.file_kind, FileKind::Image),
        other => panic!("expected file body, got {other:?}"),
    }

    // Bob pulls the blob back down with progress
    let dest = temp_dir("download").join("retreat.jpg");
    tokio::fs::create_dir_all(dest.parent().unwrap()).await.unwrap();
    let (progress_tx, progress_rx) = tokio::sync::watch::channel(Progress::default());
    let (_cancel, cancel_rx) = cancellation();
    let written = transfer
        .download(&file_ref, &dest, &progress_tx, cancel_rx)
        .await
        .unwrap();
    assert_eq!(written, 2 * 1024 * 1024);
    assert_eq!(progress_rx.borrow().fraction(), Some(1.0));
}

#[tokio::test]
async fn presence_tracks_disconnect_and_rejoin() {
    let base = spawn_server().await;

    let (_alice, mut alice_rx) =
        ChatClient::connect(&base, SessionContext::new("Alice", "choir-chat"))
            .await
            .unwrap();
    let (bob, bob_rx) = ChatClient::connect(&base, SessionContext::new("Bob", "choir-chat"))
        .await
        .unwrap();
    wait_for(&mut alice_rx, |e| {
        matches!(e, ServerEvent::UserJoined { name, .. } if name == "Bob")
    })
    .await;

    // Bob disconnects; the next snapshot no longer carries him
    drop(bob);
    drop(bob_rx);
    wait_for(&mut alice_rx, |e| {
        matches!(e, ServerEvent::OnlineUsersUpdated { participants, .. }
            if participants.iter().all(|p| p.name != "Bob"))
    })
    .await;
    wait_for(&mut alice_rx, |e| {
        matches!(e, ServerEvent::UserLeft { name, .. } if name == "Bob")
    })
    .await;

    // Bob reconnects under the same name: exactly one entry
    let (_bob2, _bob2_rx) =
        ChatClient::connect(&base, SessionContext::new("Bob", "choir-chat"))
            .await
            .unwrap();
    let event = wait_for(&mut alice_rx, |e| {
        matches!(e, ServerEvent::OnlineUsersUpdated { participants, .. }
            if participants.iter().any(|p| p.name == "Bob"))
    })
    .await;
    if let ServerEvent::OnlineUsersUpdated { participants, .. } = event {
        assert_eq!(participants.iter().filter(|p| p.name == "Bob").count(), 1);
    }
}

#[tokio::test]
async fn typing_indicator_not_echoed_over_the_wire() {
    let base = spawn_server().await;

    let (alice, mut alice_rx) =
        ChatClient::connect(&base, SessionContext::new("Alice", "choir-chat"))
            .await
            .unwrap();
    let (_bob, mut bob_rx) = ChatClient::connect(&base, SessionContext::new("Bob", "choir-chat"))
        .await
        .unwrap();
    wait_for(&mut alice_rx, |e| {
        matches!(e, ServerEvent::UserJoined { name, .. } if name == "Bob")
    })
    .await;

    alice.set_typing(true).await.unwrap();
    wait_for(&mut bob_rx, |e| {
        matches!(e, ServerEvent::UserTyping { name, is_typing: true, .. } if name == "Alice")
    })
    .await;

    // Sending clears the sender's typing state for everyone else
    alice.send_text("done typing").await.unwrap();
    wait_for(&mut bob_rx, |e| {
        matches!(e, ServerEvent::UserTyping { name, is_typing: false, .. } if name == "Alice")
    })
    .await;

    let alice_events = settle(&mut alice_rx).await;
    assert!(
        !alice_events
            .iter()
            .any(|e| matches!(e, ServerEvent::UserTyping { name, .. } if name == "Alice")),
        "typing indicator echoed back to its sender"
    );
}

#[tokio::test]
async fn history_endpoint_returns_ascending_capped_messages() {
    let base = spawn_server().await;

    let (alice, mut alice_rx) =
        ChatClient::connect(&base, SessionContext::new("Alice", "choir-chat"))
            .await
            .unwrap();
    wait_for(&mut alice_rx, |e| matches!(e, ServerEvent::Connected { .. })).await;

    for i in 0..5 {
        alice.send_text(format!("m{i}")).await.unwrap();
    }
    // Wait for the last one to fan out before querying
    wait_for(&mut alice_rx, |e| {
        matches!(e, ServerEvent::ReceiveMessage { message } if message.body == MessageBody::text("m4"))
    })
    .await;

    let response: serde_json::Value = reqwest::Client::new()
        .get(format!("{base}/chat/messages?room=choir-chat"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let messages = response["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 5, "join notices must not appear in history");
    let bodies: Vec<&str> = messages.iter().map(|m| m["text"].as_str().unwrap()).collect();
    assert_eq!(bodies, vec!["m0", "m1", "m2", "m3", "m4"]);
}

#[tokio::test]
async fn empty_name_is_rejected_at_upgrade() {
    let base = spawn_server().await;
    let result = ChatClient::connect_with_policy(
        &base,
        SessionContext::new("  ", "choir-chat"),
        ReconnectPolicy {
            max_attempts: 1,
            delay: Duration::from_millis(10),
        },
    )
    .await;
    assert!(matches!(result, Err(ClientError::ConnectFailed { .. })));
}

#[tokio::test]
async fn reconnect_policy_is_bounded() {
    // Nothing listens here; the dial must give up after the configured attempts
    let result = ChatClient::connect_with_policy(
        "http://127.0.0.1:9",
        SessionContext::new("Alice", "choir-chat"),
        ReconnectPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(20),
        },
    )
    .await;

    match result {
        Err(ClientError::ConnectFailed { attempts, .. }) => assert_eq!(attempts, 2),
        Err(other) => panic!("expected bounded connect failure, got {other:?}"),
        Ok(_) => panic!("connected to a dead port"),
    }
}
