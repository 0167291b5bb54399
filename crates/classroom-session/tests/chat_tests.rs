//! Integration tests for session chat: local echo, fan-out and dedup.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use classroom_session::channel::CHAT_MESSAGE_EVENT;
use classroom_session::ClassroomSession;
use classroom_test_utils::*;

async fn wait_for_messages(session: &ClassroomSession, len: usize) {
    let mut rx = session.watch_messages();
    wait_until(&mut rx, &format!("{len} chat messages"), |m| m.len() == len).await;
}

#[tokio::test]
async fn test_sent_message_is_local_immediately_and_reaches_peer_once() {
    let transport = MockTransport::new();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;
    let student = joined_session(&transport, &TestParticipant::new("student")).await;

    let sent = student.send_message("Can you repeat that?").await.unwrap();

    // Appended before the broadcast round-trip
    assert_eq!(student.messages(), vec![sent.clone()]);

    wait_for_messages(&teacher, 1).await;
    assert_eq!(teacher.messages()[0].id, sent.id);
    assert_eq!(teacher.messages()[0].sender_name, "Student");

    // The echo of our own broadcast is not appended twice
    settle().await;
    assert_eq!(student.messages().len(), 1);

    let published = transport.published_of(CHAT_MESSAGE_EVENT);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].payload["message"], "Can you repeat that?");
    assert_eq!(published[0].payload["user"]["id"], "student");
}

#[tokio::test]
async fn test_transcript_keeps_arrival_order() {
    let transport = MockTransport::new();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;
    let p1 = TestParticipant::new("p1");
    let p2 = TestParticipant::new("p2");

    transport.emit_custom(
        &p1.participant(),
        CHAT_MESSAGE_EVENT,
        chat_payload("b", &p1, "second by clock", "2024-03-01T09:00:05Z"),
    );
    transport.emit_custom(
        &p2.participant(),
        CHAT_MESSAGE_EVENT,
        chat_payload("a", &p2, "first by clock", "2024-03-01T09:00:01Z"),
    );
    wait_for_messages(&teacher, 2).await;

    let texts: Vec<String> = teacher.messages().into_iter().map(|m| m.text).collect();
    assert_eq!(texts, vec!["second by clock", "first by clock"]);
}

#[tokio::test]
async fn test_redelivered_message_is_dropped() {
    let transport = MockTransport::new();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;
    let p1 = TestParticipant::new("p1");
    let payload = chat_payload("m-1", &p1, "hello", "2024-03-01T09:00:00Z");

    transport.emit_custom(&p1.participant(), CHAT_MESSAGE_EVENT, payload.clone());
    transport.emit_custom(&p1.participant(), CHAT_MESSAGE_EVENT, payload);
    transport.emit_custom(
        &p1.participant(),
        CHAT_MESSAGE_EVENT,
        chat_payload("m-2", &p1, "again", "2024-03-01T09:00:01Z"),
    );
    wait_for_messages(&teacher, 2).await;

    settle().await;
    assert_eq!(teacher.messages().len(), 2);
}

#[tokio::test]
async fn test_blank_message_is_ignored() {
    let transport = MockTransport::new();
    let student = joined_session(&transport, &TestParticipant::new("student")).await;

    assert!(student.send_message("").await.is_none());
    assert!(student.send_message("   \n\t").await.is_none());

    assert!(student.messages().is_empty());
    assert!(transport.published().is_empty());
}

#[tokio::test]
async fn test_multiline_text_is_kept_verbatim() {
    let transport = MockTransport::new();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;
    let student = joined_session(&transport, &TestParticipant::new("student")).await;

    let text = "  line one\nline two  ";
    student.send_message(text).await.unwrap();

    wait_for_messages(&teacher, 1).await;
    assert_eq!(teacher.messages()[0].text, text);
}

#[tokio::test]
async fn test_send_before_join_is_ignored() {
    let transport = MockTransport::new();
    let student = idle_session(&transport, &TestParticipant::new("student")).await;

    assert!(student.send_message("hello?").await.is_none());
    assert!(transport.published().is_empty());
}

#[tokio::test]
async fn test_publish_failure_keeps_local_message() {
    let transport = MockTransport::builder().fail_publish().build();
    let student = joined_session(&transport, &TestParticipant::new("student")).await;

    let sent = student.send_message("anyone there?").await;

    assert!(sent.is_some());
    assert_eq!(student.messages().len(), 1);
}

#[tokio::test]
async fn test_message_ids_are_unique() {
    let transport = MockTransport::new();
    let student = joined_session(&transport, &TestParticipant::new("student")).await;

    let first = student.send_message("one").await.unwrap();
    let second = student.send_message("two").await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(student.messages().len(), 2);
}

#[tokio::test]
async fn test_transcript_discarded_after_leave() {
    let transport = MockTransport::new();
    let student = joined_session(&transport, &TestParticipant::new("student")).await;
    student.send_message("bye").await.unwrap();

    student.leave().await;

    assert!(student.messages().is_empty());
    assert!(student.send_message("after leave").await.is_none());
}
