//! Integration tests for the shared hand-raise queue.
//!
//! Two or more sessions join the same in-memory room and must materialize
//! the same queue from the same broadcasts.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use classroom_session::channel::{CLEAR_HAND_QUEUE_EVENT, LOWER_HAND_EVENT, RAISED_HAND_REACTION};
use classroom_session::managers::HandQueueSnapshot;
use classroom_session::ClassroomSession;
use classroom_test_utils::*;

fn queue_ids(snapshot: &HandQueueSnapshot) -> Vec<(String, usize)> {
    snapshot
        .entries
        .iter()
        .map(|e| (e.participant_id.as_str().to_string(), e.position))
        .collect()
}

async fn wait_for_queue_len(session: &ClassroomSession, len: usize) {
    let mut rx = session.watch_hand_queue();
    wait_until(&mut rx, &format!("queue of {len}"), |q| q.entries.len() == len).await;
}

#[tokio::test]
async fn test_raise_hand_reaches_every_participant() {
    let transport = MockTransport::new();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;
    let student = joined_session(&transport, &TestParticipant::new("student")).await;

    student.raise_hand().await;

    wait_for_queue_len(&teacher, 1).await;
    wait_for_queue_len(&student, 1).await;

    let at_teacher = teacher.hand_queue();
    let at_student = student.hand_queue();
    assert_eq!(queue_ids(&at_teacher), vec![("student".to_string(), 1)]);
    assert_eq!(at_teacher.entries, at_student.entries);
    assert!(at_student.local_hand_raised);
    assert!(!at_teacher.local_hand_raised);

    let published = transport.published_of(RAISED_HAND_REACTION);
    assert_eq!(published.len(), 1);
    assert!(published[0].is_reaction);
    assert_eq!(published[0].payload["userId"], "student");
    assert_eq!(published[0].payload["userName"], "Student");
}

#[tokio::test]
async fn test_second_raise_is_not_published() {
    let transport = MockTransport::new();
    let student = joined_session(&transport, &TestParticipant::new("student")).await;

    student.raise_hand().await;
    wait_for_queue_len(&student, 1).await;
    student.raise_hand().await;

    assert_eq!(transport.published_of(RAISED_HAND_REACTION).len(), 1);
    assert_eq!(student.hand_queue().entries.len(), 1);
}

#[tokio::test]
async fn test_queue_orders_by_timestamp_and_repacks_on_lower() {
    let transport = MockTransport::new();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;
    let p1 = TestParticipant::new("p1");
    let p2 = TestParticipant::new("p2");

    transport.emit_reaction(&p1.participant(), RAISED_HAND_REACTION, raised_hand_payload(&p1, 10));
    transport.emit_reaction(&p2.participant(), RAISED_HAND_REACTION, raised_hand_payload(&p2, 5));
    wait_for_queue_len(&teacher, 2).await;

    assert_eq!(
        queue_ids(&teacher.hand_queue()),
        vec![("p2".to_string(), 1), ("p1".to_string(), 2)]
    );

    transport.emit_custom(&p2.participant(), LOWER_HAND_EVENT, lower_hand_payload("p2"));
    wait_for_queue_len(&teacher, 1).await;

    assert_eq!(queue_ids(&teacher.hand_queue()), vec![("p1".to_string(), 1)]);
}

#[tokio::test]
async fn test_redelivered_raise_is_ignored() {
    let transport = MockTransport::new();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;
    let p1 = TestParticipant::new("p1");
    let p2 = TestParticipant::new("p2");

    transport.emit_reaction(&p1.participant(), RAISED_HAND_REACTION, raised_hand_payload(&p1, 10));
    transport.emit_reaction(&p1.participant(), RAISED_HAND_REACTION, raised_hand_payload(&p1, 99));
    transport.emit_reaction(&p2.participant(), RAISED_HAND_REACTION, raised_hand_payload(&p2, 20));
    wait_for_queue_len(&teacher, 2).await;

    let queue = teacher.hand_queue();
    assert_eq!(
        queue_ids(&queue),
        vec![("p1".to_string(), 1), ("p2".to_string(), 2)]
    );
    assert_eq!(queue.entries[0].raised_at, 10, "first raise wins");
}

#[tokio::test]
async fn test_moderator_lowers_another_hand() {
    let transport = MockTransport::new();
    let student_fixture = TestParticipant::new("student");
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;
    let student = joined_session(&transport, &student_fixture).await;

    student.raise_hand().await;
    wait_for_queue_len(&teacher, 1).await;

    teacher
        .lower_hand(Some(&student_fixture.participant_id()))
        .await;

    wait_for_queue_len(&teacher, 0).await;
    wait_for_queue_len(&student, 0).await;
    assert!(!student.hand_queue().local_hand_raised);
}

#[tokio::test]
async fn test_lower_for_participant_not_queued_publishes_nothing() {
    let transport = MockTransport::new();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;

    teacher.lower_hand(None).await;
    teacher
        .lower_hand(Some(&TestParticipant::new("ghost").participant_id()))
        .await;

    assert!(transport.published_of(LOWER_HAND_EVENT).is_empty());
}

#[tokio::test]
async fn test_clear_queue_empties_every_replica() {
    let transport = MockTransport::new();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;
    let student = joined_session(&transport, &TestParticipant::new("student")).await;
    let p1 = TestParticipant::new("p1");

    transport.emit_reaction(&p1.participant(), RAISED_HAND_REACTION, raised_hand_payload(&p1, 1));
    student.raise_hand().await;
    wait_for_queue_len(&teacher, 2).await;
    wait_for_queue_len(&student, 2).await;

    teacher.clear_queue().await;

    wait_for_queue_len(&teacher, 0).await;
    wait_for_queue_len(&student, 0).await;
    assert_eq!(transport.published_of(CLEAR_HAND_QUEUE_EVENT).len(), 1);
}

#[tokio::test]
async fn test_clear_queue_clears_locally_when_broadcast_fails() {
    let transport = MockTransport::builder().fail_publish().build();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;
    let p1 = TestParticipant::new("p1");

    transport.emit_reaction(&p1.participant(), RAISED_HAND_REACTION, raised_hand_payload(&p1, 1));
    wait_for_queue_len(&teacher, 1).await;

    teacher.clear_queue().await;

    wait_for_queue_len(&teacher, 0).await;
    assert!(transport.published().is_empty());
}

#[tokio::test]
async fn test_raise_publish_failure_is_swallowed() {
    let transport = MockTransport::builder().fail_publish().build();
    let student = joined_session(&transport, &TestParticipant::new("student")).await;

    student.raise_hand().await;
    settle().await;

    assert!(student.hand_queue().entries.is_empty());
    assert!(!student.hand_queue().local_hand_raised);
}

#[tokio::test]
async fn test_queue_discarded_after_leave() {
    let transport = MockTransport::new();
    let student = joined_session(&transport, &TestParticipant::new("student")).await;

    student.raise_hand().await;
    wait_for_queue_len(&student, 1).await;

    student.leave().await;

    assert_eq!(student.hand_queue(), HandQueueSnapshot::default());
}
