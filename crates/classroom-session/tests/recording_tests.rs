//! Integration tests for the recording coordinator.
//!
//! Uses tokio's paused clock so the elapsed ticker can be stepped
//! deterministically with `tokio::time::advance`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::time::Duration;

use classroom_session::managers::{format_duration, format_elapsed, RecordingStatus};
use classroom_session::transport::TransportEvent;
use classroom_session::ErrorKind;
use classroom_test_utils::*;

#[tokio::test(start_paused = true)]
async fn test_elapsed_counts_from_confirmation() {
    let transport = MockTransport::builder()
        .manual_recording_confirmation()
        .build();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;

    teacher.toggle_recording().await.unwrap();
    let pending = teacher.recording();
    assert_eq!(pending.status, RecordingStatus::NotRecording);
    assert!(pending.awaiting_confirmation);
    assert_eq!(transport.start_recording_count(), 1);

    tokio::time::advance(Duration::from_millis(300)).await;
    transport.confirm_recording_started();
    settle().await;

    let started = teacher.recording();
    assert_eq!(started.status, RecordingStatus::Recording);
    assert!(!started.awaiting_confirmation);
    assert_eq!(started.elapsed_seconds, 0);

    tokio::time::advance(Duration::from_millis(3000)).await;
    settle().await;

    assert_eq!(teacher.recording().elapsed_seconds, 3);
    assert_eq!(format_elapsed(teacher.recording().elapsed_seconds), "00:03");
}

#[tokio::test(start_paused = true)]
async fn test_toggle_while_awaiting_confirmation_is_busy() {
    let transport = MockTransport::builder()
        .manual_recording_confirmation()
        .build();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;

    teacher.toggle_recording().await.unwrap();
    let err = teacher.toggle_recording().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Busy);
    assert_eq!(transport.start_recording_count(), 1);
    assert_eq!(transport.stop_recording_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_resets_elapsed() {
    let transport = MockTransport::new();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;

    teacher.toggle_recording().await.unwrap();
    settle().await;
    assert_eq!(teacher.recording().status, RecordingStatus::Recording);

    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(teacher.recording().elapsed_seconds, 5);

    teacher.toggle_recording().await.unwrap();
    settle().await;

    let stopped = teacher.recording();
    assert_eq!(stopped.status, RecordingStatus::NotRecording);
    assert_eq!(stopped.elapsed_seconds, 0);
    assert_eq!(transport.start_recording_count(), 1);
    assert_eq!(transport.stop_recording_count(), 1);

    // The ticker is gone once stopped
    tokio::time::advance(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(teacher.recording().elapsed_seconds, 0);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_confirmation_keeps_clock_running() {
    let transport = MockTransport::builder()
        .manual_recording_confirmation()
        .build();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;

    transport.confirm_recording_started();
    settle().await;
    tokio::time::advance(Duration::from_secs(2)).await;
    settle().await;

    transport.emit(TransportEvent::RecordingStarted);
    settle().await;
    assert_eq!(teacher.recording().elapsed_seconds, 2);

    tokio::time::advance(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(teacher.recording().elapsed_seconds, 3);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_only_confirmation_never_records() {
    let transport = MockTransport::builder()
        .manual_recording_confirmation()
        .build();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;

    teacher.toggle_recording().await.unwrap();
    transport.confirm_recording_stopped();
    settle().await;

    let snapshot = teacher.recording();
    assert_eq!(snapshot.status, RecordingStatus::NotRecording);
    assert!(!snapshot.awaiting_confirmation);

    tokio::time::advance(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(teacher.recording().elapsed_seconds, 0);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_request_leaves_state_unchanged() {
    let transport = MockTransport::builder().reject_recording().build();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;

    let err = teacher.toggle_recording().await.unwrap_err();
    settle().await;

    assert_eq!(err.kind(), ErrorKind::Transport);
    let snapshot = teacher.recording();
    assert_eq!(snapshot.status, RecordingStatus::NotRecording);
    assert!(!snapshot.awaiting_confirmation);

    // Not stuck: a later toggle reaches the transport again
    let _ = teacher.toggle_recording().await;
    assert_eq!(transport.start_recording_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_before_join_is_busy() {
    let transport = MockTransport::new();
    let teacher = idle_session(&transport, &TestParticipant::new("teacher")).await;

    let err = teacher.toggle_recording().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Busy);
    assert_eq!(transport.start_recording_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_confirmation_reaches_every_participant() {
    let transport = MockTransport::new();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;
    let student = joined_session(&transport, &TestParticipant::new("student")).await;

    teacher.toggle_recording().await.unwrap();
    settle().await;

    assert_eq!(student.recording().status, RecordingStatus::Recording);
    assert!(!student.recording().awaiting_confirmation);
}

#[tokio::test(start_paused = true)]
async fn test_artifacts_loaded_on_join() {
    let transport = MockTransport::builder()
        .with_recording(recording(
            "lesson-1.mp4",
            "2024-03-01T09:00:00Z",
            "2024-03-01T09:45:10Z",
        ))
        .with_recording(recording("broken.mp4", "not a time", "2024-03-01T09:45:10Z"))
        .build();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;
    settle().await;

    let artifacts = teacher.recording().artifacts;
    assert_eq!(artifacts.len(), 2);
    assert_eq!(artifacts[0].filename, "lesson-1.mp4");
    assert_eq!(format_duration(artifacts[0].duration_seconds), "45m 10s");
    assert_eq!(artifacts[1].duration_seconds, 0);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_artifacts_replaces_list() {
    let transport = MockTransport::new();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;
    settle().await;
    assert!(teacher.recording().artifacts.is_empty());

    transport.add_recording(recording(
        "lesson-2.mp4",
        "2024-03-01T10:00:00Z",
        "2024-03-01T10:00:30Z",
    ));
    let fetched = teacher.fetch_artifacts().await.unwrap();
    settle().await;

    assert_eq!(fetched.len(), 1);
    assert_eq!(teacher.recording().artifacts, fetched);
}

#[tokio::test(start_paused = true)]
async fn test_recording_state_discarded_after_leave() {
    let transport = MockTransport::builder()
        .with_recording(recording(
            "lesson-1.mp4",
            "2024-03-01T09:00:00Z",
            "2024-03-01T09:01:00Z",
        ))
        .build();
    let teacher = joined_session(&transport, &TestParticipant::new("teacher")).await;
    teacher.toggle_recording().await.unwrap();
    settle().await;

    teacher.leave().await;

    let snapshot = teacher.recording();
    assert_eq!(snapshot.status, RecordingStatus::NotRecording);
    assert!(snapshot.artifacts.is_empty());
    assert_eq!(snapshot.elapsed_seconds, 0);
}
