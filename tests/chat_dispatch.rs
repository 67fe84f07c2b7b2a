//! Chat lines reach the command dispatcher and every reply is a whisper to
//! the sender.

mod common;

use factorio_supervisor::handlers::HandlerSet;
use factorio_supervisor::supervisor::ProcessState;

#[tokio::test]
async fn unknown_command_gets_exactly_one_whisper() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::test_config(dir.path());
    let supervisor = common::idle_supervisor(&config);
    let mut handlers = HandlerSet::standard(&config);

    supervisor.dispatch(
        "2024-05-01 10:00:00 [CHAT] alice: !frobnicate now\n",
        &mut handlers,
    );

    assert_eq!(
        supervisor.drain_console(),
        vec!["/whisper alice Unknown command: frobnicate"]
    );
}

#[tokio::test]
async fn ordinary_chat_is_silent() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::test_config(dir.path());
    let supervisor = common::idle_supervisor(&config);
    let mut handlers = HandlerSet::standard(&config);

    supervisor.dispatch("[CHAT] alice: anyone seen my iron?", &mut handlers);
    supervisor.dispatch("[CHAT] this line has no sender", &mut handlers);

    assert!(supervisor.drain_console().is_empty());
}

#[tokio::test]
async fn saveload_of_missing_save_reports_and_keeps_server() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::test_config(dir.path());
    let supervisor = common::idle_supervisor(&config);
    let mut handlers = HandlerSet::standard(&config);

    supervisor.dispatch("[CHAT] bob: !saveload missing.zip", &mut handlers);

    assert_eq!(
        supervisor.drain_console(),
        vec!["/whisper bob Error during command: save not found: missing.zip"]
    );
    assert_eq!(supervisor.state(), ProcessState::NotStarted);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn saveload_without_argument_reports_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::test_config(dir.path());
    let supervisor = common::idle_supervisor(&config);
    let mut handlers = HandlerSet::standard(&config);

    supervisor.dispatch("[CHAT] bob: !saveload", &mut handlers);
    supervisor.dispatch("[CHAT] bob: !saveload ../../etc/passwd", &mut handlers);

    assert_eq!(
        supervisor.drain_console(),
        vec![
            "/whisper bob Error during command: missing argument: save name",
            "/whisper bob Error during command: invalid save name: ../../etc/passwd",
        ]
    );
}

#[tokio::test]
async fn savelist_whispers_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let old = dir.path().join("old-base.zip");
    std::fs::write(&old, vec![0u8; 1536]).unwrap();
    std::fs::write(dir.path().join("new-base.zip"), b"xy").unwrap();
    let hour_ago = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
    std::fs::OpenOptions::new()
        .write(true)
        .open(&old)
        .unwrap()
        .set_modified(hour_ago)
        .unwrap();

    let config = common::test_config(dir.path());
    let supervisor = common::idle_supervisor(&config);
    let mut handlers = HandlerSet::standard(&config);

    supervisor.dispatch("[CHAT] carol: !SaveList", &mut handlers);

    let sent = supervisor.drain_console();
    assert_eq!(sent.len(), 2, "one line per save: {:?}", sent);
    assert!(sent[0].starts_with("/whisper carol new-base.zip @ "));
    assert!(sent[0].ends_with("(2.0B)"));
    assert!(sent[1].starts_with("/whisper carol old-base.zip @ 1h0m"));
    assert!(sent[1].ends_with(" ago (1.5KiB)"));
}

#[tokio::test]
async fn whisper_cannot_smuggle_second_command() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::test_config(dir.path());
    let supervisor = common::idle_supervisor(&config);
    let mut handlers = HandlerSet::standard(&config);

    // The chat regex only ever sees a single line, but a name taken from
    // the log must still not break the console framing.
    supervisor.dispatch("[CHAT] eve: !nope\r", &mut handlers);

    let sent = supervisor.drain_console();
    assert_eq!(sent, vec!["/whisper eve Unknown command: nope"]);
    assert!(sent.iter().all(|l| !l.contains('\n') && !l.contains('\r')));
}
