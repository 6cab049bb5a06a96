//! セッションのトークン対応付け・イベント配送・終了処理のテスト

mod common;

use common::{collect, connect};
use std::sync::Arc;
use std::time::Duration;
use tsunagi_core::{
    DebugSession, Diagnostic, Event, EventCategory, SessionError, SessionState, Value, Violation,
};

#[tokio::test]
async fn test_results_are_matched_by_token() {
    let (session, mut fake) = connect();
    let session = Arc::new(session);

    let first = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.send_command("-break-insert main").await })
    };
    let (token1, command1) = fake.recv_command().await;

    let second = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.send_command("-stack-list-frames").await })
    };
    let (token2, command2) = fake.recv_command().await;

    assert_eq!((token1, command1.as_str()), (1, "-break-insert main"));
    assert_eq!((token2, command2.as_str()), (2, "-stack-list-frames"));

    // 逆順に応答する
    fake.send(&format!("{}^done,stack=[]", token2)).await;
    let frames = second.await.unwrap().unwrap();
    assert_eq!(frames.get("stack"), Some(&Value::List(vec![])));
    assert!(!frames.contains_key("bkpt"));
    assert!(!first.is_finished());

    fake.send(&format!(r#"{}^done,bkpt={{number="1"}}"#, token1)).await;
    let bkpt = first.await.unwrap().unwrap();
    assert_eq!(
        bkpt.get("bkpt").and_then(|b| b.get("number")),
        Some(&Value::from("1"))
    );
    assert!(!bkpt.contains_key("stack"));
}

#[tokio::test]
async fn test_async_and_stream_records_between_send_and_result() {
    let (session, mut fake) = connect();
    let mut exec = collect(&session, EventCategory::ExecAsync);
    let mut console = collect(&session, EventCategory::ConsoleOutput);
    let mut notify = collect(&session, EventCategory::NotifyAsync);

    let (result, _) = tokio::join!(session.send_command("-exec-continue"), async {
        let (token, _) = fake.recv_command().await;
        fake.send(r#"~"Continuing.""#).await;
        fake.send(r#"=thread-group-started,id="i1",pid="4242""#).await;
        fake.send(r#"*running,thread-id="all""#).await;
        fake.send(&format!("{}^running", token)).await;
        fake.send("(gdb)").await;
    });

    assert!(result.unwrap().is_empty());
    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(
        console.try_recv().unwrap(),
        Event::Stream("Continuing.".to_string())
    );
    match exec.try_recv().unwrap() {
        Event::Async { class, results } => {
            assert_eq!(class, "running");
            assert_eq!(results.get("thread-id"), Some(&Value::from("all")));
        }
        other => panic!("unexpected event {:?}", other),
    }
    match notify.try_recv().unwrap() {
        Event::Async { class, results } => {
            assert_eq!(class, "thread-group-started");
            assert_eq!(results.get("pid"), Some(&Value::from("4242")));
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(exec.try_recv().is_err());
}

#[tokio::test]
async fn test_error_result_rejects_only_its_command() {
    let (session, mut fake) = connect();

    let (result, _) = tokio::join!(session.send_command("-data-evaluate-expression foo"), async {
        fake.answer(
            "-data-evaluate-expression foo",
            r#"^error,msg="No symbol \"foo\" in current context.",code="undefined-command""#,
        )
        .await;
    });

    match result {
        Err(SessionError::Debugger { msg, code }) => {
            assert_eq!(msg, r#"No symbol "foo" in current context."#);
            assert_eq!(code.as_deref(), Some("undefined-command"));
        }
        other => panic!("unexpected result {:?}", other),
    }

    // セッションは継続している
    let (result, _) = tokio::join!(session.send_command("-gdb-version"), async {
        fake.answer("-gdb-version", "^done").await;
    });
    assert!(result.is_ok());
    assert_eq!(session.state(), SessionState::Created);
}

#[tokio::test]
async fn test_end_rejects_pending_commands() {
    let (session, mut fake) = connect();
    let session = Arc::new(session);
    let mut exited = collect(&session, EventCategory::ExecAsync);

    let mut pending = Vec::new();
    for command in ["-exec-continue", "-stack-list-frames"] {
        let session = Arc::clone(&session);
        pending.push(tokio::spawn(async move { session.send_command(command).await }));
        fake.recv_command().await;
    }

    session.end().await;

    for task in pending {
        assert!(matches!(task.await.unwrap(), Err(SessionError::Terminated)));
    }
    assert_eq!(session.state(), SessionState::Terminated);
    assert_eq!(exited.recv().await, Some(Event::Exited));
    assert_eq!(exited.recv().await, None);

    // 終了時に -gdb-exit を送り、入力を閉じる
    assert_eq!(fake.recv_line().await.as_deref(), Some("3-gdb-exit"));

    let late = session.send_command("-gdb-version").await;
    assert!(matches!(late, Err(SessionError::Terminated)));
    assert_eq!(fake.recv_line().await, None);

    // 2回目は何もしない
    session.end().await;
}

#[tokio::test]
async fn test_output_closure_terminates_session() {
    let (session, mut fake) = connect();
    let session = Arc::new(session);
    let mut exec = collect(&session, EventCategory::ExecAsync);
    let mut log = collect(&session, EventCategory::LogOutput);

    let task = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.send_command("-exec-run").await })
    };
    fake.recv_command().await;
    drop(fake);

    assert!(task.await.unwrap().unwrap_err().is_terminated());

    // 各購読にちょうど1回
    assert_eq!(exec.recv().await, Some(Event::Exited));
    assert_eq!(exec.recv().await, None);
    assert_eq!(log.recv().await, Some(Event::Exited));
    assert_eq!(log.recv().await, None);
    assert_eq!(session.state(), SessionState::Terminated);

    // 終了後の購読は即座に終了イベントを受け取る
    let mut late = collect(&session, EventCategory::ConsoleOutput);
    assert_eq!(late.recv().await, Some(Event::Exited));
    assert_eq!(late.recv().await, None);

    assert!(matches!(
        session.send_command("-gdb-version").await,
        Err(SessionError::Terminated)
    ));
}

#[tokio::test]
async fn test_state_transitions() {
    let (session, mut fake) = connect();
    let mut exec = collect(&session, EventCategory::ExecAsync);
    assert_eq!(session.state(), SessionState::Created);

    let (result, _) = tokio::join!(session.set_executable_file("/tmp/a out"), async {
        fake.answer(r#"-file-exec-and-symbols "/tmp/a out""#, "^done")
            .await;
    });
    result.unwrap();
    assert_eq!(session.state(), SessionState::Configured);

    let (result, _) = tokio::join!(session.start_target(), async {
        fake.answer("-exec-run", "^running").await;
    });
    result.unwrap();
    assert_eq!(session.state(), SessionState::Running);

    fake.send(r#"*stopped,reason="breakpoint-hit",bkptno="1",thread-id="1""#)
        .await;
    assert!(matches!(exec.recv().await, Some(Event::Async { .. })));
    assert_eq!(session.state(), SessionState::Stopped);

    fake.send(r#"*running,thread-id="all""#).await;
    exec.recv().await;
    assert_eq!(session.state(), SessionState::Running);

    let (result, _) = tokio::join!(session.interrupt(), async {
        fake.answer("-exec-interrupt", "^done").await;
        fake.send(r#"*stopped,reason="signal-received",signal-name="SIGINT""#)
            .await;
    });
    result.unwrap();
    exec.recv().await;
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_exit_result_terminates_session() {
    let (session, mut fake) = connect();

    let (result, _) = tokio::join!(session.send_command("-gdb-exit"), async {
        fake.answer("-gdb-exit", "^exit").await;
    });
    assert!(result.unwrap().is_empty());
    assert_eq!(session.state(), SessionState::Terminated);
}

#[tokio::test]
async fn test_malformed_lines_are_reported_and_skipped() {
    let (session, mut fake) = connect();
    let mut diagnostics = collect(&session, EventCategory::Diagnostic);

    let (result, _) = tokio::join!(session.send_command("-gdb-version"), async {
        let (token, _) = fake.recv_command().await;
        fake.send("").await;
        fake.send("GNU gdb (GDB) 14.2").await;
        fake.send(r#"~"unterminated"#).await;
        fake.send("^bogus").await;
        fake.send("42^done").await;
        fake.send(r#"^done,value="1""#).await;
        fake.send(&format!(r#"{}^done,version="14.2""#, token)).await;
    });
    assert_eq!(result.unwrap().get("version"), Some(&Value::from("14.2")));

    let mut seen = Vec::new();
    while let Ok(Event::Diagnostic(diagnostic)) = diagnostics.try_recv() {
        seen.push(diagnostic);
    }
    assert_eq!(seen.len(), 5);
    assert!(matches!(
        &seen[0],
        Diagnostic::ProtocolViolation {
            violation: Violation::UnknownRecord(_),
            ..
        }
    ));
    assert!(matches!(&seen[1], Diagnostic::Malformed { .. }));
    assert!(matches!(
        &seen[2],
        Diagnostic::ProtocolViolation {
            violation: Violation::UnknownRecord(_),
            ..
        }
    ));
    assert!(matches!(
        &seen[3],
        Diagnostic::ProtocolViolation {
            violation: Violation::UnmatchedToken(42),
            ..
        }
    ));
    assert!(matches!(
        &seen[4],
        Diagnostic::ProtocolViolation {
            violation: Violation::UntokenedResult(_),
            ..
        }
    ));
    assert_ne!(session.state(), SessionState::Terminated);
}

#[tokio::test]
async fn test_multiline_command_is_rejected_before_sending() {
    let (session, mut fake) = connect();

    assert!(matches!(
        session.send_command("-gdb-version\n-exec-run").await,
        Err(SessionError::InvalidCommand(_))
    ));

    // トークンは消費されていない
    let (result, _) = tokio::join!(session.send_command("-gdb-version"), async {
        let (token, _) = fake.recv_command().await;
        assert_eq!(token, 1);
        fake.send("1^done").await;
    });
    result.unwrap();
}

#[tokio::test]
async fn test_unsubscribed_handler_receives_nothing() {
    let (session, mut fake) = connect();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let subscription = session.subscribe(EventCategory::TargetOutput, move |event| {
        let _ = tx.send(event.clone());
    });
    let mut kept = collect(&session, EventCategory::TargetOutput);

    assert!(subscription.unsubscribe());
    fake.send(r#"@"hello""#).await;

    assert_eq!(kept.recv().await, Some(Event::Stream("hello".to_string())));
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn test_end_is_not_blocked_by_stalled_write() {
    // デバッガが入力を読まないので、長いコマンドの書き込みは終わらない
    let (session_in, _unread) = tokio::io::duplex(16);
    let (_silent, session_out) = tokio::io::duplex(16);
    let session = Arc::new(
        DebugSession::from_streams(session_out, session_in)
            .with_exit_grace(Duration::from_millis(100)),
    );

    let stalled = {
        let session = Arc::clone(&session);
        let command = format!("-data-evaluate-expression {}", "x".repeat(256));
        tokio::spawn(async move { session.send_command(&command).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!stalled.is_finished());

    tokio::time::timeout(Duration::from_secs(2), session.end())
        .await
        .expect("end() must not wait for the stalled write");
    assert_eq!(session.state(), SessionState::Terminated);

    let result = tokio::time::timeout(Duration::from_secs(2), stalled)
        .await
        .expect("stalled command must be released")
        .unwrap();
    assert!(matches!(result, Err(SessionError::Terminated)));
}

#[tokio::test]
async fn test_running_result_after_stop_keeps_stopped_state() {
    let (session, mut fake) = connect();
    let mut exec = collect(&session, EventCategory::ExecAsync);

    fake.send(r#"*stopped,reason="signal-received",signal-name="SIGINT""#)
        .await;
    exec.recv().await;
    assert_eq!(session.state(), SessionState::Stopped);

    // ブレークポイントが近いと `*stopped` が `^running` より先に届く
    let (result, _) = tokio::join!(session.send_command("-exec-continue"), async {
        let (token, _) = fake.recv_command().await;
        fake.send(r#"*running,thread-id="all""#).await;
        fake.send(r#"*stopped,reason="breakpoint-hit",bkptno="1",thread-id="1""#)
            .await;
        fake.send(&format!("{}^running", token)).await;
    });
    result.unwrap();
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_dropping_session_notifies_subscribers() {
    let (session, mut fake) = connect();
    let mut exec = collect(&session, EventCategory::ExecAsync);
    let mut log = collect(&session, EventCategory::LogOutput);

    drop(session);

    assert_eq!(exec.recv().await, Some(Event::Exited));
    assert_eq!(exec.recv().await, None);
    assert_eq!(log.recv().await, Some(Event::Exited));
    assert_eq!(log.recv().await, None);

    // リーダータスクが止まり、デバッガの入力も閉じられる
    assert_eq!(fake.recv_line().await, None);
}
