//! テスト用の偽デバッガ
//!
//! `tokio::io::duplex` のパイプでセッションとつなぎ、
//! 送られたコマンドを読んで任意の MI 出力を返します。

#![allow(dead_code)]

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::sync::mpsc;
use tsunagi_core::{DebugSession, Event, EventCategory};

pub struct FakeDebugger {
    commands: Lines<BufReader<DuplexStream>>,
    output: DuplexStream,
}

/// セッションと偽デバッガを接続する
pub fn connect() -> (DebugSession, FakeDebugger) {
    let (session_in, fake_in) = tokio::io::duplex(4096);
    let (fake_out, session_out) = tokio::io::duplex(4096);
    let session = DebugSession::from_streams(session_out, session_in);
    let fake = FakeDebugger {
        commands: BufReader::new(fake_in).lines(),
        output: fake_out,
    };
    (session, fake)
}

impl FakeDebugger {
    /// セッションが書いた1行を読む
    pub async fn recv_line(&mut self) -> Option<String> {
        self.commands.next_line().await.unwrap()
    }

    /// コマンドを読み、トークンと本文に分ける
    pub async fn recv_command(&mut self) -> (u64, String) {
        let line = self.recv_line().await.expect("session closed its input");
        let digits = line.find(|c: char| !c.is_ascii_digit()).unwrap_or(line.len());
        let token = line[..digits].parse().expect("command without token");
        (token, line[digits..].to_string())
    }

    /// MI 出力を1行送る
    pub async fn send(&mut self, line: &str) {
        self.output.write_all(line.as_bytes()).await.unwrap();
        self.output.write_all(b"\n").await.unwrap();
        self.output.flush().await.unwrap();
    }

    /// 期待したコマンドを受け取り、同じトークンで応答する
    pub async fn answer(&mut self, expected: &str, reply: &str) -> u64 {
        let (token, command) = self.recv_command().await;
        assert_eq!(command, expected);
        self.send(&format!("{}{}", token, reply)).await;
        token
    }
}

/// イベントをチャネルに流す購読を登録する
pub fn collect(session: &DebugSession, category: EventCategory) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    session.subscribe(category, move |event| {
        let _ = tx.send(event.clone());
    });
    rx
}
