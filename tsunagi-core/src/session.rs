//! デバッグセッション
//!
//! デバッガの stdin/stdout という1本の双方向ストリームを、トークンごとの
//! コマンド Future と、独立したイベントストリームに多重化します。
//!
//! - コマンドは送信時に単調増加のトークンを割り当て、結果レコードは
//!   トークンの値で対応付けます（到着順には依存しない）
//! - 非同期・ストリームレコードは保留中のコマンドを消費せず、常に購読者へ配送します
//! - 1行の解析失敗やプロトコル違反は診断イベントを出すだけで、処理は継続します
//! - プロセス終了・ストリーム切断・`end()` で、保留中の全コマンドが
//!   [`SessionError::Terminated`] で失敗し、セッションは終了状態から戻りません

use crate::config::SessionConfig;
use crate::errors::SessionError;
use crate::events::{Diagnostic, Event, EventCategory, Subscribers, Subscription, Violation};
use crate::transport::{read_loop, write_line, BoxedWriter};
use crate::Result;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use tsunagi_mi::{opt_field_str, Payload, Record, RecordKind, Tuple};

/// セッションの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// デバッガ起動直後
    Created,
    /// 実行ファイル設定済み
    Configured,
    /// ターゲット実行中
    Running,
    /// ターゲット停止中
    Stopped,
    /// 終了済み（戻らない）
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Configured => "configured",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

type Reply = Result<Tuple>;

/// 結果待ちのコマンド
struct PendingCommand {
    command: String,
    reply: oneshot::Sender<Reply>,
}

struct Inner {
    state: SessionState,
    next_token: u64,
    pending: HashMap<u64, PendingCommand>,
}

impl Inner {
    fn transition(&mut self, next: SessionState) {
        if self.state != SessionState::Terminated && self.state != next {
            debug!(from = %self.state, to = %next, "session state changed");
            self.state = next;
        }
    }

    fn allocate_token(&mut self) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        token
    }
}

/// リーダータスクと呼び出し側で共有する状態
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    subscribers: Arc<Subscribers>,
    /// 終了したら true になる
    closed: watch::Sender<bool>,
}

impl Shared {
    fn new(writer: BoxedWriter) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::Created,
                next_token: 1,
                pending: HashMap::new(),
            }),
            writer: tokio::sync::Mutex::new(Some(writer)),
            subscribers: Arc::new(Subscribers::default()),
            closed: watch::channel(false).0,
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> SessionState {
        self.inner().state
    }

    /// トークンを割り当てて保留コマンドを登録する
    fn register(&self, command: &str, reply: oneshot::Sender<Reply>) -> Result<u64> {
        let mut inner = self.inner();
        if inner.state == SessionState::Terminated {
            return Err(SessionError::Terminated);
        }
        let token = inner.allocate_token();
        inner.pending.insert(
            token,
            PendingCommand {
                command: command.to_string(),
                reply,
            },
        );
        Ok(token)
    }

    fn forget(&self, token: u64) {
        self.inner().pending.remove(&token);
    }

    /// 終了するまで待つ
    async fn closed(&self) {
        let mut closed = self.closed.subscribe();
        // 送信側は Shared が持っているので閉じない
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// 出力1行を処理する
    pub(crate) fn handle_line(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        if tsunagi_mi::is_prompt(line) {
            trace!("prompt");
            return;
        }
        if self.state() == SessionState::Terminated {
            trace!(line, "dropping line after termination");
            return;
        }
        debug!(line, "received");

        match tsunagi_mi::parse(line) {
            Ok(record) => self.route(record, line),
            Err(error) => {
                warn!(line, %error, "failed to parse MI record");
                let diagnostic = if error.is_protocol_violation() {
                    Diagnostic::ProtocolViolation {
                        line: line.to_string(),
                        violation: Violation::UnknownRecord(error),
                    }
                } else {
                    Diagnostic::Malformed {
                        line: line.to_string(),
                        error,
                    }
                };
                self.report(diagnostic);
            }
        }
    }

    /// デバッガの stderr はログ出力として配送する
    pub(crate) fn handle_stderr(&self, line: String) {
        if line.trim().is_empty() || self.state() == SessionState::Terminated {
            return;
        }
        debug!(line = %line, "stderr");
        self.subscribers
            .publish(EventCategory::LogOutput, &Event::Stream(line));
    }

    fn route(&self, record: Record, line: &str) {
        if record.kind.is_result() {
            self.complete(record, line);
        } else {
            self.publish_record(record);
        }
    }

    /// 結果レコードを保留コマンドに対応付ける
    fn complete(&self, record: Record, line: &str) {
        let Record {
            kind,
            token,
            payload,
        } = record;
        let results = match payload {
            Payload::Results(results) => results,
            _ => Tuple::new(),
        };

        let pending = {
            let mut inner = self.inner();
            // 実行中・停止中の切り替えは `*running`/`*stopped` に従う。
            // `^running` は `*stopped` より後に届くことがある
            if kind == RecordKind::Running
                && matches!(inner.state, SessionState::Created | SessionState::Configured)
            {
                inner.transition(SessionState::Running);
            }
            token.and_then(|token| inner.pending.remove(&token))
        };

        match (token, pending) {
            (Some(token), Some(pending)) => {
                debug!(token, command = %pending.command, ?kind, "command completed");
                let reply = match kind {
                    RecordKind::Error => Err(SessionError::Debugger {
                        msg: opt_field_str(&results, "msg").unwrap_or_default().to_string(),
                        code: opt_field_str(&results, "code").map(str::to_string),
                    }),
                    RecordKind::Exit => Ok(Tuple::new()),
                    _ => Ok(results),
                };
                // 応答を受け取った時点で終了状態が見えるようにする
                if kind == RecordKind::Exit {
                    self.terminate("debugger exited");
                }
                // 呼び出し側が Future を捨てていれば届かない
                let _ = pending.reply.send(reply);
            }
            (Some(token), None) => {
                warn!(token, ?kind, "result for unknown token");
                self.report(Diagnostic::ProtocolViolation {
                    line: line.to_string(),
                    violation: Violation::UnmatchedToken(token),
                });
            }
            (None, _) => {
                warn!(?kind, "result without token");
                self.report(Diagnostic::ProtocolViolation {
                    line: line.to_string(),
                    violation: Violation::UntokenedResult(kind),
                });
            }
        }

        if kind == RecordKind::Exit {
            self.terminate("debugger exited");
        }
    }

    /// 非同期・ストリームレコードを購読者へ配送する
    fn publish_record(&self, record: Record) {
        let Some(category) = EventCategory::of(record.kind) else {
            return;
        };

        let event = match record.payload {
            Payload::Async { class, results } => {
                if record.kind == RecordKind::AsyncExec {
                    match class.as_str() {
                        "running" => self.inner().transition(SessionState::Running),
                        "stopped" => self.inner().transition(SessionState::Stopped),
                        _ => {}
                    }
                }
                Event::Async { class, results }
            }
            Payload::Stream(text) => Event::Stream(text),
            Payload::Results(_) => return,
        };

        self.subscribers.publish(category, &event);
    }

    fn report(&self, diagnostic: Diagnostic) {
        self.subscribers
            .publish(EventCategory::Diagnostic, &Event::Diagnostic(diagnostic));
    }

    fn configure(&self) {
        let mut inner = self.inner();
        if inner.state == SessionState::Created {
            inner.transition(SessionState::Configured);
        }
    }

    /// セッションを終了させる
    ///
    /// 保留中のコマンドを全て失敗させ、購読者に終了イベントを送る。
    /// 既に終了済みなら何もせず false を返す。
    pub(crate) fn terminate(&self, reason: &str) -> bool {
        let pending = {
            let mut inner = self.inner();
            if inner.state == SessionState::Terminated {
                return false;
            }
            inner.state = SessionState::Terminated;
            std::mem::take(&mut inner.pending)
        };

        info!(reason, pending = pending.len(), "debug session terminated");
        for (_, command) in pending {
            let _ = command.reply.send(Err(SessionError::Terminated));
        }
        self.closed.send_replace(true);
        self.subscribers.close();
        true
    }
}

/// MI デバッグセッション
///
/// `send_command` は `&self` で呼べるので、`Arc<DebugSession>` を複数タスクで
/// 共有して複数のコマンドを同時に保留できます（パイプライン）。
pub struct DebugSession {
    shared: Arc<Shared>,
    child: tokio::sync::Mutex<Option<Child>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    exit_grace: Duration,
}

impl DebugSession {
    /// デバッガを起動してセッションを開始する
    ///
    /// 設定の初期化コマンドを順に送り、全て成功してから返ります。
    pub async fn spawn(config: &SessionConfig) -> Result<Self> {
        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| SessionError::Spawn {
            path: config.program.clone(),
            source,
        })?;
        info!(program = %config.program.display(), pid = ?child.id(), "spawned debugger");

        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take();

        let session = Self::assemble(
            stdout,
            stderr,
            Box::new(stdin),
            Some(child),
            config.exit_grace,
        );

        for command in &config.init_commands {
            session.send_command(command).await?;
        }

        Ok(session)
    }

    /// 任意の非同期ストリームに接続してセッションを開始する
    ///
    /// `reader` はデバッガの出力、`writer` はデバッガの入力です。
    /// tokio ランタイム内で呼ぶ必要があります。
    pub fn from_streams<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::assemble(
            reader,
            None::<tokio::io::Empty>,
            Box::new(writer),
            None,
            STREAM_EXIT_GRACE,
        )
    }

    /// `end()` で待つ時間を変える
    pub fn with_exit_grace(mut self, grace: Duration) -> Self {
        self.exit_grace = grace;
        self
    }

    fn assemble<R, E>(
        stdout: R,
        stderr: Option<E>,
        writer: BoxedWriter,
        child: Option<Child>,
        exit_grace: Duration,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        E: AsyncRead + Send + Unpin + 'static,
    {
        let shared = Arc::new(Shared::new(writer));
        let reader = tokio::spawn(read_loop(Arc::clone(&shared), stdout, stderr));
        Self {
            shared,
            child: tokio::sync::Mutex::new(child),
            reader: Mutex::new(Some(reader)),
            exit_grace,
        }
    }

    /// 現在の状態
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// MI コマンドを送り、結果を待つ
    ///
    /// `command` はトークンなしの MI コマンド（例: `-break-insert main`）です。
    /// `^done`/`^running`/`^connected` ならペイロード、`^error` なら
    /// [`SessionError::Debugger`]、`^exit` なら空のペイロードを返します。
    pub async fn send_command(&self, command: &str) -> Result<Tuple> {
        if command.contains(|c: char| c == '\n' || c == '\r') {
            return Err(SessionError::InvalidCommand(command.to_string()));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        // 入力が詰まって書き込みが終わらなくても、終了すれば抜ける
        tokio::select! {
            written = self.write_command(command, reply_tx) => written?,
            _ = self.shared.closed() => return Err(SessionError::Terminated),
        }

        match reply_rx.await {
            Ok(reply) => reply,
            Err(_) => Err(SessionError::Terminated),
        }
    }

    async fn write_command(&self, command: &str, reply: oneshot::Sender<Reply>) -> Result<()> {
        // 書き込みロックを持ったまま割り当てるので、トークンは昇順に並ぶ
        let mut writer = self.shared.writer.lock().await;
        let token = self.shared.register(command, reply)?;
        let Some(writer) = writer.as_mut() else {
            self.shared.forget(token);
            return Err(SessionError::Terminated);
        };

        debug!(token, command, "sending MI command");
        if let Err(error) = write_line(writer, &format!("{}{}\n", token, command)).await {
            warn!(token, %error, "failed to write command");
            self.shared.forget(token);
            return Err(error.into());
        }
        Ok(())
    }

    /// イベントを購読する
    pub fn subscribe<F>(&self, category: EventCategory, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.shared.subscribers.subscribe(category, Arc::new(handler))
    }

    /// デバッグ対象の実行ファイルを設定する（`-file-exec-and-symbols`）
    pub async fn set_executable_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_string_lossy();
        self.send_command(&format!("-file-exec-and-symbols {}", tsunagi_mi::quote(&path)))
            .await?;
        self.shared.configure();
        Ok(())
    }

    /// ターゲットを起動する（`-exec-run`）
    pub async fn start_target(&self) -> Result<()> {
        self.send_command("-exec-run").await?;
        Ok(())
    }

    /// 実行ファイルを設定してターゲットを起動する
    pub async fn start(&self, path: impl AsRef<Path>) -> Result<()> {
        self.set_executable_file(path).await?;
        self.start_target().await
    }

    /// 実行中のターゲットを停止させる（`-exec-interrupt`）
    pub async fn interrupt(&self) -> Result<()> {
        self.send_command("-exec-interrupt").await?;
        Ok(())
    }

    /// セッションを終了する
    ///
    /// 保留中のコマンドは [`SessionError::Terminated`] で失敗します。
    /// デバッガには `-gdb-exit` を送って入力を閉じ、猶予時間内に終了しなければ kill します。
    /// 入力が詰まっていても猶予時間を超えては待ちません。
    /// 何度呼んでもよい。
    pub async fn end(&self) {
        let first = self.shared.terminate("session ended");
        let deadline = Instant::now() + self.exit_grace;

        let farewell = async {
            let mut writer = self.shared.writer.lock().await;
            if let Some(mut pipe) = writer.take() {
                if first {
                    let token = self.shared.inner().allocate_token();
                    if let Err(error) = write_line(&mut pipe, &format!("{}-gdb-exit\n", token)).await
                    {
                        debug!(%error, "could not send -gdb-exit");
                    }
                }
                if let Err(error) = pipe.shutdown().await {
                    debug!(%error, "could not close debugger input");
                }
            }
        };
        if tokio::time::timeout_at(deadline, farewell).await.is_err() {
            warn!("debugger input is blocked, dropping it");
        }

        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(Ok(status)) => info!(%status, "debugger exited"),
                Ok(Err(error)) => warn!(%error, "failed to wait for debugger"),
                Err(_) => {
                    warn!("debugger did not exit in time, killing it");
                    if let Err(error) = child.kill().await {
                        warn!(%error, "failed to kill debugger");
                    }
                }
            }
        }

        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reader) = reader {
            reader.abort();
        }
    }
}

impl Drop for DebugSession {
    fn drop(&mut self) {
        // 保留中のコマンドと購読者に終了を知らせる
        self.shared.terminate("session dropped");
        if let Some(reader) = self
            .reader
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            reader.abort();
        }
    }
}

/// `from_streams` の既定の猶予時間
const STREAM_EXIT_GRACE: Duration = Duration::from_secs(2);

fn missing_pipe(name: &str) -> SessionError {
    SessionError::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("debugger {} is not piped", name),
    ))
}
