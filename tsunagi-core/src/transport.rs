//! デバッガ出力の読み取りループ
//!
//! 1つのタスクがデバッガの stdout（と stderr）を読み続け、
//! 行ごとに [`Shared::handle_line`] へ渡します。
//! ストリームが閉じたらセッションを終了させます。

use crate::session::Shared;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

/// 書き込み側のパイプ
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// 行単位の読み取り
///
/// 途中まで読んだバイト列を保持するので、`select!` で中断されても行は欠けない。
/// 不正な UTF-8 は置換文字にして読み進める。
pub(crate) struct LineReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            buf: Vec::new(),
        }
    }

    pub(crate) async fn next_line(&mut self) -> io::Result<Option<String>> {
        let n = self.inner.read_until(b'\n', &mut self.buf).await?;
        if n == 0 && self.buf.is_empty() {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buf)
            .trim_end_matches(|c: char| c == '\n' || c == '\r')
            .to_string();
        self.buf.clear();
        Ok(Some(line))
    }
}

async fn next_stderr_line<E: AsyncRead + Unpin>(
    stderr: &mut Option<LineReader<E>>,
) -> io::Result<Option<String>> {
    match stderr {
        Some(reader) => reader.next_line().await,
        None => Ok(None),
    }
}

/// リーダータスク本体
pub(crate) async fn read_loop<R, E>(shared: Arc<Shared>, stdout: R, stderr: Option<E>)
where
    R: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut stdout = LineReader::new(stdout);
    let mut stderr = stderr.map(LineReader::new);

    loop {
        tokio::select! {
            line = stdout.next_line() => match line {
                Ok(Some(line)) => shared.handle_line(&line),
                Ok(None) => {
                    info!("debugger output closed");
                    break;
                }
                Err(error) => {
                    warn!(%error, "failed to read debugger output");
                    break;
                }
            },
            line = next_stderr_line(&mut stderr), if stderr.is_some() => match line {
                Ok(Some(line)) => shared.handle_stderr(line),
                Ok(None) => {
                    debug!("debugger stderr closed");
                    stderr = None;
                }
                Err(error) => {
                    warn!(%error, "failed to read debugger stderr");
                    stderr = None;
                }
            },
        }
    }

    shared.terminate("debugger output closed");
}

/// 1行書き込んでフラッシュする
pub(crate) async fn write_line(writer: &mut BoxedWriter, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
