//! セッションのエラー型

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tsunagi_mi::ValueError;

/// コマンド送信・セッション操作のエラー
#[derive(Debug, Error)]
pub enum SessionError {
    /// デバッガが `^error` を返した
    #[error("debugger error: {msg}")]
    Debugger { msg: String, code: Option<String> },

    /// セッションが終了している（プロセス終了、ストリーム切断、`end()`）
    #[error("debug session terminated")]
    Terminated,

    /// デバッガの起動に失敗した
    #[error("failed to spawn debugger `{}`: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 改行を含むなど、1行として送れないコマンド
    #[error("invalid command text: {0:?}")]
    InvalidCommand(String),

    /// 結果のペイロードが期待した形でない
    #[error("unexpected payload from `{command}`: {source}")]
    UnexpectedPayload {
        command: &'static str,
        #[source]
        source: ValueError,
    },

    /// パイプへの書き込みに失敗した
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    /// `^error` の `code` フィールド
    pub fn code(&self) -> Option<&str> {
        match self {
            SessionError::Debugger { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, SessionError::Terminated)
    }
}

/// ペイロードの形エラーに送信したコマンド名を付ける
pub(crate) fn shape(command: &'static str) -> impl Fn(ValueError) -> SessionError {
    move |source| SessionError::UnexpectedPayload { command, source }
}
