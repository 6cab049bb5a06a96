//! 解析済みの出力レコード

use crate::value::Tuple;

/// レコードの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// `^done`
    Done,
    /// `^running`
    Running,
    /// `^connected`
    Connected,
    /// `^error`
    Error,
    /// `^exit`
    Exit,
    /// `~"..."`
    ConsoleOutput,
    /// `@"..."`
    TargetOutput,
    /// `&"..."`
    LogOutput,
    /// `*class,...`
    AsyncExec,
    /// `+class,...`
    AsyncStatus,
    /// `=class,...`
    AsyncNotify,
}

impl RecordKind {
    /// `^` に続く結果クラスから種類を決める
    pub fn from_result_class(class: &str) -> Option<Self> {
        match class {
            "done" => Some(RecordKind::Done),
            "running" => Some(RecordKind::Running),
            "connected" => Some(RecordKind::Connected),
            "error" => Some(RecordKind::Error),
            "exit" => Some(RecordKind::Exit),
            _ => None,
        }
    }

    pub fn is_result(self) -> bool {
        matches!(
            self,
            RecordKind::Done
                | RecordKind::Running
                | RecordKind::Connected
                | RecordKind::Error
                | RecordKind::Exit
        )
    }

    pub fn is_stream(self) -> bool {
        matches!(
            self,
            RecordKind::ConsoleOutput | RecordKind::TargetOutput | RecordKind::LogOutput
        )
    }

    pub fn is_async(self) -> bool {
        matches!(
            self,
            RecordKind::AsyncExec | RecordKind::AsyncStatus | RecordKind::AsyncNotify
        )
    }
}

/// レコードの中身
///
/// 形は種類によって決まります。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// 結果レコードのマッピング
    Results(Tuple),
    /// ストリームレコードの文字列
    Stream(String),
    /// 非同期レコードのクラスとマッピング
    Async { class: String, results: Tuple },
}

/// 1行分の解析済みレコード
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub kind: RecordKind,
    pub token: Option<u64>,
    pub payload: Payload,
}

impl Record {
    /// 結果・非同期レコードのマッピング
    pub fn results(&self) -> Option<&Tuple> {
        match &self.payload {
            Payload::Results(results) | Payload::Async { results, .. } => Some(results),
            Payload::Stream(_) => None,
        }
    }

    /// 非同期レコードのクラス
    pub fn async_class(&self) -> Option<&str> {
        match &self.payload {
            Payload::Async { class, .. } => Some(class),
            _ => None,
        }
    }

    /// ストリームレコードの文字列
    pub fn stream_text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Stream(text) => Some(text),
            _ => None,
        }
    }
}
