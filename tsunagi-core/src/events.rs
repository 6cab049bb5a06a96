//! イベント購読
//!
//! デバッガからの非同期通知・ストリーム出力・診断を、カテゴリごとの
//! 購読者へ同期的に配送します。配送は登録順です。
//! ハンドラはリーダータスク上で呼ばれるため、長くブロックしてはいけません。

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use thiserror::Error;
use tsunagi_mi::{ParseError, RecordKind, Tuple};

/// 購読カテゴリ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// `*` 実行状態（stopped, running）
    ExecAsync,
    /// `+` 進捗状況
    StatusAsync,
    /// `=` 一般通知（スレッド、ライブラリ、ブレークポイント）
    NotifyAsync,
    /// `~` コンソール出力
    ConsoleOutput,
    /// `@` ターゲット出力
    TargetOutput,
    /// `&` ログ出力（デバッガの stderr を含む）
    LogOutput,
    /// 解析できなかった行、プロトコル違反
    Diagnostic,
}

impl EventCategory {
    /// レコードの種類に対応するカテゴリ（結果レコードは `None`）
    pub fn of(kind: RecordKind) -> Option<Self> {
        match kind {
            RecordKind::AsyncExec => Some(EventCategory::ExecAsync),
            RecordKind::AsyncStatus => Some(EventCategory::StatusAsync),
            RecordKind::AsyncNotify => Some(EventCategory::NotifyAsync),
            RecordKind::ConsoleOutput => Some(EventCategory::ConsoleOutput),
            RecordKind::TargetOutput => Some(EventCategory::TargetOutput),
            RecordKind::LogOutput => Some(EventCategory::LogOutput),
            _ => None,
        }
    }
}

/// 購読者に届くイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// 非同期レコード
    Async { class: String, results: Tuple },
    /// ストリームレコードの文字列
    Stream(String),
    Diagnostic(Diagnostic),
    /// セッション終了。各購読につきちょうど1回届く
    Exited,
}

/// 行単位の異常。セッションは継続する
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    #[error("malformed MI line {line:?}: {error}")]
    Malformed { line: String, error: ParseError },

    #[error("protocol violation on line {line:?}: {violation}")]
    ProtocolViolation { line: String, violation: Violation },
}

/// プロトコル違反の内容
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("no pending command for token {0}")]
    UnmatchedToken(u64),

    #[error("{0:?} result without a token")]
    UntokenedResult(RecordKind),

    #[error("{0}")]
    UnknownRecord(ParseError),
}

/// イベントハンドラ
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Entry {
    id: u64,
    category: EventCategory,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    closed: bool,
    entries: Vec<Entry>,
}

/// カテゴリ別の購読者一覧
#[derive(Default)]
pub(crate) struct Subscribers {
    registry: Mutex<Registry>,
}

impl Subscribers {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn subscribe(self: &Arc<Self>, category: EventCategory, handler: Handler) -> Subscription {
        let id = {
            let mut registry = self.registry();
            if registry.closed {
                None
            } else {
                registry.next_id += 1;
                let id = registry.next_id;
                registry.entries.push(Entry {
                    id,
                    category,
                    handler: Arc::clone(&handler),
                });
                Some(id)
            }
        };

        match id {
            Some(id) => Subscription {
                id,
                subscribers: Arc::downgrade(self),
            },
            None => {
                // 終了済みなら終了イベントだけ届けて終わり
                handler(&Event::Exited);
                Subscription {
                    id: 0,
                    subscribers: Weak::new(),
                }
            }
        }
    }

    fn unsubscribe(&self, id: u64) -> bool {
        let mut registry = self.registry();
        let before = registry.entries.len();
        registry.entries.retain(|entry| entry.id != id);
        registry.entries.len() != before
    }

    /// カテゴリの購読者に登録順で配送する
    ///
    /// ロックを離してから呼ぶので、ハンドラ内で購読・解除してもよい。
    pub(crate) fn publish(&self, category: EventCategory, event: &Event) {
        let handlers: Vec<Handler> = self
            .registry()
            .entries
            .iter()
            .filter(|entry| entry.category == category)
            .map(|entry| Arc::clone(&entry.handler))
            .collect();

        for handler in handlers {
            handler(event);
        }
    }

    /// 全購読者に終了イベントを1回ずつ送り、以降の登録を閉じる
    pub(crate) fn close(&self) {
        let entries = {
            let mut registry = self.registry();
            registry.closed = true;
            std::mem::take(&mut registry.entries)
        };

        for entry in entries {
            (entry.handler)(&Event::Exited);
        }
    }
}

/// 購読の解除子
///
/// 破棄しても購読は解除されません。解除するには [`Subscription::unsubscribe`] を呼びます。
pub struct Subscription {
    id: u64,
    subscribers: Weak<Subscribers>,
}

impl Subscription {
    /// 購読を解除する。既に解除済み・終了済みなら false
    pub fn unsubscribe(self) -> bool {
        match self.subscribers.upgrade() {
            Some(subscribers) => subscribers.unsubscribe(self.id),
            None => false,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
