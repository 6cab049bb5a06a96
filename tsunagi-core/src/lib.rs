//! tsunagi デバッガ制御のコア機能
//!
//! このクレートは、GDB/LLDB-MI を子プロセスとして起動し、MI プロトコルで
//! 操作するための機能を提供します。
//! コマンドのトークン対応付け、非同期通知の購読、セッションの状態管理を行い、
//! その上にブレークポイント・ステップ実行・ウォッチ・スレッド情報などの型付き操作を載せています。

pub mod breakpoint;
pub mod command;
pub mod config;
pub mod debugger;
pub mod errors;
pub mod events;
pub mod inspect;
pub mod parse;
pub mod session;
pub mod stop;
pub mod thread;
mod transport;
pub mod watch;

pub use breakpoint::{Breakpoint, BreakpointId, BreakpointLocation, BreakpointTable};
pub use command::Command;
pub use config::{DebuggerKind, SessionConfig};
pub use debugger::Debugger;
pub use errors::SessionError;
pub use events::{Diagnostic, Event, EventCategory, Subscription, Violation};
pub use inspect::{FrameScope, MemoryBlock, StackFrame, Variable};
pub use session::{DebugSession, SessionState};
pub use stop::{StopEvent, StopReason};
pub use thread::{ThreadEvent, ThreadInfo, ThreadList, ThreadState};
pub use watch::{InScope, VariableChange, VariableObject, WatchFrame, WatchOptions};

// 他のクレートから使用するために再エクスポート
pub use tsunagi_mi::{Tuple, Value};

/// セッション操作の結果型
pub type Result<T> = std::result::Result<T, SessionError>;
