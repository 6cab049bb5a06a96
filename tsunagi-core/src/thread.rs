//! スレッド情報とスレッド通知

use crate::events::Event;
use crate::inspect::StackFrame;
use tsunagi_mi::{field_str, opt_field_parse, opt_field_str, Tuple, Value, ValueError};

/// スレッドの実行状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Stopped,
    Running,
}

/// `-thread-info` の1スレッド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: u32,
    /// OS から見た識別子（`Thread 0x7ffff7d86740 (LWP 4242)` など）
    pub target_id: String,
    pub name: Option<String>,
    pub state: ThreadState,
    /// 停止中のみ
    pub frame: Option<StackFrame>,
    pub core: Option<u32>,
}

impl ThreadInfo {
    pub fn from_value(value: &Value) -> Result<Self, ValueError> {
        let tuple = value.expect_tuple()?;
        let state = match field_str(tuple, "state")? {
            "stopped" => ThreadState::Stopped,
            "running" => ThreadState::Running,
            other => {
                return Err(ValueError::Invalid {
                    field: "state".to_string(),
                    value: other.to_string(),
                })
            }
        };
        let frame = match tuple.get("frame") {
            Some(frame) => Some(StackFrame::from_tuple(frame.expect_tuple()?)?),
            None => None,
        };

        Ok(Self {
            id: parse_id(tuple, "id")?,
            target_id: field_str(tuple, "target-id")?.to_string(),
            name: opt_field_str(tuple, "name").map(str::to_string),
            state,
            frame,
            core: opt_field_parse(tuple, "core")?,
        })
    }
}

/// `-thread-info` の結果
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThreadList {
    pub threads: Vec<ThreadInfo>,
    /// ターゲットが動いていなければ報告されない
    pub current_thread_id: Option<u32>,
}

impl ThreadList {
    pub fn from_results(results: &Tuple) -> Result<Self, ValueError> {
        let threads = match results.get("threads") {
            Some(threads) => threads
                .items()
                .iter()
                .map(ThreadInfo::from_value)
                .collect::<Result<_, _>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            threads,
            current_thread_id: opt_field_parse(results, "current-thread-id")?,
        })
    }

    /// 現在のスレッド
    pub fn current(&self) -> Option<&ThreadInfo> {
        let id = self.current_thread_id?;
        self.threads.iter().find(|thread| thread.id == id)
    }
}

/// スレッド・スレッドグループの通知（`=thread-created` など）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadEvent {
    Created { id: u32, group_id: String },
    Exited { id: u32, group_id: String },
    /// `-thread-select` などで現在のスレッドが変わった
    Selected { id: u32, frame: Option<StackFrame> },
    GroupAdded { id: String },
    GroupRemoved { id: String },
    /// プロセスが起動した
    GroupStarted { id: String, pid: Option<u32> },
    /// プロセスが終了した（終了コードは8進数で報告される）
    GroupExited { id: String, exit_code: Option<i32> },
}

impl ThreadEvent {
    /// 非同期レコードのクラスと結果から変換する
    ///
    /// スレッド通知でないもの、必須フィールドが欠けたものは `None` です。
    pub fn from_async(class: &str, results: &Tuple) -> Option<Self> {
        let group = || opt_field_str(results, "id").map(str::to_string);
        let thread_id = || parse_id(results, "id").ok();
        let group_id = || opt_field_str(results, "group-id").map(str::to_string);

        let event = match class {
            "thread-created" => ThreadEvent::Created {
                id: thread_id()?,
                group_id: group_id()?,
            },
            "thread-exited" => ThreadEvent::Exited {
                id: thread_id()?,
                group_id: group_id()?,
            },
            "thread-selected" => ThreadEvent::Selected {
                id: thread_id()?,
                frame: results
                    .get("frame")
                    .and_then(Value::as_tuple)
                    .and_then(|frame| StackFrame::from_tuple(frame).ok()),
            },
            "thread-group-added" => ThreadEvent::GroupAdded { id: group()? },
            "thread-group-removed" => ThreadEvent::GroupRemoved { id: group()? },
            "thread-group-started" => ThreadEvent::GroupStarted {
                id: group()?,
                pid: opt_field_str(results, "pid").and_then(|pid| pid.parse().ok()),
            },
            "thread-group-exited" => ThreadEvent::GroupExited {
                id: group()?,
                exit_code: opt_field_str(results, "exit-code")
                    .and_then(|code| i32::from_str_radix(code, 8).ok()),
            },
            _ => return None,
        };
        Some(event)
    }

    /// 購読イベントから変換する
    pub fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::Async { class, results } => Self::from_async(class, results),
            _ => None,
        }
    }
}

fn parse_id(tuple: &Tuple, key: &str) -> Result<u32, ValueError> {
    let id = field_str(tuple, key)?;
    id.parse().map_err(|_| ValueError::Invalid {
        field: key.to_string(),
        value: id.to_string(),
    })
}
