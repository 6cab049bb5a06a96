//! 停止イベントの解釈

use crate::events::Event;
use crate::inspect::StackFrame;
use tsunagi_mi::{opt_field_str, Tuple};

/// ターゲットが停止した理由
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// ブレークポイントに到達した
    BreakpointHit { number: Option<u32> },
    /// ステップ実行が完了した
    EndSteppingRange,
    /// `-exec-finish` で関数から戻った
    FunctionFinished,
    /// シグナルを受けた
    SignalReceived { name: Option<String> },
    /// 終了コード付きで終了した
    Exited { code: Option<i32> },
    /// 正常終了した
    ExitedNormally,
    /// シグナルで終了した
    ExitedSignalled { name: Option<String> },
    /// その他の理由
    Other(String),
    /// 理由が報告されなかった（`-exec-interrupt` など）
    Unspecified,
}

impl StopReason {
    fn from_results(results: &Tuple) -> Self {
        let Some(reason) = opt_field_str(results, "reason") else {
            return StopReason::Unspecified;
        };
        let signal = || opt_field_str(results, "signal-name").map(str::to_string);

        match reason {
            "breakpoint-hit" => StopReason::BreakpointHit {
                number: opt_field_str(results, "bkptno").and_then(|n| n.parse().ok()),
            },
            "end-stepping-range" => StopReason::EndSteppingRange,
            "function-finished" => StopReason::FunctionFinished,
            "signal-received" => StopReason::SignalReceived { name: signal() },
            // 終了コードは8進数で報告される
            "exited" => StopReason::Exited {
                code: opt_field_str(results, "exit-code")
                    .and_then(|c| i32::from_str_radix(c, 8).ok()),
            },
            "exited-normally" => StopReason::ExitedNormally,
            "exited-signalled" => StopReason::ExitedSignalled { name: signal() },
            other => StopReason::Other(other.to_string()),
        }
    }

    /// ターゲットプロセスが終了したか
    pub fn is_exit(&self) -> bool {
        matches!(
            self,
            StopReason::Exited { .. } | StopReason::ExitedNormally | StopReason::ExitedSignalled { .. }
        )
    }
}

/// `*stopped` 通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopEvent {
    pub reason: StopReason,
    pub thread_id: Option<String>,
    /// 停止位置（終了時はない）
    pub frame: Option<StackFrame>,
}

impl StopEvent {
    /// 非同期レコードのクラスと結果から変換する（`stopped` 以外は `None`）
    pub fn from_async(class: &str, results: &Tuple) -> Option<Self> {
        if class != "stopped" {
            return None;
        }
        let frame = results
            .get("frame")
            .and_then(|frame| frame.as_tuple())
            .and_then(|frame| StackFrame::from_tuple(frame).ok());

        Some(Self {
            reason: StopReason::from_results(results),
            thread_id: opt_field_str(results, "thread-id").map(str::to_string),
            frame,
        })
    }

    /// 購読イベントから変換する
    pub fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::Async { class, results } => Self::from_async(class, results),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stopped(line: &str) -> Option<StopEvent> {
        let record = tsunagi_mi::parse(line).unwrap();
        let (class, results) = match record.payload {
            tsunagi_mi::Payload::Async { class, results } => (class, results),
            _ => panic!("not an async record"),
        };
        StopEvent::from_async(&class, &results)
    }

    #[test]
    fn test_breakpoint_hit() {
        let stop = stopped(concat!(
            r#"*stopped,reason="breakpoint-hit",disp="keep",bkptno="1",thread-id="1","#,
            r#"frame={addr="0x0000000000400846",func="main",args=[],file="main.cpp",line="7"}"#
        ))
        .unwrap();
        assert_eq!(stop.reason, StopReason::BreakpointHit { number: Some(1) });
        assert_eq!(stop.thread_id.as_deref(), Some("1"));
        let frame = stop.frame.unwrap();
        assert_eq!(frame.func.as_deref(), Some("main"));
        assert_eq!(frame.line, Some(7));
    }

    #[test]
    fn test_exit_code_is_octal() {
        let stop = stopped(r#"*stopped,reason="exited",exit-code="012""#).unwrap();
        assert_eq!(stop.reason, StopReason::Exited { code: Some(10) });
        assert!(stop.reason.is_exit());
        assert!(stop.frame.is_none());
    }

    #[test]
    fn test_signal_and_other_reasons() {
        let stop = stopped(r#"*stopped,reason="signal-received",signal-name="SIGINT""#).unwrap();
        assert_eq!(
            stop.reason,
            StopReason::SignalReceived {
                name: Some("SIGINT".to_string())
            }
        );
        assert!(!stop.reason.is_exit());

        let stop = stopped(r#"*stopped,reason="watchpoint-trigger""#).unwrap();
        assert_eq!(stop.reason, StopReason::Other("watchpoint-trigger".to_string()));

        let stop = stopped(r#"*stopped,thread-id="2""#).unwrap();
        assert_eq!(stop.reason, StopReason::Unspecified);
    }

    #[test]
    fn test_running_is_not_a_stop() {
        assert!(stopped(r#"*running,thread-id="all""#).is_none());
        assert!(StopEvent::from_event(&Event::Exited).is_none());
    }
}
