//! REPL コマンド

use crate::breakpoint::BreakpointId;
use crate::parse::parse_address;

/// `x` コマンドの既定の読み取りバイト数
pub const DEFAULT_EXAMINE_LENGTH: usize = 64;

/// REPL コマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 実行ファイルを設定
    File(String),
    /// ターゲットを起動
    Run,
    /// ブレークポイントを設定
    Break(String),
    /// ブレークポイントを削除
    Delete(BreakpointId),
    /// 実行継続
    Continue,
    /// ステップ実行
    Step,
    /// 次の行へ
    Next,
    /// 現在の関数から抜けるまで実行
    Finish,
    /// 実行中のターゲットを停止
    Interrupt,
    /// バックトレース表示
    Backtrace,
    /// ローカル変数表示
    Locals,
    /// 式の評価
    Print(String),
    /// メモリ表示
    Examine { address: u64, length: usize },
    /// レジスタ名一覧
    Registers,
    /// ウォッチを追加
    Watch(String),
    /// ウォッチを更新して変化を表示
    Watches,
    /// ウォッチを削除
    Unwatch(String),
    /// スレッド一覧
    Threads,
    /// スレッドを切り替え
    Thread(u32),
    /// 生の MI コマンド
    Raw(String),
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let (head, rest) = match input.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (input, ""),
        };
        if head.is_empty() {
            return None;
        }

        let with_arg = |make: fn(String) -> Command| {
            if rest.is_empty() {
                None
            } else {
                Some(make(rest.to_string()))
            }
        };

        match head {
            "file" => with_arg(Command::File),
            "run" | "r" => Some(Command::Run),
            "break" | "b" => with_arg(Command::Break),
            "delete" | "d" => rest.parse().ok().map(Command::Delete),
            "continue" | "c" => Some(Command::Continue),
            "step" | "s" => Some(Command::Step),
            "next" | "n" => Some(Command::Next),
            "finish" | "f" => Some(Command::Finish),
            "interrupt" | "i" => Some(Command::Interrupt),
            "backtrace" | "bt" => Some(Command::Backtrace),
            "locals" | "l" => Some(Command::Locals),
            "print" | "p" => with_arg(Command::Print),
            "x" => {
                let mut args = rest.split_whitespace();
                let address = parse_address(args.next()?).ok()?;
                let length = match args.next() {
                    Some(len) => len.parse().ok()?,
                    None => DEFAULT_EXAMINE_LENGTH,
                };
                Some(Command::Examine { address, length })
            }
            "registers" | "regs" => Some(Command::Registers),
            "watch" | "w" => with_arg(Command::Watch),
            "watches" => Some(Command::Watches),
            "unwatch" => with_arg(Command::Unwatch),
            "threads" => Some(Command::Threads),
            "thread" | "t" => rest.parse().ok().map(Command::Thread),
            "mi" => with_arg(Command::Raw),
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}
