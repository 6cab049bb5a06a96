//! デバッガ起動設定

use std::path::PathBuf;
use std::time::Duration;

/// MI を話すデバッガの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebuggerKind {
    #[default]
    Gdb,
    LldbMi,
}

impl DebuggerKind {
    /// 既定の実行ファイル名
    pub fn default_program(self) -> &'static str {
        match self {
            DebuggerKind::Gdb => "gdb",
            DebuggerKind::LldbMi => "lldb-mi",
        }
    }

    /// MI モードで起動するための引数
    pub fn default_args(self) -> Vec<String> {
        match self {
            DebuggerKind::Gdb => vec![
                "--interpreter=mi".to_string(),
                "--nx".to_string(),
                "--quiet".to_string(),
            ],
            DebuggerKind::LldbMi => Vec::new(),
        }
    }

    /// 起動直後に送るコマンド
    pub fn default_init_commands(self) -> Vec<String> {
        match self {
            DebuggerKind::Gdb => vec!["-gdb-set mi-async on".to_string()],
            DebuggerKind::LldbMi => Vec::new(),
        }
    }
}

/// デバッグセッションの設定
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub kind: DebuggerKind,
    /// デバッガの実行ファイル
    pub program: PathBuf,
    pub args: Vec<String>,
    pub init_commands: Vec<String>,
    /// `end()` でデバッガの終了を待つ時間。過ぎたら kill する
    pub exit_grace: Duration,
}

impl SessionConfig {
    pub fn new(kind: DebuggerKind) -> Self {
        Self {
            kind,
            program: PathBuf::from(kind.default_program()),
            args: kind.default_args(),
            init_commands: kind.default_init_commands(),
            exit_grace: Duration::from_secs(2),
        }
    }

    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn init_command(mut self, command: impl Into<String>) -> Self {
        self.init_commands.push(command.into());
        self
    }

    pub fn exit_grace(mut self, grace: Duration) -> Self {
        self.exit_grace = grace;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(DebuggerKind::default())
    }
}
