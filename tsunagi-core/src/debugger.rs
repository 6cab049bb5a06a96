//! 型付きのデバッガ操作
//!
//! [`DebugSession`] の上に、ブレークポイント・ステップ実行・検査などの
//! 操作を載せます。各操作は MI コマンド1つに対応します。

use crate::breakpoint::{Breakpoint, BreakpointId, BreakpointTable};
use crate::config::SessionConfig;
use crate::errors::shape;
use crate::inspect::{FrameScope, MemoryBlock, StackFrame, Variable};
use crate::session::{DebugSession, SessionState};
use crate::thread::{ThreadInfo, ThreadList};
use crate::watch::{VariableChange, VariableObject, WatchOptions};
use crate::Result;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;
use tsunagi_mi::{field_str, Tuple, Value, ValueError};

/// デバッガ
pub struct Debugger {
    /// MI セッション
    session: DebugSession,
    /// ブレークポイント管理
    breakpoints: Mutex<BreakpointTable>,
}

impl Debugger {
    /// 既存のセッションから作成する
    pub fn new(session: DebugSession) -> Self {
        Self {
            session,
            breakpoints: Mutex::new(BreakpointTable::new()),
        }
    }

    /// デバッガを起動する
    pub async fn launch(config: &SessionConfig) -> Result<Self> {
        Ok(Self::new(DebugSession::spawn(config).await?))
    }

    /// 下位のセッション（生の MI コマンドや購読に使う）
    pub fn session(&self) -> &DebugSession {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    fn table(&self) -> MutexGuard<'_, BreakpointTable> {
        self.breakpoints.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 実行可能ファイルを設定する
    pub async fn load_binary(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.session.set_executable_file(path).await?;
        info!(path = %path.display(), "executable loaded");
        Ok(())
    }

    /// ターゲットを起動する
    pub async fn run(&self) -> Result<()> {
        self.session.start_target().await
    }

    /// ブレークポイントを設定する
    pub async fn add_breakpoint(&self, location: &str) -> Result<Breakpoint> {
        const COMMAND: &str = "-break-insert";
        let results = self
            .session
            .send_command(&format!("{} {}", COMMAND, mi_arg(location)))
            .await?;
        let bkpt = results
            .get("bkpt")
            .ok_or_else(|| ValueError::MissingField("bkpt".to_string()))
            .and_then(Breakpoint::from_value)
            .map_err(shape(COMMAND))?;

        self.table().insert(bkpt.clone());
        Ok(bkpt)
    }

    /// ブレークポイントを削除する
    pub async fn remove_breakpoint(&self, id: BreakpointId) -> Result<()> {
        self.session
            .send_command(&format!("-break-delete {}", id))
            .await?;
        self.table().remove(id);
        Ok(())
    }

    /// ブレークポイントを有効化する
    pub async fn enable_breakpoint(&self, id: BreakpointId) -> Result<()> {
        self.session
            .send_command(&format!("-break-enable {}", id))
            .await?;
        self.table().set_enabled(id, true);
        Ok(())
    }

    /// ブレークポイントを無効化する
    pub async fn disable_breakpoint(&self, id: BreakpointId) -> Result<()> {
        self.session
            .send_command(&format!("-break-disable {}", id))
            .await?;
        self.table().set_enabled(id, false);
        Ok(())
    }

    /// 設定済みのブレークポイント（番号順）
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.table().all().cloned().collect()
    }

    /// 実行を継続する
    pub async fn resume(&self) -> Result<()> {
        self.exec("-exec-continue").await
    }

    /// ステップイン
    pub async fn step_into(&self) -> Result<()> {
        self.exec("-exec-step").await
    }

    /// ステップオーバー
    pub async fn step_over(&self) -> Result<()> {
        self.exec("-exec-next").await
    }

    /// ステップアウト
    pub async fn step_out(&self) -> Result<()> {
        self.exec("-exec-finish").await
    }

    /// 実行中のターゲットを停止させる
    pub async fn interrupt(&self) -> Result<()> {
        self.session.interrupt().await
    }

    /// 実行系コマンドは `^running` を返すだけで、停止は `*stopped` で通知される
    async fn exec(&self, command: &str) -> Result<()> {
        self.session.send_command(command).await?;
        Ok(())
    }

    /// バックトレースを取得する
    pub async fn stack_frames(&self) -> Result<Vec<StackFrame>> {
        const COMMAND: &str = "-stack-list-frames";
        let results = self.session.send_command(COMMAND).await?;
        decode_frames(&results).map_err(shape(COMMAND))
    }

    /// 現在のフレームのローカル変数を取得する
    pub async fn locals(&self) -> Result<Vec<Variable>> {
        const COMMAND: &str = "-stack-list-variables";
        let results = self
            .session
            .send_command(&format!("{} --simple-values", COMMAND))
            .await?;
        list_field(&results, "variables")
            .and_then(|items| items.iter().map(Variable::from_value).collect())
            .map_err(shape(COMMAND))
    }

    /// 式を評価する
    pub async fn evaluate_expression(&self, expr: &str) -> Result<String> {
        self.evaluate_expression_in(expr, FrameScope::default()).await
    }

    /// スレッドとフレームを指定して式を評価する
    pub async fn evaluate_expression_in(&self, expr: &str, scope: FrameScope) -> Result<String> {
        const COMMAND: &str = "-data-evaluate-expression";
        let results = self
            .session
            .send_command(&format!("{} {}{}", COMMAND, scope.mi_options(), mi_arg(expr)))
            .await?;
        field_str(&results, "value")
            .map(str::to_string)
            .map_err(shape(COMMAND))
    }

    /// メモリを読み取る
    pub async fn read_memory(&self, address: u64, count: usize) -> Result<Vec<MemoryBlock>> {
        self.read_memory_from(address, 0, count).await
    }

    /// `address + byte_offset` からメモリを読み取る
    ///
    /// 各ブロックの `offset` は `address` からの位置です。
    pub async fn read_memory_from(
        &self,
        address: u64,
        byte_offset: i64,
        count: usize,
    ) -> Result<Vec<MemoryBlock>> {
        const COMMAND: &str = "-data-read-memory-bytes";
        let command = if byte_offset == 0 {
            format!("{} 0x{:x} {}", COMMAND, address, count)
        } else {
            format!("{} -o {} 0x{:x} {}", COMMAND, byte_offset, address, count)
        };
        let results = self.session.send_command(&command).await?;
        list_field(&results, "memory")
            .and_then(|items| items.iter().map(MemoryBlock::from_value).collect())
            .map_err(shape(COMMAND))
    }

    /// レジスタ名の一覧を取得する
    ///
    /// 番号の欠けたレジスタは空文字列として報告されます。
    pub async fn register_names(&self) -> Result<Vec<String>> {
        self.register_names_of(&[]).await
    }

    /// 指定した番号のレジスタ名を取得する（空なら全て）
    pub async fn register_names_of(&self, numbers: &[u32]) -> Result<Vec<String>> {
        const COMMAND: &str = "-data-list-register-names";
        let mut command = COMMAND.to_string();
        for number in numbers {
            command.push_str(&format!(" {}", number));
        }
        let results = self.session.send_command(&command).await?;
        list_field(&results, "register-names")
            .and_then(|items| {
                items
                    .iter()
                    .map(|name| name.expect_str().map(str::to_string))
                    .collect()
            })
            .map_err(shape(COMMAND))
    }

    /// 式を監視する変数オブジェクトを作る
    pub async fn add_watch(&self, expr: &str, options: &WatchOptions) -> Result<VariableObject> {
        const COMMAND: &str = "-var-create";
        let results = self
            .session
            .send_command(&format!("{} {} {}", COMMAND, options.mi_args(), mi_arg(expr)))
            .await?;
        VariableObject::from_created(expr, &results).map_err(shape(COMMAND))
    }

    /// 変数オブジェクトを削除する（子も消える）
    pub async fn remove_watch(&self, name: &str) -> Result<()> {
        self.session
            .send_command(&format!("-var-delete {}", mi_arg(name)))
            .await?;
        Ok(())
    }

    /// 全ての変数オブジェクトを更新し、変化したものを返す
    pub async fn update_watches(&self) -> Result<Vec<VariableChange>> {
        self.update_watch("*").await
    }

    /// 1つの変数オブジェクト（と子）を更新する
    pub async fn update_watch(&self, name: &str) -> Result<Vec<VariableChange>> {
        const COMMAND: &str = "-var-update";
        let results = self
            .session
            .send_command(&format!("{} --all-values {}", COMMAND, mi_arg(name)))
            .await?;
        list_field(&results, "changelist")
            .and_then(|items| items.iter().map(VariableChange::from_value).collect())
            .map_err(shape(COMMAND))
    }

    /// 変数オブジェクトの子を列挙する
    pub async fn watch_children(&self, name: &str) -> Result<Vec<VariableObject>> {
        const COMMAND: &str = "-var-list-children";
        let results = self
            .session
            .send_command(&format!("{} --all-values {}", COMMAND, mi_arg(name)))
            .await?;
        // 子がなければ `children` 自体が省略される
        if !results.contains_key("children") {
            return Ok(Vec::new());
        }
        named_items(&results, "children", "child")
            .and_then(|items| items.iter().map(VariableObject::from_child).collect())
            .map_err(shape(COMMAND))
    }

    /// 変数オブジェクトに値を代入し、新しい値を返す
    pub async fn assign_watch(&self, name: &str, expr: &str) -> Result<String> {
        const COMMAND: &str = "-var-assign";
        let results = self
            .session
            .send_command(&format!("{} {} {}", COMMAND, mi_arg(name), mi_arg(expr)))
            .await?;
        field_str(&results, "value")
            .map(str::to_string)
            .map_err(shape(COMMAND))
    }

    /// 全スレッドの情報を取得する
    pub async fn threads(&self) -> Result<ThreadList> {
        const COMMAND: &str = "-thread-info";
        let results = self.session.send_command(COMMAND).await?;
        ThreadList::from_results(&results).map_err(shape(COMMAND))
    }

    /// 1スレッドの情報を取得する（存在しなければ `None`）
    pub async fn thread(&self, id: u32) -> Result<Option<ThreadInfo>> {
        const COMMAND: &str = "-thread-info";
        let results = self
            .session
            .send_command(&format!("{} {}", COMMAND, id))
            .await?;
        let list = ThreadList::from_results(&results).map_err(shape(COMMAND))?;
        Ok(list.threads.into_iter().find(|thread| thread.id == id))
    }

    /// 現在のスレッドを切り替える
    pub async fn select_thread(&self, id: u32) -> Result<()> {
        self.session
            .send_command(&format!("-thread-select {}", id))
            .await?;
        Ok(())
    }

    /// セッションを終了する
    pub async fn end(&self) {
        self.session.end().await;
    }
}

/// リストのフィールドを取り出す（集約で単一値になったものも1要素として扱う）
fn list_field<'a>(results: &'a Tuple, key: &str) -> std::result::Result<&'a [Value], ValueError> {
    results
        .get(key)
        .map(Value::items)
        .ok_or_else(|| ValueError::MissingField(key.to_string()))
}

/// `key=[name={...},name={...}]` の要素を取り出す
///
/// 名前付き結果を含むので集約後は `{name=[...]}` のタプル、
/// 要素が無ければ空リストになる。
fn named_items<'a>(
    results: &'a Tuple,
    key: &str,
    name: &str,
) -> std::result::Result<&'a [Value], ValueError> {
    let value = results
        .get(key)
        .ok_or_else(|| ValueError::MissingField(key.to_string()))?;
    match value {
        Value::Tuple(tuple) => Ok(tuple.get(name).map(Value::items).unwrap_or(&[])),
        Value::List(items) if items.is_empty() => Ok(&[]),
        other => Err(ValueError::Shape {
            expected: "tuple",
            found: other.kind_name(),
        }),
    }
}

/// `stack=[frame={...},frame={...}]` を展開する
fn decode_frames(results: &Tuple) -> std::result::Result<Vec<StackFrame>, ValueError> {
    named_items(results, "stack", "frame")?
        .iter()
        .map(|frame| frame.expect_tuple().and_then(StackFrame::from_tuple))
        .collect()
}

/// 空白や引用符を含む引数を c-string にする
pub fn mi_arg(arg: &str) -> String {
    if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '\\') {
        tsunagi_mi::quote(arg)
    } else {
        arg.to_string()
    }
}
