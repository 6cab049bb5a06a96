//! 変数オブジェクト（ウォッチ）
//!
//! `-var-create` で作った変数オブジェクトは、`-var-update` で前回からの
//! 変化だけを報告します。子（構造体のメンバなど）も変数オブジェクトです。

use crate::inspect::FrameScope;
use tsunagi_mi::{field_str, opt_field_parse, opt_field_str, Tuple, Value, ValueError};

/// ウォッチを評価するフレーム
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WatchFrame {
    /// 作成時の現在フレームに固定する（`*`）
    #[default]
    Current,
    /// 停止するたびに現在フレームで評価し直す（`@`）
    Floating,
    /// 指定したアドレスのフレーム
    Address(u64),
}

impl WatchFrame {
    fn mi_arg(self) -> String {
        match self {
            WatchFrame::Current => "*".to_string(),
            WatchFrame::Floating => "@".to_string(),
            WatchFrame::Address(addr) => format!("0x{:x}", addr),
        }
    }
}

/// `-var-create` のオプション
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// 変数オブジェクト名（省略時はデバッガが付ける）
    pub name: Option<String>,
    pub frame: WatchFrame,
    pub scope: FrameScope,
}

impl WatchOptions {
    /// `-var-create` の引数（式は含まない）
    pub(crate) fn mi_args(&self) -> String {
        format!(
            "{}{} {}",
            self.scope.mi_options(),
            self.name.as_deref().unwrap_or("-"),
            self.frame.mi_arg()
        )
    }
}

/// 変数オブジェクト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableObject {
    /// デバッガ上の名前（`var1`, `var1.x` など）
    pub name: String,
    /// 作成した式、子の場合はメンバ名など
    pub expression: String,
    pub num_children: u32,
    pub value: Option<String>,
    pub type_name: Option<String>,
    pub thread_id: Option<u32>,
    /// まだ列挙していない子がある（pretty printer 使用時）
    pub has_more: bool,
}

impl VariableObject {
    /// `-var-create` の結果から変換する
    pub fn from_created(expression: &str, results: &Tuple) -> Result<Self, ValueError> {
        Self::decode(expression.to_string(), results)
    }

    /// `-var-list-children` の `child={...}` から変換する
    pub fn from_child(value: &Value) -> Result<Self, ValueError> {
        let tuple = value.expect_tuple()?;
        Self::decode(field_str(tuple, "exp")?.to_string(), tuple)
    }

    fn decode(expression: String, tuple: &Tuple) -> Result<Self, ValueError> {
        Ok(Self {
            name: field_str(tuple, "name")?.to_string(),
            expression,
            num_children: opt_field_parse(tuple, "numchild")?.unwrap_or(0),
            value: opt_field_str(tuple, "value").map(str::to_string),
            type_name: opt_field_str(tuple, "type").map(str::to_string),
            thread_id: opt_field_parse(tuple, "thread-id")?,
            has_more: flag(tuple, "has_more"),
        })
    }
}

/// 変数オブジェクトがまだ評価できるか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InScope {
    Yes,
    /// フレームを抜けた
    No,
    /// 実行ファイルが変わるなどして二度と評価できない
    Invalid,
}

/// `-var-update` の `changelist` の1要素
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableChange {
    pub name: String,
    pub value: Option<String>,
    pub in_scope: InScope,
    pub type_changed: bool,
    /// `type_changed` のときだけ報告される
    pub new_type: Option<String>,
    pub new_num_children: Option<u32>,
    pub has_more: bool,
}

impl VariableChange {
    pub fn from_value(value: &Value) -> Result<Self, ValueError> {
        let tuple = value.expect_tuple()?;
        let in_scope = match opt_field_str(tuple, "in_scope") {
            None | Some("true") => InScope::Yes,
            Some("false") => InScope::No,
            Some("invalid") => InScope::Invalid,
            Some(other) => {
                return Err(ValueError::Invalid {
                    field: "in_scope".to_string(),
                    value: other.to_string(),
                })
            }
        };
        Ok(Self {
            name: field_str(tuple, "name")?.to_string(),
            value: opt_field_str(tuple, "value").map(str::to_string),
            in_scope,
            type_changed: opt_field_str(tuple, "type_changed") == Some("true"),
            new_type: opt_field_str(tuple, "new_type").map(str::to_string),
            new_num_children: opt_field_parse(tuple, "new_num_children")?,
            has_more: flag(tuple, "has_more"),
        })
    }
}

/// `"0"`/`"1"` のフラグ（なければ false）
fn flag(tuple: &Tuple, key: &str) -> bool {
    opt_field_str(tuple, key) == Some("1")
}
