//! スタック・変数・メモリの検査結果

use crate::parse::parse_address;
use tsunagi_mi::{field_str, opt_field_parse, opt_field_str, Tuple, Value, ValueError};

/// コマンドを実行するスレッドとフレーム
///
/// 省略した方はデバッガの現在のものが使われます。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameScope {
    pub thread_id: Option<u32>,
    pub frame_level: Option<u32>,
}

impl FrameScope {
    pub fn new(thread_id: u32, frame_level: u32) -> Self {
        Self {
            thread_id: Some(thread_id),
            frame_level: Some(frame_level),
        }
    }

    /// スレッドだけ指定する
    pub fn thread(thread_id: u32) -> Self {
        Self {
            thread_id: Some(thread_id),
            frame_level: None,
        }
    }

    /// `--thread N --frame L ` 形式のオプション（指定がなければ空）
    pub(crate) fn mi_options(&self) -> String {
        let mut options = String::new();
        if let Some(thread) = self.thread_id {
            options.push_str(&format!("--thread {} ", thread));
        }
        if let Some(frame) = self.frame_level {
            options.push_str(&format!("--frame {} ", frame));
        }
        options
    }
}

/// スタックフレーム
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// フレームレベル（0が最内）
    pub level: u32,
    pub addr: Option<String>,
    pub func: Option<String>,
    pub file: Option<String>,
    pub fullname: Option<String>,
    pub line: Option<u32>,
}

impl StackFrame {
    /// `frame={...}` のタプルから変換する
    ///
    /// `*stopped` のフレームは `level` を持たないことがあるので、その場合は0とする。
    pub fn from_tuple(tuple: &Tuple) -> Result<Self, ValueError> {
        Ok(Self {
            level: opt_field_parse(tuple, "level")?.unwrap_or(0),
            addr: opt_field_str(tuple, "addr").map(str::to_string),
            func: opt_field_str(tuple, "func").map(str::to_string),
            file: opt_field_str(tuple, "file").map(str::to_string),
            fullname: opt_field_str(tuple, "fullname").map(str::to_string),
            line: opt_field_parse(tuple, "line")?,
        })
    }

    /// `file:line` 形式の位置（あれば）
    pub fn location(&self) -> Option<String> {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => Some(format!("{}:{}", file, line)),
            (Some(file), None) => Some(file.clone()),
            _ => None,
        }
    }
}

/// ローカル変数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    /// `--simple-values` では構造体・配列の値は省略される
    pub value: Option<String>,
    pub type_name: Option<String>,
}

impl Variable {
    pub fn from_value(value: &Value) -> Result<Self, ValueError> {
        let tuple = value.expect_tuple()?;
        Ok(Self {
            name: field_str(tuple, "name")?.to_string(),
            value: opt_field_str(tuple, "value").map(str::to_string),
            type_name: opt_field_str(tuple, "type").map(str::to_string),
        })
    }
}

/// `-data-read-memory-bytes` の1ブロック
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBlock {
    pub begin: String,
    pub end: String,
    pub offset: String,
    /// 16進文字列（1バイト2文字）
    pub contents: String,
}

impl MemoryBlock {
    pub fn from_value(value: &Value) -> Result<Self, ValueError> {
        let tuple = value.expect_tuple()?;
        Ok(Self {
            begin: field_str(tuple, "begin")?.to_string(),
            end: field_str(tuple, "end")?.to_string(),
            offset: field_str(tuple, "offset")?.to_string(),
            contents: field_str(tuple, "contents")?.to_string(),
        })
    }

    /// 先頭アドレス
    pub fn begin_address(&self) -> Result<u64, ValueError> {
        address_field("begin", &self.begin)
    }

    /// 終端アドレス（含まない）
    pub fn end_address(&self) -> Result<u64, ValueError> {
        address_field("end", &self.end)
    }

    /// 要求したアドレスからのオフセット
    pub fn offset_bytes(&self) -> Result<u64, ValueError> {
        address_field("offset", &self.offset)
    }

    /// 内容をバイト列に戻す
    pub fn bytes(&self) -> Option<Vec<u8>> {
        if self.contents.len() % 2 != 0 {
            return None;
        }
        (0..self.contents.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(self.contents.get(i..i + 2)?, 16).ok())
            .collect()
    }
}

fn address_field(field: &str, value: &str) -> Result<u64, ValueError> {
    parse_address(value).map_err(|_| ValueError::Invalid {
        field: field.to_string(),
        value: value.to_string(),
    })
}
