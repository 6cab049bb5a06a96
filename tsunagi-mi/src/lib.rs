//! tsunagi MI 出力パーサ
//!
//! このクレートは、GDB/LLDB-MI の Machine Interface 出力1行を
//! 構造化されたレコードに変換します。
//! 字句解析、再帰下降構文解析、結果列の集約の3段で構成されます。

pub mod aggregate;
pub mod error;
pub mod grammar;
pub mod lexer;
pub mod record;
pub mod value;

pub use error::ParseError;
pub use record::{Payload, Record, RecordKind};
pub use value::{field_str, opt_field_parse, opt_field_str, Tuple, Value, ValueError};

/// 1行を解析してレコードを返す
///
/// # Examples
/// ```
/// use tsunagi_mi::{parse, RecordKind};
///
/// let record = parse("^done").unwrap();
/// assert_eq!(record.kind, RecordKind::Done);
/// assert!(record.results().unwrap().is_empty());
/// ```
pub fn parse(line: &str) -> Result<Record, ParseError> {
    let raw = grammar::parse_raw(line)?;
    let payload = aggregate::payload(raw.body)?;
    Ok(Record {
        kind: raw.kind,
        token: raw.token,
        payload,
    })
}

/// プロンプト行 `(gdb)` かどうか
pub fn is_prompt(line: &str) -> bool {
    line.trim() == "(gdb)"
}

/// 文字列を MI の c-string として引用する
///
/// # Examples
/// ```
/// assert_eq!(tsunagi_mi::quote(r#"a "b" \c"#), r#""a \"b\" \\c""#);
/// ```
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}
