//! MI 出力行の解析エラー

use thiserror::Error;

/// 1行の解析に失敗したときのエラー
///
/// エラーはその行だけに閉じており、呼び出し側はその行を捨てて次の行に進めます。
/// `offset` は行頭からのバイト位置です。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// 閉じられていない文字列
    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },

    /// 行末にぶら下がったバックスラッシュ
    #[error("invalid escape sequence at offset {offset}")]
    InvalidEscape { offset: usize },

    /// 記号（^ ~ @ & * + =）が見つからない
    #[error("missing record sigil at offset {offset}")]
    MissingSigil { offset: usize },

    /// 字句として解釈できない文字
    #[error("unexpected character {ch:?} at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    /// `^` に続く未知の結果クラス
    #[error("unknown result class `{class}`")]
    UnknownResultClass { class: String },

    /// 期待と異なるトークン
    #[error("expected {expected} at offset {offset}, found {found}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
        offset: usize,
    },

    /// 行の途中で入力が尽きた
    #[error("unexpected end of line, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    /// 直前に名前付き結果を持たない名前なし値
    #[error("unnamed value at offset {offset} has no preceding named result")]
    OrphanValue { offset: usize },

    /// レコードの後ろに余分な入力がある
    #[error("trailing input at offset {offset}")]
    TrailingInput { offset: usize },
}

impl ParseError {
    /// 構文の崩れではなくプロトコル上の逸脱（未知の記号・クラス）かどうか
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            ParseError::MissingSigil { .. } | ParseError::UnknownResultClass { .. }
        )
    }
}
