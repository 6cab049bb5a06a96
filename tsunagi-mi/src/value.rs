//! MI の値表現
//!
//! MI の値は文字列・タプル・リストの再帰的な和型です。
//! 型付きの呼び出し側はパターンマッチで形を確かめ、合わなければ
//! [`ValueError`] を返します。暗黙の型変換は行いません。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 名前→値のマッピング（結果レコードのペイロード、タプル）
pub type Tuple = BTreeMap<String, Value>;

/// MI の値
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// c-string（エスケープ解除済み）
    String(String),
    /// `{...}` または名前付き結果を含む `[...]`
    Tuple(Tuple),
    /// 名前なし値の `[...]`、または集約された配列
    List(Vec<Value>),
}

/// 値の形が期待と異なる
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// フィールドが存在しない
    #[error("missing field `{0}`")]
    MissingField(String),

    /// 形が一致しない
    #[error("expected {expected}, found {found}")]
    Shape {
        expected: &'static str,
        found: &'static str,
    },

    /// 文字列だが値として解釈できない
    #[error("invalid value {value:?} for field `{field}`")]
    Invalid { field: String, value: String },
}

impl Value {
    /// 値の種類名（エラーメッセージ用）
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&Tuple> {
        match self {
            Value::Tuple(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// タプルのフィールドを取得する（タプル以外なら `None`）
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_tuple()?.get(key)
    }

    /// 文字列として取り出す
    pub fn expect_str(&self) -> Result<&str, ValueError> {
        self.as_str().ok_or(ValueError::Shape {
            expected: "string",
            found: self.kind_name(),
        })
    }

    /// タプルとして取り出す
    pub fn expect_tuple(&self) -> Result<&Tuple, ValueError> {
        self.as_tuple().ok_or(ValueError::Shape {
            expected: "tuple",
            found: self.kind_name(),
        })
    }

    /// 要素列として取り出す
    ///
    /// 集約規則により、1回しか現れなかった名前は配列にならないため、
    /// リスト以外の値は1要素のスライスとして扱います。
    pub fn items(&self) -> &[Value] {
        match self {
            Value::List(items) => items,
            other => std::slice::from_ref(other),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => {
                f.write_str("\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")
            }
            Value::Tuple(tuple) => {
                f.write_str("{")?;
                for (i, (key, value)) in tuple.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}={}", key, value)?;
                }
                f.write_str("}")
            }
            Value::List(items) => {
                f.write_str("[")?;
                for (i, value) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", value)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// タプルから必須の文字列フィールドを取り出す
pub fn field_str<'a>(tuple: &'a Tuple, key: &str) -> Result<&'a str, ValueError> {
    tuple
        .get(key)
        .ok_or_else(|| ValueError::MissingField(key.to_string()))?
        .expect_str()
}

/// タプルから任意の文字列フィールドを取り出す
pub fn opt_field_str<'a>(tuple: &'a Tuple, key: &str) -> Option<&'a str> {
    tuple.get(key).and_then(Value::as_str)
}

/// タプルの任意フィールドを数値などに変換する
pub fn opt_field_parse<T: FromStr>(tuple: &Tuple, key: &str) -> Result<Option<T>, ValueError> {
    match opt_field_str(tuple, key) {
        Some(s) => s.parse().map(Some).map_err(|_| ValueError::Invalid {
            field: key.to_string(),
            value: s.to_string(),
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_wraps_scalar() {
        let v = Value::from("x");
        assert_eq!(v.items(), &[Value::from("x")]);

        let list = Value::List(vec![Value::from("a"), Value::from("b")]);
        assert_eq!(list.items().len(), 2);
    }

    #[test]
    fn test_expect_shape_mismatch() {
        let v = Value::List(vec![]);
        assert_eq!(
            v.expect_str(),
            Err(ValueError::Shape {
                expected: "string",
                found: "list"
            })
        );
    }

    #[test]
    fn test_field_str() {
        let mut t = Tuple::new();
        t.insert("number".to_string(), Value::from("1"));
        assert_eq!(field_str(&t, "number").unwrap(), "1");
        assert_eq!(
            field_str(&t, "addr"),
            Err(ValueError::MissingField("addr".to_string()))
        );
        assert_eq!(opt_field_str(&t, "addr"), None);
    }

    #[test]
    fn test_opt_field_parse() {
        let mut t = Tuple::new();
        t.insert("line".to_string(), Value::from("42"));
        t.insert("level".to_string(), Value::from("top"));
        assert_eq!(opt_field_parse::<u32>(&t, "line").unwrap(), Some(42));
        assert_eq!(opt_field_parse::<u32>(&t, "times").unwrap(), None);
        assert_eq!(
            opt_field_parse::<u32>(&t, "level"),
            Err(ValueError::Invalid {
                field: "level".to_string(),
                value: "top".to_string()
            })
        );
    }

    #[test]
    fn test_display_escapes_quotes() {
        let mut t = Tuple::new();
        t.insert("value".to_string(), Value::from("say \"hi\""));
        assert_eq!(Value::Tuple(t).to_string(), r#"{value="say \"hi\""}"#);
    }
}
