//! MI 出力の再帰下降パーサ
//!
//! ```text
//! record := [token] sigil body
//! body   := class (',' item)*      ; ^ * + =
//!         | c-string               ; ~ @ &
//! item   := variable '=' value | value
//! value  := c-string | '{' items? '}' | '[' items? ']'
//! ```
//!
//! ここでは名前の集約は行わず、出現順のままの列を返します。
//! 集約は [`crate::aggregate`] の役目です。

use crate::error::ParseError;
use crate::lexer::{tokenize, Sigil, Spanned, Token};
use crate::record::RecordKind;

/// 集約前の値
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    Const(String),
    Tuple(Vec<RawItem>),
    List(Vec<RawItem>),
}

/// 集約前の要素（名前付き結果、または名前なし値）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub name: Option<String>,
    pub value: RawValue,
    pub offset: usize,
}

/// 集約前のレコード本体
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawBody {
    Results(Vec<RawItem>),
    Stream(String),
    Async { class: String, items: Vec<RawItem> },
}

/// 集約前のレコード
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub kind: RecordKind,
    pub token: Option<u64>,
    pub body: RawBody,
}

/// 1行を集約前のレコードに解析する
pub fn parse_raw(line: &str) -> Result<RawRecord, ParseError> {
    let lexed = tokenize(line)?;
    let mut parser = Parser::new(lexed.tokens);

    let (kind, body) = if lexed.sigil.is_stream() {
        let text = parser.expect_string()?;
        let kind = match lexed.sigil {
            Sigil::Console => RecordKind::ConsoleOutput,
            Sigil::Target => RecordKind::TargetOutput,
            _ => RecordKind::LogOutput,
        };
        (kind, RawBody::Stream(text))
    } else {
        let class = parser.expect_ident("record class")?;
        let mut items = Vec::new();
        while parser.eat(&Token::Comma) {
            items.push(parser.item()?);
        }

        match lexed.sigil {
            Sigil::Result => {
                let kind = RecordKind::from_result_class(&class)
                    .ok_or(ParseError::UnknownResultClass { class })?;
                (kind, RawBody::Results(items))
            }
            Sigil::Exec => (RecordKind::AsyncExec, RawBody::Async { class, items }),
            Sigil::Status => (RecordKind::AsyncStatus, RawBody::Async { class, items }),
            _ => (RecordKind::AsyncNotify, RawBody::Async { class, items }),
        }
    };

    parser.expect_end()?;

    Ok(RawRecord {
        kind,
        token: lexed.token,
        body,
    })
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_token_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|s| &s.token)
    }

    fn next(&mut self) -> Option<Spanned> {
        let spanned = self.tokens.get(self.pos).cloned();
        if spanned.is_some() {
            self.pos += 1;
        }
        spanned
    }

    /// 次のトークンが `token` なら消費して true を返す
    fn eat(&mut self, token: &Token) -> bool {
        if self.peek_token_at(0) == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> Result<(), ParseError> {
        match self.next() {
            Some(s) if s.token == token => Ok(()),
            Some(s) => Err(unexpected(expected, &s)),
            None => Err(ParseError::UnexpectedEnd { expected }),
        }
    }

    fn expect_ident(&mut self, expected: &'static str) -> Result<String, ParseError> {
        match self.next() {
            Some(Spanned {
                token: Token::Ident(name),
                ..
            }) => Ok(name),
            Some(s) => Err(unexpected(expected, &s)),
            None => Err(ParseError::UnexpectedEnd { expected }),
        }
    }

    fn expect_string(&mut self) -> Result<String, ParseError> {
        match self.next() {
            Some(Spanned {
                token: Token::Str(text),
                ..
            }) => Ok(text),
            Some(s) => Err(unexpected("string", &s)),
            None => Err(ParseError::UnexpectedEnd { expected: "string" }),
        }
    }

    fn expect_end(&self) -> Result<(), ParseError> {
        match self.peek() {
            Some(s) => Err(ParseError::TrailingInput { offset: s.offset }),
            None => Ok(()),
        }
    }

    fn item(&mut self) -> Result<RawItem, ParseError> {
        let offset = match self.peek() {
            Some(s) => s.offset,
            None => return Err(ParseError::UnexpectedEnd { expected: "result" }),
        };

        let named = matches!(self.peek_token_at(0), Some(Token::Ident(_)))
            && self.peek_token_at(1) == Some(&Token::Equals);

        let name = if named {
            let name = self.expect_ident("variable")?;
            self.expect(Token::Equals, "`=`")?;
            Some(name)
        } else {
            None
        };

        let value = self.value()?;
        Ok(RawItem {
            name,
            value,
            offset,
        })
    }

    fn value(&mut self) -> Result<RawValue, ParseError> {
        match self.next() {
            Some(Spanned {
                token: Token::Str(text),
                ..
            }) => Ok(RawValue::Const(text)),
            Some(Spanned {
                token: Token::LBrace,
                ..
            }) => Ok(RawValue::Tuple(self.items_until(Token::RBrace, "`,` or `}`")?)),
            Some(Spanned {
                token: Token::LBracket,
                ..
            }) => Ok(RawValue::List(self.items_until(Token::RBracket, "`,` or `]`")?)),
            Some(s) => Err(unexpected("value", &s)),
            None => Err(ParseError::UnexpectedEnd { expected: "value" }),
        }
    }

    fn items_until(
        &mut self,
        close: Token,
        expected: &'static str,
    ) -> Result<Vec<RawItem>, ParseError> {
        let mut items = Vec::new();
        if self.eat(&close) {
            return Ok(items);
        }
        loop {
            items.push(self.item()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(close, expected)?;
            return Ok(items);
        }
    }
}

fn unexpected(expected: &'static str, found: &Spanned) -> ParseError {
    ParseError::UnexpectedToken {
        expected,
        found: found.token.describe(),
        offset: found.offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn konst(name: Option<&str>, value: &str, offset: usize) -> RawItem {
        RawItem {
            name: name.map(str::to_string),
            value: RawValue::Const(value.to_string()),
            offset,
        }
    }

    #[test]
    fn test_result_classes() {
        assert_eq!(parse_raw("^done").unwrap().kind, RecordKind::Done);
        assert_eq!(parse_raw("^running").unwrap().kind, RecordKind::Running);
        assert_eq!(parse_raw("^connected").unwrap().kind, RecordKind::Connected);
        assert_eq!(parse_raw("^error").unwrap().kind, RecordKind::Error);
        assert_eq!(parse_raw("^exit").unwrap().kind, RecordKind::Exit);
        assert_eq!(
            parse_raw("^stopped"),
            Err(ParseError::UnknownResultClass {
                class: "stopped".to_string()
            })
        );
    }

    #[test]
    fn test_items_keep_source_order() {
        let raw = parse_raw("7^done,b=\"2\",a=\"1\",{}").unwrap();
        assert_eq!(raw.token, Some(7));
        match raw.body {
            RawBody::Results(items) => {
                assert_eq!(items.len(), 3);
                assert_eq!(items[0], konst(Some("b"), "2", 7));
                assert_eq!(items[1], konst(Some("a"), "1", 13));
                assert_eq!(items[2].name, None);
                assert_eq!(items[2].value, RawValue::Tuple(vec![]));
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn test_stream_body() {
        let raw = parse_raw("@\"hello\"").unwrap();
        assert_eq!(raw.kind, RecordKind::TargetOutput);
        assert_eq!(raw.body, RawBody::Stream("hello".to_string()));

        assert!(matches!(
            parse_raw("~done"),
            Err(ParseError::UnexpectedToken { expected: "string", .. })
        ));
        assert_eq!(
            parse_raw("~\"a\",\"b\""),
            Err(ParseError::TrailingInput { offset: 4 })
        );
    }

    #[test]
    fn test_nested_values() {
        let raw = parse_raw("=cmd,a=[{x=\"1\"},[\"2\"]],b={}").unwrap();
        let RawBody::Async { class, items } = raw.body else {
            panic!("expected async body");
        };
        assert_eq!(class, "cmd");
        assert_eq!(items.len(), 2);
        match &items[0].value {
            RawValue::List(list) => {
                assert_eq!(list.len(), 2);
                assert!(matches!(list[0].value, RawValue::Tuple(_)));
                assert!(matches!(list[1].value, RawValue::List(_)));
            }
            other => panic!("unexpected value: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_structures() {
        assert_eq!(
            parse_raw("^done,a={b=\"1\""),
            Err(ParseError::UnexpectedEnd {
                expected: "`,` or `}`"
            })
        );
        assert!(matches!(
            parse_raw("^done,a=[\"1\"}"),
            Err(ParseError::UnexpectedToken { offset: 12, .. })
        ));
        assert!(matches!(
            parse_raw("^done,a="),
            Err(ParseError::UnexpectedEnd { expected: "value" })
        ));
        assert!(matches!(
            parse_raw("^done,"),
            Err(ParseError::UnexpectedEnd { expected: "result" })
        ));
        assert!(matches!(
            parse_raw("^"),
            Err(ParseError::UnexpectedEnd {
                expected: "record class"
            })
        ));
    }
}
