//! MI 出力行の字句解析
//!
//! 1行（改行なし）を、先頭のトークン番号・記号と、それに続く
//! 識別子・文字列・区切り記号の列に分解します。

use crate::error::ParseError;
use std::iter::Peekable;
use std::str::CharIndices;

/// 行頭の記号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sigil {
    /// `^` 結果レコード
    Result,
    /// `~` コンソール出力
    Console,
    /// `@` ターゲット出力
    Target,
    /// `&` ログ出力
    Log,
    /// `*` 実行状態の非同期通知
    Exec,
    /// `+` 進捗状況の非同期通知
    Status,
    /// `=` 一般の非同期通知
    Notify,
}

impl Sigil {
    fn from_char(ch: char) -> Option<Self> {
        match ch {
            '^' => Some(Sigil::Result),
            '~' => Some(Sigil::Console),
            '@' => Some(Sigil::Target),
            '&' => Some(Sigil::Log),
            '*' => Some(Sigil::Exec),
            '+' => Some(Sigil::Status),
            '=' => Some(Sigil::Notify),
            _ => None,
        }
    }

    /// 本体が c-string 1つだけのストリームレコードか
    pub fn is_stream(self) -> bool {
        matches!(self, Sigil::Console | Sigil::Target | Sigil::Log)
    }
}

/// 記号より後ろのトークン
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// 変数名・クラス名
    Ident(String),
    /// エスケープ解除済みの c-string
    Str(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Equals,
    Comma,
}

impl Token {
    /// エラーメッセージ用の表記
    pub fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier `{}`", name),
            Token::Str(_) => "string".to_string(),
            Token::LBrace => "`{`".to_string(),
            Token::RBrace => "`}`".to_string(),
            Token::LBracket => "`[`".to_string(),
            Token::RBracket => "`]`".to_string(),
            Token::Equals => "`=`".to_string(),
            Token::Comma => "`,`".to_string(),
        }
    }
}

/// 行内の位置付きトークン
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// 1行分の字句解析結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexed {
    /// 先頭の10進トークン番号
    pub token: Option<u64>,
    pub sigil: Sigil,
    pub tokens: Vec<Spanned>,
}

/// 1行を字句解析する
pub fn tokenize(line: &str) -> Result<Lexed, ParseError> {
    let mut chars = line.char_indices().peekable();

    // トークン番号
    let mut digits_end = 0;
    while let Some(&(i, ch)) = chars.peek() {
        if !ch.is_ascii_digit() {
            break;
        }
        digits_end = i + ch.len_utf8();
        chars.next();
    }
    let token = if digits_end > 0 {
        let digits = &line[..digits_end];
        Some(digits.parse::<u64>().map_err(|_| ParseError::UnexpectedToken {
            expected: "token number",
            found: digits.to_string(),
            offset: 0,
        })?)
    } else {
        None
    };

    let sigil = match chars.next() {
        Some((_, ch)) => {
            Sigil::from_char(ch).ok_or(ParseError::MissingSigil { offset: digits_end })?
        }
        None => return Err(ParseError::MissingSigil { offset: digits_end }),
    };

    let mut tokens = Vec::new();
    while let Some(&(offset, ch)) = chars.peek() {
        let token = match ch {
            '{' => single(&mut chars, Token::LBrace),
            '}' => single(&mut chars, Token::RBrace),
            '[' => single(&mut chars, Token::LBracket),
            ']' => single(&mut chars, Token::RBracket),
            '=' => single(&mut chars, Token::Equals),
            ',' => single(&mut chars, Token::Comma),
            '"' => Token::Str(scan_string(&mut chars, offset)?),
            c if is_ident_char(c) => Token::Ident(scan_ident(&mut chars)),
            c => return Err(ParseError::UnexpectedChar { ch: c, offset }),
        };
        tokens.push(Spanned { token, offset });
    }

    Ok(Lexed {
        token,
        sigil,
        tokens,
    })
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

fn single(chars: &mut Peekable<CharIndices<'_>>, token: Token) -> Token {
    chars.next();
    token
}

fn scan_ident(chars: &mut Peekable<CharIndices<'_>>) -> String {
    let mut ident = String::new();
    while let Some(&(_, ch)) = chars.peek() {
        if !is_ident_char(ch) {
            break;
        }
        ident.push(ch);
        chars.next();
    }
    ident
}

/// c-string を読み取る
///
/// `\"` と `\\` だけを解除し、それ以外のエスケープは2文字のまま残す。
fn scan_string(chars: &mut Peekable<CharIndices<'_>>, start: usize) -> Result<String, ParseError> {
    // 開き引用符
    chars.next();

    let mut out = String::new();
    loop {
        match chars.next() {
            Some((_, '"')) => return Ok(out),
            Some((escape_at, '\\')) => match chars.next() {
                Some((_, '"')) => out.push('"'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => return Err(ParseError::InvalidEscape { offset: escape_at }),
            },
            Some((_, ch)) => out.push(ch),
            None => return Err(ParseError::UnterminatedString { offset: start }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(line: &str) -> Vec<Token> {
        tokenize(line)
            .unwrap()
            .tokens
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_token_and_sigil() {
        let lexed = tokenize("42^done").unwrap();
        assert_eq!(lexed.token, Some(42));
        assert_eq!(lexed.sigil, Sigil::Result);
        assert_eq!(kinds("42^done"), vec![Token::Ident("done".to_string())]);

        let lexed = tokenize("=thread-group-added,id=\"i1\"").unwrap();
        assert_eq!(lexed.token, None);
        assert_eq!(lexed.sigil, Sigil::Notify);
    }

    #[test]
    fn test_punctuation_and_offsets() {
        let lexed = tokenize("^done,a={b=[\"c\"]}").unwrap();
        let offsets: Vec<usize> = lexed.tokens.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![1, 5, 6, 7, 8, 9, 10, 11, 12, 15, 16]);
        assert_eq!(lexed.tokens[3].token, Token::Equals);
        assert_eq!(lexed.tokens[4].token, Token::LBrace);
        assert_eq!(lexed.tokens[9].token, Token::RBracket);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#"~"say \"hi\" \\ done""#),
            vec![Token::Str(r#"say "hi" \ done"#.to_string())]
        );
        // 未知のエスケープはそのまま残す
        assert_eq!(
            kinds(r#"~"line\n""#),
            vec![Token::Str("line\\n".to_string())]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(
            tokenize("~\"abc"),
            Err(ParseError::UnterminatedString { offset: 1 })
        );
    }

    #[test]
    fn test_dangling_escape() {
        assert_eq!(
            tokenize("~\"abc\\"),
            Err(ParseError::InvalidEscape { offset: 5 })
        );
    }

    #[test]
    fn test_missing_sigil() {
        assert_eq!(tokenize("12done"), Err(ParseError::MissingSigil { offset: 2 }));
        assert_eq!(tokenize(""), Err(ParseError::MissingSigil { offset: 0 }));
        assert_eq!(tokenize("(gdb)"), Err(ParseError::MissingSigil { offset: 0 }));
    }

    #[test]
    fn test_unexpected_char() {
        assert_eq!(
            tokenize("^done, x"),
            Err(ParseError::UnexpectedChar { ch: ' ', offset: 6 })
        );
    }
}
