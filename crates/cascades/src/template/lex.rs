//! Splits template source into literal text and tokenized actions.

use super::{Result, TemplateError};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const CLOSE_TRIM: &str = "-}}";

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Token {
    /// `.`
    Dot,
    /// `.A.B`
    Field(Vec<String>),
    /// `$x.A.B`; `$` alone names the root data.
    Variable(String, Vec<String>),
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    Pipe,
    LeftParen,
    RightParen,
    Declare,
    Assign,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Spanned {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Item {
    Text(String),
    /// Tokens between `{{` and `}}`; `offset` is where the action opens.
    Action { tokens: Vec<Spanned>, offset: usize },
}

pub(super) fn lex(source: &str) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    let mut pos = 0;
    let mut trim_next = false;

    while pos < source.len() {
        let Some(found) = source[pos..].find(OPEN) else {
            push_text(&mut items, &source[pos..], trim_next, false);
            break;
        };
        let open = pos + found;
        let mut body = open + OPEN.len();
        let trim_before = has_left_trim(&source[body..]);
        if trim_before {
            body += 2;
        }
        push_text(&mut items, &source[pos..open], trim_next, trim_before);

        if source[body..].starts_with("/*") {
            let end = source[body..]
                .find("*/")
                .map(|end| body + end + 2)
                .ok_or(TemplateError::UnclosedComment { offset: open })?;
            let (trim, len) = comment_close(&source[end..])
                .ok_or(TemplateError::UnclosedComment { offset: open })?;
            pos = end + len;
            trim_next = trim;
            continue;
        }

        let (tokens, end, trim) = lex_action(source, body, open)?;
        items.push(Item::Action {
            tokens,
            offset: open,
        });
        pos = end;
        trim_next = trim;
    }

    Ok(items)
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn has_left_trim(body: &str) -> bool {
    let mut chars = body.chars();
    chars.next() == Some('-') && chars.next().is_some_and(is_space)
}

fn push_text(items: &mut Vec<Item>, text: &str, trim_start: bool, trim_end: bool) {
    let text = if trim_start {
        text.trim_start_matches(is_space)
    } else {
        text
    };
    let text = if trim_end {
        text.trim_end_matches(is_space)
    } else {
        text
    };
    if !text.is_empty() {
        items.push(Item::Text(text.to_string()));
    }
}

/// Match the end of a comment: `}}` or a space followed by `-}}`.
fn comment_close(rest: &str) -> Option<(bool, usize)> {
    if rest.starts_with(CLOSE) {
        return Some((false, CLOSE.len()));
    }
    let space = rest.chars().next().filter(|&c| is_space(c))?;
    let after = &rest[space.len_utf8()..];
    after
        .starts_with(CLOSE_TRIM)
        .then_some((true, space.len_utf8() + CLOSE_TRIM.len()))
}

/// Tokenize one action starting at `start`. Returns the tokens, the position
/// after the closing delimiter and whether it carried a trim marker.
fn lex_action(source: &str, start: usize, open: usize) -> Result<(Vec<Spanned>, usize, bool)> {
    let mut lexer = Lexer {
        src: source,
        pos: start,
        open,
    };
    let mut tokens = Vec::new();
    loop {
        let rest = lexer.rest();
        if rest.starts_with(CLOSE) {
            return Ok((tokens, lexer.pos + CLOSE.len(), false));
        }
        let Some(c) = lexer.peek() else {
            return Err(TemplateError::UnclosedAction { offset: open });
        };
        if is_space(c) {
            if rest[c.len_utf8()..].starts_with(CLOSE_TRIM) {
                return Ok((tokens, lexer.pos + c.len_utf8() + CLOSE_TRIM.len(), true));
            }
            lexer.bump();
            continue;
        }
        let start = lexer.pos;
        let token = lexer.token(c)?;
        tokens.push(Spanned {
            token,
            start,
            end: lexer.pos,
        });
    }
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    open: usize,
}

impl<'a> Lexer<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn syntax(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::Syntax {
            message: message.into(),
            offset: self.open,
        }
    }

    fn token(&mut self, c: char) -> Result<Token> {
        let token = match c {
            '|' => Token::Pipe,
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            ',' => Token::Comma,
            '=' => Token::Assign,
            ':' => {
                self.bump();
                if self.peek() != Some('=') {
                    return Err(self.syntax("expected :="));
                }
                Token::Declare
            }
            '"' => return self.quoted(),
            '`' => return self.raw(),
            '\'' => return self.char_constant(),
            '$' => {
                self.bump();
                let name = format!("${}", self.ident());
                return Ok(Token::Variable(name, self.fields()?));
            }
            '.' => {
                if self.rest()[1..].starts_with(|c: char| c.is_ascii_digit()) {
                    return self.number();
                }
                let fields = self.fields()?;
                if !fields.is_empty() {
                    return Ok(Token::Field(fields));
                }
                Token::Dot
            }
            '+' | '-' | '0'..='9' => return self.number(),
            c if is_ident_start(c) => {
                return Ok(match self.ident().as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "nil" => Token::Nil,
                    word => Token::Ident(word.to_string()),
                });
            }
            other => return Err(self.syntax(format!("unexpected {other:?} in action"))),
        };
        self.bump();
        Ok(token)
    }

    fn ident(&mut self) -> String {
        let rest = self.rest();
        let len = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
        self.pos += len;
        rest[..len].to_string()
    }

    /// A chain of `.Name` segments; empty if the next `.` starts no name.
    fn fields(&mut self) -> Result<Vec<String>> {
        let mut fields = Vec::new();
        while self.rest().starts_with('.') {
            if !self.rest()[1..].starts_with(is_ident_start) {
                if fields.is_empty() {
                    break;
                }
                return Err(self.syntax("malformed field path"));
            }
            self.bump();
            fields.push(self.ident());
        }
        Ok(fields)
    }

    fn number(&mut self) -> Result<Token> {
        let start = self.pos;
        if matches!(self.peek(), Some('+' | '-')) {
            self.bump();
        }
        let hex = self.rest().starts_with("0x") || self.rest().starts_with("0X");
        while let Some(c) = self.peek() {
            if !(is_ident_char(c) || c == '.') {
                break;
            }
            self.bump();
            if !hex && matches!(c, 'e' | 'E') && matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
        }
        let text = &self.src[start..self.pos];
        parse_number(text).ok_or_else(|| self.syntax(format!("bad number syntax: {text:?}")))
    }

    fn quoted(&mut self) -> Result<Token> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.syntax("unterminated quoted string")),
                Some('"') => return Ok(Token::Str(out)),
                Some('\\') => out.push(self.escape()?),
                Some(c) => out.push(c),
            }
        }
    }

    fn raw(&mut self) -> Result<Token> {
        self.bump();
        let rest = self.rest();
        let end = rest
            .find('`')
            .ok_or_else(|| self.syntax("unterminated raw quoted string"))?;
        self.pos += end + 1;
        Ok(Token::Str(rest[..end].to_string()))
    }

    fn char_constant(&mut self) -> Result<Token> {
        self.bump();
        let c = match self.bump() {
            Some('\\') => self.escape()?,
            Some(c) if c != '\'' && c != '\n' => c,
            _ => return Err(self.syntax("malformed character constant")),
        };
        if self.bump() != Some('\'') {
            return Err(self.syntax("unterminated character constant"));
        }
        Ok(Token::Int(i64::from(u32::from(c))))
    }

    fn escape(&mut self) -> Result<char> {
        let c = self
            .bump()
            .ok_or_else(|| self.syntax("unterminated escape sequence"))?;
        let simple = match c {
            'a' => '\x07',
            'b' => '\x08',
            'f' => '\x0c',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\x0b',
            '\\' | '"' | '\'' => c,
            'x' => return self.code_point(2, 16),
            'u' => return self.code_point(4, 16),
            'U' => return self.code_point(8, 16),
            '0'..='7' => {
                self.pos -= 1;
                return self.code_point(3, 8);
            }
            other => return Err(self.syntax(format!("unknown escape sequence \\{other}"))),
        };
        Ok(simple)
    }

    fn code_point(&mut self, digits: usize, radix: u32) -> Result<char> {
        let rest = self.rest();
        let text = rest.get(..digits).unwrap_or(rest);
        let c = u32::from_str_radix(text, radix)
            .ok()
            .filter(|_| text.len() == digits)
            .and_then(char::from_u32)
            .ok_or_else(|| self.syntax(format!("invalid escape sequence {text:?}")))?;
        self.pos += digits;
        Ok(c)
    }
}

fn parse_number(text: &str) -> Option<Token> {
    let clean: String = text.chars().filter(|&c| c != '_').collect();
    let (negative, digits) = match clean.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, clean.strip_prefix('+').unwrap_or(&clean)),
    };
    if !digits.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }

    let radix = [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)]
        .into_iter()
        .find_map(|(prefix, radix)| digits.strip_prefix(prefix).map(|rest| (rest, radix)));
    let int = match radix {
        Some((rest, radix)) => i64::from_str_radix(rest, radix).ok()?,
        None if digits.contains(['.', 'e', 'E']) => {
            let value: f64 = digits.parse().ok()?;
            return Some(Token::Float(if negative { -value } else { value }));
        }
        None if digits.len() > 1 && digits.starts_with('0') => {
            i64::from_str_radix(&digits[1..], 8).ok()?
        }
        None => digits.parse().ok()?,
    };
    Some(Token::Int(if negative { -int } else { int }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        match lex(source).expect("source should lex").as_slice() {
            [Item::Action { tokens, .. }] => tokens.iter().map(|t| t.token.clone()).collect(),
            other => panic!("expected a single action, got {other:?}"),
        }
    }

    #[test]
    fn fields_variables_and_operators() {
        assert_eq!(
            tokens("{{$v := .User.Name | len}}"),
            vec![
                Token::Variable("$v".into(), Vec::new()),
                Token::Declare,
                Token::Field(vec!["User".into(), "Name".into()]),
                Token::Pipe,
                Token::Ident("len".into()),
            ]
        );
        assert_eq!(
            tokens("{{$.Title}}"),
            vec![Token::Variable("$".into(), vec!["Title".into()])]
        );
        assert_eq!(tokens("{{.}}"), vec![Token::Dot]);
    }

    #[test]
    fn literals() {
        assert_eq!(
            tokens(r#"{{"a\tb" `raw\n` 'x' 42 -7 0x1f 2.5 1e3 true nil}}"#),
            vec![
                Token::Str("a\tb".into()),
                Token::Str("raw\\n".into()),
                Token::Int(120),
                Token::Int(42),
                Token::Int(-7),
                Token::Int(31),
                Token::Float(2.5),
                Token::Float(1000.0),
                Token::Bool(true),
                Token::Nil,
            ]
        );
    }

    #[test]
    fn quoted_close_delimiter_stays_in_string() {
        assert_eq!(tokens(r#"{{"}}"}}"#), vec![Token::Str("}}".into())]);
    }

    #[test]
    fn trim_markers_strip_whitespace() {
        let items = lex("a \n {{- .x -}} \t b").expect("source should lex");
        assert_eq!(items.first(), Some(&Item::Text("a".into())));
        assert_eq!(items.last(), Some(&Item::Text("b".into())));
    }

    #[test]
    fn negative_number_is_not_a_trim_marker() {
        assert_eq!(tokens("{{-3}}"), vec![Token::Int(-3)]);
    }

    #[test]
    fn lexical_errors() {
        assert_eq!(
            lex("x {{.a"),
            Err(TemplateError::UnclosedAction { offset: 2 })
        );
        assert!(matches!(lex("{{\"open}}"), Err(TemplateError::Syntax { .. })));
        assert!(matches!(lex("{{.a..b}}"), Err(TemplateError::Syntax { .. })));
        assert!(matches!(lex("{{.1abc}}"), Err(TemplateError::Syntax { .. })));
        assert!(matches!(lex("{{3x}}"), Err(TemplateError::Syntax { .. })));
        assert!(matches!(lex("{{a : b}}"), Err(TemplateError::Syntax { .. })));
    }
}
