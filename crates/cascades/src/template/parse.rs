//! Builds the node tree from lexed items and resolves names.

use super::funcs::Func;
use super::lex::{Item, Spanned, Token};
use super::value::Value;
use super::{Result, TemplateError};

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Node {
    Text(String),
    Action(Pipeline),
    If(Branch),
    Range(Branch),
    With(Branch),
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Branch {
    pub pipe: Pipeline,
    pub body: Vec<Node>,
    pub otherwise: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Pipeline {
    /// Variables declared (`:=`) or assigned (`=`) by this pipeline.
    pub decl: Vec<String>,
    pub assign: bool,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Command {
    pub operands: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Operand {
    Dot,
    Field(Vec<String>),
    Variable(String, Vec<String>),
    Function(Func),
    Literal(Value),
    Nil,
    /// A parenthesized pipeline, optionally followed by `.Field` access.
    Pipeline(Box<Pipeline>, Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    If,
    Range,
    With,
}

impl Control {
    fn name(self) -> &'static str {
        match self {
            Control::If => "if",
            Control::Range => "range",
            Control::With => "with",
        }
    }
}

enum Stop {
    Eof,
    End { offset: usize },
    Else { tokens: Vec<Spanned>, offset: usize },
}

pub(super) fn parse(items: Vec<Item>) -> Result<Vec<Node>> {
    let mut parser = Parser {
        items: items.into_iter(),
        vars: vec!["$".to_string()],
        loops: 0,
    };
    match parser.list()? {
        (nodes, Stop::Eof) => Ok(nodes),
        (_, Stop::End { offset }) => Err(syntax("unexpected end", offset)),
        (_, Stop::Else { offset, .. }) => Err(syntax("unexpected else", offset)),
    }
}

fn syntax(message: impl Into<String>, offset: usize) -> TemplateError {
    TemplateError::Syntax {
        message: message.into(),
        offset,
    }
}

struct Parser {
    items: std::vec::IntoIter<Item>,
    /// Variables in scope, innermost last.
    vars: Vec<String>,
    loops: usize,
}

impl Parser {
    fn list(&mut self) -> Result<(Vec<Node>, Stop)> {
        let mut nodes = Vec::new();
        while let Some(item) = self.items.next() {
            let (tokens, offset) = match item {
                Item::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Item::Action { tokens, offset } => (tokens, offset),
            };
            let keyword = match tokens.first() {
                Some(Spanned {
                    token: Token::Ident(word),
                    ..
                }) => word.as_str(),
                _ => "",
            };
            match keyword {
                "end" => {
                    bare(&tokens, offset)?;
                    return Ok((nodes, Stop::End { offset }));
                }
                "else" => {
                    let tokens = tokens[1..].to_vec();
                    return Ok((nodes, Stop::Else { tokens, offset }));
                }
                "if" => nodes.push(self.control(Control::If, &tokens[1..], offset)?),
                "range" => nodes.push(self.control(Control::Range, &tokens[1..], offset)?),
                "with" => nodes.push(self.control(Control::With, &tokens[1..], offset)?),
                "break" | "continue" => {
                    if self.loops == 0 {
                        return Err(syntax(format!("{keyword} outside range"), offset));
                    }
                    bare(&tokens, offset)?;
                    nodes.push(if keyword == "break" {
                        Node::Break
                    } else {
                        Node::Continue
                    });
                }
                "define" | "template" | "block" => {
                    return Err(syntax(format!("{keyword} is not supported"), offset));
                }
                _ => nodes.push(Node::Action(self.action_pipeline(&tokens, offset, false)?)),
            }
        }
        Ok((nodes, Stop::Eof))
    }

    fn control(&mut self, kind: Control, tokens: &[Spanned], offset: usize) -> Result<Node> {
        let mark = self.vars.len();
        let pipe = self.action_pipeline(tokens, offset, kind == Control::Range)?;

        if kind == Control::Range {
            self.loops += 1;
        }
        let body = self.list();
        if kind == Control::Range {
            self.loops -= 1;
        }
        let (body, stop) = body?;

        let unclosed = || syntax(format!("unclosed {}", kind.name()), offset);
        let otherwise = match stop {
            Stop::Eof => return Err(unclosed()),
            Stop::End { .. } => Vec::new(),
            Stop::Else {
                tokens,
                offset: else_offset,
            } => match tokens.split_first() {
                None => match self.list()? {
                    (otherwise, Stop::End { .. }) => otherwise,
                    (_, Stop::Eof) => return Err(unclosed()),
                    (_, Stop::Else { offset, .. }) => {
                        return Err(syntax("expected end; found else", offset));
                    }
                },
                // `else if` and `else with` share the enclosing end.
                Some((
                    Spanned {
                        token: Token::Ident(word),
                        ..
                    },
                    rest,
                )) if kind != Control::Range && word == kind.name() => {
                    vec![self.control(kind, rest, else_offset)?]
                }
                Some(_) => return Err(syntax("unexpected tokens after else", else_offset)),
            },
        };
        self.vars.truncate(mark);

        let branch = Branch {
            pipe,
            body,
            otherwise,
        };
        Ok(match kind {
            Control::If => Node::If(branch),
            Control::Range => Node::Range(branch),
            Control::With => Node::With(branch),
        })
    }

    fn action_pipeline(&mut self, tokens: &[Spanned], offset: usize, range: bool) -> Result<Pipeline> {
        let mut cursor = Cursor { tokens, pos: 0 };
        self.pipeline(&mut cursor, offset, false, range)
    }

    fn pipeline(
        &mut self,
        cursor: &mut Cursor<'_>,
        offset: usize,
        nested: bool,
        range: bool,
    ) -> Result<Pipeline> {
        let (decl, assign) = self.declaration(cursor, offset, range)?;

        let mut commands = Vec::new();
        loop {
            let command = self.command(cursor, offset, commands.len() + 1)?;
            if command.operands.is_empty() {
                return Err(TemplateError::EmptyAction { offset });
            }
            commands.push(command);
            match cursor.peek().map(|spanned| &spanned.token) {
                Some(Token::Pipe) => {
                    cursor.next();
                    self.check_stage(cursor, commands.len() + 1, offset)?;
                }
                Some(Token::RightParen) if nested => break,
                Some(Token::RightParen) => return Err(syntax("unexpected right paren", offset)),
                None if nested => return Err(syntax("unclosed left paren", offset)),
                _ => break,
            }
        }

        if !assign {
            self.vars.extend(decl.iter().cloned());
        }
        Ok(Pipeline {
            decl,
            assign,
            commands,
        })
    }

    /// Later pipeline stages receive the previous result as an argument,
    /// so they cannot start with a constant.
    fn check_stage(&self, cursor: &Cursor<'_>, stage: usize, offset: usize) -> Result<()> {
        match cursor.peek().map(|spanned| &spanned.token) {
            Some(
                Token::Dot
                | Token::Nil
                | Token::Bool(_)
                | Token::Int(_)
                | Token::Float(_)
                | Token::Str(_),
            ) => Err(syntax(
                format!("non executable command in pipeline stage {stage}"),
                offset,
            )),
            _ => Ok(()),
        }
    }

    fn declaration(
        &mut self,
        cursor: &mut Cursor<'_>,
        offset: usize,
        range: bool,
    ) -> Result<(Vec<String>, bool)> {
        let (names, op) = match cursor.rest() {
            [Spanned {
                token: Token::Variable(key, key_path),
                ..
            }, Spanned {
                token: Token::Comma,
                ..
            }, Spanned {
                token: Token::Variable(elem, elem_path),
                ..
            }, Spanned { token: op, .. }, ..]
                if range
                    && key_path.is_empty()
                    && elem_path.is_empty()
                    && matches!(op, Token::Declare | Token::Assign) =>
            {
                (vec![key.clone(), elem.clone()], op)
            }
            [Spanned {
                token: Token::Variable(name, path),
                ..
            }, Spanned { token: op, .. }, ..]
                if path.is_empty() && matches!(op, Token::Declare | Token::Assign) =>
            {
                (vec![name.clone()], op)
            }
            _ => return Ok((Vec::new(), false)),
        };

        let assign = *op == Token::Assign;
        if assign {
            if let Some(name) = names.iter().find(|name| !self.vars.contains(*name)) {
                return Err(TemplateError::UndefinedVariable {
                    name: name.clone(),
                    offset,
                });
            }
        }
        cursor.pos += names.len() * 2;
        Ok((names, assign))
    }

    /// An identifier that names no function reads the field of that name
    /// from dot, unless it is called: given arguments or piped into.
    fn command(&mut self, cursor: &mut Cursor<'_>, offset: usize, stage: usize) -> Result<Command> {
        let mut operands = Vec::new();
        let mut unknown_head = None;
        while let Some(spanned) = cursor.peek() {
            if matches!(spanned.token, Token::Pipe | Token::RightParen) {
                break;
            }
            cursor.next();
            if let (true, Token::Ident(name)) = (operands.is_empty(), &spanned.token) {
                unknown_head = Func::from_name(name).is_none().then_some(name);
            }
            operands.push(self.operand(spanned, cursor, offset)?);
        }
        if let Some(name) = unknown_head.filter(|_| operands.len() > 1 || stage > 1) {
            return Err(TemplateError::UndefinedFunction {
                name: name.clone(),
                offset,
            });
        }
        Ok(Command { operands })
    }

    fn operand(
        &mut self,
        spanned: &Spanned,
        cursor: &mut Cursor<'_>,
        offset: usize,
    ) -> Result<Operand> {
        let operand = match &spanned.token {
            Token::Dot => Operand::Dot,
            Token::Field(path) => Operand::Field(path.clone()),
            Token::Variable(name, path) => {
                if !self.vars.contains(name) {
                    return Err(TemplateError::UndefinedVariable {
                        name: name.clone(),
                        offset,
                    });
                }
                Operand::Variable(name.clone(), path.clone())
            }
            Token::Ident(name) => Func::from_name(name)
                .map_or_else(|| Operand::Field(vec![name.clone()]), Operand::Function),
            Token::Str(s) => Operand::Literal(Value::Str(s.clone())),
            Token::Int(i) => Operand::Literal(Value::Int(*i)),
            Token::Float(x) => Operand::Literal(Value::Float(*x)),
            Token::Bool(b) => Operand::Literal(Value::Bool(*b)),
            Token::Nil => Operand::Nil,
            Token::LeftParen => {
                let inner = self.pipeline(cursor, offset, true, false)?;
                let close_end = cursor.next().map_or(spanned.end, |close| close.end);
                let path = match cursor.peek() {
                    Some(Spanned {
                        token: Token::Field(path),
                        start,
                        ..
                    }) if *start == close_end => {
                        cursor.next();
                        path.clone()
                    }
                    _ => Vec::new(),
                };
                Operand::Pipeline(Box::new(inner), path)
            }
            Token::Declare | Token::Assign | Token::Comma | Token::Pipe | Token::RightParen => {
                return Err(syntax(
                    format!("unexpected {} in command", describe(&spanned.token)),
                    offset,
                ));
            }
        };
        Ok(operand)
    }
}

/// `end`, `break` and `continue` take nothing else.
fn bare(tokens: &[Spanned], offset: usize) -> Result<()> {
    match tokens {
        [_] => Ok(()),
        [word, ..] => Err(syntax(
            format!("unexpected tokens after {}", describe(&word.token)),
            offset,
        )),
        [] => Ok(()),
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Declare => ":=".to_string(),
        Token::Assign => "=".to_string(),
        Token::Comma => ",".to_string(),
        Token::Pipe => "|".to_string(),
        Token::RightParen => ")".to_string(),
        Token::Ident(word) => word.clone(),
        other => format!("{other:?}"),
    }
}

struct Cursor<'a> {
    tokens: &'a [Spanned],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a [Spanned] {
        self.tokens.get(self.pos..).unwrap_or_default()
    }

    fn peek(&self) -> Option<&'a Spanned> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Spanned> {
        let spanned = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(spanned)
    }
}
