//! Walks a parsed template against a data value.

use super::funcs::{self, Func};
use super::parse::{Branch, Command, Node, Operand, Pipeline};
use super::value::Value;
use super::{Result, TemplateError};

/// Printed in place of a missing or nil value.
const NO_VALUE: &str = "<no value>";

pub(super) fn execute(nodes: &[Node], root: Value) -> Result<String> {
    let mut exec = Exec {
        out: String::new(),
        vars: vec![("$".to_string(), root.clone())],
    };
    exec.walk(nodes, &root)?;
    Ok(exec.out)
}

fn error(message: impl Into<String>) -> TemplateError {
    TemplateError::Exec {
        message: message.into(),
    }
}

enum Flow {
    Next,
    Break,
    Continue,
}

struct Exec {
    out: String,
    vars: Vec<(String, Value)>,
}

impl Exec {
    fn walk(&mut self, nodes: &[Node], dot: &Value) -> Result<Flow> {
        for node in nodes {
            let flow = match node {
                Node::Text(text) => {
                    self.out.push_str(text);
                    Flow::Next
                }
                Node::Action(pipe) => {
                    let value = self.pipeline(pipe, dot)?;
                    if pipe.decl.is_empty() {
                        self.print(&value);
                    } else {
                        self.bind(&pipe.decl, pipe.assign, [value]);
                    }
                    Flow::Next
                }
                Node::If(branch) => self.conditional(branch, dot, false)?,
                Node::With(branch) => self.conditional(branch, dot, true)?,
                Node::Range(branch) => self.range(branch, dot)?,
                Node::Break => Flow::Break,
                Node::Continue => Flow::Continue,
            };
            if !matches!(flow, Flow::Next) {
                return Ok(flow);
            }
        }
        Ok(Flow::Next)
    }

    fn print(&mut self, value: &Value) {
        match value {
            Value::Missing | Value::Nil => self.out.push_str(NO_VALUE),
            value => self.out.push_str(&value.to_string()),
        }
    }

    /// Declare new variables, or overwrite the innermost ones of the same
    /// name when assigning.
    fn bind<const N: usize>(&mut self, names: &[String], assign: bool, values: [Value; N]) {
        let values = values.into_iter().skip(N.saturating_sub(names.len()));
        for (name, value) in names.iter().zip(values) {
            if assign {
                if let Some(slot) = self.vars.iter_mut().rev().find(|(var, _)| var == name) {
                    slot.1 = value;
                }
            } else {
                self.vars.push((name.clone(), value));
            }
        }
    }

    fn variable(&self, name: &str) -> Result<&Value> {
        self.vars
            .iter()
            .rev()
            .find(|(var, _)| var == name)
            .map(|(_, value)| value)
            .ok_or_else(|| error(format!("undefined variable: {name}")))
    }

    fn conditional(&mut self, branch: &Branch, dot: &Value, with: bool) -> Result<Flow> {
        let mark = self.vars.len();
        let value = self.pipeline(&branch.pipe, dot)?;
        self.bind(&branch.pipe.decl, branch.pipe.assign, [value.clone()]);
        let flow = match (value.is_true(), with) {
            (true, true) => self.walk(&branch.body, &value)?,
            (true, false) => self.walk(&branch.body, dot)?,
            (false, _) => self.walk(&branch.otherwise, dot)?,
        };
        self.vars.truncate(mark);
        Ok(flow)
    }

    fn range(&mut self, branch: &Branch, dot: &Value) -> Result<Flow> {
        let mark = self.vars.len();
        let entries: Vec<(Value, Value)> = match self.pipeline(&branch.pipe, dot)? {
            Value::List(items) => (0_i64..).map(Value::Int).zip(items).collect(),
            Value::Map(map) => map
                .into_iter()
                .map(|(key, value)| (Value::Str(key), value))
                .collect(),
            Value::Int(n) => (0..n).map(|i| (Value::Int(i), Value::Int(i))).collect(),
            Value::Missing | Value::Nil => Vec::new(),
            other => return Err(error(format!("range can't iterate over {other}"))),
        };

        if entries.is_empty() {
            let flow = self.walk(&branch.otherwise, dot)?;
            self.vars.truncate(mark);
            return Ok(flow);
        }
        for (key, elem) in entries {
            self.bind(&branch.pipe.decl, branch.pipe.assign, [key, elem.clone()]);
            let flow = self.walk(&branch.body, &elem)?;
            self.vars.truncate(mark);
            if matches!(flow, Flow::Break) {
                break;
            }
        }
        Ok(Flow::Next)
    }

    fn pipeline(&mut self, pipe: &Pipeline, dot: &Value) -> Result<Value> {
        let mut value = None;
        for command in &pipe.commands {
            value = Some(self.command(command, dot, value)?);
        }
        Ok(value.unwrap_or(Value::Missing))
    }

    fn command(&mut self, command: &Command, dot: &Value, piped: Option<Value>) -> Result<Value> {
        let Some((first, args)) = command.operands.split_first() else {
            return Ok(Value::Missing);
        };
        match first {
            Operand::Function(func) => self.call(*func, args, dot, piped),
            Operand::Nil => Err(error("nil is not a command")),
            _ if !args.is_empty() || piped.is_some() => {
                Err(error("can't give argument to non-function"))
            }
            operand => self.operand(operand, dot),
        }
    }

    fn call(
        &mut self,
        func: Func,
        args: &[Operand],
        dot: &Value,
        piped: Option<Value>,
    ) -> Result<Value> {
        if matches!(func, Func::And | Func::Or) && !args.is_empty() {
            let want = func == Func::Or;
            let mut last = Value::Missing;
            for arg in args {
                last = self.operand(arg, dot)?;
                if last.is_true() == want {
                    return Ok(last);
                }
            }
            return Ok(piped.unwrap_or(last));
        }

        let mut values = args
            .iter()
            .map(|arg| self.operand(arg, dot))
            .collect::<Result<Vec<_>>>()?;
        values.extend(piped);
        funcs::call(func, values)
            .map_err(|message| error(format!("error calling {}: {message}", func.name())))
    }

    fn operand(&mut self, operand: &Operand, dot: &Value) -> Result<Value> {
        match operand {
            Operand::Dot => Ok(dot.clone()),
            Operand::Field(path) => field_chain(dot, path),
            Operand::Variable(name, path) => field_chain(self.variable(name)?, path),
            Operand::Function(func) => self.call(*func, &[], dot, None),
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Nil => Ok(Value::Nil),
            Operand::Pipeline(pipe, path) => {
                let value = self.pipeline(pipe, dot)?;
                self.bind(&pipe.decl, pipe.assign, [value.clone()]);
                field_chain(&value, path)
            }
        }
    }
}

/// Look up `.A.B` on `base`. Absent keys yield `Missing`, and so does
/// anything looked up on `Missing`.
fn field_chain(base: &Value, path: &[String]) -> Result<Value> {
    let mut current = base;
    for name in path {
        current = match current {
            Value::Missing => return Ok(Value::Missing),
            Value::Map(map) => match map.get(name) {
                Some(value) => value,
                None => return Ok(Value::Missing),
            },
            Value::Nil => {
                return Err(error(format!(
                    "nil pointer evaluating interface {{}}.{name}"
                )));
            }
            other => {
                return Err(error(format!(
                    "can't evaluate field {name} in type {}",
                    other.type_name()
                )));
            }
        };
    }
    Ok(current.clone())
}
