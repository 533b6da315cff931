//! The template language of the template transform.
//!
//! Templates follow the text/template language: `{{.Field}}` actions with
//! pipelines, variables, `if`/`else`/`range`/`with` control flow and the
//! predefined functions (`and`, `or`, `not`, `len`, `index`, `print`,
//! `printf`, `println`, `eq`, `ne`, `lt`, `le`, `gt`, `ge`, `html`,
//! `urlquery`). Named templates (`define`, `template`, `block`) are not
//! supported.
//!
//! A bare identifier that names no function and takes no arguments reads
//! the field of that name, so `{{Name}}` is `{{.Name}}`.
//!
//! The data is one decoded JSON object. JSON numbers are floating point, so
//! `{{eq .n 1}}` is an error while `{{eq .n 1.0}}` compares. A missing key or
//! a `null` prints as `<no value>`.
//!
//! # Example
//!
//! ```
//! use cascades::template::Template;
//!
//! let template = Template::compile("{{range .items}}[{{.}}]{{end}}").unwrap();
//! let data = serde_json::json!({"items": ["a", 1.5]});
//! let rendered = template.render(data.as_object().unwrap()).unwrap();
//! assert_eq!(rendered, "[a][1.5]");
//! ```

mod exec;
mod funcs;
mod lex;
mod parse;
mod value;

use std::str::FromStr;

use serde_json::{Map, Value as Json};
use thiserror::Error;

use self::parse::Node;
use self::value::Value;

/// Template compile and render errors.
///
/// Offsets are byte positions of the offending `{{` in the source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed action at offset {offset}")]
    UnclosedAction { offset: usize },

    #[error("unclosed comment at offset {offset}")]
    UnclosedComment { offset: usize },

    #[error("missing value for command at offset {offset}")]
    EmptyAction { offset: usize },

    #[error("function {name:?} not defined at offset {offset}")]
    UndefinedFunction { name: String, offset: usize },

    #[error("undefined variable {name:?} at offset {offset}")]
    UndefinedVariable { name: String, offset: usize },

    #[error("{message} at offset {offset}")]
    Syntax { message: String, offset: usize },

    #[error("{message}")]
    Exec { message: String },
}

pub type Result<T> = std::result::Result<T, TemplateError>;

/// A compiled template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn compile(source: &str) -> Result<Self> {
        let nodes = parse::parse(lex::lex(source)?)?;
        Ok(Self { nodes })
    }

    /// Render against one JSON object.
    pub fn render(&self, data: &Map<String, Json>) -> Result<String> {
        exec::execute(&self.nodes, Value::from_map(data))
    }
}

impl FromStr for Template {
    type Err = TemplateError;

    fn from_str(source: &str) -> Result<Self> {
        Self::compile(source)
    }
}
