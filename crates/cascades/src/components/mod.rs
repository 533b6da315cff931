//! The reference components.

pub mod console;
pub mod template;

pub use console::ConsoleSink;
pub use template::TemplateTransform;
