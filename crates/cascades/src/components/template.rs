use cascades_port::{Configure, Emitter, Ip, Transform, TransformError};
use serde_json::{Map, Value};

use crate::template::{Template, TemplateError};

/// Renders a compiled template against each JSON object packet.
///
/// Brackets pass through unchanged.
#[derive(Debug, Clone)]
pub struct TemplateTransform {
    template: Template,
}

impl TemplateTransform {
    pub fn new(template: Template) -> Self {
        Self { template }
    }

    pub fn render(&self, payload: &[u8]) -> Result<String, TransformError> {
        let data: Map<String, Value> =
            serde_json::from_slice(payload).map_err(|err| TransformError::Decode(err.to_string()))?;
        self.template
            .render(&data)
            .map_err(|err| TransformError::Render(err.to_string()))
    }
}

impl Configure for TemplateTransform {
    type Error = TemplateError;

    fn compile(payload: &[u8]) -> Result<Self, Self::Error> {
        Template::compile(&String::from_utf8_lossy(payload)).map(Self::new)
    }
}

impl Transform for TemplateTransform {
    fn apply(&mut self, ip: Ip, out: &mut Emitter) -> Result<(), TransformError> {
        match ip {
            Ip::Packet(payload) => out.emit(Ip::packet(self.render(&payload)?)),
            bracket => out.emit(bracket),
        }
        Ok(())
    }
}
