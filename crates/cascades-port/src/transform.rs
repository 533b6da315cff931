use std::fmt;

use cascades_frame::Ip;

use crate::error::TransformError;

/// Per-IP behavior of a component.
///
/// Called once per valid IP, in arrival order. Anything pushed into the
/// [`Emitter`] is sent after `apply` returns; on error nothing is sent.
pub trait Transform {
    fn apply(&mut self, ip: Ip, out: &mut Emitter) -> Result<(), TransformError>;
}

/// A transform that is built from a configuration IP before it can run.
pub trait Configure: Sized {
    type Error: fmt::Display;

    /// Build the transform from a configuration payload.
    fn compile(payload: &[u8]) -> Result<Self, Self::Error>;
}

/// Collects the IPs a transform produces for one input IP.
#[derive(Debug, Default)]
pub struct Emitter {
    emitted: Vec<(usize, Ip)>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit on the primary output port.
    pub fn emit(&mut self, ip: Ip) {
        self.emit_on(0, ip);
    }

    /// Emit on the output port at `index`.
    pub fn emit_on(&mut self, index: usize, ip: Ip) {
        self.emitted.push((index, ip));
    }

    pub fn len(&self) -> usize {
        self.emitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitted.is_empty()
    }

    pub fn clear(&mut self) {
        self.emitted.clear();
    }

    pub fn into_inner(self) -> Vec<(usize, Ip)> {
        self.emitted
    }

    pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, (usize, Ip)> {
        self.emitted.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_targets_primary_output() {
        let mut out = Emitter::new();
        out.emit(Ip::packet("a"));
        out.emit_on(2, Ip::CloseBracket);
        assert_eq!(out.len(), 2);
        assert_eq!(
            out.into_inner(),
            vec![(0, Ip::packet("a")), (2, Ip::CloseBracket)]
        );
    }

    #[test]
    fn drain_empties_in_order() {
        let mut out = Emitter::new();
        out.emit(Ip::OpenBracket);
        out.emit(Ip::packet("x"));
        let drained: Vec<_> = out.drain().collect();
        assert_eq!(drained, vec![(0, Ip::OpenBracket), (0, Ip::packet("x"))]);
        assert!(out.is_empty());
    }
}
