use std::io::Write;

use cascades_port::{Emitter, Ip, Transform, TransformError};

/// Prints every IP as one line: packets as lossy UTF-8, brackets as `[` / `]`.
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Transform for ConsoleSink<W> {
    fn apply(&mut self, ip: Ip, _out: &mut Emitter) -> Result<(), TransformError> {
        match ip {
            Ip::Packet(payload) => writeln!(self.out, "{}", String::from_utf8_lossy(&payload))?,
            Ip::OpenBracket => writeln!(self.out, "[")?,
            Ip::CloseBracket => writeln!(self.out, "]")?,
        }
        self.out.flush()?;
        Ok(())
    }
}
