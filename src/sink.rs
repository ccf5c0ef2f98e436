use std::io::{self, Write};

/// Replicates every write to each destination, in order.
///
/// A write succeeds only once every destination has taken all of it; the first
/// failing destination aborts the call and later ones are not attempted.
/// Bytes already accepted elsewhere are left in place.
pub struct MultiSinkWriter<'a> {
    sinks: Vec<Box<dyn Write + 'a>>,
}

impl<'a> MultiSinkWriter<'a> {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with_sink(mut self, sink: impl Write + 'a) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl Default for MultiSinkWriter<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for MultiSinkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for sink in &mut self.sinks {
            sink.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Escape {
    None,
    Started,
    Csi,
}

/// Drops ANSI CSI sequences (`ESC [ ... final`) from the byte stream, so the
/// cache copy of colorized output stays plain. Sequences may straddle writes.
pub struct AnsiStripper<W> {
    inner: W,
    state: Escape,
    scratch: Vec<u8>,
}

impl<W: Write> AnsiStripper<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            state: Escape::None,
            scratch: Vec::new(),
        }
    }
}

impl<W: Write> Write for AnsiStripper<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.scratch.clear();
        for &byte in buf {
            self.state = match (self.state, byte) {
                (Escape::None, 0x1b) => Escape::Started,
                (Escape::None, _) => {
                    self.scratch.push(byte);
                    Escape::None
                }
                (Escape::Started, b'[') => Escape::Csi,
                // Lone ESC followed by something else: keep both bytes.
                (Escape::Started, _) => {
                    self.scratch.extend_from_slice(&[0x1b, byte]);
                    Escape::None
                }
                (Escape::Csi, 0x40..=0x7e) => Escape::None,
                (Escape::Csi, _) => Escape::Csi,
            };
        }
        self.inner.write_all(&self.scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
