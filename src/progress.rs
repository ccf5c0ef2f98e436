use std::io::{self, Write};

use crossterm::cursor::MoveToColumn;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use crossterm::{execute, queue};

/// Transient status line shown while a query is polled.
pub trait ProgressReporter {
    /// Replace whatever the indicator currently shows with `text`.
    fn update(&mut self, text: &str) -> io::Result<()>;

    /// Remove the indicator entirely.
    fn clear(&mut self) -> io::Result<()>;
}

/// Redraws a single terminal line in place.
pub struct TerminalProgress<W: Write> {
    out: W,
    drawn: bool,
}

impl<W: Write> TerminalProgress<W> {
    pub fn new(out: W) -> Self {
        Self { out, drawn: false }
    }
}

impl<W: Write> ProgressReporter for TerminalProgress<W> {
    fn update(&mut self, text: &str) -> io::Result<()> {
        queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine), Print(text))?;
        self.out.flush()?;
        self.drawn = true;
        Ok(())
    }

    fn clear(&mut self) -> io::Result<()> {
        if self.drawn {
            execute!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
            self.drawn = false;
        }
        Ok(())
    }
}

/// For non-interactive stderr.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn update(&mut self, text: &str) -> io::Result<()> {
        tracing::trace!(status = text, "poll");
        Ok(())
    }

    fn clear(&mut self) -> io::Result<()> {
        Ok(())
    }
}
