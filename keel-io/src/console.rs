use std::io::{self, Write};

/// Line-oriented text output.
pub trait Console: Send {
    fn write_line(&mut self, text: &str) -> io::Result<()>;
    fn write_error_line(&mut self, text: &str) -> io::Result<()>;
}

/// Console on the process's stdout/stderr.
#[derive(Debug, Default)]
pub struct StdConsole;

impl StdConsole {
    pub fn new() -> Self {
        Self
    }
}

impl Console for StdConsole {
    fn write_line(&mut self, text: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", text)?;
        out.flush()
    }

    fn write_error_line(&mut self, text: &str) -> io::Result<()> {
        writeln!(io::stderr().lock(), "{}", text)
    }
}

/// In-memory console that records every line.
#[derive(Debug, Default)]
pub struct BufferConsole {
    pub lines: Vec<String>,
    pub error_lines: Vec<String>,
}

impl Console for BufferConsole {
    fn write_line(&mut self, text: &str) -> io::Result<()> {
        self.lines.push(text.to_string());
        Ok(())
    }

    fn write_error_line(&mut self, text: &str) -> io::Result<()> {
        self.error_lines.push(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_console_separates_streams() {
        let mut console = BufferConsole::default();
        console.write_line("ready").unwrap();
        console.write_error_line("underrun").unwrap();
        assert_eq!(console.lines, vec!["ready"]);
        assert_eq!(console.error_lines, vec!["underrun"]);
        assert!(StdConsole::new().write_line("keel console test").is_ok());
    }
}
