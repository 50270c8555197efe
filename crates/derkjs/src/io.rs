//! Host IO for script-visible output and line input.
//!
//! The VM never touches stdout directly: `console.log` and `console.readln`
//! go through a [`PrintWriter`], so hosts and tests can capture or redirect
//! everything a script emits.

use std::io::{self, BufRead, Write as _};

/// Handler for `console.log` output and `console.readln` input.
pub trait PrintWriter {
    /// Writes one formatted argument. Separators and the trailing newline
    /// are emitted separately via [`Self::stdout_push`].
    fn stdout_write(&mut self, output: &str);

    /// Writes a single separator or terminator character.
    fn stdout_push(&mut self, end: char);

    /// Blocking line read for `console.readln`. Returns `None` on EOF or
    /// when the writer has no input source; the script sees `null`.
    fn stdin_readln(&mut self, prompt: &str) -> Option<String> {
        let _ = prompt;
        None
    }
}

/// Default writer: stdout/stdin of the process.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn stdout_write(&mut self, output: &str) {
        let _ = io::stdout().write_all(output.as_bytes());
    }

    fn stdout_push(&mut self, end: char) {
        let mut buf = [0u8; 4];
        let _ = io::stdout().write_all(end.encode_utf8(&mut buf).as_bytes());
        if end == '\n' {
            let _ = io::stdout().flush();
        }
    }

    fn stdin_readln(&mut self, prompt: &str) -> Option<String> {
        let _ = io::stdout().write_all(prompt.as_bytes());
        let _ = io::stdout().flush();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                if line.ends_with('\n') {
                    line.pop();
                    if line.ends_with('\r') {
                        line.pop();
                    }
                }
                Some(line)
            }
        }
    }
}

/// Collects all output into a string; the test suite's writer.
#[derive(Debug, Default)]
pub struct CollectStringPrint {
    output: String,
    input: Vec<String>,
}

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues lines that successive `console.readln` calls will return.
    #[must_use]
    pub fn with_input(lines: &[&str]) -> Self {
        Self {
            output: String::new(),
            // popped back-to-front
            input: lines.iter().rev().map(|&l| l.to_owned()).collect(),
        }
    }

    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    #[must_use]
    pub fn into_output(self) -> String {
        self.output
    }
}

impl PrintWriter for CollectStringPrint {
    fn stdout_write(&mut self, output: &str) {
        self.output.push_str(output);
    }

    fn stdout_push(&mut self, end: char) {
        self.output.push(end);
    }

    fn stdin_readln(&mut self, prompt: &str) -> Option<String> {
        self.output.push_str(prompt);
        self.input.pop()
    }
}

/// Discards all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn stdout_write(&mut self, _output: &str) {}

    fn stdout_push(&mut self, _end: char) {}
}
