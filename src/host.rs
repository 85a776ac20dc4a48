//! I/O collaborators for the core functions that touch the outside world.
//!
//! The engine never performs I/O directly; `print`, `.`, `load`, `cmd`, `write` and
//! `exit` go through a [`Host`]. Use [`StdHost`] for a real process and
//! [`SandboxHost`] to capture output and keep files in memory (tests, embedding).

use std::collections::HashMap;
use std::io::{self, Write};
use std::process::Command;

/// The outside world as seen by a running program
pub trait Host {
    /// Write text verbatim (no newline added)
    fn print(&mut self, text: &str);

    /// Read a whole file as text
    fn read_file(&mut self, path: &str) -> io::Result<String>;

    /// Run a shell command and capture its standard output
    fn run_command(&mut self, command: &str) -> io::Result<String>;

    /// Create or truncate a file with the given contents
    fn write_file(&mut self, path: &str, contents: &str) -> io::Result<()>;

    /// Request process termination
    fn exit(&mut self);
}

/// Host backed by the real process: stdout, the filesystem and the system shell
#[derive(Debug, Default, Clone, Copy)]
pub struct StdHost;

impl Host for StdHost {
    fn print(&mut self, text: &str) {
        print!("{text}");
        // Output without a trailing newline would otherwise sit in the buffer
        let _ = io::stdout().flush();
    }

    fn read_file(&mut self, path: &str) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn run_command(&mut self, command: &str) -> io::Result<String> {
        let output = if cfg!(target_os = "windows") {
            Command::new("cmd").args(["/C", command]).output()?
        } else {
            Command::new("sh").arg("-c").arg(command).output()?
        };
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn write_file(&mut self, path: &str, contents: &str) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn exit(&mut self) {
        let _ = io::stdout().flush();
        std::process::exit(0);
    }
}

/// Host that captures output and keeps files in memory.
///
/// Shell commands are refused, and `exit` is recorded instead of terminating.
#[derive(Debug, Default, Clone)]
pub struct SandboxHost {
    pub output: String,
    pub files: HashMap<String, String>,
    pub exited: bool,
}

impl SandboxHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sandbox pre-populated with files
    pub fn with_files<I, K, V>(files: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        SandboxHost {
            files: files
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..Self::default()
        }
    }

    /// Take the captured output, leaving the buffer empty
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}

impl Host for SandboxHost {
    fn print(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn read_file(&mut self, path: &str) -> io::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no such file: {path}")))
    }

    fn run_command(&mut self, command: &str) -> io::Result<String> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("commands are disabled in the sandbox: {command}"),
        ))
    }

    fn write_file(&mut self, path: &str, contents: &str) -> io::Result<()> {
        self.files.insert(path.to_owned(), contents.to_owned());
        Ok(())
    }

    fn exit(&mut self) {
        self.exited = true;
    }
}
