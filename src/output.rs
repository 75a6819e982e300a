//! User-facing output on stdout. Diagnostics go through `tracing` instead.

use crate::error::ClientError;
use serde::Serialize;

/// Prints command results; in verbose mode results carry the HTTP status
/// that produced them
#[derive(Debug, Clone, Copy, Default)]
pub struct Console {
    verbose: bool,
}

impl Console {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn print(&self, text: &str) {
        println!("{}", text);
    }

    /// Print `text`, followed by `Code: <status>` when verbose
    pub fn result(&self, text: &str, status: Option<u16>) {
        println!("{}", render(text, status, self.verbose));
    }

    /// Dump a document as YAML
    pub fn yaml<T: Serialize>(&self, document: &T, status: Option<u16>) -> Result<(), ClientError> {
        let text = serde_yaml::to_string(document)?;
        self.result(text.trim_end(), status);
        Ok(())
    }

    /// Report a failure that does not end the command
    pub fn error(&self, err: &ClientError) {
        self.result(&err.to_string(), err.status());
    }
}

pub fn render(text: &str, status: Option<u16>, verbose: bool) -> String {
    match status {
        Some(code) if verbose => format!("{}\nCode: {}", text, code),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_with_code() {
        assert_eq!(render("Backup scheduled", Some(200), true), "Backup scheduled\nCode: 200");
        assert_eq!(render("Backup scheduled", Some(200), false), "Backup scheduled");
        assert_eq!(render("No items found", None, true), "No items found");
    }
}
