//! Line input for the client.

use rustyline::{DefaultEditor, error::ReadlineError};

use crate::error::ClientError;

/// Reads trimmed lines from the terminal with history.
pub struct LineReader {
    editor: DefaultEditor,
}

impl LineReader {
    pub fn new() -> Result<Self, ClientError> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }

    /// Read one line; `None` once the user ends input with Ctrl+C or Ctrl+D.
    pub fn read_line(&mut self, prompt: &str) -> Result<Option<String>, ClientError> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                let line = line.trim().to_string();
                if !line.is_empty() {
                    self.editor.add_history_entry(line.as_str()).ok();
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C
                tracing::info!("Interrupted");
                Ok(None)
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D
                tracing::info!("EOF");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
