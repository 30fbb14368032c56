//! stdio transport.
//!
//! One UTF-8 JSON-RPC message per line in each direction: requests arrive on
//! stdin and replies leave on stdout. stdout carries nothing else, so all
//! logging goes to stderr.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::mcp::protocol::OutgoingMessage;

/// Newline-delimited JSON-RPC over the process's stdin and stdout.
pub struct StdioTransport {
    reader: BufReader<tokio::io::Stdin>,
    writer: tokio::io::Stdout,
}

impl StdioTransport {
    /// Creates a transport over the process's standard streams.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            writer: tokio::io::stdout(),
        }
    }

    /// Reads the next line from stdin, without its line terminator.
    ///
    /// Returns `None` once stdin is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from stdin fails.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }

        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    /// Writes one reply to stdout as a single line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_message(&mut self, message: &OutgoingMessage) -> io::Result<()> {
        let json = encode(message)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialises a reply. Compact JSON never contains a raw newline, since
/// newlines inside strings are escaped.
fn encode(message: &OutgoingMessage) -> io::Result<String> {
    serde_json::to_string(message).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
