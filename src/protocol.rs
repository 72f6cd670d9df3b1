//! Control-channel wire format
//!
//! The host and the isolated runner process speak line-delimited JSON over
//! the child's stdin/stdout: one message per line, internally tagged. The
//! message set mirrors the run lifecycle: configure, build-suite, run
//! (with streamed events), shutdown.

use std::io::{BufRead, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::suite::{RunEvent, TestRunResult};

/// Host → runner requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Set the test file name (bare file name; the runner's working
    /// directory is the module's directory) and the optional single-test
    /// selector. Must precede `BuildSuite`.
    Configure {
        test_file_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        test_name: Option<String>,
    },
    BuildSuite,
    Run,
    Shutdown,
}

/// Runner → host responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Configured,
    SuiteBuilt { test_count: usize },
    Event { event: RunEvent },
    RunCompleted { result: TestRunResult },
    Failed { phase: Phase, message: String },
    ShuttingDown,
}

/// Which lifecycle phase a `Failed` response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Configure,
    BuildSuite,
    Run,
}

/// Write one message followed by a newline, flushing the channel.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    serde_json::to_writer(&mut *writer, message)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Read the next message. `Ok(None)` means the peer closed the channel.
pub fn read_message<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        return Ok(Some(serde_json::from_str(trimmed)?));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_request_roundtrip() {
        let mut buffer = Vec::new();
        write_message(
            &mut buffer,
            &Request::Configure {
                test_file_name: "tests.so".to_string(),
                test_name: Some("suite.test_x".to_string()),
            },
        )
        .unwrap();
        write_message(&mut buffer, &Request::BuildSuite).unwrap();

        let mut reader = Cursor::new(buffer);
        let first: Request = read_message(&mut reader).unwrap().unwrap();
        match first {
            Request::Configure {
                test_file_name,
                test_name,
            } => {
                assert_eq!(test_file_name, "tests.so");
                assert_eq!(test_name.as_deref(), Some("suite.test_x"));
            }
            other => panic!("unexpected request: {other:?}"),
        }
        assert!(matches!(
            read_message::<_, Request>(&mut reader).unwrap(),
            Some(Request::BuildSuite)
        ));
        assert!(read_message::<_, Request>(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let mut reader = Cursor::new(b"\n\n{\"type\":\"run\"}\n".to_vec());
        assert!(matches!(
            read_message::<_, Request>(&mut reader).unwrap(),
            Some(Request::Run)
        ));
    }

    #[test]
    fn test_malformed_message_is_an_error() {
        let mut reader = Cursor::new(b"{not json}\n".to_vec());
        assert!(read_message::<_, Request>(&mut reader).is_err());
    }

    #[test]
    fn test_eof_yields_none() {
        let mut reader = Cursor::new(Vec::new());
        assert!(read_message::<_, Response>(&mut reader).unwrap().is_none());
    }
}
