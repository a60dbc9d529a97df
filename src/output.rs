//! Prediction output sinks.
//!
//! A sink receives one line per example (the reported prediction, plus the
//! example's tag when present). Write failures are recoverable by contract:
//! callers report them and keep processing, so a full disk or closed pipe
//! never aborts a learning run.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Line-oriented output contract for predictions and diagnostics.
pub trait OutputSink {
    /// Append one line. `tag` is appended after the text when non-empty.
    fn emit(&mut self, text: &str, tag: &str) -> io::Result<()>;
}

fn format_line(text: &str, tag: &str) -> String {
    if tag.is_empty() {
        format!("{}\n", text)
    } else {
        format!("{} {}\n", text, tag)
    }
}

/// Sink writing to stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&mut self, text: &str, tag: &str) -> io::Result<()> {
        io::stdout().write_all(format_line(text, tag).as_bytes())
    }
}

/// Buffered file sink. The buffer is flushed on drop.
#[derive(Debug)]
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }
}

impl OutputSink for FileSink {
    fn emit(&mut self, text: &str, tag: &str) -> io::Result<()> {
        self.writer.write_all(format_line(text, tag).as_bytes())
    }
}

/// In-memory sink capturing emitted lines. Used by tests and diagnostics.
#[derive(Debug, Default)]
pub struct VecSink {
    pub lines: Vec<String>,
}

impl OutputSink for VecSink {
    fn emit(&mut self, text: &str, tag: &str) -> io::Result<()> {
        let mut line = format_line(text, tag);
        line.pop();
        self.lines.push(line);
        Ok(())
    }
}

/// Sink that fails every write. Exercises the recoverable-failure path.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct FailingSink;

#[cfg(test)]
impl OutputSink for FailingSink {
    fn emit(&mut self, _text: &str, _tag: &str) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_sink_formats_tagged_lines() {
        let mut sink = VecSink::default();
        sink.emit("0.5", "ex1").unwrap();
        sink.emit("1.25", "").unwrap();
        assert_eq!(sink.lines, vec!["0.5 ex1".to_string(), "1.25".to_string()]);
    }

    #[test]
    fn test_file_sink_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preds.txt");
        {
            let mut sink = FileSink::create(&path).unwrap();
            sink.emit("0.125", "t").unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "0.125 t\n");
    }
}
