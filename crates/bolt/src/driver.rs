//! One line in, one framed batch out.
//!
//! For every input line the driver hands the line to a [`Transform`], buffers
//! whatever it yields, then writes the records followed by the delimiter and
//! flushes. The delimiter is written for every line, including lines that
//! yield nothing, so the supervisor can tell "no output" from "no output yet".

use std::borrow::Cow;
use std::io::{BufRead, Write};

use metrics::counter;
use tracing::{trace, warn};

use crate::error::FramingError;

/// Yields zero or more records for one input line. Implementations contain
/// their own failures; the driver does not catch anything on their behalf.
pub trait Transform {
    fn transform(&mut self, line: &str, emit: &mut dyn FnMut(String));
}

impl<F> Transform for F
where
    F: FnMut(&str, &mut dyn FnMut(String)),
{
    fn transform(&mut self, line: &str, emit: &mut dyn FnMut(String)) {
        self(line, emit)
    }
}

pub struct BoltDriver<T> {
    transform: T,
    delimiter: String,
    buffer: Vec<String>,
    lossy_lines: u64,
}

impl<T: Transform> BoltDriver<T> {
    pub fn new(transform: T, delimiter: impl Into<String>) -> Self {
        Self { transform, delimiter: delimiter.into(), buffer: Vec::new(), lossy_lines: 0 }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Input lines that were not valid UTF-8 and reached the transform with
    /// replacement characters.
    pub fn lossy_lines(&self) -> u64 {
        self.lossy_lines
    }

    /// Process one line (without its terminator) and write its framed batch.
    pub fn receive_line<W: Write>(&mut self, line: &str, out: &mut W) -> Result<(), FramingError> {
        counter!("bolt_lines_total", 1u64);
        let buffer = &mut self.buffer;
        self.transform.transform(line, &mut |record| buffer.push(record));
        trace!(records = self.buffer.len(), "line processed");
        self.send_batch(out)
    }

    fn send_batch<W: Write>(&mut self, out: &mut W) -> Result<(), FramingError> {
        let delimiter = self.delimiter.as_str();
        for record in self.buffer.drain(..) {
            // A record line equal to the delimiter would end the batch early.
            if record.split('\n').any(|l| l.trim_end_matches('\r') == delimiter) {
                warn!(delimiter, "dropping record that contains the batch delimiter");
                counter!("bolt_rejected_total", 1u64);
                continue;
            }
            counter!("bolt_records_total", 1u64);
            out.write_all(record.as_bytes())?;
            out.write_all(b"\n")?;
        }
        out.write_all(delimiter.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }

    /// Drive every line of `input` until end of stream. A final line without
    /// a newline is still processed. Returns the number of lines handled.
    pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, mut out: W) -> Result<u64, FramingError> {
        let mut raw = Vec::new();
        let mut lines = 0u64;
        loop {
            raw.clear();
            if input.read_until(b'\n', &mut raw)? == 0 {
                break;
            }
            if raw.last() == Some(&b'\n') {
                raw.pop();
            }
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            lines += 1;
            let line = String::from_utf8_lossy(&raw);
            if let Cow::Owned(_) = line {
                self.lossy_lines += 1;
                counter!("bolt_lossy_lines_total", 1u64);
                warn!(line = lines, bytes = raw.len(), "input line is not valid UTF-8; invalid bytes replaced with U+FFFD");
            }
            self.receive_line(&line, &mut out)?;
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(line: &str, emit: &mut dyn FnMut(String)) {
        emit(line.to_string())
    }

    fn framed<T: Transform>(transform: T, delimiter: &str, input: &str) -> String {
        let mut out = Vec::new();
        BoltDriver::new(transform, delimiter).run(input.as_bytes(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn single_record_then_delimiter() {
        let mut out = Vec::new();
        BoltDriver::new(identity, "X").receive_line("one event", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "one event\nX\n");
    }

    #[test]
    fn skipped_line_still_gets_delimiter() {
        let mut out = Vec::new();
        BoltDriver::new(|_: &str, _: &mut dyn FnMut(String)| {}, "X").receive_line("", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "X\n");
    }

    #[test]
    fn many_records_one_delimiter() {
        let thrice = |line: &str, emit: &mut dyn FnMut(String)| {
            for _ in 0..3 {
                emit(line.to_string());
            }
        };
        let mut out = Vec::new();
        BoltDriver::new(thrice, "X").receive_line("foo", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "foo\nfoo\nfoo\nX\n");
    }

    #[test]
    fn each_line_framed_separately() {
        assert_eq!(framed(identity, "---", "foo\nbar\nbaz"), "foo\n---\nbar\n---\nbaz\n---\n");
        assert_eq!(framed(identity, "---", "foo\r\nbar\r\n"), "foo\n---\nbar\n---\n");
        assert_eq!(framed(identity, "---", ""), "");
    }

    #[test]
    fn delimiter_collisions_are_dropped() {
        let echo_both = |line: &str, emit: &mut dyn FnMut(String)| {
            emit(line.to_string());
            emit(format!("kept {line}"));
        };
        assert_eq!(framed(echo_both, "---", "---\n"), "kept ---\n---\n");

        let multiline = |_: &str, emit: &mut dyn FnMut(String)| emit("a\n---\nb".to_string());
        assert_eq!(framed(multiline, "---", "x\n"), "---\n");
    }

    #[test]
    fn invalid_utf8_is_replaced_and_counted() {
        let mut out = Vec::new();
        let mut driver = BoltDriver::new(identity, "---");
        let lines = driver.run(&b"ok\n\xff\xfe bad\n"[..], &mut out).unwrap();
        assert_eq!(lines, 2);
        assert_eq!(driver.lossy_lines(), 1);
        assert_eq!(String::from_utf8(out).unwrap(), "ok\n---\n\u{FFFD}\u{FFFD} bad\n---\n");
    }

    #[test]
    fn buffer_is_cleared_between_lines() {
        let mut out = Vec::new();
        let mut driver = BoltDriver::new(identity, "X");
        driver.receive_line("a", &mut out).unwrap();
        driver.receive_line("b", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a\nX\nb\nX\n");
    }
}
