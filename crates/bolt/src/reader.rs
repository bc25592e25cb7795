//! Supervisor side of the framing protocol.

use std::io::BufRead;

use crate::error::FramingError;

/// Reads framed worker output one batch at a time.
pub struct BatchReader<R> {
    input: R,
    delimiter: String,
    raw: Vec<u8>,
}

impl<R: BufRead> BatchReader<R> {
    pub fn new(input: R, delimiter: impl Into<String>) -> Self {
        Self { input, delimiter: delimiter.into(), raw: Vec::new() }
    }

    /// Records up to the next delimiter line. `Ok(None)` at a clean end of
    /// stream; a stream that ends mid-batch is an error.
    pub fn next_batch(&mut self) -> Result<Option<Vec<String>>, FramingError> {
        let mut batch = Vec::new();
        loop {
            self.raw.clear();
            if self.input.read_until(b'\n', &mut self.raw)? == 0 {
                return if batch.is_empty() { Ok(None) } else { Err(FramingError::Truncated(batch.len())) };
            }
            if self.raw.last() == Some(&b'\n') {
                self.raw.pop();
            }
            let line = String::from_utf8_lossy(&self.raw);
            if line == self.delimiter.as_str() {
                return Ok(Some(batch));
            }
            batch.push(line.into_owned());
        }
    }
}

impl<R: BufRead> Iterator for BatchReader<R> {
    type Item = Result<Vec<String>, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_delimiter_lines() {
        let framed = "foo\nfoo\nfoo\n---\n---\nbar\n---\n";
        let batches: Vec<Vec<String>> = BatchReader::new(framed.as_bytes(), "---").collect::<Result<_, _>>().unwrap();
        assert_eq!(batches, vec![vec!["foo", "foo", "foo"], vec![], vec!["bar"]]);
    }

    #[test]
    fn truncated_batch_is_an_error() {
        let mut reader = BatchReader::new("one\n---\ntwo\n".as_bytes(), "---");
        assert_eq!(reader.next_batch().unwrap(), Some(vec!["one".to_string()]));
        assert!(matches!(reader.next_batch(), Err(FramingError::Truncated(1))));
    }
}
