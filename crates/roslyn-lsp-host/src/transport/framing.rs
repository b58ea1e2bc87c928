//! LSP header framing.
//!
//! LSP uses a simple framing protocol over stdio:
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <payload>
//! ```

use std::io::{BufRead, BufReader, BufWriter, Read, Write};

use super::error::TransportError;

/// Writes LSP-framed messages.
pub struct MessageWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> MessageWriter<W> {
    /// Wraps a raw output stream.
    pub fn new(inner: W) -> Self {
        Self {
            writer: BufWriter::new(inner),
        }
    }

    /// Sends an LSP-framed message.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if writing to the stream fails.
    pub fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
        let header = format!("Content-Length: {}\r\n\r\n", message.len());
        self.writer.write_all(header.as_bytes())?;
        self.writer.write_all(message)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Returns the wrapped stream, flushing buffered bytes.
    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(inner) => inner,
            Err(error) => panic!("failed to flush framed writer: {error}"),
        }
    }
}

/// Reads LSP-framed messages.
pub struct MessageReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> MessageReader<R> {
    /// Wraps a raw input stream.
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
        }
    }

    /// Receives an LSP-framed message, blocking until it is complete.
    ///
    /// Returns `Ok(None)` on a clean end of stream between messages.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::MissingContentLength` if no Content-Length header is found.
    /// Returns `TransportError::Io` if reading fails or the stream ends mid-message.
    pub fn receive(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let Some(content_length) = self.read_headers()? else {
            return Ok(None);
        };
        let mut content = vec![0u8; content_length];
        self.reader.read_exact(&mut content)?;
        Ok(Some(content))
    }

    /// Reads headers and extracts the Content-Length value.
    fn read_headers(&mut self) -> Result<Option<usize>, TransportError> {
        let mut content_length: Option<usize> = None;
        let mut saw_header = false;

        loop {
            let mut line = String::new();
            let bytes_read = self.reader.read_line(&mut line)?;
            if bytes_read == 0 {
                if saw_header {
                    return Err(TransportError::from(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed while reading headers",
                    )));
                }
                return Ok(None);
            }
            saw_header = true;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                // Empty line marks end of headers
                break;
            }

            if let Some(value) = trimmed.strip_prefix("Content-Length:") {
                content_length = Some(
                    value
                        .trim()
                        .parse()
                        .map_err(|_| TransportError::InvalidHeader)?,
                );
            }
            // Ignore other headers (e.g., Content-Type)
        }

        content_length
            .map(Some)
            .ok_or(TransportError::MissingContentLength)
    }
}
