//! Line handling shared by every write transport.
//!
//! Stream transports (TCP, unix, unixpacket, HTTP POST bodies) feed an
//! [`AsyncRead`] to [`LineHandler::handle_stream`]; packet transports feed
//! each datagram to [`LineHandler::handle_datagram`].

use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use futures::StreamExt;
use promagg_core::Universe;
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, FramedRead};
use tracing::{debug, warn};

use crate::config::DEFAULT_MAX_LINE_LENGTH;

/// Counts of what happened to the lines of one connection, body or datagram.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineOutcome {
    /// Lines applied to the universe.
    pub accepted: usize,
    /// Lines rejected by the parser or the universe.
    pub rejected: usize,
    /// The error that stopped a strict stream, if any.
    pub error: Option<String>,
}

impl LineOutcome {
    /// Returns true if a strict stream was cut short by a bad line.
    #[must_use]
    pub const fn stopped(&self) -> bool {
        self.error.is_some()
    }
}

impl fmt::Display for LineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "accepted={} rejected={}", self.accepted, self.rejected)
    }
}

/// Applies raw lines to a shared [`Universe`].
#[derive(Debug, Clone)]
pub struct LineHandler {
    universe: Arc<Universe>,
    strict: bool,
    max_line_length: usize,
}

impl LineHandler {
    /// Create a non-strict handler with the default line limit.
    #[must_use]
    pub const fn new(universe: Arc<Universe>) -> Self {
        Self {
            universe,
            strict: false,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Stop streams at the first bad line.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the longest accepted line in bytes.
    #[must_use]
    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    /// Returns the universe lines are applied to.
    #[must_use]
    pub const fn universe(&self) -> &Arc<Universe> {
        &self.universe
    }

    /// Returns true if streams stop at the first bad line.
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    /// Reads newline-terminated lines until EOF and applies each one.
    ///
    /// Bad lines are logged and counted. In strict mode the first bad line
    /// ends the stream and is reported in [`LineOutcome::error`]. A read
    /// error ends the stream without being counted as a bad line.
    pub async fn handle_stream<R>(&self, reader: R) -> LineOutcome
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = FramedRead::new(reader, LineDecoder::new(self.max_line_length));
        let mut outcome = LineOutcome::default();

        while let Some(next) = lines.next().await {
            let result = match next {
                Ok(Frame::Line(line)) => self.apply(&line),
                Ok(Frame::TooLong) => Err(self.too_long()),
                Err(e) => {
                    debug!(error = %e, "read failed");
                    break;
                }
            };
            if let Err(error) = outcome.record(result) {
                if self.strict {
                    outcome.error = Some(error);
                    break;
                }
            }
        }

        debug!(
            accepted = outcome.accepted,
            rejected = outcome.rejected,
            strict_close = outcome.stopped(),
            "stream finished"
        );
        outcome
    }

    /// Applies every non-blank line of one datagram. Strict mode does not
    /// apply to datagrams.
    pub fn handle_datagram(&self, datagram: &[u8]) -> LineOutcome {
        let mut outcome = LineOutcome::default();
        for line in datagram
            .split(|&b| b == b'\n')
            .filter(|line| !line.trim_ascii().is_empty())
        {
            let result = if line.len() > self.max_line_length {
                Err(self.too_long())
            } else {
                self.apply(line)
            };
            // Errors are already logged; datagrams never stop early.
            let _ = outcome.record(result);
        }
        outcome
    }

    fn apply(&self, line: &[u8]) -> Result<String, String> {
        self.universe.ingest(line).map_err(|e| e.to_string())
    }

    fn too_long(&self) -> String {
        format!("line exceeds {} bytes", self.max_line_length)
    }
}

impl LineOutcome {
    fn record(&mut self, result: Result<String, String>) -> Result<(), String> {
        match result {
            Ok(name) => {
                self.accepted += 1;
                debug!(name = %name, "line accepted");
                Ok(())
            }
            Err(error) => {
                self.rejected += 1;
                warn!(error = %error, "line rejected");
                Err(error)
            }
        }
    }
}

enum Frame {
    Line(BytesMut),
    TooLong,
}

/// Splits a byte stream on `\n`.
///
/// A line longer than the limit yields one [`Frame::TooLong`] and is
/// discarded up to its newline, after which decoding resumes.
struct LineDecoder {
    max_length: usize,
    discarding: bool,
    // Bytes of `buf` already known to contain no newline.
    scanned: usize,
}

impl LineDecoder {
    const fn new(max_length: usize) -> Self {
        Self {
            max_length,
            discarding: false,
            scanned: 0,
        }
    }
}

impl Decoder for LineDecoder {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Frame>> {
        loop {
            let newline = buf[self.scanned..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|i| i + self.scanned);

            match (self.discarding, newline) {
                (true, Some(end)) => {
                    buf.advance(end + 1);
                    self.discarding = false;
                    self.scanned = 0;
                }
                (true, None) => {
                    buf.clear();
                    self.scanned = 0;
                    return Ok(None);
                }
                (false, Some(end)) => {
                    let mut line = buf.split_to(end + 1);
                    line.truncate(end);
                    self.scanned = 0;
                    if line.len() > self.max_length {
                        return Ok(Some(Frame::TooLong));
                    }
                    return Ok(Some(Frame::Line(line)));
                }
                (false, None) if buf.len() > self.max_length => {
                    buf.clear();
                    self.discarding = true;
                    self.scanned = 0;
                    return Ok(Some(Frame::TooLong));
                }
                (false, None) => {
                    self.scanned = buf.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<Frame>> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        self.scanned = 0;
        if self.discarding || buf.is_empty() {
            self.discarding = false;
            buf.clear();
            return Ok(None);
        }
        Ok(Some(Frame::Line(buf.split())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promagg_core::{MetricKind, Observation};

    fn handler() -> LineHandler {
        let universe = Universe::with_declarations([Observation::declare(
            "foo",
            MetricKind::Counter,
            "Total foos.",
        )])
        .unwrap();
        LineHandler::new(Arc::new(universe))
    }

    // ==================== Stream Tests ====================

    #[tokio::test]
    async fn test_stream_direct_writes() {
        let handler = handler().with_strict(true);
        let input = concat!(
            r#"{"name":"foo","type":"counter","help":"Total foos.","labels":{"code":"412"},"value":1}"#,
            "\n",
            r#"{"name":"foo","labels":{"code":"412"},"value":2}"#,
            "\n",
            r#"foo{code="412"} 4"#,
            "\n",
        );

        let outcome = handler.handle_stream(input.as_bytes()).await;

        assert_eq!(outcome.accepted, 3);
        assert_eq!(outcome.rejected, 0);
        assert!(!outcome.stopped());
        assert!(handler.universe().render().contains("foo{code=\"412\"} 7.000000"));
    }

    #[tokio::test]
    async fn test_stream_non_strict_continues() {
        let handler = handler();
        let input = "foo{} 1\nfoo{} A\n\nfoo{} 2";

        let outcome = handler.handle_stream(input.as_bytes()).await;

        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.rejected, 2);
        assert!(handler.universe().render().contains("foo{} 3.000000"));
    }

    #[tokio::test]
    async fn test_stream_strict_stops_at_first_bad_line() {
        let handler = handler().with_strict(true);
        let input = "foo{} 1\nfoo{code=200} 1\nfoo{} 2\n";

        let outcome = handler.handle_stream(input.as_bytes()).await;

        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.rejected, 1);
        assert!(outcome.error.as_deref().unwrap().contains("quotes"));
        assert!(handler.universe().render().contains("foo{} 1.000000"));
    }

    #[tokio::test]
    async fn test_stream_overlong_line_rejected() {
        let handler = handler().with_max_line_length(16);
        let input = format!("foo{{x=\"{}\"}} 1\nfoo{{}} 5\n", "a".repeat(64));

        let outcome = handler.handle_stream(input.as_bytes()).await;

        assert_eq!(outcome.rejected, 1);
        assert_eq!(outcome.accepted, 1);
        assert!(handler.universe().render().contains("foo{} 5.000000"));
    }

    #[tokio::test]
    async fn test_stream_overlong_unterminated_line() {
        let handler = handler().with_max_line_length(8);
        let input = format!("foo{{}} 1\n{}", "x".repeat(100));

        let outcome = handler.handle_stream(input.as_bytes()).await;

        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.rejected, 1);
    }

    #[tokio::test]
    async fn test_stream_crlf_lines() {
        let handler = handler();
        let outcome = handler.handle_stream(&b"foo{} 1\r\nfoo{} 1\r\n"[..]).await;
        assert_eq!(outcome.accepted, 2);
    }

    // ==================== Datagram Tests ====================

    #[test]
    fn test_datagram_multiple_lines() {
        let handler = handler();
        let outcome = handler.handle_datagram(b"foo{} 1\n\nfoo{} 2\n");

        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.rejected, 0);
    }

    #[test]
    fn test_datagram_ignores_strict() {
        let handler = handler().with_strict(true);
        let outcome = handler.handle_datagram(b"bad\nfoo{} 2");

        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.rejected, 1);
        assert!(!outcome.stopped());
    }

    #[test]
    fn test_outcome_display() {
        let outcome = LineOutcome {
            accepted: 3,
            rejected: 1,
            error: None,
        };
        assert_eq!(outcome.to_string(), "accepted=3 rejected=1");
    }
}
