use bytes::{Buf, BytesMut};
use thiserror::Error;

use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Chunks(#[from] ChunksError),
    #[error("event stream is not valid UTF-8")]
    InvalidPayload,
}

/// A dispatched server-sent event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event` field, if the server named the event.
    pub event: Option<String>,
    /// The `data` lines, joined with `\n`.
    pub data: String,
}

/// A type for reading server-sent events from a chunk stream.
///
/// Only the parts of the format that model APIs use are interpreted:
/// `data` and `event` fields. Comments, `id`, `retry` and unknown fields
/// are skipped. Lines may end with LF, CRLF or CR.
pub struct Sse {
    buf: BytesMut,
    chunks: Chunks,
    eof: bool,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: BytesMut::new(),
            chunks,
            eof: false,
        }
    }

    /// Reads the next event.
    ///
    /// Returns `None` when the stream ends. A trailing event that is not
    /// terminated by a blank line is discarded.
    pub async fn next_event(&mut self) -> Result<Option<SseEvent>, Error> {
        loop {
            // Drain what's buffered before pulling more data, a single
            // chunk often carries several events.
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }
            if self.eof {
                if !self.buf.is_empty() {
                    trace!("discarding {} unterminated bytes", self.buf.len());
                    self.buf.clear();
                }
                return Ok(None);
            }
            match self.chunks.next_chunk().await? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None => self.eof = true,
            }
        }
    }

    fn try_parse_event(&mut self) -> Result<Option<SseEvent>, Error> {
        while let Some((block_len, consumed)) =
            find_block_end(&self.buf, self.eof)
        {
            let block = self.buf.split_to(block_len);
            self.buf.advance(consumed - block_len);

            // Only complete blocks are decoded, so a multi-byte character
            // split across chunks has been reassembled by now.
            let Ok(block) = str::from_utf8(&block) else {
                return Err(Error::InvalidPayload);
            };
            if let Some(event) = parse_block(block) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }
}

/// Finds the first blank line in `buf`.
///
/// Returns the length of the block before the blank line, and the number
/// of bytes to consume including the blank line itself. A trailing CR only
/// ends a line once the stream has ended.
fn find_block_end(buf: &[u8], eof: bool) -> Option<(usize, usize)> {
    let mut line_start = 0;
    let mut idx = 0;
    while idx < buf.len() {
        let eol_len = match buf[idx] {
            b'\n' => 1,
            b'\r' => match buf.get(idx + 1) {
                Some(b'\n') => 2,
                Some(_) => 1,
                None if eof => 1,
                // Can't tell CR from CRLF yet.
                None => return None,
            },
            _ => {
                idx += 1;
                continue;
            }
        };
        if idx == line_start {
            return Some((line_start, idx + eol_len));
        }
        idx += eol_len;
        line_start = idx;
    }
    None
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data: Option<String> = None;

    for line in block.split(['\n', '\r']).filter(|line| !line.is_empty()) {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => {
                (field, value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        match field {
            "data" => {
                let data = data.get_or_insert_default();
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(value);
            }
            "event" => event = Some(value.to_owned()),
            _ => {}
        }
    }

    Some(SseEvent { event, data: data? })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(chunks: &[&'static [u8]]) -> Vec<SseEvent> {
        let mut sse = Sse::new(Chunks::from_static(chunks));
        let mut events = vec![];
        while let Some(event) = sse.next_event().await.unwrap() {
            events.push(event);
        }
        events
    }

    fn data(data: &str) -> SseEvent {
        SseEvent {
            event: None,
            data: data.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_normal_events() {
        let events = collect(&[b"data: hello\n\n", b"data: bye\n\n"]).await;
        assert_eq!(events, vec![data("hello"), data("bye")]);
    }

    #[tokio::test]
    async fn test_quirk_streaming() {
        let events = collect(&[b"data:", b" hello\n", b"\n"]).await;
        assert_eq!(events, vec![data("hello")]);

        let events = collect(&[b"data: one\n\ndata: two\n\nda", b"ta: three\n\n"])
            .await;
        assert_eq!(events, vec![data("one"), data("two"), data("three")]);
    }

    #[tokio::test]
    async fn test_named_events_and_crlf() {
        let events = collect(&[
            b"event: response.created\r\ndata: {}\r\n\r\n",
            b": keep-alive\r\n\r\n",
            b"event: done\r",
            b"\ndata: a\r\ndata: b\r\n\r\n",
        ])
        .await;
        assert_eq!(
            events,
            vec![
                SseEvent {
                    event: Some("response.created".to_owned()),
                    data: "{}".to_owned(),
                },
                SseEvent {
                    event: Some("done".to_owned()),
                    data: "a\nb".to_owned(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_cr_line_endings() {
        let events = collect(&[b"data: a\r\rdata: last\r\r"]).await;
        assert_eq!(events, vec![data("a"), data("last")]);

        // The CR may still be followed by LF in the next chunk.
        let events = collect(&[b"data: a\r\n\r", b"\ndata: b\r\n\r\n"]).await;
        assert_eq!(events, vec![data("a"), data("b")]);
    }

    #[tokio::test]
    async fn test_split_utf8() {
        let events = collect(&[b"data: caf\xc3", b"\xa9\n\n"]).await;
        assert_eq!(events, vec![data("café")]);
    }

    #[tokio::test]
    async fn test_unknown_fields_and_unterminated_data() {
        let events = collect(&[b"id: 7\nretry: 10\n\nxxxxxx\n\n"]).await;
        assert!(events.is_empty());

        let events = collect(&[b"data: hello\n", b"data: bye\n"]).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_data() {
        let mut sse = Sse::new(Chunks::from_static(&[b"data: \xff\xfe\n\n"]));
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);
    }
}
