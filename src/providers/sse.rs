//! Minimal server-sent events decoding: yields the `data` payload of each
//! event, in order, across arbitrary chunk boundaries.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use std::fmt::Display;

use crate::error::{Result, WorkbenchError};

pub fn data_events<S, E>(byte_stream: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin + Send + 'static,
    E: Display + Send,
{
    stream::unfold(
        (byte_stream, Vec::<u8>::new(), false),
        |(mut byte_stream, mut buffer, mut exhausted)| async move {
            loop {
                if let Some(event) = take_event(&mut buffer) {
                    match parse_data(&event) {
                        Ok(Some(data)) => return Some((Ok(data), (byte_stream, buffer, exhausted))),
                        Ok(None) => continue,
                        Err(err) => return Some((Err(err), (byte_stream, buffer, exhausted))),
                    }
                }
                if exhausted {
                    if buffer.iter().all(u8::is_ascii_whitespace) {
                        return None;
                    }
                    let rest = std::mem::take(&mut buffer);
                    return match parse_data(&rest) {
                        Ok(Some(data)) => Some((Ok(data), (byte_stream, buffer, exhausted))),
                        Ok(None) => None,
                        Err(err) => Some((Err(err), (byte_stream, buffer, exhausted))),
                    };
                }
                match byte_stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.extend(bytes.iter().copied().filter(|byte| *byte != b'\r'))
                    }
                    Some(Err(err)) => {
                        exhausted = true;
                        buffer.clear();
                        return Some((
                            Err(WorkbenchError::Http(format!("event stream failed: {err}"))),
                            (byte_stream, buffer, exhausted),
                        ));
                    }
                    None => exhausted = true,
                }
            }
        },
    )
}

fn take_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = buffer.windows(2).position(|pair| pair == b"\n\n")?;
    let event = buffer[..end].to_vec();
    buffer.drain(..end + 2);
    Some(event)
}

/// `Ok(None)` for events without data lines (comments, keep-alives).
fn parse_data(event: &[u8]) -> Result<Option<String>> {
    let text = std::str::from_utf8(event)
        .map_err(|e| WorkbenchError::Serialization(format!("invalid UTF-8 in event: {e}")))?;
    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();
    if data.is_empty() {
        Ok(None)
    } else {
        Ok(Some(data.join("\n")))
    }
}
