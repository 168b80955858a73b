use futures::StreamExt;

use super::http_client::ByteStream;
use crate::domain::{ChatStream, ProviderError, StreamChunk};

/// Re-frame a raw byte stream into complete lines and feed each one to a
/// provider-specific parser.
///
/// Server-sent events are newline-delimited but the transport chunks them
/// arbitrarily, including mid-character for multi-byte UTF-8. Bytes are
/// buffered raw and decoded only once a full line is available; incomplete
/// trailing bytes stay buffered until the next read. Transport errors pass
/// through unchanged.
pub(super) fn parse_lines<F>(bytes: ByteStream, mut parse_line: F) -> ChatStream
where
    F: FnMut(&str) -> Option<Result<StreamChunk, ProviderError>> + Send + 'static,
{
    let stream = bytes
        .scan(Vec::<u8>::new(), move |buffer, result| {
            let items: Vec<Result<StreamChunk, ProviderError>> = match result {
                Ok(chunk) => {
                    buffer.extend_from_slice(&chunk);

                    let mut items = Vec::new();
                    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                        let raw: Vec<u8> = buffer.drain(..=pos).collect();
                        let line = String::from_utf8_lossy(&raw);
                        let line = line.trim_end_matches(['\r', '\n']);
                        if let Some(item) = parse_line(line) {
                            items.push(item);
                        }
                    }
                    items
                }
                Err(e) => vec![Err(e)],
            };

            futures::future::ready(Some(futures::stream::iter(items)))
        })
        .flatten();

    Box::pin(stream)
}
