//! SSE parser for streaming chat completions.
//!
//! Converts a raw `reqwest` byte stream into text deltas. Handles
//! `data: [DONE]`, lines split across network chunks, and multi-byte
//! characters split across chunks.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::Stream;
use serde::Deserialize;

use super::ModelError;

#[derive(Debug, Deserialize)]
struct StreamChunkRaw {
    #[serde(default)]
    choices: Vec<StreamChoiceRaw>,
}

#[derive(Debug, Deserialize)]
struct StreamChoiceRaw {
    delta: DeltaRaw,
}

#[derive(Debug, Deserialize)]
struct DeltaRaw {
    #[serde(default)]
    content: Option<String>,
}

/// Parsed line from the provider's event stream
#[derive(Debug, PartialEq)]
enum Line {
    Delta(String),
    Done,
    Skip,
}

/// Stream adapter yielding non-empty text deltas until `[DONE]`.
pub struct ChatCompletionStream<S> {
    inner: Pin<Box<S>>,
    /// Undecoded bytes (may end in a partial UTF-8 sequence)
    pending: Vec<u8>,
    /// Decoded text not yet split into lines
    buffer: String,
    done: bool,
}

impl<S, E> ChatCompletionStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    pub fn new(byte_stream: S) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            pending: Vec::new(),
            buffer: String::new(),
            done: false,
        }
    }

    fn decode_pending(&mut self) -> Result<(), ModelError> {
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                self.buffer.push_str(text);
                self.pending.clear();
                Ok(())
            }
            Err(e) if e.error_len().is_none() => {
                // Incomplete sequence at the end: keep the tail for the next chunk
                let valid = e.valid_up_to();
                let text = std::str::from_utf8(&self.pending[..valid])
                    .map_err(|e| ModelError::Parse(format!("Invalid UTF-8 in stream: {}", e)))?;
                self.buffer.push_str(text);
                self.pending.drain(..valid);
                Ok(())
            }
            Err(e) => Err(ModelError::Parse(format!("Invalid UTF-8 in stream: {}", e))),
        }
    }
}

impl<S, E> Stream for ChatCompletionStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    type Item = Result<String, ModelError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.done {
                return Poll::Ready(None);
            }

            while let Some(line) = next_line(&mut this.buffer) {
                match parse_line(&line) {
                    Ok(Line::Delta(text)) => return Poll::Ready(Some(Ok(text))),
                    Ok(Line::Done) => {
                        this.done = true;
                        return Poll::Ready(None);
                    }
                    Ok(Line::Skip) => continue,
                    Err(e) => {
                        this.done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                }
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.pending.extend_from_slice(&bytes);
                    if let Err(e) = this.decode_pending() {
                        this.done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(ModelError::Network(e.to_string()))));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    // A final line without trailing newline
                    let rest = std::mem::take(&mut this.buffer);
                    return match parse_line(rest.trim()) {
                        Ok(Line::Delta(text)) => Poll::Ready(Some(Ok(text))),
                        Ok(_) => Poll::Ready(None),
                        Err(e) => Poll::Ready(Some(Err(e))),
                    };
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Pop the next complete line off the buffer
fn next_line(buffer: &mut String) -> Option<String> {
    let newline_pos = buffer.find('\n')?;
    let line = buffer[..newline_pos].trim().to_string();
    buffer.drain(..=newline_pos);
    Some(line)
}

fn parse_line(line: &str) -> Result<Line, ModelError> {
    // Blank lines separate events; "event:", "id:" and "retry:" carry nothing we use
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(Line::Skip);
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(Line::Done);
    }

    let raw: StreamChunkRaw = serde_json::from_str(data).map_err(|e| {
        ModelError::Parse(format!(
            "Failed to parse stream chunk: {} (data: {})",
            e,
            &data[..data.len().min(200)]
        ))
    })?;

    let delta = raw
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .unwrap_or_default();

    if delta.is_empty() {
        Ok(Line::Skip)
    } else {
        Ok(Line::Delta(delta))
    }
}
