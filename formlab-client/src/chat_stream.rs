//! Streaming chat consumer.
//!
//! [`ChatStream`] is a finite, cancellable stream of [`StreamEvent`]s decoded
//! from one NDJSON response body, in wire order. [`ChatStream::drive`] applies
//! the turn semantics on top: `error` is terminal, `done` must carry a
//! response, and a body that ends without `done` is a failure.

use crate::api_client::{FormSpec, HttpClient};
use async_stream::try_stream;
use bytes::Bytes;
use formlab_core::{
    ChatRequest, ChatResponse, FormlabResult, NdjsonDecoder, StreamError, StreamEvent,
    DEFAULT_STREAM_ERROR,
};
use futures_util::stream::{AbortHandle, Abortable, BoxStream};
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Callbacks for one chat turn. Every method defaults to a no-op.
pub trait ChatHandler {
    fn on_start(&mut self) {}
    fn on_delta(&mut self, _content: &str) {}
    fn on_done(&mut self, _response: &ChatResponse) {}
    fn on_error(&mut self, _message: &str) {}
}

impl ChatHandler for () {}

/// Cancels a running [`ChatStream`] from anywhere.
#[derive(Debug, Clone)]
pub struct ChatCanceller {
    handle: AbortHandle,
}

impl ChatCanceller {
    /// Stop the stream. No event is delivered after this returns.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_aborted()
    }
}

type EventStream = BoxStream<'static, Result<StreamEvent, StreamError>>;

pub struct ChatStream {
    events: Abortable<EventStream>,
    handle: AbortHandle,
}

impl ChatStream {
    /// POST the turn to `path` and wrap the response body.
    pub async fn open(http: &HttpClient, path: &str, request: &ChatRequest) -> FormlabResult<Self> {
        let form = FormSpec::for_chat(request);
        let outbound = http.stream_request(path, &form)?;
        let response = http
            .execute_raw(outbound)
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "chat stream rejected");
            return Err(StreamError::HttpStatus(status.as_u16()).into());
        }
        if response.content_length() == Some(0) {
            return Err(StreamError::EmptyBody.into());
        }
        tracing::debug!(status = status.as_u16(), "chat stream opened");
        Ok(Self::from_byte_stream(response.bytes_stream()))
    }

    /// Decode an arbitrary chunked body.
    pub fn from_byte_stream<S, E>(body: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let events: EventStream = Box::pin(try_stream! {
            let mut body = Box::pin(body);
            let mut decoder = NdjsonDecoder::new();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| StreamError::Transport(e.to_string()))?;
                for event in decoder.push(&chunk) {
                    yield event;
                }
            }
            if let Some(event) = decoder.finish() {
                yield event;
            }
            if decoder.dropped_lines() > 0 {
                tracing::debug!(dropped = decoder.dropped_lines(), "chat stream had malformed lines");
            }
        });
        let (events, handle) = futures_util::stream::abortable(events);
        Self { events, handle }
    }

    pub fn canceller(&self) -> ChatCanceller {
        ChatCanceller {
            handle: self.handle.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_aborted()
    }

    /// Run the turn to completion, dispatching events to `handler` in order.
    ///
    /// Terminal failures other than cancellation also reach
    /// `handler.on_error`.
    pub async fn drive<H: ChatHandler + ?Sized>(
        mut self,
        handler: &mut H,
    ) -> Result<ChatResponse, StreamError> {
        let outcome = self.dispatch(handler).await;
        match &outcome {
            Ok(response) => {
                tracing::debug!(mode = ?response.mode, intent = ?response.intent, "chat stream finished");
            }
            Err(StreamError::Cancelled) => tracing::debug!("chat stream cancelled"),
            Err(err) => {
                tracing::warn!(error = %err, "chat stream failed");
                handler.on_error(&err.to_string());
            }
        }
        outcome
    }

    async fn dispatch<H: ChatHandler + ?Sized>(
        &mut self,
        handler: &mut H,
    ) -> Result<ChatResponse, StreamError> {
        let mut result = None;
        while let Some(item) = self.events.next().await {
            match item? {
                StreamEvent::Start => handler.on_start(),
                StreamEvent::Delta { content } => handler.on_delta(content.as_deref().unwrap_or("")),
                StreamEvent::Error { message } => {
                    let message = message
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_STREAM_ERROR.to_string());
                    return Err(StreamError::Server(message));
                }
                StreamEvent::Done { response } => {
                    let response = response.ok_or(StreamError::MissingFinalResponse)?;
                    handler.on_done(&response);
                    // Keep reading: a later `done` replaces this one.
                    result = Some(*response);
                }
            }
        }
        if self.handle.is_aborted() {
            return Err(StreamError::Cancelled);
        }
        result.ok_or(StreamError::EndedWithoutResult)
    }
}

impl Stream for ChatStream {
    type Item = Result<StreamEvent, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}
