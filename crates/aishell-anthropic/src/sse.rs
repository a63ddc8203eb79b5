// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-sent event decoding for streamed Messages API responses.

use std::pin::Pin;

use aishell_core::AiShellError;
use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use serde::de::DeserializeOwned;

use crate::types::{
    ApiErrorResponse, SseContentBlockDelta, SseContentBlockStart, SseContentBlockStop,
    SseMessageDelta, SseMessageStart,
};

/// One decoded event of the streaming protocol.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    MessageStart(SseMessageStart),
    ContentBlockStart(SseContentBlockStart),
    ContentBlockDelta(SseContentBlockDelta),
    ContentBlockStop(SseContentBlockStop),
    MessageDelta(SseMessageDelta),
    MessageStop,
    Ping,
    Error(ApiErrorResponse),
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, AiShellError>> + Send>>;

fn decode<T: DeserializeOwned>(
    name: &str,
    data: &str,
    wrap: fn(T) -> StreamEvent,
) -> Result<StreamEvent, AiShellError> {
    serde_json::from_str::<T>(data)
        .map(wrap)
        .map_err(|e| AiShellError::Provider {
            message: format!("malformed {name} event: {e}"),
            status: None,
            source: Some(Box::new(e)),
        })
}

/// Turns a streaming HTTP response into typed events. Event names this
/// client does not know are skipped.
pub fn parse_sse_stream(response: reqwest::Response) -> EventStream {
    let events = response.bytes_stream().eventsource();

    let mapped = events.filter_map(|result| async move {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                return Some(Err(AiShellError::provider(format!("SSE stream error: {e}"))));
            }
        };
        let data = event.data.as_str();
        let parsed = match event.event.as_str() {
            "message_start" => decode(&event.event, data, StreamEvent::MessageStart),
            "content_block_start" => decode(&event.event, data, StreamEvent::ContentBlockStart),
            "content_block_delta" => decode(&event.event, data, StreamEvent::ContentBlockDelta),
            "content_block_stop" => decode(&event.event, data, StreamEvent::ContentBlockStop),
            "message_delta" => decode(&event.event, data, StreamEvent::MessageDelta),
            "message_stop" => Ok(StreamEvent::MessageStop),
            "ping" => Ok(StreamEvent::Ping),
            "error" => decode(&event.event, data, StreamEvent::Error),
            _ => return None,
        };
        Some(parsed)
    });

    Box::pin(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SseDelta;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serve(sse_text: &str) -> reqwest::Response {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_text.to_string()),
            )
            .mount(&server)
            .await;
        reqwest::get(&server.uri()).await.unwrap()
    }

    #[tokio::test]
    async fn text_delta() {
        let sse = "event: content_block_delta\ndata: {\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n\n";
        let mut stream = parse_sse_stream(serve(sse).await);
        match stream.next().await.unwrap().unwrap() {
            StreamEvent::ContentBlockDelta(d) => {
                assert_eq!(d.index, 0);
                assert!(matches!(d.delta, SseDelta::TextDelta { ref text } if text == "Hello"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_event_names_are_skipped() {
        let sse = "event: something_new\ndata: {\"x\":1}\n\nevent: ping\ndata: {}\n\nevent: message_stop\ndata: {}\n\n";
        let mut stream = parse_sse_stream(serve(sse).await);
        assert!(matches!(stream.next().await.unwrap().unwrap(), StreamEvent::Ping));
        assert!(matches!(
            stream.next().await.unwrap().unwrap(),
            StreamEvent::MessageStop
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn error_event_is_typed() {
        let sse = "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n";
        let mut stream = parse_sse_stream(serve(sse).await);
        match stream.next().await.unwrap().unwrap() {
            StreamEvent::Error(e) => assert_eq!(e.error.type_, "overloaded_error"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_payload_is_an_error_item() {
        let sse = "event: message_delta\ndata: {not json}\n\n";
        let mut stream = parse_sse_stream(serve(sse).await);
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("malformed message_delta"));
    }
}
