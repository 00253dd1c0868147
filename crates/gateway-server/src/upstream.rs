//! The upstream HTTP call (between C2 and C3): sends the dialect-built
//! request body to the resolved endpoint, in both one-shot and streaming
//! form, and classifies transport/upstream failures into [`GatewayError`]
//! (§4.3, §6).

use gateway_core::wire::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};
use gateway_core::{classify_upstream_error, GatewayError, UpstreamErrorKind};
use gateway_dialect::pipeline::StreamPipeline;
use gateway_dialect::sse::Emitter;
use gateway_dialect::{prepare_request_body, Dialect, DialectMapping};
use gateway_router::RouteResult;
use gateway_tokenizer::Tokenizer;

/// The dialect this route's provider speaks, given the endpoint already
/// decided whether this is a Responses-API call.
#[must_use]
pub fn dialect_mapping(route: &RouteResult) -> DialectMapping {
    DialectMapping {
        dialect: Dialect::for_provider(&route.used_provider, route.endpoint.is_responses_api),
        zai_finish_reason_fixup: route.mapping.zai_finish_reason_fixup,
    }
}

/// Send one non-streaming request and parse the response into the
/// canonical shape, plus whether its usage figures were filled by the
/// local tokenizer fallback rather than reported by upstream.
pub async fn call_one_shot(
    http: &reqwest::Client,
    route: &RouteResult,
    request: &ChatCompletionRequest,
    tokenizer: &dyn Tokenizer,
) -> Result<(ChatCompletionResponse, bool), GatewayError> {
    let dialect = dialect_mapping(route);
    let model_name = route.mapping.model_name.as_ref();
    let body = prepare_request_body(dialect.dialect, request, model_name);

    let mut builder = http.post(&route.endpoint.url).json(&body);
    for (name, value) in gateway_router::headers::build_headers(&route.used_provider, Some(&route.key.token)) {
        builder = builder.header(name, value);
    }

    let response = builder.send().await.map_err(|err| GatewayError::UpstreamError(err.to_string()))?;
    let status = response.status();
    let text = response.text().await.map_err(|err| GatewayError::UpstreamError(err.to_string()))?;

    if !status.is_success() {
        return Err(to_gateway_error(status.as_u16(), &text));
    }

    let parsed_body: serde_json::Value = serde_json::from_str(&text).map_err(|err| GatewayError::JsonParseError(err.to_string()))?;

    Ok(gateway_dialect::parse_provider_response(
        dialect,
        &parsed_body,
        tokenizer,
        gateway_core::generate_request_id(),
        chrono::Utc::now().timestamp(),
        route.used_model.clone(),
        &request.messages,
        request.tools.as_deref(),
        gateway_dialect::openai::last_message_was_tool_result(&request.messages),
    ))
}

/// One canonical event produced while driving an upstream stream: either
/// a chunk to forward/record, or the terminal `[DONE]` marker.
pub enum StreamEvent {
    Chunk(ChatCompletionChunk),
    Done,
}

struct CollectEmitter(Vec<StreamEvent>);

impl Emitter for CollectEmitter {
    fn emit_chunk(&mut self, chunk: &ChatCompletionChunk) {
        self.0.push(StreamEvent::Chunk(chunk.clone()));
    }
    fn emit_done(&mut self) {
        self.0.push(StreamEvent::Done);
    }
}

/// Open the upstream streaming request, returning the pipeline that
/// turns its raw bytes into canonical events plus the live byte stream
/// to drive it with. Split so the handler can interleave draining the
/// byte stream with forwarding/caching/logging without this module
/// knowing about SSE wire framing or axum.
pub async fn call_streaming(
    http: &reqwest::Client,
    route: &RouteResult,
    request: &ChatCompletionRequest,
) -> Result<(StreamPipeline, reqwest::Response), GatewayError> {
    let dialect = dialect_mapping(route);
    let model_name = route.mapping.model_name.as_ref();
    let body = prepare_request_body(dialect.dialect, request, model_name);

    let mut builder = http.post(&route.endpoint.url).json(&body);
    for (name, value) in gateway_router::headers::build_headers(&route.used_provider, Some(&route.key.token)) {
        builder = builder.header(name, value);
    }

    let response = builder.send().await.map_err(|err| GatewayError::UpstreamError(err.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(to_gateway_error(status.as_u16(), &text));
    }

    let pipeline = StreamPipeline::new(dialect, request.messages.clone(), request.tools.clone());
    Ok((pipeline, response))
}

/// Feed one chunk of upstream bytes into `pipeline`, returning the
/// canonical events it produced.
pub fn feed(pipeline: &mut StreamPipeline, bytes: &[u8], tokenizer: &dyn Tokenizer) -> Vec<StreamEvent> {
    let mut emitter = CollectEmitter(Vec::new());
    pipeline.push(bytes, tokenizer, &mut emitter);
    emitter.0
}

/// Force `pipeline`'s end-of-stream synthesis and terminal `[DONE]` when
/// the upstream byte stream ended without the pipeline ever reaching
/// [`StreamPipeline::is_terminal`] on its own. A no-op if it already
/// has.
pub fn finish_stream(pipeline: &mut StreamPipeline, tokenizer: &dyn Tokenizer) -> Vec<StreamEvent> {
    let mut emitter = CollectEmitter(Vec::new());
    pipeline.finish_stream(tokenizer, &mut emitter);
    emitter.0
}

/// Map an upstream HTTP failure onto the gateway's own error taxonomy,
/// mirroring `getFinishReasonForError`'s bucket names: `ClientError`
/// passes the provider's body through verbatim, `UpstreamError` and the
/// residual `GatewayError` bucket both become gateway-side 500s (the
/// provider's body still gets attached to `GatewayError::UpstreamError`
/// for diagnostics, but isn't rendered to the caller).
fn to_gateway_error(status: u16, body: &str) -> GatewayError {
    match classify_upstream_error(status, body) {
        UpstreamErrorKind::ClientError => {
            let parsed = serde_json::from_str(body).unwrap_or_else(|_| serde_json::json!({"error": {"message": body}}));
            GatewayError::ClientError { status, body: parsed }
        }
        UpstreamErrorKind::UpstreamError => GatewayError::UpstreamError(format!("upstream returned {status}: {body}")),
        UpstreamErrorKind::GatewayError => GatewayError::Internal(format!("upstream returned {status}: {body}")),
    }
}
