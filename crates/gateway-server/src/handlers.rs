//! `POST /v1/chat/completions` (§6): the one handler that drives all five
//! components end to end, in both one-shot and streaming form, with a
//! cache lookup ahead of each and a `Log` row pushed on every terminal
//! outcome.

use std::convert::Infallible;
use std::time::Instant;

use async_stream::stream;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;

use gateway_admission::auth::{authenticate, Identity};
use gateway_admission::headers::{collect_llmgateway_headers, normalize_source};
use gateway_cache::{fingerprint, CachedChunk, CachedStream, StreamMetadata};
use gateway_core::wire::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, FinishReason};
use gateway_core::GatewayError;

use crate::error_response::ApiError;
use crate::log_builder::{build_error_log, build_log, Outcome};
use crate::routing::{route_with_identity, Admitted};
use crate::state::AppState;
use crate::upstream::{self, StreamEvent};

/// `POST /v1/chat/completions`.
pub async fn chat_completions(State(state): State<AppState>, headers: HeaderMap, Json(request): Json<ChatCompletionRequest>) -> Response {
    let request_id = extract_or_generate_request_id(&headers);
    let started = Instant::now();

    let admitted = match admit(&state, &headers, &request, &request_id, started) {
        Ok(admitted) => admitted,
        Err(response) => return response,
    };

    if request.wants_stream() {
        stream_chat_completion(state, admitted, request, request_id, started).await
    } else {
        match one_shot_chat_completion(&state, &admitted, &request, &request_id, started).await {
            Ok(response) => Json(response).into_response(),
            Err(err) => ApiError(err).into_response(),
        }
    }
}

/// Run admission + routing, logging (and converting to a response) any
/// failure that happens once an [`Identity`] is known. Auth failures
/// (before an identity exists) are not logged — there is no organization/
/// project/api-key row to attach one to.
pub(crate) fn admit(state: &AppState, headers: &HeaderMap, request: &ChatCompletionRequest, request_id: &str, started: Instant) -> Result<Admitted, Response> {
    let auth_header = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    let identity = authenticate(auth_header, state.store.as_ref()).map_err(|err| ApiError(err).into_response())?;

    let llmgateway_headers = collect_llmgateway_headers(headers.iter().filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?))));
    if let Some(source) = headers.get("x-source").and_then(|v| v.to_str().ok()) {
        let _ = normalize_source(source);
    }

    route_with_identity(
        &state.store,
        state.registry,
        state.tokenizer.as_ref(),
        state.env.hosted,
        state.env.paid_mode,
        state.env.use_responses_api,
        &llmgateway_headers,
        request,
        identity.clone(),
    )
    .map_err(|err| {
        let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        let log = build_error_log(request_id.to_string(), &identity, &request.model, &err, duration_ms);
        state.queue.push(log);
        ApiError(err).into_response()
    })
}

/// Non-streaming path: cache lookup, upstream call on a miss, logging.
pub(crate) async fn one_shot_chat_completion(
    state: &AppState,
    admitted: &Admitted,
    request: &ChatCompletionRequest,
    request_id: &str,
    started: Instant,
) -> Result<ChatCompletionResponse, GatewayError> {
    let cache_key = cache_key_for(admitted, request);

    if let Some(key) = &cache_key {
        if let Some(cached) = state.cache.get_one_shot(key) {
            let outcome = outcome_from_response(&cached, true, false);
            let mut log = build_log(request_id.to_string(), &admitted.identity, &admitted.route, outcome, 0);
            zero_cost(&mut log);
            state.queue.push(log);
            return Ok(cached);
        }
    }

    let result = upstream::call_one_shot(&state.http, &admitted.route, request, state.tokenizer.as_ref()).await;
    let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

    match result {
        Ok((response, estimated)) => {
            if let Some(key) = cache_key {
                let ttl = admitted.identity.project.clamped_cache_duration();
                state.cache.put_one_shot(key, response.clone(), ttl);
            }
            let outcome = outcome_from_response(&response, false, estimated);
            let log = build_log(request_id.to_string(), &admitted.identity, &admitted.route, outcome, duration_ms);
            state.queue.push(log);
            Ok(response)
        }
        Err(err) => {
            let outcome = Outcome {
                error: Some(err.to_envelope().error),
                ..Outcome::default()
            };
            let log = build_log(request_id.to_string(), &admitted.identity, &admitted.route, outcome, duration_ms);
            state.queue.push(log);
            Err(err)
        }
    }
}

/// Only requests from caching-enabled projects for models the caller
/// didn't ask to stream participate in the cache (spec.md §4.4: caching
/// applies uniformly to one-shot and streaming requests, keyed the same
/// way, independent of the `stream` flag itself).
fn cache_key_for(admitted: &Admitted, request: &ChatCompletionRequest) -> Option<String> {
    admitted.identity.project.caching_enabled.then(|| fingerprint(&admitted.route.used_model, request))
}

fn zero_cost(log: &mut gateway_core::log::Log) {
    log.cost = 0.0;
    log.input_cost = 0.0;
    log.output_cost = 0.0;
    log.cached_input_cost = 0.0;
    log.request_cost = 0.0;
    log.duration_ms = 0;
}

/// Fold a parsed [`ChatCompletionResponse`] into the logging [`Outcome`].
/// `estimated` is whether its usage figures came from the local
/// tokenizer fallback; a cache hit always passes `false` regardless of
/// how the original request was accounted (spec.md §4.4).
fn outcome_from_response(response: &ChatCompletionResponse, cached: bool, estimated: bool) -> Outcome {
    let choice = response.choices.first();
    let content = choice.and_then(|c| c.message.content.as_ref()).map(gateway_core::wire::Content::as_text);
    let tool_results = choice
        .and_then(|c| c.message.tool_calls.as_ref())
        .map(|calls| serde_json::to_value(calls).unwrap_or(serde_json::Value::Null));

    Outcome {
        content,
        reasoning_content: choice.and_then(|c| c.message.reasoning_content.clone()),
        tool_results,
        finish_reason: choice.and_then(|c| c.finish_reason),
        prompt_tokens: response.usage.prompt_tokens,
        completion_tokens: response.usage.completion_tokens,
        reasoning_tokens: response.usage.reasoning_tokens.unwrap_or(0),
        cached_tokens: response.usage.prompt_tokens_details.and_then(|d| d.cached_tokens).unwrap_or(0),
        response_size: serde_json::to_vec(response).map(|b| i64::try_from(b.len()).unwrap_or(i64::MAX)).unwrap_or(0),
        streamed: false,
        canceled: false,
        cached,
        estimated,
        error: None,
    }
}

/// Streaming path: cache replay on a hit, otherwise drive the upstream
/// stream live, forwarding/recording/cancellation-detecting as it goes.
async fn stream_chat_completion(state: AppState, admitted: Admitted, request: ChatCompletionRequest, request_id: String, started: Instant) -> Response {
    let cache_key = cache_key_for(&admitted, &request);

    if let Some(key) = &cache_key {
        if let Some(cached) = state.cache.get_stream(key) {
            return replay_cached_stream(state, admitted, request_id, cached);
        }
    }

    build_live_stream_response(state, admitted, request, cache_key, request_id, started)
}

/// Replay a previously recorded stream's chunks verbatim, paced by the
/// original inter-chunk gaps (spec.md §4.4 "streaming cache-hit
/// behaviour").
fn replay_cached_stream(state: AppState, admitted: Admitted, request_id: String, cached: CachedStream) -> Response {
    let body = Body::from_stream(stream! {
        for (index, chunk) in cached.chunks.iter().enumerate() {
            let delay = gateway_cache::ResponseCache::replay_delay_ms(&cached.chunks, index);
            if delay > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
            yield Ok::<Bytes, Infallible>(Bytes::from(sse_frame(chunk.event.as_deref(), &chunk.data)));
        }

        let outcome = Outcome {
            finish_reason: cached.metadata.finish_reason,
            streamed: true,
            cached: true,
            ..Outcome::default()
        };
        let mut log = build_log(request_id, &admitted.identity, &admitted.route, outcome, 0);
        zero_cost(&mut log);
        state.queue.push(log);
    });

    sse_response(body)
}

/// Drive the upstream stream live: each byte chunk is fed through the
/// dialect pipeline, forwarded to the client as canonical SSE, and
/// recorded for the response cache. A [`StreamGuard`] owned by the
/// generator detects client disconnects via `Drop` and logs a
/// cancellation if the stream never reaches a terminal state.
fn build_live_stream_response(
    state: AppState,
    admitted: Admitted,
    request: ChatCompletionRequest,
    cache_key: Option<String>,
    request_id: String,
    started: Instant,
) -> Response {
    let body = Body::from_stream(stream! {
        let mut guard = StreamGuard::new(state.clone(), admitted, request_id.clone(), started);

        let (mut pipeline, response) = match upstream::call_streaming(&state.http, &guard.admitted.route, &request).await {
            Ok(pair) => pair,
            Err(err) => {
                guard.finalize_error(err);
                return;
            }
        };

        let mut upstream_bytes = response.bytes_stream();
        let mut recorded_chunks: Vec<CachedChunk> = Vec::new();

        loop {
            match upstream_bytes.next().await {
                Some(Ok(bytes)) => {
                    for event in upstream::feed(&mut pipeline, &bytes, state.tokenizer.as_ref()) {
                        match event {
                            StreamEvent::Chunk(chunk) => {
                                let frame = sse_frame(None, &serde_json::to_string(&chunk).unwrap_or_default());
                                if cache_key.is_some() {
                                    recorded_chunks.push(CachedChunk {
                                        data: serde_json::to_string(&chunk).unwrap_or_default(),
                                        event_id: None,
                                        event: None,
                                        timestamp_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                                    });
                                }
                                guard.record_chunk(&chunk);
                                yield Ok::<Bytes, Infallible>(Bytes::from(frame));
                            }
                            StreamEvent::Done => {
                                yield Ok::<Bytes, Infallible>(Bytes::from("data: [DONE]\n\n".to_string()));
                            }
                        }
                    }
                    guard.set_estimated(pipeline.usage_estimated());
                }
                Some(Err(err)) => {
                    guard.set_estimated(pipeline.usage_estimated());
                    guard.finalize_error(GatewayError::StreamingError(err.to_string()));
                    return;
                }
                None => {
                    // Upstream closed the connection without an explicit
                    // terminator (no `[DONE]`, `message_stop`,
                    // `finishReason`, or `response.completed`) — Google
                    // and the Responses API never send one at all.
                    for event in upstream::finish_stream(&mut pipeline, state.tokenizer.as_ref()) {
                        match event {
                            StreamEvent::Chunk(chunk) => {
                                let frame = sse_frame(None, &serde_json::to_string(&chunk).unwrap_or_default());
                                if cache_key.is_some() {
                                    recorded_chunks.push(CachedChunk {
                                        data: serde_json::to_string(&chunk).unwrap_or_default(),
                                        event_id: None,
                                        event: None,
                                        timestamp_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                                    });
                                }
                                guard.record_chunk(&chunk);
                                yield Ok::<Bytes, Infallible>(Bytes::from(frame));
                            }
                            StreamEvent::Done => {
                                yield Ok::<Bytes, Infallible>(Bytes::from("data: [DONE]\n\n".to_string()));
                            }
                        }
                    }
                    guard.set_estimated(pipeline.usage_estimated());
                    break;
                }
            }
        }

        if let Some(key) = cache_key {
            if pipeline.is_terminal() {
                let cached = CachedStream {
                    metadata: StreamMetadata {
                        finish_reason: guard.finish_reason,
                        total_chunks: recorded_chunks.len(),
                        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                        completed: true,
                    },
                    chunks: recorded_chunks,
                };
                let ttl = guard.admitted.identity.project.clamped_cache_duration();
                state.cache.put_stream(key, cached, ttl);
            }
        }

        guard.finalize_success(pipeline.is_terminal());
    });

    sse_response(body)
}

/// Owns the accumulated outcome of a live stream and writes the
/// terminal [`gateway_core::log::Log`] exactly once: on success, on an
/// upstream error, or — via `Drop`, if neither ran first — on
/// cancellation. This is the only mechanism that detects a client
/// disconnecting mid-stream: once the generator (and this guard with it)
/// is dropped without reaching a `finalize_*` call, the drop impl fires
/// a synchronous canceled-log write.
struct StreamGuard {
    state: AppState,
    admitted: Admitted,
    request_id: String,
    started: Instant,
    content: String,
    reasoning_content: String,
    tool_results: Option<serde_json::Value>,
    prompt_tokens: u64,
    completion_tokens: u64,
    reasoning_tokens: u64,
    cached_tokens: u64,
    finish_reason: Option<FinishReason>,
    estimated: bool,
    done: bool,
}

impl StreamGuard {
    fn new(state: AppState, admitted: Admitted, request_id: String, started: Instant) -> Self {
        Self {
            state,
            admitted,
            request_id,
            started,
            content: String::new(),
            reasoning_content: String::new(),
            tool_results: None,
            prompt_tokens: 0,
            completion_tokens: 0,
            reasoning_tokens: 0,
            cached_tokens: 0,
            finish_reason: None,
            estimated: false,
            done: false,
        }
    }

    /// Record whether the pipeline's final usage figures were filled by
    /// the local tokenizer fallback, per §3's `Log.estimatedCost`.
    fn set_estimated(&mut self, estimated: bool) {
        self.estimated = estimated;
    }

    fn record_chunk(&mut self, chunk: &ChatCompletionChunk) {
        if let Some(choice) = chunk.choices.first() {
            if let Some(content) = &choice.delta.content {
                self.content.push_str(content);
            }
            if let Some(reasoning) = &choice.delta.reasoning_content {
                self.reasoning_content.push_str(reasoning);
            }
            if let Some(tool_calls) = &choice.delta.tool_calls {
                self.tool_results = Some(serde_json::to_value(tool_calls).unwrap_or(serde_json::Value::Null));
            }
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }
        }
        if let Some(usage) = &chunk.usage {
            self.prompt_tokens = usage.prompt_tokens;
            self.completion_tokens = usage.completion_tokens;
            self.reasoning_tokens = usage.reasoning_tokens.unwrap_or(0);
            self.cached_tokens = usage.prompt_tokens_details.and_then(|d| d.cached_tokens).unwrap_or(0);
        }
    }

    fn outcome(&self, canceled: bool, error: Option<serde_json::Value>) -> Outcome {
        Outcome {
            content: (!self.content.is_empty()).then(|| self.content.clone()),
            reasoning_content: (!self.reasoning_content.is_empty()).then(|| self.reasoning_content.clone()),
            tool_results: self.tool_results.clone(),
            finish_reason: self.finish_reason,
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            reasoning_tokens: self.reasoning_tokens,
            cached_tokens: self.cached_tokens,
            response_size: i64::try_from(self.content.len()).unwrap_or(i64::MAX),
            streamed: true,
            canceled,
            cached: false,
            estimated: self.estimated,
            error,
        }
    }

    fn duration_ms(&self) -> i64 {
        i64::try_from(self.started.elapsed().as_millis()).unwrap_or(i64::MAX)
    }

    fn finalize_success(&mut self, reached_done: bool) {
        let outcome = self.outcome(!reached_done, None);
        let log = build_log(self.request_id.clone(), &self.admitted.identity, &self.admitted.route, outcome, self.duration_ms());
        self.state.queue.push(log);
        self.done = true;
    }

    fn finalize_error(&mut self, err: GatewayError) {
        let outcome = self.outcome(false, Some(err.to_envelope().error));
        let log = build_log(self.request_id.clone(), &self.admitted.identity, &self.admitted.route, outcome, self.duration_ms());
        self.state.queue.push(log);
        self.done = true;
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let outcome = self.outcome(true, None);
        let log = build_log(self.request_id.clone(), &self.admitted.identity, &self.admitted.route, outcome, self.duration_ms());
        self.state.queue.push(log);
    }
}

fn sse_frame(event: Option<&str>, data: &str) -> String {
    match event {
        Some(event) => format!("event: {event}\ndata: {data}\n\n"),
        None => format!("data: {data}\n\n"),
    }
}

fn sse_response(body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, "text/event-stream")
        .header(axum::http::header::CACHE_CONTROL, "no-cache")
        .header("x-accel-buffering", "no")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Echo an inbound `x-request-id` if present (propagated through by
/// `PropagateRequestIdLayer`); otherwise mint a fresh one.
pub(crate) fn extract_or_generate_request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(gateway_core::generate_request_id)
}
