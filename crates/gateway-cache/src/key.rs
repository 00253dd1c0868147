//! Cache key derivation (§4.4): a normalised fingerprint of the
//! request fields that determine the response deterministically.

use sha2::{Digest, Sha256};

use gateway_core::wire::{ChatCompletionRequest, ResponseFormat};

/// Compute the cache key for a request against a resolved model name.
/// Only the fields that influence the upstream response are folded in;
/// everything else (headers, caller identity, stream flag) is
/// irrelevant to whether two requests would produce the same answer.
#[must_use]
pub fn fingerprint(model: &str, request: &ChatCompletionRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update(b"\0");
    for message in &request.messages {
        hasher.update(serde_json::to_vec(message).unwrap_or_default());
        hasher.update(b"\0");
    }
    update_opt_f64(&mut hasher, request.temperature);
    update_opt_u64(&mut hasher, request.max_tokens);
    update_opt_f64(&mut hasher, request.top_p);
    update_opt_f64(&mut hasher, request.frequency_penalty);
    update_opt_f64(&mut hasher, request.presence_penalty);
    update_response_format(&mut hasher, request.response_format.as_ref());
    format!("{:x}", hasher.finalize())
}

fn update_opt_f64(hasher: &mut Sha256, value: Option<f64>) {
    match value {
        Some(v) => hasher.update(v.to_bits().to_le_bytes()),
        None => hasher.update([0xFF]),
    }
}

fn update_opt_u64(hasher: &mut Sha256, value: Option<u64>) {
    match value {
        Some(v) => hasher.update(v.to_le_bytes()),
        None => hasher.update([0xFF]),
    }
}

fn update_response_format(hasher: &mut Sha256, value: Option<&ResponseFormat>) {
    match value {
        Some(format) => hasher.update(serde_json::to_vec(format).unwrap_or_default()),
        None => hasher.update([0xFF]),
    }
}
