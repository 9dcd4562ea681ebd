//! # Test Helper Library
//!
//! Common fixtures for the integration suites: a scripted in-process
//! transport that counts calls, response body builders for both provider
//! families, and ready-made scan configurations.

#![allow(dead_code)]

use async_trait::async_trait;
use repair_scan::providers::{HttpRequest, HttpResponse, Transport, TransportError};
use repair_scan::scan_config::{ProviderAttempt, RecoveryConfig, ScanConfig, GEMINI_BASE_URL};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder = dyn Fn(usize, &HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync;

/// In-process transport answering from a script and recording every request
pub struct StubTransport {
    responder: Box<Responder>,
    calls: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
}

impl StubTransport {
    pub fn from_fn<F>(responder: F) -> Arc<Self>
    where
        F: Fn(usize, &HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// The n-th call gets the n-th scripted answer; calls beyond the script get HTTP 500
    pub fn scripted(script: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
        Self::from_fn(move |call, _| {
            script
                .get(call)
                .cloned()
                .unwrap_or_else(|| Ok(HttpResponse::new(500, "unscripted call")))
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn post_json(
        &self,
        request: HttpRequest,
        _timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = (self.responder)(call, &request);
        self.requests.lock().unwrap().push(request);
        answer
    }
}

/// Transport that never answers within any reasonable timeout
pub struct HangingTransport;

#[async_trait]
impl Transport for HangingTransport {
    async fn post_json(
        &self,
        _request: HttpRequest,
        _timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(HttpResponse::new(200, "{}"))
    }
}

/// A `generateContent` success body carrying `text`
pub fn gemini_ok(text: &str) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::new(
        200,
        serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": text }], "role": "model" } }]
        })
        .to_string(),
    ))
}

/// A `chat/completions` success body carrying `text`
pub fn chat_ok(text: &str) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::new(
        200,
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": text } }]
        })
        .to_string(),
    ))
}

pub fn status(code: u16, body: &str) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::new(code, body))
}

/// `n` inline-content attempts named `model-0`, `model-1`, ...
pub fn attempts(n: usize) -> Vec<ProviderAttempt> {
    (0..n)
        .map(|i| ProviderAttempt::inline_content(GEMINI_BASE_URL, format!("model-{}", i), None))
        .collect()
}

/// Credentialed config with `n` attempts and no inter-attempt delay
pub fn scan_config(n: usize) -> ScanConfig {
    ScanConfig {
        recovery: RecoveryConfig {
            inter_attempt_delay_ms: 0,
            ..RecoveryConfig::default()
        },
        ..ScanConfig::default()
    }
    .with_credential("test-key")
    .with_attempts(attempts(n))
}

/// JPEG magic bytes only; stub providers never decode the image
pub fn fake_image() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]
}
