//! Vision language model (VLM) recognizer with streaming support.
//!
//! Sends the screenshot to an OpenAI-compatible chat endpoint and asks for a
//! verbatim transcription. Communication goes through `curl`:
//! - Streaming responses (no total timeout, activity-based timeout)
//! - Connection health checks
//! - Non-streaming fallback for servers that ignore `"stream": true`

use base64::Engine;
use std::fs;
use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::{ensure_image, OcrError, OcrLanguage, OcrResult, RecognizeRequest, Recognition, TextRecognizer};
use crate::config::{self, OcrSettings};

/// Configuration for the VLM client
#[derive(Debug, Clone)]
pub struct VlmConfig {
    /// API endpoint URL
    pub endpoint: String,
    /// Model name to use
    pub model: String,
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// Timeout for initial connection (seconds)
    pub connection_timeout: u64,
    /// Timeout for inactivity during streaming (seconds)
    pub activity_timeout: u64,
}

impl Default for VlmConfig {
    fn default() -> Self {
        Self::from_settings(&config::get().ocr)
    }
}

impl VlmConfig {
    pub fn from_settings(settings: &OcrSettings) -> Self {
        Self {
            endpoint: settings.vlm_endpoint.clone(),
            model: settings.vlm_model.clone(),
            max_tokens: settings.vlm_max_tokens,
            connection_timeout: settings.vlm_connect_timeout,
            activity_timeout: settings.vlm_activity_timeout,
        }
    }

    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::from_settings(&OcrSettings::defaults())
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn activity_timeout(mut self, seconds: u64) -> Self {
        self.activity_timeout = seconds;
        self
    }
}

/// Progress update during a streamed request
#[derive(Debug, Clone)]
pub enum VlmProgress {
    /// Connection established
    Connected,
    /// Receiving data (partial content so far)
    Receiving(String),
    /// Transcription complete
    Complete(String),
}

/// Check if a VLM endpoint is reachable (connection-only check)
pub fn check_health(endpoint: &str, timeout_secs: u64) -> OcrResult<bool> {
    let url = endpoint.trim_start_matches("http://").trim_start_matches("https://");
    let host_port = url.split('/').next().unwrap_or("127.0.0.1:8080");

    let output = Command::new("curl")
        .args([
            "-s",
            "-o", "/dev/null",
            "-w", "%{http_code}",
            "--connect-timeout", &timeout_secs.to_string(),
            "--max-time", &timeout_secs.to_string(),
            "-I",
            &format!("http://{}", host_port),
        ])
        .output()?;

    // 000 means the connection failed entirely; any status means reachable
    let code: u16 = String::from_utf8_lossy(&output.stdout).trim().parse().unwrap_or(0);
    Ok(code > 0)
}

fn build_request(config: &VlmConfig, image_data: &[u8], prompt: &str, stream: bool) -> OcrResult<String> {
    let img_base64 = base64::engine::general_purpose::STANDARD.encode(image_data);

    let mut request = serde_json::json!({
        "model": config.model,
        "messages": [{
            "role": "user",
            "content": [
                {
                    "type": "image_url",
                    "image_url": {
                        "url": format!("data:image/png;base64,{}", img_base64)
                    }
                },
                {
                    "type": "text",
                    "text": prompt
                }
            ]
        }],
        "max_tokens": config.max_tokens,
        "temperature": 0
    });
    if stream {
        request["stream"] = serde_json::Value::Bool(true);
    }

    serde_json::to_string(&request).map_err(|e| OcrError::InvalidResponse(e.to_string()))
}

/// Send an image and prompt, streaming the answer
pub fn transcribe_with_progress<F>(
    config: &VlmConfig,
    image_data: &[u8],
    prompt: &str,
    mut on_progress: F,
) -> OcrResult<String>
where
    F: FnMut(VlmProgress),
{
    let request_json = build_request(config, image_data, prompt, true)?;

    let mut child = Command::new("curl")
        .args([
            "-s",
            "-N",
            "-X", "POST",
            &config.endpoint,
            "-H", "Content-Type: application/json",
            "-d", &request_json,
            "--connect-timeout", &config.connection_timeout.to_string(),
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| OcrError::Io(std::io::Error::other("failed to capture curl stdout")))?;

    let (tx, rx) = mpsc::channel();
    let activity_timeout = Duration::from_secs(config.activity_timeout);

    thread::spawn(move || {
        let reader = BufReader::new(stdout);
        for line in reader.lines() {
            let failed = line.is_err();
            if tx.send(line).is_err() || failed {
                break;
            }
        }
    });

    on_progress(VlmProgress::Connected);

    let mut content = String::new();
    let mut last_activity = Instant::now();

    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(Ok(line)) => {
                last_activity = Instant::now();

                let Some(data) = line.strip_prefix("data: ") else { continue };
                if data == "[DONE]" {
                    break;
                }
                if let Ok(json) = serde_json::from_str::<serde_json::Value>(data) {
                    // Reasoning tokens are not part of the transcription
                    if let Some(delta) = json["choices"][0]["delta"]["content"].as_str() {
                        content.push_str(delta);
                        on_progress(VlmProgress::Receiving(content.clone()));
                    }
                }
            }
            Ok(Err(e)) => return Err(OcrError::Io(e)),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if last_activity.elapsed() > activity_timeout {
                    let _ = child.kill();
                    return Err(OcrError::ActivityTimeout(activity_timeout));
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    let status = child.wait()?;
    if !status.success() && content.is_empty() {
        return Err(OcrError::ConnectionFailed("curl process failed".to_string()));
    }

    if content.is_empty() {
        return transcribe_non_streaming(config, image_data, prompt);
    }

    on_progress(VlmProgress::Complete(content.clone()));
    Ok(content)
}

/// Fallback for APIs that don't support streaming
fn transcribe_non_streaming(config: &VlmConfig, image_data: &[u8], prompt: &str) -> OcrResult<String> {
    let request_json = build_request(config, image_data, prompt, false)?;

    let output = Command::new("curl")
        .args([
            "-s",
            "-X", "POST",
            &config.endpoint,
            "-H", "Content-Type: application/json",
            "-d", &request_json,
            "--connect-timeout", &config.connection_timeout.to_string(),
        ])
        .output()?;

    if !output.status.success() {
        return Err(OcrError::ConnectionFailed(
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }

    let response: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| OcrError::InvalidResponse(e.to_string()))?;

    response["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| OcrError::InvalidResponse("response has no message content".into()))
}

/// Build the transcription prompt for a language hint
pub fn build_ocr_prompt(language: OcrLanguage, expected: Option<&str>) -> String {
    let language_hint = match language {
        OcrLanguage::Plain => "",
        OcrLanguage::English => " The text is in English.",
        OcrLanguage::Korean => " The text is in Korean (Hangul); keep it in Korean.",
        OcrLanguage::Auto => " The text may be English, Korean, or both.",
    };
    let mut prompt = format!(
        "Transcribe all text visible in this screenshot exactly as shown.{} \
         Reply with the text only, no commentary, no quotes, no formatting.",
        language_hint
    );
    if let Some(expected) = expected {
        prompt.push_str(&format!(
            " The caller is checking for the text \"{}\"; transcribe what is actually there even if it differs.",
            expected
        ));
    }
    prompt
}

/// Strip code fences and wrapping quotes models like to add
fn clean_transcription(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(inner) = text.strip_prefix("```") {
        let inner = inner.split_once('\n').map(|(_, rest)| rest).unwrap_or(inner);
        text = inner.strip_suffix("```").unwrap_or(inner).trim();
    }
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        text = &text[1..text.len() - 1];
    }
    text.to_string()
}

/// Recognizer backed by a vision language model
#[derive(Debug, Clone)]
pub struct VlmRecognizer {
    config: VlmConfig,
}

impl VlmRecognizer {
    pub fn new(config: VlmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VlmConfig {
        &self.config
    }
}

impl TextRecognizer for VlmRecognizer {
    fn recognize(&mut self, request: &RecognizeRequest<'_>) -> OcrResult<Recognition> {
        ensure_image(request.image)?;
        let image_data = fs::read(request.image)?;
        let prompt = build_ocr_prompt(request.language, request.expected);

        let started = Instant::now();
        let raw = transcribe_with_progress(&self.config, &image_data, &prompt, |progress| {
            trace!(?progress, "vlm");
        })?;
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "vlm transcription done");

        Ok(Recognition::new(clean_transcription(&raw)))
    }

    fn name(&self) -> &str {
        "vlm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_mentions_language() {
        assert!(build_ocr_prompt(OcrLanguage::Korean, None).contains("Korean"));
        assert!(!build_ocr_prompt(OcrLanguage::Plain, None).contains("Korean"));
    }

    #[test]
    fn test_prompt_mentions_expected_text() {
        let prompt = build_ocr_prompt(OcrLanguage::English, Some("LOGIN"));
        assert!(prompt.contains("\"LOGIN\""));
    }

    #[test]
    fn test_clean_transcription() {
        assert_eq!(clean_transcription("  \"Hello\"  "), "Hello");
        assert_eq!(clean_transcription("```text\nWelcome back\n```"), "Welcome back");
        assert_eq!(clean_transcription("plain"), "plain");
        assert_eq!(clean_transcription("\""), "\"");
    }

    #[test]
    fn test_vlm_config_builder() {
        let config = VlmConfig::new("http://localhost:8080")
            .model("llava")
            .max_tokens(200)
            .activity_timeout(30);

        assert_eq!(config.endpoint, "http://localhost:8080");
        assert_eq!(config.model, "llava");
        assert_eq!(config.max_tokens, 200);
        assert_eq!(config.activity_timeout, 30);
    }

    #[test]
    fn test_request_body_shape() {
        let config = VlmConfig::new("http://localhost:8080");
        let body = build_request(&config, b"png", "read it", true).unwrap();
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["content"][1]["text"], "read it");
        assert!(json["messages"][0]["content"][0]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }
}
