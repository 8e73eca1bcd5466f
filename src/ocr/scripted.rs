//! Recognizers that need no OCR engine.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ensure_image, OcrLanguage, OcrResult, RecognizeRequest, Recognition, TextRecognizer};

/// A recognition request as seen by [`ScriptedRecognizer`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizerCall {
    pub image: PathBuf,
    pub language: OcrLanguage,
    pub expected: Option<String>,
}

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<String>,
    last: String,
    calls: Vec<RecognizerCall>,
}

/// Recognizer that answers from a queue of canned texts.
///
/// Once the queue is drained the last reply repeats. Clones share the queue
/// and the call log, so a test can keep one handle after boxing the other.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRecognizer {
    script: Arc<Mutex<Script>>,
}

impl ScriptedRecognizer {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let replies: VecDeque<String> = replies.into_iter().map(Into::into).collect();
        Self {
            script: Arc::new(Mutex::new(Script {
                replies,
                ..Default::default()
            })),
        }
    }

    /// Always answer `text`
    pub fn always(text: impl Into<String>) -> Self {
        Self::new([text.into()])
    }

    pub fn calls(&self) -> Vec<RecognizerCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(&mut self, request: &RecognizeRequest<'_>) -> OcrResult<Recognition> {
        ensure_image(request.image)?;

        let mut script = self.lock();
        script.calls.push(RecognizerCall {
            image: request.image.to_path_buf(),
            language: request.language,
            expected: request.expected.map(str::to_string),
        });
        if let Some(next) = script.replies.pop_front() {
            script.last = next;
        }
        Ok(Recognition {
            text: script.last.clone(),
            confidence: Some(1.0),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Recognizer that finds no text at all
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRecognizer;

impl TextRecognizer for NullRecognizer {
    fn recognize(&mut self, request: &RecognizeRequest<'_>) -> OcrResult<Recognition> {
        ensure_image(request.image)?;
        Ok(Recognition::new(""))
    }

    fn name(&self) -> &str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::OcrError;
    use std::fs;

    #[test]
    fn replies_in_order_then_repeats_last() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("a.png");
        fs::write(&image, b"png").unwrap();

        let mut ocr = ScriptedRecognizer::new(["one", "two"]);
        let handle = ocr.clone();
        let request = RecognizeRequest::new(&image, OcrLanguage::English);

        let texts: Vec<String> = (0..3).map(|_| ocr.recognize(&request).unwrap().text).collect();
        assert_eq!(texts, vec!["one", "two", "two"]);
        assert_eq!(handle.call_count(), 3);
        assert_eq!(handle.calls()[0].language, OcrLanguage::English);
    }

    #[test]
    fn missing_image_is_reported() {
        let mut ocr = ScriptedRecognizer::always("x");
        let request = RecognizeRequest::new(std::path::Path::new("/nope/missing.png"), OcrLanguage::Plain);
        assert!(matches!(ocr.recognize(&request), Err(OcrError::MissingImage(_))));
        assert_eq!(ocr.call_count(), 0);
    }
}
