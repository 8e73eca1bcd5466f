//! Text recognition over captured screenshots.
//!
//! The command core treats OCR as an opaque collaborator: it hands over an
//! image path, a language hint and (optionally) the text it hopes to see, and
//! gets recognized text back. Backends:
//! - [`TesseractRecognizer`] shells out to the `tesseract` CLI
//! - [`VlmRecognizer`] asks an OpenAI-compatible vision model
//! - [`ScriptedRecognizer`] replays canned answers for tests and dry runs

pub mod scripted;
pub mod tesseract;
pub mod vlm;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::config::{OcrBackendKind, OcrSettings};
use crate::state::MatchMode;

pub use scripted::{NullRecognizer, RecognizerCall, ScriptedRecognizer};
pub use tesseract::TesseractRecognizer;
pub use vlm::{VlmConfig, VlmRecognizer};

/// Result type for recognition
pub type OcrResult<T> = Result<T, OcrError>;

#[derive(Debug, Error)]
pub enum OcrError {
    /// The image to recognize does not exist
    #[error("image not found: {}", .0.display())]
    MissingImage(PathBuf),

    /// The OCR engine ran but reported failure
    #[error("OCR engine failed: {0}")]
    Engine(String),

    /// Failed to connect to the vision endpoint
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// No activity for too long during streaming
    #[error("no response for {0:?}")]
    ActivityTimeout(Duration),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Language hint for a recognition request.
///
/// Each variant has a script token that doubles as a standalone command name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrLanguage {
    /// No language hint
    #[default]
    Plain,
    English,
    Korean,
    /// Let the engine detect between English and Korean
    Auto,
}

impl OcrLanguage {
    pub const ALL: [OcrLanguage; 4] = [
        OcrLanguage::Plain,
        OcrLanguage::English,
        OcrLanguage::Korean,
        OcrLanguage::Auto,
    ];

    /// Script token for this variant
    pub fn token(&self) -> &'static str {
        match self {
            OcrLanguage::Plain => "ocr",
            OcrLanguage::English => "i2s",
            OcrLanguage::Korean => "i2skr",
            OcrLanguage::Auto => "i2sauto",
        }
    }

    /// Parse a script token, case-insensitive
    pub fn parse(token: &str) -> Option<Self> {
        let lower = token.to_lowercase();
        Self::ALL.into_iter().find(|lang| lang.token() == lower)
    }

    pub fn description(&self) -> &'static str {
        match self {
            OcrLanguage::Plain => "Extract text from the last screenshot",
            OcrLanguage::English => "Extract English text from the last screenshot",
            OcrLanguage::Korean => "Extract Korean text from the last screenshot",
            OcrLanguage::Auto => "Extract text from the last screenshot, detecting the language",
        }
    }
}

impl fmt::Display for OcrLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Everything a recognizer is told about one image
#[derive(Debug, Clone, Copy)]
pub struct RecognizeRequest<'a> {
    pub image: &'a Path,
    pub language: OcrLanguage,
    /// Text the caller is looking for; engines may stop early once it is found
    pub expected: Option<&'a str>,
    pub match_mode: MatchMode,
}

impl<'a> RecognizeRequest<'a> {
    pub fn new(image: &'a Path, language: OcrLanguage) -> Self {
        Self {
            image,
            language,
            expected: None,
            match_mode: MatchMode::default(),
        }
    }

    pub fn expecting(mut self, expected: &'a str, match_mode: MatchMode) -> Self {
        self.expected = Some(expected);
        self.match_mode = match_mode;
        self
    }

    /// True if `text` satisfies the expectation (false when there is none)
    pub fn is_satisfied_by(&self, text: &str) -> bool {
        self.expected
            .is_some_and(|expected| self.match_mode.matches(expected, text))
    }
}

/// Recognized text
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// Engine confidence in 0..=1 when reported
    pub confidence: Option<f32>,
}

impl Recognition {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
        }
    }
}

/// Text recognition backend
pub trait TextRecognizer: Send {
    fn recognize(&mut self, request: &RecognizeRequest<'_>) -> OcrResult<Recognition>;

    /// Short backend name for logs
    fn name(&self) -> &str;
}

/// Build the recognizer selected by `settings`
pub fn recognizer_from_config(settings: &OcrSettings) -> Box<dyn TextRecognizer> {
    match settings.backend {
        OcrBackendKind::Tesseract => Box::new(TesseractRecognizer::new(&settings.tesseract)),
        OcrBackendKind::Vlm => Box::new(VlmRecognizer::new(VlmConfig::from_settings(settings))),
    }
}

pub(crate) fn ensure_image(path: &Path) -> OcrResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(OcrError::MissingImage(path.to_path_buf()))
    }
}
