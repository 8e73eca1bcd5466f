//! Tesseract CLI recognizer.

use std::process::{Command, Stdio};

use tracing::{debug, trace};

use super::{
    ensure_image, OcrError, OcrLanguage, OcrResult, RecognizeRequest, Recognition, TextRecognizer,
};

/// Page segmentation modes tried in order: single line, uniform block, automatic
pub const DEFAULT_PSM_MODES: [u8; 3] = [7, 6, 3];

/// Recognizer running the `tesseract` executable once per segmentation mode.
///
/// Small UI regions recognize best as a single line, larger ones as a block,
/// so several modes are tried. With an expected text the first mode whose
/// output satisfies it wins; otherwise the first non-empty output is kept.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    program: String,
    psm_modes: Vec<u8>,
}

impl TesseractRecognizer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            psm_modes: DEFAULT_PSM_MODES.to_vec(),
        }
    }

    pub fn psm_modes(mut self, modes: impl Into<Vec<u8>>) -> Self {
        let modes = modes.into();
        if !modes.is_empty() {
            self.psm_modes = modes;
        }
        self
    }

    fn run_once(&self, request: &RecognizeRequest<'_>, psm: u8) -> OcrResult<String> {
        let mut cmd = Command::new(&self.program);
        cmd.arg(request.image)
            .arg("stdout")
            .args(["--psm", &psm.to_string()]);
        if let Some(lang) = language_arg(request.language) {
            cmd.args(["-l", lang]);
        }

        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|e| OcrError::Engine(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(OcrError::Engine(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(clean_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_TESSERACT)
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&mut self, request: &RecognizeRequest<'_>) -> OcrResult<Recognition> {
        ensure_image(request.image)?;

        let mut best: Option<String> = None;
        let mut succeeded = false;
        let mut last_error = None;

        for &psm in &self.psm_modes {
            match self.run_once(request, psm) {
                Ok(text) => {
                    succeeded = true;
                    trace!(psm, %text, "tesseract pass");
                    if request.is_satisfied_by(&text) {
                        debug!(psm, "expected text found");
                        return Ok(Recognition::new(text));
                    }
                    if best.is_none() && !text.is_empty() {
                        best = Some(text);
                    }
                    // Without an expectation there is nothing to gain from more passes
                    if request.expected.is_none() && best.is_some() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(psm, error = %e, "tesseract pass failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !succeeded => Err(e),
            _ => Ok(Recognition::new(best.unwrap_or_default())),
        }
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

fn language_arg(language: OcrLanguage) -> Option<&'static str> {
    match language {
        OcrLanguage::Plain => None,
        OcrLanguage::English => Some("eng"),
        OcrLanguage::Korean => Some("kor"),
        OcrLanguage::Auto => Some("eng+kor"),
    }
}

/// Drop the form feed tesseract appends and surrounding blank lines
fn clean_output(raw: &str) -> String {
    raw.replace('\u{c}', "")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim_matches('\n')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn language_hints() {
        assert_eq!(language_arg(OcrLanguage::Plain), None);
        assert_eq!(language_arg(OcrLanguage::Korean), Some("kor"));
        assert_eq!(language_arg(OcrLanguage::Auto), Some("eng+kor"));
    }

    #[test]
    fn output_is_cleaned() {
        assert_eq!(clean_output("LOGIN  \n\n\u{c}"), "LOGIN");
        assert_eq!(clean_output("\nline one\nline two \n"), "line one\nline two");
    }

    #[test]
    fn missing_executable_is_engine_error() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("shot.png");
        std::fs::write(&image, b"not really a png").unwrap();

        let mut ocr = TesseractRecognizer::new("/definitely/not/tesseract");
        let err = ocr
            .recognize(&RecognizeRequest::new(&image, OcrLanguage::English))
            .unwrap_err();
        assert!(matches!(err, OcrError::Engine(_)));
    }

    #[test]
    fn missing_image_checked_before_running() {
        let mut ocr = TesseractRecognizer::default();
        let err = ocr
            .recognize(&RecognizeRequest::new(Path::new("/nope.png"), OcrLanguage::Plain))
            .unwrap_err();
        assert!(matches!(err, OcrError::MissingImage(_)));
    }

    #[test]
    fn empty_mode_list_keeps_defaults() {
        let ocr = TesseractRecognizer::default().psm_modes(Vec::new());
        assert_eq!(ocr.psm_modes, DEFAULT_PSM_MODES.to_vec());
    }
}
