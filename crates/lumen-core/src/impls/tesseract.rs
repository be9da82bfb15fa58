//! TesseractExtractor - OCR via the `tesseract` CLI.
//!
//! Failures never propagate: an image we cannot read is simply an image
//! without text, and the prompt is built from the user's text alone.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::OcrConfig;
use crate::ports::TextExtractor;

/// Accepted upload extensions (lowercase, without the dot).
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff"];

pub fn is_supported_image(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_IMAGE_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
}

pub struct TesseractExtractor {
    program: PathBuf,
}

impl TesseractExtractor {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            program: PathBuf::from(&config.binary),
        }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl TextExtractor for TesseractExtractor {
    async fn extract_text(&self, image_path: &Path) -> Option<String> {
        let output = Command::new(&self.program)
            .arg(image_path)
            .arg("stdout")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(image = %image_path.display(), "OCR could not start: {}", e);
                return None;
            }
        };
        if !output.status.success() {
            tracing::warn!(
                image = %image_path.display(),
                status = %output.status,
                "OCR extraction failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }

        let cleaned = clean_text(&String::from_utf8_lossy(&output.stdout));
        if cleaned.is_empty() {
            None
        } else {
            tracing::debug!(chars = cleaned.len(), "OCR extracted text");
            Some(cleaned)
        }
    }
}

/// Drops OCR noise: blank lines, single characters, and short all-caps fragments.
pub fn clean_text(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let len = line.chars().count();
            !(len < 2 || (is_all_caps(line) && len < 3))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_all_caps(line: &str) -> bool {
    line.chars().any(char::is_uppercase) && !line.chars().any(char::is_lowercase)
}
