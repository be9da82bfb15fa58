//! Impls - 実装
//!
//! Port の具体実装。
//! - **InMemoryOutcomeStore**: プロセス内の相関ストア
//! - **ManimRenderer**: Manim CLI を subprocess として実行
//! - **AnthropicClient**: Messages API（生成と修復の両方）
//! - **TesseractExtractor**: tesseract CLI による OCR

pub mod anthropic;
pub mod inmem_store;
pub mod manim;
pub mod tesseract;

pub use self::anthropic::AnthropicClient;
pub use self::inmem_store::InMemoryOutcomeStore;
pub use self::manim::ManimRenderer;
pub use self::tesseract::{
    SUPPORTED_IMAGE_EXTENSIONS, TesseractExtractor, clean_text, is_supported_image,
};
