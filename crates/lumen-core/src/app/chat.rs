//! ChatService - 1 リクエスト分のパイプライン
//!
//! # フロー
//! 1. 入力検証（テキストか画像のどちらかが必須）
//! 2. 画像があれば保存 → OCR → プロンプトに統合 → 画像削除
//!    （画像のみで文字が読めなければ 400）
//! 3. 生成（primary timeout）。失敗/タイムアウトなら簡易プロンプトで 1 回だけ再試行
//! 4. RequestId を発行し、台本があれば supervisor へ、なければ即 `NoVideo`
//! 5. 説明文のストリームを返す（描画の完了は待たない）
//!
//! `answer()` は 1〜4 だけを行い、説明文をそのまま返す（JSON エンドポイント用）。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::PipelineConfig;
use crate::domain::{ChatError, Generation, GenerationError, RequestId};
use crate::impls::is_supported_image;
use crate::ports::{ExplanationGenerator, IdGenerator, TextExtractor, UuidGenerator};

use super::streamer::ExplanationStreamer;
use super::supervisor::RenderSupervisor;

/// An uploaded image as received from the client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    /// Decodes a bare base64 payload or a `data:image/<type>;base64,` URL.
    ///
    /// The file name is derived from the data URL's media type, `png` when absent.
    pub fn from_base64(data: &str) -> Result<Self, ChatError> {
        let (ext, payload) = match data.trim().strip_prefix("data:") {
            Some(rest) => {
                let (meta, payload) = rest
                    .split_once(',')
                    .ok_or_else(|| ChatError::InvalidImageData("malformed data URL".into()))?;
                let media_type = meta.split(';').next().unwrap_or_default();
                let ext = match media_type.strip_prefix("image/") {
                    Some("jpeg") => "jpg",
                    Some(sub) if !sub.is_empty() => sub,
                    _ => return Err(ChatError::UnsupportedImage),
                };
                (ext.to_string(), payload)
            }
            None => ("png".to_string(), data.trim()),
        };
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| ChatError::InvalidImageData(e.to_string()))?;
        Ok(Self {
            file_name: format!("upload.{ext}"),
            bytes,
        })
    }
}

/// Which inputs a request carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    TextOnly,
    ImageOnly,
    TextAndImage,
}

#[derive(Debug, Clone, Default)]
pub struct ChatInput {
    pub text: Option<String>,
    pub image: Option<ImageUpload>,
}

impl ChatInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image: None,
        }
    }
}

/// A finished generation whose render (if any) runs in the background.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub request_id: RequestId,
    pub input_type: InputType,
    pub explanation: String,
    pub has_animation: bool,
}

/// A started chat: the id to poll with, and the explanation body.
pub struct ChatSession {
    pub request_id: RequestId,
    pub has_animation: bool,
    pub stream: ReceiverStream<String>,
}

pub fn fallback_prompt(text: &str) -> String {
    format!(
        "Please provide a clear explanation and create a simple animation that specifically demonstrates: {text}"
    )
}

pub fn merge_prompt(text: Option<&str>, ocr: Option<&str>) -> String {
    match (text, ocr) {
        (Some(text), Some(ocr)) => format!("{text}\n\nImage content: {ocr}"),
        (Some(text), None) => text.to_string(),
        (None, Some(ocr)) => ocr.to_string(),
        (None, None) => String::new(),
    }
}

pub struct ChatService {
    generator: Arc<dyn ExplanationGenerator>,
    extractor: Arc<dyn TextExtractor>,
    supervisor: Arc<RenderSupervisor>,
    ids: Arc<dyn IdGenerator>,
    streamer: ExplanationStreamer,
    upload_dir: PathBuf,
    generation_timeout: Duration,
    fallback_timeout: Duration,
}

impl ChatService {
    pub fn new(
        generator: Arc<dyn ExplanationGenerator>,
        extractor: Arc<dyn TextExtractor>,
        supervisor: Arc<RenderSupervisor>,
        upload_dir: impl Into<PathBuf>,
        pipeline: &PipelineConfig,
    ) -> Self {
        Self {
            generator,
            extractor,
            supervisor,
            ids: Arc::new(UuidGenerator),
            streamer: ExplanationStreamer::new(pipeline.stream_delay),
            upload_dir: upload_dir.into(),
            generation_timeout: pipeline.generation_timeout,
            fallback_timeout: pipeline.fallback_timeout,
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn generator(&self) -> &Arc<dyn ExplanationGenerator> {
        &self.generator
    }

    pub fn supervisor(&self) -> &Arc<RenderSupervisor> {
        &self.supervisor
    }

    pub async fn start(&self, input: ChatInput) -> Result<ChatSession, ChatError> {
        let reply = self.answer(input).await?;
        Ok(ChatSession {
            request_id: reply.request_id,
            has_animation: reply.has_animation,
            stream: self.streamer.stream(reply.explanation, reply.request_id),
        })
    }

    pub async fn answer(&self, input: ChatInput) -> Result<ChatReply, ChatError> {
        let text = input
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let image = input.image.filter(|i| !i.file_name.is_empty());

        let input_type = match (&text, &image) {
            (Some(_), Some(_)) => InputType::TextAndImage,
            (Some(_), None) => InputType::TextOnly,
            (None, Some(_)) => InputType::ImageOnly,
            (None, None) => return Err(ChatError::EmptyInput),
        };

        let ocr = match image {
            Some(image) => self
                .read_image(image)
                .await?
                .filter(|t| !t.trim().is_empty()),
            None => None,
        };
        if text.is_none() && ocr.is_none() {
            return Err(ChatError::NoImageText);
        }
        let prompt = merge_prompt(text.as_deref(), ocr.as_deref());

        let generation = self.generate(&prompt).await?;
        let request_id = self.ids.generate_request_id();

        let has_animation = match generation.script {
            Some(script) => {
                tracing::info!(
                    %request_id,
                    script_chars = script.len(),
                    "starting render pipeline"
                );
                self.supervisor.submit(request_id, script).await
            }
            None => {
                tracing::info!(%request_id, "no animation script, marking no video");
                self.supervisor.store().mark_no_video(request_id).await;
                false
            }
        };

        Ok(ChatReply {
            request_id,
            input_type,
            explanation: generation.explanation,
            has_animation,
        })
    }

    /// Primary prompt, then the simplified one. Both failing is fatal for the request.
    async fn generate(&self, prompt: &str) -> Result<Generation, ChatError> {
        let primary = with_timeout(self.generation_timeout, self.generator.generate(prompt)).await;
        let first_error = match primary {
            Ok(generation) => return Ok(generation),
            Err(e) => e,
        };
        tracing::warn!("generation failed, trying fallback prompt: {}", first_error);

        let fallback = fallback_prompt(prompt);
        match with_timeout(self.fallback_timeout, self.generator.generate_simple(&fallback)).await {
            Ok(generation) => Ok(generation),
            Err(e) => {
                tracing::error!("fallback generation failed: {}", e);
                Err(ChatError::GenerationUnavailable(first_error))
            }
        }
    }

    /// Stores the upload, runs OCR, and removes the file again.
    async fn read_image(&self, image: ImageUpload) -> Result<Option<String>, ChatError> {
        if !is_supported_image(&image.file_name) {
            return Err(ChatError::UnsupportedImage);
        }
        let path = self.save_upload(&image).await?;
        let text = self.extractor.extract_text(&path).await;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(path = %path.display(), "failed to remove upload: {}", e);
        }
        Ok(text)
    }

    async fn save_upload(&self, image: &ImageUpload) -> Result<PathBuf, ChatError> {
        let ext = Path::new(&image.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let upload_id = self.ids.generate_upload_id();
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let path = self.upload_dir.join(format!("{upload_id}.{ext}"));
        tokio::fs::write(&path, &image.bytes).await?;
        Ok(path)
    }
}

async fn with_timeout<F>(limit: Duration, fut: F) -> Result<Generation, GenerationError>
where
    F: Future<Output = Result<Generation, GenerationError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::TimedOut(limit)),
    }
}
