//! App - アプリケーション層
//!
//! ports を組み合わせてリクエスト処理を実装する。
//!
//! # 主要コンポーネント
//! - **RenderOrchestrator**: render → repair → render の有限ループ
//! - **RenderSupervisor**: バックグラウンドタスクの登録と同時実行数の制限
//! - **ExplanationStreamer**: 説明文の逐次送信と REQUEST_ID トレーラー
//! - **ChatService**: 入力検証 → OCR → 生成 → 描画起動 → ストリーム
//! - **VideoPoller**: 202 / 404 / 200 のポーリング応答（base64 または生バイト）
//! - **Janitor**: NoVideo とアップロードの定期掃除

pub mod chat;
pub mod janitor;
pub mod orchestrator;
pub mod poll;
pub mod streamer;
pub mod supervisor;

pub use self::chat::{
    ChatInput, ChatReply, ChatService, ChatSession, ImageUpload, InputType, fallback_prompt,
    merge_prompt,
};
pub use self::janitor::{Janitor, JanitorHandle, Sweep};
pub use self::orchestrator::RenderOrchestrator;
pub use self::poll::{VideoFile, VideoPoll, VideoPoller};
pub use self::streamer::{ExplanationStreamer, error_chunk, parse_request_id, trailer};
pub use self::supervisor::RenderSupervisor;
