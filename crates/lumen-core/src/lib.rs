//! lumen-core
//!
//! Explanation + animation pipeline: generate an explanation and a Manim
//! script, stream the text, render the script in the background with
//! model-assisted repairs, and hand the video out once via polling.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, outcome, state machine, attempt, errors）
//! - **ports**: 抽象化レイヤー（ExplanationGenerator, ScriptRepairer, SceneRenderer, OutcomeStore, など）
//! - **app**: アプリケーションロジック（orchestrator, supervisor, streamer, chat, poll, janitor）
//! - **impls**: 実装（Anthropic, Manim, Tesseract, InMemoryOutcomeStore）
//! - **config**: 環境変数からの設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
