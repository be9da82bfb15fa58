//! RenderOrchestrator - render → repair → render ループ
//!
//! # フロー
//! 1. `Attempting(n)`: 台本を描画。成功なら `Succeeded`
//! 2. 失敗かつ上限未満なら `AwaitingRepair(n)`: エラーを添えて修復を依頼
//! 3. 修復成功で `Attempting(n + 1)`、修復失敗または上限到達で `Exhausted`
//! 4. 終端状態をストアに書く（`Ready(path)` または `NoVideo`）
//!
//! 遷移そのものは `RenderState::transition` が決める。ここは I/O だけ。
//! Attempts are strictly sequential: the next render starts only after the
//! previous render and its repair have finished.

use std::sync::Arc;

use crate::domain::{
    MAX_ATTEMPTS, RenderAttempt, RenderReport, RenderSignal, RenderState, RequestId, scene_name,
};
use crate::ports::{OutcomeStore, RenderOutput, SceneRenderer, ScriptRepairer};

pub struct RenderOrchestrator {
    renderer: Arc<dyn SceneRenderer>,
    repairer: Arc<dyn ScriptRepairer>,
    store: Arc<dyn OutcomeStore>,
    max_attempts: u32,
}

impl RenderOrchestrator {
    pub fn new(
        renderer: Arc<dyn SceneRenderer>,
        repairer: Arc<dyn ScriptRepairer>,
        store: Arc<dyn OutcomeStore>,
    ) -> Self {
        Self {
            renderer,
            repairer,
            store,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    pub fn store(&self) -> &Arc<dyn OutcomeStore> {
        &self.store
    }

    /// Drive one request to a terminal state and record it.
    ///
    /// Never leaves the request `Pending`: every path ends in `mark_ready`
    /// or `mark_no_video`.
    pub async fn run(&self, request_id: RequestId, script: String) -> RenderReport {
        let mut report = RenderReport::new(request_id);
        let mut state = RenderState::INITIAL;
        let mut script = script;
        let mut last_error = String::new();

        while !state.is_terminal() {
            let signal = match state {
                RenderState::Attempting(n) => {
                    let scene = scene_name(&script);
                    tracing::info!(
                        %request_id,
                        attempt = n + 1,
                        max = self.max_attempts,
                        %scene,
                        "rendering"
                    );
                    match self.renderer.render(&script, &scene, request_id).await {
                        RenderOutput::Rendered { video, script_used } => {
                            report.attempts.push(RenderAttempt::new(n, script_used));
                            report.video = Some(video);
                            RenderSignal::Rendered
                        }
                        RenderOutput::Failed { error, script_used } => {
                            tracing::warn!(
                                %request_id,
                                attempt = n + 1,
                                "render failed: {}",
                                last_line(&error)
                            );
                            let attempt = RenderAttempt::new(n, script_used.clone());
                            report.attempts.push(attempt.failed(error.clone()));
                            script = script_used;
                            last_error = error;
                            RenderSignal::RenderFailed
                        }
                    }
                }
                RenderState::AwaitingRepair(n) => {
                    report.repairs += 1;
                    match self.repairer.repair(&script, &last_error).await {
                        Ok(fixed) if !fixed.trim().is_empty() => {
                            tracing::info!(
                                %request_id,
                                attempt = n + 1,
                                "repair returned a new script"
                            );
                            script = fixed;
                            RenderSignal::Repaired
                        }
                        Ok(_) => {
                            last_error = "repair returned an empty script".to_string();
                            RenderSignal::RepairFailed
                        }
                        Err(e) => {
                            tracing::warn!(%request_id, attempt = n + 1, "repair failed: {}", e);
                            last_error = e.to_string();
                            RenderSignal::RepairFailed
                        }
                    }
                }
                RenderState::Succeeded | RenderState::Exhausted => break,
            };

            state = match state.transition_with_limit(signal, self.max_attempts) {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!(%request_id, "{}", e);
                    last_error = e.to_string();
                    RenderState::Exhausted
                }
            };
        }

        report.final_state = state;
        match (state, report.video.clone()) {
            (RenderState::Succeeded, Some(video)) => {
                tracing::info!(
                    %request_id,
                    video = %video.display(),
                    renders = report.renders(),
                    "video ready"
                );
                self.store.mark_ready(request_id, video).await;
            }
            _ => {
                tracing::info!(
                    %request_id,
                    renders = report.renders(),
                    repairs = report.repairs,
                    "no video will be produced"
                );
                report.video = None;
                report.reason = Some(last_error);
                self.store.mark_no_video(request_id).await;
            }
        }
        report
    }
}

/// Last non-blank line; tracebacks end with the actual error.
fn last_line(text: &str) -> &str {
    text.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or(text)
}
