//! ManimRenderer - runs the Manim CLI as an opaque subprocess.
//!
//! Layout per request:
//! - `<work_dir>/<request_id>/scene.py`: the script as rendered
//! - `<work_dir>/<request_id>/media/...`: engine output tree
//! - `<media_dir>/<request_id>.mp4`: the finished video, moved out of the tree
//!
//! The work directory is removed after every invocation, success or not.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::{RenderConfig, RenderQuality};
use crate::domain::{RequestId, declares_scene};
use crate::ports::{RenderOutput, SceneRenderer};

/// Engine output kept in an error message (tail end, where tracebacks finish).
const MAX_ERROR_CHARS: usize = 4000;

pub struct ManimRenderer {
    program: String,
    launcher_args: Vec<String>,
    quality: RenderQuality,
    media_dir: PathBuf,
    work_dir: PathBuf,
}

impl ManimRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            program: config.binary.clone(),
            launcher_args: Vec::new(),
            quality: config.quality,
            media_dir: config.media_dir.clone(),
            work_dir: config.work_dir.clone(),
        }
    }

    /// Run the engine through a launcher, e.g. `python -m manim` or `sh wrapper.sh`.
    pub fn with_launcher(
        mut self,
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.program = program.into();
        self.launcher_args = args.into_iter().map(Into::into).collect();
        self
    }

    async fn render_in(
        &self,
        job_dir: &Path,
        script: &str,
        scene: &str,
        request_id: RequestId,
    ) -> Result<PathBuf, String> {
        tokio::fs::create_dir_all(job_dir)
            .await
            .map_err(|e| format!("failed to create work directory {}: {e}", job_dir.display()))?;

        let script_path = job_dir.join("scene.py");
        tokio::fs::write(&script_path, script)
            .await
            .map_err(|e| format!("failed to write script {}: {e}", script_path.display()))?;

        let engine_media = job_dir.join("media");
        let output_name = request_id.to_string();

        let output = Command::new(&self.program)
            .args(&self.launcher_args)
            .arg(self.quality.flag())
            .arg("--media_dir")
            .arg(&engine_media)
            .arg("-o")
            .arg(&output_name)
            .arg(&script_path)
            .arg(scene)
            .current_dir(job_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("failed to launch render engine '{}': {e}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(format!(
                "render engine exited with {}:\n{}",
                output.status,
                tail(detail.trim(), MAX_ERROR_CHARS)
            ));
        }

        let produced = find_video(&engine_media, &output_name)
            .await
            .ok_or_else(|| "render engine succeeded but produced no .mp4 file".to_string())?;

        tokio::fs::create_dir_all(&self.media_dir)
            .await
            .map_err(|e| format!("failed to create media directory: {e}"))?;
        let target = self.media_dir.join(format!("{output_name}.mp4"));
        move_file(&produced, &target)
            .await
            .map_err(|e| format!("failed to move video into media directory: {e}"))?;
        Ok(target)
    }
}

#[async_trait]
impl SceneRenderer for ManimRenderer {
    async fn render(&self, script: &str, scene: &str, request_id: RequestId) -> RenderOutput {
        let failed = |error: String| RenderOutput::Failed {
            error,
            script_used: script.to_string(),
        };

        if !declares_scene(script, scene) {
            return failed(format!(
                "Scene class '{scene}' not found in script. Define `class {scene}(Scene):` with a construct method."
            ));
        }

        let job_dir = self.work_dir.join(request_id.to_string());
        let result = self.render_in(&job_dir, script, scene, request_id).await;

        if let Err(e) = tokio::fs::remove_dir_all(&job_dir).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(request_id = %request_id, "failed to clean work directory: {e}");
        }

        match result {
            Ok(video) => RenderOutput::Rendered {
                video,
                script_used: script.to_string(),
            },
            Err(error) => failed(error),
        }
    }
}

/// Last `max` characters of `s`, on a char boundary.
fn tail(s: &str, max: usize) -> &str {
    let count = s.chars().count();
    if count <= max {
        return s;
    }
    let skip = count - max;
    match s.char_indices().nth(skip) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// Prefer `<name>.mp4`; otherwise any mp4 outside `partial_movie_files`.
async fn find_video(root: &Path, name: &str) -> Option<PathBuf> {
    let wanted = format!("{name}.mp4");
    let mut fallback = None;
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if file_type.is_dir() {
                if entry.file_name() != "partial_movie_files" {
                    stack.push(path);
                }
            } else if entry.file_name().to_string_lossy() == wanted {
                return Some(path);
            } else if fallback.is_none() && path.extension().is_some_and(|ext| ext == "mp4") {
                fallback = Some(path);
            }
        }
    }
    fallback
}

/// `rename`, falling back to copy + remove across filesystems.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await
}
