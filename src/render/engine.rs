use crate::error::StudioError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Staging-order input table entry. Looped inputs are short footage repeated
/// until trimmed by the graph.
#[derive(Debug, Clone)]
pub struct EngineInput {
    pub path: PathBuf,
    pub looped: bool,
}

/// One composition run over staged inputs, lowered from the filter graph.
#[derive(Debug, Clone)]
pub struct ComposeJob {
    pub inputs: Vec<EngineInput>,
    pub filter_complex: String,
    pub video_out: String,
    pub audio_out: String,
    pub expected_duration: f64,
    pub output_name: String,
}

/// External compositing engine: executes a declarative composition over
/// input media, emitting one output file with progress reporting.
#[async_trait]
pub trait CompositingEngine: Send + Sync {
    async fn compose(
        &self,
        job: &ComposeJob,
        workspace: &Path,
        progress: &(dyn Fn(f32) + Send + Sync),
    ) -> Result<PathBuf, StudioError>;
}

pub struct FfmpegEngine;

impl FfmpegEngine {
    fn build_args(job: &ComposeJob, out_path: &Path) -> Vec<String> {
        let mut args: Vec<String> = [
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostats",
            "-progress",
            "pipe:1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        for input in &job.inputs {
            if input.looped {
                args.push("-stream_loop".to_string());
                args.push("-1".to_string());
            }
            args.push("-i".to_string());
            args.push(input.path.display().to_string());
        }

        args.extend([
            "-filter_complex".to_string(),
            job.filter_complex.clone(),
            "-map".to_string(),
            format!("[{}]", job.video_out),
            "-map".to_string(),
            format!("[{}]", job.audio_out),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-preset".to_string(),
            "veryfast".to_string(),
            "-crf".to_string(),
            "22".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "192k".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            out_path.display().to_string(),
        ]);
        args
    }
}

#[async_trait]
impl CompositingEngine for FfmpegEngine {
    async fn compose(
        &self,
        job: &ComposeJob,
        workspace: &Path,
        progress: &(dyn Fn(f32) + Send + Sync),
    ) -> Result<PathBuf, StudioError> {
        let out_path = workspace.join(&job.output_name);
        let args = Self::build_args(job, &out_path);

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| StudioError::Composition(format!("failed to launch ffmpeg: {err}")))?;

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut collected = String::new();
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    collected.push_str(&line);
                    collected.push('\n');
                }
            }
            collected
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                // -progress emits key=value lines; out_time_us tracks the
                // mux clock.
                if let Some(value) = line.strip_prefix("out_time_us=") {
                    if let Ok(us) = value.trim().parse::<f64>() {
                        if job.expected_duration > 0.0 {
                            let frac = (us / 1e6 / job.expected_duration).clamp(0.0, 1.0);
                            progress(frac as f32);
                        }
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|err| StudioError::Composition(format!("ffmpeg wait failed: {err}")))?;
        let errlog = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let snippet: String = errlog.chars().take(800).collect();
            return Err(StudioError::Composition(format!(
                "ffmpeg exited with {status}: {}",
                snippet.trim()
            )));
        }
        if !out_path.exists() {
            return Err(StudioError::Composition(
                "engine produced no output file".into(),
            ));
        }

        Ok(out_path)
    }
}
