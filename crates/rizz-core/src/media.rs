//! Video handling through an external `ffmpeg` binary.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use tokio::process::Command;
use tracing::debug;

use crate::{errors::Error, Result};

/// Sample one JPEG every `interval` from `video` into `out_dir`, capped at
/// `max_frames`. Returns the frame paths in playback order.
pub async fn extract_frames(
    ffmpeg: &Path,
    video: &Path,
    out_dir: &Path,
    interval: Duration,
    max_frames: usize,
) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(out_dir).await?;
    let pattern = out_dir.join("frame_%03d.jpg");

    let args = frame_args(video, &pattern, interval, max_frames);
    run_ffmpeg(ffmpeg, &args).await?;

    let mut frames = Vec::new();
    let mut rd = tokio::fs::read_dir(out_dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        let is_frame = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("frame_") && n.ends_with(".jpg"));
        if is_frame {
            frames.push(path);
        }
    }
    frames.sort();
    frames.truncate(max_frames);
    debug!(video = %video.display(), count = frames.len(), "extracted frames");
    Ok(frames)
}

/// Extract the audio track of `video` into `out` (16 kHz mono WAV).
pub async fn extract_audio(ffmpeg: &Path, video: &Path, out: &Path) -> Result<()> {
    let args = audio_args(video, out);
    run_ffmpeg(ffmpeg, &args).await
}

fn frame_args(video: &Path, pattern: &Path, interval: Duration, max_frames: usize) -> Vec<String> {
    let secs = interval.as_secs_f64().max(0.1);
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        video.display().to_string(),
        "-vf".to_string(),
        format!("fps=1/{secs}"),
        "-frames:v".to_string(),
        max_frames.max(1).to_string(),
        "-q:v".to_string(),
        "3".to_string(),
        pattern.display().to_string(),
    ]
}

fn audio_args(video: &Path, out: &Path) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        video.display().to_string(),
        "-vn".to_string(),
        "-ac".to_string(),
        "1".to_string(),
        "-ar".to_string(),
        "16000".to_string(),
        out.display().to_string(),
    ]
}

async fn run_ffmpeg(ffmpeg: &Path, args: &[String]) -> Result<()> {
    let output = Command::new(ffmpeg)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| Error::External(format!("failed to run {}: {e}", ffmpeg.display())))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let skip = stderr.chars().count().saturating_sub(300);
        let tail: String = stderr.chars().skip(skip).collect();
        return Err(Error::External(format!(
            "ffmpeg exited with {}: {tail}",
            output.status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_args_sample_at_interval() {
        let args = frame_args(
            Path::new("/tmp/in.mp4"),
            Path::new("/tmp/out/frame_%03d.jpg"),
            Duration::from_secs(2),
            8,
        );
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(args[vf + 1], "fps=1/2");
        let frames = args.iter().position(|a| a == "-frames:v").unwrap();
        assert_eq!(args[frames + 1], "8");
        assert_eq!(args.last().unwrap(), "/tmp/out/frame_%03d.jpg");
    }

    #[test]
    fn audio_args_drop_video() {
        let args = audio_args(Path::new("in.mp4"), Path::new("out.wav"));
        assert!(args.contains(&"-vn".to_string()));
        assert_eq!(args.last().unwrap(), "out.wav");
    }

    #[tokio::test]
    async fn missing_binary_is_an_external_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_audio(
            Path::new("/nonexistent/ffmpeg-binary"),
            &dir.path().join("in.mp4"),
            &dir.path().join("out.wav"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::External(msg) if msg.contains("failed to run")));
    }
}
