use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use teloxide::{net::Download, prelude::*};
use tracing::debug;

static FILE_COUNTER: AtomicUsize = AtomicUsize::new(1);

/// Unique path under `dir`, e.g. `voice_1700000000000_3.ogg`.
pub(crate) fn temp_path(dir: &Path, prefix: &str, ext: &str) -> PathBuf {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let n = FILE_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.join(format!("{prefix}_{ts}_{n}.{ext}"))
}

pub(crate) async fn download_to(bot: &Bot, file_id: &str, path: &Path) -> anyhow::Result<()> {
    let file = bot.get_file(file_id.to_string()).await?;
    let mut dst = tokio::fs::File::create(path).await?;
    bot.download_file(&file.path, &mut dst).await?;
    debug!(path = %path.display(), size = file.size, "downloaded file");
    Ok(())
}

pub(crate) async fn download_bytes(bot: &Bot, file_id: &str) -> anyhow::Result<Vec<u8>> {
    let file = bot.get_file(file_id.to_string()).await?;
    let mut buf = Vec::with_capacity(file.size as usize);
    bot.download_file(&file.path, &mut buf).await?;
    Ok(buf)
}

/// Removes the listed paths when dropped.
#[derive(Default)]
pub(crate) struct TempFiles(Vec<PathBuf>);

impl TempFiles {
    pub(crate) fn track(&mut self, path: PathBuf) -> PathBuf {
        self.0.push(path.clone());
        path
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        for path in &self.0 {
            let res = if path.is_dir() {
                std::fs::remove_dir_all(path)
            } else {
                std::fs::remove_file(path)
            };
            if let Err(e) = res {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!(path = %path.display(), error = %e, "temp cleanup failed");
                }
            }
        }
    }
}
