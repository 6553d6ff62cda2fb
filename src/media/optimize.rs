//! External-tool image optimization stage
//!
//! Downloaded media is shrunk in place with the standard tool per format:
//! `jpegoptim` for JPEG, `pngquant` + `advdef` for PNG, `gifsicle` for GIF.
//! Tools are spawned with argv vectors; paths are arguments, never shell
//! text. A failing tool is retried with the format re-probed through
//! `file -b --mime-type`, since upload extensions lie now and then; after
//! the retry budget the original file is kept.

use crate::media::{MediaError, MediaResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::Command;
use tracing::{debug, warn};

/// Attempts per file before giving up.
const MAX_ATTEMPTS: u32 = 5;

/// Formats the optimization stage knows how to shrink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
}

impl ImageFormat {
    /// Infers the format from a filename extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Maps a probed MIME type to a format
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim() {
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            _ => None,
        }
    }
}

/// Optimizes one file, keeping the original on any persistent failure
///
/// `enqueued_len` is the file's size when the job was queued; a larger file
/// now means a wider download has replaced it and this job is stale.
pub async fn optimize_file(path: &Path, enqueued_len: u64) {
    if let Err(e) = optimize_inner(path, enqueued_len).await {
        warn!(
            "optimization of {} failed, keeping original: {}",
            path.display(),
            e
        );
    }
}

async fn optimize_inner(path: &Path, enqueued_len: u64) -> MediaResult<()> {
    let Some(mut format) = ImageFormat::from_extension(path) else {
        return Ok(());
    };

    let current_len = std::fs::metadata(path)?.len();
    if current_len > enqueued_len {
        debug!("{} grew since enqueue, skipping", path.display());
        return Ok(());
    }

    for attempt in 1..=MAX_ATTEMPTS {
        match run_optimizer(path, format).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt == MAX_ATTEMPTS => return Err(e),
            Err(e) => {
                warn!(
                    "attempt {}/{} on {} failed: {}",
                    attempt,
                    MAX_ATTEMPTS,
                    path.display(),
                    e
                );
                if let Some(probed) = probe_format(path).await {
                    if probed != format {
                        debug!("{} is actually {:?}", path.display(), probed);
                        format = probed;
                    }
                }
            }
        }
    }

    Ok(())
}

async fn run_optimizer(path: &Path, format: ImageFormat) -> MediaResult<()> {
    match format {
        ImageFormat::Jpeg => {
            let output = Command::new("jpegoptim")
                .args(["-s", "-f", "--all-normal", "-m40"])
                .arg(path)
                .output()
                .await?;
            if output.status.success() {
                Ok(())
            } else {
                Err(tool_error("jpegoptim", &output))
            }
        }
        ImageFormat::Png => {
            let (tmp_ext, tmp_path) = tmp_sibling(path, "png");
            let quant = Command::new("pngquant")
                .args(["--nofs", "--force"])
                .arg(format!("--ext={}", tmp_ext))
                .arg(path)
                .output()
                .await?;
            if !quant.status.success() {
                remove_quietly(&tmp_path);
                return Err(tool_error("pngquant", &quant));
            }

            let deflate = Command::new("advdef")
                .args(["-q", "-z", "-4", "-i", "5"])
                .arg(&tmp_path)
                .output()
                .await?;
            if !deflate.status.success() {
                remove_quietly(&tmp_path);
                return Err(tool_error("advdef", &deflate));
            }

            accept_if_smaller(path, &tmp_path)
        }
        ImageFormat::Gif => {
            let (_, tmp_path) = tmp_sibling(path, "gif");
            let output = Command::new("gifsicle")
                .args(["--colors", "64", "-O3"])
                .arg(path)
                .arg("-o")
                .arg(&tmp_path)
                .output()
                .await?;
            if !output.status.success() {
                remove_quietly(&tmp_path);
                return Err(tool_error("gifsicle", &output));
            }

            accept_if_smaller(path, &tmp_path)
        }
    }
}

fn tool_error(tool: &'static str, output: &std::process::Output) -> MediaError {
    MediaError::Tool {
        tool,
        message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

/// Builds a run-unique sibling path for a tool's output
///
/// Returns the extension string handed to `pngquant --ext` and the full
/// path it produces. Uniqueness comes from the process id and a counter, so
/// concurrent jobs never collide.
fn tmp_sibling(path: &Path, format_ext: &str) -> (String, PathBuf) {
    static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_ext = format!(".{}-{}.{}", std::process::id(), n, format_ext);

    let stem = path
        .to_string_lossy()
        .rfind('.')
        .map(|idx| path.to_string_lossy()[..idx].to_string())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());

    (tmp_ext.clone(), PathBuf::from(format!("{}{}", stem, tmp_ext)))
}

/// Replaces the original with the candidate only when strictly smaller
fn accept_if_smaller(original: &Path, candidate: &Path) -> MediaResult<()> {
    let original_len = std::fs::metadata(original)?.len();
    match std::fs::metadata(candidate) {
        Ok(meta) if meta.len() > 0 && meta.len() < original_len => {
            std::fs::rename(candidate, original)?;
            Ok(())
        }
        _ => {
            remove_quietly(candidate);
            Ok(())
        }
    }
}

fn remove_quietly(path: &Path) {
    let _ = std::fs::remove_file(path);
}

async fn probe_format(path: &Path) -> Option<ImageFormat> {
    let output = Command::new("file")
        .args(["-b", "--mime-type"])
        .arg(path)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    ImageFormat::from_mime(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ImageFormat::from_extension(Path::new("a/b/pic.JPG")),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            ImageFormat::from_extension(Path::new("pic.jpeg")),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            ImageFormat::from_extension(Path::new("pic.png")),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::from_extension(Path::new("anim.gif")),
            Some(ImageFormat::Gif)
        );
        assert_eq!(ImageFormat::from_extension(Path::new("doc.svg")), None);
        assert_eq!(ImageFormat::from_extension(Path::new("noext")), None);
    }

    #[test]
    fn test_format_from_mime() {
        assert_eq!(ImageFormat::from_mime("image/jpeg\n"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_mime("image/png"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_mime("image/gif"), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::from_mime("image/webp"), None);
    }

    #[test]
    fn test_tmp_sibling_unique_and_adjacent() {
        let path = Path::new("/cache/m/abcdef.png");
        let (ext_a, tmp_a) = tmp_sibling(path, "png");
        let (_, tmp_b) = tmp_sibling(path, "png");

        assert_ne!(tmp_a, tmp_b);
        assert!(ext_a.starts_with('.'));
        assert!(ext_a.ends_with(".png"));
        assert_eq!(tmp_a.parent(), path.parent());
        assert!(tmp_a.to_string_lossy().starts_with("/cache/m/abcdef."));
    }

    #[test]
    fn test_accept_if_smaller_takes_smaller() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("pic.png");
        let candidate = dir.path().join("pic.tmp.png");
        std::fs::write(&original, vec![0u8; 100]).unwrap();
        std::fs::write(&candidate, vec![0u8; 40]).unwrap();

        accept_if_smaller(&original, &candidate).unwrap();

        assert_eq!(std::fs::metadata(&original).unwrap().len(), 40);
        assert!(!candidate.exists());
    }

    #[test]
    fn test_accept_if_smaller_rejects_larger() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("pic.png");
        let candidate = dir.path().join("pic.tmp.png");
        std::fs::write(&original, vec![0u8; 50]).unwrap();
        std::fs::write(&candidate, vec![0u8; 90]).unwrap();

        accept_if_smaller(&original, &candidate).unwrap();

        assert_eq!(std::fs::metadata(&original).unwrap().len(), 50);
        assert!(!candidate.exists());
    }

    #[test]
    fn test_accept_if_smaller_rejects_empty() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("pic.png");
        let candidate = dir.path().join("pic.tmp.png");
        std::fs::write(&original, vec![0u8; 50]).unwrap();
        std::fs::write(&candidate, vec![]).unwrap();

        accept_if_smaller(&original, &candidate).unwrap();
        assert_eq!(std::fs::metadata(&original).unwrap().len(), 50);
    }
}
