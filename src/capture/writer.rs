//! Durable destinations for capture lines.
//!
//! [`CaptureWriter`] is the seam between the sink worker and storage.
//! [`RollingFileWriter`] is the production implementation: an append-only
//! file rotated by size, with rotated siblings pruned by age.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait CaptureWriter: Send {
    /// Where lines end up, for operational log messages.
    fn describe(&self) -> String;

    /// Append one complete line (terminator included). Lines are never split.
    async fn write_line(&mut self, line: &[u8]) -> std::io::Result<()>;

    async fn flush(&mut self) -> std::io::Result<()>;
}

pub struct RollingFileWriter {
    path: PathBuf,
    file: Option<File>,
    written: u64,
    max_bytes: u64,
    retention: Duration,
}

impl RollingFileWriter {
    /// Open (or create) the active file, creating parent directories and
    /// pruning expired rotations left over from earlier runs.
    pub async fn open(
        path: impl Into<PathBuf>,
        max_bytes: u64,
        retention: Duration,
    ) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let file = open_append(&path).await?;
        let written = file.metadata().await?.len();

        let writer = Self {
            path,
            file: Some(file),
            written,
            max_bytes,
            retention,
        };
        writer.prune().await;
        Ok(writer)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reset the size counter from the file on disk. Keeps the old count
    /// if the file cannot be inspected.
    async fn resync(&mut self) {
        match fs::metadata(&self.path).await {
            Ok(meta) => self.written = meta.len(),
            Err(e) => {
                tracing::warn!(file = %self.path.display(), error = %e, "cannot read capture log size");
            }
        }
    }

    async fn rotate(&mut self) -> std::io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
        }
        let target = self.rotated_path().await;
        fs::rename(&self.path, &target).await?;
        tracing::info!(
            from = %self.path.display(),
            to = %target.display(),
            bytes = self.written,
            "capture log rotated"
        );

        self.file = Some(open_append(&self.path).await?);
        self.written = 0;
        self.prune().await;
        Ok(())
    }

    async fn rotated_path(&self) -> PathBuf {
        let (stem, ext) = self.name_parts();
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f").to_string();
        let mut n = 0u32;
        loop {
            let suffix = if n == 0 {
                stamp.clone()
            } else {
                format!("{stamp}-{n}")
            };
            let name = match ext {
                Some(ref ext) => format!("{stem}.{suffix}.{ext}"),
                None => format!("{stem}.{suffix}"),
            };
            let candidate = self.path.with_file_name(name);
            if !fs::try_exists(&candidate).await.unwrap_or(false) {
                return candidate;
            }
            n += 1;
        }
    }

    fn name_parts(&self) -> (String, Option<String>) {
        let stem = self
            .path
            .file_stem()
            .map_or_else(|| "record".into(), |s| s.to_string_lossy().into_owned());
        let ext = self
            .path
            .extension()
            .map(|e| e.to_string_lossy().into_owned());
        (stem, ext)
    }

    fn is_rotated_sibling(&self, name: &str) -> bool {
        let (stem, ext) = self.name_parts();
        let Some(rest) = name.strip_prefix(&format!("{stem}.")) else {
            return false;
        };
        let stamp = match ext {
            Some(ref ext) => rest.strip_suffix(&format!(".{ext}")),
            None => Some(rest),
        };
        stamp.is_some_and(|s| s.len() >= 15 && s.as_bytes()[..8].iter().all(u8::is_ascii_digit))
    }

    /// Delete rotated files older than the retention window. Failures are
    /// logged and skipped.
    async fn prune(&self) {
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => dir.to_path_buf(),
            None => PathBuf::from("."),
        };
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "cannot scan capture log directory");
                return;
            }
        };

        let now = SystemTime::now();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "capture log directory scan aborted");
                    break;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.is_rotated_sibling(&name) {
                continue;
            }
            let expired = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age > self.retention);
            if expired {
                match fs::remove_file(entry.path()).await {
                    Ok(()) => tracing::info!(file = %name, "expired capture log removed"),
                    Err(e) => tracing::warn!(file = %name, error = %e, "failed to remove expired capture log"),
                }
            }
        }
    }
}

async fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path).await
}

#[async_trait]
impl CaptureWriter for RollingFileWriter {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        let len = line.len() as u64;
        if self.written > 0 && self.written + len > self.max_bytes {
            self.rotate().await?;
        }
        if self.file.is_none() {
            // A failed rotation leaves no active file; try again on the next record.
            self.file = Some(open_append(&self.path).await?);
            self.written = fs::metadata(&self.path).await?.len();
        }
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.write_all(line).await {
                // Part of the line may have landed; count what the file holds.
                self.resync().await;
                return Err(e);
            }
        }
        self.written += len;
        Ok(())
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn lines_in(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .await
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    async fn siblings(dir: &Path) -> Vec<String> {
        let mut out = Vec::new();
        let mut entries = fs::read_dir(dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            out.push(entry.file_name().to_string_lossy().into_owned());
        }
        out.sort();
        out
    }

    #[tokio::test]
    async fn creates_parent_dirs_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/logs/record.log");
        let mut writer = RollingFileWriter::open(&path, 1024, Duration::from_secs(60))
            .await
            .unwrap();
        writer.write_line(b"{\"a\":1}\n").await.unwrap();
        writer.write_line(b"{\"a\":2}\n").await.unwrap();
        writer.flush().await.unwrap();

        assert_eq!(lines_in(&path).await, ["{\"a\":1}", "{\"a\":2}"]);
    }

    #[tokio::test]
    async fn resync_counts_bytes_written_outside_the_counter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.log");
        let mut writer = RollingFileWriter::open(&path, 1024, Duration::from_secs(60))
            .await
            .unwrap();
        writer.write_line(b"0123456789\n").await.unwrap();
        writer.flush().await.unwrap();

        // Stand-in for the partial line a failed write leaves behind.
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut f| std::io::Write::write_all(&mut f, b"abcde"))
            .unwrap();
        assert_eq!(writer.written, 11);

        writer.resync().await;
        assert_eq!(writer.written, 16);
    }

    #[tokio::test]
    async fn rotates_when_size_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.log");
        let mut writer = RollingFileWriter::open(&path, 20, Duration::from_secs(3600))
            .await
            .unwrap();

        writer.write_line(b"0123456789\n").await.unwrap();
        writer.write_line(b"abcdefghij\n").await.unwrap();
        writer.flush().await.unwrap();

        let names = siblings(dir.path()).await;
        assert_eq!(names.len(), 2, "{names:?}");
        assert!(names.contains(&"record.log".to_string()));
        let rotated = names.iter().find(|n| *n != "record.log").unwrap();
        assert!(rotated.starts_with("record.") && rotated.ends_with(".log"));

        assert_eq!(lines_in(&path).await, ["abcdefghij"]);
        assert_eq!(lines_in(&dir.path().join(rotated)).await, ["0123456789"]);
    }

    #[tokio::test]
    async fn oversized_line_is_written_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.log");
        let mut writer = RollingFileWriter::open(&path, 4, Duration::from_secs(3600))
            .await
            .unwrap();
        writer.write_line(b"far too long for the limit\n").await.unwrap();
        writer.flush().await.unwrap();

        assert_eq!(lines_in(&path).await, ["far too long for the limit"]);
        assert_eq!(siblings(dir.path()).await, ["record.log"]);
    }

    #[tokio::test]
    async fn prunes_expired_rotations_only() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("record.20200101T000000.000.log");
        let unrelated = dir.path().join("other.20200101T000000.000.log");
        fs::write(&old, b"old\n").await.unwrap();
        fs::write(&unrelated, b"keep\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let path = dir.path().join("record.log");
        let _writer = RollingFileWriter::open(&path, 1024, Duration::from_millis(1))
            .await
            .unwrap();

        let names = siblings(dir.path()).await;
        assert!(!names.contains(&"record.20200101T000000.000.log".to_string()));
        assert!(names.contains(&"other.20200101T000000.000.log".to_string()));
        assert!(names.contains(&"record.log".to_string()));
    }

    #[test]
    fn rotated_sibling_detection() {
        let writer = RollingFileWriter {
            path: PathBuf::from("logs/record.log"),
            file: None,
            written: 0,
            max_bytes: 1,
            retention: Duration::ZERO,
        };
        assert!(writer.is_rotated_sibling("record.20240102T030405.678.log"));
        assert!(writer.is_rotated_sibling("record.20240102T030405.678-1.log"));
        assert!(!writer.is_rotated_sibling("record.log"));
        assert!(!writer.is_rotated_sibling("record.backup.log"));
        assert!(!writer.is_rotated_sibling("other.20240102T030405.678.log"));
    }
}
