//! Packaging a finished scratch directory, and reclaiming it on every exit path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Tells blocking work that the execution it belongs to was abandoned.
///
/// Blocking threads outlive a dropped future, so they poll this between entries
/// and undo their own output once it is set.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Interrupted)` once cancelled.
    pub fn check(&self) -> io::Result<()> {
        if self.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "execution cancelled"));
        }
        Ok(())
    }
}

/// Package the full contents of `src_dir` into a zip at `dest`.
///
/// Entries are sorted and carry a fixed timestamp, so the same tree always yields
/// the same bytes. The archive is written next to `dest` and renamed into place;
/// on error or cancellation nothing is left at `dest`.
pub async fn archive_dir(src_dir: &Path, dest: &Path, cancel: &CancelFlag) -> io::Result<PathBuf> {
    let src_dir = src_dir.to_path_buf();
    let dest = dest.to_path_buf();
    let cancel = cancel.clone();
    tokio::task::spawn_blocking(move || write_archive(&src_dir, &dest, &cancel).map(|()| dest))
        .await
        .map_err(io::Error::other)?
}

/// Remove a scratch directory tree. Missing directories are not an error.
pub async fn reclaim(dir: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn write_archive(src_dir: &Path, dest: &Path, cancel: &CancelFlag) -> io::Result<()> {
    cancel.check()?;
    if !src_dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", src_dir.display()),
        ));
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let partial = partial_path(dest);
    let res = zip_dir(src_dir, &partial, cancel).and_then(|()| fs::rename(&partial, dest));
    if res.is_err() {
        let _ = fs::remove_file(&partial);
        return res;
    }
    // cancelled while renaming: the guard may already have looked for `dest`
    if let Err(e) = cancel.check() {
        let _ = fs::remove_file(dest);
        return Err(e);
    }
    Ok(())
}

fn zip_dir(src_dir: &Path, dest_zip: &Path, cancel: &CancelFlag) -> io::Result<()> {
    let file = fs::File::create(dest_zip)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    for entry in WalkDir::new(src_dir)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
    {
        cancel.check()?;
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src_dir)
            .map_err(io::Error::other)?;
        let name = rel.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), options).map_err(io::Error::other)?;
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        zip.start_file(name, options).map_err(io::Error::other)?;
        let mut f = fs::File::open(entry.path())?;
        io::copy(&mut f, &mut zip)?;
    }

    zip.finish().map_err(io::Error::other)?;
    Ok(())
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    dest.with_file_name(name)
}

/// Owns a scratch directory for the duration of one execution.
///
/// `reclaim` is the normal exit. If the guard is dropped while still armed (the
/// execution future was cancelled, or a panic unwound through it) it raises its
/// [`CancelFlag`] and removes the directory, plus the archive it covers,
/// synchronously. Blocking work holding the flag cleans up after itself.
#[derive(Debug)]
pub struct ScratchGuard {
    dir: PathBuf,
    archive: Option<PathBuf>,
    cancel: CancelFlag,
    armed: bool,
}

impl ScratchGuard {
    /// Create `dir` fresh. Leftovers from an earlier execution are wiped first.
    pub async fn stage(dir: PathBuf) -> io::Result<Self> {
        if tokio::fs::try_exists(&dir).await? {
            tracing::warn!(scratch = %dir.display(), "removing stale scratch directory");
            reclaim(&dir).await?;
        }
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            archive: None,
            cancel: CancelFlag::new(),
            armed: true,
        })
    }

    /// Also remove `archive` if the execution is abandoned.
    pub fn covering(mut self, archive: PathBuf) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Flag raised when the guard is dropped armed. Hand it to blocking work.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub async fn reclaim(mut self) -> io::Result<()> {
        let res = reclaim(&self.dir).await;
        self.armed = false;
        res
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.cancel.cancel();
        if let Some(archive) = &self.archive {
            for path in [partial_path(archive), archive.clone()] {
                if let Err(e) = fs::remove_file(&path) {
                    if e.kind() != io::ErrorKind::NotFound {
                        tracing::warn!(archive = %path.display(), error = %e, "archive removal on drop failed");
                    }
                }
            }
        }
        match fs::remove_dir_all(&self.dir) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                tracing::warn!(scratch = %self.dir.display(), error = %e, "scratch reclaim on drop failed");
            }
            _ => {
                tracing::debug!(scratch = %self.dir.display(), "scratch reclaimed on drop");
            }
        }
    }
}
