use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

use crate::archive::CancelFlag;
use crate::error::StepFailure;

/// Recursively copy the evidence in `src` into `dst`. Returns bytes copied.
///
/// Symlinks are followed, so `dst` only ever holds regular files and directories.
/// Once `cancel` is raised the copy stops at the next entry and removes `dst`.
pub async fn copy_evidence(
    src: &Path,
    dst: &Path,
    cancel: &CancelFlag,
) -> Result<u64, StepFailure> {
    let (from, to, cancel) = (src.to_path_buf(), dst.to_path_buf(), cancel.clone());
    let res = tokio::task::spawn_blocking(move || {
        let res = copy_tree(&from, &to, &cancel);
        if cancel.is_cancelled() {
            let _ = fs::remove_dir_all(&to);
        }
        res
    })
    .await
    .map_err(io::Error::other)
    .and_then(|res| res);

    res.map_err(|source| StepFailure::Copy {
        from: src.to_path_buf(),
        source,
    })
}

fn copy_tree(src: &Path, dst: &Path, cancel: &CancelFlag) -> io::Result<u64> {
    cancel.check()?;
    if !src.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", src.display()),
        ));
    }
    fs::create_dir_all(dst)?;

    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(true).min_depth(1) {
        cancel.check()?;
        let entry = entry?;
        let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
        let target = dst.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            copied += fs::copy(entry.path(), &target)?;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn copies_nested_tree() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("evidence");
        std::fs::create_dir_all(src.join("Windows/System32/winevt")).unwrap();
        std::fs::create_dir_all(src.join("empty")).unwrap();
        std::fs::write(src.join("Windows/System32/winevt/Security.evtx"), b"evtx").unwrap();
        std::fs::write(src.join("collector.log"), b"log!").unwrap();

        let dst = tmp.path().join("scratch");
        let bytes = copy_evidence(&src, &dst, &CancelFlag::new()).await.unwrap();

        assert_eq!(bytes, 8);
        assert_eq!(
            std::fs::read(dst.join("Windows/System32/winevt/Security.evtx")).unwrap(),
            b"evtx"
        );
        assert!(dst.join("empty").is_dir());
        assert!(src.join("collector.log").exists());
    }

    #[tokio::test]
    async fn missing_source_is_a_copy_failure() {
        let tmp = tempdir().unwrap();
        let scratch = tmp.path().join("scratch");
        let err = copy_evidence(&tmp.path().join("nope"), &scratch, &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StepFailure::Copy { .. }));
    }

    #[tokio::test]
    async fn cancelled_copy_does_not_recreate_destination() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("evidence");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("nested/a.bin"), b"aaaa").unwrap();
        let dst = tmp.path().join("scratch");
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = copy_evidence(&src, &dst, &cancel).await.unwrap_err();

        let StepFailure::Copy { source, .. } = err else {
            panic!("expected a copy failure, got {err:?}");
        };
        assert_eq!(source.kind(), io::ErrorKind::Interrupted);
        assert!(!dst.exists());
    }
}
