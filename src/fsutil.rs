//! Filesystem helpers shared by the orchestrator's dedup copy and the
//! manifest writer: bounded-concurrency recursive copy and atomic writes
//! (`spec.md` §4.9, §5 "Bounded concurrency").

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::error::Result;

/// Default cap on concurrent filesystem operations for a single dedup-copy
/// or `.d.ts`-copy invocation (`spec.md` §5).
pub const DEFAULT_COPY_CONCURRENCY: usize = 64;

/// Recursively copies `from` to `to`, creating directories first (separated
/// from file copy, per `spec.md` §5), then copying files and symlinks under
/// a bounded-concurrency thread pool. Absolute symlink targets are copied
/// absolute; relative targets are rewritten to stay relative to the new
/// location.
pub fn copy_tree(from: &Path, to: &Path, concurrency: usize) -> Result<()> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    let mut symlinks = Vec::new();
    collect(from, from, &mut dirs, &mut files, &mut symlinks)?;

    std::fs::create_dir_all(to)?;
    for rel in &dirs {
        std::fs::create_dir_all(to.join(rel))?;
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .build()
        .map_err(|e| crate::error::WarpError::with_cause(
            crate::error::ErrorKind::Validation,
            "failed to build copy thread pool",
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        ))?;

    let file_errors: Vec<_> = pool.install(|| {
        files
            .par_iter()
            .map(|rel| copy_one_file(&from.join(rel), &to.join(rel)))
            .filter_map(|r| r.err())
            .collect()
    });
    if let Some(e) = file_errors.into_iter().next() {
        return Err(e);
    }

    for rel in &symlinks {
        copy_one_symlink(from, &from.join(rel), &to.join(rel))?;
    }

    Ok(())
}

fn collect(
    root: &Path,
    dir: &Path,
    dirs: &mut Vec<PathBuf>,
    files: &mut Vec<PathBuf>,
    symlinks: &mut Vec<PathBuf>,
) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let rel = path.strip_prefix(root).unwrap().to_path_buf();
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            symlinks.push(rel);
        } else if file_type.is_dir() {
            dirs.push(rel.clone());
            collect(root, &path, dirs, files, symlinks)?;
        } else {
            files.push(rel);
        }
    }
    Ok(())
}

fn copy_one_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    clone_or_copy(from, to)?;
    Ok(())
}

/// Attempts a copy-on-write clone where the platform supports it
/// (`std::fs::copy` on recent Linux/macOS toolchains already does this via
/// `copy_file_range`/`fclonefileat`); falls back to a byte-for-byte copy.
fn clone_or_copy(from: &Path, to: &Path) -> std::io::Result<u64> {
    std::fs::copy(from, to)
}

fn copy_one_symlink(root: &Path, from: &Path, to: &Path) -> Result<()> {
    let target = std::fs::read_link(from)?;
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let new_target = if target.is_absolute() {
        target
    } else {
        // Rewrite relative targets to remain relative to the new location.
        let from_dir = from.parent().unwrap_or(root);
        let absolute_target = normalize_lexical(&from_dir.join(&target));
        let to_dir = to.parent().unwrap_or(to);
        if absolute_target.strip_prefix(root).is_ok() {
            // The pointee lives inside the copied tree, which the
            // destination mirrors component-for-component under its own
            // root — the original relative string already resolves
            // correctly from the new location, so leave it untouched.
            target
        } else {
            // The pointee is a fixed location outside the copied tree;
            // recompute the offset from the symlink's new directory.
            pathdiff(&absolute_target, to_dir).unwrap_or(target)
        }
    };

    #[cfg(unix)]
    std::os::unix::fs::symlink(&new_target, to)?;
    #[cfg(windows)]
    {
        if from.is_dir() {
            std::os::windows::fs::symlink_dir(&new_target, to)?;
        } else {
            std::os::windows::fs::symlink_file(&new_target, to)?;
        }
    }

    Ok(())
}

/// Lexically resolves `.`/`..` components without touching the filesystem
/// (the target need not exist yet when a tree is mid-copy). Used only to
/// decide whether a symlink's resolved target falls inside or outside the
/// tree being copied.
fn normalize_lexical(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut stack: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(stack.last(), Some(Component::Normal(_))) {
                    stack.pop();
                } else {
                    stack.push(component);
                }
            }
            other => stack.push(other),
        }
    }
    stack.iter().collect()
}

/// Minimal relative-path diff; good enough for symlink targets inside a
/// single copied tree (no `..` traversal outside the tree root is expected).
fn pathdiff(target: &Path, from_dir: &Path) -> Option<PathBuf> {
    let target_components: Vec<_> = target.components().collect();
    let from_components: Vec<_> = from_dir.components().collect();
    let common = target_components
        .iter()
        .zip(from_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..from_components.len() {
        result.push("..");
    }
    for component in &target_components[common..] {
        result.push(component.as_os_str());
    }
    Some(result)
}

/// Writes `content` to `path` atomically: a sibling temp file, then
/// `rename`. Matches the teacher's cache-file write discipline.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let tmp = parent.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("warp-write")
    ));
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn copies_nested_files_and_preserves_relative_symlinks() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();

        fs::create_dir_all(src.path().join("a/b")).unwrap();
        fs::write(src.path().join("a/b/file.js"), "content").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink("b/file.js", src.path().join("a/link.js")).unwrap();

        copy_tree(src.path(), dst.path(), 4).unwrap();

        assert_eq!(fs::read_to_string(dst.path().join("a/b/file.js")).unwrap(), "content");
        #[cfg(unix)]
        {
            let target = fs::read_link(dst.path().join("a/link.js")).unwrap();
            assert_eq!(target, PathBuf::from("b/file.js"));
        }
    }

    #[test]
    #[cfg(unix)]
    fn relative_symlink_pointing_outside_tree_is_rewritten_for_new_location() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("shared.js"), "shared").unwrap();

        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("a")).unwrap();

        // Relative target escaping the copied subtree into a fixed external
        // location — the depth from `a/link.js` up to the shared tempdir's
        // parent differs between `src` and `dst`, so the relative string
        // itself must be recomputed, not copied verbatim.
        let relative_to_outside =
            pathdiff(outside.path().join("shared.js").as_path(), src.path().join("a").as_path())
                .unwrap();
        std::os::unix::fs::symlink(&relative_to_outside, src.path().join("a/link.js")).unwrap();

        copy_tree(src.path(), dst.path(), 4).unwrap();

        let new_target = fs::read_link(dst.path().join("a/link.js")).unwrap();
        let resolved = dst.path().join("a").join(&new_target);
        assert_eq!(normalize_lexical(&resolved), outside.path().join("shared.js"));
    }

    #[test]
    fn write_atomic_replaces_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }
}
