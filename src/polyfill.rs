//! Per-target source substitution (`spec.md` §4.1).
//!
//! Scans each directory containing root files once, building a map from an
//! original root file's absolute path to the absolute path of its
//! `-<suffix>` sibling, if one exists. No errors are surfaced: an unreadable
//! directory simply contributes no overlay entries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ext::{split_source_stem, NATIVE_MODULE_SOURCE_EXT};

pub type Overlay = HashMap<PathBuf, PathBuf>;

/// Discovers the polyfill overlay for a set of root files under the given
/// suffix. See `spec.md` §4.1 for the directory-at-a-time scanning rationale.
#[tracing::instrument(skip(root_files), fields(n = root_files.len()))]
pub fn discover(root_files: &[PathBuf], suffix: &str) -> Overlay {
    let mut overlay = Overlay::new();
    if suffix.is_empty() {
        return overlay;
    }

    let mut by_dir: HashMap<&Path, Vec<&PathBuf>> = HashMap::new();
    for f in root_files {
        if let Some(dir) = f.parent() {
            by_dir.entry(dir).or_default().push(f);
        }
    }

    for (dir, files) in by_dir {
        let Ok(entries) = std::fs::read_dir(dir) else {
            tracing::trace!(?dir, "polyfill scan: directory unreadable, skipping");
            continue;
        };
        let siblings: std::collections::HashSet<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();

        for file in files {
            let name = match file.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            let Some((stem, _ext)) = split_source_stem(name) else { continue };

            // A file that IS the replacement (its own stem already ends in
            // the suffix) never maps to itself.
            if stem.ends_with(suffix) {
                continue;
            }

            let native_candidate = format!("{stem}{suffix}.{NATIVE_MODULE_SOURCE_EXT}");
            let generic_candidate =
                format!("{stem}{suffix}.{}", crate::ext::GENERIC_SOURCE_EXT);

            let replacement_name = if siblings.contains(&native_candidate) {
                Some(native_candidate)
            } else if siblings.contains(&generic_candidate) {
                Some(generic_candidate)
            } else {
                None
            };

            if let Some(replacement_name) = replacement_name {
                overlay.insert(file.clone(), dir.join(replacement_name));
            }
        }
    }

    overlay
}

/// Filters out root files that are themselves overlay replacements — they
/// must never be compiled/emitted as standalone outputs (`spec.md` §4.1, §4.6).
///
/// Deliberately keyed off `overlay`'s replacement *values*, not a blind
/// "does the basename stem end with the suffix" string check: a file whose
/// name merely happens to end in the suffix — `not-a-browser.ts` under
/// suffix `-browser` — is not anyone's discovered replacement (no sibling
/// `not-a.ts` exists) and must stay in the root set (`spec.md` §4.6
/// "basename-aware"). Only files `discover()` actually matched as a
/// replacement are excluded.
pub fn filter_replacement_files(root_files: &[PathBuf], overlay: &Overlay) -> Vec<PathBuf> {
    if overlay.is_empty() {
        return root_files.to_vec();
    }
    let replacements: std::collections::HashSet<&PathBuf> = overlay.values().collect();
    root_files.iter().filter(|f| !replacements.contains(f)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn discovers_native_module_replacement_over_generic() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("greeter.ts");
        fs::write(&original, "export {}").unwrap();
        fs::write(dir.path().join("greeter-browser.mts"), "export {}").unwrap();
        fs::write(dir.path().join("greeter-browser.ts"), "export {}").unwrap();

        let overlay = discover(&[original.clone()], "-browser");
        assert_eq!(overlay.get(&original).unwrap().file_name().unwrap(), "greeter-browser.mts");
    }

    #[test]
    fn falls_back_to_generic_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("greeter.ts");
        fs::write(&original, "export {}").unwrap();
        fs::write(dir.path().join("greeter-browser.ts"), "export {}").unwrap();

        let overlay = discover(&[original.clone()], "-browser");
        assert_eq!(overlay.get(&original).unwrap().file_name().unwrap(), "greeter-browser.ts");
    }

    #[test]
    fn basename_aware_suffix_match_does_not_strip_unrelated_file() {
        // `not-a-browser.ts`'s stem literally ends with "-browser", but
        // since no sibling `not-a.ts` exists, `discover()` never matched it
        // as anyone's replacement — so the overlay is empty and it survives.
        let dir = tempfile::tempdir().unwrap();
        let not_browser = dir.path().join("not-a-browser.ts");
        let overlay = discover(&[not_browser.clone()], "-browser");
        assert!(overlay.is_empty());
        let filtered = filter_replacement_files(&[not_browser.clone()], &overlay);
        assert_eq!(filtered, vec![not_browser]);
    }

    #[test]
    fn replacement_files_are_filtered_from_roots() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("greeter.ts");
        let replacement = dir.path().join("greeter-browser.ts");
        fs::write(&original, "export {}").unwrap();
        fs::write(&replacement, "export {}").unwrap();

        let overlay = discover(&[original.clone(), replacement.clone()], "-browser");
        let filtered = filter_replacement_files(&[original.clone(), replacement], &overlay);
        assert_eq!(filtered, vec![original]);
    }

    #[test]
    fn empty_overlay_when_no_sibling_present() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("greeter.ts");
        fs::write(&original, "export {}").unwrap();
        let overlay = discover(&[original], "-browser");
        assert!(overlay.is_empty());
    }
}
