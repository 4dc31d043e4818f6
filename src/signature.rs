//! Compile-signature and source-identity hashing (`spec.md` §4.2).
//!
//! Both are pure functions of already-resolved data: stable under repeated
//! computation, and order-invariant in the file list (files are sorted
//! before hashing).

use sha2::{Digest, Sha256};

use crate::polyfill::Overlay;
use crate::target::ParsedTarget;

/// A deterministic, opaque signature. Two targets with equal signatures
/// satisfy the guarantee the signature is meant to express (see
/// [`compile_signature`] / [`source_identity`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(pub String);

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn hash_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)
}

/// The configured polyfill suffix, but only when discovery actually found a
/// replacement — so a target that configures a suffix with no matching files
/// on disk dedups with its unsuffixed sibling. See `spec.md` §3 "Effective
/// suffix".
pub fn effective_suffix(target: &ParsedTarget, overlay: &Overlay) -> Option<String> {
    if overlay.is_empty() {
        return None;
    }
    target.target.polyfill_suffix.clone()
}

fn canonical_options_json(target: &ParsedTarget) -> String {
    let mut options = target.options.clone();
    // Per-target bookkeeping, not semantic (spec.md §4.2).
    options.remove("configFilePath");
    options.remove("outDir");
    // BTreeMap already serializes with sorted keys.
    serde_json::to_string(&options).expect("compiler options must be JSON-serializable")
}

fn sorted_file_list_hash(target: &ParsedTarget) -> String {
    let mut files: Vec<&std::path::PathBuf> = target.root_files.iter().collect();
    files.sort();
    let joined = files
        .iter()
        .map(|p| p.to_string_lossy())
        .collect::<Vec<_>>()
        .join("\u{0}");
    hash_hex(&joined)
}

/// Two targets with equal compile signatures produce identical artifact
/// bytes modulo `out_dir` (`spec.md` §3, §8).
pub fn compile_signature(target: &ParsedTarget, overlay: &Overlay) -> Signature {
    let options_json = canonical_options_json(target);
    let files_hash = sorted_file_list_hash(target);

    let mut buf = String::new();
    buf.push_str(&options_json);
    buf.push('0');
    buf.push_str(&files_hash);
    if let Some(suffix) = effective_suffix(target, overlay) {
        buf.push_str("0polyfill:");
        buf.push_str(&suffix);
    }

    Signature(hash_hex(&buf))
}

/// Two targets with equal source identities produce identical type-check
/// diagnostics and identical declaration files (`spec.md` §3, §8). Ignores
/// compiler options entirely — only the file list and effective suffix
/// matter.
pub fn source_identity(target: &ParsedTarget, overlay: &Overlay) -> Signature {
    let files_hash = sorted_file_list_hash(target);
    let mut buf = files_hash;
    if let Some(suffix) = effective_suffix(target, overlay) {
        buf.push_str("0polyfill:");
        buf.push_str(&suffix);
    }
    Signature(hash_hex(&buf))
}
