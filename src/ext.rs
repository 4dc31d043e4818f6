//! Source/output extension mapping shared by polyfill discovery, root-file
//! filtering and the compile engine. See `spec.md` §3 "Overlay" and §4.6
//! "Module-format disambiguation".

/// Extension of a plain source file compiled to a CommonJS-or-whatever-the-
/// target-picks output (`spec.md`'s "generic_source").
pub const GENERIC_SOURCE_EXT: &str = "ts";
/// Extension of a source file whose module kind is pinned to the native
/// module system regardless of target (`spec.md`'s "native_module_source").
pub const NATIVE_MODULE_SOURCE_EXT: &str = "mts";

pub const GENERIC_OUTPUT_EXT: &str = "js";
pub const NATIVE_MODULE_OUTPUT_EXT: &str = "mjs";

pub const GENERIC_DECLARATION_EXT: &str = "d.ts";
pub const NATIVE_MODULE_DECLARATION_EXT: &str = "d.mts";

/// Both extensions recognized as root/compilable source files, native-module
/// variant first so callers that want "prefer native" get it by iterating in
/// order.
pub const SOURCE_EXTS: [&str; 2] = [NATIVE_MODULE_SOURCE_EXT, GENERIC_SOURCE_EXT];

/// Splits `name` into `(stem, ext)` where `ext` is one of [`SOURCE_EXTS`], or
/// `None` if `name` doesn't end in a recognized source extension.
pub fn split_source_stem(name: &str) -> Option<(&str, &str)> {
    for ext in SOURCE_EXTS {
        let suffix = format!(".{ext}");
        if let Some(stem) = name.strip_suffix(&suffix) {
            return Some((stem, ext));
        }
    }
    None
}

/// Maps a root file's extension to its compiled output extension.
pub fn output_ext_for(source_ext: &str) -> &'static str {
    if source_ext == NATIVE_MODULE_SOURCE_EXT {
        NATIVE_MODULE_OUTPUT_EXT
    } else {
        GENERIC_OUTPUT_EXT
    }
}

/// Maps a root file's extension to its declaration output extension.
pub fn declaration_ext_for(source_ext: &str) -> &'static str {
    if source_ext == NATIVE_MODULE_SOURCE_EXT {
        NATIVE_MODULE_DECLARATION_EXT
    } else {
        GENERIC_DECLARATION_EXT
    }
}
