//! Diagnostic formatting for display (`spec.md` §4.10, external collaborator
//! — still implemented since the CLI needs it).
//!
//! `[target_name]` prefixes each target's block; each diagnostic with a
//! known source location renders as `file(line+1, col+1): kind Txxxx:
//! message`; lines across targets are grouped by target in plan order.

use crate::backend::{Diagnostic, DiagnosticKind};

/// Formats one target's diagnostics as the block that would appear under
/// its `[target_name]` heading.
pub fn format_for_target(target_name: &str, diagnostics: &[Diagnostic]) -> String {
    if diagnostics.is_empty() {
        return String::new();
    }
    let mut out = format!("[{target_name}]\n");
    for d in diagnostics {
        out.push_str(&format_line(d));
        out.push('\n');
    }
    out
}

fn format_line(d: &Diagnostic) -> String {
    let code = d.code.as_deref().unwrap_or("T0000");
    format!(
        "{}({}, {}): {} {code}: {}",
        d.file.display(),
        d.line + 1,
        d.column + 1,
        kind_label(d.kind),
        d.message
    )
}

fn kind_label(kind: DiagnosticKind) -> &'static str {
    match kind {
        DiagnosticKind::Error => "error",
        DiagnosticKind::Warning => "warning",
        DiagnosticKind::Suggestion => "suggestion",
        DiagnosticKind::Message => "message",
    }
}

/// Formats every target's diagnostics, in plan order, as the full trail a
/// failed `build` prints to stderr.
pub fn format_plan(per_target: &[(&str, &[Diagnostic])]) -> String {
    per_target
        .iter()
        .filter(|(_, diags)| !diags.is_empty())
        .map(|(name, diags)| format_for_target(name, diags))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn formats_one_based_line_and_column() {
        let diags = vec![Diagnostic {
            kind: DiagnosticKind::Error,
            file: PathBuf::from("src/index.ts"),
            line: 4,
            column: 9,
            message: "unterminated template literal".into(),
            code: Some("TS1002".into()),
        }];
        let text = format_for_target("browser", &diags);
        assert!(text.starts_with("[browser]\n"));
        assert!(text.contains("src/index.ts(5, 10): error TS1002: unterminated template literal"));
    }

    #[test]
    fn warning_kind_renders_as_warning() {
        let diags = vec![Diagnostic {
            kind: DiagnosticKind::Warning,
            file: PathBuf::from("src/index.ts"),
            line: 0,
            column: 0,
            message: "unexpected any".into(),
            code: Some("TS7006".into()),
        }];
        let text = format_for_target("esm", &diags);
        assert!(text.contains("warning TS7006"));
    }

    #[test]
    fn empty_diagnostics_format_to_empty_string() {
        assert_eq!(format_for_target("esm", &[]), "");
    }

    #[test]
    fn plan_format_skips_clean_targets() {
        let diags = vec![Diagnostic {
            kind: DiagnosticKind::Error,
            file: PathBuf::from("a.ts"),
            line: 0,
            column: 0,
            message: "m".into(),
            code: None,
        }];
        let text = format_plan(&[("esm", &[]), ("browser", &diags)]);
        assert!(!text.contains("[esm]"));
        assert!(text.contains("[browser]"));
    }
}
