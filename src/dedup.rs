//! Groups targets by compile-equivalence and by type-check-equivalence so
//! that identical work runs once (`spec.md` §4.3).

use std::collections::HashMap;

use crate::polyfill::{self, Overlay};
use crate::signature::{self, Signature};
use crate::target::ParsedTarget;

/// A set of targets that share one compile signature: `primary` is compiled,
/// `copies` receive its output directory tree verbatim.
#[derive(Debug)]
pub struct DedupGroup {
    pub signature: Signature,
    pub primary: ParsedTarget,
    pub copies: Vec<ParsedTarget>,
}

impl DedupGroup {
    pub fn members(&self) -> impl Iterator<Item = &ParsedTarget> {
        std::iter::once(&self.primary).chain(self.copies.iter())
    }
}

/// Per-target overlay, precomputed once so downstream consumers (the worker
/// pool's dispatch messages, in particular) don't rescan directories.
pub type Overlays = HashMap<String, Overlay>;

/// Groups `parsed_targets` into compile-signature [`DedupGroup`]s, in
/// first-seen-signature order (`spec.md` §4.3).
///
/// Also computes, for each target name, its source-identity group — used by
/// the orchestrator to decide which primary performs type-checking and
/// declaration emission (`spec.md` §4.3 "Type-check / declaration dedup").
pub struct Plan {
    pub groups: Vec<DedupGroup>,
    /// Maps a target name to the name of the source-identity primary
    /// responsible for type-checking and declaration emission.
    pub declaration_primary: HashMap<String, String>,
    pub overlays: Overlays,
}

#[tracing::instrument(skip(parsed_targets, suffixes))]
pub fn plan(parsed_targets: Vec<ParsedTarget>, suffixes: &HashMap<String, String>) -> Plan {
    let mut overlays = Overlays::new();
    for t in &parsed_targets {
        let suffix = suffixes.get(t.name()).map(String::as_str).unwrap_or("");
        overlays.insert(t.name().to_string(), polyfill::discover(&t.root_files, suffix));
    }

    let mut groups: Vec<DedupGroup> = Vec::new();
    let mut by_signature: HashMap<Signature, usize> = HashMap::new();

    for t in parsed_targets {
        let overlay = overlays.get(t.name()).cloned().unwrap_or_default();
        let sig = signature::compile_signature(&t, &overlay);

        if let Some(&idx) = by_signature.get(&sig) {
            groups[idx].copies.push(t);
        } else {
            by_signature.insert(sig.clone(), groups.len());
            groups.push(DedupGroup { signature: sig, primary: t, copies: Vec::new() });
        }
    }

    // Source-identity grouping is orthogonal to compile-signature grouping:
    // it ignores compiler options entirely (spec.md §4.3).
    let mut by_identity: HashMap<Signature, String> = HashMap::new();
    let mut declaration_primary = HashMap::new();

    for group in &groups {
        for member in group.members() {
            let overlay = overlays.get(member.name()).cloned().unwrap_or_default();
            let identity = signature::source_identity(member, &overlay);
            let primary_name = by_identity
                .entry(identity)
                .or_insert_with(|| member.name().to_string())
                .clone();
            declaration_primary.insert(member.name().to_string(), primary_name);
        }
    }

    Plan { groups, declaration_primary, overlays }
}

impl Plan {
    /// Whether `target_name` is the source-identity primary responsible for
    /// type-checking and declaration emission.
    pub fn needs_type_check(&self, target_name: &str) -> bool {
        self.declaration_primary.get(target_name).map(String::as_str) == Some(target_name)
    }

    /// The source-identity primary `target_name` should copy declaration
    /// files from, if it isn't the primary itself.
    pub fn declaration_source(&self, target_name: &str) -> Option<&str> {
        match self.declaration_primary.get(target_name) {
            Some(primary) if primary != target_name => Some(primary.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Target;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn target(name: &str, out_dir: &str, module: &str) -> ParsedTarget {
        let mut options = BTreeMap::new();
        options.insert("module".to_string(), serde_json::json!(module));
        ParsedTarget {
            target: Target {
                name: name.into(),
                condition: name.into(),
                tsconfig: "tsconfig.json".into(),
                polyfill_suffix: None,
                module_type: None,
            },
            options,
            out_dir: PathBuf::from(out_dir),
            root_dir: PathBuf::from("src"),
            root_files: vec![PathBuf::from("src/index.ts")],
        }
    }

    #[test]
    fn identical_options_dedup_into_one_group() {
        let targets = vec![
            target("esm", "dist/esm", "esnext"),
            target("browser", "dist/browser", "esnext"),
            target("workerd", "dist/workerd", "esnext"),
        ];
        let plan = plan(targets, &HashMap::new());
        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.groups[0].primary.name(), "esm");
        assert_eq!(plan.groups[0].copies.len(), 2);
    }

    #[test]
    fn differing_module_format_gets_own_group_but_shares_declarations() {
        let targets = vec![target("esm", "dist/esm", "esnext"), target("cjs", "dist/cjs", "commonjs")];
        let plan = plan(targets, &HashMap::new());
        assert_eq!(plan.groups.len(), 2);
        assert!(plan.needs_type_check("esm"));
        assert!(!plan.needs_type_check("cjs"));
        assert_eq!(plan.declaration_source("cjs"), Some("esm"));
    }

    #[test]
    fn single_target_group_has_no_copies() {
        let plan = plan(vec![target("esm", "dist/esm", "esnext")], &HashMap::new());
        assert_eq!(plan.groups.len(), 1);
        assert!(plan.groups[0].copies.is_empty());
        assert!(plan.needs_type_check("esm"));
        assert_eq!(plan.declaration_source("esm"), None);
    }
}
