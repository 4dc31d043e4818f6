//! Benchmarks the dedup planner and the bounded-concurrency parallel-copy
//! path against a synthetic multi-target plan, mirroring the shape of the
//! teacher's `compile_many` benchmark (many equivalent compile jobs, most of
//! which should dedup to a single primary).

#[macro_use]
extern crate criterion;

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::PathBuf;

use criterion::{black_box, Criterion};
use tempfile::TempDir;
use warp_build::config::{ModuleType, Target};
use warp_build::dedup;
use warp_build::fsutil;
use warp_build::target::ParsedTarget;

fn make_plan(dir: &TempDir, n: usize) -> Vec<ParsedTarget> {
    let src = dir.path().join("src");
    std::fs::create_dir_all(&src).unwrap();
    let file = src.join("index.ts");
    std::fs::write(&file, "export const x = 1;").unwrap();

    (0..n)
        .map(|i| {
            let name = format!("target{i}");
            let mut options = BTreeMap::new();
            // Every third target gets a distinct module format; the rest
            // share options and therefore dedup into one compile-signature
            // group, which is the scenario this benchmark cares about.
            options.insert(
                "module".to_string(),
                serde_json::json!(if i % 3 == 0 { "commonjs" } else { "esnext" }),
            );
            ParsedTarget {
                target: Target {
                    name: name.clone(),
                    condition: name.clone(),
                    tsconfig: "tsconfig.json".into(),
                    polyfill_suffix: None,
                    module_type: Some(ModuleType::Module),
                },
                options,
                out_dir: dir.path().join("dist").join(name),
                root_dir: src.clone(),
                root_files: vec![file.clone()],
            }
        })
        .collect()
}

fn dedup_planning_benchmark(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let targets = make_plan(&dir, 64);

    c.bench_function("dedup::plan 64 targets", |b| {
        b.iter(|| {
            let plan = dedup::plan(black_box(targets.clone()), &HashMap::new());
            black_box(plan.groups.len())
        });
    });
}

fn parallel_copy_benchmark(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let primary = dir.path().join("dist/primary");
    std::fs::create_dir_all(primary.join("nested")).unwrap();
    for i in 0..50 {
        std::fs::write(primary.join(format!("file{i}.js")), "export {};").unwrap();
    }
    for i in 0..10 {
        std::fs::write(primary.join("nested").join(format!("nested{i}.js")), "export {};").unwrap();
    }

    let mut group = c.benchmark_group("dedup copy");
    group.sample_size(20);
    group.bench_function("copy_tree to 8 targets, concurrency 64", |b| {
        b.iter(|| {
            for i in 0..8 {
                let dest: PathBuf = dir.path().join("dist").join(format!("copy{i}"));
                fsutil::copy_tree(&primary, &dest, 64).unwrap();
                let _ = std::fs::remove_dir_all(&dest);
            }
        });
    });
}

criterion_group!(benches, dedup_planning_benchmark, parallel_copy_benchmark);
criterion_main!(benches);
