use codecritic::review::{normalize, parse_text, RawAnalysis};
use codecritic::workspace::discover;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

fn synthetic_markdown(sections: usize) -> String {
    let mut text = String::from("Overall rating: 7/10\n\nSummary: The module is readable.\n\n");
    for i in 0..sections {
        text.push_str(&format!("## Bugs {i}\n"));
        for j in 0..20 {
            text.push_str(&format!("- [high] Possible overflow on line {}\n", i * 20 + j + 1));
        }
        text.push_str("\n### Suggestions\n");
        for j in 0..20 {
            text.push_str(&format!("1. Extract helper for block {j}\n   and add a test\n"));
        }
        text.push_str("\n**Security**\n- Token logged in plain text\n\n");
    }
    text
}

fn bench_parse_text(c: &mut Criterion) {
    let text = synthetic_markdown(500);
    c.bench_function("parse_text_large_markdown", |b| {
        b.iter(|| {
            let parsed = parse_text(black_box(&text));
            black_box(parsed.issues.len());
        });
    });

    let garbage: String = (0..2_000_000u32)
        .map(|i| char::from_u32(0x20 + (i * 7919) % 0x5f).unwrap_or('?'))
        .collect();
    c.bench_function("parse_text_unstructured_2mb", |b| {
        b.iter(|| black_box(parse_text(black_box(&garbage)).score));
    });
}

fn bench_normalize(c: &mut Criterion) {
    let bugs: Vec<_> = (1..=2_000)
        .map(|i| json!({"line": i, "message": format!("null deref {i}"), "severity": "medium"}))
        .collect();
    let structured = RawAnalysis::Json(json!({
        "score": 6,
        "summary": "Large file",
        "bugs": bugs,
        "suggestions": ["split module"],
        "review": synthetic_markdown(50),
    }));
    c.bench_function("normalize_structured_with_review", |b| {
        b.iter(|| black_box(normalize(black_box(&structured)).issues.len()));
    });

    let fenced = RawAnalysis::Text(format!(
        "Here you go:\n```json\n{}\n```",
        json!({"score": 8, "summary": "ok", "issues": [{"text": "x", "line": 3}]})
    ));
    c.bench_function("normalize_fenced_json_text", |b| {
        b.iter(|| black_box(normalize(black_box(&fenced)).score));
    });
}

fn bench_discover(c: &mut Criterion) {
    let temp = tempfile::tempdir().expect("tempdir");
    for i in 0..500 {
        let dir = temp.path().join(format!("src/feature_{:02}", i % 25));
        std::fs::create_dir_all(&dir).expect("create dir");
        std::fs::write(dir.join(format!("file_{i:04}.rs")), "pub fn f() {}\n")
            .expect("write synthetic source");
    }
    std::fs::create_dir_all(temp.path().join("node_modules/dep")).expect("create vendored");
    for i in 0..500 {
        std::fs::write(
            temp.path().join(format!("node_modules/dep/m{i}.js")),
            "module.exports = 1;\n",
        )
        .expect("write vendored source");
    }

    let roots = vec![temp.path().to_path_buf()];
    c.bench_function("discover_workspace_500", |b| {
        b.iter(|| black_box(discover(&roots).len()));
    });
}

criterion_group!(perf_core, bench_parse_text, bench_normalize, bench_discover);
criterion_main!(perf_core);
