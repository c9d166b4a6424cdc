//! Which files get reviewed at all
//!
//! The same rules run at discovery time and again in the per-file pipeline,
//! so a file handed to `codecritic file` directly is filtered the same way.

use crate::util::named_components;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Source extensions and the language hint sent with them
const LANGUAGES: &[(&str, &str)] = &[
    ("rs", "rust"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("py", "python"),
    ("go", "go"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "cpp"),
    ("cc", "cpp"),
    ("hpp", "cpp"),
    ("cs", "csharp"),
    ("rb", "ruby"),
    ("php", "php"),
    ("swift", "swift"),
    ("scala", "scala"),
    ("vue", "vue"),
    ("svelte", "svelte"),
];

/// Bundler output that keeps a source extension
const IGNORED_BASENAMES: &[&str] = &[
    "bundle.js",
    "vendor.js",
    "polyfills.js",
    "runtime.js",
];

const GENERATED_SUFFIXES: &[&str] = &[
    ".min.js",
    ".bundle.js",
    ".d.ts",
    ".pb.go",
    "_pb2.py",
    ".generated.ts",
    ".g.cs",
];

const IGNORED_DIRS: &[&str] = &[
    "target",
    "node_modules",
    "dist",
    "build",
    "out",
    "coverage",
    "__pycache__",
    "vendor",
    "venv",
];

/// Why a file was not reviewed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UnsupportedExtension,
    GeneratedFile,
    IgnoredDirectory,
    Empty,
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::UnsupportedExtension => "unsupported file type",
            SkipReason::GeneratedFile => "generated file",
            SkipReason::IgnoredDirectory => "ignored directory",
            SkipReason::Empty => "empty",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Language hint for a path, if its extension is on the allow-list
pub fn language_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    LANGUAGES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, language)| *language)
}

/// Directory names never descended into
pub fn is_ignored_dir(name: &str) -> bool {
    IGNORED_DIRS.contains(&name) || (name.starts_with('.') && name.len() > 1 && name != "..")
}

fn is_generated(name: &str) -> bool {
    IGNORED_BASENAMES.contains(&name)
        || GENERATED_SUFFIXES
            .iter()
            .any(|suffix| name.len() > suffix.len() && name.ends_with(suffix))
}

/// Check a file against the allow-list and exclusion rules.
///
/// Only the part of `path` below `root` is inspected for ignored
/// directories, so a workspace that itself lives under `build/` still works.
pub fn check(path: &Path, root: Option<&Path>) -> Result<&'static str, SkipReason> {
    let relative = root
        .and_then(|r| path.strip_prefix(r).ok())
        .unwrap_or(path);

    let mut components: Vec<&str> = named_components(relative).collect();
    let basename = components.pop().unwrap_or("");

    if components.iter().any(|dir| is_ignored_dir(dir)) {
        return Err(SkipReason::IgnoredDirectory);
    }
    if is_generated(basename) {
        return Err(SkipReason::GeneratedFile);
    }
    language_for(path).ok_or(SkipReason::UnsupportedExtension)
}
