use std::path::{Path, PathBuf};
use walkdir::WalkDir;

fn is_source_file(p: &Path) -> bool {
    p.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

/// Expand the given paths into source files: files are kept as given,
/// directories are walked for `*.json`. Sorted and de-duplicated within each
/// directory; the order of the arguments is kept.
pub fn discover_source_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::new();
    for p in paths {
        if p.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(p)
                .min_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && is_source_file(e.path()))
                .map(|e| e.into_path())
                .collect();
            found.sort();
            out.extend(found);
        } else {
            out.push(p.clone());
        }
    }
    let mut seen = ahash::AHashSet::new();
    out.retain(|p| seen.insert(p.clone()));
    out
}
