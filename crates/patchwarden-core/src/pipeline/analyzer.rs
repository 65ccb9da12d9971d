//! Repository structure analysis

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directories never descended into
const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules", "__pycache__", ".venv", "dist", "build"];

/// Summary of a checkout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryAnalysis {
    pub path: PathBuf,
    pub total_files: usize,
    pub source_files: usize,
    pub test_files: usize,
    pub total_lines: usize,
    /// Source files per language
    pub languages: BTreeMap<String, usize>,
    /// Files that could not be read
    pub unreadable_files: usize,
    pub error: Option<String>,
}

impl RepositoryAnalysis {
    /// Most common source language
    pub fn primary_language(&self) -> Option<&str> {
        self.languages
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(lang, _)| lang.as_str())
    }
}

fn language_of(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    let lang = match ext {
        "rs" => "rust",
        "py" => "python",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "kt" => "kotlin",
        "rb" => "ruby",
        "c" | "h" => "c",
        "cc" | "cpp" | "hpp" => "cpp",
        "cs" => "csharp",
        "php" => "php",
        "swift" => "swift",
        _ => return None,
    };
    Some(lang)
}

fn is_test_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let in_test_dir = path.components().any(|c| {
        let c = c.as_os_str().to_string_lossy();
        c == "tests" || c == "test" || c == "__tests__" || c == "spec"
    });

    in_test_dir
        || name.starts_with("test_")
        || name.ends_with("_test.go")
        || name.ends_with("_test.py")
        || name.contains(".test.")
        || name.contains(".spec.")
}

/// Walk `root` and count files and lines. Unreadable files are counted but
/// skipped; a missing root yields zero counts and an error message.
pub fn analyze_repository(root: &Path) -> RepositoryAnalysis {
    let mut analysis = RepositoryAnalysis {
        path: root.to_path_buf(),
        ..Default::default()
    };

    if !root.is_dir() {
        analysis.error = Some(format!("{} is not a directory", root.display()));
        return analysis;
    }

    let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
        let name = e.file_name().to_string_lossy();
        e.depth() == 0 || !SKIPPED_DIRS.contains(&name.as_ref())
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Skipping unreadable entry: {}", e);
                analysis.unreadable_files += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        analysis.total_files += 1;

        if let Some(lang) = language_of(path) {
            analysis.source_files += 1;
            *analysis.languages.entry(lang.to_string()).or_default() += 1;
            if is_test_file(relative) {
                analysis.test_files += 1;
            }
        }

        match std::fs::read(path) {
            Ok(bytes) => analysis.total_lines += String::from_utf8_lossy(&bytes).lines().count(),
            Err(_) => analysis.unreadable_files += 1,
        }
    }

    analysis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_sources_tests_and_lines() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("tests")).unwrap();
        std::fs::create_dir_all(root.join("target/debug")).unwrap();
        std::fs::write(root.join("src/lib.rs"), "fn a() {}\nfn b() {}\n").unwrap();
        std::fs::write(root.join("tests/it.rs"), "#[test]\nfn t() {}\n").unwrap();
        std::fs::write(root.join("README.md"), "# hi\n").unwrap();
        std::fs::write(root.join("target/debug/out.rs"), "ignored\n").unwrap();

        let analysis = analyze_repository(root);
        assert_eq!(analysis.total_files, 3);
        assert_eq!(analysis.source_files, 2);
        assert_eq!(analysis.test_files, 1);
        assert_eq!(analysis.total_lines, 5);
        assert_eq!(analysis.primary_language(), Some("rust"));
        assert!(analysis.error.is_none());
    }

    #[test]
    fn test_missing_root() {
        let analysis = analyze_repository(Path::new("/definitely/not/here"));
        assert_eq!(analysis.total_files, 0);
        assert!(analysis.error.is_some());
    }

    #[test]
    fn test_detects_test_files() {
        assert!(is_test_file(Path::new("pkg/handler_test.go")));
        assert!(is_test_file(Path::new("src/app.test.ts")));
        assert!(is_test_file(Path::new("test_models.py")));
        assert!(!is_test_file(Path::new("src/main.rs")));
    }
}
