//! Ignore pattern matching.
//!
//! Patterns use a deliberately small dialect: `**`-delimited segments name
//! either a directory component (`**/node_modules/**`) or a file name suffix
//! (`**/*.min.js`); anything else is a plain substring match against the
//! whole path.

use std::path::Path;

/// Check whether `path` matches any of the given ignore patterns.
#[must_use]
pub fn is_ignored(path: &Path, patterns: &[String]) -> bool {
    patterns.iter().any(|p| matches_pattern(path, p))
}

fn matches_pattern(path: &Path, pattern: &str) -> bool {
    if pattern.contains("**") {
        for part in pattern.split("**") {
            let part = part.trim_matches('/');
            if part.is_empty() {
                continue;
            }
            if let Some(suffix) = part.strip_prefix('*') {
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                if name.ends_with(suffix) {
                    return true;
                }
            } else if path
                .components()
                .any(|c| c.as_os_str() == std::ffi::OsStr::new(part))
            {
                return true;
            }
        }
        false
    } else {
        path.to_string_lossy().contains(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_directory_component_pattern() {
        let pats = patterns(&["**/node_modules/**"]);
        assert!(is_ignored(
            Path::new("/p/node_modules/traceur/bin/traceur.js"),
            &pats
        ));
        assert!(!is_ignored(Path::new("/p/src/main/assets/doc/hello.js"), &pats));
    }

    #[test]
    fn test_name_suffix_pattern() {
        let pats = patterns(&["**/*.min.js"]);
        assert!(is_ignored(Path::new("/p/assets/vendor/jquery.min.js"), &pats));
        assert!(!is_ignored(Path::new("/p/assets/app.js"), &pats));
    }

    #[test]
    fn test_plain_substring_pattern() {
        let pats = patterns(&["scratch"]);
        assert!(is_ignored(Path::new("/p/scratch/notes.js"), &pats));
        assert!(!is_ignored(Path::new("/p/assets/app.js"), &pats));
    }

    #[test]
    fn test_hidden_directory_pattern() {
        let pats = patterns(&["**/.git/**"]);
        assert!(is_ignored(Path::new("/p/.git/objects/ab/cd"), &pats));
        assert!(!is_ignored(Path::new("/p/src/git-helpers.js"), &pats));
    }

    #[test]
    fn test_no_patterns_ignores_nothing() {
        assert!(!is_ignored(Path::new("/p/anything.js"), &[]));
    }

    #[test]
    fn test_first_match_wins_across_patterns() {
        let pats = patterns(&["**/target/**", "**/*.min.js"]);
        assert!(is_ignored(Path::new("/p/target/assets/app.js"), &pats));
        assert!(is_ignored(Path::new("/p/src/lib.min.js"), &pats));
    }
}
