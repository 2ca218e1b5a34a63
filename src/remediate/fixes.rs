//! Pure fix computations: commit message splitting, title/body diffs, and
//! regex-driven file edits against a working tree.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{AppError, Result};

/// Trailer prefixes stripped from commit message bodies, matched
/// case-insensitively at line start.
const TRAILER_PREFIXES: &[&str] = &[
    "Signed-off-by:",
    "Co-authored-by:",
    "Reviewed-by:",
    "Tested-by:",
    "Acked-by:",
    "Cc:",
    "Reported-by:",
    "Suggested-by:",
    "Fixes:",
    "See-also:",
    "Link:",
    "Bug:",
    "Change-Id:",
];

fn is_trailer(line: &str) -> bool {
    TRAILER_PREFIXES.iter().any(|prefix| {
        line.get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })
}

/// Split a commit message into subject and body, with the trailer block
/// removed from the body's tail. Blank lines between body and trailers are
/// dropped; a non-trailer line below a trailer keeps everything above it.
pub fn split_message(message: &str) -> (String, String) {
    let lines: Vec<&str> = message.split('\n').collect();
    let subject = lines.first().map(|l| l.trim()).unwrap_or_default();

    let mut body_lines: Vec<&str> = lines.get(1..).unwrap_or_default().to_vec();
    while body_lines.first().is_some_and(|l| l.trim().is_empty()) {
        body_lines.remove(0);
    }

    // Walk up from the end: blank lines pass through, a trailer extends the
    // block, the first real line ends it.
    let mut trailer_start = body_lines.len();
    for (i, raw) in body_lines.iter().enumerate().rev() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if is_trailer(line) {
            trailer_start = i;
        } else {
            break;
        }
    }
    body_lines.truncate(trailer_start);

    while body_lines.last().is_some_and(|l| l.trim().is_empty()) {
        body_lines.pop();
    }

    (subject.to_string(), body_lines.join("\n").trim().to_string())
}

/// New title when the first commit's subject differs from the PR title.
/// An empty subject never proposes a change.
pub fn compute_title_fix(current_title: &str, commit_subject: &str) -> Option<String> {
    let subject = commit_subject.trim();
    if subject.is_empty() || subject == current_title.trim() {
        return None;
    }
    Some(subject.to_string())
}

/// New body when the first commit's body (trailers already stripped)
/// differs from the PR body. An empty commit body never proposes a change.
pub fn compute_body_fix(current_body: &str, commit_body: &str) -> Option<String> {
    let body = commit_body.trim();
    if body.is_empty() || body == current_body.trim() {
        return None;
    }
    Some(body.to_string())
}

/// One regex edit applied to every file whose repo-relative path matches
/// `file_pattern`.
#[derive(Debug, Clone)]
pub struct FileFixRule {
    pub file_pattern: Regex,
    pub search: Regex,
    pub replacement: String,
    pub remove_lines: bool,
    pub context_start: Option<Regex>,
    pub context_end: Option<Regex>,
}

impl FileFixRule {
    pub fn new(
        file_pattern: &str,
        search: &str,
        replacement: String,
        remove_lines: bool,
        context_start: Option<&str>,
        context_end: Option<&str>,
    ) -> Result<Self> {
        let compile = |what: &str, pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| AppError::Config(format!("invalid {what} pattern: {e}")))
        };
        Ok(FileFixRule {
            file_pattern: compile("file", file_pattern)?,
            search: compile("search", search)?,
            replacement,
            remove_lines,
            context_start: context_start.map(|p| compile("context-start", p)).transpose()?,
            context_end: context_end.map(|p| compile("context-end", p)).transpose()?,
        })
    }
}

/// Apply every rule to the working tree under `root`. Returns the
/// repo-relative paths that changed, deduplicated and sorted. Files that
/// are not valid UTF-8 are skipped.
pub fn apply_file_fixes(root: &Path, rules: &[FileFixRule]) -> Result<Vec<PathBuf>> {
    let mut modified = std::collections::BTreeSet::new();
    for rule in rules {
        for path in find_matching_files(root, &rule.file_pattern)? {
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(_) => continue,
            };
            let replaced = if rule.remove_lines {
                remove_matching_lines(&content, rule)
            } else {
                replace_in_content(&content, rule)
            };
            if let Some(new_content) = replaced {
                fs::write(&path, new_content)?;
                if let Ok(rel) = path.strip_prefix(root) {
                    modified.insert(rel.to_path_buf());
                }
            }
        }
    }
    Ok(modified.into_iter().collect())
}

fn replace_in_content(content: &str, rule: &FileFixRule) -> Option<String> {
    let replaced = rule.search.replace_all(content, rule.replacement.as_str());
    if replaced == content {
        None
    } else {
        Some(replaced.into_owned())
    }
}

/// Remove lines matching the search pattern. When context patterns are
/// set, only lines inside a region are candidates: the region opens at a
/// line matching `context_start` (or at the top of the file when unset)
/// and closes after a line matching `context_end`. Boundary lines are
/// inside the region.
fn remove_matching_lines(content: &str, rule: &FileFixRule) -> Option<String> {
    let had_trailing_newline = content.ends_with('\n');
    let mut in_region = rule.context_start.is_none();
    let mut kept = Vec::new();
    let mut removed_any = false;

    for line in content.lines() {
        let mut close_after = false;
        if !in_region {
            if let Some(start) = &rule.context_start {
                if start.is_match(line) {
                    in_region = true;
                }
            }
        } else if let Some(end) = &rule.context_end {
            if end.is_match(line) {
                close_after = true;
            }
        }

        if in_region && rule.search.is_match(line) {
            removed_any = true;
        } else {
            kept.push(line);
        }

        if close_after {
            in_region = false;
        }
    }

    if !removed_any {
        return None;
    }
    let mut result = kept.join("\n");
    if had_trailing_newline && !result.is_empty() {
        result.push('\n');
    }
    Some(result)
}

/// Walk the tree under `root`, skipping `.git`, and collect files whose
/// repo-relative path matches the pattern.
fn find_matching_files(root: &Path, pattern: &Regex) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                if entry.file_name() == ".git" {
                    continue;
                }
                stack.push(path);
            } else if file_type.is_file() {
                let rel = path.strip_prefix(root).unwrap_or(&path);
                if pattern.is_match(&rel.to_string_lossy()) {
                    found.push(path);
                }
            }
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn split_strips_trailer_block() {
        let (subject, body) =
            split_message("Fix bug\n\nBody text\n\nSigned-off-by: A <a@x.com>");
        assert_eq!(subject, "Fix bug");
        assert_eq!(body, "Body text");
    }

    #[test]
    fn split_handles_subject_only() {
        let (subject, body) = split_message("Fix bug");
        assert_eq!(subject, "Fix bug");
        assert_eq!(body, "");
    }

    #[test]
    fn split_strips_stacked_trailers_case_insensitively() {
        let message = "Add feature\n\nLonger explanation.\n\nchange-id: Iabc123\nSIGNED-OFF-BY: B <b@x.com>";
        let (subject, body) = split_message(message);
        assert_eq!(subject, "Add feature");
        assert_eq!(body, "Longer explanation.");
    }

    #[test]
    fn split_keeps_body_below_trailer_lookalike() {
        // A real line after the trailer means nothing above it is a tail
        // block.
        let message = "Subject\n\nFixes: #12\nThis sentence is body text.";
        let (_, body) = split_message(message);
        assert_eq!(body, "Fixes: #12\nThis sentence is body text.");
    }

    #[test]
    fn title_fix_skips_equal_and_empty() {
        assert_eq!(compute_title_fix("Fix bug", "Fix bug"), None);
        assert_eq!(compute_title_fix("Fix bug", "  "), None);
        assert_eq!(
            compute_title_fix("WIP stuff", "Fix bug"),
            Some("Fix bug".to_string())
        );
    }

    #[test]
    fn body_fix_compares_trimmed() {
        assert_eq!(compute_body_fix("Body text\n", "Body text"), None);
        assert_eq!(compute_body_fix("Old", ""), None);
        assert_eq!(
            compute_body_fix("Old", "New body"),
            Some("New body".to_string())
        );
    }

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn file_fix_touches_only_matching_files() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "README.md", "status: alpha\n");
        write(tmp.path(), "notes.txt", "status: alpha\n");
        write(tmp.path(), ".git/config", "status: alpha\n");

        let rule =
            FileFixRule::new(r"\.md$", "alpha", "beta".to_string(), false, None, None).unwrap();
        let modified = apply_file_fixes(tmp.path(), &[rule]).unwrap();

        assert_eq!(modified, vec![PathBuf::from("README.md")]);
        assert_eq!(
            fs::read_to_string(tmp.path().join("README.md")).unwrap(),
            "status: beta\n"
        );
        assert_eq!(
            fs::read_to_string(tmp.path().join("notes.txt")).unwrap(),
            "status: alpha\n"
        );
        assert_eq!(
            fs::read_to_string(tmp.path().join(".git/config")).unwrap(),
            "status: alpha\n"
        );
    }

    #[test]
    fn file_fix_reports_unchanged_as_empty() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "README.md", "nothing to see\n");
        let rule =
            FileFixRule::new(r"\.md$", "alpha", "beta".to_string(), false, None, None).unwrap();
        let modified = apply_file_fixes(tmp.path(), &[rule]).unwrap();
        assert!(modified.is_empty());
    }

    #[test]
    fn remove_lines_respects_context_region() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "conf.ini",
            "keep = 1\n[deprecated]\nflag = on\nflag = off\n[next]\nflag = on\n",
        );
        let rule = FileFixRule::new(
            r"conf\.ini$",
            "^flag",
            String::new(),
            true,
            Some(r"^\[deprecated\]"),
            Some(r"^\[next\]"),
        )
        .unwrap();
        let modified = apply_file_fixes(tmp.path(), &[rule]).unwrap();
        assert_eq!(modified, vec![PathBuf::from("conf.ini")]);
        assert_eq!(
            fs::read_to_string(tmp.path().join("conf.ini")).unwrap(),
            "keep = 1\n[deprecated]\n[next]\nflag = on\n"
        );
    }

    #[test]
    fn remove_lines_without_context_applies_everywhere() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "list.txt", "a\ndrop me\nb\ndrop me\n");
        let rule =
            FileFixRule::new(r"list\.txt$", "^drop", String::new(), true, None, None).unwrap();
        apply_file_fixes(tmp.path(), &[rule]).unwrap();
        assert_eq!(
            fs::read_to_string(tmp.path().join("list.txt")).unwrap(),
            "a\nb\n"
        );
    }
}
