//! Leftover discovery.
//!
//! Scans the direct children of each configured search root and keeps the
//! entries whose name contains the application name (case-insensitive) or
//! starts with its bundle identifier. Missing roots contribute nothing.
//! Symbolic links are only kept when they resolve inside their own root.
//!
//! A match is exact when the name is the application name, its dashed token
//! or its bundle identifier, alone or followed by `.`, `-` or `_` and a
//! suffix ("Foo.plist", "com.acme.foo.savedState"). Anything else
//! ("com.apple.dt.Xcode" for "Code", "Foo 2" for "Foo") is only a
//! substring match.

use std::fs;
use std::path::Path;

use crate::config::SearchRoot;
use crate::target::LeftoverPath;
use crate::tools::dashed_token;

pub struct PathLocator {
    roots: Vec<SearchRoot>,
}

impl PathLocator {
    pub fn new(roots: Vec<SearchRoot>) -> Self {
        Self { roots }
    }

    /// Returns every leftover found, sorted by path. Never fails.
    pub fn locate(&self, app: &str, bundle_id: Option<&str>) -> Vec<LeftoverPath> {
        let Some(needles) = Needles::new(app, bundle_id) else {
            return Vec::new();
        };

        let mut found = Vec::new();
        for root in &self.roots {
            let entries = match fs::read_dir(&root.path) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                let Some(exact) = needles.matches(&name) else {
                    continue;
                };

                let path = entry.path();
                let is_link = entry.file_type().map(|t| t.is_symlink()).unwrap_or(false);
                if is_link && !resolves_within(&path, &root.path) {
                    continue;
                }

                found.push(LeftoverPath {
                    path,
                    category: root.category,
                    existed: true,
                    exact,
                });
            }
        }

        found.sort_by(|a, b| a.path.cmp(&b.path));
        found.dedup_by(|a, b| a.path == b.path);
        found
    }
}

struct Needles {
    substring: String,
    owned: Vec<String>,
}

impl Needles {
    fn new(app: &str, bundle_id: Option<&str>) -> Option<Self> {
        let substring = app.trim().to_lowercase();
        if substring.is_empty() {
            return None;
        }
        let mut owned = vec![substring.clone(), dashed_token(app)];
        if let Some(id) = bundle_id.map(str::trim).filter(|id| !id.is_empty()) {
            owned.push(id.to_lowercase());
        }
        owned.dedup();
        Some(Self { substring, owned })
    }

    /// `None` for unrelated entries, otherwise whether the match is exact.
    fn matches(&self, entry: &str) -> Option<bool> {
        let entry = entry.to_lowercase();
        if self.owned.iter().any(|name| is_owned_name(&entry, name)) {
            return Some(true);
        }
        entry.contains(&self.substring).then_some(false)
    }
}

fn is_owned_name(entry: &str, name: &str) -> bool {
    entry.strip_prefix(name).is_some_and(|rest| {
        rest.is_empty() || rest.starts_with(|c: char| matches!(c, '.' | '-' | '_'))
    })
}

fn resolves_within(link: &Path, root: &Path) -> bool {
    match (fs::canonicalize(link), fs::canonicalize(root)) {
        (Ok(target), Ok(root)) => target.starts_with(root),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::LeftoverCategory;
    use tempfile::TempDir;

    fn locator_for(temp: &TempDir) -> PathLocator {
        let caches = temp.path().join("Caches");
        let prefs = temp.path().join("Preferences");
        fs::create_dir_all(&caches).unwrap();
        fs::create_dir_all(&prefs).unwrap();
        PathLocator::new(vec![
            SearchRoot::new(caches, LeftoverCategory::Caches),
            SearchRoot::new(prefs, LeftoverCategory::Preferences),
            SearchRoot::new(temp.path().join("Missing"), LeftoverCategory::Logs),
        ])
    }

    #[test]
    fn nothing_found_is_empty_not_error() {
        let temp = TempDir::new().unwrap();
        let locator = locator_for(&temp);
        assert!(locator.locate("Foo", None).is_empty());
    }

    #[test]
    fn matches_substring_case_insensitively() {
        let temp = TempDir::new().unwrap();
        let locator = locator_for(&temp);
        fs::create_dir_all(temp.path().join("Caches/FooHelper")).unwrap();
        fs::write(temp.path().join("Preferences/foo.plist"), "x").unwrap();
        fs::write(temp.path().join("Preferences/bar.plist"), "x").unwrap();

        let found = locator.locate("Foo", None);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].category, LeftoverCategory::Caches);
        assert_eq!(found[1].category, LeftoverCategory::Preferences);
        assert!(found.iter().all(|l| l.existed));
        assert!(!found[0].exact);
        assert!(found[1].exact);
    }

    #[test]
    fn other_apps_containing_the_name_are_not_exact() {
        let temp = TempDir::new().unwrap();
        let locator = locator_for(&temp);
        fs::create_dir_all(temp.path().join("Caches/com.apple.dt.Xcode")).unwrap();
        fs::create_dir_all(temp.path().join("Caches/Code")).unwrap();
        fs::create_dir_all(temp.path().join("Caches/Code 2")).unwrap();
        fs::write(temp.path().join("Preferences/code-cli.json"), "x").unwrap();

        let exact: Vec<String> = locator
            .locate("Code", None)
            .into_iter()
            .filter(|l| l.exact)
            .map(|l| l.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(exact, vec!["Code".to_string(), "code-cli.json".to_string()]);
    }

    #[test]
    fn matches_exact_bundle_identifier() {
        let temp = TempDir::new().unwrap();
        let locator = locator_for(&temp);
        fs::write(temp.path().join("Preferences/com.acme.widget.plist"), "x").unwrap();
        fs::write(temp.path().join("Preferences/com.acme.widgetry.plist"), "x").unwrap();

        let found = locator.locate("Foo", Some("com.acme.widget"));
        assert_eq!(found.len(), 1);
        assert!(found[0].path.ends_with("com.acme.widget.plist"));
        assert!(found[0].exact);
    }

    #[test]
    fn blank_name_matches_nothing() {
        let temp = TempDir::new().unwrap();
        let locator = locator_for(&temp);
        fs::write(temp.path().join("Preferences/anything.plist"), "x").unwrap();
        assert!(locator.locate("  ", None).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn skips_links_escaping_the_root() {
        let temp = TempDir::new().unwrap();
        let locator = locator_for(&temp);
        let outside = temp.path().join("elsewhere");
        fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, temp.path().join("Caches/Foo-escape")).unwrap();
        fs::create_dir_all(temp.path().join("Caches/real")).unwrap();
        std::os::unix::fs::symlink(
            temp.path().join("Caches/real"),
            temp.path().join("Caches/Foo-inside"),
        )
        .unwrap();

        let found = locator.locate("foo", None);
        assert_eq!(found.len(), 1);
        assert!(found[0].path.ends_with("Foo-inside"));
    }
}
