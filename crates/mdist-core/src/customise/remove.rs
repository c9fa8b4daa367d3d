//! Path-matching removals
//!
//! Built-in lists of bundled files that a self-hosted release does not
//! need, and the matcher that applies them (and user-declared rules) to the
//! staging tree.

use std::fs;
use std::path::Path;

use mdist_schema::PathRules;
use mdist_schema::distribution::RemoveCustomisation;
use regex::{Regex, RegexBuilder};
use thiserror::Error;
use walkdir::WalkDir;

use super::CustomiseError;
use super::order::{CONFIG, FILES, PLUGINS};
use crate::build::context::BuildContext;

/// A removal rule that cannot be compiled.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error(transparent)]
    Pattern(#[from] regex::Error),

    #[error("'{0}' is not a relative path inside the release")]
    Path(String),
}

/// Compiled form of [`PathRules`]. Every rule is matched case-insensitively
/// against `/`-separated paths relative to the staging root.
#[derive(Debug)]
pub struct PathMatcher {
    paths: Option<Regex>,
    folders: Option<Regex>,
    pattern: Option<Regex>,
}

fn anchored(alternatives: &[String]) -> Result<Option<Regex>, regex::Error> {
    if alternatives.is_empty() {
        return Ok(None);
    }
    RegexBuilder::new(&format!("^(?:{})$", alternatives.join("|")))
        .case_insensitive(true)
        .build()
        .map(Some)
}

/// Escaped alternatives for fixed relative paths. Absolute paths and `..`
/// components are refused.
fn fixed(items: &[String]) -> Result<Vec<String>, RuleError> {
    items
        .iter()
        .map(|item| {
            let trimmed = item.trim_end_matches('/');
            let escapes = trimmed.is_empty()
                || trimmed.starts_with('/')
                || trimmed.contains('\\')
                || trimmed.split('/').any(|c| c.is_empty() || c == "." || c == "..");
            if escapes {
                Err(RuleError::Path(item.clone()))
            } else {
                Ok(regex::escape(trimmed))
            }
        })
        .collect()
}

impl PathMatcher {
    pub fn new(rules: &PathRules) -> Result<Self, RuleError> {
        let escaped = |items: &[String]| -> Option<String> {
            (!items.is_empty()).then(|| {
                items
                    .iter()
                    .map(|s| regex::escape(s))
                    .collect::<Vec<_>>()
                    .join("|")
            })
        };

        let mut alternatives: Vec<String> = rules.patterns.iter().map(|p| format!("(?:{p})")).collect();
        if let Some(names) = escaped(&rules.names) {
            alternatives.push(format!("(?:.*/)?(?:{names})"));
        }
        if let Some(extensions) = escaped(&rules.extensions) {
            alternatives.push(format!(".*(?:{extensions})"));
        }
        if let Some(stems) = escaped(&rules.stems) {
            alternatives.push(format!(r"(?:.*/)?(?:{stems})(?:\.[^/.]+)?"));
        }

        Ok(Self {
            paths: anchored(&fixed(&rules.paths)?)?,
            folders: anchored(&fixed(&rules.folders)?)?,
            pattern: anchored(&alternatives)?,
        })
    }

    /// Whether the relative path of an entry is selected. Folder rules only
    /// select directories.
    pub fn is_match(&self, relative: &str, is_dir: bool) -> bool {
        let hit = |regex: &Option<Regex>| regex.as_ref().is_some_and(|r| r.is_match(relative));
        hit(&self.paths) || hit(&self.pattern) || (is_dir && hit(&self.folders))
    }

    fn is_empty(&self) -> bool {
        self.paths.is_none() && self.folders.is_none() && self.pattern.is_none()
    }

    /// Delete everything the rules select below the staging root, recording
    /// each removed file and directory. Returns how many were removed.
    pub fn remove_from(&self, ctx: &mut BuildContext) -> Result<usize, CustomiseError> {
        if self.is_empty() {
            return Ok(0);
        }
        let root = ctx.root().to_path_buf();
        let mut removed = 0;

        let mut walker = WalkDir::new(&root).min_depth(1).sort_by_file_name().into_iter();
        while let Some(entry) = walker.next() {
            let entry = entry.map_err(|e| CustomiseError::walk(&root, e))?;
            let Some(relative) = ctx.relative(entry.path()) else {
                continue;
            };
            let is_dir = entry.file_type().is_dir();
            if !self.is_match(&relative, is_dir) {
                continue;
            }
            if is_dir {
                walker.skip_current_dir();
            }
            removed += delete_recorded(ctx, entry.path())?;
        }
        Ok(removed)
    }
}

/// Remove `path` (recursively for directories) and record every entry.
fn delete_recorded(ctx: &mut BuildContext, path: &Path) -> Result<usize, CustomiseError> {
    let meta = fs::symlink_metadata(path).map_err(CustomiseError::io(path))?;
    let mut count = 0;
    if meta.is_dir() {
        for entry in WalkDir::new(path).contents_first(true) {
            let entry = entry.map_err(|e| CustomiseError::walk(path, e))?;
            ctx.record_removed(entry.path());
            count += 1;
        }
        fs::remove_dir_all(path).map_err(CustomiseError::io(path))?;
    } else {
        ctx.record_removed(path);
        count += 1;
        fs::remove_file(path).map_err(CustomiseError::io(path))?;
    }
    tracing::debug!("Removed {} ({count} entries)", path.display());
    Ok(count)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// A built-in removal operation.
#[derive(Debug, Clone)]
pub struct Removal {
    pub name: &'static str,
    pub requires: &'static [&'static str],
    pub affects: &'static [&'static str],
    pub rules: PathRules,
}

impl Removal {
    fn files(name: &'static str, rules: PathRules) -> Self {
        Self {
            name,
            requires: &[FILES],
            affects: &[CONFIG],
            rules,
        }
    }

    fn plugin_folder(name: &'static str, folder: &str) -> Self {
        Self {
            name,
            requires: &[PLUGINS],
            affects: &[CONFIG],
            rules: PathRules {
                folders: strings(&[folder]),
                ..PathRules::default()
            },
        }
    }
}

/// The removals enabled by `config`.
pub fn builtin_removals(config: &RemoveCustomisation) -> Vec<Removal> {
    let mut removals = Vec::new();
    if config.example_plugins {
        removals.push(Removal {
            name: "remove-example-plugins",
            requires: &[FILES],
            affects: &[PLUGINS],
            rules: example_plugins(),
        });
    }
    if config.marketplace {
        removals.push(Removal::plugin_folder("remove-marketplace", "plugins/Marketplace"));
    }
    if config.professional_services {
        removals.push(Removal::plugin_folder(
            "remove-professional-services",
            "plugins/ProfessionalServices",
        ));
    }
    if config.documentation {
        removals.push(Removal::files("remove-documentation", documentation()));
    }
    if config.build_support {
        removals.push(Removal::files("remove-build-support", build_support()));
    }
    if config.vendored_extras {
        removals.push(Removal::files("remove-vendored-extras", vendored_extras()));
    }
    if config.tests {
        removals.push(Removal::files("remove-tests", tests()));
    }
    if config.git_support {
        removals.push(Removal::files("remove-git-support", git_support()));
    }
    removals
}

fn example_plugins() -> PathRules {
    PathRules {
        folders: strings(&[
            "plugins/ExampleAPI",
            "plugins/ExampleCommand",
            "plugins/ExamplePlugin",
            "plugins/ExampleReport",
            "plugins/ExampleSettingsPlugin",
            "plugins/ExampleTheme",
            "plugins/ExampleTracker",
            "plugins/ExampleUI",
            "plugins/ExampleVisualization",
        ]),
        ..PathRules::default()
    }
}

fn build_support() -> PathRules {
    PathRules {
        extensions: strings(&[".gzip", ".php4", ".feature"]),
        names: strings(&[
            ".codeclimate.yml",
            ".htaccess",
            ".lfsconfig",
            ".npmignore",
            ".php_cs.dist",
            ".scrutinizer.yml",
            "behat.yml",
            "bower.json",
            "build.properties",
            "build.xml",
            "component.json",
            "composer.json",
            "composer.lock",
            "composer.travis.json",
            "couscous.yml",
            "grumphp.yml",
            "gruntfile.js",
            "installed.json",
            "karma.conf.js",
            "makefile",
            "package.json",
            "package.xml",
            "phpbench.json",
            "phpunit.xml.dist",
            "phpunit.xml",
            "protractor.conf.js",
        ]),
        patterns: strings(&[r"libs/bower_components/jquery-ui/ui/jquery-ui[a-z\-.]+js"]),
        folders: strings(&[
            "libs/bower_components/angular-mocks",
            "libs/bower_components/jquery-ui/ui/i18n",
            "libs/bower_components/sprintf/demo",
        ]),
        paths: strings(&[
            "libs/bower_components/iframe-resizer/test-main.js",
            "libs/bower_components/jScrollPane/script/demo.js",
            "libs/bower_components/jScrollPane/style/demo.css",
            "libs/bower_components/materialize/package.js",
            "libs/bower_components/ngDialog/server.js",
            "libs/bower_components/visibilityjs/index.js",
            "libs/bower_components/visibilityjs/logo.svg",
            "libs/jqplot/build_minified_script.sh",
            "vendor/leafo/lessphp/lessify",
            "vendor/leafo/lessphp/package.sh",
            "vendor/leafo/lessphp/plessc",
            "vendor/pear/archive_tar/scripts/phptar.in",
            "vendor/pear/archive_tar/sync-php4",
        ]),
        ..PathRules::default()
    }
}

fn documentation() -> PathRules {
    PathRules {
        extensions: strings(&[".md", ".rst", ".markdown", ".log"]),
        names: strings(&["license", "license.txt"]),
        stems: strings(&[
            "authors",
            "changelog",
            "gnu-lgpl",
            "gpl-2.0",
            "copying",
            "gpl-3.0",
            "legalnotice",
            "license-colors",
            "license-sizzle",
            "mit and gpl2 licenses",
            "mit-license-history",
            "mit-license",
            "readme",
        ]),
        folders: strings(&[
            "misc/composer",
            "misc/cron",
            "misc/others",
            "misc/proxy-hide-piwik-url",
        ]),
        paths: strings(&[
            "misc/user/index.html",
            "misc/How to install Matomo.html",
            "vendor/pear/archive_tar/docs/Archive_Tar.txt",
            "libs/bower_components/chroma-js/LICENSE-colors",
        ]),
        ..PathRules::default()
    }
}

fn vendored_extras() -> PathRules {
    PathRules {
        folders: strings(&["vendor/tecnickcom/tcpdf/tools", "vendor/twig/twig/ext"]),
        ..PathRules::default()
    }
}

fn tests() -> PathRules {
    PathRules {
        names: strings(&["tests", "phpunit.xml", "phpunit.xml.dist"]),
        ..PathRules::default()
    }
}

fn git_support() -> PathRules {
    PathRules {
        names: strings(&[
            ".git",
            ".gitattributes",
            ".github",
            ".gitignore",
            ".gitkeep",
            ".gitmodules",
            ".travis.yml",
        ]),
        ..PathRules::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customise::test_context;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel).unwrap();
    }

    #[test]
    fn test_matcher_rules() {
        let matcher = PathMatcher::new(&documentation()).unwrap();
        assert!(matcher.is_match("README.md", false));
        assert!(matcher.is_match("vendor/foo/ChangeLog", false));
        assert!(matcher.is_match("vendor/foo/CHANGELOG.txt", false));
        assert!(matcher.is_match("vendor/foo/LICENSE", false));
        assert!(matcher.is_match("plugins/Foo/readme.txt", false));
        assert!(!matcher.is_match("plugins/Foo/readme.txt/inner.php", false));
        assert!(!matcher.is_match("plugins/Marketplace/angularjs/licensekey", false));
        assert!(!matcher.is_match("core/Plugin.php", false));
    }

    #[test]
    fn test_fixed_paths_ignore_case() {
        let matcher = PathMatcher::new(&documentation()).unwrap();
        assert!(matcher.is_match("MISC/User/Index.HTML", false));
        assert!(matcher.is_match("misc/how to install matomo.html", false));
        assert!(matcher.is_match("Misc/Cron", true));
        // folder rules select directories only
        assert!(!matcher.is_match("misc/cron", false));
        assert!(!matcher.is_match("misc/cron-extra", true));

        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(root, "Plugins/examplePlugin/plugin.json");
        touch(root, "plugins/Other/plugin.json");
        let mut ctx = test_context(root);
        let removed = PathMatcher::new(&example_plugins())
            .unwrap()
            .remove_from(&mut ctx)
            .unwrap();
        assert_eq!(removed, 2);
        assert!(!root.join("Plugins/examplePlugin").exists());
        assert!(root.join("plugins/Other/plugin.json").exists());
    }

    #[test]
    fn test_fixed_paths_must_stay_inside() {
        for bad in ["../outside", "misc/../../etc", "/etc/passwd", "", "a//b", "./misc"] {
            let rules = PathRules {
                paths: strings(&[bad]),
                ..PathRules::default()
            };
            assert!(
                matches!(PathMatcher::new(&rules), Err(RuleError::Path(p)) if p == bad),
                "{bad:?} accepted"
            );
            let rules = PathRules {
                folders: strings(&[bad]),
                ..PathRules::default()
            };
            assert!(matches!(PathMatcher::new(&rules), Err(RuleError::Path(_))));
        }

        // one escaping entry rejects the whole rule set
        let rules = PathRules {
            paths: strings(&["misc/user/index.html", "misc/../../../etc/passwd"]),
            ..PathRules::default()
        };
        assert!(PathMatcher::new(&rules).is_err());
    }

    #[test]
    fn test_remove_records_everything() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(root, "index.php");
        touch(root, "README.md");
        touch(root, "vendor/lib/tests/FooTest.php");
        touch(root, "vendor/lib/tests/fixtures/data.json");
        touch(root, "vendor/lib/src/Lib.php");
        touch(root, "plugins/ExampleUI/plugin.json");

        let mut ctx = test_context(root);
        let rules = PathRules {
            names: strings(&["tests"]),
            extensions: strings(&[".md"]),
            folders: strings(&["plugins/ExampleUI/"]),
            ..PathRules::default()
        };
        let removed = PathMatcher::new(&rules).unwrap().remove_from(&mut ctx).unwrap();

        assert!(root.join("index.php").exists());
        assert!(root.join("vendor/lib/src/Lib.php").exists());
        assert!(!root.join("vendor/lib/tests").exists());
        assert!(!root.join("plugins/ExampleUI").exists());
        assert!(!root.join("README.md").exists());

        let recorded: Vec<_> = ctx.removed_files().iter().map(String::as_str).collect();
        assert_eq!(
            recorded,
            vec![
                "README.md",
                "plugins/ExampleUI",
                "plugins/ExampleUI/plugin.json",
                "vendor/lib/tests",
                "vendor/lib/tests/FooTest.php",
                "vendor/lib/tests/fixtures",
                "vendor/lib/tests/fixtures/data.json",
            ]
        );
        assert_eq!(removed, recorded.len());
    }

    #[test]
    fn test_builtin_selection() {
        let config = RemoveCustomisation {
            example_plugins: true,
            marketplace: true,
            ..RemoveCustomisation::default()
        };
        let names: Vec<_> = builtin_removals(&config).iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["remove-example-plugins", "remove-marketplace"]);
        assert!(builtin_removals(&RemoveCustomisation::default()).is_empty());
    }
}
