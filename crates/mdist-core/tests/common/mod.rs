//! In-memory indexes and archive builders shared by the pipeline tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Write};

use mdist_core::index::{
    CoreIndex, Fetcher, GitError, GitExport, GitRemote, IndexError, PluginIndex, PluginInfo,
    PluginRelease,
};
use mdist_core::reporter::{ArtifactStatus, Reporter};
use mdist_core::sync::Sources;
use zip::write::SimpleFileOptions;

pub const GIT_SHA: &str = "4f2c8e1a9b7d6c5e4f3a2b1c0d9e8f7a6b5c4d3e";

pub fn zip_bytes(members: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let time = zip::DateTime::from_date_and_time(2024, 3, 1, 12, 0, 0).unwrap();
    for (name, contents) in members {
        let options = SimpleFileOptions::default()
            .last_modified_time(time)
            .unix_permissions(0o644);
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn tar_bytes(members: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, contents) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(1_709_000_000);
        header.set_cksum();
        builder.append_data(&mut header, name, contents.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap()
}

const GLOBAL_INI: &str = r#"; <?php exit; ?> DO NOT REMOVE THIS LINE
[General]
force_ssl = 0

[Plugins]
Plugins[] = "CoreHome"
Plugins[] = "ExamplePlugin"
Plugins[] = "TagManager"

[PluginsInstalled]
PluginsInstalled[] = "TagManager"
"#;

const FILE_MANIFEST: &str = "<?php\nnamespace Piwik;\nclass Manifest {\n\tstatic $files=array(\n\t\t\"index.php\" => array(\"9\", \"x\"),\n\t\t\"README.md\" => array(\"6\", \"y\"),\n\t\t\"config/global.ini.php\" => array(\"1\", \"z\"),\n\t);\n}\n";

pub fn core_archive(version: &str) -> Vec<u8> {
    zip_bytes(&[
        ("matomo/piwik.php", "<?php"),
        ("matomo/index.php", "<?php 1;"),
        ("matomo/README.md", "readme"),
        ("matomo/config/global.ini.php", GLOBAL_INI),
        ("matomo/config/manifest.inc.php", FILE_MANIFEST),
        ("matomo/core/Version.php", version),
        ("matomo/plugins/CoreHome/CoreHome.php", "<?php"),
        ("matomo/plugins/ExamplePlugin/plugin.json", "{}"),
        ("matomo/plugins/TagManager/plugin.json", "{\"version\":\"bundled\"}"),
    ])
}

pub fn plugin_archive(name: &str, version: &str) -> Vec<u8> {
    let json = format!("{{\"name\":\"{name}\",\"version\":\"{version}\"}}");
    zip_bytes(&[
        (&format!("{name}/plugin.json"), &json),
        (&format!("{name}/{name}.php"), "<?php"),
    ])
}

pub struct FakeCore {
    pub latest: String,
    pub archives: BTreeMap<String, Vec<u8>>,
    pub downloads: Cell<usize>,
}

impl FakeCore {
    pub fn new(versions: &[&str]) -> Self {
        Self {
            latest: versions.last().map(|v| (*v).to_string()).unwrap_or_default(),
            archives: versions
                .iter()
                .map(|v| ((*v).to_string(), core_archive(v)))
                .collect(),
            downloads: Cell::new(0),
        }
    }
}

impl CoreIndex for FakeCore {
    fn latest_version(&self) -> Result<String, IndexError> {
        Ok(self.latest.clone())
    }

    fn versions(&self) -> Result<BTreeSet<String>, IndexError> {
        Ok(self.archives.keys().cloned().collect())
    }

    fn download_link(&self, version: &str) -> String {
        format!("https://builds.test/matomo-{version}.zip")
    }

    fn download(&self, link: &str) -> Result<Vec<u8>, IndexError> {
        self.downloads.set(self.downloads.get() + 1);
        self.archives
            .iter()
            .find(|(v, _)| link == self.download_link(v))
            .map(|(_, data)| data.clone())
            .ok_or_else(|| IndexError::Unavailable(link.to_string()))
    }
}

#[derive(Default)]
pub struct FakePlugins {
    pub infos: BTreeMap<String, PluginInfo>,
    pub archives: BTreeMap<String, Vec<u8>>,
    pub info_calls: Cell<usize>,
    pub downloads: Cell<usize>,
}

impl FakePlugins {
    /// Publish `versions` of `name`, the last one being the latest.
    pub fn publish(&mut self, name: &str, versions: &[(&str, Option<&str>)]) {
        let mut releases = Vec::new();
        for (version, requires_core) in versions {
            let url = format!("https://plugins.test/{name}/download/{version}");
            self.archives.insert(url.clone(), plugin_archive(name, version));
            releases.push(PluginRelease {
                version: (*version).to_string(),
                download_url: url,
                requires_core: requires_core.map(str::to_string),
                requires_php: None,
            });
        }
        self.infos.insert(
            name.to_string(),
            PluginInfo {
                name: name.to_string(),
                downloadable: true,
                paid: false,
                latest_version: versions.last().map(|(v, _)| (*v).to_string()),
                releases,
            },
        );
    }
}

impl PluginIndex for FakePlugins {
    fn plugin_info(
        &self,
        name: &str,
        _core_version: &str,
        _license: Option<&str>,
    ) -> Result<PluginInfo, IndexError> {
        self.info_calls.set(self.info_calls.get() + 1);
        self.infos
            .get(name)
            .cloned()
            .ok_or_else(|| IndexError::Unavailable(name.to_string()))
    }

    fn download(&self, url: &str, _license: Option<&str>) -> Result<Vec<u8>, IndexError> {
        self.downloads.set(self.downloads.get() + 1);
        self.archives
            .get(url)
            .cloned()
            .ok_or_else(|| IndexError::Unavailable(url.to_string()))
    }
}

pub struct FakeGit {
    pub sha: String,
    pub data: Vec<u8>,
    pub exports: Cell<usize>,
}

impl Default for FakeGit {
    fn default() -> Self {
        Self {
            sha: GIT_SHA.to_string(),
            data: tar_bytes(&[("plugin.json", "{\"name\":\"GitPlugin\"}"), ("GitPlugin.php", "<?php")]),
            exports: Cell::new(0),
        }
    }
}

impl GitRemote for FakeGit {
    fn export(&self, url: &str, reference: &str) -> Result<GitExport, GitError> {
        self.exports.set(self.exports.get() + 1);
        if !url.starts_with("https://git.test/") {
            return Err(GitError::Command {
                command: format!("git archive --remote={url} {reference}"),
                stderr: "repository not found".into(),
            });
        }
        Ok(GitExport {
            sha: self.sha.clone(),
            data: self.data.clone(),
        })
    }
}

#[derive(Default)]
pub struct FakeRaw {
    pub files: BTreeMap<String, Vec<u8>>,
    pub fetches: Cell<usize>,
}

impl Fetcher for FakeRaw {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, IndexError> {
        self.fetches.set(self.fetches.get() + 1);
        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| IndexError::Unavailable(url.to_string()))
    }
}

/// All four remotes, populated with one release line each.
pub struct World {
    pub core: FakeCore,
    pub plugins: FakePlugins,
    pub git: FakeGit,
    pub raw: FakeRaw,
}

impl World {
    pub fn new() -> Self {
        let mut plugins = FakePlugins::default();
        plugins.publish(
            "TagManager",
            &[("5.0.0", None), ("5.1.0", None), ("5.2.0", Some(">=6.0.0"))],
        );
        let mut raw = FakeRaw::default();
        raw.files.insert(
            "https://raw.test/RawPlugin-1.0.zip".into(),
            zip_bytes(&[
                ("RawPlugin-1.0/plugin.json", "{}"),
                ("RawPlugin-1.0/RawPlugin.php", "<?php"),
            ]),
        );
        Self {
            core: FakeCore::new(&["4.16.0", "5.0.3", "5.1.0"]),
            plugins,
            git: FakeGit::default(),
            raw,
        }
    }

    pub fn sources(&self) -> Sources<'_> {
        Sources {
            core: &self.core,
            plugins: &self.plugins,
            git: &self.git,
            raw: &self.raw,
        }
    }
}

pub const DISTRIBUTION: &str = r#"
version = "5.*"
php_version = "8.2"

[plugins]
TagManager = "5.*"
GitPlugin = { git = "https://git.test/git-plugin.git", ref = "main" }
RawPlugin = { link = "https://raw.test/RawPlugin-1.0.zip" }

[customisation.remove]
example_plugins = true
documentation = true
"#;

/// Reporter that remembers artifact outcomes.
#[derive(Default)]
pub struct Recorder {
    pub artifacts: RefCell<Vec<(String, ArtifactStatus)>>,
    pub operations: RefCell<Vec<String>>,
}

impl Recorder {
    pub fn status(&self, name: &str) -> Option<ArtifactStatus> {
        self.artifacts
            .borrow()
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, s)| *s)
    }
}

impl Reporter for Recorder {
    fn phase(&self, _title: &str) {}

    fn artifact(&self, name: &str, _identity: &str, status: ArtifactStatus) {
        self.artifacts.borrow_mut().push((name.to_string(), status));
    }

    fn staged(&self, _name: &str, _identity: &str) {}

    fn operation(&self, name: &str) {
        self.operations.borrow_mut().push(name.to_string());
    }
}
