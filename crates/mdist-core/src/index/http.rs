//! HTTP index client
//!
//! Blocking `reqwest` client for the core release endpoints, the plugin
//! marketplace and plain links.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use mdist_schema::CORE_RELEASE_FINGERPRINT;
use regex::Regex;
use reqwest::StatusCode;
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;

use super::{CoreIndex, Fetcher, IndexError, PluginIndex, PluginInfo, PluginRelease};
use crate::config::Settings;
use crate::signature::SignatureVerifier;

static RELEASE_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="(?:[^"]*/)?matomo-([0-9][0-9A-Za-z.\-]*?)\.(?:zip|tar\.gz)(?:\.asc)?""#)
        .expect("valid release listing regex")
});

pub struct HttpIndex {
    client: Client,
    api_url: String,
    builds_url: String,
    plugins_url: String,
    verifier: Box<dyn SignatureVerifier>,
}

impl HttpIndex {
    pub fn new(settings: &Settings, verifier: Box<dyn SignatureVerifier>) -> Result<Self, IndexError> {
        let client = Client::builder().user_agent(crate::USER_AGENT).build()?;
        Ok(Self {
            client,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            builds_url: settings.builds_url.trim_end_matches('/').to_string(),
            plugins_url: settings.plugins_url.trim_end_matches('/').to_string(),
            verifier,
        })
    }

    fn get(&self, url: &str) -> Result<Response, IndexError> {
        tracing::debug!("GET {url}");
        check_status(self.client.get(url).send()?)
    }

    /// POST to the marketplace, sending the license as `access_token`.
    /// A rejected token is dropped and the request retried anonymously once.
    fn plugin_request(&self, url: &str, license: Option<&str>) -> Result<Response, IndexError> {
        tracing::debug!("POST {url}");
        let mut request = self.client.post(url);
        if let Some(token) = license {
            request = request.form(&[("access_token", token)]);
        }
        let response = request.send()?;
        if license.is_some()
            && matches!(
                response.status(),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            )
        {
            tracing::warn!("License key denied by {url}, retrying without it");
            return self.plugin_request(url, None);
        }
        check_status(response)
    }
}

fn check_status(response: Response) -> Result<Response, IndexError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(IndexError::Status {
            url: response.url().to_string(),
            status: status.as_u16(),
        })
    }
}

impl CoreIndex for HttpIndex {
    fn latest_version(&self) -> Result<String, IndexError> {
        let url = format!("{}/1.0/getLatestVersion/", self.api_url);
        let version = self.get(&url)?.text()?.trim().to_string();
        if version.is_empty() {
            return Err(IndexError::Unavailable(format!("{url} returned no version")));
        }
        Ok(version)
    }

    fn versions(&self) -> Result<BTreeSet<String>, IndexError> {
        let url = format!("{}/", self.builds_url);
        let listing = self.get(&url)?.text()?;
        Ok(parse_release_listing(&listing))
    }

    fn download_link(&self, version: &str) -> String {
        format!("{}/matomo-{version}.zip", self.builds_url)
    }

    fn download(&self, link: &str) -> Result<Vec<u8>, IndexError> {
        let data = self.get(link)?.bytes()?.to_vec();
        let signature = self.get(&format!("{link}.asc"))?.bytes()?;
        self.verifier
            .verify(&data, &signature, CORE_RELEASE_FINGERPRINT)?;
        tracing::info!("Downloaded {link} ({} bytes, signature ok)", data.len());
        Ok(data)
    }
}

fn parse_release_listing(html: &str) -> BTreeSet<String> {
    RELEASE_HREF
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    is_downloadable: bool,
    #[serde(default)]
    is_paid: bool,
    #[serde(default)]
    latest_version: Option<String>,
    #[serde(default)]
    versions: Vec<VersionResponse>,
}

#[derive(Deserialize)]
struct VersionResponse {
    name: String,
    download: String,
    #[serde(default)]
    requires: RequiresResponse,
}

/// The marketplace serializes an empty requirement map as `[]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RequiresResponse {
    Map {
        #[serde(default)]
        piwik: Option<String>,
        #[serde(default)]
        php: Option<String>,
    },
    Empty(serde::de::IgnoredAny),
}

impl Default for RequiresResponse {
    fn default() -> Self {
        RequiresResponse::Empty(serde::de::IgnoredAny)
    }
}

impl InfoResponse {
    fn into_info(self, requested: &str, base: &Url) -> Result<PluginInfo, IndexError> {
        let releases = self
            .versions
            .into_iter()
            .map(|v| {
                let download_url = base
                    .join(&v.download)
                    .map_err(|_| IndexError::InvalidUrl(v.download.clone()))?
                    .to_string();
                let (requires_core, requires_php) = match v.requires {
                    RequiresResponse::Map { piwik, php } => (piwik, php),
                    RequiresResponse::Empty(_) => (None, None),
                };
                Ok(PluginRelease {
                    version: v.name,
                    download_url,
                    requires_core,
                    requires_php,
                })
            })
            .collect::<Result<Vec<_>, IndexError>>()?;

        Ok(PluginInfo {
            name: self.name.unwrap_or_else(|| requested.to_string()),
            downloadable: self.is_downloadable,
            paid: self.is_paid,
            latest_version: self.latest_version.filter(|v| !v.is_empty()),
            releases,
        })
    }
}

impl PluginIndex for HttpIndex {
    fn plugin_info(
        &self,
        name: &str,
        core_version: &str,
        license: Option<&str>,
    ) -> Result<PluginInfo, IndexError> {
        let mut url = Url::parse(&format!("{}/api/2.0/plugins/{name}/info", self.plugins_url))
            .map_err(|_| IndexError::InvalidUrl(self.plugins_url.clone()))?;
        url.query_pairs_mut().append_pair("coreVersion", core_version);

        let response = self.plugin_request(url.as_str(), license)?;
        let base = response.url().clone();
        let body = response.bytes()?;
        let parsed: InfoResponse = serde_json::from_slice(&body).map_err(|source| IndexError::Json {
            url: base.to_string(),
            source,
        })?;
        parsed.into_info(name, &base)
    }

    fn download(&self, url: &str, license: Option<&str>) -> Result<Vec<u8>, IndexError> {
        let data = self.plugin_request(url, license)?.bytes()?.to_vec();
        tracing::info!("Downloaded {url} ({} bytes)", data.len());
        Ok(data)
    }
}

impl Fetcher for HttpIndex {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, IndexError> {
        let data = self.get(url)?.bytes()?.to_vec();
        tracing::info!("Downloaded {url} ({} bytes)", data.len());
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::SignatureError;
    use mockito::{Matcher, Server};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct RecordingVerifier {
        calls: Rc<RefCell<Vec<(Vec<u8>, Vec<u8>, String)>>>,
    }

    impl SignatureVerifier for RecordingVerifier {
        fn verify(&self, data: &[u8], signature: &[u8], fingerprint: &str) -> Result<(), SignatureError> {
            self.calls
                .borrow_mut()
                .push((data.to_vec(), signature.to_vec(), fingerprint.to_string()));
            Ok(())
        }
    }

    fn index_for(server: &Server, verifier: RecordingVerifier) -> HttpIndex {
        let settings = Settings {
            api_url: server.url(),
            builds_url: server.url(),
            plugins_url: server.url(),
            cache_dir: None,
            source_date_epoch: None,
        };
        HttpIndex::new(&settings, Box::new(verifier)).unwrap()
    }

    #[test]
    fn test_core_latest_and_listing() {
        let mut server = Server::new();
        let _latest = server
            .mock("GET", "/1.0/getLatestVersion/")
            .with_body("5.1.2\n")
            .create();
        let _listing = server
            .mock("GET", "/")
            .with_body(
                r#"<a href="matomo-5.1.2.zip">x</a> <a href="matomo-5.1.2.zip.asc">s</a>
                   <a href="/matomo-4.16.0.tar.gz">y</a> <a href="matomo-latest.zip">z</a>
                   <a href="piwik-2.0.zip">old</a>"#,
            )
            .create();

        let index = index_for(&server, RecordingVerifier::default());
        assert_eq!(index.latest_version().unwrap(), "5.1.2");
        assert_eq!(
            index.versions().unwrap().into_iter().collect::<Vec<_>>(),
            vec!["4.16.0".to_string(), "5.1.2".to_string()]
        );
        assert_eq!(
            index.download_link("5.1.2"),
            format!("{}/matomo-5.1.2.zip", server.url())
        );
    }

    #[test]
    fn test_core_download_checks_signature() {
        let mut server = Server::new();
        let _zip = server
            .mock("GET", "/matomo-5.1.2.zip")
            .with_body("zip bytes")
            .create();
        let _sig = server
            .mock("GET", "/matomo-5.1.2.zip.asc")
            .with_body("armoured")
            .create();

        let verifier = RecordingVerifier::default();
        let index = index_for(&server, verifier.clone());
        let url = format!("{}/matomo-5.1.2.zip", server.url());
        let data = CoreIndex::download(&index, &url).unwrap();
        assert_eq!(data, b"zip bytes");

        let calls = verifier.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, b"armoured");
        assert_eq!(calls[0].2, CORE_RELEASE_FINGERPRINT);
    }

    #[test]
    fn test_plugin_info() {
        let mut server = Server::new();
        let _info = server
            .mock("POST", "/api/2.0/plugins/CustomAlerts/info")
            .match_query(Matcher::UrlEncoded("coreVersion".into(), "5.1.2".into()))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "name": "CustomAlerts",
                    "isDownloadable": true,
                    "isPaid": false,
                    "latestVersion": "5.0.4",
                    "versions": [
                        {"name": "5.0.4", "download": "/api/2.0/plugins/CustomAlerts/download/5.0.4",
                         "requires": {"piwik": ">=5.0.0-b1,<6.0.0-b1"}},
                        {"name": "4.0.0", "download": "/api/2.0/plugins/CustomAlerts/download/4.0.0",
                         "requires": []}
                    ]
                }"#,
            )
            .create();

        let index = index_for(&server, RecordingVerifier::default());
        let info = index.plugin_info("CustomAlerts", "5.1.2", None).unwrap();
        assert!(info.downloadable);
        assert_eq!(info.latest_version.as_deref(), Some("5.0.4"));
        assert_eq!(
            info.releases[0].download_url,
            format!("{}/api/2.0/plugins/CustomAlerts/download/5.0.4", server.url())
        );
        assert_eq!(
            info.releases[0].requires_core.as_deref(),
            Some(">=5.0.0-b1,<6.0.0-b1")
        );
        assert_eq!(info.releases[1].requires_core, None);
    }

    #[test]
    fn test_denied_license_retries_anonymously() {
        let mut server = Server::new();
        let denied = server
            .mock("POST", "/download/Foo.zip")
            .match_body(Matcher::UrlEncoded("access_token".into(), "bad-key".into()))
            .with_status(403)
            .expect(1)
            .create();
        let anonymous = server
            .mock("POST", "/download/Foo.zip")
            .match_body(Matcher::Missing)
            .with_body("plugin zip")
            .expect(1)
            .create();

        let index = index_for(&server, RecordingVerifier::default());
        let data = PluginIndex::download(
            &index,
            &format!("{}/download/Foo.zip", server.url()),
            Some("bad-key"),
        )
        .unwrap();
        assert_eq!(data, b"plugin zip");
        denied.assert();
        anonymous.assert();
    }

    #[test]
    fn test_anonymous_rejection_is_not_retried() {
        let mut server = Server::new();
        let denied = server
            .mock("POST", "/download/Foo.zip")
            .with_status(401)
            .expect(1)
            .create();

        let index = index_for(&server, RecordingVerifier::default());
        let err = PluginIndex::download(&index, &format!("{}/download/Foo.zip", server.url()), None)
            .unwrap_err();
        assert!(matches!(err, IndexError::Status { status: 401, .. }));
        denied.assert();
    }

    #[test]
    fn test_fetch_reports_status() {
        let mut server = Server::new();
        let _missing = server.mock("GET", "/gone.zip").with_status(404).create();
        let index = index_for(&server, RecordingVerifier::default());
        let err = index.fetch(&format!("{}/gone.zip", server.url())).unwrap_err();
        assert!(matches!(err, IndexError::Status { status: 404, .. }));
    }
}
