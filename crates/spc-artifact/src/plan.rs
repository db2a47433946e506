//! Turning fetch descriptors into concrete download plans
//!
//! Index-backed strategies (GitHub, Bitbucket, file lists, PIE and PHP
//! releases) query their endpoints through the [`Transport`] to find out
//! which file to download.

use std::cmp::Ordering;
use std::path::PathBuf;

use regex::Regex;
use serde_json::{Map, Value};
use spc_config::{Artifact, FetchSpec, SourceType};

use crate::transport::Transport;
use crate::{Error, Result};

const GITHUB_API: &str = "https://api.github.com/repos";
const BITBUCKET_API: &str = "https://api.bitbucket.org/2.0/repositories";
const PACKAGIST: &str = "https://repo.packagist.org/p2";
const PHP_RELEASES: &str = "https://www.php.net/releases/index.php";
const PHP_DISTRIBUTIONS: &str = "https://www.php.net/distributions";

/// Version markers that exclude a file-list entry
const UNSTABLE_MARKERS: &[&str] = &["alpha", "beta", "rc", "pre", "nightly", "snapshot", "dev"];

/// What the fetcher has to do for one descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum FetchPlan {
    Download {
        url: String,
        filename: String,
        version: Option<String>,
        headers: Vec<(String, String)>,
        /// Hash published by the index or declared in the registry
        expected_hash: Option<String>,
        metadata: Map<String, Value>,
    },
    Git {
        url: String,
        rev: String,
        dirname: String,
        submodules: bool,
    },
    Local {
        path: PathBuf,
    },
    Custom,
}

/// Resolves descriptors against their upstream indexes
pub struct Planner<'a> {
    transport: &'a dyn Transport,
    retries: u32,
    github_token: Option<&'a str>,
    php_version: &'a str,
}

impl<'a> Planner<'a> {
    pub fn new(transport: &'a dyn Transport, retries: u32) -> Self {
        Self {
            transport,
            retries,
            github_token: None,
            php_version: "8.4",
        }
    }

    pub fn github_token(mut self, token: Option<&'a str>) -> Self {
        self.github_token = token;
        self
    }

    pub fn php_version(mut self, version: &'a str) -> Self {
        self.php_version = version;
        self
    }

    /// Build the plan for `spec`, one of the descriptors of `artifact`.
    pub fn plan(&self, artifact: &Artifact, spec: &FetchSpec) -> Result<FetchPlan> {
        let name = artifact.name.as_str();
        let mut plan = match spec.source_type {
            SourceType::Url => self.url(name, spec)?,
            SourceType::Git => FetchPlan::Git {
                url: required(name, spec, "url")?.to_string(),
                rev: required(name, spec, "rev")?.to_string(),
                dirname: name.to_string(),
                submodules: spec.flag("submodules", false),
            },
            SourceType::GitHubRelease => self.github_release(name, spec)?,
            SourceType::GitHubTarball => self.github_tarball(name, spec)?,
            SourceType::GitHubTagTarball => self.github_tag_tarball(name, spec)?,
            SourceType::BitbucketTag => self.bitbucket_tag(name, spec)?,
            SourceType::FileList => self.file_list(name, spec)?,
            SourceType::Pie => self.pie(name, spec)?,
            SourceType::PhpRelease => self.php_release(name)?,
            SourceType::Local => {
                let declared = PathBuf::from(required(name, spec, "dirname")?);
                let path = match artifact.source_file.parent() {
                    Some(base) if declared.is_relative() => base.join(declared),
                    _ => declared,
                };
                FetchPlan::Local { path }
            }
            SourceType::Custom => FetchPlan::Custom,
        };

        if let FetchPlan::Download { expected_hash, .. } = &mut plan
            && let Some(declared) = spec.sha256()
        {
            *expected_hash = Some(declared);
        }
        tracing::debug!(artifact = name, strategy = %spec.source_type, ?plan, "planned fetch");
        Ok(plan)
    }

    fn url(&self, artifact: &str, spec: &FetchSpec) -> Result<FetchPlan> {
        let url = required(artifact, spec, "url")?;
        let filename = spec
            .param("filename")
            .map(str::to_string)
            .unwrap_or_else(|| filename_from_url(url));
        Ok(download(url, filename, spec.param("version").map(str::to_string)))
    }

    /// Headers for GitHub downloads
    fn github_auth(&self) -> Vec<(String, String)> {
        self.github_token
            .map(|token| ("Authorization".to_string(), format!("Bearer {token}")))
            .into_iter()
            .collect()
    }

    /// Headers for GitHub API queries
    fn github_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("Accept".to_string(), "application/vnd.github+json".to_string())];
        headers.extend(self.github_auth());
        headers
    }

    fn get_json(&self, artifact: &str, url: &str, headers: &[(String, String)]) -> Result<Value> {
        let body = self.transport.get_text(url, self.retries, headers)?;
        serde_json::from_str(&body).map_err(|e| index_error(artifact, url, format!("invalid JSON: {e}")))
    }

    fn github_releases(&self, artifact: &str, repo: &str) -> Result<(String, Vec<Value>)> {
        let url = format!("{GITHUB_API}/{repo}/releases");
        let releases = self.get_json(artifact, &url, &self.github_headers())?;
        match releases {
            Value::Array(items) => Ok((url, items)),
            _ => Err(index_error(artifact, &url, "expected a list of releases")),
        }
    }

    fn github_release(&self, artifact: &str, spec: &FetchSpec) -> Result<FetchPlan> {
        let repo = required(artifact, spec, "repo")?;
        let pattern = compile(artifact, required(artifact, spec, "match")?)?;
        let prefer_stable = spec.flag("prefer-stable", true);
        let (url, releases) = self.github_releases(artifact, repo)?;

        for release in &releases {
            if prefer_stable && release["prerelease"].as_bool().unwrap_or(false) {
                continue;
            }
            let assets = release["assets"].as_array().into_iter().flatten();
            for asset in assets {
                let Some(name) = asset["name"].as_str() else {
                    continue;
                };
                if !pattern.is_match(name) {
                    continue;
                }
                let Some(download_url) = asset["browser_download_url"].as_str() else {
                    continue;
                };
                let tag = release["tag_name"].as_str().map(str::to_string);
                let mut plan = download(download_url, name.to_string(), tag.clone());
                if let FetchPlan::Download {
                    headers,
                    expected_hash,
                    metadata,
                    ..
                } = &mut plan
                {
                    *headers = self.github_auth();
                    *expected_hash = asset["digest"]
                        .as_str()
                        .and_then(spc_fs::checksum::normalize_checksum);
                    if let Some(tag) = tag {
                        metadata.insert("tag".into(), Value::String(tag));
                    }
                    metadata.insert("asset".into(), Value::String(download_url.to_string()));
                }
                return Ok(plan);
            }
        }
        Err(index_error(
            artifact,
            &url,
            format!("no release asset matches '{}'", pattern.as_str()),
        ))
    }

    fn github_tarball(&self, artifact: &str, spec: &FetchSpec) -> Result<FetchPlan> {
        let repo = required(artifact, spec, "repo")?;
        let pattern = spec.param("match").map(|m| compile(artifact, m)).transpose()?;
        let prefer_stable = spec.flag("prefer-stable", true);
        let (url, releases) = self.github_releases(artifact, repo)?;

        let release = releases
            .iter()
            .filter(|r| !(prefer_stable && r["prerelease"].as_bool().unwrap_or(false)))
            .find(|r| {
                let tag = r["tag_name"].as_str().unwrap_or_default();
                pattern.as_ref().is_none_or(|p| p.is_match(tag))
            })
            .ok_or_else(|| index_error(artifact, &url, "no matching release"))?;
        self.tarball_plan(artifact, &url, release, "tag_name")
    }

    fn github_tag_tarball(&self, artifact: &str, spec: &FetchSpec) -> Result<FetchPlan> {
        let repo = required(artifact, spec, "repo")?;
        let pattern = spec.param("match").map(|m| compile(artifact, m)).transpose()?;
        let prefer_stable = spec.flag("prefer-stable", true);
        let url = format!("{GITHUB_API}/{repo}/tags");
        let tags = self.get_json(artifact, &url, &self.github_headers())?;

        let tag = tags
            .as_array()
            .into_iter()
            .flatten()
            .filter(|t| {
                let name = t["name"].as_str().unwrap_or_default();
                !(prefer_stable && is_unstable(name))
            })
            .find(|t| {
                let name = t["name"].as_str().unwrap_or_default();
                pattern.as_ref().is_none_or(|p| p.is_match(name))
            })
            .ok_or_else(|| index_error(artifact, &url, "no matching tag"))?;
        self.tarball_plan(artifact, &url, tag, "name")
    }

    fn tarball_plan(&self, artifact: &str, index: &str, item: &Value, tag_key: &str) -> Result<FetchPlan> {
        let tag = item[tag_key]
            .as_str()
            .ok_or_else(|| index_error(artifact, index, format!("entry without {tag_key}")))?;
        let tarball = item["tarball_url"]
            .as_str()
            .ok_or_else(|| index_error(artifact, index, "entry without tarball_url"))?;
        let mut plan = download(tarball, format!("{artifact}-{tag}.tar.gz"), Some(tag.to_string()));
        if let FetchPlan::Download { headers, metadata, .. } = &mut plan {
            *headers = self.github_auth();
            metadata.insert("tag".into(), Value::String(tag.to_string()));
        }
        Ok(plan)
    }

    fn bitbucket_tag(&self, artifact: &str, spec: &FetchSpec) -> Result<FetchPlan> {
        let repo = required(artifact, spec, "repo")?;
        let url = format!("{BITBUCKET_API}/{repo}/refs/tags");
        let tags = self.get_json(artifact, &url, &[])?;
        let version = tags["values"][0]["name"]
            .as_str()
            .ok_or_else(|| index_error(artifact, &url, "no tags published"))?;
        Ok(download(
            &format!("https://bitbucket.org/{repo}/get/{version}.tar.gz"),
            format!("{artifact}-{version}.tar.gz"),
            Some(version.to_string()),
        ))
    }

    fn file_list(&self, artifact: &str, spec: &FetchSpec) -> Result<FetchPlan> {
        let url = required(artifact, spec, "url")?;
        let pattern = compile(artifact, required(artifact, spec, "regex")?)?;
        let page = self.transport.get_text(url, self.retries, &[])?;

        let mut best: Option<(String, String)> = None;
        for captures in pattern.captures_iter(&page) {
            let (Some(version), Some(file)) = (captures.name("version"), captures.name("file")) else {
                continue;
            };
            let version = version.as_str();
            if is_unstable(version) {
                continue;
            }
            let newer = best
                .as_ref()
                .is_none_or(|(current, _)| compare_versions(version, current) == Ordering::Greater);
            if newer {
                best = Some((version.to_string(), file.as_str().to_string()));
            }
        }

        let (version, file) = best.ok_or_else(|| {
            index_error(
                artifact,
                url,
                format!("no stable entry matches '{}' (named groups 'version' and 'file' are required)", pattern.as_str()),
            )
        })?;
        let download_url = match spec.param("download-url") {
            Some(template) => template.replace("{file}", &file).replace("{version}", &version),
            None if url.ends_with('/') => format!("{url}{file}"),
            None => format!("{url}/{file}"),
        };
        let filename = filename_from_url(&file);
        Ok(download(&download_url, filename, Some(version)))
    }

    fn pie(&self, artifact: &str, spec: &FetchSpec) -> Result<FetchPlan> {
        let repo = required(artifact, spec, "repo")?;
        let url = format!("{PACKAGIST}/{repo}.json");
        let index = self.get_json(artifact, &url, &[])?;
        let latest = &index["packages"][repo][0];
        let version = latest["version"]
            .as_str()
            .ok_or_else(|| index_error(artifact, &url, "package has no published version"))?;
        let dist_url = latest["dist"]["url"]
            .as_str()
            .ok_or_else(|| index_error(artifact, &url, "package has no dist url"))?;
        let extension = match latest["dist"]["type"].as_str() {
            Some("zip") => "zip",
            _ => "tar.gz",
        };
        let filename = format!("{}-{version}.{extension}", repo.replace('/', "_"));
        Ok(download(dist_url, filename, Some(version.to_string())))
    }

    fn php_release(&self, artifact: &str) -> Result<FetchPlan> {
        let url = format!("{PHP_RELEASES}?json&version={}", self.php_version);
        let release = self.get_json(artifact, &url, &[])?;
        let version = release["version"]
            .as_str()
            .ok_or_else(|| index_error(artifact, &url, format!("unknown PHP version {}", self.php_version)))?;
        let source = release["source"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|s| s["filename"].as_str().is_some_and(|f| f.ends_with(".tar.xz")))
            .ok_or_else(|| index_error(artifact, &url, "release has no .tar.xz source"))?;
        let filename = source["filename"].as_str().unwrap_or_default().to_string();

        let mut plan = download(
            &format!("{PHP_DISTRIBUTIONS}/{filename}"),
            filename,
            Some(version.to_string()),
        );
        if let FetchPlan::Download { expected_hash, .. } = &mut plan {
            *expected_hash = source["sha256"]
                .as_str()
                .and_then(spc_fs::checksum::normalize_checksum);
        }
        Ok(plan)
    }
}

fn download(url: &str, filename: String, version: Option<String>) -> FetchPlan {
    FetchPlan::Download {
        url: url.to_string(),
        filename,
        version,
        headers: Vec::new(),
        expected_hash: None,
        metadata: Map::new(),
    }
}

fn required<'s>(artifact: &str, spec: &'s FetchSpec, key: &str) -> Result<&'s str> {
    spec.param(key).ok_or_else(|| Error::Index {
        artifact: artifact.to_string(),
        url: String::new(),
        message: format!("{} descriptor is missing [{key}]", spec.source_type),
    })
}

fn compile(artifact: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Index {
        artifact: artifact.to_string(),
        url: String::new(),
        message: format!("invalid pattern '{pattern}': {e}"),
    })
}

fn index_error(artifact: &str, url: &str, message: impl Into<String>) -> Error {
    Error::Index {
        artifact: artifact.to_string(),
        url: url.to_string(),
        message: message.into(),
    }
}

/// Last path segment of a URL without query or fragment.
pub fn filename_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_string()
}

fn is_unstable(version: &str) -> bool {
    let lower = version.to_ascii_lowercase();
    UNSTABLE_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Order version strings, preferring semver and falling back to numeric
/// components (`1.10` > `1.9`).
fn compare_versions(a: &str, b: &str) -> Ordering {
    let trimmed = |v: &str| v.trim_start_matches(['v', 'V']).to_string();
    if let (Ok(left), Ok(right)) = (
        semver::Version::parse(&trimmed(a)),
        semver::Version::parse(&trimmed(b)),
    ) {
        return left.cmp(&right);
    }
    let numbers = |v: &str| -> Vec<u64> {
        v.split(|c: char| !c.is_ascii_digit())
            .filter(|part| !part.is_empty())
            .filter_map(|part| part.parse().ok())
            .collect()
    };
    numbers(a).cmp(&numbers(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("https://zlib.net/zlib-1.3.1.tar.gz", "zlib-1.3.1.tar.gz")]
    #[case("https://example.com/get/file.zip?token=abc", "file.zip")]
    #[case("https://example.com/dir/", "dir")]
    fn filename_is_last_segment(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(filename_from_url(url), expected);
    }

    #[rstest]
    #[case("1.10.0", "1.9.2", Ordering::Greater)]
    #[case("2.13", "2.9", Ordering::Greater)]
    #[case("v3.0.0", "3.0.0", Ordering::Equal)]
    #[case("1.2", "1.2.1", Ordering::Less)]
    fn versions_compare_numerically(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        assert_eq!(compare_versions(a, b), expected);
    }

    #[test]
    fn unstable_markers_are_detected() {
        assert!(is_unstable("8.5.0RC1"));
        assert!(is_unstable("2.0-beta"));
        assert!(!is_unstable("2.13.4"));
    }
}
