use std::fs;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use spc_artifact::{
    CacheType, Directories, Error, FetchKind, FetchPreference, Fetched, Fetcher, LockFile,
};
use spc_config::{Arch, Artifact, OsFamily, Platform, Registry};
use spc_fs::checksum::compute_bytes_checksum;
use spc_test_utils::transport::{Call, FakeTransport};
use tempfile::TempDir;

const ZLIB_URL: &str = "https://zlib.net/zlib-1.3.1.tar.gz";

fn artifact(name: &str, record: Value) -> Artifact {
    let registry = Registry::from_values(&json!({}), &json!({ name: record })).unwrap();
    registry.get_artifact(name).unwrap().clone()
}

fn setup() -> (TempDir, Directories, Arc<FakeTransport>) {
    let dir = TempDir::new().unwrap();
    let dirs = Directories::under(dir.path());
    (dir, dirs, Arc::new(FakeTransport::new()))
}

fn linux() -> Platform {
    Platform::new(OsFamily::Linux, Arch::X86_64)
}

#[test]
fn test_second_ensure_performs_no_transport_work() {
    let (_dir, dirs, transport) = setup();
    transport.serve(ZLIB_URL, "zlib tarball");
    let fetcher = Fetcher::new(dirs.clone(), transport.clone()).unwrap();
    let zlib = artifact("zlib", json!({ "source": ZLIB_URL }));

    let first = fetcher.ensure(&zlib, FetchKind::Source, false).unwrap();
    let second = fetcher.ensure(&zlib, FetchKind::Source, false).unwrap();

    assert_eq!(transport.fetch_count(), 1);
    assert_eq!(first, second);
    assert_eq!(first.filename.as_deref(), Some("zlib-1.3.1.tar.gz"));
    assert_eq!(first.cache_type, CacheType::Archive);
    assert_eq!(first.hash, Some(compute_bytes_checksum(b"zlib tarball")));
    assert!(!first.verified);
    assert!(dirs.downloads.join("zlib-1.3.1.tar.gz").is_file());

    let lock = LockFile::open(&dirs.lock_path()).unwrap();
    assert_eq!(lock.source("zlib"), Some(&first));
}

#[test]
fn test_force_and_missing_file_trigger_refetch() {
    let (_dir, dirs, transport) = setup();
    transport.serve(ZLIB_URL, "zlib tarball");
    let fetcher = Fetcher::new(dirs.clone(), transport.clone()).unwrap();
    let zlib = artifact("zlib", json!({ "source": ZLIB_URL }));

    fetcher.ensure(&zlib, FetchKind::Source, false).unwrap();
    fetcher.ensure(&zlib, FetchKind::Source, true).unwrap();
    assert_eq!(transport.fetch_count(), 2);

    fs::remove_file(dirs.downloads.join("zlib-1.3.1.tar.gz")).unwrap();
    fetcher.ensure(&zlib, FetchKind::Source, false).unwrap();
    assert_eq!(transport.fetch_count(), 3);
}

#[test]
fn test_checksum_mismatch_leaves_lock_untouched() {
    let (_dir, dirs, transport) = setup();
    transport.serve(ZLIB_URL, "tampered tarball");
    let fetcher = Fetcher::new(dirs.clone(), transport.clone()).unwrap();
    let expected = compute_bytes_checksum(b"original tarball");
    let zlib = artifact(
        "zlib",
        json!({ "source": { "type": "url", "url": ZLIB_URL, "sha256": expected } }),
    );

    let err = fetcher.ensure(&zlib, FetchKind::Source, false).unwrap_err();

    match err {
        Error::ChecksumMismatch {
            artifact,
            expected: declared,
            actual,
        } => {
            assert_eq!(artifact, "zlib");
            assert_eq!(declared, expected);
            assert_eq!(actual, compute_bytes_checksum(b"tampered tarball"));
        }
        other => panic!("expected ChecksumMismatch, got {other:?}"),
    }
    assert!(fetcher.locked("zlib", FetchKind::Source).is_none());
    assert!(!dirs.lock_path().exists());
    assert!(!dirs.downloads.join("zlib-1.3.1.tar.gz").exists());
    assert!(!dirs.downloads.join("zlib-1.3.1.tar.gz.part").exists());
}

#[test]
fn test_matching_checksum_marks_entry_verified() {
    let (_dir, dirs, transport) = setup();
    transport.serve(ZLIB_URL, "zlib tarball");
    let fetcher = Fetcher::new(dirs, transport).unwrap();
    let declared = compute_bytes_checksum(b"zlib tarball");
    let bare_hex = declared.trim_start_matches("sha256:").to_uppercase();
    let zlib = artifact(
        "zlib",
        json!({ "source": { "type": "url", "url": ZLIB_URL, "sha256": bare_hex } }),
    );

    let entry = fetcher.ensure(&zlib, FetchKind::Source, false).unwrap();
    assert!(entry.verified);
    assert_eq!(entry.hash, Some(declared));
}

#[test]
fn test_mirror_is_tried_when_primary_fails() {
    let (_dir, dirs, transport) = setup();
    let mirror = "https://mirror.example.com/zlib-1.3.1.tar.gz";
    transport.serve(mirror, "zlib tarball");
    let fetcher = Fetcher::new(dirs, transport.clone()).unwrap();
    let zlib = artifact("zlib", json!({ "source": ZLIB_URL, "source-mirror": mirror }));

    let entry = fetcher.ensure(&zlib, FetchKind::Source, false).unwrap();

    assert_eq!(entry.metadata["url"], mirror);
    assert_eq!(
        transport.calls(),
        vec![Call::Fetch(ZLIB_URL.to_string()), Call::Fetch(mirror.to_string())]
    );
}

#[test]
fn test_failed_fetch_without_mirror_reports_url() {
    let (_dir, dirs, transport) = setup();
    let fetcher = Fetcher::new(dirs, transport).unwrap();
    let zlib = artifact("zlib", json!({ "source": ZLIB_URL }));

    let err = fetcher.ensure(&zlib, FetchKind::Source, false).unwrap_err();
    assert_eq!(err.attempted().as_deref(), Some(ZLIB_URL));
}

#[test]
fn test_github_release_picks_stable_matching_asset() {
    let (_dir, dirs, transport) = setup();
    let digest = compute_bytes_checksum(b"openssl tarball");
    transport.serve_text(
        "https://api.github.com/repos/openssl/openssl/releases",
        &json!([
            {
                "tag_name": "openssl-3.5.0-beta1",
                "prerelease": true,
                "assets": [{ "name": "openssl-3.5.0-beta1.tar.gz", "browser_download_url": "https://gh/beta.tar.gz" }]
            },
            {
                "tag_name": "openssl-3.4.1",
                "prerelease": false,
                "assets": [
                    { "name": "openssl-3.4.1.tar.gz.asc", "browser_download_url": "https://gh/sig" },
                    { "name": "openssl-3.4.1.tar.gz", "browser_download_url": "https://gh/stable.tar.gz", "digest": digest }
                ]
            }
        ])
        .to_string(),
    );
    transport.serve("https://gh/stable.tar.gz", "openssl tarball");
    let fetcher = Fetcher::new(dirs, transport.clone())
        .unwrap()
        .with_github_token(Some("secret".to_string()));
    let openssl = artifact(
        "openssl",
        json!({ "source": { "type": "ghrel", "repo": "openssl/openssl", "match": "openssl.+\\.tar\\.gz$" } }),
    );

    let entry = fetcher.ensure(&openssl, FetchKind::Source, false).unwrap();

    assert_eq!(entry.filename.as_deref(), Some("openssl-3.4.1.tar.gz"));
    assert_eq!(entry.version.as_deref(), Some("openssl-3.4.1"));
    assert_eq!(entry.source_type, "github-release");
    assert!(entry.verified);
    assert!(
        transport
            .headers_for("https://api.github.com/repos/openssl/openssl/releases")
            .contains(&("Authorization".to_string(), "Bearer secret".to_string()))
    );
}

#[test]
fn test_file_list_takes_highest_stable_version() {
    let (_dir, dirs, transport) = setup();
    let listing = r#"
        <a href="libiconv-1.9.2.tar.gz">libiconv-1.9.2.tar.gz</a>
        <a href="libiconv-1.17.tar.gz">libiconv-1.17.tar.gz</a>
        <a href="libiconv-1.18-rc1.tar.gz">libiconv-1.18-rc1.tar.gz</a>
    "#;
    transport.serve_text("https://ftp.gnu.org/gnu/libiconv/", listing);
    transport.serve("https://ftp.gnu.org/gnu/libiconv/libiconv-1.17.tar.gz", "iconv");
    let fetcher = Fetcher::new(dirs, transport).unwrap();
    let iconv = artifact(
        "libiconv",
        json!({ "source": {
            "type": "filelist",
            "url": "https://ftp.gnu.org/gnu/libiconv/",
            "regex": "href=\"(?P<file>libiconv-(?P<version>[^\"]+)\\.tar\\.gz)\""
        } }),
    );

    let entry = fetcher.ensure(&iconv, FetchKind::Source, false).unwrap();

    assert_eq!(entry.version.as_deref(), Some("1.17"));
    assert_eq!(entry.filename.as_deref(), Some("libiconv-1.17.tar.gz"));
}

#[test]
fn test_git_source_records_commit() {
    let (_dir, dirs, transport) = setup();
    transport.serve_repo(
        "https://github.com/php/php-src.git",
        &[("configure.ac", "AC_INIT")],
        "4f2a1b7c",
    );
    let fetcher = Fetcher::new(dirs.clone(), transport.clone()).unwrap();
    let php = artifact(
        "php-src",
        json!({ "source": { "type": "git", "url": "https://github.com/php/php-src.git", "rev": "PHP-8.4" } }),
    );

    let entry = fetcher.ensure(&php, FetchKind::Source, false).unwrap();
    fetcher.ensure(&php, FetchKind::Source, false).unwrap();

    assert_eq!(entry.cache_type, CacheType::Git);
    assert_eq!(entry.dirname.as_deref(), Some("php-src"));
    assert_eq!(entry.hash.as_deref(), Some("4f2a1b7c"));
    assert_eq!(entry.version.as_deref(), Some("PHP-8.4"));
    assert!(dirs.downloads.join("php-src/configure.ac").is_file());
    assert_eq!(transport.fetch_count(), 1);
}

#[test]
fn test_custom_strategy_requires_registered_function() {
    let (_dir, dirs, transport) = setup();
    let musl = artifact("musl-toolchain", json!({ "binary": "custom" }));

    let fetcher = Fetcher::new(dirs.clone(), transport.clone()).unwrap();
    let err = fetcher
        .ensure(&musl, FetchKind::Binary(linux()), false)
        .unwrap_err();
    assert!(matches!(err, Error::CustomFetcherMissing { ref artifact } if artifact == "musl-toolchain"));

    let mut fetcher = Fetcher::new(dirs.clone(), transport).unwrap();
    fetcher.register_custom("musl-toolchain", |request| {
        let name = format!("musl-{}.tgz", request.kind.platform().map(|p| p.to_string()).unwrap_or_default());
        fs::write(request.downloads.join(&name), "toolchain").unwrap();
        Ok(Fetched {
            cache_type: CacheType::Archive,
            name,
            version: Some("1.2.5".into()),
            metadata: Default::default(),
        })
    });
    let entry = fetcher
        .ensure(&musl, FetchKind::Binary(linux()), false)
        .unwrap();

    assert_eq!(entry.filename.as_deref(), Some("musl-linux-x86_64.tgz"));
    assert_eq!(entry.platform, Some(linux()));
    assert_eq!(entry.hash, Some(compute_bytes_checksum(b"toolchain")));
}

#[test]
fn test_failed_forced_clone_keeps_previous_tree() {
    let (_dir, dirs, transport) = setup();
    let url = "https://github.com/php/php-src.git";
    transport.serve_repo(url, &[("configure.ac", "AC_INIT")], "4f2a1b7c");
    let php = artifact(
        "php-src",
        json!({ "source": { "type": "git", "url": url, "rev": "PHP-8.4" } }),
    );
    let first = Fetcher::new(dirs.clone(), transport)
        .unwrap()
        .ensure(&php, FetchKind::Source, false)
        .unwrap();

    let offline = Fetcher::new(dirs.clone(), Arc::new(FakeTransport::new())).unwrap();
    let err = offline.ensure(&php, FetchKind::Source, true).unwrap_err();

    assert!(matches!(err, Error::Git { .. }));
    assert_eq!(offline.locked("php-src", FetchKind::Source), Some(first.clone()));
    assert!(first.exists(&dirs.downloads));
    assert!(dirs.downloads.join("php-src/configure.ac").is_file());
    let leftovers: Vec<String> = fs::read_dir(&dirs.downloads)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".part"))
        .collect();
    assert_eq!(leftovers, Vec::<String>::new());
}

#[test]
fn test_declared_hash_on_custom_directory_fails() {
    let (_dir, dirs, transport) = setup();
    let mut fetcher = Fetcher::new(dirs.clone(), transport).unwrap();
    fetcher.register_custom("php-sdk", |request| {
        fs::create_dir_all(request.downloads.join("php-sdk")).unwrap();
        Ok(Fetched {
            cache_type: CacheType::Git,
            name: "php-sdk".into(),
            version: None,
            metadata: Default::default(),
        })
    });
    let sdk = artifact(
        "php-sdk",
        json!({ "source": { "type": "custom", "sha256": compute_bytes_checksum(b"sdk") } }),
    );

    let err = fetcher.ensure(&sdk, FetchKind::Source, false).unwrap_err();

    assert!(matches!(err, Error::Unverifiable { ref artifact, .. } if artifact == "php-sdk"));
    assert!(fetcher.locked("php-sdk", FetchKind::Source).is_none());
}

#[test]
fn test_missing_binary_for_platform() {
    let (_dir, dirs, transport) = setup();
    let fetcher = Fetcher::new(dirs, transport).unwrap();
    let zlib = artifact("zlib", json!({ "source": ZLIB_URL }));

    let err = fetcher
        .ensure(&zlib, FetchKind::Binary(linux()), false)
        .unwrap_err();
    assert!(matches!(err, Error::NoBinary { .. }));
}

#[test]
fn test_prefer_binary_falls_back_to_source() {
    let (_dir, dirs, transport) = setup();
    transport.serve(ZLIB_URL, "zlib tarball");
    let fetcher = Fetcher::new(dirs, transport).unwrap();
    let zlib = artifact(
        "zlib",
        json!({
            "source": ZLIB_URL,
            "binary": { "linux-x86_64": "https://dl.static-php.dev/zlib-linux.tgz" }
        }),
    );

    let entry = fetcher
        .ensure_preferred(&zlib, linux(), FetchPreference::PreferBinary, false)
        .unwrap();
    assert_eq!(entry.kind(), FetchKind::Source);

    let err = fetcher
        .ensure_preferred(&zlib, linux(), FetchPreference::BinaryOnly, false)
        .unwrap_err();
    assert!(matches!(err, Error::Http { .. }));
}

#[test]
fn test_local_source_is_recorded_without_hash() {
    let (dir, dirs, transport) = setup();
    let local = dir.path().join("my-ext");
    fs::create_dir_all(&local).unwrap();
    let fetcher = Fetcher::new(dirs, transport.clone()).unwrap();
    let ext = artifact(
        "my-ext",
        json!({ "source": { "type": "local", "dirname": local.to_string_lossy() } }),
    );

    let entry = fetcher.ensure(&ext, FetchKind::Source, false).unwrap();

    assert_eq!(entry.cache_type, CacheType::Local);
    assert_eq!(entry.hash, None);
    assert_eq!(transport.fetch_count(), 0);
}

#[test]
fn test_missing_local_source() {
    let (dir, dirs, transport) = setup();
    let fetcher = Fetcher::new(dirs, transport).unwrap();
    let ext = artifact(
        "my-ext",
        json!({ "source": { "type": "local", "dirname": dir.path().join("absent").to_string_lossy() } }),
    );

    let err = fetcher.ensure(&ext, FetchKind::Source, false).unwrap_err();
    assert!(matches!(err, Error::LocalMissing { .. }));
}

#[test]
fn test_php_release_resolves_distribution() {
    let (_dir, dirs, transport) = setup();
    let sha = compute_bytes_checksum(b"php source");
    transport.serve_text(
        "https://www.php.net/releases/index.php?json&version=8.3",
        &json!({
            "version": "8.3.14",
            "source": [
                { "filename": "php-8.3.14.tar.gz", "sha256": "00" },
                { "filename": "php-8.3.14.tar.xz", "sha256": sha.trim_start_matches("sha256:") }
            ]
        })
        .to_string(),
    );
    transport.serve("https://www.php.net/distributions/php-8.3.14.tar.xz", "php source");
    let fetcher = Fetcher::new(dirs, transport)
        .unwrap()
        .with_php_version("8.3");
    let php = artifact("php-src", json!({ "source": { "type": "php-release" } }));

    let entry = fetcher.ensure(&php, FetchKind::Source, false).unwrap();

    assert_eq!(entry.version.as_deref(), Some("8.3.14"));
    assert!(entry.verified);
}
