//! End-to-end build flow: registry files on disk, resolution, hooks, and
//! the download and extract stages running against an in-memory transport.

use std::fs;
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde_json::json;
use spc_artifact::{CacheType, Directories, Extractor, FetchKind, Fetcher, LockFile};
use spc_config::{Arch, OsFamily, Platform, Registry, RegistryLoader, RegistrySource, SystemTarget};
use spc_core::{
    ArtifactStages, BuildContext, Error, ErrorKind, HookModule, HookRegistrar, HookRegistry,
    HookSpec, Param, Pipeline, ResolveOptions, StageContext, StageDef, StageFrame,
};
use spc_test_utils::archive;
use spc_test_utils::registry::TestRegistry;
use spc_test_utils::transport::FakeTransport;
use tempfile::TempDir;

type Log = Arc<Mutex<Vec<String>>>;

const ZLIB_URL: &str = "https://zlib.net/zlib-1.3.1.tar.gz";
const LIBXML2_URL: &str = "https://gitlab.gnome.org/GNOME/libxml2.git";

const LINUX: Platform = Platform {
    os: OsFamily::Linux,
    arch: Arch::X86_64,
};

/// Patches zlib once its sources are on disk; adds intl flags only when
/// intl was selected.
struct Patches {
    log: Log,
}

impl HookModule for Patches {
    fn name(&self) -> &str {
        "patches"
    }

    fn register(&self, hooks: &mut HookRegistrar<'_>) {
        let log = self.log.clone();
        hooks.register(
            HookSpec::after("zlib", ["extract"]).param(Param::required::<Directories>("dirs")),
            move |args| {
                let dirs = args.require::<Directories>("dirs")?;
                fs::write(dirs.source.join("zlib/PATCHED"), "yes")
                    .map_err(|e| Error::action(e.to_string()))?;
                log.lock().unwrap().push("patch zlib".to_string());
                Ok(())
            },
        );

        let log = self.log.clone();
        hooks.register(
            HookSpec::before("php-cli", ["build"]).only_when_resolved("ext-intl"),
            move |_| {
                log.lock().unwrap().push("intl flags".to_string());
                Ok(())
            },
        );
    }
}

struct Workspace {
    dir: TempDir,
    dirs: Directories,
    registry: TestRegistry,
    transport: Arc<FakeTransport>,
    log: Log,
}

impl Workspace {
    fn new(zlib_source: serde_json::Value) -> Self {
        let dir = TempDir::new().unwrap();
        let dirs = Directories::under(dir.path());

        let registry = TestRegistry::new();
        registry.write_packages(
            "php.json",
            &json!({
                "php-cli": {
                    "type": "virtual-target",
                    "depends": ["zlib", "ext-dom"],
                    "suggests": ["ext-intl"]
                },
                "ext-dom": { "type": "php-extension", "depends": ["libxml2"] },
                "ext-intl": { "type": "php-extension" }
            }),
        );
        registry.write_packages(
            "libs.json",
            &json!({
                "zlib": { "type": "library", "artifact": "zlib" },
                "libxml2": { "type": "library", "artifact": "libxml2" }
            }),
        );
        registry.write_artifacts(
            "artifacts.json",
            &json!({
                "zlib": { "source": zlib_source },
                "libxml2": { "source": { "type": "git", "url": LIBXML2_URL, "rev": "v2.13.5" } }
            }),
        );

        let transport = Arc::new(FakeTransport::new());
        let tarball = dir.path().join("fixture-zlib.tar.gz");
        archive::tar_gz(
            &tarball,
            "zlib-1.3.1",
            &[("zlib.h", "#define ZLIB_VERSION \"1.3.1\""), ("configure", "#!/bin/sh")],
        );
        transport.serve_file(ZLIB_URL, &tarball);
        transport.serve_repo(LIBXML2_URL, &[("configure.ac", "AC_INIT")], "9c8e7f1a");

        Self {
            dir,
            dirs,
            registry,
            transport,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn load(&self) -> Arc<Registry> {
        let source = RegistrySource::from_root(self.registry.root()).unwrap();
        Arc::new(RegistryLoader::new().load(&[source]).unwrap())
    }

    fn context(&self) -> BuildContext {
        let patches = Patches {
            log: self.log.clone(),
        };
        let hooks = HookRegistry::discover(&[&patches]);
        BuildContext::resolve(
            self.load(),
            SystemTarget::for_platform(LINUX),
            &["php-cli"],
            &ResolveOptions::default(),
        )
        .unwrap()
        .with_hooks(hooks)
        .unwrap()
    }

    fn pipeline(&self) -> (Pipeline, Arc<Fetcher>) {
        let fetcher = Arc::new(Fetcher::new(self.dirs.clone(), self.transport.clone()).unwrap());
        let extractor = Arc::new(Extractor::new(self.dirs.clone(), self.transport.clone()));
        let mut pipeline = Pipeline::new();
        ArtifactStages::new(fetcher.clone(), extractor).install(&mut pipeline);

        let log = self.log.clone();
        pipeline.every_package(StageDef::new("build", move |_, package, _| {
            log.lock().unwrap().push(format!("build {}", package.name));
            Ok(())
        }));
        (pipeline, fetcher)
    }

    fn base(&self) -> StageContext {
        StageContext::new().with_typed(self.dirs.clone())
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[test]
fn test_full_build_flow() {
    let ws = Workspace::new(json!(ZLIB_URL));
    let ctx = ws.context();
    let (pipeline, fetcher) = ws.pipeline();

    assert_eq!(ctx.resolution().order, vec!["zlib", "libxml2", "ext-dom", "php-cli"]);
    assert_eq!(ctx.resolution().excluded_suggests[0].package, "ext-intl");

    pipeline.run(&ctx, &ws.base()).unwrap();

    assert_eq!(
        ws.log(),
        vec![
            "patch zlib",
            "build zlib",
            "build libxml2",
            "build ext-dom",
            "build php-cli"
        ]
    );
    let source = &ws.dirs.source;
    assert!(source.join("zlib/zlib.h").is_file());
    assert_eq!(fs::read_to_string(source.join("zlib/PATCHED")).unwrap(), "yes");
    assert!(source.join("zlib/.spc-hash").is_file());
    assert!(source.join("libxml2/configure.ac").is_file());
    assert!(!source.join("libxml2/.git").exists());

    let zlib = fetcher.locked("zlib", FetchKind::Source).unwrap();
    assert_eq!(zlib.cache_type, CacheType::Archive);
    let libxml2 = fetcher.locked("libxml2", FetchKind::Source).unwrap();
    assert_eq!(libxml2.cache_type, CacheType::Git);
    assert_eq!(libxml2.hash.as_deref(), Some("9c8e7f1a"));

    let lock = LockFile::open(&ws.dirs.lock_path()).unwrap();
    let locked: Vec<&str> = lock.iter().map(|(name, _)| name).collect();
    assert_eq!(locked, vec!["libxml2", "zlib"]);
    assert_eq!(ws.transport.fetch_count(), 2);
}

#[test]
fn test_second_run_reuses_lock_and_extracted_trees() {
    let ws = Workspace::new(json!(ZLIB_URL));
    let (pipeline, _) = ws.pipeline();
    pipeline.run(&ws.context(), &ws.base()).unwrap();
    let marker = fs::read_to_string(ws.dirs.source.join("zlib/.spc-hash")).unwrap();

    let (pipeline, _) = ws.pipeline();
    pipeline.run(&ws.context(), &ws.base()).unwrap();

    assert_eq!(ws.transport.fetch_count(), 2);
    assert_eq!(
        fs::read_to_string(ws.dirs.source.join("zlib/.spc-hash")).unwrap(),
        marker
    );
    assert_eq!(ws.log().iter().filter(|l| *l == "patch zlib").count(), 2);
}

#[test]
fn test_suggested_package_enables_gated_hook() {
    let ws = Workspace::new(json!(ZLIB_URL));
    let patches = Patches {
        log: ws.log.clone(),
    };
    let options = ResolveOptions {
        include_suggested: true,
        ..ResolveOptions::default()
    };
    let ctx = BuildContext::resolve(
        ws.load(),
        SystemTarget::for_platform(LINUX),
        &["php-cli"],
        &options,
    )
    .unwrap()
    .with_hooks(HookRegistry::discover(&[&patches]))
    .unwrap();
    let (pipeline, _) = ws.pipeline();

    pipeline.run(&ctx, &ws.base()).unwrap();

    let log = ws.log();
    let intl = log.iter().position(|l| l == "intl flags").unwrap();
    let build = log.iter().position(|l| l == "build php-cli").unwrap();
    assert!(intl < build);
    assert!(ctx.resolution().excluded_suggests.is_empty());
}

#[test]
fn test_checksum_mismatch_stops_the_build() {
    let ws = Workspace::new(json!({
        "type": "url",
        "url": ZLIB_URL,
        "sha256": spc_fs::checksum::compute_bytes_checksum(b"the real tarball")
    }));
    let (pipeline, fetcher) = ws.pipeline();

    let err = pipeline.run(&ws.context(), &ws.base()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Stage);
    assert_eq!(err.stack(), &[StageFrame::new("zlib", "download")]);
    assert!(matches!(
        err.root(),
        Error::Artifact(spc_artifact::Error::ChecksumMismatch { .. })
    ));
    assert!(ws.log().is_empty());
    assert!(fetcher.locked("zlib", FetchKind::Source).is_none());
    assert!(!ws.dirs.source.join("zlib").exists());
    assert!(ws.dir.path().join("fixture-zlib.tar.gz").is_file());
}

#[test]
fn test_hook_for_unknown_package_is_rejected_before_fetching() {
    struct Stray;
    impl HookModule for Stray {
        fn name(&self) -> &str {
            "stray"
        }

        fn register(&self, hooks: &mut HookRegistrar<'_>) {
            hooks.register(HookSpec::after("php-fpm", ["build"]), |_| Ok(()));
        }
    }

    let ws = Workspace::new(json!(ZLIB_URL));
    let err = BuildContext::resolve(
        ws.load(),
        SystemTarget::for_platform(LINUX),
        &["php-cli"],
        &ResolveOptions::default(),
    )
    .unwrap()
    .with_hooks(HookRegistry::discover(&[&Stray]))
    .err()
    .unwrap();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("php-fpm"));
    assert_eq!(ws.transport.fetch_count(), 0);
}
