//! Hook registration and lookup
//!
//! Hooks attach callbacks before or after a named stage of a package.
//! Modules register them explicitly through [`HookModule::register`];
//! [`HookRegistry::discover`] collects them without running anything.
//!
//! Hooks for the same package, stage and timing run sorted by declaring
//! module name, then in registration order within the module.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use spc_config::{Platform, Registry};

use crate::context::{HookArgs, Param};
use crate::resolver::Resolution;
use crate::{Error, Result};

/// Whether a hook runs before or after the primary action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timing {
    Before,
    After,
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before => write!(f, "before"),
            Self::After => write!(f, "after"),
        }
    }
}

/// Callback run by a hook
pub type HookFn = Arc<dyn Fn(&HookArgs<'_>) -> Result<()> + Send + Sync>;

/// Where and when a hook applies
#[derive(Debug, Clone)]
pub struct HookSpec {
    package: String,
    stages: Vec<String>,
    timing: Timing,
    platforms: Vec<Platform>,
    only_when_resolved: Option<String>,
    params: Vec<Param>,
}

impl HookSpec {
    fn new<I, S>(timing: Timing, package: impl Into<String>, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            package: package.into(),
            stages: stages.into_iter().map(Into::into).collect(),
            timing,
            platforms: Vec::new(),
            only_when_resolved: None,
            params: Vec::new(),
        }
    }

    /// Run before the given stages of `package`.
    pub fn before<I, S>(package: impl Into<String>, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Timing::Before, package, stages)
    }

    /// Run after the given stages of `package`.
    pub fn after<I, S>(package: impl Into<String>, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Timing::After, package, stages)
    }

    /// Restrict to these platforms; an empty list means all.
    pub fn on_platforms(mut self, platforms: impl IntoIterator<Item = Platform>) -> Self {
        self.platforms = platforms.into_iter().collect();
        self
    }

    /// Skip unless `package` is part of the current resolution.
    pub fn only_when_resolved(mut self, package: impl Into<String>) -> Self {
        self.only_when_resolved = Some(package.into());
        self
    }

    /// Declare a parameter to inject.
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }
}

/// A registered hook
#[derive(Clone)]
pub struct Hook {
    module: String,
    spec: HookSpec,
    callback: HookFn,
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("module", &self.module)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl Hook {
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn package(&self) -> &str {
        &self.spec.package
    }

    pub fn stages(&self) -> &[String] {
        &self.spec.stages
    }

    pub fn timing(&self) -> Timing {
        self.spec.timing
    }

    pub fn platforms(&self) -> &[Platform] {
        &self.spec.platforms
    }

    pub fn only_when_resolved(&self) -> Option<&str> {
        self.spec.only_when_resolved.as_deref()
    }

    pub fn params(&self) -> &[Param] {
        &self.spec.params
    }

    pub(crate) fn invoke(&self, args: &HookArgs<'_>) -> Result<()> {
        (self.callback)(args)
    }

    fn applies(&self, stage: &str, platform: Platform, resolution: &Resolution) -> bool {
        self.spec.stages.iter().any(|s| s == stage)
            && (self.spec.platforms.is_empty() || self.spec.platforms.contains(&platform))
            && self
                .spec
                .only_when_resolved
                .as_deref()
                .is_none_or(|gate| resolution.contains(gate))
    }
}

/// Something that contributes hooks
pub trait HookModule {
    /// Name used to order hooks across modules
    fn name(&self) -> &str;

    fn register(&self, hooks: &mut HookRegistrar<'_>);
}

/// Collects the hooks of one module
pub struct HookRegistrar<'a> {
    module: &'a str,
    hooks: Vec<Hook>,
}

impl HookRegistrar<'_> {
    pub fn register<F>(&mut self, spec: HookSpec, callback: F) -> &mut Self
    where
        F: Fn(&HookArgs<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.push(Hook {
            module: self.module.to_string(),
            spec,
            callback: Arc::new(callback),
        });
        self
    }
}

/// All hooks, indexed by target package
#[derive(Debug, Clone, Default)]
pub struct HookRegistry {
    by_package: BTreeMap<String, Vec<Hook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the hooks of every module. Callbacks are not run.
    pub fn discover(modules: &[&dyn HookModule]) -> Self {
        let mut collected: Vec<Hook> = Vec::new();
        for module in modules {
            let mut registrar = HookRegistrar {
                module: module.name(),
                hooks: Vec::new(),
            };
            module.register(&mut registrar);
            tracing::debug!(module = module.name(), count = registrar.hooks.len(), "registered hooks");
            collected.extend(registrar.hooks);
        }
        // Stable: registration order survives within a module.
        collected.sort_by(|a, b| a.module.cmp(&b.module));

        let mut by_package: BTreeMap<String, Vec<Hook>> = BTreeMap::new();
        for hook in collected {
            by_package
                .entry(hook.spec.package.clone())
                .or_default()
                .push(hook);
        }
        Self { by_package }
    }

    pub fn len(&self) -> usize {
        self.by_package.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_package.is_empty()
    }

    /// Every hook, grouped by package name
    pub fn iter(&self) -> impl Iterator<Item = &Hook> {
        self.by_package.values().flatten()
    }

    /// Hooks that run at `timing` of `stage` for `package` on `platform`.
    ///
    /// Gated hooks whose package is not in `resolution` are skipped.
    pub fn lookup(
        &self,
        package: &str,
        stage: &str,
        timing: Timing,
        platform: Platform,
        resolution: &Resolution,
    ) -> Vec<&Hook> {
        self.by_package
            .get(package)
            .map(|hooks| {
                hooks
                    .iter()
                    .filter(|h| h.spec.timing == timing && h.applies(stage, platform, resolution))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Check that every hook targets, and is gated on, known packages.
    pub fn verify(&self, registry: &Registry) -> Result<()> {
        for hook in self.iter() {
            for name in std::iter::once(hook.package()).chain(hook.only_when_resolved()) {
                if !registry.contains_package(name) {
                    return Err(Error::UnknownHookTarget {
                        module: hook.module.clone(),
                        package: name.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use spc_config::{Arch, OsFamily};

    const LINUX: Platform = Platform {
        os: OsFamily::Linux,
        arch: Arch::X86_64,
    };
    const MACOS: Platform = Platform {
        os: OsFamily::Darwin,
        arch: Arch::Aarch64,
    };

    struct Module {
        name: &'static str,
        specs: Vec<HookSpec>,
    }

    impl HookModule for Module {
        fn name(&self) -> &str {
            self.name
        }

        fn register(&self, hooks: &mut HookRegistrar<'_>) {
            for spec in &self.specs {
                hooks.register(spec.clone(), |_| Ok(()));
            }
        }
    }

    fn resolution(packages: &[&str]) -> Resolution {
        Resolution {
            order: packages.iter().map(|p| p.to_string()).collect(),
            excluded_suggests: Vec::new(),
            why: packages.iter().map(|p| (p.to_string(), Vec::new())).collect(),
        }
    }

    #[test]
    fn test_order_is_module_then_registration() {
        let zeta = Module {
            name: "zeta",
            specs: vec![HookSpec::before("php", ["build"])],
        };
        let alpha = Module {
            name: "alpha",
            specs: vec![
                HookSpec::before("php", ["build"]).param(Param::nullable::<u8>("first")),
                HookSpec::before("php", ["build"]).param(Param::nullable::<u8>("second")),
            ],
        };

        let registry = HookRegistry::discover(&[&zeta, &alpha]);
        let hooks = registry.lookup("php", "build", Timing::Before, LINUX, &resolution(&["php"]));

        let labels: Vec<(&str, Option<&str>)> = hooks
            .iter()
            .map(|h| (h.module(), h.params().first().map(Param::name)))
            .collect();
        assert_eq!(
            labels,
            vec![("alpha", Some("first")), ("alpha", Some("second")), ("zeta", None)]
        );
    }

    #[test]
    fn test_discover_is_deterministic() {
        let a = Module {
            name: "a",
            specs: vec![HookSpec::after("zlib", ["build", "patch"])],
        };
        let b = Module {
            name: "b",
            specs: vec![HookSpec::before("php", ["configure"])],
        };
        let first = HookRegistry::discover(&[&a, &b]);
        let second = HookRegistry::discover(&[&b, &a]);

        let describe = |r: &HookRegistry| -> Vec<String> {
            r.iter()
                .map(|h| format!("{}:{}:{}", h.module(), h.package(), h.timing()))
                .collect()
        };
        assert_eq!(describe(&first), describe(&second));
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let module = Module {
            name: "m",
            specs: vec![
                HookSpec::before("php", ["build"]),
                HookSpec::before("php", ["configure"]),
                HookSpec::after("php", ["build"]),
                HookSpec::before("php", ["build"]).on_platforms([MACOS]),
                HookSpec::before("php", ["build"]).only_when_resolved("openssl"),
            ],
        };
        let registry = HookRegistry::discover(&[&module]);

        let plain = registry.lookup("php", "build", Timing::Before, LINUX, &resolution(&["php"]));
        assert_eq!(plain.len(), 1);

        let gated = registry.lookup(
            "php",
            "build",
            Timing::Before,
            LINUX,
            &resolution(&["php", "openssl"]),
        );
        assert_eq!(gated.len(), 2);

        let mac = registry.lookup("php", "build", Timing::Before, MACOS, &resolution(&["php"]));
        assert_eq!(mac.len(), 2);

        assert!(
            registry
                .lookup("zlib", "build", Timing::Before, LINUX, &resolution(&["zlib"]))
                .is_empty()
        );
    }

    #[rstest]
    #[case("patch", Timing::After, 1)]
    #[case("build", Timing::After, 1)]
    #[case("build", Timing::Before, 0)]
    #[case("install", Timing::After, 0)]
    fn test_multi_stage_hook_matches_each_stage(
        #[case] stage: &str,
        #[case] timing: Timing,
        #[case] expected: usize,
    ) {
        let module = Module {
            name: "m",
            specs: vec![HookSpec::after("zlib", ["patch", "build"])],
        };
        let registry = HookRegistry::discover(&[&module]);
        let found = registry.lookup("zlib", stage, timing, LINUX, &resolution(&["zlib"]));
        assert_eq!(found.len(), expected);
    }

    #[test]
    fn test_verify_rejects_unknown_targets() {
        let registry = Registry::from_values(
            &serde_json::json!({ "php": { "type": "virtual-target" } }),
            &serde_json::json!({}),
        )
        .unwrap();

        let good = Module {
            name: "good",
            specs: vec![HookSpec::before("php", ["build"])],
        };
        assert!(HookRegistry::discover(&[&good]).verify(&registry).is_ok());

        let bad_gate = Module {
            name: "bad",
            specs: vec![HookSpec::before("php", ["build"]).only_when_resolved("ghost")],
        };
        let err = HookRegistry::discover(&[&bad_gate])
            .verify(&registry)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownHookTarget { ref package, .. } if package == "ghost"));
    }
}
