//! Dependency graph resolution
//!
//! Produces a build order in which every package appears after all of its
//! dependencies. The traversal is a depth-first post-order walk with an
//! explicit stack, so deep graphs never exhaust the call stack.
//!
//! # Example
//!
//! ```ignore
//! use spc_core::resolver::{DependencyResolver, ResolveOptions};
//!
//! let resolver = DependencyResolver::new(&registry, OsFamily::Linux);
//! let resolution = resolver.resolve(&["php-cli"], &ResolveOptions::default())?;
//! for package in &resolution.order {
//!     println!("{package}");
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};

use spc_config::{OsFamily, Registry};

use crate::{Error, Result};

/// Knobs for one resolution
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Treat `suggests` edges like `depends` edges
    pub include_suggested: bool,
    /// Replacement `depends` lists keyed by package name
    pub overrides: BTreeMap<String, Vec<String>>,
}

/// A suggested package left out of the resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedSuggest {
    pub package: String,
    /// Packages that suggested it, in discovery order
    pub suggested_by: Vec<String>,
}

/// Outcome of [`DependencyResolver::resolve`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Dependencies first
    pub order: Vec<String>,
    pub excluded_suggests: Vec<ExcludedSuggest>,
    /// Package name to the packages that pulled it in; requested roots map
    /// to an empty list.
    pub why: BTreeMap<String, Vec<String>>,
}

impl Resolution {
    pub fn contains(&self, package: &str) -> bool {
        self.why.contains_key(package)
    }

    pub fn position(&self, package: &str) -> Option<usize> {
        self.order.iter().position(|p| p == package)
    }

    /// Every resolved package name
    pub fn packages(&self) -> BTreeSet<&str> {
        self.order.iter().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

struct Frame {
    name: String,
    children: Vec<String>,
    next: usize,
}

/// Resolves requested package names against a registry for one OS.
pub struct DependencyResolver<'a> {
    registry: &'a Registry,
    os: OsFamily,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(registry: &'a Registry, os: OsFamily) -> Self {
        Self { registry, os }
    }

    fn children(&self, name: &str, options: &ResolveOptions) -> Result<Vec<String>> {
        let package = self
            .registry
            .package(name)
            .ok_or_else(|| Error::UnresolvedReference {
                referrer: None,
                missing: name.to_string(),
            })?;
        let mut children = match options.overrides.get(name) {
            Some(list) => list.clone(),
            None => package.depends(self.os),
        };
        if options.include_suggested {
            for suggest in package.suggests(self.os) {
                if !children.contains(&suggest) {
                    children.push(suggest);
                }
            }
        }
        Ok(children)
    }

    /// Compute the build order for `requested`.
    ///
    /// Fails with [`Error::Cycle`] when a package is reached again while
    /// one of its own dependencies is still being visited, and with
    /// [`Error::UnresolvedReference`] for names the registry does not know.
    pub fn resolve<S: AsRef<str>>(
        &self,
        requested: &[S],
        options: &ResolveOptions,
    ) -> Result<Resolution> {
        let mut marks: HashMap<String, Mark> = HashMap::new();
        let mut why: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut order = Vec::new();

        for root in requested.iter().map(AsRef::as_ref) {
            if marks.contains_key(root) {
                continue;
            }
            let mut stack = vec![Frame {
                name: root.to_string(),
                children: self.children(root, options)?,
                next: 0,
            }];
            marks.insert(root.to_string(), Mark::InProgress);
            why.entry(root.to_string()).or_default();

            while let Some(top) = stack.last_mut() {
                if top.next == top.children.len() {
                    if let Some(done) = stack.pop() {
                        marks.insert(done.name.clone(), Mark::Done);
                        order.push(done.name);
                    }
                    continue;
                }

                let child = top.children[top.next].clone();
                top.next += 1;
                let parent = top.name.clone();

                let pulled_by = why.entry(child.clone()).or_default();
                if !pulled_by.contains(&parent) {
                    pulled_by.push(parent.clone());
                }

                match marks.get(&child) {
                    Some(Mark::Done) => {}
                    Some(Mark::InProgress) => {
                        let start = stack.iter().position(|f| f.name == child).unwrap_or(0);
                        let mut chain: Vec<String> =
                            stack[start..].iter().map(|f| f.name.clone()).collect();
                        chain.push(child);
                        return Err(Error::Cycle { chain });
                    }
                    None => {
                        if !self.registry.contains_package(&child) {
                            return Err(Error::UnresolvedReference {
                                referrer: Some(parent),
                                missing: child,
                            });
                        }
                        let children = self.children(&child, options)?;
                        marks.insert(child.clone(), Mark::InProgress);
                        stack.push(Frame {
                            name: child,
                            children,
                            next: 0,
                        });
                    }
                }
            }
        }

        let excluded_suggests = if options.include_suggested {
            Vec::new()
        } else {
            self.excluded_suggests(&order, &marks)
        };

        Ok(Resolution {
            order,
            excluded_suggests,
            why,
        })
    }

    fn excluded_suggests(
        &self,
        order: &[String],
        marks: &HashMap<String, Mark>,
    ) -> Vec<ExcludedSuggest> {
        let mut excluded: Vec<ExcludedSuggest> = Vec::new();
        for name in order {
            let Some(package) = self.registry.package(name) else {
                continue;
            };
            for suggest in package.suggests(self.os) {
                if marks.contains_key(&suggest) {
                    continue;
                }
                match excluded.iter_mut().find(|e| e.package == suggest) {
                    Some(entry) => entry.suggested_by.push(name.clone()),
                    None => excluded.push(ExcludedSuggest {
                        package: suggest,
                        suggested_by: vec![name.clone()],
                    }),
                }
            }
        }
        excluded
    }
}
