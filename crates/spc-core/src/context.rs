//! Values available to hooks and how they are injected
//!
//! A [`StageContext`] holds values under string keys and, separately, one
//! value per type. Hooks declare the [`Param`]s they need; before a stage
//! runs every declared parameter is resolved in this order:
//!
//! 1. a keyed value whose name matches and whose type matches
//! 2. the value registered for the parameter's type
//! 3. the parameter's default
//! 4. `None` for nullable parameters
//!
//! Anything else is an [`Error::UnresolvableParameter`].

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use spc_config::Platform;

use crate::{Error, Result};

type Value = Arc<dyn Any + Send + Sync>;

/// Named and typed values handed to a stage
#[derive(Clone, Default)]
pub struct StageContext {
    keyed: HashMap<String, Value>,
    typed: HashMap<TypeId, Value>,
}

impl fmt::Debug for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.keyed.keys().collect();
        keys.sort();
        f.debug_struct("StageContext")
            .field("keys", &keys)
            .field("typed", &self.typed.len())
            .finish()
    }
}

impl StageContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) -> &mut Self {
        self.keyed.insert(key.into(), Arc::new(value));
        self
    }

    /// Store `value` as the fallback for parameters of type `T`.
    pub fn provide<T: Any + Send + Sync>(&mut self, value: T) -> &mut Self {
        self.typed.insert(TypeId::of::<T>(), Arc::new(value));
        self
    }

    pub fn with<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    pub fn with_typed<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.provide(value);
        self
    }

    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.keyed.get(key)?.downcast_ref()
    }

    pub fn get_typed<T: Any>(&self) -> Option<&T> {
        self.typed.get(&TypeId::of::<T>())?.downcast_ref()
    }

    fn lookup(&self, param: &Param) -> Option<Value> {
        if let Some(value) = self.keyed.get(&param.name)
            && (**value).type_id() == param.type_id
        {
            return Some(value.clone());
        }
        self.typed.get(&param.type_id).cloned()
    }
}

/// A parameter a hook asks to have injected
#[derive(Clone)]
pub struct Param {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    default: Option<Value>,
    nullable: bool,
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("name", &self.name)
            .field("type", &self.type_name)
            .field("default", &self.default.is_some())
            .field("nullable", &self.nullable)
            .finish()
    }
}

impl Param {
    fn of<T: Any + Send + Sync>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            default: None,
            nullable: false,
        }
    }

    /// A parameter that must be present in the context.
    pub fn required<T: Any + Send + Sync>(name: impl Into<String>) -> Self {
        Self::of::<T>(name)
    }

    /// A parameter that falls back to `default`.
    pub fn with_default<T: Any + Send + Sync>(name: impl Into<String>, default: T) -> Self {
        Self {
            default: Some(Arc::new(default)),
            ..Self::of::<T>(name)
        }
    }

    /// A parameter that is injected as absent when nothing matches.
    pub fn nullable<T: Any + Send + Sync>(name: impl Into<String>) -> Self {
        Self {
            nullable: true,
            ..Self::of::<T>(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Values injected into one hook invocation
pub struct HookArgs<'a> {
    package: &'a str,
    stage: &'a str,
    platform: Platform,
    values: HashMap<String, Option<Value>>,
}

impl<'a> HookArgs<'a> {
    /// Resolve every parameter in `params` against `context`.
    pub(crate) fn resolve(
        module: &str,
        params: &[Param],
        context: &StageContext,
        package: &'a str,
        stage: &'a str,
        platform: Platform,
    ) -> Result<Self> {
        let mut values = HashMap::with_capacity(params.len());
        for param in params {
            let value = match context.lookup(param) {
                Some(value) => Some(value),
                None if param.default.is_some() => param.default.clone(),
                None if param.nullable => None,
                None => {
                    return Err(Error::UnresolvableParameter {
                        module: module.to_string(),
                        parameter: param.name.clone(),
                        type_name: param.type_name,
                    });
                }
            };
            values.insert(param.name.clone(), value);
        }
        Ok(Self {
            package,
            stage,
            platform,
            values,
        })
    }

    pub fn package(&self) -> &str {
        self.package
    }

    pub fn stage(&self) -> &str {
        self.stage
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// The injected value of `name`, `None` when it was declared nullable
    /// and nothing matched, or when it was never declared.
    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.values.get(name)?.as_ref()?.downcast_ref()
    }

    /// The injected value of `name`, failing when absent.
    pub fn require<T: Any>(&self, name: &str) -> Result<&T> {
        self.get(name).ok_or_else(|| {
            Error::action(format!(
                "parameter [{name}] was not injected into the hook for {}::{}",
                self.package, self.stage
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use spc_config::{Arch, OsFamily};

    #[derive(Debug, PartialEq)]
    struct Toolchain(&'static str);

    fn args<'a>(params: &[Param], context: &StageContext) -> Result<HookArgs<'a>> {
        HookArgs::resolve(
            "test",
            params,
            context,
            "php",
            "build",
            Platform::new(OsFamily::Linux, Arch::X86_64),
        )
    }

    #[test]
    fn test_exact_key_wins_over_typed_value() {
        let context = StageContext::new()
            .with("toolchain", Toolchain("clang"))
            .with_typed(Toolchain("gcc"));
        let args = args(&[Param::required::<Toolchain>("toolchain")], &context).unwrap();
        assert_eq!(args.get::<Toolchain>("toolchain"), Some(&Toolchain("clang")));
    }

    #[test]
    fn test_key_with_wrong_type_falls_back_to_typed_value() {
        let context = StageContext::new()
            .with("toolchain", "clang".to_string())
            .with_typed(Toolchain("gcc"));
        let args = args(&[Param::required::<Toolchain>("toolchain")], &context).unwrap();
        assert_eq!(args.get::<Toolchain>("toolchain"), Some(&Toolchain("gcc")));
    }

    #[test]
    fn test_default_then_nullable() {
        let context = StageContext::new();
        let args = args(
            &[
                Param::with_default("jobs", 4usize),
                Param::nullable::<String>("prefix"),
            ],
            &context,
        )
        .unwrap();
        assert_eq!(args.get::<usize>("jobs"), Some(&4));
        assert_eq!(args.get::<String>("prefix"), None);
    }

    #[test]
    fn test_missing_required_parameter() {
        let err = args(&[Param::required::<Toolchain>("toolchain")], &StageContext::new())
            .err()
            .unwrap();
        match err {
            Error::UnresolvableParameter {
                module, parameter, ..
            } => {
                assert_eq!(module, "test");
                assert_eq!(parameter, "toolchain");
            }
            other => panic!("expected unresolvable parameter, got {other:?}"),
        }
    }

    #[test]
    fn test_require_reports_undeclared_names() {
        let args = args(&[], &StageContext::new()).unwrap();
        assert!(args.require::<String>("anything").is_err());
        assert_eq!(args.package(), "php");
        assert_eq!(args.stage(), "build");
    }
}
