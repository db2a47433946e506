//! Structural validation of registry records
//!
//! Each record is checked against a fixed field table before it is turned
//! into a typed [`Package`] or [`Artifact`]. Short-hand values (bare URLs,
//! `"custom"`) are expanded here so later stages only see full descriptors.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value};

use crate::fields::split_suffix;
use crate::platform::Platform;
use crate::schema::{
    Artifact, ArtifactRef, FetchSpec, License, Package, PackageKind, PhpExtension, SourceType,
};
use crate::{Error, Result};

const PACKAGE: &str = "package";
const ARTIFACT: &str = "artifact";
const DESCRIPTOR: &str = "artifact source";
const PHP_EXTENSION: &str = "php-extension";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldType {
    String,
    Bool,
    List,
    Object,
    License,
    ArtifactRef,
}

/// Package fields and their value types
const PACKAGE_FIELDS: &[(&str, FieldType)] = &[
    ("type", FieldType::String),
    ("depends", FieldType::List),
    ("suggests", FieldType::List),
    ("artifact", FieldType::ArtifactRef),
    ("license", FieldType::License),
    ("lang", FieldType::String),
    ("frameworks", FieldType::List),
    ("php-extension", FieldType::Object),
    ("headers", FieldType::List),
    ("static-libs", FieldType::List),
    ("pkg-configs", FieldType::List),
    ("static-bins", FieldType::List),
];

/// Fields that may carry a platform suffix
const SUFFIXABLE_FIELDS: &[&str] = &[
    "depends",
    "suggests",
    "headers",
    "static-libs",
    "static-bins",
    "frameworks",
];

const PHP_EXTENSION_FIELDS: &[(&str, FieldType)] = &[
    ("zend-extension", FieldType::Bool),
    ("support", FieldType::Object),
    ("arg-type", FieldType::String),
    ("build-shared", FieldType::Bool),
    ("build-static", FieldType::Bool),
    ("build-with-php", FieldType::Bool),
    ("notes", FieldType::Bool),
];

fn field_allowed(kind: PackageKind, base: &str) -> bool {
    match base {
        "type" | "depends" | "suggests" | "license" | "lang" | "artifact" | "frameworks" => true,
        "headers" | "static-libs" | "static-bins" | "pkg-configs" => {
            kind != PackageKind::VirtualTarget
        }
        "php-extension" => kind == PackageKind::PhpExtension,
        _ => false,
    }
}

/// Validate one package record and build its typed form.
pub fn package(file: &Path, name: &str, value: &Value) -> Result<Package> {
    let record = value
        .as_object()
        .ok_or_else(|| Error::invalid(file, PACKAGE, name, "record must be an object"))?;

    let kind_value = record
        .get("type")
        .ok_or_else(|| Error::missing_field(file, PACKAGE, name, "type"))?;
    let kind = kind_value
        .as_str()
        .and_then(PackageKind::parse)
        .ok_or_else(|| {
            Error::invalid(
                file,
                PACKAGE,
                name,
                format!("invalid type {kind_value}, expected library, php-extension, target or virtual-target"),
            )
        })?;

    for (key, field_value) in record {
        let (base, suffix) = split_suffix(key);
        let field_type = PACKAGE_FIELDS
            .iter()
            .find(|(field, _)| *field == base)
            .map(|(_, t)| *t)
            .filter(|_| field_allowed(kind, base))
            .ok_or_else(|| Error::unknown_field(file, PACKAGE, name, key.as_str()))?;

        if let Some(suffix) = suffix
            && !SUFFIXABLE_FIELDS.contains(&base)
        {
            return Err(Error::invalid(
                file,
                PACKAGE,
                name,
                format!("field [{base}] does not accept the platform suffix {suffix}"),
            ));
        }
        check_type(file, PACKAGE, name, key, field_value, field_type)?;
    }

    let artifact = match record.get("artifact") {
        None if kind.requires_artifact() => {
            return Err(Error::missing_field(file, PACKAGE, name, "artifact"));
        }
        None => None,
        Some(Value::String(artifact)) => Some(ArtifactRef::Named(artifact.clone())),
        Some(inline) if kind == PackageKind::PhpExtension => {
            Some(ArtifactRef::Inline(Box::new(artifact(file, name, inline)?)))
        }
        Some(_) => {
            return Err(Error::invalid(
                file,
                PACKAGE,
                name,
                format!("inline artifact objects are only allowed for php-extension packages, not {kind}"),
            ));
        }
    };

    let php_extension = match record.get("php-extension") {
        Some(Value::Object(ext)) => Some(php_extension(file, name, ext)?),
        _ => None,
    };

    Ok(Package {
        name: name.to_string(),
        kind,
        artifact,
        license: record.get("license").map(licenses).unwrap_or_default(),
        lang: record
            .get("lang")
            .and_then(Value::as_str)
            .map(str::to_string),
        php_extension,
        source_file: file.to_path_buf(),
        fields: record.clone(),
    })
}

fn php_extension(file: &Path, name: &str, ext: &Map<String, Value>) -> Result<PhpExtension> {
    for (key, value) in ext {
        let (base, suffix) = split_suffix(key);
        let field_type = PHP_EXTENSION_FIELDS
            .iter()
            .find(|(field, _)| *field == base)
            .map(|(_, t)| *t)
            .ok_or_else(|| {
                Error::unknown_field(file, PHP_EXTENSION, name, format!("php-extension.{key}"))
            })?;
        if suffix.is_some() && base != "arg-type" {
            return Err(Error::invalid(
                file,
                PHP_EXTENSION,
                name,
                format!("field [{base}] does not accept a platform suffix"),
            ));
        }
        check_type(file, PHP_EXTENSION, name, key, value, field_type)?;
    }
    Ok(PhpExtension::from_map(ext.clone()))
}

fn check_type(
    file: &Path,
    record_kind: &'static str,
    record: &str,
    key: &str,
    value: &Value,
    expected: FieldType,
) -> Result<()> {
    let ok = match expected {
        FieldType::String => value.is_string(),
        FieldType::Bool => value.is_boolean(),
        FieldType::Object => value.is_object(),
        FieldType::List => value
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string)),
        FieldType::License => is_license(value),
        FieldType::ArtifactRef => value.is_string() || value.is_object(),
    };
    if ok {
        return Ok(());
    }
    let expectation = match expected {
        FieldType::String => "a string",
        FieldType::Bool => "a boolean",
        FieldType::Object => "an object",
        FieldType::List => "a list of strings",
        FieldType::License => "a license object or a list of license objects",
        FieldType::ArtifactRef => "an artifact name or an inline artifact object",
    };
    Err(Error::invalid(
        file,
        record_kind,
        record,
        format!("[{key}] must be {expectation}"),
    ))
}

fn is_license(value: &Value) -> bool {
    fn single(value: &Value) -> bool {
        let Some(obj) = value.as_object() else {
            return false;
        };
        match obj.get("type").and_then(Value::as_str) {
            Some("file") => obj.get("path").is_some_and(Value::is_string),
            Some("text") => obj.get("text").is_some_and(Value::is_string),
            _ => false,
        }
    }
    match value {
        Value::Array(items) => !items.is_empty() && items.iter().all(single),
        other => single(other),
    }
}

fn licenses(value: &Value) -> Vec<License> {
    let one = |v: &Value| -> Option<License> {
        let obj = v.as_object()?;
        match obj.get("type")?.as_str()? {
            "file" => Some(License::File {
                path: obj.get("path")?.as_str()?.to_string(),
            }),
            "text" => Some(License::Text {
                text: obj.get("text")?.as_str()?.to_string(),
            }),
            _ => None,
        }
    };
    match value {
        Value::Array(items) => items.iter().filter_map(one).collect(),
        other => one(other).into_iter().collect(),
    }
}

/// Validate one artifact record and build its typed form.
pub fn artifact(file: &Path, name: &str, value: &Value) -> Result<Artifact> {
    let record = value
        .as_object()
        .ok_or_else(|| Error::invalid(file, ARTIFACT, name, "record must be an object"))?;

    let mut source = None;
    let mut source_mirror = None;
    let mut binary = BTreeMap::new();
    let mut binary_mirror = BTreeMap::new();
    let mut metadata = Map::new();

    for (key, field_value) in record {
        match key.as_str() {
            "source" => source = Some(descriptor(file, name, field_value)?),
            "source-mirror" => source_mirror = Some(descriptor(file, name, field_value)?),
            "binary" => binary = binaries(file, name, field_value)?,
            "binary-mirror" => binary_mirror = binaries(file, name, field_value)?,
            "metadata" => {
                metadata = field_value.as_object().cloned().ok_or_else(|| {
                    Error::invalid(file, ARTIFACT, name, "[metadata] must be an object")
                })?;
            }
            _ => return Err(Error::unknown_field(file, ARTIFACT, name, key.as_str())),
        }
    }

    if source.is_none() && binary.is_empty() {
        return Err(Error::missing_field(file, ARTIFACT, name, "source"));
    }

    Ok(Artifact {
        name: name.to_string(),
        source,
        source_mirror,
        binary,
        binary_mirror,
        metadata,
        source_file: file.to_path_buf(),
    })
}

fn binaries(file: &Path, name: &str, value: &Value) -> Result<BTreeMap<Platform, FetchSpec>> {
    match value {
        Value::String(s) if s == "custom" => Ok(Platform::supported()
            .into_iter()
            .map(|p| (p, FetchSpec::new(SourceType::Custom, Map::new())))
            .collect()),
        Value::Object(per_platform) => {
            let mut out = BTreeMap::new();
            for (platform, spec) in per_platform {
                let parsed = Platform::parse(platform)?;
                let record = format!("{name}::{platform}");
                out.insert(parsed, descriptor(file, &record, spec)?);
            }
            Ok(out)
        }
        _ => Err(Error::invalid(
            file,
            ARTIFACT,
            name,
            "[binary] must be \"custom\" or a map of platform to descriptor",
        )),
    }
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Validate a single fetch descriptor, expanding short-hand strings.
fn descriptor(file: &Path, record: &str, value: &Value) -> Result<FetchSpec> {
    let params = match value {
        Value::String(s) if s == "custom" => {
            return Ok(FetchSpec::new(SourceType::Custom, Map::new()));
        }
        Value::String(s) if is_http_url(s) => {
            let mut params = Map::new();
            params.insert("url".into(), Value::String(s.clone()));
            return Ok(FetchSpec::new(SourceType::Url, params));
        }
        Value::Object(obj) => obj,
        _ => {
            return Err(Error::invalid(
                file,
                DESCRIPTOR,
                record,
                "descriptor must be an object, an http(s) URL or \"custom\"",
            ));
        }
    };

    let type_name = params
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::invalid(file, DESCRIPTOR, record, "missing a valid 'type' field"))?;
    let source_type = SourceType::parse(type_name).ok_or_else(|| {
        Error::invalid(file, DESCRIPTOR, record, format!("unknown type '{type_name}'"))
    })?;

    for required in source_type.required_params() {
        if !params.contains_key(*required) {
            return Err(Error::missing_field(file, DESCRIPTOR, record, *required));
        }
    }

    let mut cleaned = Map::new();
    for (key, param) in params {
        if key == "type" {
            continue;
        }
        let known = key == "sha256"
            || source_type.required_params().contains(&key.as_str())
            || source_type.optional_params().contains(&key.as_str());
        if !known {
            return Err(Error::unknown_field(file, DESCRIPTOR, record, key.as_str()));
        }
        if key == "sha256" && !source_type.verifies_checksum() {
            return Err(Error::invalid(
                file,
                DESCRIPTOR,
                record,
                format!("parameter [sha256] cannot be verified for {source_type} sources"),
            ));
        }
        check_param(file, record, key, param)?;
        cleaned.insert(key.clone(), param.clone());
    }

    Ok(FetchSpec::new(source_type, cleaned))
}

fn check_param(file: &Path, record: &str, key: &str, value: &Value) -> Result<()> {
    let ok = match key {
        "submodules" | "prefer-stable" => value.is_boolean(),
        "extract" => match value {
            Value::String(_) => true,
            Value::Object(map) => map.values().all(Value::is_string),
            _ => false,
        },
        "sha256" => value
            .as_str()
            .and_then(spc_fs::checksum::normalize_checksum)
            .is_some(),
        _ => value.is_string(),
    };
    if ok {
        Ok(())
    } else {
        Err(Error::invalid(
            file,
            DESCRIPTOR,
            record,
            format!("parameter [{key}] has an invalid value {value}"),
        ))
    }
}
