//! Target platform model
//!
//! Platforms are written `os-arch` in registry files (`linux-x86_64`,
//! `macos-aarch64`). The OS family also drives which platform-suffixed
//! field variants apply (see [`crate::fields`]).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// Operating system family of a build target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OsFamily {
    Windows,
    Darwin,
    Linux,
    Bsd,
}

impl OsFamily {
    /// Suffix lookup order, most specific first. The empty string stands
    /// for the unsuffixed field.
    pub fn suffixes(self) -> &'static [&'static str] {
        match self {
            Self::Windows => &["@windows", ""],
            Self::Darwin => &["@macos", "@unix", ""],
            Self::Linux => &["@linux", "@unix", ""],
            Self::Bsd => &["@freebsd", "@bsd", "@unix", ""],
        }
    }

    /// Every suffix recognised in registry field names.
    pub fn all_suffixes() -> &'static [&'static str] {
        &["@windows", "@unix", "@macos", "@linux", "@freebsd", "@bsd"]
    }

    /// Parse an OS name as written in platform strings or by the host.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "windows" => Some(Self::Windows),
            "macos" | "darwin" => Some(Self::Darwin),
            "linux" => Some(Self::Linux),
            "freebsd" | "openbsd" | "netbsd" | "dragonfly" | "bsd" => Some(Self::Bsd),
            _ => None,
        }
    }

    pub fn is_unix(self) -> bool {
        !matches!(self, Self::Windows)
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Windows => write!(f, "windows"),
            Self::Darwin => write!(f, "macos"),
            Self::Linux => write!(f, "linux"),
            Self::Bsd => write!(f, "freebsd"),
        }
    }
}

/// CPU architecture of a build target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arch {
    X86_64,
    Aarch64,
}

impl Arch {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "x86_64" | "amd64" => Some(Self::X86_64),
            "aarch64" | "arm64" => Some(Self::Aarch64),
            _ => None,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X86_64 => write!(f, "x86_64"),
            Self::Aarch64 => write!(f, "aarch64"),
        }
    }
}

/// An `os-arch` pair such as `linux-x86_64`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Platform {
    pub os: OsFamily,
    pub arch: Arch,
}

impl Platform {
    pub fn new(os: OsFamily, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Platforms a prebuilt binary may be declared for.
    pub fn supported() -> [Platform; 5] {
        [
            Self::new(OsFamily::Linux, Arch::X86_64),
            Self::new(OsFamily::Linux, Arch::Aarch64),
            Self::new(OsFamily::Windows, Arch::X86_64),
            Self::new(OsFamily::Darwin, Arch::X86_64),
            Self::new(OsFamily::Darwin, Arch::Aarch64),
        ]
    }

    /// Parse a strict registry platform string.
    ///
    /// Only `windows`, `linux` and `macos` with `x86_64` or `aarch64` are
    /// accepted.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = |message: &str| Error::InvalidPlatform {
            value: value.to_string(),
            message: message.to_string(),
        };
        let (os, arch) = value
            .split_once('-')
            .ok_or_else(|| invalid("expected format 'os-arch'"))?;
        if arch.contains('-') {
            return Err(invalid("expected format 'os-arch'"));
        }
        let os = match os {
            "windows" => OsFamily::Windows,
            "linux" => OsFamily::Linux,
            "macos" => OsFamily::Darwin,
            other => return Err(invalid(&format!("unknown OS '{other}'"))),
        };
        let arch = match arch {
            "x86_64" => Arch::X86_64,
            "aarch64" => Arch::Aarch64,
            other => return Err(invalid(&format!("unknown architecture '{other}'"))),
        };
        Ok(Self { os, arch })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Platform {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Platform {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// C library flavor the toolchain links against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Libc {
    Glibc,
    Musl,
    Msvc,
    System,
}

/// Read-only facts about the host running the build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemTarget {
    pub platform: Platform,
    pub libc: Libc,
    pub cpu_count: usize,
}

impl SystemTarget {
    /// Describe the running host.
    pub fn current() -> Result<Self> {
        let os_name = std::env::consts::OS;
        let arch_name = std::env::consts::ARCH;
        let unsupported = || Error::UnsupportedHost {
            os: os_name.to_string(),
            arch: arch_name.to_string(),
        };
        let os = OsFamily::parse(os_name).ok_or_else(unsupported)?;
        let arch = Arch::parse(arch_name).ok_or_else(unsupported)?;

        let libc = if cfg!(target_env = "musl") {
            Libc::Musl
        } else if cfg!(target_env = "gnu") {
            Libc::Glibc
        } else if cfg!(target_env = "msvc") {
            Libc::Msvc
        } else {
            Libc::System
        };

        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Ok(Self {
            platform: Platform::new(os, arch),
            libc,
            cpu_count,
        })
    }

    /// Describe an explicit target, keeping host-independent defaults.
    pub fn for_platform(platform: Platform) -> Self {
        let libc = match platform.os {
            OsFamily::Windows => Libc::Msvc,
            OsFamily::Linux => Libc::Musl,
            OsFamily::Darwin | OsFamily::Bsd => Libc::System,
        };
        Self {
            platform,
            libc,
            cpu_count: 1,
        }
    }

    pub fn os(&self) -> OsFamily {
        self.platform.os
    }
}
