//! Host platform detection, in the vocabulary registries use
//!
//! Manifest lists name platforms the way Go does (`linux`, `amd64`, `arm64`,
//! ...), so host names like `x86_64` or `aarch64` are normalized here. Values
//! with no known mapping pass through unchanged, and the `GOOS` / `GOARCH`
//! environment variables take precedence over the host.

use std::{env, ffi::CStr, fmt};

/// Environment variable overriding the detected operating system
pub const OS_OVERRIDE_VAR: &str = "GOOS";

/// Environment variable overriding the detected architecture
pub const ARCH_OVERRIDE_VAR: &str = "GOARCH";

/// Operating system, as named in manifest lists
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Os {
    Linux,
    Darwin,
    Windows,
    Other(String),
}

/// CPU architecture, as named in manifest lists
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Arch {
    Amd64,
    I386,
    Arm64,
    Arm,
    Other(String),
}

/// An `(os, arch)` pair to match against manifest list entries
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Os {
    /// Normalize a raw operating system name
    pub fn from_raw(raw: &str) -> Self {
        if raw.starts_with("linux") {
            Os::Linux
        } else if raw == "darwin" {
            Os::Darwin
        } else if raw == "windows" {
            Os::Windows
        } else {
            Os::Other(raw.to_owned())
        }
    }

    /// Registry name for this operating system
    pub fn as_str(&self) -> &str {
        match self {
            Os::Linux => "linux",
            Os::Darwin => "darwin",
            Os::Windows => "windows",
            Os::Other(s) => s.as_str(),
        }
    }
}

impl Arch {
    /// Normalize a raw machine architecture name
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "x86_64" | "amd64" => Arch::Amd64,
            "i386" | "i686" => Arch::I386,
            "aarch64" => Arch::Arm64,
            _ if raw.contains("arm") && raw.contains("64") => Arch::Arm64,
            _ if raw.contains("arm") => Arch::Arm,
            _ => Arch::Other(raw.to_owned()),
        }
    }

    /// Registry name for this architecture
    pub fn as_str(&self) -> &str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::I386 => "386",
            Arch::Arm64 => "arm64",
            Arch::Arm => "arm",
            Arch::Other(s) => s.as_str(),
        }
    }
}

impl Platform {
    /// Normalize raw OS and architecture names
    ///
    /// ```
    /// # use layerjail::Platform;
    /// let platform = Platform::from_raw("linux", "aarch64");
    /// assert_eq!(platform.to_string(), "linux/arm64");
    /// ```
    pub fn from_raw(os: &str, arch: &str) -> Self {
        Platform {
            os: Os::from_raw(os),
            arch: Arch::from_raw(arch),
        }
    }

    /// Determine the platform for this run
    ///
    /// Each half comes from its override variable if that is set and
    /// non-empty, otherwise from `uname(2)`.
    pub fn resolve() -> Self {
        let host = HostNames::detect();
        let os = override_var(OS_OVERRIDE_VAR).unwrap_or(host.sysname);
        let arch = override_var(ARCH_OVERRIDE_VAR).unwrap_or(host.machine);
        let platform = Platform::from_raw(&os, &arch);
        log::debug!("resolved platform {} from ({:?}, {:?})", platform, os, arch);
        platform
    }

    /// Does a manifest list entry describe this platform?
    pub fn matches(&self, os: &str, arch: &str) -> bool {
        self.os.as_str() == os && self.arch.as_str() == arch
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os.as_str(), self.arch.as_str())
    }
}

fn override_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

struct HostNames {
    sysname: String,
    machine: String,
}

impl HostNames {
    fn detect() -> Self {
        let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
        if unsafe { libc::uname(&mut uts) } == 0 {
            let field = |chars: &[libc::c_char]| {
                unsafe { CStr::from_ptr(chars.as_ptr()) }
                    .to_string_lossy()
                    .to_lowercase()
            };
            HostNames {
                sysname: field(&uts.sysname[..]),
                machine: field(&uts.machine[..]),
            }
        } else {
            log::warn!(
                "uname failed, using build target: {}",
                std::io::Error::last_os_error()
            );
            HostNames {
                sysname: env::consts::OS.to_owned(),
                machine: env::consts::ARCH.to_owned(),
            }
        }
    }
}
