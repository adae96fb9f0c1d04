//! Linux distribution and package-manager detection.
//!
//! The package manager is chosen by probing the search path for the known
//! backend binaries in a fixed priority order, so hosts that expose several
//! compatible binaries (e.g. `dnf` and `yum`) always resolve the same way.
//! `/etc/os-release` is parsed separately into a [`DistroInfo`] for decisions
//! that depend on the distribution family rather than the package manager.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, ZappyError};

/// Location of the os-release file.
pub const OS_RELEASE: &str = "/etc/os-release";

/// Supported package managers, in detection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    /// APT (Debian/Ubuntu)
    Apt,
    /// DNF (Fedora, RHEL 8+)
    Dnf,
    /// YUM (older RHEL/CentOS)
    Yum,
    /// pacman (Arch)
    Pacman,
    /// apk (Alpine)
    Apk,
    /// zypper (openSUSE/SLES)
    Zypper,
}

impl PackageManager {
    /// Detection order. The first binary found on the search path wins.
    pub const PRIORITY: [PackageManager; 6] = [
        PackageManager::Apt,
        PackageManager::Dnf,
        PackageManager::Yum,
        PackageManager::Pacman,
        PackageManager::Apk,
        PackageManager::Zypper,
    ];

    /// Binary probed on the search path.
    pub fn binary(&self) -> &'static str {
        match self {
            PackageManager::Apt => "apt",
            PackageManager::Dnf => "dnf",
            PackageManager::Yum => "yum",
            PackageManager::Pacman => "pacman",
            PackageManager::Apk => "apk",
            PackageManager::Zypper => "zypper",
        }
    }

    /// Command refreshing the package index.
    ///
    /// `dnf`/`yum` use `makecache`: `check-update` exits 100 whenever updates
    /// are pending, which would read as a failure.
    pub fn update_command(&self) -> Vec<String> {
        let argv: &[&str] = match self {
            PackageManager::Apt => &["apt-get", "update"],
            PackageManager::Dnf => &["dnf", "makecache"],
            PackageManager::Yum => &["yum", "makecache"],
            PackageManager::Pacman => &["pacman", "-Sy"],
            PackageManager::Apk => &["apk", "update"],
            PackageManager::Zypper => &["zypper", "--non-interactive", "refresh"],
        };
        argv.iter().map(|s| s.to_string()).collect()
    }

    /// Command installing `packages` non-interactively.
    pub fn install_command(&self, packages: &[&str]) -> Vec<String> {
        let base: &[&str] = match self {
            PackageManager::Apt => &["apt-get", "install", "-y"],
            PackageManager::Dnf => &["dnf", "install", "-y"],
            PackageManager::Yum => &["yum", "install", "-y"],
            PackageManager::Pacman => &["pacman", "-S", "--noconfirm", "--needed"],
            PackageManager::Apk => &["apk", "add"],
            PackageManager::Zypper => &["zypper", "--non-interactive", "install"],
        };
        base.iter()
            .chain(packages.iter())
            .map(|s| s.to_string())
            .collect()
    }

    /// Command exiting 0 iff `package` is installed.
    pub fn query_command(&self, package: &str) -> Vec<String> {
        let base: &[&str] = match self {
            PackageManager::Apt => &["dpkg", "-s"],
            PackageManager::Dnf | PackageManager::Yum | PackageManager::Zypper => &["rpm", "-q"],
            PackageManager::Pacman => &["pacman", "-Q"],
            PackageManager::Apk => &["apk", "info", "-e"],
        };
        base.iter()
            .map(|s| s.to_string())
            .chain(std::iter::once(package.to_string()))
            .collect()
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

impl FromStr for PackageManager {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        PackageManager::PRIORITY
            .into_iter()
            .find(|pm| pm.binary().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "Unknown package manager '{}'. Valid values: apt, dnf, yum, pacman, apk, zypper",
                    s
                )
            })
    }
}

/// Answers "is this binary available?" for detection.
pub trait PathProbe {
    fn has_binary(&self, name: &str) -> bool;
}

/// Looks binaries up in a list of directories, like a shell does with `$PATH`.
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    /// Search path from the process `PATH`, with the sbin directories added
    /// since non-root shells often leave them out.
    pub fn from_env() -> Self {
        let mut dirs: Vec<PathBuf> = env::var_os("PATH")
            .map(|p| env::split_paths(&p).collect())
            .unwrap_or_default();
        for extra in ["/usr/local/sbin", "/usr/sbin", "/sbin"] {
            let extra = PathBuf::from(extra);
            if !dirs.contains(&extra) {
                dirs.push(extra);
            }
        }
        Self { dirs }
    }

    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Full path of `name` in the first directory that has it.
    pub fn find(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains('/') {
            return None;
        }
        self.dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| is_executable(candidate))
    }
}

impl PathProbe for SearchPath {
    fn has_binary(&self, name: &str) -> bool {
        self.find(name).is_some()
    }
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Detect the package manager by probing in [`PackageManager::PRIORITY`] order.
pub fn detect(probe: &dyn PathProbe) -> Result<PackageManager> {
    PackageManager::PRIORITY
        .into_iter()
        .find(|pm| probe.has_binary(pm.binary()))
        .ok_or_else(|| {
            ZappyError::UnsupportedSystem(
                "no supported package manager found (apt, dnf, yum, pacman, apk, zypper)"
                    .to_string(),
            )
        })
}

/// Distribution family, used where behavior depends on more than the
/// package manager (e.g. which auto-update tool exists).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DistroFamily {
    Debian,
    Rhel,
    Arch,
    Alpine,
    Suse,
    Unknown,
}

/// Parsed `/etc/os-release`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistroInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub id_like: Vec<String>,
}

impl Default for DistroInfo {
    fn default() -> Self {
        Self {
            id: "unknown".to_string(),
            name: "Unknown".to_string(),
            version: String::new(),
            id_like: Vec::new(),
        }
    }
}

impl DistroInfo {
    /// Read and parse [`OS_RELEASE`]. A missing file yields "unknown".
    pub fn load() -> Self {
        std::fs::read_to_string(OS_RELEASE)
            .map(|content| Self::parse(&content))
            .unwrap_or_default()
    }

    pub fn parse(content: &str) -> Self {
        let mut info = Self::default();
        for line in content.lines() {
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'');
            match key {
                "ID" => info.id = value.to_lowercase(),
                "NAME" => info.name = value.to_string(),
                "VERSION_ID" => info.version = value.to_string(),
                "ID_LIKE" => {
                    info.id_like = value
                        .to_lowercase()
                        .split_whitespace()
                        .map(str::to_string)
                        .collect()
                }
                _ => {}
            }
        }
        info
    }

    fn like(&self, other: &str) -> bool {
        self.id_like.iter().any(|l| l == other)
    }

    pub fn family(&self) -> DistroFamily {
        let id = self.id.as_str();
        if matches!(id, "debian" | "ubuntu" | "linuxmint" | "pop" | "elementary" | "zorin")
            || self.like("debian")
            || self.like("ubuntu")
        {
            DistroFamily::Debian
        } else if matches!(id, "rhel" | "centos" | "fedora" | "rocky" | "almalinux" | "alma")
            || self.like("rhel")
            || self.like("fedora")
            || self.like("centos")
        {
            DistroFamily::Rhel
        } else if id == "arch" || self.like("arch") {
            DistroFamily::Arch
        } else if id == "alpine" {
            DistroFamily::Alpine
        } else if id.starts_with("opensuse") || id == "sles" || self.like("suse") {
            DistroFamily::Suse
        } else {
            DistroFamily::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    struct FakeProbe(HashSet<&'static str>);

    impl PathProbe for FakeProbe {
        fn has_binary(&self, name: &str) -> bool {
            self.0.contains(name)
        }
    }

    fn probe(bins: &[&'static str]) -> FakeProbe {
        FakeProbe(bins.iter().copied().collect())
    }

    fn fake_bin(dir: &Path, name: &str) {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_detect_priority_order() {
        assert_eq!(detect(&probe(&["dnf", "apt"])).unwrap(), PackageManager::Apt);
        assert_eq!(detect(&probe(&["yum", "dnf"])).unwrap(), PackageManager::Dnf);
        assert_eq!(detect(&probe(&["zypper", "apk"])).unwrap(), PackageManager::Apk);
        assert_eq!(detect(&probe(&["zypper"])).unwrap(), PackageManager::Zypper);
    }

    #[test]
    fn test_detect_none_is_unsupported() {
        let err = detect(&probe(&["brew"])).unwrap_err();
        assert!(matches!(err, ZappyError::UnsupportedSystem(_)));
    }

    #[test]
    fn test_detect_with_fake_search_path() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        fake_bin(first.path(), "dnf");
        fake_bin(second.path(), "apt");

        let path = SearchPath::new(vec![first.path().to_path_buf(), second.path().to_path_buf()]);
        for _ in 0..3 {
            assert_eq!(detect(&path).unwrap(), PackageManager::Apt);
        }
    }

    #[test]
    fn test_search_path_ignores_non_executable() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("apt"), "not executable").unwrap();
        fake_bin(dir.path(), "pacman");

        let path = SearchPath::new(vec![dir.path().to_path_buf()]);
        assert!(!path.has_binary("apt"));
        assert_eq!(path.find("pacman"), Some(dir.path().join("pacman")));
        assert_eq!(detect(&path).unwrap(), PackageManager::Pacman);
    }

    #[test]
    fn test_search_path_rejects_paths() {
        let path = SearchPath::new(vec![PathBuf::from("/usr/bin")]);
        assert!(path.find("../bin/sh").is_none());
        assert!(path.find("").is_none());
    }

    #[test]
    fn test_install_commands() {
        assert_eq!(
            PackageManager::Apt.install_command(&["nginx", "certbot"]),
            vec!["apt-get", "install", "-y", "nginx", "certbot"]
        );
        assert_eq!(
            PackageManager::Pacman.install_command(&["nginx"]),
            vec!["pacman", "-S", "--noconfirm", "--needed", "nginx"]
        );
        assert_eq!(PackageManager::Apk.install_command(&["nginx"]), vec!["apk", "add", "nginx"]);
        assert_eq!(
            PackageManager::Zypper.install_command(&["nginx"]),
            vec!["zypper", "--non-interactive", "install", "nginx"]
        );
    }

    #[test]
    fn test_update_and_query_commands() {
        assert_eq!(PackageManager::Dnf.update_command(), vec!["dnf", "makecache"]);
        assert_eq!(PackageManager::Apt.update_command(), vec!["apt-get", "update"]);
        assert_eq!(PackageManager::Apt.query_command("jq"), vec!["dpkg", "-s", "jq"]);
        assert_eq!(PackageManager::Yum.query_command("jq"), vec!["rpm", "-q", "jq"]);
        assert_eq!(PackageManager::Apk.query_command("jq"), vec!["apk", "info", "-e", "jq"]);
    }

    #[test]
    fn test_package_manager_from_str() {
        assert_eq!("APT".parse::<PackageManager>().unwrap(), PackageManager::Apt);
        assert_eq!("zypper".parse::<PackageManager>().unwrap(), PackageManager::Zypper);
        assert!("brew".parse::<PackageManager>().is_err());
    }

    #[test]
    fn test_parse_os_release_ubuntu() {
        let content = r#"NAME="Ubuntu"
VERSION_ID="24.04"
ID=ubuntu
ID_LIKE=debian
PRETTY_NAME="Ubuntu 24.04 LTS"
"#;
        let info = DistroInfo::parse(content);
        assert_eq!(info.id, "ubuntu");
        assert_eq!(info.name, "Ubuntu");
        assert_eq!(info.version, "24.04");
        assert_eq!(info.id_like, vec!["debian"]);
        assert_eq!(info.family(), DistroFamily::Debian);
    }

    #[test]
    fn test_distro_families() {
        let rocky = DistroInfo::parse("ID=\"rocky\"\nID_LIKE=\"rhel centos fedora\"\n");
        assert_eq!(rocky.family(), DistroFamily::Rhel);

        let manjaro = DistroInfo::parse("ID=manjaro\nID_LIKE=arch\n");
        assert_eq!(manjaro.family(), DistroFamily::Arch);

        let alpine = DistroInfo::parse("ID=alpine\n");
        assert_eq!(alpine.family(), DistroFamily::Alpine);

        let tumbleweed = DistroInfo::parse("ID=\"opensuse-tumbleweed\"\nID_LIKE=\"opensuse suse\"\n");
        assert_eq!(tumbleweed.family(), DistroFamily::Suse);

        assert_eq!(DistroInfo::parse("").family(), DistroFamily::Unknown);
    }
}
