//! Package manager contract
//!
//! The planner only produces argument lists. Running them, and asking which
//! version of a package is installed, goes through `PackageManager` so the
//! CLI can be exercised without apt.

use std::collections::BTreeSet;
use std::fmt;
use std::process::Command;

use crate::catalog::ToolEntry;
use crate::error::{ArmoryError, Result};

/// One package-manager command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AptInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl AptInvocation {
    pub fn update() -> Self {
        Self::apt_get(["update"])
    }

    pub fn install(packages: &[String]) -> Self {
        let mut inv = Self::apt_get(["install", "-y"]);
        inv.args.extend(packages.iter().cloned());
        inv
    }

    pub fn upgrade(packages: &[String]) -> Self {
        let mut inv = Self::apt_get(["install", "--only-upgrade", "-y"]);
        inv.args.extend(packages.iter().cloned());
        inv
    }

    fn apt_get<const N: usize>(args: [&str; N]) -> Self {
        Self {
            program: "apt-get".to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl fmt::Display for AptInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

pub trait PackageManager {
    fn run(&self, invocation: &AptInvocation) -> Result<()>;

    /// Installed version of `package`, `None` when not installed
    fn installed_version(&self, package: &str) -> Result<Option<String>>;
}

/// Runs apt-get and dpkg-query on the host
#[derive(Debug, Default)]
pub struct AptRunner;

impl PackageManager for AptRunner {
    fn run(&self, invocation: &AptInvocation) -> Result<()> {
        tracing::info!(command = %invocation, "running package manager");
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .env("DEBIAN_FRONTEND", "noninteractive")
            .output()
            .map_err(|e| ArmoryError::PackageManager(format!("{}: {}", invocation, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ArmoryError::PackageManager(format!(
                "{} failed ({}): {}",
                invocation,
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn installed_version(&self, package: &str) -> Result<Option<String>> {
        let output = Command::new("dpkg-query")
            .args(["-W", "-f=${Version}", package])
            .output()
            .map_err(|e| ArmoryError::PackageManager(format!("dpkg-query: {}", e)))?;

        // dpkg-query exits 1 for unknown packages
        if !output.status.success() {
            return Ok(None);
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!version.is_empty()).then_some(version))
    }
}

/// Distinct installed versions of a tool's packages, sorted and joined
pub fn installed_versions(pm: &dyn PackageManager, tool: &ToolEntry) -> Result<Option<String>> {
    let mut versions = BTreeSet::new();
    for package in &tool.packages {
        if let Some(version) = pm.installed_version(package)? {
            versions.insert(version);
        }
    }
    if versions.is_empty() {
        return Ok(None);
    }
    Ok(Some(versions.into_iter().collect::<Vec<_>>().join(", ")))
}

pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Fail unless running as root
pub fn require_root() -> Result<()> {
    if is_root() {
        Ok(())
    } else {
        Err(ArmoryError::PermissionDenied(
            "This operation requires root privileges. Re-run with sudo.".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RepositorySource;
    use std::collections::{BTreeMap, HashMap};

    struct FakeDpkg(HashMap<&'static str, &'static str>);

    impl PackageManager for FakeDpkg {
        fn run(&self, _: &AptInvocation) -> Result<()> {
            Ok(())
        }

        fn installed_version(&self, package: &str) -> Result<Option<String>> {
            Ok(self.0.get(package).map(|v| v.to_string()))
        }
    }

    fn tool(packages: &[&str]) -> ToolEntry {
        ToolEntry {
            name: "suite".to_string(),
            category: "forensics".to_string(),
            packages: packages.iter().map(|p| p.to_string()).collect(),
            description: String::new(),
            repository: RepositorySource::None,
            manual_upgrade: false,
            note: None,
            min_os_releases: Vec::new(),
            version_constraints: BTreeMap::new(),
        }
    }

    #[test]
    fn test_command_lines() {
        let pkgs = vec!["nmap".to_string(), "wfuzz".to_string()];
        assert_eq!(AptInvocation::update().to_string(), "apt-get update");
        assert_eq!(
            AptInvocation::install(&pkgs).to_string(),
            "apt-get install -y nmap wfuzz"
        );
        assert_eq!(
            AptInvocation::upgrade(&pkgs).to_string(),
            "apt-get install --only-upgrade -y nmap wfuzz"
        );
    }

    #[test]
    fn test_installed_versions_distinct_and_sorted() {
        let pm = FakeDpkg(HashMap::from([("a", "1.3"), ("b", "1.2"), ("c", "1.3")]));
        assert_eq!(
            installed_versions(&pm, &tool(&["a", "b", "c", "d"])).unwrap(),
            Some("1.2, 1.3".to_string())
        );
        assert_eq!(installed_versions(&pm, &tool(&["d"])).unwrap(), None);
    }
}
