//! Host release detection from /etc/os-release

use std::path::Path;

use crate::paths;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsRelease {
    pub id: Option<String>,
    pub version_id: Option<String>,
    pub codename: Option<String>,
    pub pretty_name: Option<String>,
}

impl OsRelease {
    pub fn parse(content: &str) -> Self {
        let mut release = Self::default();
        for line in content.lines() {
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'').to_string();
            if value.is_empty() {
                continue;
            }
            match key {
                "ID" => release.id = Some(value),
                "VERSION_ID" => release.version_id = Some(value),
                "VERSION_CODENAME" => release.codename = Some(value),
                "PRETTY_NAME" => release.pretty_name = Some(value),
                _ => {}
            }
        }
        release
    }

    /// Read `path`; `None` if it is missing or unreadable
    pub fn load_from(path: &Path) -> Option<Self> {
        std::fs::read_to_string(path).ok().map(|c| Self::parse(&c))
    }

    pub fn detect() -> Option<Self> {
        Self::load_from(Path::new(paths::OS_RELEASE_FILE))
    }

    /// Identifier matched against a tool's supported releases: the codename
    /// when present (Kali only has "kali-rolling"), else the version id
    pub fn release_key(&self) -> Option<&str> {
        self.codename.as_deref().or(self.version_id.as_deref())
    }
}
