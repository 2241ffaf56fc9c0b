//! Update package manifest (`manifest.json` at the archive root).

use crate::error::{UpdateError, UpdateResult};
use docflow_types::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

/// Archive entry holding the manifest.
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// Archive directory holding the payload files, mirrored relative to the app root.
pub const PAYLOAD_PREFIX: &str = "payload/";

/// Describes the files an update package installs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateManifest {
    pub version: String,
    #[serde(default)]
    pub security: SecuritySection,
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecuritySection {
    /// Oldest app version allowed to install this package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_app_version: Option<String>,
}

/// One installed file. `path` is relative to the app root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub path: String,
    /// Stored protected in the archive; unprotected on install.
    #[serde(default)]
    pub sensitive: bool,
}

impl UpdateManifest {
    /// Parses and validates a manifest.
    pub fn from_slice(bytes: &[u8]) -> UpdateResult<Self> {
        let manifest: Self = serde_json::from_slice(bytes)
            .map_err(|e| UpdateError::ManifestInvalid(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Checks versions parse and every path is a unique, safe relative path.
    pub fn validate(&self) -> UpdateResult<()> {
        self.parsed_version()?;
        self.min_app_version()?;

        let mut seen = BTreeSet::new();
        for file in &self.files {
            let path = safe_relative_path(&file.path)?;
            if !seen.insert(path) {
                return Err(UpdateError::ManifestInvalid(format!(
                    "duplicate path: {}",
                    file.path
                )));
            }
        }
        Ok(())
    }

    pub fn parsed_version(&self) -> UpdateResult<Version> {
        Version::parse(&self.version)
            .map_err(|e| UpdateError::ManifestInvalid(format!("version: {e}")))
    }

    pub fn min_app_version(&self) -> UpdateResult<Option<Version>> {
        self.security
            .min_app_version
            .as_deref()
            .map(|v| {
                Version::parse(v)
                    .map_err(|e| UpdateError::ManifestInvalid(format!("min_app_version: {e}")))
            })
            .transpose()
    }

    /// Fails with [`UpdateError::IncompatibleVersion`] if `current` is older
    /// than the declared minimum.
    pub fn check_compatible(&self, current: &Version) -> UpdateResult<()> {
        match self.min_app_version()? {
            Some(required) if *current < required => Err(UpdateError::IncompatibleVersion {
                required: required.to_string(),
                current: current.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Archive entry name of a payload file, given its validated path.
    pub fn payload_entry(path: &Path) -> String {
        let parts: Vec<_> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect();
        format!("{PAYLOAD_PREFIX}{}", parts.join("/"))
    }
}

/// Validates a manifest path: relative, no `..`, no root or prefix.
pub fn safe_relative_path(raw: &str) -> UpdateResult<PathBuf> {
    let path = Path::new(raw);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(UpdateError::ManifestInvalid(format!("unsafe path: {raw}")));
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(UpdateError::ManifestInvalid(format!("empty path: {raw:?}")));
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(files: serde_json::Value) -> UpdateResult<UpdateManifest> {
        UpdateManifest::from_slice(
            &serde_json::to_vec(&json!({
                "version": "2.4.0",
                "security": {"min_app_version": "2.0"},
                "files": files
            }))
            .unwrap(),
        )
    }

    #[test]
    fn parses_valid_manifest() {
        let m = manifest(json!([
            {"path": "app/main.py", "sensitive": false},
            {"path": "config/keys.bin", "sensitive": true},
            {"path": "README.md"}
        ]))
        .unwrap();
        assert_eq!(m.files.len(), 3);
        assert!(m.files[1].sensitive);
        assert!(!m.files[2].sensitive);
    }

    #[test]
    fn rejects_traversal_and_absolute_paths() {
        for bad in ["../etc/passwd", "/etc/passwd", "a/../../b", "", "."] {
            assert!(
                matches!(manifest(json!([{"path": bad}])), Err(UpdateError::ManifestInvalid(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_duplicates_after_normalization() {
        let result = manifest(json!([{"path": "a/b.txt"}, {"path": "./a/b.txt"}]));
        assert!(matches!(result, Err(UpdateError::ManifestInvalid(_))));
    }

    #[test]
    fn rejects_bad_versions_and_shape() {
        assert!(UpdateManifest::from_slice(br#"{"version": "x.y", "files": []}"#).is_err());
        assert!(UpdateManifest::from_slice(br#"{"version": "1.0"}"#).is_err());
        assert!(UpdateManifest::from_slice(b"not json").is_err());
        assert!(
            UpdateManifest::from_slice(
                br#"{"version": "1.0", "security": {"min_app_version": "soon"}, "files": []}"#
            )
            .is_err()
        );
    }

    #[test]
    fn compatibility_gate_is_numeric() {
        let m = manifest(json!([])).unwrap();
        assert!(m.check_compatible(&Version::parse("2.0.0").unwrap()).is_ok());
        assert!(m.check_compatible(&Version::parse("10.0").unwrap()).is_ok());
        assert!(matches!(
            m.check_compatible(&Version::parse("1.99").unwrap()),
            Err(UpdateError::IncompatibleVersion { .. })
        ));
    }

    #[test]
    fn no_minimum_accepts_everything() {
        let m = UpdateManifest::from_slice(br#"{"version": "1.0", "files": []}"#).unwrap();
        assert!(m.check_compatible(&Version::parse("0.1").unwrap()).is_ok());
    }

    #[test]
    fn payload_entry_names() {
        let path = safe_relative_path("./app//main.py").unwrap();
        assert_eq!(UpdateManifest::payload_entry(&path), "payload/app/main.py");
    }
}
