//! Update package metadata and the publisher-side package builder.

use crate::checksum::sha256_hex;
use crate::error::UpdateResult;
use crate::manifest::{
    safe_relative_path, ManifestFile, SecuritySection, UpdateManifest, MANIFEST_ENTRY,
};
use crate::signing::SigningKey;
use chrono::{DateTime, Utc};
use docflow_crypto::FileProtector;
use docflow_remote::RemoteFile;
use docflow_types::Version;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Remote property holding the package version.
pub const PROP_VERSION: &str = "version";
/// Remote property holding the SHA-256 of the artifact bytes.
pub const PROP_CHECKSUM: &str = "checksum";
/// Remote property holding the Ed25519 signature of the checksum.
pub const PROP_SIGNATURE: &str = "signature";

/// An update artifact discovered in the remote folder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdatePackageMetadata {
    pub version: Version,
    pub file_id: String,
    pub name: String,
    pub size: u64,
    pub checksum: String,
    pub signature: Option<String>,
    pub modified_at: DateTime<Utc>,
}

impl UpdatePackageMetadata {
    /// Reads metadata from a remote file's properties.
    ///
    /// Returns `None` unless the file carries a parsable version and a checksum.
    pub fn from_remote(file: &RemoteFile) -> Option<Self> {
        let version = Version::parse(file.property(PROP_VERSION)?).ok()?;
        let checksum = file.property(PROP_CHECKSUM)?.trim().to_ascii_lowercase();
        if checksum.is_empty() {
            return None;
        }
        Some(Self {
            version,
            file_id: file.id.clone(),
            name: file.name.clone(),
            size: file.size,
            checksum,
            signature: file.property(PROP_SIGNATURE).map(str::to_string),
            modified_at: file.modified_at,
        })
    }
}

/// A sealed, ready-to-publish artifact.
#[derive(Debug, Clone)]
pub struct BuiltPackage {
    pub version: Version,
    /// Sealed archive bytes.
    pub bytes: Vec<u8>,
    /// SHA-256 of `bytes`.
    pub checksum: String,
    /// Hex Ed25519 signature of `checksum`, when a key was set.
    pub signature: Option<String>,
}

impl BuiltPackage {
    /// Remote properties to attach when uploading.
    pub fn properties(&self) -> BTreeMap<String, String> {
        let mut props = BTreeMap::new();
        props.insert(PROP_VERSION.to_string(), self.version.to_string());
        props.insert(PROP_CHECKSUM.to_string(), self.checksum.clone());
        if let Some(sig) = &self.signature {
            props.insert(PROP_SIGNATURE.to_string(), sig.clone());
        }
        props
    }

    /// Conventional artifact file name.
    pub fn file_name(&self) -> String {
        format!("update_{}.zip.enc", self.version)
    }
}

/// Builds update archives.
pub struct PackageBuilder {
    version: Version,
    min_app_version: Option<Version>,
    files: Vec<(ManifestFile, Vec<u8>)>,
    signing_key: Option<SigningKey>,
}

impl PackageBuilder {
    /// An empty package for `version`.
    pub fn new(version: Version) -> Self {
        Self {
            version,
            min_app_version: None,
            files: Vec::new(),
            signing_key: None,
        }
    }

    /// Oldest application version the package installs over.
    pub fn min_app_version(mut self, version: Version) -> Self {
        self.min_app_version = Some(version);
        self
    }

    /// Adds a payload file installed at `path` relative to the app root.
    pub fn add_file(mut self, path: &str, data: Vec<u8>, sensitive: bool) -> Self {
        self.files.push((
            ManifestFile {
                path: path.to_string(),
                sensitive,
            },
            data,
        ));
        self
    }

    /// Signs the checksum of the sealed package with `key`.
    pub fn sign(mut self, key: &SigningKey) -> Self {
        self.signing_key = Some(key.clone());
        self
    }

    /// The manifest that [`build_archive`](Self::build_archive) writes.
    pub fn manifest(&self) -> UpdateManifest {
        UpdateManifest {
            version: self.version.to_string(),
            security: SecuritySection {
                min_app_version: self.min_app_version.as_ref().map(Version::to_string),
            },
            files: self.files.iter().map(|(f, _)| f.clone()).collect(),
        }
    }

    /// Builds the plain zip archive. Sensitive files are protected with
    /// `file_protector` before being stored.
    pub fn build_archive(&self, file_protector: &dyn FileProtector) -> UpdateResult<Vec<u8>> {
        let manifest = self.manifest();
        manifest.validate()?;

        let buf = std::io::Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(buf);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        zip.start_file(MANIFEST_ENTRY, options)?;
        zip.write_all(&serde_json::to_vec_pretty(&manifest)?)?;

        for (file, data) in &self.files {
            let path = safe_relative_path(&file.path)?;
            let stored = if file.sensitive {
                file_protector.protect(data)?
            } else {
                data.clone()
            };
            zip.start_file(UpdateManifest::payload_entry(&path), options)?;
            zip.write_all(&stored)?;
        }

        Ok(zip.finish()?.into_inner())
    }

    /// Builds the archive, seals it with `package_protector`, and computes the
    /// checksum and (if a key was set) the release signature.
    pub fn build(
        &self,
        file_protector: &dyn FileProtector,
        package_protector: &dyn FileProtector,
    ) -> UpdateResult<BuiltPackage> {
        let archive = self.build_archive(file_protector)?;
        let bytes = package_protector.protect(&archive)?;
        let checksum = sha256_hex(&bytes);
        let signature = self.signing_key.as_ref().map(|k| k.sign_checksum(&checksum));
        Ok(BuiltPackage {
            version: self.version.clone(),
            bytes,
            checksum,
            signature,
        })
    }
}
