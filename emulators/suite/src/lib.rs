//! Concrete emulator implementations for the Cumulus local suite.
//!
//! The suite is a closed set: database and firestore (external Java
//! processes), functions (external runtime process that calls into its
//! peers), and hosting (in-process static file server). [`SuiteEmulator`]
//! tags them into one enum that the session dispatches over.

pub mod functions;
pub mod hosting;
pub mod java;

pub use functions::{FunctionsConfig, FunctionsEmulator};
pub use hosting::{HostingConfig, HostingEmulator};
pub use java::{JavaEmulator, JavaEmulatorConfig};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use emukit::config::{ConfigError, ConfigProvider, emulator_config_required};
use emukit::context::SessionCtx;
use emukit::contracts::{Emulator, EmulatorKind, EndpointBinding};
use emukit::error::{ConnectError, StartError, StopError};
use emukit_artifact::ArtifactDescriptor;

pub(crate) fn default_enabled() -> bool {
    true
}

/// Suite-wide settings every emulator inherits unless its own section
/// overrides them.
#[derive(Debug, Clone)]
pub struct SuiteSettings {
    /// Default bind host.
    pub host: String,
    /// Where downloaded emulator binaries are cached.
    pub cache_dir: PathBuf,
}

impl Default for SuiteSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            cache_dir: PathBuf::from(".cumulus/cache"),
        }
    }
}

/// Download coordinates for an emulator binary. Expected size and checksum
/// come from release metadata, external to this tool.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactSource {
    pub url: String,
    pub version: String,
    pub size: u64,
    pub sha256: String,
}

impl ArtifactSource {
    #[must_use]
    pub fn descriptor(&self, kind: EmulatorKind, cache_dir: &Path) -> ArtifactDescriptor {
        let name = self
            .url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map_or_else(
                || format!("cumulus-{kind}-emulator-{}.bin", self.version),
                ToOwned::to_owned,
            );

        ArtifactDescriptor {
            name,
            version: self.version.clone(),
            cache_dir: cache_dir.to_path_buf(),
            remote_url: self.url.clone(),
            expected_size: self.size,
            expected_sha256: self.sha256.clone(),
        }
    }
}

/// Problems assembling the suite from configuration.
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("emulator '{kind}' needs either a local binary path or artifact coordinates")]
    MissingBinary { kind: EmulatorKind },
}

/// The closed set of emulator implementations, dispatched by match rather
/// than an open `dyn` registry.
pub enum SuiteEmulator {
    Database(JavaEmulator),
    Firestore(JavaEmulator),
    Functions(FunctionsEmulator),
    Hosting(HostingEmulator),
}

impl std::fmt::Debug for SuiteEmulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SuiteEmulator").field(&self.kind()).finish()
    }
}

#[async_trait]
impl Emulator for SuiteEmulator {
    fn kind(&self) -> EmulatorKind {
        match self {
            SuiteEmulator::Database(e) | SuiteEmulator::Firestore(e) => e.kind(),
            SuiteEmulator::Functions(e) => e.kind(),
            SuiteEmulator::Hosting(e) => e.kind(),
        }
    }

    fn dependencies(&self) -> &[EmulatorKind] {
        match self {
            SuiteEmulator::Database(e) | SuiteEmulator::Firestore(e) => e.dependencies(),
            SuiteEmulator::Functions(e) => e.dependencies(),
            SuiteEmulator::Hosting(e) => e.dependencies(),
        }
    }

    async fn start(&self, ctx: &SessionCtx) -> Result<EndpointBinding, StartError> {
        match self {
            SuiteEmulator::Database(e) | SuiteEmulator::Firestore(e) => e.start(ctx).await,
            SuiteEmulator::Functions(e) => e.start(ctx).await,
            SuiteEmulator::Hosting(e) => e.start(ctx).await,
        }
    }

    async fn connect(&self, ctx: &SessionCtx) -> Result<(), ConnectError> {
        match self {
            SuiteEmulator::Database(e) | SuiteEmulator::Firestore(e) => e.connect(ctx).await,
            SuiteEmulator::Functions(e) => e.connect(ctx).await,
            SuiteEmulator::Hosting(e) => e.connect(ctx).await,
        }
    }

    async fn stop(&self) -> Result<(), StopError> {
        match self {
            SuiteEmulator::Database(e) | SuiteEmulator::Firestore(e) => e.stop().await,
            SuiteEmulator::Functions(e) => e.stop().await,
            SuiteEmulator::Hosting(e) => e.stop().await,
        }
    }
}

/// Assemble the configured emulators. A kind participates in the session
/// when its section is present and `enabled` (the default) is not turned
/// off. Dependency validation happens later, in the registry.
///
/// # Errors
/// `BuildError` on malformed sections or missing binary coordinates.
pub fn build_suite(
    provider: &dyn ConfigProvider,
    settings: &SuiteSettings,
) -> Result<Vec<Arc<SuiteEmulator>>, BuildError> {
    let mut emulators = Vec::new();

    for kind in EmulatorKind::ALL {
        if provider.emulator_config(kind).is_none() {
            continue;
        }

        let emulator = match kind {
            EmulatorKind::Database | EmulatorKind::Firestore => {
                let config: JavaEmulatorConfig = emulator_config_required(provider, kind)?;
                if !config.enabled {
                    continue;
                }
                if config.jar.is_none() && config.artifact.is_none() {
                    return Err(BuildError::MissingBinary { kind });
                }
                let emulator = JavaEmulator::new(kind, config, settings);
                if kind == EmulatorKind::Database {
                    SuiteEmulator::Database(emulator)
                } else {
                    SuiteEmulator::Firestore(emulator)
                }
            }
            EmulatorKind::Functions => {
                let config: FunctionsConfig = emulator_config_required(provider, kind)?;
                if !config.enabled {
                    continue;
                }
                if config.runtime_bin.is_none() && config.artifact.is_none() {
                    return Err(BuildError::MissingBinary { kind });
                }
                SuiteEmulator::Functions(FunctionsEmulator::new(config, settings))
            }
            EmulatorKind::Hosting => {
                let config: HostingConfig = emulator_config_required(provider, kind)?;
                if !config.enabled {
                    continue;
                }
                SuiteEmulator::Hosting(HostingEmulator::new(config, settings))
            }
        };

        tracing::debug!(emulator = %kind, "emulator configured");
        emulators.push(Arc::new(emulator));
    }

    Ok(emulators)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapProvider {
        sections: HashMap<EmulatorKind, serde_json::Value>,
    }

    impl ConfigProvider for MapProvider {
        fn emulator_config(&self, kind: EmulatorKind) -> Option<&serde_json::Value> {
            self.sections.get(&kind)
        }
    }

    #[test]
    fn builds_only_configured_kinds() {
        let mut sections = HashMap::new();
        sections.insert(EmulatorKind::Hosting, serde_json::json!({}));
        sections.insert(
            EmulatorKind::Database,
            serde_json::json!({"jar": "/opt/database.jar"}),
        );
        let provider = MapProvider { sections };

        let suite = build_suite(&provider, &SuiteSettings::default()).unwrap();
        let mut kinds: Vec<EmulatorKind> = suite.iter().map(|e| e.kind()).collect();
        kinds.sort_by_key(|k| k.as_str());
        assert_eq!(kinds, vec![EmulatorKind::Database, EmulatorKind::Hosting]);
    }

    #[test]
    fn disabled_sections_are_skipped() {
        let mut sections = HashMap::new();
        sections.insert(EmulatorKind::Hosting, serde_json::json!({"enabled": false}));
        let provider = MapProvider { sections };

        let suite = build_suite(&provider, &SuiteSettings::default()).unwrap();
        assert!(suite.is_empty());
    }

    #[test]
    fn java_emulator_without_binary_is_rejected() {
        let mut sections = HashMap::new();
        sections.insert(EmulatorKind::Firestore, serde_json::json!({}));
        let provider = MapProvider { sections };

        let err = build_suite(&provider, &SuiteSettings::default()).unwrap_err();
        assert!(matches!(
            err,
            BuildError::MissingBinary {
                kind: EmulatorKind::Firestore
            }
        ));
    }

    #[test]
    fn artifact_source_derives_file_name_from_url() {
        let source = ArtifactSource {
            url: "https://dl.cumulus.dev/emulators/database-1.4.2.jar".to_owned(),
            version: "1.4.2".to_owned(),
            size: 1024,
            sha256: "ab".repeat(32),
        };

        let desc = source.descriptor(EmulatorKind::Database, Path::new("/tmp/cache"));
        assert_eq!(desc.name, "database-1.4.2.jar");
        assert_eq!(desc.local_path(), PathBuf::from("/tmp/cache/database-1.4.2.jar"));
        assert_eq!(desc.expected_size, 1024);
    }
}
