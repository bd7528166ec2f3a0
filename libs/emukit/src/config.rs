//! Typed access to per-emulator configuration sections.
//!
//! Two loading modes, matching how emulators differ in their needs:
//!
//! 1. **Lenient** (`emulator_config_or_default`): missing section falls
//!    back to `T::default()`. For emulators that run fine unconfigured.
//! 2. **Strict** (`emulator_config_required`): the section must be present
//!    and valid. For emulators that cannot guess, e.g. artifact
//!    coordinates.

use serde::de::DeserializeOwned;

use crate::contracts::EmulatorKind;

/// Configuration error for typed section access.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("emulator '{kind}' is not configured")]
    NotConfigured { kind: EmulatorKind },
    #[error("configuration for emulator '{kind}' must be an object")]
    InvalidStructure { kind: EmulatorKind },
    #[error("invalid configuration for emulator '{kind}': {source}")]
    Invalid {
        kind: EmulatorKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Provider of raw per-emulator configuration sections.
pub trait ConfigProvider: Send + Sync {
    /// Raw JSON section for the emulator, if any.
    fn emulator_config(&self, kind: EmulatorKind) -> Option<&serde_json::Value>;
}

/// Lenient loader: a missing section yields `T::default()`.
///
/// # Errors
/// `ConfigError::Invalid` if the section exists but does not deserialize.
pub fn emulator_config_or_default<T: DeserializeOwned + Default>(
    provider: &dyn ConfigProvider,
    kind: EmulatorKind,
) -> Result<T, ConfigError> {
    let Some(raw) = provider.emulator_config(kind) else {
        return Ok(T::default());
    };
    serde_json::from_value(raw.clone()).map_err(|source| ConfigError::Invalid { kind, source })
}

/// Strict loader: the section must be present and valid.
///
/// # Errors
/// `ConfigError::NotConfigured` when the section is absent,
/// `ConfigError::InvalidStructure` when it is not an object,
/// `ConfigError::Invalid` when it does not deserialize.
pub fn emulator_config_required<T: DeserializeOwned>(
    provider: &dyn ConfigProvider,
    kind: EmulatorKind,
) -> Result<T, ConfigError> {
    let raw = provider
        .emulator_config(kind)
        .ok_or(ConfigError::NotConfigured { kind })?;
    if !raw.is_object() {
        return Err(ConfigError::InvalidStructure { kind });
    }
    serde_json::from_value(raw.clone()).map_err(|source| ConfigError::Invalid { kind, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct HostingSection {
        host: Option<String>,
        port: Option<u16>,
    }

    struct MapProvider {
        sections: HashMap<EmulatorKind, serde_json::Value>,
    }

    impl ConfigProvider for MapProvider {
        fn emulator_config(&self, kind: EmulatorKind) -> Option<&serde_json::Value> {
            self.sections.get(&kind)
        }
    }

    fn provider(value: serde_json::Value) -> MapProvider {
        let mut sections = HashMap::new();
        sections.insert(EmulatorKind::Hosting, value);
        MapProvider { sections }
    }

    #[test]
    fn lenient_falls_back_to_default_when_missing() {
        let provider = MapProvider {
            sections: HashMap::new(),
        };
        let cfg: HostingSection =
            emulator_config_or_default(&provider, EmulatorKind::Hosting).unwrap();
        assert_eq!(cfg, HostingSection::default());
    }

    #[test]
    fn lenient_parses_present_section() {
        let provider = provider(serde_json::json!({"host": "0.0.0.0", "port": 5000}));
        let cfg: HostingSection =
            emulator_config_or_default(&provider, EmulatorKind::Hosting).unwrap();
        assert_eq!(cfg.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(cfg.port, Some(5000));
    }

    #[test]
    fn lenient_rejects_malformed_section() {
        let provider = provider(serde_json::json!({"port": "not-a-number"}));
        let err = emulator_config_or_default::<HostingSection>(&provider, EmulatorKind::Hosting)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn strict_requires_presence() {
        let provider = MapProvider {
            sections: HashMap::new(),
        };
        let err =
            emulator_config_required::<HostingSection>(&provider, EmulatorKind::Hosting).unwrap_err();
        assert!(matches!(err, ConfigError::NotConfigured { .. }));
    }

    #[test]
    fn strict_requires_an_object() {
        let provider = provider(serde_json::json!(["not", "an", "object"]));
        let err =
            emulator_config_required::<HostingSection>(&provider, EmulatorKind::Hosting).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStructure { .. }));
    }
}
