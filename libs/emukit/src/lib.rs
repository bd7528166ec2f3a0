//! Emulator lifecycle runtime for the Cumulus local suite.
//!
//! The pieces fit together like this: a [`registry::EmulatorRegistry`]
//! validates the configured emulator set and its dependency graph, a
//! [`session::Session`] drives every instance through start → connect →
//! run → stop, the [`ports::PortArbiter`] serializes port reservations,
//! and the [`directory::EndpointDirectory`] tracks where each live
//! instance can be reached. External-process emulators are supervised by
//! [`process`]; their binaries come from the `emukit-artifact` cache.

pub mod config;
pub mod context;
pub mod contracts;
pub mod directory;
pub mod error;
pub mod ports;
pub mod probe;
pub mod process;
pub mod registry;
pub mod session;
pub mod shutdown;
pub mod telemetry;

pub use config::{ConfigError, ConfigProvider, emulator_config_or_default, emulator_config_required};
pub use context::{SessionCtx, Timeouts};
pub use contracts::{Emulator, EmulatorKind, EndpointBinding};
pub use directory::{EmulatorInfo, EndpointDirectory};
pub use error::{
    ConnectError, RegistryError, SessionError, StartError, StopError, StopReport,
};
pub use registry::EmulatorRegistry;
pub use session::{Session, SessionState, ShutdownOptions};
