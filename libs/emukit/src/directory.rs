//! Endpoint directory - tracks the live emulator instances in a session.
//!
//! Populated by the session as instances finish `start`; consulted during
//! `connect` for peer resolution and exposed to outside tooling that needs
//! to route requests to a local endpoint.

use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::contracts::{EmulatorKind, EndpointBinding};

/// A running emulator instance bound to its negotiated address.
#[derive(Clone, Debug)]
pub struct EmulatorInfo {
    pub kind: EmulatorKind,
    pub instance_id: Uuid,
    pub binding: EndpointBinding,
    /// Set once the instance completed `connect`.
    pub ready: bool,
}

impl EmulatorInfo {
    #[must_use]
    pub fn new(kind: EmulatorKind, binding: EndpointBinding) -> Self {
        Self {
            kind,
            instance_id: Uuid::now_v7(),
            binding,
            ready: false,
        }
    }
}

/// Directory of live instances, keyed by [`EmulatorKind`].
#[derive(Default)]
pub struct EndpointDirectory {
    inner: DashMap<EmulatorKind, Arc<EmulatorInfo>>,
}

impl std::fmt::Debug for EndpointDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<&'static str> = self.inner.iter().map(|e| e.key().as_str()).collect();
        f.debug_struct("EndpointDirectory")
            .field("instances_count", &self.inner.len())
            .field("kinds", &kinds)
            .finish()
    }
}

impl EndpointDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the instance for a kind.
    pub fn register(&self, info: EmulatorInfo) -> Arc<EmulatorInfo> {
        let info = Arc::new(info);
        self.inner.insert(info.kind, Arc::clone(&info));
        info
    }

    /// Mark the instance for `kind` as ready (connect completed).
    pub fn mark_ready(&self, kind: EmulatorKind) {
        if let Some(mut entry) = self.inner.get_mut(&kind) {
            Arc::make_mut(entry.value_mut()).ready = true;
        }
    }

    #[must_use]
    pub fn get(&self, kind: EmulatorKind) -> Option<Arc<EmulatorInfo>> {
        self.inner.get(&kind).map(|e| Arc::clone(e.value()))
    }

    /// Negotiated address for `kind`, if that instance started.
    #[must_use]
    pub fn binding(&self, kind: EmulatorKind) -> Option<EndpointBinding> {
        self.inner.get(&kind).map(|e| e.value().binding.clone())
    }

    pub fn remove(&self, kind: EmulatorKind) {
        self.inner.remove(&kind);
    }

    #[must_use]
    pub fn all(&self) -> Vec<Arc<EmulatorInfo>> {
        self.inner.iter().map(|e| Arc::clone(e.value())).collect()
    }
}
