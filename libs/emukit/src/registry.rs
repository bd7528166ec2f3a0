//! Emulator set validation and dependency layering.
//!
//! The registry owns the configured instances for a session, verifies the
//! declared dependency graph, and partitions it into layers: everything in
//! one layer may start concurrently, a layer begins only after the previous
//! one fully started.

use std::fmt;
use std::sync::Arc;

use crate::contracts::{Emulator, EmulatorKind};
use crate::error::RegistryError;

pub struct EmulatorRegistry<E: Emulator> {
    entries: Vec<Arc<E>>,
    layers: Vec<Vec<usize>>,
}

impl<E: Emulator> fmt::Debug for EmulatorRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmulatorRegistry")
            .field("kinds", &self.kinds())
            .field("layers", &self.layers)
            .finish()
    }
}

impl<E: Emulator> EmulatorRegistry<E> {
    /// Validate the set and compute start layers.
    ///
    /// # Errors
    /// `RegistryError` if the set is empty, a kind appears twice, a
    /// dependency names a kind outside the session, or the graph has a
    /// cycle.
    pub fn build(emulators: Vec<Arc<E>>) -> Result<Self, RegistryError> {
        if emulators.is_empty() {
            return Err(RegistryError::Empty);
        }

        let kinds: Vec<EmulatorKind> = emulators.iter().map(|e| e.kind()).collect();
        for (i, kind) in kinds.iter().enumerate() {
            if kinds[..i].contains(kind) {
                return Err(RegistryError::Duplicate { kind: *kind });
            }
        }

        for e in &emulators {
            for dep in e.dependencies() {
                if !kinds.contains(dep) {
                    return Err(RegistryError::UnknownDependency {
                        kind: e.kind(),
                        dep: *dep,
                    });
                }
            }
        }

        let layers = compute_layers(&emulators, &kinds)?;

        Ok(Self {
            entries: emulators,
            layers,
        })
    }

    #[must_use]
    pub fn entries(&self) -> &[Arc<E>] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<EmulatorKind> {
        self.entries.iter().map(|e| e.kind()).collect()
    }

    /// Indices into `entries`, grouped into concurrent start layers in
    /// dependency order.
    #[must_use]
    pub fn layers(&self) -> &[Vec<usize>] {
        &self.layers
    }
}

/// Kahn-style layering: repeatedly peel off every node whose dependencies
/// are all already placed. Deterministic (insertion order within a layer).
fn compute_layers<E: Emulator>(
    emulators: &[Arc<E>],
    kinds: &[EmulatorKind],
) -> Result<Vec<Vec<usize>>, RegistryError> {
    let mut placed = vec![false; emulators.len()];
    let mut layers: Vec<Vec<usize>> = Vec::new();

    while placed.iter().any(|p| !p) {
        let mut layer = Vec::new();
        for (idx, e) in emulators.iter().enumerate() {
            if placed[idx] {
                continue;
            }
            let ready = e.dependencies().iter().all(|dep| {
                kinds
                    .iter()
                    .position(|k| k == dep)
                    .is_some_and(|dep_idx| placed[dep_idx])
            });
            if ready {
                layer.push(idx);
            }
        }

        if layer.is_empty() {
            // Nothing progressed: the remaining nodes form a cycle.
            let stuck = placed
                .iter()
                .position(|p| !p)
                .map_or(EmulatorKind::Database, |idx| emulators[idx].kind());
            return Err(RegistryError::Cycle { kind: stuck });
        }

        for &idx in &layer {
            placed[idx] = true;
        }
        layers.push(layer);
    }

    Ok(layers)
}
