// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Callback registration lists for lifecycle events.
//!
//! A panicking listener is logged and skipped; the remaining listeners still
//! receive the event.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A shared list of event listeners. Clones share the same list.
pub struct Observers<E> {
    listeners: Arc<RwLock<Vec<Listener<E>>>>,
}

impl<E> Observers<E> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Registers a listener for every future event.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `event` to every listener and returns how many completed
    /// without panicking.
    pub fn emit(&self, event: &E) -> usize {
        // Snapshot so listeners may subscribe re-entrantly.
        let snapshot: Vec<Listener<E>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut delivered = 0;
        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_ok() {
                delivered += 1;
            } else {
                warn!("event listener panicked; continuing with remaining listeners");
            }
        }
        delivered
    }
}

impl<E> Clone for Observers<E> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("listeners", &self.len())
            .finish()
    }
}
