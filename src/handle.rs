//! Single-owner wrapper around one native resource id.
//!
//! A [`ResourceHandle`] is created by [`ResourceHandle::acquire`], which runs
//! the foreign constructor, and freed exactly once: either by an explicit
//! [`ResourceHandle::release`] or by the `Drop` backstop.
//!
//! The backstop is a safety net for paths that forget to release. Owners
//! that hold large native state (trained models) should still call
//! `release` themselves when they are done; tests check the explicit path
//! independently of when values are dropped.

use std::fmt;

use crate::error::{Error, Result};
use crate::ffi::{self, CallResult, EngineRef, RawHandle};

/// Which foreign destructor frees the resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleKind {
    Dataset,
    Booster,
}

impl HandleKind {
    pub fn name(self) -> &'static str {
        match self {
            HandleKind::Dataset => "dataset",
            HandleKind::Booster => "booster",
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Owns one native resource id.
pub struct ResourceHandle {
    engine: EngineRef,
    kind: HandleKind,
    raw: Option<RawHandle>,
}

impl ResourceHandle {
    /// Run `factory` against the engine and take ownership of the id it returns.
    pub(crate) fn acquire<F>(engine: &EngineRef, kind: HandleKind, factory: F) -> Result<Self>
    where
        F: FnOnce(&dyn ffi::Engine) -> CallResult<RawHandle>,
    {
        let raw = ffi::check(engine.as_ref(), factory(engine.as_ref()))?;
        tracing::debug!(%kind, handle = raw.0, "acquired native handle");
        Ok(Self {
            engine: engine.clone(),
            kind,
            raw: Some(raw),
        })
    }

    /// The raw id for passing into a foreign call.
    pub(crate) fn borrow(&self) -> Result<RawHandle> {
        self.raw.ok_or(Error::Resource(self.kind.name()))
    }

    /// The engine this handle belongs to.
    pub fn engine(&self) -> &EngineRef {
        &self.engine
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// Whether the handle has been released.
    pub fn is_released(&self) -> bool {
        self.raw.is_none()
    }

    /// Free the native resource.
    ///
    /// A second call is a no-op. If the foreign destructor fails, the handle
    /// is still considered released so it is never freed twice.
    pub fn release(&mut self) -> Result<()> {
        let Some(raw) = self.raw.take() else {
            tracing::debug!(kind = %self.kind, "release on an already released handle");
            return Ok(());
        };
        tracing::debug!(kind = %self.kind, handle = raw.0, "releasing native handle");
        ffi::check(self.engine.as_ref(), self.free(raw))
    }

    fn free(&self, raw: RawHandle) -> CallResult<()> {
        match self.kind {
            HandleKind::Dataset => self.engine.dataset_free(raw),
            HandleKind::Booster => self.engine.booster_free(raw),
        }
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            if self.free(raw).is_err() {
                tracing::warn!(
                    kind = %self.kind,
                    handle = raw.0,
                    error = %self.engine.last_error(),
                    "failed to free native handle on drop"
                );
            }
        }
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("kind", &self.kind)
            .field("released", &self.is_released())
            .finish()
    }
}
