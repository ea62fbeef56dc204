//! Scoped GPU context activation.
//!
//! CUDA contexts are thread-affine: the context a write is issued against
//! must be current on the calling thread. [`ContextGuard`] makes a context
//! current for a scope and restores the previous one on every exit path.

use crate::error::Result;

/// A GPU context that can be pushed onto / popped off the calling thread's
/// context stack.
pub trait ContextStack {
    fn push_current(&self) -> Result<()>;
    fn pop_current(&self) -> Result<()>;
}

impl<T: ContextStack + ?Sized> ContextStack for std::sync::Arc<T> {
    fn push_current(&self) -> Result<()> {
        (**self).push_current()
    }

    fn pop_current(&self) -> Result<()> {
        (**self).pop_current()
    }
}

/// Keeps a context current until released or dropped.
#[must_use = "the context is popped as soon as the guard is dropped"]
pub struct ContextGuard<'a, C: ContextStack + ?Sized> {
    context: &'a C,
    pushed: bool,
}

impl<'a, C: ContextStack + ?Sized> ContextGuard<'a, C> {
    pub fn push(context: &'a C) -> Result<Self> {
        context.push_current()?;
        Ok(Self {
            context,
            pushed: true,
        })
    }

    /// Pop the context, reporting failure to the caller.
    pub fn release(mut self) -> Result<()> {
        self.pushed = false;
        self.context.pop_current()
    }
}

impl<C: ContextStack + ?Sized> Drop for ContextGuard<'_, C> {
    fn drop(&mut self) {
        if self.pushed {
            if let Err(e) = self.context.pop_current() {
                tracing::error!(error = %e, "failed to restore GPU context");
            }
        }
    }
}
