use std::ops::{Deref, DerefMut};

use tracing::warn;

use crate::{Adapter, Result};

/// Transaction scope over an [`Adapter`]. Rolls back on drop unless
/// [`Transaction::commit`] was called. Scopes nest through the adapter's level
/// counter.
pub struct Transaction<'a> {
    adapter: &'a mut Adapter,
    finished: bool,
}

impl<'a> Transaction<'a> {
    /// Wraps an adapter whose `begin` has already been called.
    pub(crate) fn new(adapter: &'a mut Adapter) -> Self {
        Self {
            adapter,
            finished: false,
        }
    }

    /// A failed commit leaves the scope unfinished, so dropping it rolls back.
    pub fn commit(mut self) -> Result<()> {
        let outcome = self.adapter.commit();
        self.finished = outcome.is_ok();
        outcome
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.adapter.rollback()
    }
}

impl Deref for Transaction<'_> {
    type Target = Adapter;

    fn deref(&self) -> &Self::Target {
        self.adapter
    }
}

impl DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.adapter
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished || !self.adapter.is_in_transaction() {
            return;
        }
        if let Err(error) = self.adapter.rollback() {
            warn!(%error, "rollback of unfinished transaction scope failed");
        }
    }
}
