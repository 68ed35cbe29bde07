//! Depth accounting for nested chain invocation.
//!
//! Chains may jump to themselves or to each other, so the set of chains is a
//! graph with cycles. Rather than rejecting cycles up front, every `goto` and
//! `call` enters a [`RecursionGuard`], and evaluation fails with a
//! [`RecursionError`] once the configured depth is exceeded.

use mavtables_core::error::RecursionError;
use std::cell::Cell;

/// Per-evaluation recursion bookkeeping.
///
/// Not `Sync`: each evaluation owns its own instance on the stack.
#[derive(Debug)]
pub struct RecursionData {
    depth: Cell<usize>,
    peak: Cell<usize>,
    max_depth: usize,
}

impl RecursionData {
    pub fn new(max_depth: usize) -> Self {
        Self {
            depth: Cell::new(0),
            peak: Cell::new(0),
            max_depth,
        }
    }

    /// Current nesting depth.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// Deepest nesting reached so far.
    #[inline]
    pub fn peak(&self) -> usize {
        self.peak.get()
    }

    #[inline]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

/// Scoped increment of a [`RecursionData`] depth.
///
/// The depth is decremented when the guard drops, including when an error
/// unwinds through the enclosing evaluation.
#[derive(Debug)]
#[must_use = "the depth is released as soon as the guard is dropped"]
pub struct RecursionGuard<'a> {
    data: &'a RecursionData,
}

impl<'a> RecursionGuard<'a> {
    /// Enter `chain`, failing if that would exceed the maximum depth.
    pub fn enter(data: &'a RecursionData, chain: &str) -> Result<Self, RecursionError> {
        let depth = data.depth.get() + 1;
        if depth > data.max_depth {
            return Err(RecursionError {
                chain: chain.to_string(),
                max_depth: data.max_depth,
            });
        }

        data.depth.set(depth);
        if depth > data.peak.get() {
            data.peak.set(depth);
        }
        Ok(Self { data })
    }
}

impl Drop for RecursionGuard<'_> {
    fn drop(&mut self) {
        self.data.depth.set(self.data.depth.get() - 1);
    }
}
