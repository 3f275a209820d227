//! # Hook Chains
//!
//! Ordered sequences of user callbacks run over an instance. A pool keeps two:
//! the return chain (after the producer's built-in return behavior) and the
//! factory chain (once per newly created instance).

use std::sync::Arc;

/// A single hook.
pub type Hook<I> = Arc<dyn Fn(&mut I) + Send + Sync>;

/// Ordered list of hooks, run front to back.
pub struct HookChain<I> {
    hooks: Vec<Hook<I>>,
}

impl<I> HookChain<I> {
    /// Creates an empty chain.
    #[must_use]
    pub const fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Appends a hook.
    pub fn push(&mut self, hook: Hook<I>) {
        self.hooks.push(hook);
    }

    /// Removes every hook.
    pub fn clear(&mut self) {
        self.hooks.clear();
    }

    /// Number of hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns true if the chain has no hooks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every hook in order.
    pub fn run(&self, instance: &mut I) {
        for hook in &self.hooks {
            hook(instance);
        }
    }
}

impl<I> Clone for HookChain<I> {
    fn clone(&self) -> Self {
        Self {
            hooks: self.hooks.clone(),
        }
    }
}

impl<I> Default for HookChain<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> From<Vec<Hook<I>>> for HookChain<I> {
    fn from(hooks: Vec<Hook<I>>) -> Self {
        Self { hooks }
    }
}

impl<I> std::fmt::Debug for HookChain<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookChain")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_in_order() {
        let mut chain: HookChain<Vec<u8>> = HookChain::new();
        chain.push(Arc::new(|v: &mut Vec<u8>| v.push(1)));
        chain.push(Arc::new(|v: &mut Vec<u8>| v.push(2)));

        let mut trace = Vec::new();
        chain.run(&mut trace);
        assert_eq!(trace, vec![1, 2]);
    }

    #[test]
    fn test_clear_empties_chain() {
        let mut chain: HookChain<u8> = HookChain::new();
        chain.push(Arc::new(|v: &mut u8| *v += 1));
        chain.clear();

        let mut value = 0;
        chain.run(&mut value);
        assert!(chain.is_empty());
        assert_eq!(value, 0);
    }
}
