// SPDX-License-Identifier: Apache-2.0

//! Initializer and finalizer callbacks
//!
//! Initializers run in registration order before the handshake. Finalizers run
//! in reverse registration order after the dispatch loop ended. Each callback
//! runs at most once.

type Callback = Box<dyn FnOnce()>;

/// Registered initializers and finalizers.
#[derive(Default)]
pub struct Callbacks {
    init: Vec<Callback>,
    fini: Vec<Callback>,
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("init", &self.init.len())
            .field("fini", &self.fini.len())
            .finish()
    }
}

impl Callbacks {
    /// Registers an initializer.
    pub fn on_init(&mut self, f: impl FnOnce() + 'static) -> &mut Self {
        self.init.push(Box::new(f));
        self
    }

    /// Registers a finalizer.
    pub fn on_fini(&mut self, f: impl FnOnce() + 'static) -> &mut Self {
        self.fini.push(Box::new(f));
        self
    }

    /// Runs all pending initializers and returns how many ran.
    pub fn run_init(&mut self) -> usize {
        let pending: Vec<_> = self.init.drain(..).collect();
        let count = pending.len();
        pending.into_iter().for_each(|f| f());
        count
    }

    /// Runs all pending finalizers and returns how many ran.
    pub fn run_fini(&mut self) -> usize {
        let pending: Vec<_> = self.fini.drain(..).rev().collect();
        let count = pending.len();
        pending.into_iter().for_each(|f| f());
        count
    }
}
