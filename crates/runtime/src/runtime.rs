// SPDX-License-Identifier: Apache-2.0

//! Runtime life cycle

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::handshake;
use crate::heap::Heap;
use crate::init::Callbacks;
use crate::{Error, Result};

use std::alloc::Layout;

use log::{debug, info};
use postern_shim::ThreadData;
use wicket::Channel;

/// Size of the allocation probing the confined heap at startup.
const HEAP_PROBE_SIZE: usize = 13;

/// Runtime life cycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Nothing ran yet.
    Uninitialized,
    /// Initializers ran and the heap works.
    AwaitingHandshake,
    /// The main channel is up and requests are served.
    Serving,
    /// The dispatch loop ended and finalizers ran.
    Terminated,
}

/// A virtual enclave runtime.
#[derive(Debug)]
pub struct Runtime {
    state: State,
    config: Config,
    callbacks: Callbacks,
    heap: Option<Heap>,
    td: ThreadData,
}

impl Runtime {
    /// Creates a runtime that runs `callbacks` around its dispatch loop.
    pub fn new(config: Config, callbacks: Callbacks) -> Self {
        Self {
            state: State::Uninitialized,
            config,
            callbacks,
            heap: None,
            td: ThreadData::new(true),
        }
    }

    /// The current state
    pub fn state(&self) -> State {
        self.state
    }

    /// The confined heap, once initialized.
    pub fn heap(&self) -> Option<&Heap> {
        self.heap.as_ref()
    }

    fn transition(&mut self, next: State) {
        debug!("runtime state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Runs the initializers and probes the confined heap.
    pub fn initialize(&mut self) -> Result<()> {
        if self.state != State::Uninitialized {
            return Err(Error::Protocol(format!("initialize in state {:?}", self.state)));
        }

        let ran = self.callbacks.run_init();
        debug!("ran {ran} initializers");

        let mut heap = Heap::new(self.config.heap_size)
            .map_err(|e| Error::Bootstrap(format!("unable to map the heap: {e}")))?;
        let layout = Layout::from_size_align(HEAP_PROBE_SIZE, 1)
            .map_err(|e| Error::Bootstrap(e.to_string()))?;
        let probe = heap
            .alloc(layout)
            .ok_or_else(|| Error::Bootstrap("heap probe allocation failed".into()))?;
        heap.release(probe, layout);
        self.heap = Some(heap);

        self.transition(State::AwaitingHandshake);
        Ok(())
    }

    /// Waits on `bootstrap` for the host and returns the main channel.
    pub fn handshake(&mut self, bootstrap: &mut Channel) -> Result<Channel> {
        if self.state != State::AwaitingHandshake {
            return Err(Error::Protocol(format!("handshake in state {:?}", self.state)));
        }

        let main = handshake::accept(bootstrap)?;
        self.transition(State::Serving);
        Ok(main)
    }

    /// Serves `main` until terminated, then runs the finalizers.
    ///
    /// Finalizers run whether the loop ended cleanly or not.
    pub fn serve(&mut self, main: &mut Channel) -> Result<i32> {
        if self.state != State::Serving {
            return Err(Error::Protocol(format!("serve in state {:?}", self.state)));
        }

        let mut dispatcher = Dispatcher::new(main, &mut self.td);
        let served = dispatcher.serve();
        info!("dispatch loop ended after {} requests", dispatcher.handled());

        let ran = self.callbacks.run_fini();
        debug!("ran {ran} finalizers");
        self.transition(State::Terminated);
        served
    }

    /// Runs the whole life cycle on `bootstrap` and returns the exit status the
    /// host asked for.
    pub fn run(&mut self, mut bootstrap: Channel) -> Result<i32> {
        self.initialize()?;
        let mut main = self.handshake(&mut bootstrap)?;
        drop(bootstrap);
        self.serve(&mut main)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::Cell;
    use std::os::unix::net::UnixStream;
    use std::rc::Rc;
    use std::thread;

    use wicket::Message;

    fn counted() -> (Callbacks, Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let inits = Rc::new(Cell::new(0));
        let finis = Rc::new(Cell::new(0));
        let mut callbacks = Callbacks::default();
        let (i, f) = (inits.clone(), finis.clone());
        callbacks
            .on_init(move || i.set(i.get() + 1))
            .on_fini(move || f.set(f.get() + 1));
        (callbacks, inits, finis)
    }

    #[test]
    fn life_cycle() {
        let (callbacks, inits, finis) = counted();
        let mut runtime = Runtime::new(Config::default(), callbacks);
        assert_eq!(runtime.state(), State::Uninitialized);

        let (mut host_boot, keep_boot) = Channel::pair().unwrap();
        let (keep, host) = UnixStream::pair().unwrap();

        let host = thread::spawn(move || {
            let (mut main, _) =
                handshake::offer(&mut host_boot, wicket::REQUIRES, keep, host).unwrap();
            main.call(&Message::Terminate(0)).unwrap()
        });

        assert_eq!(runtime.run(keep_boot).unwrap(), 0);
        assert_eq!(host.join().unwrap(), Message::Terminate(0));

        assert_eq!(runtime.state(), State::Terminated);
        assert_eq!((inits.get(), finis.get()), (1, 1));

        let heap = runtime.heap().unwrap();
        assert_eq!(heap.brk_max(), heap.start() + HEAP_PROBE_SIZE);
    }

    #[test]
    fn finalizers_run_after_failure() {
        let (callbacks, _, finis) = counted();
        let mut runtime = Runtime::new(Config::default(), callbacks);
        runtime.initialize().unwrap();

        let (mut host_boot, mut keep_boot) = Channel::pair().unwrap();
        let (keep, host) = UnixStream::pair().unwrap();
        let host = thread::spawn(move || {
            let (main, _) =
                handshake::offer(&mut host_boot, wicket::REQUIRES, keep, host).unwrap();
            drop(main);
        });

        let mut main = runtime.handshake(&mut keep_boot).unwrap();
        host.join().unwrap();

        assert!(matches!(runtime.serve(&mut main), Err(Error::Channel(..))));
        assert_eq!(runtime.state(), State::Terminated);
        assert_eq!(finis.get(), 1);
    }

    #[test]
    fn no_handshake() {
        let (callbacks, _, finis) = counted();
        let mut runtime = Runtime::new(Config::default(), callbacks);

        let (host_boot, keep_boot) = Channel::pair().unwrap();
        drop(host_boot);

        assert!(matches!(runtime.run(keep_boot), Err(Error::Bootstrap(..))));
        assert_eq!(runtime.state(), State::AwaitingHandshake);
        assert_eq!(finis.get(), 0);
    }

    #[test]
    fn out_of_order() {
        let mut runtime = Runtime::new(Config::default(), Callbacks::default());
        let (mut a, _b) = Channel::pair().unwrap();

        assert!(matches!(runtime.handshake(&mut a), Err(Error::Protocol(..))));
        assert!(matches!(runtime.serve(&mut a), Err(Error::Protocol(..))));
        runtime.initialize().unwrap();
        assert!(matches!(runtime.initialize(), Err(Error::Protocol(..))));
    }
}
