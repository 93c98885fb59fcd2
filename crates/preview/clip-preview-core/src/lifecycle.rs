//! Host lifecycle signals and the scoped guard that ties a session to them.
//!
//! The host owns a [`LifecycleHub`] and broadcasts on it when it switches into
//! run mode or quits. A session holds one [`LifecycleGuard`] while its scratch
//! region exists; the guard owns a mailbox on the hub and unregisters it when
//! dropped. Everything here runs on the host's single cooperative thread.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Host transitions that must tear down any live preview.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum HostSignal {
    EnteringRunMode,
    Quitting,
}

#[derive(Debug, Default)]
struct HubInner {
    next_slot: u64,
    mailboxes: HashMap<u64, VecDeque<HostSignal>>,
}

#[derive(Clone, Debug, Default)]
pub struct LifecycleHub {
    inner: Rc<RefCell<HubInner>>,
}

impl LifecycleHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new mailbox. Dropping the guard unregisters it.
    pub fn acquire(&self) -> LifecycleGuard {
        let mut inner = self.inner.borrow_mut();
        let slot = inner.next_slot;
        inner.next_slot = inner.next_slot.wrapping_add(1);
        inner.mailboxes.insert(slot, VecDeque::new());
        LifecycleGuard {
            hub: Rc::clone(&self.inner),
            slot,
        }
    }

    /// Post `signal` to every registered guard.
    pub fn broadcast(&self, signal: HostSignal) {
        let mut inner = self.inner.borrow_mut();
        for mailbox in inner.mailboxes.values_mut() {
            mailbox.push_back(signal);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().mailboxes.len()
    }
}

/// Registration of one session on a [`LifecycleHub`].
#[derive(Debug)]
pub struct LifecycleGuard {
    hub: Rc<RefCell<HubInner>>,
    slot: u64,
}

impl LifecycleGuard {
    /// Drain signals delivered since the last call.
    pub fn take_signals(&self) -> Vec<HostSignal> {
        self.hub
            .borrow_mut()
            .mailboxes
            .get_mut(&self.slot)
            .map(|m| m.drain(..).collect())
            .unwrap_or_default()
    }
}

impl Drop for LifecycleGuard {
    fn drop(&mut self) {
        self.hub.borrow_mut().mailboxes.remove(&self.slot);
    }
}
