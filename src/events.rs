// (c) Copyright 2026 The changeset authors. All rights reserved.
//! Notifications emitted by buffers.
//!
//! A host that derives state from a buffer (for example a UI binding layer) subscribes here to
//! learn when to re-read it. The buffer never depends on anyone listening.
use ahash::HashMap;
use smallvec::SmallVec;
use std::{cell::RefCell, fmt, rc::Rc};

/// The kind of an [`Event`], used to subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    BeforeValidation,
    AfterValidation,
    AfterRollback,
    PropertyChanged,
}

/// Something that happened to a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A validation of `key` is about to run.
    BeforeValidation { key: String },
    /// A validation of `key` has produced an outcome.
    AfterValidation { key: String },
    /// The buffer was rolled back.
    AfterRollback,
    /// The staged state of `key` changed.
    PropertyChanged { key: String },
}

impl Event {
    pub fn name(&self) -> EventName {
        match self {
            Event::BeforeValidation { .. } => EventName::BeforeValidation,
            Event::AfterValidation { .. } => EventName::AfterValidation,
            Event::AfterRollback => EventName::AfterRollback,
            Event::PropertyChanged { .. } => EventName::PropertyChanged,
        }
    }
}

/// Identifies a subscription so it can be removed with [`Notifier::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Rc<dyn Fn(&Event)>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    by_name: HashMap<EventName, Vec<(ListenerId, Listener)>>,
}

/// A set of event listeners.
///
/// Clones share the same listeners.
#[derive(Clone, Default)]
pub struct Notifier {
    listeners: Rc<RefCell<Listeners>>,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.borrow();
        f.debug_struct("Notifier")
            .field("listeners", &listeners.by_name.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for events named `name`.
    pub fn on(&self, name: EventName, callback: impl Fn(&Event) + 'static) -> ListenerId {
        let mut listeners = self.listeners.borrow_mut();
        let id = ListenerId(listeners.next_id);
        listeners.next_id += 1;
        listeners
            .by_name
            .entry(name)
            .or_default()
            .push((id, Rc::new(callback)));
        id
    }

    /// Removes a subscription. Returns `false` if it was not registered for `name`.
    pub fn off(&self, name: EventName, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Some(registered) = listeners.by_name.get_mut(&name) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|(other, _)| *other != id);
        before != registered.len()
    }

    /// Calls every listener registered for the event's name, in registration order.
    ///
    /// Listeners may subscribe, unsubscribe or trigger further events while being called.
    pub fn trigger(&self, event: &Event) {
        let listeners: SmallVec<[Listener; 4]> = self
            .listeners
            .borrow()
            .by_name
            .get(&event.name())
            .map(|registered| registered.iter().map(|(_, l)| Rc::clone(l)).collect())
            .unwrap_or_default();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self, name: EventName) -> usize {
        self.listeners
            .borrow()
            .by_name
            .get(&name)
            .map_or(0, Vec::len)
    }
}
