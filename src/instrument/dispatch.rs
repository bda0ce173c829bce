//! Swappable operation slots.
//!
//! # Design Decisions
//! - Each traced operation lives in an ArcSwap slot; call sites load the
//!   current implementation lock-free on every call
//! - A wrapped slot remembers the implementation it replaced, so
//!   uninstalling restores it exactly
//! - Writers (install/uninstall) serialize on one family-wide mutex; readers
//!   never take it, so traced calls run concurrently with installs

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, MutexGuard};

use super::operation::{FindOperation, UpdateOperation};

struct Installed<Op: ?Sized> {
    active: Arc<Op>,
    previous: Option<Arc<Op>>,
}

/// One swappable operation.
pub struct Dispatch<Op: ?Sized> {
    slot: ArcSwap<Installed<Op>>,
}

impl<Op: ?Sized> Dispatch<Op> {
    pub fn new(base: Arc<Op>) -> Self {
        Self {
            slot: ArcSwap::from_pointee(Installed {
                active: base,
                previous: None,
            }),
        }
    }

    /// The implementation calls should go through right now.
    pub fn current(&self) -> Arc<Op> {
        self.slot.load().active.clone()
    }

    pub fn is_wrapped(&self) -> bool {
        self.slot.load().previous.is_some()
    }

    /// Replace the active implementation with `wrap(active)`. No-op when
    /// already wrapped. Callers hold the family lock.
    pub(crate) fn wrap(&self, wrap: impl FnOnce(Arc<Op>) -> Arc<Op>) -> bool {
        let installed = self.slot.load_full();
        if installed.previous.is_some() {
            return false;
        }
        let base = installed.active.clone();
        self.slot.store(Arc::new(Installed {
            active: wrap(base.clone()),
            previous: Some(base),
        }));
        true
    }

    /// Restore the implementation replaced by `wrap`. No-op when not wrapped.
    pub(crate) fn restore(&self) -> bool {
        let installed = self.slot.load_full();
        match &installed.previous {
            Some(previous) => {
                self.slot.store(Arc::new(Installed {
                    active: previous.clone(),
                    previous: None,
                }));
                true
            }
            None => false,
        }
    }
}

/// The traced operation family of one database connection.
pub struct Operations {
    pub(crate) find: Dispatch<dyn FindOperation>,
    pub(crate) update: Dispatch<dyn UpdateOperation>,
    install_lock: Mutex<()>,
}

impl Operations {
    pub fn new(find: Arc<dyn FindOperation>, update: Arc<dyn UpdateOperation>) -> Self {
        Self {
            find: Dispatch::new(find),
            update: Dispatch::new(update),
            install_lock: Mutex::new(()),
        }
    }

    /// Use one engine for every operation.
    pub fn from_engine<E>(engine: Arc<E>) -> Self
    where
        E: FindOperation + UpdateOperation + 'static,
    {
        Self::new(engine.clone(), engine)
    }

    pub fn find(&self) -> Arc<dyn FindOperation> {
        self.find.current()
    }

    pub fn update(&self) -> Arc<dyn UpdateOperation> {
        self.update.current()
    }

    /// True while any operation of the family is wrapped.
    pub fn is_instrumented(&self) -> bool {
        self.find.is_wrapped() || self.update.is_wrapped()
    }

    pub(crate) fn lock_install(&self) -> MutexGuard<'_, ()> {
        self.install_lock.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct Plain;
    impl Greeter for Plain {
        fn greet(&self) -> String {
            "hi".to_string()
        }
    }

    struct Loud(Arc<dyn Greeter>);
    impl Greeter for Loud {
        fn greet(&self) -> String {
            self.0.greet().to_uppercase()
        }
    }

    #[test]
    fn test_wrap_and_restore_are_idempotent() {
        let slot: Dispatch<dyn Greeter> = Dispatch::new(Arc::new(Plain));

        assert!(slot.wrap(|inner| Arc::new(Loud(inner))));
        assert!(!slot.wrap(|inner| Arc::new(Loud(inner))));
        assert_eq!(slot.current().greet(), "HI");

        assert!(slot.restore());
        assert!(!slot.restore());
        assert_eq!(slot.current().greet(), "hi");
        assert!(!slot.is_wrapped());
    }
}
