//! Execution context of the actor method running on the current thread
//!
//! Set for the duration of a constructor or method call and cleared on the
//! way out, panics included.

use gateway_types::ActorId;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

thread_local! {
    static CURRENT_ACTOR: RefCell<Option<ActorContext>> = const { RefCell::new(None) };
}

#[derive(Debug, Clone)]
pub struct ActorContext {
    actor_id: ActorId,
    restarted: bool,
    exit: Arc<AtomicBool>,
}

impl ActorContext {
    pub fn new(actor_id: ActorId, restarted: bool, exit: Arc<AtomicBool>) -> Self {
        Self {
            actor_id,
            restarted,
            exit,
        }
    }

    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }

    /// Whether this incarnation follows at least one restart
    pub fn was_restarted(&self) -> bool {
        self.restarted
    }

    /// Ask for the actor to terminate once the current call returns
    pub fn request_exit(&self) {
        self.exit.store(true, Ordering::Release);
    }

    pub fn exit_requested(&self) -> bool {
        self.exit.load(Ordering::Acquire)
    }
}

/// Context of the actor executing on this thread, if any
pub fn current() -> Option<ActorContext> {
    CURRENT_ACTOR.with(|slot| slot.borrow().clone())
}

struct Restore(Option<ActorContext>);

impl Drop for Restore {
    fn drop(&mut self) {
        let previous = self.0.take();
        CURRENT_ACTOR.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// Run `f` with `context` installed as the current actor
pub fn scope<R>(context: ActorContext, f: impl FnOnce() -> R) -> R {
    let previous = CURRENT_ACTOR.with(|slot| slot.borrow_mut().replace(context));
    let _restore = Restore(previous);
    f()
}
