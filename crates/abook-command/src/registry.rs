use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use abook_core::{CommandId, CommandState, PersonId};
use tracing::{debug, warn};

use crate::handle::CommandHandle;

/// At most one in-flight command per person id.
#[derive(Default)]
pub struct CommandRegistry {
    active: Mutex<HashMap<PersonId, Arc<CommandHandle>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PersonId, Arc<CommandHandle>>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record `handle` as the active command for `id`. Assigning an occupied
    /// id is a caller bug: it is refused and logged.
    pub fn assign(&self, id: PersonId, handle: Arc<CommandHandle>) -> bool {
        let mut active = self.lock();
        debug_assert!(!active.contains_key(&id), "{} already assigned", id);
        if let Some(existing) = active.get(&id) {
            warn!(person = %id, existing = %existing.id(), new = %handle.id(), "registry slot already taken");
            return false;
        }
        active.insert(id, handle);
        true
    }

    /// Remove the entry for `id` if it belongs to `command`.
    pub fn unassign(&self, id: &PersonId, command: CommandId) -> bool {
        let mut active = self.lock();
        match active.get(id) {
            Some(existing) if existing.id() == command => {
                active.remove(id);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: &PersonId) -> Option<Arc<CommandHandle>> {
        self.lock().get(id).cloned()
    }

    pub fn has_ongoing(&self, id: &PersonId) -> bool {
        self.lock().contains_key(id)
    }

    /// Move an entry to a new id, e.g. once an add's provisional id has been
    /// replaced by the remote-assigned one.
    pub fn remap(&self, from: &PersonId, to: PersonId) -> bool {
        let mut active = self.lock();
        if active.contains_key(&to) {
            warn!(from = %from, to = %to, "remap target already assigned");
            return false;
        }
        match active.remove(from) {
            Some(handle) => {
                debug!(from = %from, to = %to, command = %handle.id(), "registry remap");
                active.insert(to, handle);
                true
            }
            None => false,
        }
    }

    /// Wait until `handle` can own its target, then assign it.
    ///
    /// While another command holds the target, wait for it to complete and
    /// re-resolve the target from it: a confirmed add hands over its remote
    /// id. Returns the target that was assigned.
    pub async fn acquire(&self, handle: &Arc<CommandHandle>) -> PersonId {
        loop {
            let target = handle.target();
            let holder = {
                let mut active = self.lock();
                match active.get(&target) {
                    Some(existing) => Arc::clone(existing),
                    None => {
                        active.insert(target.clone(), Arc::clone(handle));
                        return target;
                    }
                }
            };
            debug!(person = %target, waiting = %handle.id(), holder = %holder.id(), "waiting for in-flight command");
            holder.wait_for_completion().await;
            let resolved = holder.target();
            if resolved != target {
                handle.set_target(resolved);
            }
        }
    }

    /// Drop the entry for a finished command and publish its terminal state,
    /// as one step, so no waiter can observe the id as free while the command
    /// is still live.
    pub(crate) fn release(&self, handle: &CommandHandle, terminal: CommandState) {
        let mut active = self.lock();
        let target = handle.target();
        if matches!(active.get(&target), Some(existing) if existing.id() == handle.id()) {
            active.remove(&target);
        }
        handle.set_state(terminal);
    }

    /// Every (person, command) pair currently registered.
    pub fn active(&self) -> Vec<(PersonId, CommandId)> {
        self.lock()
            .iter()
            .map(|(id, handle)| (id.clone(), handle.id()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
