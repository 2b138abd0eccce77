use std::collections::HashSet;
use std::fmt;

use abook_command::CommandService;
use abook_core::{CommandId, CommandKind, CommandState, PersonId};
use abook_remote::{QuotaStatus, RateLimitedStore};
use serde::Serialize;

use crate::actors::RecordingObserver;

/// A violation detected during simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub step: usize,
    pub invariant: String,
    pub details: String,
}

impl Violation {
    fn new(step: usize, invariant: &str, details: String) -> Self {
        Violation {
            step,
            invariant: invariant.to_string(),
            details,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {}: [{}] {}", self.step, self.invariant, self.details)
    }
}

/// Every command past `NewlyCreated` that has not finished must be the one
/// the registry holds for its target, and the registry must only hold live
/// commands.
pub fn check_exclusive_targets(step: usize, service: &CommandService) -> Vec<Violation> {
    let mut violations = Vec::new();
    let registry = service.registry();
    let mut seen: HashSet<PersonId> = HashSet::new();

    for id in service.in_flight() {
        let Some(handle) = service.handle(id) else {
            continue;
        };
        let state = handle.state();
        if state == CommandState::NewlyCreated || state.is_terminal() {
            continue;
        }
        let target = handle.target();
        if !seen.insert(target.clone()) {
            violations.push(Violation::new(
                step,
                "single-command-per-person",
                format!("two running commands target {target}"),
            ));
        }
        match registry.get(&target) {
            Some(holder) if holder.id() == id => {}
            Some(holder) => violations.push(Violation::new(
                step,
                "single-command-per-person",
                format!("{id} is {state} on {target} but {} holds it", holder.id()),
            )),
            None => violations.push(Violation::new(
                step,
                "single-command-per-person",
                format!("{id} is {state} on {target} without holding it"),
            )),
        }
    }

    for (person, command) in registry.active() {
        if registry.get(&person).is_some_and(|h| h.is_terminal()) {
            violations.push(Violation::new(
                step,
                "single-command-per-person",
                format!("finished command {command} still holds {person}"),
            ));
        }
    }
    violations
}

/// Remaining quota never grows inside a window and never exceeds the limit.
pub fn check_quota(step: usize, before: &QuotaStatus, after: &QuotaStatus) -> Vec<Violation> {
    let mut violations = Vec::new();
    if after.remaining > after.limit {
        violations.push(Violation::new(
            step,
            "quota-bounds",
            format!("remaining {} exceeds limit {}", after.remaining, after.limit),
        ));
    }
    if after.reset_at == before.reset_at && after.remaining > before.remaining {
        violations.push(Violation::new(
            step,
            "quota-monotonic",
            format!(
                "remaining grew from {} to {} without a reset",
                before.remaining, after.remaining
            ),
        ));
    }
    violations
}

/// Every recorded path is a walk through the life cycle, and commands
/// cancelled during their grace period never reached the remote.
pub fn check_paths(
    step: usize,
    observer: &RecordingObserver,
    cancelled_in_grace: &HashSet<CommandId>,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (id, kind, path) in observer.paths() {
        if path.first() != Some(&CommandState::NewlyCreated) {
            violations.push(Violation::new(
                step,
                "life-cycle",
                format!("{kind} {id} did not start as NEWLY_CREATED: {path:?}"),
            ));
        }
        for pair in path.windows(2) {
            if !pair[0].can_advance_to(pair[1]) {
                violations.push(Violation::new(
                    step,
                    "life-cycle",
                    format!("{kind} {id} moved {} -> {}", pair[0], pair[1]),
                ));
            }
        }
        if kind == CommandKind::Add && path.contains(&CommandState::ConflictFound) {
            violations.push(Violation::new(
                step,
                "life-cycle",
                format!("add {id} found a conflict"),
            ));
        }
        if cancelled_in_grace.contains(&id) && path.contains(&CommandState::RequestingRemoteChange)
        {
            violations.push(Violation::new(
                step,
                "cancel-before-remote",
                format!("{id} was cancelled during its grace period but reached the remote"),
            ));
        }
    }
    violations
}

/// After the system is idle and freshly synced, the backing book mirrors
/// the remote and confirmed deletions stay deleted.
pub fn check_final_consistency(
    step: usize,
    service: &CommandService,
    store: &RateLimitedStore,
    deleted: &[PersonId],
) -> Vec<Violation> {
    let mut violations = Vec::new();
    let book = service.book();
    let collection = service.facade().collection();

    if !service.registry().is_empty() {
        violations.push(Violation::new(
            step,
            "idle-registry",
            format!("{} entries left in the registry", service.registry().len()),
        ));
    }

    for id in deleted {
        if book.contains(id) {
            violations.push(Violation::new(
                step,
                "deleted-stays-deleted",
                format!("{id} was deleted successfully but is still in the book"),
            ));
        }
    }

    let backing = book.backing_persons();
    for person in &backing {
        let Some(remote_id) = person.id.remote_id() else {
            violations.push(Violation::new(
                step,
                "backing-confirmed",
                format!("backing person {} has an unconfirmed id", person.id),
            ));
            continue;
        };
        match store.peek_person(collection, remote_id) {
            Some(remote) if remote.deleted => violations.push(Violation::new(
                step,
                "backing-matches-remote",
                format!("{} is deleted remotely but still backed locally", person.id),
            )),
            Some(remote) if remote.data != person.data => violations.push(Violation::new(
                step,
                "backing-matches-remote",
                format!(
                    "{} is {:?} locally but {:?} remotely",
                    person.id, person.data.name, remote.data.name
                ),
            )),
            Some(_) => {}
            None => violations.push(Violation::new(
                step,
                "backing-matches-remote",
                format!("{} is unknown to the remote", person.id),
            )),
        }
    }

    let live = store.live_count(collection);
    if live != backing.len() {
        violations.push(Violation::new(
            step,
            "backing-matches-remote",
            format!("{} persons backed locally, {live} live remotely", backing.len()),
        ));
    }

    for (person, pending) in book.visible_persons() {
        if let Some(pending) = pending {
            violations.push(Violation::new(
                step,
                "idle-book",
                format!("{} still pending on {}", pending.command_id, person.id),
            ));
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota(remaining: u32, reset_at: i64) -> QuotaStatus {
        QuotaStatus {
            limit: 10,
            remaining,
            reset_at,
        }
    }

    #[test]
    fn test_quota_checks() {
        assert!(check_quota(0, &quota(5, 100), &quota(4, 100)).is_empty());
        assert!(check_quota(0, &quota(0, 100), &quota(10, 200)).is_empty());

        let grew = check_quota(3, &quota(4, 100), &quota(5, 100));
        assert_eq!(grew.len(), 1);
        assert_eq!(grew[0].invariant, "quota-monotonic");
        assert_eq!(grew[0].step, 3);

        assert_eq!(check_quota(0, &quota(10, 100), &quota(11, 200)).len(), 1);
    }
}
