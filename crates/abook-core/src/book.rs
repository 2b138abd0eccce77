use std::collections::{BTreeSet, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::lifecycle::PendingChange;
use crate::model::{Person, PersonData, PersonId};

/// One row of the local book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookEntry {
    /// Last state confirmed by the remote. `None` for a pending add.
    pub backing: Option<Person>,
    /// What the user currently sees. `None` while a delete is pending.
    pub visible: Option<Person>,
    pub pending: Option<PendingChange>,
}

/// Durable form of the book handed to a persistence collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub persons: Vec<Person>,
    pub tags: Vec<String>,
}

#[derive(Default)]
struct BookInner {
    entries: IndexMap<PersonId, BookEntry>,
    tags: BTreeSet<String>,
    /// Ids the remote confirmed as deleted. Remote ids are never reused.
    deleted: HashSet<PersonId>,
}

/// The local address book with an optimistic view layered over the
/// remote-confirmed (backing) state.
///
/// All mutations are short and synchronous; callers never hold the lock
/// across an await point.
pub struct LocalBook {
    inner: RwLock<BookInner>,
}

impl LocalBook {
    pub fn new() -> Self {
        LocalBook {
            inner: RwLock::new(BookInner::default()),
        }
    }

    /// Build a book whose backing and visible state both equal the snapshot.
    pub fn from_snapshot(snapshot: BookSnapshot) -> Self {
        let mut inner = BookInner::default();
        for person in snapshot.persons {
            inner.entries.insert(
                person.id.clone(),
                BookEntry {
                    backing: Some(person.clone()),
                    visible: Some(person),
                    pending: None,
                },
            );
        }
        inner.tags = snapshot.tags.into_iter().collect();
        LocalBook {
            inner: RwLock::new(inner),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BookInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BookInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the remote-confirmed state only.
    pub fn snapshot(&self) -> BookSnapshot {
        let inner = self.read();
        BookSnapshot {
            persons: inner
                .entries
                .values()
                .filter_map(|e| e.backing.clone())
                .collect(),
            tags: inner.tags.iter().cloned().collect(),
        }
    }

    pub fn entry(&self, id: &PersonId) -> Option<BookEntry> {
        self.read().entries.get(id).cloned()
    }

    pub fn backing(&self, id: &PersonId) -> Option<Person> {
        self.read().entries.get(id).and_then(|e| e.backing.clone())
    }

    pub fn visible(&self, id: &PersonId) -> Option<Person> {
        self.read().entries.get(id).and_then(|e| e.visible.clone())
    }

    pub fn pending(&self, id: &PersonId) -> Option<PendingChange> {
        self.read().entries.get(id).and_then(|e| e.pending)
    }

    pub fn contains(&self, id: &PersonId) -> bool {
        self.read().entries.contains_key(id)
    }

    /// Remote-confirmed persons in book order.
    pub fn backing_persons(&self) -> Vec<Person> {
        self.read()
            .entries
            .values()
            .filter_map(|e| e.backing.clone())
            .collect()
    }

    /// What a list view renders: visible persons with their pending markers.
    pub fn visible_persons(&self) -> Vec<(Person, Option<PendingChange>)> {
        self.read()
            .entries
            .values()
            .filter_map(|e| e.visible.clone().map(|p| (p, e.pending)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Optimistically show a person that the remote has not confirmed yet.
    pub fn insert_provisional(&self, person: Person, pending: PendingChange) {
        debug!(id = %person.id, command = %pending.command_id, "insert provisional person");
        let mut inner = self.write();
        inner.entries.insert(
            person.id.clone(),
            BookEntry {
                backing: None,
                visible: Some(person),
                pending: Some(pending),
            },
        );
    }

    /// Optimistically replace the visible fields of a person.
    ///
    /// Returns false if the id is unknown.
    pub fn set_visible(&self, id: &PersonId, data: PersonData, pending: PendingChange) -> bool {
        let mut inner = self.write();
        let Some(entry) = inner.entries.get_mut(id) else {
            return false;
        };
        let updated_at = entry
            .visible
            .as_ref()
            .or(entry.backing.as_ref())
            .and_then(|p| p.updated_at);
        entry.visible = Some(Person {
            id: id.clone(),
            data,
            updated_at,
        });
        entry.pending = Some(pending);
        true
    }

    /// Optimistically hide a person pending deletion.
    pub fn hide(&self, id: &PersonId, pending: PendingChange) -> bool {
        let mut inner = self.write();
        let Some(entry) = inner.entries.get_mut(id) else {
            return false;
        };
        entry.visible = None;
        entry.pending = Some(pending);
        true
    }

    /// Update the countdown shown next to a pending entry.
    pub fn set_pending_remaining(&self, id: &PersonId, remaining_secs: u64) {
        let mut inner = self.write();
        if let Some(pending) = inner.entries.get_mut(id).and_then(|e| e.pending.as_mut()) {
            trace!(id = %id, remaining_secs, "pending countdown");
            pending.remaining_secs = remaining_secs;
        }
    }

    /// Rebind a provisional entry to the id and state the remote assigned,
    /// keeping its position in the book.
    pub fn confirm_added(&self, provisional: &PersonId, confirmed: Person) -> bool {
        let mut inner = self.write();
        let Some((index, _, _)) = inner.entries.shift_remove_full(provisional) else {
            return false;
        };
        debug!(from = %provisional, to = %confirmed.id, "confirm provisional person");
        inner.entries.shift_insert(
            index,
            confirmed.id.clone(),
            BookEntry {
                backing: Some(confirmed.clone()),
                visible: Some(confirmed),
                pending: None,
            },
        );
        true
    }

    /// Make a remote-confirmed state both the backing and the visible state.
    pub fn commit(&self, person: Person) {
        let mut inner = self.write();
        let entry = BookEntry {
            backing: Some(person.clone()),
            visible: Some(person.clone()),
            pending: None,
        };
        inner.entries.insert(person.id, entry);
    }

    /// Drop the optimistic view and show the backing state again.
    pub fn revert(&self, id: &PersonId) -> bool {
        let mut inner = self.write();
        let Some(entry) = inner.entries.get_mut(id) else {
            return false;
        };
        entry.visible = entry.backing.clone();
        entry.pending = None;
        true
    }

    pub fn remove(&self, id: &PersonId) -> Option<BookEntry> {
        self.write().entries.shift_remove(id)
    }

    /// Remove a person whose deletion the remote confirmed. Later upserts
    /// of the same id are ignored.
    pub fn forget(&self, id: &PersonId) -> Option<BookEntry> {
        let mut inner = self.write();
        inner.deleted.insert(id.clone());
        inner.entries.shift_remove(id)
    }

    /// Fold a remote-side change into the backing state. An entry with a
    /// pending change keeps its optimistic view.
    ///
    /// Returns false when the change was dropped: the id was deleted, or the
    /// book already holds a newer version.
    pub fn upsert_backing(&self, person: Person) -> bool {
        let mut inner = self.write();
        if inner.deleted.contains(&person.id) {
            trace!(id = %person.id, "ignoring upsert of deleted person");
            return false;
        }
        match inner.entries.get_mut(&person.id) {
            Some(entry) => {
                let current = entry.backing.as_ref().and_then(|p| p.updated_at);
                if let (Some(current), Some(incoming)) = (current, person.updated_at) {
                    if incoming < current {
                        trace!(id = %person.id, "ignoring stale upsert");
                        return false;
                    }
                }
                if entry.pending.is_none() {
                    entry.visible = Some(person.clone());
                }
                entry.backing = Some(person);
            }
            None => {
                inner.entries.insert(
                    person.id.clone(),
                    BookEntry {
                        backing: Some(person.clone()),
                        visible: Some(person),
                        pending: None,
                    },
                );
            }
        }
        true
    }

    /// Apply a remote-side deletion. Entries with a pending change are left
    /// alone and reported as skipped.
    pub fn remove_backing(&self, id: &PersonId) -> bool {
        let mut inner = self.write();
        let removable = matches!(inner.entries.get(id), Some(entry) if entry.pending.is_none());
        if removable {
            inner.entries.shift_remove(id);
            inner.deleted.insert(id.clone());
        }
        removable
    }

    pub fn known_tags(&self) -> BTreeSet<String> {
        self.read().tags.clone()
    }

    pub fn add_tags<I: IntoIterator<Item = String>>(&self, tags: I) {
        self.write().tags.extend(tags);
    }

    pub fn replace_tags<I: IntoIterator<Item = String>>(&self, tags: I) {
        self.write().tags = tags.into_iter().collect();
    }
}

impl Default for LocalBook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{CommandId, CommandKind};
    use chrono::Utc;

    fn pending(kind: CommandKind) -> PendingChange {
        PendingChange {
            command_id: CommandId(1),
            kind,
            remaining_secs: 3,
        }
    }

    fn confirmed(id: u64, name: &str) -> Person {
        Person {
            id: PersonId::from_remote(id),
            data: PersonData::named(name),
            updated_at: Some(Utc::now()),
        }
    }

    fn seeded() -> LocalBook {
        LocalBook::from_snapshot(BookSnapshot {
            persons: vec![confirmed(1, "Alex"), confirmed(2, "Bernice")],
            tags: vec!["friends".to_string()],
        })
    }

    #[test]
    fn test_snapshot_round_trip() {
        let book = seeded();
        let snap = book.snapshot();
        assert_eq!(snap.persons.len(), 2);
        assert_eq!(snap.tags, vec!["friends".to_string()]);
        assert_eq!(LocalBook::from_snapshot(snap.clone()).snapshot(), snap);
    }

    #[test]
    fn test_provisional_add_then_confirm_keeps_position() {
        let book = seeded();
        let tmp = PersonId::provisional();
        book.insert_provisional(
            Person::new(tmp.clone(), PersonData::named("Charlotte")),
            pending(CommandKind::Add),
        );
        assert!(book.backing(&tmp).is_none());
        assert_eq!(book.visible(&tmp).unwrap().name(), "Charlotte");
        assert!(book.snapshot().persons.iter().all(|p| p.id != tmp));

        assert!(book.confirm_added(&tmp, confirmed(3, "Charlotte")));
        assert!(!book.contains(&tmp));
        let id = PersonId::from_remote(3);
        assert_eq!(book.backing(&id).unwrap().name(), "Charlotte");
        assert!(book.pending(&id).is_none());
        let names: Vec<_> = book
            .backing_persons()
            .into_iter()
            .map(|p| p.data.name)
            .collect();
        assert_eq!(names, vec!["Alex", "Bernice", "Charlotte"]);
    }

    #[test]
    fn test_edit_then_revert() {
        let book = seeded();
        let id = PersonId::from_remote(1);
        assert!(book.set_visible(&id, PersonData::named("Alexander"), pending(CommandKind::Edit)));
        assert_eq!(book.visible(&id).unwrap().name(), "Alexander");
        assert_eq!(book.backing(&id).unwrap().name(), "Alex");

        assert!(book.revert(&id));
        assert_eq!(book.visible(&id).unwrap().name(), "Alex");
        assert!(book.pending(&id).is_none());
    }

    #[test]
    fn test_hide_excludes_from_visible_list() {
        let book = seeded();
        let id = PersonId::from_remote(2);
        assert!(book.hide(&id, pending(CommandKind::Delete)));
        let visible: Vec<_> = book.visible_persons().into_iter().map(|(p, _)| p.id).collect();
        assert_eq!(visible, vec![PersonId::from_remote(1)]);
        assert_eq!(book.backing_persons().len(), 2);
    }

    #[test]
    fn test_pending_countdown() {
        let book = seeded();
        let id = PersonId::from_remote(1);
        book.hide(&id, pending(CommandKind::Delete));
        book.set_pending_remaining(&id, 1);
        assert_eq!(book.pending(&id).unwrap().remaining_secs, 1);
    }

    #[test]
    fn test_upsert_backing_preserves_pending_view() {
        let book = seeded();
        let id = PersonId::from_remote(1);
        book.set_visible(&id, PersonData::named("Local Edit"), pending(CommandKind::Edit));

        book.upsert_backing(confirmed(1, "Remote Edit"));
        assert_eq!(book.visible(&id).unwrap().name(), "Local Edit");
        assert_eq!(book.backing(&id).unwrap().name(), "Remote Edit");

        book.upsert_backing(confirmed(9, "Newcomer"));
        assert_eq!(book.visible(&PersonId::from_remote(9)).unwrap().name(), "Newcomer");
    }

    #[test]
    fn test_remove_backing_skips_pending() {
        let book = seeded();
        let one = PersonId::from_remote(1);
        let two = PersonId::from_remote(2);
        book.hide(&one, pending(CommandKind::Delete));

        assert!(!book.remove_backing(&one));
        assert!(book.remove_backing(&two));
        assert!(book.contains(&one));
        assert!(!book.contains(&two));
    }

    #[test]
    fn test_forgotten_and_stale_upserts_are_dropped() {
        let book = seeded();
        let one = PersonId::from_remote(1);
        let stale = book.backing(&one).unwrap();

        let mut newer = stale.clone();
        newer.data.name = "Alex Yeoh".to_string();
        newer.updated_at = stale.updated_at.map(|t| t + chrono::Duration::seconds(1));
        assert!(book.upsert_backing(newer));
        assert!(!book.upsert_backing(stale.clone()));
        assert_eq!(book.backing(&one).unwrap().name(), "Alex Yeoh");

        assert!(book.forget(&one).is_some());
        assert!(!book.upsert_backing(stale));
        assert!(!book.contains(&one));
    }

    #[test]
    fn test_unknown_ids_are_reported() {
        let book = LocalBook::new();
        let ghost = PersonId::from_remote(404);
        assert!(!book.set_visible(&ghost, PersonData::named("x"), pending(CommandKind::Edit)));
        assert!(!book.hide(&ghost, pending(CommandKind::Delete)));
        assert!(!book.revert(&ghost));
        assert!(!book.confirm_added(&ghost, confirmed(1, "x")));
        assert!(book.remove(&ghost).is_none());
        assert!(book.is_empty());
    }
}
