//! # Document store
//!
//! In-memory record storage, one [`Collection`] per record type.
//!
//! The surface mirrors the usual document-database primitives: find by id,
//! find/count by predicate, insert, update by id, remove by id, delete by
//! predicate. There is no multi-document transaction; the reconciliation
//! workflows compensate for partial failures themselves (see the readings
//! and deliveries modules).
//!
//! Reads cannot fail. Writes return [`StoreError`] so callers exercise the
//! same failure paths a real storage backend would produce; tests can
//! trigger those paths through the fault counters.

use std::collections::HashMap;

use model::{
    Employee, Fuel, FuelDelivery, FuelDeliveryVolume, FuelTank, FuelTankReading,
    FuelTankReadingVolume, Id, Position, Role, User,
};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

/// A record that can live in a [`Collection`].
pub trait Document: Clone + Send + Sync + 'static {
    fn id(&self) -> Id;
}

pub struct Collection<T> {
    docs: RwLock<HashMap<Id, T>>,
    #[cfg(test)]
    faults: Faults,
}

impl<T: Document> Collection<T> {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            #[cfg(test)]
            faults: Faults::new(),
        }
    }

    pub async fn find_by_id(&self, id: Id) -> Option<T> {
        self.docs.read().await.get(&id).cloned()
    }

    pub async fn find<F>(&self, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        self.docs
            .read()
            .await
            .values()
            .filter(|doc| predicate(doc))
            .cloned()
            .collect()
    }

    pub async fn find_one<F>(&self, predicate: F) -> Option<T>
    where
        F: Fn(&T) -> bool,
    {
        self.docs
            .read()
            .await
            .values()
            .find(|doc| predicate(doc))
            .cloned()
    }

    pub async fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&T) -> bool,
    {
        self.docs
            .read()
            .await
            .values()
            .filter(|doc| predicate(doc))
            .count()
    }

    pub async fn insert(&self, doc: T) -> Result<T, StoreError> {
        #[cfg(test)]
        self.faults.inserts.trip()?;

        let mut docs = self.docs.write().await;
        if docs.contains_key(&doc.id()) {
            return Err(StoreError(format!("duplicate document id {}", doc.id())));
        }
        docs.insert(doc.id(), doc.clone());
        Ok(doc)
    }

    /// Applies `apply` to the stored record and returns the updated copy,
    /// or `None` when no record has this id.
    pub async fn update<F>(&self, id: Id, apply: F) -> Result<Option<T>, StoreError>
    where
        F: FnOnce(&mut T),
    {
        #[cfg(test)]
        self.faults.updates.trip()?;

        let mut docs = self.docs.write().await;
        match docs.get_mut(&id) {
            Some(doc) => {
                apply(doc);
                Ok(Some(doc.clone()))
            }
            None => Ok(None),
        }
    }

    pub async fn remove(&self, id: Id) -> Result<Option<T>, StoreError> {
        #[cfg(test)]
        self.faults.removes.trip()?;

        Ok(self.docs.write().await.remove(&id))
    }

    pub async fn delete_many<F>(&self, predicate: F) -> Result<usize, StoreError>
    where
        F: Fn(&T) -> bool,
    {
        #[cfg(test)]
        self.faults.removes.trip()?;

        let mut docs = self.docs.write().await;
        let doomed: Vec<Id> = docs
            .values()
            .filter(|doc| predicate(doc))
            .map(|doc| doc.id())
            .collect();
        for id in &doomed {
            docs.remove(id);
        }
        Ok(doomed.len())
    }

    /// Arms the fault counter so that after `successes` more inserts the
    /// next one fails. Used to exercise compensation paths.
    #[cfg(test)]
    pub(crate) fn fail_insert_after(&self, successes: i64) {
        self.faults.inserts.arm(successes);
    }

    #[cfg(test)]
    pub(crate) fn fail_update_after(&self, successes: i64) {
        self.faults.updates.arm(successes);
    }

    #[cfg(test)]
    pub(crate) fn fail_remove_after(&self, successes: i64) {
        self.faults.removes.arm(successes);
    }
}

impl<T: Document> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
struct Faults {
    inserts: FaultCounter,
    updates: FaultCounter,
    removes: FaultCounter,
}

#[cfg(test)]
impl Faults {
    fn new() -> Self {
        Self {
            inserts: FaultCounter::new(),
            updates: FaultCounter::new(),
            removes: FaultCounter::new(),
        }
    }
}

/// Counts down on every write and fails exactly once when it hits zero.
/// Disarmed (negative) by default.
#[cfg(test)]
struct FaultCounter(std::sync::atomic::AtomicI64);

#[cfg(test)]
impl FaultCounter {
    fn new() -> Self {
        Self(std::sync::atomic::AtomicI64::new(-1))
    }

    fn arm(&self, successes: i64) {
        self.0.store(successes, std::sync::atomic::Ordering::SeqCst);
    }

    fn trip(&self) -> Result<(), StoreError> {
        use std::sync::atomic::Ordering;
        let previous = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |value| {
                if value >= 0 {
                    Some(value - 1)
                } else {
                    None
                }
            });
        if previous == Ok(0) {
            return Err(StoreError("injected storage fault".to_string()));
        }
        Ok(())
    }
}

impl Document for Role {
    fn id(&self) -> Id {
        self.id
    }
}

impl Document for User {
    fn id(&self) -> Id {
        self.id
    }
}

impl Document for Position {
    fn id(&self) -> Id {
        self.id
    }
}

impl Document for Employee {
    fn id(&self) -> Id {
        self.id
    }
}

impl Document for Fuel {
    fn id(&self) -> Id {
        self.id
    }
}

impl Document for FuelTank {
    fn id(&self) -> Id {
        self.id
    }
}

impl Document for FuelTankReading {
    fn id(&self) -> Id {
        self.id
    }
}

impl Document for FuelTankReadingVolume {
    fn id(&self) -> Id {
        self.id
    }
}

impl Document for FuelDelivery {
    fn id(&self) -> Id {
        self.id
    }
}

impl Document for FuelDeliveryVolume {
    fn id(&self) -> Id {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(name: &str) -> Position {
        Position {
            id: Id::new(),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn insert_and_find_round_trip() {
        let positions = Collection::new();
        let cashier = positions.insert(position("Cashier")).await.unwrap();

        assert_eq!(
            positions.find_by_id(cashier.id).await.unwrap().name,
            "Cashier"
        );
        assert!(positions.find_one(|p| p.name == "Manager").await.is_none());
        assert_eq!(positions.count(|_| true).await, 1);
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_id() {
        let positions = Collection::new();
        let cashier = positions.insert(position("Cashier")).await.unwrap();

        let err = positions.insert(cashier).await.unwrap_err();
        assert!(err.0.contains("duplicate document id"));
    }

    #[tokio::test]
    async fn update_returns_updated_copy() {
        let positions = Collection::new();
        let cashier = positions.insert(position("Cashier")).await.unwrap();

        let updated = positions
            .update(cashier.id, |p| p.name = "Manager".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Manager");
        assert_eq!(positions.find_by_id(cashier.id).await.unwrap().name, "Manager");

        let missing = positions.update(Id::new(), |_| {}).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn delete_many_removes_matching_records() {
        let positions = Collection::new();
        positions.insert(position("Cashier")).await.unwrap();
        positions.insert(position("Cashier")).await.unwrap();
        positions.insert(position("Manager")).await.unwrap();

        let removed = positions.delete_many(|p| p.name == "Cashier").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(positions.count(|_| true).await, 1);
    }

    #[tokio::test]
    async fn fault_counter_fails_exactly_once() {
        let positions = Collection::new();
        positions.fail_insert_after(1);

        positions.insert(position("Cashier")).await.unwrap();
        positions.insert(position("Manager")).await.unwrap_err();
        positions.insert(position("Attendant")).await.unwrap();
    }
}
