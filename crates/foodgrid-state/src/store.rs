//! StateStore — redb-backed state persistence for FoodGrid.
//!
//! Provides typed CRUD operations over donations, agencies and requirements.
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::gateway::PersistenceGateway;
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(DONATIONS).map_err(map_err!(Table))?;
        txn.open_table(AGENCIES).map_err(map_err!(Table))?;
        txn.open_table(REQUIREMENTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Donations ──────────────────────────────────────────────────

    /// Insert or update a donation.
    pub fn put_donation(&self, donation: &Donation) -> StateResult<()> {
        self.put_json(DONATIONS, &donation.id, donation)?;
        debug!(donation_id = %donation.id, status = %donation.status, "donation stored");
        Ok(())
    }

    /// Insert a donation unless one with the same ID exists. Returns false
    /// and leaves the stored record untouched if it does.
    pub fn insert_donation(&self, donation: &Donation) -> StateResult<bool> {
        let value = serde_json::to_vec(donation).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let exists;
        {
            let mut table = txn.open_table(DONATIONS).map_err(map_err!(Table))?;
            exists = table
                .get(donation.id.as_str())
                .map_err(map_err!(Read))?
                .is_some();
            if !exists {
                table
                    .insert(donation.id.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        if exists {
            txn.abort().map_err(map_err!(Transaction))?;
            return Ok(false);
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(donation_id = %donation.id, "donation inserted");
        Ok(true)
    }

    /// Get a donation by ID.
    pub fn get_donation(&self, id: &str) -> StateResult<Option<Donation>> {
        self.get_json(DONATIONS, id)
    }

    /// List all donations.
    pub fn list_donations(&self) -> StateResult<Vec<Donation>> {
        self.list_json(DONATIONS, |_| true)
    }

    /// List donations whose status is `Ready` or `Allocated`.
    pub fn list_pending_donations(&self) -> StateResult<Vec<Donation>> {
        let all: Vec<Donation> = self.list_json(DONATIONS, |_| true)?;
        Ok(all.into_iter().filter(|d| d.status.is_pending()).collect())
    }

    /// Delete a donation by ID. Returns true if it existed.
    pub fn delete_donation(&self, id: &str) -> StateResult<bool> {
        self.remove_key(DONATIONS, id)
    }

    // ── Agencies ───────────────────────────────────────────────────

    /// Insert or update an agency.
    pub fn put_agency(&self, agency: &Agency) -> StateResult<()> {
        self.put_json(AGENCIES, &agency.id, agency)?;
        debug!(agency_id = %agency.id, priority = agency.priority_flag, "agency stored");
        Ok(())
    }

    /// Get an agency by ID.
    pub fn get_agency(&self, id: &str) -> StateResult<Option<Agency>> {
        self.get_json(AGENCIES, id)
    }

    /// List all agencies.
    pub fn list_agencies(&self) -> StateResult<Vec<Agency>> {
        self.list_json(AGENCIES, |_| true)
    }

    /// Delete an agency by ID. Returns true if it existed.
    pub fn delete_agency(&self, id: &str) -> StateResult<bool> {
        self.remove_key(AGENCIES, id)
    }

    // ── Requirements ───────────────────────────────────────────────

    /// Insert a requirement, or overwrite the quantity of the existing row for
    /// the same (agency, food type) pair. The existing row keeps its ID.
    ///
    /// Returns the row as stored.
    pub fn upsert_requirement(&self, requirement: &Requirement) -> StateResult<Requirement> {
        let key = requirement.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored;
        {
            let mut table = txn.open_table(REQUIREMENTS).map_err(map_err!(Table))?;
            let existing: Option<Requirement> = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            stored = match existing {
                Some(mut row) => {
                    row.quantity = requirement.quantity;
                    row
                }
                None => requirement.clone(),
            };
            let value = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, quantity = stored.quantity, "requirement upserted");
        Ok(stored)
    }

    /// Get the requirement for an (agency, food type) pair.
    pub fn get_requirement(
        &self,
        agency_id: &str,
        food_type: FoodType,
    ) -> StateResult<Option<Requirement>> {
        self.get_json(REQUIREMENTS, &requirement_key(agency_id, food_type))
    }

    /// List all requirements.
    pub fn list_requirements(&self) -> StateResult<Vec<Requirement>> {
        self.list_json(REQUIREMENTS, |_| true)
    }

    /// List the requirements declared by one agency.
    pub fn list_requirements_for_agency(&self, agency_id: &str) -> StateResult<Vec<Requirement>> {
        // Agency IDs may themselves contain ':', so the key prefix only
        // narrows the scan.
        let prefix = format!("{agency_id}:");
        let rows: Vec<Requirement> = self.list_json(REQUIREMENTS, |key| key.starts_with(&prefix))?;
        Ok(rows
            .into_iter()
            .filter(|row| row.agency_id == agency_id)
            .collect())
    }

    /// Delete the requirement for an (agency, food type) pair. Returns true if it existed.
    pub fn delete_requirement(&self, agency_id: &str, food_type: FoodType) -> StateResult<bool> {
        self.remove_key(REQUIREMENTS, &requirement_key(agency_id, food_type))
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn put_json<T: Serialize>(&self, def: Table, key: &str, value: &T) -> StateResult<()> {
        let value = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, def: Table, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn list_json<T, F>(&self, def: Table, mut keep: F) -> StateResult<Vec<T>>
    where
        T: DeserializeOwned,
        F: FnMut(&str) -> bool,
    {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if keep(key.value()) {
                let item: T =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(item);
            }
        }
        Ok(results)
    }

    fn remove_key(&self, def: Table, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "record deleted");
        Ok(existed)
    }
}

impl PersistenceGateway for StateStore {
    fn load_pending_donations(&self) -> StateResult<Vec<Donation>> {
        self.list_pending_donations()
    }

    fn load_agencies(&self) -> StateResult<Vec<Agency>> {
        self.list_agencies()
    }

    fn load_requirements(&self) -> StateResult<Vec<Requirement>> {
        self.list_requirements()
    }

    fn load_donation(&self, id: &str) -> StateResult<Option<Donation>> {
        self.get_donation(id)
    }

    fn save_donation(&self, donation: &Donation) -> StateResult<()> {
        self.put_donation(donation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_donation(id: &str, status: DonationStatus) -> Donation {
        Donation {
            id: id.to_string(),
            donor_id: "donor-1".to_string(),
            food_type: FoodType::Halal,
            quantity: 5,
            location: GeoPoint::new(1.3, 104.0),
            status,
            agency_id: None,
            created_at: 1000,
            expires_at: None,
        }
    }

    fn test_agency(id: &str, priority: bool) -> Agency {
        Agency {
            id: id.to_string(),
            name: format!("agency {id}"),
            priority_flag: priority,
            location: GeoPoint::new(1.35, 103.8),
        }
    }

    fn test_requirement(id: &str, agency_id: &str, food_type: FoodType, quantity: u32) -> Requirement {
        Requirement {
            id: id.to_string(),
            agency_id: agency_id.to_string(),
            food_type,
            quantity,
        }
    }

    // ── Donation CRUD ──────────────────────────────────────────────

    #[test]
    fn donation_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let donation = test_donation("don-1", DonationStatus::Ready);

        store.put_donation(&donation).unwrap();
        let retrieved = store.get_donation("don-1").unwrap();

        assert_eq!(retrieved, Some(donation));
    }

    #[test]
    fn donation_get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_donation("nope").unwrap().is_none());
    }

    #[test]
    fn donation_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        let mut donation = test_donation("don-1", DonationStatus::Ready);
        store.put_donation(&donation).unwrap();

        donation.status = DonationStatus::Allocated;
        donation.agency_id = Some("agency-1".to_string());
        store.put_donation(&donation).unwrap();

        let retrieved = store.get_donation("don-1").unwrap().unwrap();
        assert_eq!(retrieved.status, DonationStatus::Allocated);
        assert_eq!(retrieved.agency_id.as_deref(), Some("agency-1"));
        assert_eq!(store.list_donations().unwrap().len(), 1);
    }

    #[test]
    fn pending_donations_exclude_terminal_statuses() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_donation(&test_donation("a", DonationStatus::Ready)).unwrap();
        store.put_donation(&test_donation("b", DonationStatus::Allocated)).unwrap();
        store.put_donation(&test_donation("c", DonationStatus::Accepted)).unwrap();
        store.put_donation(&test_donation("d", DonationStatus::Collected)).unwrap();

        let mut ids: Vec<String> = store
            .load_pending_donations()
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn donation_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_donation(&test_donation("don-1", DonationStatus::Ready)).unwrap();

        assert!(store.delete_donation("don-1").unwrap());
        assert!(!store.delete_donation("don-1").unwrap());
        assert!(store.get_donation("don-1").unwrap().is_none());
    }

    // ── Agency CRUD ────────────────────────────────────────────────

    #[test]
    fn agency_put_get_list_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_agency(&test_agency("a1", true)).unwrap();
        store.put_agency(&test_agency("a2", false)).unwrap();

        assert_eq!(store.get_agency("a1").unwrap(), Some(test_agency("a1", true)));
        assert_eq!(store.load_agencies().unwrap().len(), 2);

        assert!(store.delete_agency("a1").unwrap());
        assert_eq!(store.list_agencies().unwrap().len(), 1);
    }

    // ── Requirements ───────────────────────────────────────────────

    #[test]
    fn requirement_upsert_overwrites_same_pair() {
        let store = StateStore::open_in_memory().unwrap();
        let first = store
            .upsert_requirement(&test_requirement("req-1", "a1", FoodType::Halal, 5))
            .unwrap();
        assert_eq!(first.id, "req-1");

        let second = store
            .upsert_requirement(&test_requirement("req-2", "a1", FoodType::Halal, 9))
            .unwrap();

        // Same row: first ID kept, quantity replaced.
        assert_eq!(second.id, "req-1");
        assert_eq!(second.quantity, 9);
        assert_eq!(store.list_requirements().unwrap().len(), 1);
    }

    #[test]
    fn requirements_are_distinct_per_food_type() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .upsert_requirement(&test_requirement("r1", "a1", FoodType::Halal, 5))
            .unwrap();
        store
            .upsert_requirement(&test_requirement("r2", "a1", FoodType::Vegan, 2))
            .unwrap();
        store
            .upsert_requirement(&test_requirement("r3", "a2", FoodType::Halal, 1))
            .unwrap();

        assert_eq!(store.load_requirements().unwrap().len(), 3);
        assert_eq!(store.list_requirements_for_agency("a1").unwrap().len(), 2);
        assert_eq!(
            store.get_requirement("a2", FoodType::Halal).unwrap().map(|r| r.quantity),
            Some(1)
        );
    }

    #[test]
    fn agency_listing_ignores_ids_sharing_a_prefix() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .upsert_requirement(&test_requirement("r1", "a", FoodType::Halal, 5))
            .unwrap();
        store
            .upsert_requirement(&test_requirement("r2", "a:b", FoodType::Halal, 3))
            .unwrap();

        let rows = store.list_requirements_for_agency("a").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].agency_id, "a");
        assert_eq!(store.list_requirements_for_agency("a:b").unwrap().len(), 1);
    }

    #[test]
    fn insert_donation_keeps_existing_record() {
        let store = StateStore::open_in_memory().unwrap();
        let mut first = test_donation("d1", DonationStatus::Ready);
        assert!(store.insert_donation(&first).unwrap());

        first.status = DonationStatus::Allocated;
        store.put_donation(&first).unwrap();

        let second = test_donation("d1", DonationStatus::Ready);
        assert!(!store.insert_donation(&second).unwrap());
        assert_eq!(
            store.get_donation("d1").unwrap().unwrap().status,
            DonationStatus::Allocated
        );
    }

    #[test]
    fn requirement_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .upsert_requirement(&test_requirement("r1", "a1", FoodType::Halal, 5))
            .unwrap();

        assert!(store.delete_requirement("a1", FoodType::Halal).unwrap());
        assert!(!store.delete_requirement("a1", FoodType::Halal).unwrap());
        assert!(store.get_requirement("a1", FoodType::Halal).unwrap().is_none());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            let mut donation = test_donation("don-1", DonationStatus::Allocated);
            donation.agency_id = Some("a1".to_string());
            store.save_donation(&donation).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let donation = store.load_donation("don-1").unwrap().unwrap();
        assert_eq!(donation.status, DonationStatus::Allocated);
        assert_eq!(donation.agency_id.as_deref(), Some("a1"));
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_donations().unwrap().is_empty());
        assert!(store.list_agencies().unwrap().is_empty());
        assert!(store.list_requirements().unwrap().is_empty());
        assert!(store.list_requirements_for_agency("any").unwrap().is_empty());
        assert!(!store.delete_donation("nope").unwrap());
        assert!(!store.delete_agency("nope").unwrap());
        assert!(!store.delete_requirement("nope", FoodType::Vegan).unwrap());
    }
}
