use containers::{Checkpoint, Hash, HeaderRecord, TrustState};
use std::collections::BTreeMap;

/// Every header observed for one chain, indexed by nonce.
///
/// Several competing records may share a nonce, but never the same hash.
#[derive(Debug, Default, Clone)]
pub struct HeaderStore {
    records: BTreeMap<u64, Vec<HeaderRecord>>,
}

impl HeaderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, or upgrade the trust state of the stored one with
    /// the same hash. Returns true when the store changed.
    pub fn append(&mut self, record: HeaderRecord) -> bool {
        let records = self.records.entry(record.nonce).or_default();

        if let Some(stored) = records.iter_mut().find(|stored| stored.hash == record.hash) {
            let upgraded = stored.state.upgrade(record.state);
            let changed = upgraded != stored.state;
            stored.state = upgraded;
            return changed;
        }

        records.push(record);
        true
    }

    pub fn at(&self, nonce: u64) -> &[HeaderRecord] {
        self.records.get(&nonce).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn processed_at(&self, nonce: u64) -> Option<&HeaderRecord> {
        self.at(nonce)
            .iter()
            .find(|record| record.state == TrustState::Processed)
    }

    /// Number of records across all nonces.
    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn nonces(&self) -> impl Iterator<Item = u64> + '_ {
        self.records.keys().copied()
    }

    pub(crate) fn records_mut(&mut self) -> &mut BTreeMap<u64, Vec<HeaderRecord>> {
        &mut self.records
    }

    pub fn remove(&mut self, nonce: u64, hash: &Hash) {
        if let Some(records) = self.records.get_mut(&nonce) {
            records.retain(|record| &record.hash != hash);
            if records.is_empty() {
                self.records.remove(&nonce);
            }
        }
    }

    pub fn remove_below(&mut self, nonce: u64) {
        self.records = self.records.split_off(&nonce);
    }

    /// Drop received records that could not have been built on top of the
    /// final checkpoint: more nonces than rounds elapsed since it.
    pub fn remove_invalid_received(&mut self, final_checkpoint: &Checkpoint) {
        self.records.retain(|_, records| {
            records.retain(|record| {
                let round_dif = record.round as i64 - final_checkpoint.round as i64;
                let nonce_dif = record.nonce as i64 - final_checkpoint.nonce as i64;
                !(record.state == TrustState::Received && round_dif < nonce_dif)
            });
            !records.is_empty()
        });
    }

    /// Drop network observations above `nonce`, keeping processed and
    /// notarized records.
    pub fn remove_unconfirmed_above(&mut self, nonce: u64) {
        for records in self.records.range_mut(nonce.saturating_add(1)..).map(|(_, records)| records) {
            records.retain(|record| {
                !matches!(record.state, TrustState::Received | TrustState::Proposed)
            });
        }
        self.records.retain(|_, records| !records.is_empty());
    }

    /// Highest nonce backed by any record, never below `floor`.
    ///
    /// A proposed header only proves its parent exists, so it counts as
    /// `nonce - 1`.
    pub fn probable_highest_nonce(&self, floor: u64) -> u64 {
        self.records
            .values()
            .flatten()
            .map(|record| match record.state {
                TrustState::Proposed => record.nonce.saturating_sub(1),
                _ => record.nonce,
            })
            .fold(floor, u64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(nonce: u64, round: u64, hash: &str, state: TrustState) -> HeaderRecord {
        HeaderRecord::new(nonce, round, Hash::from(hash), state)
    }

    #[test]
    fn test_append_deduplicates_by_hash() {
        let mut store = HeaderStore::new();
        assert!(store.append(record(1, 1, "h1", TrustState::Received)));
        assert!(!store.append(record(1, 1, "h1", TrustState::Received)));
        assert!(store.append(record(1, 2, "h2", TrustState::Received)));

        assert_eq!(store.at(1).len(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_append_upgrades_monotonically() {
        let mut store = HeaderStore::new();
        store.append(record(1, 1, "h1", TrustState::Received));
        assert!(store.append(record(1, 1, "h1", TrustState::Processed)));
        assert!(!store.append(record(1, 1, "h1", TrustState::Received)));

        assert_eq!(store.at(1), &[record(1, 1, "h1", TrustState::Processed)]);
        assert!(store.processed_at(1).is_some());
    }

    #[test]
    fn test_remove_below_and_by_hash() {
        let mut store = HeaderStore::new();
        store.append(record(1, 1, "h1", TrustState::Received));
        store.append(record(2, 2, "h2", TrustState::Received));
        store.append(record(3, 3, "h3", TrustState::Received));

        store.remove_below(2);
        assert_eq!(store.nonces().collect::<Vec<_>>(), vec![2, 3]);

        store.remove(3, &Hash::from("h3"));
        assert_eq!(store.nonces().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_remove_invalid_received() {
        let mut store = HeaderStore::new();
        let final_checkpoint = Checkpoint::new(5, 5, Hash::from("f"));
        store.append(record(8, 7, "too-fast", TrustState::Received));
        store.append(record(8, 7, "processed", TrustState::Processed));
        store.append(record(6, 9, "fine", TrustState::Received));

        store.remove_invalid_received(&final_checkpoint);

        assert_eq!(store.at(8), &[record(8, 7, "processed", TrustState::Processed)]);
        assert_eq!(store.at(6).len(), 1);
    }

    #[test]
    fn test_remove_unconfirmed_above() {
        let mut store = HeaderStore::new();
        store.append(record(2, 2, "r2", TrustState::Received));
        store.append(record(3, 3, "r3", TrustState::Received));
        store.append(record(4, 4, "p4", TrustState::Proposed));
        store.append(record(4, 4, "n4", TrustState::Notarized));

        store.remove_unconfirmed_above(2);

        assert_eq!(store.nonces().collect::<Vec<_>>(), vec![2, 4]);
        assert_eq!(store.at(4), &[record(4, 4, "n4", TrustState::Notarized)]);
    }

    #[test]
    fn test_probable_highest_nonce_discounts_proposed() {
        let mut store = HeaderStore::new();
        assert_eq!(store.probable_highest_nonce(3), 3);

        store.append(record(5, 5, "r5", TrustState::Received));
        store.append(record(7, 7, "p7", TrustState::Proposed));
        assert_eq!(store.probable_highest_nonce(0), 6);
        assert_eq!(store.probable_highest_nonce(9), 9);
    }
}
