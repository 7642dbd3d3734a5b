//! User directory and block list files.
//!
//! `users.json` maps card numbers (decimal strings) to [`UserRecord`]s and
//! `blocked_users.json` maps card numbers to a blocked flag. Both are loaded
//! into memory, written atomically on every change, and read as empty when
//! missing or corrupt. Keys that are not valid card numbers are kept in the
//! file but never match a read. Numeric keys are normalized on load, so
//! `"00123"` and `"123"` name the same card; when both are present the
//! canonical spelling wins.

use crate::error::{StorageError, StorageResult};
use gatehouse_core::persist::{read_json_or_default, write_json_atomic};
use gatehouse_core::{CardCode, UserRecord};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::info;

fn parse_key(key: &str) -> Option<CardCode> {
    key.parse().ok()
}

/// Rewrite numeric keys in their canonical form.
fn normalize_keys<V>(entries: BTreeMap<String, V>) -> BTreeMap<String, V> {
    let mut normalized = BTreeMap::new();
    for (key, value) in entries {
        match parse_key(&key).map(|card| card.to_string()) {
            Some(canonical) if canonical != key => {
                normalized.entry(canonical).or_insert(value);
            }
            _ => {
                normalized.insert(key, value);
            }
        }
    }
    normalized
}

/// Card holders known to the controller.
#[derive(Debug)]
pub struct UserDirectory {
    path: PathBuf,
    users: RwLock<BTreeMap<String, UserRecord>>,
}

impl UserDirectory {
    /// Load the directory from `path`.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let users = normalize_keys::<UserRecord>(read_json_or_default(&path));
        info!(path = %path.display(), users = users.len(), "user directory loaded");
        Self {
            path,
            users: RwLock::new(users),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file, replacing the in-memory copy.
    pub fn reload(&self) -> usize {
        let users = normalize_keys::<UserRecord>(read_json_or_default(&self.path));
        let count = users.len();
        *self.users.write() = users;
        count
    }

    fn save_with<F>(&self, change: F) -> StorageResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, UserRecord>) -> StorageResult<()>,
    {
        let mut users = self.users.write();
        let mut next = users.clone();
        change(&mut next)?;
        write_json_atomic(&self.path, &next)?;
        *users = next;
        Ok(())
    }

    /// Add or replace the record for `card`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Validation` if the record has no id or name.
    pub fn add(&self, card: CardCode, record: UserRecord) -> StorageResult<()> {
        if record.id.trim().is_empty() || record.name.trim().is_empty() {
            return Err(StorageError::Validation(
                "user id and name are required".into(),
            ));
        }

        let key = card.to_string();
        let record = UserRecord {
            card_number: Some(key.clone()),
            ..record
        };
        self.save_with(|users| {
            users.insert(key, record);
            Ok(())
        })?;
        info!(card = %card, "user added");
        Ok(())
    }

    /// Remove the record for `card`.
    pub fn remove(&self, card: CardCode) -> StorageResult<UserRecord> {
        let key = card.to_string();
        let mut removed = None;
        self.save_with(|users| {
            removed = users.remove(&key);
            if removed.is_none() {
                return Err(StorageError::card_not_found("user", key.clone()));
            }
            Ok(())
        })?;
        info!(card = %card, "user removed");
        removed.ok_or_else(|| StorageError::card_not_found("user", key))
    }

    /// Turn privacy protection on or off for `card`.
    pub fn set_privacy(&self, card: CardCode, enabled: bool) -> StorageResult<()> {
        let key = card.to_string();
        self.save_with(|users| match users.get_mut(&key) {
            Some(record) => {
                record.privacy_protected = enabled;
                Ok(())
            }
            None => Err(StorageError::card_not_found("user", key.clone())),
        })?;
        info!(card = %card, enabled, "privacy protection changed");
        Ok(())
    }

    pub fn get(&self, card: CardCode) -> Option<UserRecord> {
        self.users.read().get(&card.to_string()).cloned()
    }

    /// Raw file contents, keyed by card string.
    pub fn all(&self) -> BTreeMap<String, UserRecord> {
        self.users.read().clone()
    }

    /// Records keyed by parsed card code.
    pub fn records(&self) -> HashMap<CardCode, UserRecord> {
        self.users
            .read()
            .iter()
            .filter_map(|(key, record)| parse_key(key).map(|code| (code, record.clone())))
            .collect()
    }

    /// Card codes with a directory entry.
    pub fn allowed_codes(&self) -> HashSet<CardCode> {
        self.users.read().keys().filter_map(|k| parse_key(k)).collect()
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

/// Cards refused regardless of directory membership.
#[derive(Debug)]
pub struct BlockList {
    path: PathBuf,
    blocked: RwLock<BTreeMap<String, bool>>,
}

impl BlockList {
    /// Load the block list from `path`.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let blocked = normalize_keys::<bool>(read_json_or_default(&path));
        info!(path = %path.display(), entries = blocked.len(), "block list loaded");
        Self {
            path,
            blocked: RwLock::new(blocked),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file, replacing the in-memory copy.
    pub fn reload(&self) -> usize {
        let blocked = normalize_keys::<bool>(read_json_or_default(&self.path));
        let count = blocked.len();
        *self.blocked.write() = blocked;
        count
    }

    fn save_with<F>(&self, change: F) -> StorageResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, bool>),
    {
        let mut blocked = self.blocked.write();
        let mut next = blocked.clone();
        change(&mut next);
        write_json_atomic(&self.path, &next)?;
        *blocked = next;
        Ok(())
    }

    pub fn block(&self, card: CardCode) -> StorageResult<()> {
        self.save_with(|blocked| {
            blocked.insert(card.to_string(), true);
        })?;
        info!(card = %card, "card blocked");
        Ok(())
    }

    /// Remove `card` from the list. Unblocking an unlisted card is a no-op.
    pub fn unblock(&self, card: CardCode) -> StorageResult<()> {
        self.save_with(|blocked| {
            blocked.remove(&card.to_string());
        })?;
        info!(card = %card, "card unblocked");
        Ok(())
    }

    pub fn is_blocked(&self, card: CardCode) -> bool {
        self.blocked
            .read()
            .get(&card.to_string())
            .copied()
            .unwrap_or(false)
    }

    /// Card codes flagged as blocked.
    pub fn blocked_codes(&self) -> HashSet<CardCode> {
        self.blocked
            .read()
            .iter()
            .filter(|(_, blocked)| **blocked)
            .filter_map(|(key, _)| parse_key(key))
            .collect()
    }

    /// Raw file contents, keyed by card string.
    pub fn all(&self) -> BTreeMap<String, bool> {
        self.blocked.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn alice() -> UserRecord {
        UserRecord::new("u-1", "Alice").with_ref_id("R1")
    }

    #[test]
    fn test_add_persists_and_sets_card_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let users = UserDirectory::load(&path);

        users.add(CardCode::new(100), alice()).unwrap();

        let reloaded = UserDirectory::load(&path);
        let record = reloaded.get(CardCode::new(100)).unwrap();
        assert_eq!(record.name, "Alice");
        assert_eq!(record.card_number.as_deref(), Some("100"));
        assert!(reloaded.allowed_codes().contains(&CardCode::new(100)));
    }

    #[rstest]
    #[case("", "Alice")]
    #[case("u-1", "  ")]
    fn test_add_requires_id_and_name(#[case] id: &str, #[case] name: &str) {
        let dir = tempfile::tempdir().unwrap();
        let users = UserDirectory::load(dir.path().join("users.json"));
        let result = users.add(CardCode::new(1), UserRecord::new(id, name));
        assert!(matches!(result, Err(StorageError::Validation(_))));
        assert!(users.is_empty());
    }

    #[test]
    fn test_remove_missing_user() {
        let dir = tempfile::tempdir().unwrap();
        let users = UserDirectory::load(dir.path().join("users.json"));
        assert!(matches!(
            users.remove(CardCode::new(5)),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_remove_user() {
        let dir = tempfile::tempdir().unwrap();
        let users = UserDirectory::load(dir.path().join("users.json"));
        users.add(CardCode::new(100), alice()).unwrap();

        let removed = users.remove(CardCode::new(100)).unwrap();
        assert_eq!(removed.name, "Alice");
        assert!(users.allowed_codes().is_empty());
    }

    #[test]
    fn test_set_privacy() {
        let dir = tempfile::tempdir().unwrap();
        let users = UserDirectory::load(dir.path().join("users.json"));
        users.add(CardCode::new(100), alice()).unwrap();

        users.set_privacy(CardCode::new(100), true).unwrap();
        assert!(users.get(CardCode::new(100)).unwrap().privacy_protected);
        assert!(users.set_privacy(CardCode::new(999), true).is_err());
    }

    #[test]
    fn test_non_numeric_keys_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(
            &path,
            r#"{"123": {"id": "1", "name": "Bob"}, "abc": {"id": "2", "name": "Eve"}}"#,
        )
        .unwrap();

        let users = UserDirectory::load(&path);
        assert_eq!(users.len(), 2);
        assert_eq!(users.allowed_codes().len(), 1);
        assert_eq!(users.records()[&CardCode::new(123)].name, "Bob");
    }

    #[test]
    fn test_padded_keys_match_card_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, r#"{"00123": {"id": "1", "name": "Bob"}}"#).unwrap();

        let users = UserDirectory::load(&path);
        assert_eq!(users.get(CardCode::new(123)).unwrap().name, "Bob");
        users.set_privacy(CardCode::new(123), true).unwrap();
        assert!(users.records()[&CardCode::new(123)].privacy_protected);

        users.remove(CardCode::new(123)).unwrap();
        assert!(users.is_empty());
    }

    #[test]
    fn test_canonical_key_wins_over_padded_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(
            &path,
            r#"{"007": {"id": "1", "name": "Padded"}, "7": {"id": "2", "name": "Plain"}}"#,
        )
        .unwrap();

        let users = UserDirectory::load(&path);
        assert_eq!(users.len(), 1);
        assert_eq!(users.get(CardCode::new(7)).unwrap().name, "Plain");
    }

    #[test]
    fn test_corrupt_users_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(UserDirectory::load(&path).is_empty());
    }

    #[test]
    fn test_block_and_unblock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocked_users.json");
        let blocked = BlockList::load(&path);

        blocked.block(CardCode::new(7)).unwrap();
        assert!(blocked.is_blocked(CardCode::new(7)));
        assert!(BlockList::load(&path).blocked_codes().contains(&CardCode::new(7)));

        blocked.unblock(CardCode::new(7)).unwrap();
        blocked.unblock(CardCode::new(8)).unwrap();
        assert!(blocked.blocked_codes().is_empty());
    }

    #[test]
    fn test_padded_block_key_can_be_unblocked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocked_users.json");
        std::fs::write(&path, r#"{"0042": true}"#).unwrap();

        let blocked = BlockList::load(&path);
        assert!(blocked.is_blocked(CardCode::new(42)));

        blocked.unblock(CardCode::new(42)).unwrap();
        assert!(blocked.blocked_codes().is_empty());
        assert!(BlockList::load(&path).all().is_empty());
    }

    #[test]
    fn test_false_entries_not_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocked_users.json");
        std::fs::write(&path, r#"{"7": false, "8": true}"#).unwrap();

        let blocked = BlockList::load(&path);
        assert!(!blocked.is_blocked(CardCode::new(7)));
        assert_eq!(blocked.blocked_codes(), HashSet::from([CardCode::new(8)]));
    }
}
