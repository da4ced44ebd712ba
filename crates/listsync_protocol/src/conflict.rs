//! Conflict detection and resolution.
//!
//! Two replicas holding different versions of the same list or item resolve
//! them with last-write-wins on `modified_at`. Exact ties are broken by the
//! identifier, then by a SHA-256 fingerprint of each version's encoding, so
//! every replica picks the same winner whatever order it sees them in.

use listsync_core::{Item, List, Timestamp};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// What kind of entity a conflict is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    /// A list.
    List,
    /// An item.
    Item,
}

/// An entity that carries a last-modified timestamp.
pub trait Versioned {
    /// The entity kind.
    const KIND: EntityKind;

    /// Identifier in its wire (string) form.
    fn id_string(&self) -> String;

    /// Last modification time.
    fn modified_at(&self) -> Timestamp;

    /// SHA-256 of the entity's encoding.
    fn fingerprint(&self) -> [u8; 32];
}

fn fingerprint_of<T: Serialize>(value: &T) -> [u8; 32] {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    Sha256::digest(&bytes).into()
}

impl Versioned for List {
    const KIND: EntityKind = EntityKind::List;

    fn id_string(&self) -> String {
        self.id.to_string()
    }

    fn modified_at(&self) -> Timestamp {
        self.modified_at
    }

    fn fingerprint(&self) -> [u8; 32] {
        fingerprint_of(self)
    }
}

impl Versioned for Item {
    const KIND: EntityKind = EntityKind::Item;

    fn id_string(&self) -> String {
        self.id.to_string()
    }

    fn modified_at(&self) -> Timestamp {
        self.modified_at
    }

    fn fingerprint(&self) -> [u8; 32] {
        fingerprint_of(self)
    }
}

/// A pair of differing versions of one entity, and how it was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity identifier.
    pub id: String,
    /// Local last-modified time.
    pub local_modified_at: Timestamp,
    /// Remote last-modified time.
    pub remote_modified_at: Timestamp,
    /// Resolution.
    pub resolution: ConflictResolution,
}

impl Conflict {
    /// Returns true if the timestamps were equal and the tie-break decided.
    pub fn is_tie(&self) -> bool {
        self.local_modified_at == self.remote_modified_at
    }
}

/// Resolution for a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictResolution {
    /// Keep local version.
    KeepLocal,
    /// Accept remote version.
    AcceptRemote,
}

/// Policy for automatic conflict resolution.
///
/// Replicas only converge if every one of them resolves with the same rule,
/// so last-write-wins is the only policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// The greater `(modified_at, id, fingerprint)` wins.
    #[default]
    LastWriteWins,
}

impl ConflictPolicy {
    /// Picks between two versions of the same entity.
    ///
    /// Identical versions resolve to [`ConflictResolution::KeepLocal`].
    pub fn resolve<T: Versioned>(&self, local: &T, remote: &T) -> ConflictResolution {
        match self {
            ConflictPolicy::LastWriteWins => {
                let local_key = (local.modified_at(), local.id_string());
                let remote_key = (remote.modified_at(), remote.id_string());
                let remote_wins = match remote_key.cmp(&local_key) {
                    std::cmp::Ordering::Greater => true,
                    std::cmp::Ordering::Less => false,
                    std::cmp::Ordering::Equal => remote.fingerprint() > local.fingerprint(),
                };
                if remote_wins {
                    ConflictResolution::AcceptRemote
                } else {
                    ConflictResolution::KeepLocal
                }
            }
        }
    }

    /// Resolves two versions and describes the outcome.
    pub fn conflict<T: Versioned>(&self, local: &T, remote: &T) -> Conflict {
        Conflict {
            kind: T::KIND,
            id: local.id_string(),
            local_modified_at: local.modified_at(),
            remote_modified_at: remote.modified_at(),
            resolution: self.resolve(local, remote),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listsync_core::ListId;
    use proptest::prelude::*;

    fn list(name: &str, modified: i64) -> List {
        List {
            id: ListId::from_u128(7),
            name: name.into(),
            order_number: 0,
            is_archived: false,
            created_at: Timestamp::from_millis(0),
            modified_at: Timestamp::from_millis(modified),
        }
    }

    fn winner<'a>(policy: ConflictPolicy, local: &'a List, remote: &'a List) -> &'a List {
        match policy.resolve(local, remote) {
            ConflictResolution::KeepLocal => local,
            ConflictResolution::AcceptRemote => remote,
        }
    }

    #[test]
    fn newer_version_wins() {
        let policy = ConflictPolicy::LastWriteWins;
        let old = list("old", 10);
        let new = list("new", 11);
        assert_eq!(policy.resolve(&old, &new), ConflictResolution::AcceptRemote);
        assert_eq!(policy.resolve(&new, &old), ConflictResolution::KeepLocal);
    }

    #[test]
    fn identical_versions_keep_local() {
        let a = list("same", 10);
        assert_eq!(
            ConflictPolicy::LastWriteWins.resolve(&a, &a.clone()),
            ConflictResolution::KeepLocal
        );
    }

    #[test]
    fn conflict_describes_tie() {
        let conflict = ConflictPolicy::LastWriteWins.conflict(&list("a", 5), &list("b", 5));
        assert!(conflict.is_tie());
        assert_eq!(conflict.kind, EntityKind::List);
        assert_eq!(conflict.id, ListId::from_u128(7).to_string());
    }

    proptest! {
        #[test]
        fn tie_break_is_symmetric(a in "[a-z]{0,8}", b in "[a-z]{0,8}", ts in 0i64..1_000) {
            let policy = ConflictPolicy::LastWriteWins;
            let x = list(&a, ts);
            let y = list(&b, ts);

            let first = winner(policy, &x, &y).clone();
            let second = winner(policy, &y, &x).clone();
            prop_assert_eq!(&first, &second);
            // Repeating the merge never changes the outcome.
            prop_assert_eq!(winner(policy, &x, &y), &first);
        }
    }
}
