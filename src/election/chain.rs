//! Hash-chained append-only logs
//!
//! Both the vote ledger and the audit log are sequences of records where
//! each link commits to its predecessor:
//!
//! `hash = blake3(sequence || previous_hash || json(record))`
//!
//! Appends are staged against a copy of the chain head and only then
//! committed, so a caller holding the write lock can prepare every fallible
//! step of a multi-record append before touching the log.

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::Result;

/// A blake3 digest linking one record to the next
pub type ChainHash = [u8; 32];

const GENESIS_HASH: ChainHash = [0u8; 32];

/// Position and integrity data of one record in a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainLink {
    pub sequence: u64,
    pub previous_hash: Option<ChainHash>,
    pub hash: ChainHash,
}

impl ChainLink {
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// A record together with its chain link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chained<T> {
    #[serde(flatten)]
    pub record: T,
    pub link: ChainLink,
}

/// Outcome of re-hashing a chain from the start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub entries_checked: usize,
    /// Sequence number of the first link that does not verify
    pub first_broken: Option<u64>,
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        self.first_broken.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
struct ChainHead {
    next_sequence: u64,
    last_hash: Option<ChainHash>,
}

impl ChainHead {
    fn link<T: Serialize>(&mut self, record: &T) -> Result<ChainLink> {
        let hash = link_hash(self.next_sequence, self.last_hash.as_ref(), record)?;
        let link = ChainLink {
            sequence: self.next_sequence,
            previous_hash: self.last_hash,
            hash,
        };
        self.next_sequence += 1;
        self.last_hash = Some(hash);
        Ok(link)
    }
}

/// Records linked and ready to commit onto the log they were staged from
#[must_use = "staged records are discarded unless committed"]
pub(crate) struct Staged<T> {
    entries: Vec<Chained<T>>,
    head: ChainHead,
    base_sequence: u64,
}

impl<T> Staged<T> {
    #[cfg(test)]
    pub(crate) fn entries(&self) -> &[Chained<T>] {
        &self.entries
    }
}

/// In-memory append-only log of chained records
#[derive(Debug)]
pub(crate) struct ChainedLog<T> {
    entries: Vec<Chained<T>>,
    head: ChainHead,
}

impl<T> Default for ChainedLog<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            head: ChainHead {
                next_sequence: 1,
                last_hash: None,
            },
        }
    }
}

impl<T: Serialize> ChainedLog<T> {
    /// Link `records` after the current head without modifying the log
    pub(crate) fn stage(&self, records: Vec<T>) -> Result<Staged<T>> {
        let mut head = self.head;
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let link = head.link(&record)?;
            entries.push(Chained { record, link });
        }
        Ok(Staged {
            entries,
            head,
            base_sequence: self.head.next_sequence,
        })
    }

    /// Append previously staged records; cannot fail
    pub(crate) fn commit(&mut self, staged: Staged<T>) {
        debug_assert_eq!(
            staged.base_sequence, self.head.next_sequence,
            "staged records committed onto a moved chain head"
        );
        self.entries.extend(staged.entries);
        self.head = staged.head;
    }

    #[cfg(test)]
    pub(crate) fn append(&mut self, record: T) -> Result<&Chained<T>> {
        let staged = self.stage(vec![record])?;
        self.commit(staged);
        let index = self.entries.len() - 1;
        Ok(&self.entries[index])
    }

    pub(crate) fn entries(&self) -> &[Chained<T>] {
        &self.entries
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Recompute every link from the first record onwards
    pub(crate) fn verify(&self) -> Result<ChainVerification> {
        let mut expected_previous: Option<ChainHash> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            let expected_sequence = index as u64 + 1;
            let recomputed =
                link_hash(entry.link.sequence, expected_previous.as_ref(), &entry.record)?;

            let intact = entry.link.sequence == expected_sequence
                && entry.link.previous_hash == expected_previous
                && bool::from(recomputed.ct_eq(&entry.link.hash));
            if !intact {
                tracing::warn!(sequence = entry.link.sequence, "hash chain broken");
                return Ok(ChainVerification {
                    entries_checked: index + 1,
                    first_broken: Some(entry.link.sequence),
                });
            }
            expected_previous = Some(entry.link.hash);
        }
        Ok(ChainVerification {
            entries_checked: self.entries.len(),
            first_broken: None,
        })
    }

    #[cfg(test)]
    pub(crate) fn entries_mut(&mut self) -> &mut Vec<Chained<T>> {
        &mut self.entries
    }
}

fn link_hash<T: Serialize>(
    sequence: u64,
    previous: Option<&ChainHash>,
    record: &T,
) -> Result<ChainHash> {
    let body = serde_json::to_vec(record)?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(&sequence.to_le_bytes());
    hasher.update(previous.unwrap_or(&GENESIS_HASH));
    hasher.update(&body);
    Ok(*hasher.finalize().as_bytes())
}
