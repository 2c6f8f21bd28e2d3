//! Candidate registry
//!
//! Candidates are grouped by a free-text position label. Tallies are only
//! ever raised by one, by the voting core, while it holds this registry's
//! write lock.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::audit::{AuditAction, AuditEvent, AuditLog};
use super::context::RequestContext;
use super::settings::{SettingsStore, SettingsTable};
use crate::types::{Candidate, CandidateProfile};
use crate::{Error, Result, storage_error};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionStats {
    pub position: String,
    pub candidate_count: usize,
    pub total_votes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateStats {
    pub total_candidates: usize,
    pub total_votes: u64,
    pub position_count: usize,
    pub by_position: Vec<PositionStats>,
}

/// Candidate rows keyed by id
#[derive(Debug, Default)]
pub(crate) struct CandidateTable {
    candidates: HashMap<Uuid, Candidate>,
}

impl CandidateTable {
    pub(crate) fn get(&self, id: Uuid) -> Option<&Candidate> {
        self.candidates.get(&id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.values()
    }

    /// Raise each listed tally by exactly one
    ///
    /// All ids are resolved before any count changes, so an unknown id
    /// leaves every tally as it was.
    pub(crate) fn increment_all(&mut self, ids: &[Uuid]) -> Result<()> {
        if let Some(&missing) = ids.iter().find(|id| !self.candidates.contains_key(id)) {
            return Err(Error::UnknownCandidate {
                candidate_id: missing,
            });
        }
        for id in ids {
            if let Some(candidate) = self.candidates.get_mut(id) {
                candidate.vote_count += 1;
            }
        }
        Ok(())
    }

    fn count_in_position(&self, position: &str) -> usize {
        self.iter().filter(|c| c.position == position).count()
    }

    /// Refuse to seat another candidate in a full position
    fn ensure_capacity(&self, settings: &SettingsTable, position: &str) -> Result<()> {
        if let Some(max) = settings.max_candidates_per_position() {
            let seated = self.count_in_position(position);
            if seated as i64 >= max {
                return Err(Error::conflict(format!(
                    "{position} already has the maximum of {max} candidates"
                )));
            }
        }
        Ok(())
    }
}

/// Shared candidate registry
#[derive(Debug)]
pub struct CandidateRegistry {
    table: RwLock<CandidateTable>,
    settings: Arc<SettingsStore>,
    audit: Arc<AuditLog>,
}

impl CandidateRegistry {
    pub fn new(settings: Arc<SettingsStore>, audit: Arc<AuditLog>) -> Self {
        Self {
            table: RwLock::new(CandidateTable::default()),
            settings,
            audit,
        }
    }

    pub(crate) fn read_table(&self) -> Result<RwLockReadGuard<'_, CandidateTable>> {
        self.table
            .read()
            .map_err(|_| storage_error!("Candidate registry read error"))
    }

    pub(crate) fn write_table(&self) -> Result<RwLockWriteGuard<'_, CandidateTable>> {
        self.table
            .write()
            .map_err(|_| storage_error!("Candidate registry write error"))
    }

    pub fn create(&self, ctx: &RequestContext, profile: CandidateProfile) -> Result<Candidate> {
        ctx.require_admin("create candidate")?;
        profile.validate()?;

        let settings = self.settings.read_table()?;
        let mut table = self.write_table()?;
        let now = Utc::now();
        let candidate = Candidate::new(profile, now);
        table.ensure_capacity(&settings, &candidate.position)?;

        let mut audit = self.audit.write_log()?;
        let staged = audit.stage(vec![AuditEvent::new(
            AuditAction::CreateCandidate,
            ctx.performed_by(),
            format!(
                "Added candidate: {} for {}",
                candidate.display_name(),
                candidate.position
            ),
            now,
        )])?;
        table.candidates.insert(candidate.id, candidate.clone());
        audit.commit(staged);

        tracing::info!(
            candidate_id = %candidate.id,
            position = %candidate.position,
            "candidate created"
        );
        Ok(candidate)
    }

    /// Replace a candidate's editable fields, keeping their tally
    pub fn update(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        profile: CandidateProfile,
    ) -> Result<Candidate> {
        ctx.require_admin("update candidate")?;
        profile.validate()?;

        let settings = self.settings.read_table()?;
        let mut table = self.write_table()?;
        let current = table
            .get(id)
            .ok_or_else(|| Error::not_found("candidate", id))?;

        let mut updated = current.clone();
        updated.apply(profile);
        if updated.position != current.position {
            table.ensure_capacity(&settings, &updated.position)?;
        }

        let mut audit = self.audit.write_log()?;
        let staged = audit.stage(vec![AuditEvent::new(
            AuditAction::UpdateCandidate,
            ctx.performed_by(),
            format!("Updated candidate: {}", updated.display_name()),
            Utc::now(),
        )])?;
        table.candidates.insert(id, updated.clone());
        audit.commit(staged);

        tracing::info!(candidate_id = %id, position = %updated.position, "candidate updated");
        Ok(updated)
    }

    /// Delete a candidate who has received no votes
    pub fn delete(&self, ctx: &RequestContext, id: Uuid) -> Result<Candidate> {
        ctx.require_admin("delete candidate")?;
        let mut table = self.write_table()?;
        let candidate = table
            .get(id)
            .ok_or_else(|| Error::not_found("candidate", id))?;
        if candidate.vote_count > 0 {
            return Err(Error::conflict(format!(
                "Cannot delete {} after {} vote(s) have been recorded",
                candidate.display_name(),
                candidate.vote_count
            )));
        }

        let mut audit = self.audit.write_log()?;
        let staged = audit.stage(vec![AuditEvent::new(
            AuditAction::DeleteCandidate,
            ctx.performed_by(),
            format!("Deleted candidate: {}", candidate.display_name()),
            Utc::now(),
        )])?;
        let removed = table
            .candidates
            .remove(&id)
            .ok_or_else(|| Error::not_found("candidate", id))?;
        audit.commit(staged);

        tracing::info!(candidate_id = %id, "candidate deleted");
        Ok(removed)
    }

    pub fn get(&self, id: Uuid) -> Result<Option<Candidate>> {
        Ok(self.read_table()?.get(id).cloned())
    }

    /// All candidates, newest first
    pub fn list(&self) -> Result<Vec<Candidate>> {
        let table = self.read_table()?;
        let mut candidates: Vec<Candidate> = table.iter().cloned().collect();
        candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(candidates)
    }

    pub fn list_by_position(&self, position: &str) -> Result<Vec<Candidate>> {
        let table = self.read_table()?;
        let mut candidates: Vec<Candidate> = table
            .iter()
            .filter(|c| c.position == position)
            .cloned()
            .collect();
        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(candidates)
    }

    /// Sorted, de-duplicated position labels
    pub fn list_positions(&self) -> Result<Vec<String>> {
        let table = self.read_table()?;
        let positions: BTreeSet<&str> = table.iter().map(|c| c.position.as_str()).collect();
        Ok(positions.into_iter().map(str::to_string).collect())
    }

    pub fn stats(&self) -> Result<CandidateStats> {
        let table = self.read_table()?;
        let mut by_position: BTreeMap<&str, PositionStats> = BTreeMap::new();
        for candidate in table.iter() {
            let stats = by_position
                .entry(candidate.position.as_str())
                .or_insert_with(|| PositionStats {
                    position: candidate.position.clone(),
                    candidate_count: 0,
                    total_votes: 0,
                });
            stats.candidate_count += 1;
            stats.total_votes += candidate.vote_count;
        }

        let by_position: Vec<PositionStats> = by_position.into_values().collect();
        Ok(CandidateStats {
            total_candidates: by_position.iter().map(|p| p.candidate_count).sum(),
            total_votes: by_position.iter().map(|p| p.total_votes).sum(),
            position_count: by_position.len(),
            by_position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ElectionConfig;
    use crate::election::settings::MAX_CANDIDATES_PER_POSITION;

    fn registry() -> (CandidateRegistry, Arc<SettingsStore>, Arc<AuditLog>) {
        let audit = Arc::new(AuditLog::new());
        let settings = Arc::new(SettingsStore::new(
            &ElectionConfig::for_testing(),
            audit.clone(),
        ));
        settings.initialize().unwrap();
        let registry = CandidateRegistry::new(settings.clone(), audit.clone());
        (registry, settings, audit)
    }

    fn admin() -> RequestContext {
        RequestContext::admin("admin", true)
    }

    fn increment(registry: &CandidateRegistry, id: Uuid) -> Result<()> {
        registry.write_table()?.increment_all(&[id])
    }

    #[test]
    fn test_create_and_group() {
        let (registry, _, _) = registry();
        registry
            .create(&admin(), CandidateProfile::new("Dr", "Ada", "Obi", "President"))
            .unwrap();
        registry
            .create(&admin(), CandidateProfile::new("Mr", "Femi", "Ade", "President"))
            .unwrap();
        registry
            .create(&admin(), CandidateProfile::new("Ms", "Zara", "Bello", "Secretary"))
            .unwrap();

        assert_eq!(registry.list().unwrap().len(), 3);
        assert_eq!(registry.list_by_position("President").unwrap().len(), 2);
        assert_eq!(
            registry.list_positions().unwrap(),
            vec!["President".to_string(), "Secretary".to_string()]
        );
    }

    #[test]
    fn test_increment_is_exactly_one() {
        let (registry, _, _) = registry();
        let ada = registry
            .create(&admin(), CandidateProfile::new("", "Ada", "Obi", "President"))
            .unwrap();
        let femi = registry
            .create(&admin(), CandidateProfile::new("", "Femi", "Ade", "Treasurer"))
            .unwrap();

        registry
            .write_table()
            .unwrap()
            .increment_all(&[ada.id, femi.id])
            .unwrap();
        increment(&registry, ada.id).unwrap();
        assert_eq!(registry.get(ada.id).unwrap().unwrap().vote_count, 2);
        assert_eq!(registry.get(femi.id).unwrap().unwrap().vote_count, 1);

        // An unknown id anywhere in the list changes nothing.
        let partial = registry
            .write_table()
            .unwrap()
            .increment_all(&[ada.id, Uuid::new_v4()]);
        assert!(matches!(partial, Err(Error::UnknownCandidate { .. })));
        assert_eq!(registry.get(ada.id).unwrap().unwrap().vote_count, 2);
    }

    #[test]
    fn test_update_keeps_tally() {
        let (registry, _, audit) = registry();
        let ada = registry
            .create(&admin(), CandidateProfile::new("", "Ada", "Obi", "President"))
            .unwrap();
        increment(&registry, ada.id).unwrap();

        let moved = registry
            .update(&admin(), ada.id, CandidateProfile::new("", "Ada", "Obi", "Secretary"))
            .unwrap();
        assert_eq!(moved.position, "Secretary");
        assert_eq!(moved.vote_count, 1);
        assert_eq!(moved.created_at, ada.created_at);

        let missing = registry.update(
            &admin(),
            Uuid::new_v4(),
            CandidateProfile::new("", "X", "Y", "Z"),
        );
        assert!(matches!(missing, Err(Error::NotFound { .. })));
        // Seed + create + update.
        assert_eq!(audit.len().unwrap(), 3);
    }

    #[test]
    fn test_delete_refuses_candidates_with_votes() {
        let (registry, _, _) = registry();
        let ada = registry
            .create(&admin(), CandidateProfile::new("", "Ada", "Obi", "President"))
            .unwrap();
        let femi = registry
            .create(&admin(), CandidateProfile::new("", "Femi", "Ade", "President"))
            .unwrap();
        increment(&registry, ada.id).unwrap();

        assert!(matches!(
            registry.delete(&admin(), ada.id),
            Err(Error::Conflict { .. })
        ));
        registry.delete(&admin(), femi.id).unwrap();
        assert!(registry.get(femi.id).unwrap().is_none());
        assert!(matches!(
            registry.delete(&admin(), femi.id),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_position_capacity() {
        let (registry, settings, _) = registry();
        settings
            .set(&admin(), MAX_CANDIDATES_PER_POSITION, 1i64)
            .unwrap();

        registry
            .create(&admin(), CandidateProfile::new("", "Ada", "Obi", "President"))
            .unwrap();
        let full = registry.create(&admin(), CandidateProfile::new("", "Femi", "Ade", "President"));
        assert!(matches!(full, Err(Error::Conflict { .. })));

        let zara = registry
            .create(&admin(), CandidateProfile::new("", "Zara", "Bello", "Secretary"))
            .unwrap();
        let moved = registry.update(
            &admin(),
            zara.id,
            CandidateProfile::new("", "Zara", "Bello", "President"),
        );
        assert!(matches!(moved, Err(Error::Conflict { .. })));

        // Editing within the same position is always allowed.
        registry
            .update(
                &admin(),
                zara.id,
                CandidateProfile::new("Ms", "Zara", "Bello", "Secretary"),
            )
            .unwrap();
    }

    #[test]
    fn test_stats() {
        let (registry, _, _) = registry();
        let ada = registry
            .create(&admin(), CandidateProfile::new("", "Ada", "Obi", "President"))
            .unwrap();
        registry
            .create(&admin(), CandidateProfile::new("", "Zara", "Bello", "Secretary"))
            .unwrap();
        increment(&registry, ada.id).unwrap();

        let stats = registry.stats().unwrap();
        assert_eq!(stats.total_candidates, 2);
        assert_eq!(stats.total_votes, 1);
        assert_eq!(stats.position_count, 2);
        assert_eq!(stats.by_position[0].position, "President");
        assert_eq!(stats.by_position[0].total_votes, 1);
    }
}
