//! Optimistic overlay for the current user's shared-word difficulties.
//!
//! A quiz answer changes the user's own difficulty immediately, long before the remote store
//! echoes the write back. The overlay holds those local values and is applied on top of every
//! published dictionary snapshot until the remote copy catches up.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lexicon_core::{apply_delta, SharedWord};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStatus {
    /// Write sent, no answer yet.
    InFlight,
    /// Write failed; waiting for a retry.
    Failed,
    /// Write accepted by the remote store.
    Acknowledged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDifficulty {
    pub score: i32,
    pub status: PendingStatus,
}

/// Failed write waiting for a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedWrite {
    pub dictionary_id: Uuid,
    pub word_id: Uuid,
    pub score: i32,
}

/// Locally known difficulties not yet confirmed by the remote store.
pub struct PendingDifficulties {
    email: String,
    entries: Mutex<HashMap<(Uuid, Uuid), PendingDifficulty>>,
}

impl PendingDifficulties {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Apply `delta` on top of the newest known score and record the result as in flight.
    ///
    /// `remote_score` is only used when no local value is pending, so rapid consecutive
    /// answers build on each other instead of on a stale snapshot.
    pub fn record_delta(&self, dictionary_id: Uuid, word_id: Uuid, remote_score: i32, delta: i32) -> i32 {
        let mut entries = self.lock();
        let base = entries
            .get(&(dictionary_id, word_id))
            .map(|pending| pending.score)
            .unwrap_or(remote_score);
        let score = apply_delta(base, delta);
        entries.insert(
            (dictionary_id, word_id),
            PendingDifficulty {
                score,
                status: PendingStatus::InFlight,
            },
        );
        score
    }

    /// Update the status of a write, unless a newer score has replaced it meanwhile.
    pub fn mark(&self, dictionary_id: Uuid, word_id: Uuid, score: i32, status: PendingStatus) {
        if let Some(pending) = self.lock().get_mut(&(dictionary_id, word_id)) {
            if pending.score == score {
                pending.status = status;
            }
        }
    }

    pub fn get(&self, dictionary_id: Uuid, word_id: Uuid) -> Option<PendingDifficulty> {
        self.lock().get(&(dictionary_id, word_id)).copied()
    }

    pub fn failed(&self) -> Vec<FailedWrite> {
        let mut failed: Vec<FailedWrite> = self
            .lock()
            .iter()
            .filter(|(_, pending)| pending.status == PendingStatus::Failed)
            .map(|(&(dictionary_id, word_id), pending)| FailedWrite {
                dictionary_id,
                word_id,
                score: pending.score,
            })
            .collect();
        failed.sort_by_key(|write| (write.dictionary_id, write.word_id));
        failed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop entries the remote state has caught up with.
    ///
    /// An entry is settled when the remote value matches it or when its word is gone. A
    /// delivery that disagrees may predate the echo, so it never settles an entry, even an
    /// acknowledged one.
    pub fn observe_remote(&self, dictionary_id: Uuid, words: &[SharedWord]) {
        let remote: HashMap<Uuid, Option<i32>> = words
            .iter()
            .map(|word| (word.id, word.difficulties.get(&self.email).copied()))
            .collect();

        self.lock().retain(|&(dict, word_id), pending| {
            if dict != dictionary_id {
                return true;
            }
            match remote.get(&word_id) {
                None => false,
                Some(Some(score)) => *score != pending.score,
                Some(None) => true,
            }
        });
    }

    /// Overwrite the user's own key with pending values. Other keys are untouched.
    pub fn apply(&self, dictionary_id: Uuid, words: &mut [SharedWord]) {
        let entries = self.lock();
        if entries.is_empty() {
            return;
        }
        for word in words.iter_mut() {
            if let Some(pending) = entries.get(&(dictionary_id, word.id)) {
                word.difficulties.insert(self.email.clone(), pending.score);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(Uuid, Uuid), PendingDifficulty>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeMap, BTreeSet};

    const ME: &str = "ana@example.com";

    fn word(dictionary_id: Uuid, scores: &[(&str, i32)]) -> SharedWord {
        SharedWord {
            id: Uuid::new_v4(),
            dictionary_id,
            text: "casa".to_string(),
            definition: "house".to_string(),
            examples: vec![],
            added_by_email: ME.to_string(),
            added_by_display_name: "Ana".to_string(),
            created_at: Utc::now(),
            likes: BTreeSet::new(),
            difficulties: scores
                .iter()
                .map(|(email, score)| (email.to_string(), *score))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn consecutive_deltas_build_on_pending_value() {
        let overlay = PendingDifficulties::new(ME);
        let (dict, id) = (Uuid::new_v4(), Uuid::new_v4());

        assert_eq!(overlay.record_delta(dict, id, 10, 5), 15);
        assert_eq!(overlay.record_delta(dict, id, 10, 5), 20);
    }

    #[test]
    fn apply_only_touches_own_key() {
        let overlay = PendingDifficulties::new(ME);
        let dict = Uuid::new_v4();
        let mut words = vec![word(dict, &[("ben@example.com", -2)])];
        overlay.record_delta(dict, words[0].id, 0, 5);

        overlay.apply(dict, &mut words);
        assert_eq!(words[0].difficulty_for(ME), 5);
        assert_eq!(words[0].difficulty_for("ben@example.com"), -2);
    }

    #[test]
    fn matching_echo_settles_entry() {
        let overlay = PendingDifficulties::new(ME);
        let dict = Uuid::new_v4();
        let stale = word(dict, &[]);
        overlay.record_delta(dict, stale.id, 0, 5);

        overlay.observe_remote(dict, &[stale.clone()]);
        assert_eq!(overlay.len(), 1);

        let mut echoed = stale;
        echoed.difficulties.insert(ME.to_string(), 5);
        overlay.observe_remote(dict, &[echoed]);
        assert!(overlay.is_empty());
    }

    #[test]
    fn failed_write_survives_mismatched_deliveries() {
        let overlay = PendingDifficulties::new(ME);
        let dict = Uuid::new_v4();
        let w = word(dict, &[(ME, 0)]);
        let score = overlay.record_delta(dict, w.id, 0, -2);
        overlay.mark(dict, w.id, score, PendingStatus::Failed);

        overlay.observe_remote(dict, &[w.clone()]);
        assert_eq!(
            overlay.failed(),
            vec![FailedWrite {
                dictionary_id: dict,
                word_id: w.id,
                score: -2
            }]
        );
    }

    #[test]
    fn acknowledged_write_survives_stale_deliveries() {
        let overlay = PendingDifficulties::new(ME);
        let dict = Uuid::new_v4();
        let stale = word(dict, &[("ben@example.com", -2)]);
        let score = overlay.record_delta(dict, stale.id, 0, 5);
        overlay.mark(dict, stale.id, score, PendingStatus::Acknowledged);

        // Deliveries queued before the echo: no own key, then an older own score.
        overlay.observe_remote(dict, &[stale.clone()]);
        let mut older = stale.clone();
        older.difficulties.insert(ME.to_string(), 3);
        overlay.observe_remote(dict, &[older.clone()]);
        assert_eq!(overlay.len(), 1);

        let mut words = vec![older];
        overlay.apply(dict, &mut words);
        assert_eq!(words[0].difficulty_for(ME), 5);
        assert_eq!(words[0].difficulty_for("ben@example.com"), -2);
        assert_eq!(overlay.record_delta(dict, stale.id, 3, 5), 10);
    }

    #[test]
    fn acknowledged_write_settles_on_echo() {
        let overlay = PendingDifficulties::new(ME);
        let dict = Uuid::new_v4();
        let mut w = word(dict, &[]);
        let score = overlay.record_delta(dict, w.id, 0, 5);
        overlay.mark(dict, w.id, score, PendingStatus::Acknowledged);

        w.difficulties.insert(ME.to_string(), 5);
        overlay.observe_remote(dict, &[w]);
        assert!(overlay.is_empty());
    }

    #[test]
    fn stale_mark_does_not_override_newer_score() {
        let overlay = PendingDifficulties::new(ME);
        let (dict, id) = (Uuid::new_v4(), Uuid::new_v4());
        let first = overlay.record_delta(dict, id, 0, 5);
        overlay.record_delta(dict, id, 0, 5);

        overlay.mark(dict, id, first, PendingStatus::Acknowledged);
        assert_eq!(overlay.get(dict, id).unwrap().status, PendingStatus::InFlight);
    }

    #[test]
    fn deleted_word_drops_entry() {
        let overlay = PendingDifficulties::new(ME);
        let dict = Uuid::new_v4();
        overlay.record_delta(dict, Uuid::new_v4(), 0, 5);
        overlay.observe_remote(dict, &[]);
        assert!(overlay.is_empty());
    }
}
