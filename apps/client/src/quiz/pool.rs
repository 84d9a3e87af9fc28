//! Quiz item selection.

use lexicon_core::{DictionarySelection, MasteryLevel};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{QuizError, QuizItem};
use crate::db::{self, SharedRepository, WordRepository};
use crate::shared::SharedDictionaryService;

/// Source of quiz candidates.
pub trait ItemPool: Send + Sync {
    /// Every word the selection offers; with `hard_only`, only words needing review.
    fn candidates(&self, selection: DictionarySelection, hard_only: bool) -> Result<Vec<QuizItem>, QuizError>;
}

/// Pool over the local word table and the published shared snapshots.
pub struct StoreItemPool {
    repository: SharedRepository,
    shared: SharedDictionaryService,
}

impl StoreItemPool {
    pub fn new(repository: SharedRepository, shared: SharedDictionaryService) -> Self {
        Self { repository, shared }
    }
}

impl ItemPool for StoreItemPool {
    fn candidates(&self, selection: DictionarySelection, hard_only: bool) -> Result<Vec<QuizItem>, QuizError> {
        let email = &self.shared.user().email;
        let items = match selection {
            DictionarySelection::Private => db::lock(&self.repository)
                .list_words()?
                .into_iter()
                .map(QuizItem::Private)
                .collect::<Vec<_>>(),
            DictionarySelection::Shared(dictionary_id) => self
                .shared
                .words(dictionary_id)
                .into_iter()
                .map(QuizItem::Shared)
                .collect(),
        };
        Ok(items
            .into_iter()
            .filter(|item| !hard_only || item.mastery_for(email) == MasteryLevel::NeedsReview)
            .collect())
    }
}

/// Pick `count` items in a seeded random order.
///
/// Candidates are sorted by id first so the same seed yields the same quiz regardless of the
/// order the source returned them in.
pub fn select_items(mut candidates: Vec<QuizItem>, count: usize, seed: u64) -> Result<Vec<QuizItem>, QuizError> {
    if count == 0 {
        return Err(QuizError::EmptyPreset);
    }
    if candidates.len() < count {
        return Err(QuizError::InsufficientItems {
            required: count,
            available: candidates.len(),
        });
    }
    candidates.sort_by_key(QuizItem::id);
    let mut rng = StdRng::seed_from_u64(seed);
    candidates.shuffle(&mut rng);
    candidates.truncate(count);
    Ok(candidates)
}
