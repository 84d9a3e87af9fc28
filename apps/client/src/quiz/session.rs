//! Quiz session state machine.
//!
//! ```text
//! start ──► Active ──(last item, immediate)──► Complete
//!             │
//!             └─(last item, batched)──► AwaitingBatchEvaluation ──► Complete | Failed
//! any non-terminal phase ──dismiss──► Dismissed
//! ```
//!
//! Immediate quizzes score every answer as it is given. Batched quizzes only record the
//! answers; scores are applied once the judge returns a verdict for every sentence, and not
//! at all when it fails. Whatever the exit path, a session in which at least one item was
//! played is persisted exactly once.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lexicon_core::{check_answer, Evaluation, MatchingMode, QuizPreset, QuizSession, QuizType, ScoreDeltas};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::judge::{Judge, JudgeError, SentenceSubmission};
use super::pool::{select_items, ItemPool};
use super::{QuizError, QuizItem};
use crate::db::{self, SessionRepository};
use crate::shared::SharedDictionaryService;
use crate::sync::SyncReconciler;

const DEFAULT_FUZZY_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizPhase {
    Active,
    AwaitingBatchEvaluation,
    Complete,
    Failed,
    Dismissed,
}

impl QuizPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::AwaitingBatchEvaluation => "awaiting evaluation",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Dismissed => "dismissed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Dismissed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Correct,
    Incorrect,
    Skipped,
    /// Recorded for the judge; not scored yet.
    Submitted,
}

/// What happened to one item.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptResult {
    pub item_id: Uuid,
    pub outcome: AnswerOutcome,
    /// Points applied to the word's difficulty. Always 0 for batched quizzes.
    pub delta: i32,
    pub streak: u32,
    /// Similarity of a typed answer.
    pub similarity: Option<f64>,
    /// The answer that would have been correct.
    pub expected: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionProgress {
    pub answered: usize,
    pub total: usize,
    pub score: i32,
    pub streak: u32,
    pub best_streak: u32,
    pub phase: QuizPhase,
}

/// A judge call running in the background. Hand it back to
/// [`QuizSessionCoordinator::apply_evaluation`] once it should be applied.
pub struct PendingEvaluation {
    session_id: Uuid,
    handle: JoinHandle<Result<Vec<Evaluation>, JudgeError>>,
}

impl PendingEvaluation {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

pub struct QuizSessionCoordinator {
    id: Uuid,
    quiz_type: QuizType,
    deltas: ScoreDeltas,
    matching_mode: MatchingMode,
    fuzzy_threshold: f64,
    items: Vec<QuizItem>,
    position: usize,
    phase: QuizPhase,
    score: i32,
    streak: u32,
    best_streak: u32,
    /// Per-item accuracy contribution of every scored item.
    contributions: Vec<f64>,
    played: Vec<Uuid>,
    correct: Vec<Uuid>,
    /// Batched answers by item index; `None` marks a skip.
    batch: Vec<(usize, Option<String>)>,
    evaluations: Vec<Evaluation>,
    started: Instant,
    sync: SyncReconciler,
    timers: JoinSet<()>,
    record: Option<QuizSession>,
    /// Shared updates paused for this session, resumed once it ends.
    held_updates: Option<SharedDictionaryService>,
}

impl QuizSessionCoordinator {
    /// Select items and begin a session.
    pub fn start(
        quiz_type: QuizType,
        preset: &QuizPreset,
        pool: &dyn ItemPool,
        seed: u64,
        sync: SyncReconciler,
    ) -> Result<Self, QuizError> {
        let candidates = pool.candidates(preset.selection, preset.hard_only)?;
        let items = select_items(candidates, preset.item_count, seed)?;
        let id = Uuid::new_v4();
        info!(session_id = %id, quiz_type = quiz_type.as_str(), items = items.len(), "Quiz started");

        Ok(Self {
            id,
            quiz_type,
            deltas: ScoreDeltas::for_quiz(quiz_type, preset.timed),
            matching_mode: MatchingMode::default(),
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            items,
            position: 0,
            phase: QuizPhase::Active,
            score: 0,
            streak: 0,
            best_streak: 0,
            contributions: Vec::new(),
            played: Vec::new(),
            correct: Vec::new(),
            batch: Vec::new(),
            evaluations: Vec::new(),
            started: Instant::now(),
            sync,
            timers: JoinSet::new(),
            record: None,
            held_updates: None,
        })
    }

    /// How typed spelling answers are compared.
    pub fn with_matching(mut self, mode: MatchingMode, fuzzy_threshold: f64) -> Self {
        self.matching_mode = mode;
        self.fuzzy_threshold = fuzzy_threshold;
        self
    }

    /// Pause shared dictionary updates until the session ends, whichever way it ends.
    pub fn hold_shared_updates(mut self, shared: SharedDictionaryService) -> Self {
        shared.pause_all();
        self.held_updates = Some(shared);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn quiz_type(&self) -> QuizType {
        self.quiz_type
    }

    pub fn phase(&self) -> QuizPhase {
        self.phase
    }

    pub fn items(&self) -> &[QuizItem] {
        &self.items
    }

    pub fn current_item(&self) -> Option<&QuizItem> {
        match self.phase {
            QuizPhase::Active => self.items.get(self.position),
            _ => None,
        }
    }

    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            answered: self.played.len(),
            total: self.items.len(),
            score: self.score,
            streak: self.streak,
            best_streak: self.best_streak,
            phase: self.phase,
        }
    }

    /// Judge verdicts of a completed batched session.
    pub fn evaluations(&self) -> &[Evaluation] {
        &self.evaluations
    }

    /// The persisted record, once the session has ended with at least one item played.
    pub fn record(&self) -> Option<&QuizSession> {
        self.record.as_ref()
    }

    // === Answers ===

    /// Score the current item with a verdict decided by the caller.
    pub fn answer(&mut self, is_correct: bool) -> Result<AttemptResult, QuizError> {
        let index = self.active_index("answer")?;
        self.ensure_immediate("answer")?;
        let outcome = if is_correct {
            AnswerOutcome::Correct
        } else {
            AnswerOutcome::Incorrect
        };
        self.score_immediate(index, outcome, None)
    }

    /// Definition quiz: the chosen option is correct when it equals the word's definition.
    pub fn choose_definition(&mut self, chosen: &str) -> Result<AttemptResult, QuizError> {
        let index = self.active_index("choose a definition")?;
        self.ensure_type(QuizType::ChooseDefinition, "choose a definition")?;
        let outcome = if chosen.trim() == self.items[index].definition().trim() {
            AnswerOutcome::Correct
        } else {
            AnswerOutcome::Incorrect
        };
        self.score_immediate(index, outcome, None)
    }

    /// Spelling quiz: compare the typed word using the configured matching mode.
    pub fn answer_spelling(&mut self, typed: &str) -> Result<AttemptResult, QuizError> {
        let index = self.active_index("answer spelling")?;
        self.ensure_type(QuizType::Spelling, "answer spelling")?;
        let result = check_answer(
            typed,
            self.items[index].text(),
            self.matching_mode,
            self.fuzzy_threshold,
        );
        let outcome = if result.is_correct {
            AnswerOutcome::Correct
        } else {
            AnswerOutcome::Incorrect
        };
        self.score_immediate(index, outcome, Some(result.similarity))
    }

    /// Sentence quiz: record a sentence for the judge. Blank sentences count as skips.
    pub fn submit_sentence(&mut self, sentence: &str) -> Result<AttemptResult, QuizError> {
        let index = self.active_index("submit a sentence")?;
        self.ensure_type(QuizType::Sentence, "submit a sentence")?;
        let sentence = sentence.trim();
        if sentence.is_empty() {
            return self.record_batched(index, None);
        }
        self.record_batched(index, Some(sentence.to_string()))
    }

    pub fn skip(&mut self) -> Result<AttemptResult, QuizError> {
        let index = self.active_index("skip")?;
        if self.quiz_type.is_batched() {
            return self.record_batched(index, None);
        }
        self.score_immediate(index, AnswerOutcome::Skipped, None)
    }

    // === Batched evaluation ===

    /// Send every recorded sentence to the judge in the background.
    pub fn request_evaluation(&mut self, judge: Arc<dyn Judge>) -> Result<PendingEvaluation, QuizError> {
        if self.phase != QuizPhase::AwaitingBatchEvaluation {
            return Err(self.invalid("request evaluation"));
        }
        let submissions: Vec<SentenceSubmission> = self
            .batch
            .iter()
            .filter_map(|(index, sentence)| {
                sentence.as_ref().map(|sentence| SentenceSubmission {
                    target_word: self.items[*index].text().to_string(),
                    sentence: sentence.clone(),
                })
            })
            .collect();
        debug!(session_id = %self.id, submissions = submissions.len(), "Requesting sentence evaluation");

        let handle = tokio::spawn(async move {
            if submissions.is_empty() {
                return Ok(Vec::new());
            }
            judge.evaluate(submissions).await
        });
        Ok(PendingEvaluation {
            session_id: self.id,
            handle,
        })
    }

    /// Apply a judge result. Either every sentence is scored and the session completes, or
    /// nothing is scored and the session fails.
    ///
    /// A result arriving after the session ended (for example after a dismiss) is discarded.
    pub async fn apply_evaluation(&mut self, pending: PendingEvaluation) -> Result<QuizSession, QuizError> {
        if pending.session_id != self.id || self.phase != QuizPhase::AwaitingBatchEvaluation {
            pending.handle.abort();
            debug!(session_id = %self.id, "Discarding evaluation for a closed session");
            return Err(self.invalid("apply an evaluation"));
        }

        let outcome = match pending.handle.await {
            Ok(Ok(evaluations)) => self.match_verdicts(&evaluations).map(|verdicts| (verdicts, evaluations)),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(format!("judge task failed: {e}")),
        };

        match outcome {
            Ok((verdicts, evaluations)) => {
                self.score_batch(&verdicts);
                self.evaluations = evaluations;
                self.complete()
            }
            Err(message) => {
                warn!(session_id = %self.id, "Sentence evaluation failed: {}", message);
                self.phase = QuizPhase::Failed;
                self.release_updates();
                self.persist()?;
                Err(QuizError::Evaluation(message))
            }
        }
    }

    /// Request and apply an evaluation in one call.
    pub async fn evaluate(&mut self, judge: Arc<dyn Judge>) -> Result<QuizSession, QuizError> {
        let pending = self.request_evaluation(judge)?;
        self.apply_evaluation(pending).await
    }

    // === Exit ===

    /// Leave the session. Cancels feedback timers and persists the session if anything was
    /// played. Calling it on an ended session returns the existing record.
    pub fn dismiss(&mut self) -> Result<Option<QuizSession>, QuizError> {
        self.timers.abort_all();
        self.release_updates();
        if self.phase.is_terminal() {
            return Ok(self.record.clone());
        }
        self.phase = QuizPhase::Dismissed;
        info!(session_id = %self.id, played = self.played.len(), "Quiz dismissed");
        self.persist()
    }

    /// Resolves after `delay` unless the session is dismissed first.
    pub fn schedule_feedback(&mut self, delay: Duration) -> oneshot::Receiver<()> {
        let (sender, receiver) = oneshot::channel();
        self.timers.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sender.send(());
        });
        receiver
    }

    // === Private methods ===

    fn invalid(&self, action: &'static str) -> QuizError {
        QuizError::InvalidState {
            action,
            phase: self.phase.as_str(),
        }
    }

    fn active_index(&self, action: &'static str) -> Result<usize, QuizError> {
        match self.phase {
            QuizPhase::Active if self.position < self.items.len() => Ok(self.position),
            _ => Err(self.invalid(action)),
        }
    }

    fn ensure_type(&self, expected: QuizType, action: &'static str) -> Result<(), QuizError> {
        if self.quiz_type != expected {
            return Err(QuizError::InvalidState {
                action,
                phase: self.quiz_type.as_str(),
            });
        }
        Ok(())
    }

    fn ensure_immediate(&self, action: &'static str) -> Result<(), QuizError> {
        if self.quiz_type.is_batched() {
            return Err(QuizError::InvalidState {
                action,
                phase: self.quiz_type.as_str(),
            });
        }
        Ok(())
    }

    fn delta_for(&self, outcome: AnswerOutcome) -> i32 {
        match outcome {
            AnswerOutcome::Correct => self.deltas.correct,
            AnswerOutcome::Incorrect => self.deltas.incorrect,
            AnswerOutcome::Skipped => self.deltas.skipped,
            AnswerOutcome::Submitted => 0,
        }
    }

    /// Private scores go through SQLite synchronously; shared scores are written in the
    /// background and shown through the overlay meanwhile.
    fn route_score(&self, item: &QuizItem, delta: i32) -> Result<(), QuizError> {
        match item {
            QuizItem::Private(word) => {
                self.sync.record_private_score(word.id, delta)?;
            }
            QuizItem::Shared(word) => {
                self.sync.queue_shared_difficulty(word.clone(), delta);
            }
        }
        Ok(())
    }

    fn tally(&mut self, item_id: Uuid, correct: bool, delta: i32) {
        self.score += delta;
        if correct {
            self.streak += 1;
            self.best_streak = self.best_streak.max(self.streak);
            self.contributions.push(1.0);
            self.correct.push(item_id);
        } else {
            self.streak = 0;
            self.contributions.push(0.0);
        }
    }

    fn score_immediate(
        &mut self,
        index: usize,
        outcome: AnswerOutcome,
        similarity: Option<f64>,
    ) -> Result<AttemptResult, QuizError> {
        let item = self.items[index].clone();
        let delta = self.delta_for(outcome);
        // Nothing in the session changes unless the score was stored.
        self.route_score(&item, delta)?;

        self.played.push(item.id());
        self.tally(item.id(), outcome == AnswerOutcome::Correct, delta);
        let result = AttemptResult {
            item_id: item.id(),
            outcome,
            delta,
            streak: self.streak,
            similarity,
            expected: self.expected_answer(&item),
        };
        self.advance()?;
        Ok(result)
    }

    fn record_batched(&mut self, index: usize, sentence: Option<String>) -> Result<AttemptResult, QuizError> {
        let item_id = self.items[index].id();
        let outcome = if sentence.is_some() {
            AnswerOutcome::Submitted
        } else {
            AnswerOutcome::Skipped
        };
        self.batch.push((index, sentence));
        self.played.push(item_id);
        let result = AttemptResult {
            item_id,
            outcome,
            delta: 0,
            streak: self.streak,
            similarity: None,
            expected: self.items[index].text().to_string(),
        };
        self.advance()?;
        Ok(result)
    }

    fn expected_answer(&self, item: &QuizItem) -> String {
        match self.quiz_type {
            QuizType::ChooseDefinition => item.definition().to_string(),
            QuizType::Spelling | QuizType::Sentence => item.text().to_string(),
        }
    }

    fn advance(&mut self) -> Result<(), QuizError> {
        self.position += 1;
        if self.position < self.items.len() {
            return Ok(());
        }
        if self.quiz_type.is_batched() {
            self.phase = QuizPhase::AwaitingBatchEvaluation;
            debug!(session_id = %self.id, "All sentences recorded");
            Ok(())
        } else {
            self.complete().map(|_| ())
        }
    }

    /// One verdict per submitted sentence, in batch order. Verdicts are matched by target
    /// word; a missing verdict fails the whole batch.
    fn match_verdicts(&self, evaluations: &[Evaluation]) -> Result<Vec<bool>, String> {
        let mut unused: Vec<&Evaluation> = evaluations.iter().collect();
        let mut verdicts = Vec::new();
        for (index, sentence) in &self.batch {
            if sentence.is_none() {
                continue;
            }
            let target = self.items[*index].text();
            let position = unused
                .iter()
                .position(|evaluation| evaluation.target_word.trim().eq_ignore_ascii_case(target.trim()))
                .ok_or_else(|| format!("judge returned no verdict for {target}"))?;
            verdicts.push(unused.remove(position).is_correct);
        }
        Ok(verdicts)
    }

    fn score_batch(&mut self, verdicts: &[bool]) {
        let mut verdicts = verdicts.iter().copied();
        for (index, sentence) in self.batch.clone() {
            let item = self.items[index].clone();
            let (correct, delta) = match sentence {
                Some(_) => {
                    let correct = verdicts.next().unwrap_or(false);
                    let outcome = if correct {
                        AnswerOutcome::Correct
                    } else {
                        AnswerOutcome::Incorrect
                    };
                    (correct, self.delta_for(outcome))
                }
                None => (false, self.delta_for(AnswerOutcome::Skipped)),
            };
            // An item whose score could not be stored counts as played but adds nothing.
            let delta = match self.route_score(&item, delta) {
                Ok(()) => delta,
                Err(e) => {
                    warn!(item_id = %item.id(), "Failed to store sentence score: {}", e);
                    0
                }
            };
            self.tally(item.id(), correct, delta);
        }
    }

    fn complete(&mut self) -> Result<QuizSession, QuizError> {
        self.phase = QuizPhase::Complete;
        self.release_updates();
        let record = self.persist()?;
        record.ok_or_else(|| self.invalid("complete"))
    }

    fn release_updates(&mut self) {
        if let Some(shared) = self.held_updates.take() {
            shared.resume_deliveries();
        }
    }

    /// Store the session record once. Sessions without a played item are not stored.
    fn persist(&mut self) -> Result<Option<QuizSession>, QuizError> {
        if let Some(record) = &self.record {
            return Ok(Some(record.clone()));
        }
        if self.played.is_empty() {
            return Ok(None);
        }

        let accuracy = if self.contributions.is_empty() {
            0.0
        } else {
            self.contributions.iter().sum::<f64>() / self.contributions.len() as f64
        };
        let record = QuizSession {
            id: self.id,
            quiz_type: self.quiz_type,
            score: self.score,
            correct_answers: self.correct.len() as u32,
            total_items: self.played.len() as u32,
            duration_seconds: self.started.elapsed().as_secs(),
            accuracy,
            item_ids: self.played.clone(),
            correct_item_ids: self.correct.clone(),
            timestamp: Utc::now(),
        };
        db::lock(self.sync.repository()).save_session(&record)?;
        info!(
            session_id = %self.id,
            score = record.score,
            accuracy = record.accuracy,
            phase = self.phase.as_str(),
            "Quiz session saved"
        );
        self.record = Some(record.clone());
        Ok(Some(record))
    }
}

impl Drop for QuizSessionCoordinator {
    fn drop(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        if let Err(e) = self.dismiss() {
            warn!(session_id = %self.id, "Failed to save abandoned quiz session: {}", e);
        }
    }
}
