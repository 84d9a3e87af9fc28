//! Sentence judging.
//!
//! Sentence quizzes collect every answer first and send the whole batch to a [`Judge`] once
//! the last item is played. The judge either returns a verdict for every submission or fails
//! the batch as a whole.

use async_trait::async_trait;
use lexicon_core::Evaluation;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One sentence written by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceSubmission {
    pub target_word: String,
    pub sentence: String,
}

#[derive(Debug, Clone, Error)]
#[error("judge unavailable: {0}")]
pub struct JudgeError(pub String);

#[async_trait]
pub trait Judge: Send + Sync {
    async fn evaluate(&self, submissions: Vec<SentenceSubmission>) -> Result<Vec<Evaluation>, JudgeError>;
}

/// Judge replaying canned verdicts, keyed by target word. Useful offline and in tests.
#[derive(Debug, Clone, Default)]
pub struct ScriptedJudge {
    verdicts: Vec<(String, bool)>,
    fail_with: Option<String>,
}

impl ScriptedJudge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verdict(mut self, target_word: impl Into<String>, is_correct: bool) -> Self {
        self.verdicts.push((target_word.into(), is_correct));
        self
    }

    /// Fail every batch with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            verdicts: Vec::new(),
            fail_with: Some(message.into()),
        }
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn evaluate(&self, submissions: Vec<SentenceSubmission>) -> Result<Vec<Evaluation>, JudgeError> {
        if let Some(message) = &self.fail_with {
            return Err(JudgeError(message.clone()));
        }
        submissions
            .into_iter()
            .map(|submission| -> Result<Evaluation, JudgeError> {
                let (_, is_correct) = self
                    .verdicts
                    .iter()
                    .find(|(word, _)| word.eq_ignore_ascii_case(&submission.target_word))
                    .ok_or_else(|| JudgeError(format!("no verdict for {}", submission.target_word)))?;
                Ok(Evaluation {
                    target_word: submission.target_word,
                    is_correct: *is_correct,
                    feedback: if *is_correct {
                        "Well used.".to_string()
                    } else {
                        "The word is not used correctly.".to_string()
                    },
                })
            })
            .collect()
    }
}
