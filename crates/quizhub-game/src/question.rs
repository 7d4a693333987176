//! Questions and the bank they are drawn from.
//!
//! The bank file is a JSON array shared with the authoring tools, whose
//! keys are PascalCase:
//!
//! ```json
//! [{ "Id": "q1", "Statement": "2 + 2?", "Choices": ["3", "4"], "Answer": "4" }]
//! ```

use std::collections::HashSet;
use std::path::Path;

use rand::Rng;
use serde::Deserialize;

use crate::GameError;

/// One quiz question.
///
/// Only `Deserialize`: a question as a whole is never sent to a client,
/// because `answer` must not leave the server before the window closes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Question {
    pub id: String,
    pub statement: String,
    pub choices: Vec<String>,
    pub answer: String,
}

/// A non-empty, read-only set of questions.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    /// Wraps `questions`, rejecting an empty list.
    pub fn new(questions: Vec<Question>) -> Result<Self, GameError> {
        if questions.is_empty() {
            return Err(GameError::EmptyBank);
        }
        Ok(Self { questions })
    }

    /// Parses a bank from JSON bytes.
    pub fn from_json(data: &[u8]) -> Result<Self, GameError> {
        let questions: Vec<Question> = serde_json::from_slice(data).map_err(GameError::Parse)?;
        Self::new(questions)
    }

    /// Reads and parses a bank file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, GameError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let bank = Self::from_json(&data)?;
        tracing::info!(path = %path.display(), questions = bank.len(), "loaded question bank");
        Ok(bank)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter()
    }

    /// Index of a uniformly random question.
    pub fn pick(&self) -> usize {
        rand::rng().random_range(0..self.questions.len())
    }

    /// Index of a uniformly random question whose id is not in `used`.
    /// Falls back to [`pick`](Self::pick) once every question is used.
    pub fn pick_excluding(&self, used: &HashSet<String>) -> usize {
        let fresh: Vec<usize> = self
            .questions
            .iter()
            .enumerate()
            .filter(|(_, q)| !used.contains(&q.id))
            .map(|(i, _)| i)
            .collect();
        if fresh.is_empty() {
            return self.pick();
        }
        fresh[rand::rng().random_range(0..fresh.len())]
    }
}
