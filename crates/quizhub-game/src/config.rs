//! Game rules.

use std::time::Duration;

/// Rules for one quiz game. Every room plays by the same rules.
#[derive(Debug, Clone)]
pub struct QuizConfig {
    /// Questions asked before the game ends.
    pub total_questions: u32,
    /// Points for an exactly matching answer.
    pub points_per_correct: u32,
    /// Pause between a question closing and the next one opening.
    pub advance_delay: Duration,
    /// Don't ask the same question twice in one game (until the bank is
    /// exhausted).
    pub avoid_repeats: bool,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            total_questions: 10,
            points_per_correct: 10,
            advance_delay: Duration::from_secs(3),
            avoid_repeats: false,
        }
    }
}

impl QuizConfig {
    /// A default config that asks `total_questions` questions.
    pub fn with_questions(total_questions: u32) -> Self {
        Self {
            total_questions,
            ..Default::default()
        }
    }

    /// Fixes values the engine can't run with.
    pub fn validated(mut self) -> Self {
        if self.total_questions == 0 {
            tracing::warn!("total_questions must be at least 1, using 1");
            self.total_questions = 1;
        }
        self
    }
}
