//! The quiz engine: per-room game state and the rules that move it.
//!
//! A room's game goes
//!
//! ```text
//! start_game ─► question open ─(first answer)─► scoring ─(delay)─► question open …
//!                                                        └─(last question)─► game_over
//! ```
//!
//! All rooms share one [`tokio::sync::Mutex`]. Every operation computes
//! its outgoing message while holding it, releases it, and only then
//! hands the message to the hub. Hub sends never block, so neither side
//! can wait on the other.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use quizhub_protocol::{
    ClientMessage, PlayerResult, RoomId, RoutedMessage, Scoreboard, ServerMessage, UserId,
};
use quizhub_room::{HubHandle, MessageProcessor};
use tokio::sync::Mutex;

use crate::{GameError, QuestionBank, QuizConfig};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct GameState {
    /// Distinguishes this game from an earlier one in the same room, so
    /// a deferred advance scheduled by a replaced game does nothing.
    generation: u64,
    /// Index into the bank.
    current: Option<usize>,
    scores: Scoreboard,
    answered: HashSet<UserId>,
    question_number: u32,
    question_active: bool,
    used: HashSet<String>,
}

impl GameState {
    fn new(generation: u64, scores: Scoreboard) -> Self {
        Self {
            generation,
            current: None,
            scores,
            answered: HashSet::new(),
            question_number: 0,
            question_active: false,
            used: HashSet::new(),
        }
    }
}

/// Read-only view of a room's game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSnapshot {
    pub question_number: u32,
    pub question_active: bool,
    /// Id of the question being (or last) asked.
    pub question_id: Option<String>,
    pub scores: Scoreboard,
}

// ---------------------------------------------------------------------------
// GameEngine
// ---------------------------------------------------------------------------

struct Inner {
    config: QuizConfig,
    bank: QuestionBank,
    hub: HubHandle,
    games: Mutex<HashMap<RoomId, GameState>>,
    next_generation: AtomicU64,
}

/// Runs quiz games for every room. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct GameEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for GameEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameEngine")
            .field("config", &self.inner.config)
            .field("questions", &self.inner.bank.len())
            .finish_non_exhaustive()
    }
}

impl GameEngine {
    pub fn new(config: QuizConfig, bank: QuestionBank, hub: HubHandle) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: config.validated(),
                bank,
                hub,
                games: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &QuizConfig {
        &self.inner.config
    }

    /// Starts (or restarts) the game in `room_id` and opens question 1.
    ///
    /// Every user currently connected to the room starts on 0 points.
    /// Returns how many players were seeded.
    pub async fn start_game(&self, room_id: RoomId) -> Result<usize, GameError> {
        // Membership is read before the engine lock is taken.
        let scores: Scoreboard = self
            .inner
            .hub
            .members(&room_id)
            .await
            .into_iter()
            .map(|user| (user, 0))
            .collect();
        let players = scores.len();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);

        let message = {
            let mut games = self.inner.games.lock().await;
            if games.insert(room_id.clone(), GameState::new(generation, scores)).is_some() {
                tracing::info!(%room_id, "replacing game in progress");
            }
            self.advance(&mut games, &room_id)
        };
        tracing::info!(%room_id, players, "game started");

        if let Some(message) = message {
            self.inner.hub.broadcast(RoutedMessage::new(room_id, message))?;
        }
        Ok(players)
    }

    /// Opens the next question, or ends the game after the last one.
    /// Does nothing if the room has no game.
    pub async fn next_question(&self, room_id: &RoomId) {
        let message = {
            let mut games = self.inner.games.lock().await;
            self.advance(&mut games, room_id)
        };
        if let Some(message) = message {
            self.send(room_id, message);
        }
    }

    /// Scores `user_id`'s answer to the open question.
    ///
    /// The first answer closes the question for everyone; the next one
    /// opens after the configured delay. Returns `false` (and does
    /// nothing) if there is no game, no open question, or the user
    /// already answered.
    pub async fn process_answer(&self, room_id: &RoomId, user_id: &UserId, answer: &str) -> bool {
        let (message, generation, question_number) = {
            let mut games = self.inner.games.lock().await;
            let Some(state) = games.get_mut(room_id) else {
                tracing::debug!(%room_id, %user_id, "answer for room with no game");
                return false;
            };
            if !state.question_active || state.answered.contains(user_id) {
                tracing::debug!(%room_id, %user_id, "answer outside the question window");
                return false;
            }
            let Some(question) = state.current.and_then(|i| self.inner.bank.get(i)) else {
                return false;
            };

            state.answered.insert(user_id.clone());
            let is_correct = answer == question.answer;
            let score = state.scores.entry(user_id.clone()).or_insert(0);
            if is_correct {
                *score += self.inner.config.points_per_correct;
            }
            state.question_active = false;

            tracing::debug!(
                %room_id,
                %user_id,
                question = state.question_number,
                is_correct,
                "answer scored"
            );
            let message = ServerMessage::AnswerResult {
                user_id: user_id.clone(),
                is_correct,
                correct_answer: question.answer.clone(),
                scores: state.scores.clone(),
            };
            (message, state.generation, state.question_number)
        };

        self.send(room_id, message);
        self.schedule_advance(room_id.clone(), generation, question_number);
        true
    }

    /// Ends the game in `room_id`: broadcasts the ranking and discards
    /// the state. Returns `false` if there was no game.
    pub async fn end_game(&self, room_id: &RoomId) -> bool {
        let state = self.inner.games.lock().await.remove(room_id);
        let Some(state) = state else {
            return false;
        };
        let results = rank_results(&state.scores);
        tracing::info!(%room_id, players = results.len(), "game over");
        self.send(room_id, ServerMessage::GameOver(results));
        true
    }

    /// Returns `true` if `room_id` has a game in progress.
    pub async fn is_active(&self, room_id: &RoomId) -> bool {
        self.inner.games.lock().await.contains_key(room_id)
    }

    /// Current state of `room_id`'s game, if any.
    pub async fn snapshot(&self, room_id: &RoomId) -> Option<GameSnapshot> {
        let games = self.inner.games.lock().await;
        let state = games.get(room_id)?;
        Some(GameSnapshot {
            question_number: state.question_number,
            question_active: state.question_active,
            question_id: state
                .current
                .and_then(|i| self.inner.bank.get(i))
                .map(|q| q.id.clone()),
            scores: state.scores.clone(),
        })
    }

    /// Moves a game one step forward under the lock. Returns the message
    /// to broadcast once the lock is released.
    fn advance(
        &self,
        games: &mut HashMap<RoomId, GameState>,
        room_id: &RoomId,
    ) -> Option<ServerMessage> {
        let state = games.get_mut(room_id)?;

        if state.question_number >= self.inner.config.total_questions {
            let state = games.remove(room_id)?;
            let results = rank_results(&state.scores);
            tracing::info!(%room_id, players = results.len(), "game over");
            return Some(ServerMessage::GameOver(results));
        }

        let bank = &self.inner.bank;
        let index = if self.inner.config.avoid_repeats {
            bank.pick_excluding(&state.used)
        } else {
            bank.pick()
        };
        let question = bank.get(index)?;

        state.question_number += 1;
        state.current = Some(index);
        state.used.insert(question.id.clone());
        state.answered.clear();
        state.question_active = true;

        tracing::debug!(
            %room_id,
            question_number = state.question_number,
            question_id = %question.id,
            "question opened"
        );
        Some(ServerMessage::QuestionStart {
            question_number: state.question_number,
            question: question.statement.clone(),
            choices: question.choices.clone(),
        })
    }

    /// Opens the next question after the advance delay, unless the game
    /// has been replaced or has moved on by then.
    fn schedule_advance(&self, room_id: RoomId, generation: u64, question_number: u32) {
        let engine = self.clone();
        let delay = self.inner.config.advance_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let message = {
                let mut games = engine.inner.games.lock().await;
                let current = games.get(&room_id).is_some_and(|s| {
                    s.generation == generation
                        && s.question_number == question_number
                        && !s.question_active
                });
                if !current {
                    tracing::debug!(%room_id, "stale advance skipped");
                    return;
                }
                engine.advance(&mut games, &room_id)
            };
            if let Some(message) = message {
                engine.send(&room_id, message);
            }
        });
    }

    fn send(&self, room_id: &RoomId, message: ServerMessage) {
        let kind = message.kind();
        if let Err(e) = self
            .inner
            .hub
            .broadcast(RoutedMessage::new(room_id.clone(), message))
        {
            tracing::error!(%room_id, kind, error = %e, "failed to hand message to hub");
        }
    }
}

impl MessageProcessor for GameEngine {
    async fn process_message(&self, room_id: RoomId, user_id: UserId, data: Vec<u8>) {
        match ClientMessage::decode(&data) {
            Ok(ClientMessage::Answer { answer }) => {
                self.process_answer(&room_id, &user_id, &answer).await;
            }
            Err(e) => {
                tracing::warn!(%room_id, %user_id, error = %e, "dropping client message");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Ranks a scoreboard, best first.
///
/// Equal scores share a rank and the next distinct score skips ahead to
/// its position: `[30, 30, 10]` ranks `[1, 1, 3]`. Ties are listed in
/// user id order.
pub fn rank_results(scores: &Scoreboard) -> Vec<PlayerResult> {
    let mut sorted: Vec<(&UserId, u32)> = scores.iter().map(|(u, s)| (u, *s)).collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut results: Vec<PlayerResult> = Vec::with_capacity(sorted.len());
    for (position, (user_id, score)) in sorted.into_iter().enumerate() {
        let rank = match results.last() {
            Some(prev) if prev.score == score => prev.rank,
            _ => position as u32 + 1,
        };
        results.push(PlayerResult {
            user_id: user_id.clone(),
            score,
            rank,
        });
    }
    results
}
