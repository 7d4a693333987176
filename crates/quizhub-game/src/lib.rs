//! Quiz game engine for Quizhub.
//!
//! [`GameEngine`] keeps one game per room. It plugs into the room hub
//! as its [`MessageProcessor`](quizhub_room::MessageProcessor), receiving
//! client `answer` frames, and talks back through a
//! [`HubHandle`](quizhub_room::HubHandle).
//!
//! Questions come from a [`QuestionBank`]; the rules (question count,
//! points, pacing) from [`QuizConfig`].

mod config;
mod engine;
mod error;
mod question;

pub use config::QuizConfig;
pub use engine::{GameEngine, GameSnapshot, rank_results};
pub use error::GameError;
pub use question::{Question, QuestionBank};
