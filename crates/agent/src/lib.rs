//! The Brook agent loop and its satellites.
//!
//! - [`AgentLoop`] — the model-call/tool-call alternation that drives one
//!   assistant response, in batch or streaming form
//! - [`AgentEvent`] — the events the streaming loop surfaces as they occur
//! - [`TitleSummarizer`] — derives a short conversation label from the
//!   user's first few messages
//! - [`testing`] — scripted providers and stub tools shared by the test
//!   suites of this crate and the gateway

pub mod loop_runner;
pub mod stream_event;
pub mod testing;
pub mod title;

pub use loop_runner::AgentLoop;
pub use stream_event::AgentEvent;
pub use title::{PLACEHOLDER_TITLE, TitleSummarizer};
