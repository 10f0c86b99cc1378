//! County intake: a multi-turn, language-branching registration flow.

pub mod channels;
pub mod config;
pub mod error;
pub mod intake;
pub mod reference;
pub mod store;
