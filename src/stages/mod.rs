//! The seven pipeline stages, in execution order.

pub mod applier;
pub mod brancher;
pub mod drafter;
pub mod finder;
pub mod opener;
pub mod publisher;
pub mod recorder;
