pub mod replayer;

pub use replayer::{ReplayOutcome, ReplaySource, Replayer};
