//! 공통 유틸리티 모듈

pub mod task;

pub use task::{spawn_supervised, TaskOutcome};
