//! Shared test utilities for storyteller integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs against temp directories and an
//!   in-memory database
//! - Scripted generator and speech doubles implementing the public traits
//! - Builders for submission forms

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{ScriptedGenerator, TestHarness, ToneSpeech};
