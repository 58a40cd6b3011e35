//! Rules for the daily verse pick.
//!
//! The daily rotator draws a random verse and rejects fragments that
//! start mid-sentence or are the Bismillah placeholder (verse `0`). An
//! accepted verse is then extended with following verses until it reads
//! as a complete sentence, bounded by [`ContinuationPolicy::max_steps`].
//!
//! Randomness goes through the [`Picker`] trait so tests can script the
//! sequence of draws.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Source of index draws for the rotator.
pub trait Picker: Send + Sync {
    /// Return an index in `0..len`. `len` is never zero.
    fn pick(&self, len: usize) -> usize;
}

/// Picker backed by the random bits of UUID v4 values.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidPicker;

impl Picker for UuidPicker {
    fn pick(&self, len: usize) -> usize {
        (uuid::Uuid::new_v4().as_u128() % len as u128) as usize
    }
}

/// Picker that replays a fixed script of indices.
///
/// Each value is reduced modulo `len`. Once the script runs out every
/// draw returns `0`.
#[derive(Debug, Default)]
pub struct SequencePicker {
    script: Mutex<VecDeque<usize>>,
}

impl SequencePicker {
    pub fn new(script: impl IntoIterator<Item = usize>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
        }
    }

    /// Number of scripted draws not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Picker for SequencePicker {
    fn pick(&self, len: usize) -> usize {
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(0);
        next % len.max(1)
    }
}

/// Why a drawn verse was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Verse number `0`, the inserted Bismillah.
    Placeholder,
    /// Text does not start with an uppercase letter.
    MidSentence,
}

/// Check a drawn verse. `Ok(())` means it may be published.
pub fn validate_verse(number: u32, text: &str) -> Result<(), Rejection> {
    if number == 0 {
        return Err(Rejection::Placeholder);
    }
    match text.trim_start().chars().next() {
        Some(c) if c.is_uppercase() => Ok(()),
        _ => Err(Rejection::MidSentence),
    }
}

/// How far a verse may be extended with the verses that follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuationPolicy {
    pub max_steps: usize,
}

impl Default for ContinuationPolicy {
    fn default() -> Self {
        Self { max_steps: 10 }
    }
}

impl ContinuationPolicy {
    /// Extend `first` with `following` texts until it ends a sentence.
    ///
    /// A following verse is joined with a space when the text so far ends
    /// in a letter, comma, dash or semicolon, and with a blank line
    /// otherwise. Returns the combined text and how many verses were
    /// appended.
    pub fn extend<'a, I>(&self, first: &str, following: I) -> (String, usize)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut text = first.trim_end().to_string();
        let mut steps = 0;
        for next in following {
            if steps >= self.max_steps || ends_sentence(&text) {
                break;
            }
            match text.chars().last() {
                Some(c) if c.is_alphabetic() || matches!(c, ',' | '-' | ';') => text.push(' '),
                _ => text.push_str("\n\n"),
            }
            text.push_str(next.trim());
            steps += 1;
        }
        (text, steps)
    }
}

/// True when `text` ends with `.`, `!` or `"`.
pub fn ends_sentence(text: &str) -> bool {
    matches!(text.trim_end().chars().last(), Some('.' | '!' | '"'))
}
