//! `CardDetector`: the external collaborator boundary for anti-collision
//! and card-type heuristics (§1 "deliberately out of scope"). This crate
//! only defines the trait its `CardManager` drives against; the reader's
//! own anti-collision loop implements it.

use crate::card::info::CardInfo;
use crate::error::Result;

/// Detects whatever card (if any) is currently in the reader's field.
pub trait CardDetector {
    /// Run anti-collision/RATS and report what is present, or
    /// `CardManagerErrorKind::NoCardPresent`/`MultipleCards` if detection
    /// did not settle on exactly one card.
    fn detect(&mut self) -> Result<CardInfo>;
}
