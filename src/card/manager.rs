//! `CardManager`: owns the transceiver, the card detector, the reader's
//! capabilities, and the active wire variant; hands out at most one
//! [`CardSession`](super::CardSession) at a time (§4.9, §5 exclusive
//! ownership).

use crate::card::info::{CardInfo, CardType};
use crate::card::session::{CardHandle, CardSession};
use crate::card::CardDetector;
use crate::context::DesfireContext;
use crate::desfire_card::DesfireCard;
use crate::error::{CardManagerErrorKind, Result};
use crate::transceiver::ApduTransceiver;
use crate::wire::{IsoWire, NativeWire, Wire};

/// Static properties of the attached reader. Constructor-supplied, never
/// parsed from a config file — the teacher has no on-disk config format
/// either (connection parameters are constructor arguments throughout).
#[derive(Copy, Clone, Debug)]
pub struct ReaderCapabilities {
    /// Largest APDU the reader will forward in one `transceive` call.
    pub max_apdu_size: usize,
    /// Default `ReadData`/`WriteData` chunk size (§4.8.4), capped at 240.
    pub default_chunk_size: usize,
    /// Hint for how long a single `transceive` may block before the
    /// caller should treat it as `Hardware::Timeout`.
    pub io_timeout_ms: u32,
}

impl Default for ReaderCapabilities {
    fn default() -> Self {
        ReaderCapabilities {
            max_apdu_size: 261,
            default_chunk_size: 240,
            io_timeout_ms: 1000,
        }
    }
}

/// Which `Wire` implementation frames outgoing PDUs (§4.4).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum WireKind {
    Native,
    Iso,
}

fn wire_for(kind: WireKind) -> Box<dyn Wire> {
    match kind {
        WireKind::Native => Box::new(NativeWire),
        WireKind::Iso => Box::new(IsoWire),
    }
}

/// Owns the transceiver and detector exclusively; `create_session` is the
/// only way to get at a [`DesfireCard`], and only one session may exist at
/// a time (enforced by `&mut self` borrowing the transceiver for the
/// session's lifetime).
pub struct CardManager<T, D> {
    transceiver: T,
    detector: D,
    capabilities: ReaderCapabilities,
    wire: Box<dyn Wire>,
    last_detected: Option<CardInfo>,
}

impl<T, D> CardManager<T, D>
where
    T: ApduTransceiver,
    D: CardDetector,
{
    /// A manager over `transceiver`/`detector`, framing with `wire_kind`.
    pub fn new(transceiver: T, detector: D, capabilities: ReaderCapabilities, wire_kind: WireKind) -> Self {
        CardManager {
            transceiver,
            detector,
            capabilities,
            wire: wire_for(wire_kind),
            last_detected: None,
        }
    }

    pub fn capabilities(&self) -> &ReaderCapabilities {
        &self.capabilities
    }

    /// Re-select which `Wire` variant frames subsequent sessions.
    pub fn set_wire_kind(&mut self, wire_kind: WireKind) {
        self.wire = wire_for(wire_kind);
    }

    /// Runs the detector and memoizes the result, deducing `CardType` along
    /// the way. Returns the same cached `CardInfo` on repeat calls until
    /// [`CardManager::forget_card`] is called.
    pub fn detect_card(&mut self) -> Result<&CardInfo> {
        if self.last_detected.is_none() {
            let info = self.detector.detect()?;
            self.last_detected = Some(info);
        }
        Ok(self.last_detected.as_ref().expect("just populated"))
    }

    /// Drop the memoized detection result, e.g. after a reader timeout.
    pub fn forget_card(&mut self) {
        self.last_detected = None;
    }

    /// Lazily detects the card (if not already memoized) and constructs a
    /// `CardSession` with a fresh `DesfireContext`. Non-DESFire card types
    /// are recognized but not driven by this crate (§1 Non-goals): the
    /// session is still returned, holding a `CardHandle::Unsupported`.
    pub fn create_session(&mut self) -> Result<CardSession<T>> {
        let info = self.detect_card()?.clone();
        let context = DesfireContext::new();
        let handle = match info.card_type() {
            CardType::MifareDesfire => {
                CardHandle::Desfire(DesfireCard::new(&mut self.transceiver, self.wire.as_ref()))
            }
            other => CardHandle::Unsupported(other),
        };
        Ok(CardSession::new(info, context, handle))
    }
}

/// Surfaces `UnsupportedCardType` for callers that need a hard failure
/// rather than a session holding a stub handle (e.g. scripts that only
/// ever want to talk to a DESFire card).
pub fn require_desfire(card_type: CardType) -> Result<()> {
    ensure!(
        card_type == CardType::MifareDesfire,
        CardManagerErrorKind::UnsupportedCardType,
        "card type {:?} is not a DESFire card",
        card_type
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::info::CardInfo;

    struct StubDetector(CardInfo);
    impl CardDetector for StubDetector {
        fn detect(&mut self) -> Result<CardInfo> {
            Ok(self.0.clone())
        }
    }

    struct StubTransceiver;
    impl ApduTransceiver for StubTransceiver {
        fn transceive(&mut self, _apdu: &[u8]) -> Result<crate::transceiver::ApduResponse> {
            Ok(crate::transceiver::ApduResponse { data: Vec::new(), sw1: 0x90, sw2: 0x00 })
        }
    }

    #[test]
    fn detect_card_memoizes_across_calls() {
        let info = CardInfo::new(vec![1, 2, 3, 4], 0x0344, 0x20, Vec::new(), CardType::MifareDesfire);
        let mut manager = CardManager::new(StubTransceiver, StubDetector(info), ReaderCapabilities::default(), WireKind::Iso);
        let first = manager.detect_card().unwrap().uid().to_vec();
        let second = manager.detect_card().unwrap().uid().to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn create_session_yields_unsupported_handle_for_non_desfire_cards() {
        let info = CardInfo::new(vec![1, 2, 3, 4], 0x0044, 0x08, Vec::new(), CardType::MifareClassic);
        let mut manager = CardManager::new(StubTransceiver, StubDetector(info), ReaderCapabilities::default(), WireKind::Iso);
        let session = manager.create_session().unwrap();
        assert!(matches!(session.handle(), CardHandle::Unsupported(CardType::MifareClassic)));
    }
}
