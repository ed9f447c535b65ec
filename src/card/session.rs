//! `CardSession`: one `DesfireContext` plus a card-specific handle,
//! exclusively owned for the session's lifetime (§3, §5).

use crate::card::info::{CardInfo, CardType};
use crate::context::DesfireContext;
use crate::desfire_card::DesfireCard;
use crate::error::{CardManagerErrorKind, Result};
use crate::transceiver::ApduTransceiver;

/// Marker for a MIFARE Classic card. Recognized by `CardDetector` but not
/// driven by this crate (§1 Non-goals: "sibling card types are stubs").
pub struct MifareClassicCard;

/// Marker for a MIFARE Ultralight card. Same status as `MifareClassicCard`.
pub struct UltralightCard;

/// The card-specific handle a `CardSession` carries. Only `Desfire` is
/// backed by a working command engine.
pub enum CardHandle<'a, T: ApduTransceiver> {
    Desfire(DesfireCard<'a, T>),
    MifareClassic(MifareClassicCard),
    Ultralight(UltralightCard),
    Unsupported(CardType),
}

/// One session against one detected card: its identity, its DESFire
/// context (if applicable), and its handle. `CardManager::create_session`
/// is the only constructor.
pub struct CardSession<'a, T: ApduTransceiver> {
    info: CardInfo,
    context: DesfireContext,
    handle: CardHandle<'a, T>,
}

impl<'a, T: ApduTransceiver> CardSession<'a, T> {
    pub(crate) fn new(info: CardInfo, context: DesfireContext, handle: CardHandle<'a, T>) -> Self {
        CardSession { info, context, handle }
    }

    pub fn info(&self) -> &CardInfo {
        &self.info
    }

    pub fn context(&self) -> &DesfireContext {
        &self.context
    }

    pub fn handle(&self) -> &CardHandle<'a, T> {
        &self.handle
    }

    /// Borrow the DESFire command façade and its context together, for
    /// driving a command: `session.desfire()?.authenticate(ctx, options)`.
    pub fn desfire(&mut self) -> Result<(&mut DesfireCard<'a, T>, &mut DesfireContext)> {
        match &mut self.handle {
            CardHandle::Desfire(card) => Ok((card, &mut self.context)),
            CardHandle::MifareClassic(_) | CardHandle::Ultralight(_) | CardHandle::Unsupported(_) => {
                fail!(
                    CardManagerErrorKind::UnsupportedCardType,
                    "session does not hold a DESFire handle"
                );
            }
        }
    }
}
