//! **desfire**: a host-side command engine for NXP MIFARE DESFire
//! contactless smart cards.
//!
//! This crate speaks the DESFire command protocol over whatever transport
//! a reader driver provides — it knows nothing about PN532/RC522 wire
//! formats or USB/serial framing, only about [`ApduTransceiver`], the
//! single boundary trait a reader adapter implements.
//!
//! # Getting started
//!
//! The following documentation describes the most important parts of this
//! crate's API:
//!
//! * [desfire::CardManager]: detects a card and opens a [desfire::CardSession].
//! * [desfire::DesfireCard]: the command façade for an authenticated or
//!   unauthenticated DESFire dialogue.
//!
//! # Example
//!
//! ```no_build
//! extern crate desfire;
//! use desfire::{CardManager, WireKind};
//!
//! // `transceiver` and `detector` are supplied by a reader driver.
//! let mut manager = CardManager::new(transceiver, detector, WireKind::Native);
//! let mut session = manager.create_session().unwrap();
//! let (card, ctx) = session.desfire().unwrap();
//! let version = card.get_version(ctx).unwrap();
//! println!("{:?}", version);
//! ```

#![crate_name = "desfire"]
#![crate_type = "rlib"]
#![deny(unsafe_code, unused_import_braces, unused_qualifications)]

extern crate aes;
extern crate bitflags;
extern crate block_modes;
extern crate byteorder;
extern crate cmac;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate log;
extern crate des;
extern crate rand;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate subtle;
extern crate zeroize;

/// Error types shared by every layer of the command engine.
#[macro_use]
pub mod error;

/// Access-rights nibble packing and key-settings bit layouts.
pub mod access;

/// Card identity, detection boundary, and the session/manager layer.
pub mod card;

/// Commands supported by the card.
///
/// Each submodule implements [`command::DesfireCommand`] for one native
/// command, reimported at the crate root as `desfire::command::*`.
pub mod command;

/// The session of record for one card dialogue: auth state, session keys,
/// running IV, selected application.
pub mod context;

/// Cryptographic primitives (block ciphers, CMAC, CRC, session-key
/// derivation, randomness) underlying secure messaging.
pub mod crypto;

/// The DESFire command façade: drives a command's state machine to
/// completion over a transceiver and wire.
pub mod desfire_card;

/// In-process card simulator used by the test suite to drive command state
/// machines end-to-end without real reader hardware.
#[cfg(feature = "mock")]
pub mod mock;

/// The native command PDU a command's `build_request` produces.
pub mod request;

/// The parsed native response a command's `parse_response` consumes.
pub mod result;

/// Secure messaging: CMAC/CBC IV chaining, payload encryption and
/// verification, built on top of `crypto`.
pub mod secure_messaging;

/// The boundary trait between this crate and a reader driver.
pub mod transceiver;

/// Wire framing: native PDU vs. ISO 7816-4 APDU.
pub mod wire;

pub use access::{AccessRight, AccessRights, KeyFamily, KeySettings2};
pub use card::{CardDetector, CardHandle, CardInfo, CardManager, CardSession, CardType, MifareClassicCard, ReaderCapabilities, UltralightCard, WireKind};
pub use context::{AuthScheme, CommMode, DesfireContext, SessionCipher};
pub use desfire_card::DesfireCard;
pub use error::{DesfireError, DesfireErrorKind, Result};
pub use request::DesfireRequest;
pub use result::DesfireResult;
pub use transceiver::{ApduResponse, ApduTransceiver};
pub use wire::{IsoWire, NativeWire, Wire};
