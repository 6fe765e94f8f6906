//! Reader side of the tag relay.
//!
//! This crate turns hardware events into card notifications:
//!
//! - [`RawTag`] is what the hardware reports when a card enters the field.
//! - [`CardDecoder`] converts a raw tag into a [`CardRecord`](tagrelay_core::CardRecord).
//! - [`ReaderSession`] tracks hardware availability and the scan session.
//! - [`ReaderSessionController`] owns the session inside one task and emits
//!   [`ReaderNotification`]s.
//!
//! Hardware sources feed the controller through a [`ReaderHandle`]. The
//! [`mock`] module provides a programmable reader; the `pcsc` feature adds a
//! PC/SC backend.
//!
//! # Error Handling
//!
//! Hardware failures are reported as [`HardwareError`]. A tag that cannot be
//! decoded yields a [`DecodeError`], which the controller logs and absorbs:
//! no notification is emitted for it.

pub mod controller;
pub mod decoder;
pub mod error;
pub mod mock;
#[cfg(feature = "pcsc")]
pub mod pcsc;
pub mod session;
pub mod tag;

pub use controller::{
    ReaderCommand, ReaderConfig, ReaderHandle, ReaderSessionController, ReaderSnapshot,
};
pub use decoder::{CardDecoder, FelicaMode, WELL_KNOWN_KEYS};
pub use error::{DecodeError, HardwareError, Result};
pub use session::{ReaderNotification, ReaderSession, StateTransition};
pub use tag::{KeyKind, MifareKey, RawTag, TagMemory, Technology};
