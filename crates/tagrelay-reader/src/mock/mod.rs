//! Mock hardware for testing and development.
//!
//! These types drive a [`ReaderSessionController`](crate::ReaderSessionController)
//! programmatically, without a physical reader.

pub mod memory;
pub mod reader;

pub use memory::MockTagMemory;
pub use reader::MockReader;
