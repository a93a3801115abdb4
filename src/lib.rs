//! This crate implements the ESP packet engine of the FIOT secure channel
//! protocol: an authenticated record layer over the Russian-standard block
//! ciphers Magma and Kuznechik in MGM mode, with per-packet message keys
//! derived from a 32-byte root key through the three-level ESPTREE key tree.
//!
//! The crate covers the transport core only: packet framing, directional
//! counters, anti-replay, key derivation, and AEAD invocation. Key agreement,
//! sockets, and key storage live outside; a caller hands each direction a
//! root key and a salt and then moves opaque datagrams.
//!
//! # Example
//!
//! ```
//! # fn main() -> Result<(), fiot_esp::EspError> {
//! use fiot_esp::{Direction, EspContext, Transform};
//!
//! let root_key = [0x42u8; 32];
//! let salt = [0x07u8; 12];
//!
//! let mut sender = EspContext::new();
//! sender.set_transform(Transform::KuznechikMgmKtree);
//! sender.set_spi(0x0102_0304)?;
//! sender.set_root_key(&root_key, Direction::Outbound)?;
//! sender.set_salt(&salt, Direction::Outbound)?;
//!
//! let mut receiver = EspContext::new();
//! receiver.set_transform(Transform::KuznechikMgmKtree);
//! receiver.set_spi(0x0102_0304)?;
//! receiver.set_root_key(&root_key, Direction::Inbound)?;
//! receiver.set_salt(&salt, Direction::Inbound)?;
//!
//! let mut packet = [0u8; 128];
//! let n = sender.write_packet(b"pump the brakes", 0x11, &mut packet)?;
//!
//! let mut payload = [0u8; 128];
//! let (len, next_header) = receiver.read_packet(&mut packet[..n], &mut payload)?;
//! assert_eq!(&payload[..len], b"pump the brakes");
//! assert_eq!(next_header, 0x11);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;
#[cfg(any(feature = "std", test))]
extern crate std;

mod aead;
mod context;
mod counter;
mod kdf;
mod packet;
#[cfg(test)]
mod test_util;
mod window;

pub use crate::aead::Transform;
pub use crate::context::{Direction, EspContext};
pub use crate::counter::EspIv;
pub use crate::packet::{HEADER_LEN, IV_LEN, MAX_PAYLOAD_LEN};

/// The error type for all ESP operations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EspError {
    /// An argument was out of range: a reserved SPI, a TFC target outside
    /// `256..=65535` or smaller than the payload, a sequence number the
    /// anti-replay window refuses, or a buffer too small for the operation
    InvalidValue,
    /// The operation needs a transform and none is installed
    UndefinedTransform,
    /// The payload was empty or longer than 65535 bytes
    ZeroLength,
    /// The directional counter is exhausted; install a fresh root key for
    /// this direction before sending again
    LowKeyResource,
    /// The ICV did not match the received packet
    IntegrityFailure,
    /// The underlying AEAD failed
    Encryption,
}

impl core::fmt::Display for EspError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let kind = match self {
            EspError::InvalidValue => "argument or sequence number out of range",
            EspError::UndefinedTransform => "no transform installed",
            EspError::ZeroLength => "payload length not in 1..=65535",
            EspError::LowKeyResource => "directional counter exhausted; rotate the root key",
            EspError::IntegrityFailure => "packet failed integrity verification",
            EspError::Encryption => "AEAD operation failed",
        };
        f.write_str(kind)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EspError {}
