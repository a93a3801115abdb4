use crate::EspError;

use byteorder::{BigEndian, ByteOrder};

/// The structured 8-byte directional counter carried in every packet.
///
/// `pnum` is the per-message component that feeds the AEAD nonce; `(i1, i2,
/// i3)` index the three levels of the key tree. The counter serializes as
/// `i1 ‖ i2 ‖ i3 ‖ pnum`, all big-endian, and increments with a carry chain
/// from `pnum` up through `i1`. Overflowing `i1` means the root key has no
/// fresh derivations left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EspIv {
    pub(crate) i1: u8,
    pub(crate) i2: u16,
    pub(crate) i3: u16,
    pub(crate) pnum: [u8; 3],
}

impl EspIv {
    /// The serialized size in bytes
    pub const SIZE: usize = 8;

    /// Key-tree index of the first level, widened to the KDF seed width
    pub fn i1(&self) -> u16 {
        u16::from(self.i1)
    }

    /// Key-tree index of the second level
    pub fn i2(&self) -> u16 {
        self.i2
    }

    /// Key-tree index of the third level
    pub fn i3(&self) -> u16 {
        self.i3
    }

    /// The 3-byte per-message counter, big-endian as it appears on the wire
    pub fn pnum(&self) -> &[u8; 3] {
        &self.pnum
    }

    /// Zeroes every field
    pub(crate) fn reset(&mut self) {
        *self = EspIv::default();
    }

    /// Advances the counter by one message.
    ///
    /// `pnum` carries into `i3`, `i3` into `i2`, `i2` into `i1`. When `i1`
    /// itself wraps the counter reads all-zero and the call returns
    /// `Err(LowKeyResource)`: every derivation under the current root key
    /// has been spent.
    pub(crate) fn increment(&mut self) -> Result<(), EspError> {
        let mut pnum_overflow = true;
        for byte in self.pnum.iter_mut().rev() {
            *byte = byte.wrapping_add(1);
            if *byte != 0 {
                pnum_overflow = false;
                break;
            }
        }
        if pnum_overflow {
            self.i3 = self.i3.wrapping_add(1);
            if self.i3 == 0 {
                self.i2 = self.i2.wrapping_add(1);
                if self.i2 == 0 {
                    self.i1 = self.i1.wrapping_add(1);
                    if self.i1 == 0 {
                        return Err(EspError::LowKeyResource);
                    }
                }
            }
        }
        Ok(())
    }

    /// Serializes the counter into `buf[..8]`
    pub(crate) fn write_to(&self, buf: &mut [u8]) {
        buf[0] = self.i1;
        BigEndian::write_u16(&mut buf[1..3], self.i2);
        BigEndian::write_u16(&mut buf[3..5], self.i3);
        buf[5..8].copy_from_slice(&self.pnum);
    }

    /// Reads the counter back from `buf[..8]`
    pub(crate) fn read_from(&mut self, buf: &[u8]) {
        self.i1 = buf[0];
        self.i2 = BigEndian::read_u16(&buf[1..3]);
        self.i3 = BigEndian::read_u16(&buf[3..5]);
        self.pnum.copy_from_slice(&buf[5..8]);
    }
}
