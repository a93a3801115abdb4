//! KDF256 and the ESPTREE key tree.
//!
//! KDF256 is the KDF_GOSTR3411_2012_256 construction from R 50.1.113-2016:
//! a single HMAC-Streebog-256 invocation over
//! `0x01 ‖ label ‖ 0x00 ‖ seed ‖ 0x01 0x00`. ESPTREE chains three KDF256
//! calls keyed on the directional counter components, yielding the 32-byte
//! per-packet message key.

use crate::counter::EspIv;

use byteorder::{BigEndian, ByteOrder};
use hmac::{Hmac, Mac, NewMac};
use streebog::Streebog256;
use zeroize::Zeroize;

type HmacStreebog256 = Hmac<Streebog256>;

/// Derives 32 bytes from `key` under the given label and seed
pub(crate) fn kdf256(key: &[u8; 32], label: &[u8], seed: &[u8]) -> [u8; 32] {
    // HMAC can take keys of any size, so this never fails
    let mut mac = HmacStreebog256::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(&[0x01]);
    mac.update(label);
    mac.update(&[0x00]);
    mac.update(seed);
    // R 50.1.113 fixes the output length field at 256 bits
    mac.update(&[0x01, 0x00]);

    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Computes `ESPTREE(root_key, i1, i2, i3)`: the message key for the packet
/// the counter currently points at.
///
/// Each level index is serialized as 2 bytes big-endian (`i1` is widened
/// from its single counter byte). The result must be rederived for every
/// packet; it is only valid until the counter moves.
pub(crate) fn esptree(root_key: &[u8; 32], iv: &EspIv) -> [u8; 32] {
    let mut index = [0u8; 2];

    BigEndian::write_u16(&mut index, iv.i1());
    let mut level1 = kdf256(root_key, b"level1", &index);

    BigEndian::write_u16(&mut index, iv.i2());
    let mut level2 = kdf256(&level1, b"level2", &index);

    BigEndian::write_u16(&mut index, iv.i3());
    let message_key = kdf256(&level2, b"level3", &index);

    level1.zeroize();
    level2.zeroize();
    message_key
}

#[cfg(test)]
mod test {
    use super::{esptree, kdf256};
    use crate::counter::EspIv;

    #[test]
    fn kdf256_is_deterministic() {
        let key = [0x5a; 32];
        assert_eq!(
            kdf256(&key, b"level1", &[0, 1]),
            kdf256(&key, b"level1", &[0, 1])
        );
    }

    #[test]
    fn kdf256_separates_labels_and_seeds() {
        let key = [0x5a; 32];
        let base = kdf256(&key, b"level1", &[0, 1]);
        assert_ne!(base, kdf256(&key, b"level2", &[0, 1]));
        assert_ne!(base, kdf256(&key, b"level1", &[0, 2]));
        assert_ne!(base, kdf256(&[0x5b; 32], b"level1", &[0, 1]));
    }

    #[test]
    fn esptree_depends_on_every_level_index() {
        let root = [0x11; 32];
        let iv = EspIv::default();
        let base = esptree(&root, &iv);

        let mut other = iv;
        other.i1 = 1;
        assert_ne!(base, esptree(&root, &other));

        let mut other = iv;
        other.i2 = 1;
        assert_ne!(base, esptree(&root, &other));

        let mut other = iv;
        other.i3 = 1;
        assert_ne!(base, esptree(&root, &other));
    }

    #[test]
    fn esptree_ignores_pnum() {
        // pnum only feeds the nonce; packets inside one key-tree leaf share
        // the message key
        let root = [0x11; 32];
        let mut iv = EspIv::default();
        let base = esptree(&root, &iv);
        iv.pnum = [0, 0, 5];
        assert_eq!(base, esptree(&root, &iv));
    }
}
