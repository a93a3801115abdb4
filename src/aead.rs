//! Transform identifiers and MGM invocation.
//!
//! The block ciphers and the MGM mode itself are external: `Mgm<Kuznyechik>`
//! and `Mgm<Magma>` from the RustCrypto crates, driven through the `aead`
//! traits. This module binds them behind [`MgmSuite`], builds the packet
//! nonce, and handles the one place the trait API falls short of the wire
//! format: verifying a truncated ICV.

use crate::counter::EspIv;
use crate::EspError;

use alloc::vec;
use alloc::vec::Vec;

use aead::{AeadCore, AeadInPlace, NewAead};
use generic_array::{typenum::Unsigned, GenericArray};
use kuznyechik::Kuznyechik;
use magma::Magma;
use mgm::Mgm;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// An AEAD mode of the record layer.
///
/// The four transforms pair the two GOST R 34.12-2015 block ciphers with MGM
/// in either encrypt-and-authenticate or authenticate-only form. The
/// "no transform installed" state is `Option::<Transform>::None` on the
/// context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transform {
    /// Magma (64-bit block) MGM with encryption
    MagmaMgmKtree,
    /// Magma MGM, authentication only
    MagmaMgmMacKtree,
    /// Kuznechik (128-bit block) MGM with encryption
    KuznechikMgmKtree,
    /// Kuznechik MGM, authentication only
    KuznechikMgmMacKtree,
}

impl Transform {
    /// Whether this transform encrypts the payload section or only
    /// authenticates the packet
    pub fn encrypts(self) -> bool {
        match self {
            Transform::MagmaMgmKtree | Transform::KuznechikMgmKtree => true,
            Transform::MagmaMgmMacKtree | Transform::KuznechikMgmMacKtree => false,
        }
    }

    /// Per-direction salt size: 12 bytes for Kuznechik, 4 for Magma
    pub fn salt_len(self) -> usize {
        match self {
            Transform::KuznechikMgmKtree | Transform::KuznechikMgmMacKtree => 12,
            Transform::MagmaMgmKtree | Transform::MagmaMgmMacKtree => 4,
        }
    }

    /// Wire ICV size: 12 bytes for Kuznechik, 8 for Magma
    pub fn icv_len(self) -> usize {
        match self {
            Transform::KuznechikMgmKtree | Transform::KuznechikMgmMacKtree => 12,
            Transform::MagmaMgmKtree | Transform::MagmaMgmMacKtree => 8,
        }
    }

    /// The other member of the same cipher family: encrypting transforms map
    /// to their MAC-only sibling and back
    pub fn switched(self) -> Transform {
        match self {
            Transform::MagmaMgmKtree => Transform::MagmaMgmMacKtree,
            Transform::MagmaMgmMacKtree => Transform::MagmaMgmKtree,
            Transform::KuznechikMgmKtree => Transform::KuznechikMgmMacKtree,
            Transform::KuznechikMgmMacKtree => Transform::KuznechikMgmKtree,
        }
    }
}

/// One MGM cipher family as the record layer drives it
pub(crate) trait MgmSuite {
    /// The underlying AEAD implementation
    type AeadImpl: AeadInPlace + NewAead;

    /// Bytes of the MGM tag that go on the wire
    const ICV_LEN: usize;
}

/// Kuznechik: 128-bit block, 16-byte nonce, tag truncated to 12 bytes
pub(crate) struct KuznechikMgm;

impl MgmSuite for KuznechikMgm {
    type AeadImpl = Mgm<Kuznyechik>;

    const ICV_LEN: usize = 12;
}

/// Magma: 64-bit block, 8-byte nonce, full 8-byte tag
pub(crate) struct MagmaMgm;

impl MgmSuite for MagmaMgm {
    type AeadImpl = Mgm<Magma>;

    const ICV_LEN: usize = 8;
}

/// Builds the AEAD nonce `0x00 ‖ pnum ‖ salt` for the given counter state.
///
/// The result is 16 bytes with a Kuznechik-sized salt and 8 with a
/// Magma-sized one, exactly the MGM nonce widths of the two block sizes.
/// MGM requires the nonce's top bit clear; the leading zero byte guarantees
/// it.
pub(crate) fn build_nonce(iv: &EspIv, salt: &[u8]) -> Vec<u8> {
    let mut nonce = Vec::with_capacity(1 + iv.pnum().len() + salt.len());
    nonce.push(0);
    nonce.extend_from_slice(iv.pnum());
    nonce.extend_from_slice(salt);
    nonce
}

/// Encrypts (or, with `body = None`, only authenticates) under the packet's
/// message key and writes the truncated tag into `icv_out`.
///
/// `body` is encrypted in place; `aad` is authenticated but not encrypted.
pub(crate) fn encrypt_mgm(
    transform: Transform,
    key: &[u8; 32],
    nonce: &[u8],
    aad: &[u8],
    body: Option<&mut [u8]>,
    icv_out: &mut [u8],
) -> Result<(), EspError> {
    match transform {
        Transform::KuznechikMgmKtree | Transform::KuznechikMgmMacKtree => {
            seal_in_place::<KuznechikMgm>(key, nonce, aad, body, icv_out)
        }
        Transform::MagmaMgmKtree | Transform::MagmaMgmMacKtree => {
            seal_in_place::<MagmaMgm>(key, nonce, aad, body, icv_out)
        }
    }
}

/// Verifies the wire ICV and, with `body = Some`, decrypts the body in
/// place. Returns `IntegrityFailure` when the tag does not match; the body
/// contents are unspecified in that case.
pub(crate) fn decrypt_mgm(
    transform: Transform,
    key: &[u8; 32],
    nonce: &[u8],
    aad: &[u8],
    body: Option<&mut [u8]>,
    icv: &[u8],
) -> Result<(), EspError> {
    match transform {
        Transform::KuznechikMgmKtree | Transform::KuznechikMgmMacKtree => {
            open_in_place::<KuznechikMgm>(key, nonce, aad, body, icv)
        }
        Transform::MagmaMgmKtree | Transform::MagmaMgmMacKtree => {
            open_in_place::<MagmaMgm>(key, nonce, aad, body, icv)
        }
    }
}

fn seal_in_place<S: MgmSuite>(
    key: &[u8; 32],
    nonce: &[u8],
    aad: &[u8],
    body: Option<&mut [u8]>,
    icv_out: &mut [u8],
) -> Result<(), EspError> {
    let cipher = <S::AeadImpl as NewAead>::new(GenericArray::from_slice(key));
    // The transform fixes the salt size, so the nonce length always matches
    // the cipher's block size and this cannot panic
    let nonce = GenericArray::from_slice(nonce);

    let mut empty = [0u8; 0];
    let buffer: &mut [u8] = match body {
        Some(buffer) => buffer,
        None => &mut empty,
    };
    let tag = cipher
        .encrypt_in_place_detached(nonce, aad, buffer)
        .map_err(|_| EspError::Encryption)?;
    icv_out.copy_from_slice(&tag[..S::ICV_LEN]);
    Ok(())
}

fn open_in_place<S: MgmSuite>(
    key: &[u8; 32],
    nonce: &[u8],
    aad: &[u8],
    body: Option<&mut [u8]>,
    icv: &[u8],
) -> Result<(), EspError> {
    let cipher = <S::AeadImpl as NewAead>::new(GenericArray::from_slice(key));
    // Nonce length is fixed by the transform's salt size, as in seal
    let nonce = GenericArray::from_slice(nonce);

    let buffer = match body {
        None => {
            // MAC-only: recompute the tag over the AAD and compare the
            // truncated prefix
            let mut empty = [0u8; 0];
            let tag = cipher
                .encrypt_in_place_detached(nonce, aad, &mut empty)
                .map_err(|_| EspError::Encryption)?;
            if bool::from(tag[..S::ICV_LEN].ct_eq(icv)) {
                return Ok(());
            }
            return Err(EspError::IntegrityFailure);
        }
        Some(buffer) => buffer,
    };

    let tag_len = <<S::AeadImpl as AeadCore>::TagSize as Unsigned>::USIZE;
    if S::ICV_LEN == tag_len {
        return cipher
            .decrypt_in_place_detached(nonce, aad, buffer, GenericArray::from_slice(icv))
            .map_err(|_| EspError::IntegrityFailure);
    }

    // The wire ICV keeps only a prefix of the tag, which the trait API
    // cannot verify directly. MGM encryption is a keystream, so encrypting
    // zeroes under the same nonce recovers it: XOR to decrypt, re-encrypt
    // to recompute the full tag, then compare the prefix in constant time.
    let mut keystream = vec![0u8; buffer.len()];
    cipher
        .encrypt_in_place_detached(nonce, &[], &mut keystream)
        .map_err(|_| EspError::Encryption)?;
    for (byte, ks) in buffer.iter_mut().zip(keystream.iter()) {
        *byte ^= *ks;
    }
    let tag = cipher
        .encrypt_in_place_detached(nonce, aad, buffer)
        .map_err(|_| EspError::Encryption)?;
    let tag_ok = bool::from(tag[..S::ICV_LEN].ct_eq(icv));
    for (byte, ks) in buffer.iter_mut().zip(keystream.iter()) {
        *byte ^= *ks;
    }
    keystream.zeroize();

    if tag_ok {
        Ok(())
    } else {
        Err(EspError::IntegrityFailure)
    }
}
