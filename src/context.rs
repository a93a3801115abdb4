//! The ESP security-association context and the two packet operations.

use crate::aead::{build_nonce, decrypt_mgm, encrypt_mgm, Transform};
use crate::counter::EspIv;
use crate::kdf::esptree;
use crate::packet::{
    trailer_len, write_header, write_trailer, HEADER_LEN, IV_LEN, MAX_PAYLOAD_LEN, MIN_SPI,
    TRAILER_FIXED_LEN,
};
use crate::window::SeqnumWindow;
use crate::EspError;

use alloc::vec;
use alloc::vec::Vec;

use byteorder::{BigEndian, ByteOrder};
use zeroize::Zeroize;

/// Sequence numbers start here and increment once per sent packet
const FIRST_SEQNUM: u32 = 1;

/// Root keys are always 32 bytes; longer inputs are truncated
const ROOT_KEY_LEN: usize = 32;

/// Fresh contexts track this many incoming sequence numbers
const DEFAULT_WINDOW_SIZE: usize = 32;

/// A nonzero TFC target below this hides nothing and is rejected
const MIN_TFC_LEN: usize = 256;

/// Traffic direction a configuration call applies to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Packets this context produces with [`EspContext::write_packet`]
    Outbound,
    /// Packets this context accepts with [`EspContext::read_packet`]
    Inbound,
}

/// State of one ESP security association, covering both traffic directions.
///
/// A context is a single-owner state machine: configure it (transform, SPI,
/// per-direction root keys and salts, optionally a TFC target and a larger
/// anti-replay window), then call [`write_packet`](EspContext::write_packet)
/// and [`read_packet`](EspContext::read_packet) as datagrams move. There is
/// no internal locking; callers running both directions from different
/// threads serialize externally.
///
/// Each direction owns a 32-byte root key, a salt, and a structured counter.
/// The per-packet message key is rederived from the root key and the counter
/// through the key tree on every call, so compromise of one packet key does
/// not expose its neighbors, and counter exhaustion is the signal to rotate
/// the root key.
pub struct EspContext {
    transform: Option<Transform>,
    spi: u32,
    seqnum: u32,
    out_iv: EspIv,
    in_iv: EspIv,
    /// Set once the outgoing counter wraps; cleared by a new outgoing root
    /// key
    out_exhausted: bool,
    out_root_key: [u8; ROOT_KEY_LEN],
    in_root_key: [u8; ROOT_KEY_LEN],
    out_salt: Vec<u8>,
    in_salt: Vec<u8>,
    window: SeqnumWindow,
    tfc_len: usize,
}

impl EspContext {
    /// Creates an empty context: no transform, SPI 0, sequence number 1,
    /// zero counters, a 32-entry anti-replay window, and TFC disabled
    pub fn new() -> EspContext {
        EspContext {
            transform: None,
            spi: 0,
            seqnum: FIRST_SEQNUM,
            out_iv: EspIv::default(),
            in_iv: EspIv::default(),
            out_exhausted: false,
            out_root_key: [0; ROOT_KEY_LEN],
            in_root_key: [0; ROOT_KEY_LEN],
            out_salt: Vec::new(),
            in_salt: Vec::new(),
            window: SeqnumWindow::new(DEFAULT_WINDOW_SIZE),
            tfc_len: 0,
        }
    }

    /// The currently installed transform, if any
    pub fn transform(&self) -> Option<Transform> {
        self.transform
    }

    /// Installs `transform` on the context.
    ///
    /// Setting the transform that is already installed does nothing. Any
    /// other change while a transform is installed wipes the whole context
    /// first: root keys, salts, counters, sequence number, SPI, window, and
    /// TFC target are all lost and must be configured again. The salt
    /// buffers are resized for the new cipher family and zero-filled.
    pub fn set_transform(&mut self, transform: Transform) {
        if self.transform == Some(transform) {
            return;
        }
        if self.transform.is_some() {
            *self = EspContext::new();
        }
        self.transform = Some(transform);
        self.out_salt = vec![0; transform.salt_len()];
        self.in_salt = vec![0; transform.salt_len()];
    }

    /// Swaps the installed transform for the other member of its cipher
    /// family (encrypting ↔ MAC-only). Unlike
    /// [`set_transform`](EspContext::set_transform) this preserves every
    /// other byte of state: keys, salts, counters, SPI, and window.
    pub fn switch_transform(&mut self) -> Result<(), EspError> {
        match self.transform {
            Some(transform) => {
                self.transform = Some(transform.switched());
                Ok(())
            }
            None => Err(EspError::UndefinedTransform),
        }
    }

    /// Sets the Security Parameters Index. Values 0..=255 are reserved and
    /// rejected with `InvalidValue`.
    pub fn set_spi(&mut self, spi: u32) -> Result<(), EspError> {
        if spi < MIN_SPI {
            return Err(EspError::InvalidValue);
        }
        self.spi = spi;
        Ok(())
    }

    /// Installs a root key for one direction from the leading 32 bytes of
    /// `key`, and zeroes that direction's counter. A new outgoing root key
    /// also re-arms a direction stopped by `LowKeyResource`.
    pub fn set_root_key(&mut self, key: &[u8], direction: Direction) -> Result<(), EspError> {
        if key.len() < ROOT_KEY_LEN {
            return Err(EspError::InvalidValue);
        }
        match direction {
            Direction::Outbound => {
                self.out_root_key.copy_from_slice(&key[..ROOT_KEY_LEN]);
                self.out_iv.reset();
                self.out_exhausted = false;
            }
            Direction::Inbound => {
                self.in_root_key.copy_from_slice(&key[..ROOT_KEY_LEN]);
                self.in_iv.reset();
            }
        }
        Ok(())
    }

    /// Installs a salt for one direction from the leading bytes of `salt`.
    /// Requires a transform (the salt size depends on it): 12 bytes for
    /// Kuznechik, 4 for Magma.
    pub fn set_salt(&mut self, salt: &[u8], direction: Direction) -> Result<(), EspError> {
        let transform = self.transform.ok_or(EspError::UndefinedTransform)?;
        let salt_len = transform.salt_len();
        if salt.len() < salt_len {
            return Err(EspError::InvalidValue);
        }
        match direction {
            Direction::Outbound => self.out_salt.copy_from_slice(&salt[..salt_len]),
            Direction::Inbound => self.in_salt.copy_from_slice(&salt[..salt_len]),
        }
        Ok(())
    }

    /// Sets the Traffic Flow Confidentiality target: every outgoing payload
    /// section is padded to exactly this many bytes, hiding the true payload
    /// size. `0` disables TFC; other values must lie in `256..=65535`.
    pub fn set_tfc_length(&mut self, tfc_len: usize) -> Result<(), EspError> {
        if tfc_len != 0 && (tfc_len < MIN_TFC_LEN || tfc_len > MAX_PAYLOAD_LEN) {
            return Err(EspError::InvalidValue);
        }
        self.tfc_len = tfc_len;
        Ok(())
    }

    /// Grows the anti-replay window to `size` entries. Requests at or below
    /// the current size do nothing.
    pub fn set_seqnum_window_size(&mut self, size: usize) {
        self.window.enlarge(size);
    }

    /// Builds one outgoing ESP packet from `payload` into `packet`.
    ///
    /// The packet is framed, padded, encrypted (or only authenticated, for
    /// MAC-only transforms) under a freshly derived message key, and the
    /// ICV appended. `next_header` names the protocol carried in the
    /// payload and travels in the trailer.
    ///
    /// Return Value
    /// ============
    /// Returns `Ok(packet_len)`, the number of bytes written. On any error
    /// nothing has been sent as far as the context is concerned: the
    /// sequence number and outgoing counter advance only after the AEAD
    /// succeeds. Fails with `UndefinedTransform` before configuration,
    /// `ZeroLength` for payloads outside `1..=65535` bytes,
    /// `LowKeyResource` once the outgoing counter is spent, and
    /// `InvalidValue` when the payload does not fit the TFC target or
    /// `packet` is too small. A safe `packet` size is
    /// `16 + max(payload_len, tfc_target) + 2 + 5 + 12`.
    pub fn write_packet(
        &mut self,
        payload: &[u8],
        next_header: u8,
        packet: &mut [u8],
    ) -> Result<usize, EspError> {
        let transform = self.transform.ok_or(EspError::UndefinedTransform)?;
        if payload.is_empty() || payload.len() > MAX_PAYLOAD_LEN {
            return Err(EspError::ZeroLength);
        }
        if self.out_exhausted {
            return Err(EspError::LowKeyResource);
        }
        let section_len = if self.tfc_len != 0 {
            // The section must fit the 2-byte length prefix and the payload
            if payload.len() + 2 > self.tfc_len {
                return Err(EspError::InvalidValue);
            }
            self.tfc_len
        } else {
            payload.len()
        };
        let trailer = trailer_len(section_len);
        let icv_len = transform.icv_len();
        let packet_len = HEADER_LEN + IV_LEN + section_len + trailer + icv_len;
        if packet.len() < packet_len {
            return Err(EspError::InvalidValue);
        }

        write_header(self.spi, self.seqnum, packet);
        self.out_iv.write_to(&mut packet[HEADER_LEN..HEADER_LEN + IV_LEN]);

        let section_start = HEADER_LEN + IV_LEN;
        if self.tfc_len != 0 {
            BigEndian::write_u16(
                &mut packet[section_start..section_start + 2],
                payload.len() as u16,
            );
            packet[section_start + 2..section_start + 2 + payload.len()].copy_from_slice(payload);
            for byte in &mut packet[section_start + 2 + payload.len()..section_start + section_len]
            {
                *byte = 0xff;
            }
        } else {
            packet[section_start..section_start + payload.len()].copy_from_slice(payload);
        }
        write_trailer(
            section_len,
            next_header,
            &mut packet[section_start + section_len..section_start + section_len + trailer],
        );

        let mut message_key = esptree(&self.out_root_key, &self.out_iv);
        let nonce = build_nonce(&self.out_iv, &self.out_salt);

        let (head, icv) = packet[..packet_len].split_at_mut(packet_len - icv_len);
        let sealed = if transform.encrypts() {
            // AAD is the header alone; the IV is carried in clear and the
            // section and trailer are encrypted in place
            let (prefix, body) = head.split_at_mut(section_start);
            encrypt_mgm(
                transform,
                &message_key,
                &nonce,
                &prefix[..HEADER_LEN],
                Some(body),
                icv,
            )
        } else {
            // MAC-only: the whole packet up to the ICV is AAD
            encrypt_mgm(transform, &message_key, &nonce, head, None, icv)
        };
        message_key.zeroize();
        sealed?;

        self.seqnum = self.seqnum.wrapping_add(1);
        if self.out_iv.increment().is_err() {
            self.out_exhausted = true;
        }
        Ok(packet_len)
    }

    /// Verifies and decrypts one incoming ESP packet in place and copies the
    /// payload into `payload_out`.
    ///
    /// The sequence number is committed to the anti-replay window before the
    /// ICV is verified, for interoperability with existing peers; a forged
    /// packet therefore consumes the sequence number it names. Peers that do
    /// not need wire-level interoperability may prefer to drop such packets
    /// without window effects, but this implementation keeps the original
    /// ordering.
    ///
    /// Return Value
    /// ============
    /// Returns `Ok((payload_len, next_header))`. Fails with
    /// `UndefinedTransform` before configuration, `InvalidValue` for a
    /// replayed/too-old sequence number, a malformed length field, or a
    /// too-small `payload_out`, and `IntegrityFailure` when the ICV does not
    /// verify (the packet contents are left in an unspecified state).
    pub fn read_packet(
        &mut self,
        packet: &mut [u8],
        payload_out: &mut [u8],
    ) -> Result<(usize, u8), EspError> {
        let transform = self.transform.ok_or(EspError::UndefinedTransform)?;
        let icv_len = transform.icv_len();
        // Smallest well-formed packet: one payload byte and its 3-byte
        // trailer
        if packet.len() < HEADER_LEN + IV_LEN + 4 + icv_len {
            return Err(EspError::InvalidValue);
        }

        let seqnum = BigEndian::read_u32(&packet[4..8]);
        if !self.window.check(seqnum) {
            return Err(EspError::InvalidValue);
        }

        self.in_iv.read_from(&packet[HEADER_LEN..HEADER_LEN + IV_LEN]);
        let mut message_key = esptree(&self.in_root_key, &self.in_iv);
        let nonce = build_nonce(&self.in_iv, &self.in_salt);

        let packet_len = packet.len();
        let data_len = packet_len - HEADER_LEN - IV_LEN - icv_len;
        let (head, icv) = packet.split_at_mut(packet_len - icv_len);
        let opened = if transform.encrypts() {
            let (prefix, body) = head.split_at_mut(HEADER_LEN + IV_LEN);
            decrypt_mgm(
                transform,
                &message_key,
                &nonce,
                &prefix[..HEADER_LEN],
                Some(body),
                icv,
            )
        } else {
            decrypt_mgm(transform, &message_key, &nonce, head, None, icv)
        };
        message_key.zeroize();
        opened?;

        let section = &packet[HEADER_LEN + IV_LEN..HEADER_LEN + IV_LEN + data_len];
        let next_header = section[data_len - 1];
        let (payload_start, payload_len) = if self.tfc_len != 0 {
            // The length prefix names the true payload; the TFC fill and the
            // trailer carry nothing further
            let payload_len = BigEndian::read_u16(&section[..2]) as usize;
            if payload_len + 2 > data_len {
                return Err(EspError::InvalidValue);
            }
            (2, payload_len)
        } else {
            let pad_len = section[data_len - 2] as usize;
            if pad_len + TRAILER_FIXED_LEN > data_len {
                return Err(EspError::InvalidValue);
            }
            (0, data_len - pad_len - TRAILER_FIXED_LEN)
        };
        if payload_out.len() < payload_len {
            return Err(EspError::InvalidValue);
        }
        payload_out[..payload_len]
            .copy_from_slice(&section[payload_start..payload_start + payload_len]);
        Ok((payload_len, next_header))
    }
}

impl Default for EspContext {
    fn default() -> EspContext {
        EspContext::new()
    }
}

impl Drop for EspContext {
    fn drop(&mut self) {
        self.out_root_key.zeroize();
        self.in_root_key.zeroize();
        self.out_salt.zeroize();
        self.in_salt.zeroize();
    }
}
