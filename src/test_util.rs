use crate::aead::Transform;
use crate::context::{Direction, EspContext};

use rand::{rngs::StdRng, RngCore, SeedableRng};

/// Returns a random 32-byte buffer
pub(crate) fn gen_rand_buf() -> [u8; 32] {
    let mut csprng = StdRng::from_entropy();
    let mut buf = [0u8; 32];
    csprng.fill_bytes(&mut buf);
    buf
}

/// Creates a sender/receiver pair sharing fresh random keying material for
/// the sender→receiver direction
pub(crate) fn esp_pair(transform: Transform) -> (EspContext, EspContext) {
    let root_key = gen_rand_buf();
    let salt = gen_rand_buf();
    esp_pair_with(transform, &root_key, &salt[..transform.salt_len()])
}

/// Creates a sender/receiver pair from the given root key and salt,
/// installed as the sender's outbound and the receiver's inbound material
pub(crate) fn esp_pair_with(
    transform: Transform,
    root_key: &[u8; 32],
    salt: &[u8],
) -> (EspContext, EspContext) {
    let mut sender = EspContext::new();
    sender.set_transform(transform);
    sender.set_spi(0x0102_0304).unwrap();
    sender.set_root_key(root_key, Direction::Outbound).unwrap();
    sender.set_salt(salt, Direction::Outbound).unwrap();

    let mut receiver = EspContext::new();
    receiver.set_transform(transform);
    receiver.set_spi(0x0102_0304).unwrap();
    receiver.set_root_key(root_key, Direction::Inbound).unwrap();
    receiver.set_salt(salt, Direction::Inbound).unwrap();

    (sender, receiver)
}
