//! 3.80C rolling XOR cipher.
//!
//! Each direction keeps its own 8-byte key. After every packet the first four
//! key bytes are XORed with the first four plaintext bytes and the upper half
//! is advanced by a constant, so both ends must process frames in order.

const MASK1: u32 = 0x9c30_d539;
const MASK2: u32 = 0x930f_d7e2;
const MASK3: u32 = 0x7c72_e993;
const MASK4: u32 = 0x287e_ffc3;

/// Fixed tail of the init packet expected by the 3.80C Taiwan client.
pub const FIRST_PACKET: [u8; 11] = [0x9d, 0xd1, 0xd6, 0x7a, 0xf4, 0x62, 0xe7, 0xa0, 0x66, 0x02, 0xfa];

/// Opcode of the plaintext init packet.
pub const S_INITPACKET: u8 = 150;

#[derive(Debug, Clone)]
pub struct Cipher {
    encode_key: [u8; 8],
    decode_key: [u8; 8],
}

impl Cipher {
    pub fn new(seed: i32) -> Self {
        let k0 = ((seed as u32) ^ MASK1).rotate_left(19);
        let k1 = MASK2 ^ k0 ^ MASK3;

        let mut key = [0u8; 8];
        key[..4].copy_from_slice(&k0.to_le_bytes());
        key[4..].copy_from_slice(&k1.to_le_bytes());

        Self { encode_key: key, decode_key: key }
    }

    /// Enciphers `data` in place. Frames shorter than 4 bytes pass through.
    pub fn encrypt(&mut self, data: &mut [u8]) {
        if data.len() < 4 {
            return;
        }
        let mut plain = [0u8; 4];
        plain.copy_from_slice(&data[..4]);

        let k = &self.encode_key;
        data[0] ^= k[0];
        for i in 1..data.len() {
            data[i] ^= data[i - 1] ^ k[i & 7];
        }
        data[3] ^= k[2];
        data[2] ^= k[3] ^ data[3];
        data[1] ^= k[4] ^ data[2];
        data[0] ^= k[5] ^ data[1];

        roll(&mut self.encode_key, &plain);
    }

    /// Deciphers `data` in place. Frames shorter than 4 bytes pass through.
    pub fn decrypt(&mut self, data: &mut [u8]) {
        if data.len() < 4 {
            return;
        }
        let k = &self.decode_key;
        data[0] ^= k[5] ^ data[1];
        data[1] ^= k[4] ^ data[2];
        data[2] ^= k[3] ^ data[3];
        data[3] ^= k[2];
        for i in (1..data.len()).rev() {
            data[i] ^= data[i - 1] ^ k[i & 7];
        }
        data[0] ^= k[0];

        let mut plain = [0u8; 4];
        plain.copy_from_slice(&data[..4]);
        roll(&mut self.decode_key, &plain);
    }
}

fn roll(key: &mut [u8; 8], plain: &[u8; 4]) {
    for i in 0..4 {
        key[i] ^= plain[i];
    }
    let upper = u32::from_le_bytes([key[4], key[5], key[6], key[7]]).wrapping_add(MASK4);
    key[4..].copy_from_slice(&upper.to_le_bytes());
}

/// Builds the 18-byte plaintext init packet (length header included).
pub fn build_init_packet(seed: i32) -> [u8; 18] {
    let mut buf = [0u8; 18];
    buf[..2].copy_from_slice(&18u16.to_le_bytes());
    buf[2] = S_INITPACKET;
    buf[3..7].copy_from_slice(&seed.to_le_bytes());
    buf[7..].copy_from_slice(&FIRST_PACKET);
    buf
}

/// Random positive non-zero seed.
pub fn random_seed() -> i32 {
    rand::random_range(1..0x7FFF_FFFF)
}
