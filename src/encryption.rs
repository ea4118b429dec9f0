//! Traditional PKWARE encryption for ZIP entries
//!
//! Implements the classic "ZipCrypto" stream cipher from the ZIP APPNOTE.
//!
//! ## Format
//! - Three 32-bit keys initialised from the password
//! - 12-byte encryption header before the compressed data: 10 random bytes
//!   followed by the two high bytes of the entry CRC-32
//! - Every byte after the header is XORed with the key stream
//!
//! Because the header carries the CRC, the checksum of an entry must be known
//! before its first compressed byte is written.

use crate::error::{Result, ZipperError};
use crc32fast::Hasher;

/// Size of the encryption header preceding the compressed data
pub const HEADER_SIZE: usize = 12;

/// One step of the raw CRC-32 table update, without pre/post inversion
fn crc32_byte(crc: u32, byte: u8) -> u32 {
    let mut hasher = Hasher::new_with_initial(!crc);
    hasher.update(&[byte]);
    !hasher.finalize()
}

/// Key state shared by encryption and decryption
#[derive(Clone)]
struct Keys {
    key0: u32,
    key1: u32,
    key2: u32,
}

impl Keys {
    fn new(password: &str) -> Self {
        let mut keys = Self {
            key0: 0x1234_5678,
            key1: 0x2345_6789,
            key2: 0x3456_7890,
        };
        for &byte in password.as_bytes() {
            keys.update(byte);
        }
        keys
    }

    fn update(&mut self, byte: u8) {
        self.key0 = crc32_byte(self.key0, byte);
        self.key1 = self
            .key1
            .wrapping_add(self.key0 & 0xff)
            .wrapping_mul(134_775_813)
            .wrapping_add(1);
        self.key2 = crc32_byte(self.key2, (self.key1 >> 24) as u8);
    }

    fn stream_byte(&self) -> u8 {
        let temp = (self.key2 | 2) as u16;
        (temp.wrapping_mul(temp ^ 1) >> 8) as u8
    }

    fn encrypt_byte(&mut self, plain: u8) -> u8 {
        let cipher = plain ^ self.stream_byte();
        self.update(plain);
        cipher
    }

    fn decrypt_byte(&mut self, cipher: u8) -> u8 {
        let plain = cipher ^ self.stream_byte();
        self.update(plain);
        plain
    }
}

/// Encryption context for one entry
pub struct ZipCryptoEncryptor {
    keys: Keys,
    header: [u8; HEADER_SIZE],
}

impl ZipCryptoEncryptor {
    /// Create an encryptor for an entry whose CRC-32 is `crc`
    pub fn new(password: &str, crc: u32) -> Result<Self> {
        let mut header = [0u8; HEADER_SIZE];
        getrandom::getrandom(&mut header[..HEADER_SIZE - 2])
            .map_err(|e| ZipperError::internal(format!("random source failed: {}", e)))?;
        header[HEADER_SIZE - 2] = (crc >> 16) as u8;
        header[HEADER_SIZE - 1] = (crc >> 24) as u8;

        let mut keys = Keys::new(password);
        for byte in header.iter_mut() {
            *byte = keys.encrypt_byte(*byte);
        }

        Ok(Self { keys, header })
    }

    /// Encrypted header, written before the compressed data
    pub fn header(&self) -> &[u8; HEADER_SIZE] {
        &self.header
    }

    /// Encrypt data in-place
    pub fn encrypt(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte = self.keys.encrypt_byte(*byte);
        }
    }
}

/// Decryption context for one entry
pub struct ZipCryptoDecryptor {
    keys: Keys,
}

impl ZipCryptoDecryptor {
    /// Decrypt `header` and verify its check byte against `check`
    ///
    /// `check` is the high byte of the CRC-32, or of the DOS time when the
    /// entry used a data descriptor.
    pub fn new(password: &str, header: &[u8; HEADER_SIZE], check: u8) -> Result<Self> {
        let mut keys = Keys::new(password);
        let mut last = 0u8;
        for &byte in header {
            last = keys.decrypt_byte(byte);
        }

        if last != check {
            return Err(ZipperError::internal("incorrect password"));
        }

        Ok(Self { keys })
    }

    /// Decrypt data in-place
    pub fn decrypt(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte = self.keys.decrypt_byte(*byte);
        }
    }
}
