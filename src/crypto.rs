use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use md5::{Digest, Md5};
use std::fmt;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

pub const AES_BLOCK_SIZE: usize = 16;
pub const IV_SIZE: usize = 16;

// Init 0xFFFF, polynomial 0xA001 (0x8005 reflected), no final XOR.
const CRC16: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_MODBUS);

/// Key, IV or data length unusable by the cipher (not 16-byte key/IV, or
/// input not a multiple of the block size).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherError;

impl fmt::Display for CipherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cipher input has an invalid length")
    }
}

impl std::error::Error for CipherError {}

pub fn md5(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// 16 fresh bytes from the process-wide CSPRNG.
pub fn random_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut iv);
    iv
}

/// AES-128-CBC without implicit padding. `plaintext` must already be a
/// multiple of 16 bytes; the message codec zero-pads before calling.
pub fn aes_cbc128_encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let encryptor = Aes128CbcEnc::new_from_slices(key, iv).map_err(|_| CipherError)?;
    let mut buf = plaintext.to_vec();
    let message_len = buf.len();
    encryptor
        .encrypt_padded_mut::<NoPadding>(&mut buf, message_len)
        .map_err(|_| CipherError)?;
    Ok(buf)
}

pub fn aes_cbc128_decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let decryptor = Aes128CbcDec::new_from_slices(key, iv).map_err(|_| CipherError)?;
    let mut buf = ciphertext.to_vec();
    decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| CipherError)?;
    Ok(buf)
}
