//! Package classification and encryption.
//!
//! The first eight bytes of every save package are a save version word and a
//! magic word. Unencrypted packages carry their real values there, while for
//! encrypted packages the pair doubles as an outer header identifying the
//! title, with the real plaintext header reappearing once decrypted.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Block};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

pub const SAVE_FILE_VERSION_PC: u32 = 1;
pub const SAVE_FILE_VERSION_IB3: u32 = 3;
pub const NO_MAGIC: u32 = 0xffff_ffff;
pub const IB1_SAVE_MAGIC: u32 = 0x9e2a_83c1;
pub const IB2_SAVE_MAGIC: u32 = 0x4bb7_6a66;

const BLOCK_SIZE: usize = 16;
const HEADER_SIZE: usize = 8;

const IB1_AES_KEY: [u8; 16] = [
    0x5a, 0x17, 0xc3, 0x8e, 0x44, 0xf0, 0x2b, 0x91, 0x6d, 0xd8, 0x0a, 0x7f, 0xb2, 0x35, 0xe9, 0x4c,
];
const IB2_AES_KEY: [u8; 16] = [
    0x21, 0xaf, 0x73, 0x06, 0xc8, 0x52, 0x9d, 0xe4, 0x38, 0x7b, 0xf1, 0x60, 0x0e, 0xa5, 0x4a, 0xd7,
];
const VOTE_AES_KEY: [u8; 16] = [
    0x96, 0x3c, 0xe0, 0x1b, 0x57, 0x8d, 0x42, 0xf9, 0xa4, 0x6f, 0x28, 0xb3, 0xdc, 0x05, 0x71, 0xce,
];

/// The four titles whose save packages share this format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Title {
    Ib1,
    Ib2,
    Ib3,
    Vote,
}

/// Classification of a save package, established once up front and treated
/// as read-only for the rest of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageInfo {
    pub package_name: String,
    pub save_version: u32,
    pub save_magic: u32,
    pub encrypted: bool,
    pub title: Title,
}

impl PackageInfo {
    /// Classifies a raw package by its header, probing the ciphertext when
    /// the header alone cannot distinguish titles.
    pub fn resolve(data: &[u8], package_name: &str) -> Result<PackageInfo> {
        let (save_version, save_magic) = read_header(data)?;
        let encrypted = is_encrypted(save_version, save_magic);

        let title = if encrypted {
            if save_magic == IB1_SAVE_MAGIC {
                Title::Ib1
            } else if save_version == IB2_SAVE_MAGIC {
                // The second game and VOTE share an outer header. Trial
                // decrypting one block with the IB2 key and looking for the
                // plaintext header words tells them apart.
                if half_block_decrypts(Title::Ib2, data)? {
                    Title::Ib2
                } else {
                    Title::Vote
                }
            } else {
                return Err(Error::UnknownTitle {
                    save_version,
                    save_magic,
                });
            }
        } else if save_version == SAVE_FILE_VERSION_IB3 {
            // Unencrypted saves with this version are either the third game
            // or a device backup from the second. Only the third writes an
            // engine version marker near the end of the file.
            if has_engine_version_marker(data) {
                Title::Ib3
            } else {
                Title::Ib2
            }
        } else {
            // SAVE_FILE_VERSION_PC and anything else unencrypted is treated
            // as the first game rather than rejected.
            Title::Ib1
        };

        debug!(?title, encrypted, "resolved package");
        Ok(PackageInfo {
            package_name: package_name.to_string(),
            save_version,
            save_magic,
            encrypted,
            title,
        })
    }

    /// Like [`PackageInfo::resolve`] but with the title supplied by the
    /// caller, for packages too small or too stripped to classify.
    pub fn resolve_as(data: &[u8], package_name: &str, title: Title) -> Result<PackageInfo> {
        let (save_version, save_magic) = read_header(data)?;
        Ok(PackageInfo {
            package_name: package_name.to_string(),
            save_version,
            save_magic,
            encrypted: is_encrypted(save_version, save_magic),
            title,
        })
    }
}

fn read_header(data: &[u8]) -> Result<(u32, u32)> {
    if data.len() < HEADER_SIZE {
        return Err(Error::Truncated(data.len()));
    }
    let save_version = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let save_magic = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    Ok((save_version, save_magic))
}

fn is_encrypted(save_version: u32, save_magic: u32) -> bool {
    !(save_version == SAVE_FILE_VERSION_IB3 || save_version == SAVE_FILE_VERSION_PC)
        || save_magic != NO_MAGIC
}

fn key_for(title: Title) -> Result<&'static [u8; 16]> {
    match title {
        Title::Ib1 => Ok(&IB1_AES_KEY),
        Title::Ib2 => Ok(&IB2_AES_KEY),
        Title::Vote => Ok(&VOTE_AES_KEY),
        Title::Ib3 => Err(Error::UnsupportedEncryption(Title::Ib3)),
    }
}

/// Decrypts the first ciphertext block (right after the outer magic word)
/// and checks whether the plaintext header words surface.
fn half_block_decrypts(title: Title, data: &[u8]) -> Result<bool> {
    let probe = data
        .get(4..4 + BLOCK_SIZE)
        .ok_or(Error::Truncated(data.len()))?;
    let cipher = Aes128::new(GenericArray::from_slice(key_for(title)?));
    let mut block = Block::clone_from_slice(probe);
    cipher.decrypt_block(&mut block);

    let first = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
    let second = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
    Ok(first == NO_MAGIC || first == 0 || second == NO_MAGIC)
}

fn has_engine_version_marker(data: &[u8]) -> bool {
    const MARKER: &str = "CurrentEngineVersion";
    const MARKER_LOCATION: usize = 62;
    let Some(offset) = data.len().checked_sub(MARKER_LOCATION) else {
        return false;
    };
    let Some(word) = data.get(offset..offset + 4) else {
        return false;
    };
    let len = i32::from_le_bytes([word[0], word[1], word[2], word[3]]);
    if len <= 0 {
        return false;
    }
    let Some(chars) = data.get(offset + 4..offset + 4 + len as usize) else {
        return false;
    };
    let trimmed: &[u8] = match chars.iter().position(|&b| b == 0) {
        Some(nul) => &chars[..nul],
        None => chars,
    };
    trimmed == MARKER.as_bytes()
}

/// Strips the outer header and decrypts the remaining ciphertext, returning
/// the plaintext package. Zero padding appended during encryption is kept,
/// the terminator field makes it harmless to the deserializer.
pub fn decrypt_package(info: &PackageInfo, data: &[u8]) -> Result<Vec<u8>> {
    let skip = match info.title {
        Title::Ib1 => 8,
        _ => 4,
    };
    let body = data.get(skip..).ok_or(Error::Truncated(data.len()))?;
    if body.len() % BLOCK_SIZE != 0 {
        return Err(Error::BadBlockLength(body.len()));
    }
    let cipher = Aes128::new(GenericArray::from_slice(key_for(info.title)?));

    let mut plaintext = Vec::with_capacity(body.len());
    match info.title {
        // CBC with an all-zero IV
        Title::Ib1 => {
            let mut prev = [0u8; BLOCK_SIZE];
            for chunk in body.chunks_exact(BLOCK_SIZE) {
                let mut block = Block::clone_from_slice(chunk);
                cipher.decrypt_block(&mut block);
                for (b, p) in block.iter_mut().zip(prev.iter()) {
                    *b ^= p;
                }
                plaintext.extend_from_slice(&block);
                prev.copy_from_slice(chunk);
            }
        }
        // ECB
        _ => {
            for chunk in body.chunks_exact(BLOCK_SIZE) {
                let mut block = Block::clone_from_slice(chunk);
                cipher.decrypt_block(&mut block);
                plaintext.extend_from_slice(&block);
            }
        }
    }
    Ok(plaintext)
}

/// Encrypts a plaintext package and prepends the outer header for its title.
pub fn encrypt_package(info: &PackageInfo, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes128::new(GenericArray::from_slice(key_for(info.title)?));

    // zero padding, only when the plaintext is not already block aligned
    let mut padded = plaintext.to_vec();
    let rem = padded.len() % BLOCK_SIZE;
    if rem != 0 {
        padded.resize(padded.len() + BLOCK_SIZE - rem, 0);
    }

    let mut out = Vec::with_capacity(HEADER_SIZE + padded.len());
    match info.title {
        Title::Ib1 => {
            out.extend_from_slice(&info.save_version.to_le_bytes());
            out.extend_from_slice(&info.save_magic.to_le_bytes());
        }
        _ => out.extend_from_slice(&IB2_SAVE_MAGIC.to_le_bytes()),
    }

    match info.title {
        Title::Ib1 => {
            let mut prev = [0u8; BLOCK_SIZE];
            for chunk in padded.chunks_exact(BLOCK_SIZE) {
                let mut block = Block::clone_from_slice(chunk);
                for (b, p) in block.iter_mut().zip(prev.iter()) {
                    *b ^= p;
                }
                cipher.encrypt_block(&mut block);
                out.extend_from_slice(&block);
                prev.copy_from_slice(&block);
            }
        }
        _ => {
            for chunk in padded.chunks_exact(BLOCK_SIZE) {
                let mut block = Block::clone_from_slice(chunk);
                cipher.encrypt_block(&mut block);
                out.extend_from_slice(&block);
            }
        }
    }
    Ok(out)
}
