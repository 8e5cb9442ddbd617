// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Secure Channel (P-384 ECDH + AES-256-CBC)
//!
//! Per-connection cryptographic state. Both endpoints generate an ephemeral
//! key pair on SECP384R1, exchange public coordinates, and derive the same
//! symmetric material from the ECDH shared secret via HKDF-SHA256:
//!
//! - info `"encrypted packet message"` -> 32-byte AES-256 key
//! - info `"CBC vector"`               -> 16-byte CBC initialization vector
//!
//! Until [`SecureChannel::set_enabled`] flips the channel on, `encrypt` and
//! `decrypt` pass data through unchanged so the handshake itself travels in
//! plaintext. Once enabled, every frame on the connection is AES-256-CBC
//! with PKCS7 padding.
//!
//! The IV is derived deterministically from the shared secret and the
//! cipher is re-initialized from the fixed key/IV for each message. This is
//! a deliberate simplification of this protocol (a fresh connection always
//! re-runs the handshake, so key and IV are unique per connection); it is
//! not a construction to reuse elsewhere.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use p384::ecdh::EphemeralSecret;
use p384::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p384::{EncodedPoint, FieldBytes, PublicKey};
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroize;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block size in bytes.
const BLOCK_SIZE: usize = 16;
/// Byte width of one P-384 affine coordinate.
const COORDINATE_SIZE: usize = 48;

/// HKDF context string for the symmetric encryption key.
const KEY_INFO: &[u8] = b"encrypted packet message";
/// HKDF context string for the CBC initialization vector.
const IV_INFO: &[u8] = b"CBC vector";

/// Secure channel error types.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("key pair has not been generated")]
    KeysNotGenerated,
    #[error("peer public key is not a valid P-384 point")]
    InvalidPublicKey,
    #[error("key derivation failed")]
    DerivationFailed,
    #[error("ciphertext length is not a multiple of the cipher block size")]
    NotBlockAligned,
    #[error("decryption failed: data may be corrupted or wrong key")]
    DecryptionFailed,
}

/// Public key as affine coordinates, hex-encoded for transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicCoordinates {
    pub x: String,
    pub y: String,
}

/// Derived symmetric cipher material.
struct CipherState {
    key: [u8; 32],
    iv: [u8; BLOCK_SIZE],
}

impl Drop for CipherState {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}

/// Per-connection encryption state.
///
/// Lifecycle: *uninitialized* -> *key pair generated* -> *shared secret
/// derived* -> *enabled*. Mixing plaintext and ciphertext on one connection
/// after enabling is a protocol violation; the enable flag is expected to
/// flip exactly once, after both sides confirm the handshake.
pub struct SecureChannel {
    enabled: bool,
    key_pair: Option<EphemeralSecret>,
    cipher: Option<CipherState>,
}

impl std::fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Don't expose key material in debug output
        f.debug_struct("SecureChannel")
            .field("enabled", &self.enabled)
            .field("key_pair", &self.key_pair.as_ref().map(|_| "[REDACTED]"))
            .field("cipher", &self.cipher.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl SecureChannel {
    /// Creates an uninitialized channel (pass-through until enabled).
    pub fn new() -> Self {
        SecureChannel {
            enabled: false,
            key_pair: None,
            cipher: None,
        }
    }

    /// Returns true once symmetric encryption is active.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Flips the plaintext/ciphertext gate. Expected to go from false to
    /// true exactly once, after both sides have confirmed the handshake.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Generates an ephemeral P-384 key pair and returns the public
    /// coordinates for transmission to the peer.
    pub fn generate_key_pair<R: CryptoRng + RngCore>(
        &mut self,
        rng: &mut R,
    ) -> Result<PublicCoordinates, ChannelError> {
        let secret = EphemeralSecret::random(rng);
        let point = secret.public_key().to_encoded_point(false);

        let x = point.x().ok_or(ChannelError::InvalidPublicKey)?;
        let y = point.y().ok_or(ChannelError::InvalidPublicKey)?;
        let coordinates = PublicCoordinates {
            x: hex::encode(x),
            y: hex::encode(y),
        };

        self.key_pair = Some(secret);
        Ok(coordinates)
    }

    /// Performs ECDH with the peer's public key and derives the symmetric
    /// cipher state. Fails if no local key pair exists.
    pub fn derive_shared_key(&mut self, peer: &PublicCoordinates) -> Result<(), ChannelError> {
        let secret = self.key_pair.as_ref().ok_or(ChannelError::KeysNotGenerated)?;
        let peer_key = decode_public_key(peer)?;

        let shared = secret.diffie_hellman(&peer_key);
        let hkdf = Hkdf::<Sha256>::new(None, shared.raw_secret_bytes().as_slice());

        let mut key = [0u8; 32];
        hkdf.expand(KEY_INFO, &mut key)
            .map_err(|_| ChannelError::DerivationFailed)?;

        let mut iv = [0u8; BLOCK_SIZE];
        hkdf.expand(IV_INFO, &mut iv)
            .map_err(|_| ChannelError::DerivationFailed)?;

        self.cipher = Some(CipherState { key, iv });
        Ok(())
    }

    /// Encrypts a message. Pass-through while the channel is disabled.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let Some(cipher) = self.active_cipher() else {
            return Ok(plaintext.to_vec());
        };

        let encryptor = Aes256CbcEnc::new(&cipher.key.into(), &cipher.iv.into());
        Ok(encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
    }

    /// Decrypts a message. Pass-through while the channel is disabled.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let Some(cipher) = self.active_cipher() else {
            return Ok(ciphertext.to_vec());
        };

        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(ChannelError::NotBlockAligned);
        }

        let decryptor = Aes256CbcDec::new(&cipher.key.into(), &cipher.iv.into());
        decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| ChannelError::DecryptionFailed)
    }

    fn active_cipher(&self) -> Option<&CipherState> {
        if !self.enabled {
            return None;
        }
        self.cipher.as_ref()
    }
}

impl Default for SecureChannel {
    fn default() -> Self {
        SecureChannel::new()
    }
}

/// Rebuilds a P-384 public key from hex-encoded affine coordinates.
fn decode_public_key(peer: &PublicCoordinates) -> Result<PublicKey, ChannelError> {
    let x = decode_coordinate(&peer.x)?;
    let y = decode_coordinate(&peer.y)?;

    let point = EncodedPoint::from_affine_coordinates(
        FieldBytes::from_slice(&x),
        FieldBytes::from_slice(&y),
        false,
    );
    Option::from(PublicKey::from_encoded_point(&point)).ok_or(ChannelError::InvalidPublicKey)
}

/// Decodes one hex coordinate, tolerating stripped leading zeros.
fn decode_coordinate(text: &str) -> Result<[u8; COORDINATE_SIZE], ChannelError> {
    let padded = if text.len() % 2 == 1 {
        format!("0{text}")
    } else {
        text.to_string()
    };
    let bytes = hex::decode(&padded).map_err(|_| ChannelError::InvalidPublicKey)?;
    if bytes.len() > COORDINATE_SIZE {
        return Err(ChannelError::InvalidPublicKey);
    }

    let mut coordinate = [0u8; COORDINATE_SIZE];
    coordinate[COORDINATE_SIZE - bytes.len()..].copy_from_slice(&bytes);
    Ok(coordinate)
}
