use anyhow::{Result, anyhow};
use ed25519_dalek::{Signature, Signer as DalekSigner, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

pub const WAVE_DOMAIN_TAG: &str = "waveportal:v1:wave";

pub trait Signer: Send + Sync {
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

pub struct Ed25519Signer {
    signing_key: SigningKey,
}

impl Ed25519Signer {
    pub fn new_random() -> Self {
        let mut rng = OsRng;
        let signing_key = SigningKey::generate(&mut rng);
        Self { signing_key }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn public_key_hex(&self) -> String {
        to_hex(&self.public_key_bytes())
    }

    pub fn wallet_address(&self) -> String {
        address_for_public_key(&self.public_key_bytes())
    }

    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn from_secret_key_bytes(mut secret_key: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&secret_key);
        secret_key.zeroize();
        Self { signing_key }
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.is_empty() {
            return Err(anyhow!("payload cannot be empty"));
        }

        let signature: Signature = self.signing_key.sign(&signing_input(payload));
        Ok(signature.to_bytes().to_vec())
    }
}

/// `0x` + hex of the first 20 bytes of sha256(public key).
pub fn address_for_public_key(public_key: &[u8; 32]) -> String {
    let digest = Sha256::digest(public_key);
    format!("0x{}", to_hex(&digest[..20]))
}

/// Canonical bytes a wallet signs for a wave from `from` carrying `message`.
pub fn wave_payload(from: &str, message: &str) -> Vec<u8> {
    format!("from={from};message={message}").into_bytes()
}

pub fn verify_signature(public_key: &[u8; 32], payload: &[u8], signature: &[u8]) -> Result<bool> {
    let verifying_key =
        VerifyingKey::from_bytes(public_key).map_err(|err| anyhow!("invalid public key: {err}"))?;
    let signature =
        Signature::from_slice(signature).map_err(|err| anyhow!("invalid signature: {err}"))?;
    Ok(verifying_key
        .verify(&signing_input(payload), &signature)
        .is_ok())
}

fn signing_input(payload: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(WAVE_DOMAIN_TAG.len() + 1 + payload.len());
    input.extend_from_slice(WAVE_DOMAIN_TAG.as_bytes());
    input.extend_from_slice(b":");
    input.extend_from_slice(payload);
    input
}

pub fn to_hex(input: &[u8]) -> String {
    hex::encode(input)
}

/// Decodes hex with or without a `0x` prefix.
pub fn from_hex(input: &str) -> Result<Vec<u8>> {
    let digits = input.strip_prefix("0x").unwrap_or(input);
    hex::decode(digits).map_err(|err| anyhow!("invalid hex: {err}"))
}

pub fn encrypt_key_material(secret_key: &[u8; 32], encryption_key: &str) -> Result<Vec<u8>> {
    if encryption_key.trim().is_empty() {
        return Err(anyhow!("encryption key cannot be empty"));
    }

    let key_stream = derive_key_stream(encryption_key, secret_key.len());
    Ok(secret_key
        .iter()
        .zip(key_stream.iter())
        .map(|(byte, mask)| byte ^ mask)
        .collect())
}

pub fn decrypt_key_material(encrypted: &[u8], encryption_key: &str) -> Result<[u8; 32]> {
    if encryption_key.trim().is_empty() {
        return Err(anyhow!("encryption key cannot be empty"));
    }

    if encrypted.len() != 32 {
        return Err(anyhow!("invalid encrypted key length"));
    }

    let key_stream = derive_key_stream(encryption_key, encrypted.len());
    let mut decrypted = [0_u8; 32];

    for (index, byte) in encrypted.iter().enumerate() {
        decrypted[index] = byte ^ key_stream[index];
    }

    Ok(decrypted)
}

fn derive_key_stream(seed: &str, len: usize) -> Vec<u8> {
    let mut stream = Vec::with_capacity(len);
    let mut counter: u64 = 0;
    while stream.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update(counter.to_le_bytes());
        let block = hasher.finalize();
        for byte in block {
            if stream.len() == len {
                break;
            }
            stream.push(byte);
        }
        counter += 1;
    }
    stream
}
