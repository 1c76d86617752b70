use std::fmt;

use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey};
use rsa::{BigUint, Oaep, RsaPrivateKey};
use sha1::Sha1;

use crate::error::{Error, Result};
use crate::protocol::PUBLIC_KEY_SIZE;

/// RSA modulus size; with `RSA_EXPONENT` the X.509 public key is exactly
/// `PUBLIC_KEY_SIZE` bytes
pub const RSA_KEY_BITS: usize = 1024;
pub const RSA_EXPONENT: u32 = 17;

/// The server encrypts with a zero IV
const AES_IV: [u8; 16] = [0u8; 16];

/// Symmetric key for file payloads, held in memory only
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey(Vec<u8>);

impl SessionKey {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        match bytes.len() {
            16 | 24 | 32 => Ok(Self(bytes)),
            len => Err(Error::InvalidSessionKey(len)),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey({} bytes)", self.0.len())
    }
}

/// Key material operations the session and transfer engine rely on
pub trait Crypto {
    /// Create a fresh keypair, keep the private half and return the public
    /// key exactly as it goes into the key field
    fn generate_keypair(&mut self) -> Result<Vec<u8>>;

    /// Encode the private key for the identity file
    fn export_private_key(&self) -> Result<String>;

    /// Restore a private key written by `export_private_key`
    fn load_private_key(&mut self, encoded: &str) -> Result<()>;

    fn decrypt_with_private_key(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn encrypt_with_key(&self, key: &SessionKey, data: &[u8]) -> Result<Vec<u8>>;
}

/// RSA-OAEP for the key exchange, AES-CBC for file chunks
#[derive(Default)]
pub struct RsaAesCrypto {
    private_key: Option<RsaPrivateKey>,
}

impl RsaAesCrypto {
    pub fn new() -> Self {
        Self::default()
    }

    fn private_key(&self) -> Result<&RsaPrivateKey> {
        self.private_key
            .as_ref()
            .ok_or_else(|| Error::Crypto("No private key loaded".to_string()))
    }
}

impl Crypto for RsaAesCrypto {
    fn generate_keypair(&mut self) -> Result<Vec<u8>> {
        let mut rng = rand::thread_rng();
        let private_key =
            RsaPrivateKey::new_with_exp(&mut rng, RSA_KEY_BITS, &BigUint::from(RSA_EXPONENT))
                .map_err(|e| Error::Crypto(format!("Key generation failed: {}", e)))?;

        // SubjectPublicKeyInfo DER; the server imports the whole field as one key
        let der = private_key
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| Error::Crypto(format!("Public key encoding failed: {}", e)))?;
        let public_key = der.as_bytes().to_vec();
        if public_key.len() != PUBLIC_KEY_SIZE {
            return Err(Error::InvalidKeyLength {
                expected: PUBLIC_KEY_SIZE,
                actual: public_key.len(),
            });
        }

        self.private_key = Some(private_key);
        Ok(public_key)
    }

    fn export_private_key(&self) -> Result<String> {
        let der = self
            .private_key()?
            .to_pkcs8_der()
            .map_err(|e| Error::Crypto(format!("Private key encoding failed: {}", e)))?;
        Ok(STANDARD.encode(der.as_bytes()))
    }

    fn load_private_key(&mut self, encoded: &str) -> Result<()> {
        let der = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Crypto(format!("Private key is not valid base64: {}", e)))?;
        let private_key = RsaPrivateKey::from_pkcs8_der(&der)
            .map_err(|e| Error::Crypto(format!("Private key decoding failed: {}", e)))?;

        self.private_key = Some(private_key);
        Ok(())
    }

    fn decrypt_with_private_key(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.private_key()?
            .decrypt(Oaep::new::<Sha1>(), data)
            .map_err(|e| Error::Crypto(format!("Decryption failed: {}", e)))
    }

    fn encrypt_with_key(&self, key: &SessionKey, data: &[u8]) -> Result<Vec<u8>> {
        let key = key.as_bytes();
        let invalid = |e: aes::cipher::InvalidLength| Error::Crypto(format!("Invalid AES key: {}", e));

        let ciphertext = match key.len() {
            16 => cbc::Encryptor::<aes::Aes128>::new_from_slices(key, &AES_IV)
                .map_err(invalid)?
                .encrypt_padded_vec_mut::<Pkcs7>(data),
            24 => cbc::Encryptor::<aes::Aes192>::new_from_slices(key, &AES_IV)
                .map_err(invalid)?
                .encrypt_padded_vec_mut::<Pkcs7>(data),
            32 => cbc::Encryptor::<aes::Aes256>::new_from_slices(key, &AES_IV)
                .map_err(invalid)?
                .encrypt_padded_vec_mut::<Pkcs7>(data),
            len => return Err(Error::InvalidSessionKey(len)),
        };
        Ok(ciphertext)
    }
}
