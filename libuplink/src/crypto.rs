use core::fmt::Debug;

use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;
use chacha20poly1305::{aead::Aead, AeadCore, Key, KeyInit, XChaCha20Poly1305};
use ed25519_dalek::{Signer, SigningKey};
use rand::{rngs::OsRng, RngCore};

use crate::error::UplinkError;

pub const SYMMETRIC_KEY_LEN: usize = 32;
pub const SYMMETRIC_NONCE_LEN: usize = 24;
pub const SYMMETRIC_MAC_LEN: usize = 16;
pub const SYMMETRIC_METADATA_LEN: usize = SYMMETRIC_NONCE_LEN + SYMMETRIC_MAC_LEN;

pub const TREE_KEY_LEN: usize = 16;
pub const TREE_DIRECTION_KEY_LEN: usize = 32;

pub const PUBLIC_KEY_LEN: usize = 64;
pub const PRIVATE_KEY_LEN: usize = 64;
pub const SIGNATURE_LEN: usize = 64;

/// 16-byte key at a vertex of the timestamp tree. Interior tree keys are only
/// ever distributed inside subscriptions; leaves are promoted to frame keys
/// with [`kdf_tree_leaf`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TreeKey(pub [u8; TREE_KEY_LEN]);

impl Debug for TreeKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "TreeKey(x\"")?;

        for c in self.0 {
            write!(f, "{:02x}", c)?;
        }

        write!(f, "\")")
    }
}

/// Fill an `N` byte buffer from the OS entropy pool.
pub fn generate_key<const N: usize>() -> [u8; N] {
    let mut out = [0; N];
    OsRng.fill_bytes(&mut out);
    out
}

/// Generate an Ed25519 signing keypair.
///
/// The private half is the 64-byte keypair form (seed followed by the
/// verifying key). The public half is the 64-byte slot the decoder embeds:
/// the 32-byte verifying key in the low half, upper half zero.
pub fn generate_signing_keypair() -> ([u8; PRIVATE_KEY_LEN], [u8; PUBLIC_KEY_LEN]) {
    let signing = SigningKey::generate(&mut OsRng);

    let mut public = [0; PUBLIC_KEY_LEN];
    public[..32].copy_from_slice(signing.verifying_key().as_bytes());

    (signing.to_keypair_bytes(), public)
}

/// Single-shot Blake2b with an `N` byte digest, `1 <= N <= 64`.
pub fn hash<const N: usize>(message: &[u8]) -> [u8; N] {
    let mut hasher = Blake2bVar::new(N).unwrap();
    hasher.update(message);

    let mut digest = [0; N];
    hasher.finalize_variable(&mut digest).unwrap();
    digest
}

/// Sign a message with the 64-byte private keypair blob.
pub fn sign_asymmetric(
    message: &[u8],
    private_key: &[u8; PRIVATE_KEY_LEN],
) -> Result<[u8; SIGNATURE_LEN], UplinkError> {
    let signing =
        SigningKey::from_keypair_bytes(private_key).map_err(|_| UplinkError::CryptoFailure)?;

    Ok(signing.sign(message).to_bytes())
}

/// Authenticated encryption with a fresh random 24-byte nonce.
///
/// Returns `mac(16) || nonce(24) || ct`, exactly [`SYMMETRIC_METADATA_LEN`]
/// bytes longer than the plaintext. The decoder expects the mac first.
pub fn encrypt_symmetric(
    plaintext: &[u8],
    sym_key: &[u8; SYMMETRIC_KEY_LEN],
) -> Result<Vec<u8>, UplinkError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(sym_key));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let sealed = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| UplinkError::CryptoFailure)?;
    let (ct, mac) = sealed.split_at(sealed.len() - SYMMETRIC_MAC_LEN);

    let mut ciphertext = Vec::with_capacity(plaintext.len() + SYMMETRIC_METADATA_LEN);
    ciphertext.extend_from_slice(mac);
    ciphertext.extend_from_slice(&nonce);
    ciphertext.extend_from_slice(ct);
    Ok(ciphertext)
}

/// Derive the child of a tree key: `Blake2b-16(parent || direction)`.
///
/// `direction` is the deployment-wide left key to descend to the 0-child and
/// the right key for the 1-child.
pub fn kdf_tree_child(parent: &TreeKey, direction: &[u8; TREE_DIRECTION_KEY_LEN]) -> TreeKey {
    let mut packed = [0; TREE_KEY_LEN + TREE_DIRECTION_KEY_LEN];
    packed[..TREE_KEY_LEN].copy_from_slice(&parent.0);
    packed[TREE_KEY_LEN..].copy_from_slice(direction);

    TreeKey(hash(&packed))
}

/// Promote a leaf tree key to the 32-byte symmetric key that encrypts the
/// frame at that leaf's timestamp.
pub fn kdf_tree_leaf(leaf_key: &TreeKey) -> [u8; SYMMETRIC_KEY_LEN] {
    hash(&leaf_key.0)
}

/// Derive a per-device key from a 32-byte root: `Blake2b-32(le32(id) || root)`.
pub fn kdf_id(root_key: &[u8; SYMMETRIC_KEY_LEN], device_id: u32) -> [u8; SYMMETRIC_KEY_LEN] {
    let mut packed = [0; 4 + SYMMETRIC_KEY_LEN];
    packed[..4].copy_from_slice(&device_id.to_le_bytes());
    packed[4..].copy_from_slice(root_key);

    hash(&packed)
}

/// Undo [`encrypt_symmetric`]. The toolchain itself never decrypts; this
/// exists so tests can prove the ciphertext layout the decoder relies on.
#[cfg(test)]
pub(crate) fn decrypt_symmetric(
    ciphertext: &[u8],
    sym_key: &[u8; SYMMETRIC_KEY_LEN],
) -> Option<Vec<u8>> {
    use chacha20poly1305::XNonce;

    let mac = &ciphertext[..SYMMETRIC_MAC_LEN];
    let nonce = &ciphertext[SYMMETRIC_MAC_LEN..SYMMETRIC_METADATA_LEN];
    let ct = &ciphertext[SYMMETRIC_METADATA_LEN..];

    let mut sealed = Vec::from(ct);
    sealed.extend_from_slice(mac);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(sym_key));
    cipher.decrypt(XNonce::from_slice(nonce), sealed.as_slice()).ok()
}

/// Check a signature against the 64-byte public slot. Decoder-side operation,
/// only used to validate what the builders emit.
#[cfg(test)]
pub(crate) fn verify_signature(
    message: &[u8],
    signature: &[u8; SIGNATURE_LEN],
    public_key: &[u8; PUBLIC_KEY_LEN],
) -> bool {
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    let key_bytes: &[u8; 32] = public_key[..32].try_into().unwrap();
    let Ok(verifying) = VerifyingKey::from_bytes(key_bytes) else {
        return false;
    };

    verifying
        .verify(message, &Signature::from_bytes(signature))
        .is_ok()
}
