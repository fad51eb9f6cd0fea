use std::collections::{BTreeMap, BTreeSet};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::crypto::{
    self, kdf_id, kdf_tree_child, TreeKey, PRIVATE_KEY_LEN, PUBLIC_KEY_LEN, SYMMETRIC_KEY_LEN,
    TREE_DIRECTION_KEY_LEN, TREE_KEY_LEN,
};
use crate::error::UplinkError;
use crate::tree::Vertex;

/// Channel every deployment carries regardless of the requested list.
pub const BROADCAST_CHANNEL: u32 = 0;

/// Root secrets of a deployment. Generated once from the CSPRNG, serialized
/// to JSON, and thereafter read-only input to the subscription builder and
/// the frame encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalSecrets {
    /// Signing keypair for frame packets and subscription updates.
    pub enc_private_key: [u8; PRIVATE_KEY_LEN],
    pub enc_public_key: [u8; PUBLIC_KEY_LEN],
    /// Root for per-device identity keys.
    pub id_root_key: [u8; SYMMETRIC_KEY_LEN],
    pub channel_keys: BTreeMap<u32, [u8; SYMMETRIC_KEY_LEN]>,
    /// The two fixed direction constants mixed into every tree descent.
    pub left_tree_key: [u8; TREE_DIRECTION_KEY_LEN],
    pub right_tree_key: [u8; TREE_DIRECTION_KEY_LEN],
    pub tree_root_keys: BTreeMap<u32, TreeKey>,
    /// Seed source for the link-time symbol shuffler, carried but otherwise
    /// unused by the toolchain.
    pub symbol_shimmy_root_key: [u8; SYMMETRIC_KEY_LEN],
}

/// JSON layout of the secrets file: base64 scalars, per-channel maps keyed by
/// decimal channel ids as strings.
#[derive(Serialize, Deserialize)]
struct SecretsFile {
    #[serde(rename = "ENCODER_PRIVATE_KEY")]
    enc_private_key: String,
    #[serde(rename = "ENCODER_PUBLIC_KEY")]
    enc_public_key: String,
    #[serde(rename = "ID_ROOT_KEY")]
    id_root_key: String,
    #[serde(rename = "CHANNEL_KEYS")]
    channel_keys: BTreeMap<String, String>,
    #[serde(rename = "LEFT_TREE_KEY")]
    left_tree_key: String,
    #[serde(rename = "RIGHT_TREE_KEY")]
    right_tree_key: String,
    #[serde(rename = "TREE_ROOT_KEYS")]
    tree_root_keys: BTreeMap<String, String>,
    #[serde(rename = "SYMBOL_SHIMMY_ROOT_KEY")]
    symbol_shimmy_root_key: String,
}

fn decode_key<const N: usize>(encoded: &str) -> Result<[u8; N], UplinkError> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| UplinkError::InvalidSecretsFormat(e.to_string()))?;

    bytes.try_into().map_err(|_| {
        UplinkError::InvalidSecretsFormat(format!("expected a {} byte key", N))
    })
}

fn parse_channel(channel: &str) -> Result<u32, UplinkError> {
    channel
        .parse()
        .map_err(|_| UplinkError::InvalidSecretsFormat(format!("bad channel id {channel:?}")))
}

impl GlobalSecrets {
    /// Generate fresh secrets for the given channels. The list is
    /// deduplicated and the broadcast channel is always added.
    pub fn generate(channels: &[u32]) -> GlobalSecrets {
        let (enc_private_key, enc_public_key) = crypto::generate_signing_keypair();

        let mut ids: BTreeSet<u32> = channels.iter().copied().collect();
        ids.insert(BROADCAST_CHANNEL);

        let channel_keys = ids.iter().map(|&ch| (ch, crypto::generate_key())).collect();
        let tree_root_keys = ids
            .iter()
            .map(|&ch| (ch, TreeKey(crypto::generate_key())))
            .collect();

        GlobalSecrets {
            enc_private_key,
            enc_public_key,
            id_root_key: crypto::generate_key(),
            channel_keys,
            left_tree_key: crypto::generate_key(),
            right_tree_key: crypto::generate_key(),
            tree_root_keys,
            symbol_shimmy_root_key: crypto::generate_key(),
        }
    }

    /// Serialize to the JSON interchange format shared with the decoder
    /// build. [`deserialize`] round-trips this unchanged.
    ///
    /// [`deserialize`]: GlobalSecrets::deserialize
    pub fn serialize(&self) -> Vec<u8> {
        let file = SecretsFile {
            enc_private_key: BASE64.encode(self.enc_private_key),
            enc_public_key: BASE64.encode(self.enc_public_key),
            id_root_key: BASE64.encode(self.id_root_key),
            channel_keys: self
                .channel_keys
                .iter()
                .map(|(ch, key)| (ch.to_string(), BASE64.encode(key)))
                .collect(),
            left_tree_key: BASE64.encode(self.left_tree_key),
            right_tree_key: BASE64.encode(self.right_tree_key),
            tree_root_keys: self
                .tree_root_keys
                .iter()
                .map(|(ch, key)| (ch.to_string(), BASE64.encode(key.0)))
                .collect(),
            symbol_shimmy_root_key: BASE64.encode(self.symbol_shimmy_root_key),
        };

        serde_json::to_vec(&file).unwrap()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<GlobalSecrets, UplinkError> {
        let file: SecretsFile = serde_json::from_slice(bytes)
            .map_err(|e| UplinkError::InvalidSecretsFormat(e.to_string()))?;

        let channel_keys = file
            .channel_keys
            .iter()
            .map(|(ch, key)| Ok((parse_channel(ch)?, decode_key(key)?)))
            .collect::<Result<_, UplinkError>>()?;

        let tree_root_keys = file
            .tree_root_keys
            .iter()
            .map(|(ch, key)| Ok((parse_channel(ch)?, TreeKey(decode_key(key)?))))
            .collect::<Result<_, UplinkError>>()?;

        Ok(GlobalSecrets {
            enc_private_key: decode_key(&file.enc_private_key)?,
            enc_public_key: decode_key(&file.enc_public_key)?,
            id_root_key: decode_key(&file.id_root_key)?,
            channel_keys,
            left_tree_key: decode_key(&file.left_tree_key)?,
            right_tree_key: decode_key(&file.right_tree_key)?,
            tree_root_keys,
            symbol_shimmy_root_key: decode_key(&file.symbol_shimmy_root_key)?,
        })
    }

    /// Derive the identity key a device's subscription updates are encrypted
    /// under.
    pub fn derive_id_key(&self, device_id: u32) -> [u8; SYMMETRIC_KEY_LEN] {
        kdf_id(&self.id_root_key, device_id)
    }

    /// Seed for the link-time symbol shuffler. Same construction as the id
    /// key under a separate root.
    pub fn symbol_shimmy_seed(&self, device_id: u32) -> [u8; SYMMETRIC_KEY_LEN] {
        kdf_id(&self.symbol_shimmy_root_key, device_id)
    }

    pub fn channel_key(&self, channel: u32) -> Result<&[u8; SYMMETRIC_KEY_LEN], UplinkError> {
        self.channel_keys
            .get(&channel)
            .ok_or(UplinkError::UnknownChannel(channel))
    }

    /// Walk the KDF tree from the channel root down to `vertex`, taking the
    /// most significant bits of the prefix first. The root vertex `(0, 0)` is
    /// the channel root itself.
    pub fn derive_tree_key(&self, channel: u32, vertex: &Vertex) -> Result<TreeKey, UplinkError> {
        let mut key = *self
            .tree_root_keys
            .get(&channel)
            .ok_or(UplinkError::UnknownChannel(channel))?;

        for level in (0..vertex.bits).rev() {
            let direction = if vertex.prefix >> level & 1 == 0 {
                &self.left_tree_key
            } else {
                &self.right_tree_key
            };
            key = kdf_tree_child(&key, direction);
        }

        Ok(key)
    }
}
