use crate::crypto::{
    encrypt_symmetric, sign_asymmetric, SIGNATURE_LEN, SYMMETRIC_KEY_LEN, SYMMETRIC_METADATA_LEN,
    TREE_KEY_LEN,
};
use crate::error::UplinkError;
use crate::secrets::GlobalSecrets;
use crate::tree::cover_range;
use crate::wire::{FieldReader, FieldWriter};

/// Number of tree keys a subscription can carry. Covers of a full `u64`
/// range never need more, but the builder still checks.
pub const MAX_TREE_KEYS: usize = 126;

/// "BNYA" in little-endian order; validates an embeddable subscription.
pub const SUBSCRIPTION_MAGIC: u32 = 0x41594E42;

/// Plaintext subscription blob, either burned into a decoder's flash at
/// build time or encrypted into an over-the-air update.
pub struct ValidSubscription {
    /// Tree keys covering `[start, end]`, in timeline order, zero-padded.
    pub ktree: [u8; MAX_TREE_KEYS * TREE_KEY_LEN],
    pub kch: [u8; SYMMETRIC_KEY_LEN],
    pub start: u64,
    pub end: u64,
    pub channel: u32,
    pub key_count: u32,
    pub magic: u32,
}

impl ValidSubscription {
    pub const SIZE: usize = MAX_TREE_KEYS * TREE_KEY_LEN + SYMMETRIC_KEY_LEN + 8 + 8 + 4 + 4 + 4 + 4;

    pub fn pack(&self) -> [u8; Self::SIZE] {
        let mut buf = [0; Self::SIZE];
        let mut writer = FieldWriter::new(&mut buf);
        writer.put_bytes(&self.ktree);
        writer.put_bytes(&self.kch);
        writer.put_u64(self.start);
        writer.put_u64(self.end);
        writer.put_u32(self.channel);
        writer.put_u32(self.key_count);
        writer.put_u32(self.magic);
        writer.pad(4);
        writer.finish();
        buf
    }

    pub fn unpack(buf: &[u8; Self::SIZE]) -> ValidSubscription {
        let mut reader = FieldReader::new(buf);
        let subscription = ValidSubscription {
            ktree: reader.take_bytes(),
            kch: reader.take_bytes(),
            start: reader.take_u64(),
            end: reader.take_u64(),
            channel: reader.take_u32(),
            key_count: reader.take_u32(),
            magic: reader.take_u32(),
        };
        reader.skip(4);
        reader.finish();
        subscription
    }
}

const _: () = assert!(ValidSubscription::SIZE == 2080);

/// Device id and the encrypted subscription blob; the part of an update the
/// signature covers.
pub struct SubscriptionUpdatePayload {
    pub id: u32,
    pub ciphertext: [u8; SYMMETRIC_METADATA_LEN + ValidSubscription::SIZE],
}

impl SubscriptionUpdatePayload {
    pub const SIZE: usize = 4 + SYMMETRIC_METADATA_LEN + ValidSubscription::SIZE;

    pub fn pack(&self) -> [u8; Self::SIZE] {
        let mut buf = [0; Self::SIZE];
        let mut writer = FieldWriter::new(&mut buf);
        writer.put_u32(self.id);
        writer.put_bytes(&self.ciphertext);
        writer.finish();
        buf
    }

    pub fn unpack(buf: &[u8; Self::SIZE]) -> SubscriptionUpdatePayload {
        let mut reader = FieldReader::new(buf);
        let payload = SubscriptionUpdatePayload {
            id: reader.take_u32(),
            ciphertext: reader.take_bytes(),
        };
        reader.finish();
        payload
    }
}

const _: () = assert!(SubscriptionUpdatePayload::SIZE == 2124);

/// The on-wire subscription update.
pub struct SubscriptionUpdate {
    pub payload: [u8; SubscriptionUpdatePayload::SIZE],
    pub sig: [u8; SIGNATURE_LEN],
}

impl SubscriptionUpdate {
    pub const SIZE: usize = SubscriptionUpdatePayload::SIZE + SIGNATURE_LEN;

    pub fn pack(&self) -> [u8; Self::SIZE] {
        let mut buf = [0; Self::SIZE];
        let mut writer = FieldWriter::new(&mut buf);
        writer.put_bytes(&self.payload);
        writer.put_bytes(&self.sig);
        writer.finish();
        buf
    }

    pub fn unpack(buf: &[u8; Self::SIZE]) -> SubscriptionUpdate {
        let mut reader = FieldReader::new(buf);
        let update = SubscriptionUpdate {
            payload: reader.take_bytes(),
            sig: reader.take_bytes(),
        };
        reader.finish();
        update
    }
}

const _: () = assert!(SubscriptionUpdate::SIZE == 2188);

/// Build the plaintext subscription authorizing `channel` over
/// `[start, end]`, suitable for placing directly in a decoder's flash.
pub fn gen_embeddable_subscription(
    secrets: &GlobalSecrets,
    start: u64,
    end: u64,
    channel: u32,
) -> Result<[u8; ValidSubscription::SIZE], UplinkError> {
    let kch = *secrets.channel_key(channel)?;

    let vertices = cover_range(start, end)?;
    if vertices.len() > MAX_TREE_KEYS {
        return Err(UplinkError::OversizedSubscriptionRange(vertices.len()));
    }

    let mut ktree = [0; MAX_TREE_KEYS * TREE_KEY_LEN];
    for (i, vertex) in vertices.iter().enumerate() {
        let key = secrets.derive_tree_key(channel, vertex)?;
        ktree[i * TREE_KEY_LEN..(i + 1) * TREE_KEY_LEN].copy_from_slice(&key.0);
    }

    let subscription = ValidSubscription {
        ktree,
        kch,
        start,
        end,
        channel,
        key_count: vertices.len() as u32,
        magic: SUBSCRIPTION_MAGIC,
    };

    Ok(subscription.pack())
}

/// Build the signed, encrypted over-the-air subscription update for one
/// device.
pub fn gen_subscription(
    secrets: &GlobalSecrets,
    device_id: u32,
    start: u64,
    end: u64,
    channel: u32,
) -> Result<[u8; SubscriptionUpdate::SIZE], UplinkError> {
    let embeddable = gen_embeddable_subscription(secrets, start, end, channel)?;

    let kid = secrets.derive_id_key(device_id);
    let ciphertext = encrypt_symmetric(&embeddable, &kid)?;

    let payload = SubscriptionUpdatePayload {
        id: device_id,
        ciphertext: ciphertext.try_into().unwrap(),
    }
    .pack();

    // The signature covers the device id as well as the ciphertext
    let sig = sign_asymmetric(&payload, &secrets.enc_private_key)?;

    Ok(SubscriptionUpdate { payload, sig }.pack())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;

    #[test]
    fn embeddable_layout() {
        let secrets = GlobalSecrets::generate(&[1]);

        let blob = gen_embeddable_subscription(&secrets, 100, 200, 1).unwrap();
        assert_eq!(blob.len(), ValidSubscription::SIZE);

        let subscription = ValidSubscription::unpack(&blob);
        assert_eq!(subscription.magic, SUBSCRIPTION_MAGIC);
        assert_eq!(subscription.start, 100);
        assert_eq!(subscription.end, 200);
        assert_eq!(subscription.channel, 1);
        assert_eq!(subscription.kch, *secrets.channel_key(1).unwrap());

        let vertices = cover_range(100, 200).unwrap();
        assert_eq!(subscription.key_count as usize, vertices.len());
        for (i, vertex) in vertices.iter().enumerate() {
            let key = secrets.derive_tree_key(1, vertex).unwrap();
            assert_eq!(
                subscription.ktree[i * TREE_KEY_LEN..(i + 1) * TREE_KEY_LEN],
                key.0
            );
        }
        assert!(subscription.ktree[vertices.len() * TREE_KEY_LEN..]
            .iter()
            .all(|&b| b == 0));
    }

    #[test]
    fn magic_is_bnya() {
        let secrets = GlobalSecrets::generate(&[1]);

        let blob = gen_embeddable_subscription(&secrets, 0, 0, 1).unwrap();

        assert_eq!(&blob[2072..2076], b"BNYA");
        assert_eq!(blob[2076..], [0; 4]);
    }

    #[test]
    fn update_envelope_layout() {
        let secrets = GlobalSecrets::generate(&[1]);

        let update = gen_subscription(&secrets, 0xDEAD_BEEF, 100, 200, 1).unwrap();
        assert_eq!(update.len(), SubscriptionUpdate::SIZE);

        // Device id is the first field, in the clear and authenticated
        assert_eq!(u32::from_le_bytes(update[..4].try_into().unwrap()), 0xDEAD_BEEF);

        let unpacked = SubscriptionUpdate::unpack(&update);
        assert!(crypto::verify_signature(
            &unpacked.payload,
            &unpacked.sig,
            &secrets.enc_public_key
        ));
    }

    #[test]
    fn update_ciphertext_decrypts_to_the_embeddable_form() {
        let secrets = GlobalSecrets::generate(&[1]);
        let device_id = 7;

        let update = gen_subscription(&secrets, device_id, 100, 200, 1).unwrap();
        let payload =
            SubscriptionUpdatePayload::unpack(&SubscriptionUpdate::unpack(&update).payload);
        assert_eq!(payload.id, device_id);

        let kid = secrets.derive_id_key(device_id);
        let plaintext = crypto::decrypt_symmetric(&payload.ciphertext, &kid).unwrap();

        assert_eq!(
            plaintext,
            gen_embeddable_subscription(&secrets, 100, 200, 1).unwrap()
        );
    }

    #[test]
    fn updates_for_the_same_range_differ() {
        let secrets = GlobalSecrets::generate(&[1]);

        let a = gen_subscription(&secrets, 7, 100, 200, 1).unwrap();
        let b = gen_subscription(&secrets, 7, 100, 200, 1).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let secrets = GlobalSecrets::generate(&[1]);

        assert!(matches!(
            gen_subscription(&secrets, 0, 0, 0, 9),
            Err(UplinkError::UnknownChannel(9))
        ));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let secrets = GlobalSecrets::generate(&[1]);

        assert!(matches!(
            gen_subscription(&secrets, 0, 5, 4, 1),
            Err(UplinkError::InvalidRange { start: 5, end: 4 })
        ));
    }

    #[test]
    fn worst_case_cover_fills_the_key_table() {
        let secrets = GlobalSecrets::generate(&[1]);

        let blob = gen_embeddable_subscription(&secrets, 1, u64::MAX - 1, 1).unwrap();

        let subscription = ValidSubscription::unpack(&blob);
        assert_eq!(subscription.key_count as usize, MAX_TREE_KEYS);
    }
}
