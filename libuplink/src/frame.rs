use crate::crypto::{
    encrypt_symmetric, kdf_tree_leaf, sign_asymmetric, SIGNATURE_LEN, SYMMETRIC_METADATA_LEN,
};
use crate::error::UplinkError;
use crate::secrets::GlobalSecrets;
use crate::tree::Vertex;
use crate::wire::{FieldReader, FieldWriter};

/// Longest frame a packet can carry.
pub const MAX_FRAME_SIZE: usize = 64;

/// Length-prefixed frame contents. `length` is authoritative; the padding
/// after it is meaningless.
pub struct FrameData {
    pub length: u32,
    pub frame: [u8; MAX_FRAME_SIZE],
}

impl FrameData {
    pub const SIZE: usize = 4 + MAX_FRAME_SIZE;

    pub fn pack(&self) -> [u8; Self::SIZE] {
        let mut buf = [0; Self::SIZE];
        let mut writer = FieldWriter::new(&mut buf);
        writer.put_u32(self.length);
        writer.put_bytes(&self.frame);
        writer.finish();
        buf
    }

    pub fn unpack(buf: &[u8; Self::SIZE]) -> FrameData {
        let mut reader = FieldReader::new(buf);
        let data = FrameData {
            length: reader.take_u32(),
            frame: reader.take_bytes(),
        };
        reader.finish();
        data
    }
}

const _: () = assert!(FrameData::SIZE == 68);

/// Timestamp and the frame ciphertext under that timestamp's leaf key.
pub struct FrameCh {
    pub timestamp: u64,
    pub ciphertext: [u8; SYMMETRIC_METADATA_LEN + FrameData::SIZE],
}

impl FrameCh {
    pub const SIZE: usize = 8 + SYMMETRIC_METADATA_LEN + FrameData::SIZE + 4;

    pub fn pack(&self) -> [u8; Self::SIZE] {
        let mut buf = [0; Self::SIZE];
        let mut writer = FieldWriter::new(&mut buf);
        writer.put_u64(self.timestamp);
        writer.put_bytes(&self.ciphertext);
        writer.pad(4);
        writer.finish();
        buf
    }

    pub fn unpack(buf: &[u8; Self::SIZE]) -> FrameCh {
        let mut reader = FieldReader::new(buf);
        let frame_ch = FrameCh {
            timestamp: reader.take_u64(),
            ciphertext: reader.take_bytes(),
        };
        reader.skip(4);
        reader.finish();
        frame_ch
    }
}

const _: () = assert!(FrameCh::SIZE == 120);

/// Channel id and the channel-key ciphertext; the part of a packet the
/// signature covers.
pub struct FramePacketPayload {
    pub channel_id: u32,
    pub enc_frame: [u8; SYMMETRIC_METADATA_LEN + FrameCh::SIZE],
}

impl FramePacketPayload {
    pub const SIZE: usize = 4 + SYMMETRIC_METADATA_LEN + FrameCh::SIZE;

    pub fn pack(&self) -> [u8; Self::SIZE] {
        let mut buf = [0; Self::SIZE];
        let mut writer = FieldWriter::new(&mut buf);
        writer.put_u32(self.channel_id);
        writer.put_bytes(&self.enc_frame);
        writer.finish();
        buf
    }

    pub fn unpack(buf: &[u8; Self::SIZE]) -> FramePacketPayload {
        let mut reader = FieldReader::new(buf);
        let payload = FramePacketPayload {
            channel_id: reader.take_u32(),
            enc_frame: reader.take_bytes(),
        };
        reader.finish();
        payload
    }
}

const _: () = assert!(FramePacketPayload::SIZE == 164);

/// The on-wire frame packet.
pub struct FramePacket {
    pub payload: [u8; FramePacketPayload::SIZE],
    pub signature: [u8; SIGNATURE_LEN],
}

impl FramePacket {
    pub const SIZE: usize = FramePacketPayload::SIZE + SIGNATURE_LEN;

    pub fn pack(&self) -> [u8; Self::SIZE] {
        let mut buf = [0; Self::SIZE];
        let mut writer = FieldWriter::new(&mut buf);
        writer.put_bytes(&self.payload);
        writer.put_bytes(&self.signature);
        writer.finish();
        buf
    }

    pub fn unpack(buf: &[u8; Self::SIZE]) -> FramePacket {
        let mut reader = FieldReader::new(buf);
        let packet = FramePacket {
            payload: reader.take_bytes(),
            signature: reader.take_bytes(),
        };
        reader.finish();
        packet
    }
}

const _: () = assert!(FramePacket::SIZE == 228);

/// Encodes frames for broadcast under one deployment's secrets.
pub struct Encoder {
    secrets: GlobalSecrets,
}

impl Encoder {
    pub fn new(secrets: GlobalSecrets) -> Encoder {
        Encoder { secrets }
    }

    /// Parse a serialized secrets bundle and build an encoder over it.
    pub fn from_bytes(serialized: &[u8]) -> Result<Encoder, UplinkError> {
        Ok(Encoder::new(GlobalSecrets::deserialize(serialized)?))
    }

    /// Wrap one frame for `channel` at `timestamp` into a signed packet.
    ///
    /// Three nested layers: the timestamp's leaf key proves time and channel,
    /// the channel key proves channel membership, and the signature proves
    /// deployment origin.
    pub fn encode(
        &self,
        channel: u32,
        frame: &[u8],
        timestamp: u64,
    ) -> Result<[u8; FramePacket::SIZE], UplinkError> {
        let kch = *self.secrets.channel_key(channel)?;

        if frame.len() > MAX_FRAME_SIZE {
            return Err(UplinkError::OversizedFrame(frame.len()));
        }

        let mut padded = [0; MAX_FRAME_SIZE];
        padded[..frame.len()].copy_from_slice(frame);
        let frame_data = FrameData {
            length: frame.len() as u32,
            frame: padded,
        }
        .pack();

        // Leaf key for this exact timestamp on this channel
        let leaf = Vertex::new(timestamp, Vertex::MAX_BITS);
        let ktree = kdf_tree_leaf(&self.secrets.derive_tree_key(channel, &leaf)?);
        let enc_frame = encrypt_symmetric(&frame_data, &ktree)?;

        let frame_ch = FrameCh {
            timestamp,
            ciphertext: enc_frame.try_into().unwrap(),
        }
        .pack();
        let enc_timestamp = encrypt_symmetric(&frame_ch, &kch)?;

        let payload = FramePacketPayload {
            channel_id: channel,
            enc_frame: enc_timestamp.try_into().unwrap(),
        }
        .pack();
        let signature = sign_asymmetric(&payload, &self.secrets.enc_private_key)?;

        Ok(FramePacket { payload, signature }.pack())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;

    fn deployment() -> GlobalSecrets {
        GlobalSecrets::generate(&[1, 2])
    }

    #[test]
    fn unknown_channel_is_a_typed_error() {
        let encoder = Encoder::new(deployment());

        assert!(matches!(
            encoder.encode(42, b"frame", 0),
            Err(UplinkError::UnknownChannel(42))
        ));
    }

    #[test]
    fn oversized_frames_are_rejected() {
        let encoder = Encoder::new(deployment());

        assert!(matches!(
            encoder.encode(1, &[0; MAX_FRAME_SIZE + 1], 0),
            Err(UplinkError::OversizedFrame(65))
        ));
    }

    #[test]
    fn packet_layout_and_signature() {
        let secrets = deployment();
        let encoder = Encoder::new(secrets.clone());

        let packet = encoder.encode(1, &[0xAB; MAX_FRAME_SIZE], 0).unwrap();
        assert_eq!(packet.len(), FramePacket::SIZE);

        let unpacked = FramePacket::unpack(&packet);
        let payload = FramePacketPayload::unpack(&unpacked.payload);
        assert_eq!(payload.channel_id, 1);
        assert!(crypto::verify_signature(
            &unpacked.payload,
            &unpacked.signature,
            &secrets.enc_public_key
        ));
    }

    #[test]
    fn reencoding_draws_fresh_nonces() {
        let secrets = deployment();
        let encoder = Encoder::new(secrets.clone());

        let a = encoder.encode(1, &[0xAB; MAX_FRAME_SIZE], 0).unwrap();
        let b = encoder.encode(1, &[0xAB; MAX_FRAME_SIZE], 0).unwrap();

        assert_ne!(a, b);

        for packet in [a, b] {
            let unpacked = FramePacket::unpack(&packet);
            assert_eq!(FramePacketPayload::unpack(&unpacked.payload).channel_id, 1);
            assert!(crypto::verify_signature(
                &unpacked.payload,
                &unpacked.signature,
                &secrets.enc_public_key
            ));
        }
    }

    #[test]
    fn packet_unwraps_to_the_original_frame() {
        let secrets = deployment();
        let encoder = Encoder::new(secrets.clone());
        let timestamp = 77_777;

        let packet = encoder.encode(2, b"short frame", timestamp).unwrap();

        let payload = FramePacketPayload::unpack(&FramePacket::unpack(&packet).payload);
        let frame_ch_bytes =
            crypto::decrypt_symmetric(&payload.enc_frame, secrets.channel_key(2).unwrap()).unwrap();
        let frame_ch = FrameCh::unpack(frame_ch_bytes.as_slice().try_into().unwrap());
        assert_eq!(frame_ch.timestamp, timestamp);

        let leaf = secrets
            .derive_tree_key(2, &Vertex::new(timestamp, Vertex::MAX_BITS))
            .unwrap();
        let frame_data_bytes =
            crypto::decrypt_symmetric(&frame_ch.ciphertext, &kdf_tree_leaf(&leaf)).unwrap();
        let frame_data = FrameData::unpack(frame_data_bytes.as_slice().try_into().unwrap());

        assert_eq!(frame_data.length, 11);
        assert_eq!(&frame_data.frame[..11], b"short frame");
        assert_eq!(frame_data.frame[11..], [0; 53]);
    }

    #[test]
    fn from_bytes_surfaces_parse_failures() {
        assert!(matches!(
            Encoder::from_bytes(b"{"),
            Err(UplinkError::InvalidSecretsFormat(_))
        ));

        let secrets = deployment();
        assert!(Encoder::from_bytes(&secrets.serialize()).is_ok());
    }
}
