use libuplink::secrets::GlobalSecrets;

/// Format a key as a C `uint8_t` array literal, 16 bytes per line.
fn byte_array(key: &[u8]) -> String {
    let lines: Vec<String> = key
        .chunks(16)
        .map(|chunk| {
            let bytes: Vec<String> = chunk.iter().map(|b| format!("0x{b:02X}")).collect();
            format!("    {}", bytes.join(", "))
        })
        .collect();

    format!("{{\n{}}}", lines.join(",\n"))
}

/// Render the C source embedding the keys one decoder build needs: the
/// deployment's verifying key, the device's id key, and the two tree
/// direction keys.
pub fn generate(secrets: &GlobalSecrets, device_id: u32) -> String {
    let id_key = secrets.derive_id_key(device_id);

    format!(
        r#"#include "secrets.h"

#include "crypto_wrappers.h"
#include <stdint.h>

const uint8_t ENCODER_PUBLIC_KEY[PUBLIC_KEY_LEN] = {enc_public_key};

const uint8_t ID_KEY[SYMMETRIC_KEY_LEN] = {id_key};

const uint8_t LEFT_TREE_KEY[SYMMETRIC_KEY_LEN] = {left_tree_key};

const uint8_t RIGHT_TREE_KEY[SYMMETRIC_KEY_LEN] = {right_tree_key};
"#,
        enc_public_key = byte_array(&secrets.enc_public_key),
        id_key = byte_array(&id_key),
        left_tree_key = byte_array(&secrets.left_tree_key),
        right_tree_key = byte_array(&secrets.right_tree_key),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_arrays_wrap_every_sixteen_bytes() {
        let mut key = [0u8; 32];
        key[0] = 0xAB;
        key[16] = 0x01;

        let rendered = byte_array(&key);

        assert!(rendered.starts_with("{\n    0xAB, 0x00"));
        assert!(rendered.contains(",\n    0x01, 0x00"));
        assert!(rendered.ends_with("0x00}"));
        assert_eq!(rendered.matches("0x").count(), 32);
    }

    #[test]
    fn header_names_every_embedded_key() {
        let secrets = GlobalSecrets::generate(&[1]);

        let header = generate(&secrets, 0xDEAD_BEEF);

        for name in [
            "ENCODER_PUBLIC_KEY[PUBLIC_KEY_LEN]",
            "ID_KEY[SYMMETRIC_KEY_LEN]",
            "LEFT_TREE_KEY[SYMMETRIC_KEY_LEN]",
            "RIGHT_TREE_KEY[SYMMETRIC_KEY_LEN]",
        ] {
            assert!(header.contains(name), "{name} missing");
        }
    }
}
