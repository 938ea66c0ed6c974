//! Case-insensitive CRC-32 used by the engine to hash bone, model and
//! animation names.
//!
//! The engine's hash is CRC-32/BZIP2 over the name with ASCII letters
//! lowercased.

use crc::{CRC_32_BZIP2, Crc};

const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_BZIP2);

/// Hash a name the way the engine does.
pub fn to_crc(name: &str) -> u32 {
    let mut digest = CRC.digest();
    for b in name.bytes() {
        digest.update(&[b.to_ascii_lowercase()]);
    }
    digest.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(to_crc("123456789"), 0xFC89_1918);
    }

    #[test]
    fn test_known_bone_names() {
        assert_eq!(to_crc("bone_root"), 0x16E2_7226);
        assert_eq!(to_crc("Bone_Pelvis"), 0xE6E4_7876);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(to_crc("Bone_Root"), to_crc("bone_root"));
        assert_ne!(to_crc("bone_root"), to_crc("bone_pelvis"));
    }

    #[test]
    fn test_empty_name() {
        assert_eq!(to_crc(""), 0);
    }
}
