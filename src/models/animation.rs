//! Keyframed skeletal animation (`SKL2`, `BLN2`, `ANM2`).

use glam::{Quat, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TranslationFrame {
    pub index: u32,
    pub translation: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RotationFrame {
    pub index: u32,
    pub rotation: Quat,
}

/// Sparse keyframes for one bone, keyed by the bone name's CRC.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoneFrames {
    pub bone_crc: u32,
    /// Keyframe type from `KFR3`. Always written as 0.
    pub keyframe_type: u32,
    pub translations: Vec<TranslationFrame>,
    pub rotations: Vec<RotationFrame>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Animation {
    pub name: String,
    pub framerate: f32,
    pub start_index: u32,
    pub end_index: u32,
    /// Bones in insertion order, which is also the on-disk order.
    pub bone_frames: Vec<BoneFrames>,
}

impl Default for Animation {
    fn default() -> Self {
        Self {
            name: "fullanimation".to_string(),
            framerate: 29.97,
            start_index: 0,
            end_index: 0,
            bone_frames: Vec::new(),
        }
    }
}

impl Animation {
    pub fn bone(&self, bone_crc: u32) -> Option<&BoneFrames> {
        self.bone_frames.iter().find(|b| b.bone_crc == bone_crc)
    }

    /// Frames for `bone_crc`, created on first use.
    pub fn bone_mut(&mut self, bone_crc: u32) -> &mut BoneFrames {
        let index = match self.bone_frames.iter().position(|b| b.bone_crc == bone_crc) {
            Some(index) => index,
            None => {
                self.bone_frames.push(BoneFrames {
                    bone_crc,
                    ..Default::default()
                });
                self.bone_frames.len() - 1
            }
        };
        &mut self.bone_frames[index]
    }

    pub fn bone_crcs(&self) -> impl Iterator<Item = u32> + '_ {
        self.bone_frames.iter().map(|b| b.bone_crc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bone_mut_preserves_insertion_order() {
        let mut anim = Animation::default();
        anim.bone_mut(30).translations.push(TranslationFrame {
            index: 0,
            translation: Vec3::X,
        });
        anim.bone_mut(10);
        anim.bone_mut(30).rotations.push(RotationFrame {
            index: 1,
            rotation: Quat::IDENTITY,
        });
        assert_eq!(anim.bone_crcs().collect::<Vec<_>>(), vec![30, 10]);
        let bone = anim.bone(30).unwrap();
        assert_eq!(bone.translations.len(), 1);
        assert_eq!(bone.rotations.len(), 1);
    }
}
