//! Built-in page features known to the system by name.

use serde::Serialize;

use crate::consts::IV_LEN;

/// Default tag length of the page AEAD (AES-GCM).
const DEFAULT_TAG_LEN: usize = 16;

/// Bit position in the built-in bitmap == discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(u8)]
pub enum BuiltinFeature {
    /// IV + authentication tag of the page AEAD.
    EncryptionTags = 0,
    /// Wide page checksum (up to 512 bits of storage).
    ExtendedChecksums = 1,
}

impl BuiltinFeature {
    pub const ALL: [BuiltinFeature; 2] = [
        BuiltinFeature::EncryptionTags,
        BuiltinFeature::ExtendedChecksums,
    ];

    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn bit(self) -> u16 {
        1u16 << self.id()
    }

    pub fn name(self) -> &'static str {
        match self {
            BuiltinFeature::EncryptionTags => "encryption_tags",
            BuiltinFeature::ExtendedChecksums => "extended_checksums",
        }
    }

    /// Size used when the feature is added with size 0.
    pub fn default_size(self) -> usize {
        match self {
            BuiltinFeature::EncryptionTags => IV_LEN + DEFAULT_TAG_LEN,
            BuiltinFeature::ExtendedChecksums => 64,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lookup() {
        assert_eq!(
            BuiltinFeature::from_name("encryption_tags"),
            Some(BuiltinFeature::EncryptionTags)
        );
        assert_eq!(BuiltinFeature::from_name("mine"), None);
        assert_eq!(BuiltinFeature::ExtendedChecksums.bit(), 0b10);
        assert_eq!(BuiltinFeature::EncryptionTags.default_size(), 32);
    }
}
