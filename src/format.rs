//! Defines the physical binary layout of a graphwire stream.
//!
//! # Stream Layout
//! A stream starts with the 4-byte [`MAGIC`] prefix, written once per session, followed
//! by a sequence of values. Every value starts with a one-byte tag:
//!
//! ```text
//! TYPE_BLOCK (1) : count(4) · count × TypeDescriptor      (may precede any tag)
//! OBJECT     (2) : handle(4) [ · type_handle(4) · payload ] (payload only on first sight)
//! NULL       (3)
//! TYPE_VALUE (4) : type_handle(4)
//! ```
//!
//! All multi-byte integers are big-endian.

use crate::value::PrimitiveKind;
use bitflags::bitflags;

/// Magic bytes identifying a graphwire stream: "GWIR".
pub const MAGIC: [u8; 4] = *b"GWIR";

/// Tag introducing a block of new type descriptors.
pub const TAG_TYPE_BLOCK: u8 = 1;
/// Tag introducing an object record or a back-reference.
pub const TAG_OBJECT: u8 = 2;
/// Tag for the null reference.
pub const TAG_NULL: u8 = 3;
/// Tag for a reference to a type itself.
pub const TAG_TYPE_VALUE: u8 = 4;

/// Handle of the universal root type in the bootstrap table.
pub const ROOT_HANDLE: u32 = 10;
/// Handle of the string type in the bootstrap table.
pub const STRING_HANDLE: u32 = 11;
/// First descriptor handle assigned by a session.
pub const FIRST_DYNAMIC_HANDLE: u32 = 12;
/// First object handle assigned by a session.
pub const FIRST_OBJECT_HANDLE: u32 = 1;

/// Wire name of the universal root type.
pub const ROOT_WIRE_NAME: &str = "object";
/// Wire name of the string type.
pub const STRING_WIRE_NAME: &str = "string";
/// Prefix marking an array wire name, followed by the component's wire name.
pub const ARRAY_PREFIX: char = '[';
/// Deepest array nesting a wire name may describe.
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

/// Returns the bootstrap handle for a primitive kind.
///
/// Primitive handles are `1..=9` in the order of [`PrimitiveKind::ALL`].
pub const fn primitive_handle(kind: PrimitiveKind) -> u32 {
    kind.code() as u32
}

bitflags! {
    /// Descriptor flag byte.
    ///
    /// `PRIMITIVE`, `ARRAY` and `ENUM` are mutually exclusive; `HAS_HOOK` and
    /// `EXTERNALIZABLE` only apply to plain types.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeFlags: u8 {
        /// A primitive scalar type.
        const PRIMITIVE = 0x01;
        /// An array type; the descriptor carries a component handle.
        const ARRAY = 0x02;
        /// An enum type, encoded by constant name.
        const ENUM = 0x04;
        /// The type supplies its own read/write hook.
        const HAS_HOOK = 0x08;
        /// The type encodes its whole payload itself.
        const EXTERNALIZABLE = 0x10;
    }
}

impl TypeFlags {
    /// Returns true if the flag combination is one the codec can produce.
    pub fn is_consistent(self) -> bool {
        let kinds = (self & (Self::PRIMITIVE | Self::ARRAY | Self::ENUM)).bits().count_ones();
        let strategies = self & (Self::HAS_HOOK | Self::EXTERNALIZABLE);
        if kinds > 1 || strategies == (Self::HAS_HOOK | Self::EXTERNALIZABLE) {
            return false;
        }
        kinds == 0 || strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_handles_precede_root_and_string() {
        let handles: Vec<u32> = PrimitiveKind::ALL.iter().map(|k| primitive_handle(*k)).collect();
        assert_eq!(handles, (1..=9).collect::<Vec<_>>());
        assert!(handles.iter().all(|h| *h < ROOT_HANDLE));
        assert_eq!(STRING_HANDLE + 1, FIRST_DYNAMIC_HANDLE);
    }

    #[test]
    fn flag_consistency() {
        assert!(TypeFlags::empty().is_consistent());
        assert!(TypeFlags::HAS_HOOK.is_consistent());
        assert!(TypeFlags::ARRAY.is_consistent());
        assert!(!(TypeFlags::ARRAY | TypeFlags::ENUM).is_consistent());
        assert!(!(TypeFlags::ENUM | TypeFlags::HAS_HOOK).is_consistent());
        assert!(!(TypeFlags::HAS_HOOK | TypeFlags::EXTERNALIZABLE).is_consistent());
    }
}
