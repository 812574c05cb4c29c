// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-fiber mutation flags and per-effect tags.

bitflags::bitflags! {
    /// Pending work recorded on a fiber during render and consumed by commit.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Flags: u8 {
        /// Insert or move the fiber's host nodes.
        const PLACEMENT      = 0b0000_0001;
        /// Apply changed props or text to the host instance.
        const UPDATE         = 0b0000_0010;
        /// One or more children are listed in `deletions`.
        const CHILD_DELETION = 0b0000_0100;
        /// The fiber has passive effects to run after commit.
        const PASSIVE_EFFECT = 0b0000_1000;
        /// The fiber's ref was attached, removed, or reassigned.
        const REF            = 0b0001_0000;
    }
}

impl Flags {
    /// Flags handled by the mutation sub-phase.
    pub const MUTATION_MASK: Self = Self::PLACEMENT
        .union(Self::UPDATE)
        .union(Self::CHILD_DELETION)
        .union(Self::REF);

    /// Flags handled by the layout sub-phase.
    pub const LAYOUT_MASK: Self = Self::REF;

    /// Flags that require a passive-effect flush after commit.
    ///
    /// Deletions are included since unmounting runs effect destroys.
    pub const PASSIVE_MASK: Self = Self::PASSIVE_EFFECT.union(Self::CHILD_DELETION);
}

bitflags::bitflags! {
    /// Tags on a single effect record.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EffectTags: u8 {
        /// The effect carries a passive callback.
        const HAS_CALLBACK    = 0b01;
        /// Dependencies changed; destroy and create run on the next flush.
        const NEEDS_EXECUTION = 0b10;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_cover_expected_flags() {
        assert!(Flags::MUTATION_MASK.contains(Flags::PLACEMENT | Flags::UPDATE));
        assert!(!Flags::MUTATION_MASK.contains(Flags::PASSIVE_EFFECT));
        assert!(Flags::PASSIVE_MASK.intersects(Flags::CHILD_DELETION));
        assert_eq!(Flags::LAYOUT_MASK, Flags::REF);
    }
}
