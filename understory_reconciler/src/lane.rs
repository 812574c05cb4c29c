// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Priority lanes: urgency encoded as bit positions.
//!
//! A lane is a single bit; a set of lanes is the OR of its members. The lowest
//! set bit is the most urgent lane in a set, so [`highest_priority`] is a
//! two's-complement trick rather than a search.
//!
//! ```
//! use understory_reconciler::lane::{Lanes, highest_priority, is_subset_of_lanes, merge_lanes};
//!
//! let pending = merge_lanes(Lanes::DEFAULT, Lanes::TRANSITION);
//! assert_eq!(highest_priority(pending), Lanes::DEFAULT);
//! assert!(is_subset_of_lanes(pending, Lanes::TRANSITION));
//! assert!(!is_subset_of_lanes(pending, Lanes::SYNC));
//! ```

bitflags::bitflags! {
    /// A set of priority lanes. Numerically smaller bits are more urgent.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Lanes: u32 {
        /// Discrete, user-visible input that must be reflected before the next frame.
        const SYNC             = 0b0_0001;
        /// Continuous input such as drags and scrolls.
        const INPUT_CONTINUOUS = 0b0_0010;
        /// Ordinary updates with no explicit priority context.
        const DEFAULT          = 0b0_0100;
        /// Updates requested inside a transition.
        const TRANSITION       = 0b0_1000;
        /// Work that may wait until nothing else is pending.
        const IDLE             = 0b1_0000;
    }
}

/// A single lane. Same representation as [`Lanes`]; by convention exactly one bit is set.
pub type Lane = Lanes;

/// The empty lane, used for updates that apply under every render.
pub const NO_LANE: Lane = Lanes::empty();

/// Union of two lane sets.
#[inline]
#[must_use]
pub fn merge_lanes(a: Lanes, b: Lanes) -> Lanes {
    a | b
}

/// The most urgent lane in `lanes`, or [`NO_LANE`] if the set is empty.
#[inline]
#[must_use]
pub fn highest_priority(lanes: Lanes) -> Lane {
    let bits = lanes.bits();
    Lanes::from_bits_retain(bits & bits.wrapping_neg())
}

/// Whether `subset` is fully contained in `set`.
///
/// An update is applied by a render when its lane is a subset of the lanes
/// being rendered. [`NO_LANE`] is a subset of every set.
#[inline]
#[must_use]
pub fn is_subset_of_lanes(set: Lanes, subset: Lanes) -> bool {
    (set & subset) == subset
}

/// Priority levels of the external cooperative scheduler.
///
/// Ordered from most to least urgent, so `Ord` sorts a run queue directly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Run before anything else.
    Immediate,
    /// Run soon; the user is waiting on the result.
    UserBlocking,
    /// Run in order with other ordinary work.
    #[default]
    Normal,
    /// Run when nothing more urgent is queued.
    Low,
    /// Run only when the queue is otherwise idle.
    Idle,
}

/// Map the most urgent lane in `lanes` to a scheduler priority.
///
/// An empty set maps to [`Priority::Idle`].
#[must_use]
pub fn lanes_to_priority(lanes: Lanes) -> Priority {
    let lane = highest_priority(lanes);
    if lane == Lanes::SYNC {
        Priority::Immediate
    } else if lane == Lanes::INPUT_CONTINUOUS {
        Priority::UserBlocking
    } else if lane == Lanes::DEFAULT {
        Priority::Normal
    } else if lane == Lanes::TRANSITION {
        Priority::Low
    } else {
        Priority::Idle
    }
}

/// Map a scheduler priority back to the lane an update requested under it receives.
#[must_use]
pub fn priority_to_lane(priority: Priority) -> Lane {
    match priority {
        Priority::Immediate => Lanes::SYNC,
        Priority::UserBlocking => Lanes::INPUT_CONTINUOUS,
        Priority::Normal => Lanes::DEFAULT,
        Priority::Low => Lanes::TRANSITION,
        Priority::Idle => Lanes::IDLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn highest_priority_picks_lowest_bit() {
        let set = Lanes::TRANSITION | Lanes::INPUT_CONTINUOUS | Lanes::IDLE;
        assert_eq!(highest_priority(set), Lanes::INPUT_CONTINUOUS);
        assert_eq!(highest_priority(NO_LANE), NO_LANE);
        assert_eq!(highest_priority(Lanes::all()), Lanes::SYNC);
    }

    #[test]
    fn no_lane_is_always_satisfied() {
        assert!(is_subset_of_lanes(Lanes::SYNC, NO_LANE));
        assert!(is_subset_of_lanes(NO_LANE, NO_LANE));
        assert!(!is_subset_of_lanes(NO_LANE, Lanes::DEFAULT));
    }

    #[test]
    fn priority_mapping_round_trips_for_every_lane() {
        for lane in [
            Lanes::SYNC,
            Lanes::INPUT_CONTINUOUS,
            Lanes::DEFAULT,
            Lanes::TRANSITION,
            Lanes::IDLE,
        ] {
            assert_eq!(priority_to_lane(lanes_to_priority(lane)), lane);
        }
        assert_eq!(lanes_to_priority(NO_LANE), Priority::Idle);
        assert_eq!(
            lanes_to_priority(Lanes::DEFAULT | Lanes::SYNC),
            Priority::Immediate,
            "a set maps through its most urgent lane"
        );
    }

    #[test]
    fn priority_orders_most_urgent_first() {
        assert!(Priority::Immediate < Priority::UserBlocking);
        assert!(Priority::Normal < Priority::Idle);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    proptest! {
        #[test]
        fn highest_is_single_member_bit(bits in 1_u32..0b10_0000) {
            let set = Lanes::from_bits_retain(bits);
            let high = highest_priority(set);
            prop_assert_eq!(high.bits().count_ones(), 1);
            prop_assert!(is_subset_of_lanes(set, high));
            prop_assert!(high.bits() <= set.bits());
        }

        #[test]
        fn merge_is_union(a in 0_u32..0b10_0000, b in 0_u32..0b10_0000) {
            let (a, b) = (Lanes::from_bits_retain(a), Lanes::from_bits_retain(b));
            let merged = merge_lanes(a, b);
            prop_assert!(is_subset_of_lanes(merged, a));
            prop_assert!(is_subset_of_lanes(merged, b));
            prop_assert_eq!(merged, merge_lanes(b, a));
        }
    }
}
