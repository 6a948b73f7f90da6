//! Flags: deferred, per-tick movement commands.
//!
//! A key press does not move anything by itself. It raises a [`Flag`] on the
//! entity and every simulation pass re-applies each raised flag once. A
//! release only schedules removal; the flag keeps firing on the pass that
//! follows the release and is dropped on the pass after that. For a flag
//! pressed before pass `T` and released before pass `T + k`, the effect is
//! applied on every pass in `T..=T + k` and never on `T + k + 1`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::entity::Movable;

/// A discrete action that stays active while its key is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Flag {
    MoveForward,
    MoveBack,
    RotateLeft,
    RotateRight,
}

impl Flag {
    pub fn process<M: Movable + ?Sized>(self, target: &mut M) {
        match self {
            Flag::MoveForward => target.move_forward(),
            Flag::MoveBack => target.move_back(),
            Flag::RotateLeft => target.rotate_left(),
            Flag::RotateRight => target.rotate_right(),
        }
    }
}

/// Active flags plus their staged removals.
#[derive(Debug, Clone, Default)]
pub struct FlagSet {
    active: BTreeSet<Flag>,
    /// Subtracted from `active` at the start of the next pass.
    to_remove: BTreeSet<Flag>,
    /// Released since the last pass; promoted to `to_remove` once that pass
    /// has executed.
    released: BTreeSet<Flag>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises a flag. Pressing an already-active flag is a no-op, except
    /// that it cancels a removal still waiting to take effect.
    pub fn press(&mut self, flag: Flag) {
        self.active.insert(flag);
        self.released.remove(&flag);
        self.to_remove.remove(&flag);
    }

    /// Schedules removal of an active flag.
    pub fn release(&mut self, flag: Flag) {
        if self.active.contains(&flag) {
            self.released.insert(flag);
        }
    }

    /// Runs one pass against `target`: subtract pending removals, clear
    /// them, execute what is still active in tag order.
    pub fn process<M: Movable + ?Sized>(&mut self, target: &mut M) {
        for flag in &self.to_remove {
            self.active.remove(flag);
        }
        self.to_remove.clear();

        for flag in &self.active {
            flag.process(target);
        }

        std::mem::swap(&mut self.to_remove, &mut self.released);
    }

    pub fn is_active(&self, flag: Flag) -> bool {
        self.active.contains(&flag)
    }

    pub fn active(&self) -> impl Iterator<Item = Flag> + '_ {
        self.active.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts every call instead of moving.
    #[derive(Default)]
    struct Tally {
        forward: u32,
        back: u32,
        left: u32,
        right: u32,
    }

    impl Movable for Tally {
        fn x(&self) -> f32 {
            0.0
        }
        fn y(&self) -> f32 {
            0.0
        }
        fn set_x(&mut self, _x: f32) {}
        fn set_y(&mut self, _y: f32) {}
        fn rotation(&self) -> f32 {
            0.0
        }
        fn set_rotation(&mut self, _degrees: f32) {}
        fn rotate_left(&mut self) {
            self.left += 1;
        }
        fn rotate_right(&mut self) {
            self.right += 1;
        }
        fn move_forward(&mut self) {
            self.forward += 1;
        }
        fn move_back(&mut self) {
            self.back += 1;
        }
    }

    /// Presses before pass `press_at`, releases before pass `release_at`,
    /// returns the passes on which the flag fired.
    fn fired_on(press_at: u32, release_at: u32, passes: u32) -> Vec<u32> {
        let mut flags = FlagSet::new();
        let mut tally = Tally::default();
        let mut fired = Vec::new();
        for tick in 0..passes {
            if tick == press_at {
                flags.press(Flag::MoveForward);
            }
            if tick == release_at {
                flags.release(Flag::MoveForward);
            }
            let before = tally.forward;
            flags.process(&mut tally);
            if tally.forward > before {
                fired.push(tick);
            }
        }
        fired
    }

    #[test]
    fn fires_from_press_through_release_tick() {
        assert_eq!(fired_on(2, 5, 10), vec![2, 3, 4, 5]);
    }

    #[test]
    fn same_tick_press_and_release_fires_once() {
        assert_eq!(fired_on(3, 3, 10), vec![3]);
    }

    #[test]
    fn double_press_is_idempotent() {
        let mut flags = FlagSet::new();
        let mut tally = Tally::default();
        flags.press(Flag::RotateLeft);
        flags.press(Flag::RotateLeft);
        flags.process(&mut tally);
        assert_eq!(tally.left, 1);
    }

    #[test]
    fn releasing_inactive_flag_is_noop() {
        let mut flags = FlagSet::new();
        let mut tally = Tally::default();
        flags.release(Flag::MoveBack);
        flags.process(&mut tally);
        flags.press(Flag::MoveBack);
        flags.process(&mut tally);
        flags.process(&mut tally);
        assert_eq!(tally.back, 2);
    }

    #[test]
    fn repress_cancels_pending_removal() {
        let mut flags = FlagSet::new();
        let mut tally = Tally::default();
        flags.press(Flag::RotateRight);
        flags.release(Flag::RotateRight);
        flags.process(&mut tally);
        flags.press(Flag::RotateRight);
        flags.process(&mut tally);
        flags.process(&mut tally);
        assert_eq!(tally.right, 3);
        assert!(flags.is_active(Flag::RotateRight));
    }

    #[test]
    fn independent_flags_run_together() {
        let mut flags = FlagSet::new();
        let mut tally = Tally::default();
        flags.press(Flag::MoveForward);
        flags.press(Flag::RotateLeft);
        flags.process(&mut tally);
        assert_eq!((tally.forward, tally.left), (1, 1));
        assert_eq!(flags.active().count(), 2);
    }
}
