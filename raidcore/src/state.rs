//! The shared authoritative game state: boss HP, stage progression, online
//! counter, per-player streak table, and the broadcastable "lucky kill"
//! event. All mutation and reading goes through `SharedGameState`'s methods,
//! each of which locks the single coarse mutex for its whole duration.

use std::sync::Mutex;

use crate::protocol::{GameStateSnapshot, MAX_USERNAME};
use crate::time::timestamp_secs;

pub const BOSS1_MAX_HP: i32 = 1000;
pub const BOSS2_MAX_HP: i32 = 2000;
pub const MAX_TRACKED_PLAYERS: usize = 100;
pub const LUCKY_KILL_TTL_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Boss1,
    Boss2,
    Dead,
}

impl Stage {
    pub fn as_u8(self) -> u8 {
        match self {
            Stage::Boss1 => 0,
            Stage::Boss2 => 1,
            Stage::Dead => 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct StreakSlot {
    name: String,
    last_dice: i32,
    streak_count: i32,
}

impl StreakSlot {
    fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

/// A point-in-time copy of the authoritative record, taken under the lock.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub current_hp: i32,
    pub max_hp: i32,
    pub stage: Stage,
    pub online_count: i32,
    pub is_respawning: bool,
    pub last_killer: String,
    pub has_lucky_event: bool,
    pub lucky_event_timestamp: u64,
}

struct Inner {
    current_hp: i32,
    max_hp: i32,
    stage: Stage,
    online_count: i32,
    is_respawning: bool,
    last_killer: String,
    has_lucky_event: bool,
    lucky_event_timestamp: u64,
    streak_table: Vec<StreakSlot>,
}

impl Inner {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            current_hp: self.current_hp,
            max_hp: self.max_hp,
            stage: self.stage,
            online_count: self.online_count,
            is_respawning: self.is_respawning,
            last_killer: self.last_killer.clone(),
            has_lucky_event: self.has_lucky_event,
            lucky_event_timestamp: self.lucky_event_timestamp,
        }
    }
}

pub struct SharedGameState {
    inner: Mutex<Inner>,
}

impl SharedGameState {
    pub fn new() -> SharedGameState {
        SharedGameState {
            inner: Mutex::new(Inner {
                current_hp: BOSS1_MAX_HP,
                max_hp: BOSS1_MAX_HP,
                stage: Stage::Boss1,
                online_count: 0,
                is_respawning: false,
                last_killer: String::new(),
                has_lucky_event: false,
                lucky_event_timestamp: 0,
                streak_table: vec![StreakSlot::default(); MAX_TRACKED_PLAYERS],
            }),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.lock().unwrap().snapshot()
    }

    pub fn player_join(&self) -> i32 {
        let mut inner = self.inner.lock().unwrap();
        inner.online_count += 1;
        inner.online_count
    }

    pub fn player_leave(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.online_count > 0 {
            inner.online_count -= 1;
        }
    }

    /// Subtracts `amount` HP (clamped at zero) from the boss and returns
    /// whether this call is the one that transitioned the boss into
    /// respawning. No-ops (returning `false`) while already respawning or
    /// dead.
    pub fn apply_damage(&self, amount: i32, attacker_name: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();

        if inner.is_respawning || inner.stage == Stage::Dead {
            return false;
        }

        inner.current_hp = (inner.current_hp - amount).max(0);

        if inner.current_hp == 0 && !inner.is_respawning {
            inner.is_respawning = true;
            inner.last_killer = attacker_name.to_string();
            return true;
        }

        false
    }

    pub fn spawn_next_boss(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.stage {
            Stage::Boss1 => {
                inner.stage = Stage::Boss2;
                inner.max_hp = BOSS2_MAX_HP;
                inner.current_hp = BOSS2_MAX_HP;
            }
            Stage::Boss2 => {
                inner.stage = Stage::Dead;
                inner.current_hp = 0;
            }
            Stage::Dead => {}
        }
        inner.is_respawning = false;
        inner.last_killer.clear();
    }

    /// Updates (or allocates) the named player's streak slot and returns
    /// the resulting streak count. Returns `0` without recording anything
    /// if the table is full and the player has no existing slot.
    pub fn update_streak(&self, name: &str, dice: i32, is_win: bool) -> i32 {
        let mut inner = self.inner.lock().unwrap();

        let slot_index = inner
            .streak_table
            .iter()
            .position(|slot| !slot.is_empty() && slot.name == name)
            .or_else(|| inner.streak_table.iter().position(|slot| slot.is_empty()));

        let slot_index = match slot_index {
            Some(i) => i,
            None => return 0,
        };

        let slot = &mut inner.streak_table[slot_index];
        if slot.is_empty() {
            slot.name = name.to_string();
            slot.last_dice = 0;
            slot.streak_count = 0;
        }

        if is_win {
            if slot.last_dice == dice {
                slot.streak_count += 1;
            } else {
                slot.streak_count = 1;
            }
        } else {
            slot.streak_count = 0;
        }
        slot.last_dice = dice;
        slot.streak_count
    }

    pub fn mark_lucky_kill(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.has_lucky_event = true;
        inner.lucky_event_timestamp = timestamp_secs();
    }

    pub fn clear_lucky_kill(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.has_lucky_event = false;
    }
}

impl Default for SharedGameState {
    fn default() -> Self {
        Self::new()
    }
}

impl Snapshot {
    /// `is_lucky` is only reported while the event is within its TTL; the
    /// caller is expected to `clear_lucky_kill()` once it observes the
    /// event has expired (the handler does this on HEARTBEAT replies).
    pub fn lucky_still_visible(&self, now: u64) -> bool {
        self.has_lucky_event && now.saturating_sub(self.lucky_event_timestamp) <= LUCKY_KILL_TTL_SECS
    }

    pub fn to_heartbeat_payload(&self, now: u64) -> GameStateSnapshot {
        let mut last_killer = [0u8; MAX_USERNAME];
        crate::protocol::pack_fixed_str(&self.last_killer, &mut last_killer);
        GameStateSnapshot {
            boss_hp: self.current_hp,
            max_hp: self.max_hp,
            online_count: self.online_count,
            stage: self.stage.as_u8(),
            is_respawning: self.is_respawning as u8,
            is_crit: 0,
            is_lucky: self.lucky_still_visible(now) as u8,
            last_player_damage: 0,
            last_boss_dice: 0,
            last_player_streak: 0,
            dmg_taken: 0,
            last_killer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_boss1_full_hp() {
        let state = SharedGameState::new();
        let snap = state.snapshot();
        assert_eq!(snap.current_hp, BOSS1_MAX_HP);
        assert_eq!(snap.max_hp, BOSS1_MAX_HP);
        assert_eq!(snap.stage, Stage::Boss1);
        assert_eq!(snap.online_count, 0);
    }

    #[test]
    fn join_and_leave_track_online_count() {
        let state = SharedGameState::new();
        assert_eq!(state.player_join(), 1);
        assert_eq!(state.player_join(), 2);
        state.player_leave();
        assert_eq!(state.snapshot().online_count, 1);
    }

    #[test]
    fn leave_clamps_at_zero() {
        let state = SharedGameState::new();
        state.player_leave();
        assert_eq!(state.snapshot().online_count, 0);
    }

    #[test]
    fn apply_damage_kills_and_enters_respawn() {
        let state = SharedGameState::new();
        let killed = state.apply_damage(BOSS1_MAX_HP, "alice");
        assert!(killed);
        let snap = state.snapshot();
        assert_eq!(snap.current_hp, 0);
        assert!(snap.is_respawning);
        assert_eq!(snap.last_killer, "alice");
    }

    #[test]
    fn apply_damage_noop_while_respawning() {
        let state = SharedGameState::new();
        state.apply_damage(BOSS1_MAX_HP, "alice");
        let killed_again = state.apply_damage(50, "bob");
        assert!(!killed_again);
        assert_eq!(state.snapshot().current_hp, 0);
    }

    #[test]
    fn spawn_next_boss_progresses_stages() {
        let state = SharedGameState::new();
        state.apply_damage(BOSS1_MAX_HP, "alice");
        state.spawn_next_boss();
        let snap = state.snapshot();
        assert_eq!(snap.stage, Stage::Boss2);
        assert_eq!(snap.current_hp, BOSS2_MAX_HP);
        assert!(!snap.is_respawning);
        assert_eq!(snap.last_killer, "");

        state.apply_damage(BOSS2_MAX_HP, "bob");
        state.spawn_next_boss();
        let snap = state.snapshot();
        assert_eq!(snap.stage, Stage::Dead);
        assert_eq!(snap.current_hp, 0);
    }

    #[test]
    fn update_streak_increments_on_repeated_winning_dice() {
        let state = SharedGameState::new();
        assert_eq!(state.update_streak("alice", 5, true), 1);
        assert_eq!(state.update_streak("alice", 5, true), 2);
        assert_eq!(state.update_streak("alice", 5, true), 3);
    }

    #[test]
    fn update_streak_resets_on_different_dice_or_loss() {
        let state = SharedGameState::new();
        state.update_streak("alice", 5, true);
        assert_eq!(state.update_streak("alice", 3, true), 1);
        state.update_streak("alice", 3, true);
        assert_eq!(state.update_streak("alice", 3, false), 0);
    }

    #[test]
    fn update_streak_returns_zero_when_table_full() {
        let state = SharedGameState::new();
        for i in 0..MAX_TRACKED_PLAYERS {
            state.update_streak(&format!("player{}", i), 1, true);
        }
        assert_eq!(state.update_streak("overflow", 1, true), 0);
    }

    #[test]
    fn lucky_kill_ttl_and_idempotent_clear() {
        let state = SharedGameState::new();
        state.mark_lucky_kill();
        let snap = state.snapshot();
        assert!(snap.lucky_still_visible(snap.lucky_event_timestamp));
        assert!(!snap.lucky_still_visible(snap.lucky_event_timestamp + LUCKY_KILL_TTL_SECS + 1));

        state.clear_lucky_kill();
        state.clear_lucky_kill();
        assert!(!state.snapshot().has_lucky_event);
    }

    #[test]
    fn snapshot_is_stable_with_no_intervening_mutation() {
        let state = SharedGameState::new();
        let a = state.snapshot();
        let b = state.snapshot();
        assert_eq!(a.current_hp, b.current_hp);
        assert_eq!(a.online_count, b.online_count);
        assert_eq!(a.stage, b.stage);
    }
}
