//! The attack resolution engine: dice contest, critical rules, combo
//! escalation, and the rare instant-kill "lucky kill" event.

use rand::Rng;

use crate::state::{SharedGameState, Snapshot};

pub const INSTANT_KILL: i32 = 999_999;
const LUCKY_KILL_ROLL: u32 = 777_777;
const LUCKY_KILL_SPACE: u32 = 1_000_000;

/// Any uniform integer source the resolver needs. The production
/// implementation wraps an `rand::Rng`; tests inject a scripted source so
/// dice outcomes are deterministic.
pub trait DiceSource {
    /// A uniform die roll in `[1, 6]`.
    fn roll_d6(&mut self) -> i32;
    /// `true` with probability 1 in 1,000,000.
    fn sample_lucky(&mut self) -> bool;
}

pub struct RngDiceSource<'a, R: Rng> {
    rng: &'a mut R,
}

impl<'a, R: Rng> RngDiceSource<'a, R> {
    pub fn new(rng: &'a mut R) -> RngDiceSource<'a, R> {
        RngDiceSource { rng }
    }
}

impl<'a, R: Rng> DiceSource for RngDiceSource<'a, R> {
    fn roll_d6(&mut self) -> i32 {
        self.rng.gen_range(1..=6)
    }

    fn sample_lucky(&mut self) -> bool {
        self.rng.gen_range(0..LUCKY_KILL_SPACE) == LUCKY_KILL_ROLL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttackResult {
    pub boss_dice: i32,
    pub dmg_dealt: i32,
    pub dmg_taken: i32,
    pub is_win: bool,
    pub is_crit: bool,
    pub is_lucky_kill: bool,
    pub current_streak: i32,
    pub boss_just_died: bool,
}

pub struct AttackResolver;

impl AttackResolver {
    /// Resolves one attack against `state`. The branch taken is decided
    /// from a single upfront snapshot, and the no-op path (respawning or
    /// dead boss) never touches the lock beyond that snapshot; every
    /// subsequent read/mutation goes through `state`'s own lock-guarded
    /// methods so `player_dice` is always compared against a consistent HP
    /// and the streak table is updated atomically with damage application.
    pub fn resolve<D: DiceSource>(
        state: &SharedGameState,
        dice: &mut D,
        player_dice: i32,
        player_name: &str,
    ) -> (AttackResult, Snapshot) {
        let player_dice = if (1..=6).contains(&player_dice) {
            player_dice
        } else {
            dice.roll_d6()
        };

        let pre = state.snapshot();
        if pre.is_respawning || pre.stage == crate::state::Stage::Dead {
            return (AttackResult::default(), pre);
        }

        let mut result = AttackResult::default();
        result.boss_dice = dice.roll_d6();

        if dice.sample_lucky() {
            result.is_win = true;
            result.is_crit = true;
            result.is_lucky_kill = true;
            result.dmg_dealt = INSTANT_KILL;
            let killed = state.apply_damage(result.dmg_dealt, player_name);
            if killed {
                result.boss_just_died = true;
                state.mark_lucky_kill();
            }
        } else if player_dice > result.boss_dice {
            result.is_win = true;
            result.dmg_dealt = player_dice;
            if player_dice == 6 {
                result.is_crit = true;
                result.dmg_dealt *= 2;
            }

            let streak = state.update_streak(player_name, player_dice, true);
            result.current_streak = streak;
            if streak >= 3 {
                result.is_crit = true;
                result.dmg_dealt = INSTANT_KILL;
            }

            if state.apply_damage(result.dmg_dealt, player_name) {
                result.boss_just_died = true;
            }
        } else {
            state.update_streak(player_name, player_dice, false);
            result.current_streak = 0;
            if player_dice < result.boss_dice {
                result.dmg_taken = result.boss_dice + 10;
            }
        }

        let post = state.snapshot();
        (result, post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A dice source driven entirely by pre-scripted values, for tests that
    /// need to hit an exact branch of the resolver.
    struct ScriptedDice {
        rolls: std::collections::VecDeque<i32>,
        lucky: std::collections::VecDeque<bool>,
    }

    impl ScriptedDice {
        fn rolls(rolls: Vec<i32>) -> ScriptedDice {
            ScriptedDice {
                rolls: rolls.into(),
                lucky: std::collections::VecDeque::new(),
            }
        }
    }

    impl DiceSource for ScriptedDice {
        fn roll_d6(&mut self) -> i32 {
            self.rolls.pop_front().expect("scripted roll exhausted")
        }
        fn sample_lucky(&mut self) -> bool {
            self.lucky.pop_front().unwrap_or(false)
        }
    }

    #[test]
    fn crit_on_six_beats_five() {
        let state = SharedGameState::new();
        let mut dice = ScriptedDice::rolls(vec![5]);
        let (result, _) = AttackResolver::resolve(&state, &mut dice, 6, "alice");
        assert_eq!(result.boss_dice, 5);
        assert!(result.is_crit);
        assert_eq!(result.dmg_dealt, 12);
        assert_eq!(state.snapshot().current_hp, crate::state::BOSS1_MAX_HP - 12);
    }

    #[test]
    fn three_consecutive_wins_trigger_instant_kill() {
        let state = SharedGameState::new();
        let mut streaks = Vec::new();
        for i in 0..3 {
            let mut dice = ScriptedDice::rolls(vec![1]); // boss always rolls 1
            let (result, _) = AttackResolver::resolve(&state, &mut dice, 5, "alice");
            streaks.push(result.current_streak);
            if i == 2 {
                assert_eq!(result.dmg_dealt, INSTANT_KILL);
                assert!(result.boss_just_died);
            }
        }
        assert_eq!(streaks, vec![1, 2, 3]);
        assert_eq!(state.snapshot().current_hp, 0);
    }

    #[test]
    fn loss_deals_no_damage_and_breaks_streak() {
        let state = SharedGameState::new();
        state.update_streak("alice", 3, true);
        let mut dice = ScriptedDice::rolls(vec![6]); // boss rolls 6, beats player's 1
        let (result, _) = AttackResolver::resolve(&state, &mut dice, 1, "alice");
        assert!(!result.is_win);
        assert_eq!(result.current_streak, 0);
        assert_eq!(result.dmg_taken, 16);
    }

    #[test]
    fn tie_deals_no_damage_either_way() {
        let state = SharedGameState::new();
        let mut dice = ScriptedDice::rolls(vec![4]);
        let (result, _) = AttackResolver::resolve(&state, &mut dice, 4, "alice");
        assert!(!result.is_win);
        assert_eq!(result.dmg_dealt, 0);
        assert_eq!(result.dmg_taken, 0);
    }

    #[test]
    fn attack_while_respawning_is_a_noop() {
        let state = SharedGameState::new();
        state.apply_damage(crate::state::BOSS1_MAX_HP, "alice");
        let mut dice = ScriptedDice::rolls(vec![1]);
        let (result, snap) = AttackResolver::resolve(&state, &mut dice, 5, "bob");
        assert_eq!(result, AttackResult::default());
        assert!(snap.is_respawning);
    }

    #[test]
    fn lucky_kill_instant_kills_and_marks_broadcast_event() {
        let state = SharedGameState::new();
        struct AlwaysLucky {
            boss_dice: i32,
        }
        impl DiceSource for AlwaysLucky {
            fn roll_d6(&mut self) -> i32 {
                self.boss_dice
            }
            fn sample_lucky(&mut self) -> bool {
                true
            }
        }
        let mut dice = AlwaysLucky { boss_dice: 3 };
        let (result, _) = AttackResolver::resolve(&state, &mut dice, 2, "alice");
        assert!(result.is_lucky_kill);
        assert!(result.is_crit);
        assert!(result.is_win);
        assert_eq!(result.dmg_dealt, INSTANT_KILL);
        assert!(result.boss_just_died);
        assert!(state.snapshot().has_lucky_event);
    }

    #[test]
    fn out_of_range_player_dice_is_rerolled() {
        let state = SharedGameState::new();
        let mut dice = ScriptedDice::rolls(vec![3, 2]); // first roll_d6 = reroll, second = boss dice
        let (_result, _) = AttackResolver::resolve(&state, &mut dice, 42, "alice");
        assert!(state.snapshot().current_hp <= crate::state::BOSS1_MAX_HP);
    }
}
