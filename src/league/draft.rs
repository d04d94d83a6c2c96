// Squad construction rules: budget, size, and the lock state machine.

use thiserror::Error;

use super::model::{squad_cost, Player, User, MAX_BUDGET, MAX_PLAYERS, MAX_STARTERS};

/// Caps a manager drafts under. Defaults mirror the product constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SquadLimits {
    pub budget: u32,
    pub max_squad: usize,
    pub max_starters: usize,
}

impl Default for SquadLimits {
    fn default() -> Self {
        SquadLimits {
            budget: MAX_BUDGET,
            max_squad: MAX_PLAYERS,
            max_starters: MAX_STARTERS,
        }
    }
}

/// Rejection reasons for roster mutations. These are expected conditions
/// reported as values, never panics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("squad is full ({size}/{max})")]
    SquadFull { size: usize, max: usize },

    #[error("budget exceeded: {spent} spent + {price} would pass the {budget} cap")]
    BudgetExceeded { spent: u32, price: u32, budget: u32 },

    #[error("roster is locked; ask the commissioner to unlock it")]
    AlreadyLocked,

    #[error("squad incomplete ({size}/{required} players selected)")]
    IncompleteSquad { size: usize, required: usize },
}

/// The new selection/starter sequences produced by a successful mutation.
/// The caller persists these onto the per-league user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterUpdate {
    pub selected_player_ids: Vec<String>,
    pub starter_ids: Vec<String>,
}

impl RosterUpdate {
    fn unchanged(user: &User) -> Self {
        RosterUpdate {
            selected_player_ids: user.selected_player_ids.clone(),
            starter_ids: user.starter_ids.clone(),
        }
    }
}

/// Propose adding `candidate` to the user's squad.
///
/// The lock gate is checked before anything else: a locked roster rejects
/// every mutation. Order of the selection sequence is draft order and only
/// matters for display. While there is starter room the new player is
/// auto-promoted into the starting lineup; otherwise they join as a
/// substitute. Re-adding an already-selected player is a no-op success.
pub fn add_player(
    user: &User,
    candidate: &Player,
    players: &[Player],
    limits: &SquadLimits,
) -> Result<RosterUpdate, DraftError> {
    if user.is_locked {
        return Err(DraftError::AlreadyLocked);
    }
    if user.selected_player_ids.iter().any(|id| id == &candidate.id) {
        return Ok(RosterUpdate::unchanged(user));
    }
    if user.selected_player_ids.len() >= limits.max_squad {
        return Err(DraftError::SquadFull {
            size: user.selected_player_ids.len(),
            max: limits.max_squad,
        });
    }
    let spent = squad_cost(&user.selected_player_ids, players);
    if spent + candidate.price > limits.budget {
        return Err(DraftError::BudgetExceeded {
            spent,
            price: candidate.price,
            budget: limits.budget,
        });
    }

    let mut update = RosterUpdate::unchanged(user);
    update.selected_player_ids.push(candidate.id.clone());
    if update.starter_ids.len() < limits.max_starters {
        update.starter_ids.push(candidate.id.clone());
    }
    Ok(update)
}

/// Propose removing `player_id` from the user's squad.
///
/// Removes the id from both the selection and the starter list. Removing an
/// id that is not selected is a no-op success, which also lets managers shed
/// references to players the commissioner has since deleted.
pub fn remove_player(user: &User, player_id: &str) -> Result<RosterUpdate, DraftError> {
    if user.is_locked {
        return Err(DraftError::AlreadyLocked);
    }
    let mut update = RosterUpdate::unchanged(user);
    update.selected_player_ids.retain(|id| id != player_id);
    update.starter_ids.retain(|id| id != player_id);
    Ok(update)
}

/// Validate the squad for self-service lock-in (OPEN -> LOCKED).
///
/// Requires a complete squad at or under budget. On success the caller
/// persists `is_locked = true`; the only way back is an admin unlock.
pub fn confirm_roster(
    user: &User,
    players: &[Player],
    limits: &SquadLimits,
) -> Result<(), DraftError> {
    if user.is_locked {
        return Err(DraftError::AlreadyLocked);
    }
    if user.selected_player_ids.len() != limits.max_squad {
        return Err(DraftError::IncompleteSquad {
            size: user.selected_player_ids.len(),
            required: limits.max_squad,
        });
    }
    let spent = squad_cost(&user.selected_player_ids, players);
    if spent > limits.budget {
        return Err(DraftError::BudgetExceeded {
            spent,
            price: 0,
            budget: limits.budget,
        });
    }
    Ok(())
}

/// The admin-only LOCKED -> OPEN transition. The session layer gates this
/// behind commissioner authentication; the transition itself is
/// unconditional.
pub fn unlock_roster(user: &mut User) {
    user.is_locked = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::league::model::Position;

    fn pool() -> Vec<Player> {
        // Prices chosen so nine players fit exactly in the default budget
        // when drafted in order: 5+6+6+7+7+7+7+7+8 = 60.
        vec![
            Player::new("gk1", "Keeper One", Position::Gk, 5, Some("t1".into())),
            Player::new("d1", "Back One", Position::Def, 6, Some("t1".into())),
            Player::new("d2", "Back Two", Position::Def, 6, Some("t2".into())),
            Player::new("m1", "Mid One", Position::Mid, 7, Some("t1".into())),
            Player::new("m2", "Mid Two", Position::Mid, 7, Some("t2".into())),
            Player::new("m3", "Mid Three", Position::Mid, 7, Some("t3".into())),
            Player::new("f1", "Striker One", Position::Fwd, 7, Some("t2".into())),
            Player::new("f2", "Striker Two", Position::Fwd, 7, Some("t3".into())),
            Player::new("x1", "Utility One", Position::Flex, 8, Some("t3".into())),
            Player::new("f3", "Striker Three", Position::Fwd, 12, Some("t1".into())),
        ]
    }

    fn user() -> User {
        User::fresh("alice", "Alice's XI")
    }

    fn apply(user: &mut User, update: RosterUpdate) {
        user.selected_player_ids = update.selected_player_ids;
        user.starter_ids = update.starter_ids;
    }

    #[test]
    fn add_player_appends_and_promotes_to_starters() {
        let players = pool();
        let mut u = user();
        let update = add_player(&u, &players[0], &players, &SquadLimits::default()).unwrap();
        apply(&mut u, update);
        assert_eq!(u.selected_player_ids, vec!["gk1"]);
        assert_eq!(u.starter_ids, vec!["gk1"]);
    }

    #[test]
    fn seventh_player_becomes_substitute() {
        let players = pool();
        let limits = SquadLimits::default();
        let mut u = user();
        for p in players.iter().take(7) {
            let update = add_player(&u, p, &players, &limits).unwrap();
            apply(&mut u, update);
        }
        assert_eq!(u.selected_player_ids.len(), 7);
        // Starters capped at six; the seventh pick rides the bench.
        assert_eq!(u.starter_ids.len(), 6);
        assert!(!u.starter_ids.contains(&"f1".to_string()));
        assert!(u.selected_player_ids.contains(&"f1".to_string()));
    }

    #[test]
    fn squad_full_rejected_without_state_change() {
        let players = pool();
        let limits = SquadLimits::default();
        let mut u = user();
        for p in players.iter().take(9) {
            let update = add_player(&u, p, &players, &limits).unwrap();
            apply(&mut u, update);
        }
        let before = u.clone();
        let err = add_player(&u, &players[9], &players, &limits).unwrap_err();
        assert_eq!(err, DraftError::SquadFull { size: 9, max: 9 });
        assert_eq!(u, before);
    }

    #[test]
    fn budget_exceeded_rejected_without_state_change() {
        let players = pool();
        let limits = SquadLimits {
            budget: 10,
            ..SquadLimits::default()
        };
        let mut u = user();
        let update = add_player(&u, &players[0], &players, &limits).unwrap();
        apply(&mut u, update);
        // 5 spent; a 6-credit player would pass the 10-credit cap.
        let err = add_player(&u, &players[1], &players, &limits).unwrap_err();
        assert_eq!(
            err,
            DraftError::BudgetExceeded {
                spent: 5,
                price: 6,
                budget: 10
            }
        );
        assert_eq!(u.selected_player_ids, vec!["gk1"]);
    }

    #[test]
    fn budget_invariant_holds_across_add_sequences() {
        let players = pool();
        let limits = SquadLimits::default();
        let mut u = user();
        // Greedily try every player; rejections must leave the invariant intact.
        for p in &players {
            if let Ok(update) = add_player(&u, p, &players, &limits) {
                apply(&mut u, update);
            }
            assert!(squad_cost(&u.selected_player_ids, &players) <= limits.budget);
            assert!(u.selected_player_ids.len() <= limits.max_squad);
            assert!(u.starter_ids.len() <= limits.max_starters);
            for id in &u.starter_ids {
                assert!(u.selected_player_ids.contains(id), "starter not in squad");
            }
        }
    }

    #[test]
    fn re_adding_selected_player_is_noop() {
        let players = pool();
        let limits = SquadLimits::default();
        let mut u = user();
        let update = add_player(&u, &players[0], &players, &limits).unwrap();
        apply(&mut u, update);
        let update = add_player(&u, &players[0], &players, &limits).unwrap();
        assert_eq!(update.selected_player_ids, vec!["gk1"]);
        assert_eq!(update.starter_ids, vec!["gk1"]);
    }

    #[test]
    fn remove_player_drops_from_both_sequences() {
        let players = pool();
        let limits = SquadLimits::default();
        let mut u = user();
        for p in players.iter().take(2) {
            let update = add_player(&u, p, &players, &limits).unwrap();
            apply(&mut u, update);
        }
        let update = remove_player(&u, "gk1").unwrap();
        assert_eq!(update.selected_player_ids, vec!["d1"]);
        assert_eq!(update.starter_ids, vec!["d1"]);
    }

    #[test]
    fn remove_absent_player_is_noop_success() {
        let players = pool();
        let limits = SquadLimits::default();
        let mut u = user();
        let update = add_player(&u, &players[0], &players, &limits).unwrap();
        apply(&mut u, update);
        let update = remove_player(&u, "nobody").unwrap();
        assert_eq!(update.selected_player_ids, u.selected_player_ids);
        assert_eq!(update.starter_ids, u.starter_ids);
    }

    #[test]
    fn lock_gate_rejects_all_mutations() {
        let players = pool();
        let limits = SquadLimits::default();
        let mut u = user();
        let update = add_player(&u, &players[0], &players, &limits).unwrap();
        apply(&mut u, update);
        u.is_locked = true;

        assert_eq!(
            add_player(&u, &players[1], &players, &limits).unwrap_err(),
            DraftError::AlreadyLocked
        );
        assert_eq!(remove_player(&u, "gk1").unwrap_err(), DraftError::AlreadyLocked);
        assert_eq!(
            confirm_roster(&u, &players, &limits).unwrap_err(),
            DraftError::AlreadyLocked
        );
        assert_eq!(u.selected_player_ids, vec!["gk1"]);
    }

    #[test]
    fn confirm_requires_complete_squad() {
        let players = pool();
        let limits = SquadLimits::default();
        let mut u = user();
        for p in players.iter().take(5) {
            let update = add_player(&u, p, &players, &limits).unwrap();
            apply(&mut u, update);
        }
        let err = confirm_roster(&u, &players, &limits).unwrap_err();
        assert_eq!(err, DraftError::IncompleteSquad { size: 5, required: 9 });
    }

    #[test]
    fn confirm_succeeds_on_full_squad_within_budget() {
        let players = pool();
        let limits = SquadLimits::default();
        let mut u = user();
        for p in players.iter().take(9) {
            let update = add_player(&u, p, &players, &limits).unwrap();
            apply(&mut u, update);
        }
        assert_eq!(squad_cost(&u.selected_player_ids, &players), 60);
        confirm_roster(&u, &players, &limits).unwrap();
    }

    #[test]
    fn confirm_rejects_overspent_squad() {
        // Price rises after drafting can push a full squad over the cap;
        // confirmation must then fail until the manager adjusts.
        let mut players = pool();
        let limits = SquadLimits::default();
        let mut u = user();
        for p in players.iter().take(9) {
            let update = add_player(&u, p, &players, &limits).unwrap();
            apply(&mut u, update);
        }
        players[8].price = 20;
        let err = confirm_roster(&u, &players, &limits).unwrap_err();
        assert!(matches!(err, DraftError::BudgetExceeded { spent: 72, .. }));
    }

    #[test]
    fn admin_unlock_reopens_roster() {
        let players = pool();
        let limits = SquadLimits::default();
        let mut u = user();
        u.is_locked = true;
        unlock_roster(&mut u);
        assert!(!u.is_locked);
        // Mutations are accepted again.
        add_player(&u, &players[0], &players, &limits).unwrap();
    }
}
