// Read-only projections over league state: the fantasy leaderboard, the
// sorted table, and the player stat boards.

use super::model::{League, Player, TeamStanding, User};

/// One fantasy leaderboard row: a manager and the summed season points of
/// their squad.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardRow {
    pub username: String,
    pub team_name: String,
    pub total_points: i64,
    pub squad_size: usize,
}

/// Managers ranked by the summed points of their selected players,
/// highest first. Dangling selection ids contribute nothing.
pub fn fantasy_leaderboard(league: &League) -> Vec<LeaderboardRow> {
    let mut rows: Vec<LeaderboardRow> = league
        .users
        .values()
        .map(|u| LeaderboardRow {
            username: u.username.clone(),
            team_name: u.team_name.clone(),
            total_points: squad_points(u, &league.players),
            squad_size: u.selected_player_ids.len(),
        })
        .collect();
    rows.sort_by(|a, b| b.total_points.cmp(&a.total_points));
    rows
}

fn squad_points(user: &User, players: &[Player]) -> i64 {
    user.selected_player_ids
        .iter()
        .filter_map(|id| players.iter().find(|p| &p.id == id))
        .map(|p| p.points)
        .sum()
}

/// The tournament table ordered by points, then goal difference.
pub fn sorted_standings(standings: &[TeamStanding]) -> Vec<TeamStanding> {
    let mut sorted = standings.to_vec();
    sorted.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(b.goal_difference().cmp(&a.goal_difference()))
    });
    sorted
}

/// Top ten players by season goals; players without a goal are excluded.
pub fn top_scorers(players: &[Player]) -> Vec<Player> {
    top_by(players, |p| p.goals)
}

/// Top ten players by season assists; players without an assist are excluded.
pub fn top_assists(players: &[Player]) -> Vec<Player> {
    top_by(players, |p| p.assists)
}

fn top_by(players: &[Player], key: impl Fn(&Player) -> u32) -> Vec<Player> {
    let mut board: Vec<Player> = players.iter().filter(|p| key(p) > 0).cloned().collect();
    board.sort_by(|a, b| key(b).cmp(&key(a)));
    board.truncate(10);
    board
}

/// Every player with at least one card, ordered by yellows then reds.
pub fn discipline_board(players: &[Player]) -> Vec<Player> {
    let mut board: Vec<Player> = players
        .iter()
        .filter(|p| p.yellow_cards > 0 || p.red_cards > 0)
        .cloned()
        .collect();
    board.sort_by(|a, b| {
        b.yellow_cards
            .cmp(&a.yellow_cards)
            .then(b.red_cards.cmp(&a.red_cards))
    });
    board
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::league::model::Position;

    fn scored_player(id: &str, points: i64, goals: u32, assists: u32) -> Player {
        let mut p = Player::new(id, id.to_uppercase(), Position::Fwd, 5, None);
        p.points = points;
        p.goals = goals;
        p.assists = assists;
        p
    }

    #[test]
    fn leaderboard_sums_squad_points_and_ranks() {
        let mut league = League::new("L1", "Test", "pin", "alice");
        league.players = vec![
            scored_player("p1", 10, 0, 0),
            scored_player("p2", 4, 0, 0),
            scored_player("p3", 7, 0, 0),
        ];
        let mut alice = User::fresh("alice", "Alice's XI");
        alice.selected_player_ids = vec!["p1".into(), "p2".into()];
        let mut bob = User::fresh("bob", "Bob's XI");
        bob.selected_player_ids = vec!["p3".into(), "gone".into()];
        league.users.insert("alice".into(), alice);
        league.users.insert("bob".into(), bob);

        let board = fantasy_leaderboard(&league);
        assert_eq!(board[0].username, "alice");
        assert_eq!(board[0].total_points, 14);
        // Bob's dangling id is ignored, squad size still reports the raw list.
        assert_eq!(board[1].total_points, 7);
        assert_eq!(board[1].squad_size, 2);
    }

    #[test]
    fn standings_sort_by_points_then_goal_difference() {
        let mut a = TeamStanding::new("ta", "Alpha");
        a.points = 6;
        a.goals_for = 4;
        a.goals_against = 3;
        let mut b = TeamStanding::new("tb", "Bravo");
        b.points = 6;
        b.goals_for = 8;
        b.goals_against = 2;
        let mut c = TeamStanding::new("tc", "Charlie");
        c.points = 9;

        let sorted = sorted_standings(&[a, b, c]);
        let order: Vec<&str> = sorted.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(order, vec!["tc", "tb", "ta"]);
    }

    #[test]
    fn scorer_board_excludes_goalless_and_caps_at_ten() {
        let mut players: Vec<Player> = (0..12)
            .map(|i| scored_player(&format!("p{i}"), 0, i, 0))
            .collect();
        players.push(scored_player("none", 0, 0, 0));

        let board = top_scorers(&players);
        assert_eq!(board.len(), 10);
        assert_eq!(board[0].goals, 11);
        assert!(board.iter().all(|p| p.goals > 0));
    }

    #[test]
    fn assist_board_orders_by_assists() {
        let players = vec![
            scored_player("p1", 0, 0, 2),
            scored_player("p2", 0, 0, 5),
            scored_player("p3", 0, 0, 0),
        ];
        let board = top_assists(&players);
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].id, "p2");
    }

    #[test]
    fn discipline_board_lists_carded_players_only() {
        let mut clean = scored_player("clean", 0, 0, 0);
        clean.points = 50;
        let mut booked = scored_player("booked", 0, 0, 0);
        booked.yellow_cards = 2;
        let mut sent_off = scored_player("off", 0, 0, 0);
        sent_off.yellow_cards = 2;
        sent_off.red_cards = 1;

        let board = discipline_board(&[clean, booked, sent_off]);
        let order: Vec<&str> = board.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(order, vec!["off", "booked"]);
    }
}
