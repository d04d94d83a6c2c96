// Core league entities: players, standings, matches, rules, and managers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Credit budget every manager drafts under.
pub const MAX_BUDGET: u32 = 60;
/// Squad size cap per manager.
pub const MAX_PLAYERS: usize = 9;
/// Starting-lineup cap within a squad.
pub const MAX_STARTERS: usize = 6;

/// Pitch positions used for squad display and clean-sheet eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Position {
    Gk,
    Def,
    Mid,
    Fwd,
    Flex,
}

impl Position {
    /// Parse a position string into a Position enum.
    pub fn from_str_pos(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GK" => Some(Position::Gk),
            "DEF" => Some(Position::Def),
            "MID" => Some(Position::Mid),
            "FWD" => Some(Position::Fwd),
            "FLEX" => Some(Position::Flex),
            _ => None,
        }
    }

    /// Return the display string for this position.
    pub fn display_str(&self) -> &'static str {
        match self {
            Position::Gk => "GK",
            Position::Def => "DEF",
            Position::Mid => "MID",
            Position::Fwd => "FWD",
            Position::Flex => "FLEX",
        }
    }

    /// Only goalkeepers earn clean-sheet points.
    pub fn is_goalkeeper(&self) -> bool {
        matches!(self, Position::Gk)
    }
}

/// A player in the league-wide pool.
///
/// Ids are opaque, unique, and never reused. `team_id = None` marks a free
/// agent. Cumulative counters (`points`, `goals`, `assists`, cards) are
/// advanced only by match finalization; admin edits touch `team_id` and
/// `price` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub name: String,
    pub position: Position,
    pub price: u32,
    #[serde(default)]
    pub points: i64,
    /// Season/intake label carried through from registration.
    #[serde(default)]
    pub batch: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub goals: u32,
    #[serde(default)]
    pub assists: u32,
    #[serde(default)]
    pub yellow_cards: u32,
    #[serde(default)]
    pub red_cards: u32,
}

impl Player {
    /// A fresh player with zeroed season counters.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        position: Position,
        price: u32,
        team_id: Option<String>,
    ) -> Self {
        Player {
            id: id.into(),
            name: name.into(),
            position,
            price,
            points: 0,
            batch: None,
            team_id,
            goals: 0,
            assists: 0,
            yellow_cards: 0,
            red_cards: 0,
        }
    }

    /// Whether this player currently belongs to the given team.
    pub fn plays_for(&self, team_id: &str) -> bool {
        self.team_id.as_deref() == Some(team_id)
    }
}

/// One row of the tournament table.
///
/// `played == won + drawn + lost` holds as long as the row is mutated only
/// through match finalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamStanding {
    pub id: String,
    pub team: String,
    #[serde(default)]
    pub played: u32,
    #[serde(default)]
    pub won: u32,
    #[serde(default)]
    pub drawn: u32,
    #[serde(default)]
    pub lost: u32,
    #[serde(default)]
    pub goals_for: u32,
    #[serde(default)]
    pub goals_against: u32,
    #[serde(default)]
    pub points: u32,
    /// Admin-assigned captain. Must name a player on this team, but the
    /// reference is not enforced atomically and may dangle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captain_player_id: Option<String>,
}

impl TeamStanding {
    /// A fresh standing row with a zeroed record.
    pub fn new(id: impl Into<String>, team: impl Into<String>) -> Self {
        TeamStanding {
            id: id.into(),
            team: team.into(),
            played: 0,
            won: 0,
            drawn: 0,
            lost: 0,
            goals_for: 0,
            goals_against: 0,
            points: 0,
            captain_player_id: None,
        }
    }

    pub fn goal_difference(&self) -> i64 {
        i64::from(self.goals_for) - i64::from(self.goals_against)
    }
}

/// Aggregated goal/assist credit stored on a sealed match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalTally {
    pub player_id: String,
    pub count: u32,
}

/// A scheduled fixture or sealed result.
///
/// `is_played = false` is "pending"; flipping it to true via finalization is
/// a one-way transition, after which the score, event lists, and MOTM are
/// immutable under normal operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: String,
    pub gameweek: u32,
    pub date: String,
    pub team_a_id: String,
    pub team_b_id: String,
    #[serde(default)]
    pub score_a: u32,
    #[serde(default)]
    pub score_b: u32,
    #[serde(default)]
    pub is_played: bool,
    #[serde(default)]
    pub scorers: Vec<GoalTally>,
    #[serde(default)]
    pub assisters: Vec<GoalTally>,
    #[serde(default)]
    pub yellow_card_player_ids: Vec<String>,
    #[serde(default)]
    pub red_card_player_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motm_player_id: Option<String>,
}

impl Match {
    /// A pending fixture with no result yet.
    pub fn fixture(
        id: impl Into<String>,
        gameweek: u32,
        date: impl Into<String>,
        team_a_id: impl Into<String>,
        team_b_id: impl Into<String>,
    ) -> Self {
        Match {
            id: id.into(),
            gameweek,
            date: date.into(),
            team_a_id: team_a_id.into(),
            team_b_id: team_b_id.into(),
            score_a: 0,
            score_b: 0,
            is_played: false,
            scorers: Vec::new(),
            assisters: Vec::new(),
            yellow_card_player_ids: Vec::new(),
            red_card_player_ids: Vec::new(),
            motm_player_id: None,
        }
    }
}

/// Point weights applied at match finalization. Per-league, admin-editable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringRules {
    pub goal: i64,
    pub assist: i64,
    pub win: i64,
    pub motm: i64,
    pub clean_sheet: i64,
    /// Defined and editable, but not applied by match finalization.
    pub captain_bonus: i64,
    pub yellow_card: i64,
    pub red_card: i64,
}

impl Default for ScoringRules {
    fn default() -> Self {
        ScoringRules {
            goal: 4,
            assist: 2,
            win: 1,
            motm: 1,
            clean_sheet: 3,
            captain_bonus: 1,
            yellow_card: -2,
            red_card: -4,
        }
    }
}

/// A manager's per-league record: their drafted squad and lock state.
///
/// Created lazily the first time an account enters a league; independent
/// across leagues. `username` is the lowercase primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    pub team_name: String,
    #[serde(default)]
    pub selected_player_ids: Vec<String>,
    #[serde(default)]
    pub starter_ids: Vec<String>,
    #[serde(default)]
    pub is_locked: bool,
}

impl User {
    /// A fresh per-league user with an empty, unlocked roster.
    pub fn fresh(username: impl Into<String>, team_name: impl Into<String>) -> Self {
        User {
            username: username.into(),
            team_name: team_name.into(),
            selected_player_ids: Vec::new(),
            starter_ids: Vec::new(),
            is_locked: false,
        }
    }
}

/// A full league document: the unit of persistence and isolation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct League {
    pub id: String,
    pub name: String,
    pub admin_password: String,
    pub created_by: String,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub standings: Vec<TeamStanding>,
    #[serde(default)]
    pub matches: Vec<Match>,
    #[serde(default)]
    pub scoring_rules: Option<ScoringRules>,
    #[serde(default)]
    pub users: BTreeMap<String, User>,
}

impl League {
    /// A new league seeded with default scoring rules and no entities.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        admin_password: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        League {
            id: id.into(),
            name: name.into(),
            admin_password: admin_password.into(),
            created_by: created_by.into(),
            players: Vec::new(),
            standings: Vec::new(),
            matches: Vec::new(),
            scoring_rules: Some(ScoringRules::default()),
            users: BTreeMap::new(),
        }
    }

    pub fn player_by_id(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn standing_by_id(&self, id: &str) -> Option<&TeamStanding> {
        self.standings.iter().find(|s| s.id == id)
    }

    pub fn match_by_id(&self, id: &str) -> Option<&Match> {
        self.matches.iter().find(|m| m.id == id)
    }
}

/// Total credit cost of a selection, resolved against the player pool.
///
/// Ids that no longer resolve to a player contribute nothing: a deleted
/// player must not keep charging a manager's budget.
pub fn squad_cost(selection: &[String], players: &[Player]) -> u32 {
    selection
        .iter()
        .filter_map(|id| players.iter().find(|p| &p.id == id))
        .map(|p| p.price)
        .sum()
}

/// Team name for display, falling back to "FA" for free agents and
/// dangling team references.
pub fn team_name_or_fa<'a>(standings: &'a [TeamStanding], team_id: Option<&str>) -> &'a str {
    team_id
        .and_then(|id| standings.iter().find(|s| s.id == id))
        .map(|s| s.team.as_str())
        .unwrap_or("FA")
}

/// Player name for display, falling back to "Unknown" for dangling ids.
pub fn player_name_or_unknown<'a>(players: &'a [Player], player_id: &str) -> &'a str {
    players
        .iter()
        .find(|p| p.id == player_id)
        .map(|p| p.name.as_str())
        .unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_round_trip() {
        for s in ["GK", "DEF", "MID", "FWD", "FLEX"] {
            let pos = Position::from_str_pos(s).unwrap();
            assert_eq!(pos.display_str(), s);
        }
        assert!(Position::from_str_pos("ST").is_none());
        // Lowercase input is accepted
        assert_eq!(Position::from_str_pos("gk"), Some(Position::Gk));
    }

    #[test]
    fn only_goalkeepers_keep_clean_sheets() {
        assert!(Position::Gk.is_goalkeeper());
        assert!(!Position::Def.is_goalkeeper());
        assert!(!Position::Flex.is_goalkeeper());
    }

    #[test]
    fn squad_cost_sums_prices() {
        let players = vec![
            Player::new("p1", "A", Position::Fwd, 11, None),
            Player::new("p2", "B", Position::Mid, 8, None),
        ];
        let selection = vec!["p1".to_string(), "p2".to_string()];
        assert_eq!(squad_cost(&selection, &players), 19);
    }

    #[test]
    fn squad_cost_skips_dangling_ids() {
        let players = vec![Player::new("p1", "A", Position::Fwd, 11, None)];
        let selection = vec!["p1".to_string(), "deleted".to_string()];
        assert_eq!(squad_cost(&selection, &players), 11);
    }

    #[test]
    fn display_fallbacks() {
        let standings = vec![TeamStanding::new("t1", "Phoenix FC")];
        let players = vec![Player::new("p1", "Known", Position::Gk, 5, None)];
        assert_eq!(team_name_or_fa(&standings, Some("t1")), "Phoenix FC");
        assert_eq!(team_name_or_fa(&standings, Some("gone")), "FA");
        assert_eq!(team_name_or_fa(&standings, None), "FA");
        assert_eq!(player_name_or_unknown(&players, "p1"), "Known");
        assert_eq!(player_name_or_unknown(&players, "gone"), "Unknown");
    }

    #[test]
    fn default_scoring_rules_match_product_defaults() {
        let rules = ScoringRules::default();
        assert_eq!(rules.goal, 4);
        assert_eq!(rules.assist, 2);
        assert_eq!(rules.win, 1);
        assert_eq!(rules.motm, 1);
        assert_eq!(rules.clean_sheet, 3);
        assert_eq!(rules.captain_bonus, 1);
        assert_eq!(rules.yellow_card, -2);
        assert_eq!(rules.red_card, -4);
    }

    #[test]
    fn new_league_is_empty_with_default_rules() {
        let league = League::new("AB12CD", "Sunday League", "pin", "alice");
        assert!(league.players.is_empty());
        assert!(league.users.is_empty());
        assert_eq!(league.scoring_rules, Some(ScoringRules::default()));
        assert_eq!(league.created_by, "alice");
    }

    #[test]
    fn goal_difference_can_be_negative() {
        let mut s = TeamStanding::new("t1", "Blue Dragons");
        s.goals_for = 1;
        s.goals_against = 4;
        assert_eq!(s.goal_difference(), -3);
    }

    #[test]
    fn player_documents_use_camel_case_keys() {
        let mut p = Player::new("p1", "A", Position::Gk, 5, Some("t1".into()));
        p.yellow_cards = 2;
        let value = serde_json::to_value(&p).unwrap();
        assert_eq!(value["teamId"], "t1");
        assert_eq!(value["yellowCards"], 2);
        assert_eq!(value["position"], "GK");
    }
}
