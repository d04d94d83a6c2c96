// Match finalization: seal a pending fixture and propagate point and
// standings deltas as a pure transform over snapshots.

use thiserror::Error;

use super::model::{GoalTally, Match, Player, ScoringRules, TeamStanding};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoringError {
    #[error("match already finalized")]
    AlreadyFinalized,

    #[error("league has no scoring rules configured")]
    MissingRules,

    #[error("invalid score: {0}")]
    InvalidScore(i64),
}

/// Raw per-side event lists as entered by the commissioner. One entry per
/// event, so a brace is two scorer entries for the same id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideEvents {
    pub scorers: Vec<String>,
    pub assisters: Vec<String>,
    pub yellow_cards: Vec<String>,
    pub red_cards: Vec<String>,
}

impl SideEvents {
    /// Drop blank entries left behind by half-filled report forms.
    fn cleaned(&self) -> SideEvents {
        let clean = |ids: &[String]| {
            ids.iter()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect()
        };
        SideEvents {
            scorers: clean(&self.scorers),
            assisters: clean(&self.assisters),
            yellow_cards: clean(&self.yellow_cards),
            red_cards: clean(&self.red_cards),
        }
    }
}

/// A validated final result ready to be applied to a fixture.
///
/// Event-list lengths are deliberately not cross-checked against the score
/// line; the report is accepted as entered. Only negative scores are
/// rejected, at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchReport {
    score_a: u32,
    score_b: u32,
    events_a: SideEvents,
    events_b: SideEvents,
    motm_player_id: Option<String>,
}

impl MatchReport {
    pub fn new(
        score_a: i64,
        score_b: i64,
        events_a: SideEvents,
        events_b: SideEvents,
        motm_player_id: Option<String>,
    ) -> Result<Self, ScoringError> {
        let check = |score: i64| {
            u32::try_from(score).map_err(|_| ScoringError::InvalidScore(score))
        };
        Ok(MatchReport {
            score_a: check(score_a)?,
            score_b: check(score_b)?,
            events_a: events_a.cleaned(),
            events_b: events_b.cleaned(),
            motm_player_id: motm_player_id.filter(|id| !id.trim().is_empty()),
        })
    }
}

/// The full output of a finalization: replacement snapshots for the three
/// affected subtrees. Callers persist all of them together or none.
#[derive(Debug, Clone, PartialEq)]
pub struct Finalized {
    pub players: Vec<Player>,
    pub standings: Vec<TeamStanding>,
    pub sealed: Match,
}

/// Seal `fixture` with `report` and compute the resulting player and
/// standings snapshots.
///
/// Inputs are taken by reference and never mutated; on error nothing has
/// changed. Players not on either team pass through untouched, as do
/// standings rows for uninvolved teams. Event ids that resolve to no player
/// are tolerated: they still appear in the sealed match record but credit
/// nobody.
pub fn finalize_match(
    fixture: &Match,
    report: &MatchReport,
    rules: Option<&ScoringRules>,
    players: &[Player],
    standings: &[TeamStanding],
) -> Result<Finalized, ScoringError> {
    if fixture.is_played {
        return Err(ScoringError::AlreadyFinalized);
    }
    let rules = rules.ok_or(ScoringError::MissingRules)?;

    let updated_players = players
        .iter()
        .map(|p| score_player(p, fixture, report, rules))
        .collect();

    let updated_standings = standings
        .iter()
        .map(|s| advance_standing(s, fixture, report))
        .collect();

    let mut sealed = fixture.clone();
    sealed.is_played = true;
    sealed.score_a = report.score_a;
    sealed.score_b = report.score_b;
    sealed.motm_player_id = report.motm_player_id.clone();
    sealed.scorers = aggregate_tallies(&report.events_a.scorers);
    sealed
        .scorers
        .extend(aggregate_tallies(&report.events_b.scorers));
    sealed.assisters = aggregate_tallies(&report.events_a.assisters);
    sealed
        .assisters
        .extend(aggregate_tallies(&report.events_b.assisters));
    sealed.yellow_card_player_ids = report.events_a.yellow_cards.clone();
    sealed
        .yellow_card_player_ids
        .extend(report.events_b.yellow_cards.iter().cloned());
    sealed.red_card_player_ids = report.events_a.red_cards.clone();
    sealed
        .red_card_player_ids
        .extend(report.events_b.red_cards.iter().cloned());

    Ok(Finalized {
        players: updated_players,
        standings: updated_standings,
        sealed,
    })
}

fn score_player(
    player: &Player,
    fixture: &Match,
    report: &MatchReport,
    rules: &ScoringRules,
) -> Player {
    let is_a = player.plays_for(&fixture.team_a_id);
    let is_b = player.plays_for(&fixture.team_b_id);
    if !is_a && !is_b {
        return player.clone();
    }
    let events = if is_a { &report.events_a } else { &report.events_b };
    let (scored, conceded) = if is_a {
        (report.score_a, report.score_b)
    } else {
        (report.score_b, report.score_a)
    };

    let mut updated = player.clone();
    let mut pts: i64 = 0;

    if scored > conceded {
        pts += rules.win;
    }
    if report.motm_player_id.as_deref() == Some(player.id.as_str()) {
        pts += rules.motm;
    }

    let count_of = |ids: &[String]| ids.iter().filter(|id| *id == &player.id).count() as u32;
    let goals = count_of(&events.scorers);
    let assists = count_of(&events.assisters);
    let yellows = count_of(&events.yellow_cards);
    let reds = count_of(&events.red_cards);

    pts += i64::from(goals) * rules.goal + i64::from(assists) * rules.assist;
    pts += i64::from(yellows) * rules.yellow_card + i64::from(reds) * rules.red_card;

    if player.position.is_goalkeeper() && conceded == 0 {
        pts += rules.clean_sheet;
    }

    updated.points += pts;
    updated.goals += goals;
    updated.assists += assists;
    updated.yellow_cards += yellows;
    updated.red_cards += reds;
    updated
}

fn advance_standing(standing: &TeamStanding, fixture: &Match, report: &MatchReport) -> TeamStanding {
    let is_a = standing.id == fixture.team_a_id;
    let is_b = standing.id == fixture.team_b_id;
    if !is_a && !is_b {
        return standing.clone();
    }
    let (gf, ga) = if is_a {
        (report.score_a, report.score_b)
    } else {
        (report.score_b, report.score_a)
    };

    let mut updated = standing.clone();
    updated.played += 1;
    updated.goals_for += gf;
    updated.goals_against += ga;
    if gf > ga {
        updated.won += 1;
        updated.points += 3;
    } else if gf == ga {
        updated.drawn += 1;
        updated.points += 1;
    } else {
        updated.lost += 1;
    }
    updated
}

/// Collapse an event list into per-player counts, preserving the order in
/// which each player first appears.
pub fn aggregate_tallies(ids: &[String]) -> Vec<GoalTally> {
    let mut tallies: Vec<GoalTally> = Vec::new();
    for id in ids {
        match tallies.iter_mut().find(|t| &t.player_id == id) {
            Some(tally) => tally.count += 1,
            None => tallies.push(GoalTally {
                player_id: id.clone(),
                count: 1,
            }),
        }
    }
    tallies
}

/// Re-expand stored tallies into one id per event, for display code that
/// renders a row per goal.
pub fn expand_tallies(tallies: &[GoalTally]) -> Vec<String> {
    tallies
        .iter()
        .flat_map(|t| std::iter::repeat(t.player_id.clone()).take(t.count as usize))
        .collect()
}
