// Session controller: accounts, league membership, and orchestration of the
// draft and scoring engines against the store.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::league::draft::{self, DraftError, SquadLimits};
use crate::league::model::{
    League, Match, Player, Position, ScoringRules, TeamStanding, User,
};
use crate::league::scoring::{self, MatchReport, ScoringError};
use crate::store::{self, paths, Store, StoreError, Write};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Draft(#[from] DraftError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error("not signed in")]
    NotSignedIn,

    #[error("no active league")]
    NoActiveLeague,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("username is taken: {0}")]
    UsernameTaken(String),

    #[error("league not found: {0}")]
    LeagueNotFound(String),

    #[error("match not found: {0}")]
    MatchNotFound(String),

    #[error("admin authentication required")]
    AdminRequired,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("could not allocate a unique join code")]
    JoinCodeExhausted,

    #[error("session cache error: {0}")]
    Cache(String),
}

/// A global account record, independent of any league.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub username: String,
    pub password: String,
}

/// What survives a restart: who was signed in and which league they were in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCache {
    pub username: Option<String>,
    pub league_id: Option<String>,
    pub saved_at: DateTime<Utc>,
}

/// League metadata stored separately from the entity subtrees, so roster
/// writes and match finalization never race the admin credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeagueMeta {
    id: String,
    name: String,
    admin_password: String,
    created_by: String,
}

/// One signed-in user's view of the system. All state changes flow through
/// here: the engines stay pure and the store does the persisting.
pub struct Session {
    store: Arc<dyn Store>,
    limits: SquadLimits,
    cache_path: PathBuf,
    username: Option<String>,
    league_id: Option<String>,
    admin_by_pass: bool,
}

impl Session {
    pub fn new(store: Arc<dyn Store>, limits: SquadLimits, cache_path: impl Into<PathBuf>) -> Self {
        Session {
            store,
            limits,
            cache_path: cache_path.into(),
            username: None,
            league_id: None,
            admin_by_pass: false,
        }
    }

    pub fn current_user(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn current_league(&self) -> Option<&str> {
        self.league_id.as_deref()
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    /// Create a new account and sign in as it. Usernames are trimmed,
    /// lowercased, and stripped of inner whitespace before use.
    pub async fn register(&mut self, username: &str, password: &str) -> Result<(), SessionError> {
        let username = normalize_username(username);
        let password = password.trim();
        if username.is_empty() || password.is_empty() {
            return Err(SessionError::InvalidInput(
                "username and password are required".into(),
            ));
        }

        let account = Account {
            username: username.clone(),
            password: password.to_string(),
        };
        let path = paths::account(&username);
        let value = store::encode(&path, &account)?;
        // Create-only write; losing the race means the name is taken.
        match self.store.set_if_revision(&path, 0, value).await {
            Ok(_) => {}
            Err(StoreError::Conflict { .. }) => {
                return Err(SessionError::UsernameTaken(username));
            }
            Err(e) => return Err(e.into()),
        }

        info!(username = %username, "account registered");
        self.username = Some(username);
        self.save_cache()?;
        Ok(())
    }

    /// Sign in with an existing account. Unknown usernames and wrong
    /// passwords are reported identically.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), SessionError> {
        let username = normalize_username(username);
        let path = paths::account(&username);
        let account: Account = match store::fetch(self.store.as_ref(), &path).await {
            Ok(account) => account,
            Err(StoreError::NotFound { .. }) => return Err(SessionError::InvalidCredentials),
            Err(e) => return Err(e.into()),
        };
        if account.password != password.trim() {
            return Err(SessionError::InvalidCredentials);
        }

        info!(username = %username, "signed in");
        self.username = Some(username);
        self.save_cache()?;
        Ok(())
    }

    pub fn logout(&mut self) -> Result<(), SessionError> {
        self.username = None;
        self.league_id = None;
        self.admin_by_pass = false;
        self.save_cache()
    }

    // -----------------------------------------------------------------------
    // League membership
    // -----------------------------------------------------------------------

    /// Create a league, seed its subtrees, and enter it as the creator.
    /// Returns the generated join code.
    pub async fn create_league(
        &mut self,
        name: &str,
        admin_password: &str,
    ) -> Result<String, SessionError> {
        let username = self.require_user()?.to_string();
        let name = name.trim();
        let admin_password = admin_password.trim();
        if name.is_empty() || admin_password.is_empty() {
            return Err(SessionError::InvalidInput(
                "league name and admin password are required".into(),
            ));
        }

        // Short random join codes can collide; claim the meta document with
        // a create-only write and retry on conflict.
        let mut code = generate_join_code();
        let mut claimed = false;
        for _ in 0..8 {
            let meta = LeagueMeta {
                id: code.clone(),
                name: name.to_string(),
                admin_password: admin_password.to_string(),
                created_by: username.clone(),
            };
            let path = paths::league_meta(&code);
            let value = store::encode(&path, &meta)?;
            match self.store.set_if_revision(&path, 0, value).await {
                Ok(_) => {
                    claimed = true;
                    break;
                }
                Err(StoreError::Conflict { .. }) => code = generate_join_code(),
                Err(e) => return Err(e.into()),
            }
        }
        if !claimed {
            return Err(SessionError::JoinCodeExhausted);
        }

        let creator = User::fresh(&username, format!("{username}'s XI"));
        self.store
            .commit(vec![
                Write::put(paths::league_players(&code), Vec::<Player>::new())?,
                Write::put(paths::league_standings(&code), Vec::<TeamStanding>::new())?,
                Write::put(paths::league_matches(&code), Vec::<Match>::new())?,
                Write::put(paths::league_rules(&code), ScoringRules::default())?,
                Write::put(paths::league_user(&code, &username), &creator)?,
            ])
            .await?;

        info!(league = %code, name, "league created");
        self.league_id = Some(code.clone());
        self.admin_by_pass = false;
        self.save_cache()?;
        Ok(code)
    }

    /// Enter a league by join code. Codes are forgiving of pasted `#`
    /// prefixes and case. First entry creates the member's per-league
    /// record with an empty roster.
    pub async fn join_league(&mut self, code: &str) -> Result<(), SessionError> {
        let username = self.require_user()?.to_string();
        let code = normalize_join_code(code);
        if code.is_empty() {
            return Err(SessionError::InvalidInput("join code is required".into()));
        }

        if self.store.get(&paths::league_meta(&code)).await?.is_none() {
            return Err(SessionError::LeagueNotFound(code));
        }

        let user_path = paths::league_user(&code, &username);
        if self.store.get(&user_path).await?.is_none() {
            let fresh = User::fresh(&username, format!("{username}'s XI"));
            let value = store::encode(&user_path, &fresh)?;
            // Create-only; another device signed in as the same account may
            // have bootstrapped first, which is fine.
            match self.store.set_if_revision(&user_path, 0, value).await {
                Ok(_) => info!(league = %code, username = %username, "member bootstrapped"),
                Err(StoreError::Conflict { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.league_id = Some(code);
        self.admin_by_pass = false;
        self.save_cache()?;
        Ok(())
    }

    pub fn leave_league(&mut self) -> Result<(), SessionError> {
        self.league_id = None;
        self.admin_by_pass = false;
        self.save_cache()
    }

    /// Assemble the active league from its stored subtrees.
    pub async fn load_league(&self) -> Result<League, SessionError> {
        let league_id = self.require_league()?.to_string();
        let meta: LeagueMeta =
            match store::fetch(self.store.as_ref(), &paths::league_meta(&league_id)).await {
                Ok(meta) => meta,
                Err(StoreError::NotFound { .. }) => {
                    return Err(SessionError::LeagueNotFound(league_id));
                }
                Err(e) => return Err(e.into()),
            };

        let mut league = League::new(meta.id, meta.name, meta.admin_password, meta.created_by);
        league.players = self.read_or_default(&paths::league_players(&league_id)).await?;
        league.standings = self
            .read_or_default(&paths::league_standings(&league_id))
            .await?;
        league.matches = self.read_or_default(&paths::league_matches(&league_id)).await?;
        league.scoring_rules = match self.store.get(&paths::league_rules(&league_id)).await? {
            Some(value) => Some(store::decode(&paths::league_rules(&league_id), value)?),
            None => None,
        };

        league.users.clear();
        for (path, value) in self
            .store
            .list(&paths::league_users_prefix(&league_id))
            .await?
        {
            let user: User = store::decode(&path, value)?;
            league.users.insert(user.username.clone(), user);
        }

        Ok(league)
    }

    // -----------------------------------------------------------------------
    // Admin authentication
    // -----------------------------------------------------------------------

    /// Whether this session may perform admin operations on the active
    /// league: the creator always can, everyone else needs the passphrase.
    pub async fn is_admin(&self) -> Result<bool, SessionError> {
        if self.admin_by_pass {
            return Ok(true);
        }
        let username = self.require_user()?;
        let league_id = self.require_league()?;
        let meta: LeagueMeta =
            store::fetch(self.store.as_ref(), &paths::league_meta(league_id)).await?;
        Ok(meta.created_by == username)
    }

    /// Authenticate as admin with the league passphrase.
    pub async fn authenticate_admin(&mut self, passphrase: &str) -> Result<(), SessionError> {
        let league_id = self.require_league()?;
        let meta: LeagueMeta =
            store::fetch(self.store.as_ref(), &paths::league_meta(league_id)).await?;
        if meta.admin_password != passphrase {
            warn!(league = %meta.id, "admin authentication failed");
            return Err(SessionError::InvalidCredentials);
        }
        self.admin_by_pass = true;
        Ok(())
    }

    async fn require_admin(&self) -> Result<(), SessionError> {
        if self.is_admin().await? {
            Ok(())
        } else {
            Err(SessionError::AdminRequired)
        }
    }

    // -----------------------------------------------------------------------
    // Roster operations (self-service)
    // -----------------------------------------------------------------------

    /// Draft a player into the signed-in manager's squad.
    pub async fn add_to_squad(&self, player_id: &str) -> Result<User, SessionError> {
        let (league_id, mut user) = self.own_user().await?;
        let players: Vec<Player> = self.read_or_default(&paths::league_players(&league_id)).await?;
        let candidate = players
            .iter()
            .find(|p| p.id == player_id)
            .ok_or_else(|| SessionError::InvalidInput(format!("unknown player {player_id}")))?;

        let update = draft::add_player(&user, candidate, &players, &self.limits)?;
        user.selected_player_ids = update.selected_player_ids;
        user.starter_ids = update.starter_ids;
        self.write_user(&league_id, &user).await?;
        Ok(user)
    }

    /// Drop a player from the signed-in manager's squad.
    pub async fn remove_from_squad(&self, player_id: &str) -> Result<User, SessionError> {
        let (league_id, mut user) = self.own_user().await?;
        let update = draft::remove_player(&user, player_id)?;
        user.selected_player_ids = update.selected_player_ids;
        user.starter_ids = update.starter_ids;
        self.write_user(&league_id, &user).await?;
        Ok(user)
    }

    /// Lock in the signed-in manager's completed squad.
    pub async fn confirm_roster(&self) -> Result<User, SessionError> {
        let (league_id, mut user) = self.own_user().await?;
        let players: Vec<Player> = self.read_or_default(&paths::league_players(&league_id)).await?;
        draft::confirm_roster(&user, &players, &self.limits)?;
        user.is_locked = true;
        self.write_user(&league_id, &user).await?;
        info!(league = %league_id, username = %user.username, "roster locked");
        Ok(user)
    }

    /// Admin: reopen a locked roster so the manager can edit again.
    pub async fn unlock_roster(&self, username: &str) -> Result<User, SessionError> {
        self.require_admin().await?;
        let league_id = self.require_league()?.to_string();
        let username = normalize_username(username);
        let path = paths::league_user(&league_id, &username);
        let mut user: User = store::fetch(self.store.as_ref(), &path).await?;
        draft::unlock_roster(&mut user);
        self.write_user(&league_id, &user).await?;
        info!(league = %league_id, username = %username, "roster unlocked");
        Ok(user)
    }

    // -----------------------------------------------------------------------
    // Admin edits
    // -----------------------------------------------------------------------

    /// Admin: register a player into the league-wide pool.
    pub async fn add_player(
        &self,
        name: &str,
        position: Position,
        price: u32,
        team_id: Option<String>,
    ) -> Result<Player, SessionError> {
        self.require_admin().await?;
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidInput("player name is required".into()));
        }
        let league_id = self.require_league()?.to_string();
        let id = fresh_id("p");
        let player = Player::new(id, name, position, price, team_id);

        self.edit_players(&league_id, |players| players.push(player.clone()))
            .await?;
        Ok(player)
    }

    /// Admin: remove a player from the pool. Roster references to the id
    /// are left to dangle and stop counting toward budgets.
    pub async fn delete_player(&self, player_id: &str) -> Result<(), SessionError> {
        self.require_admin().await?;
        let league_id = self.require_league()?.to_string();
        self.edit_players(&league_id, |players| {
            players.retain(|p| p.id != player_id);
        })
        .await
    }

    /// Admin: reprice a player. Already-drafted squads keep the player; a
    /// full squad pushed over budget fails its next confirmation instead.
    pub async fn set_player_price(&self, player_id: &str, price: u32) -> Result<(), SessionError> {
        self.require_admin().await?;
        let league_id = self.require_league()?.to_string();
        self.edit_players(&league_id, |players| {
            if let Some(p) = players.iter_mut().find(|p| p.id == player_id) {
                p.price = price;
            }
        })
        .await
    }

    /// Admin: move a player between real teams, or to free agency.
    pub async fn set_player_team(
        &self,
        player_id: &str,
        team_id: Option<String>,
    ) -> Result<(), SessionError> {
        self.require_admin().await?;
        let league_id = self.require_league()?.to_string();
        self.edit_players(&league_id, |players| {
            if let Some(p) = players.iter_mut().find(|p| p.id == player_id) {
                p.team_id = team_id.clone();
            }
        })
        .await
    }

    /// Admin: add a real team to the table with a zeroed record.
    pub async fn add_standing(&self, team: &str) -> Result<TeamStanding, SessionError> {
        self.require_admin().await?;
        let team = team.trim();
        if team.is_empty() {
            return Err(SessionError::InvalidInput("team name is required".into()));
        }
        let league_id = self.require_league()?.to_string();
        let standing = TeamStanding::new(fresh_id("t"), team);
        self.edit_standings(&league_id, |standings| standings.push(standing.clone()))
            .await?;
        Ok(standing)
    }

    pub async fn delete_standing(&self, team_id: &str) -> Result<(), SessionError> {
        self.require_admin().await?;
        let league_id = self.require_league()?.to_string();
        self.edit_standings(&league_id, |standings| {
            standings.retain(|s| s.id != team_id);
        })
        .await
    }

    /// Admin: assign (or clear) a team's captain.
    pub async fn assign_captain(
        &self,
        team_id: &str,
        captain_player_id: Option<String>,
    ) -> Result<(), SessionError> {
        self.require_admin().await?;
        let league_id = self.require_league()?.to_string();
        self.edit_standings(&league_id, |standings| {
            if let Some(s) = standings.iter_mut().find(|s| s.id == team_id) {
                s.captain_player_id = captain_player_id.clone();
            }
        })
        .await
    }

    /// Admin: schedule a pending fixture.
    pub async fn schedule_match(
        &self,
        gameweek: u32,
        date: &str,
        team_a_id: &str,
        team_b_id: &str,
    ) -> Result<Match, SessionError> {
        self.require_admin().await?;
        if team_a_id.is_empty() || team_b_id.is_empty() {
            return Err(SessionError::InvalidInput("both teams are required".into()));
        }
        let league_id = self.require_league()?.to_string();
        let fixture = Match::fixture(fresh_id("m"), gameweek, date, team_a_id, team_b_id);
        self.edit_matches(&league_id, |matches| matches.push(fixture.clone()))
            .await?;
        Ok(fixture)
    }

    pub async fn delete_match(&self, match_id: &str) -> Result<(), SessionError> {
        self.require_admin().await?;
        let league_id = self.require_league()?.to_string();
        self.edit_matches(&league_id, |matches| {
            matches.retain(|m| m.id != match_id);
        })
        .await
    }

    /// Admin: replace the league's scoring rules. Applies only to future
    /// finalizations; sealed matches are never rescored.
    pub async fn update_rules(&self, rules: ScoringRules) -> Result<(), SessionError> {
        self.require_admin().await?;
        let league_id = self.require_league()?.to_string();
        let path = paths::league_rules(&league_id);
        let value = store::encode(&path, &rules)?;
        self.store.set(&path, value).await?;
        Ok(())
    }

    /// Admin: seal a pending match and propagate point and standings
    /// deltas. The three affected subtrees are committed together, so a
    /// crash can never leave points applied without the match sealed.
    pub async fn finalize_match(
        &self,
        match_id: &str,
        report: &MatchReport,
    ) -> Result<(), SessionError> {
        self.require_admin().await?;
        let league_id = self.require_league()?.to_string();

        let players: Vec<Player> = self.read_or_default(&paths::league_players(&league_id)).await?;
        let standings: Vec<TeamStanding> = self
            .read_or_default(&paths::league_standings(&league_id))
            .await?;
        let mut matches: Vec<Match> =
            self.read_or_default(&paths::league_matches(&league_id)).await?;
        let rules: Option<ScoringRules> = match self.store.get(&paths::league_rules(&league_id)).await? {
            Some(value) => Some(store::decode(&paths::league_rules(&league_id), value)?),
            None => None,
        };

        let fixture = matches
            .iter()
            .find(|m| m.id == match_id)
            .ok_or_else(|| SessionError::MatchNotFound(match_id.to_string()))?;

        let outcome = scoring::finalize_match(fixture, report, rules.as_ref(), &players, &standings)?;

        let sealed_id = outcome.sealed.id.clone();
        for m in matches.iter_mut() {
            if m.id == sealed_id {
                *m = outcome.sealed.clone();
            }
        }

        self.store
            .commit(vec![
                Write::put(paths::league_players(&league_id), &outcome.players)?,
                Write::put(paths::league_standings(&league_id), &outcome.standings)?,
                Write::put(paths::league_matches(&league_id), &matches)?,
            ])
            .await?;

        info!(league = %league_id, match_id, "match finalized");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Session cache
    // -----------------------------------------------------------------------

    /// Restore who was signed in (and where) from the cache file. A missing
    /// or unreadable cache is a clean slate, never an error.
    pub fn restore(&mut self) -> bool {
        let Ok(text) = std::fs::read_to_string(&self.cache_path) else {
            return false;
        };
        match serde_json::from_str::<SessionCache>(&text) {
            Ok(cache) => {
                self.username = cache.username;
                self.league_id = cache.league_id;
                self.username.is_some()
            }
            Err(err) => {
                warn!(path = %self.cache_path.display(), %err, "ignoring corrupt session cache");
                false
            }
        }
    }

    fn save_cache(&self) -> Result<(), SessionError> {
        let cache = SessionCache {
            username: self.username.clone(),
            league_id: self.league_id.clone(),
            saved_at: Utc::now(),
        };
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SessionError::Cache(e.to_string()))?;
        }
        let text =
            serde_json::to_string_pretty(&cache).map_err(|e| SessionError::Cache(e.to_string()))?;
        std::fs::write(&self.cache_path, text).map_err(|e| SessionError::Cache(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn require_user(&self) -> Result<&str, SessionError> {
        self.username.as_deref().ok_or(SessionError::NotSignedIn)
    }

    fn require_league(&self) -> Result<&str, SessionError> {
        self.league_id.as_deref().ok_or(SessionError::NoActiveLeague)
    }

    async fn own_user(&self) -> Result<(String, User), SessionError> {
        let username = self.require_user()?.to_string();
        let league_id = self.require_league()?.to_string();
        let user = store::fetch(self.store.as_ref(), &paths::league_user(&league_id, &username))
            .await?;
        Ok((league_id, user))
    }

    async fn write_user(&self, league_id: &str, user: &User) -> Result<(), SessionError> {
        let path = paths::league_user(league_id, &user.username);
        let value = store::encode(&path, user)?;
        self.store.set(&path, value).await?;
        Ok(())
    }

    async fn read_or_default<T>(&self, path: &str) -> Result<T, SessionError>
    where
        T: DeserializeOwned + Default,
    {
        match self.store.get(path).await? {
            Some(value) => Ok(store::decode(path, value)?),
            None => Ok(T::default()),
        }
    }

    async fn edit_players(
        &self,
        league_id: &str,
        edit: impl FnOnce(&mut Vec<Player>),
    ) -> Result<(), SessionError> {
        let path = paths::league_players(league_id);
        let mut players: Vec<Player> = self.read_or_default(&path).await?;
        edit(&mut players);
        let value = store::encode(&path, &players)?;
        self.store.set(&path, value).await?;
        Ok(())
    }

    async fn edit_standings(
        &self,
        league_id: &str,
        edit: impl FnOnce(&mut Vec<TeamStanding>),
    ) -> Result<(), SessionError> {
        let path = paths::league_standings(league_id);
        let mut standings: Vec<TeamStanding> = self.read_or_default(&path).await?;
        edit(&mut standings);
        let value = store::encode(&path, &standings)?;
        self.store.set(&path, value).await?;
        Ok(())
    }

    async fn edit_matches(
        &self,
        league_id: &str,
        edit: impl FnOnce(&mut Vec<Match>),
    ) -> Result<(), SessionError> {
        let path = paths::league_matches(league_id);
        let mut matches: Vec<Match> = self.read_or_default(&path).await?;
        edit(&mut matches);
        let value = store::encode(&path, &matches)?;
        self.store.set(&path, value).await?;
        Ok(())
    }
}

/// Usernames are case-insensitive and contain no whitespace.
fn normalize_username(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Join codes are forgiving of `#` prefixes, padding, and case.
pub fn normalize_join_code(raw: &str) -> String {
    raw.replace('#', "").trim().to_uppercase()
}

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn generate_join_code() -> String {
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

/// Fresh entity id: millisecond timestamp plus a random suffix to keep
/// same-millisecond creations distinct.
fn fresh_id(prefix: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("{prefix}-{millis}-{suffix:04}")
}
