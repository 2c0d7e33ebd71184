//! Turns the experiment directory's result artifacts into a score report.
//!
//! Aggregation runs once, after the last batch has been joined. Each test's
//! `replay_<id>_results.json` is classified as a scored outcome, a draw, or
//! a failure, and finishing order is converted into points per bot slot.
//! Reading is side-effect free, so summarizing an unchanged directory twice
//! yields identical totals.
//!
//! Scores accrue by *slot* (the bot's ordinal position in the match, 1 up
//! to the roster size), not by bot identity. Totals are only meaningful
//! when the roster order is the same across all tests of an invocation.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info, warn};

/// Final standings for one match, as written by the game server.
#[derive(Debug, Deserialize)]
pub struct MatchStandings {
    /// Per-player records, in the server's own order.
    #[serde(default)]
    pub players: Vec<PlayerRecord>,
}

/// One player's line in a result artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerRecord {
    /// `bot_<test>_<slot>`, assigned by the harness at launch.
    pub nickname: String,
    /// Final score of the player.
    pub score: i64,
    /// Tie-breaker after the score.
    #[serde(default)]
    pub kills: i64,
}

/// Accumulated points per bot slot, plus draw and failure counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreBoard {
    slot_points: Vec<u64>,
    draws: usize,
    failures: usize,
}

impl ScoreBoard {
    fn new(num_slots: usize) -> Self {
        ScoreBoard {
            slot_points: vec![0; num_slots],
            draws: 0,
            failures: 0,
        }
    }

    /// Number of bot slots on the board.
    pub fn num_slots(&self) -> usize {
        self.slot_points.len()
    }

    /// Total points of a slot. Slots are numbered from 1.
    pub fn points(&self, slot: usize) -> u64 {
        self.slot_points[slot - 1]
    }

    /// Matches where every player finished on the same score and kills.
    pub fn draws(&self) -> usize {
        self.draws
    }

    /// Matches that produced no usable result.
    pub fn failures(&self) -> usize {
        self.failures
    }

    fn award(&mut self, slot: usize, points: u64) {
        self.slot_points[slot - 1] += points;
    }

    /// The textual summary printed at the end of an invocation.
    pub fn report(&self) -> String {
        let mut out = String::new();
        out.push_str("=== Experiment Summary ===\n");
        for (index, points) in self.slot_points.iter().enumerate() {
            out.push_str(&format!("slot {}: {points} points\n", index + 1));
        }
        out.push_str(&format!("draws: {}\n", self.draws));
        out.push_str(&format!("failures: {}\n", self.failures));
        out.push_str("==========================\n");
        out
    }

    /// Print the summary to stdout.
    pub fn print_report(&self) {
        print!("{}", self.report());
    }
}

/// Points by finishing rank, keyed by player count.
fn points_table(player_count: usize) -> Option<&'static [u64]> {
    match player_count {
        4 => Some(&[3, 2, 1, 0]),
        3 => Some(&[2, 1, 0]),
        2 => Some(&[1, 0]),
        _ => None,
    }
}

/// Reads every result artifact under `dir` and accumulates points per slot.
///
/// `failed` holds the test ids the scheduler already gave up on; they are
/// counted as failures without looking at any artifact they may have left
/// behind. Absent, empty and unparseable artifacts also count as failures.
/// Nothing here aborts: every test contributes either points, a draw, or a
/// failure to the returned board.
pub fn summarize_results(
    dir: &Path,
    num_tests: usize,
    num_bots: usize,
    failed: &[usize],
) -> ScoreBoard {
    let mut board = ScoreBoard::new(num_bots);
    for test_id in 0..num_tests {
        if failed.contains(&test_id) {
            board.failures += 1;
            continue;
        }
        let path = dir.join(format!("replay_{test_id}_results.json"));
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(_) => {
                warn!(test_id, path = %path.display(), "result artifact missing");
                board.failures += 1;
                continue;
            }
        };
        if contents.is_empty() {
            warn!(test_id, "result artifact is empty");
            board.failures += 1;
            continue;
        }
        match serde_json::from_str::<MatchStandings>(&contents) {
            Ok(standings) => score_match(test_id, standings, &mut board),
            Err(e) => {
                // an unreadable match has no usable outcome
                error!(test_id, "could not parse result artifact: {e}");
                board.failures += 1;
            }
        }
    }
    board
}

fn score_match(test_id: usize, standings: MatchStandings, board: &mut ScoreBoard) {
    let mut players = standings.players;
    if players.is_empty() {
        warn!(test_id, "result artifact lists no players");
        board.failures += 1;
        return;
    }
    players.sort_by(|a, b| (b.score, b.kills).cmp(&(a.score, a.kills)));

    let top = (players[0].score, players[0].kills);
    if players.iter().all(|p| (p.score, p.kills) == top) {
        info!(test_id, "match is a draw");
        board.draws += 1;
        return;
    }

    let Some(points) = points_table(players.len()) else {
        error!(
            test_id,
            player_count = players.len(),
            "no points table for this player count"
        );
        return;
    };

    // ranks are strictly positional; ties below the top are not split
    for (rank, player) in players.iter().enumerate() {
        let Some(slot) = slot_of(&player.nickname) else {
            warn!(test_id, nickname = %player.nickname, "could not read slot from nickname");
            continue;
        };
        if slot == 0 || slot > board.num_slots() {
            warn!(test_id, slot, "slot out of range");
            continue;
        }
        board.award(slot, points[rank]);
    }
}

/// Slot number from the trailing suffix of `bot_<test>_<slot>`.
fn slot_of(nickname: &str) -> Option<usize> {
    nickname.rsplit('_').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_is_the_trailing_suffix() {
        assert_eq!(slot_of("bot_17_3"), Some(3));
        assert_eq!(slot_of("bot_0_1"), Some(1));
        assert_eq!(slot_of("no_suffix_here"), None);
        assert_eq!(slot_of(""), None);
    }

    #[test]
    fn points_tables_cover_two_to_four_players() {
        assert_eq!(points_table(4), Some(&[3, 2, 1, 0][..]));
        assert_eq!(points_table(3), Some(&[2, 1, 0][..]));
        assert_eq!(points_table(2), Some(&[1, 0][..]));
        assert_eq!(points_table(1), None);
        assert_eq!(points_table(5), None);
    }

    #[test]
    fn report_lists_every_slot() {
        let mut board = ScoreBoard::new(2);
        board.award(1, 3);
        board.draws = 1;
        let report = board.report();
        assert!(report.contains("slot 1: 3 points"));
        assert!(report.contains("slot 2: 0 points"));
        assert!(report.contains("draws: 1"));
        assert!(report.contains("failures: 0"));
    }
}
