use std::fs;
use std::path::Path;

use bot_harness::aggregator::summarize_results;

fn write_result(dir: &Path, test_id: usize, json: &str) {
    fs::write(dir.join(format!("replay_{test_id}_results.json")), json).unwrap();
}

fn two_player_result(test_id: usize, scores: (i64, i64)) -> String {
    format!(
        r#"{{"players":[{{"nickname":"bot_{test_id}_1","score":{},"kills":0}},{{"nickname":"bot_{test_id}_2","score":{},"kills":0}}]}}"#,
        scores.0, scores.1
    )
}

#[test]
fn equal_scores_and_kills_are_a_draw() {
    let dir = tempfile::tempdir().unwrap();
    write_result(
        dir.path(),
        0,
        r#"{"players":[{"nickname":"bot_0_1","score":10,"kills":3},{"nickname":"bot_0_2","score":10,"kills":3}]}"#,
    );

    let board = summarize_results(dir.path(), 1, 2, &[]);
    assert_eq!(board.draws(), 1);
    assert_eq!(board.failures(), 0);
    assert_eq!(board.points(1), 0);
    assert_eq!(board.points(2), 0);
}

#[test]
fn kills_break_equal_scores() {
    let dir = tempfile::tempdir().unwrap();
    write_result(
        dir.path(),
        0,
        r#"{"players":[{"nickname":"bot_0_1","score":10,"kills":1},{"nickname":"bot_0_2","score":10,"kills":4}]}"#,
    );

    let board = summarize_results(dir.path(), 1, 2, &[]);
    assert_eq!(board.draws(), 0);
    assert_eq!(board.points(1), 0);
    assert_eq!(board.points(2), 1);
}

#[test]
fn four_player_points_are_strictly_positional() {
    let dir = tempfile::tempdir().unwrap();
    // listed out of finishing order; ranks 2 and 3 are tied on (30, 0)
    write_result(
        dir.path(),
        0,
        r#"{"players":[
            {"nickname":"bot_0_2","score":30,"kills":0},
            {"nickname":"bot_0_1","score":50,"kills":0},
            {"nickname":"bot_0_3","score":30,"kills":0},
            {"nickname":"bot_0_4","score":10,"kills":0}
        ]}"#,
    );

    let board = summarize_results(dir.path(), 1, 4, &[]);
    assert_eq!(board.points(1), 3);
    // the tie is not split: artifact order decides between the two 30s
    assert_eq!(board.points(2), 2);
    assert_eq!(board.points(3), 1);
    assert_eq!(board.points(4), 0);
}

#[test]
fn determinate_outcome_distributes_the_full_table_total() {
    let dir = tempfile::tempdir().unwrap();
    write_result(
        dir.path(),
        0,
        r#"{"players":[
            {"nickname":"bot_0_1","score":9,"kills":2},
            {"nickname":"bot_0_2","score":14,"kills":0},
            {"nickname":"bot_0_3","score":3,"kills":5},
            {"nickname":"bot_0_4","score":11,"kills":1}
        ]}"#,
    );

    let board = summarize_results(dir.path(), 1, 4, &[]);
    let total: u64 = (1..=4).map(|slot| board.points(slot)).sum();
    assert_eq!(total, 6);
}

#[test]
fn missing_artifact_counts_as_failure_and_the_rest_still_score() {
    let dir = tempfile::tempdir().unwrap();
    for test_id in 0..10 {
        if test_id == 5 {
            continue;
        }
        write_result(dir.path(), test_id, &two_player_result(test_id, (10, 5)));
    }

    let board = summarize_results(dir.path(), 10, 2, &[]);
    assert_eq!(board.failures(), 1);
    assert_eq!(board.points(1), 9);
    assert_eq!(board.points(2), 0);
}

#[test]
fn empty_artifact_counts_as_failure() {
    let dir = tempfile::tempdir().unwrap();
    write_result(dir.path(), 0, "");

    let board = summarize_results(dir.path(), 1, 2, &[]);
    assert_eq!(board.failures(), 1);
    assert_eq!(board.draws(), 0);
}

#[test]
fn malformed_artifact_counts_as_failure() {
    let dir = tempfile::tempdir().unwrap();
    write_result(dir.path(), 0, "{\"players\": [not json");

    let board = summarize_results(dir.path(), 1, 2, &[]);
    assert_eq!(board.failures(), 1);
}

#[test]
fn artifact_without_players_counts_as_failure() {
    let dir = tempfile::tempdir().unwrap();
    write_result(dir.path(), 0, r#"{"players":[]}"#);

    let board = summarize_results(dir.path(), 1, 2, &[]);
    assert_eq!(board.failures(), 1);
}

#[test]
fn scheduler_reported_failures_shadow_their_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    write_result(dir.path(), 0, &two_player_result(0, (10, 5)));

    let board = summarize_results(dir.path(), 1, 2, &[0]);
    assert_eq!(board.failures(), 1);
    assert_eq!(board.points(1), 0);
}

#[test]
fn unknown_player_count_scores_zero_without_failing() {
    let dir = tempfile::tempdir().unwrap();
    write_result(
        dir.path(),
        0,
        r#"{"players":[
            {"nickname":"bot_0_1","score":5,"kills":0},
            {"nickname":"bot_0_2","score":4,"kills":0},
            {"nickname":"bot_0_3","score":3,"kills":0},
            {"nickname":"bot_0_4","score":2,"kills":0},
            {"nickname":"bot_0_5","score":1,"kills":0}
        ]}"#,
    );

    let board = summarize_results(dir.path(), 1, 4, &[]);
    assert_eq!(board.failures(), 0);
    assert_eq!(board.draws(), 0);
    let total: u64 = (1..=4).map(|slot| board.points(slot)).sum();
    assert_eq!(total, 0);
}

#[test]
fn aggregation_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    write_result(dir.path(), 0, &two_player_result(0, (10, 5)));
    write_result(dir.path(), 1, &two_player_result(1, (7, 7)));
    write_result(dir.path(), 3, "{broken");

    let first = summarize_results(dir.path(), 4, 2, &[]);
    let second = summarize_results(dir.path(), 4, 2, &[]);
    assert_eq!(first, second);
    assert_eq!(first.failures(), 2); // one missing, one malformed
    assert_eq!(first.draws(), 1);
    assert_eq!(first.points(1), 1);
}
