use std::collections::{BTreeMap, HashMap};
use itertools::Itertools;
use rocket::futures::future::try_join_all;
use rocket::response::status::Custom;
use rocket::serde::Serialize;
use rocket::serde::json::Json;
use rocket::{Build, Rocket, State, tokio};
use rocket_dyn_templates::{Template, context};
use crate::api::{CheckpointInRaceRecord, PassingRecord, RaceApiClient, RaceId, RunnerId, RunnerRecord};
use crate::rtdatetime::{RtDateTime, hhmm, hhmmss};
use crate::util::anyhow_to_custom_error;

/// One runner's progress through a race, times keyed by checkpoint *position*.
/// Positions are unique and totally ordered within a race, so they are the
/// course sequence; checkpoint ids are only used to resolve passings.
#[derive(Serialize, Clone, Debug)]
pub struct RunnerView {
    pub runner_id: RunnerId,
    pub name: String,
    pub times: BTreeMap<i64, RtDateTime>,
}

#[derive(Serialize, Debug)]
pub struct RaceView {
    pub checkpoints: Vec<CheckpointInRaceRecord>,
    pub runners: Vec<RunnerView>,
}

pub fn build_runner_views(
    checkpoints: &[CheckpointInRaceRecord],
    runners: Vec<RunnerRecord>,
    passings: Vec<Vec<PassingRecord>>,
) -> Vec<RunnerView> {
    let positions: HashMap<_, _> = checkpoints.iter()
        .map(|c| (c.checkpoint_id, c.position))
        .collect();
    runners.into_iter().zip(passings).map(|(runner, passings)| {
        let times = passings.into_iter()
            .filter_map(|p| {
                // passings without a recorded time, or at a checkpoint not on
                // this race's course, carry no leaderboard information
                let time = p.passing_time?;
                let position = positions.get(&p.checkpoint_id)?;
                Some((*position, time))
            })
            .collect();
        RunnerView {
            runner_id: runner.runner_id,
            name: runner.name,
            times,
        }
    }).collect()
}

/// Maps each runner who missed a cutoff to the position of the first
/// checkpoint, in course order, whose non-null time limit their recorded
/// passing time strictly exceeds. Checkpoints the runner has no time for are
/// skipped, a null limit never eliminates, and runners absent from the map
/// are still in the race.
pub fn fell_out_positions(
    checkpoints: &[CheckpointInRaceRecord],
    runners: &[RunnerView],
) -> HashMap<RunnerId, i64> {
    let mut fell_out = HashMap::new();
    for runner in runners {
        for checkpoint in checkpoints.iter().sorted_by_key(|c| c.position) {
            let (Some(time), Some(limit)) = (runner.times.get(&checkpoint.position), checkpoint.time_limit) else {
                continue;
            };
            if *time > limit {
                fell_out.insert(runner.runner_id, checkpoint.position);
                break;
            }
        }
    }
    fell_out
}

/// Leaderboard assembly: checkpoint and runner lists are fetched
/// concurrently, then all runners' passings are fetched concurrently. Any
/// failed fetch fails the whole assembly.
pub async fn load_race_view(client: &RaceApiClient, race_id: RaceId) -> anyhow::Result<RaceView> {
    let (mut checkpoints, runners) = tokio::try_join!(
        client.checkpoints_in_race(race_id),
        client.runners_in_race(race_id),
    )?;
    checkpoints.sort_by_key(|c| c.position);
    let passings = try_join_all(
        runners.iter().map(|runner| client.checkpoint_passings(runner.runner_id))
    ).await?;
    let runners = build_runner_views(&checkpoints, runners, passings);
    Ok(RaceView { checkpoints, runners })
}

#[derive(Serialize, Debug)]
struct CheckpointColumn {
    position: i64,
    time_limit: Option<String>,
}
#[derive(Serialize, Debug)]
struct LeaderboardCell {
    time: Option<String>,
    over_limit: bool,
}
#[derive(Serialize, Debug)]
struct LeaderboardRow {
    name: String,
    in_race: bool,
    fell_out_position: Option<i64>,
    cells: Vec<LeaderboardCell>,
    last_passed: Option<String>,
}

fn leaderboard_rows(race: &RaceView, fell_out: &HashMap<RunnerId, i64>) -> Vec<LeaderboardRow> {
    race.runners.iter().map(|runner| {
        let cells = race.checkpoints.iter().map(|checkpoint| {
            let time = runner.times.get(&checkpoint.position);
            let over_limit = match (time, checkpoint.time_limit) {
                (Some(time), Some(limit)) => *time > limit,
                _ => false,
            };
            LeaderboardCell {
                time: time.map(hhmmss),
                over_limit,
            }
        }).collect();
        let fell_out_position = fell_out.get(&runner.runner_id).copied();
        let last_passed = runner.times.last_key_value()
            .map(|(position, time)| format!("{position}: {}", hhmmss(time)));
        LeaderboardRow {
            name: runner.name.clone(),
            in_race: fell_out_position.is_none(),
            fell_out_position,
            cells,
            last_passed,
        }
    }).collect()
}

#[get("/races")]
async fn get_races(client: &State<RaceApiClient>) -> Result<Template, Custom<String>> {
    let races = client.races().await.map_err(anyhow_to_custom_error)?;
    Ok(Template::render("races", context! {
        races,
    }))
}

#[get("/race/<race_id>")]
async fn get_race(race_id: RaceId, client: &State<RaceApiClient>) -> Result<Template, Custom<String>> {
    let race = load_race_view(client, race_id).await.map_err(anyhow_to_custom_error)?;
    let fell_out = fell_out_positions(&race.checkpoints, &race.runners);
    let checkpoints = race.checkpoints.iter().map(|c| CheckpointColumn {
        position: c.position,
        time_limit: c.time_limit.as_ref().map(hhmm),
    }).collect::<Vec<_>>();
    let runners = leaderboard_rows(&race, &fell_out);
    Ok(Template::render("race", context! {
        race_id,
        checkpoints,
        runners,
    }))
}

#[get("/api/race/<race_id>/leaderboard")]
async fn api_get_leaderboard(race_id: RaceId, client: &State<RaceApiClient>) -> Result<Json<RaceView>, Custom<String>> {
    let race = load_race_view(client, race_id).await.map_err(anyhow_to_custom_error)?;
    Ok(Json(race))
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
            get_races,
            get_race,
            api_get_leaderboard,
        ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::CheckpointId;

    fn dt(s: &str) -> RtDateTime {
        RtDateTime::parse_from_string(s).unwrap()
    }
    fn cp(checkpoint_id: CheckpointId, position: i64, time_limit: Option<&str>) -> CheckpointInRaceRecord {
        CheckpointInRaceRecord {
            checkpoint_id,
            position,
            time_limit: time_limit.map(dt),
        }
    }
    fn runner(runner_id: RunnerId, times: &[(i64, &str)]) -> RunnerView {
        RunnerView {
            runner_id,
            name: format!("runner-{runner_id}"),
            times: times.iter().map(|(pos, t)| (*pos, dt(t))).collect(),
        }
    }

    #[test]
    fn runner_within_all_limits_stays_active() {
        let checkpoints = [
            cp(1, 1, Some("2024-06-01T13:00:00Z")),
            cp(2, 2, Some("2024-06-01T14:30:00Z")),
        ];
        let runners = [runner(1, &[(1, "2024-06-01T12:59:00Z"), (2, "2024-06-01T14:30:00Z")])];
        // 14:30:00 equals the limit, strictly-exceeded is required
        assert!(fell_out_positions(&checkpoints, &runners).is_empty());
    }

    #[test]
    fn fell_out_at_first_exceeded_position() {
        let checkpoints = [
            cp(1, 1, Some("2024-06-01T13:00:00Z")),
            cp(2, 2, Some("2024-06-01T14:00:00Z")),
            cp(3, 3, Some("2024-06-01T14:30:00Z")),
            cp(4, 4, Some("2024-06-01T15:00:00Z")),
        ];
        // within limit at 1, no time at 2, over at 3; position 4 is way over
        // but must not be reported once the runner is out at 3
        let runners = [runner(7, &[
            (1, "2024-06-01T12:55:00Z"),
            (3, "2024-06-01T14:45:00Z"),
            (4, "2024-06-01T23:00:00Z"),
        ])];
        let fell_out = fell_out_positions(&checkpoints, &runners);
        assert_eq!(fell_out.get(&7), Some(&3));
    }

    #[test]
    fn null_limit_never_eliminates() {
        let checkpoints = [cp(1, 1, None)];
        let runners = [runner(1, &[(1, "2031-01-01T00:00:00Z")])];
        assert!(fell_out_positions(&checkpoints, &runners).is_empty());
    }

    #[test]
    fn missing_time_skips_checkpoint() {
        let checkpoints = [
            cp(1, 1, Some("2024-06-01T13:00:00Z")),
            cp(2, 2, Some("2024-06-01T14:00:00Z")),
        ];
        let runners = [runner(1, &[(2, "2024-06-01T13:30:00Z")])];
        assert!(fell_out_positions(&checkpoints, &runners).is_empty());
    }

    #[test]
    fn classifier_scans_by_position_not_list_order() {
        // checkpoint list arrives unsorted; first *position* wins
        let checkpoints = [
            cp(3, 3, Some("2024-06-01T14:30:00Z")),
            cp(1, 1, Some("2024-06-01T13:00:00Z")),
        ];
        let runners = [runner(1, &[
            (1, "2024-06-01T13:10:00Z"),
            (3, "2024-06-01T15:00:00Z"),
        ])];
        let fell_out = fell_out_positions(&checkpoints, &runners);
        assert_eq!(fell_out.get(&1), Some(&1));
    }

    #[test]
    fn glossary_example() {
        let checkpoints = [
            cp(1, 1, Some("2024-06-01T13:00:00Z")),
            cp(2, 2, None),
            cp(3, 3, Some("2024-06-01T14:30:00Z")),
        ];
        let runners = [runner(1, &[
            (1, "2024-06-01T12:55:00Z"),
            (2, "2024-06-01T14:00:00Z"),
            (3, "2024-06-01T14:45:00Z"),
        ])];
        let fell_out = fell_out_positions(&checkpoints, &runners);
        assert_eq!(fell_out.get(&1), Some(&3));
    }

    #[test]
    fn times_are_keyed_by_position_and_nulls_dropped() {
        // checkpoint id 7 sits at position 1
        let checkpoints = [cp(7, 1, None), cp(8, 2, None)];
        let runners = vec![RunnerRecord { runner_id: 1, name: "Knut".to_string() }];
        let passings = vec![vec![
            PassingRecord { checkpoint_id: 7, passing_time: Some(dt("2024-06-01T12:10:00Z")) },
            PassingRecord { checkpoint_id: 8, passing_time: None },
            PassingRecord { checkpoint_id: 99, passing_time: Some(dt("2024-06-01T12:20:00Z")) },
        ]];
        let views = build_runner_views(&checkpoints, runners, passings);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].times.len(), 1);
        assert_eq!(views[0].times.get(&1), Some(&dt("2024-06-01T12:10:00Z")));
    }

    #[test]
    fn zero_runners_is_not_a_failure() {
        let checkpoints = [cp(1, 1, None)];
        let views = build_runner_views(&checkpoints, vec![], vec![]);
        assert!(views.is_empty());
        let race = RaceView { checkpoints: checkpoints.to_vec(), runners: views };
        assert_eq!(race.checkpoints.len(), 1);
        assert!(fell_out_positions(&race.checkpoints, &race.runners).is_empty());
    }

    #[test]
    fn leaderboard_rows_flag_out_runners_and_last_checkpoint() {
        let checkpoints = [
            cp(1, 1, Some("2024-06-01T13:00:00Z")),
            cp(2, 2, Some("2024-06-01T14:00:00Z")),
        ];
        let runners = vec![
            runner(1, &[(1, "2024-06-01T12:10:00Z"), (2, "2024-06-01T14:05:00Z")]),
            runner(2, &[(1, "2024-06-01T12:30:00Z")]),
        ];
        let race = RaceView { checkpoints: checkpoints.to_vec(), runners };
        let fell_out = fell_out_positions(&race.checkpoints, &race.runners);
        let rows = leaderboard_rows(&race, &fell_out);
        assert!(!rows[0].in_race);
        assert_eq!(rows[0].fell_out_position, Some(2));
        assert!(rows[0].cells[1].over_limit);
        assert_eq!(rows[0].last_passed.as_deref(), Some("2: 14:05:00"));
        assert!(rows[1].in_race);
        assert_eq!(rows[1].cells[1].time, None);
        assert_eq!(rows[1].last_passed.as_deref(), Some("1: 12:30:00"));
    }
}
