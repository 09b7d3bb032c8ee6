use anyhow::{Context, anyhow};
use rocket::serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use crate::rtdatetime::RtDateTime;

pub type RaceId = i64;
pub type RunnerId = i64;
pub type CheckpointId = i64;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RaceRecord {
    #[serde(rename = "raceid")]
    pub race_id: RaceId,
    pub name: String,
    #[serde(rename = "starttime")]
    pub start_time: RtDateTime,
}
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CheckpointRecord {
    #[serde(rename = "checkpointid")]
    pub checkpoint_id: CheckpointId,
    #[serde(rename = "deviceid")]
    pub device_id: i64,
    pub location: String,
}
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CheckpointInRaceRecord {
    #[serde(rename = "checkpointid")]
    pub checkpoint_id: CheckpointId,
    pub position: i64,
    #[serde(rename = "timelimit")]
    pub time_limit: Option<RtDateTime>,
}
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RunnerRecord {
    #[serde(rename = "runnerid")]
    pub runner_id: RunnerId,
    pub name: String,
}
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PassingRecord {
    #[serde(rename = "checkpointid")]
    pub checkpoint_id: CheckpointId,
    #[serde(rename = "passingtime")]
    pub passing_time: Option<RtDateTime>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PostedRace {
    pub name: String,
    pub start_time: RtDateTime,
}
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PostedCheckpoint {
    #[serde(rename = "DeviceID")]
    pub device_id: i64,
    #[serde(rename = "Location")]
    pub location: String,
}
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PostedRunner {
    pub name: String,
}
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PostedTag {
    #[serde(rename = "RunnerID")]
    pub runner_id: RunnerId,
    #[serde(rename = "RaceID")]
    pub race_id: RaceId,
    #[serde(rename = "TagID")]
    pub tag_id: String,
}
#[derive(Serialize, Deserialize, Clone, Debug)]
struct PostedTimeLimit<'a> {
    time_limit: Option<&'a str>,
}

/// Extract the `detail` field FastAPI-style error bodies carry.
pub(crate) fn error_detail(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        detail: String,
    }
    serde_json::from_str::<ErrorBody>(body).ok().map(|e| e.detail)
}

/// Thin client for the remote race-tracking API. One instance is managed by
/// rocket and shared by all routes; it holds no state besides the connection
/// pool inside `reqwest::Client`.
pub struct RaceApiClient {
    client: reqwest::Client,
    api_url: String,
}

impl RaceApiClient {
    pub fn new(api_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let url = format!("{}{}", self.api_url, path);
        let response = self.client.get(&url).send().await
            .with_context(|| format!("GET {url} failed"))?;
        let response = Self::check_status(response).await?;
        response.json::<T>().await
            .with_context(|| format!("GET {url}: cannot decode response body"))
    }

    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> anyhow::Result<()> {
        let url = format!("{}{}", self.api_url, path);
        let response = self.client.post(&url).json(body).send().await
            .with_context(|| format!("POST {url} failed"))?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn check_status(response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.ok()
            .and_then(|body| error_detail(&body))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        Err(anyhow!("Error {}: {detail}", status.as_u16()))
    }

    pub async fn races(&self) -> anyhow::Result<Vec<RaceRecord>> {
        self.get_json("/races").await
    }
    pub async fn runners(&self) -> anyhow::Result<Vec<RunnerRecord>> {
        self.get_json("/runners").await
    }
    pub async fn runners_in_race(&self, race_id: RaceId) -> anyhow::Result<Vec<RunnerRecord>> {
        self.get_json(&format!("/runners/{race_id}")).await
    }
    pub async fn checkpoints(&self) -> anyhow::Result<Vec<CheckpointRecord>> {
        self.get_json("/checkpoints").await
    }
    pub async fn checkpoints_in_race(&self, race_id: RaceId) -> anyhow::Result<Vec<CheckpointInRaceRecord>> {
        self.get_json(&format!("/checkpointinrace/{race_id}")).await
    }
    pub async fn checkpoint_passings(&self, runner_id: RunnerId) -> anyhow::Result<Vec<PassingRecord>> {
        self.get_json(&format!("/checkpointpassings/{runner_id}")).await
    }
    pub async fn create_race(&self, race: &PostedRace) -> anyhow::Result<()> {
        self.post_json("/race", race).await
    }
    pub async fn create_checkpoint(&self, checkpoint: &PostedCheckpoint) -> anyhow::Result<()> {
        self.post_json("/checkpoint", checkpoint).await
    }
    pub async fn add_checkpoint_to_race(&self, race_id: RaceId, checkpoint_id: CheckpointId, position: i64, time_limit: Option<&str>) -> anyhow::Result<()> {
        let path = format!("/race/{race_id}/checkpoint/{checkpoint_id}/{position}");
        self.post_json(&path, &PostedTimeLimit { time_limit }).await
    }
    pub async fn create_runner(&self, runner: &PostedRunner) -> anyhow::Result<()> {
        self.post_json("/runner", runner).await
    }
    pub async fn register_tag(&self, tag: &PostedTag) -> anyhow::Result<()> {
        self.post_json("/register_tag", tag).await
    }
}

#[test]
fn test_error_detail() {
    assert_eq!(error_detail(r#"{"detail": "Runner not found"}"#), Some("Runner not found".to_string()));
    assert_eq!(error_detail("<html>502 Bad Gateway</html>"), None);
    assert_eq!(error_detail(r#"{"message": "nope"}"#), None);
}

#[test]
fn test_wire_field_names() {
    let passing: PassingRecord = serde_json::from_str(
        r#"{"checkpointid": 3, "passingtime": null}"#).unwrap();
    assert_eq!(passing.checkpoint_id, 3);
    assert!(passing.passing_time.is_none());
    let tag = PostedTag { runner_id: 1, race_id: 2, tag_id: "04a2b9".to_string() };
    let json = serde_json::to_value(&tag).unwrap();
    assert_eq!(json["RunnerID"], 1);
    assert_eq!(json["TagID"], "04a2b9");
}
