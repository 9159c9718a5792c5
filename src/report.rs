use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json as json;

use crate::act::Act;

/// The `batch` of a report for a plain script run.
pub const NO_BATCH: &str = "None";

/// 2021-05-01T00:00:00Z
const STAMP_EPOCH_SECONDS: u64 = 1_619_827_200;
const STAMP_INTERVAL_SECONDS: u64 = 10;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub script: String,
    pub batch: String,
    pub what: String,
    pub time_stamp: String,
    pub acts: Vec<Act>,
    /// Seconds per test run, longest first.
    pub test_times: Vec<(String, u64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exhibits: Option<String>,
}

impl Report {
    pub fn new(
        script: &str,
        batch: &str,
        what: &str,
        time_stamp: &str,
        acts: Vec<Act>,
    ) -> Self {
        Report {
            script: script.to_string(),
            batch: batch.to_string(),
            what: what.to_string(),
            time_stamp: time_stamp.to_string(),
            acts,
            test_times: Vec::new(),
            exhibits: None,
        }
    }

    /// Inserts after every entry taking at least as long.
    pub fn record_test_time(&mut self, test: &str, seconds: u64) {
        let position = self
            .test_times
            .iter()
            .position(|(_, existing)| *existing < seconds)
            .unwrap_or(self.test_times.len());
        self.test_times.insert(position, (test.to_string(), seconds));
    }

    pub fn append_exhibits(&mut self, exhibits: &str) {
        match &mut self.exhibits {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(exhibits);
            }
            None => self.exhibits = Some(exhibits.to_string()),
        }
    }
}

/// Base-36 count of whole 10-second intervals since May 2021.
pub fn time_stamp(now: SystemTime) -> String {
    let seconds = now
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    let mut intervals =
        seconds.saturating_sub(STAMP_EPOCH_SECONDS) / STAMP_INTERVAL_SECONDS;
    let mut digits = Vec::new();
    loop {
        let digit = (intervals % 36) as u32;
        digits.push(char::from_digit(digit, 36).unwrap_or('0'));
        intervals /= 36;
        if intervals == 0 {
            break;
        }
    }
    digits.iter().rev().collect()
}

/// Persists the report after each act, so a crashed run leaves a report
/// of everything done before the crash.
#[async_trait]
pub trait Checkpoint: Send {
    async fn save(&mut self, report: &Report) -> Result<()>;
}

pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    /// `host_index` distinguishes the reports of a batch run.
    pub async fn initialize(
        directory: &Path,
        time_stamp: &str,
        host_index: Option<usize>,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(directory).await?;
        let file_name = match host_index {
            Some(index) => format!("report-{}-{:03}.json", time_stamp, index),
            None => format!("report-{}.json", time_stamp),
        };
        let path = directory.join(file_name);
        log::info!("storing report in {}", path.display());
        Ok(ReportWriter { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Checkpoint for ReportWriter {
    async fn save(&mut self, report: &Report) -> Result<()> {
        let contents = json::to_string_pretty(report)?;
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, contents).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_time_stamp_counts_ten_second_intervals() {
        let epoch = UNIX_EPOCH + Duration::from_secs(STAMP_EPOCH_SECONDS);
        assert_eq!(time_stamp(epoch), "0");
        assert_eq!(time_stamp(epoch + Duration::from_secs(359)), "z");
        assert_eq!(time_stamp(epoch + Duration::from_secs(360)), "10");
        assert_eq!(time_stamp(UNIX_EPOCH), "0");
    }

    #[test]
    fn test_test_times_stay_descending_and_stable() {
        let mut report = Report::default();
        report.record_test_time("bulk", 2);
        report.record_test_time("simple", 0);
        report.record_test_time("focAll", 7);
        report.record_test_time("roleList", 2);
        assert_eq!(
            report.test_times,
            vec![
                ("focAll".to_string(), 7),
                ("bulk".to_string(), 2),
                ("roleList".to_string(), 2),
                ("simple".to_string(), 0),
            ]
        );
    }

    #[test]
    fn test_report_json_shape() {
        let acts = json::from_value(json!([
            {"type": "launch", "which": "chromium", "result": "Chrome launched"}
        ]))
        .unwrap();
        let mut report = Report::new("home", NO_BATCH, "Home page", "k3", acts);
        report.record_test_time("bulk", 2);
        insta::assert_snapshot!(
            json::to_string(&report).unwrap(),
            @r#"{"script":"home","batch":"None","what":"Home page","timeStamp":"k3","acts":[{"result":"Chrome launched","type":"launch","which":"chromium"}],"testTimes":[["bulk",2]]}"#
        );
    }

    #[tokio::test]
    async fn test_writer_replaces_report_atomically() {
        let directory = tempfile::tempdir().unwrap();
        let mut writer =
            ReportWriter::initialize(directory.path(), "k3", Some(7))
                .await
                .unwrap();
        assert!(writer.path().ends_with("report-k3-007.json"));

        let mut report =
            Report::new("home", NO_BATCH, "Home page", "k3", vec![]);
        writer.save(&report).await.unwrap();
        report.append_exhibits("<p>one</p>");
        writer.save(&report).await.unwrap();

        let saved: Report = json::from_str(
            &tokio::fs::read_to_string(writer.path()).await.unwrap(),
        )
        .unwrap();
        assert_eq!(saved, report);
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(directory.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["report-k3-007.json".to_string()]);
    }
}
