//! Archive client reading a local or mounted report tree.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::model::PreservationStatus;

use super::types::{ArchiveClient, ArchiveError, ProcessedSip};

const REPORT_SUFFIX: &str = "-ingest-report.xml";

/// Reads `{root}/{accepted|rejected}/{YYYY-MM-DD}/{sip_filename}/*-ingest-report.xml`.
pub struct DirectoryArchiveClient {
    root: PathBuf,
}

impl DirectoryArchiveClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn list_dir(path: &Path) -> Result<Vec<String>, ArchiveError> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl ArchiveClient for DirectoryArchiveClient {
    fn name(&self) -> &str {
        "directory"
    }

    async fn processed_sips(
        &self,
        status: PreservationStatus,
        days: u32,
        now: DateTime<Utc>,
        skip: &HashSet<String>,
    ) -> Result<Vec<ProcessedSip>, ArchiveError> {
        let status_dir = self.root.join(status.as_str());
        let date_dirs: HashSet<String> = Self::list_dir(&status_dir).await?.into_iter().collect();
        let mut results = Vec::new();

        for day in 0..days {
            let date_dir = (now - Duration::days(day as i64))
                .format("%Y-%m-%d")
                .to_string();
            if !date_dirs.contains(&date_dir) {
                continue;
            }

            let mut found = 0;
            for sip_filename in Self::list_dir(&status_dir.join(&date_dir)).await? {
                if skip.contains(&sip_filename) {
                    continue;
                }

                let sip_dir = status_dir.join(&date_dir).join(&sip_filename);
                for name in Self::list_dir(&sip_dir).await? {
                    if !name.ends_with(REPORT_SUFFIX) {
                        continue;
                    }
                    let report_path = sip_dir.join(&name);
                    let modified = tokio::fs::metadata(&report_path).await?.modified()?;
                    results.push(ProcessedSip {
                        sip_filename: sip_filename.clone(),
                        status,
                        report_time: DateTime::<Utc>::from(modified),
                        report_path,
                    });
                    found += 1;
                }
            }
            debug!(status = status.as_str(), date = %date_dir, found, "Scanned archive day");
        }

        info!(status = status.as_str(), count = results.len(), "Found processed SIPs");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn write_report(root: &Path, status: &str, date: &str, sip: &str, transfer: &str) {
        let dir = root.join(status).join(date).join(sip);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{}{}", transfer, REPORT_SUFFIX)), "<report/>").unwrap();
        std::fs::write(dir.join(format!("{}-ingest-report.html", transfer)), "<html/>").unwrap();
    }

    #[tokio::test]
    async fn test_scans_requested_days_only() {
        let temp = TempDir::new().unwrap();
        write_report(temp.path(), "accepted", "2019-02-03", "1-a.tar", "t1");
        write_report(temp.path(), "accepted", "2019-02-02", "2-b.tar", "t2");
        write_report(temp.path(), "accepted", "2019-01-01", "3-c.tar", "t3");

        let client = DirectoryArchiveClient::new(temp.path());
        let now = Utc.with_ymd_and_hms(2019, 2, 3, 12, 0, 0).unwrap();
        let mut sips = client
            .processed_sips(PreservationStatus::Accepted, 2, now, &HashSet::new())
            .await
            .unwrap();
        sips.sort_by(|a, b| a.sip_filename.cmp(&b.sip_filename));

        let names: Vec<_> = sips.iter().map(|s| s.sip_filename.as_str()).collect();
        assert_eq!(names, vec!["1-a.tar", "2-b.tar"]);
        assert!(sips.iter().all(|s| s.status == PreservationStatus::Accepted));
    }

    #[tokio::test]
    async fn test_skips_confirmed_and_missing_status_dir() {
        let temp = TempDir::new().unwrap();
        write_report(temp.path(), "rejected", "2019-02-03", "1-a.tar", "t1");
        write_report(temp.path(), "rejected", "2019-02-03", "2-b.tar", "t2");

        let client = DirectoryArchiveClient::new(temp.path());
        let now = Utc.with_ymd_and_hms(2019, 2, 3, 12, 0, 0).unwrap();
        let skip = HashSet::from(["1-a.tar".to_string()]);

        let rejected = client
            .processed_sips(PreservationStatus::Rejected, 31, now, &skip)
            .await
            .unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].sip_filename, "2-b.tar");

        let accepted = client
            .processed_sips(PreservationStatus::Accepted, 31, now, &skip)
            .await
            .unwrap();
        assert!(accepted.is_empty());
    }
}
