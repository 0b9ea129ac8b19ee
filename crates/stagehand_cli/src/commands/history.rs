use stagehand_core::prelude::*;
use stagehand_fs::JsonHistoryStore;

use clap::Args;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// The history file written by the server.
    #[arg(long, env = "STAGEHAND_HISTORY_FILE", default_value = "environments.json")]
    pub file: PathBuf,

    /// Print the records as JSON instead of one line each.
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: HistoryArgs) -> anyhow::Result<()> {
    let records = JsonHistoryStore::new(&args.file).list().await?;
    println!("{}", render(&records, args.json)?);
    Ok(())
}

pub fn render(records: &[HistoryRecord], json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(records)?);
    }
    if records.is_empty() {
        return Ok("No environments recorded.".to_string());
    }

    let lines: Vec<String> = records
        .iter()
        .map(|r| {
            format!(
                "{}  {:<24} {:<6} {}",
                r.created_at.format("%Y-%m-%d %H:%M:%S"),
                r.identity,
                r.version,
                r.url
            )
        })
        .collect();
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(identity: &str, port: u16, age_days: i64) -> HistoryRecord {
        HistoryRecord {
            identity: identity.into(),
            port,
            version: "19.0".into(),
            url: format!("http://localhost:{port}"),
            created_at: Utc::now() - Duration::days(age_days),
            extra: Default::default(),
        }
    }

    #[test]
    fn empty_history_has_a_message() {
        assert_eq!(render(&[], false).unwrap(), "No environments recorded.");
        assert_eq!(render(&[], true).unwrap(), "[]");
    }

    #[tokio::test]
    async fn lines_follow_the_store_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonHistoryStore::new(dir.path().join("history.json"));
        store.record(record("odoo-old-db", 49153, 2)).await.unwrap();
        store.record(record("odoo-new-db", 49154, 0)).await.unwrap();

        let out = render(&store.list().await.unwrap(), false).unwrap();
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("odoo-new-db"));
        assert!(lines[0].ends_with("http://localhost:49154"));
        assert!(lines[1].contains("odoo-old-db"));
    }
}
