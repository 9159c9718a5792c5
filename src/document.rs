//! Scripts and batches as read from disk.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json as json;

use crate::act::Act;
use crate::schema::is_absolute_url;

/// Replaced in `url` acts by the directory scripts resolve local files
/// against.
pub const DIRNAME_PLACEHOLDER: &str = "__dirname";

#[derive(Clone, Debug, Deserialize)]
pub struct Script {
    #[serde(skip)]
    pub name: String,
    pub what: String,
    pub commands: Vec<Act>,
}

impl Script {
    pub async fn from_path(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading script {}", path.display()))?;
        Script::parse(&document_name(path)?, &contents)
    }

    pub fn parse(name: &str, contents: &str) -> Result<Self> {
        let mut script: Script = json::from_str(contents)
            .map_err(|error| anyhow!("script {} invalid: {}", name, error))?;
        script.name = name.to_string();
        script.validate()?;
        Ok(script)
    }

    /// A runnable script starts by launching a browser and visiting an
    /// absolute URL.
    pub fn validate(&self) -> Result<()> {
        let opens = match self.commands.as_slice() {
            [launch, url, ..] => {
                launch.kind() == Some("launch")
                    && url.kind() == Some("url")
                    && url.which().is_some_and(is_absolute_url)
            }
            _ => false,
        };
        if self.what.is_empty() || !opens {
            bail!("script {} invalid", self.name);
        }
        Ok(())
    }

    /// A copy of the commands in which every `url` act visits `host`.
    pub fn commands_for(&self, host: &Host) -> Vec<Act> {
        self.commands
            .iter()
            .cloned()
            .map(|mut act| {
                if act.kind() == Some("url") {
                    act.set("which", json::Value::String(host.which.clone()));
                    act.set("what", json::Value::String(host.what.clone()));
                }
                act
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub which: String,
    pub what: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Batch {
    #[serde(skip)]
    pub name: String,
    pub what: String,
    pub hosts: Vec<Host>,
}

impl Batch {
    pub async fn from_path(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading batch {}", path.display()))?;
        Batch::parse(&document_name(path)?, &contents)
    }

    pub fn parse(name: &str, contents: &str) -> Result<Self> {
        let mut batch: Batch = json::from_str(contents)
            .map_err(|error| anyhow!("batch {} invalid: {}", name, error))?;
        batch.name = name.to_string();
        batch.validate()?;
        Ok(batch)
    }

    pub fn validate(&self) -> Result<()> {
        let hosts_valid = self
            .hosts
            .iter()
            .all(|host| !host.what.is_empty() && is_absolute_url(&host.which));
        if self.what.is_empty() || !hosts_valid {
            bail!("batch {} invalid", self.name);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Described {
    what: String,
}

/// Name and description of every `*.json` document in `directory`, sorted
/// by name.
pub async fn list_documents(directory: &Path) -> Result<Vec<(String, String)>> {
    let mut entries = tokio::fs::read_dir(directory)
        .await
        .with_context(|| format!("listing {}", directory.display()))?;
    let mut listing = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let contents = tokio::fs::read_to_string(&path).await?;
        match json::from_str::<Described>(&contents) {
            Ok(described) => {
                listing.push((document_name(&path)?, described.what))
            }
            Err(error) => {
                log::warn!("skipping {}: {}", path.display(), error)
            }
        }
    }
    listing.sort();
    Ok(listing)
}

fn document_name(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("no document name in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    const SCRIPT: &str = indoc! {r#"
        {
          "what": "Check the home page",
          "commands": [
            {"type": "launch", "which": "chromium"},
            {"type": "url", "which": "https://example.com", "what": "Example"},
            {"type": "test", "which": "bulk"},
            {"type": "url", "which": "https://example.com/about"}
          ]
        }
    "#};

    #[test]
    fn test_parse_valid_script() {
        let script = Script::parse("home", SCRIPT).unwrap();
        assert_eq!(script.name, "home");
        assert_eq!(script.commands.len(), 4);
    }

    #[test]
    fn test_script_must_launch_then_visit() {
        let reversed = indoc! {r#"
            {"what": "x", "commands": [
              {"type": "url", "which": "https://example.com"},
              {"type": "launch", "which": "chromium"}
            ]}
        "#};
        let error = Script::parse("reversed", reversed).unwrap_err();
        assert_eq!(error.to_string(), "script reversed invalid");

        let relative = indoc! {r#"
            {"what": "x", "commands": [
              {"type": "launch", "which": "chromium"},
              {"type": "url", "which": "example.com"}
            ]}
        "#};
        assert!(Script::parse("relative", relative).is_err());

        let short = r#"{"what": "x", "commands": [{"type": "launch"}]}"#;
        assert!(Script::parse("short", short).is_err());

        let untitled = r#"{"what": "", "commands": []}"#;
        assert!(Script::parse("untitled", untitled).is_err());
    }

    #[test]
    fn test_commands_for_host_replaces_every_url() {
        let script = Script::parse("home", SCRIPT).unwrap();
        let host = Host {
            which: "https://other.org".to_string(),
            what: "Other".to_string(),
        };
        let commands = script.commands_for(&host);
        let urls: Vec<_> = commands
            .iter()
            .filter(|act| act.kind() == Some("url"))
            .map(|act| (act.which(), act.what()))
            .collect();
        assert_eq!(
            urls,
            vec![
                (Some("https://other.org"), Some("Other")),
                (Some("https://other.org"), Some("Other")),
            ]
        );
        assert_eq!(
            script.commands[1].which(),
            Some("https://example.com"),
            "the script itself is unchanged"
        );
    }

    #[test]
    fn test_batch_hosts_must_be_absolute() {
        let valid = indoc! {r#"
            {"what": "Agencies", "hosts": [
              {"which": "https://a.gov", "what": "A"},
              {"which": "http://b.gov", "what": "B"}
            ]}
        "#};
        assert_eq!(Batch::parse("agencies", valid).unwrap().hosts.len(), 2);

        let invalid = indoc! {r#"
            {"what": "Agencies", "hosts": [{"which": "c.gov", "what": "C"}]}
        "#};
        let error = Batch::parse("agencies", invalid).unwrap_err();
        assert_eq!(error.to_string(), "batch agencies invalid");
    }

    #[tokio::test]
    async fn test_list_documents_sorted_by_name() {
        let directory = tempfile::tempdir().unwrap();
        tokio::fs::write(directory.path().join("b.json"), r#"{"what": "Bee"}"#)
            .await
            .unwrap();
        tokio::fs::write(directory.path().join("a.json"), r#"{"what": "Ay"}"#)
            .await
            .unwrap();
        tokio::fs::write(directory.path().join("notes.txt"), "ignored")
            .await
            .unwrap();
        let listing = list_documents(directory.path()).await.unwrap();
        assert_eq!(
            listing,
            vec![
                ("a".to_string(), "Ay".to_string()),
                ("b".to_string(), "Bee".to_string()),
            ]
        );
    }
}
