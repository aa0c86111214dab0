//! Result channel collection
//!
//! A script may write one JSON value to the path it receives in its
//! environment. After the process is gone the file is read once, parsed and
//! deleted.

use serde_json::Value;
use std::io;
use std::path::Path;
use tokio::fs;

use super::workspace::remove_quietly;

/// What the script left at the result-channel path
#[derive(Debug, Clone, PartialEq)]
pub enum ResultArtifact {
    /// Valid JSON
    Value(Value),
    /// No file, or an empty one
    Absent,
    /// Present but unreadable or not JSON
    Malformed(String),
}

impl ResultArtifact {
    /// The parsed value, if any. `Absent` and `Malformed` both become `None`.
    pub fn into_value(self) -> Option<Value> {
        match self {
            ResultArtifact::Value(value) => Some(value),
            ResultArtifact::Absent | ResultArtifact::Malformed(_) => None,
        }
    }
}

/// Read, parse and delete the result artifact. Never fails.
pub async fn collect(path: &Path) -> ResultArtifact {
    let artifact = match fs::read(path).await {
        Ok(content) => parse_artifact(&content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return ResultArtifact::Absent,
        Err(e) => ResultArtifact::Malformed(format!("unreadable: {}", e)),
    };

    remove_quietly(path).await;
    artifact
}

fn parse_artifact(content: &[u8]) -> ResultArtifact {
    if content.is_empty() {
        return ResultArtifact::Absent;
    }

    match serde_json::from_slice(content) {
        Ok(value) => ResultArtifact::Value(value),
        Err(e) => ResultArtifact::Malformed(e.to_string()),
    }
}
