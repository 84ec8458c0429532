//! Writing batch artifacts: results, the saved run configuration and the error log.

use crate::conversation::{ConversationRecord, Outcome};
use crate::error::SimulationError;
use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name of the records inside a save directory.
pub const RESULTS_FILE: &str = "results.json";

/// File name of the saved run configuration.
pub const CONFIG_FILE: &str = "config.json";

/// File name of the error log.
pub const ERROR_LOG_FILE: &str = "error_simulations.log";

const ERROR_EXCERPT_TURNS: usize = 3;
const ERROR_EXCERPT_CHARS: usize = 100;

/// Writes `value` as pretty JSON, creating parent directories.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SimulationError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Saves the conversation records as a JSON array.
pub fn save_results(path: impl AsRef<Path>, records: &[ConversationRecord]) -> Result<(), SimulationError> {
    let path = path.as_ref();
    write_json(path, records)?;
    info!(path = %path.display(), records = records.len(), "results saved");
    Ok(())
}

/// Saves the run configuration next to the results.
pub fn save_config<T: Serialize>(path: impl AsRef<Path>, config: &T) -> Result<(), SimulationError> {
    write_json(path.as_ref(), config)
}

/// Loads a JSON object mapping persona names to their reference recommendations.
pub fn load_ideal_recommendations(path: impl AsRef<Path>) -> Result<HashMap<String, Value>, SimulationError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| {
        SimulationError::Config(format!(
            "Cannot read ideal recommendations {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(serde_json::from_str(&text)?)
}

/// Attaches reference recommendations to every record whose persona name has an entry.
///
/// Returns how many records were enriched.
pub fn attach_ideal_recommendations(
    records: &mut [ConversationRecord],
    ideal: &HashMap<String, Value>,
) -> usize {
    let mut enriched = 0;
    for record in records.iter_mut() {
        let name = record.shopper_persona.name.as_str();
        if name.is_empty() {
            continue;
        }
        if let Some(recommendations) = ideal.get(name) {
            record.ideal_recommendations = Some(recommendations.clone());
            enriched += 1;
        }
    }
    enriched
}

/// Renders the log of every record that ended in an error.
pub fn render_error_log(records: &[ConversationRecord]) -> Option<String> {
    let errors: Vec<&ConversationRecord> =
        records.iter().filter(|r| r.outcome == Outcome::Error).collect();
    if errors.is_empty() {
        return None;
    }

    let stamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let prefix = format!("{stamp} - ERROR -");
    let mut log = String::new();

    let _ = writeln!(log, "{prefix} Total simulations with error outcome: {}", errors.len());
    for (i, record) in errors.iter().enumerate() {
        let _ = writeln!(log, "{prefix} Error simulation {}:", i + 1);
        let _ = writeln!(log, "{prefix}   Conversation ID: {}", record.conversation_id);
        let _ = writeln!(log, "{prefix}   Total turns: {}", record.total_turns);
        let _ = writeln!(log, "{prefix}   Timestamp: {}", record.timestamp.to_rfc3339());
        let _ = writeln!(log, "{prefix}   Shopper persona: {}", record.shopper_persona.name);
        let _ = writeln!(
            log,
            "{prefix}   Error message: {}",
            record.error_message.as_deref().unwrap_or("N/A")
        );

        if !record.conversation.is_empty() {
            let _ = writeln!(log, "{prefix}   Last conversation entries:");
            let start = record.conversation.len().saturating_sub(ERROR_EXCERPT_TURNS);
            for turn in &record.conversation[start..] {
                let excerpt: String = turn.text.chars().take(ERROR_EXCERPT_CHARS).collect();
                let _ = writeln!(
                    log,
                    "{prefix}     Turn {}: {}: {}...",
                    turn.turn, turn.speaker, excerpt
                );
            }
        }
    }
    Some(log)
}

/// Writes the error log into `dir` when any record ended in an error.
///
/// Returns the path written, if any.
pub fn write_error_log(
    dir: impl AsRef<Path>,
    records: &[ConversationRecord],
) -> Result<Option<PathBuf>, SimulationError> {
    let Some(log) = render_error_log(records) else {
        return Ok(None);
    };
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let path = dir.join(ERROR_LOG_FILE);
    fs::write(&path, log)?;
    info!(path = %path.display(), "error simulations written");
    Ok(Some(path))
}
