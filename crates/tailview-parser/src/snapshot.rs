use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tailview_types::{AgentNode, EventPayload, SessionData, SessionEvent};
use walkdir::WalkDir;

use crate::error::{Error, Result, SnapshotParseError};
use crate::events::parse_events;
use crate::schema::LogEntry;
use crate::state::{ParseState, build_agent_node};

/// Where a session keeps its sub-agent transcripts:
/// `<dir>/<session-id>/subagents` next to `<dir>/<session-id>.jsonl`
pub fn session_agent_dir(session_file: &Path) -> PathBuf {
    let stem = session_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    session_file
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(stem)
        .join("subagents")
}

/// Extract the agent id from an `agent-<id>.jsonl` filename
pub fn agent_id_from_filename(name: &str) -> Option<&str> {
    let id = name.strip_prefix("agent-")?.strip_suffix(".jsonl")?;
    if id.is_empty() { None } else { Some(id) }
}

/// Result of a one-shot session load: the assembled state plus the byte
/// sizes and non-blank line counts observed per file, which the live tailer
/// uses as starting offsets and line numbering bases.
#[derive(Debug)]
pub struct SessionSnapshot {
    pub data: SessionData,
    pub file_sizes: HashMap<PathBuf, u64>,
    pub line_counts: HashMap<PathBuf, usize>,
}

/// Load a full session from disk.
///
/// Strict, unlike the live tail path: any malformed line aborts the load
/// with a `SnapshotParseError`. The resulting `all_events` is globally
/// sorted by timestamp, stable on ties. A missing agent directory simply
/// means the session has spawned no sub-agents yet.
pub fn parse_session(session_file: &Path, agent_dir: &Path) -> Result<SessionSnapshot> {
    let session_id = session_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a session file path: {}", session_file.display()),
            ))
        })?;

    let mut file_sizes = HashMap::new();
    let mut line_counts = HashMap::new();

    let (main_entries, main_size, main_lines) = parse_file_strict(session_file)?;
    file_sizes.insert(session_file.to_path_buf(), main_size);
    line_counts.insert(session_file.to_path_buf(), main_lines);

    // Sub-agents referenced by the main log, in first-mention order, then
    // on-disk stragglers the log has not mentioned yet, by filename
    let mut agent_ids: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for entry in &main_entries {
        if let Some(id) = entry.tool_result_agent_id()
            && seen.insert(id.to_string())
        {
            agent_ids.push(id.to_string());
        }
    }
    for id in scan_agent_dir(agent_dir) {
        if seen.insert(id.clone()) {
            agent_ids.push(id);
        }
    }

    let mut state = ParseState::new(session_id.clone());
    let mut main_agent = AgentNode::main(session_id.clone(), session_file.to_path_buf());
    let (main_events, _) =
        crate::state::process_main_entries(main_entries, &mut state);

    for agent_id in &agent_ids {
        let log_path = agent_dir.join(format!("agent-{agent_id}.jsonl"));
        let mut node = build_agent_node(agent_id, &state, log_path.clone());
        state.known_agent_ids.insert(agent_id.clone());

        if log_path.is_file() {
            let (entries, size, lines) = parse_file_strict(&log_path)?;
            node.events = parse_events(&entries, &session_id, Some(agent_id.as_str()));
            file_sizes.insert(log_path.clone(), size);
            line_counts.insert(log_path, lines);
        }

        main_agent.children.push(node);
    }

    // Cold-load attribution: a main-log tool-result naming a known sub-agent
    // belongs to that sub-agent
    for mut event in main_events {
        let target = match &event.payload {
            EventPayload::ToolResult(payload) => payload
                .agent_id
                .as_ref()
                .and_then(|id| main_agent.children.iter().position(|c| &c.id == id)),
            _ => None,
        };
        match target {
            Some(idx) => {
                event.agent_id = main_agent.children[idx].id.clone();
                main_agent.children[idx].events.push(event);
            }
            None => main_agent.events.push(event),
        }
    }

    let mut all_events: Vec<SessionEvent> = main_agent.events.clone();
    for child in &main_agent.children {
        all_events.extend(child.events.iter().cloned());
    }
    all_events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    Ok(SessionSnapshot {
        data: SessionData {
            session_id,
            main_agent,
            all_events,
            log_directory: session_file
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .to_path_buf(),
        },
        file_sizes,
        line_counts,
    })
}

fn scan_agent_dir(agent_dir: &Path) -> Vec<String> {
    if !agent_dir.is_dir() {
        return Vec::new();
    }

    let mut ids: Vec<(String, String)> = WalkDir::new(agent_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            agent_id_from_filename(&name).map(|id| (name.clone(), id.to_string()))
        })
        .collect();

    ids.sort_by(|a, b| a.0.cmp(&b.0));
    ids.into_iter().map(|(_, id)| id).collect()
}

/// Parse a whole file, failing on the first bad line.
///
/// Returns the records plus the byte size and non-blank line count at read
/// time.
fn parse_file_strict(path: &Path) -> Result<(Vec<LogEntry>, u64, usize)> {
    let bytes = fs::read(path)?;
    let size = bytes.len() as u64;
    let text = String::from_utf8_lossy(&bytes);

    let mut entries = Vec::new();
    let mut non_blank = 0usize;

    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        non_blank += 1;

        let entry: LogEntry = serde_json::from_str(trimmed).map_err(|err| {
            Error::Snapshot(SnapshotParseError {
                file_path: path.to_path_buf(),
                line_number: idx + 1,
                raw_line: line.to_string(),
                validation_details: Some(err.to_string()),
            })
        })?;
        entry.validate().map_err(|violation| {
            Error::Snapshot(SnapshotParseError {
                file_path: path.to_path_buf(),
                line_number: idx + 1,
                raw_line: line.to_string(),
                validation_details: Some(violation),
            })
        })?;
        entries.push(entry);
    }

    Ok((entries, size, non_blank))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_lines(path: &Path, lines: &[&str]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = fs::File::create(path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
    }

    fn spawn_lines(agent_id: &str, tool_use_id: &str) -> Vec<String> {
        vec![
            format!(
                r#"{{"type":"assistant","uuid":"a-{agent_id}","sessionId":"sess","timestamp":"2024-01-01T00:00:01Z","message":{{"role":"assistant","content":[{{"type":"tool_use","id":"{tool_use_id}","name":"Task","input":{{"description":"probe {agent_id}"}}}}]}}}}"#
            ),
            format!(
                r#"{{"type":"user","uuid":"u-{agent_id}","sessionId":"sess","timestamp":"2024-01-01T00:00:05Z","toolUseResult":{{"agentId":"{agent_id}"}},"message":{{"role":"user","content":[{{"type":"tool_result","tool_use_id":"{tool_use_id}","content":"ok"}}]}}}}"#
            ),
        ]
    }

    #[test]
    fn test_agent_dir_layout() {
        let dir = session_agent_dir(Path::new("/projects/p1/sess.jsonl"));
        assert_eq!(dir, PathBuf::from("/projects/p1/sess/subagents"));
    }

    #[test]
    fn test_agent_id_from_filename() {
        assert_eq!(agent_id_from_filename("agent-abc123.jsonl"), Some("abc123"));
        assert_eq!(agent_id_from_filename("agent-.jsonl"), None);
        assert_eq!(agent_id_from_filename("sess.jsonl"), None);
        assert_eq!(agent_id_from_filename("agent-abc123.txt"), None);
    }

    #[test]
    fn test_parse_session_no_agents() {
        let tmp = TempDir::new().unwrap();
        let session_file = tmp.path().join("sess.jsonl");
        write_lines(
            &session_file,
            &[
                r#"{"type":"user","uuid":"u1","sessionId":"sess","timestamp":"2024-01-01T00:00:00Z","message":{"role":"user","content":"hi"}}"#,
                r#"{"type":"assistant","uuid":"a1","sessionId":"sess","timestamp":"2024-01-01T00:00:01Z","message":{"role":"assistant","content":[{"type":"text","text":"hello"}]}}"#,
            ],
        );

        let snapshot = parse_session(&session_file, &session_agent_dir(&session_file)).unwrap();
        assert_eq!(snapshot.data.session_id, "sess");
        assert_eq!(snapshot.data.main_agent.id, "sess");
        assert!(snapshot.data.main_agent.children.is_empty());
        assert_eq!(snapshot.data.all_events.len(), 2);
        assert_eq!(snapshot.line_counts[&session_file], 2);
        assert!(snapshot.file_sizes[&session_file] > 0);
    }

    #[test]
    fn test_parse_session_with_sub_agent() {
        let tmp = TempDir::new().unwrap();
        let session_file = tmp.path().join("sess.jsonl");
        let agent_dir = session_agent_dir(&session_file);
        write_lines(
            &session_file,
            &spawn_lines("alpha", "toolu_a")
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>(),
        );
        write_lines(
            &agent_dir.join("agent-alpha.jsonl"),
            &[
                r#"{"type":"assistant","uuid":"sa1","sessionId":"sess","timestamp":"2024-01-01T00:00:03Z","message":{"role":"assistant","content":[{"type":"text","text":"probing"}]}}"#,
            ],
        );

        let snapshot = parse_session(&session_file, &agent_dir).unwrap();
        let children = &snapshot.data.main_agent.children;
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, "alpha");
        assert_eq!(children[0].name, "probe alpha");
        assert_eq!(children[0].parent.as_deref(), Some("sess"));

        // The Task observation is attributed to the sub-agent on cold load
        assert!(
            children[0]
                .events
                .iter()
                .any(|e| matches!(&e.payload, EventPayload::ToolResult(p) if p.tool_use_id == "toolu_a"))
        );
        assert!(children[0].events.iter().all(|e| e.agent_id == "alpha"));

        // Global order: spawn tool_use, sub-agent text, task result
        let timestamps: Vec<_> = snapshot.data.all_events.iter().map(|e| e.timestamp).collect();
        let mut sorted = timestamps.clone();
        sorted.sort();
        assert_eq!(timestamps, sorted);
    }

    #[test]
    fn test_unmentioned_agent_file_discovered() {
        let tmp = TempDir::new().unwrap();
        let session_file = tmp.path().join("sess.jsonl");
        let agent_dir = session_agent_dir(&session_file);
        write_lines(
            &session_file,
            &[
                r#"{"type":"user","uuid":"u1","sessionId":"sess","timestamp":"2024-01-01T00:00:00Z","message":{"role":"user","content":"hi"}}"#,
            ],
        );
        write_lines(
            &agent_dir.join("agent-ghost.jsonl"),
            &[
                r#"{"type":"assistant","uuid":"g1","sessionId":"sess","timestamp":"2024-01-01T00:00:01Z","message":{"role":"assistant","content":[{"type":"text","text":"early"}]}}"#,
            ],
        );

        let snapshot = parse_session(&session_file, &agent_dir).unwrap();
        let children = &snapshot.data.main_agent.children;
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, "ghost");
        // No spawn records yet, so the node is named after its id
        assert_eq!(children[0].name, "ghost");
    }

    #[test]
    fn test_malformed_line_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let session_file = tmp.path().join("sess.jsonl");
        write_lines(
            &session_file,
            &[r#"{"type":"summary","summary":"ok"}"#, "{broken"],
        );

        let err = parse_session(&session_file, &session_agent_dir(&session_file)).unwrap_err();
        match err {
            Error::Snapshot(details) => {
                assert_eq!(details.line_number, 2);
                assert_eq!(details.raw_line, "{broken");
            }
            other => panic!("Expected snapshot error, got {other}"),
        }
    }

    #[test]
    fn test_missing_session_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let session_file = tmp.path().join("absent.jsonl");
        let err = parse_session(&session_file, &session_agent_dir(&session_file)).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
