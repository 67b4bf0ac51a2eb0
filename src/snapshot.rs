//! Snapshot testing for MCP tool outputs.
//!
//! A snapshot is the serialized output of a tool call, stored next to the
//! tests in `<snapshot_dir>/<test>__<name>.json`. The first run records it;
//! later runs compare against it and fail with a diff on any change. Set
//! `MCP_UPDATE_SNAPSHOTS=1` to re-record.
//!
//! ```ignore
//! let result = client.call_tool("get_user", json!({"id": "1"})).await?;
//! let snapshot = SnapshotHelper::for_current_test("tests/__snapshots__")?;
//! snapshot.assert_match(&result, "get_user_response")?;
//! ```

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use similar::TextDiff;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::config::{is_truthy, UPDATE_SNAPSHOTS_ENV};
use crate::errors::{TestkitError, TestkitResult};

const UPDATE_HINT: &str = "To update snapshots, run with MCP_UPDATE_SNAPSHOTS=1";

/// What `assert_match` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// No snapshot existed; one was written
    Created,
    /// Update mode rewrote the snapshot
    Updated,
    /// The stored snapshot matched
    Matched,
}

#[derive(Debug, Clone)]
pub struct SnapshotHelper {
    test_name: String,
    snapshot_dir: PathBuf,
    update_snapshots: bool,
}

impl SnapshotHelper {
    /// Bind to `test_name`, creating `snapshot_dir` if needed. Update mode
    /// starts from `MCP_UPDATE_SNAPSHOTS`.
    pub fn new(test_name: &str, snapshot_dir: impl Into<PathBuf>) -> TestkitResult<Self> {
        let snapshot_dir = snapshot_dir.into();
        std::fs::create_dir_all(&snapshot_dir)
            .map_err(|e| TestkitError::file_system(&snapshot_dir, e))?;

        let update_snapshots = std::env::var(UPDATE_SNAPSHOTS_ENV)
            .map(|v| is_truthy(&v))
            .unwrap_or(false);

        Ok(Self {
            test_name: clean_test_name(test_name),
            snapshot_dir,
            update_snapshots,
        })
    }

    /// Bind to the running test, named after the test thread.
    pub fn for_current_test(snapshot_dir: impl Into<PathBuf>) -> TestkitResult<Self> {
        Self::new(&current_test_name(), snapshot_dir)
    }

    pub fn with_update(mut self, update_snapshots: bool) -> Self {
        self.update_snapshots = update_snapshots;
        self
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    pub fn update_snapshots(&self) -> bool {
        self.update_snapshots
    }

    pub fn snapshot_path(&self, snapshot_name: &str) -> PathBuf {
        self.snapshot_dir
            .join(format!("{}__{snapshot_name}.json", self.test_name))
    }

    fn text_snapshot_path(&self, snapshot_name: &str) -> PathBuf {
        self.snapshot_path(snapshot_name).with_extension("txt")
    }

    /// Pretty JSON with two-space indentation and sorted keys
    pub fn serialize<T: Serialize + ?Sized>(value: &T) -> TestkitResult<String> {
        let value = sort_keys(serde_json::to_value(value)?);
        let mut json = serde_json::to_string_pretty(&value)?;
        json.push('\n');
        Ok(json)
    }

    pub fn assert_match<T: Serialize + ?Sized>(
        &self,
        value: &T,
        snapshot_name: &str,
    ) -> TestkitResult<SnapshotOutcome> {
        self.assert_match_with(value, snapshot_name, None)
    }

    /// Like [`assert_match`](Self::assert_match), with `update` overriding the
    /// helper's update mode.
    pub fn assert_match_with<T: Serialize + ?Sized>(
        &self,
        value: &T,
        snapshot_name: &str,
        update: Option<bool>,
    ) -> TestkitResult<SnapshotOutcome> {
        validate_snapshot_name(snapshot_name)?;
        let path = self.snapshot_path(snapshot_name);
        let should_update = update.unwrap_or(self.update_snapshots);
        let actual_json = Self::serialize(value)?;

        if should_update || !path.exists() {
            write_atomic(&path, &actual_json)?;
            return Ok(if should_update {
                info!("Updated snapshot: {snapshot_name}");
                SnapshotOutcome::Updated
            } else {
                debug!("Created snapshot: {}", path.display());
                SnapshotOutcome::Created
            });
        }

        let expected_json =
            std::fs::read_to_string(&path).map_err(|e| TestkitError::file_system(&path, e))?;
        let expected: Value = serde_json::from_str(&expected_json).map_err(|e| {
            TestkitError::Serialization {
                reason: format!("corrupt snapshot {}: {e}", path.display()),
            }
        })?;
        let actual: Value = serde_json::from_str(&actual_json)?;

        if actual != expected {
            let message = format!(
                "Snapshot mismatch for '{snapshot_name}'.\n\
                 Expected:\n{expected_json}\n\
                 Actual:\n{actual_json}\n\
                 Diff:\n{}\n\
                 {UPDATE_HINT}",
                unified_diff(&expected_json, &actual_json)
            );
            return Err(TestkitError::SnapshotMismatch {
                name: snapshot_name.to_string(),
                message,
            });
        }

        Ok(SnapshotOutcome::Matched)
    }

    /// Convenience for plain JSON values
    pub fn assert_match_json(
        &self,
        value: &Value,
        snapshot_name: &str,
    ) -> TestkitResult<SnapshotOutcome> {
        self.assert_match_with(value, snapshot_name, None)
    }

    pub fn assert_match_text(&self, text: &str, snapshot_name: &str) -> TestkitResult<SnapshotOutcome> {
        self.assert_match_text_with(text, snapshot_name, None)
    }

    /// Exact comparison of text, stored with a `.txt` extension
    pub fn assert_match_text_with(
        &self,
        text: &str,
        snapshot_name: &str,
        update: Option<bool>,
    ) -> TestkitResult<SnapshotOutcome> {
        validate_snapshot_name(snapshot_name)?;
        let path = self.text_snapshot_path(snapshot_name);
        let should_update = update.unwrap_or(self.update_snapshots);

        if should_update || !path.exists() {
            write_atomic(&path, text)?;
            return Ok(if should_update {
                info!("Updated snapshot: {snapshot_name}");
                SnapshotOutcome::Updated
            } else {
                SnapshotOutcome::Created
            });
        }

        let expected_text =
            std::fs::read_to_string(&path).map_err(|e| TestkitError::file_system(&path, e))?;
        if text != expected_text {
            let message = format!(
                "Text snapshot mismatch for '{snapshot_name}'.\n\
                 Expected:\n{expected_text}\n\n\
                 Actual:\n{text}\n\n\
                 Diff:\n{}\n\
                 {UPDATE_HINT}",
                unified_diff(&expected_text, text)
            );
            return Err(TestkitError::SnapshotMismatch {
                name: snapshot_name.to_string(),
                message,
            });
        }

        Ok(SnapshotOutcome::Matched)
    }

    /// Stored JSON snapshot, if any, without asserting
    pub fn get_snapshot(&self, snapshot_name: &str) -> TestkitResult<Option<Value>> {
        let path = self.snapshot_path(snapshot_name);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path).map_err(|e| TestkitError::file_system(&path, e))?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    pub fn delete_snapshot(&self, snapshot_name: &str) -> TestkitResult<()> {
        let path = self.snapshot_path(snapshot_name);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| TestkitError::file_system(&path, e))?;
        }
        Ok(())
    }

    /// Names of this test's JSON snapshots, sorted
    pub fn list_snapshots(&self) -> TestkitResult<Vec<String>> {
        let prefix = format!("{}__", self.test_name);
        let entries = std::fs::read_dir(&self.snapshot_dir)
            .map_err(|e| TestkitError::file_system(&self.snapshot_dir, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TestkitError::file_system(&self.snapshot_dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(name) = stem.strip_prefix(&prefix) {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }
}

/// Name of the running test, taken from the thread the test harness runs it on.
pub fn current_test_name() -> String {
    std::thread::current()
        .name()
        .filter(|name| *name != "main")
        .map(str::to_string)
        .unwrap_or_else(|| "unnamed_test".to_string())
}

/// Drop a `[param]` suffix and any module path, and make the rest file-name safe.
pub fn clean_test_name(name: &str) -> String {
    static UNSAFE_CHARS: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars =
        UNSAFE_CHARS.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.\-]").expect("valid regex"));

    let base = name.split('[').next().unwrap_or(name);
    let base = base.rsplit("::").next().unwrap_or(base).trim();
    let cleaned = unsafe_chars.replace_all(base, "_");
    if cleaned.is_empty() {
        "unnamed_test".to_string()
    } else {
        cleaned.into_owned()
    }
}

fn validate_snapshot_name(snapshot_name: &str) -> TestkitResult<()> {
    if snapshot_name.is_empty()
        || snapshot_name.contains(['/', '\\'])
        || snapshot_name == "."
        || snapshot_name == ".."
    {
        return Err(TestkitError::Configuration {
            reason: format!("invalid snapshot name '{snapshot_name}'"),
        });
    }
    Ok(())
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

fn unified_diff(expected: &str, actual: &str) -> String {
    TextDiff::from_lines(expected, actual)
        .unified_diff()
        .context_radius(3)
        .header("expected", "actual")
        .to_string()
}

/// Write through a temp file, fsync, then rename over the target.
fn write_atomic(path: &Path, contents: &str) -> TestkitResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "snapshot".to_string());
    let temp_path = parent.join(format!(
        ".{file_name}.tmp.{}.{}",
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    ));

    let result = (|| {
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        std::fs::rename(&temp_path, path)
    })();

    result.map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        TestkitError::file_system(path, e)
    })
}
