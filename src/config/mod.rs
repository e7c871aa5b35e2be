#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::lock;
use crate::error::BoardError;
use crate::task::storage::write_atomic;

pub const CURRENT_VERSION: i64 = 2;
pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_DIR: &str = "kanban";
pub const LOCK_FILE: &str = ".lock";
/// Reserved status for soft-deleted tasks. Never part of the workflow.
pub const ARCHIVED_STATUS: &str = "archived";
pub const MAX_TITLE_LINES: u16 = 8;

pub const ENV_DIR: &str = "MDBOARD_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BoardConfig {
    pub version: i64,
    pub tasks_dir: String,
    pub next_id: u32,
    pub priorities: Vec<String>,
    pub board: BoardInfo,
    pub defaults: Defaults,
    pub wip_limits: BTreeMap<String, u32>,
    pub tui: TuiConfig,
    pub statuses: Vec<StatusConfig>,
    pub classes: Vec<ClassConfig>,
    #[serde(skip)]
    dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BoardInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Defaults {
    pub status: String,
    pub priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            status: "backlog".to_owned(),
            priority: "medium".to_owned(),
            class: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusConfig {
    pub name: String,
    #[serde(default)]
    pub require_claim: bool,
}

impl StatusConfig {
    fn new(name: &str, require_claim: bool) -> Self {
        Self {
            name: name.to_owned(),
            require_claim,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wip_limit: Option<u32>,
    #[serde(default)]
    pub bypass_column_wip: bool,
}

impl ClassConfig {
    /// A class with its own limit or a bypass takes over admission from the column.
    #[must_use]
    pub fn overrides_column(&self) -> bool {
        self.bypass_column_wip || self.wip_limit.is_some_and(|n| n > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TuiConfig {
    /// Title lines per card; 0 lets titles wrap up to the hard cap.
    pub title_lines: u16,
    pub refresh_interval_ms: u64,
}

impl Default for TuiConfig {
    fn default() -> Self {
        Self {
            title_lines: 2,
            refresh_interval_ms: 2000,
        }
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            tasks_dir: "tasks".to_owned(),
            next_id: 1,
            priorities: ["low", "medium", "high", "critical"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            board: BoardInfo::default(),
            defaults: Defaults::default(),
            wip_limits: BTreeMap::new(),
            tui: TuiConfig::default(),
            statuses: vec![
                StatusConfig::new("backlog", false),
                StatusConfig::new("todo", false),
                StatusConfig::new("in-progress", true),
                StatusConfig::new("review", true),
                StatusConfig::new("done", false),
            ],
            classes: default_classes(),
            dir: PathBuf::new(),
        }
    }
}

fn default_classes() -> Vec<ClassConfig> {
    vec![
        ClassConfig {
            name: "expedite".to_owned(),
            wip_limit: Some(1),
            bypass_column_wip: true,
        },
        ClassConfig {
            name: "fixed-date".to_owned(),
            ..ClassConfig::default()
        },
        ClassConfig {
            name: "standard".to_owned(),
            ..ClassConfig::default()
        },
        ClassConfig {
            name: "intangible".to_owned(),
            ..ClassConfig::default()
        },
    ]
}

impl BoardConfig {
    #[must_use]
    pub fn new_default(dir: PathBuf, name: impl Into<String>) -> Self {
        let mut cfg = Self::default();
        cfg.board.name = name.into();
        cfg.dir = dir;
        cfg
    }

    #[must_use]
    pub fn with_dir(mut self, dir: PathBuf) -> Self {
        self.dir = dir;
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    #[must_use]
    pub fn tasks_path(&self) -> PathBuf {
        self.dir.join(&self.tasks_dir)
    }

    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    pub fn status_names(&self) -> impl Iterator<Item = &str> {
        self.statuses.iter().map(|s| s.name.as_str())
    }

    #[must_use]
    pub fn status_index(&self, status: &str) -> Option<usize> {
        self.statuses.iter().position(|s| s.name == status)
    }

    #[must_use]
    pub fn priority_index(&self, priority: &str) -> Option<usize> {
        self.priorities.iter().position(|p| p == priority)
    }

    #[must_use]
    pub fn first_status(&self) -> &str {
        self.statuses.first().map_or("", |s| s.name.as_str())
    }

    /// The last configured status; dependencies are satisfied once here.
    #[must_use]
    pub fn terminal_status(&self) -> &str {
        self.statuses.last().map_or("", |s| s.name.as_str())
    }

    #[must_use]
    pub fn requires_claim(&self, status: &str) -> bool {
        self.statuses
            .iter()
            .any(|s| s.name == status && s.require_claim)
    }

    #[must_use]
    pub fn wip_limit(&self, status: &str) -> Option<u32> {
        self.wip_limits.get(status).copied().filter(|n| *n > 0)
    }

    #[must_use]
    pub fn class(&self, name: &str) -> Option<&ClassConfig> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// Statuses counted against class limits: active work only.
    #[must_use]
    pub fn is_policed(&self, status: &str) -> bool {
        status != ARCHIVED_STATUS
            && self.status_index(status).is_some()
            && status != self.first_status()
            && status != self.terminal_status()
    }

    pub fn validate(&self) -> Result<(), BoardError> {
        if self.statuses.is_empty() {
            return Err(BoardError::Config(
                "statuses must not be empty".to_owned(),
            ));
        }
        let mut seen = BTreeSet::new();
        for s in &self.statuses {
            if s.name.trim().is_empty() {
                return Err(BoardError::Config(
                    "status names must not be empty".to_owned(),
                ));
            }
            if s.name == ARCHIVED_STATUS {
                return Err(BoardError::Config(format!(
                    "'{ARCHIVED_STATUS}' is reserved and cannot be a workflow status"
                )));
            }
            if !seen.insert(s.name.as_str()) {
                return Err(BoardError::Config(format!(
                    "duplicate status '{}'",
                    s.name
                )));
            }
        }
        if self.priorities.is_empty() {
            return Err(BoardError::Config(
                "priorities must not be empty".to_owned(),
            ));
        }
        let mut seen = BTreeSet::new();
        for p in &self.priorities {
            if !seen.insert(p.as_str()) {
                return Err(BoardError::Config(format!("duplicate priority '{p}'")));
            }
        }
        if self.status_index(&self.defaults.status).is_none() {
            return Err(BoardError::Config(format!(
                "defaults.status '{}' is not a configured status",
                self.defaults.status
            )));
        }
        if self.priority_index(&self.defaults.priority).is_none() {
            return Err(BoardError::Config(format!(
                "defaults.priority '{}' is not a configured priority",
                self.defaults.priority
            )));
        }
        for status in self.wip_limits.keys() {
            if self.status_index(status).is_none() {
                return Err(BoardError::Config(format!(
                    "wip_limits.{status} does not name a configured status"
                )));
            }
        }
        let mut seen = BTreeSet::new();
        for c in &self.classes {
            if !seen.insert(c.name.as_str()) {
                return Err(BoardError::Config(format!(
                    "duplicate class '{}'",
                    c.name
                )));
            }
        }
        if let Some(class) = &self.defaults.class
            && self.class(class).is_none()
        {
            return Err(BoardError::Config(format!(
                "defaults.class '{class}' is not a configured class"
            )));
        }
        if self.tui.title_lines > MAX_TITLE_LINES {
            return Err(BoardError::Config(format!(
                "tui.title_lines must be <= {MAX_TITLE_LINES}"
            )));
        }
        if self.next_id == 0 {
            return Err(BoardError::Config("next_id must be >= 1".to_owned()));
        }
        Ok(())
    }

    pub fn save(&self) -> Result<(), BoardError> {
        let raw = toml::to_string_pretty(self)
            .map_err(|e| BoardError::Config(format!("serializing config: {e}")))?;
        write_atomic(&self.config_path(), raw.as_bytes())
    }
}

/// Walks up from `start` looking for a board directory.
pub fn find_dir(start: &Path) -> Result<PathBuf, BoardError> {
    let mut cur = Some(start);
    while let Some(dir) = cur {
        if dir.join(CONFIG_FILE).is_file() {
            return Ok(dir.to_path_buf());
        }
        let nested = dir.join(DEFAULT_DIR);
        if nested.join(CONFIG_FILE).is_file() {
            return Ok(nested);
        }
        cur = dir.parent();
    }
    Err(BoardError::BoardNotFound(start.to_path_buf()))
}

/// Explicit flag, then `MDBOARD_DIR`, then discovery from the working directory.
pub fn resolve_dir(explicit: Option<&Path>) -> Result<PathBuf, BoardError> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = std::env::var_os(ENV_DIR).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let cwd = std::env::current_dir()?;
    find_dir(&cwd)
}

pub fn load(dir: &Path) -> Result<BoardConfig, BoardError> {
    let path = dir.join(CONFIG_FILE);
    let raw = std::fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BoardError::BoardNotFound(dir.to_path_buf())
        } else {
            BoardError::io_path("reading config", &path, e)
        }
    })?;
    let mut doc = parse_doc(&raw, &path)?;
    if migrate(&mut doc)? {
        doc = migrate_locked(dir, &path)?;
    }
    let cfg: BoardConfig = toml::from_str(&doc.to_string())
        .map_err(|e| BoardError::Config(format!("{}: {e}", path.display())))?;
    let cfg = cfg.with_dir(dir.to_path_buf());
    cfg.validate()?;
    debug!(dir = %dir.display(), statuses = cfg.statuses.len(), "loaded config");
    Ok(cfg)
}

/// Creates a new board. Fails if one already exists at `dir`.
pub fn init(dir: &Path, name: &str, statuses: &[String]) -> Result<BoardConfig, BoardError> {
    if dir.join(CONFIG_FILE).exists() {
        return Err(BoardError::BoardExists(dir.to_path_buf()));
    }
    let mut cfg = BoardConfig::new_default(dir.to_path_buf(), name);
    if !statuses.is_empty() {
        cfg.statuses = statuses
            .iter()
            .map(|s| StatusConfig::new(s.trim(), false))
            .collect();
        if let Some(first) = cfg.statuses.first() {
            cfg.defaults.status = first.name.clone();
        }
    }
    cfg.validate()?;
    std::fs::create_dir_all(cfg.tasks_path())
        .map_err(|e| BoardError::io_path("creating tasks directory", cfg.tasks_path(), e))?;
    cfg.save()?;
    info!(dir = %dir.display(), "initialized board");
    Ok(cfg)
}

/// Reserves the next task id, persisting the counter. Call under the board lock.
pub fn reserve_id(dir: &Path, floor: u32) -> Result<u32, BoardError> {
    let path = dir.join(CONFIG_FILE);
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| BoardError::io_path("reading config", &path, e))?;
    let mut doc = parse_doc(&raw, &path)?;
    let stored = doc
        .get("next_id")
        .and_then(toml_edit::Item::as_integer)
        .unwrap_or(1);
    let stored = u32::try_from(stored.max(1))
        .map_err(|_| BoardError::Config(format!("next_id {stored} out of range")))?;
    let id = stored.max(floor);
    doc.insert("next_id", toml_edit::value(i64::from(id) + 1));
    write_atomic(&path, doc.to_string().as_bytes())?;
    Ok(id)
}

/// Re-reads and migrates the file under the board lock, so a concurrent
/// `reserve_id` is never overwritten with a stale counter.
fn migrate_locked(dir: &Path, path: &Path) -> Result<toml_edit::DocumentMut, BoardError> {
    let mut guard = lock::acquire(&dir.join(LOCK_FILE))?;
    let raw = std::fs::read_to_string(path)
        .map_err(|e| BoardError::io_path("reading config", path, e))?;
    let mut doc = parse_doc(&raw, path)?;
    if migrate(&mut doc)? {
        info!(path = %path.display(), version = CURRENT_VERSION, "migrated config");
        write_atomic(path, doc.to_string().as_bytes())?;
    }
    guard.release()?;
    Ok(doc)
}

fn parse_doc(raw: &str, path: &Path) -> Result<toml_edit::DocumentMut, BoardError> {
    raw.parse::<toml_edit::DocumentMut>()
        .map_err(|e| BoardError::Config(format!("parsing {}: {e}", path.display())))
}

/// Brings an older document up to [`CURRENT_VERSION`]. Returns whether it changed.
pub fn migrate(doc: &mut toml_edit::DocumentMut) -> Result<bool, BoardError> {
    let version = match doc.get("version") {
        None => 1,
        Some(item) => item
            .as_integer()
            .ok_or_else(|| BoardError::Config("version must be an integer".to_owned()))?,
    };
    if version <= 0 {
        return Err(BoardError::Config(format!(
            "unsupported config version {version}"
        )));
    }
    if version > CURRENT_VERSION {
        return Err(BoardError::Config(format!(
            "unsupported config version {version} (this build understands up to {CURRENT_VERSION}); upgrade mdboard"
        )));
    }
    if version == CURRENT_VERSION {
        return Ok(false);
    }
    migrate_v1_to_v2(doc);
    Ok(true)
}

// v1 stored statuses as plain names and had no class definitions.
fn migrate_v1_to_v2(doc: &mut toml_edit::DocumentMut) {
    let names: Option<Vec<String>> = doc
        .get("statuses")
        .and_then(toml_edit::Item::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect()
        });
    if let Some(names) = names {
        let mut tables = toml_edit::ArrayOfTables::new();
        for name in names {
            let mut t = toml_edit::Table::new();
            t.insert("name", toml_edit::value(name));
            t.insert("require_claim", toml_edit::value(false));
            tables.push(t);
        }
        doc.insert("statuses", toml_edit::Item::ArrayOfTables(tables));
    }
    if !doc.contains_key("classes") {
        let mut tables = toml_edit::ArrayOfTables::new();
        for class in default_classes() {
            let mut t = toml_edit::Table::new();
            t.insert("name", toml_edit::value(class.name));
            if let Some(limit) = class.wip_limit {
                t.insert("wip_limit", toml_edit::value(i64::from(limit)));
            }
            t.insert("bypass_column_wip", toml_edit::value(class.bypass_column_wip));
            tables.push(t);
        }
        doc.insert("classes", toml_edit::Item::ArrayOfTables(tables));
    }
    doc.insert("version", toml_edit::value(2));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyType {
    Int,
    String,
    OptionalString,
    Status,
    Priority,
}

pub fn get_value(dir: &Path, key: &str) -> Result<Option<String>, BoardError> {
    let cfg = load(dir)?;
    Ok(lookup_value(&cfg, key).map(format_value_for_stdout))
}

pub fn set_value(dir: &Path, key: &str, value: &str) -> Result<(), BoardError> {
    let path = dir.join(CONFIG_FILE);
    let cfg = load(dir)?;
    let item = parse_value_for_key(key, value, &cfg)?;

    let mut guard = lock::acquire(&dir.join(LOCK_FILE))?;
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| BoardError::io_path("reading config", &path, e))?;
    let mut doc = parse_doc(&raw, &path)?;

    apply_set(&mut doc, key, item)?;

    let new_raw = doc.to_string();
    let new_cfg: BoardConfig = toml::from_str(&new_raw).map_err(|e| {
        BoardError::Config(format!("update produced invalid TOML for {}: {e}", path.display()))
    })?;
    new_cfg.validate()?;
    write_atomic(&path, new_raw.as_bytes())?;
    guard.release()
}

fn key_type(key: &str, cfg: &BoardConfig) -> Option<KeyType> {
    if let Some(status) = key.strip_prefix("wip_limits.") {
        return cfg.status_index(status).map(|_| KeyType::Int);
    }
    Some(match key {
        "board.name" => KeyType::String,
        "board.description" | "defaults.class" => KeyType::OptionalString,
        "defaults.status" => KeyType::Status,
        "defaults.priority" => KeyType::Priority,
        "tui.title_lines" | "tui.refresh_interval_ms" => KeyType::Int,
        _ => return None,
    })
}

fn parse_value_for_key(
    key: &str,
    value: &str,
    cfg: &BoardConfig,
) -> Result<toml_edit::Item, BoardError> {
    if matches!(key, "next_id" | "version") {
        return Err(BoardError::InvalidConfigValue {
            key: key.to_owned(),
            msg: "read-only".to_owned(),
        });
    }
    let key_type = key_type(key, cfg).ok_or_else(|| BoardError::InvalidConfigKey(key.to_owned()))?;
    let invalid = |msg: String| BoardError::InvalidConfigValue {
        key: key.to_owned(),
        msg,
    };
    let v = value.trim();
    Ok(match key_type {
        KeyType::Int => {
            let n = v
                .parse::<i64>()
                .map_err(|e| invalid(format!("expected integer, got '{v}': {e}")))?;
            if n < 0 {
                return Err(invalid("must be >= 0".to_owned()));
            }
            toml_edit::value(n)
        }
        KeyType::String | KeyType::OptionalString => toml_edit::value(v),
        KeyType::Status => {
            if cfg.status_index(v).is_none() {
                return Err(invalid(format!(
                    "must be one of: {}",
                    cfg.status_names().collect::<Vec<_>>().join(", ")
                )));
            }
            toml_edit::value(v)
        }
        KeyType::Priority => {
            if cfg.priority_index(v).is_none() {
                return Err(invalid(format!(
                    "must be one of: {}",
                    cfg.priorities.join(", ")
                )));
            }
            toml_edit::value(v)
        }
    })
}

fn apply_set(
    doc: &mut toml_edit::DocumentMut,
    key: &str,
    value: toml_edit::Item,
) -> Result<(), BoardError> {
    let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
    let Some((leaf, parents)) = parts.split_last() else {
        return Err(BoardError::InvalidConfigKey(key.to_owned()));
    };

    let mut cur: &mut dyn toml_edit::TableLike = doc.as_table_mut();
    for seg in parents {
        if !cur.contains_key(seg) {
            let mut t = toml_edit::Table::new();
            t.set_implicit(true);
            cur.insert(seg, toml_edit::Item::Table(t));
        }
        cur = cur
            .get_mut(seg)
            .and_then(toml_edit::Item::as_table_like_mut)
            .ok_or_else(|| {
                BoardError::Config(format!("cannot set {key}: '{seg}' is not a table"))
            })?;
    }
    cur.insert(leaf, value);
    Ok(())
}

fn lookup_value(cfg: &BoardConfig, key: &str) -> Option<serde_json::Value> {
    let mut v = serde_json::to_value(cfg).ok()?;
    for seg in key.split('.').filter(|s| !s.is_empty()) {
        match v {
            serde_json::Value::Object(mut map) => {
                v = map.remove(seg)?;
            }
            _ => return None,
        }
    }
    Some(v)
}

fn format_value_for_stdout(v: serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null".to_owned(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s,
        other => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, raw: &str) {
        std::fs::write(dir.join(CONFIG_FILE), raw).unwrap();
    }

    #[test]
    fn default_config_is_valid() {
        BoardConfig::default().validate().unwrap();
    }

    #[test]
    fn default_workflow_shape() {
        let cfg = BoardConfig::default();
        assert_eq!(cfg.first_status(), "backlog");
        assert_eq!(cfg.terminal_status(), "done");
        assert!(cfg.requires_claim("in-progress"));
        assert!(!cfg.requires_claim("todo"));
        assert!(cfg.is_policed("in-progress"));
        assert!(!cfg.is_policed("backlog"));
        assert!(!cfg.is_policed("done"));
        assert!(!cfg.is_policed(ARCHIVED_STATUS));
        let expedite = cfg.class("expedite").unwrap();
        assert!(expedite.overrides_column());
        assert!(!cfg.class("standard").unwrap().overrides_column());
    }

    #[test]
    fn validation_rejects_reserved_and_unknown_names() {
        let mut cfg = BoardConfig::default();
        cfg.statuses.push(StatusConfig::new(ARCHIVED_STATUS, false));
        assert!(cfg.validate().is_err());

        let mut cfg = BoardConfig::default();
        cfg.wip_limits.insert("nope".to_owned(), 2);
        assert!(cfg.validate().is_err());

        let mut cfg = BoardConfig::default();
        cfg.defaults.priority = "urgent".to_owned();
        assert!(cfg.validate().is_err());

        let mut cfg = BoardConfig::default();
        cfg.tui.title_lines = MAX_TITLE_LINES + 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_wip_limit_means_unlimited() {
        let mut cfg = BoardConfig::default();
        cfg.wip_limits.insert("todo".to_owned(), 0);
        cfg.wip_limits.insert("review".to_owned(), 2);
        assert_eq!(cfg.wip_limit("todo"), None);
        assert_eq!(cfg.wip_limit("review"), Some(2));
    }

    #[test]
    fn init_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let board = dir.path().join(DEFAULT_DIR);
        let created = init(&board, "demo", &[]).unwrap();
        assert!(created.tasks_path().is_dir());

        let loaded = load(&board).unwrap();
        assert_eq!(loaded, created);
        assert!(matches!(
            init(&board, "demo", &[]),
            Err(BoardError::BoardExists(_))
        ));
    }

    #[test]
    fn init_with_custom_statuses_uses_first_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = init(
            dir.path(),
            "custom",
            &["open".to_owned(), "closed".to_owned()],
        )
        .unwrap();
        assert_eq!(cfg.defaults.status, "open");
        assert_eq!(cfg.terminal_status(), "closed");
    }

    #[test]
    fn find_dir_walks_up_to_nested_board() {
        let dir = tempfile::tempdir().unwrap();
        init(&dir.path().join(DEFAULT_DIR), "walk", &[]).unwrap();
        let deep = dir.path().join("a").join("b");
        std::fs::create_dir_all(&deep).unwrap();
        let found = find_dir(&deep).unwrap();
        assert_eq!(found, dir.path().join(DEFAULT_DIR));
    }

    #[test]
    fn find_dir_reports_missing_board() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            find_dir(dir.path()),
            Err(BoardError::BoardNotFound(_))
        ));
    }

    #[test]
    fn migrates_v1_statuses_and_adds_classes() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "version = 1\nnext_id = 4\nstatuses = [\"todo\", \"doing\", \"done\"]\n\n[defaults]\nstatus = \"todo\"\n",
        );
        let cfg = load(dir.path()).unwrap();
        assert_eq!(cfg.version, CURRENT_VERSION);
        assert_eq!(cfg.status_names().collect::<Vec<_>>(), ["todo", "doing", "done"]);
        assert!(cfg.class("expedite").is_some());
        assert_eq!(cfg.next_id, 4);

        let rewritten = std::fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        assert!(rewritten.contains("version = 2"));
    }

    #[test]
    fn migration_rejects_zero_negative_and_future_versions() {
        for version in ["0", "-1", "99"] {
            let mut doc: toml_edit::DocumentMut =
                format!("version = {version}\n").parse().unwrap();
            let err = migrate(&mut doc).unwrap_err();
            assert!(
                err.to_string().contains("unsupported config version"),
                "{version}: {err}"
            );
        }
    }

    #[test]
    fn current_version_is_not_migrated() {
        let mut doc: toml_edit::DocumentMut = "version = 2\n".parse().unwrap();
        assert!(!migrate(&mut doc).unwrap());
    }

    #[test]
    fn reserve_id_persists_counter_and_honors_floor() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), "ids", &[]).unwrap();
        assert_eq!(reserve_id(dir.path(), 1).unwrap(), 1);
        assert_eq!(reserve_id(dir.path(), 1).unwrap(), 2);
        assert_eq!(reserve_id(dir.path(), 10).unwrap(), 10);
        assert_eq!(load(dir.path()).unwrap().next_id, 11);
    }

    #[test]
    fn set_value_waits_for_board_lock_and_keeps_counter() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), "contended", &[]).unwrap();
        let mut held = lock::acquire(&dir.path().join(LOCK_FILE)).unwrap();

        let writer = {
            let dir = dir.path().to_path_buf();
            std::thread::spawn(move || set_value(&dir, "board.name", "renamed"))
        };
        std::thread::sleep(std::time::Duration::from_millis(150));
        assert!(!writer.is_finished());

        assert_eq!(reserve_id(dir.path(), 1).unwrap(), 1);
        held.release().unwrap();
        writer.join().unwrap().unwrap();

        let cfg = load(dir.path()).unwrap();
        assert_eq!(cfg.board.name, "renamed");
        assert_eq!(cfg.next_id, 2);
    }

    #[test]
    fn migration_waits_for_board_lock() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "version = 1\nnext_id = 4\nstatuses = [\"todo\", \"doing\", \"done\"]\n\n[defaults]\nstatus = \"todo\"\n",
        );
        let mut held = lock::acquire(&dir.path().join(LOCK_FILE)).unwrap();

        let loader = {
            let dir = dir.path().to_path_buf();
            std::thread::spawn(move || load(&dir).map(|cfg| cfg.next_id))
        };
        std::thread::sleep(std::time::Duration::from_millis(150));
        assert!(!loader.is_finished());

        assert_eq!(reserve_id(dir.path(), 1).unwrap(), 4);
        held.release().unwrap();
        assert_eq!(loader.join().unwrap().unwrap(), 5);
    }

    #[test]
    fn config_set_and_get_dot_paths() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), "settable", &[]).unwrap();

        set_value(dir.path(), "board.name", "renamed").unwrap();
        assert_eq!(
            get_value(dir.path(), "board.name").unwrap().as_deref(),
            Some("renamed")
        );

        set_value(dir.path(), "wip_limits.in-progress", "3").unwrap();
        assert_eq!(load(dir.path()).unwrap().wip_limit("in-progress"), Some(3));

        set_value(dir.path(), "tui.title_lines", "0").unwrap();
        assert_eq!(
            get_value(dir.path(), "tui.title_lines").unwrap().as_deref(),
            Some("0")
        );
    }

    #[test]
    fn config_set_rejects_bad_keys_and_values() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), "strict", &[]).unwrap();
        assert!(matches!(
            set_value(dir.path(), "nope.key", "1"),
            Err(BoardError::InvalidConfigKey(_))
        ));
        assert!(matches!(
            set_value(dir.path(), "defaults.status", "nowhere"),
            Err(BoardError::InvalidConfigValue { .. })
        ));
        assert!(matches!(
            set_value(dir.path(), "next_id", "5"),
            Err(BoardError::InvalidConfigValue { .. })
        ));
        assert!(matches!(
            set_value(dir.path(), "tui.title_lines", "20"),
            Err(BoardError::Config(_))
        ));
    }
}
