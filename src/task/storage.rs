#![forbid(unsafe_code)]

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::BoardError;
use crate::task::model::{Task, normalize_body};
use crate::task::slug;

const DELIMITER: &str = "---";

/// A task file skipped by a lenient load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadWarning {
    pub file: PathBuf,
    pub message: String,
}

impl fmt::Display for ReadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "skipping {}: {}", self.file.display(), self.message)
    }
}

/// Splits `---\n<yaml>\n---\n<body>` into its frontmatter and body.
pub fn split_frontmatter(content: &str) -> Result<(&str, &str), String> {
    let rest = content
        .strip_prefix("---\r\n")
        .or_else(|| content.strip_prefix("---\n"))
        .ok_or_else(|| "does not start with YAML frontmatter".to_owned())?;

    if let Some(body) = rest.strip_prefix("---\n") {
        return Ok(("", strip_separator(body)));
    }
    if let Some(idx) = rest.find("\n---\n") {
        return Ok((&rest[..idx], strip_separator(&rest[idx + 5..])));
    }
    if let Some(idx) = rest.find("\r\n---\r\n") {
        return Ok((&rest[..idx], strip_separator(&rest[idx + 7..])));
    }
    if let Some(fm) = rest.strip_suffix(DELIMITER)
        && (fm.is_empty() || fm.ends_with('\n'))
    {
        return Ok((fm, ""));
    }
    Err("unclosed frontmatter".to_owned())
}

fn strip_separator(body: &str) -> &str {
    body.strip_prefix("\r\n")
        .or_else(|| body.strip_prefix('\n'))
        .unwrap_or(body)
}

pub fn read(path: &Path) -> Result<Task, BoardError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| BoardError::io_path("reading task file", path, e))?;
    parse(&content, path)
}

fn parse(content: &str, path: &Path) -> Result<Task, BoardError> {
    let parse_err = |msg: String| BoardError::Parse {
        path: path.to_path_buf(),
        msg,
    };
    let (frontmatter, body) = split_frontmatter(content).map_err(parse_err)?;
    let mut task: Task =
        serde_yaml::from_str(frontmatter).map_err(|e| parse_err(e.to_string()))?;
    task.body = body.to_owned();
    task.file = Some(path.to_path_buf());
    Ok(task)
}

fn render(task: &Task) -> Result<String, BoardError> {
    let mut value = serde_yaml::to_value(task)
        .map_err(|e| BoardError::InvalidInput(format!("serializing task #{}: {e}", task.id)))?;
    if let serde_yaml::Value::Mapping(map) = &mut value {
        map.remove("body");
        map.remove("file");
    }
    let yaml = serde_yaml::to_string(&value)
        .map_err(|e| BoardError::InvalidInput(format!("serializing task #{}: {e}", task.id)))?;

    let mut out = String::with_capacity(yaml.len() + task.body.len() + 16);
    out.push_str("---\n");
    out.push_str(&yaml);
    out.push_str("---\n");
    if !task.body.is_empty() {
        out.push('\n');
        out.push_str(&normalize_body(&task.body));
    }
    Ok(out)
}

/// Writes a task to `path` through a temp file and rename.
pub fn write(path: &Path, task: &Task) -> Result<(), BoardError> {
    let content = render(task)?;
    write_atomic(path, content.as_bytes())
}

pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<(), BoardError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    std::fs::write(&tmp, data).map_err(|e| BoardError::io_path("writing", &tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(BoardError::io_path("renaming into", path, e));
    }
    Ok(())
}

pub fn find_by_id(dir: &Path, id: u32) -> Result<PathBuf, BoardError> {
    for path in task_files(dir)? {
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(slug::parse_file_id)
            == Some(id);
        if matches {
            return Ok(path);
        }
    }
    Err(BoardError::TaskNotFound(id))
}

/// Loads every task, failing on the first malformed file.
pub fn read_all(dir: &Path) -> Result<Vec<Task>, BoardError> {
    let mut tasks = Vec::new();
    for path in task_files(dir)? {
        tasks.push(read(&path)?);
    }
    tasks.sort_by_key(|t| t.id);
    Ok(tasks)
}

/// Loads every readable task and reports malformed files instead of failing.
pub fn read_all_lenient(dir: &Path) -> Result<(Vec<Task>, Vec<ReadWarning>), BoardError> {
    let files = match task_files(dir) {
        Ok(files) => files,
        Err(BoardError::IoPath { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            return Ok((Vec::new(), Vec::new()));
        }
        Err(e) => return Err(e),
    };

    let mut tasks = Vec::with_capacity(files.len());
    let mut warnings = Vec::new();
    for path in files {
        match read(&path) {
            Ok(task) => tasks.push(task),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping malformed task file");
                warnings.push(ReadWarning {
                    file: path,
                    message: e.to_string(),
                });
            }
        }
    }
    tasks.sort_by_key(|t| t.id);
    Ok((tasks, warnings))
}

fn task_files(dir: &Path) -> Result<Vec<PathBuf>, BoardError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| BoardError::io_path("reading tasks directory", dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| BoardError::io_path("reading tasks directory", dir, e))?;
        let path = entry.path();
        let is_file = entry.file_type().is_ok_and(|t| t.is_file());
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !is_file || name.starts_with('.') || path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

/// Task files for one board, keyed by id.
#[derive(Debug, Clone)]
pub struct TaskStore {
    dir: PathBuf,
}

impl TaskStore {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> Result<(), BoardError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| BoardError::io_path("creating tasks directory", &self.dir, e))
    }

    #[must_use]
    pub fn path_for(&self, task: &Task) -> PathBuf {
        self.dir.join(slug::file_name_for(task.id, &task.title))
    }

    pub fn find(&self, id: u32) -> Result<PathBuf, BoardError> {
        find_by_id(&self.dir, id)
    }

    /// Highest id claimed by any task file name, readable or not.
    pub fn max_file_id(&self) -> Result<u32, BoardError> {
        let files = match task_files(&self.dir) {
            Ok(files) => files,
            Err(BoardError::IoPath { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                return Ok(0);
            }
            Err(e) => return Err(e),
        };
        Ok(files
            .iter()
            .filter_map(|p| p.file_name()?.to_str().and_then(slug::parse_file_id))
            .max()
            .unwrap_or(0))
    }

    pub fn load(&self, id: u32) -> Result<Task, BoardError> {
        read(&self.find(id)?)
    }

    pub fn load_all(&self) -> Result<Vec<Task>, BoardError> {
        read_all(&self.dir)
    }

    pub fn load_all_lenient(&self) -> Result<(Vec<Task>, Vec<ReadWarning>), BoardError> {
        read_all_lenient(&self.dir)
    }

    /// Persists a snapshot under its canonical name. When the title changed, the
    /// new file is written before the old one is removed.
    pub fn save(&self, task: &Task) -> Result<Task, BoardError> {
        self.ensure_dir()?;
        let path = self.path_for(task);
        write(&path, task)?;
        if let Some(previous) = task.file.as_deref()
            && previous != path
            && previous.exists()
        {
            std::fs::remove_file(previous)
                .map_err(|e| BoardError::io_path("removing old task file", previous, e))?;
            debug!(from = %previous.display(), to = %path.display(), "renamed task file");
        }
        let mut saved = task.clone();
        saved.file = Some(path);
        Ok(saved)
    }

    pub fn delete(&self, task: &Task) -> Result<(), BoardError> {
        let path = match task.file.clone() {
            Some(path) => path,
            None => self.find(task.id)?,
        };
        std::fs::remove_file(&path).map_err(|e| BoardError::io_path("deleting task file", &path, e))
    }
}
