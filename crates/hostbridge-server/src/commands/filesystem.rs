//! Directory and file inspection commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use super::{CommandError, CommandHandler, require_str};

/// Metadata for one filesystem entry.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Final path component.
    pub name: String,
    /// Full path.
    pub path: String,
    /// Directory flag.
    pub is_directory: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification, RFC 3339.
    pub modified: Option<String>,
}

fn timestamp(t: std::io::Result<SystemTime>) -> Option<String> {
    t.ok()
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl FileEntry {
    fn from_path(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            name: path
                .file_name()
                .map_or_else(|| path.to_string_lossy(), |n| n.to_string_lossy())
                .into_owned(),
            path: path.to_string_lossy().into_owned(),
            is_directory: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified: timestamp(meta.modified()),
        })
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, CommandError> {
    serde_json::to_value(value).map_err(|e| CommandError::Failed(e.to_string()))
}

/// A well-known user directory that file listings are rooted at.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct BaseDirectory {
    /// Lookup key, e.g. `documents`.
    pub key: String,
    /// Absolute path.
    pub path: String,
}

/// `(key, XDG variable, directory under $HOME)`.
const WELL_KNOWN: [(&str, Option<&str>, &str); 7] = [
    ("desktop", Some("XDG_DESKTOP_DIR"), "Desktop"),
    ("documents", Some("XDG_DOCUMENTS_DIR"), "Documents"),
    ("downloads", Some("XDG_DOWNLOAD_DIR"), "Downloads"),
    ("home", None, ""),
    ("music", Some("XDG_MUSIC_DIR"), "Music"),
    ("pictures", Some("XDG_PICTURES_DIR"), "Pictures"),
    ("videos", Some("XDG_VIDEOS_DIR"), "Videos"),
];

/// The set of base directories clients may browse.
#[derive(Clone, Debug, Default)]
pub struct BaseDirectories {
    entries: Vec<BaseDirectory>,
}

impl BaseDirectories {
    /// Fixed set of entries.
    pub fn new(entries: Vec<BaseDirectory>) -> Self {
        Self { entries }
    }

    /// Resolve from the process environment (`XDG_*_DIR`, then `$HOME/<Name>`).
    pub fn from_env() -> Self {
        Self::resolve(|name| std::env::var(name).ok())
    }

    /// Resolve with `lookup` standing in for the environment.
    ///
    /// Keys whose path cannot be determined are left out.
    pub fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let home = get("HOME");
        let entries = WELL_KNOWN
            .iter()
            .filter_map(|&(key, xdg, below_home)| {
                let path = xdg.and_then(&get).or_else(|| {
                    home.as_ref().map(|h| {
                        if below_home.is_empty() {
                            h.clone()
                        } else {
                            Path::new(h).join(below_home).to_string_lossy().into_owned()
                        }
                    })
                })?;
                Some(BaseDirectory {
                    key: key.to_owned(),
                    path,
                })
            })
            .collect();
        Self { entries }
    }

    /// Entry for `key`.
    pub fn find(&self, key: &str) -> Option<&BaseDirectory> {
        self.entries.iter().find(|d| d.key == key)
    }

    /// Every entry, in key order.
    pub fn entries(&self) -> &[BaseDirectory] {
        &self.entries
    }

    fn require(&self, data: &Value) -> Result<&BaseDirectory, CommandError> {
        let key = require_str(data, "base")?;
        self.find(key)
            .ok_or_else(|| CommandError::NotFound(format!("unknown base directory: {key}")))
    }
}

/// Entries of `dir`, directories first then by name.
fn list_dir(dir: &Path) -> std::io::Result<Vec<FileEntry>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        // Entries that vanish or deny stat are skipped.
        if let Ok(e) = FileEntry::from_path(&entry?.path()) {
            entries.push(e);
        }
    }
    entries.sort_by(|a, b| {
        b.is_directory
            .cmp(&a.is_directory)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(entries)
}

/// Resolve `relative` under `root`, refusing anything that leaves it.
fn resolve_under(root: &Path, relative: Option<&str>) -> Result<PathBuf, CommandError> {
    let root = root.canonicalize()?;
    let target = match relative {
        Some(rel) => root.join(rel).canonicalize()?,
        None => root.clone(),
    };
    if !target.starts_with(&root) {
        return Err(CommandError::InvalidParams(
            "path is not underneath the base directory".into(),
        ));
    }
    Ok(target)
}

/// Lists every base directory as `[{key, path}]`.
pub struct GetDirectoriesHandler {
    directories: Arc<BaseDirectories>,
}

impl GetDirectoriesHandler {
    /// Handler over `directories`.
    pub fn new(directories: Arc<BaseDirectories>) -> Self {
        Self { directories }
    }
}

#[async_trait]
impl CommandHandler for GetDirectoriesHandler {
    async fn execute(&self, _data: Value) -> Result<Value, CommandError> {
        to_value(&self.directories.entries())
    }
}

/// Resolves `data.base` to its `{key, path}` entry.
pub struct GetDirectoryHandler {
    directories: Arc<BaseDirectories>,
}

impl GetDirectoryHandler {
    /// Handler over `directories`.
    pub fn new(directories: Arc<BaseDirectories>) -> Self {
        Self { directories }
    }
}

#[async_trait]
impl CommandHandler for GetDirectoryHandler {
    async fn execute(&self, data: Value) -> Result<Value, CommandError> {
        to_value(self.directories.require(&data)?)
    }
}

/// Lists the entries of `data.path` (relative, optional) under base `data.base`.
pub struct GetFilesHandler {
    directories: Arc<BaseDirectories>,
}

impl GetFilesHandler {
    /// Handler over `directories`.
    pub fn new(directories: Arc<BaseDirectories>) -> Self {
        Self { directories }
    }
}

#[async_trait]
impl CommandHandler for GetFilesHandler {
    async fn execute(&self, data: Value) -> Result<Value, CommandError> {
        let base = self.directories.require(&data)?.clone();
        let relative = data
            .get("path")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .map(str::to_owned);
        let (path, files) = tokio::task::spawn_blocking(
            move || -> Result<(PathBuf, Vec<FileEntry>), CommandError> {
                let target = resolve_under(Path::new(&base.path), relative.as_deref())?;
                let files = list_dir(&target)?;
                Ok((target, files))
            },
        )
        .await
        .map_err(|e| CommandError::Failed(e.to_string()))??;
        Ok(json!({
            "base": data.get("base"),
            "path": path.to_string_lossy(),
            "files": to_value(&files)?,
        }))
    }
}

/// Metadata of `data.path`.
pub struct GetFileHandler;

#[async_trait]
impl CommandHandler for GetFileHandler {
    async fn execute(&self, data: Value) -> Result<Value, CommandError> {
        let path = require_str(&data, "path")?;
        let entry = FileEntry::from_path(Path::new(path))?;
        to_value(&entry)
    }
}

/// `{path, valid}` where `valid` means an existing directory.
pub struct ValidateDirectoryHandler;

#[async_trait]
impl CommandHandler for ValidateDirectoryHandler {
    async fn execute(&self, data: Value) -> Result<Value, CommandError> {
        let path = require_str(&data, "path")?;
        Ok(json!({ "path": path, "valid": Path::new(path).is_dir() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("zdir")).unwrap();
        dir
    }

    fn bases(root: &Path) -> Arc<BaseDirectories> {
        Arc::new(BaseDirectories::new(vec![
            BaseDirectory {
                key: "documents".into(),
                path: root.to_string_lossy().into_owned(),
            },
            BaseDirectory {
                key: "music".into(),
                path: root.join("missing").to_string_lossy().into_owned(),
            },
        ]))
    }

    #[test]
    fn resolve_prefers_xdg_then_home() {
        let dirs = BaseDirectories::resolve(|name| match name {
            "HOME" => Some("/home/ada".into()),
            "XDG_MUSIC_DIR" => Some("/srv/music".into()),
            "XDG_VIDEOS_DIR" => Some(String::new()),
            _ => None,
        });
        assert_eq!(dirs.find("music").unwrap().path, "/srv/music");
        assert_eq!(dirs.find("documents").unwrap().path, "/home/ada/Documents");
        assert_eq!(dirs.find("videos").unwrap().path, "/home/ada/Videos");
        assert_eq!(dirs.find("home").unwrap().path, "/home/ada");
        assert_eq!(dirs.entries().len(), 7);
    }

    #[test]
    fn resolve_without_home_keeps_only_xdg() {
        let dirs = BaseDirectories::resolve(|name| {
            (name == "XDG_DOWNLOAD_DIR").then(|| "/dl".to_owned())
        });
        assert_eq!(
            dirs.entries(),
            &[BaseDirectory {
                key: "downloads".into(),
                path: "/dl".into()
            }]
        );
    }

    #[tokio::test]
    async fn get_directories_lists_bases() {
        let dir = fixture();
        let result = GetDirectoriesHandler::new(bases(dir.path()))
            .execute(Value::Null)
            .await
            .unwrap();
        assert_eq!(result[0]["key"], "documents");
        assert_eq!(result[1]["key"], "music");
    }

    #[tokio::test]
    async fn get_directory_resolves_base_key() {
        let dir = fixture();
        let handler = GetDirectoryHandler::new(bases(dir.path()));
        let result = handler.execute(json!({"base": "documents"})).await.unwrap();
        assert_eq!(result["path"], &*dir.path().to_string_lossy());

        let err = handler.execute(json!({"base": "/etc"})).await.unwrap_err();
        assert_matches!(err, CommandError::NotFound(_));
        let err = handler.execute(json!({"path": "/etc"})).await.unwrap_err();
        assert_matches!(err, CommandError::InvalidParams(_));
    }

    #[tokio::test]
    async fn get_files_lists_directories_first() {
        let dir = fixture();
        let result = GetFilesHandler::new(bases(dir.path()))
            .execute(json!({"base": "documents"}))
            .await
            .unwrap();
        let names: Vec<&str> = result["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["zdir", "a.txt", "b.txt"]);
        assert_eq!(result["base"], "documents");
        assert_eq!(result["files"][0]["isDirectory"], true);
        assert_eq!(result["files"][2]["size"], 5);
    }

    #[tokio::test]
    async fn get_files_descends_into_subdirectory() {
        let dir = fixture();
        std::fs::write(dir.path().join("zdir").join("inner.txt"), "x").unwrap();
        let result = GetFilesHandler::new(bases(dir.path()))
            .execute(json!({"base": "documents", "path": "zdir"}))
            .await
            .unwrap();
        assert_eq!(result["files"][0]["name"], "inner.txt");
    }

    #[tokio::test]
    async fn get_files_refuses_escaping_base() {
        let dir = fixture();
        let handler = GetFilesHandler::new(bases(dir.path()));
        let err = handler
            .execute(json!({"base": "documents", "path": ".."}))
            .await
            .unwrap_err();
        assert_matches!(err, CommandError::InvalidParams(_));
        let err = handler
            .execute(json!({"base": "documents", "path": "/"}))
            .await
            .unwrap_err();
        assert_matches!(err, CommandError::InvalidParams(_));
    }

    #[tokio::test]
    async fn get_files_missing_base_path_not_found() {
        let dir = fixture();
        let err = GetFilesHandler::new(bases(dir.path()))
            .execute(json!({"base": "music"}))
            .await
            .unwrap_err();
        assert_matches!(err, CommandError::NotFound(_));
    }

    #[tokio::test]
    async fn file_metadata() {
        let dir = fixture();
        let path = dir.path().join("b.txt");
        let result = GetFileHandler
            .execute(json!({"path": path.to_string_lossy()}))
            .await
            .unwrap();
        assert_eq!(result["name"], "b.txt");
        assert_eq!(result["size"], 5);
        assert_eq!(result["isDirectory"], false);
        assert!(result["modified"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn validate_directory() {
        let dir = fixture();
        let ok = ValidateDirectoryHandler
            .execute(json!({"path": dir.path().to_string_lossy()}))
            .await
            .unwrap();
        assert_eq!(ok["valid"], true);

        let file = dir.path().join("a.txt");
        let not_dir = ValidateDirectoryHandler
            .execute(json!({"path": file.to_string_lossy()}))
            .await
            .unwrap();
        assert_eq!(not_dir["valid"], false);
    }
}
