use anyhow::Context;
use shipwright_core::session::Session;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Fixed namespace UUID for workspace directory keys.
const WORKSPACE_NS: uuid::Uuid = uuid::Uuid::from_bytes([
    0x5a, 0x1b, 0xc0, 0xde, 0x00, 0x00, 0x40, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02,
]);

/// Return the per-user store root: `~/.shipwright/`
/// Windows: `%APPDATA%\shipwright\` (falls back to `%USERPROFILE%\.shipwright\`)
pub fn store_root() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("shipwright")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".shipwright")
    } else {
        PathBuf::from(".shipwright-store")
    }
}

/// Config file inside a store root: `{root}/config.json`
pub fn config_path(root: &Path) -> PathBuf {
    root.join("config.json")
}

/// Deterministic directory key for a session's reusable workspace.
/// Session IDs are caller-controlled, so they never become path segments directly.
pub fn workspace_key(session_id: &str) -> String {
    uuid::Uuid::new_v5(&WORKSPACE_NS, session_id.as_bytes()).to_string()
}

/// Reusable workspace directory: `{root}/workspaces/{workspace_key}`
pub fn workspace_dir(root: &Path, session_id: &str) -> PathBuf {
    root.join("workspaces").join(workspace_key(session_id))
}

/// Session file: `{root}/sessions/{readable prefix}-{workspace_key}.json`
///
/// The prefix is lossy; the key suffix keeps distinct IDs in distinct files.
pub fn session_path(root: &Path, session_id: &str) -> PathBuf {
    root.join("sessions").join(format!(
        "{}-{}.json",
        sanitize_file_name(session_id),
        workspace_key(session_id)
    ))
}

const FILE_PREFIX_LIMIT: usize = 40;

/// Replace anything outside `[A-Za-z0-9_-]` so IDs can't escape the directory.
fn sanitize_file_name(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .take(FILE_PREFIX_LIMIT)
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Load a session. Returns None if the file doesn't exist.
pub fn load_session(root: &Path, session_id: &str) -> anyhow::Result<Option<Session>> {
    let path = session_path(root, session_id);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)
        .with_context(|| format!("reading session: {}", path.display()))?;
    let session: Session = serde_json::from_str(&content)
        .with_context(|| format!("parsing session: {}", path.display()))?;
    Ok(Some(session))
}

/// Save a session atomically.
pub fn save_session(root: &Path, session: &Session) -> anyhow::Result<()> {
    let path = session_path(root, &session.id);
    let data = serde_json::to_string_pretty(session)?;
    write_atomic(&path, data.as_bytes())
        .with_context(|| format!("saving session: {}", path.display()))?;
    Ok(())
}

/// Atomic write: write to temp file in same dir, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("no parent dir for {}", path.display()))?;
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_core::session::Message;

    #[test]
    fn store_root_is_not_empty() {
        let root = store_root();
        assert!(!root.as_os_str().is_empty());
    }

    #[test]
    fn workspace_key_is_deterministic() {
        let a = workspace_key("session-1");
        assert_eq!(a, workspace_key("session-1"));
        assert_ne!(a, workspace_key("session-2"));
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn session_path_is_sanitized() {
        let p = session_path(Path::new("/store"), "../../etc/passwd");
        assert_eq!(p.parent().unwrap(), Path::new("/store/sessions"));
        let name = p.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("______etc_passwd-"));
        assert!(name.ends_with(&format!("{}.json", workspace_key("../../etc/passwd"))));
    }

    #[test]
    fn ids_with_equal_prefixes_keep_separate_files() {
        let tmp = tempfile::tempdir().unwrap();
        assert_ne!(
            session_path(tmp.path(), "team/a"),
            session_path(tmp.path(), "team_a")
        );

        let mut slashed = Session::new("team/a");
        slashed.append_turn(Message::user("q", "t0"), Message::assistant("a", "t1"));
        save_session(tmp.path(), &slashed).unwrap();
        assert!(load_session(tmp.path(), "team_a").unwrap().is_none());

        save_session(tmp.path(), &Session::new("team_a")).unwrap();
        let reloaded = load_session(tmp.path(), "team/a").unwrap().unwrap();
        assert_eq!(reloaded.id, "team/a");
        assert_eq!(reloaded.messages.len(), 2);
        assert!(load_session(tmp.path(), "team_a").unwrap().unwrap().messages.is_empty());
    }

    #[test]
    fn load_missing_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_session(tmp.path(), "nope").unwrap().is_none());
    }

    #[test]
    fn save_and_load_session() {
        let tmp = tempfile::tempdir().unwrap();
        let mut session = Session::new("s1");
        session.append_turn(Message::user("q", "t0"), Message::assistant("a", "t1"));
        save_session(tmp.path(), &session).unwrap();

        let loaded = load_session(tmp.path(), "s1").unwrap().unwrap();
        assert_eq!(loaded, session);
    }

    #[test]
    fn corrupt_session_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_atomic(&session_path(tmp.path(), "bad"), b"{not json").unwrap();
        let err = load_session(tmp.path(), "bad").unwrap_err();
        assert!(err.to_string().contains("parsing session"));
    }

    #[test]
    fn write_atomic_creates_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("test.txt");
        write_atomic(&path, b"hello world").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello world");
    }
}
