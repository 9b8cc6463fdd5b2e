//! Flat-file backend
//!
//! Layout:
//!
//! ```text
//! x_users.json                     { "users": [ ... ] }
//! <output>/<handle without @>/<handle>.json
//!                                  { "user_name", "since_id", "post_list" }
//! ```
//!
//! Every write goes to a temporary file in the target directory which is then
//! renamed over the destination, so readers never observe a half-written file.

use async_trait::async_trait;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Result, StorageError};
use crate::storage::Storage;
use crate::types::{bare_handle, Roster, StoredUserFeed, TrackedUser};

pub struct FileStorage {
    roster_path: PathBuf,
    output_folder: PathBuf,
}

impl FileStorage {
    /// Create the backend, making sure the output folder exists
    pub fn new(roster_path: impl Into<PathBuf>, output_folder: impl Into<PathBuf>) -> Result<Self> {
        let output_folder = output_folder.into();
        fs::create_dir_all(&output_folder).map_err(StorageError::Io)?;

        Ok(Self {
            roster_path: roster_path.into(),
            output_folder,
        })
    }

    pub fn roster_path(&self) -> &Path {
        &self.roster_path
    }

    /// Where the stored feed for `user_name` lives
    pub fn feed_path(&self, user_name: &str) -> PathBuf {
        self.output_folder
            .join(bare_handle(user_name))
            .join(format!("{}.json", user_name))
    }

    fn read_roster(&self) -> Result<Roster> {
        read_roster_file(&self.roster_path)
    }
}

/// Read a roster file from disk
pub fn read_roster_file(path: &Path) -> Result<Roster> {
    let content = fs::read_to_string(path).map_err(StorageError::Io)?;
    let roster: Roster = serde_json::from_str(&content).map_err(StorageError::Json)?;
    Ok(roster)
}

/// Serialize with four-space indentation, matching hand-edited roster files
fn to_json_pretty<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut serializer)
        .map_err(StorageError::Json)?;
    Ok(buf)
}

/// Mode for files that did not exist before, before the umask applies
#[cfg(unix)]
const NEW_FILE_MODE: u32 = 0o644;

fn new_temp_file(dir: &Path) -> Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(NEW_FILE_MODE));
    }
    let tmp = builder.tempfile_in(dir).map_err(StorageError::Io)?;
    Ok(tmp)
}

/// Replace `target` with `content` via a temporary file in the same directory
fn write_atomic(target: &Path, content: &[u8]) -> Result<()> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(StorageError::Io)?;

    let mut tmp = new_temp_file(&dir)?;
    // Keep whatever mode the file being replaced had
    if let Ok(existing) = fs::metadata(target) {
        tmp.as_file()
            .set_permissions(existing.permissions())
            .map_err(StorageError::Io)?;
    }
    tmp.write_all(content).map_err(StorageError::Io)?;
    tmp.flush().map_err(StorageError::Io)?;
    tmp.as_file_mut().sync_all().map_err(StorageError::Io)?;
    tmp.persist(target)
        .map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl Storage for FileStorage {
    fn backend(&self) -> &str {
        "file"
    }

    async fn load_users(&self) -> Result<Vec<TrackedUser>> {
        let roster = self.read_roster()?;
        info!(
            "Loaded {} users from {}",
            roster.users.len(),
            self.roster_path.display()
        );
        Ok(roster.users)
    }

    async fn save_users(&self, users: &[TrackedUser]) -> Result<()> {
        let mut roster = if self.roster_path.exists() {
            self.read_roster()?
        } else {
            Roster::default()
        };
        roster.upsert_all(users);

        write_atomic(&self.roster_path, &to_json_pretty(&roster)?)?;
        info!(
            "Saved {} users to {}",
            users.len(),
            self.roster_path.display()
        );
        Ok(())
    }

    async fn get_feed(&self, user_name: &str) -> Result<Option<StoredUserFeed>> {
        let path = self.feed_path(user_name);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(StorageError::Io)?;
        let feed: StoredUserFeed = serde_json::from_str(&content).map_err(StorageError::Json)?;
        Ok(Some(feed))
    }

    async fn put_feed(&self, feed: &StoredUserFeed) -> Result<()> {
        let path = self.feed_path(&feed.user_name);
        write_atomic(&path, &to_json_pretty(feed)?)?;
        debug!(path = %path.display(), posts = feed.post_list.len(), "Wrote stored feed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Post;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileStorage) {
        let dir = TempDir::new().unwrap();
        let storage =
            FileStorage::new(dir.path().join("x_users.json"), dir.path().join("output")).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_feed_path_strips_leading_at_for_folder_only() {
        let (dir, storage) = setup();
        assert_eq!(
            storage.feed_path("@rustlang"),
            dir.path().join("output").join("rustlang").join("@rustlang.json")
        );
    }

    #[tokio::test]
    async fn test_load_users_reads_roster() {
        let (_dir, storage) = setup();
        fs::write(
            storage.roster_path(),
            r#"{ "users": [
                { "user_name": "@a", "last_refresh": null, "since_id": null },
                { "user_name": "@b", "last_refresh": "2024-05-01T12:00:00", "since_id": "17" }
            ] }"#,
        )
        .unwrap();

        let users = storage.load_users().await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].since_id.as_deref(), Some("17"));
    }

    #[tokio::test]
    async fn test_load_users_missing_roster_is_error() {
        let (_dir, storage) = setup();
        let err = storage.load_users().await.unwrap_err();
        assert!(err.to_string().contains("IO error"));
    }

    #[tokio::test]
    async fn test_save_users_upserts_and_keeps_unlisted_entries() {
        let (_dir, storage) = setup();
        storage
            .save_users(&[TrackedUser::new("@a"), TrackedUser::new("@b")])
            .await
            .unwrap();

        let mut b = TrackedUser::new("@b");
        b.advance("99".to_string());
        storage
            .save_users(&[b.clone(), TrackedUser::new("@c")])
            .await
            .unwrap();

        let users = storage.load_users().await.unwrap();
        let names: Vec<_> = users.iter().map(|u| u.user_name.as_str()).collect();
        assert_eq!(names, vec!["@a", "@b", "@c"]);
        assert_eq!(users[1], b);
    }

    #[tokio::test]
    async fn test_saved_roster_uses_four_space_indent() {
        let (_dir, storage) = setup();
        storage.save_users(&[TrackedUser::new("@a")]).await.unwrap();

        let content = fs::read_to_string(storage.roster_path()).unwrap();
        assert!(content.contains("\n    \"users\""));
        assert!(content.contains("\"since_id\": null"));
    }

    #[tokio::test]
    async fn test_feed_round_trip_and_missing_feed() {
        let (_dir, storage) = setup();
        assert!(storage.get_feed("@a").await.unwrap().is_none());

        let feed = StoredUserFeed::new(
            "@a",
            "5".to_string(),
            vec![Post(json!({ "id": "5", "text": "hi" }))],
        );
        storage.put_feed(&feed).await.unwrap();

        assert!(storage.feed_path("@a").is_file());
        assert_eq!(storage.get_feed("@a").await.unwrap(), Some(feed));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_save_keeps_existing_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, storage) = setup();
        storage.save_users(&[TrackedUser::new("@a")]).await.unwrap();

        for mode in [0o644, 0o640] {
            fs::set_permissions(storage.roster_path(), fs::Permissions::from_mode(mode)).unwrap();
            storage.save_users(&[TrackedUser::new("@a")]).await.unwrap();

            let after = fs::metadata(storage.roster_path()).unwrap().permissions().mode();
            assert_eq!(after & 0o777, mode);
        }

        let feed = StoredUserFeed::new("@a", "1".to_string(), vec![Post(json!({ "id": "1" }))]);
        storage.put_feed(&feed).await.unwrap();
        let feed_path = storage.feed_path("@a");
        fs::set_permissions(&feed_path, fs::Permissions::from_mode(0o644)).unwrap();
        storage.put_feed(&feed).await.unwrap();
        let after = fs::metadata(&feed_path).unwrap().permissions().mode();
        assert_eq!(after & 0o777, 0o644);
    }

    #[tokio::test]
    async fn test_import_roster_is_noop() {
        let (_dir, storage) = setup();
        let inserted = storage.import_roster(storage.roster_path()).await.unwrap();
        assert_eq!(inserted, 0);
    }
}
