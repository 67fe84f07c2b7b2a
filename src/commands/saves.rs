//! Save game listing and loading.
//!
//! The server is launched with `--start-server-load-latest`, so loading a
//! save means copying it into the save directory as the newest `.zip` and
//! restarting.

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::ChatCommand;
use crate::errors::CommandError;
use crate::handlers::ChatPlayer;

#[derive(Debug, Clone, Serialize)]
pub struct SaveGameInfo {
    pub name: String,
    pub mtime: DateTime<Utc>,
    pub size: u64,
    pub path: PathBuf,
}

impl SaveGameInfo {
    /// Stat `name` inside `dir`.
    pub fn from_file(dir: &Path, name: &str) -> io::Result<Self> {
        let path = dir.join(name);
        let meta = fs::metadata(&path)?;
        Self::from_metadata(name.to_string(), path, &meta)
    }

    fn from_metadata(name: String, path: PathBuf, meta: &fs::Metadata) -> io::Result<Self> {
        let mtime: DateTime<Utc> = meta.modified()?.into();
        Ok(Self {
            name,
            mtime,
            size: meta.len(),
            path,
        })
    }

    /// One `!savelist` line, ages measured against `now`.
    pub fn describe(&self, now: DateTime<Utc>) -> String {
        format!(
            "{} @ {} ({})",
            self.name,
            format_relative_date(self.mtime, now),
            format_file_size(self.size)
        )
    }
}

/// Regular, non-hidden files in `dir`, newest first. Read fresh on every
/// call. Entries that cannot be stat'ed (removed meanwhile, dangling links)
/// are skipped.
pub fn list_saves(dir: &Path) -> io::Result<Vec<SaveGameInfo>> {
    let mut saves = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        // Stat the real path; the lossy name may not exist on disk.
        let path = entry.path();
        let info = fs::metadata(&path).and_then(|meta| {
            if meta.is_file() {
                SaveGameInfo::from_metadata(name, path.clone(), &meta).map(Some)
            } else {
                Ok(None)
            }
        });
        match info {
            Ok(Some(save)) => saves.push(save),
            Ok(None) => {}
            Err(e) => warn!("Skipping save {}: {}", path.display(), e),
        }
    }
    saves.sort_by(|a, b| b.mtime.cmp(&a.mtime));
    Ok(saves)
}

/// Binary-prefixed size with one decimal: `1536` -> `1.5KiB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 8] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"];
    let mut num = bytes as f64;
    for unit in UNITS {
        if num.abs() < 1024.0 {
            return format!("{:.1}{}B", num, unit);
        }
        num /= 1024.0;
    }
    format!("{:.1}YiB", num)
}

/// Age of `time` relative to `compare`, e.g. `1m30s ago`, `2h0m5s from now`.
pub fn format_relative_date(time: DateTime<Utc>, compare: DateTime<Utc>) -> String {
    let mut diff = (compare - time).num_seconds();
    let mut suffix = " ago";
    if diff < 0 {
        suffix = " from now";
        diff = -diff;
    }
    if diff < 1 {
        return "< 1s".to_string();
    }

    let mut parts = vec![format!("{}s", diff % 60)];
    diff /= 60;
    if diff > 0 {
        parts.push(format!("{}m", diff % 60));
        diff /= 60;
        if diff > 0 {
            parts.push(format!("{}h", diff % 24));
            diff /= 24;
            if diff > 0 {
                parts.push(format!("{}d", diff));
            }
        }
    }
    parts.reverse();
    format!("{}{}", parts.concat(), suffix)
}

/// Plain file names only; anything that could leave the save directory is
/// refused.
fn validate_save_name(name: &str) -> Result<(), CommandError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        return Err(CommandError::InvalidSaveName(name.to_string()));
    }
    Ok(())
}

/// `!savelist` - whisper every save with its age and size.
pub struct ListSavesCommand;

impl ChatCommand for ListSavesCommand {
    fn names(&self) -> &[&'static str] {
        &["savelist"]
    }

    fn run(&self, player: &ChatPlayer, _args: &[&str]) -> Result<(), CommandError> {
        let saves = list_saves(player.supervisor().saves_dir())?;
        let now = Utc::now();
        for save in &saves {
            player.send_message(&save.describe(now));
        }
        Ok(())
    }
}

/// `!saveload <name>` - make `<name>` the newest save and restart onto it.
pub struct LoadSaveCommand;

impl ChatCommand for LoadSaveCommand {
    fn names(&self) -> &[&'static str] {
        &["saveload"]
    }

    fn run(&self, player: &ChatPlayer, args: &[&str]) -> Result<(), CommandError> {
        let name = args
            .first()
            .copied()
            .ok_or(CommandError::MissingArgument("save name"))?;
        validate_save_name(name)?;

        let dir = player.supervisor().saves_dir();
        let save = match SaveGameInfo::from_file(dir, name) {
            Ok(save) => save,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CommandError::SaveNotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if !save.path.is_file() {
            return Err(CommandError::SaveNotFound(name.to_string()));
        }

        let player = player.clone();
        tokio::spawn(async move {
            if let Err(e) = load_save(&player, save).await {
                error!("Loading save for {} failed: {}", player.name(), e);
                player.send_message(&format!("Error during command: {}", e));
            }
        });
        Ok(())
    }
}

async fn load_save(player: &ChatPlayer, save: SaveGameInfo) -> Result<(), CommandError> {
    let supervisor = player.supervisor();
    let stamp = Utc::now().timestamp();
    let tmp = supervisor
        .saves_dir()
        .join(format!("saveload_{}.tmp", stamp));
    let zip = supervisor
        .saves_dir()
        .join(format!("saveload_{}.tmp.zip", stamp));

    player.send_message(&format!("Copying save to {}...", zip.display()));
    tokio::fs::copy(&save.path, &tmp).await?;
    player.send_message("Save copied! Stopping server and reloading...");
    info!("Loading save {} as {}", save.name, zip.display());

    supervisor
        .restart_with(|| async move {
            tokio::fs::rename(&tmp, &zip).await?;
            touch(&zip)?;
            Ok(())
        })
        .await?;
    Ok(())
}

/// Set the modification time of `path` to now.
fn touch(path: &Path) -> io::Result<()> {
    let file = fs::OpenOptions::new().write(true).open(path)?;
    file.set_modified(SystemTime::now())
}
