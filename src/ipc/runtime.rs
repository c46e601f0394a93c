use anyhow::{Context, Result, anyhow};
use directories::UserDirs;
use std::{fs, path::PathBuf};

pub fn runtime_dir() -> Result<PathBuf> {
    let user = UserDirs::new().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    let dir = user.home_dir().join(".local").join("run");
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    Ok(dir)
}

pub fn socket_path() -> Result<PathBuf> {
    Ok(runtime_dir()?.join("handctl.sock"))
}
