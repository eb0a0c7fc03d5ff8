use anyhow::{Result, anyhow};
use directories::UserDirs;
use std::{fs, path::PathBuf};

pub fn runtime_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("could not determine home directory"))?;
    let dir = dirs.home_dir().join(".local").join("run");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn socket_path() -> Result<PathBuf> {
    Ok(runtime_dir()?.join("handctl.sock"))
}
