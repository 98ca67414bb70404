use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct PaperSortPaths {
    pub home: PathBuf,
    pub cache_file: PathBuf,
    pub logs_dir: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<PaperSortPaths> {
    let home = match env::var("PAPERSORT_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join(".papersort"),
    };
    let cache_file = env_or_default_path("PAPERSORT_CACHE_PATH", home.join("metadata.json"));
    let logs_dir = env_or_default_path("PAPERSORT_LOGS_DIR", home.join("logs"));

    Ok(PaperSortPaths {
        home,
        cache_file,
        logs_dir,
    })
}
