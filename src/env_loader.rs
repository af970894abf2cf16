use std::env;
use std::path::{Path, PathBuf};

/// `.env` locations in load order; the first file that exists wins.
fn dotenv_candidates(
    cwd: Option<&Path>,
    sync_home: Option<&Path>,
    home_dir: Option<&Path>,
) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = cwd.map(|dir| dir.join(".env")).into_iter().collect();
    match (sync_home, home_dir) {
        (Some(base), _) => candidates.push(base.join(".env")),
        (None, Some(home)) => candidates.push(home.join(".config/granola-sync/.env")),
        (None, None) => {}
    }
    candidates
}

/// Provider keys and `GRANOLA_SYNC_*` overrides may live in a `.env` file.
/// Variables already set in the process environment are never replaced.
pub fn load_dotenv() {
    let cwd = env::current_dir().ok();
    let sync_home = env::var_os("GRANOLA_SYNC_HOME").map(PathBuf::from);
    let home = dirs::home_dir();

    let found = dotenv_candidates(cwd.as_deref(), sync_home.as_deref(), home.as_deref())
        .into_iter()
        .find(|path| path.is_file());
    if let Some(path) = found {
        let _ = dotenvy::from_path(&path);
    }
}
