use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::core::errors::Result;

static BASE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Initialize the global base directory path.
/// If `custom` is provided, uses that path; otherwise defaults to
/// `~/.passrelay`.
pub fn init(custom: Option<&str>) {
    let dir = custom.map(PathBuf::from).unwrap_or_else(default_base_dir);
    let _ = BASE_DIR.set(dir);
}

/// Get the current base directory path.
pub fn base_dir() -> &'static Path {
    BASE_DIR.get_or_init(default_base_dir).as_path()
}

fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".passrelay"))
        .unwrap_or_else(|| PathBuf::from(".passrelay"))
}

/// Ask a yes/no question on stdin; only an explicit `y`/`yes` counts.
pub fn confirm(question: &str) -> Result<bool> {
    print!("  {question} [y/N]: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    let answer = input.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
