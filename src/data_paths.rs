//! Purpose: Shared local data-directory resolution helpers.
//! Exports: `default_data_dir`.
//! Role: Keep CLI, server, and API-client path defaults aligned from one source.
//! Invariants: Default data directory remains `~/.talabarteria/data`.

use std::path::PathBuf;

pub fn default_data_dir() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".talabarteria").join("data")
}

#[cfg(test)]
mod tests {
    use super::default_data_dir;

    #[test]
    fn default_dir_is_under_dot_talabarteria() {
        let dir = default_data_dir();
        assert!(dir.ends_with(".talabarteria/data"));
    }
}
