use std::path::{Path, PathBuf};

/// Default home directory for all corevm data
pub const DEFAULT_HOME: &str = "~/.corevm";

/// On-disk layout rooted at the corevm home directory.
#[derive(Debug, Clone)]
pub struct Paths {
    home: PathBuf,
}

impl Paths {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Build from a user supplied location, expanding `~`.
    pub fn from_home(home: &str) -> Self {
        Self::new(shellexpand::tilde(home).as_ref())
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Directory holding one subdirectory per instance
    pub fn run_dir(&self) -> PathBuf {
        self.home.join("run")
    }

    /// Kernel images, laid out as `<channel>/<version>/`
    pub fn image_dir(&self) -> PathBuf {
        self.home.join("images")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = Paths::new("/var/lib/corevm");
        assert_eq!(paths.run_dir(), PathBuf::from("/var/lib/corevm/run"));
        assert_eq!(paths.image_dir(), PathBuf::from("/var/lib/corevm/images"));
    }

    #[test]
    fn test_tilde_expansion() {
        let paths = Paths::from_home(DEFAULT_HOME);
        assert!(!paths.home().to_string_lossy().starts_with('~'));
    }
}
