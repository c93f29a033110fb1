use std::path::{Path, PathBuf};

/// The filesystem view handed to the first tracee, i.e. the one launched by the sandbox itself.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    guest_rootfs: PathBuf,
    initial_cwd: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            guest_rootfs: PathBuf::from("/"),
            initial_cwd: PathBuf::from("/"),
        }
    }
}

impl Config {
    /// Construct a new configuration.
    pub fn new(guest_rootfs: impl Into<PathBuf>, initial_cwd: impl Into<PathBuf>) -> Self {
        Self {
            guest_rootfs: guest_rootfs.into(),
            initial_cwd: initial_cwd.into(),
        }
    }

    /// Sets the directory that acts as the root of the guest.
    pub fn with_guest_rootfs(mut self, path: impl Into<PathBuf>) -> Self {
        self.guest_rootfs = path.into();
        self
    }

    /// Sets the working directory of the first tracee.
    pub fn with_initial_cwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.initial_cwd = path.into();
        self
    }

    /// Returns the directory that acts as the root of the guest.
    pub fn guest_rootfs(&self) -> &Path {
        &self.guest_rootfs
    }

    /// Returns the working directory of the first tracee.
    pub fn initial_cwd(&self) -> &Path {
        &self.initial_cwd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_host_root() {
        let config = Config::default();

        assert_eq!(config.guest_rootfs(), Path::new("/"));
        assert_eq!(config.initial_cwd(), Path::new("/"));
    }

    #[test]
    fn builder_overrides() {
        let config = Config::default()
            .with_guest_rootfs("/srv/rootfs")
            .with_initial_cwd("/home/user");

        assert_eq!(config, Config::new("/srv/rootfs", "/home/user"));
    }
}
