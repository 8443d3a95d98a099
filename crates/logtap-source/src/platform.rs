/// Host platform, as far as log reading is concerned
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Other(String),
}

impl Platform {
    /// Platform this binary was built for
    pub fn detect() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Map an OS identifier (as in `std::env::consts::OS`) to a platform
    pub fn from_os(os: &str) -> Self {
        if os.to_lowercase().contains("linux") {
            Self::Linux
        } else {
            Self::Other(os.to_string())
        }
    }

    /// Whether `journalctl` can be expected to exist
    pub fn has_journal(&self) -> bool {
        matches!(self, Self::Linux)
    }
}
