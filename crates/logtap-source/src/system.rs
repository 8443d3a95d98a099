use tracing::{debug, warn};

use crate::{FallbackSource, FetchError, JournalSource, LogSource, Platform};

/// The production log source.
///
/// Reads the journal on Linux and answers with the local fallback sequence
/// everywhere else, or whenever the journal read fails in an expected way.
/// Fallback output is never mixed with partial journal output.
#[derive(Clone, Debug)]
pub struct SystemLogSource {
    journal: JournalSource,
    fallback: FallbackSource,

    /// Fixed platform (None = detect on every fetch)
    platform: Option<Platform>,
}

impl SystemLogSource {
    /// Source for `unit` with the default journal command and timeout
    pub fn new(unit: impl Into<String>) -> Self {
        Self::with_journal(JournalSource::new(unit))
    }

    /// Source around a configured journal reader
    pub fn with_journal(journal: JournalSource) -> Self {
        let fallback = FallbackSource::new(journal.unit());
        Self {
            journal,
            fallback,
            platform: None,
        }
    }

    /// Pretend to run on `platform` instead of detecting it
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub async fn read(&self, max_lines: usize) -> Result<Vec<String>, FetchError> {
        let platform = self.platform.clone().unwrap_or_else(Platform::detect);
        if !platform.has_journal() {
            debug!(?platform, "no journal on this platform, using local fallback");
            return Ok(self.fallback.lines(max_lines));
        }

        match self.journal.read(max_lines).await {
            Ok(lines) => Ok(lines),
            Err(err) if err.falls_back() => {
                warn!(unit = self.journal.unit(), error = %err, "journal read failed, using local fallback");
                Ok(self.fallback.lines(max_lines))
            }
            Err(err) => Err(err),
        }
    }
}

impl LogSource for SystemLogSource {
    async fn fetch(&self, max_lines: usize) -> Result<Vec<String>, FetchError> {
        self.read(max_lines).await
    }
}
