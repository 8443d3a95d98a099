use logtap_types::DEFAULT_UNIT;

use crate::{FetchError, LogSource};

/// Number of lines in the fallback sequence
pub const FALLBACK_LEN: usize = 7;

/// Deterministic stand-in for the journal on machines without one.
///
/// Always yields the same startup sequence for the same `max_lines`, so
/// callers can compare it literally.
#[derive(Clone, Debug)]
pub struct FallbackSource {
    unit: String,
}

impl FallbackSource {
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }

    /// The first `min(FALLBACK_LEN, max_lines)` lines of the sequence
    pub fn lines(&self, max_lines: usize) -> Vec<String> {
        let unit = &self.unit;
        let sequence: [String; FALLBACK_LEN] = [
            format!("INFO  --- [{unit}] [main] Starting {unit}"),
            format!("INFO  --- [{unit}] [main] Loaded configuration from defaults"),
            format!("INFO  --- [{unit}] [main] HTTP listener bound on port 8080"),
            format!("INFO  --- [{unit}] [main] Started {unit}"),
            format!("INFO  --- [{unit}] [worker-1] Request dispatcher initialized"),
            format!("DEBUG --- [{unit}] [worker-1] Log request received for {max_lines} lines"),
            format!(
                "INFO  --- [{unit}] [main] Running in a local environment; the system journal is unavailable"
            ),
        ];

        sequence.into_iter().take(max_lines).collect()
    }
}

impl Default for FallbackSource {
    fn default() -> Self {
        Self::new(DEFAULT_UNIT)
    }
}

impl LogSource for FallbackSource {
    async fn fetch(&self, max_lines: usize) -> Result<Vec<String>, FetchError> {
        Ok(self.lines(max_lines))
    }
}
