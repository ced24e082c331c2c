//! Per-host politeness delays (SPEC_FULL.md §4.6).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default minimum delay between two downloads to the same host.
pub const DELAY_BETWEEN_DOWNLOADS: Duration = Duration::from_secs(1);

pub struct Politeness {
    delay: Duration,
    last_download: Mutex<HashMap<String, Instant>>,
}

impl Politeness {
    pub fn new(delay: Duration) -> Self {
        Self { delay, last_download: Mutex::new(HashMap::new()) }
    }

    /// `None` means "no host, no delay applies" (e.g. non-download
    /// units like link parsing).
    pub fn ready_at(&self, host: Option<&str>) -> Instant {
        let Some(host) = host else { return Instant::now() };
        match self.last_download.lock().unwrap().get(host) {
            Some(&last) => last + self.delay,
            None => Instant::now(),
        }
    }

    pub fn is_ready(&self, host: Option<&str>) -> bool {
        self.ready_at(host) <= Instant::now()
    }

    pub fn record_download(&self, host: Option<&str>) {
        if let Some(host) = host {
            self.last_download.lock().unwrap().insert(host.to_string(), Instant::now());
        }
    }
}

impl Default for Politeness {
    fn default() -> Self {
        Self::new(DELAY_BETWEEN_DOWNLOADS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_host_with_no_history_is_immediately_ready() {
        let politeness = Politeness::new(Duration::from_secs(1));
        assert!(politeness.is_ready(Some("example.test")));
    }

    #[test]
    fn a_host_just_downloaded_is_not_ready_again_within_the_delay() {
        let politeness = Politeness::new(Duration::from_millis(50));
        politeness.record_download(Some("example.test"));
        assert!(!politeness.is_ready(Some("example.test")));
    }

    #[test]
    fn a_task_with_no_host_is_always_ready() {
        let politeness = Politeness::new(Duration::from_secs(60));
        assert!(politeness.is_ready(None));
    }

    #[test]
    fn different_hosts_are_independent() {
        let politeness = Politeness::new(Duration::from_secs(60));
        politeness.record_download(Some("a.test"));
        assert!(politeness.is_ready(Some("b.test")));
        assert!(!politeness.is_ready(Some("a.test")));
    }
}
