//! Per-session observability counters (§4.11 / C11): ambient instrumentation
//! a session updates as it moves bytes, independent of the wire protocol.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use ahash::HashMap;
use parking_lot::RwLock;

#[derive(Debug, Clone, Copy)]
pub enum Report {
    ReceivedBytes(usize),
    SentBytes(usize),
    ReceivedMessages(usize),
    SentMessages(usize),
    Errors(usize),
}

pub trait Number {
    fn add(&self, value: usize);
    fn get(&self) -> usize;
}

#[derive(Default)]
pub struct Count(AtomicUsize);

impl Number for Count {
    fn add(&self, value: usize) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// Session-independent counters: bytes/messages moved in either direction,
/// plus a running error count.
pub struct Counts<T> {
    pub received_bytes: T,
    pub sent_bytes: T,
    pub received_messages: T,
    pub sent_messages: T,
    pub errors: T,
}

impl<T: Number> Counts<T> {
    pub fn add(&self, report: &Report) {
        match report {
            Report::ReceivedBytes(v) => self.received_bytes.add(*v),
            Report::SentBytes(v) => self.sent_bytes.add(*v),
            Report::ReceivedMessages(v) => self.received_messages.add(*v),
            Report::SentMessages(v) => self.sent_messages.add(*v),
            Report::Errors(v) => self.errors.add(*v),
        }
    }
}

impl Default for Counts<Count> {
    fn default() -> Self {
        Self {
            received_bytes: Count::default(),
            sent_bytes: Count::default(),
            received_messages: Count::default(),
            sent_messages: Count::default(),
            errors: Count::default(),
        }
    }
}

/// Process-wide table of per-session counters, keyed by the session's
/// remote endpoint string. Cloning is cheap (shared handle).
#[derive(Clone, Default)]
pub struct Statistics(Arc<RwLock<HashMap<String, Counts<Count>>>>);

impl Statistics {
    pub fn register(&self, session_key: impl Into<String>) -> StatisticsReporter {
        let session_key = session_key.into();
        self.0
            .write()
            .insert(session_key.clone(), Counts::default());

        StatisticsReporter {
            table: self.0.clone(),
            session_key,
        }
    }

    pub fn unregister(&self, session_key: &str) {
        self.0.write().remove(session_key);
    }

    pub fn snapshot(&self, session_key: &str) -> Option<Counts<usize>> {
        self.0.read().get(session_key).map(|counts| Counts {
            received_bytes: counts.received_bytes.get(),
            sent_bytes: counts.sent_bytes.get(),
            received_messages: counts.received_messages.get(),
            sent_messages: counts.sent_messages.get(),
            errors: counts.errors.get(),
        })
    }
}

/// Held by a single session; forwards reports into the shared table under
/// that session's key.
#[derive(Clone)]
pub struct StatisticsReporter {
    table: Arc<RwLock<HashMap<String, Counts<Count>>>>,
    session_key: String,
}

impl Default for StatisticsReporter {
    /// A reporter backed by a throwaway, unshared table. Useful where a
    /// caller (a test, or a transport not yet wired to a process-wide
    /// `Statistics` instance) needs a handle but nobody reads its reports.
    fn default() -> Self {
        Statistics::default().register(String::new())
    }
}

impl StatisticsReporter {
    pub fn report(&self, events: &[Report]) {
        if let Some(counts) = self.table.read().get(&self.session_key) {
            for event in events {
                counts.add(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_accumulate_under_the_registered_key() {
        let statistics = Statistics::default();
        let reporter = statistics.register("127.0.0.1:6502");

        reporter.report(&[Report::ReceivedBytes(10), Report::ReceivedMessages(1)]);
        reporter.report(&[Report::SentBytes(20)]);

        let snapshot = statistics.snapshot("127.0.0.1:6502").unwrap();
        assert_eq!(snapshot.received_bytes, 10);
        assert_eq!(snapshot.sent_bytes, 20);
        assert_eq!(snapshot.received_messages, 1);
    }

    #[test]
    fn unregister_drops_the_session_from_the_table() {
        let statistics = Statistics::default();
        statistics.register("a");
        assert!(statistics.snapshot("a").is_some());

        statistics.unregister("a");
        assert!(statistics.snapshot("a").is_none());
    }
}
