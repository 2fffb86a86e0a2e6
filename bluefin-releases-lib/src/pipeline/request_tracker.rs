//! Counts of issued and finished work per fan-out stage, rendered into the progress line.

use super::progress::Progress;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use owo_colors::OwoColorize;
use std::sync::Arc;

/// The fan-out stages whose work is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrackedTopic {
    Discovery,
    Details,
    Releases,
}

impl TrackedTopic {
    const ALL: [Self; 3] = [Self::Discovery, Self::Details, Self::Releases];

    const fn noun(self) -> &'static str {
        match self {
            Self::Discovery => "sources",
            Self::Details => "packages",
            Self::Releases => "changelogs",
        }
    }
}

/// How a topic is drawn in the progress line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicStatus {
    Active,

    /// An upstream throttled this stage; drawn in yellow.
    Throttled,

    /// Every issued item finished; drawn in green.
    Done,
}

#[derive(Debug, Default)]
struct Counter {
    issued: AtomicU64,
    finished: AtomicU64,
    throttled: AtomicBool,
}

/// A point-in-time reading of one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reading {
    topic: TrackedTopic,
    issued: u64,
    finished: u64,
    status: TopicStatus,
}

impl Reading {
    fn render(&self, use_colors: bool) -> String {
        let text = format!("{}/{} {}", self.finished, self.issued, self.topic.noun());
        match (use_colors, self.status) {
            (true, TopicStatus::Done) => text.green().to_string(),
            (true, TopicStatus::Throttled) => text.yellow().to_string(),
            _ => text,
        }
    }
}

/// Shared counters for the pipeline's worker pools. Clones update the same counters.
#[derive(Clone)]
pub struct RequestTracker {
    counters: Arc<[Counter; 3]>,
    progress: Arc<dyn Progress>,
}

impl core::fmt::Debug for RequestTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RequestTracker")
            .field("counters", &self.counters)
            .field("progress", &"<dyn Progress>")
            .finish()
    }
}

impl RequestTracker {
    /// Create a tracker and register it as the source of `progress`'s determinate state.
    #[must_use]
    pub fn new(progress: &Arc<dyn Progress>) -> Self {
        let counters: Arc<[Counter; 3]> = Arc::default();

        let shared = Arc::clone(&counters);
        let use_colors = progress.use_colors();
        progress.set_determinate(Box::new(move || summarize(&shared, use_colors)));

        Self {
            counters,
            progress: Arc::clone(progress),
        }
    }

    fn counter(&self, topic: TrackedTopic) -> &Counter {
        &self.counters[topic as usize]
    }

    pub fn println(&self, msg: &str) {
        self.progress.println(msg);
    }

    pub fn add_requests(&self, topic: TrackedTopic, count: u64) {
        let _ = self.counter(topic).issued.fetch_add(count, Ordering::Relaxed);
    }

    pub fn complete_request(&self, topic: TrackedTopic) {
        let _ = self.counter(topic).finished.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark a topic as throttled. `Active` and `Done` clear the mark; completion is derived from the counts.
    pub fn set_topic_status(&self, topic: TrackedTopic, status: TopicStatus) {
        self.counter(topic).throttled.store(status == TopicStatus::Throttled, Ordering::Relaxed);
    }
}

fn read(counters: &[Counter; 3]) -> Vec<Reading> {
    TrackedTopic::ALL
        .into_iter()
        .filter_map(|topic| {
            let counter = &counters[topic as usize];
            let issued = counter.issued.load(Ordering::Relaxed);
            if issued == 0 {
                return None;
            }

            let finished = counter.finished.load(Ordering::Relaxed);
            let status = if counter.throttled.load(Ordering::Relaxed) {
                TopicStatus::Throttled
            } else if finished >= issued {
                TopicStatus::Done
            } else {
                TopicStatus::Active
            };

            Some(Reading {
                topic,
                issued,
                finished,
                status,
            })
        })
        .collect()
}

/// `(total, position, message)` across every topic with issued work.
fn summarize(counters: &[Counter; 3], use_colors: bool) -> (u64, u64, String) {
    let readings = read(counters);
    if readings.is_empty() {
        return (0, 0, "Waiting for upstreams".to_string());
    }

    let total = readings.iter().map(|r| r.issued).sum();
    let position = readings.iter().map(|r| r.finished).sum();
    let message = readings.iter().map(|r| r.render(use_colors)).collect::<Vec<_>>().join(", ");

    (total, position, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::NoProgress;

    fn tracker() -> RequestTracker {
        RequestTracker::new(&(Arc::new(NoProgress) as Arc<dyn Progress>))
    }

    #[test]
    fn test_counts_are_summed() {
        let t = tracker();
        t.add_requests(TrackedTopic::Details, 3);
        t.complete_request(TrackedTopic::Details);

        assert_eq!(summarize(&t.counters, false), (3, 1, "1/3 packages".to_string()));
    }

    #[test]
    fn test_topics_render_in_stage_order() {
        let t = tracker();
        t.add_requests(TrackedTopic::Releases, 1);
        t.add_requests(TrackedTopic::Discovery, 4);
        t.add_requests(TrackedTopic::Details, 2);

        let (total, _, message) = summarize(&t.counters, false);
        assert_eq!(total, 7);
        assert_eq!(message, "0/4 sources, 0/2 packages, 0/1 changelogs");
    }

    #[test]
    fn test_finished_topic_is_green() {
        let t = tracker();
        t.add_requests(TrackedTopic::Releases, 2);
        t.complete_request(TrackedTopic::Releases);
        t.complete_request(TrackedTopic::Releases);

        let (_, _, message) = summarize(&t.counters, true);
        assert!(message.contains("2/2 changelogs"));
        assert!(message.contains("\x1b[32m"));
    }

    #[test]
    fn test_throttled_topic_is_yellow_until_cleared() {
        let t = tracker();
        t.add_requests(TrackedTopic::Details, 4);
        t.set_topic_status(TrackedTopic::Details, TopicStatus::Throttled);

        assert!(summarize(&t.counters, true).2.contains("\x1b[33m"));
        assert_eq!(summarize(&t.counters, false).2, "0/4 packages");

        t.set_topic_status(TrackedTopic::Details, TopicStatus::Active);
        assert!(!summarize(&t.counters, true).2.contains("\x1b[33m"));
    }

    #[test]
    fn test_idle_tracker() {
        assert_eq!(summarize(&tracker().counters, false), (0, 0, "Waiting for upstreams".to_string()));
    }

    #[test]
    fn test_clones_share_counters() {
        let a = tracker();
        a.add_requests(TrackedTopic::Details, 5);
        a.clone().complete_request(TrackedTopic::Details);

        assert_eq!(summarize(&a.counters, false).1, 1);
    }

    #[test]
    fn test_debug_hides_progress() {
        assert!(format!("{:?}", tracker()).contains("<dyn Progress>"));
    }
}
