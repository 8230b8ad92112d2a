//! Job model and pending-job priority queue.

use std::collections::{BTreeSet, BinaryHeap};

use chrono::{DateTime, Utc};
use drishti_core::normalizer::DataSource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for JobPriority {
    fn default() -> Self {
        Self::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal jobs are immutable and live in history.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Submission parameters. Defaults: all analysis types, Yahoo source,
/// two periods, normal priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub company_symbol: String,
    #[serde(default)]
    pub analysis_types: Option<BTreeSet<String>>,
    #[serde(default)]
    pub source: Option<DataSource>,
    #[serde(default)]
    pub periods: Option<u32>,
    #[serde(default)]
    pub priority: Option<JobPriority>,
}

impl JobRequest {
    pub fn new(company_symbol: &str) -> Self {
        Self {
            company_symbol: company_symbol.to_string(),
            analysis_types: None,
            source: None,
            periods: None,
            priority: None,
        }
    }

    pub fn default_analysis_types() -> BTreeSet<String> {
        ["forensic", "risk", "compliance"]
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub company_symbol: String,
    pub analysis_types: BTreeSet<String>,
    pub source: DataSource,
    pub periods: u32,
    pub priority: JobPriority,
    pub status: JobStatus,
    /// 0, 25 (ingested), 75 (forensic done), 100 (scored).
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn from_request(job_id: String, request: &JobRequest) -> Self {
        Self {
            job_id,
            company_symbol: request.company_symbol.clone(),
            analysis_types: request
                .analysis_types
                .clone()
                .unwrap_or_else(JobRequest::default_analysis_types),
            source: request.source.unwrap_or(DataSource::Yahoo),
            periods: request.periods.unwrap_or(2),
            priority: request.priority.unwrap_or_default(),
            status: JobStatus::Pending,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// Cache key over the submission parameters that determine the result.
    pub fn cache_key(&self) -> String {
        let types: Vec<&str> = self.analysis_types.iter().map(String::as_str).collect();
        format!(
            "{}|{}|{}|{}",
            self.company_symbol,
            types.join(","),
            self.source,
            self.periods
        )
    }
}

// ---------------------------------------------------------------------------
// Priority queue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueEntry {
    priority: JobPriority,
    seq: u64,
    job_id: String,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: higher priority first, then FIFO within a level.
        self.priority
            .cmp(&other.priority)
            .then(other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Capacity-bounded priority queue of pending job ids.
#[derive(Debug)]
pub struct JobQueue {
    heap: BinaryHeap<QueueEntry>,
    capacity: usize,
    next_seq: u64,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            capacity,
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    /// False when the queue is at capacity.
    pub fn push(&mut self, job_id: String, priority: JobPriority) -> bool {
        if self.is_full() {
            return false;
        }
        self.heap.push(QueueEntry {
            priority,
            seq: self.next_seq,
            job_id,
        });
        self.next_seq += 1;
        true
    }

    pub fn pop(&mut self) -> Option<String> {
        self.heap.pop().map(|entry| entry.job_id)
    }

    pub fn remove(&mut self, job_id: &str) -> bool {
        let before = self.heap.len();
        let entries: Vec<QueueEntry> = self.heap.drain().collect();
        self.heap = entries
            .into_iter()
            .filter(|entry| entry.job_id != job_id)
            .collect();
        self.heap.len() < before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        let mut queue = JobQueue::new(16);
        queue.push("low".into(), JobPriority::Low);
        queue.push("critical".into(), JobPriority::Critical);
        queue.push("normal".into(), JobPriority::Normal);
        queue.push("high".into(), JobPriority::High);
        assert_eq!(queue.pop(), Some("critical".into()));
        assert_eq!(queue.pop(), Some("high".into()));
        assert_eq!(queue.pop(), Some("normal".into()));
        assert_eq!(queue.pop(), Some("low".into()));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_fifo_within_level() {
        let mut queue = JobQueue::new(16);
        queue.push("first".into(), JobPriority::Normal);
        queue.push("second".into(), JobPriority::Normal);
        queue.push("third".into(), JobPriority::Normal);
        assert_eq!(queue.pop(), Some("first".into()));
        assert_eq!(queue.pop(), Some("second".into()));
        assert_eq!(queue.pop(), Some("third".into()));
    }

    #[test]
    fn test_capacity_bound() {
        let mut queue = JobQueue::new(2);
        assert!(queue.push("a".into(), JobPriority::Normal));
        assert!(queue.push("b".into(), JobPriority::Normal));
        assert!(!queue.push("c".into(), JobPriority::Critical));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_remove() {
        let mut queue = JobQueue::new(8);
        queue.push("a".into(), JobPriority::Normal);
        queue.push("b".into(), JobPriority::High);
        assert!(queue.remove("a"));
        assert!(!queue.remove("a"));
        assert_eq!(queue.pop(), Some("b".into()));
    }

    #[test]
    fn test_job_defaults() {
        let job = Job::from_request("job-1".into(), &JobRequest::new("RELIANCE.NS"));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.source, DataSource::Yahoo);
        assert_eq!(job.periods, 2);
        assert_eq!(job.priority, JobPriority::Normal);
        assert_eq!(job.analysis_types.len(), 3);
    }

    #[test]
    fn test_cache_key_stable_across_type_order() {
        let mut a = JobRequest::new("TCS.NS");
        a.analysis_types = Some(["risk", "forensic"].into_iter().map(String::from).collect());
        let mut b = JobRequest::new("TCS.NS");
        b.analysis_types = Some(["forensic", "risk"].into_iter().map(String::from).collect());
        let job_a = Job::from_request("1".into(), &a);
        let job_b = Job::from_request("2".into(), &b);
        assert_eq!(job_a.cache_key(), job_b.cache_key());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_priority_serde() {
        assert_eq!(
            serde_json::to_string(&JobPriority::Critical).unwrap(),
            "\"CRITICAL\""
        );
        let back: JobPriority = serde_json::from_str("\"LOW\"").unwrap();
        assert_eq!(back, JobPriority::Low);
    }
}
