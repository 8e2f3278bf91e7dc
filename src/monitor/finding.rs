use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum FindingSeverity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FindingType {
    Exploit,
    Suspicious,
    Degraded,
    Info,
}

/// Alert record handed to the findings feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub name: String,
    pub description: String,
    pub alert_id: String,
    pub severity: FindingSeverity,
    #[serde(rename = "type")]
    pub finding_type: FindingType,
    pub metadata: BTreeMap<String, String>,
}

impl Finding {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        alert_id: impl Into<String>,
        severity: FindingSeverity,
        finding_type: FindingType,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            alert_id: alert_id.into(),
            severity,
            finding_type,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }
}

/// Process-lifetime cap on emitted findings. Never reset.
#[derive(Debug)]
pub struct FindingCounter {
    emitted: AtomicUsize,
    cap: usize,
}

impl FindingCounter {
    pub fn new(cap: usize) -> Self {
        Self {
            emitted: AtomicUsize::new(0),
            cap,
        }
    }

    /// Claims a slot for one finding; `false` once the cap is reached.
    pub fn try_acquire(&self) -> bool {
        self.emitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.cap).then_some(n + 1)
            })
            .is_ok()
    }

    pub fn is_exhausted(&self) -> bool {
        self.emitted.load(Ordering::Acquire) >= self.cap
    }

    pub fn emitted(&self) -> usize {
        self.emitted.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counter_stops_at_cap() {
        let counter = FindingCounter::new(5);

        let granted = (0..100).filter(|_| counter.try_acquire()).count();

        assert_eq!(granted, 5);
        assert_eq!(counter.emitted(), 5);
        assert!(counter.is_exhausted());
    }

    #[test]
    fn test_counter_is_shared_across_threads() {
        let counter = Arc::new(FindingCounter::new(5));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || (0..50).filter(|_| counter.try_acquire()).count())
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(granted, 5);
    }

    #[test]
    fn test_finding_serializes_with_feed_field_names() {
        let finding = Finding::new(
            "High Gas Used",
            "Gas Used: 4000000",
            "FORTA-1",
            FindingSeverity::High,
            FindingType::Suspicious,
        )
        .with_metadata("gas_used", 4_000_000u64);

        let json = serde_json::to_value(&finding).unwrap();

        assert_eq!(json["alertId"], "FORTA-1");
        assert_eq!(json["type"], "Suspicious");
        assert_eq!(json["severity"], "High");
        assert_eq!(json["metadata"]["gas_used"], "4000000");
    }
}
