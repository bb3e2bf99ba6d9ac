//! Bounded most-recent-first alert list.

use sigstream_core::RealtimeAlert;
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 50;

/// Most recent alerts, newest first.
#[derive(Debug, Clone)]
pub struct AlertBuffer {
    capacity: usize,
    alerts: VecDeque<RealtimeAlert>,
}

impl Default for AlertBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl AlertBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            alerts: VecDeque::with_capacity(capacity),
        }
    }

    /// Prepend an alert, dropping the oldest beyond capacity.
    ///
    /// A redelivered id replaces its earlier entry.
    pub fn insert(&mut self, alert: RealtimeAlert) {
        self.alerts.retain(|a| a.id != alert.id);
        self.alerts.push_front(alert);
        self.alerts.truncate(self.capacity);
    }

    /// Replace the entry with the same id in place. No-op if absent.
    pub fn update(&mut self, alert: RealtimeAlert) -> bool {
        match self.alerts.iter_mut().find(|a| a.id == alert.id) {
            Some(slot) => {
                *slot = alert;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.alerts.clear();
    }

    pub fn get(&self, id: &str) -> Option<&RealtimeAlert> {
        self.alerts.iter().find(|a| a.id == id)
    }

    pub fn to_vec(&self) -> Vec<RealtimeAlert> {
        self.alerts.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use sigstream_core::SignalType;

    fn alert(id: usize, price: i64) -> RealtimeAlert {
        let now = Utc::now();
        RealtimeAlert {
            id: format!("a-{id}"),
            user_id: None,
            ticker: "BTCUSDT".to_string(),
            signal_type: SignalType::Buy,
            price: Decimal::from(price),
            timestamp: now,
            timeframe: "1h".to_string(),
            strategy: None,
            source: "webhook".to_string(),
            note: None,
            created_at: now,
        }
    }

    #[test]
    fn test_keeps_most_recent_first() {
        let mut buffer = AlertBuffer::default();
        for i in 1..=60 {
            buffer.insert(alert(i, 1));
        }

        assert_eq!(buffer.len(), 50);
        let ids: Vec<String> = buffer.to_vec().into_iter().map(|a| a.id).collect();
        let expected: Vec<String> = (11..=60).rev().map(|i| format!("a-{i}")).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_update_replaces_in_place() {
        let mut buffer = AlertBuffer::default();
        buffer.insert(alert(1, 1));
        buffer.insert(alert(2, 1));

        assert!(buffer.update(alert(1, 99)));
        assert_eq!(buffer.to_vec()[1].price, Decimal::from(99));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_update_without_insert_is_noop() {
        let mut buffer = AlertBuffer::default();
        buffer.insert(alert(1, 1));
        let before = buffer.to_vec();

        assert!(!buffer.update(alert(7, 5)));
        assert_eq!(buffer.to_vec(), before);
    }

    #[test]
    fn test_redelivered_insert_does_not_duplicate() {
        let mut buffer = AlertBuffer::new(3);
        buffer.insert(alert(1, 1));
        buffer.insert(alert(2, 1));
        buffer.insert(alert(1, 2));

        let ids: Vec<String> = buffer.to_vec().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["a-1", "a-2"]);
    }
}
