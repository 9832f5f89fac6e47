//! Bounded per-stream event ring, grounded on the teacher's replay
//! history idiom but keyed per target id instead of held globally
//! (§4.4 "Per-stream policy").

use crate::domain::ExecutionEvent;
use std::collections::VecDeque;

pub struct EventHistoryRing {
    events: VecDeque<ExecutionEvent>,
    max_size: usize,
}

impl EventHistoryRing {
    pub fn new(max_size: usize) -> Self {
        Self { events: VecDeque::with_capacity(max_size.min(1024)), max_size }
    }

    pub fn push(&mut self, event: ExecutionEvent) {
        if self.events.len() >= self.max_size {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn replay(&self) -> impl Iterator<Item = &ExecutionEvent> {
        self.events.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExecutionEventKind;
    use chrono::Utc;

    fn event(task_id: &str) -> ExecutionEvent {
        ExecutionEvent {
            task_id: task_id.to_string(),
            kind: ExecutionEventKind::RouteNode,
            node_type: "log".to_string(),
            route_id: "t1::r1".to_string(),
            status: crate::domain::ExecutionEventStatus::Started,
            message: None,
            result: None,
            error: None,
            duration_ms: None,
            timestamp: Utc::now(),
            process_instance_id: None,
            activity_id: None,
        }
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut ring = EventHistoryRing::new(2);
        ring.push(event("a"));
        ring.push(event("b"));
        ring.push(event("c"));
        let ids: Vec<&str> = ring.replay().map(|e| e.task_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }
}
