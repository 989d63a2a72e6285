//! Latest-only request tracking.
//!
//! Each purpose (forecast, place search, locality lookup) owns one tracker.
//! Starting a request supersedes whatever was in flight, and only the ticket
//! of the request currently in flight may apply its result.

/// Handle carried by a spawned request and returned with its result
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket<K> {
    pub generation: u64,
    pub key: K,
}

#[derive(Debug, Clone)]
pub struct LatestOnly<K> {
    next_generation: u64,
    in_flight: Option<Ticket<K>>,
}

impl<K> Default for LatestOnly<K> {
    fn default() -> Self {
        Self {
            next_generation: 0,
            in_flight: None,
        }
    }
}

impl<K: Clone + PartialEq> LatestOnly<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request for `key`, superseding any in flight.
    pub fn begin(&mut self, key: K) -> Ticket<K> {
        self.next_generation += 1;
        let ticket = Ticket {
            generation: self.next_generation,
            key,
        };
        self.in_flight = Some(ticket.clone());
        ticket
    }

    /// Drop the in-flight request without starting another.
    pub fn invalidate(&mut self) {
        self.in_flight = None;
    }

    /// True if `ticket` is current. Clears the in-flight slot when it is.
    pub fn complete(&mut self, ticket: &Ticket<K>) -> bool {
        match &self.in_flight {
            Some(current) if current.generation == ticket.generation => {
                self.in_flight = None;
                true
            }
            _ => false,
        }
    }

    /// Key of the request in flight, if any
    pub fn in_flight(&self) -> Option<&K> {
        self.in_flight.as_ref().map(|t| &t.key)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn idle_has_nothing_in_flight() {
        let tracker: LatestOnly<u32> = LatestOnly::new();
        assert_eq!(tracker.in_flight(), None);
        assert_eq!(tracker.in_flight(), None);
    }

    #[test]
    fn current_ticket_completes() {
        let mut tracker = LatestOnly::new();
        let ticket = tracker.begin("a");
        assert_eq!(tracker.in_flight(), Some(&"a"));
        assert!(tracker.complete(&ticket));
        assert_eq!(tracker.in_flight(), None);
    }

    #[test]
    fn superseded_ticket_is_rejected() {
        let mut tracker = LatestOnly::new();
        let old = tracker.begin("a");
        let new = tracker.begin("b");

        assert!(!tracker.complete(&old));
        assert_eq!(tracker.in_flight(), Some(&"b"));
        assert!(tracker.complete(&new));
    }

    #[test]
    fn same_key_restart_still_supersedes() {
        let mut tracker = LatestOnly::new();
        let first = tracker.begin("a");
        let second = tracker.begin("a");
        assert!(!tracker.complete(&first));
        assert!(tracker.complete(&second));
    }

    #[test]
    fn invalidated_ticket_is_rejected() {
        let mut tracker = LatestOnly::new();
        let ticket = tracker.begin(1);
        tracker.invalidate();
        assert!(!tracker.complete(&ticket));
    }

    #[test]
    fn completed_ticket_cannot_apply_twice() {
        let mut tracker = LatestOnly::new();
        let ticket = tracker.begin(1);
        assert!(tracker.complete(&ticket));
        assert!(!tracker.complete(&ticket));
    }
}
