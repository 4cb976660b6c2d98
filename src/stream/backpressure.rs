//! Backpressure accounting
//!
//! Tracks unacknowledged payload bytes per session against high and low
//! watermarks. Crossing the high watermark pauses the pipeline; delivery
//! resumes only once acknowledgments drain the gauge below the low
//! watermark, so a slow consumer flaps at most once per drain cycle.

use std::collections::VecDeque;

use crate::log::LogPosition;

struct InFlight {
    commit_position: LogPosition,
    bytes: usize,
    restart_floor: LogPosition,
}

pub struct BackpressureGauge {
    high_watermark: usize,
    low_watermark: usize,
    unacked_bytes: usize,
    paused: bool,
    in_flight: VecDeque<InFlight>,
}

/// Outcome of applying one acknowledgment to the gauge.
pub struct AckOutcome {
    /// Restart floor recorded with the newest transaction the ack
    /// covers, or `None` when nothing in flight was covered
    pub restart_floor: Option<LogPosition>,
    /// True if the ack drained the gauge below the low watermark while
    /// the session was paused
    pub resumed: bool,
}

impl BackpressureGauge {
    pub fn new(high_watermark: usize, low_watermark: usize) -> Self {
        Self {
            high_watermark,
            low_watermark: low_watermark.min(high_watermark),
            unacked_bytes: 0,
            paused: false,
            in_flight: VecDeque::new(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn unacked_bytes(&self) -> usize {
        self.unacked_bytes
    }

    /// Record one sent transaction. Returns true if this send crossed
    /// the high watermark and paused the session.
    pub fn on_send(
        &mut self,
        commit_position: LogPosition,
        bytes: usize,
        restart_floor: LogPosition,
    ) -> bool {
        self.unacked_bytes += bytes;
        self.in_flight.push_back(InFlight {
            commit_position,
            bytes,
            restart_floor,
        });
        if !self.paused && self.unacked_bytes >= self.high_watermark {
            self.paused = true;
            return true;
        }
        false
    }

    /// Apply a cumulative acknowledgment at `position`.
    ///
    /// Every in-flight transaction at or below `position` is retired.
    /// An ack ahead of everything sent on this connection retires the
    /// whole ledger: a reconnecting consumer's durable watermark may
    /// cover transactions delivered earlier whose acks were lost, and
    /// at-least-once delivery makes that ack legitimate.
    pub fn on_ack(&mut self, position: LogPosition) -> AckOutcome {
        let mut restart_floor = None;
        while self
            .in_flight
            .front()
            .map_or(false, |f| f.commit_position <= position)
        {
            if let Some(done) = self.in_flight.pop_front() {
                self.unacked_bytes = self.unacked_bytes.saturating_sub(done.bytes);
                restart_floor = Some(done.restart_floor);
            }
        }

        let mut resumed = false;
        if self.paused && self.unacked_bytes <= self.low_watermark {
            self.paused = false;
            resumed = true;
        }

        AckOutcome {
            restart_floor,
            resumed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_at_high_resume_at_low() {
        let mut gauge = BackpressureGauge::new(100, 40);

        assert!(!gauge.on_send(LogPosition(10), 60, LogPosition(5)));
        assert!(gauge.on_send(LogPosition(20), 60, LogPosition(15)));
        assert!(gauge.is_paused());

        // Draining to 60 bytes is still above the low watermark
        let out = gauge.on_ack(LogPosition(10));
        assert!(!out.resumed);
        assert!(gauge.is_paused());

        let out = gauge.on_ack(LogPosition(20));
        assert!(out.resumed);
        assert!(!gauge.is_paused());
        assert_eq!(gauge.unacked_bytes(), 0);
    }

    #[test]
    fn test_cumulative_ack_pops_everything_covered() {
        let mut gauge = BackpressureGauge::new(1000, 500);
        gauge.on_send(LogPosition(10), 5, LogPosition(1));
        gauge.on_send(LogPosition(20), 5, LogPosition(12));
        gauge.on_send(LogPosition(30), 5, LogPosition(25));

        let out = gauge.on_ack(LogPosition(20));
        assert_eq!(out.restart_floor, Some(LogPosition(12)));
        assert_eq!(gauge.unacked_bytes(), 5);
    }

    #[test]
    fn test_ack_ahead_of_in_flight_retires_the_whole_ledger() {
        let mut gauge = BackpressureGauge::new(100, 40);
        gauge.on_send(LogPosition(10), 60, LogPosition(1));
        gauge.on_send(LogPosition(20), 60, LogPosition(12));
        assert!(gauge.is_paused());

        // A reconnecting consumer acks its durable watermark, which sits
        // past everything resent so far
        let out = gauge.on_ack(LogPosition(150));
        assert_eq!(out.restart_floor, Some(LogPosition(12)));
        assert!(out.resumed);
        assert_eq!(gauge.unacked_bytes(), 0);
    }

    #[test]
    fn test_ack_covering_nothing_is_a_no_op() {
        let mut gauge = BackpressureGauge::new(100, 40);
        let out = gauge.on_ack(LogPosition(50));
        assert_eq!(out.restart_floor, None);
        assert!(!out.resumed);
    }
}
