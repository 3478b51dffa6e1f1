use std::collections::VecDeque;

use model::{quat, MotionSample, Quat, Timestamp};

#[derive(Clone, Copy, Debug)]
struct Entry {
    sample: MotionSample,
    timestamp: Timestamp,
    orientation: Quat,
}

/// Bounded FIFO of motion observations for one device.
///
/// Serves two independent metrics: a time-weighted distance average over the
/// whole buffer, and an angular speed over the newest `speed_window` entries.
#[derive(Clone, Debug)]
pub struct MotionHistoryBuffer {
    entries: VecDeque<Entry>,
    capacity: usize,
    speed_window: usize,
    last: Option<(Timestamp, Quat)>,
}

impl MotionHistoryBuffer {
    pub fn new(capacity: usize, speed_window: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            speed_window: speed_window.max(2),
            last: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &MotionSample> + '_ {
        self.entries.iter().map(|e| &e.sample)
    }

    /// Append one observation. The very first one has nothing to diff
    /// against and is stored as zero distance over zero time.
    pub fn record(&mut self, timestamp: Timestamp, orientation: Quat) {
        let sample = match self.last {
            Some((last_ts, last_q)) => MotionSample {
                time_delta_ms: timestamp as i64 - last_ts as i64,
                angular_distance: quat::shortest_arc_angle(last_q, orientation),
            },
            None => MotionSample { time_delta_ms: 0, angular_distance: 0.0 },
        };

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(Entry { sample, timestamp, orientation });

        // always advance, even on a backward jump
        self.last = Some((timestamp, orientation));
    }

    /// Mean of `distance * dt * 100` over samples with nonzero `dt`,
    /// truncated toward zero.
    pub fn sum_distances(&self) -> f32 {
        let mut total = 0.0_f32;
        let mut counted = 0usize;
        for s in self.samples() {
            if s.time_delta_ms != 0 {
                total += s.angular_distance * s.time_delta_ms as f32 * 100.0;
                counted += 1;
            }
        }
        if counted == 0 {
            return 0.0;
        }
        (total / counted as f32).trunc()
    }

    /// Degrees per second across the newest `speed_window` entries.
    ///
    /// Pairs that step backward in time (a sensor reset) contribute neither
    /// angle nor time.
    pub fn approximate_speed(&self) -> f32 {
        let n = self.entries.len().min(self.speed_window);
        if n < 2 {
            return 0.0;
        }
        let window = self.entries.iter().skip(self.entries.len() - n);
        let mut degrees = 0.0_f32;
        let mut elapsed_ms = 0i64;
        for (prev, cur) in window.clone().zip(window.skip(1)) {
            let dt = cur.timestamp as i64 - prev.timestamp as i64;
            if dt <= 0 {
                continue;
            }
            degrees += quat::shortest_arc_angle(prev.orientation, cur.orientation).to_degrees();
            elapsed_ms += dt;
        }
        if elapsed_ms == 0 {
            return 0.0;
        }
        degrees / (elapsed_ms as f32 / 1000.0)
    }
}
