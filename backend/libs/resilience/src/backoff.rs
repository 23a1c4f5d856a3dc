/// Exponential backoff with randomized intervals and an elapsed-time budget
///
/// Each call to [`Backoff::next_delay`] yields the next wait interval. Intervals grow by
/// `multiplier` up to `max_interval` and are spread by `randomization_factor` so that
/// many workers retrying the same dependency do not synchronize. Once the time since
/// [`ExponentialBackoff::start`] exceeds `max_elapsed_time` the backoff stops and the
/// caller should give up.
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// First interval before randomization
    pub initial_interval: Duration,
    /// Growth factor applied after every interval
    pub multiplier: f64,
    /// Spread applied to each interval (0.5 = ±50%, 0.0 = deterministic)
    pub randomization_factor: f64,
    /// Upper bound for a single interval before randomization
    pub max_interval: Duration,
    /// Total time budget; `None` keeps retrying forever
    pub max_elapsed_time: Option<Duration>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_interval: Duration::from_secs(60),
            max_elapsed_time: Some(Duration::from_secs(15 * 60)),
        }
    }
}

impl ExponentialBackoff {
    /// Begin a new retry sequence. The elapsed-time clock starts now.
    pub fn start(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            current: self.initial_interval,
            started: Instant::now(),
            attempts: 0,
        }
    }
}

/// Running state of one retry sequence
#[derive(Debug)]
pub struct Backoff {
    policy: ExponentialBackoff,
    current: Duration,
    started: Instant,
    attempts: u32,
}

impl Backoff {
    /// Delay to wait before the next attempt, or `None` once the elapsed budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(budget) = self.policy.max_elapsed_time {
            if self.started.elapsed() > budget {
                return None;
            }
        }

        let delay = randomize(self.current, self.policy.randomization_factor);
        self.attempts += 1;

        let next = self.current.as_nanos() as f64 * self.policy.multiplier;
        self.current = if next >= self.policy.max_interval.as_nanos() as f64 {
            self.policy.max_interval
        } else {
            Duration::from_nanos(next as u64)
        };

        Some(delay)
    }

    /// Restart the sequence after a success.
    pub fn reset(&mut self) {
        self.current = self.policy.initial_interval;
        self.started = Instant::now();
        self.attempts = 0;
    }

    /// Time spent since the sequence started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Number of delays handed out so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

fn randomize(interval: Duration, factor: f64) -> Duration {
    if factor <= 0.0 {
        return interval;
    }

    let secs = interval.as_secs_f64();
    let delta = factor * secs;
    let low = (secs - delta).max(0.0);
    let high = secs + delta;
    if high <= low {
        return interval;
    }

    let mut rng = rand::thread_rng();
    Duration::from_secs_f64(rng.gen_range(low..=high))
}
