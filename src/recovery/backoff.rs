//! Backoff delay tables.

use std::time::Duration;

/// An ordered table of delays indexed by retry attempt.
///
/// Looking up an attempt past the end of the table reuses the last entry, so a
/// short table describes an open-ended schedule. An empty table means "retry
/// on the next tick" (zero delay).
///
/// Tables are pure data: they describe the schedule but never sleep.
///
/// # Examples
///
/// ```rust
/// use beampromise::recovery::Backoff;
/// use std::time::Duration;
///
/// let backoff = Backoff::from_secs_f32(&[0.1, 0.25, 0.5, 0.75]);
///
/// assert_eq!(backoff.delay_for(0), Duration::from_secs_f32(0.1));
/// assert_eq!(backoff.delay_for(3), Duration::from_secs_f32(0.75));
/// // Past the end: the last delay is reused.
/// assert_eq!(backoff.delay_for(9), Duration::from_secs_f32(0.75));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Backoff {
    delays: Vec<Duration>,
    #[cfg_attr(feature = "serde", serde(default))]
    max_delay: Option<Duration>,
    #[cfg_attr(feature = "serde", serde(default))]
    jitter: JitterStrategy,
}

/// Strategy for adding randomness to delays.
///
/// Jitter only takes effect with the `jitter` feature; without it every
/// strategy returns the table delay unchanged.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JitterStrategy {
    /// No jitter applied.
    #[default]
    None,
    /// Add ±percentage randomness to the delay.
    Proportional(f64),
    /// Random delay between zero and the table delay.
    Full,
}

impl Backoff {
    /// A table with the given delays, in attempt order.
    pub fn from_table(delays: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            delays: delays.into_iter().collect(),
            max_delay: None,
            jitter: JitterStrategy::None,
        }
    }

    /// A table from delays in seconds.
    ///
    /// Negative or non-finite entries become zero.
    pub fn from_secs_f32(secs: &[f32]) -> Self {
        Self::from_table(
            secs.iter()
                .map(|s| Duration::try_from_secs_f32(*s).unwrap_or(Duration::ZERO)),
        )
    }

    /// The same delay before every retry.
    pub fn constant(delay: Duration) -> Self {
        Self::from_table([delay])
    }

    /// `steps` delays growing linearly: base, 2·base, 3·base, ...
    ///
    /// ```rust
    /// use beampromise::recovery::Backoff;
    /// use std::time::Duration;
    ///
    /// let backoff = Backoff::linear(Duration::from_millis(100), 3);
    /// assert_eq!(
    ///     backoff.delays(),
    ///     &[
    ///         Duration::from_millis(100),
    ///         Duration::from_millis(200),
    ///         Duration::from_millis(300),
    ///     ]
    /// );
    /// ```
    pub fn linear(base: Duration, steps: u32) -> Self {
        Self::from_table((0..steps).map(|i| base.saturating_mul(i + 1)))
    }

    /// `steps` delays doubling each time: base, 2·base, 4·base, ...
    ///
    /// ```rust
    /// use beampromise::recovery::Backoff;
    /// use std::time::Duration;
    ///
    /// let backoff = Backoff::exponential(Duration::from_millis(100), 4)
    ///     .with_max_delay(Duration::from_millis(500));
    ///
    /// assert_eq!(backoff.delay_for(2), Duration::from_millis(400));
    /// assert_eq!(backoff.delay_for(3), Duration::from_millis(500)); // capped
    /// ```
    pub fn exponential(base: Duration, steps: u32) -> Self {
        Self::from_table((0..steps).map(|i| base.saturating_mul(2u32.saturating_pow(i))))
    }

    /// `steps` delays following the Fibonacci sequence: base, base, 2·base, 3·base, 5·base, ...
    pub fn fibonacci(base: Duration, steps: u32) -> Self {
        Self::from_table((0..steps).map(|i| base.saturating_mul(fibonacci(i + 1))))
    }

    /// Cap every delay at `max`.
    pub fn with_max_delay(mut self, max: Duration) -> Self {
        self.max_delay = Some(max);
        self
    }

    /// Add proportional jitter; `0.25` means ±25% of each delay.
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter = JitterStrategy::Proportional(factor.clamp(0.0, 1.0));
        self
    }

    /// Use full jitter: each delay becomes a random value up to the table delay.
    pub fn with_full_jitter(mut self) -> Self {
        self.jitter = JitterStrategy::Full;
        self
    }

    /// The delay table.
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// The delay cap, if any.
    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// The jitter strategy.
    pub fn jitter(&self) -> &JitterStrategy {
        &self.jitter
    }

    /// Number of entries in the table.
    pub fn len(&self) -> usize {
        self.delays.len()
    }

    /// Returns true if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }

    /// The delay after attempt `attempt` (0-indexed) fails, before jitter.
    ///
    /// The index is clamped to the last entry and the result to `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = match self.delays.len() {
            0 => Duration::ZERO,
            len => self.delays[(attempt as usize).min(len - 1)],
        };
        match self.max_delay {
            Some(max) => base.min(max),
            None => base,
        }
    }

    /// The delay after attempt `attempt` fails, with jitter applied.
    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        self.jitter.apply(self.delay_for(attempt), self.max_delay)
    }
}

impl JitterStrategy {
    /// Apply jitter to a base delay, then cap it at `max_delay`.
    pub fn apply(&self, base_delay: Duration, max_delay: Option<Duration>) -> Duration {
        let jittered = match self {
            JitterStrategy::None => base_delay,
            #[cfg(feature = "jitter")]
            JitterStrategy::Proportional(factor) => {
                use rand::Rng;
                let base_millis = base_delay.as_millis() as f64;
                let jitter_range = base_millis * factor;
                let min = (base_millis - jitter_range).max(0.0);
                let max = base_millis + jitter_range;
                let jittered_millis = rand::rng().random_range(min..=max);
                Duration::from_millis(jittered_millis as u64)
            }
            #[cfg(not(feature = "jitter"))]
            JitterStrategy::Proportional(_) => base_delay,
            #[cfg(feature = "jitter")]
            JitterStrategy::Full => {
                use rand::Rng;
                let max_millis = base_delay.as_millis() as u64;
                if max_millis == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_millis(rand::rng().random_range(0..=max_millis))
                }
            }
            #[cfg(not(feature = "jitter"))]
            JitterStrategy::Full => base_delay,
        };

        match max_delay {
            Some(max) => jittered.min(max),
            None => jittered,
        }
    }
}

fn fibonacci(n: u32) -> u32 {
    if n == 0 {
        return 0;
    }
    let mut a = 0u32;
    let mut b = 1u32;
    for _ in 1..n {
        let temp = a.saturating_add(b);
        a = b;
        b = temp;
    }
    b
}
