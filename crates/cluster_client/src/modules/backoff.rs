// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::time::Duration;

/// Range of the symmetric jitter relative to the delay; `0.5` yields `[0.75, 1.25]` of it.
const JITTER_FACTOR: f64 = 0.5;

/// Growth of the delay between request retry passes.
///
/// Delays are derived from the retry delay configured on
/// [`RequestRetryLayer`][crate::modules::RequestRetryLayer].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(any(feature = "serde", test), derive(serde::Deserialize))]
#[cfg_attr(any(feature = "serde", test), serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum Backoff {
    /// Same delay before every retry.
    ///
    /// **Example with `2s` retry delay:** `2s, 2s, 2s, ...`
    #[default]
    Constant,

    /// Delay grows by the retry delay with every retry.
    ///
    /// **Example with `2s` retry delay:** `2s, 4s, 6s, ...`
    Linear,

    /// Delay doubles with every retry.
    ///
    /// **Example with `2s` retry delay:** `2s, 4s, 8s, ...`
    Exponential,
}

/// Random source of the jitter; tests pin it to fixed values.
#[derive(Clone, Default)]
pub(crate) enum Rnd {
    #[default]
    Real,

    #[cfg(test)]
    Fixed(f64),
}

impl Rnd {
    fn next_f64(&self) -> f64 {
        match self {
            Self::Real => fastrand::f64(),
            #[cfg(test)]
            Self::Fixed(value) => *value,
        }
    }
}

impl Debug for Rnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real => write!(f, "Real"),
            #[cfg(test)]
            Self::Fixed(value) => write!(f, "Fixed({value})"),
        }
    }
}

/// Computes the wait before each retry pass.
#[derive(Debug, Clone, Default)]
pub(crate) struct RetryBackoff {
    pub(crate) backoff: Backoff,
    pub(crate) base_delay: Duration,
    pub(crate) max_delay: Option<Duration>,
    pub(crate) use_jitter: bool,
    pub(crate) rnd: Rnd,
}

impl RetryBackoff {
    /// Delay before the retry with zero based index `retry`.
    pub(crate) fn delay(&self, retry: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let delay = match self.backoff {
            Backoff::Constant => self.base_delay,
            Backoff::Linear => self.base_delay.saturating_mul(retry.saturating_add(1)),
            Backoff::Exponential => self.base_delay.saturating_mul(2_u32.saturating_pow(retry)),
        };

        let delay = if self.use_jitter { self.jitter(delay) } else { delay };

        self.max_delay.map_or(delay, |max| delay.min(max))
    }

    fn jitter(&self, delay: Duration) -> Duration {
        let secs = delay.as_secs_f64();
        let offset = secs * JITTER_FACTOR / 2.0;
        let jittered = (secs * JITTER_FACTOR).mul_add(self.rnd.next_f64(), secs - offset);

        if jittered <= 0.0 {
            return Duration::ZERO;
        }

        Duration::try_from_secs_f64(jittered).unwrap_or(Duration::MAX)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn backoff(backoff: Backoff, base_delay: Duration) -> RetryBackoff {
        RetryBackoff {
            backoff,
            base_delay,
            ..RetryBackoff::default()
        }
    }

    fn delays(backoff: &RetryBackoff, count: u32) -> Vec<Duration> {
        (0..count).map(|retry| backoff.delay(retry)).collect()
    }

    #[rstest]
    #[case(Backoff::Constant, [100, 100, 100, 100])]
    #[case(Backoff::Linear, [100, 200, 300, 400])]
    #[case(Backoff::Exponential, [100, 200, 400, 800])]
    fn delays_grow_per_backoff(#[case] kind: Backoff, #[case] expected: [u64; 4]) {
        let backoff = backoff(kind, Duration::from_millis(100));

        let expected: Vec<_> = expected.into_iter().map(Duration::from_millis).collect();
        assert_eq!(delays(&backoff, 4), expected);
    }

    #[test]
    fn zero_base_delay_never_waits() {
        let backoff = backoff(Backoff::Exponential, Duration::ZERO);

        assert_eq!(delays(&backoff, 3), vec![Duration::ZERO; 3]);
    }

    #[test]
    fn max_delay_caps_growth() {
        let backoff = RetryBackoff {
            max_delay: Some(Duration::from_millis(500)),
            ..backoff(Backoff::Exponential, Duration::from_millis(100))
        };

        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(500));
        assert_eq!(backoff.delay(40), Duration::from_millis(500));
    }

    #[rstest]
    #[case(0.0, 750)]
    #[case(0.5, 1000)]
    #[case(1.0, 1250)]
    fn jitter_stays_around_delay(#[case] random: f64, #[case] expected_millis: u64) {
        let backoff = RetryBackoff {
            use_jitter: true,
            rnd: Rnd::Fixed(random),
            ..backoff(Backoff::Constant, Duration::from_secs(1))
        };

        let delay = backoff.delay(0);
        let expected = Duration::from_millis(expected_millis);
        let difference = if delay > expected { delay - expected } else { expected - delay };
        assert!(difference < Duration::from_micros(1), "{delay:?}");
    }

    #[test]
    fn real_jitter_is_bounded() {
        let backoff = RetryBackoff {
            use_jitter: true,
            ..backoff(Backoff::Linear, Duration::from_secs(1))
        };

        for _ in 0..100 {
            let delay = backoff.delay(1);
            assert!(delay >= Duration::from_millis(1500) && delay <= Duration::from_millis(2500), "{delay:?}");
        }
    }

    #[test]
    fn deserializes_snake_case() {
        let backoff: Backoff = serde_json::from_str(r#""exponential""#).unwrap();

        assert_eq!(backoff, Backoff::Exponential);
    }
}
