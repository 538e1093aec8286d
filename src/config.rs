use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{HolderError, Result};

const MIN_TTL: Duration = Duration::from_nanos(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ttl {
    duration: Duration,
}

impl Ttl {
    pub fn from_millis(millis: f64) -> Result<Self> {
        if millis.is_nan() {
            return Err(HolderError::invalid("ttl must be a number, got NaN"));
        }
        if millis.is_infinite() {
            return Err(HolderError::invalid(format!(
                "ttl must be finite, got {}",
                millis
            )));
        }
        if millis <= 0.0 {
            return Err(HolderError::invalid(format!(
                "ttl must be greater than 0 ms, got {}",
                millis
            )));
        }
        let nanos = (millis * 1_000_000.0).round();
        // nanos is a whole number here, so the cast below 2^64 is exact.
        let duration = if nanos < u64::MAX as f64 {
            Duration::from_nanos(nanos as u64)
        } else {
            Duration::try_from_secs_f64(millis / 1000.0).unwrap_or(Duration::MAX)
        };
        Ok(Ttl {
            duration: duration.max(MIN_TTL),
        })
    }

    pub fn as_duration(&self) -> Duration {
        self.duration
    }

    pub fn as_millis_f64(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

impl FromStr for Ttl {
    type Err = HolderError;

    fn from_str(s: &str) -> Result<Self> {
        let millis = s
            .trim()
            .parse::<f64>()
            .map_err(|_| HolderError::invalid(format!("ttl is not a number: '{}'", s)))?;
        Ttl::from_millis(millis)
    }
}

impl TryFrom<Duration> for Ttl {
    type Error = HolderError;

    fn try_from(duration: Duration) -> Result<Self> {
        if duration.is_zero() {
            return Err(HolderError::invalid("ttl must be greater than 0 ms, got 0"));
        }
        Ok(Ttl { duration })
    }
}

impl From<Ttl> for Duration {
    fn from(ttl: Ttl) -> Self {
        ttl.duration
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.as_millis_f64())
    }
}
