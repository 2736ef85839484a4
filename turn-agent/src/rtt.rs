use std::time::Duration;

/// Default initial retransmission timeout
pub const DEFAULT_RTO: Duration = Duration::from_millis(500);
/// Default number of transmissions of a request
pub const DEFAULT_RC: u32 = 7;
/// Default multiplier of the RTO applied to the last wait
pub const DEFAULT_RM: u32 = 16;
/// Default upper bound of the doubled RTO
pub const DEFAULT_MAX_RTO: Duration = Duration::from_secs(16);

/// Retransmission parameters of a STUN transaction,
/// [`RFC5389`](https://datatracker.ietf.org/doc/html/rfc5389#section-7.2.1).
///
/// A request is sent `rc` times. The first wait is `rto`, every following
/// wait doubles the previous one up to `max_rto`, and after the last
/// transmission the client waits `rm` times `rto` before giving up.
/// With the default values, the waits are 500, 1000, 2000, 4000, 8000,
/// 16000 and 8000 ms, that is 39.5 seconds in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RttConfig {
    /// Initial retransmission timeout
    pub rto: Duration,
    /// Number of transmissions
    pub rc: u32,
    /// Multiplier of `rto` used for the last wait
    pub rm: u32,
    /// Cap applied to the doubled timeout
    pub max_rto: Duration,
}

impl Default for RttConfig {
    fn default() -> Self {
        Self {
            rto: DEFAULT_RTO,
            rc: DEFAULT_RC,
            rm: DEFAULT_RM,
            max_rto: DEFAULT_MAX_RTO,
        }
    }
}

impl RttConfig {
    /// Checks that none of the parameters is zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.rto.is_zero() {
            return Err(String::from("RTO must be greater than zero"));
        }
        if self.rc == 0 {
            return Err(String::from("Rc must be greater than zero"));
        }
        if self.rm == 0 {
            return Err(String::from("Rm must be greater than zero"));
        }
        if self.max_rto < self.rto {
            return Err(String::from("Max. RTO can not be lower than RTO"));
        }
        Ok(())
    }

    /// Total time a transaction waits for a response before failing. This is
    /// also the single wait applied on reliable transports.
    pub fn transaction_timeout(&self) -> Duration {
        let mut timer = RetransmissionTimer::unreliable(self);
        let mut total = Duration::ZERO;
        while let Some(rto) = timer.next_rto() {
            total += rto;
        }
        total
    }
}

/// Yields the wait that follows each transmission of a request, `None`
/// once the transaction has to fail.
#[derive(Debug, Clone)]
pub struct RetransmissionTimer {
    next: Duration,
    max_rto: Duration,
    last: Duration,
    remaining: u32,
}

impl RetransmissionTimer {
    pub fn new(config: &RttConfig, reliable: bool) -> Self {
        if reliable {
            Self {
                next: Duration::ZERO,
                max_rto: Duration::ZERO,
                last: config.transaction_timeout(),
                remaining: 1,
            }
        } else {
            Self::unreliable(config)
        }
    }

    fn unreliable(config: &RttConfig) -> Self {
        Self {
            next: config.rto,
            max_rto: config.max_rto,
            last: config.rto.saturating_mul(config.rm),
            remaining: config.rc,
        }
    }

    pub fn next_rto(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }

        let rto = if self.remaining == 1 {
            self.last
        } else {
            let rto = self.next;
            self.next = std::cmp::min(self.next.saturating_mul(2), self.max_rto);
            rto
        };
        self.remaining -= 1;

        Some(rto)
    }
}
