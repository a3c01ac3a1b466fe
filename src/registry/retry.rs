//! Bounded exponential backoff with jitter, for any fallible network call

use crate::{errors::PullError, registry::Outcome};
use rand::{rngs::StdRng, Rng, SeedableRng};
use reqwest::{header::HeaderMap, StatusCode};
use std::{fmt, future::Future, time::Duration};

/// Status codes worth another attempt
///
/// 400 is here because the storage backend behind the default registry's
/// blob redirects sometimes rejects a signed URL that succeeds unchanged on
/// the next try.
pub const RETRYABLE_STATUS: [u16; 4] = [400, 502, 503, 504];

/// Parameters for retrying a request
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Backoff {
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Each delay is this many times the previous one, up to `max_delay`
    pub factor: u32,
    /// Total number of attempts, including the first
    pub max_retries: u32,
    pub max_delay: Duration,
    /// Scale each delay by a random factor in `[0.8, 1.2]`
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            base_delay: Duration::from_secs(1),
            factor: 2,
            max_retries: 5,
            max_delay: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay after a failed attempt (starting at 1), before any jitter
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let scale = self.factor.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(scale)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Is this status worth another attempt? See [RETRYABLE_STATUS]
    pub fn is_retryable(status: StatusCode) -> bool {
        RETRYABLE_STATUS.contains(&status.as_u16())
    }
}

/// Why a single attempt failed
#[derive(Debug)]
pub enum AttemptError {
    /// The server answered with an error status
    Status {
        status: StatusCode,
        url: String,
        headers: HeaderMap,
        body: String,
    },
    /// No usable response at all: connection, TLS, or a broken body
    Transport(reqwest::Error),
}

impl AttemptError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AttemptError::Status { status, .. } => Some(*status),
            AttemptError::Transport(err) => err.status(),
        }
    }

    fn report(&self, what: &str) {
        match self {
            AttemptError::Status {
                status,
                url,
                headers,
                body,
            } => {
                log::warn!(
                    "{} - {} for {} ({})",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("unknown"),
                    url,
                    what
                );
                log::warn!("{:?}", headers);
                log::warn!("{}", body);
            }
            AttemptError::Transport(err) => log::warn!("{} failed: {}", what, err),
        }
    }

    fn into_error(self) -> PullError {
        match self {
            AttemptError::Status { status, url, .. } => PullError::HttpStatus { status, url },
            AttemptError::Transport(err) => PullError::NetworkRequest(err),
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Status { status, url, .. } => write!(f, "{} for {}", status, url),
            AttemptError::Transport(err) => write!(f, "{}", err),
        }
    }
}

/// Runs requests under a [Backoff] policy
///
/// The random source for jitter is a type parameter so it can be replaced
/// with a seeded or fixed generator.
pub struct Retry<R = StdRng> {
    backoff: Backoff,
    rng: R,
}

impl Retry<StdRng> {
    pub fn new(backoff: Backoff) -> Self {
        Retry::with_rng(backoff, StdRng::from_entropy())
    }
}

impl<R: Rng> Retry<R> {
    pub fn with_rng(backoff: Backoff, rng: R) -> Self {
        Retry { backoff, rng }
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Delay after a failed attempt, including jitter if enabled
    pub fn delay_for_attempt(&mut self, attempt: u32) -> Duration {
        let delay = self.backoff.nominal_delay(attempt);
        if self.backoff.jitter {
            delay.mul_f64(self.rng.gen_range(0.8..=1.2))
        } else {
            delay
        }
    }

    /// Run `request` until it succeeds, fails for good, or runs out of
    /// attempts
    ///
    /// Each call to `request` must start a fresh attempt. Statuses outside
    /// [RETRYABLE_STATUS] stop immediately; transport errors are always
    /// retried. There is no sleep after the final attempt.
    pub async fn execute<T, F, Fut>(&mut self, what: &str, mut request: F) -> Outcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let max_retries = self.backoff.max_retries;
        let mut last_error = String::from("no attempts allowed");

        for attempt in 1..=max_retries {
            match request().await {
                Ok(data) => {
                    if attempt > 1 {
                        log::info!("{} succeeded on attempt {}", what, attempt);
                    }
                    return Outcome::Data(data);
                }
                Err(err) => {
                    err.report(what);
                    match err.status() {
                        Some(status) if !Backoff::is_retryable(status) => {
                            return Outcome::Failed(err.into_error());
                        }
                        _ => last_error = err.to_string(),
                    }
                }
            }

            if attempt == max_retries {
                log::warn!("max retries reached, {} failed", what);
                break;
            }

            let delay = self.delay_for_attempt(attempt);
            log::warn!("retrying {} after delay of {:?}", what, delay);
            tokio::time::sleep(delay).await;
        }

        Outcome::Failed(PullError::RetriesExhausted {
            what: what.to_owned(),
            attempts: max_retries,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use std::{cell::RefCell, rc::Rc};
    use tokio::time::Instant;

    fn status_error(code: u16) -> AttemptError {
        AttemptError::Status {
            status: StatusCode::from_u16(code).unwrap(),
            url: "https://registry.test/v2/".to_owned(),
            headers: HeaderMap::new(),
            body: "nope".to_owned(),
        }
    }

    fn no_jitter() -> Backoff {
        Backoff {
            jitter: false,
            ..Backoff::default()
        }
    }

    /// Runs a request that fails with `code` every time, returning the
    /// outcome and the instant of each attempt
    async fn always_failing(retry: &mut Retry<impl Rng>, code: u16) -> (Outcome<()>, Vec<Instant>) {
        let attempts = Rc::new(RefCell::new(Vec::new()));
        let outcome = retry
            .execute("test request", || {
                let attempts = attempts.clone();
                async move {
                    attempts.borrow_mut().push(Instant::now());
                    Err(status_error(code))
                }
            })
            .await;
        let attempts = attempts.borrow().clone();
        (outcome, attempts)
    }

    fn gaps(instants: &[Instant]) -> Vec<Duration> {
        instants.windows(2).map(|w| w[1] - w[0]).collect()
    }

    fn millis(durations: &[Duration]) -> Vec<u128> {
        durations.iter().map(Duration::as_millis).collect()
    }

    #[test]
    fn nominal_delays() {
        let backoff = Backoff::default();
        let delays: Vec<u64> = (1..=6).map(|a| backoff.nominal_delay(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 8, 8]);
        assert_eq!(backoff.nominal_delay(40), Duration::from_secs(8));
    }

    #[test]
    fn retryable_statuses() {
        for code in &[400, 502, 503, 504] {
            assert!(Backoff::is_retryable(StatusCode::from_u16(*code).unwrap()));
        }
        for code in &[401, 403, 404, 429, 500] {
            assert!(!Backoff::is_retryable(StatusCode::from_u16(*code).unwrap()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_exhausted_on_503() {
        let mut retry = Retry::new(no_jitter());
        let (outcome, attempts) = always_failing(&mut retry, 503).await;

        assert_eq!(attempts.len(), 5);
        let gaps = gaps(&attempts);
        assert_eq!(millis(&gaps), vec![1000, 2000, 4000, 8000]);
        assert!(gaps.windows(2).all(|w| w[0] <= w[1]));
        assert!(gaps.iter().all(|gap| *gap <= retry.backoff().max_delay));

        match outcome {
            Outcome::Failed(PullError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 5),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delays_are_capped() {
        let mut retry = Retry::new(Backoff {
            max_retries: 7,
            ..no_jitter()
        });
        let (_, attempts) = always_failing(&mut retry, 502).await;
        assert_eq!(attempts.len(), 7);
        assert_eq!(
            millis(&gaps(&attempts)),
            vec![1000, 2000, 4000, 8000, 8000, 8000]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn no_retry_on_404() {
        let mut retry = Retry::new(Backoff::default());
        let start = Instant::now();
        let (outcome, attempts) = always_failing(&mut retry, 404).await;
        assert_eq!(attempts.len(), 1);
        assert_eq!(Instant::now() - start, Duration::from_secs(0));
        match outcome {
            Outcome::Failed(PullError::HttpStatus { status, .. }) => assert_eq!(status.as_u16(), 404),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stops_retrying_on_success() {
        let mut retry = Retry::new(no_jitter());
        let calls = Rc::new(RefCell::new(0u32));
        let outcome = retry
            .execute("flaky request", || {
                let calls = calls.clone();
                async move {
                    *calls.borrow_mut() += 1;
                    if *calls.borrow() < 3 {
                        Err(status_error(400))
                    } else {
                        Ok("body")
                    }
                }
            })
            .await;
        assert_eq!(outcome.data(), Some("body"));
        assert_eq!(*calls.borrow(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn jitter_stays_in_bounds() {
        let mut retry = Retry::with_rng(Backoff::default(), StdRng::seed_from_u64(0x5eed));
        let (_, attempts) = always_failing(&mut retry, 504).await;
        let nominal = Backoff::default();
        for (i, gap) in gaps(&attempts).into_iter().enumerate() {
            let expected = nominal.nominal_delay(i as u32 + 1);
            assert!(gap >= expected.mul_f64(0.8), "{:?} vs {:?}", gap, expected);
            // the timer rounds deadlines up to the next millisecond
            let slack = Duration::from_millis(1);
            assert!(gap <= expected.mul_f64(1.2) + slack, "{:?} vs {:?}", gap, expected);
        }
    }

    #[test]
    fn jitter_uses_injected_rng() {
        // A generator stuck at zero always draws the low end of the range
        let mut retry = Retry::with_rng(Backoff::default(), StepRng::new(0, 0));
        assert!((retry.delay_for_attempt(1).as_secs_f64() - 0.8).abs() < 1e-6);
        assert!((retry.delay_for_attempt(4).as_secs_f64() - 6.4).abs() < 1e-6);
    }
}
