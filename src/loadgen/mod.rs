//! HTTP load generator
//!
//! `users` virtual users are spawned at `spawn_rate` per second. Each one
//! loops: sleep an exponentially distributed think time, then `GET` the
//! target. Everything stops at the run-time deadline; a request still in
//! flight at that moment is abandoned and not counted.

use anyhow::{Context, Result, anyhow, bail};
use rand::Rng;
use reqwest::Url;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::utils::ScaleLabError;
use crate::utils::interrupt;

/// Mean think time between a user's requests
pub const DEFAULT_THINK_TIME: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct LoadTestConfig {
    pub target: String,
    pub users: u32,
    /// Users started per second
    pub spawn_rate: f64,
    pub run_time: Duration,
    pub mean_think_time: Duration,
    pub request_timeout: Duration,
}

impl LoadTestConfig {
    pub fn new(target: impl Into<String>, users: u32, spawn_rate: f64, run_time: Duration) -> Self {
        Self {
            target: target.into(),
            users,
            spawn_rate,
            run_time,
            mean_think_time: DEFAULT_THINK_TIME,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Time between two user starts
    fn spawn_interval(&self) -> Result<Duration> {
        if self.spawn_rate.is_nan() || self.spawn_rate <= 0.0 {
            bail!("Spawn rate must be positive, got {}", self.spawn_rate);
        }
        Duration::try_from_secs_f64(1.0 / self.spawn_rate)
            .map_err(|_| anyhow!("Spawn rate {} is too small", self.spawn_rate))
    }

    fn validate(&self) -> Result<(Url, Duration)> {
        if self.users == 0 {
            bail!("Load test needs at least one user");
        }
        let spawn_interval = self.spawn_interval()?;
        let url = Url::parse(&self.target)
            .with_context(|| format!("Invalid target URL: {}", self.target))?;
        Ok((url, spawn_interval))
    }
}

/// Totals collected over a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadTestReport {
    pub requests: u64,
    pub failures: u64,
    pub mean_latency: Duration,
    pub max_latency: Duration,
    pub elapsed: Duration,
}

impl LoadTestReport {
    pub fn requests_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.requests as f64 / secs
        } else {
            0.0
        }
    }

    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.failures as f64 / self.requests as f64
        }
    }
}

impl fmt::Display for LoadTestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requests, {} failures ({:.1}%), {:.1} req/s, latency mean {} ms / max {} ms",
            self.requests,
            self.failures,
            self.failure_ratio() * 100.0,
            self.requests_per_second(),
            self.mean_latency.as_millis(),
            self.max_latency.as_millis()
        )
    }
}

#[derive(Default)]
struct Stats {
    requests: AtomicU64,
    failures: AtomicU64,
    total_latency_us: AtomicU64,
    max_latency_us: AtomicU64,
}

impl Stats {
    fn record(&self, latency: Duration, ok: bool) {
        let us = latency.as_micros() as u64;
        self.requests.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_us.fetch_add(us, Ordering::Relaxed);
        self.max_latency_us.fetch_max(us, Ordering::Relaxed);
    }

    fn report(&self, elapsed: Duration) -> LoadTestReport {
        let requests = self.requests.load(Ordering::Relaxed);
        let total = self.total_latency_us.load(Ordering::Relaxed);
        LoadTestReport {
            requests,
            failures: self.failures.load(Ordering::Relaxed),
            mean_latency: Duration::from_micros(total.checked_div(requests).unwrap_or(0)),
            max_latency: Duration::from_micros(self.max_latency_us.load(Ordering::Relaxed)),
            elapsed,
        }
    }
}

/// Exponentially distributed sample with the given mean (inverse transform)
pub fn exponential_think_time<R: Rng + ?Sized>(rng: &mut R, mean: Duration) -> Duration {
    let u: f64 = rng.random();
    Duration::from_secs_f64(-mean.as_secs_f64() * (1.0 - u).ln())
}

async fn user_loop(
    id: u32,
    client: reqwest::Client,
    url: Url,
    mean_think_time: Duration,
    deadline: Instant,
    stats: Arc<Stats>,
) {
    loop {
        let think = exponential_think_time(&mut rand::rng(), mean_think_time);
        let wake = Instant::now() + think;
        if wake >= deadline {
            break;
        }
        tokio::time::sleep_until(wake).await;

        let started = Instant::now();
        match tokio::time::timeout_at(deadline, client.get(url.clone()).send()).await {
            Err(_) => break,
            Ok(Ok(response)) => {
                let ok = response.status().is_success() || response.status().is_redirection();
                if !ok {
                    tracing::debug!(user = id, status = %response.status(), "request failed");
                }
                stats.record(started.elapsed(), ok);
            }
            Ok(Err(e)) => {
                tracing::debug!(user = id, error = %e, "request error");
                stats.record(started.elapsed(), false);
            }
        }
    }
}

/// Run a load test to completion
pub async fn run(config: &LoadTestConfig) -> Result<LoadTestReport> {
    let (url, spawn_interval) = config.validate()?;
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    crate::log_info!(
        "Load test: {} users at {}/s against {} for {}s",
        config.users,
        config.spawn_rate,
        url,
        config.run_time.as_secs()
    );

    let started = Instant::now();
    let deadline = started
        .checked_add(config.run_time)
        .ok_or_else(|| anyhow!("Run time of {}s is too long", config.run_time.as_secs()))?;
    let stats = Arc::new(Stats::default());
    let mut users = JoinSet::new();

    for id in 0..config.users {
        if id > 0 {
            let next = Instant::now().checked_add(spawn_interval).unwrap_or(deadline);
            if next >= deadline {
                crate::log_warn!(
                    "Run time ended while spawning; {} of {} users started",
                    id,
                    config.users
                );
                break;
            }
            tokio::time::sleep_until(next).await;
        }
        users.spawn(user_loop(
            id,
            client.clone(),
            url.clone(),
            config.mean_think_time,
            deadline,
            Arc::clone(&stats),
        ));
    }

    while let Some(joined) = users.join_next().await {
        if let Err(e) = joined {
            crate::log_warn!("Load test user task ended abnormally: {}", e);
        }
    }

    let report = stats.report(started.elapsed());
    crate::log_info!("Load test finished: {}", report);
    Ok(report)
}

/// Run a load test on a dedicated runtime, for synchronous callers.
/// Ctrl-C stops the users and fails the run.
pub fn run_blocking(config: &LoadTestConfig) -> Result<LoadTestReport> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(async {
        tokio::select! {
            report = run(config) => report,
            () = interrupt::wait() => {
                crate::log_warn!("Load test stopped early");
                Err(ScaleLabError::interrupted().into())
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn quick(target: String) -> LoadTestConfig {
        LoadTestConfig {
            mean_think_time: Duration::from_millis(10),
            ..LoadTestConfig::new(target, 3, 100.0, Duration::from_millis(800))
        }
    }

    #[test]
    fn test_think_time_mean() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let total: f64 = (0..n)
            .map(|_| exponential_think_time(&mut rng, DEFAULT_THINK_TIME).as_secs_f64())
            .sum();
        let mean = total / n as f64;
        assert!((mean - 1.0).abs() < 0.05, "mean was {}", mean);
    }

    #[test]
    fn test_rejects_bad_config() {
        let zero_users = LoadTestConfig::new("http://localhost", 0, 1.0, Duration::from_secs(1));
        assert!(tokio_test::block_on(run(&zero_users)).is_err());

        let bad_url = LoadTestConfig::new("not a url", 1, 1.0, Duration::from_secs(1));
        assert!(tokio_test::block_on(run(&bad_url)).is_err());

        let no_rate = LoadTestConfig::new("http://localhost", 1, 0.0, Duration::from_secs(1));
        assert!(tokio_test::block_on(run(&no_rate)).is_err());
    }

    #[test]
    fn test_rejects_unusable_spawn_rate() {
        let tiny = LoadTestConfig::new("http://localhost", 2, 1e-30, Duration::from_millis(10));
        let err = run_blocking(&tiny).unwrap_err();
        assert!(err.to_string().contains("too small"), "{}", err);

        let fast = LoadTestConfig::new("http://localhost", 2, f64::INFINITY, Duration::from_millis(10));
        assert_eq!(fast.spawn_interval().unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_rejects_unbounded_run_time() {
        let forever = LoadTestConfig::new("http://localhost", 1, 1.0, Duration::MAX);
        assert!(tokio_test::block_on(run(&forever)).is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_counts_successful_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let report = run(&quick(server.uri())).await.unwrap();

        assert!(report.requests > 0);
        assert_eq!(report.failures, 0);
        assert!(report.max_latency >= report.mean_latency);
        let received = server.received_requests().await.unwrap();
        assert!(received.len() as u64 >= report.requests);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_counts_server_errors_as_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let report = run(&quick(server.uri())).await.unwrap();

        assert!(report.requests > 0);
        assert_eq!(report.failures, report.requests);
        assert!((report.failure_ratio() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_report_display() {
        let report = LoadTestReport {
            requests: 100,
            failures: 5,
            mean_latency: Duration::from_millis(12),
            max_latency: Duration::from_millis(80),
            elapsed: Duration::from_secs(10),
        };
        let text = report.to_string();
        assert!(text.contains("100 requests"));
        assert!(text.contains("5.0%"));
        assert!(text.contains("10.0 req/s"));
    }
}
