use std::time::Duration;

/// Orchestration settings for the build queue.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Number of concurrent build workers (at least 1).
    pub workers: usize,
    /// Capacity of the bounded work queue. A full queue makes `submit` wait.
    pub queue_capacity: usize,
    /// Time-to-live of a job record, counted from creation.
    pub job_ttl: Duration,
    /// Safety tick of the expiry reaper.
    pub reaper_tick: Duration,
    /// How long a status subscription waits for a change before giving up.
    pub subscription_idle_timeout: Duration,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 100,
            job_ttl: Duration::from_secs(30 * 60),
            reaper_tick: Duration::from_secs(60),
            subscription_idle_timeout: Duration::from_secs(30),
        }
    }
}

impl BuildConfig {
    /// Load build settings from environment variables with defaults.
    ///
    /// | Env Var                          | Default |
    /// |----------------------------------|---------|
    /// | `BUILD_WORKERS`                  | `2`     |
    /// | `BUILD_QUEUE_CAPACITY`           | `100`   |
    /// | `JOB_TTL_SECS`                   | `1800`  |
    /// | `REAPER_TICK_SECS`               | `60`    |
    /// | `SUBSCRIPTION_IDLE_TIMEOUT_SECS` | `30`    |
    pub fn from_env() -> Self {
        let workers: usize = std::env::var("BUILD_WORKERS")
            .unwrap_or_else(|_| "2".into())
            .parse()
            .expect("BUILD_WORKERS must be a valid usize");
        assert!(workers >= 1, "BUILD_WORKERS must be at least 1");

        let queue_capacity: usize = std::env::var("BUILD_QUEUE_CAPACITY")
            .unwrap_or_else(|_| "100".into())
            .parse()
            .expect("BUILD_QUEUE_CAPACITY must be a valid usize");
        assert!(queue_capacity >= 1, "BUILD_QUEUE_CAPACITY must be at least 1");

        Self {
            workers,
            queue_capacity,
            job_ttl: secs_from_env("JOB_TTL_SECS", 1800),
            reaper_tick: secs_from_env("REAPER_TICK_SECS", 60),
            subscription_idle_timeout: secs_from_env("SUBSCRIPTION_IDLE_TIMEOUT_SECS", 30),
        }
    }
}

fn secs_from_env(name: &str, default: u64) -> Duration {
    let secs: u64 = match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid u64")),
        Err(_) => default,
    };
    assert!(secs >= 1, "{name} must be at least 1");
    Duration::from_secs(secs)
}
