use std::time::Duration;

/// Daemon configuration loaded from environment variables.
///
/// All fields have defaults suitable for a small single-host deployment.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8089`).
    pub port: u16,
    /// Maximum jobs running at once (default: `1`).
    pub max_concurrent: usize,
    /// Free-RAM floor below which admission is denied, in MiB (default: `1024`).
    pub min_free_ram_mb: u64,
    /// Process names that pause collection while running.
    pub blocking_processes: Vec<String>,
    /// Command-line regex patterns that pause collection while matching
    /// (`;`-separated because patterns may contain commas).
    pub blocking_cmdline_patterns: Vec<String>,
    /// Interval between resource monitor samples.
    pub monitor_interval: Duration,
    /// Interval between orchestrator ticks.
    pub tick_interval: Duration,
    /// Back-off applied when admission is denied mid-tick.
    pub denied_backoff: Duration,
    /// Retries per job before it is marked failed for good (default: `3`).
    pub max_retries: u32,
    /// Delay before a failed job re-enters the queue.
    pub retry_delay: Duration,
    /// Path of the persisted queue snapshot.
    pub state_file: String,
    /// Path of the job catalog JSON file.
    pub jobs_file: String,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
}

impl DaemonConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                       |
    /// |------------------------------|-------------------------------|
    /// | `HOST`                       | `0.0.0.0`                     |
    /// | `PORT`                       | `8089`                        |
    /// | `MAX_CONCURRENT_JOBS`        | `1`                           |
    /// | `MIN_FREE_RAM_MB`            | `1024`                        |
    /// | `BLOCKING_PROCESSES`         | `ollama,mlx_vlm,llama`        |
    /// | `BLOCKING_CMDLINE_PATTERNS`  | `python\s+.*\bvlm\b`          |
    /// | `MONITOR_INTERVAL_SECS`      | `30`                          |
    /// | `TICK_INTERVAL_SECS`         | `5`                           |
    /// | `DENIED_BACKOFF_SECS`        | `30`                          |
    /// | `MAX_RETRIES`                | `3`                           |
    /// | `RETRY_DELAY_SECS`           | `60`                          |
    /// | `STATE_FILE`                 | `forager_state.json`          |
    /// | `JOBS_FILE`                  | `jobs.json`                   |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                          |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8089".into())
            .parse()
            .expect("PORT must be a valid u16");

        let max_concurrent: usize = std::env::var("MAX_CONCURRENT_JOBS")
            .unwrap_or_else(|_| "1".into())
            .parse()
            .expect("MAX_CONCURRENT_JOBS must be a valid usize");

        let min_free_ram_mb: u64 = std::env::var("MIN_FREE_RAM_MB")
            .unwrap_or_else(|_| "1024".into())
            .parse()
            .expect("MIN_FREE_RAM_MB must be a valid u64");

        let blocking_processes: Vec<String> = std::env::var("BLOCKING_PROCESSES")
            .unwrap_or_else(|_| "ollama,mlx_vlm,llama".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let blocking_cmdline_patterns: Vec<String> =
            std::env::var("BLOCKING_CMDLINE_PATTERNS")
                .unwrap_or_else(|_| r"python\s+.*\bvlm\b".into())
                .split(';')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();

        let state_file =
            std::env::var("STATE_FILE").unwrap_or_else(|_| "forager_state.json".into());
        let jobs_file = std::env::var("JOBS_FILE").unwrap_or_else(|_| "jobs.json".into());

        Self {
            host,
            port,
            max_concurrent,
            min_free_ram_mb,
            blocking_processes,
            blocking_cmdline_patterns,
            monitor_interval: env_duration_secs("MONITOR_INTERVAL_SECS", 30),
            tick_interval: env_duration_secs("TICK_INTERVAL_SECS", 5),
            denied_backoff: env_duration_secs("DENIED_BACKOFF_SECS", 30),
            max_retries: std::env::var("MAX_RETRIES")
                .unwrap_or_else(|_| "3".into())
                .parse()
                .expect("MAX_RETRIES must be a valid u32"),
            retry_delay: env_duration_secs("RETRY_DELAY_SECS", 60),
            state_file,
            jobs_file,
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".into())
                .parse()
                .expect("REQUEST_TIMEOUT_SECS must be a valid u64"),
        }
    }

    /// The free-RAM floor in bytes.
    pub fn min_free_ram_bytes(&self) -> u64 {
        self.min_free_ram_mb * 1024 * 1024
    }
}

fn env_duration_secs(var: &str, default: u64) -> Duration {
    let secs: u64 = std::env::var(var)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or_else(|_| panic!("{var} must be a valid u64"));
    Duration::from_secs(secs)
}
