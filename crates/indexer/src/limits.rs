const MAX_INGEST_WORKERS: usize = 64;

/// Upper bound of the default pool size; larger pools mostly add load on the store.
pub const DEFAULT_WORKER_CAP: usize = 4;

pub const WORKERS_ENV: &str = "EMBEDLOAD_WORKERS";

/// `min(4, available parallelism)`.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(DEFAULT_WORKER_CAP)
        .max(1)
}

fn parse_worker_count(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
        .clamp(1, MAX_INGEST_WORKERS)
}

/// Worker count from `EMBEDLOAD_WORKERS`, falling back to [`default_worker_count`].
pub fn worker_count_from_env() -> usize {
    let raw = std::env::var(WORKERS_ENV).ok();
    parse_worker_count(raw.as_deref(), default_worker_count())
}

/// Never spin up more workers than there are batches.
pub fn effective_workers(requested: usize, batches: usize) -> usize {
    requested.clamp(1, MAX_INGEST_WORKERS).min(batches.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_capped_at_four() {
        let n = default_worker_count();
        assert!((1..=DEFAULT_WORKER_CAP).contains(&n));
    }

    #[test]
    fn parse_worker_count_defaults_and_clamps() {
        let default_value = default_worker_count();
        assert_eq!(parse_worker_count(None, default_value), default_value);
        assert_eq!(parse_worker_count(Some(""), default_value), default_value);
        assert_eq!(parse_worker_count(Some("   "), default_value), default_value);
        assert_eq!(parse_worker_count(Some("2"), default_value), 2);
        assert_eq!(parse_worker_count(Some("0"), default_value), 1);
        assert_eq!(
            parse_worker_count(Some("999"), default_value),
            MAX_INGEST_WORKERS
        );
        assert_eq!(parse_worker_count(Some("abc"), default_value), default_value);
        assert_eq!(parse_worker_count(Some(" 5 "), default_value), 5);
    }

    #[test]
    fn effective_workers_is_bounded_by_batches() {
        assert_eq!(effective_workers(4, 2), 2);
        assert_eq!(effective_workers(4, 0), 1);
        assert_eq!(effective_workers(0, 10), 1);
        assert_eq!(effective_workers(3, 10), 3);
    }
}
