use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Monotonic seconds since the first call in this process.
pub fn high_resolution_seconds() -> f64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_monotonic() {
        let a = high_resolution_seconds();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = high_resolution_seconds();
        assert!(b > a);
    }
}
