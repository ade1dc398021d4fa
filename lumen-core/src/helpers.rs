use std::time;

/// Seconds from `from` to `to`, negative if `to` is earlier
pub fn seconds_between(from: time::Instant, to: time::Instant) -> f64 {
    if to >= from {
        (to - from).as_secs_f64()
    } else {
        -(from - to).as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_seconds_between() {
        let t0 = time::Instant::now();
        let t1 = t0 + Duration::from_millis(1500);
        assert!((seconds_between(t0, t1) - 1.5).abs() < 1e-9);
        assert!((seconds_between(t1, t0) + 1.5).abs() < 1e-9);
    }
}
