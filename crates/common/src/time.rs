use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_in_milliseconds() {
        let ms = now_ms();
        assert!(ms > 1_700_000_000_000);
        assert!(now_ms() >= ms);
    }
}
