use std::{env, str::FromStr, time::Duration};

// Runtime/server settings read from the environment (after `.env` is loaded).

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

pub fn http_port() -> u16 {
    env_or("TWIN_SERVER_PORT", 3001)
}

// Also the physics time step.
pub fn tick_interval() -> Duration {
    Duration::from_millis(env_or("TICK_INTERVAL_MS", 100))
}

// Per-channel telemetry history capacity.
pub fn buffer_capacity() -> usize {
    env_or("BUFFER_CAPACITY", crate::domain::telemetry::DEFAULT_CAPACITY)
}

// Unset means a fresh random seed per run.
pub fn noise_seed() -> Option<u64> {
    env::var("NOISE_SEED").ok().and_then(|v| v.trim().parse().ok())
}

pub fn subscriber_queue_depth() -> usize {
    env_or("SUBSCRIBER_QUEUE_DEPTH", 32)
}

pub fn event_channel_capacity() -> usize {
    env_or("EVENT_CHANNEL_CAPACITY", 1024)
}

pub fn gravity_y() -> f64 {
    env_or("GRAVITY_Y", -9.81)
}

pub fn demo_scene() -> bool {
    match env::var("DEMO_SCENE") {
        Ok(v) => !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"),
        Err(_) => true,
    }
}

/// Rejects settings the runtime cannot operate with.
pub fn validate(
    tick_interval: Duration,
    buffer_capacity: usize,
    queue_depth: usize,
    event_channel_capacity: usize,
) -> std::io::Result<()> {
    let invalid = |msg: &str| std::io::Error::new(std::io::ErrorKind::InvalidInput, msg);
    if tick_interval.is_zero() {
        return Err(invalid("TICK_INTERVAL_MS must be > 0"));
    }
    if buffer_capacity == 0 {
        return Err(invalid("BUFFER_CAPACITY must be > 0"));
    }
    if queue_depth == 0 {
        return Err(invalid("SUBSCRIBER_QUEUE_DEPTH must be > 0"));
    }
    if event_channel_capacity == 0 {
        return Err(invalid("EVENT_CHANNEL_CAPACITY must be > 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_are_rejected() {
        let ok = Duration::from_millis(100);
        assert!(validate(ok, 500, 32, 1024).is_ok());
        assert!(validate(Duration::ZERO, 500, 32, 1024).is_err());
        assert!(validate(ok, 0, 32, 1024).is_err());
        assert!(validate(ok, 500, 0, 1024).is_err());
        assert!(validate(ok, 500, 32, 0).is_err());
    }
}
