pub mod notifications;
pub mod rate_limiter;
pub mod sensor_subscription;
pub mod session_events;
