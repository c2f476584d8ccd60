use std::time::Duration;

use config::DeliveryConfig;

/// 投递重试策略
///
/// 第 n 次失败后的等待时间取 `schedule[n - 1]`，超出表长的尝试复用最后一个值。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    schedule: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, schedule: Vec<Duration>) -> Self {
        let schedule = if schedule.is_empty() {
            vec![Duration::ZERO]
        } else {
            schedule
        };
        Self {
            max_attempts: max_attempts.max(1),
            schedule,
        }
    }

    /// `attempt` 从 1 开始
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let index = (attempt.max(1) as usize - 1).min(self.schedule.len() - 1);
        self.schedule[index]
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            3,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(5),
                Duration::from_secs(15),
            ],
        )
    }
}

impl From<&DeliveryConfig> for RetryPolicy {
    fn from(config: &DeliveryConfig) -> Self {
        Self::new(config.max_attempts, config.backoff_schedule())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_fixed_schedule_then_reuses_last_value() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(5));
        assert_eq!(policy.delay_for(3), Duration::from_secs(15));
        assert_eq!(policy.delay_for(7), Duration::from_secs(15));
    }

    #[test]
    fn delays_never_decrease() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (1..=6).map(|attempt| policy.delay_for(attempt)).collect();
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn empty_schedule_degrades_to_immediate_retry() {
        let policy = RetryPolicy::new(0, Vec::new());
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay_for(1), Duration::ZERO);
    }
}
