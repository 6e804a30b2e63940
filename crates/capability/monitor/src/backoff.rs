//! 指数退避（带有界抖动）。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// 退避参数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub min: Duration,
    pub cap: Duration,
    /// 抖动上限，占基础延迟的比例（0.0-1.0）
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(500),
            cap: Duration::from_millis(30_000),
            jitter: 0.2,
        }
    }
}

/// 退避序列：`min * 2^n` 加 `[0, jitter * base]` 抖动，截断到 `cap`。
///
/// 序列单调不减，只有 `reset` 才会回到最小值。
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
    last: Duration,
    rng: StdRng,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self::with_rng(policy, StdRng::from_entropy())
    }

    /// 固定种子，测试可复现。
    pub fn with_seed(policy: BackoffPolicy, seed: u64) -> Self {
        Self::with_rng(policy, StdRng::seed_from_u64(seed))
    }

    fn with_rng(policy: BackoffPolicy, rng: StdRng) -> Self {
        let cap = policy.cap.max(policy.min);
        Self {
            policy: BackoffPolicy {
                cap,
                jitter: policy.jitter.clamp(0.0, 1.0),
                ..policy
            },
            attempt: 0,
            last: Duration::ZERO,
            rng,
        }
    }

    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }

    /// 已连续退避的次数。
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// 最近一次给出的延迟。
    pub fn current(&self) -> Duration {
        self.last
    }

    pub fn next_delay(&mut self) -> Duration {
        let min_ms = self.policy.min.as_millis() as f64;
        let cap_ms = self.policy.cap.as_millis() as f64;
        let factor = 2f64.powi(self.attempt.min(31) as i32);
        let base_ms = (min_ms * factor).min(cap_ms);
        let jitter_ms = if self.policy.jitter > 0.0 {
            base_ms * self.rng.gen_range(0.0..=self.policy.jitter)
        } else {
            0.0
        };
        let delay = Duration::from_millis((base_ms + jitter_ms).min(cap_ms) as u64).max(self.last);

        self.attempt = self.attempt.saturating_add(1);
        self.last = delay;
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last = Duration::ZERO;
    }
}
