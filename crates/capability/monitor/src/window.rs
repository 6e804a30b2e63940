use std::collections::VecDeque;

/// 最近 N 次读取结果的滚动窗口。
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    outcomes: VecDeque<bool>,
    successes: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            outcomes: VecDeque::with_capacity(capacity),
            successes: 0,
        }
    }

    pub fn push(&mut self, success: bool) {
        if self.outcomes.len() == self.capacity {
            if let Some(true) = self.outcomes.pop_front() {
                self.successes -= 1;
            }
        }
        self.outcomes.push_back(success);
        if success {
            self.successes += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// 窗口为空时为 None。
    pub fn success_rate(&self) -> Option<f64> {
        if self.outcomes.is_empty() {
            None
        } else {
            Some(self.successes as f64 / self.outcomes.len() as f64)
        }
    }
}
