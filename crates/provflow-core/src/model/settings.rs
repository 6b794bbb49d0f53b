use serde::{Deserialize, Serialize};
use std::time::Duration;

/// オーケストレーター設定（`settings` ブロック）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSettings {
    /// 独立したリソースを並行実行するワーカー数の上限
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// 準備完了ポーリング間隔（秒）
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// 実行全体の期限（秒）
    #[serde(default)]
    pub run_deadline_secs: Option<u64>,
    /// 一時的なプロバイダーエラーのリトライ設定
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_max_parallel() -> usize {
    4
}
fn default_poll_interval() -> u64 {
    5
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            poll_interval_secs: default_poll_interval(),
            run_deadline_secs: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl PlanSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_secs.map(Duration::from_secs)
    }
}

/// リトライ設定（exponential backoff）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 最大試行回数（初回を含む）
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 初期待機時間（ミリ秒）
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    /// 最大待機時間（ミリ秒）
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Exponential倍率
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    1000 // 1秒
}
fn default_max_delay() -> u64 {
    30000 // 30秒
}
fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// 指定回数目の待機時間を計算
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        Duration::from_millis((delay as u64).min(self.max_delay_ms))
    }
}
