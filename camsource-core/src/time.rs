use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Result, SourceError};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// 参考时间，单位 100ns (与 DirectShow REFERENCE_TIME 一致)
///
/// 有符号：减去 Stream Offset 之后可能为负，负值的样本不会被投递。
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
#[repr(transparent)]
pub struct MediaTime(pub i64);

impl MediaTime {
    /// 每秒的单位数
    pub const UNITS: i64 = 10_000_000;
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(i64::MAX);

    pub const fn from_units(units: i64) -> Self {
        Self(units)
    }

    pub const fn units(self) -> i64 {
        self.0
    }

    pub const fn from_millis(ms: i64) -> Self {
        Self(ms * 10_000)
    }

    pub fn from_duration(d: Duration) -> Self {
        Self(i64::try_from(d.as_nanos() / 100).unwrap_or(i64::MAX))
    }

    /// 负值按 0 处理
    pub fn to_duration(self) -> Duration {
        if self.0 <= 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.0 as u64 * 100)
        }
    }

    /// 帧率 -> 每帧时长；fps 非正时返回 None
    pub fn per_frame(fps: f64) -> Option<Self> {
        if fps > 0.0 && fps.is_finite() {
            Some(Self((Self::UNITS as f64 / fps).round() as i64))
        } else {
            None
        }
    }

    /// 每帧时长 -> 帧率
    pub fn as_fps(self) -> f64 {
        if self.0 > 0 {
            Self::UNITS as f64 / self.0 as f64
        } else {
            0.0
        }
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / Self::UNITS as f64
    }

    /// 从 `origin` 到现在经过的参考时间
    pub fn since(origin: Instant) -> Self {
        Self::from_duration(origin.elapsed())
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn clamp(self, min: Self, max: Self) -> Self {
        Self(self.0.clamp(min.0, max.0))
    }
}

impl fmt::Debug for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MediaTime({:.4}s)", self.as_secs_f64())
    }
}

impl Add for MediaTime {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for MediaTime {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Mul<i64> for MediaTime {
    type Output = Self;
    fn mul(self, rhs: i64) -> Self {
        Self(self.0.saturating_mul(rhs))
    }
}

impl AddAssign for MediaTime {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for MediaTime {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

/// 参考时钟 (外部协作者)
///
/// Pump 只读取时钟并订阅周期通知，从不推进它。
pub trait ReferenceClock: Send + Sync + fmt::Debug {
    /// 当前参考时间
    fn now(&self) -> MediaTime;

    /// 订阅周期通知：从 `start` 开始，每 `period` 触发一次
    fn advise_periodic(&self, start: MediaTime, period: MediaTime)
        -> Result<Arc<dyn PeriodicAdvise>>;
}

/// 周期通知句柄
pub trait PeriodicAdvise: Send + Sync + fmt::Debug {
    /// 阻塞直到下一次 tick；订阅已取消时返回 `Cancelled`
    fn wait(&self) -> Result<()>;

    /// 取消订阅并唤醒所有等待者，之后不再产生 tick
    fn cancel(&self);

    fn is_cancelled(&self) -> bool;
}

#[derive(Debug, Default)]
struct TickState {
    permits: u64,
    cancelled: bool,
}

/// 计数信号量形式的周期通知
///
/// 生产方 (时钟) 每个 tick `release(1)`，消费方 `wait()` 消耗一个许可。
/// 消费方跟不上时许可会累积，之后的 wait 立即返回。
#[derive(Debug, Default)]
pub struct TickSignal {
    state: Mutex<TickState>,
    cond: Condvar,
}

impl TickSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 释放 `n` 个许可；已取消时忽略
    pub fn release(&self, n: u64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.cancelled || n == 0 {
            return;
        }
        state.permits = state.permits.saturating_add(n);
        self.cond.notify_all();
    }

    /// 当前累积的许可数
    pub fn pending(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .permits
    }

    /// 最多睡眠 `timeout`，期间被取消则提前返回 true
    pub fn sleep_unless_cancelled(&self, timeout: Duration) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.cancelled {
            return true;
        }
        let (state, _) = self
            .cond
            .wait_timeout(state, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        state.cancelled
    }
}

impl PeriodicAdvise for TickSignal {
    fn wait(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if state.cancelled {
                return Err(SourceError::Cancelled);
            }
            if state.permits > 0 {
                state.permits -= 1;
                return Ok(());
            }
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn cancel(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.cancelled = true;
        state.permits = 0;
        self.cond.notify_all();
    }

    fn is_cancelled(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancelled
    }
}

/// 基于单调时钟 (`Instant`) 的参考时钟
///
/// 每个周期订阅由一个独立的定时线程驱动，订阅取消后线程退出。
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl ReferenceClock for SystemClock {
    fn now(&self) -> MediaTime {
        MediaTime::since(self.origin)
    }

    fn advise_periodic(
        &self,
        start: MediaTime,
        period: MediaTime,
    ) -> Result<Arc<dyn PeriodicAdvise>> {
        if period <= MediaTime::ZERO {
            return Err(SourceError::InvalidArgument(format!(
                "advise period must be positive, got {:?}",
                period
            )));
        }

        let signal = TickSignal::new();
        let timer_signal = Arc::clone(&signal);
        let origin = self.origin;

        thread::Builder::new()
            .name("camsource-clock".into())
            .spawn(move || {
                let mut next = start;
                loop {
                    let now = MediaTime::since(origin);
                    if now < next {
                        if timer_signal.sleep_unless_cancelled((next - now).to_duration()) {
                            break;
                        }
                        continue;
                    }
                    if timer_signal.is_cancelled() {
                        break;
                    }
                    timer_signal.release(1);
                    next += period;
                }
                tracing::trace!(target: "camsource::clock", "Periodic advise ended");
            })?;

        Ok(signal)
    }
}
