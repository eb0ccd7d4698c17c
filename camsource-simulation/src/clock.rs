use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camsource_core::error::{Result, SourceError};
use camsource_core::time::{MediaTime, PeriodicAdvise, ReferenceClock, TickSignal};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn check_period(period: MediaTime) -> Result<()> {
    if period <= MediaTime::ZERO {
        return Err(SourceError::InvalidArgument(format!(
            "advise period must be positive, got {:?}",
            period
        )));
    }
    Ok(())
}

#[derive(Debug)]
struct Scheduled {
    signal: Arc<TickSignal>,
    next: MediaTime,
    period: MediaTime,
}

#[derive(Debug, Default)]
struct ManualState {
    now: MediaTime,
    advises: Vec<Scheduled>,
}

impl ManualState {
    /// 为每个越过的周期边界释放一个许可
    fn fire(&mut self) {
        self.advises.retain(|s| !s.signal.is_cancelled());
        let now = self.now;
        for scheduled in &mut self.advises {
            let mut ticks = 0;
            while scheduled.next <= now {
                ticks += 1;
                scheduled.next += scheduled.period;
            }
            scheduled.signal.release(ticks);
        }
    }
}

/// 只在测试代码调用 `advance` 时前进的参考时钟
///
/// 周期订阅是 [`TickSignal`]，时间越过 N 个边界就释放 N 个许可。
/// 适合在另一个线程里驱动被阻塞的拉取。
#[derive(Debug, Default)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn advance(&self, dt: MediaTime) {
        let mut state = lock(&self.state);
        state.now += dt;
        state.fire();
    }

    /// 直接跳到 `now`；不会倒退
    pub fn set(&self, now: MediaTime) {
        let mut state = lock(&self.state);
        state.now = state.now.max(now);
        state.fire();
    }

    /// 尚未取消的周期订阅数
    pub fn active_advises(&self) -> usize {
        lock(&self.state)
            .advises
            .iter()
            .filter(|s| !s.signal.is_cancelled())
            .count()
    }
}

impl ReferenceClock for ManualClock {
    fn now(&self) -> MediaTime {
        lock(&self.state).now
    }

    fn advise_periodic(
        &self,
        start: MediaTime,
        period: MediaTime,
    ) -> Result<Arc<dyn PeriodicAdvise>> {
        check_period(period)?;
        let signal = TickSignal::new();
        let mut state = lock(&self.state);
        state.advises.push(Scheduled {
            signal: Arc::clone(&signal),
            next: start,
            period,
        });
        state.fire();
        Ok(signal)
    }
}

#[derive(Debug, Default)]
struct StepState {
    now: MediaTime,
    /// 下一次 wait 额外消耗的时间
    stall: MediaTime,
}

/// 每次 `wait` 把时间推进到下一个周期边界的参考时钟
///
/// 单线程即可确定性地驱动 Pump：拉取一次，时间前进一个周期。
/// `stall` 模拟消费方卡顿：下一次 wait 额外多走一段时间，之后累积的边界
/// 立即返回，与计数信号量的行为一致。
#[derive(Debug, Default)]
pub struct SteppingClock {
    state: Arc<Mutex<StepState>>,
}

impl SteppingClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stall(&self, extra: MediaTime) {
        lock(&self.state).stall += extra;
    }

    /// 直接跳到 `now`；不会倒退
    pub fn set(&self, now: MediaTime) {
        let mut state = lock(&self.state);
        state.now = state.now.max(now);
    }
}

impl ReferenceClock for SteppingClock {
    fn now(&self) -> MediaTime {
        lock(&self.state).now
    }

    fn advise_periodic(
        &self,
        start: MediaTime,
        period: MediaTime,
    ) -> Result<Arc<dyn PeriodicAdvise>> {
        check_period(period)?;
        Ok(Arc::new(StepAdvise {
            clock: Arc::clone(&self.state),
            next: Mutex::new(start),
            period,
            cancelled: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug)]
struct StepAdvise {
    clock: Arc<Mutex<StepState>>,
    next: Mutex<MediaTime>,
    period: MediaTime,
    cancelled: AtomicBool,
}

impl PeriodicAdvise for StepAdvise {
    fn wait(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        let mut next = lock(&self.next);
        let mut clock = lock(&self.clock);
        let stall = std::mem::take(&mut clock.stall);
        clock.now = clock.now.max(*next) + stall;
        *next += self.period;
        Ok(())
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
