//! 线程亲和的命令执行器
//!
//! 厂商 SDK 要求所有调用都发生在同一个线程上。`CommandSerializer` 持有一个
//! 常驻 Worker 线程，任意线程提交的命令都被搬到这个线程上依次执行，
//! 调用方阻塞到命令完成，拿回命令自己的 `Result`。
//!
//! - 在 Worker 线程内部再次提交 (重入) 时直接内联执行，不会自锁。
//! - 命令内部的 panic 在 Worker 上被捕获，在调用方线程上原样恢复。
//! - `stop()` 之后的提交立即返回 `SerializerStopped`，既不执行也不阻塞。

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use camsource_core::error::{Result, SourceError};
use crossbeam_channel::{bounded, Receiver, Sender};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// 指令：调用方发送给 Worker 的命令
enum Command {
    /// 执行一个任务 (任务自带回执通道)
    Run(Job),
    /// 退出循环
    Shutdown,
}

/// 生命周期：NotStarted → Running → Stopping → Stopped (可再次 start)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializerState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug)]
struct Status {
    state: SerializerState,
    worker_id: Option<ThreadId>,
}

#[derive(Debug)]
struct Shared {
    status: Mutex<Status>,
}

impl Shared {
    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_stopped(&self) {
        let mut status = self.status();
        status.state = SerializerState::Stopped;
        status.worker_id = None;
    }
}

#[derive(Debug)]
struct Worker {
    mailbox: Sender<Command>,
    handle: JoinHandle<()>,
}

/// SDK 亲和线程执行器
#[derive(Debug)]
pub struct CommandSerializer {
    name: String,
    shared: Arc<Shared>,
    /// 提交权：持有期间独占邮箱，直到当前命令完成
    submit: Mutex<Option<Worker>>,
}

impl Default for CommandSerializer {
    fn default() -> Self {
        Self::new("camsource-sdk")
    }
}

impl CommandSerializer {
    /// 创建执行器 (尚未启动)，`name` 为 Worker 线程名
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                status: Mutex::new(Status {
                    state: SerializerState::NotStarted,
                    worker_id: None,
                }),
            }),
            submit: Mutex::new(None),
        }
    }

    /// 创建并立即启动
    pub fn spawn(name: impl Into<String>) -> Result<Arc<Self>> {
        let serializer = Arc::new(Self::new(name));
        serializer.start()?;
        Ok(serializer)
    }

    pub fn state(&self) -> SerializerState {
        self.shared.status().state
    }

    /// 当前线程是否就是 Worker 线程
    pub fn is_worker_thread(&self) -> bool {
        self.shared.status().worker_id == Some(thread::current().id())
    }

    /// 启动 Worker；已在运行时什么也不做
    pub fn start(&self) -> Result<()> {
        let mut slot = self.lock_submit();

        match self.state() {
            SerializerState::Running => return Ok(()),
            SerializerState::Stopping => {
                return Err(SourceError::WrongState("serializer is still stopping"))
            }
            SerializerState::NotStarted | SerializerState::Stopped => {}
        }

        // 上一轮 Worker 已退出，回收句柄
        if let Some(old) = slot.take() {
            let _ = old.handle.join();
        }

        let (mailbox, inbox) = bounded::<Command>(0);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || worker_loop(inbox, shared))?;

        {
            let mut status = self.shared.status();
            status.state = SerializerState::Running;
            status.worker_id = Some(handle.thread().id());
        }
        *slot = Some(Worker { mailbox, handle });

        tracing::debug!(target: "camsource::apartment", "Worker `{}` started", self.name);
        Ok(())
    }

    /// 停止 Worker：拒绝新命令，让当前命令执行完，然后回收线程
    ///
    /// 在 Worker 线程内部调用时只做标记，Worker 在当前命令结束后自行退出。
    pub fn stop(&self) {
        {
            let mut status = self.shared.status();
            if status.state != SerializerState::Running {
                return;
            }
            status.state = SerializerState::Stopping;
        }

        if self.is_worker_thread() {
            tracing::debug!(
                target: "camsource::apartment",
                "Worker `{}` asked to stop from inside a command",
                self.name
            );
            return;
        }

        let mut slot = self.lock_submit();
        if let Some(worker) = slot.take() {
            // Worker 可能已看到 Stopping 自行退出，此时发送失败，忽略即可
            let _ = worker.mailbox.send(Command::Shutdown);
            if worker.handle.join().is_err() {
                tracing::error!(target: "camsource::apartment", "Worker `{}` panicked", self.name);
            }
        }
        self.shared.mark_stopped();

        tracing::debug!(target: "camsource::apartment", "Worker `{}` stopped", self.name);
    }

    /// 在 Worker 线程上执行 `f` 并等待结果
    pub fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        // 1. 重入：已经在 Worker 上，直接执行
        if self.is_worker_thread() {
            return f();
        }

        // 2. 快速拒绝，不去排队等提交权
        if self.state() != SerializerState::Running {
            return Err(SourceError::SerializerStopped);
        }

        // 3. 获取提交权后再确认一次状态 (等待期间可能已 stop)
        let slot = self.lock_submit();
        if self.state() != SerializerState::Running {
            return Err(SourceError::SerializerStopped);
        }
        let worker = slot.as_ref().ok_or(SourceError::SerializerStopped)?;

        // 4. 投递并等待回执
        let (reply_tx, reply_rx) = bounded::<thread::Result<Result<T>>>(1);
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(f));
            let _ = reply_tx.send(outcome);
        });
        worker
            .mailbox
            .send(Command::Run(job))
            .map_err(|_| SourceError::SerializerStopped)?;
        let outcome = reply_rx
            .recv()
            .map_err(|_| SourceError::SerializerStopped)?;
        drop(slot);

        match outcome {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// 执行无返回值的动作
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.run(move || {
            f();
            Ok(())
        })
    }

    fn lock_submit(&self) -> MutexGuard<'_, Option<Worker>> {
        self.submit.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CommandSerializer {
    fn drop(&mut self) {
        self.stop();
        if self.is_worker_thread() {
            return;
        }
        if let Some(worker) = self.lock_submit().take() {
            let _ = worker.handle.join();
        }
    }
}

fn worker_loop(inbox: Receiver<Command>, shared: Arc<Shared>) {
    while let Ok(cmd) = inbox.recv() {
        match cmd {
            Command::Run(job) => job(),
            Command::Shutdown => break,
        }
        if shared.status().state == SerializerState::Stopping {
            break;
        }
    }
    shared.mark_stopped();
}
