use std::sync::{Mutex, PoisonError};

use bitflags::bitflags;

use crate::error::{Result, SourceError};
use crate::time::MediaTime;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// 分配器属性 (ALLOCATOR_PROPERTIES)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct AllocatorProperties {
    pub buffers: usize,
    pub buffer_size: usize,
    pub align: usize,
    pub prefix: usize,
}

/// 消费方提出的分配请求，`None` 表示该字段未指定
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct AllocatorRequest {
    pub buffers: Option<usize>,
    pub buffer_size: Option<usize>,
    pub align: Option<usize>,
    pub prefix: Option<usize>,
}

impl AllocatorRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffers(mut self, n: usize) -> Self {
        self.buffers = Some(n);
        self
    }

    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = Some(bytes);
        self
    }

    pub fn align(mut self, align: usize) -> Self {
        self.align = Some(align);
        self
    }

    pub fn prefix(mut self, prefix: usize) -> Self {
        self.prefix = Some(prefix);
        self
    }

    /// 用请求中已指定的字段覆盖 `base`
    pub fn overlay(&self, base: AllocatorProperties) -> AllocatorProperties {
        AllocatorProperties {
            buffers: self.buffers.unwrap_or(base.buffers),
            buffer_size: self.buffer_size.unwrap_or(base.buffer_size),
            align: self.align.unwrap_or(base.align),
            prefix: self.prefix.unwrap_or(base.prefix),
        }
    }
}

impl From<AllocatorProperties> for AllocatorRequest {
    fn from(p: AllocatorProperties) -> Self {
        Self {
            buffers: Some(p.buffers),
            buffer_size: Some(p.buffer_size),
            align: Some(p.align),
            prefix: Some(p.prefix),
        }
    }
}

bitflags! {
    /// 样本标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SampleFlags: u32 {
        /// 关键帧 (未压缩视频的每一帧都是)
        const SYNC_POINT    = 1 << 0;
        const DISCONTINUITY = 1 << 1;
        /// stop-at 触发后额外投递的最后一个样本
        const FINAL         = 1 << 2;
    }
}

/// 消费方持有的样本缓冲
///
/// 内存布局：`prefix` 字节前缀 + 数据区。Pump 只写数据区。
#[derive(Debug, Clone)]
pub struct MediaSample {
    buffer: Vec<u8>,
    prefix: usize,
    actual_len: usize,
    time: Option<(MediaTime, MediaTime)>,
    flags: SampleFlags,
}

impl MediaSample {
    pub fn new(size: usize, prefix: usize) -> Self {
        Self {
            buffer: vec![0; prefix + size],
            prefix,
            actual_len: 0,
            time: None,
            flags: SampleFlags::empty(),
        }
    }

    /// 数据区容量
    pub fn size(&self) -> usize {
        self.buffer.len() - self.prefix
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer[self.prefix..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[self.prefix..]
    }

    /// 有效数据 (前 `actual_data_length` 字节)
    pub fn payload(&self) -> &[u8] {
        &self.data()[..self.actual_len]
    }

    pub fn set_time(&mut self, time: Option<(MediaTime, MediaTime)>) {
        self.time = time;
    }

    /// `[start, stop)`
    pub fn time(&self) -> Option<(MediaTime, MediaTime)> {
        self.time
    }

    pub fn set_actual_data_length(&mut self, len: usize) -> Result<()> {
        if len > self.size() {
            return Err(SourceError::InvalidArgument(format!(
                "actual length {} exceeds buffer size {}",
                len,
                self.size()
            )));
        }
        self.actual_len = len;
        Ok(())
    }

    pub fn actual_data_length(&self) -> usize {
        self.actual_len
    }

    pub fn flags(&self) -> SampleFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: SampleFlags) {
        self.flags = flags;
    }

    pub fn is_sync_point(&self) -> bool {
        self.flags.contains(SampleFlags::SYNC_POINT)
    }
}

/// 下游分配器 (外部协作者)
pub trait MemAllocator: Send + Sync + std::fmt::Debug {
    /// 请求属性，返回实际授予的属性 (可能与请求不同)
    fn set_properties(&self, request: &AllocatorProperties) -> Result<AllocatorProperties>;

    /// 当前已授予的属性
    fn properties(&self) -> Option<AllocatorProperties>;

    /// 取一个空样本
    fn get_buffer(&self) -> Result<MediaSample>;
}

/// 进程内堆分配器
///
/// 至少一个 Buffer；对齐为 0 时按 1 处理；Buffer 大小向上取整到对齐的倍数。
#[derive(Debug, Default)]
pub struct HeapAllocator {
    granted: Mutex<Option<AllocatorProperties>>,
}

impl HeapAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemAllocator for HeapAllocator {
    fn set_properties(&self, request: &AllocatorProperties) -> Result<AllocatorProperties> {
        let align = request.align.max(1);
        let granted = AllocatorProperties {
            buffers: request.buffers.max(1),
            buffer_size: request.buffer_size.div_ceil(align) * align,
            align,
            prefix: request.prefix,
        };
        tracing::debug!(target: "camsource::alloc", "Heap allocator granted {:?}", granted);
        *self.granted.lock().unwrap_or_else(PoisonError::into_inner) = Some(granted);
        Ok(granted)
    }

    fn properties(&self) -> Option<AllocatorProperties> {
        *self.granted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get_buffer(&self) -> Result<MediaSample> {
        let props = self
            .properties()
            .ok_or(SourceError::WrongState("allocator has no properties yet"))?;
        Ok(MediaSample::new(props.buffer_size, props.prefix))
    }
}
