use std::sync::{Mutex, PoisonError};

use camsource_core::error::{Result, SourceError};
use camsource_core::sample::{AllocatorProperties, MediaSample, MemAllocator};

/// Buffer 大小有上限的分配器
///
/// 请求超过 `cap` 时只授予 `cap`，用来触发 Pump 的授予校验失败。
#[derive(Debug)]
pub struct CappedAllocator {
    cap: usize,
    granted: Mutex<Option<AllocatorProperties>>,
}

impl CappedAllocator {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            granted: Mutex::new(None),
        }
    }
}

impl MemAllocator for CappedAllocator {
    fn set_properties(&self, request: &AllocatorProperties) -> Result<AllocatorProperties> {
        let granted = AllocatorProperties {
            buffers: request.buffers.max(1),
            buffer_size: request.buffer_size.min(self.cap),
            align: request.align.max(1),
            prefix: request.prefix,
        };
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_is_capped() {
        let alloc = CappedAllocator::new(1000);
        assert!(alloc.get_buffer().is_err());
        let granted = alloc
            .set_properties(&AllocatorProperties {
                buffers: 0,
                buffer_size: 5000,
                align: 0,
                prefix: 0,
            })
            .unwrap();
        assert_eq!((granted.buffers, granted.buffer_size, granted.align), (1, 1000, 1));
        assert_eq!(alloc.get_buffer().unwrap().size(), 1000);
    }
}
