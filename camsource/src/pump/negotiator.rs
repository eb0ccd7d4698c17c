use camsource_core::error::NegotiationFailure;
use camsource_core::media::MediaType;
use camsource_core::sample::{AllocatorProperties, AllocatorRequest};

/// 分配器协商 (纯逻辑，不持锁、不做 IO)
///
/// 规则：
/// - 自然需求：1 个 Buffer，大小覆盖整帧，对齐 1，无前缀
/// - 建议只能放大 Buffer，不能改对齐/前缀，不能要 0 个 Buffer
/// - 被接受的建议原样保留，直到 `reset()` 或新的建议
/// - 最终结果 ≥ max(自然大小, 消费方请求)
#[derive(Debug, Clone, Default)]
pub struct BufferNegotiator {
    suggested: Option<AllocatorRequest>,
    granted: Option<AllocatorProperties>,
}

impl BufferNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 某个媒体类型的自然需求
    pub fn natural_properties(format: &MediaType) -> AllocatorProperties {
        AllocatorProperties {
            buffers: 1,
            buffer_size: format.sample_size.max(format.image_size()),
            align: 1,
            prefix: 0,
        }
    }

    /// 校验并记住消费方的建议，返回生效后的属性
    pub fn suggest(
        &mut self,
        request: AllocatorRequest,
        natural: &AllocatorProperties,
    ) -> Result<AllocatorProperties, NegotiationFailure> {
        Self::validate(&request, natural)?;
        self.suggested = Some(request);
        Ok(request.overlay(*natural))
    }

    /// 格式变化后重新校验已有建议；不再成立的建议被丢弃并报错
    pub fn revalidate(&mut self, natural: &AllocatorProperties) -> Result<(), NegotiationFailure> {
        if let Some(request) = self.suggested {
            if let Err(e) = Self::validate(&request, natural) {
                self.suggested = None;
                return Err(e);
            }
        }
        Ok(())
    }

    fn validate(
        request: &AllocatorRequest,
        natural: &AllocatorProperties,
    ) -> Result<(), NegotiationFailure> {
        if let Some(size) = request.buffer_size {
            if size < natural.buffer_size {
                return Err(NegotiationFailure::BufferTooSmall {
                    requested: size,
                    required: natural.buffer_size,
                });
            }
        }
        if let Some(align) = request.align {
            if align != natural.align {
                return Err(NegotiationFailure::AlignmentMismatch {
                    requested: align,
                    natural: natural.align,
                });
            }
        }
        if let Some(prefix) = request.prefix {
            if prefix != natural.prefix {
                return Err(NegotiationFailure::PrefixMismatch {
                    requested: prefix,
                    natural: natural.prefix,
                });
            }
        }
        if request.buffers == Some(0) {
            return Err(NegotiationFailure::NoBuffers);
        }
        Ok(())
    }

    /// 生效属性：有建议用建议，否则自然需求
    pub fn properties(&self, natural: &AllocatorProperties) -> AllocatorProperties {
        self.suggested
            .map(|r| r.overlay(*natural))
            .unwrap_or(*natural)
    }

    /// 合并下游请求、已接受的建议与自然需求，得到发给分配器的请求
    pub fn reconcile(
        &self,
        requested: AllocatorRequest,
        natural: &AllocatorProperties,
    ) -> AllocatorProperties {
        let base = self.properties(natural);
        AllocatorProperties {
            buffers: base.buffers.max(requested.buffers.unwrap_or(1)).max(1),
            buffer_size: base
                .buffer_size
                .max(natural.buffer_size)
                .max(requested.buffer_size.unwrap_or(0)),
            align: base.align.max(requested.align.unwrap_or(1)).max(1),
            prefix: base.prefix.max(requested.prefix.unwrap_or(0)),
        }
    }

    /// 校验分配器实际授予的属性并记录
    pub fn verify(
        &mut self,
        granted: AllocatorProperties,
        required: &AllocatorProperties,
    ) -> Result<AllocatorProperties, NegotiationFailure> {
        if granted.buffers < 1 || granted.buffer_size < required.buffer_size {
            return Err(NegotiationFailure::AllocatorShortfall {
                granted: granted.buffer_size,
                buffers: granted.buffers,
                required: required.buffer_size,
            });
        }
        self.granted = Some(granted);
        Ok(granted)
    }

    pub fn granted(&self) -> Option<AllocatorProperties> {
        self.granted
    }

    pub fn suggestion(&self) -> Option<AllocatorRequest> {
        self.suggested
    }

    /// 忘掉授予结果 (断开连接时)
    pub fn clear_granted(&mut self) {
        self.granted = None;
    }

    /// 忘掉建议与授予结果 (格式替换时)
    pub fn reset(&mut self) {
        self.suggested = None;
        self.granted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camsource_core::frame::FrameGeometry;
    use camsource_core::time::MediaTime;

    fn vga() -> AllocatorProperties {
        let mt = MediaType::video(FrameGeometry::new(640, 480, 32), MediaTime(333_333)).unwrap();
        BufferNegotiator::natural_properties(&mt)
    }

    #[test]
    fn test_natural_properties() {
        let natural = vga();
        assert_eq!(natural.buffers, 1);
        assert_eq!(natural.buffer_size, 1_228_800);
        assert_eq!((natural.align, natural.prefix), (1, 0));
    }

    #[test]
    fn test_smaller_buffer_is_rejected() {
        let mut neg = BufferNegotiator::new();
        let err = neg
            .suggest(AllocatorRequest::new().buffer_size(1000), &vga())
            .unwrap_err();
        assert_eq!(
            err,
            NegotiationFailure::BufferTooSmall {
                requested: 1000,
                required: 1_228_800
            }
        );
        assert!(neg.suggestion().is_none());
    }

    #[test]
    fn test_larger_buffer_is_served_back_unchanged() {
        let mut neg = BufferNegotiator::new();
        let natural = vga();
        let req = AllocatorRequest::new().buffer_size(2_000_000).buffers(3);
        let effective = neg.suggest(req, &natural).unwrap();
        assert_eq!(effective.buffer_size, 2_000_000);
        assert_eq!(effective.buffers, 3);
        assert_eq!(neg.properties(&natural), effective);
    }

    #[test]
    fn test_alignment_prefix_and_count_constraints() {
        let mut neg = BufferNegotiator::new();
        let natural = vga();
        assert!(matches!(
            neg.suggest(AllocatorRequest::new().align(16), &natural),
            Err(NegotiationFailure::AlignmentMismatch { .. })
        ));
        assert!(matches!(
            neg.suggest(AllocatorRequest::new().prefix(8), &natural),
            Err(NegotiationFailure::PrefixMismatch { .. })
        ));
        assert_eq!(
            neg.suggest(AllocatorRequest::new().buffers(0), &natural),
            Err(NegotiationFailure::NoBuffers)
        );
        // 未指定的字段不参与校验
        assert!(neg.suggest(AllocatorRequest::new(), &natural).is_ok());
    }

    #[test]
    fn test_reconcile_covers_natural_and_request() {
        let mut neg = BufferNegotiator::new();
        let natural = vga();
        let request = neg.reconcile(AllocatorRequest::new().buffer_size(10), &natural);
        assert_eq!(request.buffer_size, natural.buffer_size);
        assert_eq!(request.buffers, 1);

        let request = neg.reconcile(AllocatorRequest::new().buffer_size(3_000_000).align(4), &natural);
        assert_eq!(request.buffer_size, 3_000_000);
        assert_eq!(request.align, 4);

        neg.suggest(AllocatorRequest::new().buffer_size(2_000_000), &natural)
            .unwrap();
        let request = neg.reconcile(AllocatorRequest::new(), &natural);
        assert_eq!(request.buffer_size, 2_000_000);
    }

    #[test]
    fn test_verify_rejects_shortfall() {
        let mut neg = BufferNegotiator::new();
        let natural = vga();
        let short = AllocatorProperties {
            buffer_size: 100,
            ..natural
        };
        assert!(matches!(
            neg.verify(short, &natural),
            Err(NegotiationFailure::AllocatorShortfall { .. })
        ));
        assert!(neg.granted().is_none());
        assert_eq!(neg.verify(natural, &natural).unwrap(), natural);
        assert_eq!(neg.granted(), Some(natural));
    }

    #[test]
    fn test_revalidate_drops_stale_suggestion() {
        let mut neg = BufferNegotiator::new();
        neg.suggest(AllocatorRequest::new().buffer_size(1_300_000), &vga())
            .unwrap();
        let bigger = AllocatorProperties {
            buffer_size: 2_000_000,
            ..vga()
        };
        assert!(neg.revalidate(&bigger).is_err());
        assert!(neg.suggestion().is_none());
    }
}
