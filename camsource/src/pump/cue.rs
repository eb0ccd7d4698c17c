use camsource_core::error::{Result, SourceError};
use camsource_core::stream::{StreamEvent, StreamInfo, StreamInfoFlags};
use camsource_core::time::MediaTime;

/// 一个样本在流控下的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueDecision {
    Deliver,
    /// stop-at 已到，带 flush：投递这最后一个样本
    DeliverFinal,
    /// 尚未到 start-at，丢弃后继续拉取
    Discard,
    EndOfStream,
}

/// start-at / stop-at 与 Stream Offset 状态 (受 pin lock 保护)
#[derive(Debug, Clone, Default)]
pub struct CueState {
    start_at: Option<MediaTime>,
    start_cookie: u32,
    start_notified: bool,

    stop_at: Option<MediaTime>,
    stop_cookie: u32,
    send_extra: bool,
    stop_notified: bool,

    offset: MediaTime,
    max_offset: Option<MediaTime>,
}

impl CueState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_start(&mut self, at: Option<MediaTime>, cookie: u32) {
        self.start_at = at;
        self.start_cookie = cookie;
        self.start_notified = false;
    }

    pub fn set_stop(&mut self, at: Option<MediaTime>, send_extra: bool, cookie: u32) {
        self.stop_at = at;
        self.stop_cookie = cookie;
        self.send_extra = send_extra;
        self.stop_notified = false;
    }

    /// 重新激活时清掉 "已通知" 标记
    pub fn rearm(&mut self) {
        self.start_notified = false;
        self.stop_notified = false;
    }

    /// 按样本起始时间决定去向；需要发出的通知追加到 `events`
    ///
    /// cookie 为 0 表示调用方不需要通知。
    pub fn evaluate(&mut self, start: MediaTime, events: &mut Vec<StreamEvent>) -> CueDecision {
        if let Some(at) = self.start_at {
            if start < at {
                return CueDecision::Discard;
            }
            if !self.start_notified {
                self.start_notified = true;
                if self.start_cookie != 0 {
                    events.push(StreamEvent::StreamControlStarted {
                        cookie: self.start_cookie,
                    });
                }
            }
        }

        if let Some(at) = self.stop_at {
            if start >= at {
                if self.stop_notified {
                    return CueDecision::EndOfStream;
                }
                self.stop_notified = true;
                if self.stop_cookie != 0 {
                    events.push(StreamEvent::StreamControlStopped {
                        cookie: self.stop_cookie,
                    });
                }
                return if self.send_extra {
                    CueDecision::DeliverFinal
                } else {
                    CueDecision::EndOfStream
                };
            }
        }

        CueDecision::Deliver
    }

    /// `position` 为当前流位置 (下一个样本的起始时间)
    pub fn info(&self, position: MediaTime) -> StreamInfo {
        let mut flags = StreamInfoFlags::empty();
        if let Some(at) = self.start_at {
            flags |= StreamInfoFlags::START_DEFINED;
            if position < at {
                flags |= StreamInfoFlags::DISCARDING;
            }
        }
        if self.stop_at.is_some() {
            flags |= StreamInfoFlags::STOP_DEFINED;
            if self.send_extra {
                flags |= StreamInfoFlags::STOP_SEND_EXTRA;
            }
        }
        StreamInfo {
            start: self.start_at,
            stop: self.stop_at,
            start_cookie: self.start_cookie,
            stop_cookie: self.stop_cookie,
            flags,
        }
    }

    pub fn offset(&self) -> MediaTime {
        self.offset
    }

    /// 设置偏移；超过已设定的最大值时一并抬高最大值
    pub fn set_offset(&mut self, offset: MediaTime) {
        self.offset = offset;
        if let Some(max) = self.max_offset {
            if offset > max {
                self.max_offset = Some(offset);
            }
        }
    }

    /// 未设置时惰性初始化为 max(latency, offset)
    pub fn max_offset(&mut self, latency: MediaTime) -> MediaTime {
        *self.max_offset.get_or_insert(latency.max(self.offset))
    }

    pub fn set_max_offset(&mut self, max: MediaTime) -> Result<()> {
        if max < self.offset {
            return Err(SourceError::InvalidArgument(format!(
                "max stream offset {:?} below current offset {:?}",
                max, self.offset
            )));
        }
        self.max_offset = Some(max);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: i64) -> MediaTime {
        MediaTime::from_millis(v)
    }

    #[test]
    fn test_no_cues_always_delivers() {
        let mut cues = CueState::new();
        let mut events = Vec::new();
        assert_eq!(cues.evaluate(ms(0), &mut events), CueDecision::Deliver);
        assert!(events.is_empty());
    }

    #[test]
    fn test_start_at_discards_then_notifies_once() {
        let mut cues = CueState::new();
        let mut events = Vec::new();
        cues.set_start(Some(ms(100)), 7);

        assert_eq!(cues.evaluate(ms(50), &mut events), CueDecision::Discard);
        assert!(events.is_empty());
        assert_eq!(cues.evaluate(ms(100), &mut events), CueDecision::Deliver);
        assert_eq!(cues.evaluate(ms(150), &mut events), CueDecision::Deliver);
        assert_eq!(events, vec![StreamEvent::StreamControlStarted { cookie: 7 }]);
    }

    #[test]
    fn test_stop_at_without_flush() {
        let mut cues = CueState::new();
        let mut events = Vec::new();
        cues.set_stop(Some(ms(100)), false, 9);

        assert_eq!(cues.evaluate(ms(99), &mut events), CueDecision::Deliver);
        assert_eq!(cues.evaluate(ms(100), &mut events), CueDecision::EndOfStream);
        assert_eq!(cues.evaluate(ms(140), &mut events), CueDecision::EndOfStream);
        assert_eq!(events, vec![StreamEvent::StreamControlStopped { cookie: 9 }]);
    }

    #[test]
    fn test_stop_at_with_flush_sends_one_extra() {
        let mut cues = CueState::new();
        let mut events = Vec::new();
        cues.set_stop(Some(ms(100)), true, 0);

        assert_eq!(cues.evaluate(ms(120), &mut events), CueDecision::DeliverFinal);
        assert_eq!(cues.evaluate(ms(160), &mut events), CueDecision::EndOfStream);
        // cookie 0：不通知
        assert!(events.is_empty());
    }

    #[test]
    fn test_rearm_allows_new_notifications() {
        let mut cues = CueState::new();
        let mut events = Vec::new();
        cues.set_start(Some(ms(0)), 1);
        cues.evaluate(ms(0), &mut events);
        cues.rearm();
        cues.evaluate(ms(10), &mut events);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_info_flags() {
        let mut cues = CueState::new();
        assert_eq!(cues.info(ms(0)).flags, StreamInfoFlags::empty());

        cues.set_start(Some(ms(100)), 1);
        cues.set_stop(Some(ms(500)), true, 2);
        let info = cues.info(ms(40));
        assert!(info.flags.contains(
            StreamInfoFlags::START_DEFINED
                | StreamInfoFlags::STOP_DEFINED
                | StreamInfoFlags::DISCARDING
                | StreamInfoFlags::STOP_SEND_EXTRA
        ));
        assert!(!cues.info(ms(200)).flags.contains(StreamInfoFlags::DISCARDING));
        assert_eq!(info.stop_cookie, 2);
    }

    #[test]
    fn test_offsets() {
        let mut cues = CueState::new();
        let latency = ms(50);
        assert_eq!(cues.max_offset(latency), latency);

        cues.set_offset(ms(80));
        assert_eq!(cues.offset(), ms(80));
        assert_eq!(cues.max_offset(latency), ms(80));

        assert!(cues.set_max_offset(ms(60)).is_err());
        cues.set_max_offset(ms(200)).unwrap();
        assert_eq!(cues.max_offset(latency), ms(200));
    }

    #[test]
    fn test_unset_max_offset_follows_offset() {
        let mut cues = CueState::new();
        cues.set_offset(ms(120));
        assert_eq!(cues.max_offset(ms(50)), ms(120));
    }
}
