use std::fmt::{self, Display};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// 四字符代码 (Four Character Code)，视频工业标准
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct FourCC(pub u32);

impl FourCC {
    /// 从 ASCII 字符创建 FourCC
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self((a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24))
    }

    /// RGB24 (内存顺序 B-G-R)
    pub const RGB3: Self = Self::new(b'R', b'G', b'B', b'3');
    /// RGB32 (内存顺序 B-G-R-X)
    pub const RGB4: Self = Self::new(b'R', b'G', b'B', b'4');
}

impl Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_le_bytes();

        write!(f, "{}", String::from_utf8_lossy(&bytes))
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({})", self)
    }
}

/// 输出端支持的未压缩像素格式 (即 Media Subtype)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum PixelFormat {
    /// 24 bpp, B-G-R
    Rgb24,
    /// 32 bpp, B-G-R-X
    Rgb32,
}

impl PixelFormat {
    /// 按位深选择格式，只认 24 / 32
    pub fn from_bit_depth(bits: u16) -> Option<Self> {
        match bits {
            24 => Some(Self::Rgb24),
            32 => Some(Self::Rgb32),
            _ => None,
        }
    }

    pub fn bits_per_pixel(&self) -> u16 {
        match self {
            Self::Rgb24 => 24,
            Self::Rgb32 => 32,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        usize::from(self.bits_per_pixel() / 8)
    }

    pub fn fourcc(&self) -> FourCC {
        match self {
            Self::Rgb24 => FourCC::RGB3,
            Self::Rgb32 => FourCC::RGB4,
        }
    }
}

impl From<PixelFormat> for FourCC {
    fn from(fmt: PixelFormat) -> Self {
        fmt.fourcc()
    }
}

impl Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fourcc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_depth_lookup() {
        assert_eq!(PixelFormat::from_bit_depth(32), Some(PixelFormat::Rgb32));
        assert_eq!(PixelFormat::from_bit_depth(24), Some(PixelFormat::Rgb24));
        assert_eq!(PixelFormat::from_bit_depth(16), None);
        assert_eq!(PixelFormat::Rgb24.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Rgb32.to_string(), "RGB4");
    }
}
