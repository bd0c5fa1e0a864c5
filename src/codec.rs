#[cfg(feature = "std")]
use std::{backtrace::Backtrace, panic::Location};

use alloc::{string::String, vec, vec::Vec};

use crate::BoxType;

/// このライブラリ用の Result 型
pub type Result<T> = core::result::Result<T, Error>;

/// エンコード/デコード操作のエラーの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 呼び出し側から渡された値が無効である
    InvalidInput,

    /// データコンテンツが無効または破損している
    InvalidData,

    /// 提供されたバッファがエンコード結果を保持するのに小さすぎる
    InsufficientBuffer,

    /// 既に格納されているエントリーとは異なるレイアウトのエントリーを追加しようとした
    LayoutConflict,

    /// 指定されたインデックスがエントリー数以上である
    OutOfRange,

    /// 要求されたエントリーのレイアウトが、格納されているエントリーのレイアウトと一致しない
    LayoutMismatch,

    /// 宣言されたデータを読み終える前に入力バイト列が尽きた
    TruncatedInput,

    /// フルボックスのバージョンがサポート範囲外である
    UnsupportedVersion,

    /// ボックスの宣言サイズと実際の内容が整合しない
    MalformedBox,
}

/// エラー型
pub struct Error {
    /// 発生したエラーの種類
    pub kind: ErrorKind,

    /// エラーが発生した理由
    pub reason: String,

    /// エラーが作成されたソースコードの場所
    #[cfg(feature = "std")]
    pub location: &'static Location<'static>,

    /// エラーが発生した MP4 ボックスの種類
    pub box_type: Option<BoxType>,

    /// エラー発生箇所を示すバックトレース
    ///
    /// バックトレースは `RUST_BACKTRACE` 環境変数が設定されていない場合には取得されない
    #[cfg(feature = "std")]
    pub backtrace: Backtrace,
}

impl Error {
    /// [`Error`] インスタンスを生成する
    #[track_caller]
    pub fn new(kind: ErrorKind) -> Self {
        Self::with_reason(kind, String::new())
    }

    /// エラー理由つきで [`Error`] インスタンスを生成する
    #[track_caller]
    pub fn with_reason<T: Into<String>>(kind: ErrorKind, reason: T) -> Self {
        Self {
            kind,
            reason: reason.into(),
            #[cfg(feature = "std")]
            location: std::panic::Location::caller(),
            box_type: None,
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }

    /// エラーが発生したボックスの種別を設定する
    ///
    /// 既に設定済みの場合には、より内側のボックスの情報を優先して、何もしない
    pub fn with_box_type(mut self, box_type: BoxType) -> Self {
        if self.box_type.is_none() {
            self.box_type = Some(box_type);
        }
        self
    }

    #[track_caller]
    pub(crate) fn invalid_input<T: Into<String>>(reason: T) -> Self {
        Self::with_reason(ErrorKind::InvalidInput, reason)
    }

    #[track_caller]
    pub(crate) fn invalid_data<T: Into<String>>(reason: T) -> Self {
        Self::with_reason(ErrorKind::InvalidData, reason)
    }

    #[track_caller]
    pub(crate) fn insufficient_buffer() -> Self {
        Self::new(ErrorKind::InsufficientBuffer)
    }

    #[track_caller]
    pub(crate) fn layout_conflict<T: Into<String>>(reason: T) -> Self {
        Self::with_reason(ErrorKind::LayoutConflict, reason)
    }

    #[track_caller]
    pub(crate) fn out_of_range<T: Into<String>>(reason: T) -> Self {
        Self::with_reason(ErrorKind::OutOfRange, reason)
    }

    #[track_caller]
    pub(crate) fn layout_mismatch<T: Into<String>>(reason: T) -> Self {
        Self::with_reason(ErrorKind::LayoutMismatch, reason)
    }

    #[track_caller]
    pub(crate) fn truncated_input<T: Into<String>>(reason: T) -> Self {
        Self::with_reason(ErrorKind::TruncatedInput, reason)
    }

    #[track_caller]
    pub(crate) fn unsupported_version<T: Into<String>>(reason: T) -> Self {
        Self::with_reason(ErrorKind::UnsupportedVersion, reason)
    }

    #[track_caller]
    pub(crate) fn malformed_box<T: Into<String>>(reason: T) -> Self {
        Self::with_reason(ErrorKind::MalformedBox, reason)
    }

    #[track_caller]
    pub(crate) fn check_buffer_size(required_size: usize, buf: &[u8]) -> Result<()> {
        if buf.len() < required_size {
            Err(Self::insufficient_buffer())
        } else {
            Ok(())
        }
    }

    #[track_caller]
    pub(crate) fn check_input_size(required_size: usize, buf: &[u8]) -> Result<()> {
        if buf.len() < required_size {
            Err(Self::truncated_input(alloc::format!(
                "Need {required_size} bytes, but only {} bytes remain",
                buf.len()
            )))
        } else {
            Ok(())
        }
    }
}

impl core::fmt::Debug for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self}")
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(ty) = self.box_type {
            write!(f, "[{ty}] ")?;
        }

        write!(f, "{:?}: {}", self.kind, self.reason)?;

        #[cfg(feature = "std")]
        {
            write!(f, " (at {}:{})", self.location.file(), self.location.line())?;
            if self.backtrace.status() == std::backtrace::BacktraceStatus::Captured {
                write!(f, "\n\nBacktrace:\n{}", self.backtrace)?;
            }
        }

        Ok(())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// バイト列に変換可能な型を表現するためのトレイト
pub trait Encode {
    /// `self` をバイト列に変換して `buf` に書きこむ
    ///
    /// 返り値は、変換後のバイト列のサイズで、
    /// もし `buf` のサイズが不足している場合には [`ErrorKind::InsufficientBuffer`] エラーが返される
    fn encode(&self, buf: &mut [u8]) -> Result<usize>;

    /// `self` をバイト列に変換して、変換後のバイト列を返す
    fn encode_to_vec(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0; 64];
        loop {
            match self.encode(&mut buf) {
                Ok(size) => {
                    buf.truncate(size);
                    return Ok(buf);
                }
                Err(e) if e.kind == ErrorKind::InsufficientBuffer => {
                    buf.resize(buf.len() * 2, 0);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Encode for u8 {
    #[track_caller]
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        Error::check_buffer_size(1, buf)?;
        buf[0] = *self;
        Ok(1)
    }
}

impl Encode for u16 {
    #[track_caller]
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        Error::check_buffer_size(2, buf)?;
        buf[..2].copy_from_slice(&self.to_be_bytes());
        Ok(2)
    }
}

impl Encode for u32 {
    #[track_caller]
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        Error::check_buffer_size(4, buf)?;
        buf[..4].copy_from_slice(&self.to_be_bytes());
        Ok(4)
    }
}

impl Encode for u64 {
    #[track_caller]
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        Error::check_buffer_size(8, buf)?;
        buf[..8].copy_from_slice(&self.to_be_bytes());
        Ok(8)
    }
}

impl Encode for i32 {
    #[track_caller]
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        Error::check_buffer_size(4, buf)?;
        buf[..4].copy_from_slice(&self.to_be_bytes());
        Ok(4)
    }
}

impl Encode for i64 {
    #[track_caller]
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        Error::check_buffer_size(8, buf)?;
        buf[..8].copy_from_slice(&self.to_be_bytes());
        Ok(8)
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    #[track_caller]
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut offset = 0;
        for item in self {
            offset += item.encode(&mut buf[offset..])?;
        }
        Ok(offset)
    }
}

impl Encode for [u8] {
    #[track_caller]
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        Error::check_buffer_size(self.len(), buf)?;
        buf[..self.len()].copy_from_slice(self);
        Ok(self.len())
    }
}

/// バイト列から `Self` に変換するためのトレイト
pub trait Decode: Sized {
    /// バイト列からこの型の値をデコードする
    ///
    /// 成功時には、デコードされた値とデコードに消費されたバイト数のタプルが、
    /// 失敗時には [`Error`] が返される
    fn decode(buf: &[u8]) -> Result<(Self, usize)>;

    /// オフセット位置からバイト列をデコードし、オフセットを自動で進める
    fn decode_at(buf: &[u8], offset: &mut usize) -> Result<Self> {
        let rest = buf.get(*offset..).ok_or_else(|| {
            Error::truncated_input("Decode offset is beyond the end of the input")
        })?;
        let (decoded, size) = Self::decode(rest)?;
        *offset += size;
        Ok(decoded)
    }
}

impl Decode for u8 {
    #[track_caller]
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        Error::check_input_size(1, buf)?;
        Ok((buf[0], 1))
    }
}

impl Decode for u16 {
    #[track_caller]
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        Error::check_input_size(2, buf)?;
        Ok((Self::from_be_bytes([buf[0], buf[1]]), 2))
    }
}

impl Decode for u32 {
    #[track_caller]
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        Error::check_input_size(4, buf)?;
        Ok((Self::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]), 4))
    }
}

impl Decode for u64 {
    #[track_caller]
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        Error::check_input_size(8, buf)?;
        let bytes = [
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ];
        Ok((Self::from_be_bytes(bytes), 8))
    }
}

impl Decode for i32 {
    #[track_caller]
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        Error::check_input_size(4, buf)?;
        Ok((Self::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]), 4))
    }
}

impl Decode for i64 {
    #[track_caller]
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        Error::check_input_size(8, buf)?;
        let bytes = [
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ];
        Ok((Self::from_be_bytes(bytes), 8))
    }
}

impl<T: Decode + Default + Copy, const N: usize> Decode for [T; N] {
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let mut items = [T::default(); N];
        let mut offset = 0;

        for item in &mut items {
            *item = T::decode_at(buf, &mut offset)?;
        }

        Ok((items, offset))
    }
}
