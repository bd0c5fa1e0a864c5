use alloc::{boxed::Box, format};

use crate::{Decode, Encode, Error, Result};

/// 全てのボックスが実装するトレイト
///
/// 本来なら `Box` という名前が適切だが、それだと標準ライブラリの [`Box`] と名前が
/// 衝突してしまうので、それを避けるために `BaseBox` としている
pub trait BaseBox {
    /// ボックスの種別
    fn box_type(&self) -> BoxType;

    /// 未知のボックスかどうか
    ///
    /// 基本的には `false` を返すデフォルト実装のままで問題ないが、
    /// [`UnknownBox`](crate::boxes::UnknownBox) では `true` を返す
    fn is_unknown_box(&self) -> bool {
        false
    }

    /// 子ボックスを走査するイテレーターを返す
    fn children<'a>(&'a self) -> Box<dyn 'a + Iterator<Item = &'a dyn BaseBox>>;
}

pub(crate) fn as_box_object<T: BaseBox>(t: &T) -> &dyn BaseBox {
    t
}

/// フルボックスを表すトレイト
pub trait FullBox: BaseBox {
    /// フルボックスのバージョンを返す
    fn full_box_version(&self) -> u8;

    /// フルボックスのフラグを返す
    fn full_box_flags(&self) -> FullBoxFlags;
}

/// [`BaseBox`] に共通のヘッダー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxHeader {
    /// ボックスの種別
    pub box_type: BoxType,

    /// ボックスのサイズ
    pub box_size: BoxSize,
}

impl BoxHeader {
    /// サイズが未確定のヘッダーを作成する
    ///
    /// エンコード時にはまずこのヘッダーを書き込み、ペイロードを書き終えた後に
    /// [`BoxHeader::finalize_box_size()`] で実際のサイズを埋め込む
    pub fn new_variable_size(box_type: BoxType) -> Self {
        Self {
            box_type,
            box_size: BoxSize::VARIABLE_SIZE,
        }
    }

    /// エンコード済みのボックス全体のバイト列を受け取って、先頭のサイズフィールドを書き換える
    ///
    /// `box_bytes` はこのヘッダーから始まっている必要がある
    pub fn finalize_box_size(self, box_bytes: &mut [u8]) -> Result<()> {
        if self.box_size != BoxSize::VARIABLE_SIZE {
            return Err(Error::invalid_input(
                "box_size must be VARIABLE_SIZE before finalization",
            ));
        }

        // ヘッダーのサイズに変更があると box_bytes 全体のレイアウトが変わってしまうので U32 に限定する
        let size = u32::try_from(box_bytes.len()).map_err(|_| {
            Error::invalid_input(format!(
                "Box too large for a 32-bit size field: {} bytes",
                box_bytes.len()
            ))
            .with_box_type(self.box_type)
        })?;
        size.encode(box_bytes)?;
        Ok(())
    }

    /// ヘッダーをエンコードした際のバイト数を返す
    pub fn external_size(self) -> usize {
        self.box_type.external_size() + self.box_size.external_size()
    }

    /// ヘッダーをデコードして、宣言されたサイズ分のペイロード部分と一緒に返す
    ///
    /// サイズが 0 のボックスは、`buf` の末尾までをペイロードとして扱う
    pub fn decode_header_and_payload(buf: &[u8]) -> Result<(Self, &[u8])> {
        let (header, header_size) = Self::decode(buf)?;
        let box_size = if header.box_size.get() == 0 {
            buf.len()
        } else {
            usize::try_from(header.box_size.get()).unwrap_or(usize::MAX)
        };
        if buf.len() < box_size {
            return Err(Error::truncated_input(format!(
                "Box declares {box_size} bytes, but only {} bytes are available",
                buf.len()
            ))
            .with_box_type(header.box_type));
        }
        Ok((header, &buf[header_size..box_size]))
    }
}

impl Encode for BoxHeader {
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut offset = 0;

        let large_size = match self.box_size {
            BoxSize::U32(size) => {
                offset += size.encode(&mut buf[offset..])?;
                None
            }
            BoxSize::U64(size) => {
                offset += 1u32.encode(&mut buf[offset..])?;
                Some(size)
            }
        };

        let user_type = match &self.box_type {
            BoxType::Normal(ty) => {
                offset += ty.encode(&mut buf[offset..])?;
                None
            }
            BoxType::Uuid(ty) => {
                offset += b"uuid".encode(&mut buf[offset..])?;
                Some(ty)
            }
        };

        if let Some(large_size) = large_size {
            offset += large_size.encode(&mut buf[offset..])?;
        }
        if let Some(user_type) = user_type {
            offset += user_type.encode(&mut buf[offset..])?;
        }

        Ok(offset)
    }
}

impl Decode for BoxHeader {
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let mut offset = 0;
        let box_size = u32::decode_at(buf, &mut offset)?;
        let box_type = <[u8; 4]>::decode_at(buf, &mut offset)?;

        let box_size = if box_size == 1 {
            BoxSize::U64(u64::decode_at(buf, &mut offset)?)
        } else {
            BoxSize::U32(box_size)
        };
        let box_type = if box_type == *b"uuid" {
            BoxType::Uuid(<[u8; 16]>::decode_at(buf, &mut offset)?)
        } else {
            BoxType::Normal(box_type)
        };

        if box_size.get() != 0 && box_size.get() < offset as u64 {
            return Err(Error::malformed_box(format!(
                "Too small box size: actual={}, expected={offset} or more",
                box_size.get(),
            ))
            .with_box_type(box_type));
        };

        Ok((Self { box_type, box_size }, offset))
    }
}

/// [`FullBox`] に共通のヘッダー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FullBoxHeader {
    /// バージョン
    pub version: u8,

    /// フラグ
    pub flags: FullBoxFlags,
}

impl FullBoxHeader {
    /// フルボックスへの参照を受け取って、対応するヘッダーを作成する
    pub fn from_box<B: FullBox>(b: &B) -> Self {
        Self {
            version: b.full_box_version(),
            flags: b.full_box_flags(),
        }
    }
}

impl Encode for FullBoxHeader {
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut offset = 0;
        offset += self.version.encode(&mut buf[offset..])?;
        offset += self.flags.encode(&mut buf[offset..])?;
        Ok(offset)
    }
}

impl Decode for FullBoxHeader {
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let mut offset = 0;
        let version = u8::decode_at(buf, &mut offset)?;
        let flags = FullBoxFlags::decode_at(buf, &mut offset)?;
        Ok((Self { version, flags }, offset))
    }
}

/// [`FullBox`] のヘッダー部分に含まれるビットフラグ（24 ビット）
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FullBoxFlags(u32);

impl FullBoxFlags {
    /// 空のビットフラグを作成する
    pub const fn empty() -> Self {
        Self(0)
    }

    /// [`u32`] を受け取って、対応するビットフラグを作成する
    ///
    /// 上位 8 ビットは無視される
    pub const fn new(flags: u32) -> Self {
        Self(flags & 0x00FF_FFFF)
    }

    /// このビットフラグに対応する [`u32`] 値を返す
    pub const fn get(self) -> u32 {
        self.0
    }

    /// 指定されたビット位置のフラグがセットされているかどうかを判定する
    pub const fn is_set(self, i: usize) -> bool {
        (self.0 & (1 << i)) != 0
    }
}

impl Encode for FullBoxFlags {
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        self.0.to_be_bytes()[1..].encode(buf)
    }
}

impl Decode for FullBoxFlags {
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let ([a, b, c], size) = <[u8; 3]>::decode(buf)?;
        Ok((Self(u32::from_be_bytes([0, a, b, c])), size))
    }
}

/// [`BaseBox`] のサイズ
///
/// ボックスのサイズは原則として、ヘッダー部分とペイロード部分のサイズを足した値となる。
/// ただし、サイズを 0 とすることで、ペイロードが親の範囲（またはファイル）の末尾まで続くボックスとして扱うことが可能となっている。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum BoxSize {
    U32(u32),
    U64(u64),
}

impl BoxSize {
    /// 末尾まで続く可変長のボックスを表すための特別な値
    pub const VARIABLE_SIZE: Self = Self::U32(0);

    /// ボックス種別とペイロードサイズを受け取って、対応する [`BoxSize`] インスタンスを作成する
    pub fn with_payload_size(box_type: BoxType, payload_size: u64) -> Self {
        let mut size = 4 + box_type.external_size() as u64 + payload_size;
        if let Ok(size) = u32::try_from(size) {
            Self::U32(size)
        } else {
            size += 8;
            Self::U64(size)
        }
    }

    /// ボックスのサイズの値を取得する
    pub const fn get(self) -> u64 {
        match self {
            BoxSize::U32(v) => v as u64,
            BoxSize::U64(v) => v,
        }
    }

    /// [`BoxHeader`] 内のサイズフィールドをエンコードする際に必要となるバイト数を返す
    pub const fn external_size(self) -> usize {
        match self {
            BoxSize::U32(_) => 4,
            BoxSize::U64(_) => 4 + 8,
        }
    }
}

/// [`BaseBox`] の種別
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BoxType {
    /// 四文字で表現される通常のボックス種別
    Normal([u8; 4]),

    /// UUID 形式のボックス種別
    Uuid([u8; 16]),
}

impl BoxType {
    /// 種別を表すバイト列を返す
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            BoxType::Normal(ty) => &ty[..],
            BoxType::Uuid(ty) => &ty[..],
        }
    }

    /// [`BoxHeader`] 内のボックス種別フィールドをエンコードする際に必要となるバイト数を返す
    pub const fn external_size(self) -> usize {
        if matches!(self, Self::Normal(_)) {
            4
        } else {
            4 + 16
        }
    }

    /// 自分が `expected` と同じ種別であるかをチェックする
    pub fn expect(self, expected: Self) -> Result<()> {
        if self == expected {
            Ok(())
        } else {
            Err(Error::invalid_data(format!(
                "Expected box type `{expected}`, but got `{self}`"
            )))
        }
    }
}

impl core::fmt::Debug for BoxType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BoxType::Normal(ty) => {
                if let Ok(ty) = core::str::from_utf8(ty) {
                    f.debug_tuple("BoxType").field(&ty).finish()
                } else {
                    f.debug_tuple("BoxType").field(ty).finish()
                }
            }
            BoxType::Uuid(ty) => f.debug_tuple("BoxType").field(ty).finish(),
        }
    }
}

impl core::fmt::Display for BoxType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let BoxType::Normal(ty) = self
            && let Ok(ty) = core::str::from_utf8(&ty[..])
        {
            return write!(f, "{ty}");
        }
        write!(f, "{:?}", self.as_bytes())
    }
}

/// 固定小数点数
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FixedPointNumber<I, F = I> {
    /// 整数部
    pub integer: I,

    /// 小数部
    pub fraction: F,
}

impl<I, F> FixedPointNumber<I, F> {
    /// 整数部と小数部を受け取って固定小数点数を返す
    pub const fn new(integer: I, fraction: F) -> Self {
        Self { integer, fraction }
    }
}

impl<I: Encode, F: Encode> Encode for FixedPointNumber<I, F> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut offset = 0;
        offset += self.integer.encode(&mut buf[offset..])?;
        offset += self.fraction.encode(&mut buf[offset..])?;
        Ok(offset)
    }
}

impl<I: Decode, F: Decode> Decode for FixedPointNumber<I, F> {
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let mut offset = 0;
        let integer = I::decode_at(buf, &mut offset)?;
        let fraction = F::decode_at(buf, &mut offset)?;
        Ok((Self { integer, fraction }, offset))
    }
}
