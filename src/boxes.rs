//! ボックス群を定義するためのモジュール
use alloc::{boxed::Box, format, vec::Vec};

use crate::{
    BaseBox, BoxHeader, BoxSize, BoxType, Decode, Encode, Error, ErrorKind, Result,
};

pub use crate::boxes_edts::{
    EditListEntryStore, EdtsBox, ElstBox, ElstEntry, ElstEntryV0, ElstEntryV1, ElstLayout,
};

/// このライブラリが内容を解釈しないボックス
///
/// ペイロードはバイト列のまま保持され、エンコード時にはそのまま書き戻される
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnknownBox {
    /// ボックス種別
    pub box_type: BoxType,

    /// デコード時のボックスサイズ
    pub box_size: BoxSize,

    /// ペイロード
    pub payload: Vec<u8>,
}

impl Encode for UnknownBox {
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let payload_size = self.payload.len() as u64;
        let box_size = match self.box_size {
            // 末尾まで続くボックスはサイズ 0 のまま書き戻す
            BoxSize::U32(0) | BoxSize::U64(0) => self.box_size,
            BoxSize::U64(_) => BoxSize::U64(
                (self.box_type.external_size() + BoxSize::U64(0).external_size()) as u64
                    + payload_size,
            ),
            BoxSize::U32(_) => BoxSize::with_payload_size(self.box_type, payload_size),
        };
        let header = BoxHeader {
            box_type: self.box_type,
            box_size,
        };
        let mut offset = header.encode(buf)?;
        offset += self.payload.encode(&mut buf[offset..])?;
        Ok(offset)
    }
}

impl Decode for UnknownBox {
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let (header, payload) = BoxHeader::decode_header_and_payload(buf)?;
        Ok((
            Self {
                box_type: header.box_type,
                box_size: header.box_size,
                payload: payload.to_vec(),
            },
            header.external_size() + payload.len(),
        ))
    }
}

impl BaseBox for UnknownBox {
    fn box_type(&self) -> BoxType {
        self.box_type
    }

    fn is_unknown_box(&self) -> bool {
        true
    }

    fn children<'a>(&'a self) -> Box<dyn 'a + Iterator<Item = &'a dyn BaseBox>> {
        Box::new(core::iter::empty())
    }
}

/// 指定の関数を実行し、エラーが発生した場合にはボックス種別の情報を付与する
pub(crate) fn with_box_type<T, F>(box_type: BoxType, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    f().map_err(|e| e.with_box_type(box_type))
}

/// 親ボックスのペイロード範囲内でのデコード処理を実行する
///
/// ペイロードはボックスの宣言サイズで切り出されているので、ここでの入力不足は
/// 宣言された範囲を超えて読もうとしたことを意味する
pub(crate) fn within_box_range<T, F>(box_type: BoxType, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    f().map_err(|e| {
        if e.kind != ErrorKind::TruncatedInput {
            return e;
        }

        // 種別と発生箇所は、入力不足を検出した内側のものを引き継ぐ
        #[allow(unused_mut)]
        let mut err = Error::malformed_box(format!(
            "Content overruns the declared range of the '{box_type}' box: {}",
            e.reason
        ))
        .with_box_type(e.box_type.unwrap_or(box_type));
        #[cfg(feature = "std")]
        {
            err.location = e.location;
            err.backtrace = e.backtrace;
        }
        err
    })
}
