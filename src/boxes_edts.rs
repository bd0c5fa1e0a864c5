//! edts とその下に配置される elst ボックスをまとめたモジュール
//!
//! このモジュールは内部的なもので、構造体などの外部への提供は boxes モジュールを通して行う
use alloc::{boxed::Box, format, vec::Vec};

use crate::{
    BaseBox, BoxHeader, BoxType, Decode, Encode, Error, FixedPointNumber, FullBox, FullBoxFlags,
    FullBoxHeader, Result,
    basic_types::as_box_object,
    boxes::{UnknownBox, with_box_type, within_box_range},
};

/// [`ElstBox`] のエントリーのバイナリレイアウト
///
/// `elst` ボックスのバージョンと一対一に対応する
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElstLayout {
    /// 時間関連のフィールドが 32 ビットのレイアウト（バージョン 0）
    #[default]
    V0,

    /// 時間関連のフィールドが 64 ビットのレイアウト（バージョン 1）
    V1,
}

impl ElstLayout {
    /// フルボックスのバージョンに対応するレイアウトを返す
    ///
    /// バージョンが 0 または 1 以外の場合には [`ErrorKind::UnsupportedVersion`](crate::ErrorKind::UnsupportedVersion) エラーが返される
    pub fn from_version(version: u8) -> Result<Self> {
        match version {
            0 => Ok(Self::V0),
            1 => Ok(Self::V1),
            _ => Err(Error::unsupported_version(format!(
                "Unsupported edit list version: {version}"
            ))),
        }
    }

    /// このレイアウトに対応するフルボックスのバージョンを返す
    pub const fn version(self) -> u8 {
        match self {
            Self::V0 => 0,
            Self::V1 => 1,
        }
    }

    /// エントリー一つ分をエンコードした際のバイト数を返す
    pub const fn entry_size(self) -> usize {
        match self {
            Self::V0 => 4 + 4 + 2 + 2,
            Self::V1 => 8 + 8 + 2 + 2,
        }
    }
}

/// バージョン 0 の [`ElstBox`] に含まれるエントリー
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElstEntryV0 {
    /// この編集セグメントの長さ（ムービーのタイムスケール単位）
    pub segment_duration: u32,

    /// セグメントの開始位置（メディアのタイムスケール単位）
    ///
    /// [`ElstEntryV0::EMPTY_EDIT_MEDIA_TIME`] の場合は空の編集を表す
    pub media_time: i32,

    /// 再生レート
    pub media_rate: FixedPointNumber<u16>,
}

impl ElstEntryV0 {
    /// 空の編集を表す `media_time` の値
    pub const EMPTY_EDIT_MEDIA_TIME: i32 = -1;

    /// 空の編集かどうか
    pub const fn is_empty_edit(&self) -> bool {
        self.media_time == Self::EMPTY_EDIT_MEDIA_TIME
    }
}

impl Encode for ElstEntryV0 {
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut offset = 0;
        offset += self.segment_duration.encode(&mut buf[offset..])?;
        offset += self.media_time.encode(&mut buf[offset..])?;
        offset += self.media_rate.encode(&mut buf[offset..])?;
        Ok(offset)
    }
}

impl Decode for ElstEntryV0 {
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let mut offset = 0;
        let segment_duration = u32::decode_at(buf, &mut offset)?;
        let media_time = i32::decode_at(buf, &mut offset)?;
        let media_rate = FixedPointNumber::decode_at(buf, &mut offset)?;
        Ok((
            Self {
                segment_duration,
                media_time,
                media_rate,
            },
            offset,
        ))
    }
}

impl TryFrom<ElstEntryV1> for ElstEntryV0 {
    type Error = Error;

    fn try_from(entry: ElstEntryV1) -> Result<Self> {
        let segment_duration = u32::try_from(entry.segment_duration).map_err(|_| {
            Error::invalid_input(format!(
                "Segment duration does not fit in 32 bits: {}",
                entry.segment_duration
            ))
        })?;
        let media_time = i32::try_from(entry.media_time).map_err(|_| {
            Error::invalid_input(format!(
                "Media time does not fit in 32 bits: {}",
                entry.media_time
            ))
        })?;
        Ok(Self {
            segment_duration,
            media_time,
            media_rate: entry.media_rate,
        })
    }
}

/// バージョン 1 の [`ElstBox`] に含まれるエントリー
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub struct ElstEntryV1 {
    pub segment_duration: u64,
    pub media_time: i64,
    pub media_rate: FixedPointNumber<u16>,
}

impl ElstEntryV1 {
    /// 空の編集を表す `media_time` の値
    pub const EMPTY_EDIT_MEDIA_TIME: i64 = -1;

    /// 空の編集かどうか
    pub const fn is_empty_edit(&self) -> bool {
        self.media_time == Self::EMPTY_EDIT_MEDIA_TIME
    }
}

impl From<ElstEntryV0> for ElstEntryV1 {
    fn from(entry: ElstEntryV0) -> Self {
        Self {
            segment_duration: u64::from(entry.segment_duration),
            media_time: i64::from(entry.media_time),
            media_rate: entry.media_rate,
        }
    }
}

impl Encode for ElstEntryV1 {
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut offset = 0;
        offset += self.segment_duration.encode(&mut buf[offset..])?;
        offset += self.media_time.encode(&mut buf[offset..])?;
        offset += self.media_rate.encode(&mut buf[offset..])?;
        Ok(offset)
    }
}

impl Decode for ElstEntryV1 {
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let mut offset = 0;
        let segment_duration = u64::decode_at(buf, &mut offset)?;
        let media_time = i64::decode_at(buf, &mut offset)?;
        let media_rate = FixedPointNumber::decode_at(buf, &mut offset)?;
        Ok((
            Self {
                segment_duration,
                media_time,
                media_rate,
            },
            offset,
        ))
    }
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::ElstEntryV0 {}
    impl Sealed for super::ElstEntryV1 {}
}

/// [`ElstEntryV0`] と [`ElstEntryV1`] を統一的に扱うためのトレイト
///
/// [`EditListEntryStore`] に対してエントリーを追加・取得する際に、
/// 型パラメータでレイアウトを指定するために使われる
pub trait ElstEntry: Encode + Decode + sealed::Sealed {
    /// このエントリー型に対応するレイアウト
    const LAYOUT: ElstLayout;

    /// ストアがこの型のエントリーを保持している場合には、そのスライスを返す
    #[doc(hidden)]
    fn stored(store: &EditListEntryStore) -> Option<&[Self]>;

    /// ストアにこのエントリーを追加する
    #[doc(hidden)]
    fn push_to(self, store: &mut EditListEntryStore) -> Result<()>;
}

impl ElstEntry for ElstEntryV0 {
    const LAYOUT: ElstLayout = ElstLayout::V0;

    fn stored(store: &EditListEntryStore) -> Option<&[Self]> {
        match &store.entries {
            StoredEntries::V0(entries) => Some(entries.as_slice()),
            _ => None,
        }
    }

    fn push_to(self, store: &mut EditListEntryStore) -> Result<()> {
        match &mut store.entries {
            StoredEntries::Unset => store.entries = StoredEntries::V0(alloc::vec![self]),
            StoredEntries::V0(entries) => entries.push(self),
            StoredEntries::V1(_) => return Err(layout_conflict(Self::LAYOUT, ElstLayout::V1)),
        }
        Ok(())
    }
}

impl ElstEntry for ElstEntryV1 {
    const LAYOUT: ElstLayout = ElstLayout::V1;

    fn stored(store: &EditListEntryStore) -> Option<&[Self]> {
        match &store.entries {
            StoredEntries::V1(entries) => Some(entries.as_slice()),
            _ => None,
        }
    }

    fn push_to(self, store: &mut EditListEntryStore) -> Result<()> {
        match &mut store.entries {
            StoredEntries::Unset => store.entries = StoredEntries::V1(alloc::vec![self]),
            StoredEntries::V1(entries) => entries.push(self),
            StoredEntries::V0(_) => return Err(layout_conflict(Self::LAYOUT, ElstLayout::V0)),
        }
        Ok(())
    }
}

#[track_caller]
fn layout_conflict(requested: ElstLayout, active: ElstLayout) -> Error {
    Error::layout_conflict(format!(
        "Cannot add a {requested:?} entry to an edit list holding {active:?} entries"
    ))
}

// 空でないベクターだけを V0 / V1 に保持する
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
enum StoredEntries {
    #[default]
    Unset,
    V0(Vec<ElstEntryV0>),
    V1(Vec<ElstEntryV1>),
}

/// 単一レイアウトの編集リストエントリー列
///
/// 最初に追加されたエントリーの型によってレイアウトが決まり、
/// 以降は別レイアウトのエントリーの追加は [`ErrorKind::LayoutConflict`](crate::ErrorKind::LayoutConflict) エラーとなる
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct EditListEntryStore {
    entries: StoredEntries,
}

impl EditListEntryStore {
    /// 空のストアを作成する
    pub const fn new() -> Self {
        Self {
            entries: StoredEntries::Unset,
        }
    }

    fn from_v0(entries: Vec<ElstEntryV0>) -> Self {
        if entries.is_empty() {
            Self::new()
        } else {
            Self {
                entries: StoredEntries::V0(entries),
            }
        }
    }

    fn from_v1(entries: Vec<ElstEntryV1>) -> Self {
        if entries.is_empty() {
            Self::new()
        } else {
            Self {
                entries: StoredEntries::V1(entries),
            }
        }
    }

    /// エントリーを末尾に追加する
    ///
    /// 既に異なるレイアウトのエントリーが格納されている場合には、
    /// ストアの内容は変更されずに [`ErrorKind::LayoutConflict`](crate::ErrorKind::LayoutConflict) エラーが返される
    pub fn push<E: ElstEntry>(&mut self, entry: E) -> Result<()> {
        entry.push_to(self)
    }

    /// 格納されているエントリーの数を返す
    pub fn len(&self) -> usize {
        match &self.entries {
            StoredEntries::Unset => 0,
            StoredEntries::V0(entries) => entries.len(),
            StoredEntries::V1(entries) => entries.len(),
        }
    }

    /// エントリーが空かどうか
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 現在のレイアウトを返す
    ///
    /// エントリーが空の場合には [`None`] が返される
    pub fn layout(&self) -> Option<ElstLayout> {
        match &self.entries {
            StoredEntries::Unset => None,
            StoredEntries::V0(_) => Some(ElstLayout::V0),
            StoredEntries::V1(_) => Some(ElstLayout::V1),
        }
    }

    /// 指定位置のエントリーを `E` 型として返す
    ///
    /// - `index` がエントリー数以上の場合には [`ErrorKind::OutOfRange`](crate::ErrorKind::OutOfRange) エラー
    /// - `E` が現在のレイアウトと一致しない場合には [`ErrorKind::LayoutMismatch`](crate::ErrorKind::LayoutMismatch) エラー
    pub fn get<E: ElstEntry>(&self, index: usize) -> Result<&E> {
        let len = self.len();
        if index >= len {
            return Err(Error::out_of_range(format!(
                "Edit list entry index out of range: index={index}, len={len}"
            )));
        }
        let entries = E::stored(self).ok_or_else(|| self.layout_mismatch(E::LAYOUT))?;
        Ok(&entries[index])
    }

    /// 全てのエントリーを `E` 型のスライスとして返す
    ///
    /// ストアが空の場合には、どちらのレイアウトを指定しても空のスライスが返される
    pub fn as_slice<E: ElstEntry>(&self) -> Result<&[E]> {
        if self.is_empty() {
            return Ok(&[]);
        }
        E::stored(self).ok_or_else(|| self.layout_mismatch(E::LAYOUT))
    }

    /// 全てのエントリーを 64 ビットのレイアウトに揃えて走査するイテレーターを返す
    pub fn iter_wide(&self) -> impl Iterator<Item = ElstEntryV1> + '_ {
        let (v0, v1): (&[ElstEntryV0], &[ElstEntryV1]) = match &self.entries {
            StoredEntries::Unset => (&[], &[]),
            StoredEntries::V0(entries) => (entries.as_slice(), &[]),
            StoredEntries::V1(entries) => (&[], entries.as_slice()),
        };
        v0.iter()
            .copied()
            .map(ElstEntryV1::from)
            .chain(v1.iter().copied())
    }

    #[track_caller]
    fn layout_mismatch(&self, requested: ElstLayout) -> Error {
        Error::layout_mismatch(format!(
            "Requested {requested:?} entries, but the edit list holds {:?} entries",
            self.layout()
        ))
    }

    /// エントリー数（32 ビット）と、指定レイアウトでの各エントリーを `buf` に書きこむ
    ///
    /// 空でないストアに対して、現在と異なるレイアウトを指定した場合には
    /// [`ErrorKind::LayoutMismatch`](crate::ErrorKind::LayoutMismatch) エラーとなる
    pub fn encode(&self, layout: ElstLayout, buf: &mut [u8]) -> Result<usize> {
        if let Some(active) = self.layout()
            && active != layout
        {
            return Err(self.layout_mismatch(layout));
        }

        let count = u32::try_from(self.len()).map_err(|_| {
            Error::invalid_input(format!("Too many edit list entries: {}", self.len()))
        })?;
        let mut offset = count.encode(buf)?;
        match &self.entries {
            StoredEntries::Unset => {}
            StoredEntries::V0(entries) => {
                for entry in entries {
                    offset += entry.encode(&mut buf[offset..])?;
                }
            }
            StoredEntries::V1(entries) => {
                for entry in entries {
                    offset += entry.encode(&mut buf[offset..])?;
                }
            }
        }
        Ok(offset)
    }

    /// エントリー数と、指定レイアウトのエントリー列を `buf` からデコードする
    ///
    /// 宣言されたエントリー数を読み終える前に `buf` が尽きた場合には
    /// [`ErrorKind::TruncatedInput`](crate::ErrorKind::TruncatedInput) エラーとなる
    pub fn decode(layout: ElstLayout, buf: &[u8]) -> Result<(Self, usize)> {
        let mut offset = 0;
        let count = u32::decode_at(buf, &mut offset)? as usize;

        // 巨大なエントリー数を信じてメモリを確保してしまわないように、先に残りのサイズを確認する
        let required = count.saturating_mul(layout.entry_size());
        let remaining = buf.len() - offset;
        if remaining < required {
            return Err(Error::truncated_input(format!(
                "{count} edit list entries need {required} bytes, but only {remaining} bytes remain"
            )));
        }

        let mut store = Self::new();
        match layout {
            ElstLayout::V0 => store.decode_entries::<ElstEntryV0>(buf, &mut offset, count)?,
            ElstLayout::V1 => store.decode_entries::<ElstEntryV1>(buf, &mut offset, count)?,
        }
        Ok((store, offset))
    }

    fn decode_entries<E: ElstEntry>(
        &mut self,
        buf: &[u8],
        offset: &mut usize,
        count: usize,
    ) -> Result<()> {
        for _ in 0..count {
            self.push(E::decode_at(buf, offset)?)?;
        }
        Ok(())
    }
}

/// [ISO/IEC 14496-12] EditListBox class (親: [`EdtsBox`])
///
/// エントリーのレイアウトとボックスのバージョンは常に一致する
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct ElstBox {
    layout: ElstLayout,
    flags: FullBoxFlags,
    entries: EditListEntryStore,
}

impl ElstBox {
    /// ボックス種別
    pub const TYPE: BoxType = BoxType::Normal(*b"elst");

    /// エントリーが空のボックスを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// 64 ビットのレイアウトで表現されたエントリー列からボックスを作成する
    ///
    /// 全てのエントリーが 32 ビットに収まる場合にはバージョン 0 が、
    /// そうでない場合にはバージョン 1 が選択される
    pub fn from_wide_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = ElstEntryV1>,
    {
        let wide: Vec<ElstEntryV1> = entries.into_iter().collect();
        let compact: Result<Vec<ElstEntryV0>> =
            wide.iter().copied().map(ElstEntryV0::try_from).collect();
        match compact {
            Ok(compact) => Self {
                layout: ElstLayout::V0,
                flags: FullBoxFlags::empty(),
                entries: EditListEntryStore::from_v0(compact),
            },
            Err(_) => Self {
                layout: ElstLayout::V1,
                flags: FullBoxFlags::empty(),
                entries: EditListEntryStore::from_v1(wide),
            },
        }
    }

    /// エントリーを追加する
    ///
    /// 最初の追加時にボックスのバージョンがエントリーのレイアウトに合わせて設定される
    pub fn push<E: ElstEntry>(&mut self, entry: E) -> Result<()> {
        self.entries.push(entry)?;
        self.layout = E::LAYOUT;
        Ok(())
    }

    /// エントリーの数を返す
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// 指定位置のエントリーを返す（エラー条件は [`EditListEntryStore::get()`] と同じ）
    pub fn entry<E: ElstEntry>(&self, index: usize) -> Result<&E> {
        self.entries.get(index)
    }

    /// 全てのエントリーをスライスとして返す
    pub fn entries<E: ElstEntry>(&self) -> Result<&[E]> {
        self.entries.as_slice()
    }

    /// エントリー列を返す
    pub fn entry_store(&self) -> &EditListEntryStore {
        &self.entries
    }

    /// 全てのエントリーを 64 ビットのレイアウトに揃えて返す
    pub fn to_wide_entries(&self) -> Vec<ElstEntryV1> {
        self.entries.iter_wide().collect()
    }

    /// エントリーのレイアウトを返す
    pub fn layout(&self) -> ElstLayout {
        self.layout
    }

    /// ボックスのフラグを返す
    pub fn flags(&self) -> FullBoxFlags {
        self.flags
    }

    /// ボックスのフラグを設定する
    pub fn set_flags(&mut self, flags: FullBoxFlags) {
        self.flags = flags;
    }
}

impl Encode for ElstBox {
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let header = BoxHeader::new_variable_size(Self::TYPE);
        let mut offset = header.encode(buf)?;
        offset += FullBoxHeader::from_box(self).encode(&mut buf[offset..])?;
        offset += self.entries.encode(self.layout, &mut buf[offset..])?;
        header.finalize_box_size(&mut buf[..offset])?;
        Ok(offset)
    }
}

impl Decode for ElstBox {
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        with_box_type(Self::TYPE, || {
            let (header, payload) = BoxHeader::decode_header_and_payload(buf)?;
            header.box_type.expect(Self::TYPE)?;

            within_box_range(Self::TYPE, || {
                let mut offset = 0;
                let full_header = FullBoxHeader::decode_at(payload, &mut offset)?;
                let layout = ElstLayout::from_version(full_header.version)?;

                let (entries, size) = EditListEntryStore::decode(layout, &payload[offset..])?;
                offset += size;
                if offset != payload.len() {
                    return Err(Error::malformed_box(format!(
                        "Unconsumed {} bytes at the end of the box '{}'",
                        payload.len() - offset,
                        Self::TYPE
                    )));
                }
                log::trace!(
                    "Decoded '{}' box: version={}, entries={}",
                    Self::TYPE,
                    layout.version(),
                    entries.len()
                );

                Ok((
                    Self {
                        layout,
                        flags: full_header.flags,
                        entries,
                    },
                    header.external_size() + payload.len(),
                ))
            })
        })
    }
}

impl BaseBox for ElstBox {
    fn box_type(&self) -> BoxType {
        Self::TYPE
    }

    fn children<'a>(&'a self) -> Box<dyn 'a + Iterator<Item = &'a dyn BaseBox>> {
        Box::new(core::iter::empty())
    }
}

impl FullBox for ElstBox {
    fn full_box_version(&self) -> u8 {
        self.layout.version()
    }

    fn full_box_flags(&self) -> FullBoxFlags {
        self.flags
    }
}

/// [ISO/IEC 14496-12] EditBox class
///
/// [`ElstBox`] を高々一つ所有する。未知の子ボックスはデコード時に読み飛ばされ、内容はそのまま保持される
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct EdtsBox {
    elst_box: Option<ElstBox>,
    unknown_boxes: Vec<UnknownBox>,
}

impl EdtsBox {
    /// ボックス種別
    pub const TYPE: BoxType = BoxType::Normal(*b"edts");

    /// 子ボックスを持たないボックスを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// [`ElstBox`] を設定する
    ///
    /// 以前に設定されていたボックスがあれば、その所有権を返す
    pub fn set_elst_box(&mut self, elst_box: ElstBox) -> Option<ElstBox> {
        self.elst_box.replace(elst_box)
    }

    /// 設定されている [`ElstBox`] への参照を返す
    pub fn elst_box(&self) -> Option<&ElstBox> {
        self.elst_box.as_ref()
    }

    /// デコード時に読み飛ばされた未知の子ボックス群を返す
    pub fn unknown_boxes(&self) -> &[UnknownBox] {
        &self.unknown_boxes
    }
}

impl Encode for EdtsBox {
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let header = BoxHeader::new_variable_size(Self::TYPE);
        let mut offset = header.encode(buf)?;
        if let Some(b) = &self.elst_box {
            offset += b.encode(&mut buf[offset..])?;
        }
        for b in &self.unknown_boxes {
            offset += b.encode(&mut buf[offset..])?;
        }
        header.finalize_box_size(&mut buf[..offset])?;
        Ok(offset)
    }
}

impl Decode for EdtsBox {
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        with_box_type(Self::TYPE, || {
            let (header, payload) = BoxHeader::decode_header_and_payload(buf)?;
            header.box_type.expect(Self::TYPE)?;

            let mut edts = Self::new();
            within_box_range(Self::TYPE, || {
                let mut offset = 0;
                while offset < payload.len() {
                    let (child_header, _) = BoxHeader::decode(&payload[offset..])?;
                    match child_header.box_type {
                        ElstBox::TYPE => {
                            let elst_box = ElstBox::decode_at(payload, &mut offset)?;
                            if edts.set_elst_box(elst_box).is_some() {
                                log::warn!(
                                    "Duplicate '{}' box in '{}': the later one is used",
                                    ElstBox::TYPE,
                                    Self::TYPE
                                );
                            }
                        }
                        _ => {
                            let unknown_box = UnknownBox::decode_at(payload, &mut offset)?;
                            log::debug!(
                                "Skipped unknown box '{}' ({} bytes) in '{}'",
                                unknown_box.box_type,
                                unknown_box.payload.len(),
                                Self::TYPE
                            );
                            edts.unknown_boxes.push(unknown_box);
                        }
                    }
                }
                Ok(())
            })?;

            Ok((edts, header.external_size() + payload.len()))
        })
    }
}

impl BaseBox for EdtsBox {
    fn box_type(&self) -> BoxType {
        Self::TYPE
    }

    fn children<'a>(&'a self) -> Box<dyn 'a + Iterator<Item = &'a dyn BaseBox>> {
        Box::new(
            core::iter::empty()
                .chain(self.elst_box.iter().map(as_box_object))
                .chain(self.unknown_boxes.iter().map(as_box_object)),
        )
    }
}
