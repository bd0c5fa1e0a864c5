use shiguredo_mp4_edts::{
    BaseBox, BoxSize, BoxType, Decode, Encode, ErrorKind, FixedPointNumber, FullBox, FullBoxFlags, Result,
    boxes::{EditListEntryStore, EdtsBox, ElstBox, ElstEntryV0, ElstEntryV1, ElstLayout},
};

fn entry_v0(segment_duration: u32, media_time: i32) -> ElstEntryV0 {
    ElstEntryV0 {
        segment_duration,
        media_time,
        media_rate: FixedPointNumber::new(1, 0),
    }
}

fn entry_v1(segment_duration: u64, media_time: i64) -> ElstEntryV1 {
    ElstEntryV1 {
        segment_duration,
        media_time,
        media_rate: FixedPointNumber::new(1, 0),
    }
}

/// 1000 / 0 と 500 / -1 (空の編集) の二つのエントリーを持つバージョン 0 の elst ボックス
const ELST_V0_BYTES: [u8; 40] = [
    0x00, 0x00, 0x00, 0x28, b'e', b'l', b's', b't', // header
    0x00, 0x00, 0x00, 0x00, // version / flags
    0x00, 0x00, 0x00, 0x02, // entry_count
    0x00, 0x00, 0x03, 0xE8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, // entry 1
    0x00, 0x00, 0x01, 0xF4, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x01, 0x00, 0x00, // entry 2
];

fn scenario_elst_box() -> Result<ElstBox> {
    let mut elst_box = ElstBox::new();
    elst_box.push(entry_v0(1000, 0))?;
    elst_box.push(entry_v0(500, ElstEntryV0::EMPTY_EDIT_MEDIA_TIME))?;
    Ok(elst_box)
}

#[test]
fn elst_box_version0_scenario() -> Result<()> {
    let elst_box = scenario_elst_box()?;
    assert_eq!(elst_box.full_box_version(), 0);
    assert_eq!(elst_box.num_entries(), 2);

    let encoded = elst_box.encode_to_vec()?;
    assert_eq!(encoded, ELST_V0_BYTES);

    let (decoded, size) = ElstBox::decode(&encoded)?;
    assert_eq!(size, encoded.len());
    assert_eq!(decoded.full_box_version(), 0);
    assert_eq!(decoded.layout(), ElstLayout::V0);
    assert_eq!(decoded.num_entries(), 2);
    assert_eq!(*decoded.entry::<ElstEntryV0>(0)?, entry_v0(1000, 0));
    assert_eq!(*decoded.entry::<ElstEntryV0>(1)?, entry_v0(500, -1));
    assert!(decoded.entry::<ElstEntryV0>(1)?.is_empty_edit());
    assert_eq!(decoded, elst_box);
    Ok(())
}

#[test]
fn elst_box_version1_roundtrip() -> Result<()> {
    let mut elst_box = ElstBox::new();
    elst_box.push(entry_v1(u64::from(u32::MAX) + 1, -1))?;
    elst_box.push(entry_v1(10, i64::MAX))?;
    assert_eq!(elst_box.full_box_version(), 1);

    let encoded = elst_box.encode_to_vec()?;
    assert_eq!(encoded.len(), 8 + 4 + 4 + 2 * 20);
    assert_eq!(&encoded[..12], &[0, 0, 0, 56, b'e', b'l', b's', b't', 1, 0, 0, 0]);

    let (decoded, _) = ElstBox::decode(&encoded)?;
    assert_eq!(decoded.layout(), ElstLayout::V1);
    assert_eq!(decoded.entries::<ElstEntryV1>()?, elst_box.entries::<ElstEntryV1>()?);
    Ok(())
}

#[test]
fn empty_version1_box_keeps_its_version() -> Result<()> {
    let bytes = [
        0x00, 0x00, 0x00, 0x10, b'e', b'l', b's', b't', 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ];
    let (decoded, _) = ElstBox::decode(&bytes)?;
    assert_eq!(decoded.num_entries(), 0);
    assert_eq!(decoded.entry_store().layout(), None);
    assert_eq!(decoded.full_box_version(), 1);
    assert_eq!(decoded.encode_to_vec()?, bytes);
    Ok(())
}

#[test]
fn flags_are_preserved() -> Result<()> {
    let mut bytes = ELST_V0_BYTES;
    bytes[11] = 0x01;
    let (decoded, _) = ElstBox::decode(&bytes)?;
    assert_eq!(decoded.flags(), FullBoxFlags::new(1));
    assert_eq!(decoded.encode_to_vec()?, bytes);
    Ok(())
}

#[test]
fn num_entries_counts_pushes() -> Result<()> {
    let mut elst_box = ElstBox::new();
    for i in 0..10 {
        elst_box.push(entry_v1(i, i as i64))?;
        assert_eq!(elst_box.num_entries(), i as usize + 1);
    }
    Ok(())
}

#[test]
fn mixed_layout_push_is_rejected() -> Result<()> {
    let mut elst_box = scenario_elst_box()?;
    let before = elst_box.clone();

    let err = elst_box.push(entry_v1(1, 1)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::LayoutConflict);
    assert_eq!(elst_box, before);
    assert_eq!(elst_box.full_box_version(), 0);

    let mut store = EditListEntryStore::new();
    store.push(entry_v1(1, 1))?;
    let err = store.push(entry_v0(1, 1)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::LayoutConflict);
    assert_eq!(store.len(), 1);
    assert_eq!(store.layout(), Some(ElstLayout::V1));
    Ok(())
}

#[test]
fn first_push_decides_version() -> Result<()> {
    let bytes = [
        0x00, 0x00, 0x00, 0x10, b'e', b'l', b's', b't', 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ];
    let (mut elst_box, _) = ElstBox::decode(&bytes)?;
    assert_eq!(elst_box.full_box_version(), 1);

    elst_box.push(entry_v0(1, 0))?;
    assert_eq!(elst_box.full_box_version(), 0);
    Ok(())
}

#[test]
fn entry_index_out_of_range() -> Result<()> {
    let elst_box = scenario_elst_box()?;
    let err = elst_box
        .entry::<ElstEntryV0>(elst_box.num_entries())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::OutOfRange);

    // 範囲外の場合はレイアウトの不一致よりも先に報告される
    let err = elst_box.entry::<ElstEntryV1>(2).unwrap_err();
    assert_eq!(err.kind, ErrorKind::OutOfRange);

    let store = EditListEntryStore::new();
    let err = store.get::<ElstEntryV0>(0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::OutOfRange);
    Ok(())
}

#[test]
fn entry_layout_mismatch() -> Result<()> {
    let elst_box = scenario_elst_box()?;
    let err = elst_box.entry::<ElstEntryV1>(0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::LayoutMismatch);

    let err = elst_box.entries::<ElstEntryV1>().unwrap_err();
    assert_eq!(err.kind, ErrorKind::LayoutMismatch);

    assert!(ElstBox::new().entries::<ElstEntryV1>()?.is_empty());
    Ok(())
}

#[test]
fn store_encode_with_other_layout_fails() -> Result<()> {
    let mut store = EditListEntryStore::new();
    let mut buf = [0; 64];
    assert_eq!(store.encode(ElstLayout::V1, &mut buf)?, 4);

    store.push(entry_v0(1, 2))?;
    let err = store.encode(ElstLayout::V1, &mut buf).unwrap_err();
    assert_eq!(err.kind, ErrorKind::LayoutMismatch);
    assert_eq!(store.encode(ElstLayout::V0, &mut buf)?, 4 + 12);
    Ok(())
}

#[test]
fn store_decode_truncated_input() {
    // entry_count は 2 だがエントリーは一つ分しかない
    let bytes = &ELST_V0_BYTES[12..28];
    let err = EditListEntryStore::decode(ElstLayout::V0, bytes).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TruncatedInput);

    let err = EditListEntryStore::decode(ElstLayout::V0, &[0, 0]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TruncatedInput);
}

#[test]
fn store_decode_reads_only_declared_entries() -> Result<()> {
    let (store, size) = EditListEntryStore::decode(ElstLayout::V0, &ELST_V0_BYTES[12..])?;
    assert_eq!(size, 28);
    assert_eq!(store.len(), 2);
    assert_eq!(store.layout(), Some(ElstLayout::V0));
    Ok(())
}

#[test]
fn elst_declared_size_shorter_than_content() {
    let mut bytes = ELST_V0_BYTES;
    bytes[3] = 28; // エントリー一つ分しか範囲に含まれない
    let err = ElstBox::decode(&bytes).unwrap_err();
    assert_eq!(err.kind, ErrorKind::MalformedBox);
    assert_eq!(err.box_type, Some(ElstBox::TYPE));

    // フルボックスヘッダーすら収まらない
    let mut bytes = ELST_V0_BYTES;
    bytes[3] = 10;
    let err = ElstBox::decode(&bytes).unwrap_err();
    assert_eq!(err.kind, ErrorKind::MalformedBox);
}

#[test]
fn elst_unconsumed_trailing_bytes() {
    let mut bytes = ELST_V0_BYTES.to_vec();
    bytes.extend_from_slice(&[0; 4]);
    bytes[3] = 44;
    let err = ElstBox::decode(&bytes).unwrap_err();
    assert_eq!(err.kind, ErrorKind::MalformedBox);
}

#[test]
fn elst_truncated_input() {
    let err = ElstBox::decode(&ELST_V0_BYTES[..30]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TruncatedInput);
    assert_eq!(err.box_type, Some(ElstBox::TYPE));

    let err = ElstBox::decode(&ELST_V0_BYTES[..6]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TruncatedInput);
}

#[test]
fn elst_unsupported_version() {
    let mut bytes = ELST_V0_BYTES;
    bytes[8] = 2;
    let err = ElstBox::decode(&bytes).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsupportedVersion);
    assert_eq!(err.box_type, Some(ElstBox::TYPE));
}

#[test]
fn elst_wrong_box_type() {
    let mut bytes = ELST_V0_BYTES;
    bytes[4..8].copy_from_slice(b"free");
    let err = ElstBox::decode(&bytes).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidData);
}

#[test]
fn elst_encode_insufficient_buffer() -> Result<()> {
    let elst_box = scenario_elst_box()?;
    let mut buf = [0; 39];
    let err = elst_box.encode(&mut buf).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InsufficientBuffer);

    let mut buf = [0; 40];
    assert_eq!(elst_box.encode(&mut buf)?, 40);
    Ok(())
}

#[test]
fn from_wide_entries_selects_version() -> Result<()> {
    let elst_box = ElstBox::from_wide_entries([entry_v1(1000, 0), entry_v1(500, -1)]);
    assert_eq!(elst_box.layout(), ElstLayout::V0);
    assert_eq!(elst_box.encode_to_vec()?, ELST_V0_BYTES);

    let elst_box = ElstBox::from_wide_entries([entry_v1(1000, 0), entry_v1(1, i64::MIN)]);
    assert_eq!(elst_box.layout(), ElstLayout::V1);
    assert_eq!(elst_box.num_entries(), 2);

    let elst_box = ElstBox::from_wide_entries(Vec::<ElstEntryV1>::new());
    assert_eq!(elst_box.layout(), ElstLayout::V0);
    assert_eq!(elst_box.num_entries(), 0);
    Ok(())
}

#[test]
fn to_wide_entries_widens_v0() -> Result<()> {
    let elst_box = scenario_elst_box()?;
    assert_eq!(
        elst_box.to_wide_entries(),
        vec![entry_v1(1000, 0), entry_v1(500, -1)]
    );
    assert!(elst_box.to_wide_entries()[1].is_empty_edit());
    Ok(())
}

#[test]
fn narrowing_entry_conversion() {
    assert_eq!(
        ElstEntryV0::try_from(entry_v1(7, -1)).unwrap(),
        entry_v0(7, -1)
    );

    let err = ElstEntryV0::try_from(entry_v1(u64::from(u32::MAX) + 1, 0)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidInput);

    let err = ElstEntryV0::try_from(entry_v1(0, i64::from(i32::MIN) - 1)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidInput);
}

#[test]
fn edts_box_without_elst_is_header_only() -> Result<()> {
    let edts_box = EdtsBox::new();
    let encoded = edts_box.encode_to_vec()?;
    assert_eq!(encoded, [0x00, 0x00, 0x00, 0x08, b'e', b'd', b't', b's']);

    let (decoded, size) = EdtsBox::decode(&encoded)?;
    assert_eq!(size, 8);
    assert!(decoded.elst_box().is_none());
    assert!(decoded.unknown_boxes().is_empty());
    Ok(())
}

#[test]
fn edts_box_with_elst_roundtrip() -> Result<()> {
    let mut edts_box = EdtsBox::new();
    assert!(edts_box.set_elst_box(scenario_elst_box()?).is_none());

    let encoded = edts_box.encode_to_vec()?;
    assert_eq!(encoded.len(), 8 + ELST_V0_BYTES.len());
    assert_eq!(&encoded[..8], &[0x00, 0x00, 0x00, 0x30, b'e', b'd', b't', b's']);
    assert_eq!(&encoded[8..], ELST_V0_BYTES);

    let (decoded, _) = EdtsBox::decode(&encoded)?;
    let elst_box = decoded.elst_box().expect("elst box");
    assert_eq!(elst_box.num_entries(), 2);
    assert_eq!(*elst_box.entry::<ElstEntryV0>(1)?, entry_v0(500, -1));

    let child_types: Vec<BoxType> = decoded.children().map(|b| b.box_type()).collect();
    assert_eq!(child_types, vec![ElstBox::TYPE]);
    Ok(())
}

#[test]
fn set_elst_box_releases_previous_box() -> Result<()> {
    let mut edts_box = EdtsBox::new();
    edts_box.set_elst_box(scenario_elst_box()?);

    let previous = edts_box.set_elst_box(ElstBox::new()).expect("previous box");
    assert_eq!(previous.num_entries(), 2);
    assert_eq!(edts_box.elst_box().map(|b| b.num_entries()), Some(0));
    Ok(())
}

#[test]
fn edts_box_skips_unknown_children() -> Result<()> {
    let mut bytes = vec![0x00, 0x00, 0x00, 0x3C, b'e', b'd', b't', b's'];
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x0C, b'f', b'r', b'e', b'e', 1, 2, 3, 4]);
    bytes.extend_from_slice(&ELST_V0_BYTES);
    assert_eq!(bytes.len(), 0x3C);

    let (decoded, size) = EdtsBox::decode(&bytes)?;
    assert_eq!(size, bytes.len());
    assert_eq!(decoded.elst_box().map(|b| b.num_entries()), Some(2));
    assert_eq!(decoded.unknown_boxes().len(), 1);

    let unknown = &decoded.unknown_boxes()[0];
    assert_eq!(unknown.box_type, BoxType::Normal(*b"free"));
    assert_eq!(unknown.payload, [1, 2, 3, 4]);
    assert!(unknown.is_unknown_box());

    // 未知のボックスは elst の後ろに書き戻される
    let encoded = decoded.encode_to_vec()?;
    assert_eq!(encoded.len(), bytes.len());
    assert_eq!(&encoded[8..48], ELST_V0_BYTES);
    assert_eq!(&encoded[48..], &bytes[8..20]);
    Ok(())
}

#[test]
fn edts_box_later_elst_wins() -> Result<()> {
    let mut second = ElstBox::new();
    second.push(entry_v1(3, 3))?;

    let mut bytes = vec![0x00, 0x00, 0x00, 0x00, b'e', b'd', b't', b's'];
    bytes.extend_from_slice(&ELST_V0_BYTES);
    bytes.extend_from_slice(&second.encode_to_vec()?);
    let size = bytes.len() as u8;
    bytes[3] = size;

    let (decoded, _) = EdtsBox::decode(&bytes)?;
    assert_eq!(decoded.elst_box(), Some(&second));
    assert!(decoded.unknown_boxes().is_empty());
    Ok(())
}

#[test]
fn edts_child_exceeds_container_range() {
    let bytes = [
        0x00, 0x00, 0x00, 0x10, b'e', b'd', b't', b's', // edts
        0x00, 0x00, 0x00, 0x64, b'f', b'r', b'e', b'e', // 範囲外まで続く子ボックス
        0x00, 0x00, 0x00, 0x00,
    ];
    let err = EdtsBox::decode(&bytes).unwrap_err();
    assert_eq!(err.kind, ErrorKind::MalformedBox);
    assert_eq!(err.box_type, Some(BoxType::Normal(*b"free")));

    // elst が edts の残りより大きなサイズを宣言している
    let mut bytes = vec![0x00, 0x00, 0x00, 0x20, b'e', b'd', b't', b's'];
    bytes.extend_from_slice(&ELST_V0_BYTES[..24]);
    let err = EdtsBox::decode(&bytes).unwrap_err();
    assert_eq!(err.kind, ErrorKind::MalformedBox);
    assert_eq!(err.box_type, Some(ElstBox::TYPE));
}

#[test]
fn edts_box_keeps_large_size_unknown_child() -> Result<()> {
    let mut bytes = vec![0x00, 0x00, 0x00, 0x24, b'e', b'd', b't', b's'];
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, b'f', b'r', b'e', b'e']);
    bytes.extend_from_slice(&20u64.to_be_bytes());
    bytes.extend_from_slice(&[9, 9, 9, 9]);
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x08, b's', b'k', b'i', b'p']);
    assert_eq!(bytes.len(), 0x24);

    let (decoded, size) = EdtsBox::decode(&bytes)?;
    assert_eq!(size, bytes.len());
    assert_eq!(decoded.unknown_boxes().len(), 2);
    assert_eq!(decoded.unknown_boxes()[0].box_size, BoxSize::U64(20));

    let encoded = decoded.encode_to_vec()?;
    assert_eq!(encoded, bytes);
    let (redecoded, _) = EdtsBox::decode(&encoded)?;
    assert_eq!(redecoded, decoded);
    Ok(())
}

#[test]
fn edts_box_keeps_variable_size_unknown_child() -> Result<()> {
    let mut bytes = vec![0x00, 0x00, 0x00, 0x3A, b'e', b'd', b't', b's'];
    bytes.extend_from_slice(&ELST_V0_BYTES);
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, b'f', b'r', b'e', b'e', 1, 2]);
    assert_eq!(bytes.len(), 0x3A);

    let (decoded, _) = EdtsBox::decode(&bytes)?;
    assert_eq!(decoded.unknown_boxes()[0].box_size, BoxSize::U32(0));
    assert_eq!(decoded.unknown_boxes()[0].payload, [1, 2]);

    let encoded = decoded.encode_to_vec()?;
    assert_eq!(encoded, bytes);
    Ok(())
}

#[test]
fn edts_child_header_cannot_be_parsed() {
    let bytes = [
        0x00, 0x00, 0x00, 0x0C, b'e', b'd', b't', b's', 0x00, 0x00, 0x00, 0x08,
    ];
    let err = EdtsBox::decode(&bytes).unwrap_err();
    assert_eq!(err.kind, ErrorKind::MalformedBox);

    let bytes = [
        0x00, 0x00, 0x00, 0x10, b'e', b'd', b't', b's', 0x00, 0x00, 0x00, 0x02, b'f', b'r', b'e',
        b'e',
    ];
    let err = EdtsBox::decode(&bytes).unwrap_err();
    assert_eq!(err.kind, ErrorKind::MalformedBox);
}

#[test]
fn edts_propagates_elst_errors() {
    let mut bytes = vec![0x00, 0x00, 0x00, 0x30, b'e', b'd', b't', b's'];
    bytes.extend_from_slice(&ELST_V0_BYTES);
    bytes[16] = 5; // elst のバージョン
    let err = EdtsBox::decode(&bytes).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsupportedVersion);
    assert_eq!(err.box_type, Some(ElstBox::TYPE));
}
