#![no_main]

use libfuzzer_sys::fuzz_target;
use shiguredo_mp4_edts::{Decode, Encode, boxes::ElstBox};

fuzz_target!(|data: &[u8]| {
    if let Ok((elst, size)) = ElstBox::decode(data) {
        // 32 ビットのサイズフィールドを持つ入力は、再エンコードで同じバイト列に戻る
        let encoded = elst.encode_to_vec().expect("re-encode");
        if u32::from_be_bytes([data[0], data[1], data[2], data[3]]) > 1 {
            assert_eq!(&encoded[..], &data[..size]);
        }
    }
});
