#![no_main]

use libfuzzer_sys::fuzz_target;
use shiguredo_mp4_edts::{Decode, Encode, boxes::EdtsBox};

fuzz_target!(|data: &[u8]| {
    if let Ok((edts, _)) = EdtsBox::decode(data) {
        let encoded = edts.encode_to_vec().expect("re-encode");
        let (decoded, _) = EdtsBox::decode(&encoded).expect("decode re-encoded box");
        assert_eq!(decoded, edts);
    }
});
