//! MP4 の編集ボックス（`edts` / `elst`）のエンコードおよびデコードを行うためのライブラリ
//!
//! # Examples
//!
//! ```
//! use shiguredo_mp4_edts::{
//!     Decode, Encode, FixedPointNumber,
//!     boxes::{EdtsBox, ElstBox, ElstEntryV0},
//! };
//!
//! let mut elst_box = ElstBox::new();
//! elst_box.push(ElstEntryV0 {
//!     segment_duration: 1000,
//!     media_time: 0,
//!     media_rate: FixedPointNumber::new(1, 0),
//! })?;
//!
//! let mut edts_box = EdtsBox::new();
//! edts_box.set_elst_box(elst_box);
//!
//! let bytes = edts_box.encode_to_vec()?;
//! let (decoded, size) = EdtsBox::decode(&bytes)?;
//! assert_eq!(size, bytes.len());
//! assert_eq!(decoded, edts_box);
//! # Ok::<(), shiguredo_mp4_edts::Error>(())
//! ```
#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;

mod basic_types;
pub mod boxes;
mod boxes_edts;
mod codec;

pub use basic_types::{
    BaseBox, BoxHeader, BoxSize, BoxType, FixedPointNumber, FullBox, FullBoxFlags, FullBoxHeader,
};
pub use codec::{Decode, Encode, Error, ErrorKind, Result};
