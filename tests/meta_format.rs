//! Tests for the layout meta-index record format
//!
//! Keys and values written by one client must decode in any other, so the
//! byte layout is pinned here.

use dix_core::meta::{
    decode_descr, decode_layout, decode_layouts, decode_ldescrs, encode_layout, encode_layouts,
    encode_ldescrs, layout_id_key, EncodedBatch, LAYOUT_BY_DESCR, LAYOUT_BY_ID, META_HEADER_SIZE,
    META_MAGIC,
};
use dix_core::{
    HashFunction, Imask, IndexId, IndexLayout, LayoutDescriptor, MaskRange, MetaFormatError,
    IMASK_INF, LAYOUT_INDEX, LDESCR_INDEX,
};

fn descr() -> LayoutDescriptor {
    let mask = Imask::new(vec![MaskRange::new(8, 15), MaskRange::open(64)]).unwrap();
    LayoutDescriptor::new(3, HashFunction::Keccak, mask)
}

#[test]
fn test_header_constants() {
    assert_eq!(META_MAGIC, *b"DXL1");
    assert_eq!(META_HEADER_SIZE, 5);
    assert_eq!(LAYOUT_BY_ID, 1);
    assert_eq!(LAYOUT_BY_DESCR, 2);
}

#[test]
fn test_meta_index_ids() {
    assert_eq!(LAYOUT_INDEX, IndexId::new(0x6978_0000_0000_0000, 1));
    assert_eq!(LDESCR_INDEX, IndexId::new(0x6978_0000_0000_0000, 2));
    assert!(LAYOUT_INDEX.is_meta());
    assert!(!IndexId::new(1, 1).is_meta());
}

#[test]
fn test_layout_by_id_bytes() {
    let bytes = encode_layout(&IndexLayout::ById(0x0102_0304_0506_0708)).unwrap();
    assert_eq!(bytes.len(), META_HEADER_SIZE + 8);
    assert_eq!(&bytes[0..4], b"DXL1");
    assert_eq!(bytes[4], LAYOUT_BY_ID);
    assert_eq!(&bytes[5..], &[8, 7, 6, 5, 4, 3, 2, 1]);
}

#[test]
fn test_descriptor_value() {
    let bytes = encode_layout(&IndexLayout::Descr(descr())).unwrap();
    assert_eq!(&bytes[0..4], b"DXL1");
    assert_eq!(bytes[4], LAYOUT_BY_DESCR);

    let recovered = decode_descr(&bytes).unwrap();
    assert_eq!(recovered, descr());
    assert_eq!(recovered.imask.ranges()[1].end, IMASK_INF);
}

#[test]
fn test_keys_sort_like_ids() {
    let ids = [
        IndexId::new(0, 0xffff),
        IndexId::new(1, 0),
        IndexId::new(1, 1),
        IndexId::new(0x100, 0),
    ];
    let keys: Vec<[u8; 16]> = ids.iter().map(IndexId::to_bytes).collect();
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
    assert!(layout_id_key(255) < layout_id_key(256));
}

#[test]
fn test_layout_batch() {
    let items = vec![
        (IndexId::new(1, 2), IndexLayout::ById(9)),
        (IndexId::new(3, 4), IndexLayout::Descr(descr())),
    ];
    let batch = encode_layouts(&items).unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.keys[0], IndexId::new(1, 2).to_bytes().to_vec());
    assert_eq!(decode_layouts(&batch).unwrap(), items);
}

#[test]
fn test_ldescr_batch() {
    let items = vec![
        (1, descr()),
        (u64::MAX, LayoutDescriptor::new(1, HashFunction::None, Imask::empty())),
    ];
    let batch = encode_ldescrs(&items).unwrap();
    assert_eq!(batch.keys[1], vec![0xff; 8]);
    assert_eq!(decode_ldescrs(&batch).unwrap(), items);
}

#[test]
fn test_rejects_foreign_values() {
    assert_eq!(
        decode_layout(b"PIR2\x01\0\0\0\0\0\0\0\0"),
        Err(MetaFormatError::InvalidMagic { actual: *b"PIR2" })
    );
    assert_eq!(decode_layout(b"DXL"), Err(MetaFormatError::ValueTooShort { actual: 3 }));
    assert_eq!(decode_layout(b"DXL1\x07"), Err(MetaFormatError::UnknownTag(7)));
    assert_eq!(
        decode_layout(b"DXL1\x01\x01\x02"),
        Err(MetaFormatError::LayoutIdLength { actual: 2 })
    );
    assert!(matches!(decode_layout(b"DXL1\x02\xff"), Err(MetaFormatError::Descriptor(_))));
}

#[test]
fn test_rejects_bad_batches() {
    assert_eq!(encode_layouts(&[]), Err(MetaFormatError::EmptyBatch));
    let batch = EncodedBatch {
        keys: vec![vec![0; 16]],
        vals: vec![],
    };
    assert_eq!(
        decode_layouts(&batch),
        Err(MetaFormatError::LengthMismatch { keys: 1, vals: 0 })
    );
    let batch = EncodedBatch {
        keys: vec![vec![0; 4]],
        vals: vec![encode_layout(&IndexLayout::ById(1)).unwrap()],
    };
    assert_eq!(
        decode_layouts(&batch),
        Err(MetaFormatError::KeyLength { expected: 16, actual: 4 })
    );
}
