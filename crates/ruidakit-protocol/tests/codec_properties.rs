use proptest::prelude::*;
use ruidakit_protocol::codec::{
    checksum, decode_coord, decode_power, decode_rel_coord, decode_uint, encode_coord,
    encode_power, encode_rel_coord, encode_uint35, fits_rel_coord, swizzle, unswizzle,
    verify_chunk,
};

proptest! {
    #[test]
    fn swizzle_is_invertible(payload in proptest::collection::vec(any::<u8>(), 0..256), magic in any::<u8>()) {
        prop_assert_eq!(unswizzle(&swizzle(&payload, magic), magic), payload);
    }

    #[test]
    fn coord_keeps_micron_resolution(microns in -17_000_000_000i64..17_000_000_000i64) {
        let mm = microns as f64 / 1000.0;
        let encoded = encode_coord(mm);
        prop_assert!(encoded.iter().all(|b| b & 0x80 == 0));
        prop_assert!((decode_coord(&encoded) - mm).abs() < 5e-4);
    }

    #[test]
    fn rel_coord_in_range(microns in -8191i64..=8191i64) {
        let mm = microns as f64 / 1000.0;
        prop_assert!(fits_rel_coord(mm));
        prop_assert!((decode_rel_coord(&encode_rel_coord(mm)) - mm).abs() < 5e-4);
    }

    #[test]
    fn power_stays_within_a_step(pct in 0.0f64..=100.0) {
        prop_assert!((decode_power(&encode_power(pct)) - pct).abs() <= 100.0 / 16383.0);
    }

    #[test]
    fn uint35_masks_high_bits(value in any::<u64>()) {
        prop_assert_eq!(decode_uint(&encode_uint35(value)), value & 0x7_FFFF_FFFF);
    }

    #[test]
    fn checksum_prefix_verifies(payload in proptest::collection::vec(any::<u8>(), 0..1470)) {
        let mut chunk = checksum(&payload).to_vec();
        chunk.extend_from_slice(&payload);
        prop_assert!(verify_chunk(&chunk));
    }
}
