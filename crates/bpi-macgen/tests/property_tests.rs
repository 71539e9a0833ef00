//! Property tests for serial parsing and address derivation

use bpi_macgen::{INTERFACES, extract_serial_bytes, generate_all};
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_any_serial_yields_three_bytes(serial in ".{0,40}") {
        let bytes = extract_serial_bytes(&serial);
        prop_assert_eq!(bytes.len(), 3);
    }

    #[test]
    fn prop_hex_tail_is_decoded(
        prefix in "[A-Z0-9-]{0,12}",
        tail in proptest::array::uniform3(any::<u8>()),
    ) {
        let serial = format!("{prefix}{:02x}{:02X}{:02x}", tail[0], tail[1], tail[2]);
        prop_assert_eq!(extract_serial_bytes(&serial), tail);
    }

    #[test]
    fn prop_addresses_share_serial_prefix(serial in proptest::array::uniform3(any::<u8>())) {
        let assignments = generate_all(serial);
        prop_assert_eq!(assignments.len(), INTERFACES.len());
        for (n, assignment) in assignments.iter().enumerate() {
            let octets = assignment.mac.0;
            prop_assert_eq!(octets[0], 0x02);
            prop_assert_eq!(octets[1], assignment.interface.kind as u8);
            prop_assert_eq!(octets[3], serial[0]);
            prop_assert_eq!(octets[4], serial[1]);
            prop_assert_eq!(octets[5], serial[2].wrapping_add(n as u8));
        }
    }
}
