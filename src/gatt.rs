//! External interfaces (spec §6): the GATT profile table and the iBeacon advertising
//! encoder. The live BLE transport (advertising radio, MTU negotiation, connection
//! management) is an external collaborator; this module only specifies and encodes its
//! data shapes, mirroring how the teacher's `gatt::characteristic` module describes
//! characteristics as data, not live transport objects.

/// A 128-bit UUID, stored big-endian as it appears on the wire.
pub type Uuid128 = [u8; 16];

/// One characteristic of the "Door Access" GATT service.
#[derive(Debug, Clone, Copy)]
pub struct CharacteristicSpec {
    pub name: &'static str,
    pub uuid: Uuid128,
    pub readable: bool,
    pub writable: bool,
    pub notify: bool,
    pub indicate: bool,
}

/// `Challenge`: Read, Notify; 16-byte nonce.
pub const CHALLENGE_CHAR: CharacteristicSpec = CharacteristicSpec {
    name: "Challenge",
    uuid: [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x12, 0x35, 0, 0],
    readable: true,
    writable: false,
    notify: true,
    indicate: false,
};

/// `Auth`: Write; 94..512 B Variant-A frame.
pub const AUTH_CHAR: CharacteristicSpec = CharacteristicSpec {
    name: "Auth",
    uuid: [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x12, 0x36, 0, 0],
    readable: false,
    writable: true,
    notify: false,
    indicate: false,
};

/// `Response`: Indicate; <=256 B, acknowledged delivery.
pub const RESPONSE_CHAR: CharacteristicSpec = CharacteristicSpec {
    name: "Response",
    uuid: [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x12, 0x37, 0, 0],
    readable: false,
    writable: false,
    notify: false,
    indicate: true,
};

/// The Symmetric-Key variant's single `DataTransfer` characteristic (Write Without Response
/// + Notify, CCCD 0x2902).
pub const DATA_TRANSFER_CHAR: CharacteristicSpec = CharacteristicSpec {
    name: "DataTransfer",
    uuid: [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x12, 0x38, 0, 0],
    readable: false,
    writable: true,
    notify: true,
    indicate: false,
};

/// Standard Client Characteristic Configuration Descriptor UUID.
pub const CCCD_UUID: u16 = 0x2902;

/// Apple's iBeacon manufacturer-specific advertising data block (spec §6). Pure encoding;
/// no radio configuration.
///
/// Layout: `CompanyID(0x004C, LE) | Type(0x02) | Length(0x15) | UUID(16, BE) | Major(2, BE) |
/// Minor(2, BE) | TxPower(1, signed dBm)`.
pub fn encode_ibeacon(uuid: &Uuid128, major: u16, minor: u16, tx_power: i8) -> [u8; 25] {
    let mut out = [0u8; 25];
    out[0..2].copy_from_slice(&0x004Cu16.to_le_bytes());
    out[2] = 0x02;
    out[3] = 0x15;
    out[4..20].copy_from_slice(uuid);
    out[20..22].copy_from_slice(&major.to_be_bytes());
    out[22..24].copy_from_slice(&minor.to_be_bytes());
    out[24] = tx_power as u8;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ibeacon_layout_matches_spec() {
        let uuid = [0x11; 16];
        let packet = encode_ibeacon(&uuid, 0x0001, 0x0002, -59);
        assert_eq!(&packet[0..2], &[0x4C, 0x00]);
        assert_eq!(packet[2], 0x02);
        assert_eq!(packet[3], 0x15);
        assert_eq!(&packet[4..20], &uuid[..]);
        assert_eq!(&packet[20..22], &[0x00, 0x01]);
        assert_eq!(&packet[22..24], &[0x00, 0x02]);
        assert_eq!(packet[24] as i8, -59);
    }
}
