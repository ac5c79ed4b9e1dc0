// USB Communications Device Class, Abstract Control Model. Only the pieces needed to configure
// the line and toggle the modem control lines are here.
use crate::device::base::{LineParameters, Parity, StopBits};
use byteorder::{ByteOrder, LittleEndian};

pub const CLASS_COMMUNICATIONS: u8 = 0x02;
pub const SUBCLASS_ACM: u8 = 0x02;
pub const CLASS_CDC_DATA: u8 = 0x0a;

pub const SET_LINE_CODING: u8 = 0x20;
pub const SET_CONTROL_LINE_STATE: u8 = 0x22;

pub const CONTROL_LINE_DTR: u16 = 0x01;
pub const CONTROL_LINE_RTS: u16 = 0x02;

const CS_INTERFACE: u8 = 0x24;
const UNION_FUNCTIONAL: u8 = 0x06;

/// Reads the Union functional descriptor out of a communications interface's extra bytes,
/// returning the controlling interface and the interfaces it owns.
pub fn union_interfaces(extra: &[u8]) -> Option<(u8, Vec<u8>)> {
    let mut remaining = extra;
    while remaining.len() >= 2 {
        let length = remaining[0] as usize;
        if length < 2 || length > remaining.len() {
            return None;
        }

        let descriptor = &remaining[..length];
        if length >= 5 && descriptor[1] == CS_INTERFACE && descriptor[2] == UNION_FUNCTIONAL {
            return Some((descriptor[3], descriptor[4..].to_vec()));
        }
        remaining = &remaining[length..];
    }
    None
}

pub fn line_coding(parameters: &LineParameters) -> [u8; 7] {
    let mut coding = [0; 7];
    LittleEndian::write_u32(&mut coding[0..4], parameters.baud_rate);
    coding[4] = match parameters.stop_bits {
        StopBits::One => 0,
        StopBits::OnePointFive => 1,
        StopBits::Two => 2,
    };
    coding[5] = match parameters.parity {
        Parity::None => 0,
        Parity::Odd => 1,
        Parity::Even => 2,
        Parity::Mark => 3,
        Parity::Space => 4,
    };
    coding[6] = parameters.data_bits;
    coding
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_115200_8n1() {
        let coding = line_coding(&LineParameters::default());
        assert_eq!(coding, [0x00, 0xc2, 0x01, 0x00, 0x00, 0x00, 0x08]);
    }

    #[test]
    fn encodes_parity_and_stop_bits() {
        let coding = line_coding(&LineParameters {
            baud_rate: 9600,
            data_bits: 7,
            stop_bits: StopBits::Two,
            parity: Parity::Even,
        });
        assert_eq!(coding, [0x80, 0x25, 0x00, 0x00, 0x02, 0x02, 0x07]);
    }

    #[test]
    fn finds_union_after_other_functional_descriptors() {
        // Header, Call Management, ACM, then Union (control 2, data 3), as a second port on a
        // composite device would report them.
        let extra = [
            0x05, 0x24, 0x00, 0x10, 0x01, //
            0x05, 0x24, 0x01, 0x00, 0x03, //
            0x04, 0x24, 0x02, 0x02, //
            0x05, 0x24, 0x06, 0x02, 0x03,
        ];
        assert_eq!(union_interfaces(&extra), Some((2, vec![3])));
    }

    #[test]
    fn missing_or_malformed_union() {
        assert_eq!(union_interfaces(&[]), None);
        assert_eq!(union_interfaces(&[0x05, 0x24, 0x00, 0x10, 0x01]), None);

        // Length running past the end of the buffer.
        assert_eq!(union_interfaces(&[0x09, 0x24, 0x06, 0x00, 0x01]), None);

        // A zero length would never advance.
        assert_eq!(union_interfaces(&[0x00, 0x24, 0x06, 0x00, 0x01]), None);
    }
}
