// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Encoding of control packets.
//!
//! A control packet is a fixed-width binary word written out as a string of
//! `'0'` and `'1'` characters:
//!
//! ```text
//! +----------------+---------------------+-----------------+
//! | source         | destination         | control         |
//! | (address_bits) | (address_bits)      | (control_bits)  |
//! +----------------+---------------------+-----------------+
//! ```

use std::error::Error;
use std::fmt;

use twinring_engine::types::SimError;

use crate::packet::RawPayload;
use crate::types::{ControlCode, ControlTriple, NodeId};

pub const DEFAULT_ADDRESS_BITS: u32 = 8;
pub const DEFAULT_CONTROL_BITS: u32 = 2;

const MAX_ADDRESS_BITS: u32 = NodeId::BITS;
const MAX_CONTROL_BITS: u32 = u8::BITS;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodecError {
    /// A value does not fit in the width of its field.
    FieldOverflow {
        field: &'static str,
        value: u64,
        bits: u32,
    },
    /// A raw payload that is not a control packet of the expected width.
    Malformed(String),
    /// A field width that the codec cannot represent.
    InvalidWidth { field: &'static str, bits: u32 },
    /// An unknown control code using the value of `Add` or `Remove`.
    ReservedCode(u8),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CodecError::FieldOverflow { field, value, bits } => {
                write!(f, "{field} value {value} does not fit in {bits} bits")
            }
            CodecError::Malformed(reason) => write!(f, "malformed control packet: {reason}"),
            CodecError::InvalidWidth { field, bits } => {
                write!(f, "invalid {field} field width of {bits} bits")
            }
            CodecError::ReservedCode(code) => {
                write!(f, "control code {code} is reserved for add and remove")
            }
        }
    }
}

impl Error for CodecError {}

impl From<CodecError> for SimError {
    fn from(e: CodecError) -> Self {
        SimError(e.to_string())
    }
}

/// Generates and interprets control packets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketCodec {
    address_bits: u32,
    control_bits: u32,
}

impl PacketCodec {
    pub fn new(address_bits: u32, control_bits: u32) -> Result<Self, CodecError> {
        if address_bits == 0 || address_bits > MAX_ADDRESS_BITS {
            return Err(CodecError::InvalidWidth {
                field: "address",
                bits: address_bits,
            });
        }
        // Must at least be able to distinguish Add from Remove
        if control_bits == 0 || control_bits > MAX_CONTROL_BITS {
            return Err(CodecError::InvalidWidth {
                field: "control",
                bits: control_bits,
            });
        }
        Ok(Self {
            address_bits,
            control_bits,
        })
    }

    #[must_use]
    pub fn address_bits(&self) -> u32 {
        self.address_bits
    }

    #[must_use]
    pub fn control_bits(&self) -> u32 {
        self.control_bits
    }

    /// Number of bits in an encoded control packet.
    #[must_use]
    pub fn packet_bits(&self) -> u32 {
        2 * self.address_bits + self.control_bits
    }

    /// The largest node id that can be addressed.
    #[must_use]
    pub fn max_node_id(&self) -> u64 {
        field_max(self.address_bits)
    }

    pub fn generate_packet(
        &self,
        source: NodeId,
        destination: NodeId,
        control: ControlCode,
    ) -> Result<RawPayload, CodecError> {
        if let ControlCode::Unknown(code) = control {
            if code <= ControlCode::Remove.value() {
                return Err(CodecError::ReservedCode(code));
            }
        }
        let mut bits = String::with_capacity(self.packet_bits() as usize);
        encode_field(&mut bits, "source", u64::from(source), self.address_bits)?;
        encode_field(
            &mut bits,
            "destination",
            u64::from(destination),
            self.address_bits,
        )?;
        encode_field(
            &mut bits,
            "control",
            u64::from(control.value()),
            self.control_bits,
        )?;
        Ok(RawPayload::new(bits))
    }

    pub fn interpret_control_packet(&self, raw: &RawPayload) -> Result<ControlTriple, CodecError> {
        let bits = raw.as_str();
        if bits.len() != self.packet_bits() as usize {
            return Err(CodecError::Malformed(format!(
                "expected {} bits, found {}",
                self.packet_bits(),
                bits.len()
            )));
        }
        if let Some(c) = bits.chars().find(|c| *c != '0' && *c != '1') {
            return Err(CodecError::Malformed(format!("unexpected character '{c}'")));
        }

        let address_bits = self.address_bits as usize;
        let (source, rest) = bits.split_at(address_bits);
        let (destination, control) = rest.split_at(address_bits);

        // Widths are bounded by the field types so these cannot truncate
        Ok(ControlTriple {
            source: decode_field(source) as NodeId,
            destination: decode_field(destination) as NodeId,
            control: ControlCode::from(decode_field(control) as u8),
        })
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self {
            address_bits: DEFAULT_ADDRESS_BITS,
            control_bits: DEFAULT_CONTROL_BITS,
        }
    }
}

fn field_max(bits: u32) -> u64 {
    if bits >= u64::BITS {
        u64::MAX
    } else {
        (1 << bits) - 1
    }
}

fn encode_field(
    out: &mut String,
    field: &'static str,
    value: u64,
    bits: u32,
) -> Result<(), CodecError> {
    if value > field_max(bits) {
        return Err(CodecError::FieldOverflow { field, value, bits });
    }
    for i in (0..bits).rev() {
        out.push(if (value >> i) & 1 == 1 { '1' } else { '0' });
    }
    Ok(())
}

fn decode_field(bits: &str) -> u64 {
    bits.bytes()
        .fold(0, |acc, bit| (acc << 1) | u64::from(bit == b'1'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let codec = PacketCodec::default();
        let raw = codec.generate_packet(1, 3, ControlCode::Remove).unwrap();
        assert_eq!(raw.as_str(), "000000010000001101");
    }

    #[test]
    fn round_trip_all_codes() {
        let codec = PacketCodec::new(4, 2).unwrap();
        for source in 0..16 {
            for destination in 0..16 {
                for code in 0..4 {
                    let control = ControlCode::from(code);
                    let raw = codec.generate_packet(source, destination, control).unwrap();
                    let triple = codec.interpret_control_packet(&raw).unwrap();
                    assert_eq!(
                        triple,
                        ControlTriple {
                            source,
                            destination,
                            control
                        }
                    );
                }
            }
        }
    }

    #[test]
    fn widest_fields() {
        let codec = PacketCodec::new(32, 8).unwrap();
        let raw = codec
            .generate_packet(NodeId::MAX, 0, ControlCode::Unknown(255))
            .unwrap();
        let triple = codec.interpret_control_packet(&raw).unwrap();
        assert_eq!(triple.source, NodeId::MAX);
        assert_eq!(triple.control, ControlCode::Unknown(255));
    }

    #[test]
    fn reserved_codes_rejected() {
        let codec = PacketCodec::default();
        assert_eq!(
            codec.generate_packet(1, 3, ControlCode::Unknown(0)),
            Err(CodecError::ReservedCode(0))
        );
        assert_eq!(
            codec.generate_packet(1, 3, ControlCode::Unknown(1)),
            Err(CodecError::ReservedCode(1))
        );

        // The first free code is sent and read back as unknown
        let raw = codec.generate_packet(1, 3, ControlCode::Unknown(2)).unwrap();
        assert_eq!(
            codec.interpret_control_packet(&raw).unwrap().control,
            ControlCode::Unknown(2)
        );
    }

    #[test]
    fn field_overflow() {
        let codec = PacketCodec::default();
        assert_eq!(
            codec.generate_packet(256, 0, ControlCode::Add),
            Err(CodecError::FieldOverflow {
                field: "source",
                value: 256,
                bits: 8
            })
        );
        assert!(matches!(
            codec.generate_packet(0, 0, ControlCode::Unknown(4)),
            Err(CodecError::FieldOverflow {
                field: "control",
                ..
            })
        ));
    }

    #[test]
    fn malformed_payloads() {
        let codec = PacketCodec::default();
        assert!(matches!(
            codec.interpret_control_packet(&RawPayload::from("0101")),
            Err(CodecError::Malformed(_))
        ));
        assert!(matches!(
            codec.interpret_control_packet(&RawPayload::from("00000001000000110x")),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn invalid_widths() {
        assert!(PacketCodec::new(0, 2).is_err());
        assert!(PacketCodec::new(33, 2).is_err());
        assert!(PacketCodec::new(8, 0).is_err());
        assert!(PacketCodec::new(8, 9).is_err());
    }
}
