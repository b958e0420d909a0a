//! Frame assembly
//!
//! Wire layout: `FF <opcode> [<address>] <params...>`. The command table
//! decides whether the address is present and how many parameters follow.

use std::fmt;

use thiserror::Error;

use super::commands::{CommandTable, CMD_SET_POSITION, SYNC_BYTE};

/// Caller errors while assembling a frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameBuildError {
    #[error("Opcode 0x{0:02X} is not in the command table")]
    UnknownOpcode(u8),

    #[error("Opcode 0x{opcode:02X} takes {expected} parameter byte(s), got {actual}")]
    ParamCount {
        opcode: u8,
        expected: usize,
        actual: usize,
    },

    #[error("Frame must start with sync byte 0xFF")]
    MissingSync,

    #[error("Frame must contain at least a sync byte and an opcode")]
    TooShort,
}

/// Immutable transmit frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Build a frame for a table opcode
    pub fn build(opcode: u8, address: u8, params: &[u8]) -> Result<Self, FrameBuildError> {
        let descriptor = CommandTable::global()
            .get(opcode)
            .ok_or(FrameBuildError::UnknownOpcode(opcode))?;

        if params.len() != descriptor.param_bytes {
            return Err(FrameBuildError::ParamCount {
                opcode,
                expected: descriptor.param_bytes,
                actual: params.len(),
            });
        }

        let mut bytes = Vec::with_capacity(3 + params.len());
        bytes.push(SYNC_BYTE);
        bytes.push(opcode);
        if descriptor.addressed {
            bytes.push(address);
        }
        bytes.extend_from_slice(params);

        Ok(Self { bytes })
    }

    /// `set_position` frame for one module
    pub fn set_position(address: u8, position: u8) -> Self {
        Self {
            bytes: vec![SYNC_BYTE, CMD_SET_POSITION, address, position],
        }
    }

    /// Wrap bytes supplied verbatim by a client
    ///
    /// Only the sync byte and the presence of an opcode are checked; the
    /// remaining bytes are sent as given.
    pub fn raw(bytes: Vec<u8>) -> Result<Self, FrameBuildError> {
        match bytes.first() {
            None => Err(FrameBuildError::TooShort),
            Some(&b) if b != SYNC_BYTE => Err(FrameBuildError::MissingSync),
            Some(_) if bytes.len() < 2 => Err(FrameBuildError::TooShort),
            Some(_) => Ok(Self { bytes }),
        }
    }

    pub fn opcode(&self) -> u8 {
        self.bytes[1]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Answer length the command table declares for this frame's opcode
    pub fn expected_answer(&self) -> usize {
        CommandTable::global().answer_length_for(self.opcode())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&common::hex::encode_upper(&self.bytes))
    }
}
