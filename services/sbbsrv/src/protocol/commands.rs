//! SBB command table
//!
//! Every frame on the bus starts with [`SYNC_BYTE`] followed by one opcode.
//! Write commands (0xCx) never answer; read commands (0xDx) answer with a
//! fixed number of bytes, which is what the transceiver needs to know to wait
//! for the reply.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::Serialize;

/// First byte of every frame
pub const SYNC_BYTE: u8 = 0xFF;

/// Move a module to a position
pub const CMD_SET_POSITION: u8 = 0xC0;
/// Read the current position
pub const CMD_GET_POSITION: u8 = 0xD0;
/// Read the module serial number
pub const CMD_GET_SERIAL: u8 = 0xDF;

/// Static description of one opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandDescriptor {
    pub opcode: u8,
    /// Bytes the module sends back (0 = fire-and-forget)
    pub answer_bytes: usize,
    /// Parameter bytes following the address
    pub param_bytes: usize,
    /// Whether a module address byte follows the opcode
    pub addressed: bool,
    pub name: &'static str,
    pub description: &'static str,
}

const fn query(opcode: u8, name: &'static str, description: &'static str) -> CommandDescriptor {
    CommandDescriptor {
        opcode,
        answer_bytes: 1,
        param_bytes: 0,
        addressed: true,
        name,
        description,
    }
}

const COMMANDS: &[CommandDescriptor] = &[
    CommandDescriptor {
        opcode: CMD_SET_POSITION,
        answer_bytes: 0,
        param_bytes: 1,
        addressed: true,
        name: "set_position",
        description: "move module to position",
    },
    query(CMD_GET_POSITION, "get_position", "read current position"),
    query(0xD1, "info_d1", "module information register 0xD1"),
    query(0xD4, "info_d4", "module information register 0xD4"),
    query(0xD9, "info_d9", "module information register 0xD9"),
    query(0xDA, "info_da", "module information register 0xDA"),
    query(0xDB, "info_db", "module information register 0xDB"),
    query(0xDC, "info_dc", "module information register 0xDC"),
    query(0xDD, "info_dd", "module information register 0xDD"),
    query(0xDE, "info_de", "module information register 0xDE"),
    CommandDescriptor {
        opcode: CMD_GET_SERIAL,
        answer_bytes: 4,
        param_bytes: 0,
        addressed: true,
        name: "get_serial",
        description: "read module serial number",
    },
];

/// Immutable opcode lookup, built on first use
pub struct CommandTable {
    by_opcode: BTreeMap<u8, CommandDescriptor>,
}

impl CommandTable {
    /// The process-wide table
    pub fn global() -> &'static CommandTable {
        static TABLE: OnceLock<CommandTable> = OnceLock::new();
        TABLE.get_or_init(|| CommandTable {
            by_opcode: COMMANDS.iter().map(|c| (c.opcode, *c)).collect(),
        })
    }

    pub fn get(&self, opcode: u8) -> Option<&CommandDescriptor> {
        self.by_opcode.get(&opcode)
    }

    /// Expected answer length; unknown opcodes are treated as write-only
    pub fn answer_length_for(&self, opcode: u8) -> usize {
        self.get(opcode).map_or(0, |c| c.answer_bytes)
    }

    /// All descriptors in opcode order
    pub fn iter(&self) -> impl Iterator<Item = &CommandDescriptor> {
        self.by_opcode.values()
    }

    /// Opcodes queried by a module info request: 0xD0 + i for i in 0..16,
    /// skipping the registers modules do not implement
    pub fn info_opcodes(&self) -> Vec<u8> {
        (0u8..16)
            .filter(|i| *i != 2 && *i != 3 && !(5..=8).contains(i))
            .map(|i| CMD_GET_POSITION + i)
            .filter(|op| self.by_opcode.contains_key(op))
            .collect()
    }
}

/// Expected answer length for `opcode` in the global table
pub fn answer_length_for(opcode: u8) -> usize {
    CommandTable::global().answer_length_for(opcode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_opcodes_are_unique() {
        let unique: HashSet<u8> = COMMANDS.iter().map(|c| c.opcode).collect();
        assert_eq!(unique.len(), COMMANDS.len());
        assert_eq!(CommandTable::global().iter().count(), COMMANDS.len());
    }

    #[test]
    fn test_answer_lengths() {
        assert_eq!(answer_length_for(CMD_SET_POSITION), 0);
        assert_eq!(answer_length_for(CMD_GET_POSITION), 1);
        assert_eq!(answer_length_for(CMD_GET_SERIAL), 4);
    }

    #[test]
    fn test_unknown_opcode_expects_no_answer() {
        assert_eq!(answer_length_for(0x42), 0);
        assert_eq!(answer_length_for(0xD2), 0);
        assert!(CommandTable::global().get(0x42).is_none());
    }

    #[test]
    fn test_info_opcodes() {
        assert_eq!(
            CommandTable::global().info_opcodes(),
            vec![0xD0, 0xD1, 0xD4, 0xD9, 0xDA, 0xDB, 0xDC, 0xDD, 0xDE, 0xDF]
        );
    }

    #[test]
    fn test_write_and_read_opcodes_are_distinct() {
        let table = CommandTable::global();
        let set = table.get(CMD_SET_POSITION).map(|c| c.answer_bytes);
        let get = table.get(CMD_GET_POSITION).map(|c| c.answer_bytes);
        assert_eq!(set, Some(0));
        assert_eq!(get, Some(1));
    }
}
