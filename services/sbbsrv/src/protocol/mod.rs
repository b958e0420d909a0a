//! SBB wire protocol: command table, frame assembly and value transcoding

pub mod commands;
pub mod frame;
pub mod transcoder;

pub use commands::{
    answer_length_for, CommandDescriptor, CommandTable, CMD_GET_POSITION, CMD_GET_SERIAL,
    CMD_SET_POSITION, SYNC_BYTE,
};
pub use frame::{Frame, FrameBuildError};
pub use transcoder::ModuleType;
