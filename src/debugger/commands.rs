use clap::{Parser, Subcommand};
use clap_num::maybe_hex;

use crate::emu::{Chip8Error, Opcode};
use crate::u4;

#[derive(Parser)]
#[command(multicall = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Resume execution until a breakpoint or error
    #[command(visible_alias = "r")]
    Run,

    #[command(visible_alias = "p")]
    Pause,

    /// Execute exactly one instruction
    #[command(visible_alias = "s")]
    Step,

    #[command(visible_alias = "b")]
    Breakpoint {
        #[command(subcommand)]
        action: BreakpointAction,
    },

    /// Overwrite a register: v0-vf, i or pc
    Set {
        #[arg(value_parser = parse_set_target)]
        target: SetTarget,
        #[arg(value_parser = maybe_hex::<u16>)]
        value: u16,
    },

    /// Hex dump of memory
    #[command(visible_alias = "m")]
    Mem {
        #[arg(default_value = "0x200", value_parser = maybe_hex::<u16>)]
        start: u16,
        #[arg(default_value = "64", value_parser = maybe_hex::<u16>)]
        len: u16,
    },

    /// Disassemble instructions
    #[command(visible_alias = "d")]
    Disasm {
        #[arg(default_value = "0x200", value_parser = maybe_hex::<u16>)]
        start: u16,
        #[arg(default_value = "16", value_parser = maybe_hex::<u16>)]
        len: u16,
    },

    #[command(visible_alias = "q")]
    Quit,
}

pub enum CommandResult {
    Ok,
    Breakpoints(Vec<u16>),
    MemDump {
        data: Vec<u8>,
        offset: u16,
    },
    /// Raw word and decoded opcode for each disassembled address
    Disasm {
        instructions: Vec<(u16, Opcode)>,
        offset: u16,
    },
    Quit,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Error while executing cpu instruction: {0}")]
    Chip8Error(#[from] Chip8Error),
    #[error("Value out of range")]
    ValueOutOfRange,
}

#[derive(Subcommand, Clone, Debug)]
pub enum BreakpointAction {
    #[command(visible_alias = "s")]
    Set {
        #[arg(value_parser = maybe_hex::<u16>)]
        addr: u16,
    },

    #[command(visible_alias = "c")]
    Clear {
        #[arg(value_parser = maybe_hex::<u16>)]
        addr: u16,
    },

    #[command(visible_alias = "l")]
    List,

    #[command(visible_alias = "ca")]
    ClearAll,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetTarget {
    V(u4),
    I,
    Pc,
}

fn parse_set_target(s: &str) -> Result<SetTarget, String> {
    let lower = s.to_lowercase();

    match lower.as_str() {
        "index" | "i" => Ok(SetTarget::I),
        "pc" => Ok(SetTarget::Pc),

        _ if lower.starts_with('v') => {
            let hex_str = &lower[1..];
            match u8::from_str_radix(hex_str, 16) {
                Ok(val) if val < 16 => Ok(SetTarget::V(u4::new(val))),
                _ => Err(format!("Invalid register: '{}'", s)),
            }
        }

        _ => Err(format!("Unknown set target: '{}'", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Command {
        Cli::try_parse_from(line.split_whitespace()).unwrap().command
    }

    #[test]
    fn parses_aliases() {
        assert!(matches!(parse("r"), Command::Run));
        assert!(matches!(parse("p"), Command::Pause));
        assert!(matches!(parse("s"), Command::Step));
        assert!(matches!(parse("q"), Command::Quit));
        assert!(matches!(
            parse("b s 0x20A"),
            Command::Breakpoint {
                action: BreakpointAction::Set { addr: 0x20A }
            }
        ));
        assert!(matches!(
            parse("b ca"),
            Command::Breakpoint {
                action: BreakpointAction::ClearAll
            }
        ));
    }

    #[test]
    fn parses_set_targets() {
        assert!(matches!(
            parse("set vA 0x10"),
            Command::Set {
                target: SetTarget::V(reg),
                value: 0x10
            } if reg == u4::new(0xA)
        ));
        assert!(matches!(
            parse("set pc 512"),
            Command::Set {
                target: SetTarget::Pc,
                value: 0x200
            }
        ));
        assert!(Cli::try_parse_from("set v10 1".split_whitespace()).is_err());
        assert!(Cli::try_parse_from("set sp 1".split_whitespace()).is_err());
    }

    #[test]
    fn memory_commands_have_defaults() {
        assert!(matches!(
            parse("m"),
            Command::Mem {
                start: 0x200,
                len: 64
            }
        ));
        assert!(matches!(
            parse("d 0x300 4"),
            Command::Disasm {
                start: 0x300,
                len: 4
            }
        ));
    }
}
