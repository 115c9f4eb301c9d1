//! Command and reply codes.
//!
//! The frame type byte is a command (host -> device, `0x00..0x80`) or a
//! reply (device -> host, `0x80..`). Replies the device may invent later
//! are kept as [`Reply::Other`] instead of being rejected.

use std::fmt;

/// Host -> device command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Connect = 0x00,
    StartData = 0x01,
    MidstData = 0x02,
    EndData = 0x03,
    ExecData = 0x04,
    NormalReset = 0x05,
    ReadFlash = 0x06,
    ReadChipType = 0x07,
    LookupNvItem = 0x08,
    SetBaudrate = 0x09,
    EraseFlash = 0x0A,
    Repartition = 0x0B,
    ReadMcpType = 0x0D,
    ReadFlashStart = 0x10,
    ReadFlashMidst = 0x11,
    ReadFlashEnd = 0x12,
    OffCharge = 0x13,
    PowerDown = 0x17,
    CheckRootFlag = 0x19,
}

impl Command {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::StartData => "START_DATA",
            Command::MidstData => "MIDST_DATA",
            Command::EndData => "END_DATA",
            Command::ExecData => "EXEC_DATA",
            Command::NormalReset => "NORMAL_RESET",
            Command::ReadFlash => "READ_FLASH",
            Command::ReadChipType => "READ_CHIP_TYPE",
            Command::LookupNvItem => "LOOKUP_NVITEM",
            Command::SetBaudrate => "SET_BAUDRATE",
            Command::EraseFlash => "ERASE_FLASH",
            Command::Repartition => "REPARTITION",
            Command::ReadMcpType => "READ_MCP_TYPE",
            Command::ReadFlashStart => "READ_FLASH_START",
            Command::ReadFlashMidst => "READ_FLASH_MIDST",
            Command::ReadFlashEnd => "READ_FLASH_END",
            Command::OffCharge => "OFF_CHG",
            Command::PowerDown => "POWER_DOWN",
            Command::CheckRootFlag => "CHECK_ROOTFLAG",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.code())
    }
}

/// Device -> host reply codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reply {
    Ack,
    Version,
    InvalidCommand,
    UnknownCommand,
    OperationFailed,
    NotSupportBaudrate,
    DownNotStart,
    DownMultiStart,
    DownEarlyEnd,
    DownDestError,
    DownSizeError,
    VerifyError,
    NotVerify,
    NotEnoughMemory,
    WaitInputTimeout,
    Succeed,
    ValidBaudrate,
    RepeatContinue,
    RepeatBreak,
    ReadFlashData,
    ReadChipType,
    LookupNvItem,
    IncompatiblePartition,
    UnknownDevice,
    InvalidDeviceSize,
    IllegalSdram,
    WrongSdramParameter,
    ReadMcpType,
    ChecksumError,
    ChecksumDiff,
    WriteError,
    RootFlag,
    /// Any code outside the known table (including echoed commands).
    Other(u8),
}

impl Reply {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x80 => Reply::Ack,
            0x81 => Reply::Version,
            0x82 => Reply::InvalidCommand,
            0x83 => Reply::UnknownCommand,
            0x84 => Reply::OperationFailed,
            0x85 => Reply::NotSupportBaudrate,
            0x86 => Reply::DownNotStart,
            0x87 => Reply::DownMultiStart,
            0x88 => Reply::DownEarlyEnd,
            0x89 => Reply::DownDestError,
            0x8A => Reply::DownSizeError,
            0x8B => Reply::VerifyError,
            0x8C => Reply::NotVerify,
            0x8D => Reply::NotEnoughMemory,
            0x8E => Reply::WaitInputTimeout,
            0x8F => Reply::Succeed,
            0x90 => Reply::ValidBaudrate,
            0x91 => Reply::RepeatContinue,
            0x92 => Reply::RepeatBreak,
            0x93 => Reply::ReadFlashData,
            0x94 => Reply::ReadChipType,
            0x95 => Reply::LookupNvItem,
            0x96 => Reply::IncompatiblePartition,
            0x97 => Reply::UnknownDevice,
            0x98 => Reply::InvalidDeviceSize,
            0x99 => Reply::IllegalSdram,
            0x9A => Reply::WrongSdramParameter,
            0x9B => Reply::ReadMcpType,
            0xA0 => Reply::ChecksumError,
            0xA1 => Reply::ChecksumDiff,
            0xA2 => Reply::WriteError,
            0xA7 => Reply::RootFlag,
            other => Reply::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Reply::Ack => 0x80,
            Reply::Version => 0x81,
            Reply::InvalidCommand => 0x82,
            Reply::UnknownCommand => 0x83,
            Reply::OperationFailed => 0x84,
            Reply::NotSupportBaudrate => 0x85,
            Reply::DownNotStart => 0x86,
            Reply::DownMultiStart => 0x87,
            Reply::DownEarlyEnd => 0x88,
            Reply::DownDestError => 0x89,
            Reply::DownSizeError => 0x8A,
            Reply::VerifyError => 0x8B,
            Reply::NotVerify => 0x8C,
            Reply::NotEnoughMemory => 0x8D,
            Reply::WaitInputTimeout => 0x8E,
            Reply::Succeed => 0x8F,
            Reply::ValidBaudrate => 0x90,
            Reply::RepeatContinue => 0x91,
            Reply::RepeatBreak => 0x92,
            Reply::ReadFlashData => 0x93,
            Reply::ReadChipType => 0x94,
            Reply::LookupNvItem => 0x95,
            Reply::IncompatiblePartition => 0x96,
            Reply::UnknownDevice => 0x97,
            Reply::InvalidDeviceSize => 0x98,
            Reply::IllegalSdram => 0x99,
            Reply::WrongSdramParameter => 0x9A,
            Reply::ReadMcpType => 0x9B,
            Reply::ChecksumError => 0xA0,
            Reply::ChecksumDiff => 0xA1,
            Reply::WriteError => 0xA2,
            Reply::RootFlag => 0xA7,
            Reply::Other(code) => code,
        }
    }

    /// Whether the device reports a failure with this code.
    pub fn is_error(self) -> bool {
        !matches!(
            self,
            Reply::Ack
                | Reply::Version
                | Reply::Succeed
                | Reply::ValidBaudrate
                | Reply::RepeatContinue
                | Reply::RepeatBreak
                | Reply::ReadFlashData
                | Reply::ReadChipType
                | Reply::LookupNvItem
                | Reply::ReadMcpType
                | Reply::RootFlag
        )
    }
}

impl From<u8> for Reply {
    fn from(code: u8) -> Self {
        Reply::from_code(code)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Other(code) => write!(f, "UNKNOWN (0x{code:02X})"),
            known => write!(f, "{:?} (0x{:02X})", known, known.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_codes_roundtrip_through_table() {
        for code in 0x80..=0xA7u8 {
            assert_eq!(Reply::from_code(code).code(), code);
        }
    }

    #[test]
    fn test_unknown_reply_is_preserved() {
        let reply = Reply::from_code(0x42);
        assert_eq!(reply, Reply::Other(0x42));
        assert!(reply.is_error());
        assert_eq!(reply.to_string(), "UNKNOWN (0x42)");
    }

    #[test]
    fn test_error_classification() {
        assert!(!Reply::Ack.is_error());
        assert!(!Reply::ReadFlashData.is_error());
        assert!(Reply::DownSizeError.is_error());
        assert!(Reply::IncompatiblePartition.is_error());
    }

    #[test]
    fn test_command_display() {
        assert_eq!(Command::ReadFlashMidst.code(), 0x11);
        assert_eq!(Command::PowerDown.to_string(), "POWER_DOWN (0x17)");
    }
}
