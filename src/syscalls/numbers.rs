//! System call numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SyscallNumber {
    // Console
    Puts = 0,
    Getc = 1,

    // Tasks
    GetPid = 2,
    Fork = 3,
    Kill = 4,
    Sleep = 5,

    // Counters
    GetNumFreePage = 6,
    GetNumUsedPage = 7,
    GetTicks = 8,

    // Screen
    SetTextColor = 9,
    Cls = 10,

    /// Dispatch self-test, always answers [`SYS_TEST_MAGIC`].
    Test = 11,

    Unknown = u64::MAX,
}

pub const SYS_TEST_MAGIC: i32 = 12_345_678;

impl From<u64> for SyscallNumber {
    fn from(num: u64) -> Self {
        match num {
            0 => Self::Puts,
            1 => Self::Getc,
            2 => Self::GetPid,
            3 => Self::Fork,
            4 => Self::Kill,
            5 => Self::Sleep,
            6 => Self::GetNumFreePage,
            7 => Self::GetNumUsedPage,
            8 => Self::GetTicks,
            9 => Self::SetTextColor,
            10 => Self::Cls,
            11 => Self::Test,
            _ => Self::Unknown,
        }
    }
}
