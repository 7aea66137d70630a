//! Priority levels.

use std::fmt;

/// How urgently a callback should run. Lower levels are more urgent.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub enum Priority {
    /// Already expired when scheduled; flushed before returning to the host.
    Immediate = 1,
    /// Results of user interaction.
    UserBlocking = 2,
    #[default]
    Normal = 3,
    /// Work that never expires on its own.
    Idle = 4,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Immediate,
        Priority::UserBlocking,
        Priority::Normal,
        Priority::Idle,
    ];

    /// Map a numeric level to a priority. Unknown levels are `Normal`.
    pub fn from_level(level: u8) -> Self {
        match level {
            1 => Priority::Immediate,
            2 => Priority::UserBlocking,
            3 => Priority::Normal,
            4 => Priority::Idle,
            _ => Priority::Normal,
        }
    }

    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Priority::Immediate => "immediate",
            Priority::UserBlocking => "user-blocking",
            Priority::Normal => "normal",
            Priority::Idle => "idle",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
