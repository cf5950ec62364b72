use core::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Built-in sounds of the DUPLO train speaker.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sound {
    Brake,
    Departure,
    Refill,
    Horn,
    Steam,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SoundError {
    #[error("Sound id {0} is unknown!")]
    Unknown(i32),
}

impl Sound {
    pub const ALL: [Sound; 5] = [
        Sound::Brake,
        Sound::Departure,
        Sound::Refill,
        Sound::Horn,
        Sound::Steam,
    ];

    /// Sound id as understood by the speaker's sound mode.
    pub fn id(&self) -> u8 {
        match self {
            Self::Brake => 3,
            Self::Departure => 5,
            Self::Refill => 7,
            Self::Horn => 9,
            Self::Steam => 10,
        }
    }
}

impl TryFrom<i32> for Sound {
    type Error = SoundError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .find(|sound| sound.id() as i32 == value)
            .copied()
            .ok_or(SoundError::Unknown(value))
    }
}

impl Display for Sound {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "<Sound: {:?} ({})>", self, self.id())
    }
}
