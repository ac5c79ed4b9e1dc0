use strum::{Display, EnumString};

/// The only commands the microcontroller firmware understands.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LedCommand {
    On,
    Off,
}

impl LedCommand {
    pub fn payload(&self) -> &'static str {
        match self {
            LedCommand::On => "ON\n",
            LedCommand::Off => "OFF\n",
        }
    }
}
