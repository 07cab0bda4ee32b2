//! Static register tables for the Evolution / Nexus controller family.

/// Records per log window.
pub const LOG_DEPTH: u16 = 50;

/// Model / serial number register (5 words).
pub const MODEL_REG: u16 = 0x01f4;
pub const MODEL_WORDS: u16 = 5;

/// Indexed write protocol: value register and index register.
pub const COMMAND_VALUE_REG: u16 = 0x0004;
pub const COMMAND_INDEX_REG: u16 = 0x0003;

pub const EXERCISE_TIME_REG: u16 = 0x002c;
pub const EXERCISE_FREQ_REG: u16 = 0x002d;
pub const EXERCISE_DAY_REG: u16 = 0x002e;
pub const QUIET_MODE_REG: u16 = 0x002f;
pub const CLOCK_REG: u16 = 0x000e;

pub const STATUS_REG: u16 = 0x0001;
pub const CONTROLLER_REG: u16 = 0x0000;

/// Polled once per sweep, in this order. All are one word.
pub const BASE_REGISTERS: &[u16] = &[
    0x0000, 0x0005, 0x0006, 0x0007, 0x0008, 0x000a, 0x000b, 0x000c, 0x000e, 0x000f, //
    0x0010, 0x0011, 0x0012, 0x0019, 0x001a, 0x001b, 0x001c, 0x001d, 0x001e, 0x001f, //
    0x0020, 0x0021, 0x0022, 0x002a, 0x002b, 0x002c, 0x002d, 0x002e, 0x002f, 0x0059, //
    0x023b, 0x023e, 0x0054, 0x005e, 0x005f, 0x0057, 0x0055, 0x0056, 0x005a, 0x000d, //
    0x003c, 0x0058, 0x005d, 0x05ed, 0x05ee, 0x05fa, 0x0033, 0x0034, 0x0032, 0x0036, //
    0x0037, 0x0038, 0x0039, 0x003a, 0x003b, 0x0239, 0x0237, 0x0208, 0x005c, 0x05f3, //
    0x05f4, 0x05f5, 0x05f6, 0x05f7,
];

const BASE_BYTES: u16 = 2;

/// Polled before every sixth base request: `(address, bytes)`.
pub const PRIME_REGISTERS: &[(u16, u16)] = &[
    (0x0001, 4), // alarm and status
    (0x0053, 2), // output relays
    (0x0052, 2), // input sensors
    (0x0009, 2), // utility voltage
    (0x05f1, 2), // last alarm code
];

/// Debug scan range for registers the tables do not know.
pub const DEBUG_SCAN: std::ops::Range<u16> = 0x0005..0x0700;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogWindow {
    Start,
    Alarm,
    Service,
    NexusAlarm,
}

impl LogWindow {
    pub const ALL: [Self; 4] = [Self::Start, Self::Alarm, Self::Service, Self::NexusAlarm];

    pub const fn start(self) -> u16 {
        match self {
            Self::Start => 0x012c,
            Self::Alarm => 0x03e8,
            Self::Service => 0x04e2,
            Self::NexusAlarm => 0x0064,
        }
    }

    /// Words per record.
    pub const fn stride(self) -> u16 {
        match self {
            Self::Alarm => 5,
            Self::Start | Self::Service | Self::NexusAlarm => 4,
        }
    }

    pub const fn hex_len(self) -> usize {
        self.stride() as usize * 4
    }

    /// Address of the last record in the window.
    pub const fn end(self) -> u16 {
        self.start() + self.stride() * (LOG_DEPTH - 1)
    }

    pub const fn contains(self, address: u16) -> bool {
        address >= self.start() && address <= self.end()
    }

    /// Whether this window exists on the given controller family.
    pub const fn present_on(self, evolution: bool) -> bool {
        match self {
            Self::Start => true,
            Self::Alarm | Self::Service => evolution,
            Self::NexusAlarm => !evolution,
        }
    }

    pub fn records(self) -> impl Iterator<Item = u16> {
        (0..LOG_DEPTH).map(move |k| self.start() + self.stride() * k)
    }

    pub fn containing(address: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|w| w.contains(address))
    }

    /// Windows a controller family keeps, in re-read order.
    pub fn for_family(evolution: bool) -> &'static [Self] {
        if evolution {
            &[Self::Start, Self::Service, Self::Alarm]
        } else {
            &[Self::Start, Self::NexusAlarm]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterClass {
    Base,
    Prime { bytes: u16 },
    Log(LogWindow),
    Model,
}

impl RegisterClass {
    /// Expected raw value length in hex characters.
    pub const fn hex_len(self) -> usize {
        match self {
            Self::Base => BASE_BYTES as usize * 2,
            Self::Prime { bytes } => bytes as usize * 2,
            Self::Log(w) => w.hex_len(),
            Self::Model => MODEL_WORDS as usize * 4,
        }
    }

    /// Log and model registers never raise change notifications.
    pub const fn is_log(self) -> bool {
        matches!(self, Self::Log(_) | Self::Model)
    }
}

pub fn prime_bytes(address: u16) -> Option<u16> {
    PRIME_REGISTERS
        .iter()
        .find(|(a, _)| *a == address)
        .map(|(_, b)| *b)
}

/// Classify an address. Log windows are only recognised on the family that
/// has them.
pub fn classify(address: u16, evolution: bool) -> Option<RegisterClass> {
    if BASE_REGISTERS.contains(&address) {
        return Some(RegisterClass::Base);
    }
    if let Some(bytes) = prime_bytes(address) {
        return Some(RegisterClass::Prime { bytes });
    }
    if let Some(w) = LogWindow::containing(address)
        && w.present_on(evolution)
    {
        return Some(RegisterClass::Log(w));
    }
    if address == MODEL_REG {
        return Some(RegisterClass::Model);
    }
    None
}

pub fn is_known(address: u16, evolution: bool) -> bool {
    classify(address, evolution).is_some()
}

pub fn expected_hex_len(address: u16, evolution: bool) -> Option<usize> {
    classify(address, evolution).map(RegisterClass::hex_len)
}

/// Four lowercase hex digits.
pub fn reg_name(address: u16) -> String {
    format!("{address:04x}")
}

/// Parse a register name such as `01f4` or `0x01f4`.
pub fn parse_reg_name(s: &str) -> Option<u16> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() || s.len() > 4 {
        return None;
    }
    u16::from_str_radix(s, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_end_at_depth() {
        assert_eq!(LogWindow::Start.end(), 0x01f0);
        assert_eq!(LogWindow::NexusAlarm.end(), 0x0128);
        assert_eq!(LogWindow::Alarm.end(), 0x04dd);
        assert_eq!(LogWindow::Service.end(), 0x05a6);
        assert_eq!(LogWindow::Alarm.records().count(), 50);
    }

    #[test]
    fn classification_is_family_gated() {
        assert_eq!(classify(0x03e8, true), Some(RegisterClass::Log(LogWindow::Alarm)));
        assert_eq!(classify(0x03e8, false), None);
        assert_eq!(classify(0x0064, false), Some(RegisterClass::Log(LogWindow::NexusAlarm)));
        assert_eq!(classify(0x0064, true), None);
        assert_eq!(classify(0x012c, false), Some(RegisterClass::Log(LogWindow::Start)));
        assert_eq!(classify(MODEL_REG, true), Some(RegisterClass::Model));
        assert_eq!(expected_hex_len(0x0001, true), Some(8));
        assert_eq!(expected_hex_len(0x0005, true), Some(4));
        assert_eq!(expected_hex_len(0x7000, true), None);
    }

    #[test]
    fn register_names_round_trip() {
        assert_eq!(reg_name(0x1f4), "01f4");
        assert_eq!(parse_reg_name("01F4"), Some(0x01f4));
        assert_eq!(parse_reg_name("0x0009"), Some(9));
        assert_eq!(parse_reg_name("xyz"), None);
        assert_eq!(parse_reg_name("12345"), None);
    }
}
