//! Anfragetypen und Statuscodes
//!
//! Jede Verbindung beginnt mit genau einem Handshake-Byte, das den
//! [`RequestKind`] festlegt. Antworten beginnen mit einem [`RequestStatus`].

use std::fmt;

/// Art der Anfrage, als erstes Byte jeder Verbindung uebertragen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestKind {
    Display = 1,
    Audio = 2,
    FStat = 3,
    FGet = 4,
    FPut = 5,
}

impl RequestKind {
    /// Alle bekannten Anfragetypen in Wire-Reihenfolge
    pub const ALLE: [RequestKind; 5] = [
        RequestKind::Display,
        RequestKind::Audio,
        RequestKind::FStat,
        RequestKind::FGet,
        RequestKind::FPut,
    ];

    pub fn als_byte(self) -> u8 {
        self as u8
    }

    /// Bytes ausserhalb von 1..=5 sind keinem Typ zugeordnet
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Display),
            2 => Some(Self::Audio),
            3 => Some(Self::FStat),
            4 => Some(Self::FGet),
            5 => Some(Self::FPut),
            _ => None,
        }
    }

    /// Kurzname fuer Logs und Metrik-Labels
    pub fn name(self) -> &'static str {
        match self {
            Self::Display => "display",
            Self::Audio => "audio",
            Self::FStat => "stat-file",
            Self::FGet => "get-file",
            Self::FPut => "put-file",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ergebnis einer Anfrage, vom Server als einzelnes Byte gesendet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestStatus {
    Ok = 1,
    Failed = 2,
}

impl RequestStatus {
    pub fn als_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Ok),
            2 => Some(Self::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_bytes_sind_fest() {
        assert_eq!(RequestKind::Display.als_byte(), 1);
        assert_eq!(RequestKind::Audio.als_byte(), 2);
        assert_eq!(RequestKind::FStat.als_byte(), 3);
        assert_eq!(RequestKind::FGet.als_byte(), 4);
        assert_eq!(RequestKind::FPut.als_byte(), 5);
        assert_eq!(RequestStatus::Ok.als_byte(), 1);
        assert_eq!(RequestStatus::Failed.als_byte(), 2);
    }

    #[test]
    fn unbekannte_bytes_werden_abgelehnt() {
        assert_eq!(RequestKind::from_byte(0), None);
        assert_eq!(RequestKind::from_byte(6), None);
        assert_eq!(RequestKind::from_byte(255), None);
        assert_eq!(RequestStatus::from_byte(0), None);
        assert_eq!(RequestStatus::from_byte(3), None);
    }

    #[test]
    fn jeder_typ_ueberlebt_das_byte() {
        for art in RequestKind::ALLE {
            assert_eq!(RequestKind::from_byte(art.als_byte()), Some(art));
        }
    }

    #[test]
    fn anzeigenamen() {
        assert_eq!(RequestKind::FStat.to_string(), "stat-file");
        assert_eq!(RequestKind::FGet.to_string(), "get-file");
        assert_eq!(RequestKind::FPut.to_string(), "put-file");
        assert_eq!(RequestKind::Display.to_string(), "display");
    }
}
