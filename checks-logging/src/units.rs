//! Human-readable byte amounts for memory reports

use std::fmt;

/// Binary (power of 1024) size units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BinaryUnit {
    B,
    KiB,
    MiB,
    GiB,
    TiB,
    PiB,
    EiB,
}

impl BinaryUnit {
    pub const ALL: [BinaryUnit; 7] = [
        BinaryUnit::B,
        BinaryUnit::KiB,
        BinaryUnit::MiB,
        BinaryUnit::GiB,
        BinaryUnit::TiB,
        BinaryUnit::PiB,
        BinaryUnit::EiB,
    ];

    /// Bytes in one unit
    pub fn bytes(self) -> f64 {
        1024f64.powi(self as i32)
    }

    pub fn label(self) -> &'static str {
        match self {
            BinaryUnit::B => "B",
            BinaryUnit::KiB => "KiB",
            BinaryUnit::MiB => "MiB",
            BinaryUnit::GiB => "GiB",
            BinaryUnit::TiB => "TiB",
            BinaryUnit::PiB => "PiB",
            BinaryUnit::EiB => "EiB",
        }
    }

    /// Parse a unit name; `kib`, `KiB` and `KB` all mean kibibytes.
    ///
    /// Unknown names fall back to bytes.
    pub fn from_name(name: &str) -> Self {
        match name.to_uppercase().replace('I', "").as_str() {
            "KB" => BinaryUnit::KiB,
            "MB" => BinaryUnit::MiB,
            "GB" => BinaryUnit::GiB,
            "TB" => BinaryUnit::TiB,
            "PB" => BinaryUnit::PiB,
            "EB" => BinaryUnit::EiB,
            _ => BinaryUnit::B,
        }
    }

    /// Largest unit in which `bytes` is at least 1
    pub fn highest_for(bytes: u64) -> Self {
        let bytes = bytes as f64;
        Self::ALL
            .iter()
            .rev()
            .copied()
            .find(|unit| bytes >= unit.bytes())
            .unwrap_or(BinaryUnit::B)
    }
}

impl fmt::Display for BinaryUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Convert `bytes` to `to`, or to the highest fitting unit when unpinned
pub fn convert_units(bytes: u64, to: Option<BinaryUnit>) -> (f64, BinaryUnit) {
    let unit = to.unwrap_or_else(|| BinaryUnit::highest_for(bytes));
    (bytes as f64 / unit.bytes(), unit)
}

/// Render an amount with the precision of its unit.
///
/// Bytes are integers, KiB gets two decimals and anything larger three.
pub fn format_units(amount: f64, unit: BinaryUnit) -> (String, &'static str) {
    let amount = match unit {
        BinaryUnit::B => format!("{}", amount.trunc() as i64),
        BinaryUnit::KiB => format!("{amount:.2}"),
        _ => format!("{amount:.3}"),
    };
    (amount, unit.label())
}

/// Formats byte amounts in a pinned unit or dynamically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitFormatter {
    unit: Option<BinaryUnit>,
}

impl UnitFormatter {
    /// `highest` picks the unit per amount; any other name pins it
    pub fn new(unit: &str) -> Self {
        let unit = if unit == "highest" {
            None
        } else {
            Some(BinaryUnit::from_name(unit))
        };
        Self { unit }
    }

    pub fn format(&self, bytes: u64) -> (String, &'static str) {
        let (amount, unit) = convert_units(bytes, self.unit);
        format_units(amount, unit)
    }
}

impl Default for UnitFormatter {
    fn default() -> Self {
        Self::new("highest")
    }
}

/// Compact size used in statistic lines, e.g. `12.3 KiB` or `+512 B`
pub fn format_size(size: f64, sign: bool) -> String {
    let mut size = size;
    for unit in [BinaryUnit::B, BinaryUnit::KiB, BinaryUnit::MiB, BinaryUnit::GiB, BinaryUnit::TiB] {
        if size.abs() < 100.0 && unit != BinaryUnit::B {
            return if sign {
                format!("{size:+.1} {unit}")
            } else {
                format!("{size:.1} {unit}")
            };
        }
        if size.abs() < 10.0 * 1024.0 || unit == BinaryUnit::TiB {
            return if sign {
                format!("{size:+.0} {unit}")
            } else {
                format!("{size:.0} {unit}")
            };
        }
        size /= 1024.0;
    }
    format!("{size:.0} {}", BinaryUnit::TiB)
}
