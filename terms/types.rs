// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// Types used by more than one module. Anything private to a module stays there.

use std::fmt;

/// A zero-based index of a probe on the array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProbeIndex(pub u32);

impl ProbeIndex {
    /// Converts a 1-based probe id, as stored in probe files, to a zero-based index.
    pub fn from_one_based(probe_id: u32) -> Option<Self> {
        probe_id.checked_sub(1).map(Self)
    }

    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ProbeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The tri-state outcome of gender calling for one chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl Gender {
    /// Swaps Male and Female. Unknown is left alone.
    pub fn flipped(self) -> Self {
        match self {
            Self::Male => Self::Female,
            Self::Female => Self::Male,
            Self::Unknown => Self::Unknown,
        }
    }

    /// The label written to the gender-calls report.
    pub fn report_label(self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
            Self::Unknown => "UnknownGender",
        }
    }

    fn metric_label(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.metric_label())
    }
}

/// Which pair of sex chromosomes the probe groups describe.
///
/// `XY` is the mammalian convention (XX female, XY male). `ZW` is the avian one,
/// where the homogametic sex is male, so calls are flipped after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChromosomeConvention {
    #[default]
    XY,
    ZW,
}

impl ChromosomeConvention {
    pub fn from_zw_flag(zw: bool) -> Self {
        if zw { Self::ZW } else { Self::XY }
    }

    pub fn is_zw(self) -> bool {
        self == Self::ZW
    }

    pub fn diploid_label(self) -> char {
        match self {
            Self::XY => 'X',
            Self::ZW => 'Z',
        }
    }

    pub fn haploid_label(self) -> char {
        match self {
            Self::XY => 'Y',
            Self::ZW => 'W',
        }
    }

    /// The name under which this gender method reports its metrics.
    pub fn method_name(self) -> String {
        format!(
            "cn-probe-chr{}{}-ratio",
            self.diploid_label(),
            self.haploid_label()
        )
    }
}

/// Cutoffs applied to the haploid/diploid intensity ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub female: f64,
    pub male: f64,
}

impl Thresholds {
    pub fn new(female: f64, male: f64) -> Self {
        Self { female, male }
    }

    /// Below `female` is Female, above `male` is Male, anything else is Unknown.
    /// Both boundary equalities land in the Unknown band, as does NaN.
    pub fn classify(&self, ratio: f64) -> Gender {
        if ratio < self.female {
            Gender::Female
        } else if ratio > self.male {
            Gender::Male
        } else {
            Gender::Unknown
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.female <= self.male
    }
}
