// ============================================================
// Layer 3 — Modality
// ============================================================
// The four MRI sequences acquired for every case. The order
// of `Modality::ALL` is the channel order of the model input
// and must never change: the checkpoint was trained on it.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Modality {
    T1,
    T1c,
    T2,
    Flair,
}

impl Modality {
    pub const COUNT: usize = 4;

    /// Canonical channel order: [T1, T1c, T2, FLAIR]
    pub const ALL: [Modality; Self::COUNT] = [Modality::T1, Modality::T1c, Modality::T2, Modality::Flair];

    /// Channel index inside a ModalityTensor
    pub fn channel(self) -> usize {
        match self {
            Modality::T1    => 0,
            Modality::T1c   => 1,
            Modality::T2    => 2,
            Modality::Flair => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Modality::T1    => "T1",
            Modality::T1c   => "T1c",
            Modality::T2    => "T2",
            Modality::Flair => "FLAIR",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_follow_canonical_order() {
        for (i, m) in Modality::ALL.iter().enumerate() {
            assert_eq!(m.channel(), i);
        }
    }

    #[test]
    fn test_flair_label_is_uppercase() {
        assert_eq!(Modality::Flair.to_string(), "FLAIR");
    }
}
