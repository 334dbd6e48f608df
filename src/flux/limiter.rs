//! TVD flux limiters with their derivative.

use serde::{Deserialize, Serialize};

/// Limiter applied to the ratio of admissible to raw antidiffusion.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FluxLimiterType {
    MinMod,
    VanLeer,
    MC,
    #[serde(rename = "superbee")]
    Superbee,
    None,
}

impl FluxLimiterType {
    pub const ALL: [FluxLimiterType; 5] = [
        FluxLimiterType::MinMod,
        FluxLimiterType::VanLeer,
        FluxLimiterType::MC,
        FluxLimiterType::Superbee,
        FluxLimiterType::None,
    ];

    /// `(limited, d limited / d b)`.
    ///
    /// Zero with zero slope when `a` and `b` do not share a strict sign. The
    /// engine always calls this with `a = 1`, so only the `b` derivative is needed.
    pub fn limit(self, a: f64, b: f64) -> (f64, f64) {
        if self == FluxLimiterType::None || a * b <= 0.0 {
            return (0.0, 0.0);
        }
        let s = a.signum();
        let lal = a.abs();
        let lbl = b.abs();
        let dlbl = b.signum();
        match self {
            FluxLimiterType::MinMod => {
                if lal <= lbl {
                    (s * lal, 0.0)
                } else {
                    (s * lbl, s * dlbl)
                }
            }
            FluxLimiterType::VanLeer => {
                let sum = lal + lbl;
                let value = s * 2.0 * lal * lbl / sum;
                let deriv = s * 2.0 * lal * (dlbl / sum - lbl * dlbl / (sum * sum));
                (value, deriv)
            }
            FluxLimiterType::MC => {
                let av = 0.5 * (a + b).abs();
                if 2.0 * lal <= av && lal <= lbl {
                    (2.0 * s * lal, 0.0)
                } else if 2.0 * lbl <= av && lbl <= lal {
                    (2.0 * s * lbl, 2.0 * s * dlbl)
                } else {
                    (s * av, 0.5 * s * dlbl)
                }
            }
            FluxLimiterType::Superbee => {
                let term1 = (2.0 * lal).min(lbl);
                let term2 = lal.min(2.0 * lbl);
                if term1 >= term2 {
                    if 2.0 * lal <= lbl {
                        (2.0 * s * lal, 0.0)
                    } else {
                        (s * lbl, s * dlbl)
                    }
                } else if lal <= 2.0 * lbl {
                    (s * lal, 0.0)
                } else {
                    (2.0 * s * lbl, 2.0 * s * dlbl)
                }
            }
            FluxLimiterType::None => (0.0, 0.0),
        }
    }
}
