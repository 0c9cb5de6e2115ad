//! Maps a meal's 1-10 health score onto HP and mana deltas.

use rand::Rng;

use crate::domain::HealthImpact;

/// Banded impact with random HP inside each band.
pub fn calculate_health_impact(score: f64) -> HealthImpact {
    calculate_health_impact_with(score, &mut rand::thread_rng())
}

pub fn calculate_health_impact_with<R: Rng + ?Sized>(score: f64, rng: &mut R) -> HealthImpact {
    if score >= 8.0 {
        HealthImpact {
            hp_impact: rng.gen_range(8..16),
            mana_impact: 5,
        }
    } else if score >= 6.0 {
        HealthImpact {
            hp_impact: rng.gen_range(3..8),
            mana_impact: 2,
        }
    } else if score >= 4.0 {
        HealthImpact {
            hp_impact: 0,
            mana_impact: 0,
        }
    } else {
        // Magnitude 4..=10 keeps the loss strictly below -3.
        HealthImpact {
            hp_impact: -rng.gen_range(4..11i32),
            mana_impact: -3,
        }
    }
}
