// Eligibility - exact match of opportunity attributes against required values

use serde::{Deserialize, Serialize};

use super::types::EligibilityFacts;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EligibilityCriteria {
    pub share_value_per_unit: f64,
    pub min_unit: u64,
}

impl Default for EligibilityCriteria {
    fn default() -> Self {
        Self {
            share_value_per_unit: 100.0,
            min_unit: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityVerdict {
    pub valid: bool,
    /// One entry per mismatched or unreadable field
    pub reasons: Vec<String>,
}

impl EligibilityVerdict {
    pub fn reason(&self) -> Option<String> {
        if self.reasons.is_empty() {
            None
        } else {
            Some(self.reasons.join("; "))
        }
    }
}

impl EligibilityCriteria {
    pub fn new(share_value_per_unit: f64, min_unit: u64) -> Self {
        Self {
            share_value_per_unit,
            min_unit,
        }
    }

    /// Both fields must be readable and equal the criteria exactly
    pub fn verify(&self, facts: &EligibilityFacts) -> EligibilityVerdict {
        let mut reasons = Vec::new();

        match facts.share_value_per_unit {
            Some(actual) if actual == self.share_value_per_unit => {}
            Some(actual) => reasons.push(format!(
                "Share Value Per Unit is {} (expected {})",
                actual, self.share_value_per_unit
            )),
            None => reasons.push("Share Value Per Unit could not be read".to_string()),
        }

        match facts.min_unit {
            Some(actual) if actual == self.min_unit => {}
            Some(actual) => reasons.push(format!(
                "Minimum Unit is {} (expected {})",
                actual, self.min_unit
            )),
            None => reasons.push("Minimum Unit could not be read".to_string()),
        }

        EligibilityVerdict {
            valid: reasons.is_empty(),
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(value: Option<f64>, unit: Option<u64>) -> EligibilityFacts {
        EligibilityFacts {
            share_value_per_unit: value,
            min_unit: unit,
        }
    }

    #[test]
    fn test_exact_match_is_valid() {
        let verdict = EligibilityCriteria::new(100.0, 10).verify(&facts(Some(100.0), Some(10)));
        assert!(verdict.valid);
        assert_eq!(verdict.reason(), None);
    }

    #[test]
    fn test_share_value_mismatch_names_the_field() {
        let verdict = EligibilityCriteria::new(100.0, 10).verify(&facts(Some(150.0), Some(10)));
        assert!(!verdict.valid);
        assert_eq!(verdict.reasons.len(), 1);
        assert!(verdict.reasons[0].contains("Share Value Per Unit"));
        assert!(verdict.reasons[0].contains("150"));
    }

    #[test]
    fn test_larger_min_unit_is_still_a_mismatch() {
        let verdict = EligibilityCriteria::new(100.0, 10).verify(&facts(Some(100.0), Some(50)));
        assert!(!verdict.valid);
        assert!(verdict.reason().unwrap().contains("Minimum Unit"));
    }

    #[test]
    fn test_unreadable_values_are_invalid() {
        let verdict = EligibilityCriteria::default().verify(&facts(None, None));
        assert!(!verdict.valid);
        assert_eq!(verdict.reasons.len(), 2);
    }
}
