use chrono::{Datelike, NaiveDate};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

pub const SYSTEM_BIMESTRAL: &str = "bimestral";
pub const SYSTEM_TRIMESTRAL: &str = "trimestral";
pub const METHOD_ARITHMETIC: &str = "arithmetic";
pub const METHOD_WEIGHTED: &str = "weighted";

pub const RECOVERY_REPLACE: &str = "replace";
pub const RECOVERY_AVERAGE: &str = "average";
pub const RECOVERY_MAX: &str = "max";

/// Per-school grading policy. Loaded from `grading_configs`, with the same
/// defaults the config endpoint seeds on first access.
#[derive(Debug, Clone)]
pub struct GradingPolicy {
    pub system: String,
    pub calculation_method: String,
    pub exam_weight: f64,
    pub activities_weight: f64,
    pub recovery_rule: String,
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            system: SYSTEM_BIMESTRAL.to_string(),
            calculation_method: METHOD_ARITHMETIC.to_string(),
            exam_weight: 50.0,
            activities_weight: 50.0,
            recovery_rule: RECOVERY_REPLACE.to_string(),
        }
    }
}

impl GradingPolicy {
    pub fn load(conn: &Connection, school_id: &str) -> rusqlite::Result<Self> {
        let row = conn
            .query_row(
                "SELECT system, calculation_method, weights, recovery_rule
                 FROM grading_configs
                 WHERE school_id = ?",
                [school_id],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((system, calculation_method, weights, recovery_rule)) = row else {
            return Ok(Self::default());
        };

        let weights: serde_json::Value =
            serde_json::from_str(&weights).unwrap_or_else(|_| json!({}));
        let exam_weight = weights.get("exam").and_then(|v| v.as_f64()).unwrap_or(50.0);
        let activities_weight = weights
            .get("activities")
            .and_then(|v| v.as_f64())
            .unwrap_or(50.0);

        Ok(Self {
            system,
            calculation_method,
            exam_weight,
            activities_weight,
            recovery_rule,
        })
    }
}

/// Map a record date onto a term label. The bimestral calendar buckets pairs
/// of months into four terms; the trimestral calendar buckets quarters into
/// three. Dates past the last boundary stay in the final term.
pub fn term_for_date(system: &str, date: NaiveDate) -> &'static str {
    let month = date.month();
    if system == SYSTEM_TRIMESTRAL {
        return match month {
            1..=3 => "1",
            4..=6 => "2",
            _ => "3",
        };
    }
    match month {
        1..=2 => "1",
        3..=4 => "2",
        5..=6 => "3",
        _ => "4",
    }
}

/// Average of grade1/grade2 plus the recovery-adjusted final grade.
///
/// The average needs both partial grades. The recovery rule only applies
/// when both an average and a recovery grade exist; `replace` is the
/// fallback for unknown rule strings, matching historical data.
pub fn compute_final(
    policy: &GradingPolicy,
    grade1: Option<f64>,
    grade2: Option<f64>,
    recovery_grade: Option<f64>,
) -> (Option<f64>, Option<f64>) {
    let average = match (grade1, grade2) {
        (Some(g1), Some(g2)) => {
            if policy.calculation_method == METHOD_WEIGHTED {
                let mut total = policy.exam_weight + policy.activities_weight;
                if total == 0.0 {
                    total = 100.0;
                }
                Some((g1 * policy.exam_weight + g2 * policy.activities_weight) / total)
            } else {
                Some((g1 + g2) / 2.0)
            }
        }
        _ => None,
    };

    let final_grade = match (average, recovery_grade) {
        (Some(avg), Some(rec)) => Some(match policy.recovery_rule.as_str() {
            RECOVERY_AVERAGE => (avg + rec) / 2.0,
            RECOVERY_MAX => avg.max(rec),
            _ => rec,
        }),
        (avg, _) => avg,
    };

    (average, final_grade)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn bimestral_terms_bucket_month_pairs() {
        assert_eq!(term_for_date(SYSTEM_BIMESTRAL, date(2024, 2, 15)), "1");
        assert_eq!(term_for_date(SYSTEM_BIMESTRAL, date(2024, 4, 1)), "2");
        assert_eq!(term_for_date(SYSTEM_BIMESTRAL, date(2024, 6, 30)), "3");
        assert_eq!(term_for_date(SYSTEM_BIMESTRAL, date(2024, 8, 10)), "4");
        assert_eq!(term_for_date(SYSTEM_BIMESTRAL, date(2024, 11, 1)), "4");
    }

    #[test]
    fn trimestral_terms_bucket_quarters() {
        assert_eq!(term_for_date(SYSTEM_TRIMESTRAL, date(2024, 3, 31)), "1");
        assert_eq!(term_for_date(SYSTEM_TRIMESTRAL, date(2024, 5, 10)), "2");
        assert_eq!(term_for_date(SYSTEM_TRIMESTRAL, date(2024, 9, 1)), "3");
        assert_eq!(term_for_date(SYSTEM_TRIMESTRAL, date(2024, 12, 25)), "3");
    }

    #[test]
    fn arithmetic_average_needs_both_grades() {
        let policy = GradingPolicy::default();
        let (avg, fin) = compute_final(&policy, Some(6.0), Some(4.0), None);
        assert_eq!(avg, Some(5.0));
        assert_eq!(fin, Some(5.0));

        let (avg, fin) = compute_final(&policy, Some(6.0), None, None);
        assert_eq!(avg, None);
        assert_eq!(fin, None);
    }

    #[test]
    fn weighted_average_uses_configured_weights() {
        let policy = GradingPolicy {
            calculation_method: METHOD_WEIGHTED.to_string(),
            exam_weight: 70.0,
            activities_weight: 30.0,
            ..GradingPolicy::default()
        };
        let (avg, _) = compute_final(&policy, Some(8.0), Some(4.0), None);
        assert_eq!(avg, Some(6.8));
    }

    #[test]
    fn zero_weight_total_falls_back_to_hundred() {
        let policy = GradingPolicy {
            calculation_method: METHOD_WEIGHTED.to_string(),
            exam_weight: 0.0,
            activities_weight: 0.0,
            ..GradingPolicy::default()
        };
        let (avg, _) = compute_final(&policy, Some(8.0), Some(4.0), None);
        assert_eq!(avg, Some(0.0));
    }

    #[test]
    fn recovery_rules_adjust_final_grade() {
        let mut policy = GradingPolicy::default();

        policy.recovery_rule = RECOVERY_REPLACE.to_string();
        let (_, fin) = compute_final(&policy, Some(6.0), Some(4.0), Some(8.0));
        assert_eq!(fin, Some(8.0));

        policy.recovery_rule = RECOVERY_AVERAGE.to_string();
        let (_, fin) = compute_final(&policy, Some(6.0), Some(4.0), Some(8.0));
        assert_eq!(fin, Some(6.5));

        policy.recovery_rule = RECOVERY_MAX.to_string();
        let (_, fin) = compute_final(&policy, Some(6.0), Some(4.0), Some(3.0));
        assert_eq!(fin, Some(5.0));
    }

    #[test]
    fn recovery_without_average_is_ignored() {
        let policy = GradingPolicy::default();
        let (avg, fin) = compute_final(&policy, None, None, Some(9.0));
        assert_eq!(avg, None);
        assert_eq!(fin, None);
    }
}
