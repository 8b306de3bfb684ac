//! Grouping identity for merge candidates.

use std::collections::BTreeMap;

use vigil_core::AnomalyInterval;

pub const PROP_GROUP_KEY: &str = "groupKey";
pub const PROP_PATTERN_KEY: &str = "pattern";

/// Intervals only merge with others sharing the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnomalyKey {
    pub metric: Option<String>,
    pub dataset: Option<String>,
    pub dimensions: BTreeMap<String, String>,
    /// `"{groupKey},{patternKey}"`.
    pub group: String,
    pub anomaly_type: String,
    pub ignored: bool,
}

impl AnomalyKey {
    pub fn of(anomaly: &AnomalyInterval) -> Self {
        let group_key = anomaly
            .properties
            .get(PROP_GROUP_KEY)
            .map(String::as_str)
            .unwrap_or("");
        Self {
            metric: anomaly.metric.clone(),
            dataset: anomaly.dataset.clone(),
            dimensions: anomaly.dimensions.clone(),
            group: format!("{group_key},{}", pattern_key(anomaly)),
            anomaly_type: anomaly.anomaly_type.clone(),
            ignored: anomaly.is_ignored(),
        }
    }
}

/// Explicit `pattern` property, else `UP`/`DOWN` from current vs baseline,
/// else empty.
pub fn pattern_key(anomaly: &AnomalyInterval) -> String {
    if let Some(pattern) = anomaly.properties.get(PROP_PATTERN_KEY) {
        return pattern.clone();
    }
    match (anomaly.avg_current_value, anomaly.avg_baseline_value) {
        (Some(current), Some(baseline)) if !current.is_nan() && !baseline.is_nan() => {
            let direction = if current > baseline { "UP" } else { "DOWN" };
            direction.to_string()
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::AnomalyLabel;

    fn values(current: f64, baseline: f64) -> AnomalyInterval {
        let mut a = AnomalyInterval::new(0, 10);
        a.avg_current_value = Some(current);
        a.avg_baseline_value = Some(baseline);
        a
    }

    #[test]
    fn pattern_from_values() {
        assert_eq!(pattern_key(&values(5.0, 1.0)), "UP");
        assert_eq!(pattern_key(&values(1.0, 5.0)), "DOWN");
        assert_eq!(pattern_key(&values(1.0, 1.0)), "DOWN");
        assert_eq!(pattern_key(&values(f64::NAN, 1.0)), "");
        assert_eq!(pattern_key(&AnomalyInterval::new(0, 10)), "");
    }

    #[test]
    fn explicit_pattern_wins() {
        let a = values(5.0, 1.0).with_property(PROP_PATTERN_KEY, "DOWN");
        assert_eq!(pattern_key(&a), "DOWN");
    }

    #[test]
    fn key_separates_direction_dimensions_and_ignore() {
        let base = AnomalyKey::of(&values(5.0, 1.0));
        assert_ne!(base, AnomalyKey::of(&values(1.0, 5.0)));
        assert_ne!(base, AnomalyKey::of(&values(5.0, 1.0).with_dimension("country", "US")));

        let ignored = values(5.0, 1.0).with_labels(vec![AnomalyLabel {
            name: "holiday".into(),
            ignore: true,
            ..Default::default()
        }]);
        assert_ne!(base, AnomalyKey::of(&ignored));

        let with_group = values(5.0, 1.0).with_property(PROP_GROUP_KEY, "g1");
        assert_eq!(AnomalyKey::of(&with_group).group, "g1,UP");
        assert_eq!(base.group, ",UP");
    }
}
