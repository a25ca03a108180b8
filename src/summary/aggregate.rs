use std::collections::HashMap;
use std::fmt;

use anyhow::anyhow;

use crate::feature::{AttrValue, FeatureCollection};

/// Composite grouping key: one part per grouping attribute. `None` parts are
/// the null sentinel for features missing that attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey(pub Vec<Option<String>>);

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self
            .0
            .iter()
            .map(|part| part.as_deref().unwrap_or("<null>"))
            .collect();
        write!(f, "{}", parts.join(" / "))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GroupStats {
    pub total: f64,
    pub count: usize,
}

/// Result of a group-by aggregation: summed measurement and feature count per
/// distinct key. No ordering guarantee on the groups.
#[derive(Debug, Default)]
pub struct Aggregation {
    pub groups: HashMap<GroupKey, GroupStats>,
}

impl Aggregation {
    pub fn get(&self, key: &GroupKey) -> Option<&GroupStats> {
        self.groups.get(key)
    }

    /// Sum of the measurement over all groups.
    pub fn total(&self) -> f64 {
        self.groups.values().map(|stats| stats.total).sum()
    }

    /// Sum of the per-group counts. Equals the input collection length,
    /// since every feature lands in exactly one group.
    pub fn feature_count(&self) -> usize {
        self.groups.values().map(|stats| stats.count).sum()
    }

    /// Groups sorted by key, for stable report output.
    pub fn sorted(&self) -> Vec<(&GroupKey, &GroupStats)> {
        let mut entries: Vec<_> = self.groups.iter().collect();
        entries.sort_by_key(|(key, _)| key.to_string());
        entries
    }
}

/// Group the collection by the distinct values of one or two attribute keys
/// and sum the `measurement` attribute per group.
///
/// Features with a missing or null grouping value form their own group under
/// the null sentinel. A missing or non-numeric measurement contributes zero
/// to its group's sum, but the feature is still counted.
pub fn aggregate(
    collection: &FeatureCollection,
    keys: &[&str],
    measurement: &str,
) -> anyhow::Result<Aggregation> {
    if keys.is_empty() || keys.len() > 2 {
        return Err(anyhow!(
            "Aggregation supports one or two grouping keys, got {}",
            keys.len()
        ));
    }

    let mut groups: HashMap<GroupKey, GroupStats> = HashMap::new();
    for feature in collection.iter() {
        let key = GroupKey(
            keys.iter()
                .map(|key| {
                    feature
                        .attribute(key)
                        .and_then(AttrValue::as_group_part)
                })
                .collect(),
        );
        let value = feature
            .attribute(measurement)
            .and_then(AttrValue::as_number)
            .unwrap_or(0.0);
        let stats = groups.entry(key).or_default();
        stats.total += value;
        stats.count += 1;
    }
    Ok(Aggregation { groups })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    use crate::feature::{AttrValue, Feature, FeatureCollection};
    use crate::frame::crs::Crs;

    use super::{aggregate, GroupKey};

    fn road(class: Option<&str>, county: &str, length: f64) -> Feature {
        let geometry: geo::Geometry =
            geo::LineString::from(vec![(0.0, 0.0), (length, 0.0)]).into();
        let mut feature = Feature::from(geometry)
            .with_attribute("CountyName", AttrValue::Text(county.to_string()))
            .with_attribute("Length", AttrValue::Number(length));
        if let Some(class) = class {
            feature = feature.with_attribute("Road_class", AttrValue::Text(class.to_string()));
        }
        feature
    }

    fn key(parts: &[Option<&str>]) -> GroupKey {
        GroupKey(parts.iter().map(|part| part.map(str::to_string)).collect())
    }

    #[test]
    fn test_aggregate_by_single_key() {
        let collection = FeatureCollection::new(
            vec![
                road(Some("MOTORWAY"), "Antrim", 10.0),
                road(Some("MOTORWAY"), "Down", 20.0),
                road(Some("A_ROAD"), "Antrim", 5.0),
            ],
            Crs::projected(2157),
        );

        let aggregation = aggregate(&collection, &["Road_class"], "Length").unwrap();

        assert_eq!(2, aggregation.groups.len());
        let motorway = aggregation.get(&key(&[Some("MOTORWAY")])).unwrap();
        assert_abs_diff_eq!(30.0, motorway.total);
        assert_eq!(2, motorway.count);
        assert_abs_diff_eq!(35.0, aggregation.total());
    }

    #[test]
    fn test_aggregate_by_two_keys() {
        let collection = FeatureCollection::new(
            vec![
                road(Some("MOTORWAY"), "Antrim", 10.0),
                road(Some("MOTORWAY"), "Down", 20.0),
                road(Some("MOTORWAY"), "Antrim", 7.0),
            ],
            Crs::projected(2157),
        );

        let aggregation =
            aggregate(&collection, &["CountyName", "Road_class"], "Length").unwrap();

        assert_eq!(2, aggregation.groups.len());
        let antrim = aggregation
            .get(&key(&[Some("Antrim"), Some("MOTORWAY")]))
            .unwrap();
        assert_abs_diff_eq!(17.0, antrim.total);
    }

    #[test]
    fn test_every_feature_in_exactly_one_group() {
        let collection = FeatureCollection::new(
            vec![
                road(Some("MOTORWAY"), "Antrim", 10.0),
                road(Some("A_ROAD"), "Antrim", 5.0),
                road(Some("B_ROAD"), "Down", 2.0),
                road(None, "Down", 1.0),
            ],
            Crs::projected(2157),
        );

        let aggregation = aggregate(&collection, &["Road_class"], "Length").unwrap();
        assert_eq!(collection.len(), aggregation.feature_count());
    }

    #[test]
    fn test_null_key_forms_its_own_group() {
        let collection = FeatureCollection::new(
            vec![
                road(Some("MOTORWAY"), "Antrim", 10.0),
                road(None, "Antrim", 4.0),
                road(None, "Down", 6.0),
            ],
            Crs::projected(2157),
        );

        let aggregation = aggregate(&collection, &["Road_class"], "Length").unwrap();

        let null_group = aggregation.get(&key(&[None])).unwrap();
        assert_eq!(2, null_group.count);
        assert_abs_diff_eq!(10.0, null_group.total);
        // Nothing was dropped.
        assert_eq!(collection.len(), aggregation.feature_count());
        assert_eq!("<null>", key(&[None]).to_string());
    }

    #[test]
    fn test_missing_measurement_counts_as_zero() {
        let feature = road(Some("MOTORWAY"), "Antrim", 10.0);
        let mut attributes = feature.attributes.clone();
        attributes.remove("Length");
        let unmeasured = Feature {
            geometry: feature.geometry.clone(),
            attributes,
        };

        let collection =
            FeatureCollection::new(vec![feature, unmeasured], Crs::projected(2157));
        let aggregation = aggregate(&collection, &["Road_class"], "Length").unwrap();

        let motorway = aggregation.get(&key(&[Some("MOTORWAY")])).unwrap();
        assert_eq!(2, motorway.count);
        assert_abs_diff_eq!(10.0, motorway.total);
    }

    #[rstest]
    #[case(&[])]
    #[case(&["a", "b", "c"])]
    fn test_key_count_is_validated(#[case] keys: &[&str]) {
        let collection = FeatureCollection::new(vec![], Crs::projected(2157));
        assert!(aggregate(&collection, keys, "Length").is_err());
    }
}
