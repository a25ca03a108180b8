use std::collections::HashMap;

use anyhow::anyhow;
use serde::Deserialize;

use crate::frame::crs::Crs;

/// A typed attribute value. Absent attributes behave like `Null` for
/// grouping purposes.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Number(f64),
    Null,
}

impl AttrValue {
    /// The value as a grouping-key part. `None` is the null sentinel: a
    /// feature with a missing or null key lands in its own group instead of
    /// being dropped.
    pub fn as_group_part(&self) -> Option<String> {
        match self {
            AttrValue::Text(text) => Some(text.clone()),
            AttrValue::Number(value) => Some(format!("{}", value)),
            AttrValue::Null => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(value) => Some(*value),
            _ => None,
        }
    }
}

/// A single geometric record with attributes, e.g. one road segment or one
/// county polygon. The geometry is never mutated in place; derived columns
/// are attached by building a new feature.
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: geo::Geometry,
    pub attributes: HashMap<String, AttrValue>,
}

impl Feature {
    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// A copy of this feature with `name` set to `value`. Existing values
    /// under the same name are replaced.
    pub fn with_attribute(&self, name: &str, value: AttrValue) -> Feature {
        let mut attributes = self.attributes.clone();
        attributes.insert(name.to_string(), value);
        Feature {
            geometry: self.geometry.clone(),
            attributes,
        }
    }
}

impl From<geo::Geometry> for Feature {
    fn from(value: geo::Geometry) -> Self {
        Self {
            geometry: value,
            attributes: HashMap::new(),
        }
    }
}

/// An ordered set of features sharing a reference frame.
#[derive(Debug, Clone)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    pub crs: Crs,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>, crs: Crs) -> Self {
        Self { features, crs }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum AttrKind {
    Text,
    Number,
}

/// Declared attribute schema for a collection, validated once at load time
/// instead of failing attribute lookups one by one during analysis.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct Schema(pub HashMap<String, AttrKind>);

impl Schema {
    /// Check every feature against the declared attribute kinds. Missing and
    /// null values are allowed; a present value of the wrong kind is an
    /// error naming the feature and attribute.
    pub fn validate(&self, collection: &FeatureCollection) -> anyhow::Result<()> {
        for (index, feature) in collection.iter().enumerate() {
            for (name, kind) in &self.0 {
                let matches = match (feature.attribute(name), kind) {
                    (None | Some(AttrValue::Null), _) => true,
                    (Some(AttrValue::Text(_)), AttrKind::Text) => true,
                    (Some(AttrValue::Number(_)), AttrKind::Number) => true,
                    _ => false,
                };
                if !matches {
                    return Err(anyhow!(
                        "Feature {} has attribute '{}' of the wrong kind, expected {:?}",
                        index,
                        name,
                        kind
                    ));
                }
            }
        }
        Ok(())
    }
}
