use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context};
use geojson::{GeoJson, JsonObject, JsonValue};

use crate::annotate::scale_bar::ScaleBar;
use crate::feature::{AttrValue, Feature, FeatureCollection};
use crate::frame::crs::Crs;

/// Read a GeoJSON FeatureCollection into typed features. GeoJSON itself does
/// not carry a usable CRS, so the caller declares the frame the file is in.
///
/// Boolean and nested JSON properties have no typed attribute
/// representation and come back as their JSON text, so a round trip through
/// `write_collection` turns them into string properties.
pub fn read_collection(filepath: &Path, crs: Crs) -> anyhow::Result<FeatureCollection> {
    let contents = fs::read_to_string(filepath)
        .with_context(|| format!("Reading GeoJSON file {:?}", filepath))?;
    let geojson: GeoJson = contents
        .parse()
        .with_context(|| format!("Parsing GeoJSON file {:?}", filepath))?;
    let collection = geojson::FeatureCollection::try_from(geojson)
        .with_context(|| format!("{:?} is not a GeoJSON FeatureCollection", filepath))?;

    let num_features = collection.features.len();
    let mut features = Vec::with_capacity(num_features);
    for gj_feature in collection.features {
        let Some(geometry) = gj_feature.geometry else {
            continue;
        };
        let geometry = geo::Geometry::try_from(geometry)
            .map_err(|err| anyhow!("Could not convert GeoJSON geometry, {}", err))?;
        let attributes = match gj_feature.properties {
            Some(properties) => properties
                .into_iter()
                .map(|(name, value)| (name, attr_from_json(value)))
                .collect(),
            None => HashMap::new(),
        };
        features.push(Feature {
            geometry,
            attributes,
        });
    }
    if features.len() != num_features {
        log::warn!(
            "Out of {} features read, only {} had a geometry.",
            num_features,
            features.len()
        )
    }
    Ok(FeatureCollection::new(features, crs))
}

pub fn write_collection(
    collection: &FeatureCollection,
    output_filepath: &Path,
) -> anyhow::Result<()> {
    let features: Vec<geojson::Feature> = collection
        .iter()
        .map(|feature| geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(
                &feature.geometry,
            ))),
            id: None,
            properties: Some(attributes_to_json(&feature.attributes)),
            foreign_members: None,
        })
        .collect();
    write_features(features, output_filepath)
}

/// Dump scale-bar annotation geometry as GeoJSON so an external rendering
/// surface can draw it: one line feature per segment, one point feature per
/// label anchor.
pub fn write_scale_bar(scale_bar: &ScaleBar, output_filepath: &Path) -> anyhow::Result<()> {
    let mut features = Vec::new();
    for segment in &scale_bar.segments {
        let line = geo::Geometry::LineString(geo::LineString::from(vec![
            segment.start,
            segment.end,
        ]));
        let mut properties = JsonObject::new();
        properties.insert("role".to_string(), JsonValue::from("segment"));
        properties.insert("width".to_string(), JsonValue::from(segment.width));
        properties.insert("color".to_string(), JsonValue::from(segment.color.clone()));
        features.push(geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&line))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }
    for label in &scale_bar.labels {
        let point = geo::Geometry::Point(geo::Point::from(label.anchor));
        let mut properties = JsonObject::new();
        properties.insert("role".to_string(), JsonValue::from("label"));
        properties.insert("text".to_string(), JsonValue::from(label.text.clone()));
        features.push(geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&point))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }
    write_features(features, output_filepath)
}

fn write_features(features: Vec<geojson::Feature>, output_filepath: &Path) -> anyhow::Result<()> {
    let collection = geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    let contents = GeoJson::from(collection).to_string();
    fs::write(output_filepath, contents)
        .with_context(|| format!("Writing GeoJSON file {:?}", output_filepath))
}

fn attr_from_json(value: JsonValue) -> AttrValue {
    match value {
        JsonValue::String(text) => AttrValue::Text(text),
        JsonValue::Number(number) => match number.as_f64() {
            Some(value) => AttrValue::Number(value),
            None => AttrValue::Null,
        },
        JsonValue::Null => AttrValue::Null,
        // Bools and nested structures are rare in attribute tables; keep
        // them as their JSON text so nothing is dropped silently.
        other => AttrValue::Text(other.to_string()),
    }
}

fn attributes_to_json(attributes: &HashMap<String, AttrValue>) -> JsonObject {
    attributes
        .iter()
        .map(|(name, value)| {
            let json = match value {
                AttrValue::Text(text) => JsonValue::from(text.clone()),
                AttrValue::Number(number) => JsonValue::from(*number),
                AttrValue::Null => JsonValue::Null,
            };
            (name.clone(), json)
        })
        .collect()
}
