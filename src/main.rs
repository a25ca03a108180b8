extern crate log;
pub mod annotate;
pub mod feature;
pub mod frame;
pub mod geofile;
pub mod partition;
pub mod summary;
use crate::annotate::scale_bar::{build_scale_bar, MapExtent, ScaleBar, ScaleBarStyle};
use crate::feature::{FeatureCollection, Schema};
use crate::frame::crs::{Crs, EpsgCode, FrameKind};
use crate::frame::transform::{
    reproject, IdentityFactory, ProjTransformer, TransverseMercatorFactory,
};
use crate::geofile::geojson_io::{read_collection, write_collection, write_scale_bar};
use crate::partition::{clip_to_regions, spatial_join};
use crate::summary::aggregate::{aggregate, Aggregation};
use crate::summary::measure::{measure, MeasureKind};
use anyhow::anyhow;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::{fs::read_to_string, path::Path};

/// Summarize vector datasets by attribute and region, and emit map
/// annotation geometry.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input config file.
    #[arg(short, long)]
    config_filepath: String,
}

#[derive(Deserialize, Debug)]
struct FeatureSourceConfig {
    filepath: PathBuf,
    epsg: EpsgCode,
    kind: FrameKind,
    measure: MeasureKind,
    measure_column: String,
    schema: Option<Schema>,
}

#[derive(Deserialize, Debug)]
struct RegionSourceConfig {
    filepath: PathBuf,
    epsg: EpsgCode,
    kind: FrameKind,
    region_key: String,
    schema: Option<Schema>,
}

#[derive(Deserialize, Debug)]
struct ScaleBarConfig {
    anchor: (f64, f64),
    base_distance: f64,
    unit: String,
}

#[derive(Deserialize, Debug)]
struct Config {
    features: FeatureSourceConfig,
    regions: RegionSourceConfig,
    /// Projected frame everything is reprojected into before measuring.
    target_epsg: EpsgCode,
    group_by: Vec<String>,
    scale_bar: Option<ScaleBarConfig>,
    data_dir: PathBuf,
}

fn load_source(
    filepath: &Path,
    crs: Crs,
    schema: Option<&Schema>,
) -> anyhow::Result<FeatureCollection> {
    let collection = read_collection(filepath, crs)?;
    log::info!(
        "Read {} features from {:?} ({})",
        collection.len(),
        filepath,
        collection.crs
    );
    if let Some(schema) = schema {
        schema.validate(&collection)?;
    }
    Ok(collection)
}

fn ensure_frame(collection: FeatureCollection, target: Crs) -> anyhow::Result<FeatureCollection> {
    if collection.crs == target {
        return Ok(collection);
    }
    log::info!("Projecting {} features to {}", collection.len(), target);
    let transformer = ProjTransformer::between(&collection.crs, &target)?;
    reproject(&collection, target, &transformer)
}

fn log_aggregation(title: &str, aggregation: &Aggregation) {
    log::info!("Totals {}:", title);
    for (key, stats) in aggregation.sorted() {
        log::info!(
            "  {:<40} {:>14.2} ({} features)",
            key,
            stats.total,
            stats.count
        );
    }
}

fn build_annotation(
    config: &ScaleBarConfig,
    source_extent: &MapExtent,
    projected_extent: &MapExtent,
) -> anyhow::Result<ScaleBar> {
    let style = ScaleBarStyle {
        base_distance: config.base_distance,
        unit: config.unit.clone(),
        ..Default::default()
    };
    // A geographic extent needs a locally metric frame for the bar's
    // distances to hold; a projected extent already is one.
    if source_extent.crs.is_projected() {
        build_scale_bar(projected_extent, config.anchor, &style, &IdentityFactory)
    } else {
        let factory = TransverseMercatorFactory {
            source: source_extent.crs,
        };
        build_scale_bar(source_extent, config.anchor, &style, &factory)
    }
}

fn try_main() -> anyhow::Result<()> {
    let args = Args::try_parse()?;
    if !Path::new(&args.config_filepath).exists() {
        return Err(anyhow!("Config file {} not found", &args.config_filepath));
    }
    let config_contents = read_to_string(args.config_filepath)?;
    let config: Config = serde_yaml::from_str(&config_contents)?;
    std::fs::create_dir_all(&config.data_dir)?;

    let features = load_source(
        &config.features.filepath,
        Crs {
            epsg: config.features.epsg,
            kind: config.features.kind,
        },
        config.features.schema.as_ref(),
    )?;
    let regions = load_source(
        &config.regions.filepath,
        Crs {
            epsg: config.regions.epsg,
            kind: config.regions.kind,
        },
        config.regions.schema.as_ref(),
    )?;

    // The scale bar anchors to the combined extent of everything drawn on
    // the map, as loaded, before reprojection.
    let features_extent = MapExtent::from_collection(&features)
        .ok_or_else(|| anyhow!("Cannot derive a map extent from an empty dataset"))?;
    let source_extent = match MapExtent::from_collection(&regions) {
        Some(regions_extent) if regions.crs == features.crs => {
            features_extent.union(&regions_extent)?
        }
        Some(_) => {
            log::warn!(
                "Feature and region sources use different frames; framing the map on the features alone"
            );
            features_extent
        }
        None => features_extent,
    };

    let target = Crs::projected(config.target_epsg);
    let features = ensure_frame(features, target)?;
    let regions = ensure_frame(regions, target)?;

    let column = &config.features.measure_column;
    let measured = measure(&features, config.features.measure, column)?;

    let keys: Vec<&str> = config.group_by.iter().map(String::as_str).collect();
    if keys.is_empty() {
        return Err(anyhow!("group_by must name at least one attribute"));
    }
    let by_group = aggregate(&measured, &keys, column)?;
    log_aggregation(&format!("by {}", config.group_by.join(", ")), &by_group);

    // Partition across the region boundaries, then re-measure: clipped
    // parts keep a stale measurement column otherwise.
    let region_key = config.regions.region_key.as_str();
    let clipped = clip_to_regions(&measured, &regions, region_key)?;
    let clipped = measure(&clipped, config.features.measure, column)?;
    let by_region = aggregate(&clipped, &[region_key, keys[0]], column)?;
    log_aggregation(&format!("by {}, {}", region_key, keys[0]), &by_region);
    log::info!(
        "Clipped/unclipped total ratio: {:.4}",
        by_region.total() / by_group.total()
    );

    // The one-to-many join counts straddling features once per region,
    // inflating totals; reported so the difference to the partition shows.
    let joined = spatial_join(&measured, &regions, region_key)?;
    let by_join = aggregate(&joined, &[region_key, keys[0]], column)?;
    log::info!(
        "Join/unclipped total ratio: {:.4} ({} matches from {} features)",
        by_join.total() / by_group.total(),
        joined.len(),
        measured.len()
    );

    let clipped_filepath = config.data_dir.join("clipped.geojson");
    log::info!("Writing clipped features to {:?}", &clipped_filepath);
    write_collection(&clipped, &clipped_filepath)?;

    if let Some(scale_bar_config) = &config.scale_bar {
        let measured_extent = MapExtent::from_collection(&measured)
            .ok_or_else(|| anyhow!("Cannot derive a map extent from an empty dataset"))?;
        // Both collections are in the target frame here, so the regions
        // always contribute to the projected extent.
        let projected_extent = match MapExtent::from_collection(&regions) {
            Some(regions_extent) => measured_extent.union(&regions_extent)?,
            None => measured_extent,
        };
        let scale_bar = build_annotation(scale_bar_config, &source_extent, &projected_extent)?;
        let annotation_filepath = config.data_dir.join("scale_bar.geojson");
        log::info!("Writing scale bar geometry to {:?}", &annotation_filepath);
        write_scale_bar(&scale_bar, &annotation_filepath)?;
    }
    Ok(())
}

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    env_logger::init();
    if let Err(e) = try_main() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1)
    }
}
