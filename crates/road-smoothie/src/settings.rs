use crate::CliError;
use clap::Parser;
use geo::{Coord, Rect};
use road_smoothie_lib::{Config, geomath};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Road Smoothie - Align a road network file to a GPX reference path
pub struct Settings {
    /// GPX file with the reference path (track name = road reference)
    #[clap(short, long, value_name = "FILE")]
    pub reference: PathBuf,

    /// JSON network file to fetch roads from
    #[clap(short, long, value_name = "FILE")]
    pub network: PathBuf,

    /// Where to write the edited network (JSON)
    #[clap(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Where to write the fetch rectangles (JSON)
    #[clap(long, value_name = "FILE")]
    pub plan: Option<PathBuf>,

    /// JSON file with tolerances; flags given here take precedence
    #[clap(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Seed for the positional scatter (random when absent)
    #[clap(long)]
    pub seed: Option<u64>,

    /// Area already loaded, in Web Mercator meters: MIN_X MIN_Y MAX_X MAX_Y
    #[clap(long, num_args = 4, value_names = ["MIN_X", "MIN_Y", "MAX_X", "MAX_Y"], allow_negative_numbers = true)]
    pub loaded_view: Option<Vec<f64>>,

    /// Corridor width around the reference in meters [default: 50]
    #[clap(long)]
    pub buffer_width: Option<f64>,

    /// Maximum area of a single fetch in km² [default: 25]
    #[clap(long)]
    pub max_area: Option<f64>,

    /// Snap onto reference vertices closer than this in meters [default: 2]
    #[clap(long)]
    pub snap_radius: Option<f64>,

    /// Leave vertices this close to the reference alone, in meters [default: 20]
    #[clap(long)]
    pub max_distance: Option<f64>,

    /// Do not pull vertices already this close to the reference line, in meters [default: 0.5]
    #[clap(long)]
    pub max_error: Option<f64>,

    /// Never split edges shorter than this, in meters [default: 10]
    #[clap(long)]
    pub min_segment_length: Option<f64>,

    /// Radius of the random offset of edited vertices in meters, 0 disables it [default: 0.2]
    #[clap(long)]
    pub variance: Option<f64>,

    /// Edits newer than this many hours count as recent [default: 24]
    #[clap(long)]
    pub recent_hours: Option<i64>,

    /// Warn when more than this many recently edited vertices are found [default: 2]
    #[clap(long)]
    pub recent_warn_threshold: Option<usize>,
}

impl Settings {
    /// Tolerances from the config file (or defaults) overridden by explicit flags
    pub fn load_config(&self) -> Result<Config, CliError> {
        let base = match &self.config {
            Some(path) => read_config(path)?,
            None => Config::default(),
        };
        let config = self.apply(base);
        config.validate()?;
        Ok(config)
    }

    /// Override `config` with the flags given on the command line
    pub fn apply(&self, mut config: Config) -> Config {
        let distances = [
            (self.buffer_width, &mut config.buffer_width),
            (self.max_area, &mut config.max_area),
            (self.snap_radius, &mut config.snap_radius),
            (self.max_distance, &mut config.max_distance),
            (self.max_error, &mut config.max_error),
            (self.min_segment_length, &mut config.min_segment_length),
            (self.variance, &mut config.variance),
        ];
        for (flag, field) in distances {
            if let Some(value) = flag {
                *field = value;
            }
        }
        if let Some(hours) = self.recent_hours {
            config.recent_window = chrono::Duration::hours(hours);
        }
        if let Some(threshold) = self.recent_warn_threshold {
            config.recent_warn_threshold = threshold;
        }
        config
    }

    /// Already loaded area in WGS84 degrees
    pub fn loaded_view(&self) -> Option<Rect<f64>> {
        let view = self.loaded_view.as_deref()?;
        let [min_x, min_y, max_x, max_y] = view else {
            return None;
        };
        let mercator = Rect::new(Coord { x: *min_x, y: *min_y }, Coord { x: *max_x, y: *max_y });
        Some(geomath::mercator_rect_to_wgs84(&mercator))
    }
}

fn read_config(path: &Path) -> Result<Config, CliError> {
    let file = std::fs::File::open(path)?;
    let config = serde_json::from_reader(std::io::BufReader::new(file))?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}
