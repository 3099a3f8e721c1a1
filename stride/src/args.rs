use std::path::PathBuf;

use stride_simulator::SimulatorOptions;

#[derive(Debug, clap::Parser)]
pub struct Args {
    /// Path to scene file
    #[arg(default_value = "scenarios/default.toml")]
    pub scene: PathBuf,
    /// Simulated time after which the run stops, overriding the scene (seconds)
    #[arg(short = 'd', long)]
    pub max_duration: Option<f32>,
    /// Record the agents of every step in the log
    #[arg(short, long)]
    pub trajectory: bool,
    /// Directory of the output log
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,
    /// Steps between progress reports
    #[arg(long, default_value_t = 100)]
    pub report_interval: u64,

    /// Do not use grid for acceleration
    #[arg(long)]
    pub no_neighbor_grid: bool,
    /// Unit length of neighbor search grid
    #[arg(long)]
    pub neighbor_unit: Option<f32>,
}

impl Args {
    pub fn to_simulator_options(&self) -> SimulatorOptions {
        let mut options = SimulatorOptions {
            use_neighbor_grid: !self.no_neighbor_grid,
            ..Default::default()
        };

        if let Some(neighbor_unit) = self.neighbor_unit {
            options.neighbor_grid_unit = neighbor_unit;
        }

        options
    }
}

#[cfg(test)]
mod tests {
    use assert_float_eq::*;
    use clap::Parser;

    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["stride"]);
        let options = args.to_simulator_options();

        assert_eq!(args.scene, PathBuf::from("scenarios/default.toml"));
        assert_eq!(args.max_duration, None);
        assert!(!args.trajectory);
        assert!(options.use_neighbor_grid);
        assert_float_absolute_eq!(options.neighbor_grid_unit, SimulatorOptions::default().neighbor_grid_unit);
    }

    #[test]
    fn test_options() {
        let args = Args::parse_from([
            "stride",
            "scenarios/headon.toml",
            "-d",
            "12.5",
            "--trajectory",
            "--no-neighbor-grid",
            "--neighbor-unit",
            "2.0",
        ]);
        let options = args.to_simulator_options();

        assert_eq!(args.scene, PathBuf::from("scenarios/headon.toml"));
        assert_eq!(args.max_duration, Some(12.5));
        assert!(args.trajectory);
        assert!(!options.use_neighbor_grid);
        assert_float_absolute_eq!(options.neighbor_grid_unit, 2.0);
    }
}
