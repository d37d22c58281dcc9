//! Configuration types for the centrifuge pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// One (timestamp column, value column) pair in the raw sensor log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MeasurementColumns {
    /// Header of the timestamp column for this stream
    pub time_column: String,

    /// Header of the value column for this stream
    pub value_column: String,
}

impl MeasurementColumns {
    fn new(time_column: &str, value_column: &str) -> Self {
        Self {
            time_column: time_column.to_string(),
            value_column: value_column.to_string(),
        }
    }
}

/// Configuration for the raw sensor log columns and alignment rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// The (time, value) column pairs of every stream in the sensor log
    #[serde(default = "default_measurements")]
    pub measurements: Vec<MeasurementColumns>,

    /// Value column of the reference stream; its timestamp domain defines the grid
    #[serde(default = "default_reference_column")]
    pub reference_column: String,

    /// Value columns that must be non-null for an aligned row to be kept
    #[serde(default = "default_key_columns")]
    pub key_columns: Vec<String>,

    /// Value column of the feed rate stream (m3/h)
    #[serde(default = "default_feed_column")]
    pub feed_column: String,

    /// Value column of the drum speed stream (RPM)
    #[serde(default = "default_drum_speed_column")]
    pub drum_speed_column: String,

    /// Value column of the differential speed stream (RPM)
    #[serde(default = "default_diff_speed_column")]
    pub diff_speed_column: String,

    /// Value column of the torque stream (%)
    #[serde(default = "default_torque_column")]
    pub torque_column: String,
}

fn default_measurements() -> Vec<MeasurementColumns> {
    vec![
        MeasurementColumns::new("syote_Aika", "syote_Arvo_m3/h"),
        MeasurementColumns::new("lampo_nestepuoli_laakeri_Aika", "lampo_nestepuoli_laakeri_Arvo_°C"),
        MeasurementColumns::new("lampo_kiinteapuoli_laakeri_Aika", "lampo_kiinteapuoli_laakeri_Arvo_°C"),
        MeasurementColumns::new("tarina_kiinteapuoli_Aika", "tarina_kiinteapuoli_Arvo_mm/s"),
        MeasurementColumns::new("Momentti_Aika", "Momentti_Arvo_%"),
        MeasurementColumns::new("Rumpu_nopeus_Aika", "rumpu_nopeus_Arvo_RPM"),
        MeasurementColumns::new("Ero_nopeus_Aika", "Ero_nopeus_Arvo_RPM"),
        MeasurementColumns::new("tarina_nestepuoli_Aika", "tarina_nestepuoli_Arvo_mm/s"),
        MeasurementColumns::new("RUMPU_MOOTTORI_M1_Aika", "RUMPU_MOOTTORI_M1_Arvo"),
    ]
}

fn default_reference_column() -> String {
    "rumpu_nopeus_Arvo_RPM".to_string()
}

fn default_key_columns() -> Vec<String> {
    vec![
        "Ero_nopeus_Arvo_RPM".to_string(),
        "tarina_kiinteapuoli_Arvo_mm/s".to_string(),
        "tarina_nestepuoli_Arvo_mm/s".to_string(),
        "Momentti_Arvo_%".to_string(),
        "RUMPU_MOOTTORI_M1_Arvo".to_string(),
    ]
}

fn default_feed_column() -> String {
    "syote_Arvo_m3/h".to_string()
}

fn default_drum_speed_column() -> String {
    "rumpu_nopeus_Arvo_RPM".to_string()
}

fn default_diff_speed_column() -> String {
    "Ero_nopeus_Arvo_RPM".to_string()
}

fn default_torque_column() -> String {
    "Momentti_Arvo_%".to_string()
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            measurements: default_measurements(),
            reference_column: default_reference_column(),
            key_columns: default_key_columns(),
            feed_column: default_feed_column(),
            drum_speed_column: default_drum_speed_column(),
            diff_speed_column: default_diff_speed_column(),
            torque_column: default_torque_column(),
        }
    }
}

/// Configuration for the wash tank level log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TankConfig {
    /// Tank capacity in liters, used to convert level % drop to feed volume
    #[serde(default = "default_capacity_liters")]
    pub capacity_liters: f64,

    /// Header of the timestamp column
    #[serde(default = "default_tank_time_column")]
    pub time_column: String,

    /// Header of the fill level column (%)
    #[serde(default = "default_tank_level_column")]
    pub level_column: String,

    /// Header of the start/end marker column
    #[serde(default = "default_tank_marker_column")]
    pub marker_column: String,
}

fn default_capacity_liters() -> f64 {
    30_000.0 // 30 m3
}

fn default_tank_time_column() -> String {
    "pesusailio_Aika".to_string()
}

fn default_tank_level_column() -> String {
    "Pesusailio_pinta_Arvo_%".to_string()
}

fn default_tank_marker_column() -> String {
    "linkous_aloitus_lopetus".to_string()
}

impl Default for TankConfig {
    fn default() -> Self {
        Self {
            capacity_liters: default_capacity_liters(),
            time_column: default_tank_time_column(),
            level_column: default_tank_level_column(),
            marker_column: default_tank_marker_column(),
        }
    }
}

/// Configuration for the solids feed concentration log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolidsConfig {
    /// Header of the timestamp column
    #[serde(default = "default_solids_time_column")]
    pub time_column: String,

    /// Header of the concentration column (g/l)
    #[serde(default = "default_solids_value_column")]
    pub value_column: String,
}

fn default_solids_time_column() -> String {
    "Syote_Aika".to_string()
}

fn default_solids_value_column() -> String {
    "Kiintoaine_syote_g/l".to_string()
}

impl Default for SolidsConfig {
    fn default() -> Self {
        Self {
            time_column: default_solids_time_column(),
            value_column: default_solids_value_column(),
        }
    }
}

/// Configuration for the mass balance computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MassBalanceConfig {
    /// Fraction of the dry weight assumed to remain as residual moisture
    #[serde(default = "default_residual_moisture_fraction")]
    pub residual_moisture_fraction: f64,
}

fn default_residual_moisture_fraction() -> f64 {
    0.08
}

impl Default for MassBalanceConfig {
    fn default() -> Self {
        Self {
            residual_moisture_fraction: default_residual_moisture_fraction(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub sensors: SensorConfig,

    #[serde(default)]
    pub tank: TankConfig,

    #[serde(default)]
    pub solids: SolidsConfig,

    #[serde(default)]
    pub mass_balance: MassBalanceConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sensor_config() {
        let config = SensorConfig::default();
        assert_eq!(config.measurements.len(), 9);
        assert_eq!(config.reference_column, "rumpu_nopeus_Arvo_RPM");
        assert_eq!(config.key_columns.len(), 5);
        assert!(config
            .measurements
            .iter()
            .any(|m| m.value_column == config.reference_column));
    }

    #[test]
    fn test_key_columns_are_known_streams() {
        let config = SensorConfig::default();
        for key in &config.key_columns {
            assert!(
                config.measurements.iter().any(|m| &m.value_column == key),
                "key column {} not among measurements",
                key
            );
        }
    }

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.tank.capacity_liters, 30_000.0);
        assert_eq!(config.mass_balance.residual_moisture_fraction, 0.08);
        assert_eq!(config.solids.value_column, "Kiintoaine_syote_g/l");
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");

        let mut config = PipelineConfig::default();
        config.tank.capacity_liters = 12_500.0;
        config.to_yaml(&path).unwrap();

        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.tank.capacity_liters, 12_500.0);
        assert_eq!(loaded.sensors.measurements.len(), 9);
    }
}
