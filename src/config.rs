use std::path::Path;

use tracing::warn;

use crate::ai::PpoConfig;
use crate::checkpoint::CheckpointManagerConfig;
use crate::error::ConfigError;
use crate::game::IdsGameEnvConfig;
use crate::training::{OpponentPoolConfig, ScheduleKind, TrainerConfig};

/// Top-level application configuration, loadable from TOML.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub game: IdsGameEnvConfig,
    pub ppo: PpoConfig,
    pub trainer: TrainerConfig,
    pub opponent_pool: OpponentPoolConfig,
    pub checkpoint: CheckpointManagerConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let game = &self.game;
        if game.num_layers == 0 {
            return Err(invalid("game.num_layers must be >= 1"));
        }
        if game.num_servers_per_layer == 0 {
            return Err(invalid("game.num_servers_per_layer must be >= 1"));
        }
        if game.num_attack_types == 0 {
            return Err(invalid("game.num_attack_types must be >= 1"));
        }
        if game.max_value < 3 {
            return Err(invalid("game.max_value must be >= 3"));
        }
        if game.max_steps == 0 {
            return Err(invalid("game.max_steps must be > 0"));
        }
        if let Some(initial) = &game.initial_state {
            if initial.num_vulnerabilities_per_node > game.num_attack_types {
                return Err(invalid(
                    "game.initial_state.num_vulnerabilities_per_node must be <= game.num_attack_types",
                ));
            }
        }

        let ppo = &self.ppo;
        if ppo.learning_rate <= 0.0 {
            return Err(invalid("ppo.learning_rate must be > 0"));
        }
        if ppo.defender_learning_rate.is_some_and(|lr| lr <= 0.0) {
            return Err(invalid("ppo.defender_learning_rate must be > 0"));
        }
        if ppo.lr_schedule == ScheduleKind::Linear && ppo.final_learning_rate < 0.0 {
            return Err(invalid("ppo.final_learning_rate must be >= 0"));
        }
        if ppo.n_steps == 0 {
            return Err(invalid("ppo.n_steps must be > 0"));
        }
        if ppo.batch_size == 0 {
            return Err(invalid("ppo.batch_size must be > 0"));
        }
        if ppo.batch_size > ppo.n_steps * self.trainer.num_envs.max(1) {
            return Err(invalid("ppo.batch_size must be <= ppo.n_steps * trainer.num_envs"));
        }
        if ppo.n_epochs == 0 {
            return Err(invalid("ppo.n_epochs must be > 0"));
        }
        if !(0.0..=1.0).contains(&ppo.gamma) {
            return Err(invalid("ppo.gamma must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&ppo.gae_lambda) {
            return Err(invalid("ppo.gae_lambda must be in [0, 1]"));
        }
        if ppo.clip_range <= 0.0 {
            return Err(invalid("ppo.clip_range must be > 0"));
        }
        if ppo.clip_range_schedule == ScheduleKind::Linear && ppo.final_clip_range < 0.0 {
            return Err(invalid("ppo.final_clip_range must be >= 0"));
        }
        if ppo.clip_range_vf.is_some_and(|c| c <= 0.0) {
            return Err(invalid("ppo.clip_range_vf must be > 0"));
        }
        if ppo.ent_coef < 0.0 {
            return Err(invalid("ppo.ent_coef must be >= 0"));
        }
        if ppo.vf_coef < 0.0 {
            return Err(invalid("ppo.vf_coef must be >= 0"));
        }
        if ppo.max_grad_norm <= 0.0 {
            return Err(invalid("ppo.max_grad_norm must be > 0"));
        }
        if ppo.target_kl.is_some_and(|kl| kl <= 0.0) {
            return Err(invalid("ppo.target_kl must be > 0"));
        }
        if ppo.hidden_size == 0 {
            return Err(invalid("ppo.hidden_size must be > 0"));
        }

        let trainer = &self.trainer;
        if trainer.total_timesteps == 0 {
            return Err(invalid("trainer.total_timesteps must be > 0"));
        }
        if trainer.log_interval == 0 {
            return Err(invalid("trainer.log_interval must be > 0"));
        }
        if trainer.num_envs != 1 {
            return Err(invalid("trainer.num_envs must be 1"));
        }
        if trainer.alternating_optimization && trainer.alternating_period == 0 {
            return Err(invalid("trainer.alternating_period must be > 0"));
        }
        if trainer.eval_frequency > 0 && trainer.eval_episodes == 0 {
            return Err(invalid("trainer.eval_episodes must be > 0 when evaluating"));
        }

        let pool = &self.opponent_pool;
        if pool.enabled {
            if pool.pool_maxsize == 0 {
                return Err(invalid("opponent_pool.pool_maxsize must be > 0"));
            }
            if pool.pool_increment_period == 0 {
                return Err(invalid("opponent_pool.pool_increment_period must be > 0"));
            }
        }
        if !(0.0..=1.0).contains(&pool.pool_prob) {
            return Err(invalid("opponent_pool.pool_prob must be in [0, 1]"));
        }
        if pool.quality_score_eta < 0.0 {
            return Err(invalid("opponent_pool.quality_score_eta must be >= 0"));
        }

        Ok(())
    }

    /// Generate a TOML string with all default values (useful for creating
    /// example config files).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&AppConfig::default()).unwrap_or_default()
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Validation(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        config.validate().expect("default config should be valid");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[ppo]
learning_rate = 0.001
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!((config.ppo.learning_rate - 0.001).abs() < 1e-9);
        // Other fields should be defaults
        assert!((config.ppo.gamma - 0.99).abs() < 1e-6);
        assert_eq!(config.trainer.total_timesteps, 1_000_000);
        assert_eq!(config.game.num_attack_types, 10);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_nested_enums_parse() {
        let toml_str = r#"
[ppo]
lr_schedule = "linear"
final_learning_rate = 0.00001
target_kl = 0.02

[game]
dense_rewards = true

[game.initial_state]
defense_val = 3
det_val = 1
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.ppo.lr_schedule, ScheduleKind::Linear);
        assert_eq!(config.ppo.target_kl, Some(0.02));
        let initial = config.game.initial_state.as_ref().unwrap();
        assert_eq!(initial.defense_val, 3);
        assert_eq!(initial.attack_val, 0);
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_zero_timesteps() {
        let mut config = AppConfig::default();
        config.trainer.total_timesteps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_negative_lr() {
        let mut config = AppConfig::default();
        config.ppo.learning_rate = -0.001;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.ppo.defender_learning_rate = Some(0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_invalid_gamma() {
        let mut config = AppConfig::default();
        config.ppo.gamma = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_batch_larger_than_rollout() {
        let mut config = AppConfig::default();
        config.ppo.n_steps = 32;
        config.ppo.batch_size = 64;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_small_max_value() {
        let mut config = AppConfig::default();
        config.game.max_value = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_multiple_envs() {
        let mut config = AppConfig::default();
        config.trainer.num_envs = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_pool_prob_out_of_range() {
        let mut config = AppConfig::default();
        config.opponent_pool.pool_prob = 1.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_clip_range() {
        let mut config = AppConfig::default();
        config.ppo.clip_range = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = AppConfig::load_or_default(Path::new("nonexistent_config.toml")).unwrap();
        assert_eq!(config.trainer.total_timesteps, 1_000_000);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
[trainer]
total_timesteps = 500
alternating_optimization = true
"#
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.trainer.total_timesteps, 500);
        assert!(config.trainer.alternating_optimization);
        // Others are defaults
        assert!((config.ppo.learning_rate - 3e-4).abs() < 1e-9);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[ppo]\nn_epochs = 0\n").unwrap();
        let err = AppConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_default_toml_roundtrips() {
        let toml_str = AppConfig::default_toml();
        let config: AppConfig = toml::from_str(&toml_str).unwrap();
        config.validate().expect("roundtripped config should be valid");
        assert_eq!(config, AppConfig::default());
    }
}
