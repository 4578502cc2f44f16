//! CLI route: run context and command dispatch.

use crate::cli::parse::{Commands, ConfigCommands};
use crate::cli::presentation::{format_plan_status, format_run_summary};
use crate::config::{ConfigLoader, PagesmithConfig};
use crate::error::{CommandError, ConfigError};
use crate::generation::driver::Generator;
use crate::generation::hooks::FsArtifactStore;
use crate::generation::plan::Plan;
use crate::progress::aggregator::ProgressAggregator;
use crate::progress::bus::{combine, tracing_handler};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runtime context for CLI execution: workspace and the loaded configuration.
pub struct RunContext {
    workspace_root: PathBuf,
    config: PagesmithConfig,
}

impl RunContext {
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = match config_path {
            Some(path) => ConfigLoader::load_from_file(&path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        Ok(Self {
            workspace_root,
            config,
        })
    }

    pub fn config(&self) -> &PagesmithConfig {
        &self.config
    }

    pub async fn execute(
        &self,
        command: &Commands,
        cancel: CancellationToken,
    ) -> Result<String, CommandError> {
        match command {
            Commands::Run {
                plan,
                mode,
                dry_run,
                overwrite,
                stop_on_error,
            } => {
                let mut config = self.config.clone();
                if let Some(mode) = mode {
                    config.pipeline.mode = *mode;
                }
                config.pipeline.dry_run |= *dry_run;
                config.pipeline.overwrite |= *overwrite;
                if *stop_on_error {
                    config.pipeline.continue_on_error = false;
                }
                self.run_plan(&self.resolve(plan), config, cancel).await
            }
            Commands::Status { plan } => {
                let plan = Plan::load(&self.resolve(plan))?;
                Ok(format_plan_status(&plan))
            }
            Commands::Config {
                command: ConfigCommands::Show,
            } => {
                let mut shown = self.config.clone();
                if shown.provider.api_key.is_some() {
                    shown.provider.api_key = Some("<redacted>".to_string());
                }
                Ok(shown.to_toml_string()?)
            }
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }

    async fn run_plan(
        &self,
        plan_path: &Path,
        config: PagesmithConfig,
        cancel: CancellationToken,
    ) -> Result<String, CommandError> {
        config
            .validate()
            .map_err(|errors| ConfigError::Invalid(errors.join("; ")))?;
        let mut plan = Plan::load(plan_path)?;

        let provider = config.provider.create_client()?;
        let store = Arc::new(FsArtifactStore::new(
            config.output_root(&self.workspace_root),
        ));
        let aggregator = Arc::new(ProgressAggregator::new());
        let dry_run = config.pipeline.dry_run;

        let generator = Generator::new(config.pipeline, provider, store)
            .with_completion_options(config.provider.default_options)
            .with_progress(combine([
                Some(aggregator.handler()),
                Some(tracing_handler()),
            ]));

        let report = generator.run(&mut plan, cancel).await;

        if dry_run {
            info!(plan = %plan_path.display(), "Dry run, plan not saved");
        } else if let Err(e) = plan.save(plan_path) {
            warn!(error = %e, "Failed to save plan");
            return Err(e.into());
        }

        let summary = format_run_summary(&plan, &aggregator.summary(), &report);
        match report.error {
            Some(source) => Err(CommandError::Pipeline { summary, source }),
            None => Ok(summary),
        }
    }
}
