// ABOUTME: The generate_slides pipeline
// ABOUTME: Merges configuration, stages a workspace, runs mkslides and reports a BuildResult

use crate::config::Config;
use crate::errors::{Result, SlidesError};
use crate::invoker::{self, BuildCommand, CancelToken};
use crate::request::BuildRequest;
use crate::result::{self, BuildResult};
use crate::slides_config::EffectiveConfig;
use crate::utils;
use crate::workspace::Workspace;
use log::{error, info, warn};
use std::path::{Path, PathBuf};

/// Runs slide builds with a fixed server configuration.
///
/// Holds no per-request state, so one generator can serve concurrent calls
/// from several threads.
#[derive(Debug, Clone)]
pub struct SlideGenerator {
    config: Config,
}

impl SlideGenerator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build slides for `request`. Every failure is reported in the result.
    pub fn generate_slides(&self, request: &BuildRequest) -> BuildResult {
        self.generate_slides_with_cancel(request, &CancelToken::new())
    }

    /// Like [`generate_slides`](Self::generate_slides), aborting the build when `cancel` fires
    pub fn generate_slides_with_cancel(&self, request: &BuildRequest, cancel: &CancelToken) -> BuildResult {
        match self.try_generate(request, cancel) {
            Ok(result) => result,
            Err(err) => {
                error!("[Error] {}", err);
                let output_dir = utils::get_absolute_path(&self.output_dir_for(request)).ok();
                BuildResult::from_error(&err, output_dir.as_deref())
            }
        }
    }

    /// The fallible pipeline behind `generate_slides`.
    ///
    /// The workspace is released before this returns, whichever way it returns.
    pub fn try_generate(&self, request: &BuildRequest, cancel: &CancelToken) -> Result<BuildResult> {
        let effective = EffectiveConfig::resolve(&self.config.defaults, request)?;

        let output_dir = utils::prepare_output_dir(&self.output_dir_for(request))?;
        info!("[Setup] Ensuring output directory exists: {:?}", output_dir);

        if cancel.is_cancelled() {
            return Err(SlidesError::Cancelled);
        }

        let workspace = Workspace::acquire(&self.config.temp_root)?;
        let outcome = self.build_in(&workspace, request, &effective, &output_dir, cancel);
        let released = workspace.release();

        match (outcome, released) {
            (Ok(result), released) => released.map(|_| result),
            (Err(err), Err(cleanup)) => {
                warn!("Workspace cleanup also failed: {}", cleanup);
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
        }
    }

    fn build_in(
        &self,
        workspace: &Workspace,
        request: &BuildRequest,
        effective: &EffectiveConfig,
        output_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<BuildResult> {
        workspace.write_markdown(&request.markdown_content)?;
        workspace.write_config(effective)?;

        let command = BuildCommand::new(&self.config.mkslides_bin, workspace, output_dir, request.strict);
        let output = invoker::run(&command, self.config.timeout(), cancel)?;

        result::translate(output, output_dir, self.config.timeout())
    }

    fn output_dir_for(&self, request: &BuildRequest) -> PathBuf {
        request
            .output_dir
            .clone()
            .unwrap_or_else(|| self.config.default_output_dir.clone())
    }
}

impl Default for SlideGenerator {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
