//! Check-then-run pipeline

use crate::{config::FxConfig, Diagnostic, FxError, Runtime, Severity};
use fx_checker::{EffectChecker, EffectSummary};
use fx_core::{FunctionId, Program, Value};
use fx_runtime::{Outcome, TaskHandle, TaskStatus};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Check,
    Execute,
}

/// Pipeline stage result
#[derive(Debug)]
pub struct PipelineResult<T> {
    pub stage: PipelineStage,
    pub result: T,
    pub duration: Duration,
    pub diagnostics: Vec<Diagnostic>,
}

/// Everything a run produced
#[derive(Debug)]
pub struct RunReport {
    pub entry: FunctionId,
    pub outcome: Outcome,
    pub tasks: Vec<(TaskHandle, TaskStatus)>,
    pub diagnostics: Vec<Diagnostic>,
    pub check_time: Duration,
    pub execute_time: Duration,
}

pub struct Pipeline {
    config: FxConfig,
}

impl Pipeline {
    pub fn new(config: FxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FxConfig {
        &self.config
    }

    /// Run the effect checker. Violations and, when configured, warnings
    /// stop the pipeline.
    pub fn check(&self, program: &Program) -> Result<PipelineResult<EffectSummary>, FxError> {
        let start = Instant::now();
        let checker = EffectChecker::with_options(self.config.checker_options());
        let summary = checker.check(program).map_err(FxError::Violations)?;
        let duration = start.elapsed();

        let diagnostics: Vec<Diagnostic> = summary
            .warnings
            .iter()
            .map(|warning| Diagnostic {
                severity: Severity::Warning,
                message: warning.to_string(),
                function: Some(warning.function),
            })
            .collect();
        if self.config.checker.warnings_as_errors && !diagnostics.is_empty() {
            return Err(FxError::WarningsDenied {
                count: diagnostics.len(),
            });
        }

        debug!("checked {} functions in {:?}", program.len(), duration);
        Ok(PipelineResult {
            stage: PipelineStage::Check,
            result: summary,
            duration,
            diagnostics,
        })
    }

    /// Check `program`, then run the function named `entry`.
    pub fn run(&self, program: &Program, entry: &str, args: Vec<Value>) -> Result<RunReport, FxError> {
        let check = self.check(program)?;
        let entry = resolve_entry(program, entry)?;

        let start = Instant::now();
        let mut runtime = Runtime::with_config(program, &self.config);
        let outcome = runtime.run(entry, args)?;
        let execute_time = start.elapsed();

        let coordinator = runtime.coordinator();
        let tasks = coordinator
            .handles()
            .into_iter()
            .filter_map(|handle| coordinator.poll(handle).ok().map(|status| (handle, status)))
            .collect();

        info!("{} finished in {:?}", entry, execute_time);
        Ok(RunReport {
            entry,
            outcome,
            tasks,
            diagnostics: check.diagnostics,
            check_time: check.duration,
            execute_time,
        })
    }
}

/// Find the single function called `name`
pub fn resolve_entry(program: &Program, name: &str) -> Result<FunctionId, FxError> {
    match program.lookup(name).as_slice() {
        [] => Err(FxError::unknown_entry(name)),
        [id] => Ok(*id),
        candidates => Err(FxError::AmbiguousEntry {
            name: name.to_string(),
            count: candidates.len(),
        }),
    }
}
