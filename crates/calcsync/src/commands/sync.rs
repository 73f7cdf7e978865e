//! `calcsync sync` / `calcsync check` -- recompute a field and push fixes.
//!
//! The workflow is split so it can run against any [`RedcapApi`]:
//! [`plan`] fetches metadata and records and reconciles them, [`apply`]
//! imports the corrected values, and [`run_workflow`] ties both to the
//! report and the confirmation prompt.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, bail};
use calcsync_core::types::import_rows;
use calcsync_core::{EvaluationFailure, ReconcileOptions, Reconciliation, UpdateEntry, reconcile};
use calcsync_formula::{TranslatedFormula, translate};
use calcsync_redcap::{RedcapApi, find_field};
use calcsync_ui::styles;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::{CheckArgs, SyncArgs};
use crate::context::RuntimeContext;
use crate::output::output_json;
use crate::prompt;

/// Result of recomputing one field, before anything is written.
#[derive(Debug)]
pub struct SyncPlan {
    pub field: String,
    pub formula: TranslatedFormula,
    pub reconciliation: Reconciliation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    UpToDate,
    DryRun,
    Declined,
    Applied,
}

/// What `sync` did, as printed with `--json`.
#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub field: String,
    pub expression: String,
    pub checked: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub updates: Vec<UpdateEntry>,
    pub failures: Vec<EvaluationFailure>,
    pub outcome: SyncOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<usize>,
}

/// Flags controlling [`run_workflow`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkflowMode {
    pub dry_run: bool,
    pub assume_yes: bool,
    /// Write the human-readable report to the output stream.
    pub report: bool,
    pub quiet: bool,
}

/// Execute the `calcsync sync` command.
pub fn run(ctx: &RuntimeContext, args: &SyncArgs) -> Result<()> {
    let config = ctx.config()?;
    let client = ctx.client(&config)?;

    let stdin = io::stdin();
    let mut input = stdin.lock();
    // Keep stdout clean for the JSON document.
    let mut out: Box<dyn Write> = if ctx.json {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    };

    let field = match &args.field {
        Some(field) => field.trim().to_string(),
        None => prompt::ask(&mut input, &mut out, "Enter the field name: ")?,
    };
    if field.is_empty() {
        bail!("no field name given");
    }

    let mode = WorkflowMode {
        dry_run: args.dry_run,
        assume_yes: args.yes,
        report: !ctx.json,
        quiet: ctx.quiet,
    };
    let report = run_workflow(
        &client,
        &field,
        &config.reconcile_options(),
        mode,
        &mut input,
        &mut out,
    )?;

    if ctx.json {
        output_json(&report);
    }
    Ok(())
}

/// Execute the `calcsync check` command: `sync --dry-run`.
pub fn run_check(ctx: &RuntimeContext, args: &CheckArgs) -> Result<()> {
    run(
        ctx,
        &SyncArgs {
            field: args.field.clone(),
            yes: false,
            dry_run: true,
        },
    )
}

/// Fetch everything needed for `field_name` and reconcile it.
pub fn plan<A: RedcapApi>(api: &A, field_name: &str, options: &ReconcileOptions) -> Result<SyncPlan> {
    let metadata = match api.export_metadata() {
        Ok(metadata) => metadata,
        Err(e) if e.is_unauthorized() => {
            return Err(anyhow::Error::new(e).context("REDCap rejected the API token"));
        }
        Err(e) => return Err(anyhow::Error::new(e).context("failed to export metadata")),
    };
    let field = find_field(&metadata, field_name)?;
    if !field.is_calculated() {
        warn!(field = field_name, field_type = %field.field_type, "field is not a calculated field");
    }

    let formula = translate(field.formula_text(), field.action_tag.as_deref())
        .with_context(|| format!("cannot translate the formula of '{field_name}'"))?;
    info!(field = field_name, expression = %formula.expression, "translated formula");

    let mut fields = vec![options.record_id_field.clone(), field_name.to_string()];
    for variable in formula.variables() {
        if !fields.contains(&variable) {
            fields.push(variable);
        }
    }
    let records = api.export_records(&fields).context("failed to export records")?;
    let reconciliation = reconcile(&records, field_name, &formula, options);

    Ok(SyncPlan {
        field: field_name.to_string(),
        formula,
        reconciliation,
    })
}

/// Import the planned updates; returns the count REDCap reports.
pub fn apply<A: RedcapApi>(api: &A, plan: &SyncPlan, record_id_field: &str) -> Result<usize> {
    let rows = import_rows(&plan.reconciliation.updates, record_id_field);
    let count = api.import_records(&rows).context("failed to import records")?;
    Ok(count)
}

/// Plan, report, confirm and apply.
pub fn run_workflow<A, R, W>(
    api: &A,
    field_name: &str,
    options: &ReconcileOptions,
    mode: WorkflowMode,
    input: &mut R,
    out: &mut W,
) -> Result<SyncReport>
where
    A: RedcapApi,
    R: BufRead,
    W: Write,
{
    let plan = plan(api, field_name, options)?;
    let result = &plan.reconciliation;

    if mode.report {
        if !result.updates.is_empty() {
            writeln!(out, "{}", styles::render_mismatch_header(field_name, result.updates.len()))?;
            for entry in &result.updates {
                writeln!(out, "  {}", styles::render_update(entry))?;
            }
        }
        for failure in &result.failures {
            writeln!(out, "  {}", styles::render_failure(failure))?;
        }
        if !mode.quiet {
            writeln!(out, "{}", styles::render_summary(field_name, result))?;
        }
    }

    let mut updated = None;
    let outcome = if result.updates.is_empty() {
        if mode.report {
            writeln!(out, "{}", styles::render_all_correct(field_name))?;
        }
        SyncOutcome::UpToDate
    } else if mode.dry_run {
        if mode.report {
            writeln!(out, "{}", styles::render_muted("Dry run: no changes made."))?;
        }
        SyncOutcome::DryRun
    } else if !mode.assume_yes
        && !prompt::confirm(
            input,
            &mut *out,
            &format!("Update {} record(s) in REDCap?", result.updates.len()),
        )?
    {
        if mode.report {
            writeln!(out, "No changes made.")?;
        }
        SyncOutcome::Declined
    } else {
        let count = apply(api, &plan, &options.record_id_field)?;
        if mode.report {
            writeln!(out, "{}", styles::render_updated(count))?;
        }
        updated = Some(count);
        SyncOutcome::Applied
    };

    let unchanged = result.unchanged();
    let SyncPlan {
        field,
        formula,
        reconciliation,
    } = plan;
    Ok(SyncReport {
        field,
        expression: formula.expression,
        checked: reconciliation.checked,
        unchanged,
        skipped: reconciliation.skipped,
        updates: reconciliation.updates,
        failures: reconciliation.failures,
        outcome,
        updated,
    })
}
