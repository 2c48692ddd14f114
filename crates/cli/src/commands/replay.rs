//! `vellum replay`: drive a script of record saves through the engine
//! against an in-memory store and print what happened.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;
use vellum_engine::{
    Attributes, CommitOutcome, OwnerRef, Phase, ScopedActor, SkipReason, SnapshotId,
    VersionContext, VersioningConfig, VersioningEngine, VersioningError,
};
use vellum_storage::{MemorySnapshotStore, SnapshotRecord};

use crate::{fail, OutputFormat};

/// One save in a replay script.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Step {
    kind: String,
    id: String,
    /// Merged over the record's current attributes before saving.
    #[serde(default)]
    attributes: Attributes,
    /// Force the create phase even for a record seen before.
    #[serde(default)]
    create: bool,
    reason: Option<String>,
    actor: Option<String>,
    /// Switch versioning on or off for this record from this step on.
    versioning: Option<bool>,
}

#[derive(Debug, Serialize)]
struct StepReport {
    step: usize,
    owner: OwnerRef,
    #[serde(flatten)]
    outcome: CommitOutcome,
}

/// Host-side state of one record across steps.
#[derive(Default)]
struct HostRecord {
    persisted: Option<Attributes>,
    current: Attributes,
    ctx: VersionContext,
}

type Engine = VersioningEngine<MemorySnapshotStore, ScopedActor>;

pub(crate) fn cmd_replay(
    config_path: &Path,
    script_path: &Path,
    output: OutputFormat,
    quiet: bool,
) {
    let registry = match VersioningConfig::load(config_path).and_then(|c| c.into_registry()) {
        Ok(r) => r,
        Err(e) => fail(&e.to_string(), output, quiet),
    };
    let steps = match read_script(script_path) {
        Ok(s) => s,
        Err(msg) => fail(&msg, output, quiet),
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => fail(
            &format!("failed to create tokio runtime: {}", e),
            output,
            quiet,
        ),
    };
    let engine = VersioningEngine::new(MemorySnapshotStore::new(), ScopedActor, registry);
    let result = rt.block_on(async {
        let reports = run_steps(&engine, steps).await?;
        let histories = collect_histories(&engine, &reports).await?;
        Ok::<_, String>((reports, histories))
    });
    let (reports, histories) = match result {
        Ok(r) => r,
        Err(msg) => fail(&msg, output, quiet),
    };

    match output {
        OutputFormat::Json => {
            let records: Vec<_> = histories
                .iter()
                .map(|(owner, versions)| json!({ "owner": owner, "versions": versions }))
                .collect();
            let doc = json!({ "steps": reports, "records": records });
            println!(
                "{}",
                serde_json::to_string_pretty(&doc)
                    .unwrap_or_else(|e| format!("serialization error: {}", e))
            );
        }
        OutputFormat::Text => {
            if !quiet {
                for report in &reports {
                    println!(
                        "step {} {}: {}",
                        report.step,
                        report.owner,
                        describe(&report.outcome)
                    );
                }
            }
            for (owner, versions) in &histories {
                println!("{} ({} snapshot{})", owner, versions.len(), plural(versions.len()));
                for record in versions {
                    println!("{}", history_line(record));
                }
            }
        }
    }
}

fn read_script(path: &Path) -> Result<Vec<Step>, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading file '{}': {}", path.display(), e))?;
    serde_json::from_str(&text)
        .map_err(|e| format!("error parsing script '{}': {}", path.display(), e))
}

async fn run_steps(engine: &Engine, steps: Vec<Step>) -> Result<Vec<StepReport>, String> {
    let mut records: BTreeMap<OwnerRef, HostRecord> = BTreeMap::new();
    let mut reports = Vec::with_capacity(steps.len());

    for (index, mut step) in steps.into_iter().enumerate() {
        let number = index + 1;
        let owner = OwnerRef::new(step.kind.clone(), step.id.clone());
        let record = records.entry(owner.clone()).or_default();
        let actor = step.actor.take();
        let outcome = ScopedActor::scope(actor, save(engine, record, &owner, step))
            .await
            .map_err(|e| format!("step {} ({}): {}", number, owner, e))?;

        tracing::debug!(step = number, owner = %owner, ?outcome, "replayed step");
        reports.push(StepReport {
            step: number,
            owner,
            outcome,
        });
    }
    Ok(reports)
}

async fn save(
    engine: &Engine,
    record: &mut HostRecord,
    owner: &OwnerRef,
    step: Step,
) -> Result<CommitOutcome, VersioningError> {
    match step.versioning {
        Some(true) => record.ctx.enable(),
        Some(false) => record.ctx.disable(),
        None => {}
    }
    if let Some(reason) = step.reason {
        record.ctx.set_reason(reason);
    }
    record.current.extend(step.attributes);

    let (phase, persisted) = match &record.persisted {
        Some(p) if !step.create => (Phase::Update, p.clone()),
        _ => (Phase::Create, Attributes::new()),
    };
    engine.before_persist(
        &mut record.ctx,
        &owner.owner_type,
        phase,
        &persisted,
        &record.current,
    )?;
    record.persisted = Some(record.current.clone());
    engine
        .after_persist(&mut record.ctx, owner, &record.current)
        .await
}

async fn collect_histories(
    engine: &Engine,
    reports: &[StepReport],
) -> Result<BTreeMap<OwnerRef, Vec<SnapshotRecord>>, String> {
    let mut histories = BTreeMap::new();
    for report in reports {
        if histories.contains_key(&report.owner) {
            continue;
        }
        let versions = engine
            .versions(&report.owner)
            .await
            .map_err(|e| format!("reading history of {}: {}", report.owner, e))?;
        histories.insert(
            report.owner.clone(),
            versions.into_iter().map(|v| v.into_record()).collect(),
        );
    }
    Ok(histories)
}

fn describe(outcome: &CommitOutcome) -> String {
    let purged = |ids: &[SnapshotId]| {
        if ids.is_empty() {
            String::new()
        } else {
            let list: Vec<_> = ids.iter().map(|id| format!("#{}", id)).collect();
            format!(" (purged {})", list.join(", "))
        }
    };
    match outcome {
        CommitOutcome::Skipped { reason } => format!(
            "skipped ({})",
            match reason {
                SkipReason::Disabled => "versioning disabled",
                SkipReason::NotCaptured => "no captured changes",
                SkipReason::NotVersionWorthy => "not version-worthy",
            }
        ),
        CommitOutcome::Inserted { id, purged: ids } => format!("inserted #{}{}", id, purged(ids)),
        CommitOutcome::Reactivated { id, purged: ids } => {
            format!("reactivated #{}{}", id, purged(ids))
        }
    }
}

fn history_line(record: &SnapshotRecord) -> String {
    let mut line = format!(
        "  {} #{} {}",
        if record.active { "*" } else { " " },
        record.id,
        record.payload
    );
    if let Some(actor) = &record.actor_id {
        line.push_str(&format!(" actor={}", actor));
    }
    if let Some(reason) = &record.reason {
        line.push_str(&format!(" reason={:?}", reason));
    }
    line
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
