//! appraisal-runner: headless appraisal runner.
//!
//! Usage:
//!   appraisal-runner --data-dir ./data --db pawn.db --garment garment.json
//!   appraisal-runner --data-dir ./data --db pawn.db --ipc-mode
//!
//! IPC mode reads one JSON command per line on stdin and writes one JSON
//! response per line on stdout.

use anyhow::Result;
use appraisal_core::{
    clock::SystemClock,
    condition::{ConditionModifier, ConditionModifierList},
    config::{AppraisalConfig, PunishmentPolicySeed},
    engine::{AppraisalEngine, AppraisalReport},
    error::AppraisalError,
    punishment::PolicySource,
    request::GarmentRequest,
    store::AppraisalStore,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Appraise { garment: GarmentRequest },
    AppraisalHistory { garment_id: String },
    CurrentPolicy,
    PolicyAsOf { date: NaiveDate },
    PolicyHistory,
    UpdatePolicy {
        #[serde(flatten)]
        policy: PunishmentPolicySeed,
    },
    CurrentConditions,
    ConditionsByDate { date: NaiveDate },
    LookupCondition { code: String },
    UpdateConditions {
        source_date: NaiveDate,
        modifiers:   Vec<ConditionModifier>,
    },
    ConditionHistory,
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = arg_value(&args, "--db").unwrap_or(":memory:");
    let data_dir = arg_value(&args, "--data-dir").unwrap_or("./data");
    let garment_path = arg_value(&args, "--garment");

    if !ipc_mode {
        println!("Pawn appraisal runner");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let config = AppraisalConfig::load(data_dir)?;
    let store = AppraisalStore::open(db)?;
    store.migrate()?;

    let engine = AppraisalEngine::build(config, Arc::new(store), Arc::new(SystemClock))?;
    engine.seed_defaults()?;

    if ipc_mode {
        run_ipc_loop(&engine)?;
    } else if let Some(path) = garment_path {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let request: GarmentRequest = serde_json::from_str(&content)?;
        let report = engine.appraise(&request)?;
        print_report(&report);
    } else {
        print_policy_summary(&engine)?;
    }

    Ok(())
}

fn run_ipc_loop(engine: &AppraisalEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": { "kind": "bad_request", "message": e.to_string() } });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        if matches!(cmd, IpcCommand::Quit) {
            break;
        }

        let response = match handle_command(engine, cmd) {
            Ok(value) => serde_json::json!({ "ok": value }),
            Err(e) => {
                log::warn!("ipc: command failed: {e}");
                serde_json::json!({ "error": { "kind": error_kind(&e), "message": e.to_string() } })
            }
        };
        writeln!(stdout, "{}", response)?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_command(
    engine: &AppraisalEngine,
    cmd: IpcCommand,
) -> Result<serde_json::Value, AppraisalError> {
    let value = match cmd {
        IpcCommand::Appraise { garment } => serde_json::to_value(engine.appraise(&garment)?)?,
        IpcCommand::AppraisalHistory { garment_id } => {
            serde_json::to_value(engine.appraisals_for_garment(&garment_id)?)?
        }
        IpcCommand::CurrentPolicy => serde_json::to_value(engine.policies().current()?)?,
        IpcCommand::PolicyAsOf { date } => serde_json::to_value(engine.policies().as_of(date)?)?,
        IpcCommand::PolicyHistory => serde_json::to_value(engine.policies().history()?)?,
        IpcCommand::UpdatePolicy { policy } => {
            let policy = policy.to_policy(engine.clock().now())?;
            serde_json::to_value(engine.policies().update(&policy)?)?
        }
        IpcCommand::CurrentConditions => serde_json::to_value(engine.conditions().current_list()?)?,
        IpcCommand::ConditionsByDate { date } => {
            serde_json::to_value(engine.conditions().by_last_updated(date)?)?
        }
        IpcCommand::LookupCondition { code } => {
            serde_json::to_value(engine.conditions().lookup_modifier(&code)?)?
        }
        IpcCommand::UpdateConditions { source_date, modifiers } => {
            let list = ConditionModifierList::new(source_date, modifiers)?;
            serde_json::to_value(engine.conditions().update(&list)?)?
        }
        IpcCommand::ConditionHistory => serde_json::to_value(engine.conditions().history()?)?,
        IpcCommand::Quit => serde_json::Value::Null,
    };
    Ok(value)
}

/// Stable machine-readable name for each failure kind.
fn error_kind(e: &AppraisalError) -> &'static str {
    match e {
        AppraisalError::InvalidArgument(_)                    => "invalid_argument",
        AppraisalError::NoCurrentPolicy                       => "no_current_policy",
        AppraisalError::NoPolicyForDate { .. }                => "no_policy_for_date",
        AppraisalError::ConditionModifierNotFound { .. }      => "condition_modifier_not_found",
        AppraisalError::NoCurrentConditionList                => "no_current_condition_list",
        AppraisalError::NoConditionListForDate { .. }         => "no_condition_list_for_date",
        AppraisalError::FutureDate { .. }                     => "future_date",
        AppraisalError::MultipleCurrentConditionLists { .. }  => "multiple_current_condition_lists",
        AppraisalError::CorruptRecord(_)                      => "corrupt_record",
        AppraisalError::ReferenceService(_)                   => "reference_service",
        AppraisalError::ParameterServiceUnavailable(_)        => "parameter_service_unavailable",
        AppraisalError::ParameterNotFound { .. }              => "parameter_not_found",
        AppraisalError::Database(_)                           => "database",
        AppraisalError::Serialization(_)                      => "serialization",
        AppraisalError::Other(_)                              => "other",
    }
}

fn print_report(report: &AppraisalReport) {
    println!("=== APPRAISAL ===");
    println!("  garment:        {}", report.garment_id);
    println!("  condition:      {}", report.condition_code);
    println!("  pieces:         {}", report.piece_count);
    println!("  policy:         {:?}", report.policy_id);
    println!("  jewelry:        {}", report.subtotals.jewelry);
    println!("  diamond:        {}", report.subtotals.diamond);
    println!("  complementary:  {}", report.subtotals.complementary);
    println!("  total:          {}", report.total);
    println!("  appraised at:   {}", report.appraised_at);
}

fn print_policy_summary(engine: &AppraisalEngine) -> Result<()> {
    let policy = engine.policies().current()?;
    let conditions = engine.conditions().current_list()?;

    println!("=== CURRENT FACTORS ===");
    println!("  policy id:      {:?}", policy.id);
    println!("  effective:      {}", format_instant(policy.effective_at));
    for (kind, factor) in policy.factor_map() {
        println!("  {:<15} {factor}", format!("{kind}:"));
    }
    println!();
    println!("=== CONDITION MODIFIERS (source {}) ===", conditions.source_date);
    for m in &conditions.modifiers {
        println!("  {:<15} {}", m.condition_code, m.factor);
    }
    Ok(())
}

fn format_instant(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
