//! amelia-insights - CLI tool to show a patient's dashboard metrics
//!
//! Computes the same metrics the therapist dashboard shows for one patient
//! and date range: session count, crisis events, mood, engagement and the
//! emotion breakdown.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/amelia/amelia.db (~/.local/share/amelia/amelia.db)
//! - Logs: $XDG_STATE_HOME/amelia/amelia.log (~/.local/state/amelia/amelia.log)
//! - Config: $XDG_CONFIG_HOME/amelia/config.toml (~/.config/amelia/config.toml)

use amelia_core::analytics::{generate_dashboard, DashboardReport};
use amelia_core::format::{format_relative_time, format_score};
use amelia_core::webhook::SyncWebhookClient;
use amelia_core::{Config, Database, DateRange, Profile, UserRole};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;

#[derive(Parser)]
#[command(name = "amelia-insights")]
#[command(about = "Show dashboard metrics for a patient")]
#[command(version)]
struct Args {
    /// Patient to report on: profile id, phone number or part of the name
    #[arg(short, long, required_unless_present = "list_patients")]
    patient: Option<String>,

    /// First day of the range (YYYY-MM-DD)
    #[arg(long)]
    from: Option<String>,

    /// Last day of the range (YYYY-MM-DD), defaults to today
    #[arg(long)]
    to: Option<String>,

    /// Length of the range when --from is not given
    #[arg(short, long)]
    days: Option<u32>,

    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Also fetch the key insights summary from the configured webhook
    #[arg(short, long)]
    key_insights: bool,

    /// List patients instead of reporting on one
    #[arg(long)]
    list_patients: bool,

    /// Only list patients actively assigned to this therapist
    #[arg(long, requires = "list_patients")]
    therapist: Option<String>,
}

/// Outcome of the optional webhook call. A failure is reported, never fatal.
enum KeyInsights {
    NotRequested,
    Ready(Vec<String>),
    Failed(String),
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.format != "text" && args.format != "json" {
        anyhow::bail!("unknown format '{}', expected text or json", args.format);
    }

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        amelia_core::logging::init(&config.logging).context("failed to initialize logging")?;

    // Open database
    let db_path = config.database_path();
    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    if args.list_patients {
        return list_patients(&db, args.therapist.as_deref());
    }

    let query = args.patient.as_deref().unwrap_or_default();
    let patient = resolve_patient(&db, query)?;
    let range = resolve_range(&args, config.analytics.default_range_days)?;

    tracing::info!(patient_id = %patient.id, %range, "amelia-insights starting");

    let report = generate_dashboard(&db, &patient.id, &range, &config.analytics)
        .context("failed to compute dashboard metrics")?;

    let key_insights = if args.key_insights {
        let client = SyncWebhookClient::new(&config.webhook)
            .context("failed to create webhook client")?
            .context("key insights need [webhook] enabled with a url in config.toml")?;
        match client.fetch_key_insights(&patient.id, &range) {
            Ok(insights) => KeyInsights::Ready(insights),
            Err(e) => {
                tracing::warn!(error = %e, "Key insights unavailable");
                KeyInsights::Failed(e.to_string())
            }
        }
    } else {
        KeyInsights::NotRequested
    };

    if args.format == "json" {
        print_json(&patient, &report, &key_insights)
    } else {
        print_text(&db, &patient, &report, &key_insights)
    }
}

/// Find the patient a query names.
///
/// An exact profile id wins, then a phone number match, then a unique
/// name match.
fn resolve_patient(db: &Database, query: &str) -> Result<Profile> {
    let query = query.trim();
    if query.is_empty() {
        anyhow::bail!("empty patient query");
    }

    if let Some(profile) = db.repo::<Profile>().get(query)? {
        return Ok(profile);
    }

    if query.chars().any(|c| c.is_ascii_digit()) {
        if let Some(profile) = db.find_profile_by_phone(query)? {
            return Ok(profile);
        }
    }

    let mut matches: Vec<Profile> = db
        .search_profiles_by_name(query)?
        .into_iter()
        .filter(|p| p.role == UserRole::Patient)
        .collect();

    match matches.len() {
        0 => anyhow::bail!("No patient found matching '{}'", query),
        1 => Ok(matches.remove(0)),
        _ => {
            let names = matches
                .iter()
                .map(|p| format!("{} ({})", p.full_name, p.id))
                .collect::<Vec<_>>()
                .join(", ");
            anyhow::bail!("'{}' matches several patients: {}", query, names)
        }
    }
}

/// Build the range from --from/--to/--days.
fn resolve_range(args: &Args, default_days: u32) -> Result<DateRange> {
    let days = args.days.unwrap_or(default_days);
    let range = match (&args.from, &args.to) {
        (Some(from), Some(to)) => DateRange::parse(from, to)?,
        (None, to) => {
            let end = match to {
                Some(to) => parse_day(to)?,
                None => Utc::now().date_naive(),
            };
            DateRange::last_days(end, days)?
        }
        (Some(from), None) => DateRange::first_days(parse_day(from)?, days)?,
    };
    Ok(range)
}

fn parse_day(s: &str) -> Result<chrono::NaiveDate> {
    Ok(DateRange::parse(s, s)?.from)
}

fn list_patients(db: &Database, therapist: Option<&str>) -> Result<()> {
    let patients = match therapist {
        Some(therapist_id) => db.patients_for_therapist(therapist_id)?,
        None => db.patients()?,
    };

    if patients.is_empty() {
        println!("No patients found in database.");
        println!("Run 'amelia-import <export.json>' first to load a table export.");
        return Ok(());
    }

    println!("{} patient(s):", patients.len());
    for patient in &patients {
        println!(
            "  {:<24} {:<28} {}",
            patient.id,
            patient.full_name,
            patient.phone.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn print_json(patient: &Profile, report: &DashboardReport, key_insights: &KeyInsights) -> Result<()> {
    let mut output = serde_json::json!({
        "patient": {
            "id": patient.id,
            "full_name": patient.full_name,
        },
        "report": report,
    });

    match key_insights {
        KeyInsights::NotRequested => {}
        KeyInsights::Ready(insights) => output["key_insights"] = serde_json::json!(insights),
        KeyInsights::Failed(error) => output["key_insights_error"] = serde_json::json!(error),
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_text(
    db: &Database,
    patient: &Profile,
    report: &DashboardReport,
    key_insights: &KeyInsights,
) -> Result<()> {
    println!("Patient: {} ({})", patient.full_name, patient.id);
    println!(
        "Range:   {} ({} days)",
        report.range,
        report.range.num_days()
    );
    if let Some(latest) = db.latest_conversation(&patient.id)? {
        let last = latest.last_message_at.unwrap_or(latest.started_at);
        println!("Last conversation: {}", format_relative_time(last));
    }
    let risk = db
        .patient_context(&patient.id)?
        .and_then(|c| c.triage())
        .and_then(|t| t.risk)
        .and_then(|r| r.overall_level);
    if let Some(risk) = risk {
        println!("Triage risk: {}", risk);
    }

    let summary = &report.summary;
    println!("\nSummary");
    println!("  Sessions:       {}", summary.total_sessions);
    println!("  Crisis events:  {}", summary.crisis_events);
    println!("  Average mood:   {}", format_score(summary.average_mood));
    println!("  Engagement:     {}%", summary.engagement_rate);

    println!("\nMood by day");
    for point in &report.mood_series {
        println!("  {}  {}", point.label, format_score(point.value));
    }

    println!("\nConversations by day");
    for point in &report.conversation_counts {
        println!("  {}  {}", point.label, point.value);
    }

    println!("\nCrisis events");
    if report.crisis_events.is_empty() {
        println!("  (none)");
    }
    for event in &report.crisis_events {
        let content = &event.content;
        let level = content
            .crisis_severity
            .as_deref()
            .or(content.risk_level.as_deref())
            .unwrap_or("-");
        println!(
            "  {}  {:<8} conversation {}",
            event.created_at.format("%Y-%m-%d %H:%M"),
            level,
            event.conversation_id
        );
        if let Some(ref activator) = content.activator {
            println!("      Activator:   {}", activator);
        }
        if let Some(ref belief) = content.belief {
            println!("      Belief:      {}", belief);
        }
        if let Some(ref consequence) = content.consequence {
            println!("      Consequence: {}", consequence);
        }
    }

    println!("\nEmotions");
    if report.emotions.is_empty() {
        println!("  (none)");
    }
    for emotion in &report.emotions {
        println!(
            "  {:<9} x{:<3} intensity {}",
            emotion.display_name,
            emotion.count,
            format_score(emotion.avg_intensity)
        );
        if !emotion.triggers.is_empty() {
            println!("      Triggers: {}", emotion.triggers.join(", "));
        }
        if !emotion.contexts.is_empty() {
            println!("      Contexts: {}", emotion.contexts.join(", "));
        }
    }

    match key_insights {
        KeyInsights::NotRequested => {}
        KeyInsights::Ready(insights) => {
            println!("\nKey insights");
            if insights.is_empty() {
                println!("  (none)");
            }
            for insight in insights {
                println!("  - {}", insight);
            }
        }
        KeyInsights::Failed(error) => {
            println!("\nKey insights unavailable: {}", error);
        }
    }

    Ok(())
}
