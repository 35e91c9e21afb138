// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::warn;

use regtrack::{
    entity_counts, list_agencies, list_committees, list_regulations, logging, open_database,
    regulation_detail, search_documents, seed_known_committees, Config, FederalRegisterClient,
    RegulationFilter, SearchForm, StageKind, SyncEngine,
};

#[derive(Parser)]
#[command(name = "regtrack", version, about = "Track U.S. federal rulemaking from the Federal Register")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch one batch of rule documents and record new stages
    Sync {
        /// Documents requested per run (overrides REGTRACK_BATCH_SIZE)
        #[arg(long)]
        batch_size: Option<u32>,
    },
    /// List tracked regulations with their current stage
    List {
        #[arg(long)]
        agency: Option<i64>,
        #[arg(long)]
        committee: Option<i64>,
        /// ANPRM, NPRM or Final
        #[arg(long)]
        stage: Option<StageKind>,
        /// Substring of title or RIN
        #[arg(long)]
        term: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show one regulation with its stages and documents
    Show { id: i64 },
    /// List agencies and the committees they report to
    Agencies,
    /// Search the Federal Register live, without recording anything
    Search {
        /// Keywords
        term: Option<String>,
        /// Agency slug, e.g. federal-trade-commission
        #[arg(long)]
        agency: Option<String>,
        /// Committee key: commerce, agriculture or transportation
        #[arg(long)]
        committee: Option<String>,
        /// nprm or final
        #[arg(long)]
        stage: Option<StageKind>,
        /// Only documents published in the last N days
        #[arg(long)]
        days: Option<i64>,
        #[arg(long)]
        page: Option<u32>,
    },
}

fn main() -> Result<()> {
    if let Err(e) = logging::init() {
        eprintln!("warning: logging not initialized: {e}");
    }

    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid configuration")?;

    let mut conn = open_database(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;
    seed_known_committees(&conn)?;

    match cli.command {
        Some(Command::Sync { batch_size }) => run_sync(&config, &mut conn, batch_size),
        Some(Command::List {
            agency,
            committee,
            stage,
            term,
            limit,
        }) => run_list(
            &conn,
            &RegulationFilter {
                agency_id: agency,
                committee_id: committee,
                stage,
                term,
                limit,
                offset: 0,
            },
        ),
        Some(Command::Show { id }) => run_show(&conn, id),
        Some(Command::Agencies) => run_agencies(&conn),
        Some(Command::Search {
            term,
            agency,
            committee,
            stage,
            days,
            page,
        }) => run_search(
            &config,
            &SearchForm {
                term,
                agency,
                committee,
                stage,
                days,
                page,
            },
        ),
        None => run_ui_mode(&conn),
    }
}

fn run_sync(config: &Config, conn: &mut Connection, batch_size: Option<u32>) -> Result<()> {
    println!("🔄 Federal Register Sync");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let client = FederalRegisterClient::from_config(config).context("Failed to build HTTP client")?;
    let batch_size = batch_size.unwrap_or(config.batch_size);

    let report = SyncEngine::new(client, conn).with_batch_size(batch_size).sync();

    println!("\n{}", report);
    if report.fetch_failed {
        warn!("sync fetch failed; nothing was recorded");
        return Ok(());
    }

    println!("✓ Documents seen:         {}", report.seen());
    println!("✓ Skipped (no RIN):       {}", report.skipped_missing_rin);
    println!("✓ Skipped (already seen): {}", report.already_recorded);
    if report.failed > 0 {
        println!("❌ Failed:                {}", report.failed);
    }
    if report.malformed > 0 {
        println!("❌ Malformed records:     {}", report.malformed);
    }

    let counts = entity_counts(conn)?;
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🗄️  Agencies:    {}", counts.agencies);
    println!("🗄️  Regulations: {}", counts.regulations);
    println!("🗄️  Rule stages: {}", counts.rule_stages);
    println!("🗄️  Documents:   {}", counts.documents);

    Ok(())
}

fn run_list(conn: &Connection, filter: &RegulationFilter) -> Result<()> {
    let summaries = list_regulations(conn, filter)?;

    if summaries.is_empty() {
        println!("No regulations found.");
        return Ok(());
    }

    println!("{:>5}  {:<12}  {:<6}  {:<12}  {}", "ID", "RIN", "STAGE", "DATE", "TITLE");
    for summary in &summaries {
        let stage = summary.current_stage.as_ref();
        println!(
            "{:>5}  {:<12}  {:<6}  {:<12}  {}",
            summary.regulation.id,
            summary.regulation.rin,
            stage.map(|s| s.stage_type.as_str()).unwrap_or("-"),
            stage
                .and_then(|s| s.publication_date)
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
            summary.regulation.title,
        );
    }
    println!("\n{} regulation(s)", summaries.len());

    Ok(())
}

fn run_show(conn: &Connection, id: i64) -> Result<()> {
    let detail = regulation_detail(conn, id)?;
    let regulation = &detail.regulation;

    println!("📜 {}", regulation.title);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("RIN:     {}", regulation.rin);
    if let Some(agency) = &detail.agency {
        match &agency.abbreviation {
            Some(abbr) => println!("Agency:  {} ({})", agency.name, abbr),
            None => println!("Agency:  {}", agency.name),
        }
    }
    if !detail.committees.is_empty() {
        let names: Vec<&str> = detail.committees.iter().map(|c| c.name.as_str()).collect();
        println!("Committees: {}", names.join(", "));
    }
    match &detail.current_stage {
        Some(stage) => println!("Current: {}", stage.stage_type),
        None => println!("Current: -"),
    }
    if let Some(description) = &regulation.description {
        println!("\n{}", description);
    }

    println!("\nStages:");
    for stage in &detail.stages {
        println!(
            "  {:<6} {:<12} {}",
            stage.stage_type,
            stage
                .publication_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
            stage.federal_register_id.as_deref().unwrap_or("-"),
        );
    }

    println!("\nDocuments:");
    for document in &detail.documents {
        println!(
            "  {} [{}] {}",
            document.title,
            document.source,
            document.url.as_deref().unwrap_or("-"),
        );
    }

    Ok(())
}

fn run_search(config: &Config, form: &SearchForm) -> Result<()> {
    let client = FederalRegisterClient::from_config(config).context("Failed to build HTTP client")?;
    let today = chrono::Local::now().date_naive();

    let page = search_documents(&client, form, today, config.items_per_page)
        .context("Federal Register search failed")?;

    println!("🔎 {} matching documents\n", page.count);
    for hit in &page.hits {
        println!("{}  {}", hit.document_number, hit.title);
        println!("   {} | {} | {} | {}", hit.stage, hit.agency, hit.committee, hit.publication_date);
        if !hit.html_url.is_empty() {
            println!("   {}", hit.html_url);
        }
    }

    Ok(())
}

fn run_agencies(conn: &Connection) -> Result<()> {
    println!("🏛️  Committees");
    for committee in list_committees(conn)? {
        println!("  {:>4}  {}", committee.id, committee.name);
    }

    println!("\n🏢 Agencies");
    for agency in list_agencies(conn)? {
        println!(
            "  {:>4}  {} {}",
            agency.id,
            agency.name,
            agency.abbreviation.map(|a| format!("({a})")).unwrap_or_default(),
        );
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(conn: &Connection) -> Result<()> {
    let summaries = list_regulations(conn, &RegulationFilter::default())?;

    if summaries.is_empty() {
        eprintln!("❌ No regulations tracked yet!");
        eprintln!("   Run: regtrack sync");
        eprintln!("   to fetch documents first.");
        std::process::exit(1);
    }

    let mut app = ui::App::new(summaries);
    ui::run_ui(&mut app, conn)?;

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_conn: &Connection) -> Result<()> {
    eprintln!("❌ TUI feature not enabled!");
    eprintln!("   Build with: cargo build --features tui");
    eprintln!("   Or use a subcommand: regtrack --help");
    std::process::exit(1);
}
