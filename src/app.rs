use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use reqwest::Client;
use tracing::{info, warn};

use crate::{
    browser::{BrowserLauncher, ChromeLauncher},
    cli::{Command, MonitorCommand, SessionCommand},
    config::AppConfig,
    domain::{FeeRecord, PatentContext, PatentRecord},
    extraction::{ExtractionEngine, HtmlSnapshot},
    infrastructure::{cancel::CancelSignal, directories::ResolvedPaths},
    monitor::{MonitorStore, UrgencyTier},
    portal::{capture_login, FeeLookup, LookupError},
    search::{HttpTransport, SearchClient},
    session::{SessionBlob, SessionStore},
};

/// Outcome of one patent in a batch lookup.
pub struct BatchItem {
    pub patent: PatentContext,
    pub result: Result<Vec<FeeRecord>, LookupError>,
}

pub struct FeeWatchApp<L = ChromeLauncher> {
    config: AppConfig,
    paths: ResolvedPaths,
    search: SearchClient<HttpTransport>,
    lookup: FeeLookup<L>,
    sessions: SessionStore,
    monitor: MonitorStore,
    cancel: CancelSignal,
}

impl FeeWatchApp<ChromeLauncher> {
    pub fn initialize(config: AppConfig, paths: ResolvedPaths, cancel: CancelSignal) -> Result<Self> {
        let launcher = ChromeLauncher::new(config.portal.clone());
        Self::with_launcher(config, paths, cancel, launcher)
    }
}

impl<L: BrowserLauncher> FeeWatchApp<L> {
    pub fn with_launcher(
        config: AppConfig,
        paths: ResolvedPaths,
        cancel: CancelSignal,
        launcher: L,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(format!("patent-fee-watch/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        let search = SearchClient::from_config(http_client, config.search.clone());
        let lookup = FeeLookup::new(launcher, config.portal.clone());
        let sessions = SessionStore::file(&paths.session_path);
        let monitor = MonitorStore::open(&paths.monitor_path, config.timezone)
            .context("failed to load the watch-list")?;

        Ok(Self {
            config,
            paths,
            search,
            lookup,
            sessions,
            monitor,
            cancel,
        })
    }

    pub async fn run(mut self, command: Command) -> Result<()> {
        match command {
            Command::Search {
                query,
                page,
                size,
                json,
            } => self.run_search(&query, page, size, json).await,
            Command::Fees {
                patents,
                query,
                headful,
                watch,
                json,
            } => {
                let targets = self.resolve_targets(patents, query.as_deref()).await?;
                let headful = headful || self.config.portal.headful;
                let batch = self.lookup_batch(&targets, headful).await;
                print_batch(&batch, json)?;
                if watch {
                    self.watch_batch(&batch)?;
                }
                Ok(())
            }
            Command::Extract { file, json } => run_extract(&file, json).await,
            Command::Monitor { command } => self.run_monitor(command),
            Command::Session { command } => self.run_session(command).await,
        }
    }

    async fn run_search(&self, query: &str, page: i64, size: i64, json: bool) -> Result<()> {
        let result = self.search.search(query, page, size).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&result)?);
            return Ok(());
        }
        println!("{} result(s), showing {}", result.total_count, result.records.len());
        for record in &result.records {
            println!(
                "{}  {}  [{}]  {}  {}",
                record.patent_number,
                record.patent_name,
                record.patent_type,
                record.company_name,
                record.legal_status
            );
        }
        Ok(())
    }

    async fn resolve_targets(
        &self,
        patents: Vec<String>,
        query: Option<&str>,
    ) -> Result<Vec<PatentContext>> {
        let mut targets: Vec<PatentContext> =
            patents.into_iter().map(PatentContext::from_number).collect();
        if let Some(query) = query {
            let page = self.search.search(query, 1, 10).await?;
            targets.extend(page.records.iter().map(patent_context));
        }
        if targets.is_empty() {
            bail!("no patents given; pass numbers or --query");
        }
        Ok(targets)
    }

    /// Looks up each patent in turn. A failure is recorded and the batch moves on; only
    /// cancellation stops it.
    pub async fn lookup_batch(&self, targets: &[PatentContext], headful: bool) -> Vec<BatchItem> {
        let mut items = Vec::with_capacity(targets.len());
        let mut listener = self.cancel.subscribe();
        for (index, patent) in targets.iter().enumerate() {
            info!(
                target: "app",
                patent = %patent.patent_number,
                position = index + 1,
                total = targets.len(),
                "looking up fees"
            );
            let result = self
                .lookup
                .lookup_fees(&self.sessions, patent, headful, &mut listener)
                .await;
            if let Err(err) = &result {
                warn!(target: "app", patent = %patent.patent_number, error = %err, "lookup failed");
            }
            let cancelled = matches!(result, Err(LookupError::Cancelled));
            items.push(BatchItem {
                patent: patent.clone(),
                result,
            });
            if cancelled {
                break;
            }
        }
        let degraded = self.lookup.engine().degraded_count();
        if degraded > 0 {
            warn!(target: "app", degraded, "some result pages matched no extraction pattern");
        }
        items
    }

    fn watch_batch(&mut self, batch: &[BatchItem]) -> Result<()> {
        let mut added = 0usize;
        for record in batch.iter().filter_map(|item| item.result.as_ref().ok()).flatten() {
            if self.monitor.add(record.clone())? {
                added += 1;
            }
        }
        println!("watch-list: {added} added, {} total", self.monitor.len());
        Ok(())
    }

    fn run_monitor(&mut self, command: MonitorCommand) -> Result<()> {
        match command {
            MonitorCommand::List { json } => {
                let view = self.monitor.list_with_urgency();
                if json {
                    println!("{}", serde_json::to_string_pretty(&view)?);
                    return Ok(());
                }
                if view.is_empty() {
                    println!("watch-list is empty ({})", self.monitor.path().display());
                    return Ok(());
                }
                for item in &view {
                    let record = &item.entry.record;
                    let days = item
                        .urgency
                        .days_left
                        .map(|d| format!("{d:>5}d"))
                        .unwrap_or_else(|| "     -".into());
                    println!(
                        "#{:<3} {:<8} {} {}  {}  {}  {}  {}",
                        item.position,
                        item.urgency.tier,
                        days,
                        item.urgency.tier.label(),
                        record.patent_number,
                        record.fee_type,
                        if record.due_date.is_empty() { "-" } else { record.due_date.as_str() },
                        record.amount
                    );
                }
                let counts = self.monitor.tier_counts();
                let summary: Vec<String> = UrgencyTier::ALL
                    .iter()
                    .filter_map(|tier| counts.get(tier).map(|n| format!("{tier}={n}")))
                    .collect();
                println!("{}", summary.join(" "));
                Ok(())
            }
            MonitorCommand::Remove { position } => {
                if self.monitor.remove(position)? {
                    println!("removed entry #{position}");
                } else {
                    bail!("no entry at position {position} ({} entries)", self.monitor.len());
                }
                Ok(())
            }
            MonitorCommand::Clear { yes } => {
                if !yes {
                    bail!("refusing to clear {} entries without --yes", self.monitor.len());
                }
                let removed = self.monitor.clear()?;
                println!("cleared {removed} entries");
                Ok(())
            }
        }
    }

    async fn run_session(&self, command: SessionCommand) -> Result<()> {
        match command {
            SessionCommand::Status => {
                if !self.sessions.exists() {
                    println!("no saved session at {}", self.sessions.location());
                    return Ok(());
                }
                let blob = self.sessions.load()?;
                print_summary(&self.sessions.location(), &blob);
                Ok(())
            }
            SessionCommand::Verify { file } => {
                let blob = read_blob(&file)?;
                print_summary(&file.display().to_string(), &blob);
                Ok(())
            }
            SessionCommand::Import { file } => {
                let blob = read_blob(&file)?;
                self.sessions.save(&blob)?;
                print_summary(&self.sessions.location(), &blob);
                Ok(())
            }
            SessionCommand::Login => {
                let mut listener = self.cancel.subscribe();
                let summary = capture_login(
                    self.lookup.launcher(),
                    &self.config.portal,
                    &self.sessions,
                    &mut listener,
                )
                .await?;
                println!(
                    "session saved to {} ({} cookies)",
                    self.paths.session_path.display(),
                    summary.cookie_count
                );
                Ok(())
            }
        }
    }
}

fn patent_context(record: &PatentRecord) -> PatentContext {
    PatentContext {
        patent_number: record.patent_number.clone(),
        patent_name: record.patent_name.clone(),
        company_name: record.company_name.clone(),
        legal_status: Some(record.legal_status.clone()).filter(|s| !s.is_empty()),
    }
}

fn read_blob(file: &Path) -> Result<SessionBlob> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("failed to read session file {}", file.display()))?;
    SessionBlob::parse(&raw).with_context(|| format!("{} is not a usable session", file.display()))
}

fn print_summary(location: &str, blob: &SessionBlob) {
    let summary = blob.summary();
    println!("session: {location}");
    println!(
        "  {} cookies, {} origins",
        summary.cookie_count, summary.origin_count
    );
    for domain in &summary.domains {
        println!("  {domain}");
    }
}

fn print_records(records: &[FeeRecord]) {
    for record in records {
        println!(
            "  {}  {}  {}",
            record.fee_type,
            if record.due_date.is_empty() { "-" } else { record.due_date.as_str() },
            record.amount
        );
    }
}

fn print_batch(batch: &[BatchItem], json: bool) -> Result<()> {
    if json {
        let items: Vec<serde_json::Value> = batch
            .iter()
            .map(|item| match &item.result {
                Ok(records) => serde_json::json!({
                    "patentNumber": item.patent.patent_number,
                    "records": records,
                }),
                Err(err) => serde_json::json!({
                    "patentNumber": item.patent.patent_number,
                    "error": err.to_string(),
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    for item in batch {
        match &item.result {
            Ok(records) if records.is_empty() => {
                println!("{}: no fees due", item.patent.patent_number)
            }
            Ok(records) => {
                println!("{}: {} fee(s)", item.patent.patent_number, records.len());
                print_records(records);
            }
            Err(err) => println!("{}: failed: {err}", item.patent.patent_number),
        }
    }
    Ok(())
}

async fn run_extract(file: &Path, json: bool) -> Result<()> {
    let markup = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let snapshot = HtmlSnapshot::parse(&markup);
    let extraction = ExtractionEngine::new().extract(&snapshot).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&extraction.records)?);
    } else {
        println!("{:?} tier, {} record(s)", extraction.tier, extraction.records.len());
        print_records(&extraction.records);
    }
    Ok(())
}
