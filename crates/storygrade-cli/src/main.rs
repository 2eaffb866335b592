//! storygrade - rubric-driven quality ratings for user stories
//!
//! ## Commands
//!
//! - `validate`: check a rubric file and list every violation
//! - `resolve`: merge a base rubric with a project override
//! - `rescale`: proportionally rescale enabled weights to 100
//! - `score`: compute the aggregate for a sub-score file
//! - `config`: show or save the stored rubric tiers
//! - `rate`: rate one story or a whole project against a rating endpoint

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};

use storygrade_core::metrics::METRICS;
use storygrade_core::{
    resolve, save_tier, score_rating, BatchReport, ConfigStore, EvaluationResult, FsConfigStore,
    HttpRatingService, JobOutcome, JsonFileStorySource, ProjectSummary, RatingClientConfig,
    RubricConfig, RubricOverride, RubricTier, StoryKey, StoryRater, ValidationReport,
};

#[derive(Parser)]
#[command(name = "storygrade")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Rubric-driven quality ratings for user stories", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding the stored rubric tiers
    #[arg(
        long,
        global = true,
        env = "STORYGRADE_CONFIG_DIR",
        default_value = ".storygrade"
    )]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a rubric file
    Validate {
        /// Rubric JSON file
        rubric: PathBuf,
    },

    /// Merge a base rubric with a project override and print the result
    Resolve {
        /// Base rubric JSON file
        #[arg(long)]
        base: PathBuf,

        /// Project override JSON file
        #[arg(long = "override")]
        overrides: Option<PathBuf>,
    },

    /// Rescale enabled weights so they sum to 100
    Rescale {
        /// Rubric JSON file
        rubric: PathBuf,

        /// Write the rescaled rubric here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compute the aggregate score for a set of sub-scores
    Score {
        /// Rubric JSON file
        rubric: PathBuf,

        /// JSON object mapping dimension id to sub-score
        scores: PathBuf,
    },

    /// Show or save stored rubric tiers
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Rate stories from a tracker export against a rating endpoint
    Rate {
        /// JSON array of stories
        #[arg(long)]
        stories: PathBuf,

        /// Rate every story of this project
        #[arg(long, conflicts_with = "story", required_unless_present = "story")]
        project: Option<String>,

        /// Rate a single story
        #[arg(long)]
        story: Option<String>,

        /// Rating endpoint URL
        #[arg(long, env = "STORYGRADE_RATING_URL")]
        endpoint: Option<String>,

        /// Model the rating service should use
        #[arg(long, env = "STORYGRADE_MODEL")]
        model: Option<String>,

        /// Per-request timeout in seconds
        #[arg(long, env = "STORYGRADE_TIMEOUT_SECS")]
        timeout_secs: Option<u64>,

        /// Stories scoring below this are listed as weak
        #[arg(long, default_value = "60")]
        weak_threshold: u8,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the merged rubric for a project, or the base rubric
    Show {
        #[arg(long)]
        project: Option<String>,
    },

    /// Store a new base rubric
    SaveBase {
        /// Rubric JSON file
        rubric: PathBuf,
    },

    /// Store a project override
    SaveProject {
        /// Project key
        project: String,

        /// Override JSON file
        overrides: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    storygrade_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Validate { rubric } => cmd_validate(&rubric),
        Commands::Resolve { base, overrides } => cmd_resolve(&base, overrides.as_deref()),
        Commands::Rescale { rubric, output } => cmd_rescale(&rubric, output.as_deref()),
        Commands::Score { rubric, scores } => cmd_score(&rubric, &scores),
        Commands::Config { action } => {
            let store = open_config_store(&cli.config_dir)?;
            match action {
                ConfigAction::Show { project } => cmd_config_show(&store, project.as_deref()).await,
                ConfigAction::SaveBase { rubric } => {
                    let config: RubricConfig = load_json(&rubric)?;
                    cmd_config_save(&store, RubricTier::Base(config)).await
                }
                ConfigAction::SaveProject { project, overrides } => {
                    let overrides: RubricOverride = load_json(&overrides)?;
                    cmd_config_save(
                        &store,
                        RubricTier::Project {
                            project_key: project,
                            overrides,
                        },
                    )
                    .await
                }
            }
        }
        Commands::Rate {
            stories,
            project,
            story,
            endpoint,
            model,
            timeout_secs,
            weak_threshold,
        } => {
            let mut client = RatingClientConfig::from_env();
            if let Some(endpoint) = endpoint {
                client.endpoint = endpoint;
            }
            if let Some(model) = model {
                client.model = model;
            }
            if let Some(secs) = timeout_secs {
                client.timeout = Duration::from_secs(secs);
            }
            let rater = build_rater(&cli.config_dir, &stories, client)?;

            let result = match (project, story) {
                (_, Some(story)) => cmd_rate_story(&rater, StoryKey::from(story)).await,
                (Some(project), None) => cmd_rate_project(&rater, &project, weak_threshold).await,
                (None, None) => bail!("either --project or --story is required"),
            };
            METRICS.flush();
            result
        }
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn open_config_store(dir: &Path) -> Result<Arc<FsConfigStore>> {
    let store = FsConfigStore::new(dir)
        .with_context(|| format!("Failed to open config store at {}", dir.display()))?;
    Ok(Arc::new(store))
}

fn build_rater(config_dir: &Path, stories: &Path, client: RatingClientConfig) -> Result<StoryRater> {
    info!(endpoint = %client.endpoint, model = %client.model, "using rating service");
    let rating = HttpRatingService::new(client).context("Failed to build rating client")?;
    Ok(StoryRater::new(
        Arc::new(rating),
        Arc::new(JsonFileStorySource::new(stories)),
        open_config_store(config_dir)?,
    ))
}

fn cmd_validate(path: &Path) -> Result<()> {
    let config: RubricConfig = load_json(path)?;
    let report = config.validate();
    print!("{}", render_report(&report));
    if !report.is_valid() {
        bail!("{} violation(s) found", report.violations.len());
    }
    Ok(())
}

fn cmd_resolve(base: &Path, overrides: Option<&Path>) -> Result<()> {
    let base: RubricConfig = load_json(base)?;
    let overrides: Option<RubricOverride> = overrides.map(load_json).transpose()?;
    let merged = resolve(&base, overrides.as_ref());
    println!("{}", serde_json::to_string_pretty(&merged)?);

    let report = merged.validate();
    if !report.is_valid() {
        warn!(report = %report, "merged rubric is not valid");
    }
    Ok(())
}

fn cmd_rescale(path: &Path, output: Option<&Path>) -> Result<()> {
    let config: RubricConfig = load_json(path)?;
    let rescaled = config.rescaled();
    let rendered = serde_json::to_string_pretty(&rescaled)?;
    match output {
        Some(out) => {
            std::fs::write(out, rendered)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("Rescaled rubric written to {}", out.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

fn cmd_score(rubric: &Path, scores: &Path) -> Result<()> {
    let config: RubricConfig = load_json(rubric)?;
    let scores: BTreeMap<String, i64> = load_json(scores)?;
    let scored = score_rating(&config, &scores).context("Scoring failed")?;

    for (id, score) in &scored.dimension_scores {
        println!("  {:<24} {:>3}", id, score);
    }
    println!(
        "Overall: {} ({})",
        scored.overall_score,
        storygrade_core::QualityBand::from_score(scored.overall_score).label()
    );
    Ok(())
}

async fn cmd_config_show(store: &FsConfigStore, project: Option<&str>) -> Result<()> {
    let config = match project {
        Some(project) => store.merged(project).await?,
        None => store
            .load_base()
            .await?
            .unwrap_or_else(RubricConfig::default_base),
    };
    println!("{}", serde_json::to_string_pretty(&config)?);
    info!(digest = %config.digest(), "rubric digest");
    Ok(())
}

async fn cmd_config_save(store: &FsConfigStore, tier: RubricTier) -> Result<()> {
    let label = match &tier {
        RubricTier::Base(_) => "base".to_string(),
        RubricTier::Project { project_key, .. } => format!("project {}", project_key),
    };

    match save_tier(store, tier).await {
        Ok(_) => {
            println!("Saved {} rubric", label);
            Ok(())
        }
        Err(err) => {
            if let Some(report) = err.validation_report() {
                print!("{}", render_report(report));
            }
            Err(err).with_context(|| format!("Refused to save {} rubric", label))
        }
    }
}

async fn cmd_rate_story(rater: &StoryRater, key: StoryKey) -> Result<()> {
    let handle = rater.evaluate_story(&key).await?;

    let outcome = tokio::select! {
        outcome = handle.wait() => outcome,
        _ = tokio::signal::ctrl_c() => {
            rater.cancel_evaluation(key.clone());
            handle.wait().await
        }
    };

    match outcome {
        JobOutcome::Rated { result } => {
            print!("{}", render_result(&result));
            Ok(())
        }
        JobOutcome::Failed { reason } => bail!("{} failed: {}", key, reason),
        JobOutcome::Cancelled => bail!("{} cancelled", key),
    }
}

async fn cmd_rate_project(rater: &StoryRater, project: &str, weak_threshold: u8) -> Result<()> {
    let batch = rater
        .evaluate_project(project)
        .await
        .with_context(|| format!("Failed to start rating project {}", project))?;
    println!(
        "Rating {} stories of {} (batch {})",
        batch.handles().len(),
        project,
        batch.batch_id()
    );

    let report = tokio::select! {
        report = batch.wait() => report,
        _ = tokio::signal::ctrl_c() => {
            let cancelled = rater.cancel_evaluation(batch.batch_id());
            warn!(cancelled, "interrupted, cancelling remaining stories");
            batch.wait().await
        }
    };

    print!("{}", render_batch(&report));
    let summary = rater.project_summary(project, weak_threshold);
    print!("{}", render_summary(&summary));

    if report.progress.failed > 0 {
        bail!("{} of {} stories failed", report.progress.failed, report.progress.submitted);
    }
    Ok(())
}

fn render_report(report: &ValidationReport) -> String {
    if report.is_valid() {
        return "Rubric is valid\n".to_string();
    }
    let mut out = String::from("Rubric is invalid:\n");
    for violation in &report.violations {
        out.push_str(&format!("  - {}\n", violation));
    }
    out
}

fn render_result(result: &EvaluationResult) -> String {
    let mut out = format!(
        "{}: {} ({})\n",
        result.story_key,
        result.overall_score,
        result.band().label()
    );
    for (id, score) in &result.dimension_scores {
        out.push_str(&format!("  {:<24} {:>3}\n", id, score));
    }
    if !result.rationale.is_empty() {
        out.push_str(&format!("  {}\n", result.rationale));
    }
    for suggestion in &result.suggestions {
        out.push_str(&format!("  - {}\n", suggestion));
    }
    out
}

fn render_batch(report: &BatchReport) -> String {
    let mut out = String::new();
    for item in &report.outcomes {
        let line = match &item.outcome {
            JobOutcome::Rated { result } => {
                format!("{:<12} {:>3}  {}", item.story_key, result.overall_score, result.band())
            }
            JobOutcome::Failed { reason } => format!("{:<12} failed: {}", item.story_key, reason),
            JobOutcome::Cancelled => format!("{:<12} cancelled", item.story_key),
        };
        out.push_str(&line);
        out.push('\n');
    }
    let p = &report.progress;
    out.push_str(&format!(
        "submitted {}, rated {}, failed {}, cancelled {}\n",
        p.submitted, p.rated, p.failed, p.cancelled
    ));
    out
}

fn render_summary(summary: &ProjectSummary) -> String {
    let mut out = match summary.average_score {
        Some(avg) => format!("{}: {} rated, average {}\n", summary.project_key, summary.rated, avg),
        None => format!("{}: nothing rated yet\n", summary.project_key),
    };
    for bucket in &summary.distribution {
        out.push_str(&format!("  {:>7}  {}\n", bucket.label(), bucket.count));
    }
    if !summary.weak_stories.is_empty() {
        out.push_str("Needs attention:\n");
        for weak in &summary.weak_stories {
            out.push_str(&format!("  {:<12} {:>3}\n", weak.story_key, weak.overall_score));
        }
    }
    if !summary.sprints.is_empty() {
        out.push_str("By sprint:\n");
        for sprint in &summary.sprints {
            out.push_str(&format!(
                "  {:<12} {:>3}  ({} rated)\n",
                sprint.sprint, sprint.average_score, sprint.rated
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use clap::CommandFactory;
    use storygrade_core::{RubricDimension, Violation};

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn rate_requires_project_or_story() {
        let err = Cli::try_parse_from(["storygrade", "rate", "--stories", "s.json"]);
        assert!(err.is_err());

        let cli =
            Cli::try_parse_from(["storygrade", "rate", "--stories", "s.json", "--project", "ECOM"])
                .unwrap();
        assert!(matches!(cli.command, Commands::Rate { project: Some(_), .. }));
    }

    #[test]
    fn render_invalid_report_lists_violations() {
        let report = ValidationReport {
            violations: vec![
                Violation::DuplicateId {
                    id: "clarity".to_string(),
                },
                Violation::EnabledWeightSum { sum: 90 },
            ],
        };
        let out = render_report(&report);
        assert!(out.starts_with("Rubric is invalid"));
        assert_eq!(out.lines().count(), 3);
    }

    #[test]
    fn render_result_shows_band() {
        let result = EvaluationResult {
            story_key: StoryKey::from("ECOM-101"),
            overall_score: 82,
            dimension_scores: [("clarity".to_string(), 82)].into_iter().collect(),
            rationale: "Clear and testable.".to_string(),
            suggestions: vec!["Split the checkout flow".to_string()],
            sprint: None,
            rated_at: Utc::now(),
            rubric_digest: String::new(),
            sequence: 1,
        };
        let out = render_result(&result);
        assert!(out.starts_with("ECOM-101: 82 (Good story quality)"));
        assert!(out.contains("Clear and testable."));
        assert!(out.contains("  - Split the checkout flow"));
    }

    #[test]
    fn render_summary_lists_sprints() {
        let results: Vec<EvaluationResult> = [("ECOM-1", 70, "Sprint 1"), ("ECOM-2", 90, "Sprint 2")]
            .into_iter()
            .map(|(key, score, sprint)| EvaluationResult {
                story_key: StoryKey::from(key),
                overall_score: score,
                dimension_scores: BTreeMap::new(),
                rationale: String::new(),
                suggestions: Vec::new(),
                sprint: Some(sprint.to_string()),
                rated_at: Utc::now(),
                rubric_digest: String::new(),
                sequence: 1,
            })
            .collect();
        let out = render_summary(&storygrade_core::summarize("ECOM", &results, 60));
        assert!(out.contains("By sprint:"));
        assert!(out.contains("Sprint 1"));
        assert!(out.contains("(1 rated)"));
    }

    #[tokio::test]
    async fn config_save_keeps_domain_context_and_refuses_bad_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_config_store(dir.path()).unwrap();

        let overrides = RubricOverride::new().with_domain_context("Retail checkout");
        cmd_config_save(
            &store,
            RubricTier::Project {
                project_key: "ECOM".to_string(),
                overrides,
            },
        )
        .await
        .unwrap();
        assert_eq!(
            store.domain_context("ECOM").await.unwrap().as_deref(),
            Some("Retail checkout")
        );

        let bad = RubricConfig::new(vec![RubricDimension::new("clarity", "Clarity", 90)]);
        let err = cmd_config_save(&store, RubricTier::Base(bad)).await.unwrap_err();
        assert!(err.to_string().contains("Refused to save base rubric"));
        assert!(store.load_base().await.unwrap().is_none());
    }

    #[test]
    fn load_json_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rubric.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_json::<RubricConfig>(&path).unwrap_err();
        assert!(err.to_string().contains("rubric.json"));
    }

    #[test]
    fn load_json_reads_rubric() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rubric.json");
        let config = RubricConfig::new(vec![RubricDimension::new("clarity", "Clarity", 100)]);
        std::fs::write(&path, serde_json::to_vec(&config).unwrap()).unwrap();
        assert_eq!(load_json::<RubricConfig>(&path).unwrap(), config);
    }
}
