//! Hex Clash - Main Binary
//!
//! Resolves beat timelines from scenario files, checks card submissions and
//! lists the card catalog.

use clap::{Parser, Subcommand, ValueEnum};
use hex_clash::{
    cards::{create_deck_state, validate_action_submission, ActionSubmission},
    game::{
        apply_action_set_to_beats, evaluate_match_outcome, find_timeline_breaks,
        interactions::select_pending_interaction, outcome::apply_match_outcome_to_beats, resolve_beats,
        timeline::timeline_resolved_index, MatchOutcome, OutputFormat, ResolveContext, ResolveOptions, ResolveOutput,
        TimelineBreak, VerbosityLevel,
    },
    loader::{load_scenario, resolve_directory, GameData, Scenario},
    ClashError, Result,
};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Verbosity level for resolution output (custom parser supporting both names and numbers)
#[derive(Debug, Clone, Copy)]
struct VerbosityArg(VerbosityLevel);

impl std::str::FromStr for VerbosityArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "silent" | "0" => Ok(VerbosityArg(VerbosityLevel::Silent)),
            "minimal" | "1" => Ok(VerbosityArg(VerbosityLevel::Minimal)),
            "normal" | "2" => Ok(VerbosityArg(VerbosityLevel::Normal)),
            "verbose" | "3" => Ok(VerbosityArg(VerbosityLevel::Verbose)),
            _ => Err(format!(
                "invalid verbosity level '{s}' (expected: silent/0, minimal/1, normal/2, verbose/3)"
            )),
        }
    }
}

impl From<VerbosityArg> for VerbosityLevel {
    fn from(arg: VerbosityArg) -> Self {
        arg.0
    }
}

/// Report and log format
#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    /// Human-readable text
    Text,
    /// JSON documents
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

#[derive(Parser)]
#[command(name = "clash")]
#[command(about = "Hex Clash - beat timeline combat resolver", long_about = None)]
struct Cli {
    /// Card catalog JSON (default: $HEX_CLASH_DATA/cards.json or data/cards.json)
    #[arg(long, global = true, value_name = "PATH")]
    cards: Option<PathBuf>,

    /// Character data JSON (default: $HEX_CLASH_DATA/characters.json or data/characters.json)
    #[arg(long, global = true, value_name = "PATH")]
    characters: Option<PathBuf>,

    /// Verbosity level for resolution logs (0=silent, 1=minimal, 2=normal, 3=verbose)
    #[arg(long, short = 'v', global = true, default_value = "minimal")]
    verbosity: VerbosityArg,

    /// Report format
    #[arg(long, value_enum, global = true, default_value = "text")]
    format: FormatArg,

    /// Write the report to a file instead of stdout
    #[arg(long, short = 'o', global = true, value_name = "PATH")]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve one scenario file
    Resolve {
        #[arg(value_name = "SCENARIO")]
        scenario: PathBuf,
    },

    /// Resolve every *.json scenario under a directory in parallel
    Batch {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },

    /// Check an action submission and preview the resolved timeline
    Validate {
        #[arg(value_name = "SCENARIO")]
        scenario: PathBuf,

        /// Submitting player's user id
        #[arg(long)]
        user: String,

        /// Active card id
        #[arg(long)]
        active: String,

        /// Passive card id
        #[arg(long)]
        passive: String,

        /// Rotation label (0, L1, R2, 3, ...)
        #[arg(long, default_value = "0")]
        rotation: String,
    },

    /// List the card catalog
    Cards,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let options = ResolveOptions::new(cli.verbosity.into(), cli.format.into());

    let report = match cli.command {
        Commands::Resolve { scenario } => {
            run_resolve(&scenario, cli.cards.as_deref(), cli.characters.as_deref(), options).await?
        }
        Commands::Batch { dir } => run_batch(dir, cli.cards.as_deref(), cli.characters.as_deref(), options).await?,
        Commands::Validate {
            scenario,
            user,
            active,
            passive,
            rotation,
        } => {
            let submission = ActionSubmission::new(&active, &passive, &rotation);
            let (report, accepted) = run_validate(
                &scenario,
                &user,
                submission,
                cli.cards.as_deref(),
                cli.characters.as_deref(),
                options,
            )
            .await?;
            emit(cli.output.as_deref(), &report).await?;
            if !accepted {
                std::process::exit(1);
            }
            return Ok(());
        }
        Commands::Cards => run_cards(cli.cards.as_deref(), cli.characters.as_deref(), options).await?,
    };

    emit(cli.output.as_deref(), &report).await
}

async fn emit(output: Option<&Path>, report: &str) -> Result<()> {
    match output {
        Some(path) => {
            tokio::fs::write(path, report).await?;
            println!("Wrote {}", path.display());
        }
        None => print!("{report}"),
    }
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    Ok(text)
}

/// Resolution result plus the checks run over it
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(flatten)]
    output: ResolveOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<MatchOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    timeline_breaks: Vec<TimelineBreak>,
}

fn resolve_scenario(scenario: Scenario, data: &GameData, options: ResolveOptions) -> ResolveReport {
    let logger = options.logger();
    let ctx = ResolveContext::new(&data.catalog, &data.powers).with_logger(&logger);
    let baseline = scenario.input.beats.clone();
    let land = scenario.input.land.clone();
    let mut output = resolve_beats(scenario.input, ctx);

    let resolved_index = timeline_resolved_index(&output.beats);
    let timeline_breaks = find_timeline_breaks(
        &output.beats,
        Some(&baseline),
        &output.characters,
        &output.interactions,
        resolved_index,
    );
    let outcome = if scenario.deck_states.is_empty() {
        None
    } else {
        evaluate_match_outcome(&output.beats, &output.characters, &scenario.deck_states, &land)
    };
    if let Some(outcome) = &outcome {
        apply_match_outcome_to_beats(&mut output.beats, &output.characters, outcome, &land);
    }
    ResolveReport {
        name: scenario.name,
        output,
        outcome,
        timeline_breaks,
    }
}

fn describe_report(report: &ResolveReport) -> String {
    let mut text = String::new();
    let output = &report.output;
    if let Some(name) = &report.name {
        let _ = writeln!(text, "=== {name} ===");
    }
    for (index, beat) in output.beats.iter().enumerate() {
        let _ = write!(text, "beat {index:>3}:");
        for entry in beat {
            let marker = if entry.calculated { "" } else { "?" };
            let _ = write!(
                text,
                "  {}={}{} @{} f{} d{}",
                entry.username, entry.action, marker, entry.location, entry.facing, entry.damage
            );
        }
        text.push('\n');
    }
    match output.last_calculated_index {
        Some(index) => {
            let _ = writeln!(text, "Last calculated beat: {index}");
        }
        None => text.push_str("No beats calculated\n"),
    }
    for interaction in output.pending_interactions() {
        let _ = writeln!(text, "Pending: {}", interaction.id);
    }
    let resolved_index = timeline_resolved_index(&output.beats);
    if let Some(next) =
        select_pending_interaction(&output.interactions, &output.beats, &output.characters, None, resolved_index)
    {
        let _ = writeln!(text, "Next decision: {} for {}", next.kind.as_str(), next.actor_user_id);
    }
    for token in &output.board_tokens {
        let _ = writeln!(text, "Token: {} {:?} at {}", token.id, token.kind, token.position);
    }
    for issue in &report.timeline_breaks {
        let _ = writeln!(
            text,
            "Timeline break: {} at beat {} ({:?})",
            issue.username, issue.beat_index, issue.break_kind
        );
    }
    if let Some(outcome) = &report.outcome {
        let winner = outcome.winner_user_id.as_ref().map_or("nobody", |id| id.as_str());
        let _ = writeln!(text, "Match over at beat {}: {} wins ({:?})", outcome.beat_index, winner, outcome.reason);
    }
    text
}

async fn run_resolve(
    path: &Path,
    cards: Option<&Path>,
    characters: Option<&Path>,
    options: ResolveOptions,
) -> Result<String> {
    let (data, scenario) = tokio::join!(GameData::load_default(cards, characters), load_scenario(path));
    let (data, scenario) = (data?, scenario?);
    let report = tokio::task::spawn_blocking(move || resolve_scenario(scenario, &data, options)).await?;
    match options.format {
        OutputFormat::Json => to_json(&report),
        OutputFormat::Text => Ok(describe_report(&report)),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchLine {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_calculated_index: Option<usize>,
    pending: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn run_batch(
    dir: PathBuf,
    cards: Option<&Path>,
    characters: Option<&Path>,
    options: ResolveOptions,
) -> Result<String> {
    let data = GameData::load_default(cards, characters).await?;
    let report = tokio::task::spawn_blocking(move || resolve_directory(&dir, &data.catalog, &data.powers)).await??;

    let lines: Vec<BatchLine> = report
        .results
        .iter()
        .map(|result| match &result.output {
            Ok(output) => BatchLine {
                path: result.path.display().to_string(),
                last_calculated_index: output.last_calculated_index,
                pending: output.pending_interactions().map(|i| i.id.clone()).collect(),
                error: None,
            },
            Err(err) => BatchLine {
                path: result.path.display().to_string(),
                last_calculated_index: None,
                pending: Vec::new(),
                error: Some(err.to_string()),
            },
        })
        .collect();

    if options.format == OutputFormat::Json {
        return to_json(&lines);
    }
    let mut text = String::new();
    for line in &lines {
        match (&line.error, line.last_calculated_index) {
            (Some(err), _) => {
                let _ = writeln!(text, "{}: error: {}", line.path, err);
            }
            (None, Some(index)) => {
                let _ = writeln!(text, "{}: calculated through {} ({} pending)", line.path, index, line.pending.len());
            }
            (None, None) => {
                let _ = writeln!(text, "{}: nothing calculated ({} pending)", line.path, line.pending.len());
            }
        }
    }
    let _ = writeln!(
        text,
        "\n{} scenarios, {} failed, {} halted on a decision, {:.2?}",
        report.results.len(),
        report.failures().count(),
        report.halted(),
        report.elapsed
    );
    Ok(text)
}

async fn run_validate(
    path: &Path,
    user: &str,
    submission: ActionSubmission,
    cards: Option<&Path>,
    characters: Option<&Path>,
    options: ResolveOptions,
) -> Result<(String, bool)> {
    let (data, scenario) = tokio::join!(GameData::load_default(cards, characters), load_scenario(path));
    let (data, mut scenario) = (data?, scenario?);
    if !scenario.input.characters.iter().any(|character| character.user_id == user) {
        return Err(ClashError::UnknownCharacter(user.to_string()));
    }

    let deck_state = scenario
        .deck_state(&user.into())
        .cloned()
        .unwrap_or_else(|| {
            let deck = data.catalog.decks().first().cloned().unwrap_or_else(|| data.catalog.default_deck());
            create_deck_state(&deck, None)
        });
    let validated = match validate_action_submission(&submission, &deck_state, &data.catalog) {
        Ok(validated) => validated,
        Err(err) => {
            let text = match options.format {
                OutputFormat::Json => to_json(&err)?,
                OutputFormat::Text => format!("Rejected: {} ({})\n", err.message, err.code.as_str()),
            };
            return Ok((text, false));
        }
    };

    let logger = options.logger();
    scenario.input.beats = apply_action_set_to_beats(
        &scenario.input.beats,
        &scenario.input.characters,
        user,
        &validated.action_list,
        Some(&logger),
    );
    let report = tokio::task::spawn_blocking(move || resolve_scenario(scenario, &data, options)).await?;

    let text = match options.format {
        OutputFormat::Json => to_json(&serde_json::json!({
            "accepted": validated,
            "preview": report,
        }))?,
        OutputFormat::Text => {
            let actions: Vec<&str> = validated.action_list.iter().map(|item| item.action.as_str()).collect();
            format!(
                "Accepted: {} + {} -> [{}]\n{}",
                validated.movement_card_id,
                validated.ability_card_id,
                actions.join(", "),
                describe_report(&report)
            )
        }
    };
    Ok((text, true))
}

async fn run_cards(cards: Option<&Path>, characters: Option<&Path>, options: ResolveOptions) -> Result<String> {
    let data = GameData::load_default(cards, characters).await?;
    let catalog = &data.catalog;
    if options.format == OutputFormat::Json {
        let movement: Vec<_> = catalog.movement().collect();
        let ability: Vec<_> = catalog.ability().collect();
        return to_json(&serde_json::json!({
            "movement": movement,
            "ability": ability,
            "decks": catalog.decks(),
        }));
    }

    let mut text = String::new();
    for card in catalog.movement().chain(catalog.ability()) {
        let _ = writeln!(
            text,
            "{:<9} {:<16} prio {:>3}  dmg {:>2}  kbf {:>2}  rot {:<4} [{}]",
            card.card_type.as_str(),
            card.id,
            card.priority,
            card.damage,
            card.kbf,
            card.rotations,
            card.actions.join(", ")
        );
    }
    let _ = writeln!(text, "\n{} cards, {} decks", catalog.len(), catalog.decks().len());
    Ok(text)
}
