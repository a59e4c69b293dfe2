use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use tracing_subscriber::EnvFilter;

use storyteller::config::{LogFormat, LoggingConfig};
use storyteller::db::{user_repo, Database};
use storyteller::job::NextStep;
use storyteller::metadata::open_store;
use storyteller::submission::{SubmissionForm, Submitter};
use storyteller::worker::{setup_signal_handler, ThreadPause};
use storyteller::{
    check_status, load_config, Config, JobStore, ModelControl, Pipeline, QueueScanner,
    StoryLibrary, Worker,
};

#[derive(Parser)]
#[command(name = "storyteller")]
#[command(about = "Children's story generation: queue, worker and library")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, env = "STORYTELLER_CONFIG", default_value = "storyteller.json")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the queue and process jobs until interrupted
    Worker {
        /// Process at most one job and exit
        #[arg(long)]
        once: bool,
    },

    /// Queue a new story request
    Submit(SubmitArgs),

    /// Show where a job is and what to do next
    Status { request_id: String },

    /// List visible stories, newest first
    List {
        /// Viewing user id
        #[arg(long)]
        viewer: Option<i64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a story and count the view
    View {
        filename: String,

        #[arg(long)]
        viewer: Option<i64>,
    },

    /// Rate a story from 1 to 5
    Rate { filename: String, rating: i64 },

    /// Print the form values of an existing story
    Recreate { story_id: i64 },

    /// Load story rows from processed job records
    Sync {
        /// Directory of processed records (defaults to the configured one)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Attribute records without a user to user 1
        #[arg(long)]
        force: bool,
    },

    /// Manage accounts
    #[command(subcommand)]
    User(UserCommands),

    /// Show queue, processed and error counts
    Queue,
}

#[derive(Args)]
struct SubmitArgs {
    #[arg(long)]
    theme: String,

    #[arg(long)]
    age_range: String,

    #[arg(long, default_value = "medium")]
    length: String,

    #[arg(long, default_value = "en")]
    language: String,

    #[arg(long)]
    lesson: Option<String>,

    #[arg(long, default_value = "")]
    characters: String,

    #[arg(long, default_value = "")]
    story_about: String,

    #[arg(long)]
    title: Option<String>,

    /// Model id, e.g. `openai/gpt-4o-mini`
    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    backend: Option<String>,

    /// Request narration
    #[arg(long)]
    audio: bool,

    /// Story-level privacy; omit to use the account default
    #[arg(long)]
    private: Option<bool>,

    /// Submitting user id
    #[arg(long)]
    user: Option<i64>,
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create an account
    Add {
        username: String,
        email: String,

        /// Starting credits (defaults to users.initial_credits)
        #[arg(long)]
        credits: Option<i64>,
    },

    /// Show or change a balance
    Credits {
        user_id: i64,

        #[arg(long, allow_hyphen_values = true)]
        add: Option<i64>,
    },

    /// Set the account-level privacy default
    Private { user_id: i64, private: bool },
}

fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<()> {
    tracing_log::LogTracer::init().context("Failed to bridge log records")?;

    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match config.format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    }
    .context("Failed to install tracing subscriber")?;
    Ok(())
}

fn open_database(config: &Config) -> Result<Database> {
    Database::open(&config.paths.database).with_context(|| {
        format!(
            "Failed to open database at {}",
            config.paths.database.display()
        )
    })
}

fn library(config: &Config, db: &Database) -> StoryLibrary {
    StoryLibrary::new(
        &config.paths.stories,
        JobStore::from_paths(&config.paths),
        db.clone(),
        Arc::from(open_store(config, db)),
    )
}

fn main() -> Result<()> {
    // a missing .env is normal
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    init_logging(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Worker { once } => run_worker(&config, once),
        Commands::Submit(args) => submit(&config, args),
        Commands::Status { request_id } => {
            let report = check_status(&JobStore::from_paths(&config.paths), &request_id);
            println!("status: {}", report.label());
            match report.next_step() {
                NextStep::ShowStory(file) => println!("story: {}", file),
                NextStep::ShowForm(error) => println!("error: {}", error),
                NextStep::KeepWaiting => println!("still processing"),
                NextStep::NotFound => println!("no such job"),
            }
            Ok(())
        }
        Commands::List { viewer, json } => {
            let db = open_database(&config)?;
            let stories = library(&config, &db).list(viewer)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stories)?);
            } else {
                for story in &stories {
                    println!(
                        "{}  {}  ({} views, {:.1}★ from {})",
                        story.created.format("%Y-%m-%d %H:%M"),
                        story.title,
                        story.views,
                        story.average_rating,
                        story.rating_count
                    );
                    println!("    {}", story.filename);
                }
            }
            Ok(())
        }
        Commands::View { filename, viewer } => {
            let db = open_database(&config)?;
            let view = library(&config, &db).view(&filename, viewer)?;
            let meta = &view.metadata;
            println!("{}", meta.title.as_deref().unwrap_or(&filename));
            if let (Some(provider), Some(model)) = (&meta.provider, &meta.model) {
                println!("Created by {} using {}", provider, model);
            }
            println!(
                "{} views, {:.1} average from {} ratings\n",
                view.views, view.average_rating, view.rating_count
            );
            println!("{}", meta.story.as_deref().unwrap_or_default());
            Ok(())
        }
        Commands::Rate { filename, rating } => {
            let db = open_database(&config)?;
            let summary = library(&config, &db).rate(&filename, rating)?;
            println!(
                "Rating submitted: {:.2} average from {} ratings",
                summary.average, summary.count
            );
            Ok(())
        }
        Commands::Recreate { story_id } => {
            let submitter = submitter(&config)?;
            let form = submitter.prefill_from_story(story_id)?;
            println!("{}", serde_json::to_string_pretty(&form)?);
            Ok(())
        }
        Commands::Sync { dir, force } => {
            let db = open_database(&config)?;
            let dir = dir.unwrap_or_else(|| config.paths.processed.clone());
            let report = library(&config, &db).sync_processed(&dir, force)?;
            println!(
                "Processed {} files: {} succeeded, {} failed",
                report.succeeded + report.failed,
                report.succeeded,
                report.failed
            );
            Ok(())
        }
        Commands::User(command) => manage_user(&config, command),
        Commands::Queue => {
            let counts = JobStore::from_paths(&config.paths).counts()?;
            println!("queued:    {}", counts.queued);
            println!("processed: {}", counts.processed);
            println!("error:     {}", counts.failed);
            Ok(())
        }
    }
}

fn run_worker(config: &Config, once: bool) -> Result<()> {
    // refuse to start without the prompt document, as the web tier does
    ModelControl::load(&config.paths.model_control)?;

    let jobs = JobStore::from_paths(&config.paths);
    jobs.ensure_dirs()?;
    let db = open_database(config)?;
    let pipeline = Pipeline::from_config(config)?.with_database(db);
    let worker = Worker::new(QueueScanner::new(&config.paths.queue), pipeline, &config.worker);

    if once {
        match worker.run_once()? {
            Some(outcome) => info!("Job {} finished: {:?}", outcome.request_id(), outcome),
            None => info!("Queue is empty"),
        }
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handler(Arc::clone(&shutdown)).context("Failed to install signal handler")?;
    let summary = worker.run(&shutdown, &ThreadPause);
    info!(
        "Worker exiting: {} completed, {} failed",
        summary.completed, summary.failed
    );
    Ok(())
}

fn submitter(config: &Config) -> Result<Submitter> {
    let control = ModelControl::load(&config.paths.model_control)?;
    let db = open_database(config)?;
    Ok(Submitter::new(
        JobStore::from_paths(&config.paths),
        Arc::new(control),
        config.generation.default_model.clone(),
    )
    .with_database(db))
}

fn submit(config: &Config, args: SubmitArgs) -> Result<()> {
    let form = SubmissionForm {
        theme: args.theme,
        age_range: args.age_range,
        length: args.length,
        language: args.language,
        lesson: args.lesson,
        characters: args.characters,
        story_about: args.story_about,
        title: args.title,
        ai_model: args.model,
        backend: args.backend,
        enable_audio: args.audio,
        is_private: args.private,
    };

    let submission = submitter(config)?.submit(&form, args.user)?;
    println!("{}", submission.request_id);
    if let Some(credits) = submission.credits_left {
        println!("credits left: {}", credits);
    }
    Ok(())
}

fn manage_user(config: &Config, command: UserCommands) -> Result<()> {
    let db = open_database(config)?;
    match command {
        UserCommands::Add {
            username,
            email,
            credits,
        } => {
            let user = user_repo::create(
                &db,
                &username,
                &email,
                credits.unwrap_or(config.users.initial_credits),
            )?;
            println!("Created user {} ({}) with {} credits", user.id, user.username, user.credits);
        }
        UserCommands::Credits { user_id, add } => {
            let balance = match add {
                Some(amount) => user_repo::add_credits(&db, user_id, amount)?,
                None => match user_repo::credits(&db, user_id)? {
                    Some(balance) => balance,
                    None => bail!("No user with id {}", user_id),
                },
            };
            println!("User {} has {} credits", user_id, balance);
        }
        UserCommands::Private { user_id, private } => {
            user_repo::set_private(&db, user_id, private)?;
            println!(
                "Stories of user {} are {} by default",
                user_id,
                if private { "private" } else { "public" }
            );
        }
    }
    Ok(())
}
