//! Operator CLI for the questionnaire portal.
//!
//! Every command opens the database once (SQLite by default, PostgreSQL when
//! `DATABASE_URL` is set), applies the schema, and then runs against the
//! shared handle. Startup failures exit non-zero with the full error chain.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use db::{Database, DbConfig};

use portal::config::SeedAdminConfig;
use portal::risk::{self, Answers, Assessment, RiskLevel};
use portal::store::{hash_password, NewAccount, Role, StoreError, Stores};

/// Default number of rows printed by `flagged`.
const DEFAULT_FLAGGED_LIMIT: i64 = 20;

#[derive(Parser)]
#[command(name = "portal", about = "Questionnaire portal storage and triage tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema if needed and report the active engine.
    Init,

    /// Create the admin account unless one with the same email exists.
    SeedAdmin {
        /// Defaults to `SEED_ADMIN_EMAIL`.
        #[arg(long)]
        email: Option<String>,
        /// Defaults to `SEED_ADMIN_NAME`.
        #[arg(long)]
        name: Option<String>,
        /// Plain password, stored as a bcrypt hash. Defaults to `SEED_ADMIN_PASSWORD`.
        #[arg(long, conflicts_with = "password_hash")]
        password: Option<String>,
        /// Already-hashed credential. Defaults to `SEED_ADMIN_PASSWORD_HASH`.
        #[arg(long)]
        password_hash: Option<String>,
    },

    /// Score a JSON answers file (`{"q1": "...", ...}`) and store it.
    Assess {
        #[arg(long)]
        account_id: i64,
        #[arg(long)]
        answers: PathBuf,
        /// The student accepted the informed-consent notice.
        #[arg(long)]
        consented: bool,
    },

    /// Print dashboard counters.
    Stats,

    /// Print critical and at-risk submissions as JSON lines.
    Flagged {
        #[arg(long, default_value_t = DEFAULT_FLAGGED_LIMIT)]
        limit: i64,
    },

    /// Manually set the risk level of a submission.
    Review {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        admin_id: i64,
        /// normal, at_risk or critical
        #[arg(long)]
        level: RiskLevel,
        /// 0 to 999
        #[arg(long)]
        score: Option<i64>,
        /// Extra follow-up note stored after the status change.
        #[arg(long)]
        note: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::fmt::format::FmtSpan;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let db = open(&DbConfig::from_env()).await?;
    let stores = Stores::new(&db);

    let outcome = run(cli.command, &db, &stores).await;
    db.close().await;
    outcome
}

/// Open the configured database and apply the schema.
async fn open(config: &DbConfig) -> anyhow::Result<Database> {
    let db = Database::open(config)
        .await
        .context("failed to open database")?;
    db.initialize()
        .await
        .context("failed to initialize schema")?;
    Ok(db)
}

async fn run(command: Commands, db: &Database, stores: &Stores) -> anyhow::Result<()> {
    match command {
        Commands::Init => {
            tracing::info!("Schema ready on {} engine", db.engine());
        }
        Commands::SeedAdmin {
            email,
            name,
            password,
            password_hash,
        } => {
            let defaults = SeedAdminConfig::from_env();
            let password_hash = match credential(password_hash, password)? {
                Some(hash) => Some(hash),
                None => credential(defaults.password_hash, defaults.password)?,
            };
            let admin = NewAccount {
                name: name.unwrap_or(defaults.name),
                email: email.unwrap_or(defaults.email),
                password_hash,
                role: Role::Admin,
            };
            match seed_admin(stores, &admin).await? {
                Some(id) => println!("created admin {} (id {id})", admin.email),
                None => println!("admin {} already exists", admin.email),
            }
        }
        Commands::Assess {
            account_id,
            answers,
            consented,
        } => {
            let answers = read_answers(&answers)?;
            let (id, assessment) = assess(stores, account_id, consented, &answers).await?;
            println!(
                "{}",
                serde_json::json!({
                    "id": id,
                    "score": assessment.score,
                    "level": assessment.level,
                })
            );
        }
        Commands::Stats => {
            let stats = stores.questionnaires.stats().await?;
            println!("total:    {}", stats.total);
            println!("critical: {}", stats.critical);
            println!("at_risk:  {}", stats.at_risk);
        }
        Commands::Flagged { limit } => {
            for entry in stores.questionnaires.flagged(limit).await? {
                println!("{}", serde_json::to_string(&entry)?);
            }
        }
        Commands::Review {
            id,
            admin_id,
            level,
            score,
            note,
        } => {
            review(stores, id, admin_id, level, score, note.as_deref()).await?;
            println!("questionnaire {id} set to {level}");
        }
    }
    Ok(())
}

/// A pre-hashed credential wins; a plain password is hashed here.
fn credential(
    password_hash: Option<String>,
    password: Option<String>,
) -> Result<Option<String>, StoreError> {
    match (password_hash, password) {
        (Some(hash), _) => Ok(Some(hash)),
        (None, Some(password)) => hash_password(&password).map(Some),
        (None, None) => Ok(None),
    }
}

/// Returns the new id, or `None` when the email is already registered.
async fn seed_admin(stores: &Stores, admin: &NewAccount) -> Result<Option<i64>, StoreError> {
    if let Some(existing) = stores.accounts.find_by_email(&admin.email).await? {
        if existing.role != Role::Admin {
            tracing::warn!(id = existing.id, "Seed email belongs to a non-admin account");
        }
        return Ok(None);
    }
    stores.accounts.create(admin).await.map(Some)
}

fn read_answers(path: &Path) -> anyhow::Result<Answers> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON answers object", path.display()))
}

async fn assess(
    stores: &Stores,
    account_id: i64,
    consented: bool,
    answers: &Answers,
) -> anyhow::Result<(i64, Assessment)> {
    if stores.accounts.find_by_id(account_id).await?.is_none() {
        bail!(StoreError::NotFound {
            entity: "account",
            id: account_id
        });
    }
    let assessment = risk::classify(answers);
    let id = stores
        .questionnaires
        .submit(account_id, consented, answers, assessment)
        .await?;
    Ok((id, assessment))
}

async fn review(
    stores: &Stores,
    id: i64,
    admin_id: i64,
    level: RiskLevel,
    score: Option<i64>,
    note: Option<&str>,
) -> anyhow::Result<()> {
    if !stores
        .questionnaires
        .update_status(id, admin_id, level, score)
        .await?
    {
        bail!(StoreError::NotFound {
            entity: "questionnaire",
            id
        });
    }
    if let Some(note) = note {
        stores.followups.add(id, admin_id, note).await?;
    }
    Ok(())
}
