use std::sync::Arc;

use clap::{Parser, Subcommand};
use frames::{QuizId, UserKey};
use quizlive::monitor::{choice_shares, percent, round_seconds, students_by_risk};
use quizlive::{
    Connection, DurationSeed, EngineConfig, EngineError, HttpQuizApi, MonitorView, QuizApi, StudentSession,
    TeacherSession, TimerHooks, format_clock,
};
use tokio::sync::Notify;
use tracing::info;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("invalid user id: {0:?}")]
    InvalidUser(String),
    #[error("signal handler failed: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "quizlive", about = "Live quiz session client")]
struct Cli {
    /// Overrides QUIZLIVE_BASE_URL.
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long, env = "QUIZLIVE_AUTH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a quiz leaderboard.
    Leaderboard {
        #[arg(long)]
        quiz: QuizId,
    },
    /// Print a quiz's question set.
    Questions {
        #[arg(long)]
        quiz: QuizId,
    },
    /// Take part as a student: run the timer and follow your rank.
    Attempt {
        #[arg(long)]
        quiz: QuizId,
        #[arg(long)]
        user: String,
        /// Fresh attempt length; defaults to the quiz's configured duration.
        #[arg(long, conflicts_with = "remaining")]
        minutes: Option<u32>,
        /// Resume with this many seconds left.
        #[arg(long)]
        remaining: Option<u32>,
    },
    /// Watch the teacher dashboard for a quiz.
    Monitor {
        #[arg(long)]
        quiz: QuizId,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = EngineConfig::from_env()?;
    if let Some(base_url) = &cli.base_url {
        config.base_url = EngineConfig::new(base_url)?.base_url;
    }
    if cli.token.is_some() {
        config.auth_token = cli.token.clone();
    }

    match cli.command {
        Command::Leaderboard { quiz } => run_leaderboard(&config, quiz).await,
        Command::Questions { quiz } => run_questions(&config, quiz).await,
        Command::Attempt { quiz, user, minutes, remaining } => {
            let seed = match (minutes, remaining) {
                (Some(minutes), _) => DurationSeed::Minutes(minutes),
                (None, Some(seconds)) => DurationSeed::Remaining(seconds),
                (None, None) => DurationSeed::Fetch,
            };
            run_attempt(&config, quiz, &user, seed).await
        }
        Command::Monitor { quiz } => run_monitor(&config, quiz).await,
    }
}

async fn run_leaderboard(config: &EngineConfig, quiz: QuizId) -> Result<(), CliError> {
    let api = HttpQuizApi::new(config)?;
    for (index, entry) in api.leaderboard(quiz).await?.iter().enumerate() {
        println!(
            "#{:<3} {:<12} {:>8.1}  {}",
            index + 1,
            entry.user_id.as_str(),
            entry.score,
            entry.name.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn run_questions(config: &EngineConfig, quiz: QuizId) -> Result<(), CliError> {
    let api = HttpQuizApi::new(config)?;
    for question in api.questions(quiz).await? {
        let limit = question.time_limit.map(format_clock).unwrap_or_default();
        println!("{:>6}  {:>5}  {}", question.id, limit, question.text);
    }
    Ok(())
}

async fn run_attempt(config: &EngineConfig, quiz: QuizId, user: &str, seed: DurationSeed) -> Result<(), CliError> {
    let user_id = UserKey::new(user).ok_or_else(|| CliError::InvalidUser(user.to_owned()))?;
    let api: Arc<dyn QuizApi> = Arc::new(HttpQuizApi::new(config)?);
    let conn = Connection::websocket(config);
    conn.connect()?;

    let time_up = Arc::new(Notify::new());
    let signal = Arc::clone(&time_up);
    let hooks = TimerHooks::new()
        .on_time_change(|seconds| {
            if seconds % 60 == 0 || seconds <= 10 {
                println!("time left {}", format_clock(seconds));
            }
        })
        .on_time_up(move || signal.notify_one());

    let mut session = StudentSession::open_with_hooks(&conn, api, config, quiz, user_id, hooks);
    session.tracker().set_notifier(|notice| println!("{}", notice.message()));
    session.begin(seed).await?;

    let snapshot = session.tracker().snapshot();
    if let (Some(rank), Some(total)) = (snapshot.rank, snapshot.total) {
        println!("starting at #{rank} of {total}");
    }

    tokio::select! {
        () = time_up.notified() => println!("time is up"),
        signal = tokio::signal::ctrl_c() => signal?,
    }

    session.close();
    conn.close();
    info!(quiz, "attempt finished");
    Ok(())
}

async fn run_monitor(config: &EngineConfig, quiz: QuizId) -> Result<(), CliError> {
    let conn = Connection::websocket(config);
    conn.connect()?;
    let mut session = TeacherSession::open(&conn, quiz);
    let mut updates = session.monitor().watch();

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(view) = updates.borrow_and_update().clone() {
                    print_view(&view);
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }

    session.close();
    conn.close();
    Ok(())
}

fn metric(value: Option<f64>, render: impl Fn(f64) -> String) -> String {
    value.map_or_else(|| "-".to_owned(), render)
}

fn print_view(view: &MonitorView) {
    let snapshot = &view.snapshot;
    let participants = snapshot.participants;
    println!(
        "participants: {} total, {} active, {} completed",
        participants.total, participants.active, participants.completed
    );

    match &snapshot.class_metrics {
        Some(metrics) => println!(
            "class: avg {} / median {}, accuracy {}, response {}, completion {}",
            metric(metrics.avg_score, |score| format!("{score:.1}")),
            metric(metrics.median_score, |score| format!("{score:.1}")),
            metric(metrics.avg_accuracy, percent),
            metric(metrics.avg_response_time, round_seconds),
            metric(metrics.completion_rate, percent)
        ),
        None => println!("class: not yet available"),
    }

    if let Some(students) = &snapshot.struggling_students {
        for student in students_by_risk(students).into_iter().take(5) {
            let name = student.name.as_deref().unwrap_or(student.user_id.as_str());
            let score = metric(student.risk_score, |score| format!("{score:.2}"));
            println!("  at risk: {name} ({:?}, {score})", student.risk_level);
        }
    }

    if let Some(question) = &snapshot.current_question {
        let shares = choice_shares(&question.choice_breakdown);
        for (stat, share) in question.choice_breakdown.iter().zip(shares) {
            let mark = if stat.is_correct { "*" } else { " " };
            println!("  {mark} {:<10} {:>4}", stat.choice, percent(share));
        }
    }

    if let Some(pass_rate) = snapshot.predictive.as_ref().and_then(|predictive| predictive.pass_rate) {
        println!("predicted pass rate {} ({:?})", percent(pass_rate.predicted_rate), pass_rate.trend);
    }

    for alert in &view.alerts {
        println!("[{:?} p{}] {}: {}", alert.kind, alert.priority, alert.title, alert.message);
    }
}
