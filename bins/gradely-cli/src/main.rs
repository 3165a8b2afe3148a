mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gradely-cli")]
#[command(about = "Gradely CLI - Submit solutions and track their grading", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a solution for grading
    Submit {
        /// Gradely API base URL
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        api: String,

        /// Solution kind (education, competition)
        #[arg(short, long, default_value = "education")]
        kind: String,

        /// Student id (random when omitted, handy for smoke tests)
        #[arg(long)]
        student: Option<String>,

        /// Task id (random when omitted)
        #[arg(long)]
        task: Option<String>,

        /// Inline source code
        #[arg(short, long)]
        code: Option<String>,

        /// Path to a binary submission, uploaded base64-encoded
        #[arg(short, long)]
        file: Option<String>,

        /// External URL submission
        #[arg(short, long)]
        url: Option<String>,

        /// Submit without grading (terminal immediately)
        #[arg(long, default_value = "false")]
        no_grading: bool,

        /// Poll the solution until it reaches a terminal state
        #[arg(short, long, default_value = "false")]
        watch: bool,
    },

    /// Show a solution's current grading state
    Status {
        /// Gradely API base URL
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        api: String,

        /// Solution kind
        #[arg(short, long, default_value = "education")]
        kind: String,

        /// Solution id
        #[arg(short, long)]
        id: String,
    },

    /// Poll a solution until it reaches a terminal state
    Watch {
        /// Gradely API base URL
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        api: String,

        /// Solution kind
        #[arg(short, long, default_value = "education")]
        kind: String,

        /// Solution id
        #[arg(short, long)]
        id: String,

        /// Seconds between polls
        #[arg(long, default_value = "2")]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Submit {
            api,
            kind,
            student,
            task,
            code,
            file,
            url,
            no_grading,
            watch,
        } => {
            commands::submit(
                &api,
                &kind,
                student.as_deref(),
                task.as_deref(),
                code,
                file.as_deref(),
                url,
                !no_grading,
                watch,
            )
            .await?;
        }
        Commands::Status { api, kind, id } => {
            commands::status(&api, &kind, &id).await?;
        }
        Commands::Watch {
            api,
            kind,
            id,
            interval,
        } => {
            commands::watch(&api, &kind, &id, interval).await?;
        }
    }

    Ok(())
}
