//! nextupctl - control CLI for nextupd
//!
//! Triggers refreshes, lists the cached timetable, shows the next event and
//! toggles the notification over the daemon's control socket.

mod render;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use nextup_api::{Command, ResponsePayload, ResponseResult};
use nextup_ipc::IpcClient;
use nextup_util::default_socket_path;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// nextupctl - Control the nextup timetable service
#[derive(Parser, Debug)]
#[command(name = "nextupctl")]
#[command(about = "Control the nextup timetable service", long_about = None)]
struct Args {
    /// Socket path (or set NEXTUP_SOCKET env var)
    #[arg(short, long, env = "NEXTUP_SOCKET", default_value_os_t = default_socket_path())]
    socket: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Show service status
    Status,

    /// List the cached timetable
    Timetable {
        /// Only this day (YYYY-MM-DD)
        #[arg(long, conflicts_with = "today")]
        day: Option<NaiveDate>,

        /// Only today
        #[arg(long)]
        today: bool,
    },

    /// Show the next event today
    Next,

    /// Fetch the timetable from the remote source now
    Refresh,

    /// Enable the "next event" notification
    Enable,

    /// Disable the notification and stop the scheduler
    Disable,

    /// Print service events as they happen
    Watch,

    /// Check that the service answers
    Ping,
}

async fn request(client: &mut IpcClient, command: Command) -> Result<ResponsePayload> {
    debug!(command = ?command, "Sending request");
    let response = client.send(command).await.context("Request failed")?;

    match response.result {
        ResponseResult::Ok(payload) => Ok(payload),
        ResponseResult::Err(e) => bail!(render::describe_error(&e)),
    }
}

async fn set_enabled(client: &mut IpcClient, enabled: bool) -> Result<()> {
    if let ResponsePayload::EnabledChanged { enabled } =
        request(client, Command::SetEnabled { enabled }).await?
    {
        println!(
            "Notifications {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let mut client = IpcClient::connect(&args.socket)
        .await
        .with_context(|| format!("Failed to connect to nextupd at {:?}", args.socket))?;

    match args.action {
        Action::Status => {
            if let ResponsePayload::Status(status) = request(&mut client, Command::GetStatus).await? {
                for line in render::format_status(&status) {
                    println!("{}", line);
                }
            }
        }

        Action::Timetable { day, today } => {
            let day = if today {
                Some(nextup_util::now().date_naive())
            } else {
                day
            };

            if let ResponsePayload::Timetable { written_at, events } =
                request(&mut client, Command::GetTimetable { day }).await?
            {
                if written_at.is_none() {
                    println!("No timetable cached yet; run `nextupctl refresh`");
                    return Ok(());
                }

                for event in &events {
                    println!("{}", render::format_event(event));
                }
                if events.is_empty() {
                    println!("No events");
                }
                println!("(written {})", render::format_written_at(written_at));
            }
        }

        Action::Next => {
            if let ResponsePayload::Next { event } = request(&mut client, Command::GetNext).await? {
                match event {
                    Some(event) => println!("{}", render::format_event(&event)),
                    None => println!("Nothing else today"),
                }
            }
        }

        Action::Refresh => {
            if let ResponsePayload::Refreshed {
                written_at,
                event_count,
            } = request(&mut client, Command::Refresh).await?
            {
                println!(
                    "Timetable refreshed: {} events (written {})",
                    event_count,
                    render::format_written_at(Some(written_at))
                );
            }
        }

        Action::Enable => set_enabled(&mut client, true).await?,

        Action::Disable => set_enabled(&mut client, false).await?,

        Action::Watch => {
            let mut events = client.subscribe().await.context("Failed to subscribe")?;
            loop {
                let event = events.next().await.context("Event stream ended")?;
                println!(
                    "[{}] {}",
                    event.timestamp.format("%H:%M:%S"),
                    render::format_service_event(&event.payload)
                );
            }
        }

        Action::Ping => {
            request(&mut client, Command::Ping).await?;
            println!("pong");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    run(args).await
}
