mod auth;
mod booking;
mod notify;
mod runner;

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Local;
use clap::Parser;

use crate::auth::{AuthClient, AuthClientConfig};
use crate::booking::countdown::target_for_time_today;
use crate::booking::model::{BookingConfig, load_booking_config};
use crate::notify::ConsoleNotifier;
use crate::runner::{ManualHandoff, SessionOptions};

#[derive(Parser, Debug)]
#[command(
    name = "railbook",
    version,
    about = "Timed train-ticket booking assistant with a retrying sign-in client"
)]
struct Cli {
    /// Booking request file.
    #[arg(long, default_value = "booking.json")]
    booking: PathBuf,

    /// Validate the booking file, print the request summary and exit.
    #[arg(long)]
    check: bool,

    #[arg(long, default_value_t = auth::DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    #[arg(long, default_value = auth::DEFAULT_SIGN_IN_URL)]
    sign_in_url: String,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    if cli.max_retries == 0 {
        bail!("--max-retries must be greater than zero");
    }

    let config = load_booking_config(&cli.booking)
        .with_context(|| format!("failed to load {}", cli.booking.display()))?;

    if cli.check {
        print_summary(&config);
        return Ok(());
    }

    let now = Local::now();
    let target = target_for_time_today(config.booking_time, &now).ok_or_else(|| {
        anyhow!(
            "booking time {} does not exist today",
            config.booking_time.format("%H:%M:%S")
        )
    })?;
    if target <= now {
        println!(
            "Booking time {} already passed today; starting immediately.",
            config.booking_time.format("%H:%M:%S")
        );
    }

    let auth_client = AuthClient::new(AuthClientConfig {
        sign_in_url: cli.sign_in_url,
        max_retries: cli.max_retries,
        ..AuthClientConfig::default()
    })?;
    let notifier = ConsoleNotifier;
    let mut action = ManualHandoff;
    runner::run_at(
        target,
        &config.credentials,
        &auth_client,
        &mut action,
        &notifier,
        &SessionOptions::default(),
    )
}

fn print_summary(config: &BookingConfig) {
    let journey = &config.journey;
    println!(
        "Booking request for {} -> {} on {}",
        journey.from_station,
        journey.to_station,
        journey.api_date()
    );
    println!("  Train: {} [train number {}]", journey.train, journey.train_number);
    println!(
        "  Seat class: {}, seats: {}",
        journey.seat_class.as_str(),
        journey.seat_count
    );
    if !journey.desired_seats.is_empty() {
        println!("  Desired seats: {}", journey.desired_seats.join(", "));
    }
    println!("  Payment method: {}", journey.payment_method.as_str());
    println!("  Booking time: {}", config.booking_time.format("%H:%M:%S"));
    for companion in &config.companions {
        println!(
            "  Companion: {} ({}, {})",
            companion.name,
            companion.passenger_type.as_str(),
            companion.gender.as_str()
        );
    }
}
