use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};

use crate::auth::{AuthClient, Credentials};
use crate::booking::countdown::{self, CountdownOutcome, TICK_PERIOD};
use crate::notify::{Notifier, Severity};

/// The seat-booking collaborator, invoked only once the booking window is
/// open and the session token is held. Returns whether the booking went
/// through.
pub trait BookingAction {
    fn attempt(&mut self) -> Result<bool>;
}

/// Default action for the CLI: the assistant's work ends once the window is
/// open and the authorized header has been announced, so the handoff itself
/// always succeeds.
#[derive(Debug, Default)]
pub struct ManualHandoff;

impl BookingAction for ManualHandoff {
    fn attempt(&mut self) -> Result<bool> {
        Ok(true)
    }
}

#[derive(Debug, Clone)]
pub struct BookingRetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BookingRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BookingRetryPolicy {
    /// Delay before the retry following the given 1-indexed failed attempt:
    /// doubles each time, capped at `max_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay)
    }
}

/// Run the booking action under the bounded backoff policy, notifying every
/// attempt. Fails permanently once the attempt budget is spent.
pub fn run_booking(
    action: &mut dyn BookingAction,
    policy: &BookingRetryPolicy,
    notifier: &dyn Notifier,
) -> Result<()> {
    if policy.max_attempts == 0 {
        bail!("booking retry policy must allow at least one attempt");
    }
    for attempt in 1..=policy.max_attempts {
        match action.attempt() {
            Ok(true) => {
                notifier.notify(
                    Severity::Success,
                    &format!("Booking succeeded on attempt {attempt}."),
                );
                return Ok(());
            }
            Ok(false) => notifier.notify(
                Severity::Warning,
                &format!("Booking attempt {attempt} was refused."),
            ),
            Err(err) => notifier.notify(
                Severity::Error,
                &format!("Booking attempt {attempt} failed: {err:#}"),
            ),
        }
        if attempt < policy.max_attempts {
            thread::sleep(policy.delay_after(attempt));
        }
    }
    notifier.notify(
        Severity::Error,
        &format!("Giving up after {} booking attempts.", policy.max_attempts),
    );
    bail!("booking did not succeed after {} attempts", policy.max_attempts)
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub tick_period: Duration,
    pub retry_policy: BookingRetryPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            tick_period: TICK_PERIOD,
            retry_policy: BookingRetryPolicy::default(),
        }
    }
}

/// Drive one booking session: count down toward `target` on a background
/// thread while the token is acquired on this one, join both, then run the
/// booking action. An auth failure cancels the countdown and surfaces
/// immediately; the action never runs before both the deadline has passed
/// and the token is held.
pub fn run_at(
    target: DateTime<Local>,
    credentials: &Credentials,
    auth: &AuthClient,
    action: &mut dyn BookingAction,
    notifier: &dyn Notifier,
    options: &SessionOptions,
) -> Result<()> {
    let countdown = countdown::spawn_countdown(
        target,
        options.tick_period,
        |remaining| println!("Time left: {remaining}"),
        move || {
            println!(
                "Booking window open at {}.",
                Local::now().format("%H:%M:%S")
            );
        },
    );

    let token = match auth.acquire_token(credentials, notifier) {
        Ok(token) => token,
        Err(err) => {
            countdown.cancel();
            return Err(err).context("could not obtain an auth token before the booking window");
        }
    };
    notifier.notify(Severity::Success, &format!("Token: {}", token.as_str()));
    notifier.notify(
        Severity::Success,
        &format!("Authorization header ready: {}", token.bearer_header()),
    );
    if let Some(claims) = token.claims() {
        notifier.notify(
            Severity::Success,
            &format!(
                "Signed in as {} ({}, {})",
                claims.display_name.as_deref().unwrap_or("unknown"),
                claims.email.as_deref().unwrap_or("no email"),
                claims.phone_number.as_deref().unwrap_or("no phone"),
            ),
        );
    }

    match countdown.wait() {
        CountdownOutcome::Completed => {}
        CountdownOutcome::Cancelled => {
            bail!("countdown was cancelled before the booking window opened")
        }
    }

    run_booking(action, &options.retry_policy, notifier)
}
