use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Local, LocalResult, NaiveDateTime, NaiveTime, TimeZone};

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Whole hours/minutes/seconds until the target, truncating.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Remaining {
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Remaining {
    fn from_span(span: chrono::Duration) -> Self {
        let total = span.num_seconds().max(0);
        Self {
            hours: total / 3_600,
            minutes: total % 3_600 / 60,
            seconds: total % 60,
        }
    }

    pub fn total_seconds(&self) -> i64 {
        self.hours * 3_600 + self.minutes * 60 + self.seconds
    }
}

// Zero-padded HH:MM:SS.
impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds
        )
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CountdownStep {
    Wait(Remaining),
    Fire,
    Idle,
}

/// Clock-injected countdown state machine. `Fire` is returned exactly once:
/// the first poll at or past the target; every later poll is `Idle`.
#[derive(Debug, Clone)]
pub struct CountdownTimer {
    target: DateTime<Local>,
    fired: bool,
}

impl CountdownTimer {
    pub fn new(target: DateTime<Local>) -> Self {
        Self {
            target,
            fired: false,
        }
    }

    pub fn poll(&mut self, now: DateTime<Local>) -> CountdownStep {
        if self.fired {
            CountdownStep::Idle
        } else if now >= self.target {
            self.fired = true;
            CountdownStep::Fire
        } else {
            CountdownStep::Wait(Remaining::from_span(self.target - now))
        }
    }
}

/// Combine today's date with a time of day. The target is never rolled to
/// tomorrow: a time that already passed resolves to an instant in the past
/// and the countdown fires on its first evaluation.
pub fn target_for_time_today(time: NaiveTime, now: &DateTime<Local>) -> Option<DateTime<Local>> {
    target_in_tz(time, now, &Local)
}

pub(crate) fn target_in_tz<Tz>(
    time: NaiveTime,
    now: &DateTime<Tz>,
    timezone: &Tz,
) -> Option<DateTime<Tz>>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    resolve_local_datetime(timezone, now.date_naive().and_time(time))
}

fn resolve_local_datetime<Tz>(timezone: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    match timezone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(first, _second) => Some(first),
        LocalResult::None => None,
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CountdownOutcome {
    Completed,
    Cancelled,
}

/// Owned handle for a running countdown thread. `cancel` stops ticking and
/// suppresses a pending completion; dropping the handle cancels and joins.
pub struct CountdownHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<CountdownOutcome>>,
}

impl CountdownHandle {
    pub fn cancel(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn wait(mut self) -> CountdownOutcome {
        match self.join.take() {
            Some(join) => join.join().unwrap_or(CountdownOutcome::Cancelled),
            None => CountdownOutcome::Cancelled,
        }
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Start a countdown toward `target` with one tick per `period`. The first
/// evaluation happens synchronously on the new thread before any sleep, so a
/// target already in the past completes without waiting a full period.
pub fn spawn_countdown<T, C>(
    target: DateTime<Local>,
    period: Duration,
    mut on_tick: T,
    on_complete: C,
) -> CountdownHandle
where
    T: FnMut(Remaining) + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_thread = Arc::clone(&stop);
    let join = thread::spawn(move || {
        let mut timer = CountdownTimer::new(target);
        loop {
            if stop_for_thread.load(Ordering::Relaxed) {
                return CountdownOutcome::Cancelled;
            }
            match timer.poll(Local::now()) {
                CountdownStep::Fire => {
                    on_complete();
                    return CountdownOutcome::Completed;
                }
                CountdownStep::Wait(remaining) => on_tick(remaining),
                CountdownStep::Idle => return CountdownOutcome::Completed,
            }
            thread::sleep(period);
        }
    });
    CountdownHandle {
        stop,
        join: Some(join),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use chrono::{NaiveDate, NaiveDateTime, TimeZone};
    use chrono_tz::America::New_York;

    use super::*;

    #[test]
    fn timer_counts_down_and_fires_exactly_once() {
        let start = Local::now();
        let target = start + chrono::Duration::seconds(3);
        let mut timer = CountdownTimer::new(target);

        assert_eq!(
            timer.poll(start),
            CountdownStep::Wait(Remaining {
                hours: 0,
                minutes: 0,
                seconds: 3,
            })
        );
        assert_eq!(
            timer.poll(start + chrono::Duration::seconds(1)),
            CountdownStep::Wait(Remaining {
                hours: 0,
                minutes: 0,
                seconds: 2,
            })
        );
        assert_eq!(timer.poll(target), CountdownStep::Fire);
        assert_eq!(
            timer.poll(target + chrono::Duration::seconds(5)),
            CountdownStep::Idle
        );
    }

    #[test]
    fn past_target_fires_on_first_poll_without_waiting() {
        let now = Local::now();
        let mut timer = CountdownTimer::new(now - chrono::Duration::seconds(2));
        assert_eq!(timer.poll(now), CountdownStep::Fire);
    }

    #[test]
    fn remaining_truncates_subsecond_parts() {
        let remaining = Remaining::from_span(chrono::Duration::milliseconds(3_723_700));
        assert_eq!(
            remaining,
            Remaining {
                hours: 1,
                minutes: 2,
                seconds: 3,
            }
        );
    }

    #[test]
    fn remaining_display_is_zero_padded() {
        let remaining = Remaining {
            hours: 0,
            minutes: 0,
            seconds: 9,
        };
        assert_eq!(remaining.to_string(), "00:00:09");
        let remaining = Remaining {
            hours: 12,
            minutes: 34,
            seconds: 56,
        };
        assert_eq!(remaining.to_string(), "12:34:56");
    }

    #[test]
    fn spawned_countdown_ticks_then_completes_exactly_once() {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let completions = Arc::new(AtomicUsize::new(0));
        let target = Local::now() + chrono::Duration::milliseconds(300);

        let handle = spawn_countdown(
            target,
            Duration::from_millis(50),
            {
                let ticks = Arc::clone(&ticks);
                move |remaining| ticks.lock().expect("ticks lock").push(remaining)
            },
            {
                let completions = Arc::clone(&completions);
                move || {
                    completions.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        assert_eq!(handle.wait(), CountdownOutcome::Completed);
        assert_eq!(completions.load(Ordering::SeqCst), 1);

        let ticks = ticks.lock().expect("ticks lock");
        assert!(!ticks.is_empty());
        for pair in ticks.windows(2) {
            assert!(pair[1].total_seconds() <= pair[0].total_seconds());
        }
    }

    #[test]
    fn past_target_completes_without_any_tick() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let completions = Arc::new(AtomicUsize::new(0));
        let target = Local::now() - chrono::Duration::seconds(1);

        let handle = spawn_countdown(
            target,
            Duration::from_millis(50),
            {
                let ticks = Arc::clone(&ticks);
                move |_| {
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            },
            {
                let completions = Arc::clone(&completions);
                move || {
                    completions.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        assert_eq!(handle.wait(), CountdownOutcome::Completed);
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_suppresses_completion() {
        let completions = Arc::new(AtomicUsize::new(0));
        let target = Local::now() + chrono::Duration::hours(1);

        let handle = spawn_countdown(target, Duration::from_millis(10), |_| {}, {
            let completions = Arc::clone(&completions);
            move || {
                completions.fetch_add(1, Ordering::SeqCst);
            }
        });
        handle.cancel();
        assert_eq!(handle.wait(), CountdownOutcome::Cancelled);
        assert_eq!(completions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn target_stays_on_today_even_when_already_passed() {
        let now = New_York
            .with_ymd_and_hms(2026, 6, 1, 8, 0, 0)
            .single()
            .expect("valid");
        let morning = NaiveTime::from_hms_opt(7, 0, 0).expect("valid time");
        let target = target_in_tz(morning, &now, &New_York).expect("resolvable");
        assert_eq!(target.date_naive(), now.date_naive());
        assert!(target < now);
    }

    #[test]
    fn dst_spring_forward_nonexistent_time_is_rejected() {
        let now = New_York
            .with_ymd_and_hms(2026, 3, 8, 0, 30, 0)
            .single()
            .expect("valid");
        let gap = NaiveTime::from_hms_opt(2, 30, 0).expect("valid time");
        assert!(target_in_tz(gap, &now, &New_York).is_none());
    }

    #[test]
    fn dst_fall_back_chooses_first_ambiguous_instance() {
        let now = New_York
            .with_ymd_and_hms(2026, 11, 1, 0, 0, 0)
            .single()
            .expect("valid");
        let ambiguous = NaiveTime::from_hms_opt(1, 30, 0).expect("valid time");

        let expected = match New_York.from_local_datetime(&NaiveDateTime::new(
            NaiveDate::from_ymd_opt(2026, 11, 1).expect("date"),
            ambiguous,
        )) {
            LocalResult::Ambiguous(first, _second) => first,
            _ => panic!("expected ambiguous local time"),
        };

        let actual = target_in_tz(ambiguous, &now, &New_York).expect("resolvable");
        assert_eq!(actual, expected);
    }
}
