use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use crate::auth::Credentials;

pub const MAX_SEATS_PER_BOOKING: u32 = 4;

#[derive(Debug, Clone)]
pub struct BookingConfig {
    #[allow(dead_code)]
    pub version: u32,
    pub credentials: Credentials,
    pub journey: Journey,
    pub booking_time: NaiveTime,
    pub companions: Vec<Companion>,
}

#[derive(Debug, Clone)]
pub struct Journey {
    pub from_station: String,
    pub to_station: String,
    pub date: NaiveDate,
    /// Train selection string as shown to the user, e.g. "SUBARNA EXPRESS (702)".
    pub train: String,
    pub train_number: u32,
    pub seat_class: SeatClass,
    pub seat_count: u32,
    pub desired_seats: Vec<String>,
    pub payment_method: PaymentMethod,
}

impl Journey {
    /// Journey date in the `D-Mon-YYYY` form the remote API expects.
    pub fn api_date(&self) -> String {
        self.date.format("%-d-%b-%Y").to_string()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatClass {
    AcB,
    AcS,
    AcChair,
    FBerth,
    FSeat,
    FChair,
    SChair,
    Snigdha,
    Shovan,
    Shulov,
}

impl SeatClass {
    pub fn as_str(self) -> &'static str {
        match self {
            SeatClass::AcB => "AC_B",
            SeatClass::AcS => "AC_S",
            SeatClass::AcChair => "AC_CHAIR",
            SeatClass::FBerth => "F_BERTH",
            SeatClass::FSeat => "F_SEAT",
            SeatClass::FChair => "F_CHAIR",
            SeatClass::SChair => "S_CHAIR",
            SeatClass::Snigdha => "SNIGDHA",
            SeatClass::Shovan => "SHOVAN",
            SeatClass::Shulov => "SHULOV",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "bKash")]
    Bkash,
    Nagad,
    Rocket,
    Upay,
    #[serde(rename = "VISA")]
    Visa,
    Mastercard,
    #[serde(rename = "DBBL Nexus")]
    DbblNexus,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Bkash => "bKash",
            PaymentMethod::Nagad => "Nagad",
            PaymentMethod::Rocket => "Rocket",
            PaymentMethod::Upay => "Upay",
            PaymentMethod::Visa => "VISA",
            PaymentMethod::Mastercard => "Mastercard",
            PaymentMethod::DbblNexus => "DBBL Nexus",
        }
    }
}

/// Fellow passenger on the same booking; the lead passenger's details come
/// from the signed-in account.
#[derive(Debug, Clone)]
pub struct Companion {
    pub name: String,
    pub passenger_type: PassengerType,
    pub gender: Gender,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
pub enum PassengerType {
    Adult,
    Child,
}

impl PassengerType {
    pub fn as_str(self) -> &'static str {
        match self {
            PassengerType::Adult => "Adult",
            PassengerType::Child => "Child",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

pub fn load_booking_config(path: &Path) -> Result<BookingConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read booking file {}", path.display()))?;
    parse_booking_config_text(&content)
}

pub fn parse_booking_config_text(content: &str) -> Result<BookingConfig> {
    let raw = serde_json::from_str::<BookingConfigFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;

    if raw.version != 1 {
        bail!(
            "unsupported booking config version {}; expected version 1",
            raw.version
        );
    }

    if !is_valid_mobile_number(&raw.credentials.mobile_number) {
        bail!(
            "invalid mobile number '{}'; expected 01XXXXXXXXX with an optional +88 prefix",
            raw.credentials.mobile_number
        );
    }
    if raw.credentials.password.is_empty() {
        bail!("password must not be empty");
    }

    let journey = raw.journey;
    if journey.from_station.trim().is_empty() || journey.to_station.trim().is_empty() {
        bail!("from_station and to_station must not be empty");
    }
    if journey.from_station.trim() == journey.to_station.trim() {
        bail!(
            "from_station and to_station must differ, both are '{}'",
            journey.from_station.trim()
        );
    }

    let date = NaiveDate::parse_from_str(&journey.date, "%Y-%m-%d")
        .with_context(|| format!("invalid journey date '{}', expected YYYY-MM-DD", journey.date))?;

    let Some(train_number) = parse_train_number(&journey.train) else {
        bail!(
            "train '{}' must include a parenthesized train number, e.g. 'SUBARNA EXPRESS (702)'",
            journey.train
        );
    };

    if journey.seat_count == 0 || journey.seat_count > MAX_SEATS_PER_BOOKING {
        bail!(
            "seat_count must be between 1 and {MAX_SEATS_PER_BOOKING}, got {}",
            journey.seat_count
        );
    }

    let booking_time = NaiveTime::parse_from_str(&raw.booking_time, "%H:%M:%S")
        .with_context(|| format!("invalid booking_time '{}', expected HH:MM:SS", raw.booking_time))?;

    let expected_companions = journey.seat_count as usize - 1;
    if raw.passengers.len() != expected_companions {
        bail!(
            "expected {expected_companions} companion passenger entries for {} seats, found {}",
            journey.seat_count,
            raw.passengers.len()
        );
    }

    let mut companions = Vec::with_capacity(raw.passengers.len());
    for passenger in raw.passengers {
        if passenger.name.trim().is_empty() {
            bail!("companion passenger names must not be empty");
        }
        companions.push(Companion {
            name: passenger.name,
            passenger_type: passenger.passenger_type,
            gender: passenger.gender,
        });
    }

    Ok(BookingConfig {
        version: raw.version,
        credentials: Credentials {
            mobile_number: raw.credentials.mobile_number,
            password: raw.credentials.password,
        },
        journey: Journey {
            from_station: journey.from_station,
            to_station: journey.to_station,
            date,
            train_number,
            train: journey.train,
            seat_class: journey.seat_class,
            seat_count: journey.seat_count,
            desired_seats: parse_desired_seats(&journey.desired_seats),
            payment_method: journey.payment_method,
        },
        booking_time,
        companions,
    })
}

// Optional +88 country prefix, then 01, an operator digit 3-9 and 8 digits.
fn is_valid_mobile_number(input: &str) -> bool {
    let digits = input.strip_prefix("+88").unwrap_or(input);
    let bytes = digits.as_bytes();
    bytes.len() == 11
        && bytes.starts_with(b"01")
        && (b'3'..=b'9').contains(&bytes[2])
        && bytes.iter().all(|byte| byte.is_ascii_digit())
}

/// First all-digit parenthesized group in the selection string.
fn parse_train_number(input: &str) -> Option<u32> {
    let mut rest = input;
    while let Some((_, tail)) = rest.split_once('(') {
        if let Some((inner, after)) = tail.split_once(')') {
            let digits = inner.trim();
            if !digits.is_empty()
                && digits.bytes().all(|byte| byte.is_ascii_digit())
                && let Ok(value) = digits.parse()
            {
                return Some(value);
            }
            rest = after;
        } else {
            break;
        }
    }
    None
}

fn parse_desired_seats(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|seat| !seat.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Deserialize)]
struct BookingConfigFile {
    version: u32,
    credentials: CredentialsFile,
    journey: JourneyFile,
    booking_time: String,
    #[serde(default)]
    passengers: Vec<CompanionFile>,
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    mobile_number: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct JourneyFile {
    from_station: String,
    to_station: String,
    date: String,
    train: String,
    seat_class: SeatClass,
    seat_count: u32,
    #[serde(default)]
    desired_seats: String,
    payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
struct CompanionFile {
    name: String,
    passenger_type: PassengerType,
    gender: Gender,
}
