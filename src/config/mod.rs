use crate::adapters::gorzdrav::GorzdravClient;
use crate::utils::error::Result;
use crate::utils::validation::{
    validate_non_empty_string, validate_positive_number, validate_url, Validate,
};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "talon-hunter")]
#[command(about = "Watches a doctor's schedule on the Gorzdrav portal and books the earliest acceptable slot")]
pub struct Cli {
    #[arg(long, default_value = GorzdravClient::DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(long, default_value = "profiles.json", help = "Path to the profile store file")]
    pub store: PathBuf,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage saved patient profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Search for a slot and book it
    Hunt(HuntArgs),
}

#[derive(Debug, Subcommand)]
pub enum ProfileAction {
    /// Validate a profile against the portal and save it
    Add(ProfileAddArgs),
    /// Edit a saved profile and revalidate it against the portal
    Update(ProfileUpdateArgs),
    /// List saved profiles for a clinic
    List {
        #[arg(long)]
        lpu: String,
    },
    /// Remove a saved profile
    Remove {
        #[arg(long)]
        id: String,
    },
}

#[derive(Debug, Args)]
pub struct ProfileAddArgs {
    #[arg(long, help = "Clinic (LPU) identifier")]
    pub lpu: String,

    #[arg(long)]
    pub last_name: String,

    #[arg(long)]
    pub first_name: String,

    #[arg(long)]
    pub middle_name: String,

    #[arg(long, help = "Birth date, YYYY-MM-DD")]
    pub birth_date: NaiveDate,

    #[arg(long, default_value = "")]
    pub email: String,

    #[arg(long, default_value = "")]
    pub phone: String,
}

/// Unset fields keep the stored value.
#[derive(Debug, Args)]
pub struct ProfileUpdateArgs {
    #[arg(long, help = "Saved profile id to edit")]
    pub id: String,

    #[arg(long)]
    pub last_name: Option<String>,

    #[arg(long)]
    pub first_name: Option<String>,

    #[arg(long)]
    pub middle_name: Option<String>,

    #[arg(long, help = "Birth date, YYYY-MM-DD")]
    pub birth_date: Option<NaiveDate>,

    #[arg(long)]
    pub email: Option<String>,

    #[arg(long)]
    pub phone: Option<String>,
}

#[derive(Debug, Args)]
pub struct HuntArgs {
    #[arg(long, help = "Clinic (LPU) identifier")]
    pub lpu: String,

    #[arg(long, help = "Doctor identifier")]
    pub doctor: String,

    #[arg(long, help = "Saved profile id to book for")]
    pub profile: String,

    #[arg(
        long,
        value_parser = parse_date_time,
        help = "Earliest acceptable slot start, e.g. \"2024-01-10 09:00\""
    )]
    pub after: NaiveDateTime,

    #[arg(long, default_value = "30", help = "Seconds between schedule checks")]
    pub interval_secs: u64,
}

fn parse_date_time(value: &str) -> std::result::Result<NaiveDateTime, String> {
    const FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];
    for format in FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed);
        }
    }
    Err(format!(
        "expected a date/time like \"2024-01-10 09:00\", got '{}'",
        value
    ))
}

impl Validate for Cli {
    fn validate(&self) -> Result<()> {
        validate_url("base_url", &self.base_url)?;
        match &self.command {
            Command::Profile { action } => match action {
                ProfileAction::Add(args) => {
                    validate_non_empty_string("lpu", &args.lpu)?;
                    validate_non_empty_string("last_name", &args.last_name)?;
                    validate_non_empty_string("first_name", &args.first_name)?;
                    validate_non_empty_string("middle_name", &args.middle_name)?;
                }
                ProfileAction::Update(args) => {
                    validate_non_empty_string("id", &args.id)?;
                    for (field, value) in [
                        ("last_name", &args.last_name),
                        ("first_name", &args.first_name),
                        ("middle_name", &args.middle_name),
                    ] {
                        if let Some(value) = value {
                            validate_non_empty_string(field, value)?;
                        }
                    }
                }
                ProfileAction::List { lpu } => validate_non_empty_string("lpu", lpu)?,
                ProfileAction::Remove { id } => validate_non_empty_string("id", id)?,
            },
            Command::Hunt(args) => {
                validate_non_empty_string("lpu", &args.lpu)?;
                validate_non_empty_string("doctor", &args.doctor)?;
                validate_non_empty_string("profile", &args.profile)?;
                validate_positive_number("interval_secs", args.interval_secs, 1)?;
            }
        }
        Ok(())
    }
}
