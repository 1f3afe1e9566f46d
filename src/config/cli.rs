use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, builder::BoolishValueParser};
use turnover_api_types::{GraveyardSortBy, SortOrder};

/// Command-line arguments for the TurnOver client.
#[derive(Debug, Parser)]
#[command(
    name = "turnover",
    version,
    about = "Track a running-shoe rotation from the terminal"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "TURNOVER_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

/// Settings overrides accepted by every subcommand.
#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the backend base URL.
    #[arg(long = "api-base-url", value_name = "URL", global = true)]
    pub api_base_url: Option<String>,

    /// Override the per-request timeout.
    #[arg(long = "api-timeout-seconds", value_name = "SECONDS", global = true)]
    pub api_timeout_seconds: Option<u64>,

    /// Override where credentials are persisted between invocations.
    #[arg(
        long = "credentials-path",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub credentials_path: Option<PathBuf>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Sign in, sign up, sign out or show the current user.
    Auth(AuthArgs),
    /// Shoes currently in the rotation.
    Rotation(RotationArgs),
    /// Retired shoes with their reviews.
    Graveyard(GraveyardArgs),
    /// The public shoe catalog.
    Shoes(ShoesArgs),
    /// Personalised shoe recommendations.
    Recommendations(RecommendationsArgs),
    /// Profile details and statistics.
    Profile(ProfileArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct PasswordArgs {
    /// Read the password from this file instead of `TURNOVER_PASSWORD`.
    #[arg(long = "password-file", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub password_file: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum AuthCommand {
    /// Sign in with email and password.
    #[command(name = "sign-in")]
    SignIn {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[command(flatten)]
        password: PasswordArgs,
    },
    /// Create an account.
    #[command(name = "sign-up")]
    SignUp {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long = "first-name", value_name = "NAME")]
        first_name: String,
        #[arg(long = "last-name", value_name = "NAME")]
        last_name: String,
        #[command(flatten)]
        password: PasswordArgs,
    },
    /// Forget the stored credentials.
    #[command(name = "sign-out")]
    SignOut,
    /// Print the signed-in user.
    #[command(name = "whoami")]
    Whoami,
}

#[derive(Debug, Args, Clone)]
pub struct RotationArgs {
    #[command(subcommand)]
    pub command: RotationCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum RotationCommand {
    /// List shoes in the rotation.
    List {
        /// Only shoes of this category.
        #[arg(long, value_name = "CATEGORY")]
        category: Option<String>,
    },
    /// Add a catalog shoe to the rotation.
    Add {
        #[arg(value_name = "SHOE_ID")]
        shoe_id: String,
        /// RFC 3339 start date; the backend uses "now" when omitted.
        #[arg(long = "start-date", value_name = "DATETIME")]
        start_date: Option<String>,
    },
    /// Remove a shoe from the rotation without retiring it.
    Remove {
        #[arg(value_name = "SHOE_ID")]
        shoe_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraveyardSortArg {
    RetiredAt,
    Rating,
    Name,
    Brand,
}

impl From<GraveyardSortArg> for GraveyardSortBy {
    fn from(value: GraveyardSortArg) -> Self {
        match value {
            GraveyardSortArg::RetiredAt => GraveyardSortBy::RetiredAt,
            GraveyardSortArg::Rating => GraveyardSortBy::Rating,
            GraveyardSortArg::Name => GraveyardSortBy::Name,
            GraveyardSortArg::Brand => GraveyardSortBy::Brand,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortOrderArg {
    Asc,
    Desc,
}

impl From<SortOrderArg> for SortOrder {
    fn from(value: SortOrderArg) -> Self {
        match value {
            SortOrderArg::Asc => SortOrder::Asc,
            SortOrderArg::Desc => SortOrder::Desc,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct GraveyardArgs {
    #[command(subcommand)]
    pub command: GraveyardCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum GraveyardCommand {
    /// List retired shoes.
    List {
        #[arg(long, value_name = "CATEGORY")]
        category: Option<String>,
        #[arg(long = "min-rating", value_name = "1-5", value_parser = clap::value_parser!(u8).range(1..=5))]
        min_rating: Option<u8>,
        #[arg(long = "sort-by", value_enum)]
        sort_by: Option<GraveyardSortArg>,
        #[arg(long = "sort-order", value_enum)]
        sort_order: Option<SortOrderArg>,
    },
    /// Retire a shoe from the rotation with a rating.
    Retire {
        #[arg(value_name = "SHOE_ID")]
        shoe_id: String,
        #[arg(long, value_name = "1-5", value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: u8,
        #[arg(long, value_name = "TEXT")]
        review: Option<String>,
        #[arg(long = "miles-run", value_name = "MILES")]
        miles_run: Option<f64>,
    },
    /// Change the rating, review or mileage of a retired shoe.
    Update {
        #[arg(value_name = "GRAVEYARD_ID")]
        graveyard_id: String,
        #[arg(long, value_name = "1-5", value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: Option<u8>,
        #[arg(long, value_name = "TEXT")]
        review: Option<String>,
        #[arg(long = "miles-run", value_name = "MILES")]
        miles_run: Option<f64>,
    },
    /// Delete a graveyard entry.
    Delete {
        #[arg(value_name = "GRAVEYARD_ID")]
        graveyard_id: String,
    },
}

#[derive(Debug, Args, Clone)]
pub struct ShoesArgs {
    #[command(subcommand)]
    pub command: ShoesCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum ShoesCommand {
    /// Search the catalog.
    List {
        #[arg(long, value_name = "CATEGORY")]
        category: Option<String>,
        #[arg(long, value_name = "BRAND")]
        brand: Option<String>,
        #[arg(long, value_name = "TEXT")]
        search: Option<String>,
        #[arg(long, value_name = "N")]
        page: Option<u32>,
        #[arg(long = "page-size", value_name = "N")]
        page_size: Option<u32>,
    },
    /// One catalog entry by id.
    Show {
        #[arg(value_name = "SHOE_ID")]
        shoe_id: String,
    },
}

#[derive(Debug, Args, Clone)]
pub struct RecommendationsArgs {
    #[command(subcommand)]
    pub command: RecommendationsCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum RecommendationsCommand {
    /// Recommendations based on the rotation and graveyard.
    List {
        #[arg(long, value_name = "CATEGORY")]
        category: Option<String>,
        #[arg(long, value_name = "N")]
        limit: Option<u32>,
    },
    /// Shoes similar to a given shoe.
    Similar {
        #[arg(value_name = "SHOE_ID")]
        shoe_id: String,
        #[arg(long, value_name = "N")]
        limit: Option<u32>,
    },
}

#[derive(Debug, Args, Clone)]
pub struct ProfileArgs {
    #[command(subcommand)]
    pub command: ProfileCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum ProfileCommand {
    /// Rotation and graveyard statistics of the signed-in user.
    Stats,
    /// Update profile fields; omitted fields are left unchanged.
    Update {
        #[arg(long = "first-name", value_name = "NAME")]
        first_name: Option<String>,
        #[arg(long = "last-name", value_name = "NAME")]
        last_name: Option<String>,
        #[arg(long = "avg-miles-per-week", value_name = "MILES")]
        avg_miles_per_week: Option<f64>,
        /// Replaces the preferred categories; repeat for several.
        #[arg(long = "preferred-category", value_name = "CATEGORY")]
        preferred_categories: Vec<String>,
    },
}
