use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive; `RUST_LOG` wins when set.
    pub level: String,
    /// `game.log` is appended here when set.
    pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

static INITIALIZED: OnceLock<()> = OnceLock::new();

const HEADER_LINE: &str = "-------------------------------------------------------------------------------";
const HEADER_TITLE: &str = "DikuMUD - Multi-User-Dungeon";
const GAME_LOG: &str = "game.log";

const WEEKDAYS: [&str; 7] = ["Thu", "Fri", "Sat", "Sun", "Mon", "Tue", "Wed"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Installs the global subscriber: human output on stderr plus a plain copy
/// in `<dir>/game.log`. Later calls are no-ops.
pub fn init(config: &LogConfig) -> Result<(), String> {
    if INITIALIZED.get().is_some() {
        return Ok(());
    }
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|err| format!("invalid log level '{}': {}", config.level, err))?,
    };
    let file_layer = match &config.dir {
        Some(dir) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_game_log(dir)?)),
        ),
        None => None,
    };
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    // A subscriber installed elsewhere (test harness, embedding binary) is fine.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    let _ = INITIALIZED.set(());
    Ok(())
}

/// Opens `game.log` for appending, writing the banner when the file is new.
pub fn open_game_log(dir: &Path) -> Result<File, String> {
    std::fs::create_dir_all(dir)
        .map_err(|err| format!("log directory create failed: {}", err))?;
    let path = dir.join(GAME_LOG);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| format!("open log {} failed: {}", path.display(), err))?;
    if file.metadata().map(|meta| meta.len()).unwrap_or(0) == 0 {
        write_header(&mut file, GAME_LOG)?;
    }
    Ok(file)
}

fn write_header(file: &mut File, name: &str) -> Result<(), String> {
    let started = format_header_timestamp(unix_timestamp());
    writeln!(file, "{HEADER_LINE}\n{HEADER_TITLE}\n{name} - started {started}")
        .map_err(|err| format!("header write failed: {}", err))
}

fn format_header_timestamp(ts: i64) -> String {
    let secs = ts.max(0);
    let days = secs / 86_400;
    let of_day = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    let weekday = WEEKDAYS[(days % 7) as usize];
    let month_name = MONTHS[(month as usize).saturating_sub(1).min(11)];
    format!(
        "{weekday} {month_name} {day:>2} {:02}:{:02}:{:02} {year}",
        of_day / 3_600,
        (of_day % 3_600) / 60,
        of_day % 60
    )
}

fn unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Proleptic Gregorian date for a day count since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
