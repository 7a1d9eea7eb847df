use colored::ColoredString;
use env_logger::Env;
use log::{warn, LevelFilter, Record};
use std::io::Write;

/// One log record as a JSON line.
fn json_line(record: &Record<'_>) -> serde_json::Value {
    serde_json::json!({
        "time": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        "level": record.level().to_string().to_lowercase(),
        "target": record.target(),
        "msg": record.args().to_string(),
    })
}

/// Initializes the logger by setting its filter and template.
///
/// The level is the configured one, which can be overridden by setting the
/// `RUST_LOG` environment variable. With `json` each record is written as a
/// single JSON object per line, otherwise as colored text prefixed by `name`.
pub fn init_logging(name: ColoredString, level: LevelFilter, json: bool) {
    let level = level.to_string().to_lowercase();
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(level));
    if json {
        builder.format(|buf, record| writeln!(buf, "{}", json_line(record)));
    } else {
        builder.format(move |buf, record| {
            let t = chrono::Utc::now();
            let t = format!("{}", t.format("%Y-%m-%d %H:%M:%S"));
            let level_style = buf.default_level_style(record.level());
            writeln!(
                buf,
                "{} {level_style}{}{level_style:#} {} {}",
                t,
                record.level(),
                name,
                record.args()
            )
        });
    }
    if builder.try_init().is_err() {
        warn!("Unable to initialize logging -- has it already been initialized?")
    }
}
