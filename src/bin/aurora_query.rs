//! Read-only query tool over the record store
//!
//! Usage:
//!   aurora_query nearest            # record whose forecast arrival is closest to now
//!   aurora_query last-hour [TZ]     # last hour, stamped in TZ (UTC, +08:00, Asia/Shanghai)
//!   aurora_query all                # every stored record
//!
//! The database path comes from the usual configuration (`AURORA_DB_PATH`).

use auroraflow::pipeline::{
    config::MonitorConfig,
    query::{parse_display_zone, RecordQuery},
    report::render_record,
};
use chrono::Utc;
use dotenv::dotenv;
use std::env;

enum Command {
    Nearest,
    LastHour(Option<String>),
    All,
}

fn parse_command_from_args() -> Option<Command> {
    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(|s| s.as_str()) {
        Some("nearest") => Some(Command::Nearest),
        Some("last-hour") => Some(Command::LastHour(args.get(1).cloned())),
        Some("all") => Some(Command::All),
        _ => None,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let Some(command) = parse_command_from_args() else {
        eprintln!("usage: aurora_query <nearest | last-hour [TZ] | all>");
        std::process::exit(2);
    };

    let config = MonitorConfig::resolve();
    let query = RecordQuery::open(&config.db_path)?;

    match command {
        Command::Nearest => match query.nearest(Utc::now())? {
            Some(record) => print!("{}", render_record(&record)),
            None => println!("No record with a usable forecast"),
        },
        Command::LastHour(tz) => {
            let tz = tz.unwrap_or(config.display_timezone);
            let zone = parse_display_zone(&tz)?;
            let rows = query.last_hour(Utc::now(), zone)?;
            println!("{} records in the last hour ({})", rows.len(), tz);
            for row in rows {
                println!("{}", serde_json::to_string(&row.record)?);
                println!("  display_time: {}", row.display_time.to_rfc3339());
            }
        }
        Command::All => {
            for record in query.all()? {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
    }

    Ok(())
}
