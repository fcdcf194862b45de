use console::style;
use env_logger::Builder;
use log::Level;
use std::io::Write;

pub const LOG_ENV_VAR: &str = "CODEFENCE_LOG";

/// Default filter for a `-v` count; `-q` wins over any count.
pub fn level_for(verbosity: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }

    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Installs the stderr logger. `CODEFENCE_LOG` overrides the level.
pub fn setup_logger(verbosity: u8, quiet: bool) -> Result<(), log::SetLoggerError> {
    let env = env_logger::Env::default().filter_or(LOG_ENV_VAR, level_for(verbosity, quiet));

    Builder::from_env(env)
        .format(|buf, record| {
            let level = match record.level() {
                Level::Error => style("ERROR").red(),
                Level::Warn => style("WARN").yellow(),
                Level::Info => style("INFO").green(),
                Level::Debug => style("DEBUG").cyan(),
                Level::Trace => style("TRACE").magenta(),
            };

            writeln!(buf, "[{}] [{}] {}", level.for_stderr(), buf.timestamp(), record.args())
        })
        .format_timestamp_secs()
        .try_init()
}
