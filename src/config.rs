use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct AppConfig {
    pub root: PathBuf,
    pub tick_millis: u64,
    pub autosave_interval_seconds: u64,
}

impl AppConfig {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        if args.len() < 2 {
            return Err("usage: moonshard <asset-root> [tick_millis]".to_string());
        }

        let root = Path::new(&args[1]).to_path_buf();
        let tick_millis = if args.len() > 2 {
            match args[2].trim().parse::<u64>() {
                Ok(parsed) if parsed > 0 => parsed,
                _ => {
                    eprintln!(
                        "moonshard: invalid tick_millis '{}', using default",
                        args[2]
                    );
                    crate::world::state::DEFAULT_TICK_MILLIS
                }
            }
        } else {
            match std::env::var("MOONSHARD_TICK_MS") {
                Ok(value) => match value.trim().parse::<u64>() {
                    Ok(parsed) if parsed > 0 => parsed,
                    _ => {
                        eprintln!(
                            "moonshard: invalid MOONSHARD_TICK_MS '{}', using default",
                            value
                        );
                        crate::world::state::DEFAULT_TICK_MILLIS
                    }
                },
                Err(_) => crate::world::state::DEFAULT_TICK_MILLIS,
            }
        };
        let autosave_interval_seconds = match std::env::var("MOONSHARD_AUTOSAVE_SECS") {
            Ok(value) => match value.trim().parse::<u64>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    eprintln!(
                        "moonshard: invalid MOONSHARD_AUTOSAVE_SECS '{}', autosave disabled",
                        value
                    );
                    0
                }
            },
            Err(_) => 0,
        };

        Ok(Self {
            root,
            tick_millis,
            autosave_interval_seconds,
        })
    }
}
